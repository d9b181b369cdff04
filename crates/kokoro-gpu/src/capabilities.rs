//! GPU capability detection and adapter selection.

use crate::error::{GpuError, Result};
use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// Device extensions an adapter must expose to be considered.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 2] = [
    ash::khr::swapchain::NAME,
    ash::ext::subgroup_size_control::NAME,
];

/// The list from an adapter query, or an empty one if the query failed.
fn or_empty<T>(adapter: &str, what: &str, result: ash::prelude::VkResult<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        tracing::warn!("Failed to query {what} of {adapter}: {e}");
        Vec::new()
    })
}

/// Score bonus for discrete GPUs.
const DISCRETE_BONUS: u64 = 100;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// One queue family as seen from a given surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    /// Whether this family can present to the bootstrap surface.
    pub present: bool,
}

/// Snapshot of everything adapter selection looks at.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub vendor: GpuVendor,
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub non_coherent_atom_size: u64,
    pub multi_draw_indirect: bool,
    pub tessellation_shader: bool,
    pub sampler_anisotropy: bool,
    /// `subgroupSizeControl` of the subgroup-size-control extension.
    pub subgroup_size_control: bool,
    /// `computeFullSubgroups` of the subgroup-size-control extension.
    pub compute_full_subgroups: bool,
    pub extensions: HashSet<String>,
    pub surface_formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub queue_families: Vec<QueueFamilyInfo>,
}

impl AdapterInfo {
    /// Query an adapter against `surface`.
    ///
    /// A failed extension or surface query leaves that list empty, which
    /// scores the adapter 0 instead of aborting the scan.
    ///
    /// # Safety
    /// The instance, physical device and surface must be valid.
    pub unsafe fn query(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        handle: vk::PhysicalDevice,
    ) -> Self {
        let properties = instance.get_physical_device_properties(handle);
        let features = instance.get_physical_device_features(handle);
        let name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let extensions: HashSet<String> = or_empty(
            &name,
            "device extensions",
            instance.enumerate_device_extension_properties(handle),
        )
        .iter()
            .filter_map(|ext| {
                CStr::from_ptr(ext.extension_name.as_ptr())
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect();

        let mut subgroup = vk::PhysicalDeviceSubgroupSizeControlFeaturesEXT::default();
        if ash::ext::subgroup_size_control::NAME
            .to_str()
            .is_ok_and(|name| extensions.contains(name))
        {
            let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut subgroup);
            instance.get_physical_device_features2(handle, &mut features2);
        }

        let surface_formats = or_empty(
            &name,
            "surface formats",
            surface_loader.get_physical_device_surface_formats(handle, surface),
        );
        let present_modes = or_empty(
            &name,
            "present modes",
            surface_loader.get_physical_device_surface_present_modes(handle, surface),
        );

        let queue_families = instance
            .get_physical_device_queue_family_properties(handle)
            .iter()
            .enumerate()
            .map(|(index, family)| {
                let present = surface_loader
                    .get_physical_device_surface_support(handle, index as u32, surface)
                    .unwrap_or(false);
                QueueFamilyInfo {
                    flags: family.queue_flags,
                    queue_count: family.queue_count,
                    present,
                }
            })
            .collect();

        Self {
            handle,
            name,
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_type: properties.device_type,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
            non_coherent_atom_size: properties.limits.non_coherent_atom_size,
            multi_draw_indirect: features.multi_draw_indirect == vk::TRUE,
            tessellation_shader: features.tessellation_shader == vk::TRUE,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            subgroup_size_control: subgroup.subgroup_size_control == vk::TRUE,
            compute_full_subgroups: subgroup.compute_full_subgroups == vk::TRUE,
            extensions,
            surface_formats,
            present_modes,
            queue_families,
        }
    }

    /// Names of required extensions this adapter lacks.
    pub fn missing_extensions(&self) -> Vec<&'static str> {
        REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .filter_map(|name| name.to_str().ok())
            .filter(|name| !self.extensions.contains(*name))
            .collect()
    }

    /// Suitability score; zero disqualifies.
    ///
    /// Qualifying adapters score the 2D image dimension limit, plus a bonus
    /// when discrete.
    pub fn score(&self) -> u64 {
        if !self.multi_draw_indirect || !self.tessellation_shader {
            return 0;
        }
        if !self.missing_extensions().is_empty() {
            return 0;
        }
        if self.surface_formats.is_empty() {
            return 0;
        }
        // FIFO is always available, so an empty list only means a broken driver.
        if self.present_modes.is_empty() {
            return 0;
        }

        let bonus = if self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            DISCRETE_BONUS
        } else {
            0
        };
        bonus + u64::from(self.max_image_dimension_2d)
    }

    /// Name, vendor and type for logging.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - max 2D image {}",
            self.name, self.vendor, self.device_type, self.max_image_dimension_2d
        )
    }
}

/// Pick the highest-scoring adapter.
///
/// Ties keep the adapter enumerated last.
pub fn select_adapter(adapters: &[AdapterInfo]) -> Result<&AdapterInfo> {
    if adapters.is_empty() {
        return Err(GpuError::NoVulkanDevice);
    }

    let mut best: Option<(u64, &AdapterInfo)> = None;
    for adapter in adapters {
        let score = adapter.score();
        tracing::debug!("Adapter {} scored {}", adapter.name, score);
        if best.map_or(true, |(best_score, _)| score >= best_score) {
            best = Some((score, adapter));
        }
    }

    match best {
        Some((score, adapter)) if score > 0 => Ok(adapter),
        _ => Err(GpuError::NoSuitableDevice),
    }
}

#[cfg(test)]
pub(crate) fn test_adapter(raw: u64) -> AdapterInfo {
    use ash::vk::Handle;

    AdapterInfo {
        handle: vk::PhysicalDevice::from_raw(raw),
        name: format!("adapter-{raw}"),
        vendor: GpuVendor::Amd,
        device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
        max_image_dimension_2d: 16384,
        non_coherent_atom_size: 64,
        multi_draw_indirect: true,
        tessellation_shader: true,
        sampler_anisotropy: true,
        subgroup_size_control: true,
        compute_full_subgroups: true,
        extensions: REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .filter_map(|name| name.to_str().ok())
            .map(String::from)
            .collect(),
        surface_formats: vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }],
        present_modes: vec![vk::PresentModeKHR::FIFO],
        queue_families: vec![QueueFamilyInfo {
            flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            queue_count: 16,
            present: true,
        }],
    }
}
