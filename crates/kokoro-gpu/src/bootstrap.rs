//! Device bootstrap: adapter selection through to a presentable swapchain.
//!
//! The sequence lives in [`run`] and talks to the driver only through
//! [`BootstrapDriver`], so selection, queue planning and swapchain sizing are
//! the same whether the calls reach Vulkan ([`AshDriver`]) or a scripted
//! driver.

use crate::capabilities::{select_adapter, AdapterInfo, REQUIRED_DEVICE_EXTENSIONS};
use crate::error::{GpuError, Result};
use crate::instance::Instance;
use crate::queues::{resolve_queue_families, QueueFamilies, QueuePlan};
use crate::surface::Surface;
use crate::swapchain::{
    calculate_extent, image_count, select_present_mode, select_surface_format, Swapchain,
    SwapchainRequest,
};
use ash::vk;
use std::ffi::c_char;

/// Features requested at device creation.
#[derive(Debug, Clone, Copy)]
pub struct EnabledFeatures {
    pub core: vk::PhysicalDeviceFeatures,
    pub subgroup_size_control: bool,
    pub compute_full_subgroups: bool,
}

/// Features to enable on `adapter`.
///
/// Multi-draw-indirect, tessellation and shader stores/atomics are always
/// requested. Robust buffer access is added under validation, anisotropic
/// filtering whenever the adapter has it.
pub fn device_features(adapter: &AdapterInfo, validation: bool) -> EnabledFeatures {
    let core = vk::PhysicalDeviceFeatures::default()
        .multi_draw_indirect(true)
        .tessellation_shader(true)
        .fragment_stores_and_atomics(true)
        .vertex_pipeline_stores_and_atomics(true)
        .robust_buffer_access(validation)
        .sampler_anisotropy(adapter.sampler_anisotropy);

    EnabledFeatures {
        core,
        subgroup_size_control: adapter.subgroup_size_control,
        compute_full_subgroups: adapter.compute_full_subgroups,
    }
}

/// The native calls bootstrap needs.
pub trait BootstrapDriver {
    /// Snapshot every physical device against the bootstrap surface.
    fn enumerate_adapters(&mut self) -> Result<Vec<AdapterInfo>>;

    /// Create the logical device with the queues in `plan`.
    fn create_device(
        &mut self,
        adapter: &AdapterInfo,
        plan: &QueuePlan,
        features: &EnabledFeatures,
    ) -> Result<()>;

    fn surface_capabilities(&mut self, adapter: &AdapterInfo)
        -> Result<vk::SurfaceCapabilitiesKHR>;

    /// Create the swapchain and return its images.
    fn create_swapchain(&mut self, request: &SwapchainRequest) -> Result<Vec<vk::Image>>;

    fn create_image_view(&mut self, image: vk::Image, format: vk::Format)
        -> Result<vk::ImageView>;
}

/// What bootstrap decided and created.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub adapter: AdapterInfo,
    pub families: QueueFamilies,
    pub plan: QueuePlan,
    pub features: EnabledFeatures,
    pub swapchain: SwapchainRequest,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
}

/// Run device bootstrap against `driver`.
///
/// `width` and `height` are the window size, used when the surface leaves
/// the extent to the application.
pub fn run(
    driver: &mut impl BootstrapDriver,
    width: u32,
    height: u32,
    validation: bool,
) -> Result<Bootstrap> {
    let adapters = driver.enumerate_adapters()?;
    let adapter = select_adapter(&adapters)?.clone();
    tracing::info!("Selected GPU: {}", adapter.summary());

    let families = resolve_queue_families(&adapter.queue_families)?;
    let plan = QueuePlan::new(families, &adapter.queue_families);
    tracing::debug!("Queue families {:?}, requests {:?}", families, plan.requests);

    let features = device_features(&adapter, validation);
    driver.create_device(&adapter, &plan, &features)?;

    let surface_format =
        select_surface_format(&adapter.surface_formats).ok_or(GpuError::NoSuitableDevice)?;
    let present_mode = select_present_mode(&adapter.present_modes);

    let capabilities = driver.surface_capabilities(&adapter)?;
    let request = SwapchainRequest {
        surface_format,
        present_mode,
        extent: calculate_extent(&capabilities, width, height),
        image_count: image_count(&capabilities),
        pre_transform: capabilities.current_transform,
    };

    let images = driver.create_swapchain(&request)?;
    let views = images
        .iter()
        .map(|&image| driver.create_image_view(image, surface_format.format))
        .collect::<Result<Vec<_>>>()?;

    Ok(Bootstrap {
        adapter,
        families,
        plan,
        features,
        swapchain: request,
        images,
        views,
    })
}

/// [`BootstrapDriver`] backed by Vulkan.
///
/// Holds what it creates until [`AshDriver::finish`]; if bootstrap fails
/// first, dropping the driver releases the swapchain and then the device.
pub struct AshDriver<'a> {
    instance: &'a Instance,
    surface: &'a Surface,
    device: Option<ash::Device>,
    swapchain: Option<Swapchain>,
}

impl<'a> AshDriver<'a> {
    /// Driver over an existing instance and surface.
    pub fn new(instance: &'a Instance, surface: &'a Surface) -> Self {
        Self {
            instance,
            surface,
            device: None,
            swapchain: None,
        }
    }

    fn device(&self) -> Result<&ash::Device> {
        self.device
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("Logical device not created".to_string()))
    }

    /// Hand over the device and swapchain.
    pub fn finish(mut self) -> Result<(ash::Device, Swapchain)> {
        let swapchain = self
            .swapchain
            .take()
            .ok_or_else(|| GpuError::InvalidState("Swapchain not created".to_string()))?;
        let device = self
            .device
            .take()
            .ok_or_else(|| GpuError::InvalidState("Logical device not created".to_string()))?;
        Ok((device, swapchain))
    }
}

impl BootstrapDriver for AshDriver<'_> {
    fn enumerate_adapters(&mut self) -> Result<Vec<AdapterInfo>> {
        let instance = self.instance.raw();
        unsafe {
            Ok(instance
                .enumerate_physical_devices()?
                .into_iter()
                .map(|handle| {
                    AdapterInfo::query(
                        instance,
                        self.surface.loader(),
                        self.surface.handle(),
                        handle,
                    )
                })
                .collect())
        }
    }

    fn create_device(
        &mut self,
        adapter: &AdapterInfo,
        plan: &QueuePlan,
        features: &EnabledFeatures,
    ) -> Result<()> {
        let max_count = plan.requests.iter().map(|r| r.count).max().unwrap_or(1);
        let priorities = vec![1.0_f32; max_count as usize];

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = plan
            .requests
            .iter()
            .map(|request| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(request.family)
                    .queue_priorities(&priorities[..request.count as usize])
            })
            .collect();

        let extension_names: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let mut subgroup_features = vk::PhysicalDeviceSubgroupSizeControlFeaturesEXT::default()
            .subgroup_size_control(features.subgroup_size_control)
            .compute_full_subgroups(features.compute_full_subgroups);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features.core)
            .push_next(&mut subgroup_features);

        let device = unsafe {
            self.instance
                .raw()
                .create_device(adapter.handle, &create_info, None)
        }
        .map_err(GpuError::creation("logical device"))?;

        self.device = Some(device);
        Ok(())
    }

    fn surface_capabilities(
        &mut self,
        adapter: &AdapterInfo,
    ) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe { self.surface.capabilities(adapter.handle) }
    }

    fn create_swapchain(&mut self, request: &SwapchainRequest) -> Result<Vec<vk::Image>> {
        let swapchain = unsafe {
            Swapchain::new(
                self.instance.raw(),
                self.device()?,
                self.surface.handle(),
                request,
            )?
        };
        let images = swapchain.images().to_vec();
        self.swapchain = Some(swapchain);
        Ok(images)
    }

    fn create_image_view(&mut self, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
        let swapchain = self
            .swapchain
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Swapchain not created".to_string()))?;
        unsafe { swapchain.push_view(image, format) }
    }
}

impl Drop for AshDriver<'_> {
    fn drop(&mut self) {
        drop(self.swapchain.take());
        if let Some(device) = self.device.take() {
            unsafe {
                device.destroy_device(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::test_adapter;
    use crate::testing::MockDriver;

    #[test]
    fn features_follow_adapter_and_validation() {
        let mut adapter = test_adapter(1);
        adapter.sampler_anisotropy = false;

        let features = device_features(&adapter, true);
        assert_eq!(features.core.multi_draw_indirect, vk::TRUE);
        assert_eq!(features.core.tessellation_shader, vk::TRUE);
        assert_eq!(features.core.fragment_stores_and_atomics, vk::TRUE);
        assert_eq!(features.core.vertex_pipeline_stores_and_atomics, vk::TRUE);
        assert_eq!(features.core.robust_buffer_access, vk::TRUE);
        assert_eq!(features.core.sampler_anisotropy, vk::FALSE);

        let features = device_features(&test_adapter(1), false);
        assert_eq!(features.core.robust_buffer_access, vk::FALSE);
        assert_eq!(features.core.sampler_anisotropy, vk::TRUE);
    }

    #[test]
    fn selects_qualifying_discrete_gpu_and_creates_swapchain_once() {
        let mut lacking = test_adapter(1);
        lacking.extensions.remove("VK_KHR_swapchain");
        lacking.max_image_dimension_2d = 65536;
        let discrete = test_adapter(2);

        let mut driver = MockDriver::new(vec![lacking, discrete.clone()]);
        driver.capabilities.min_image_count = 2;
        driver.capabilities.max_image_count = 0;

        let result = run(&mut driver, 1280, 720, false).unwrap();

        assert_eq!(result.adapter.handle, discrete.handle);
        assert_eq!(driver.devices_created, vec![discrete.handle]);
        assert_eq!(driver.swapchain_requests.len(), 1);
        assert_eq!(driver.swapchain_requests[0].image_count, 3);
        assert_eq!(result.images.len(), 3);
        assert_eq!(result.views.len(), 3);
        assert_eq!(driver.views_created, 3);
    }

    #[test]
    fn adapter_without_surface_support_is_skipped() {
        let mut unreachable = test_adapter(1);
        unreachable.surface_formats.clear();
        unreachable.present_modes.clear();
        unreachable.extensions.clear();
        let usable = test_adapter(2);

        let mut driver = MockDriver::new(vec![unreachable, usable.clone()]);
        let result = run(&mut driver, 640, 480, false).unwrap();

        assert_eq!(result.adapter.handle, usable.handle);
        assert_eq!(driver.devices_created, vec![usable.handle]);
    }

    #[test]
    fn single_family_device_gets_one_queue_entry() {
        let mut driver = MockDriver::new(vec![test_adapter(7)]);
        run(&mut driver, 640, 480, false).unwrap();

        let requests = &driver.queue_requests[0];
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].family, 0);
        assert_eq!(requests[0].count, 3);
    }

    #[test]
    fn window_size_used_when_surface_extent_is_undefined() {
        let mut driver = MockDriver::new(vec![test_adapter(3)]);
        driver.capabilities.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        let result = run(&mut driver, 640, 480, false).unwrap();
        assert_eq!(
            result.swapchain.extent,
            vk::Extent2D {
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn no_adapters_is_fatal() {
        let mut driver = MockDriver::new(Vec::new());
        assert!(matches!(
            run(&mut driver, 640, 480, false),
            Err(GpuError::NoVulkanDevice)
        ));
        assert!(driver.swapchain_requests.is_empty());
    }

    #[test]
    fn unsupported_present_topology_stops_before_device_creation() {
        let mut adapter = test_adapter(4);
        adapter.queue_families[0].present = false;
        let mut driver = MockDriver::new(vec![adapter]);
        assert!(matches!(
            run(&mut driver, 640, 480, false),
            Err(GpuError::SeparatePresentQueue)
        ));
        assert!(driver.devices_created.is_empty());
    }
}
