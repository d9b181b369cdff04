//! Swapchain management.

use crate::error::{GpuError, Result};
use ash::vk;

/// Everything needed to create the swapchain once the device exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainRequest {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainRequest {
    /// Create info for `surface`. Images are colour attachments owned by one
    /// queue family at a time.
    pub fn create_info(&self, surface: vk::SurfaceKHR) -> vk::SwapchainCreateInfoKHR<'static> {
        vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(self.image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(self.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
    }
}

/// Create info for a 2D colour view over one swapchain image.
pub fn swapchain_view_info(image: vk::Image, format: vk::Format) -> vk::ImageViewCreateInfo<'static> {
    vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
}

/// Swapchain with the views over its images.
///
/// Dropping it destroys the views, then the swapchain.
pub struct Swapchain {
    device: ash::Device,
    loader: ash::khr::swapchain::Device,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
}

impl Swapchain {
    /// Create the swapchain and fetch its images. Views are added afterwards
    /// with [`Self::push_view`].
    ///
    /// # Safety
    /// The instance, device and surface must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        surface: vk::SurfaceKHR,
        request: &SwapchainRequest,
    ) -> Result<Self> {
        let loader = ash::khr::swapchain::Device::new(instance, device);
        let handle = loader
            .create_swapchain(&request.create_info(surface), None)
            .map_err(GpuError::creation("swapchain"))?;

        let images = match loader.get_swapchain_images(handle) {
            Ok(images) => images,
            Err(e) => {
                loader.destroy_swapchain(handle, None);
                return Err(e.into());
            }
        };

        tracing::info!(
            "Created swapchain: {}x{}, {} images, {:?}, {:?}",
            request.extent.width,
            request.extent.height,
            images.len(),
            request.surface_format.format,
            request.present_mode
        );

        Ok(Self {
            device: device.clone(),
            loader,
            handle,
            images,
            views: Vec::new(),
        })
    }

    /// Create a view for one of the swapchain images and keep it.
    ///
    /// # Safety
    /// `image` must belong to this swapchain.
    pub unsafe fn push_view(&mut self, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
        let view = self
            .device
            .create_image_view(&swapchain_view_info(image, format), None)
            .map_err(GpuError::creation("swapchain image view"))?;
        self.views.push(view);
        Ok(view)
    }

    /// The swapchain handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// Swapchain extension functions.
    pub fn loader(&self) -> &ash::khr::swapchain::Device {
        &self.loader
    }

    /// Images owned by the swapchain.
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Color views of the images.
    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

/// Select the surface format: B8G8R8A8 unorm with sRGB non-linear colour
/// space if offered, otherwise the first one.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_UNORM
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the present mode: mailbox, then relaxed FIFO, then FIFO.
pub fn select_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO_RELAXED]
        .into_iter()
        .find(|mode| available.contains(mode))
        // FIFO is always supported
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One image more than the minimum, capped when the surface has a maximum.
pub fn image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}
