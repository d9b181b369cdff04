//! GPU context management.

use crate::backend::{DeviceBackend, SharedDevice};
use crate::bootstrap::{self, AshDriver, EnabledFeatures};
use crate::capabilities::AdapterInfo;
use crate::error::{GpuError, Result};
use crate::formats::MemoryUsage;
use crate::instance::{DebugMessenger, Instance};
use crate::memory::{flush_window, Allocation, GpuAllocator};
use crate::queues::QueueFamilies;
use crate::surface::{Surface, SurfaceProvider};
use crate::swapchain::Swapchain;
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

/// Device, queues, allocator and swapchain for one window.
///
/// Resources hold the context as a [`SharedDevice`], so it is torn down only
/// after the last of them: swapchain views, swapchain, allocator, device,
/// debug messenger, surface, instance.
pub struct GpuContext {
    swapchain: Option<Swapchain>,
    allocator: Mutex<GpuAllocator>,
    device: ash::Device,
    adapter: AdapterInfo,
    families: QueueFamilies,
    unique_families: Vec<u32>,
    features: EnabledFeatures,
    graphics_queue: vk::Queue,
    compute_queue: vk::Queue,
    transfer_queue: vk::Queue,
    present_queue: vk::Queue,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    validation: bool,
    // Dropped after the device, in this order.
    #[allow(dead_code)]
    messenger: Option<DebugMessenger>,
    surface: Surface,
    instance: Instance,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        self.instance.raw()
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.adapter.handle
    }

    /// The selected adapter as seen at bootstrap.
    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the compute queue.
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    /// Get the transfer queue.
    pub fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    /// Get the present queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Family index of each queue role.
    pub fn families(&self) -> QueueFamilies {
        self.families
    }

    /// Distinct queue family indices, shared by concurrent resources.
    pub fn unique_families(&self) -> &[u32] {
        &self.unique_families
    }

    /// Get the window surface.
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.handle()
    }

    /// Selected swapchain surface format.
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    /// Selected present mode.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get the swapchain handle.
    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
            .as_ref()
            .map_or_else(vk::SwapchainKHR::null, Swapchain::handle)
    }

    /// Swapchain extension functions.
    pub fn swapchain_loader(&self) -> Option<&ash::khr::swapchain::Device> {
        self.swapchain.as_ref().map(Swapchain::loader)
    }

    /// Images owned by the swapchain.
    pub fn swapchain_images(&self) -> &[vk::Image] {
        self.swapchain.as_ref().map_or(&[][..], Swapchain::images)
    }

    /// One color view per swapchain image.
    pub fn swapchain_views(&self) -> &[vk::ImageView] {
        self.swapchain.as_ref().map_or(&[][..], Swapchain::views)
    }

    /// Whether validation layers were requested.
    pub fn validation_enabled(&self) -> bool {
        self.validation
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }

    /// This context as the device handle resources are built against.
    pub fn shared(self: &Arc<Self>) -> SharedDevice {
        self.clone()
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            drop(self.swapchain.take());
            // Frees all device memory, so it must precede the device.
            self.allocator.lock().shutdown();
            self.device.destroy_device(None);
        }
        tracing::debug!("GPU context destroyed");
    }
}

impl DeviceBackend for GpuContext {
    fn queue_families(&self) -> &[u32] {
        &self.unique_families
    }

    fn subgroup_size_control(&self) -> bool {
        self.features.subgroup_size_control
    }

    fn compute_full_subgroups(&self) -> bool {
        self.features.compute_full_subgroups
    }

    unsafe fn create_buffer(
        &self,
        info: &vk::BufferCreateInfo<'_>,
        usage: MemoryUsage,
        name: &str,
    ) -> Result<(vk::Buffer, Allocation)> {
        self.allocator.lock().create_buffer(info, usage, name)
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer, allocation: Allocation) {
        self.allocator.lock().destroy_buffer(buffer, allocation);
    }

    unsafe fn create_image(
        &self,
        info: &vk::ImageCreateInfo<'_>,
        usage: MemoryUsage,
        name: &str,
    ) -> Result<(vk::Image, Allocation)> {
        self.allocator.lock().create_image(info, usage, name)
    }

    unsafe fn destroy_image(&self, image: vk::Image, allocation: Allocation) {
        self.allocator.lock().destroy_image(image, allocation);
    }

    unsafe fn flush_mapped_range(
        &self,
        allocation: &Allocation,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        let (offset, size) =
            flush_window(allocation, offset, size, self.adapter.non_coherent_atom_size);
        let range = vk::MappedMemoryRange::default()
            .memory(allocation.memory())
            .offset(offset)
            .size(size);
        self.device.flush_mapped_memory_ranges(&[range])?;
        Ok(())
    }

    unsafe fn create_buffer_view(
        &self,
        info: &vk::BufferViewCreateInfo<'_>,
    ) -> Result<vk::BufferView> {
        self.device
            .create_buffer_view(info, None)
            .map_err(GpuError::creation("buffer view"))
    }

    unsafe fn destroy_buffer_view(&self, view: vk::BufferView) {
        self.device.destroy_buffer_view(view, None);
    }

    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> Result<vk::ImageView> {
        self.device
            .create_image_view(info, None)
            .map_err(GpuError::creation("image view"))
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        self.device.destroy_image_view(view, None);
    }

    unsafe fn create_sampler(&self, info: &vk::SamplerCreateInfo<'_>) -> Result<vk::Sampler> {
        self.device
            .create_sampler(info, None)
            .map_err(GpuError::creation("sampler"))
    }

    unsafe fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.device.destroy_sampler(sampler, None);
    }

    unsafe fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> Result<vk::DescriptorSetLayout> {
        self.device
            .create_descriptor_set_layout(info, None)
            .map_err(GpuError::creation("descriptor set layout"))
    }

    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.device.destroy_descriptor_set_layout(layout, None);
    }

    unsafe fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> Result<vk::DescriptorPool> {
        self.device
            .create_descriptor_pool(info, None)
            .map_err(GpuError::creation("descriptor pool"))
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.device.destroy_descriptor_pool(pool, None);
    }

    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> Result<Vec<vk::DescriptorSet>> {
        self.device
            .allocate_descriptor_sets(info)
            .map_err(GpuError::creation("descriptor sets"))
    }

    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        self.device.update_descriptor_sets(writes, &[]);
    }

    unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> Result<vk::ShaderModule> {
        self.device
            .create_shader_module(info, None)
            .map_err(GpuError::creation("shader module"))
    }

    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.device.destroy_shader_module(module, None);
    }

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> Result<vk::RenderPass> {
        self.device
            .create_render_pass(info, None)
            .map_err(GpuError::creation("render pass"))
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.device.destroy_render_pass(render_pass, None);
    }

    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> Result<vk::PipelineLayout> {
        self.device
            .create_pipeline_layout(info, None)
            .map_err(GpuError::creation("pipeline layout"))
    }

    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.device.destroy_pipeline_layout(layout, None);
    }

    unsafe fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline> {
        let pipelines = self
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(info), None)
            .map_err(|(_pipelines, e)| GpuError::creation("graphics pipeline")(e))?;
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::creation("graphics pipeline")(vk::Result::ERROR_UNKNOWN))
    }

    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.device.destroy_pipeline(pipeline, None);
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    engine_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Kokoro".to_string(),
            engine_name: "Kokoro".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set the engine name reported to the driver.
    pub fn engine_name(mut self, name: impl Into<String>) -> Self {
        self.engine_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Bootstrap a context presenting to `window`.
    pub fn build(self, window: &impl SurfaceProvider) -> Result<Arc<GpuContext>> {
        let validation = self.enable_validation;

        let extensions = window.required_extensions()?;
        let instance = Instance::new(&self.app_name, &self.engine_name, &extensions, validation)?;
        let messenger = if validation {
            Some(DebugMessenger::new(&instance)?)
        } else {
            None
        };
        let surface = unsafe { Surface::new(instance.entry(), instance.raw(), window)? };

        let mut driver = AshDriver::new(&instance, &surface);
        let boot = bootstrap::run(&mut driver, window.width(), window.height(), validation)?;
        let (device, swapchain) = driver.finish()?;

        let queue = |(family, index): (u32, u32)| unsafe { device.get_device_queue(family, index) };
        let graphics_queue = queue(boot.plan.graphics);
        let compute_queue = queue(boot.plan.compute);
        let transfer_queue = queue(boot.plan.transfer);
        let present_queue = queue(boot.plan.present);

        let allocator = match unsafe { GpuAllocator::new(instance.raw(), &device, boot.adapter.handle) }
        {
            Ok(allocator) => allocator,
            Err(e) => {
                drop(swapchain);
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };

        tracing::info!(
            "GPU context ready: {:?} {:?}, {}x{}, queue families {:?}",
            boot.swapchain.surface_format.format,
            boot.swapchain.present_mode,
            boot.swapchain.extent.width,
            boot.swapchain.extent.height,
            boot.plan.unique_families
        );

        Ok(Arc::new(GpuContext {
            swapchain: Some(swapchain),
            allocator: Mutex::new(allocator),
            device,
            families: boot.families,
            unique_families: boot.plan.unique_families,
            features: boot.features,
            graphics_queue,
            compute_queue,
            transfer_queue,
            present_queue,
            surface_format: boot.swapchain.surface_format,
            present_mode: boot.swapchain.present_mode,
            extent: boot.swapchain.extent,
            validation,
            adapter: boot.adapter,
            messenger,
            surface,
            instance,
        }))
    }
}
