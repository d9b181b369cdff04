//! The device seam every resource object builds against.

use crate::error::Result;
use crate::formats::MemoryUsage;
use crate::memory::Allocation;
use ash::vk;
use std::sync::Arc;

/// Device handle shared by all resources built from one context.
///
/// Each resource keeps a clone, so the device outlives everything built on it.
pub type SharedDevice = Arc<dyn DeviceBackend>;

/// Native object creation and destruction on a logical device.
///
/// `GpuContext` implements this with `ash`. Every `create_*` has exactly one
/// matching `destroy_*`; calling a destroy twice for the same handle is a
/// caller error.
///
/// # Safety
/// All methods forward to the driver. Create infos must only reference live
/// handles of this device, and destroyed handles must no longer be in use by
/// the GPU.
pub trait DeviceBackend: Send + Sync {
    /// Deduplicated queue-family indices gathered at bootstrap.
    fn queue_families(&self) -> &[u32];

    /// Whether `subgroupSizeControl` was enabled on the device.
    fn subgroup_size_control(&self) -> bool;

    /// Whether `computeFullSubgroups` was enabled on the device.
    fn compute_full_subgroups(&self) -> bool;

    unsafe fn create_buffer(
        &self,
        info: &vk::BufferCreateInfo<'_>,
        usage: MemoryUsage,
        name: &str,
    ) -> Result<(vk::Buffer, Allocation)>;
    unsafe fn destroy_buffer(&self, buffer: vk::Buffer, allocation: Allocation);

    unsafe fn create_image(
        &self,
        info: &vk::ImageCreateInfo<'_>,
        usage: MemoryUsage,
        name: &str,
    ) -> Result<(vk::Image, Allocation)>;
    unsafe fn destroy_image(&self, image: vk::Image, allocation: Allocation);

    /// Make host writes to `[offset, offset + size)` of `allocation` visible
    /// to the device.
    unsafe fn flush_mapped_range(
        &self,
        allocation: &Allocation,
        offset: u64,
        size: u64,
    ) -> Result<()>;

    unsafe fn create_buffer_view(&self, info: &vk::BufferViewCreateInfo<'_>)
        -> Result<vk::BufferView>;
    unsafe fn destroy_buffer_view(&self, view: vk::BufferView);

    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> Result<vk::ImageView>;
    unsafe fn destroy_image_view(&self, view: vk::ImageView);

    unsafe fn create_sampler(&self, info: &vk::SamplerCreateInfo<'_>) -> Result<vk::Sampler>;
    unsafe fn destroy_sampler(&self, sampler: vk::Sampler);

    unsafe fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> Result<vk::DescriptorSetLayout>;
    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    unsafe fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> Result<vk::DescriptorPool>;
    /// Destroys the pool together with every set allocated from it.
    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> Result<Vec<vk::DescriptorSet>>;

    /// One native update call covering all of `writes`.
    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]);

    unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> Result<vk::ShaderModule>;
    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule);

    unsafe fn create_render_pass(&self, info: &vk::RenderPassCreateInfo<'_>)
        -> Result<vk::RenderPass>;
    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> Result<vk::PipelineLayout>;
    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    unsafe fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline>;
    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline);
}
