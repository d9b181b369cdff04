//! Recording device and scripted bootstrap driver for unit tests.

use crate::backend::{DeviceBackend, SharedDevice};
use crate::bootstrap::{BootstrapDriver, EnabledFeatures};
use crate::capabilities::AdapterInfo;
use crate::error::{GpuError, Result};
use crate::formats::MemoryUsage;
use crate::memory::Allocation;
use crate::queues::{QueuePlan, QueueRequest};
use crate::swapchain::SwapchainRequest;
use ash::vk::{self, Handle};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::ffi::CStr;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// View a raw `(pointer, count)` pair from a create info as a slice.
unsafe fn raw_slice<'a, T>(ptr: *const T, len: u32) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr, len as usize)
    }
}

#[derive(Debug, Clone)]
pub struct BufferRecord {
    pub handle: vk::Buffer,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub sharing: vk::SharingMode,
    pub families: Vec<u32>,
    pub memory: MemoryUsage,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub handle: vk::Image,
    pub flags: vk::ImageCreateFlags,
    pub image_type: vk::ImageType,
    pub sharing: vk::SharingMode,
    pub families: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct ViewRecord {
    pub image: vk::Image,
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    pub range: vk::ImageSubresourceRange,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferViewRecord {
    pub buffer: vk::Buffer,
    pub format: vk::Format,
    pub offset: u64,
    pub range: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteRecord {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub array_element: u32,
    pub ty: vk::DescriptorType,
    pub image_layout: Option<vk::ImageLayout>,
    pub sampler: Option<vk::Sampler>,
    pub buffer: Option<(vk::Buffer, u64, u64)>,
    pub texel_view: Option<vk::BufferView>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderPassRecord {
    pub attachments: usize,
    /// (input, color, preserve, has depth) per subpass.
    pub subpasses: Vec<(usize, usize, usize, bool)>,
    /// (src, dst) per dependency.
    pub dependencies: Vec<(u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct StageRecord {
    pub stage: vk::ShaderStageFlags,
    pub flags: vk::PipelineShaderStageCreateFlags,
    pub entry_point: String,
    /// Specialization data size and entry count, when attached.
    pub specialization: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
pub struct PipelineRecord {
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub stages: Vec<StageRecord>,
    pub topology: vk::PrimitiveTopology,
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
    pub rasterizer_discard: bool,
    pub line_width: f32,
    pub cull_mode: vk::CullModeFlags,
    pub polygon_mode: vk::PolygonMode,
    pub samples: vk::SampleCountFlags,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub vertex_attributes: u32,
}

/// Everything the mock device has been asked to do.
#[derive(Debug, Default)]
pub struct MockLog {
    pub created: HashMap<&'static str, usize>,
    pub destroyed: HashMap<&'static str, usize>,
    pub buffers: Vec<BufferRecord>,
    pub images: Vec<ImageRecord>,
    pub image_views: Vec<ViewRecord>,
    pub buffer_views: Vec<BufferViewRecord>,
    pub samplers: usize,
    pub flushes: Vec<(u64, u64)>,
    pub layout_bindings: Vec<Vec<(u32, vk::DescriptorType, u32, vk::ShaderStageFlags)>>,
    pub pool_sizes: Vec<(u32, Vec<(vk::DescriptorType, u32)>)>,
    pub set_allocations: Vec<usize>,
    pub update_calls: usize,
    pub writes: Vec<WriteRecord>,
    pub shader_words: Vec<usize>,
    pub render_passes: Vec<RenderPassRecord>,
    /// (set layouts, push-constant ranges) per pipeline layout.
    pub pipeline_layouts: Vec<(usize, usize)>,
    pub pipelines: Vec<PipelineRecord>,
}

impl MockLog {
    pub fn created(&self, kind: &str) -> usize {
        self.created.get(kind).copied().unwrap_or(0)
    }

    pub fn destroyed(&self, kind: &str) -> usize {
        self.destroyed.get(kind).copied().unwrap_or(0)
    }
}

/// [`DeviceBackend`] that hands out fake handles and records every call.
///
/// Host-visible buffers are backed by real host memory so mapping and
/// writing can be checked.
pub struct MockDevice {
    families: Vec<u32>,
    subgroup_size_control: bool,
    compute_full_subgroups: bool,
    next_handle: AtomicU64,
    log: Mutex<MockLog>,
    memory: Mutex<HashMap<u64, Box<[u8]>>>,
    pub fail_next_create: Mutex<bool>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_families(vec![0])
    }

    pub fn with_families(families: Vec<u32>) -> Self {
        Self {
            families,
            subgroup_size_control: true,
            compute_full_subgroups: true,
            next_handle: AtomicU64::new(0x1000),
            log: Mutex::new(MockLog::default()),
            memory: Mutex::new(HashMap::new()),
            fail_next_create: Mutex::new(false),
        }
    }

    /// The mock plus the same object as a [`SharedDevice`].
    pub fn pair() -> (Arc<Self>, SharedDevice) {
        Self::new().into_pair()
    }

    pub fn into_pair(self) -> (Arc<Self>, SharedDevice) {
        let mock = Arc::new(self);
        let device: SharedDevice = mock.clone();
        (mock, device)
    }

    /// Report the subgroup-size-control features as enabled or not.
    pub fn with_subgroup_features(mut self, size_control: bool, full_subgroups: bool) -> Self {
        self.subgroup_size_control = size_control;
        self.compute_full_subgroups = full_subgroups;
        self
    }

    pub fn log(&self) -> MutexGuard<'_, MockLog> {
        self.log.lock()
    }

    /// Current bytes behind a host-visible buffer.
    pub fn buffer_bytes(&self, buffer: vk::Buffer) -> Vec<u8> {
        self.memory
            .lock()
            .get(&buffer.as_raw())
            .map(|bytes| bytes.to_vec())
            .unwrap_or_default()
    }

    fn handle<T: Handle>(&self, kind: &'static str) -> Result<T> {
        let mut fail = self.fail_next_create.lock();
        if *fail {
            *fail = false;
            return Err(GpuError::creation(kind)(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        *self.log.lock().created.entry(kind).or_default() += 1;
        Ok(T::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed)))
    }

    fn destroy(&self, kind: &'static str) {
        *self.log.lock().destroyed.entry(kind).or_default() += 1;
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for MockDevice {
    fn queue_families(&self) -> &[u32] {
        &self.families
    }

    fn subgroup_size_control(&self) -> bool {
        self.subgroup_size_control
    }

    fn compute_full_subgroups(&self) -> bool {
        self.compute_full_subgroups
    }

    unsafe fn create_buffer(
        &self,
        info: &vk::BufferCreateInfo<'_>,
        usage: MemoryUsage,
        name: &str,
    ) -> Result<(vk::Buffer, Allocation)> {
        let buffer: vk::Buffer = self.handle("buffer")?;
        let memory = vk::DeviceMemory::from_raw(buffer.as_raw());

        let mapped = if usage.is_host_visible() {
            let mut backing = vec![0u8; info.size as usize].into_boxed_slice();
            let ptr = NonNull::new(backing.as_mut_ptr());
            self.memory.lock().insert(buffer.as_raw(), backing);
            ptr
        } else {
            None
        };

        self.log.lock().buffers.push(BufferRecord {
            handle: buffer,
            size: info.size,
            usage: info.usage,
            sharing: info.sharing_mode,
            families: raw_slice(info.p_queue_family_indices, info.queue_family_index_count)
                .to_vec(),
            memory: usage,
            name: name.to_string(),
        });

        Ok((buffer, Allocation::from_parts(memory, 0, info.size, mapped)))
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer, _allocation: Allocation) {
        self.memory.lock().remove(&buffer.as_raw());
        self.destroy("buffer");
    }

    unsafe fn create_image(
        &self,
        info: &vk::ImageCreateInfo<'_>,
        _usage: MemoryUsage,
        _name: &str,
    ) -> Result<(vk::Image, Allocation)> {
        let image: vk::Image = self.handle("image")?;
        self.log.lock().images.push(ImageRecord {
            handle: image,
            flags: info.flags,
            image_type: info.image_type,
            sharing: info.sharing_mode,
            families: raw_slice(info.p_queue_family_indices, info.queue_family_index_count)
                .to_vec(),
        });
        let memory = vk::DeviceMemory::from_raw(image.as_raw());
        Ok((image, Allocation::from_parts(memory, 0, 0, None)))
    }

    unsafe fn destroy_image(&self, _image: vk::Image, _allocation: Allocation) {
        self.destroy("image");
    }

    unsafe fn flush_mapped_range(
        &self,
        allocation: &Allocation,
        offset: u64,
        size: u64,
    ) -> Result<()> {
        self.log.lock().flushes.push((allocation.offset() + offset, size));
        Ok(())
    }

    unsafe fn create_buffer_view(
        &self,
        info: &vk::BufferViewCreateInfo<'_>,
    ) -> Result<vk::BufferView> {
        let view = self.handle("buffer view")?;
        self.log.lock().buffer_views.push(BufferViewRecord {
            buffer: info.buffer,
            format: info.format,
            offset: info.offset,
            range: info.range,
        });
        Ok(view)
    }

    unsafe fn destroy_buffer_view(&self, _view: vk::BufferView) {
        self.destroy("buffer view");
    }

    unsafe fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> Result<vk::ImageView> {
        let view = self.handle("image view")?;
        self.log.lock().image_views.push(ViewRecord {
            image: info.image,
            view_type: info.view_type,
            format: info.format,
            range: info.subresource_range,
        });
        Ok(view)
    }

    unsafe fn destroy_image_view(&self, _view: vk::ImageView) {
        self.destroy("image view");
    }

    unsafe fn create_sampler(&self, _info: &vk::SamplerCreateInfo<'_>) -> Result<vk::Sampler> {
        let sampler = self.handle("sampler")?;
        self.log.lock().samplers += 1;
        Ok(sampler)
    }

    unsafe fn destroy_sampler(&self, _sampler: vk::Sampler) {
        self.destroy("sampler");
    }

    unsafe fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> Result<vk::DescriptorSetLayout> {
        let layout = self.handle("descriptor set layout")?;
        let bindings = raw_slice(info.p_bindings, info.binding_count)
            .iter()
            .map(|b| (b.binding, b.descriptor_type, b.descriptor_count, b.stage_flags))
            .collect();
        self.log.lock().layout_bindings.push(bindings);
        Ok(layout)
    }

    unsafe fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {
        self.destroy("descriptor set layout");
    }

    unsafe fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> Result<vk::DescriptorPool> {
        let pool = self.handle("descriptor pool")?;
        let sizes = raw_slice(info.p_pool_sizes, info.pool_size_count)
            .iter()
            .map(|s| (s.ty, s.descriptor_count))
            .collect();
        self.log.lock().pool_sizes.push((info.max_sets, sizes));
        Ok(pool)
    }

    unsafe fn destroy_descriptor_pool(&self, _pool: vk::DescriptorPool) {
        self.destroy("descriptor pool");
    }

    unsafe fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> Result<Vec<vk::DescriptorSet>> {
        let count = info.descriptor_set_count as usize;
        self.log.lock().set_allocations.push(count);
        (0..count).map(|_| self.handle("descriptor set")).collect()
    }

    unsafe fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        let mut log = self.log.lock();
        log.update_calls += 1;
        for write in writes {
            let image = raw_slice(write.p_image_info, write.descriptor_count).first();
            let buffer = raw_slice(write.p_buffer_info, write.descriptor_count).first();
            let texel = raw_slice(write.p_texel_buffer_view, write.descriptor_count).first();
            log.writes.push(WriteRecord {
                set: write.dst_set,
                binding: write.dst_binding,
                array_element: write.dst_array_element,
                ty: write.descriptor_type,
                image_layout: image.map(|i| i.image_layout),
                sampler: image
                    .map(|i| i.sampler)
                    .filter(|sampler| *sampler != vk::Sampler::null()),
                buffer: buffer.map(|b| (b.buffer, b.offset, b.range)),
                texel_view: texel.copied(),
            });
        }
    }

    unsafe fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> Result<vk::ShaderModule> {
        let module = self.handle("shader module")?;
        self.log.lock().shader_words.push(info.code_size / 4);
        Ok(module)
    }

    unsafe fn destroy_shader_module(&self, _module: vk::ShaderModule) {
        self.destroy("shader module");
    }

    unsafe fn create_render_pass(
        &self,
        info: &vk::RenderPassCreateInfo<'_>,
    ) -> Result<vk::RenderPass> {
        let render_pass = self.handle("render pass")?;
        let record = RenderPassRecord {
            attachments: info.attachment_count as usize,
            subpasses: raw_slice(info.p_subpasses, info.subpass_count)
                .iter()
                .map(|s| {
                    (
                        s.input_attachment_count as usize,
                        s.color_attachment_count as usize,
                        s.preserve_attachment_count as usize,
                        !s.p_depth_stencil_attachment.is_null(),
                    )
                })
                .collect(),
            dependencies: raw_slice(info.p_dependencies, info.dependency_count)
                .iter()
                .map(|d| (d.src_subpass, d.dst_subpass))
                .collect(),
        };
        self.log.lock().render_passes.push(record);
        Ok(render_pass)
    }

    unsafe fn destroy_render_pass(&self, _render_pass: vk::RenderPass) {
        self.destroy("render pass");
    }

    unsafe fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> Result<vk::PipelineLayout> {
        let layout = self.handle("pipeline layout")?;
        self.log.lock().pipeline_layouts.push((
            info.set_layout_count as usize,
            info.push_constant_range_count as usize,
        ));
        Ok(layout)
    }

    unsafe fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {
        self.destroy("pipeline layout");
    }

    unsafe fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> Result<vk::Pipeline> {
        let pipeline = self.handle("pipeline")?;

        let stages = raw_slice(info.p_stages, info.stage_count)
            .iter()
            .map(|stage| StageRecord {
                stage: stage.stage,
                flags: stage.flags,
                entry_point: CStr::from_ptr(stage.p_name).to_string_lossy().into_owned(),
                specialization: stage
                    .p_specialization_info
                    .as_ref()
                    .map(|s| (s.data_size, s.map_entry_count as usize)),
            })
            .collect();

        let input_assembly = &*info.p_input_assembly_state;
        let viewport_state = &*info.p_viewport_state;
        let rasterization = &*info.p_rasterization_state;
        let multisample = &*info.p_multisample_state;
        let color_blend = &*info.p_color_blend_state;
        let depth = info.p_depth_stencil_state.as_ref();
        let dynamic = info.p_dynamic_state.as_ref();
        let vertex_input = &*info.p_vertex_input_state;

        let record = PipelineRecord {
            layout: info.layout,
            render_pass: info.render_pass,
            subpass: info.subpass,
            stages,
            topology: input_assembly.topology,
            viewport: raw_slice(viewport_state.p_viewports, viewport_state.viewport_count)
                .first()
                .copied()
                .unwrap_or_default(),
            scissor: raw_slice(viewport_state.p_scissors, viewport_state.scissor_count)
                .first()
                .copied()
                .unwrap_or_default(),
            rasterizer_discard: rasterization.rasterizer_discard_enable == vk::TRUE,
            line_width: rasterization.line_width,
            cull_mode: rasterization.cull_mode,
            polygon_mode: rasterization.polygon_mode,
            samples: multisample.rasterization_samples,
            depth_test: depth.is_some_and(|d| d.depth_test_enable == vk::TRUE),
            depth_write: depth.is_some_and(|d| d.depth_write_enable == vk::TRUE),
            blend_attachments: raw_slice(color_blend.p_attachments, color_blend.attachment_count)
                .to_vec(),
            dynamic_states: dynamic
                .map(|d| raw_slice(d.p_dynamic_states, d.dynamic_state_count).to_vec())
                .unwrap_or_default(),
            vertex_attributes: vertex_input.vertex_attribute_description_count,
        };
        self.log.lock().pipelines.push(record);
        Ok(pipeline)
    }

    unsafe fn destroy_pipeline(&self, _pipeline: vk::Pipeline) {
        self.destroy("pipeline");
    }
}

/// Scripted [`BootstrapDriver`].
pub struct MockDriver {
    pub adapters: Vec<AdapterInfo>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub devices_created: Vec<vk::PhysicalDevice>,
    pub queue_requests: Vec<Vec<QueueRequest>>,
    pub enabled_features: Vec<EnabledFeatures>,
    pub swapchain_requests: Vec<SwapchainRequest>,
    pub views_created: usize,
    next_handle: u64,
}

impl MockDriver {
    pub fn new(adapters: Vec<AdapterInfo>) -> Self {
        Self {
            adapters,
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: vk::Extent2D {
                    width: 1280,
                    height: 720,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            devices_created: Vec::new(),
            queue_requests: Vec::new(),
            enabled_features: Vec::new(),
            swapchain_requests: Vec::new(),
            views_created: 0,
            next_handle: 0x100,
        }
    }

    fn next<T: Handle>(&mut self) -> T {
        self.next_handle += 1;
        T::from_raw(self.next_handle)
    }
}

impl BootstrapDriver for MockDriver {
    fn enumerate_adapters(&mut self) -> Result<Vec<AdapterInfo>> {
        Ok(self.adapters.clone())
    }

    fn create_device(
        &mut self,
        adapter: &AdapterInfo,
        plan: &QueuePlan,
        features: &EnabledFeatures,
    ) -> Result<()> {
        self.devices_created.push(adapter.handle);
        self.queue_requests.push(plan.requests.clone());
        self.enabled_features.push(*features);
        Ok(())
    }

    fn surface_capabilities(
        &mut self,
        _adapter: &AdapterInfo,
    ) -> Result<vk::SurfaceCapabilitiesKHR> {
        Ok(self.capabilities)
    }

    fn create_swapchain(&mut self, request: &SwapchainRequest) -> Result<Vec<vk::Image>> {
        self.swapchain_requests.push(*request);
        Ok((0..request.image_count).map(|_| self.next()).collect())
    }

    fn create_image_view(
        &mut self,
        _image: vk::Image,
        _format: vk::Format,
    ) -> Result<vk::ImageView> {
        self.views_created += 1;
        Ok(self.next())
    }
}
