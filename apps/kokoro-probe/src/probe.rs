//! Window handler that bootstraps the context and builds sample resources.

use std::sync::Arc;

use ash::vk;
use kokoro_gpu::{
    AttachmentInfo, AttachmentRef, Buffer, BufferDesc, BufferUsage, DescriptorSet,
    DescriptorType, GpuContext, GpuContextBuilder, GraphicsPipeline, GraphicsPipelineConfig,
    Image, ImageDesc, ImageFormat, ImageLayout, ImageUsage, ImageView, ImageViewDesc, LoadOp,
    MemoryUsage, RenderPass, Sampler, SamplerDesc, ShaderModule, ShaderStages, SharedDevice,
    StoreOp, SubpassDependency, SubpassInfo, WindowSurface,
};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowId};

use crate::ProbeConfig;

/// Resources built against the context. Kept alive until the window closes.
struct Resources {
    _pipeline: Option<GraphicsPipeline>,
    _descriptors: Vec<DescriptorSet>,
    _render_pass: RenderPass,
    _sampler: Sampler,
    _view: ImageView,
    _image: Image,
    _uniforms: Buffer,
}

struct ProbeState {
    _resources: Resources,
    gpu: Arc<GpuContext>,
    _window: Window,
}

pub struct Probe {
    config: ProbeConfig,
    state: Option<ProbeState>,
    failure: Option<anyhow::Error>,
}

impl Probe {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            state: None,
            failure: None,
        }
    }

    /// The first error hit while probing, if any.
    pub fn into_result(self) -> anyhow::Result<()> {
        self.failure.map_or(Ok(()), Err)
    }

    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<ProbeState> {
        let attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = event_loop.create_window(attrs)?;
        let size = window.inner_size();

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build(&WindowSurface::new(&window, size.width, size.height))?;

        let adapter = gpu.adapter();
        info!("GPU: {}", adapter.summary());
        info!(
            "Queues: {:?}, unique families {:?}",
            gpu.families(),
            gpu.unique_families()
        );
        info!(
            "Swapchain: {} images, {:?} {:?}, {:?}, {}x{}",
            gpu.swapchain_images().len(),
            gpu.surface_format().format,
            gpu.surface_format().color_space,
            gpu.present_mode(),
            gpu.extent().width,
            gpu.extent().height
        );

        let resources = build_resources(&gpu, &self.config)?;
        Ok(ProbeState {
            _resources: resources,
            gpu,
            _window: window,
        })
    }
}

fn build_resources(gpu: &Arc<GpuContext>, config: &ProbeConfig) -> anyhow::Result<Resources> {
    let device: SharedDevice = gpu.shared();
    let frames = gpu.swapchain_images().len().max(1);

    let mut uniforms = Buffer::allocate(
        device.clone(),
        BufferDesc {
            size: 256,
            usage: BufferUsage::UNIFORM | BufferUsage::UNIFORM_TEXEL,
            memory: MemoryUsage::CpuToGpu,
            name: "probe uniforms".to_string(),
            ..Default::default()
        },
    )?;
    let extent = gpu.extent();
    uniforms.write(0, &[extent.width as f32, extent.height as f32, 0.0, 1.0])?;
    uniforms.flush(0, 16)?;
    uniforms.build_view(ImageFormat::R32Sfloat, 0, 256)?;

    let mut image = Image::new(
        device.clone(),
        ImageDesc {
            width: 256,
            height: 256,
            levels: 1,
            usage: ImageUsage::SAMPLED | ImageUsage::STORAGE | ImageUsage::TRANSFER_DST,
            name: "probe texture".to_string(),
            ..Default::default()
        },
    );
    image.build()?;

    let mut view = ImageView::new(device.clone(), ImageViewDesc::default());
    view.build(&image)?;

    let mut sampler = Sampler::new(
        device.clone(),
        SamplerDesc {
            linear_filter: true,
            max_lod: 1.0,
            anisotropic_samples: if gpu.adapter().sampler_anisotropy { 4.0 } else { 0.0 },
            ..Default::default()
        },
    );
    sampler.build()?;

    // Pools hold one descriptor per declared binding, so each frame gets its own.
    let mut descriptors = Vec::with_capacity(frames);
    for _ in 0..frames {
        let mut set = DescriptorSet::new(device.clone());
        set.add(0, DescriptorType::UniformBuffer, 1, ShaderStages::VERTEX)?
            .add(1, DescriptorType::CombinedImageSampler, 1, ShaderStages::FRAGMENT)?
            .add(2, DescriptorType::StorageImage, 1, ShaderStages::FRAGMENT)?
            .add(3, DescriptorType::UniformTexelBuffer, 1, ShaderStages::FRAGMENT)?;
        set.build(1)?;
        set.set_buffer(0, 0, 0, &uniforms, 0, 16)?;
        set.set_combined_image_sampler(0, 1, 0, &view, &sampler)?;
        set.set_storage_image(0, 2, 0, &view)?;
        set.set_texel_buffer(0, 3, 0, &uniforms)?;
        descriptors.push(set);
    }
    info!("Descriptor sets: {}", descriptors.len());

    let surface_format = gpu.surface_format().format;
    let color_format = ImageFormat::from_vk(surface_format)
        .ok_or_else(|| anyhow::anyhow!("Unsupported surface format {surface_format:?}"))?;

    let mut render_pass = RenderPass::new(device.clone());
    render_pass
        .add_attachment(AttachmentInfo {
            format: color_format,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            initial_layout: ImageLayout::Undefined,
            final_layout: ImageLayout::PresentSrc,
        })?
        .add_subpass(SubpassInfo {
            color: vec![AttachmentRef::new(0, ImageLayout::ColorAttachmentOptimal)],
            ..Default::default()
        })?
        .add_dependency(SubpassDependency {
            src: None,
            dst: Some(0),
            src_stages: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stages: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        })?;
    render_pass.build()?;

    let pipeline = match (&config.vertex_shader, &config.fragment_shader, descriptors.first()) {
        (Some(vertex), Some(fragment), Some(layout_source)) => {
            let vertex = Arc::new(ShaderModule::from_file(
                device.clone(),
                ShaderStages::VERTEX,
                vertex,
            )?);
            let fragment = Arc::new(ShaderModule::from_file(
                device.clone(),
                ShaderStages::FRAGMENT,
                fragment,
            )?);

            let mut pipeline = GraphicsPipeline::new(device, GraphicsPipelineConfig::default());
            pipeline
                .set_shader(vertex.specialize(None)?)?
                .set_shader(fragment.specialize(None)?)?
                .add_descriptor_set(layout_source)?
                .set_render_pass(&render_pass, 0)?;
            pipeline.build(extent.width, extent.height)?;
            info!("Graphics pipeline built");
            Some(pipeline)
        }
        _ => {
            info!("No shaders given, skipping graphics pipeline");
            None
        }
    };

    Ok(Resources {
        _pipeline: pipeline,
        _descriptors: descriptors,
        _render_pass: render_pass,
        _sampler: sampler,
        _view: view,
        _image: image,
        _uniforms: uniforms,
    })
}

impl ApplicationHandler for Probe {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                info!("Probe complete");
                self.state = Some(state);
                if self.config.exit_after {
                    event_loop.exit();
                }
            }
            Err(e) => {
                error!("Probe failed: {e}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let WindowEvent::CloseRequested = event {
            info!("Close requested");
            if let Some(state) = self.state.take() {
                if let Err(e) = state.gpu.wait_idle() {
                    error!("Wait idle failed: {e}");
                }
            }
            event_loop.exit();
        }
    }
}
