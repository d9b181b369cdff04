//! Graphics pipeline creation.

use crate::backend::SharedDevice;
use crate::descriptors::DescriptorSet;
use crate::error::{GpuError, Result};
use crate::flags::ShaderStages;
use crate::render_pass::RenderPass;
use crate::shader::SpecializedShaderModule;
use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TopologyType {
    #[default]
    Triangle,
    TriangleStrip,
    Line,
    LineStrip,
    Point,
}

impl TopologyType {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            Self::Triangle => vk::PrimitiveTopology::TRIANGLE_LIST,
            Self::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            Self::Line => vk::PrimitiveTopology::LINE_LIST,
            Self::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            Self::Point => vk::PrimitiveTopology::POINT_LIST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    Back,
    Front,
    #[default]
    None,
    All,
}

impl CullMode {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            Self::Back => vk::CullModeFlags::BACK,
            Self::Front => vk::CullModeFlags::FRONT,
            Self::None => vk::CullModeFlags::NONE,
            Self::All => vk::CullModeFlags::FRONT_AND_BACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Fill,
    Line,
    Point,
}

impl FillMode {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            Self::Fill => vk::PolygonMode::FILL,
            Self::Line => vk::PolygonMode::LINE,
            Self::Point => vk::PolygonMode::POINT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    One,
    Zero,
    SourceAlpha,
    OneMinusSourceAlpha,
}

impl BlendFactor {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::BlendFactor {
        match self {
            Self::One => vk::BlendFactor::ONE,
            Self::Zero => vk::BlendFactor::ZERO,
            Self::SourceAlpha => vk::BlendFactor::SRC_ALPHA,
            Self::OneMinusSourceAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOp {
    #[default]
    Add,
}

impl BlendOp {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::BlendOp {
        match self {
            Self::Add => vk::BlendOp::ADD,
        }
    }
}

/// `src * src_factor <op> dst * dst_factor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendEquation {
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub op: BlendOp,
}

impl Default for BlendEquation {
    /// Standard alpha blending.
    fn default() -> Self {
        Self {
            src: BlendFactor::SourceAlpha,
            dst: BlendFactor::OneMinusSourceAlpha,
            op: BlendOp::Add,
        }
    }
}

/// Fixed-function state of a graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphicsPipelineConfig {
    pub topology: TopologyType,
    pub rasterizer_discard: bool,
    pub line_width: f32,
    pub cull: CullMode,
    pub fill: FillMode,
    pub color_blend: BlendEquation,
    pub alpha_blend: BlendEquation,
    pub depth_test: bool,
    pub depth_write: bool,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            topology: TopologyType::Triangle,
            rasterizer_discard: false,
            line_width: 1.0,
            cull: CullMode::None,
            fill: FillMode::Fill,
            color_blend: BlendEquation::default(),
            alpha_blend: BlendEquation::default(),
            depth_test: false,
            depth_write: false,
        }
    }
}

impl GraphicsPipelineConfig {
    /// Blend state shared by every color attachment.
    pub fn blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(true)
            .src_color_blend_factor(self.color_blend.src.to_vk())
            .dst_color_blend_factor(self.color_blend.dst.to_vk())
            .color_blend_op(self.color_blend.op.to_vk())
            .src_alpha_blend_factor(self.alpha_blend.src.to_vk())
            .dst_alpha_blend_factor(self.alpha_blend.dst.to_vk())
            .alpha_blend_op(self.alpha_blend.op.to_vk())
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    }
}

#[derive(Debug, Clone, Copy)]
struct Target {
    render_pass: vk::RenderPass,
    subpass: u32,
    color_attachments: usize,
}

/// A graphics pipeline and its layout.
///
/// Descriptor set layouts and the render pass are referenced, not owned;
/// they must outlive the pipeline.
pub struct GraphicsPipeline {
    device: SharedDevice,
    config: GraphicsPipelineConfig,
    stages: Vec<SpecializedShaderModule>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    push_constants: Vec<vk::PushConstantRange>,
    target: Option<Target>,
    built: Option<(vk::Pipeline, vk::PipelineLayout)>,
}

impl GraphicsPipeline {
    /// Pipeline with `config`, no stages and no render pass.
    pub fn new(device: SharedDevice, config: GraphicsPipelineConfig) -> Self {
        Self {
            device,
            config,
            stages: Vec::new(),
            set_layouts: Vec::new(),
            push_constants: Vec::new(),
            target: None,
            built: None,
        }
    }

    fn unlocked(&mut self) -> Result<&mut Self> {
        if self.is_built() {
            return Err(GpuError::Locked("GraphicsPipeline"));
        }
        Ok(self)
    }

    /// Fixed-function configuration.
    pub fn config(&self) -> &GraphicsPipelineConfig {
        &self.config
    }

    /// Mutable configuration. Fails with `Locked` once built.
    pub fn config_mut(&mut self) -> Result<&mut GraphicsPipelineConfig> {
        Ok(&mut self.unlocked()?.config)
    }

    /// Append a shader stage. Stages keep the order they were added in.
    pub fn set_shader(&mut self, stage: SpecializedShaderModule) -> Result<&mut Self> {
        let this = self.unlocked()?;
        this.stages.push(stage);
        Ok(this)
    }

    /// Append the layout of `set` to the pipeline layout.
    pub fn add_descriptor_set(&mut self, set: &DescriptorSet) -> Result<&mut Self> {
        let layout = set.layout()?;
        let this = self.unlocked()?;
        this.set_layouts.push(layout);
        Ok(this)
    }

    /// Append a push-constant range.
    pub fn add_push_constant(
        &mut self,
        stages: ShaderStages,
        offset: u32,
        size: u32,
    ) -> Result<&mut Self> {
        let this = self.unlocked()?;
        this.push_constants.push(vk::PushConstantRange {
            stage_flags: stages.to_vk(),
            offset,
            size,
        });
        Ok(this)
    }

    /// Render into `subpass` of `render_pass`, which must be built.
    pub fn set_render_pass(&mut self, render_pass: &RenderPass, subpass: u32) -> Result<&mut Self> {
        let target = Target {
            render_pass: render_pass.handle()?,
            subpass,
            color_attachments: render_pass.color_attachment_count(subpass)?,
        };
        let this = self.unlocked()?;
        this.target = Some(target);
        Ok(this)
    }

    /// Number of shader stages set.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Whether `build` has succeeded.
    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// Create the pipeline layout and pipeline for a `width` x `height`
    /// framebuffer. Does nothing if already built.
    pub fn build(&mut self, width: u32, height: u32) -> Result<()> {
        if self.built.is_some() {
            return Ok(());
        }
        let target = self.target.ok_or_else(|| {
            GpuError::InvalidState("Graphics pipeline has no render pass".to_string())
        })?;
        if self.stages.is_empty() {
            return Err(GpuError::InvalidState(
                "Graphics pipeline has no shader stages".to_string(),
            ));
        }

        let specializations: Vec<_> = self
            .stages
            .iter()
            .map(SpecializedShaderModule::specialization_info)
            .collect();
        let stages: Vec<_> = self
            .stages
            .iter()
            .zip(&specializations)
            .map(|(stage, specialization)| stage.stage_info(specialization.as_ref()))
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.config.topology.to_vk())
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width, height },
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(self.config.rasterizer_discard)
            .polygon_mode(self.config.fill.to_vk())
            .line_width(self.config.line_width)
            .cull_mode(self.config.cull.to_vk())
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false)
            .min_sample_shading(1.0);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.config.depth_test)
            .depth_write_enable(self.config.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachments = vec![self.config.blend_attachment(); target.color_attachments];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&self.set_layouts)
            .push_constant_ranges(&self.push_constants);
        let layout = unsafe { self.device.create_pipeline_layout(&layout_info)? };

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(target.render_pass)
            .subpass(target.subpass);

        let pipeline = match unsafe { self.device.create_graphics_pipeline(&info) } {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe { self.device.destroy_pipeline_layout(layout) };
                return Err(e);
            }
        };
        tracing::debug!(
            "Built graphics pipeline {:?}: {} stages, {}x{}",
            pipeline,
            stages.len(),
            width,
            height
        );

        self.built = Some((pipeline, layout));
        Ok(())
    }

    /// The Vulkan pipeline.
    pub fn pipeline(&self) -> Result<vk::Pipeline> {
        self.built
            .map(|(pipeline, _)| pipeline)
            .ok_or(GpuError::NotBuilt("GraphicsPipeline"))
    }

    /// The pipeline layout.
    pub fn layout(&self) -> Result<vk::PipelineLayout> {
        self.built
            .map(|(_, layout)| layout)
            .ok_or(GpuError::NotBuilt("GraphicsPipeline"))
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        if let Some((pipeline, layout)) = self.built.take() {
            unsafe {
                self.device.destroy_pipeline(pipeline);
                self.device.destroy_pipeline_layout(layout);
            }
            tracing::debug!("Destroyed graphics pipeline {:?}", pipeline);
        }
    }
}
