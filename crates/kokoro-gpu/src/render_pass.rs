//! Render passes: attachments, subpasses and the dependencies between them.

use crate::backend::SharedDevice;
use crate::error::{GpuError, Result};
use crate::formats::ImageFormat;
use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthAttachmentOptimal,
    DepthReadOnlyOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    Preinitialized,
    PresentSrc,
}

impl ImageLayout {
    /// Depth layouts use the combined depth/stencil variants, which need no
    /// extension on Vulkan 1.1.
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::General => vk::ImageLayout::GENERAL,
            Self::ColorAttachmentOptimal => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthAttachmentOptimal => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::DepthReadOnlyOptimal => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            Self::ShaderReadOnlyOptimal => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::TransferSrcOptimal => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::TransferDstOptimal => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::Preinitialized => vk::ImageLayout::PREINITIALIZED,
            Self::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    Load,
    Clear,
    #[default]
    DontCare,
}

impl LoadOp {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::AttachmentLoadOp {
        match self {
            Self::Load => vk::AttachmentLoadOp::LOAD,
            Self::Clear => vk::AttachmentLoadOp::CLEAR,
            Self::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    #[default]
    Store,
    DontCare,
}

impl StoreOp {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::AttachmentStoreOp {
        match self {
            Self::Store => vk::AttachmentStoreOp::STORE,
            Self::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachmentInfo {
    pub format: ImageFormat,
    pub load: LoadOp,
    pub store: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

impl AttachmentInfo {
    fn description(&self) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(self.format.to_vk())
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(self.load.to_vk())
            .store_op(self.store.to_vk())
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(self.initial_layout.to_vk())
            .final_layout(self.final_layout.to_vk())
    }
}

/// An attachment index and the layout it is used in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentRef {
    pub index: u32,
    pub layout: ImageLayout,
}

impl AttachmentRef {
    /// Reference to attachment `index` in `layout`.
    pub fn new(index: u32, layout: ImageLayout) -> Self {
        Self { index, layout }
    }

    fn to_vk(self) -> vk::AttachmentReference {
        vk::AttachmentReference {
            attachment: self.index,
            layout: self.layout.to_vk(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubpassInfo {
    pub input: Vec<AttachmentRef>,
    pub color: Vec<AttachmentRef>,
    pub preserve: Vec<u32>,
    pub depth: Option<AttachmentRef>,
}

/// Execution and memory dependency between two subpasses. `None` stands for
/// the commands outside the render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubpassDependency {
    pub src: Option<u32>,
    pub dst: Option<u32>,
    pub src_stages: vk::PipelineStageFlags,
    pub dst_stages: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub flags: vk::DependencyFlags,
}

impl SubpassDependency {
    fn to_vk(self) -> vk::SubpassDependency {
        vk::SubpassDependency {
            src_subpass: self.src.unwrap_or(vk::SUBPASS_EXTERNAL),
            dst_subpass: self.dst.unwrap_or(vk::SUBPASS_EXTERNAL),
            src_stage_mask: self.src_stages,
            dst_stage_mask: self.dst_stages,
            src_access_mask: self.src_access,
            dst_access_mask: self.dst_access,
            dependency_flags: self.flags,
        }
    }
}

pub struct RenderPass {
    device: SharedDevice,
    attachments: Vec<AttachmentInfo>,
    subpasses: Vec<SubpassInfo>,
    dependencies: Vec<SubpassDependency>,
    render_pass: Option<vk::RenderPass>,
}

impl RenderPass {
    /// Empty render pass on `device`.
    pub fn new(device: SharedDevice) -> Self {
        Self {
            device,
            attachments: Vec::new(),
            subpasses: Vec::new(),
            dependencies: Vec::new(),
            render_pass: None,
        }
    }

    fn unlocked(&mut self) -> Result<&mut Self> {
        if self.is_built() {
            return Err(GpuError::Locked("RenderPass"));
        }
        Ok(self)
    }

    /// Append an attachment description.
    pub fn add_attachment(&mut self, attachment: AttachmentInfo) -> Result<&mut Self> {
        let this = self.unlocked()?;
        this.attachments.push(attachment);
        Ok(this)
    }

    /// Append a subpass.
    pub fn add_subpass(&mut self, subpass: SubpassInfo) -> Result<&mut Self> {
        let this = self.unlocked()?;
        this.subpasses.push(subpass);
        Ok(this)
    }

    /// Append a subpass dependency.
    pub fn add_dependency(&mut self, dependency: SubpassDependency) -> Result<&mut Self> {
        let this = self.unlocked()?;
        this.dependencies.push(dependency);
        Ok(this)
    }

    /// Attachments in index order.
    pub fn attachments(&self) -> &[AttachmentInfo] {
        &self.attachments
    }

    /// Number of subpasses added.
    pub fn subpass_count(&self) -> usize {
        self.subpasses.len()
    }

    /// Color attachments written by `subpass`.
    pub fn color_attachment_count(&self, subpass: u32) -> Result<usize> {
        GpuError::check_index("subpass", subpass as usize, self.subpasses.len())?;
        Ok(self.subpasses[subpass as usize].color.len())
    }

    /// Whether `build` has succeeded.
    pub fn is_built(&self) -> bool {
        self.render_pass.is_some()
    }

    /// Create the native render pass. Does nothing if already built.
    pub fn build(&mut self) -> Result<()> {
        if self.render_pass.is_some() {
            return Ok(());
        }

        let attachments: Vec<_> = self.attachments.iter().map(AttachmentInfo::description).collect();

        // Reference arrays must outlive the descriptions pointing at them.
        let refs: Vec<_> = self
            .subpasses
            .iter()
            .map(|subpass| {
                let input: Vec<_> = subpass.input.iter().map(|r| r.to_vk()).collect();
                let color: Vec<_> = subpass.color.iter().map(|r| r.to_vk()).collect();
                let depth = subpass.depth.map(AttachmentRef::to_vk);
                (input, color, depth)
            })
            .collect();

        let subpasses: Vec<_> = refs
            .iter()
            .zip(&self.subpasses)
            .map(|((input, color, depth), info)| {
                let description = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(input)
                    .color_attachments(color)
                    .preserve_attachments(&info.preserve);
                match depth {
                    Some(depth) => description.depth_stencil_attachment(depth),
                    None => description,
                }
            })
            .collect();

        let dependencies: Vec<_> = self.dependencies.iter().map(|d| d.to_vk()).collect();

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        let render_pass = unsafe { self.device.create_render_pass(&info)? };
        tracing::debug!(
            "Built render pass {:?}: {} attachments, {} subpasses",
            render_pass,
            attachments.len(),
            subpasses.len()
        );

        self.render_pass = Some(render_pass);
        Ok(())
    }

    /// The Vulkan render pass.
    pub fn handle(&self) -> Result<vk::RenderPass> {
        self.render_pass.ok_or(GpuError::NotBuilt("RenderPass"))
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        if let Some(render_pass) = self.render_pass.take() {
            unsafe { self.device.destroy_render_pass(render_pass) };
        }
    }
}

#[cfg(test)]
pub(crate) fn test_render_pass(device: SharedDevice, color_attachments: u32) -> RenderPass {
    let mut pass = RenderPass::new(device);
    let mut subpass = SubpassInfo::default();
    for index in 0..color_attachments {
        pass.add_attachment(AttachmentInfo {
            format: ImageFormat::B8G8R8A8Unorm,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            initial_layout: ImageLayout::Undefined,
            final_layout: ImageLayout::PresentSrc,
        })
        .unwrap();
        subpass
            .color
            .push(AttachmentRef::new(index, ImageLayout::ColorAttachmentOptimal));
    }
    pass.add_subpass(subpass).unwrap();
    pass
}
