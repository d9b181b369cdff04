//! Vulkan device and resource layer for the Kokoro engine.
//!
//! This crate provides:
//! - Adapter selection, logical device and swapchain bootstrap
//! - Memory allocation via gpu-allocator
//! - Build-once resource objects: buffers, images, views, samplers
//! - Descriptor sets, shader modules, render passes and graphics pipelines
//!
//! Resource objects take a [`SharedDevice`] at construction. [`GpuContext`]
//! is the real device; tests substitute a recording one.

pub mod backend;
pub mod bootstrap;
pub mod buffer;
pub mod capabilities;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod flags;
pub mod formats;
pub mod image;
pub mod image_view;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod queues;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod surface;
pub mod swapchain;

#[cfg(test)]
mod testing;

pub use backend::{DeviceBackend, SharedDevice};
pub use buffer::{Buffer, BufferDesc};
pub use capabilities::{AdapterInfo, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{DescriptorSet, DescriptorType};
pub use error::{GpuError, Result};
pub use flags::{BufferUsage, ImageUsage, ShaderStages};
pub use formats::{ImageDimension, ImageFormat, MemoryUsage, SharingMode};
pub use image::{Image, ImageDesc};
pub use image_view::{ImageView, ImageViewDesc, ImageViewType};
pub use memory::Allocation;
pub use pipeline::{
    BlendEquation, BlendFactor, BlendOp, CullMode, FillMode, GraphicsPipeline,
    GraphicsPipelineConfig, TopologyType,
};
pub use render_pass::{
    AttachmentInfo, AttachmentRef, ImageLayout, LoadOp, RenderPass, StoreOp, SubpassDependency,
    SubpassInfo,
};
pub use sampler::{BorderColor, EdgeMode, Sampler, SamplerDesc};
pub use shader::{ShaderModule, SpecializedShaderModule};
pub use surface::{SurfaceProvider, WindowSurface};
