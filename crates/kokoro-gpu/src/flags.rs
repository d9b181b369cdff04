//! Backend-neutral flag sets.
//!
//! Each set is a fixed-width bitset with named bits. Conversion to the Vulkan
//! flag type goes through a small per-set table, so composing with `|` and `&`
//! before conversion behaves exactly like composing the converted flags.

use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// Shader stages a resource or module is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u32 {
        const VERTEX    = 1 << 0;
        const FRAGMENT  = 1 << 1;
        const COMPUTE   = 1 << 2;
        const GEOMETRY  = 1 << 3;
        const TESS_EVAL = 1 << 4;
        const TESS_CTRL = 1 << 5;
    }
}

bitflags! {
    /// Ways a buffer may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const VERTEX        = 1 << 0;
        const INDEX         = 1 << 1;
        const UNIFORM       = 1 << 2;
        const STORAGE       = 1 << 3;
        const INDIRECT      = 1 << 4;
        const TRANSFER_SRC  = 1 << 5;
        const TRANSFER_DST  = 1 << 6;
        const UNIFORM_TEXEL = 1 << 7;
        const STORAGE_TEXEL = 1 << 8;
    }
}

bitflags! {
    /// Ways an image may be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsage: u32 {
        const SAMPLED          = 1 << 0;
        const TRANSFER_DST     = 1 << 1;
        const STORAGE          = 1 << 2;
        const TRANSFER_SRC     = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_ATTACHMENT = 1 << 5;
    }
}

const SHADER_STAGE_TABLE: [(ShaderStages, vk::ShaderStageFlags); 6] = [
    (ShaderStages::VERTEX, vk::ShaderStageFlags::VERTEX),
    (ShaderStages::FRAGMENT, vk::ShaderStageFlags::FRAGMENT),
    (ShaderStages::COMPUTE, vk::ShaderStageFlags::COMPUTE),
    (ShaderStages::GEOMETRY, vk::ShaderStageFlags::GEOMETRY),
    (
        ShaderStages::TESS_EVAL,
        vk::ShaderStageFlags::TESSELLATION_EVALUATION,
    ),
    (
        ShaderStages::TESS_CTRL,
        vk::ShaderStageFlags::TESSELLATION_CONTROL,
    ),
];

const BUFFER_USAGE_TABLE: [(BufferUsage, vk::BufferUsageFlags); 9] = [
    (BufferUsage::VERTEX, vk::BufferUsageFlags::VERTEX_BUFFER),
    (BufferUsage::INDEX, vk::BufferUsageFlags::INDEX_BUFFER),
    (BufferUsage::UNIFORM, vk::BufferUsageFlags::UNIFORM_BUFFER),
    (BufferUsage::STORAGE, vk::BufferUsageFlags::STORAGE_BUFFER),
    (BufferUsage::INDIRECT, vk::BufferUsageFlags::INDIRECT_BUFFER),
    (BufferUsage::TRANSFER_SRC, vk::BufferUsageFlags::TRANSFER_SRC),
    (BufferUsage::TRANSFER_DST, vk::BufferUsageFlags::TRANSFER_DST),
    (
        BufferUsage::UNIFORM_TEXEL,
        vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER,
    ),
    (
        BufferUsage::STORAGE_TEXEL,
        vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER,
    ),
];

const IMAGE_USAGE_TABLE: [(ImageUsage, vk::ImageUsageFlags); 6] = [
    (ImageUsage::SAMPLED, vk::ImageUsageFlags::SAMPLED),
    (ImageUsage::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST),
    (ImageUsage::STORAGE, vk::ImageUsageFlags::STORAGE),
    (ImageUsage::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
    (
        ImageUsage::COLOR_ATTACHMENT,
        vk::ImageUsageFlags::COLOR_ATTACHMENT,
    ),
    (
        ImageUsage::DEPTH_ATTACHMENT,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
    ),
];

impl ShaderStages {
    /// Convert to Vulkan shader stage flags.
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        SHADER_STAGE_TABLE
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .fold(vk::ShaderStageFlags::empty(), |acc, (_, vk)| acc | *vk)
    }
}

impl BufferUsage {
    /// Convert to Vulkan buffer usage flags.
    pub fn to_vk(self) -> vk::BufferUsageFlags {
        BUFFER_USAGE_TABLE
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .fold(vk::BufferUsageFlags::empty(), |acc, (_, vk)| acc | *vk)
    }
}

impl ImageUsage {
    /// Convert to Vulkan image usage flags.
    pub fn to_vk(self) -> vk::ImageUsageFlags {
        IMAGE_USAGE_TABLE
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .fold(vk::ImageUsageFlags::empty(), |acc, (_, vk)| acc | *vk)
    }
}
