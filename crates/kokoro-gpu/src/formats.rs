//! Plain enums describing formats, memory placement and sharing.

use ash::vk;
use gpu_allocator::MemoryLocation;

/// Texel formats understood by images, views and buffer views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    #[default]
    R8G8B8A8Unorm,
    R8G8B8A8Snorm,
    B8G8R8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Srgb,
    R32Uint,
    R32Sfloat,
    R32G32B32A32Sfloat,
    Depth32f,
    Depth16f,
}

const FORMATS: [(ImageFormat, vk::Format); 10] = [
    (ImageFormat::R8G8B8A8Unorm, vk::Format::R8G8B8A8_UNORM),
    (ImageFormat::R8G8B8A8Snorm, vk::Format::R8G8B8A8_SNORM),
    (ImageFormat::B8G8R8A8Unorm, vk::Format::B8G8R8A8_UNORM),
    (ImageFormat::R8G8B8A8Srgb, vk::Format::R8G8B8A8_SRGB),
    (ImageFormat::B8G8R8A8Srgb, vk::Format::B8G8R8A8_SRGB),
    (ImageFormat::R32Uint, vk::Format::R32_UINT),
    (ImageFormat::R32Sfloat, vk::Format::R32_SFLOAT),
    (ImageFormat::R32G32B32A32Sfloat, vk::Format::R32G32B32A32_SFLOAT),
    (ImageFormat::Depth32f, vk::Format::D32_SFLOAT),
    (ImageFormat::Depth16f, vk::Format::D16_UNORM),
];

impl ImageFormat {
    /// The Vulkan format.
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
            Self::R8G8B8A8Snorm => vk::Format::R8G8B8A8_SNORM,
            Self::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
            Self::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
            Self::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
            Self::R32Uint => vk::Format::R32_UINT,
            Self::R32Sfloat => vk::Format::R32_SFLOAT,
            Self::R32G32B32A32Sfloat => vk::Format::R32G32B32A32_SFLOAT,
            Self::Depth32f => vk::Format::D32_SFLOAT,
            Self::Depth16f => vk::Format::D16_UNORM,
        }
    }

    /// The format matching `format`, e.g. a selected surface format.
    pub fn from_vk(format: vk::Format) -> Option<Self> {
        FORMATS
            .iter()
            .find(|(_, vk_format)| *vk_format == format)
            .map(|(format, _)| *format)
    }

    /// Whether views of this format address the depth aspect.
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32f | Self::Depth16f)
    }
}

/// Where an allocation lives and who accesses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryUsage {
    /// Device-local, not host visible.
    #[default]
    GpuOnly,
    /// Host visible, written by the CPU and read by the GPU.
    CpuToGpu,
    /// Host visible and cached, used for staging and readback.
    CpuOnly,
}

impl MemoryUsage {
    /// The allocator memory location.
    pub fn to_location(self) -> MemoryLocation {
        match self {
            Self::GpuOnly => MemoryLocation::GpuOnly,
            Self::CpuToGpu => MemoryLocation::CpuToGpu,
            Self::CpuOnly => MemoryLocation::GpuToCpu,
        }
    }

    /// Whether the allocator hands back a host pointer for this usage.
    pub fn is_host_visible(self) -> bool {
        !matches!(self, Self::GpuOnly)
    }
}

/// Queue-family ownership of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SharingMode {
    /// Accessible from every queue family of the device at once.
    Shared,
    #[default]
    Exclusive,
}

impl SharingMode {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::SharingMode {
        match self {
            Self::Shared => vk::SharingMode::CONCURRENT,
            Self::Exclusive => vk::SharingMode::EXCLUSIVE,
        }
    }
}

/// Dimensionality of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageDimension {
    D1,
    #[default]
    D2,
    D3,
}

impl ImageDimension {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::ImageType {
        match self {
            Self::D1 => vk::ImageType::TYPE_1D,
            Self::D2 => vk::ImageType::TYPE_2D,
            Self::D3 => vk::ImageType::TYPE_3D,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats_are_flagged() {
        assert!(ImageFormat::Depth32f.is_depth());
        assert!(ImageFormat::Depth16f.is_depth());
        assert!(!ImageFormat::R8G8B8A8Unorm.is_depth());
        assert_eq!(ImageFormat::Depth16f.to_vk(), vk::Format::D16_UNORM);
    }

    #[test]
    fn surface_formats_convert_back() {
        for (format, vk_format) in FORMATS {
            assert_eq!(format.to_vk(), vk_format);
            assert_eq!(ImageFormat::from_vk(vk_format), Some(format));
        }
        assert_eq!(
            ImageFormat::from_vk(vk::Format::B8G8R8A8_SRGB),
            Some(ImageFormat::B8G8R8A8Srgb)
        );
        assert_eq!(ImageFormat::from_vk(vk::Format::A2B10G10R10_UNORM_PACK32), None);
    }

    #[test]
    fn memory_usage_locations() {
        assert_eq!(MemoryUsage::GpuOnly.to_location(), MemoryLocation::GpuOnly);
        assert_eq!(MemoryUsage::CpuToGpu.to_location(), MemoryLocation::CpuToGpu);
        assert_eq!(MemoryUsage::CpuOnly.to_location(), MemoryLocation::GpuToCpu);
        assert!(!MemoryUsage::GpuOnly.is_host_visible());
    }

    #[test]
    fn shared_means_concurrent() {
        assert_eq!(SharingMode::Shared.to_vk(), vk::SharingMode::CONCURRENT);
        assert_eq!(SharingMode::default().to_vk(), vk::SharingMode::EXCLUSIVE);
    }
}
