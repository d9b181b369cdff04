//! GPU images.

use crate::backend::SharedDevice;
use crate::error::{GpuError, Result};
use crate::flags::ImageUsage;
use crate::formats::{ImageDimension, ImageFormat, MemoryUsage};
use crate::memory::{resolve_sharing, Allocation};
use ash::vk;

/// Image configuration. Editable until the image is built.
#[derive(Debug, Clone)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Mip levels.
    pub levels: u32,
    /// Array layers.
    pub layers: u32,
    pub dimension: ImageDimension,
    pub format: ImageFormat,
    pub usage: ImageUsage,
    /// Allow cube views of a 2D image.
    pub cubemappable: bool,
    pub memory: MemoryUsage,
    pub name: String,
}

impl Default for ImageDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            levels: 1,
            layers: 1,
            dimension: ImageDimension::D2,
            format: ImageFormat::R8G8B8A8Unorm,
            usage: ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST,
            cubemappable: false,
            memory: MemoryUsage::GpuOnly,
            name: String::new(),
        }
    }
}

impl ImageDesc {
    /// Creation flags implied by dimension, layers and cube compatibility.
    pub fn create_flags(&self) -> vk::ImageCreateFlags {
        let mut flags = vk::ImageCreateFlags::MUTABLE_FORMAT;
        if self.dimension == ImageDimension::D2 {
            if self.layers > 1 {
                flags |= vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE;
            }
            if self.cubemappable {
                flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
            }
        }
        flags
    }

    /// Create info sharing the image across `families`.
    pub fn create_info<'a>(&self, families: &'a [u32]) -> vk::ImageCreateInfo<'a> {
        let (sharing, families) = resolve_sharing(vk::SharingMode::CONCURRENT, families);
        vk::ImageCreateInfo::default()
            .flags(self.create_flags())
            .image_type(self.dimension.to_vk())
            .format(self.format.to_vk())
            .extent(vk::Extent3D {
                width: self.width,
                height: self.height,
                depth: self.depth,
            })
            .mip_levels(self.levels)
            .array_layers(self.layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(self.usage.to_vk())
            .sharing_mode(sharing)
            .queue_family_indices(families)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}

/// An image and its memory.
///
/// Images are always shared across every queue family of the device.
pub struct Image {
    device: SharedDevice,
    desc: ImageDesc,
    built: Option<(vk::Image, Allocation)>,
}

impl Image {
    /// Unbuilt image with `desc`.
    pub fn new(device: SharedDevice, desc: ImageDesc) -> Self {
        Self {
            device,
            desc,
            built: None,
        }
    }

    /// Current configuration.
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    /// Mutable configuration. Fails with `Locked` once built.
    pub fn desc_mut(&mut self) -> Result<&mut ImageDesc> {
        if self.is_built() {
            return Err(GpuError::Locked("Image"));
        }
        Ok(&mut self.desc)
    }

    /// Whether `build` has succeeded.
    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// Create the native image. Does nothing if already built.
    pub fn build(&mut self) -> Result<()> {
        if self.built.is_some() {
            return Ok(());
        }

        let info = self.desc.create_info(self.device.queue_families());
        let (image, allocation) =
            unsafe { self.device.create_image(&info, self.desc.memory, &self.desc.name)? };
        tracing::debug!(
            "Built image {:?} '{}': {}x{}x{} {:?}",
            image,
            self.desc.name,
            self.desc.width,
            self.desc.height,
            self.desc.depth,
            self.desc.format
        );

        self.built = Some((image, allocation));
        Ok(())
    }

    /// The Vulkan image.
    pub fn handle(&self) -> Result<vk::Image> {
        self.built
            .as_ref()
            .map(|(image, _)| *image)
            .ok_or(GpuError::NotBuilt("Image"))
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if let Some((image, allocation)) = self.built.take() {
            unsafe { self.device.destroy_image(image, allocation) };
            tracing::debug!("Destroyed image {:?}", image);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;
    use std::sync::Arc;

    #[test]
    fn defaults() {
        let desc = ImageDesc::default();
        assert_eq!((desc.width, desc.height, desc.depth), (1, 1, 1));
        assert_eq!((desc.levels, desc.layers), (1, 1));
        assert_eq!(desc.dimension, ImageDimension::D2);
        assert_eq!(desc.format, ImageFormat::R8G8B8A8Unorm);
        assert_eq!(desc.usage, ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST);
        assert_eq!(desc.create_flags(), vk::ImageCreateFlags::MUTABLE_FORMAT);
    }

    #[test]
    fn layered_2d_is_array_compatible() {
        let desc = ImageDesc {
            layers: 6,
            cubemappable: true,
            ..Default::default()
        };
        assert_eq!(
            desc.create_flags(),
            vk::ImageCreateFlags::MUTABLE_FORMAT
                | vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE
                | vk::ImageCreateFlags::CUBE_COMPATIBLE
        );
    }

    #[test]
    fn compatibility_flags_only_apply_to_2d() {
        for dimension in [ImageDimension::D1, ImageDimension::D3] {
            let desc = ImageDesc {
                dimension,
                layers: 4,
                cubemappable: true,
                ..Default::default()
            };
            assert_eq!(desc.create_flags(), vk::ImageCreateFlags::MUTABLE_FORMAT);
        }
    }

    #[test]
    fn create_info_mirrors_desc() {
        let desc = ImageDesc {
            width: 256,
            height: 128,
            levels: 4,
            dimension: ImageDimension::D3,
            depth: 8,
            format: ImageFormat::R32Sfloat,
            ..Default::default()
        };
        let families = [0, 2];
        let info = desc.create_info(&families);
        assert_eq!(info.image_type, vk::ImageType::TYPE_3D);
        assert_eq!(info.format, vk::Format::R32_SFLOAT);
        assert_eq!(info.extent.depth, 8);
        assert_eq!(info.mip_levels, 4);
        assert_eq!(info.tiling, vk::ImageTiling::OPTIMAL);
        assert_eq!(info.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(info.sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(info.queue_family_index_count, 2);
    }

    #[test]
    fn build_once_and_release_once() {
        let mock = Arc::new(MockDevice::with_families(vec![0, 1]));
        let device: SharedDevice = mock.clone();
        let mut image = Image::new(device, ImageDesc::default());
        assert!(matches!(image.handle(), Err(GpuError::NotBuilt(_))));

        image.build().unwrap();
        image.build().unwrap();
        assert!(matches!(image.desc_mut(), Err(GpuError::Locked(_))));
        {
            let log = mock.log();
            assert_eq!(log.created("image"), 1);
            assert_eq!(log.images[0].sharing, vk::SharingMode::CONCURRENT);
            assert_eq!(log.images[0].families, vec![0, 1]);
        }

        drop(image);
        assert_eq!(mock.log().destroyed("image"), 1);
    }

    #[test]
    fn single_family_device_creates_exclusive_image() {
        let (mock, device) = MockDevice::pair();
        let mut image = Image::new(device, ImageDesc::default());
        image.build().unwrap();
        let log = mock.log();
        assert_eq!(log.images[0].sharing, vk::SharingMode::EXCLUSIVE);
        assert!(log.images[0].families.is_empty());
    }

    #[test]
    fn unbuilt_image_releases_nothing() {
        let (mock, device) = MockDevice::pair();
        drop(Image::new(device, ImageDesc::default()));
        assert_eq!(mock.log().destroyed("image"), 0);
    }
}
