//! Views over images.

use crate::backend::SharedDevice;
use crate::error::{GpuError, Result};
use crate::formats::ImageFormat;
use crate::image::Image;
use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageViewType {
    View1D,
    View1DArray,
    #[default]
    View2D,
    View2DArray,
    View3D,
    ViewCube,
    ViewCubeArray,
}

impl ImageViewType {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::ImageViewType {
        match self {
            Self::View1D => vk::ImageViewType::TYPE_1D,
            Self::View1DArray => vk::ImageViewType::TYPE_1D_ARRAY,
            Self::View2D => vk::ImageViewType::TYPE_2D,
            Self::View2DArray => vk::ImageViewType::TYPE_2D_ARRAY,
            Self::View3D => vk::ImageViewType::TYPE_3D,
            Self::ViewCube => vk::ImageViewType::CUBE,
            Self::ViewCubeArray => vk::ImageViewType::CUBE_ARRAY,
        }
    }
}

/// Which part of an image a view exposes, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageViewDesc {
    pub view_type: ImageViewType,
    pub format: ImageFormat,
    pub base_level: u32,
    pub level_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl Default for ImageViewDesc {
    fn default() -> Self {
        Self {
            view_type: ImageViewType::View2D,
            format: ImageFormat::R8G8B8A8Unorm,
            base_level: 0,
            level_count: 1,
            base_layer: 0,
            layer_count: 1,
        }
    }
}

impl ImageViewDesc {
    /// Depth aspect for depth formats, color otherwise.
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        if self.format.is_depth() {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }

    /// Mip and layer range covered by the view.
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect(),
            base_mip_level: self.base_level,
            level_count: self.level_count,
            base_array_layer: self.base_layer,
            layer_count: self.layer_count,
        }
    }

    /// Create info for a view of `image`.
    pub fn create_info(&self, image: vk::Image) -> vk::ImageViewCreateInfo<'static> {
        vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(self.view_type.to_vk())
            .format(self.format.to_vk())
            .components(vk::ComponentMapping::default())
            .subresource_range(self.subresource_range())
    }
}

pub struct ImageView {
    device: SharedDevice,
    desc: ImageViewDesc,
    view: Option<vk::ImageView>,
}

impl ImageView {
    /// Unbuilt view with `desc`.
    pub fn new(device: SharedDevice, desc: ImageViewDesc) -> Self {
        Self {
            device,
            desc,
            view: None,
        }
    }

    /// Current configuration.
    pub fn desc(&self) -> &ImageViewDesc {
        &self.desc
    }

    /// Mutable configuration. Fails with `Locked` once built.
    pub fn desc_mut(&mut self) -> Result<&mut ImageViewDesc> {
        if self.is_built() {
            return Err(GpuError::Locked("ImageView"));
        }
        Ok(&mut self.desc)
    }

    /// Whether `build` has succeeded.
    pub fn is_built(&self) -> bool {
        self.view.is_some()
    }

    /// Create the view over `image`, which must already be built. Does
    /// nothing if already built.
    pub fn build(&mut self, image: &Image) -> Result<()> {
        if self.view.is_some() {
            return Ok(());
        }

        let info = self.desc.create_info(image.handle()?);
        let view = unsafe { self.device.create_image_view(&info)? };
        tracing::debug!("Built image view {:?} ({:?})", view, self.desc.view_type);

        self.view = Some(view);
        Ok(())
    }

    /// The Vulkan image view.
    pub fn handle(&self) -> Result<vk::ImageView> {
        self.view.ok_or(GpuError::NotBuilt("ImageView"))
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        if let Some(view) = self.view.take() {
            unsafe { self.device.destroy_image_view(view) };
            tracing::debug!("Destroyed image view {:?}", view);
        }
    }
}
