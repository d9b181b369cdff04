//! Texture samplers.

use crate::backend::SharedDevice;
use crate::error::{GpuError, Result};
use ash::vk;

/// Addressing outside `[0, 1]`, applied to every axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EdgeMode {
    #[default]
    ClampToEdge,
    ClampToBorder,
    Repeat,
}

impl EdgeMode {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::SamplerAddressMode {
        match self {
            Self::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            Self::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
            Self::Repeat => vk::SamplerAddressMode::REPEAT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BorderColor {
    #[default]
    OpaqueFloatBlack,
    OpaqueFloatWhite,
    TransparentFloatBlack,
    OpaqueIntBlack,
    OpaqueIntWhite,
    TransparentIntBlack,
}

impl BorderColor {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::BorderColor {
        match self {
            Self::OpaqueFloatBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
            Self::OpaqueFloatWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
            Self::TransparentFloatBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
            Self::OpaqueIntBlack => vk::BorderColor::INT_OPAQUE_BLACK,
            Self::OpaqueIntWhite => vk::BorderColor::INT_OPAQUE_WHITE,
            Self::TransparentIntBlack => vk::BorderColor::INT_TRANSPARENT_BLACK,
        }
    }
}

/// Sampler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SamplerDesc {
    pub unnormalized_coords: bool,
    /// Linear rather than nearest filtering, for both minification and
    /// magnification.
    pub linear_filter: bool,
    pub edge: EdgeMode,
    pub border: BorderColor,
    /// Maximum anisotropy. Zero disables anisotropic filtering.
    pub anisotropic_samples: f32,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl SamplerDesc {
    /// Create info for this configuration.
    pub fn create_info(&self) -> vk::SamplerCreateInfo<'static> {
        let filter = if self.linear_filter {
            vk::Filter::LINEAR
        } else {
            vk::Filter::NEAREST
        };
        let edge = self.edge.to_vk();

        vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(edge)
            .address_mode_v(edge)
            .address_mode_w(edge)
            .mip_lod_bias(0.0)
            .anisotropy_enable(self.anisotropic_samples != 0.0)
            .max_anisotropy(self.anisotropic_samples)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(self.min_lod)
            .max_lod(self.max_lod)
            .border_color(self.border.to_vk())
            .unnormalized_coordinates(self.unnormalized_coords)
    }
}

pub struct Sampler {
    device: SharedDevice,
    desc: SamplerDesc,
    sampler: Option<vk::Sampler>,
}

impl Sampler {
    /// Unbuilt sampler with `desc`.
    pub fn new(device: SharedDevice, desc: SamplerDesc) -> Self {
        Self {
            device,
            desc,
            sampler: None,
        }
    }

    /// Current configuration.
    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    /// Mutable configuration. Fails with `Locked` once built.
    pub fn desc_mut(&mut self) -> Result<&mut SamplerDesc> {
        if self.is_built() {
            return Err(GpuError::Locked("Sampler"));
        }
        Ok(&mut self.desc)
    }

    /// Whether `build` has succeeded.
    pub fn is_built(&self) -> bool {
        self.sampler.is_some()
    }

    /// Create the sampler. Only the first call has an effect.
    pub fn build(&mut self) -> Result<()> {
        if self.sampler.is_some() {
            return Ok(());
        }
        let sampler = unsafe { self.device.create_sampler(&self.desc.create_info())? };
        tracing::debug!("Built sampler {:?}", sampler);
        self.sampler = Some(sampler);
        Ok(())
    }

    /// The Vulkan sampler.
    pub fn handle(&self) -> Result<vk::Sampler> {
        self.sampler.ok_or(GpuError::NotBuilt("Sampler"))
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            unsafe { self.device.destroy_sampler(sampler) };
            tracing::debug!("Destroyed sampler {:?}", sampler);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;

    #[test]
    fn one_filter_drives_min_and_mag() {
        let nearest = SamplerDesc::default().create_info();
        assert_eq!(nearest.min_filter, vk::Filter::NEAREST);
        assert_eq!(nearest.mag_filter, vk::Filter::NEAREST);

        let linear = SamplerDesc {
            linear_filter: true,
            ..Default::default()
        }
        .create_info();
        assert_eq!(linear.min_filter, vk::Filter::LINEAR);
        assert_eq!(linear.mag_filter, vk::Filter::LINEAR);
        assert_eq!(linear.mipmap_mode, vk::SamplerMipmapMode::NEAREST);
    }

    #[test]
    fn anisotropy_follows_sample_count() {
        assert_eq!(SamplerDesc::default().create_info().anisotropy_enable, vk::FALSE);

        let info = SamplerDesc {
            anisotropic_samples: 16.0,
            ..Default::default()
        }
        .create_info();
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.max_anisotropy, 16.0);
    }

    #[test]
    fn edge_mode_applies_to_every_axis() {
        let info = SamplerDesc {
            edge: EdgeMode::ClampToBorder,
            border: BorderColor::OpaqueIntWhite,
            ..Default::default()
        }
        .create_info();
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_BORDER);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::CLAMP_TO_BORDER);
        assert_eq!(info.address_mode_w, vk::SamplerAddressMode::CLAMP_TO_BORDER);
        assert_eq!(info.border_color, vk::BorderColor::INT_OPAQUE_WHITE);
        assert_eq!(info.compare_enable, vk::FALSE);
    }

    #[test]
    fn build_once_and_release_once() {
        let (mock, device) = MockDevice::pair();
        let mut sampler = Sampler::new(device, SamplerDesc::default());
        assert!(matches!(sampler.handle(), Err(GpuError::NotBuilt(_))));

        sampler.build().unwrap();
        sampler.build().unwrap();
        assert_eq!(mock.log().samplers, 1);
        assert!(sampler.desc_mut().is_err());

        drop(sampler);
        assert_eq!(mock.log().destroyed("sampler"), 1);
    }
}
