//! Shader modules and their pipeline-stage specializations.

use crate::backend::SharedDevice;
use crate::error::{GpuError, Result};
use crate::flags::ShaderStages;
use ash::vk;
use std::ffi::{CStr, CString};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// A compiled SPIR-V module for one shader stage.
pub struct ShaderModule {
    device: SharedDevice,
    module: vk::ShaderModule,
    stage: ShaderStages,
    specialization: Vec<vk::SpecializationMapEntry>,
    /// Entry point name, `main` by default.
    pub entry_point: String,
    /// Require full subgroups instead of allowing a varying subgroup size.
    pub require_full_subgroups: bool,
}

impl ShaderModule {
    /// Load SPIR-V from `path`.
    pub fn from_file(device: SharedDevice, stage: ShaderStages, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        tracing::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
        Self::from_bytes(device, stage, &bytes)
    }

    /// Create a module from SPIR-V bytes.
    pub fn from_bytes(device: SharedDevice, stage: ShaderStages, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return Err(GpuError::InvalidShader(format!(
                "length {} is not a non-zero multiple of 4",
                bytes.len()
            )));
        }
        let words = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|e| GpuError::InvalidShader(e.to_string()))?;

        let info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { device.create_shader_module(&info)? };

        Ok(Self {
            device,
            module,
            stage,
            specialization: Vec::new(),
            entry_point: "main".to_string(),
            require_full_subgroups: false,
        })
    }

    /// The Vulkan shader module.
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage this module is compiled for.
    pub fn stage(&self) -> ShaderStages {
        self.stage
    }

    /// Declare constant `id` at `[offset, offset + size)` of the data later
    /// passed to [`Self::specialize`].
    pub fn define_specialization_constant(&mut self, id: u32, offset: u32, size: usize) {
        self.specialization.push(vk::SpecializationMapEntry {
            constant_id: id,
            offset,
            size,
        });
    }

    /// Constants declared so far.
    pub fn specialization_constants(&self) -> &[vk::SpecializationMapEntry] {
        &self.specialization
    }

    /// Bind constant data to this module for use as a pipeline stage.
    ///
    /// Specialization is attached only when `data` is given and at least
    /// one constant was defined. Subgroup flags follow the features enabled
    /// on the device.
    pub fn specialize(self: &Arc<Self>, data: Option<&[u8]>) -> Result<SpecializedShaderModule> {
        let entry_point = CString::new(self.entry_point.as_str())
            .map_err(|_| GpuError::InvalidShader("entry point contains a NUL byte".to_string()))?;
        let flags = if self.require_full_subgroups {
            if !self.device.compute_full_subgroups() {
                return Err(GpuError::InvalidShader(
                    "full subgroups requested but computeFullSubgroups is not enabled".to_string(),
                ));
            }
            vk::PipelineShaderStageCreateFlags::REQUIRE_FULL_SUBGROUPS
        } else if self.device.subgroup_size_control() {
            vk::PipelineShaderStageCreateFlags::ALLOW_VARYING_SUBGROUP_SIZE
        } else {
            vk::PipelineShaderStageCreateFlags::empty()
        };
        let specialization = match data {
            Some(data) if !self.specialization.is_empty() => {
                Some((self.specialization.clone(), data.to_vec()))
            }
            _ => None,
        };

        Ok(SpecializedShaderModule {
            module: Arc::clone(self),
            entry_point,
            flags,
            specialization,
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module) };
    }
}

/// A shader module with its entry point, subgroup flags and constant data
/// fixed, ready to become a pipeline stage.
pub struct SpecializedShaderModule {
    module: Arc<ShaderModule>,
    entry_point: CString,
    flags: vk::PipelineShaderStageCreateFlags,
    specialization: Option<(Vec<vk::SpecializationMapEntry>, Vec<u8>)>,
}

impl SpecializedShaderModule {
    /// The module this stage was made from.
    pub fn module(&self) -> &ShaderModule {
        &self.module
    }

    /// Stage of the underlying module.
    pub fn stage(&self) -> ShaderStages {
        self.module.stage
    }

    /// Entry point name.
    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }

    /// Stage create flags.
    pub fn flags(&self) -> vk::PipelineShaderStageCreateFlags {
        self.flags
    }

    /// Whether constant data is attached.
    pub fn is_specialized(&self) -> bool {
        self.specialization.is_some()
    }

    pub(crate) fn specialization_info(&self) -> Option<vk::SpecializationInfo<'_>> {
        self.specialization.as_ref().map(|(entries, data)| {
            vk::SpecializationInfo::default()
                .map_entries(entries)
                .data(data)
        })
    }

    pub(crate) fn stage_info<'a>(
        &'a self,
        specialization: Option<&'a vk::SpecializationInfo<'a>>,
    ) -> vk::PipelineShaderStageCreateInfo<'a> {
        let info = vk::PipelineShaderStageCreateInfo::default()
            .flags(self.flags)
            .stage(self.module.stage.to_vk())
            .module(self.module.module)
            .name(&self.entry_point);
        match specialization {
            Some(specialization) => info.specialization_info(specialization),
            None => info,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_spirv(words: usize) -> Vec<u8> {
    let mut code = vec![0x0723_0203_u32];
    code.resize(words.max(1), 0);
    bytemuck::cast_slice(&code).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;

    #[test]
    fn rejects_misaligned_or_empty_bytecode() {
        let (mock, device) = MockDevice::pair();
        for len in [0, 3, 6, 21] {
            let bytes = vec![0u8; len];
            assert!(matches!(
                ShaderModule::from_bytes(device.clone(), ShaderStages::VERTEX, &bytes),
                Err(GpuError::InvalidShader(_))
            ));
        }
        assert_eq!(mock.log().created("shader module"), 0);
    }

    #[test]
    fn module_is_created_from_words() {
        let (mock, device) = MockDevice::pair();
        let module =
            ShaderModule::from_bytes(device, ShaderStages::FRAGMENT, &test_spirv(5)).unwrap();
        assert_eq!(module.entry_point, "main");
        assert_eq!(mock.log().shader_words, vec![5]);

        drop(module);
        assert_eq!(mock.log().destroyed("shader module"), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let (_mock, device) = MockDevice::pair();
        let result = ShaderModule::from_file(
            device,
            ShaderStages::COMPUTE,
            "/nonexistent/kokoro/shader.spv",
        );
        assert!(matches!(result, Err(GpuError::Io(_))));
    }

    #[test]
    fn subgroup_flags() {
        let (_mock, device) = MockDevice::pair();
        let mut module =
            ShaderModule::from_bytes(device, ShaderStages::COMPUTE, &test_spirv(4)).unwrap();
        module.require_full_subgroups = true;
        let module = Arc::new(module);
        assert_eq!(
            module.specialize(None).unwrap().flags(),
            vk::PipelineShaderStageCreateFlags::REQUIRE_FULL_SUBGROUPS
        );

        let (_mock, device) = MockDevice::pair();
        let varying =
            Arc::new(ShaderModule::from_bytes(device, ShaderStages::COMPUTE, &test_spirv(4)).unwrap());
        assert_eq!(
            varying.specialize(None).unwrap().flags(),
            vk::PipelineShaderStageCreateFlags::ALLOW_VARYING_SUBGROUP_SIZE
        );
    }

    #[test]
    fn subgroup_flags_need_enabled_features() {
        let (_mock, device) = MockDevice::new().with_subgroup_features(false, false).into_pair();
        let plain = Arc::new(
            ShaderModule::from_bytes(device.clone(), ShaderStages::COMPUTE, &test_spirv(4)).unwrap(),
        );
        assert!(plain.specialize(None).unwrap().flags().is_empty());

        let mut full =
            ShaderModule::from_bytes(device, ShaderStages::COMPUTE, &test_spirv(4)).unwrap();
        full.require_full_subgroups = true;
        let full = Arc::new(full);
        assert!(matches!(full.specialize(None), Err(GpuError::InvalidShader(_))));
    }

    #[test]
    fn specialization_needs_data_and_constants() {
        let (_mock, device) = MockDevice::pair();
        let bare =
            Arc::new(ShaderModule::from_bytes(device.clone(), ShaderStages::VERTEX, &test_spirv(4)).unwrap());
        assert!(!bare.specialize(Some(&[1, 0, 0, 0])).unwrap().is_specialized());

        let mut module =
            ShaderModule::from_bytes(device, ShaderStages::VERTEX, &test_spirv(4)).unwrap();
        module.define_specialization_constant(0, 0, 4);
        module.define_specialization_constant(7, 4, 4);
        let module = Arc::new(module);

        assert!(!module.specialize(None).unwrap().is_specialized());

        let data = [1u8, 0, 0, 0, 2, 0, 0, 0];
        let stage = module.specialize(Some(&data)).unwrap();
        let info = stage.specialization_info().unwrap();
        assert_eq!(info.map_entry_count, 2);
        assert_eq!(info.data_size, 8);

        let stage_info = stage.stage_info(Some(&info));
        assert_eq!(stage_info.stage, vk::ShaderStageFlags::VERTEX);
        assert_eq!(stage_info.module, module.handle());
        assert_eq!(stage.entry_point(), c"main");
    }

    #[test]
    fn entry_point_with_nul_is_rejected() {
        let (_mock, device) = MockDevice::pair();
        let mut module =
            ShaderModule::from_bytes(device, ShaderStages::VERTEX, &test_spirv(4)).unwrap();
        module.entry_point = "ma\0in".to_string();
        assert!(Arc::new(module).specialize(None).is_err());
    }

    #[test]
    fn stage_keeps_module_alive() {
        let (mock, device) = MockDevice::pair();
        let module =
            Arc::new(ShaderModule::from_bytes(device, ShaderStages::VERTEX, &test_spirv(4)).unwrap());
        let stage = module.specialize(None).unwrap();
        drop(module);
        assert_eq!(mock.log().destroyed("shader module"), 0);
        drop(stage);
        assert_eq!(mock.log().destroyed("shader module"), 1);
    }
}
