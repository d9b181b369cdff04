//! Descriptor sets.
//!
//! A [`DescriptorSet`] declares a list of bindings, then allocates a batch of
//! identical sets from one layout and one pool. Each set in the batch is
//! rewritten independently, one slot per call.

use crate::backend::SharedDevice;
use crate::buffer::Buffer;
use crate::error::{GpuError, Result};
use crate::flags::ShaderStages;
use crate::image_view::ImageView;
use crate::sampler::Sampler;
use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    UniformBuffer,
    StorageBuffer,
    InputAttachment,
}

impl DescriptorType {
    /// The Vulkan equivalent.
    pub fn to_vk(self) -> vk::DescriptorType {
        match self {
            Self::Sampler => vk::DescriptorType::SAMPLER,
            Self::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            Self::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            Self::UniformTexelBuffer => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            Self::StorageTexelBuffer => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
            Self::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            Self::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            Self::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        }
    }
}

/// One declared binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    /// Array length.
    pub count: u32,
    pub stages: ShaderStages,
}

/// Pool capacity reserved for one descriptor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEntry {
    pub ty: DescriptorType,
    pub count: u32,
}

struct BuiltSets {
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

pub struct DescriptorSet {
    device: SharedDevice,
    bindings: Vec<DescriptorBinding>,
    pool_entries: Vec<PoolEntry>,
    built: Option<BuiltSets>,
}

impl DescriptorSet {
    /// Empty declaration list on `device`.
    pub fn new(device: SharedDevice) -> Self {
        Self {
            device,
            bindings: Vec::new(),
            pool_entries: Vec::new(),
            built: None,
        }
    }

    /// Declare a binding.
    ///
    /// Pool capacity grows by one per declaration of a type, independent of
    /// `count`. Array bindings therefore reserve a single descriptor per set.
    pub fn add(
        &mut self,
        binding: u32,
        ty: DescriptorType,
        count: u32,
        stages: ShaderStages,
    ) -> Result<&mut Self> {
        if self.is_built() {
            return Err(GpuError::Locked("DescriptorSet"));
        }

        self.bindings.push(DescriptorBinding {
            binding,
            ty,
            count,
            stages,
        });
        match self.pool_entries.iter_mut().find(|entry| entry.ty == ty) {
            Some(entry) => entry.count += 1,
            None => self.pool_entries.push(PoolEntry { ty, count: 1 }),
        }
        Ok(self)
    }

    /// Declared bindings in `add` order.
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    /// Pool-size plan, one entry per descriptor type.
    pub fn pool_entries(&self) -> &[PoolEntry] {
        &self.pool_entries
    }

    /// Capacity reserved for `ty`, zero when never declared.
    pub fn pool_count(&self, ty: DescriptorType) -> u32 {
        self.pool_entries
            .iter()
            .find(|entry| entry.ty == ty)
            .map_or(0, |entry| entry.count)
    }

    /// Whether `build` has succeeded.
    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// Create the layout and pool and allocate `pool_size` sets. Does nothing
    /// if already built.
    pub fn build(&mut self, pool_size: u32) -> Result<()> {
        if self.built.is_some() {
            return Ok(());
        }

        let bindings: Vec<_> = self
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.ty.to_vk())
                    .descriptor_count(b.count)
                    .stage_flags(b.stages.to_vk())
            })
            .collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe { self.device.create_descriptor_set_layout(&layout_info)? };

        let sizes: Vec<_> = self
            .pool_entries
            .iter()
            .map(|entry| vk::DescriptorPoolSize {
                ty: entry.ty.to_vk(),
                descriptor_count: entry.count,
            })
            .collect();
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(pool_size)
            .pool_sizes(&sizes);
        let pool = match unsafe { self.device.create_descriptor_pool(&pool_info) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { self.device.destroy_descriptor_set_layout(layout) };
                return Err(e);
            }
        };

        let layouts = vec![layout; pool_size as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = match unsafe { self.device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets,
            Err(e) => {
                unsafe {
                    self.device.destroy_descriptor_pool(pool);
                    self.device.destroy_descriptor_set_layout(layout);
                }
                return Err(e);
            }
        };

        tracing::debug!(
            "Built descriptor set: {} bindings, {} sets",
            self.bindings.len(),
            sets.len()
        );
        self.built = Some(BuiltSets { layout, pool, sets });
        Ok(())
    }

    fn built(&self) -> Result<&BuiltSets> {
        self.built.as_ref().ok_or(GpuError::NotBuilt("DescriptorSet"))
    }

    /// The set layout shared by every allocated set.
    pub fn layout(&self) -> Result<vk::DescriptorSetLayout> {
        Ok(self.built()?.layout)
    }

    /// The pool the sets came from.
    pub fn pool(&self) -> Result<vk::DescriptorPool> {
        Ok(self.built()?.pool)
    }

    /// Handle of set `index`. An unbuilt object reports `NotBuilt` before
    /// any range check.
    pub fn set(&self, index: u32) -> Result<vk::DescriptorSet> {
        let sets = &self.built()?.sets;
        GpuError::check_index("descriptor set", index as usize, sets.len())?;
        Ok(sets[index as usize])
    }

    /// Number of allocated sets; zero before build.
    pub fn set_count(&self) -> u32 {
        self.built.as_ref().map_or(0, |built| built.sets.len() as u32)
    }

    fn declared_type(&self, binding: u32) -> Option<DescriptorType> {
        self.bindings
            .iter()
            .find(|b| b.binding == binding)
            .map(|b| b.ty)
    }

    fn write(&self, set: vk::DescriptorSet, write: vk::WriteDescriptorSet<'_>) {
        let write = write.dst_set(set);
        unsafe { self.device.update_descriptor_sets(std::slice::from_ref(&write)) };
    }

    /// Bind a sampled image in shader-read-only layout.
    pub fn set_combined_image_sampler(
        &self,
        set: u32,
        binding: u32,
        element: u32,
        view: &ImageView,
        sampler: &Sampler,
    ) -> Result<()> {
        let dst = self.set(set)?;
        let info = [vk::DescriptorImageInfo::default()
            .sampler(sampler.handle()?)
            .image_view(view.handle()?)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];

        self.write(
            dst,
            vk::WriteDescriptorSet::default()
                .dst_binding(binding)
                .dst_array_element(element)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&info),
        );
        Ok(())
    }

    /// Bind a storage image in general layout.
    pub fn set_storage_image(
        &self,
        set: u32,
        binding: u32,
        element: u32,
        view: &ImageView,
    ) -> Result<()> {
        let dst = self.set(set)?;
        let info = [vk::DescriptorImageInfo::default()
            .image_view(view.handle()?)
            .image_layout(vk::ImageLayout::GENERAL)];

        self.write(
            dst,
            vk::WriteDescriptorSet::default()
                .dst_binding(binding)
                .dst_array_element(element)
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .image_info(&info),
        );
        Ok(())
    }

    /// Bind `[offset, offset + len)` of a uniform or storage buffer.
    pub fn set_buffer(
        &self,
        set: u32,
        binding: u32,
        element: u32,
        buffer: &Buffer,
        offset: u64,
        len: u64,
    ) -> Result<()> {
        let dst = self.set(set)?;
        let ty = match self.declared_type(binding) {
            Some(ty @ (DescriptorType::UniformBuffer | DescriptorType::StorageBuffer)) => ty,
            _ => DescriptorType::UniformBuffer,
        };
        let info = [vk::DescriptorBufferInfo::default()
            .buffer(buffer.handle()?)
            .offset(offset)
            .range(len)];

        self.write(
            dst,
            vk::WriteDescriptorSet::default()
                .dst_binding(binding)
                .dst_array_element(element)
                .descriptor_type(ty.to_vk())
                .buffer_info(&info),
        );
        Ok(())
    }

    /// Bind the texel view of `buffer`.
    pub fn set_texel_buffer(
        &self,
        set: u32,
        binding: u32,
        element: u32,
        buffer: &Buffer,
    ) -> Result<()> {
        let dst = self.set(set)?;
        let ty = match self.declared_type(binding) {
            Some(ty @ (DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer)) => {
                ty
            }
            _ => DescriptorType::UniformTexelBuffer,
        };
        let views = [buffer.view()?];

        self.write(
            dst,
            vk::WriteDescriptorSet::default()
                .dst_binding(binding)
                .dst_array_element(element)
                .descriptor_type(ty.to_vk())
                .texel_buffer_view(&views),
        );
        Ok(())
    }
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        if let Some(built) = self.built.take() {
            unsafe {
                self.device.destroy_descriptor_pool(built.pool);
                self.device.destroy_descriptor_set_layout(built.layout);
            }
            tracing::debug!("Destroyed descriptor set layout {:?}", built.layout);
        }
    }
}
