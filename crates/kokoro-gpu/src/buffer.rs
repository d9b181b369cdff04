//! GPU buffers.

use crate::backend::SharedDevice;
use crate::error::{GpuError, Result};
use crate::flags::BufferUsage;
use crate::formats::{ImageFormat, MemoryUsage, SharingMode};
use crate::memory::{resolve_sharing, Allocation};
use ash::vk;
use bytemuck::Pod;
use std::ptr::NonNull;

/// Buffer configuration. Editable until the buffer is built.
#[derive(Debug, Clone, Default)]
pub struct BufferDesc {
    /// Size in bytes.
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryUsage,
    pub sharing: SharingMode,
    /// Keep the host pointer valid for the buffer's lifetime instead of
    /// counting map/unmap pairs.
    pub persistent_map: bool,
    /// Debug name passed to the allocator.
    pub name: String,
}

struct BuiltBuffer {
    handle: vk::Buffer,
    allocation: Allocation,
}

/// A buffer and its memory.
pub struct Buffer {
    device: SharedDevice,
    desc: BufferDesc,
    built: Option<BuiltBuffer>,
    map_count: u32,
    view: Option<vk::BufferView>,
}

impl Buffer {
    /// Unbuilt buffer with `desc`.
    pub fn new(device: SharedDevice, desc: BufferDesc) -> Self {
        Self {
            device,
            desc,
            built: None,
            map_count: 0,
            view: None,
        }
    }

    /// Create and build in one step.
    pub fn allocate(device: SharedDevice, desc: BufferDesc) -> Result<Self> {
        let mut buffer = Self::new(device, desc);
        buffer.build()?;
        Ok(buffer)
    }

    /// Current configuration.
    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    /// Mutable configuration. Fails with `Locked` once built.
    pub fn desc_mut(&mut self) -> Result<&mut BufferDesc> {
        if self.is_built() {
            return Err(GpuError::Locked("Buffer"));
        }
        Ok(&mut self.desc)
    }

    /// Whether `build` has succeeded.
    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// Create the native buffer. Does nothing if already built.
    pub fn build(&mut self) -> Result<()> {
        if self.built.is_some() {
            return Ok(());
        }

        let (sharing, families) =
            resolve_sharing(self.desc.sharing.to_vk(), self.device.queue_families());
        let info = vk::BufferCreateInfo::default()
            .size(self.desc.size)
            .usage(self.desc.usage.to_vk())
            .sharing_mode(sharing)
            .queue_family_indices(families);

        let (handle, allocation) =
            unsafe { self.device.create_buffer(&info, self.desc.memory, &self.desc.name)? };
        tracing::debug!(
            "Built buffer {:?} '{}': {} bytes, {:?}",
            handle,
            self.desc.name,
            self.desc.size,
            self.desc.memory
        );

        self.built = Some(BuiltBuffer { handle, allocation });
        Ok(())
    }

    fn built(&self) -> Result<&BuiltBuffer> {
        self.built.as_ref().ok_or(GpuError::NotBuilt("Buffer"))
    }

    /// The Vulkan buffer.
    pub fn handle(&self) -> Result<vk::Buffer> {
        Ok(self.built()?.handle)
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.desc.size
    }

    /// Outstanding `map` calls on a non-persistent buffer.
    pub fn map_count(&self) -> u32 {
        self.map_count
    }

    /// Host pointer to `[offset, offset + len)`.
    ///
    /// Non-persistent buffers count nested calls; each must be paired with
    /// [`Self::unmap`]. Persistent buffers just return the pointer.
    pub fn map(&mut self, offset: u64, len: u64) -> Result<NonNull<u8>> {
        let built = self.built()?;
        self.check_range("Map", offset, len)?;
        let base = built.allocation.mapped_ptr().ok_or_else(|| {
            GpuError::InvalidState(format!("Buffer memory {:?} is not host visible", self.desc.memory))
        })?;

        // In bounds of the allocation, checked above.
        let ptr = unsafe { base.add(offset as usize) };

        if !self.desc.persistent_map {
            self.map_count += 1;
        }
        Ok(ptr)
    }

    /// Release one `map`. A no-op for persistent buffers.
    pub fn unmap(&mut self) -> Result<()> {
        self.built()?;
        if self.desc.persistent_map {
            return Ok(());
        }
        if self.map_count == 0 {
            return Err(GpuError::InvalidState("Unmap without matching map".to_string()));
        }
        self.map_count -= 1;
        Ok(())
    }

    /// Make host writes to `[offset, offset + len)` visible to the device.
    pub fn flush(&self, offset: u64, len: u64) -> Result<()> {
        let built = self.built()?;
        self.check_range("Flush", offset, len)?;
        unsafe { self.device.flush_mapped_range(&built.allocation, offset, len) }
    }

    fn check_range(&self, what: &str, offset: u64, len: u64) -> Result<()> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| GpuError::InvalidState(format!("{what} range overflows")))?;
        if end > self.desc.size {
            return Err(GpuError::InvalidState(format!(
                "{what} range {offset}..{end} exceeds buffer size {}",
                self.desc.size
            )));
        }
        Ok(())
    }

    /// Copy `data` to `offset` through a map/unmap pair.
    pub fn write<T: Pod>(&mut self, offset: u64, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let ptr = self.map(offset, bytes.len() as u64)?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());
        }
        self.unmap()
    }

    /// Create a texel view over `[offset, offset + len)`. Only the first call
    /// has an effect.
    pub fn build_view(&mut self, format: ImageFormat, offset: u64, len: u64) -> Result<()> {
        if self.view.is_some() {
            return Ok(());
        }
        let handle = self.handle()?;

        let info = vk::BufferViewCreateInfo::default()
            .buffer(handle)
            .format(format.to_vk())
            .offset(offset)
            .range(len);
        let view = unsafe { self.device.create_buffer_view(&info)? };
        tracing::debug!("Built buffer view {:?} over {:?} as {:?}", view, handle, format);

        self.view = Some(view);
        Ok(())
    }

    /// The texel view made by [`Self::build_view`].
    pub fn view(&self) -> Result<vk::BufferView> {
        self.view.ok_or(GpuError::NotBuilt("Buffer view"))
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let Some(built) = self.built.take() else {
            return;
        };
        // Outstanding maps end with the buffer.
        self.map_count = 0;
        unsafe {
            if let Some(view) = self.view.take() {
                self.device.destroy_buffer_view(view);
            }
            self.device.destroy_buffer(built.handle, built.allocation);
        }
        tracing::debug!("Destroyed buffer {:?}", built.handle);
    }
}
