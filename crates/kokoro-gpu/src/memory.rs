//! GPU memory management.

use crate::error::{GpuError, Result};
use crate::formats::MemoryUsage;
use ash::vk;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use std::ptr::NonNull;

/// Host pointer into a mapped allocation.
#[derive(Debug, Clone, Copy)]
struct MappedPtr(NonNull<u8>);

// The pointer targets device memory owned by the allocation; access is
// serialised by the owning resource.
unsafe impl Send for MappedPtr {}
unsafe impl Sync for MappedPtr {}

/// A sub-allocation of device memory bound to exactly one buffer or image.
///
/// Owned by the resource that requested it and returned to the device in the
/// matching destroy call.
#[derive(Debug)]
pub struct Allocation {
    inner: Option<gpu_allocator::vulkan::Allocation>,
    memory: vk::DeviceMemory,
    offset: u64,
    size: u64,
    mapped: Option<MappedPtr>,
}

impl Allocation {
    fn from_allocator(inner: gpu_allocator::vulkan::Allocation) -> Self {
        let mapped = inner
            .mapped_ptr()
            .map(|p| MappedPtr(p.cast::<u8>()));
        Self {
            memory: unsafe { inner.memory() },
            offset: inner.offset(),
            size: inner.size(),
            mapped,
            inner: Some(inner),
        }
    }

    /// Allocation that is not backed by the allocator library.
    pub(crate) fn from_parts(
        memory: vk::DeviceMemory,
        offset: u64,
        size: u64,
        mapped: Option<NonNull<u8>>,
    ) -> Self {
        Self {
            inner: None,
            memory,
            offset,
            size,
            mapped: mapped.map(MappedPtr),
        }
    }

    /// Device memory object the resource is bound to.
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Offset of this allocation inside [`Self::memory`].
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size of the allocation in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Host pointer to the start of the allocation, if it is host visible.
    ///
    /// Valid for the whole lifetime of the allocation.
    pub fn mapped_ptr(&self) -> Option<NonNull<u8>> {
        self.mapped.map(|p| p.0)
    }
}

/// Sharing mode and queue-family list to attach to a create info.
///
/// Concurrent sharing carries every family gathered at bootstrap. With fewer
/// than two distinct families there is nothing to share between, so the
/// resource falls back to exclusive ownership.
pub fn resolve_sharing(mode: vk::SharingMode, families: &[u32]) -> (vk::SharingMode, &[u32]) {
    if mode == vk::SharingMode::CONCURRENT {
        if families.len() > 1 {
            return (vk::SharingMode::CONCURRENT, families);
        }
        tracing::warn!(
            "Concurrent sharing requested with {} queue family, using exclusive",
            families.len()
        );
    }
    (vk::SharingMode::EXCLUSIVE, &[])
}

/// Byte window of a flush request, widened to the non-coherent atom size.
///
/// `offset` and `size` are relative to the allocation; the result is absolute
/// within the device memory object. A window whose widened end would pass the
/// end of the allocation runs to the end of the memory object instead.
pub fn flush_window(allocation: &Allocation, offset: u64, size: u64, atom: u64) -> (u64, u64) {
    let atom = atom.max(1);
    let limit = allocation.offset.saturating_add(allocation.size);
    let start = allocation.offset.saturating_add(offset).min(limit);
    let end = start.saturating_add(size).min(limit);
    let aligned_start = start - start % atom;
    match end.div_ceil(atom).checked_mul(atom) {
        Some(aligned_end) if aligned_end <= limit => (aligned_start, aligned_end - aligned_start),
        _ => (aligned_start, vk::WHOLE_SIZE),
    }
}

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: ash::Device,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device: device.clone(),
        })
    }

    fn allocate(
        &mut self,
        desc: &AllocationCreateDesc<'_>,
    ) -> Result<gpu_allocator::vulkan::Allocation> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator has been shut down".to_string()))?
            .allocate(desc)
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    /// Create a buffer and bind fresh memory to it.
    ///
    /// # Safety
    /// `info` must be a valid buffer create info for this device.
    pub unsafe fn create_buffer(
        &mut self,
        info: &vk::BufferCreateInfo<'_>,
        usage: MemoryUsage,
        name: &str,
    ) -> Result<(vk::Buffer, Allocation)> {
        let buffer = self
            .device
            .create_buffer(info, None)
            .map_err(GpuError::creation("buffer"))?;

        let requirements = self.device.get_buffer_memory_requirements(buffer);

        let allocation = match self.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: usage.to_location(),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                self.device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };

        if let Err(e) =
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        {
            self.release(allocation);
            self.device.destroy_buffer(buffer, None);
            return Err(e.into());
        }

        Ok((buffer, Allocation::from_allocator(allocation)))
    }

    /// Destroy a buffer and return its memory.
    ///
    /// # Safety
    /// The buffer must not be in use and `allocation` must be the one returned
    /// with it.
    pub unsafe fn destroy_buffer(&mut self, buffer: vk::Buffer, allocation: Allocation) {
        if let Some(inner) = allocation.inner {
            self.release(inner);
        }
        self.device.destroy_buffer(buffer, None);
    }

    /// Create an image and bind fresh memory to it.
    ///
    /// # Safety
    /// `info` must be a valid image create info for this device.
    pub unsafe fn create_image(
        &mut self,
        info: &vk::ImageCreateInfo<'_>,
        usage: MemoryUsage,
        name: &str,
    ) -> Result<(vk::Image, Allocation)> {
        let image = self
            .device
            .create_image(info, None)
            .map_err(GpuError::creation("image"))?;

        let requirements = self.device.get_image_memory_requirements(image);

        let allocation = match self.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: usage.to_location(),
            linear: info.tiling == vk::ImageTiling::LINEAR,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                self.device.destroy_image(image, None);
                return Err(e);
            }
        };

        if let Err(e) = self
            .device
            .bind_image_memory(image, allocation.memory(), allocation.offset())
        {
            self.release(allocation);
            self.device.destroy_image(image, None);
            return Err(e.into());
        }

        Ok((image, Allocation::from_allocator(allocation)))
    }

    /// Destroy an image and return its memory.
    ///
    /// # Safety
    /// The image must not be in use and `allocation` must be the one returned
    /// with it.
    pub unsafe fn destroy_image(&mut self, image: vk::Image, allocation: Allocation) {
        if let Some(inner) = allocation.inner {
            self.release(inner);
        }
        self.device.destroy_image(image, None);
    }

    fn release(&mut self, allocation: gpu_allocator::vulkan::Allocation) {
        if let Some(allocator) = self.allocator.as_mut() {
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free allocation: {e}");
            }
        }
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// Must run before the logical device is destroyed.
    pub fn shutdown(&mut self) {
        drop(self.allocator.take());
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_keeps_all_families() {
        let families = [0, 2, 3];
        let (mode, list) = resolve_sharing(vk::SharingMode::CONCURRENT, &families);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(list, &families);
    }

    #[test]
    fn concurrent_with_one_family_is_exclusive() {
        let (mode, list) = resolve_sharing(vk::SharingMode::CONCURRENT, &[0]);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(list.is_empty());
    }

    #[test]
    fn exclusive_attaches_no_families() {
        let (mode, list) = resolve_sharing(vk::SharingMode::EXCLUSIVE, &[0, 1]);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(list.is_empty());
    }

    #[test]
    fn flush_window_is_atom_aligned() {
        let allocation = Allocation::from_parts(vk::DeviceMemory::null(), 256, 1024, None);
        assert_eq!(flush_window(&allocation, 10, 20, 64), (256, 64));
        assert_eq!(flush_window(&allocation, 60, 10, 64), (256, 128));
        assert_eq!(flush_window(&allocation, 0, 1024, 1), (256, 1024));
    }

    #[test]
    fn flush_window_stays_inside_allocation() {
        let allocation = Allocation::from_parts(vk::DeviceMemory::null(), 0, 100, None);
        assert_eq!(flush_window(&allocation, 0, 100, 64), (0, vk::WHOLE_SIZE));
        assert_eq!(flush_window(&allocation, 70, 30, 64), (64, vk::WHOLE_SIZE));
        assert_eq!(flush_window(&allocation, 0, 64, 64), (0, 64));
        assert_eq!(flush_window(&allocation, 32, u64::MAX, 64), (0, vk::WHOLE_SIZE));
    }
}
