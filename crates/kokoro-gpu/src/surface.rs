//! Presentation surface.
//!
//! The context only needs three things from a window: the instance
//! extensions it requires, a surface created against the instance, and its
//! current size. [`SurfaceProvider`] captures that; [`WindowSurface`]
//! implements it for anything exposing raw window handles.

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::c_char;

/// Supplies a presentation surface and the window extent.
pub trait SurfaceProvider {
    /// Instance extensions needed to create the surface.
    fn required_extensions(&self) -> Result<Vec<*const c_char>>;

    /// Create a surface for this window.
    ///
    /// # Safety
    /// `instance` must have been created with [`Self::required_extensions`].
    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR>;

    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// A window plus the size it currently has.
pub struct WindowSurface<'a, W> {
    window: &'a W,
    width: u32,
    height: u32,
}

impl<'a, W> WindowSurface<'a, W>
where
    W: HasDisplayHandle + HasWindowHandle,
{
    /// Window and its size in pixels.
    pub fn new(window: &'a W, width: u32, height: u32) -> Self {
        Self {
            window,
            width,
            height,
        }
    }
}

impl<W> SurfaceProvider for WindowSurface<'_, W>
where
    W: HasDisplayHandle + HasWindowHandle,
{
    fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let extensions = ash_window::enumerate_required_extensions(display.as_raw())
            .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;
        Ok(extensions.to_vec())
    }

    unsafe fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<vk::SurfaceKHR> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        ash_window::create_surface(entry, instance, display.as_raw(), window_handle.as_raw(), None)
            .map_err(|e| GpuError::SurfaceCreation(e.to_string()))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// Owned surface handle.
pub struct Surface {
    loader: ash::khr::surface::Instance,
    handle: vk::SurfaceKHR,
}

impl Surface {
    /// Create the surface through `provider`.
    ///
    /// # Safety
    /// The instance must outlive the returned surface.
    pub unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        provider: &impl SurfaceProvider,
    ) -> Result<Self> {
        let handle = provider.create_surface(entry, instance)?;
        Ok(Self {
            loader: ash::khr::surface::Instance::new(entry, instance),
            handle,
        })
    }

    /// The surface handle.
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Surface extension functions.
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }

    /// Query surface capabilities for an adapter.
    ///
    /// # Safety
    /// `physical_device` must belong to the instance the surface was made on.
    pub unsafe fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR> {
        Ok(self
            .loader
            .get_physical_device_surface_capabilities(physical_device, self.handle)?)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}
