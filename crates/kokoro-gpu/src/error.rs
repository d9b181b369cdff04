//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// A native object-creation call did not return success.
    #[error("Failed to create {object}: {result}")]
    Creation {
        object: &'static str,
        result: vk::Result,
    },

    /// The Vulkan loader could not be opened.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// The instance reports no physical devices at all.
    #[error("Failed to find Vulkan compatible device")]
    NoVulkanDevice,

    /// No suitable GPU found.
    #[error("Failed to find a suitable GPU")]
    NoSuitableDevice,

    /// No graphics family can present to the surface.
    #[error("Separate present queue support hasn't been implemented")]
    SeparatePresentQueue,

    /// Caller passed an out-of-bounds index.
    #[error("{what} index {index} is out of range (count {count})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        count: usize,
    },

    /// A handle was requested from an object that has not been built.
    #[error("{0} has not been built")]
    NotBuilt(&'static str),

    /// Configuration was changed on an object that is already built.
    #[error("{0} is locked after build")]
    Locked(&'static str),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Shader bytecode was rejected before reaching the driver.
    #[error("Invalid shader bytecode: {0}")]
    InvalidShader(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GpuError {
    /// Map a failed creation call for `object` into [`GpuError::Creation`].
    pub fn creation(object: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Creation { object, result }
    }

    /// Check `index` against `count`.
    pub(crate) fn check_index(what: &'static str, index: usize, count: usize) -> Result<()> {
        if index < count {
            Ok(())
        } else {
            Err(Self::IndexOutOfRange { what, index, count })
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
