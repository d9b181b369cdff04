//! Vulkan instance creation and the validation message sink.

use crate::error::{GpuError, Result};
use ash::vk;
use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr, CString};

/// Standard validation layer bundle.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Owned Vulkan instance together with the loader it came from.
pub struct Instance {
    entry: ash::Entry,
    instance: ash::Instance,
}

impl Instance {
    /// Load Vulkan and create an instance.
    ///
    /// `extensions` are the window-system extensions; debug utils is added
    /// when validating. A missing validation layer is reported and skipped.
    pub fn new(
        app_name: &str,
        engine_name: &str,
        extensions: &[*const c_char],
        enable_validation: bool,
    ) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let app_name = CString::new(app_name)
            .map_err(|_| GpuError::InvalidState("Application name contains NUL".to_string()))?;
        let engine_name = CString::new(engine_name)
            .map_err(|_| GpuError::InvalidState("Engine name contains NUL".to_string()))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_1);

        let mut extension_names = extensions.to_vec();
        if enable_validation {
            extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let mut layer_names: Vec<*const c_char> = Vec::new();
        if enable_validation {
            let available = unsafe { entry.enumerate_instance_layer_properties()? };
            let found = available
                .iter()
                .any(|props| props.layer_name_as_c_str().ok() == Some(VALIDATION_LAYER));
            if found {
                layer_names.push(VALIDATION_LAYER.as_ptr());
            } else {
                tracing::warn!(
                    "Validation layer {} not available",
                    VALIDATION_LAYER.to_string_lossy()
                );
            }
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(GpuError::creation("instance"))?;

        Ok(Self { entry, instance })
    }

    /// The Vulkan loader.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// The raw `ash` instance.
    pub fn raw(&self) -> &ash::Instance {
        &self.instance
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug messenger that forwards validation output to `tracing`.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Create a messenger that forwards validation output to `tracing`.
    pub fn new(instance: &Instance) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(instance.entry(), instance.raw());

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let handle = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .map_err(GpuError::creation("debug messenger"))?;

        Ok(Self { loader, handle })
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.handle, None);
        }
    }
}

unsafe extern "system" fn vulkan_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() || (*callback_data).p_message.is_null() {
        Cow::Borrowed("No message")
    } else {
        CStr::from_ptr((*callback_data).p_message).to_string_lossy()
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", "[{message_type:?}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", "[{message_type:?}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::info!(target: "vulkan", "[{message_type:?}] {message}");
    } else {
        tracing::trace!(target: "vulkan", "[{message_type:?}] {message}");
    }

    vk::FALSE
}
