// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Surface creation (via ash-window)
// - Physical device selection and queue family discovery
// - Logical device + queue creation

use ash::extensions::{ext, khr};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;
use winit::window::Window;

use crate::error::{RenderError, Result};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

fn required_device_extensions() -> Vec<&'static CStr> {
    vec![khr::Swapchain::name()]
}

/// Queue family indices needed for rendering and presentation.
///
/// Both must be present before a logical device may be created; they may
/// refer to the same family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Scan families in index order, keeping the lowest index satisfying
    /// each predicate, and stop as soon as both are found.
    pub fn find<F>(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: F,
    ) -> std::result::Result<Self, vk::Result>
    where
        F: FnMut(u32) -> std::result::Result<bool, vk::Result>,
    {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if indices.graphics.is_none()
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics = Some(index);
            }

            if indices.present.is_none() && supports_present(index)? {
                indices.present = Some(index);
            }

            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }
}

/// True iff every required extension name appears in the reported set.
pub fn supports_required_extensions(
    available: &[vk::ExtensionProperties],
    required: &[&CStr],
) -> bool {
    let available: HashSet<&CStr> = available
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
        .collect();

    required.iter().all(|name| available.contains(name))
}

/// Vulkan device wrapper owning the session root objects.
///
/// Drop order inside `drop()` realizes the teardown tail:
/// device -> debug messenger -> surface -> instance.
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub graphics_family: u32,
    pub present_family: u32,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: khr::Surface,
    debug_utils: Option<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    _entry: Entry,
}

impl VulkanDevice {
    /// Build the whole device session for the given window.
    ///
    /// `enable_validation` is resolved by the caller once at startup.
    pub fn new(window: &Window, app_name: &str, enable_validation: bool) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        let entry = unsafe { Entry::load() }
            .map_err(|e| RenderError::LibraryLoadFailed(e.to_string()))?;

        let display_handle = window.raw_display_handle();
        let window_handle = window.raw_window_handle();

        let instance = Self::create_instance(&entry, app_name, display_handle, enable_validation)?;
        let surface_loader = khr::Surface::new(&entry, &instance);

        // Everything past this point must unwind the prefix it built on
        // failure, since the instance (and later the messenger and surface)
        // are raw handles without their own destructors.
        let mut debug_utils = None;
        let mut surface = None;

        let built = Self::build_session(
            &entry,
            &instance,
            &surface_loader,
            display_handle,
            window_handle,
            enable_validation,
            &mut debug_utils,
            &mut surface,
        );

        match built {
            Ok((physical_device, graphics_family, present_family, device)) => {
                let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
                let present_queue = unsafe { device.get_device_queue(present_family, 0) };

                Ok(Arc::new(Self {
                    device,
                    physical_device,
                    graphics_queue,
                    present_queue,
                    graphics_family,
                    present_family,
                    surface: surface.take().unwrap_or_else(vk::SurfaceKHR::null),
                    surface_loader,
                    debug_utils,
                    instance,
                    _entry: entry,
                }))
            }
            Err(err) => {
                unsafe {
                    if let Some(s) = surface.take() {
                        surface_loader.destroy_surface(s, None);
                    }
                    if let Some((du, messenger)) = debug_utils.take() {
                        du.destroy_debug_utils_messenger(messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_session(
        entry: &Entry,
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        display_handle: raw_window_handle::RawDisplayHandle,
        window_handle: raw_window_handle::RawWindowHandle,
        enable_validation: bool,
        debug_utils: &mut Option<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
        surface: &mut Option<vk::SurfaceKHR>,
    ) -> Result<(vk::PhysicalDevice, u32, u32, ash::Device)> {
        if enable_validation {
            *debug_utils = Some(Self::setup_debug_messenger(entry, instance)?);
        }

        let created = unsafe {
            ash_window::create_surface(entry, instance, display_handle, window_handle, None)
        }
        .map_err(RenderError::SurfaceCreationFailed)?;
        *surface = Some(created);

        let (physical_device, indices) =
            Self::pick_physical_device(instance, surface_loader, created)?;

        // is_complete held during selection
        let graphics_family = indices.graphics.ok_or(RenderError::NoSuitableDevice)?;
        let present_family = indices.present.ok_or(RenderError::NoSuitableDevice)?;

        let device = Self::create_logical_device(
            instance,
            physical_device,
            graphics_family,
            present_family,
            enable_validation,
        )?;

        Ok((physical_device, graphics_family, present_family, device))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        display_handle: raw_window_handle::RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)
            .map_err(|_| RenderError::InstanceCreationFailed(vk::Result::ERROR_INITIALIZATION_FAILED))?;
        let engine_name = c"No Engine";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(display_handle)
                .map_err(RenderError::InstanceCreationFailed)?
                .to_vec();

        if enable_validation {
            extensions.push(ext::DebugUtils::name().as_ptr());
        }

        let layer_names: Vec<*const c_char> = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        unsafe { entry.create_instance(&create_info, None) }
            .map_err(RenderError::InstanceCreationFailed)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(RenderError::DebugMessengerCreationFailed)?;

        Ok((debug_utils, messenger))
    }

    /// Select the first enumerated device that is suitable.
    ///
    /// No scoring of discrete vs. integrated GPUs: enumeration order wins.
    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(RenderError::DeviceQueryFailed)?;

        if devices.is_empty() {
            return Err(RenderError::NoDevicesAvailable);
        }

        for device in devices {
            if let Some(indices) =
                Self::query_suitability(instance, device, surface_loader, surface)?
            {
                let props = unsafe { instance.get_physical_device_properties(device) };
                let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) };
                log::info!("Selected GPU: {}", name.to_string_lossy());
                log::info!(
                    "API version: {}.{}.{}",
                    vk::api_version_major(props.api_version),
                    vk::api_version_minor(props.api_version),
                    vk::api_version_patch(props.api_version)
                );
                return Ok((device, indices));
            }
        }

        Err(RenderError::NoSuitableDevice)
    }

    /// Suitability: complete queue families, required extensions, and at
    /// least one surface format and one present mode.
    fn query_suitability(
        instance: &ash::Instance,
        device: vk::PhysicalDevice,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<Option<QueueFamilyIndices>> {
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let indices = QueueFamilyIndices::find(&families, |index| unsafe {
            surface_loader.get_physical_device_surface_support(device, index, surface)
        })
        .map_err(RenderError::DeviceQueryFailed)?;

        if !indices.is_complete() {
            return Ok(None);
        }

        let available = unsafe { instance.enumerate_device_extension_properties(device) }
            .map_err(RenderError::DeviceQueryFailed)?;
        if !supports_required_extensions(&available, &required_device_extensions()) {
            return Ok(None);
        }

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(device, surface)
        }
        .map_err(RenderError::DeviceQueryFailed)?;
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(device, surface)
        }
        .map_err(RenderError::DeviceQueryFailed)?;

        if formats.is_empty() || present_modes.is_empty() {
            return Ok(None);
        }

        Ok(Some(indices))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_family: u32,
        present_family: u32,
        enable_validation: bool,
    ) -> Result<ash::Device> {
        // One queue per unique family; a single combined queue when the
        // graphics and present families coincide.
        let unique_families: Vec<u32> = if graphics_family == present_family {
            vec![graphics_family]
        } else {
            vec![graphics_family, present_family]
        };

        let queue_priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<*const c_char> = required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let layer_names: Vec<*const c_char> = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names)
            .enabled_features(&features);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(RenderError::DeviceCreationFailed)
    }

    /// Wait for the device to go idle (before any teardown).
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.map_err(RenderError::DeviceWaitFailed)
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        unsafe {
            self.device.destroy_device(None);
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}

// Routes validation layer output into the log crate.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, &src) in props
            .extension_name
            .iter_mut()
            .zip(name.to_bytes_with_nul())
        {
            *dst = src as c_char;
        }
        props
    }

    #[test]
    fn scan_picks_lowest_indices() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];

        // Present support only on family 0.
        let indices = QueueFamilyIndices::find(&families, |i| Ok(i == 0)).unwrap();
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(0));
        assert!(indices.is_complete());
    }

    #[test]
    fn scan_stops_once_complete() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];

        let mut probed = 0;
        let indices = QueueFamilyIndices::find(&families, |_| {
            probed += 1;
            Ok(true)
        })
        .unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert_eq!(probed, 1);
    }

    #[test]
    fn scan_incomplete_without_graphics() {
        let families = [family(vk::QueueFlags::TRANSFER)];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(true)).unwrap();
        assert_eq!(indices.graphics, None);
        assert_eq!(indices.present, Some(0));
        assert!(!indices.is_complete());
    }

    #[test]
    fn scan_incomplete_without_present() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(false)).unwrap();
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, None);
        assert!(!indices.is_complete());
    }

    #[test]
    fn scan_propagates_query_errors() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = QueueFamilyIndices::find(&families, |_| {
            Err(vk::Result::ERROR_SURFACE_LOST_KHR)
        });
        assert_eq!(result.unwrap_err(), vk::Result::ERROR_SURFACE_LOST_KHR);
    }

    #[test]
    fn extension_check_is_set_difference() {
        let available = [
            extension(c"VK_KHR_swapchain"),
            extension(c"VK_EXT_debug_utils"),
        ];

        assert!(supports_required_extensions(
            &available,
            &[c"VK_KHR_swapchain"]
        ));
        assert!(!supports_required_extensions(
            &available,
            &[c"VK_KHR_swapchain", c"VK_KHR_ray_tracing_pipeline"]
        ));
        assert!(supports_required_extensions(&available, &[]));
    }
}
