use std::ffi::c_char;

use ash::vk;

use crate::gpu::{CanvasError, Result};
use crate::host::PlatformSurfaceInfo;

/// Instance extensions needed to present to `platform`, plus the flags the
/// instance has to be created with.
pub(super) fn instance_extensions(
    platform: &PlatformSurfaceInfo,
    validation: bool,
) -> Result<(Vec<*const c_char>, vk::InstanceCreateFlags)> {
    let (mut exts, flags) = match platform {
        PlatformSurfaceInfo::MetalLayer { .. } => (
            vec![
                ash::khr::surface::NAME.as_ptr(),
                ash::ext::metal_surface::NAME.as_ptr(),
                ash::khr::portability_enumeration::NAME.as_ptr(),
            ],
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR,
        ),
        _ => (
            ash_window::enumerate_required_extensions(platform.raw_display_handle())?.to_vec(),
            vk::InstanceCreateFlags::empty(),
        ),
    };

    if validation {
        exts.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    Ok((exts, flags))
}

/// Creates a presentable surface for the host drawable.
///
/// # Safety
/// `instance` must have been created with the extensions returned by
/// [`instance_extensions`] for the same `platform`.
pub(super) unsafe fn create_surface(
    entry: &ash::Entry,
    instance: &ash::Instance,
    platform: &PlatformSurfaceInfo,
) -> Result<vk::SurfaceKHR> {
    match platform {
        PlatformSurfaceInfo::MetalLayer { layer } => {
            let loader = ash::ext::metal_surface::Instance::new(entry, instance);
            let info = vk::MetalSurfaceCreateInfoEXT::default()
                .layer(layer.as_ptr() as *const vk::CAMetalLayer);
            Ok(loader.create_metal_surface(&info, None)?)
        }
        _ => {
            let window = platform.raw_window_handle().ok_or_else(|| {
                CanvasError::ContextCreationFailed(format!(
                    "{} surface has no window handle",
                    platform.kind()
                ))
            })?;
            Ok(ash_window::create_surface(
                entry,
                instance,
                platform.raw_display_handle(),
                window,
                None,
            )?)
        }
    }
}
