//! Explicit-GPU variant: a Vulkan device and swapchain on the host surface.

mod surface;
mod swapchain;

use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr::NonNull;

use ash::vk;
use log::{debug, error, info, trace, warn};

use super::{
    Binding, CanvasError, ContextInfo, ContextProvider, InitPolicy, ProcAddress, Result, Size,
    SurfaceInvalidation,
};
use super::acquire::{acquire_frame, AcquireTarget, Acquired};
use crate::host::PlatformSurfaceInfo;
use swapchain::{Swapchain, SwapchainTarget};

/// Names of debugging layers that are enabled when validation is requested.
pub const DEBUG_LAYER_NAMES: [&CStr; 1] = [c"VK_LAYER_KHRONOS_validation"];

/// Must be enabled on devices that advertise it (MoltenVK).
const PORTABILITY_SUBSET: &CStr = c"VK_KHR_portability_subset";

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();
    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[{message_type:?}] {message}");
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[{message_type:?}] {message}");
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!("[{message_type:?}] {message}");
    } else {
        trace!("[{message_type:?}] {message}");
    }
    vk::FALSE
}

struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

/// Swapchain image handed to the engine for one frame.
#[derive(Debug, Clone, Copy)]
pub struct AcquiredImage {
    pub index: u32,
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    /// Signalled once the image is ready to be rendered to.
    pub ready: vk::Semaphore,
}

/// Vulkan instance, device and swapchain bound to the host surface.
///
/// Created together with the backend: the surface must exist before a
/// device with presentation support can be picked.
pub struct VulkanContext {
    entry: ash::Entry,
    instance: ash::Instance,
    debug: Option<DebugMessenger>,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    pdevice: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    queue_family: u32,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: Option<Swapchain>,
    image_ready: vk::Semaphore,
    acquire_fence: vk::Fence,
    acquired: Option<u32>,
    invalidation: SurfaceInvalidation,
    info: ContextInfo,
}

fn has_instance_layer(entry: &ash::Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .map(|layers| {
            layers
                .iter()
                .any(|prop| prop.layer_name_as_c_str().map(|n| n == name).unwrap_or(false))
        })
        .unwrap_or(false)
}

fn device_has_extension(
    instance: &ash::Instance,
    pdevice: vk::PhysicalDevice,
    name: &CStr,
) -> bool {
    unsafe { instance.enumerate_device_extension_properties(pdevice) }
        .map(|exts| {
            exts.iter()
                .any(|e| e.extension_name_as_c_str().map(|n| n == name).unwrap_or(false))
        })
        .unwrap_or(false)
}

/// Picks a device able to render to and present on `surface`, preferring
/// discrete GPUs.
fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    let pdevices = unsafe { instance.enumerate_physical_devices()? };
    let mut best: Option<(vk::PhysicalDevice, u32, bool)> = None;

    for pdevice in pdevices {
        if !device_has_extension(instance, pdevice, ash::khr::swapchain::NAME) {
            continue;
        }
        let families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        let family = families.iter().enumerate().find_map(|(idx, props)| {
            let idx = idx as u32;
            let present = unsafe {
                surface_loader
                    .get_physical_device_surface_support(pdevice, idx, surface)
                    .unwrap_or(false)
            };
            (props.queue_flags.contains(vk::QueueFlags::GRAPHICS) && present).then_some(idx)
        });
        let Some(family) = family else {
            continue;
        };

        let props = unsafe { instance.get_physical_device_properties(pdevice) };
        let discrete = props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
        if best.map_or(true, |(_, _, best_discrete)| discrete && !best_discrete) {
            best = Some((pdevice, family, discrete));
        }
    }

    best.map(|(pdevice, family, _)| (pdevice, family)).ok_or_else(|| {
        CanvasError::ContextCreationFailed(
            "no device supports graphics, presentation and VK_KHR_swapchain".to_string(),
        )
    })
}

impl VulkanContext {
    unsafe fn create_instance(
        entry: &ash::Entry,
        platform: &PlatformSurfaceInfo,
        info: &ContextInfo,
        validation: bool,
    ) -> Result<ash::Instance> {
        let app_name = CString::new(info.application_name.as_str())
            .unwrap_or_else(|_| CString::from(c"canvas-gfx"));
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .engine_name(c"canvas-gfx")
            .api_version(vk::API_VERSION_1_1);

        let (extensions, flags) = surface::instance_extensions(platform, validation)?;

        let mut layers: Vec<*const c_char> = Vec::new();
        if validation {
            for name in DEBUG_LAYER_NAMES {
                if has_instance_layer(entry, name) {
                    layers.push(name.as_ptr());
                } else {
                    warn!("validation layer {name:?} not found");
                }
            }
        }

        let create_info = vk::InstanceCreateInfo::default()
            .flags(flags)
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        Ok(entry.create_instance(&create_info, None)?)
    }

    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Option<DebugMessenger> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let messenger_ci = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));
        match loader.create_debug_utils_messenger(&messenger_ci, None) {
            Ok(handle) => Some(DebugMessenger { loader, handle }),
            Err(err) => {
                warn!("failed to create debug messenger: {err}");
                None
            }
        }
    }

    unsafe fn create_device(
        instance: &ash::Instance,
        pdevice: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<ash::Device> {
        let priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities);

        let mut extensions = vec![ash::khr::swapchain::NAME.as_ptr()];
        if device_has_extension(instance, pdevice, PORTABILITY_SUBSET) {
            extensions.push(PORTABILITY_SUBSET.as_ptr());
        }

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_info))
            .enabled_extension_names(&extensions);
        Ok(instance.create_device(pdevice, &create_info, None)?)
    }

    /// The raw instance, for engines that record their own commands.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.pdevice
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family
    }

    pub fn swapchain_format(&self) -> Option<vk::Format> {
        self.swapchain.as_ref().map(|sc| sc.format.format)
    }

    pub fn extent(&self) -> Size {
        self.swapchain
            .as_ref()
            .map(|sc| Size::new(sc.extent.width, sc.extent.height))
            .unwrap_or_default()
    }

    /// True when a swapchain rebuild is queued for the next acquisition.
    pub fn rebuild_pending(&self) -> bool {
        self.invalidation.is_pending()
    }

    fn target(&self) -> SwapchainTarget<'_> {
        SwapchainTarget {
            device: &self.device,
            surface_loader: &self.surface_loader,
            swapchain_loader: &self.swapchain_loader,
            pdevice: self.pdevice,
            surface: self.surface,
        }
    }

    fn rebuild_swapchain(&mut self, size: Size) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        let old = self.swapchain.take();
        let old_handle = old.as_ref().map_or(vk::SwapchainKHR::null(), |sc| sc.handle);
        let rebuilt = unsafe { Swapchain::create(&self.target(), &self.info, size, old_handle) };
        if let Some(old) = old {
            unsafe { old.destroy(&self.device, &self.swapchain_loader) };
        }
        self.swapchain = Some(rebuilt?);
        self.acquired = None;
        debug!("swapchain rebuilt for {}x{}", size.width, size.height);
        Ok(())
    }

    /// Acquires the next swapchain image, rebuilding the swapchain first if a
    /// resize is pending.
    pub fn acquire_next_image(&mut self) -> Result<AcquiredImage> {
        let index = acquire_frame(self)?;
        let sc = self.swapchain.as_ref().ok_or_else(|| {
            CanvasError::Render("no swapchain for an empty surface".to_string())
        })?;

        self.acquired = Some(index);
        Ok(AcquiredImage {
            index,
            image: sc.images[index as usize],
            view: sc.views[index as usize],
            format: sc.format.format,
            extent: sc.extent,
            ready: self.image_ready,
        })
    }

    /// Presents the acquired image once `wait` semaphores are signalled.
    pub fn present_with(&mut self, wait: &[vk::Semaphore]) -> Result<()> {
        let Some(index) = self.acquired.take() else {
            return Ok(());
        };
        let Some(sc) = self.swapchain.as_ref() else {
            return Ok(());
        };

        let swapchains = [sc.handle];
        let indices = [index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait)
            .swapchains(&swapchains)
            .image_indices(&indices);
        match unsafe { self.swapchain_loader.queue_present(self.queue, &present_info) } {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.invalidation.invalidate();
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl AcquireTarget for VulkanContext {
    fn invalidation(&mut self) -> &mut SurfaceInvalidation {
        &mut self.invalidation
    }

    fn has_swapchain(&self) -> bool {
        self.swapchain.is_some()
    }

    fn rebuild(&mut self, size: Size) -> Result<()> {
        self.rebuild_swapchain(size)
    }

    fn wait_and_reset_fence(&mut self) -> Result<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.acquire_fence], true, u64::MAX)?;
            self.device.reset_fences(&[self.acquire_fence])?;
        }
        Ok(())
    }

    fn rearm_fence(&mut self) -> Result<()> {
        let signalled = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let fence = unsafe { self.device.create_fence(&signalled, None)? };
        unsafe { self.device.destroy_fence(self.acquire_fence, None) };
        self.acquire_fence = fence;
        Ok(())
    }

    fn acquire(&mut self) -> Result<Acquired> {
        let Some(sc) = self.swapchain.as_ref() else {
            return Err(CanvasError::Render(
                "no swapchain for an empty surface".to_string(),
            ));
        };
        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(
                sc.handle,
                u64::MAX,
                self.image_ready,
                self.acquire_fence,
            )
        };
        match acquired {
            Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
            Err(err) => Err(err.into()),
        }
    }
}

impl ContextProvider for VulkanContext {
    const INIT_POLICY: InitPolicy = InitPolicy::Eager;

    fn init(platform: &PlatformSurfaceInfo, info: &ContextInfo, size: Size) -> Result<Self> {
        let validation = info.validation_requested();
        let entry = unsafe { ash::Entry::load()? };
        let instance = unsafe { Self::create_instance(&entry, platform, info, validation)? };
        let debug = if validation {
            unsafe { Self::create_debug_messenger(&entry, &instance) }
        } else {
            None
        };

        let destroy_instance = |debug: Option<DebugMessenger>| unsafe {
            if let Some(debug) = debug {
                debug.loader.destroy_debug_utils_messenger(debug.handle, None);
            }
            instance.destroy_instance(None);
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let surface = match unsafe { surface::create_surface(&entry, &instance, platform) } {
            Ok(surface) => surface,
            Err(err) => {
                destroy_instance(debug);
                return Err(err);
            }
        };

        let picked = pick_physical_device(&instance, &surface_loader, surface);
        let device = picked.and_then(|(pdevice, family)| {
            let device = unsafe { Self::create_device(&instance, pdevice, family)? };
            Ok((pdevice, family, device))
        });
        let (pdevice, queue_family, device) = match device {
            Ok(parts) => parts,
            Err(err) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                destroy_instance(debug);
                return Err(err);
            }
        };

        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        let sync = unsafe {
            device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .and_then(|sem| {
                    device
                        .create_fence(
                            &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                            None,
                        )
                        .map(|fence| (sem, fence))
                        .inspect_err(|_| device.destroy_semaphore(sem, None))
                })
        };
        let (image_ready, acquire_fence) = match sync {
            Ok(sync) => sync,
            Err(err) => {
                unsafe {
                    device.destroy_device(None);
                    surface_loader.destroy_surface(surface, None);
                }
                destroy_instance(debug);
                return Err(err.into());
            }
        };

        let props = unsafe { instance.get_physical_device_properties(pdevice) };
        let device_name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut ctx = VulkanContext {
            entry,
            instance,
            debug,
            surface_loader,
            surface,
            pdevice,
            device,
            queue,
            queue_family,
            swapchain_loader,
            swapchain: None,
            image_ready,
            acquire_fence,
            acquired: None,
            invalidation: SurfaceInvalidation::new(Size::default()),
            info: info.clone(),
        };

        // An empty canvas gets its swapchain on the first non-empty resize.
        if !size.is_empty() {
            if let Err(err) = ctx.rebuild_swapchain(size) {
                ctx.destroy();
                return Err(err);
            }
        }
        ctx.invalidation = SurfaceInvalidation::new(size);

        info!(
            "created Vulkan context on {} ({} surface, validation {})",
            device_name,
            platform.kind(),
            if validation { "on" } else { "off" }
        );
        Ok(ctx)
    }

    fn make_current(&mut self) -> Result<()> {
        Ok(())
    }

    fn release_current(&mut self) -> Result<()> {
        Ok(())
    }

    fn bind(&mut self, _binding: &Binding) -> Result<()> {
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.present_with(&[])
    }

    fn resize(&mut self, size: Size) {
        if self.invalidation.resize(size) {
            debug!(
                "swapchain rebuild requested for {}x{}",
                size.width, size.height
            );
        }
    }

    fn proc_address(&self, name: &CStr) -> Option<ProcAddress> {
        let addr = unsafe {
            self.entry
                .get_instance_proc_addr(self.instance.handle(), name.as_ptr())
        }?;
        NonNull::new(addr as *const () as *mut c_void)
    }

    fn wait(&mut self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn destroy(mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                warn!("device_wait_idle failed during teardown: {err}");
            }
            if let Some(sc) = self.swapchain.take() {
                sc.destroy(&self.device, &self.swapchain_loader);
            }
            self.device.destroy_fence(self.acquire_fence, None);
            self.device.destroy_semaphore(self.image_ready, None);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some(debug) = self.debug.take() {
                debug.loader.destroy_debug_utils_messenger(debug.handle, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("destroyed Vulkan context");
    }
}
