use std::ffi::{c_int, c_uchar, c_ulong, c_void, CStr};
use std::ptr::{self, NonNull};
use std::sync::OnceLock;

use libloading::Library;
use log::debug;
use raw_window_handle::{RawDisplayHandle, XlibDisplayHandle};

use super::GlPlatform;
use crate::gpu::{CanvasError, ContextInfo, FramebufferConfig, GlVersion, ProcAddress, Result};
use crate::host::PlatformSurfaceInfo;

const GLX_NONE: c_int = 0;
/// `None` drawable; required by `glXMakeCurrent` when releasing.
const NO_DRAWABLE: c_ulong = 0;
const GLX_TRUE: c_int = 1;
const GLX_DOUBLEBUFFER: c_int = 5;
const GLX_RED_SIZE: c_int = 8;
const GLX_GREEN_SIZE: c_int = 9;
const GLX_BLUE_SIZE: c_int = 10;
const GLX_ALPHA_SIZE: c_int = 11;
const GLX_DEPTH_SIZE: c_int = 12;
const GLX_STENCIL_SIZE: c_int = 13;
const GLX_X_VISUAL_TYPE: c_int = 0x22;
const GLX_TRUE_COLOR: c_int = 0x8002;
const GLX_DRAWABLE_TYPE: c_int = 0x8010;
const GLX_RENDER_TYPE: c_int = 0x8011;
const GLX_X_RENDERABLE: c_int = 0x8012;
const GLX_WINDOW_BIT: c_int = 0x1;
const GLX_RGBA_BIT: c_int = 0x1;

const GLX_CONTEXT_MAJOR_VERSION_ARB: c_int = 0x2091;
const GLX_CONTEXT_MINOR_VERSION_ARB: c_int = 0x2092;
const GLX_CONTEXT_PROFILE_MASK_ARB: c_int = 0x9126;
const GLX_CONTEXT_CORE_PROFILE_BIT_ARB: c_int = 0x1;

type Display = c_void;
type GlxFbConfig = *mut c_void;
type GlxContext = *mut c_void;

type ChooseFbConfigFn = unsafe extern "C" fn(
    dpy: *mut Display,
    screen: c_int,
    attrib_list: *const c_int,
    nelements: *mut c_int,
) -> *mut GlxFbConfig;
type GetProcAddressFn = unsafe extern "C" fn(name: *const c_uchar) -> *mut c_void;
type CreateContextAttribsFn = unsafe extern "C" fn(
    dpy: *mut Display,
    config: GlxFbConfig,
    share_context: GlxContext,
    direct: c_int,
    attrib_list: *const c_int,
) -> GlxContext;
type MakeCurrentFn =
    unsafe extern "C" fn(dpy: *mut Display, drawable: c_ulong, ctx: GlxContext) -> c_int;
type SwapBuffersFn = unsafe extern "C" fn(dpy: *mut Display, drawable: c_ulong);
type DestroyContextFn = unsafe extern "C" fn(dpy: *mut Display, ctx: GlxContext);
type XFreeFn = unsafe extern "C" fn(data: *mut c_void) -> c_int;

/// Attribute list for `glXChooseFBConfig`, zero terminated.
pub(crate) fn fb_config_attribs(cfg: &FramebufferConfig) -> Vec<c_int> {
    vec![
        GLX_X_RENDERABLE,
        GLX_TRUE,
        GLX_DRAWABLE_TYPE,
        GLX_WINDOW_BIT,
        GLX_RENDER_TYPE,
        GLX_RGBA_BIT,
        GLX_X_VISUAL_TYPE,
        GLX_TRUE_COLOR,
        GLX_RED_SIZE,
        cfg.red_bits as c_int,
        GLX_GREEN_SIZE,
        cfg.green_bits as c_int,
        GLX_BLUE_SIZE,
        cfg.blue_bits as c_int,
        GLX_ALPHA_SIZE,
        cfg.alpha_bits as c_int,
        GLX_DEPTH_SIZE,
        cfg.depth_bits as c_int,
        GLX_STENCIL_SIZE,
        cfg.stencil_bits as c_int,
        GLX_DOUBLEBUFFER,
        cfg.double_buffered as c_int,
        GLX_NONE,
    ]
}

/// Attribute list for `glXCreateContextAttribsARB`, zero terminated.
pub(crate) fn context_attribs(version: GlVersion) -> Vec<c_int> {
    vec![
        GLX_CONTEXT_MAJOR_VERSION_ARB,
        version.major as c_int,
        GLX_CONTEXT_MINOR_VERSION_ARB,
        version.minor as c_int,
        GLX_CONTEXT_PROFILE_MASK_ARB,
        GLX_CONTEXT_CORE_PROFILE_BIT_ARB,
        GLX_NONE,
    ]
}

struct GlxFunctions {
    get_proc_address: GetProcAddressFn,
    make_current: MakeCurrentFn,
    swap_buffers: SwapBuffersFn,
    destroy_context: DestroyContextFn,
}

/// GLX context on an X11 drawable.
pub(crate) struct Glx {
    display: NonNull<Display>,
    drawable: c_ulong,
    screen: c_int,
    context: GlxContext,
    fns: GlxFunctions,
    // Keeps the function pointers above valid.
    _libgl: Library,
}

/// Drawable/context pair for `glXMakeCurrent`, binding or releasing.
fn current_target(drawable: c_ulong, context: GlxContext, bind: bool) -> (c_ulong, GlxContext) {
    if bind {
        (drawable, context)
    } else {
        (NO_DRAWABLE, ptr::null_mut())
    }
}

struct Loader {
    get_proc_address: GetProcAddressFn,
    _libgl: Library,
}

/// libGL opened once for lookups made before any context exists.
static LOADER: OnceLock<Option<Loader>> = OnceLock::new();

fn loader() -> Option<&'static Loader> {
    LOADER
        .get_or_init(|| {
            let libgl = open_libgl().ok()?;
            let get_proc_address =
                unsafe { symbol::<GetProcAddressFn>(&libgl, b"glXGetProcAddressARB\0") }.ok()?;
            Some(Loader {
                get_proc_address,
                _libgl: libgl,
            })
        })
        .as_ref()
}

fn open_libgl() -> Result<Library> {
    // Safety: loading the system GL library runs no user-supplied initialisers.
    unsafe { Library::new("libGL.so.1").or_else(|_| Library::new("libGL.so")) }
        .map_err(CanvasError::from)
}

unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T> {
    let sym = lib.get::<T>(name)?;
    Ok(*sym)
}

impl Glx {
    fn set_current(&mut self, bind: bool) -> Result<()> {
        let (drawable, context) = current_target(self.drawable, self.context, bind);
        let ok = unsafe { (self.fns.make_current)(self.display.as_ptr(), drawable, context) };
        if ok == 0 {
            return Err(CanvasError::MakeCurrentFailed);
        }
        Ok(())
    }
}

impl GlPlatform for Glx {
    fn create_surface(surface: &PlatformSurfaceInfo, info: &ContextInfo) -> Result<Self> {
        let PlatformSurfaceInfo::Xlib {
            display,
            drawable,
            screen,
        } = *surface
        else {
            return Err(CanvasError::ContextCreationFailed(format!(
                "GLX cannot use a {} surface",
                surface.kind()
            )));
        };

        let libgl = open_libgl()?;
        // Safety: XFree lives in libX11, which libGL always links against.
        let libx11 = unsafe { Library::new("libX11.so.6") }?;

        unsafe {
            let choose_fb_config: ChooseFbConfigFn = symbol(&libgl, b"glXChooseFBConfig\0")?;
            let x_free: XFreeFn = symbol(&libx11, b"XFree\0")?;
            let fns = GlxFunctions {
                get_proc_address: symbol(&libgl, b"glXGetProcAddressARB\0")?,
                make_current: symbol(&libgl, b"glXMakeCurrent\0")?,
                swap_buffers: symbol(&libgl, b"glXSwapBuffers\0")?,
                destroy_context: symbol(&libgl, b"glXDestroyContext\0")?,
            };

            let attribs = fb_config_attribs(&info.framebuffer);
            let mut count: c_int = 0;
            let configs = choose_fb_config(display.as_ptr(), screen, attribs.as_ptr(), &mut count);
            if configs.is_null() || count <= 0 {
                if !configs.is_null() {
                    x_free(configs.cast());
                }
                return Err(CanvasError::NoCompatibleConfig);
            }
            let config = *configs;
            x_free(configs.cast());
            debug!("GLX offered {count} framebuffer configs");

            let create_context = (fns.get_proc_address)(b"glXCreateContextAttribsARB\0".as_ptr());
            if create_context.is_null() {
                return Err(CanvasError::ContextCreationFailed(
                    "glXCreateContextAttribsARB is unavailable".to_string(),
                ));
            }
            let create_context: CreateContextAttribsFn = std::mem::transmute(create_context);

            let ctx_attribs = context_attribs(info.gl_version);
            let context = create_context(
                display.as_ptr(),
                config,
                ptr::null_mut(),
                GLX_TRUE,
                ctx_attribs.as_ptr(),
            );
            if context.is_null() {
                return Err(CanvasError::ContextCreationFailed(format!(
                    "glXCreateContextAttribsARB refused a {}.{} core context",
                    info.gl_version.major, info.gl_version.minor
                )));
            }

            Ok(Self {
                display,
                drawable,
                screen,
                context,
                fns,
                _libgl: libgl,
            })
        }
    }

    fn make_current(&mut self) -> Result<()> {
        self.set_current(true)
    }

    fn release_current(&mut self) -> Result<()> {
        self.set_current(false)
    }

    fn present(&mut self) -> Result<()> {
        unsafe { (self.fns.swap_buffers)(self.display.as_ptr(), self.drawable) };
        Ok(())
    }

    fn display_handle(&self) -> RawDisplayHandle {
        RawDisplayHandle::Xlib(XlibDisplayHandle::new(Some(self.display), self.screen))
    }

    fn proc_address(&self, name: &CStr) -> Option<ProcAddress> {
        let addr = unsafe { (self.fns.get_proc_address)(name.as_ptr().cast()) };
        NonNull::new(addr)
    }

    fn loader_proc_address(name: &CStr) -> Option<ProcAddress> {
        let loader = loader()?;
        NonNull::new(unsafe { (loader.get_proc_address)(name.as_ptr().cast()) })
    }

    fn destroy(self) {
        unsafe { (self.fns.destroy_context)(self.display.as_ptr(), self.context) };
    }
}
