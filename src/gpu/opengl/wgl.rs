use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr::NonNull;
use std::sync::OnceLock;

use libloading::Library;
use log::debug;
use raw_window_handle::{RawDisplayHandle, WindowsDisplayHandle};
use windows::Win32::Foundation::{BOOL, HWND};
use windows::Win32::Graphics::Gdi::{GetDC, ReleaseDC, HDC};
use windows::Win32::Graphics::OpenGL::{
    ChoosePixelFormat, HGLRC, PFD_DOUBLEBUFFER, PFD_DRAW_TO_WINDOW, PFD_SUPPORT_OPENGL,
    PFD_TYPE_RGBA, PIXELFORMATDESCRIPTOR,
};

use super::GlPlatform;
use crate::gpu::{CanvasError, ContextInfo, FramebufferConfig, GlVersion, ProcAddress, Result};
use crate::host::PlatformSurfaceInfo;

const WGL_CONTEXT_MAJOR_VERSION_ARB: c_int = 0x2091;
const WGL_CONTEXT_MINOR_VERSION_ARB: c_int = 0x2092;
const WGL_CONTEXT_PROFILE_MASK_ARB: c_int = 0x9126;
const WGL_CONTEXT_CORE_PROFILE_BIT_ARB: c_int = 0x1;

type CreateContextFn = unsafe extern "system" fn(hdc: HDC) -> HGLRC;
type DeleteContextFn = unsafe extern "system" fn(ctx: HGLRC) -> BOOL;
type MakeCurrentFn = unsafe extern "system" fn(hdc: HDC, ctx: HGLRC) -> BOOL;
type GetProcAddressFn = unsafe extern "system" fn(name: *const c_char) -> *mut c_void;
type SetPixelFormatFn =
    unsafe extern "system" fn(hdc: HDC, format: c_int, pfd: *const PIXELFORMATDESCRIPTOR) -> BOOL;
type SwapBuffersFn = unsafe extern "system" fn(hdc: HDC) -> BOOL;
type CreateContextAttribsFn =
    unsafe extern "system" fn(hdc: HDC, share: HGLRC, attribs: *const c_int) -> HGLRC;

fn pixel_format(cfg: &FramebufferConfig) -> PIXELFORMATDESCRIPTOR {
    let mut flags = PFD_DRAW_TO_WINDOW | PFD_SUPPORT_OPENGL;
    if cfg.double_buffered {
        flags |= PFD_DOUBLEBUFFER;
    }
    PIXELFORMATDESCRIPTOR {
        nSize: std::mem::size_of::<PIXELFORMATDESCRIPTOR>() as u16,
        nVersion: 1,
        dwFlags: flags,
        iPixelType: PFD_TYPE_RGBA,
        cColorBits: cfg.red_bits + cfg.green_bits + cfg.blue_bits,
        cRedBits: cfg.red_bits,
        cGreenBits: cfg.green_bits,
        cBlueBits: cfg.blue_bits,
        cAlphaBits: cfg.alpha_bits,
        cDepthBits: cfg.depth_bits,
        cStencilBits: cfg.stencil_bits,
        ..Default::default()
    }
}

fn context_attribs(version: GlVersion) -> [c_int; 7] {
    [
        WGL_CONTEXT_MAJOR_VERSION_ARB,
        version.major as c_int,
        WGL_CONTEXT_MINOR_VERSION_ARB,
        version.minor as c_int,
        WGL_CONTEXT_PROFILE_MASK_ARB,
        WGL_CONTEXT_CORE_PROFILE_BIT_ARB,
        0,
    ]
}

struct WglFunctions {
    delete_context: DeleteContextFn,
    make_current: MakeCurrentFn,
    get_proc_address: GetProcAddressFn,
    swap_buffers: SwapBuffersFn,
}

/// WGL context on a Win32 window's device context.
pub(crate) struct Wgl {
    hwnd: HWND,
    hdc: HDC,
    context: HGLRC,
    fns: WglFunctions,
    opengl32: Library,
    _gdi32: Library,
}

/// opengl32.dll opened once for lookups made before any context exists.
static OPENGL32: OnceLock<Option<Library>> = OnceLock::new();

/// Reads an export of opengl32.dll, which covers the GL 1.1 entry points.
fn export_address(opengl32: &Library, name: &CStr) -> Option<ProcAddress> {
    unsafe {
        opengl32
            .get::<*mut c_void>(name.to_bytes_with_nul())
            .ok()
            .and_then(|sym| NonNull::new(*sym))
    }
}

unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T> {
    let sym = lib.get::<T>(name)?;
    Ok(*sym)
}

impl GlPlatform for Wgl {
    fn create_surface(surface: &PlatformSurfaceInfo, info: &ContextInfo) -> Result<Self> {
        let PlatformSurfaceInfo::Win32 { hwnd, .. } = *surface else {
            return Err(CanvasError::ContextCreationFailed(format!(
                "WGL cannot use a {} surface",
                surface.kind()
            )));
        };
        let hwnd = HWND(hwnd.get());

        let opengl32 = unsafe { Library::new("opengl32.dll") }?;
        let gdi32 = unsafe { Library::new("gdi32.dll") }?;

        unsafe {
            let create_context: CreateContextFn = symbol(&opengl32, b"wglCreateContext\0")?;
            let set_pixel_format: SetPixelFormatFn = symbol(&gdi32, b"SetPixelFormat\0")?;
            let fns = WglFunctions {
                delete_context: symbol(&opengl32, b"wglDeleteContext\0")?,
                make_current: symbol(&opengl32, b"wglMakeCurrent\0")?,
                get_proc_address: symbol(&opengl32, b"wglGetProcAddress\0")?,
                swap_buffers: symbol(&gdi32, b"SwapBuffers\0")?,
            };

            let hdc = GetDC(hwnd);
            if hdc.is_invalid() {
                return Err(CanvasError::SurfaceUnavailable);
            }
            let release = |err: CanvasError| {
                ReleaseDC(hwnd, hdc);
                err
            };

            let pfd = pixel_format(&info.framebuffer);
            let format = ChoosePixelFormat(hdc, &pfd);
            if format == 0 {
                return Err(release(CanvasError::NoCompatibleConfig));
            }
            if !set_pixel_format(hdc, format, &pfd).as_bool() {
                return Err(release(CanvasError::NoCompatibleConfig));
            }

            // A legacy context has to be current before the ARB entry point resolves.
            let bootstrap = create_context(hdc);
            if bootstrap.is_invalid() {
                return Err(release(CanvasError::ContextCreationFailed(
                    "wglCreateContext failed".to_string(),
                )));
            }
            (fns.make_current)(hdc, bootstrap);
            let create_attribs = (fns.get_proc_address)(c"wglCreateContextAttribsARB".as_ptr());
            let context = if create_attribs.is_null() {
                None
            } else {
                let create_attribs: CreateContextAttribsFn = std::mem::transmute(create_attribs);
                let attribs = context_attribs(info.gl_version);
                Some(create_attribs(hdc, HGLRC::default(), attribs.as_ptr()))
            };
            (fns.make_current)(hdc, HGLRC::default());
            (fns.delete_context)(bootstrap);

            let context = match context {
                Some(ctx) if !ctx.is_invalid() => ctx,
                Some(_) => {
                    return Err(release(CanvasError::ContextCreationFailed(format!(
                        "wglCreateContextAttribsARB refused a {}.{} core context",
                        info.gl_version.major, info.gl_version.minor
                    ))))
                }
                None => {
                    return Err(release(CanvasError::ContextCreationFailed(
                        "wglCreateContextAttribsARB is unavailable".to_string(),
                    )))
                }
            };
            debug!("WGL pixel format {format} selected");

            Ok(Self {
                hwnd,
                hdc,
                context,
                fns,
                opengl32,
                _gdi32: gdi32,
            })
        }
    }

    fn make_current(&mut self) -> Result<()> {
        if !unsafe { (self.fns.make_current)(self.hdc, self.context) }.as_bool() {
            return Err(CanvasError::MakeCurrentFailed);
        }
        Ok(())
    }

    fn release_current(&mut self) -> Result<()> {
        if !unsafe { (self.fns.make_current)(self.hdc, HGLRC::default()) }.as_bool() {
            return Err(CanvasError::MakeCurrentFailed);
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if !unsafe { (self.fns.swap_buffers)(self.hdc) }.as_bool() {
            return Err(CanvasError::Render("SwapBuffers failed".to_string()));
        }
        Ok(())
    }

    fn display_handle(&self) -> RawDisplayHandle {
        RawDisplayHandle::Windows(WindowsDisplayHandle::new())
    }

    fn proc_address(&self, name: &CStr) -> Option<ProcAddress> {
        let addr = unsafe { (self.fns.get_proc_address)(name.as_ptr()) };
        // wglGetProcAddress reports failure as 0, 1, 2, 3 or -1.
        match addr as isize {
            -1 | 0..=3 => export_address(&self.opengl32, name),
            _ => NonNull::new(addr),
        }
    }

    fn loader_proc_address(name: &CStr) -> Option<ProcAddress> {
        // wglGetProcAddress needs a current context; without one only the
        // DLL exports are reachable.
        let opengl32 = OPENGL32
            .get_or_init(|| unsafe { Library::new("opengl32.dll") }.ok())
            .as_ref()?;
        export_address(opengl32, name)
    }

    fn destroy(self) {
        unsafe {
            (self.fns.delete_context)(self.context);
            ReleaseDC(self.hwnd, self.hdc);
        }
    }
}
