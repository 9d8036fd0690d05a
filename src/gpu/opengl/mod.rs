//! Raster variant: a core-profile OpenGL context on an X11 or Win32 drawable.

#[cfg(all(unix, not(target_vendor = "apple")))]
mod glx;
#[cfg(windows)]
mod wgl;

#[cfg(all(unix, not(target_vendor = "apple")))]
use glx::Glx as NativePlatform;
#[cfg(windows)]
use wgl::Wgl as NativePlatform;

#[cfg(not(any(all(unix, not(target_vendor = "apple")), windows)))]
compile_error!("`canvas-opengl` supports X11 and Win32 hosts only");

use std::ffi::{c_int, CStr};

use log::{debug, info, warn};
use raw_window_handle::RawDisplayHandle;

use super::{
    Binding, CanvasError, ContextInfo, ContextProvider, InitPolicy, ProcAddress, Result, Size,
};
use crate::host::PlatformSurfaceInfo;

const GL_FRAMEBUFFER: u32 = 0x8D40;

/// Window-system half of a GL context.
///
/// Everything that differs between GLX and WGL sits behind this interface;
/// [`GlContext`] only talks to the context through it.
pub(crate) trait GlPlatform: Sized {
    /// Picks a pixel format for the drawable and creates the context.
    fn create_surface(surface: &PlatformSurfaceInfo, info: &ContextInfo) -> Result<Self>;

    fn make_current(&mut self) -> Result<()>;

    fn release_current(&mut self) -> Result<()>;

    fn present(&mut self) -> Result<()>;

    fn display_handle(&self) -> RawDisplayHandle;

    fn proc_address(&self, name: &CStr) -> Option<ProcAddress>;

    /// Resolves `name` without a context, through the system GL loader.
    fn loader_proc_address(name: &CStr) -> Option<ProcAddress>;

    fn destroy(self);
}

/// GL entry points the backend itself calls.
#[derive(Clone, Copy)]
struct GlFunctions {
    bind_framebuffer: unsafe extern "system" fn(target: u32, framebuffer: u32),
    viewport: unsafe extern "system" fn(x: c_int, y: c_int, width: c_int, height: c_int),
    finish: unsafe extern "system" fn(),
}

impl GlFunctions {
    fn load(platform: &impl GlPlatform) -> Result<Self> {
        let resolve = |name: &CStr| {
            platform
                .proc_address(name)
                .ok_or_else(|| CanvasError::Loading(format!("missing {}", name.to_string_lossy())))
        };

        // Safety: the addresses come from the current context's loader and
        // match the GL prototypes.
        unsafe {
            Ok(Self {
                bind_framebuffer: std::mem::transmute(resolve(c"glBindFramebuffer")?.as_ptr()),
                viewport: std::mem::transmute(resolve(c"glViewport")?.as_ptr()),
                finish: std::mem::transmute(resolve(c"glFinish")?.as_ptr()),
            })
        }
    }
}

/// OpenGL context bound to the host drawable.
///
/// Created on first activation, because the pixel format can only be chosen
/// once the host has realised the drawable.
pub struct GlContext {
    platform: NativePlatform,
    functions: Option<GlFunctions>,
    size: Size,
}

impl GlContext {
    pub fn display_handle(&self) -> RawDisplayHandle {
        self.platform.display_handle()
    }

    pub fn size(&self) -> Size {
        self.size
    }
}

impl ContextProvider for GlContext {
    const INIT_POLICY: InitPolicy = InitPolicy::Lazy;

    fn init(surface: &PlatformSurfaceInfo, info: &ContextInfo, size: Size) -> Result<Self> {
        let platform = NativePlatform::create_surface(surface, info)?;
        info!(
            "created OpenGL {}.{} core context on {} surface",
            info.gl_version.major,
            info.gl_version.minor,
            surface.kind()
        );
        Ok(Self {
            platform,
            functions: None,
            size,
        })
    }

    fn make_current(&mut self) -> Result<()> {
        self.platform.make_current()?;
        if self.functions.is_none() {
            self.functions = Some(GlFunctions::load(&self.platform)?);
            debug!("loaded GL entry points");
        }
        Ok(())
    }

    fn release_current(&mut self) -> Result<()> {
        self.platform.release_current()
    }

    fn bind(&mut self, binding: &Binding) -> Result<()> {
        let gl = self.functions.ok_or(CanvasError::MakeCurrentFailed)?;
        let vp = binding.viewport;
        // Safety: the functions were loaded for this context, which is current.
        unsafe {
            (gl.bind_framebuffer)(GL_FRAMEBUFFER, binding.framebuffer);
            (gl.viewport)(
                vp.x,
                vp.y,
                vp.size.width as c_int,
                vp.size.height as c_int,
            );
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.platform.present()
    }

    fn resize(&mut self, size: Size) {
        // The drawable follows the host window; only the viewport changes.
        self.size = size;
    }

    fn proc_address(&self, name: &CStr) -> Option<ProcAddress> {
        self.platform.proc_address(name)
    }

    fn loader_proc_address(name: &CStr) -> Option<ProcAddress> {
        NativePlatform::loader_proc_address(name)
    }

    fn wait(&mut self) -> Result<()> {
        if let Some(gl) = self.functions {
            unsafe { (gl.finish)() };
        }
        Ok(())
    }

    fn destroy(mut self) {
        if let Err(err) = self.platform.release_current() {
            warn!("failed to release GL context before destruction: {err}");
        }
        self.platform.destroy();
        info!("destroyed OpenGL context");
    }
}
