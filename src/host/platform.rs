use std::ffi::{c_int, c_ulong, c_void};
use std::num::NonZeroIsize;
use std::ptr::NonNull;

use raw_window_handle::{
    AppKitDisplayHandle, RawDisplayHandle, RawWindowHandle, Win32WindowHandle,
    WindowsDisplayHandle, XlibDisplayHandle, XlibWindowHandle,
};

/// OS-native identifiers of a host drawing surface.
///
/// Extracted once while the surface is locked and cached for the lifetime
/// of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSurfaceInfo {
    /// An X11 drawable on `display`.
    Xlib {
        display: NonNull<c_void>,
        drawable: c_ulong,
        screen: c_int,
    },
    Win32 {
        hwnd: NonZeroIsize,
        hinstance: Option<NonZeroIsize>,
    },
    /// A `CAMetalLayer` attached to the host view.
    MetalLayer { layer: NonNull<c_void> },
}

impl PlatformSurfaceInfo {
    /// Short name of the windowing system, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            PlatformSurfaceInfo::Xlib { .. } => "xlib",
            PlatformSurfaceInfo::Win32 { .. } => "win32",
            PlatformSurfaceInfo::MetalLayer { .. } => "metal-layer",
        }
    }

    pub fn raw_display_handle(&self) -> RawDisplayHandle {
        match *self {
            PlatformSurfaceInfo::Xlib {
                display, screen, ..
            } => RawDisplayHandle::Xlib(XlibDisplayHandle::new(Some(display), screen)),
            PlatformSurfaceInfo::Win32 { .. } => {
                RawDisplayHandle::Windows(WindowsDisplayHandle::new())
            }
            PlatformSurfaceInfo::MetalLayer { .. } => {
                RawDisplayHandle::AppKit(AppKitDisplayHandle::new())
            }
        }
    }

    /// Window handle for window-system integration. A metal layer has none.
    pub fn raw_window_handle(&self) -> Option<RawWindowHandle> {
        match *self {
            PlatformSurfaceInfo::Xlib { drawable, .. } => {
                Some(RawWindowHandle::Xlib(XlibWindowHandle::new(drawable)))
            }
            PlatformSurfaceInfo::Win32 { hwnd, hinstance } => {
                let mut handle = Win32WindowHandle::new(hwnd);
                handle.hinstance = hinstance;
                Some(RawWindowHandle::Win32(handle))
            }
            PlatformSurfaceInfo::MetalLayer { .. } => None,
        }
    }
}
