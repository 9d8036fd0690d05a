//! Collaborators supplied by the embedding host.
//!
//! The host owns the canvas and its native drawing surface. It lends them to
//! this crate through the traits below, which follow the lock / get-info /
//! unlock / free protocol of native canvas toolkits.

pub mod platform;
pub mod surface;

pub use platform::*;
pub use surface::*;

use crate::gpu::Size;
use bitflags::bitflags;

bitflags! {
    /// Result bits of a drawing-surface lock.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LockFlags: u32 {
        const ERROR           = 0x1;
        const CLIP_CHANGED    = 0x2;
        const BOUNDS_CHANGED  = 0x4;
        const SURFACE_CHANGED = 0x8;
    }
}

impl LockFlags {
    /// True when the lock was refused and is not held.
    pub fn is_error(&self) -> bool {
        self.contains(LockFlags::ERROR)
    }
}

/// An opaque host-owned canvas.
pub trait HostCanvas {
    type Toolkit: HostToolkit<Self>;

    /// The host's drawing-surface provider, or `None` if it cannot be obtained.
    fn toolkit(&self) -> Option<Self::Toolkit>;

    /// Current size of the native drawing surface, in device pixels.
    fn size(&self) -> Size;
}

/// Hands out lockable drawing surfaces for canvases.
pub trait HostToolkit<C: ?Sized> {
    type Surface: DrawingSurface;

    fn drawing_surface(&self, canvas: &C) -> Option<Self::Surface>;

    fn free_drawing_surface(&self, surface: Self::Surface);
}

/// A lockable native drawing surface.
pub trait DrawingSurface {
    type Info: SurfaceInfoBlock;

    fn lock(&self) -> LockFlags;

    fn unlock(&self);

    /// Reads the platform info block. Only valid while locked.
    fn surface_info(&self) -> Option<Self::Info>;

    fn free_surface_info(&self, info: Self::Info);
}

pub trait SurfaceInfoBlock {
    /// Native window identifiers embedded in the info block.
    fn platform_info(&self) -> Option<PlatformSurfaceInfo>;
}

/// The host-side object that receives scheduling requests.
///
/// Both requests are asynchronous: the host fulfils them later on its own
/// event thread.
pub trait HostFrontend: Send + Sync {
    /// Asks the host to pump the run loop once.
    fn request_run_once(&self);

    /// Asks the host to schedule a paint of the canvas.
    fn request_repaint(&self);
}
