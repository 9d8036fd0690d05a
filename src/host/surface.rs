use log::{debug, trace};

use super::{
    DrawingSurface, HostCanvas, HostToolkit, LockFlags, PlatformSurfaceInfo, SurfaceInfoBlock,
};
use crate::gpu::{CanvasError, Result};

type ToolkitOf<C> = <C as HostCanvas>::Toolkit;
type SurfaceOf<C> = <ToolkitOf<C> as HostToolkit<C>>::Surface;
type InfoOf<C> = <SurfaceOf<C> as DrawingSurface>::Info;

/// A host drawing surface with its platform identifiers resolved.
///
/// Holds the surface and its info block until dropped. Dropping frees the
/// info block first and the surface last.
pub struct CanvasSurface<C: HostCanvas> {
    toolkit: ToolkitOf<C>,
    surface: Option<SurfaceOf<C>>,
    info: Option<InfoOf<C>>,
    platform: PlatformSurfaceInfo,
}

impl<C: HostCanvas> CanvasSurface<C> {
    /// Obtains the canvas' drawing surface and reads its platform info under a
    /// short-lived lock.
    ///
    /// Every partially acquired host resource is released again on failure.
    pub fn acquire(canvas: &C) -> Result<Self> {
        let toolkit = canvas.toolkit().ok_or(CanvasError::SurfaceUnavailable)?;
        let surface = toolkit
            .drawing_surface(canvas)
            .ok_or(CanvasError::SurfaceUnavailable)?;

        let flags = surface.lock();
        if flags.is_error() {
            toolkit.free_drawing_surface(surface);
            return Err(CanvasError::SurfaceUnavailable);
        }

        let info = match surface.surface_info() {
            Some(info) => info,
            None => {
                surface.unlock();
                toolkit.free_drawing_surface(surface);
                return Err(CanvasError::SurfaceInfoUnavailable);
            }
        };
        let platform = info.platform_info();
        surface.unlock();

        let Some(platform) = platform else {
            surface.free_surface_info(info);
            toolkit.free_drawing_surface(surface);
            return Err(CanvasError::PlatformInfoMissing);
        };

        debug!("acquired {} drawing surface", platform.kind());
        Ok(Self {
            toolkit,
            surface: Some(surface),
            info: Some(info),
            platform,
        })
    }

    pub fn platform_info(&self) -> &PlatformSurfaceInfo {
        &self.platform
    }

    /// Locks the drawing surface. A refused lock is not held and needs no unlock.
    pub fn lock(&self) -> Result<LockFlags> {
        let surface = self.surface.as_ref().ok_or(CanvasError::SurfaceUnavailable)?;
        let flags = surface.lock();
        if flags.is_error() {
            return Err(CanvasError::SurfaceUnavailable);
        }
        trace!("drawing surface locked ({flags:?})");
        Ok(flags)
    }

    pub fn unlock(&self) {
        if let Some(surface) = &self.surface {
            surface.unlock();
            trace!("drawing surface unlocked");
        }
    }
}

impl<C: HostCanvas> Drop for CanvasSurface<C> {
    fn drop(&mut self) {
        let Some(surface) = self.surface.take() else {
            return;
        };
        if let Some(info) = self.info.take() {
            surface.free_surface_info(info);
        }
        self.toolkit.free_drawing_surface(surface);
        debug!("released {} drawing surface", self.platform.kind());
    }
}
