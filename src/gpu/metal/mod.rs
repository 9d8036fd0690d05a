//! Proprietary-GPU variant: the host's `CAMetalLayer`.
//!
//! The engine renders into drawables of the layer and presents them itself;
//! this context only keeps the layer alive and its drawable size in sync.

use std::ffi::{c_void, CStr};

use log::{debug, info};
use objc2::rc::Retained;
use objc2_core_foundation::CGSize;
use objc2_quartz_core::CAMetalLayer;

use super::{
    Binding, CanvasError, ContextInfo, ContextProvider, InitPolicy, ProcAddress, Result, Size,
};
use crate::host::PlatformSurfaceInfo;

pub struct MetalContext {
    layer: Retained<CAMetalLayer>,
    size: Size,
}

impl MetalContext {
    pub fn layer(&self) -> &CAMetalLayer {
        &self.layer
    }

    /// Raw `CAMetalLayer` pointer for engines that build their own device.
    pub fn as_raw(&self) -> *mut c_void {
        let ptr: *const CAMetalLayer = &*self.layer;
        ptr as *mut c_void
    }

    fn apply_drawable_size(&self) {
        self.layer.setDrawableSize(CGSize::new(
            self.size.width as f64,
            self.size.height as f64,
        ));
    }
}

impl ContextProvider for MetalContext {
    const INIT_POLICY: InitPolicy = InitPolicy::Eager;

    fn init(platform: &PlatformSurfaceInfo, _info: &ContextInfo, size: Size) -> Result<Self> {
        let PlatformSurfaceInfo::MetalLayer { layer } = *platform else {
            return Err(CanvasError::ContextCreationFailed(format!(
                "Metal needs a layer, got a {} surface",
                platform.kind()
            )));
        };

        // Safety: the host hands out a live CAMetalLayer; retaining it keeps
        // it valid independently of the host's own reference.
        let layer = unsafe { Retained::retain(layer.as_ptr().cast::<CAMetalLayer>()) }
            .ok_or(CanvasError::PlatformInfoMissing)?;

        let ctx = Self { layer, size };
        if !size.is_empty() {
            ctx.apply_drawable_size();
        }
        info!("attached to host CAMetalLayer");
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
        Ok(())
    }

    fn resize(&mut self, size: Size) {
        if size.is_empty() || size == self.size {
            return;
        }
        self.size = size;
        self.apply_drawable_size();
        debug!("layer drawable size set to {}x{}", size.width, size.height);
    }

    fn proc_address(&self, _name: &CStr) -> Option<ProcAddress> {
        None
    }

    fn wait(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy(self) {
        info!("released host CAMetalLayer");
    }
}
