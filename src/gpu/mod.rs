pub(crate) mod acquire;
pub mod error;
pub mod invalidation;
pub mod structs;

#[cfg(feature = "canvas-opengl")]
pub mod opengl;
#[cfg(feature = "canvas-vulkan")]
pub mod vulkan;
#[cfg(all(feature = "canvas-metal", target_vendor = "apple"))]
pub mod metal;

pub use error::*;
pub use invalidation::*;
pub use structs::*;

use crate::host::PlatformSurfaceInfo;
use std::ffi::CStr;

/// A graphics API turned into a live context bound to a native surface.
///
/// Exactly one implementation is selected at build time; the backend and
/// driver are generic over it so calls dispatch statically.
pub trait ContextProvider: Sized {
    /// Whether the context is created with the backend or on first activation.
    const INIT_POLICY: InitPolicy;

    /// Creates the context for `surface`, sized to `size` device pixels.
    fn init(surface: &PlatformSurfaceInfo, info: &ContextInfo, size: Size) -> Result<Self>;

    /// Binds the context to the calling thread. Called with the host lock held.
    fn make_current(&mut self) -> Result<()>;

    /// Unbinds the context from the calling thread.
    fn release_current(&mut self) -> Result<()>;

    /// Applies a framebuffer/viewport binding.
    fn bind(&mut self, binding: &Binding) -> Result<()>;

    /// Swaps or presents the current frame.
    fn present(&mut self) -> Result<()>;

    /// Notifies the context that the surface changed size.
    fn resize(&mut self, size: Size);

    /// Resolves an extension entry point, or `None` if the platform lacks it.
    fn proc_address(&self, name: &CStr) -> Option<ProcAddress>;

    /// Resolves an entry point through the API loader alone, before any
    /// context exists.
    fn loader_proc_address(_name: &CStr) -> Option<ProcAddress> {
        None
    }

    /// Blocks until all submitted GPU work has completed.
    fn wait(&mut self) -> Result<()>;

    /// Releases every API object. Teardown is best-effort and never fails.
    fn destroy(self);
}

#[cfg(feature = "canvas-opengl")]
pub type SelectedContext = opengl::GlContext;
#[cfg(feature = "canvas-vulkan")]
pub type SelectedContext = vulkan::VulkanContext;
#[cfg(all(feature = "canvas-metal", target_vendor = "apple"))]
pub type SelectedContext = metal::MetalContext;
