//! Binds a native GPU context to a host-owned drawing canvas.
//!
//! The host hands over an opaque canvas; [`host::CanvasSurface`] pulls the
//! native window identifiers out of it, a [`gpu::ContextProvider`] turns them
//! into a live context, [`backend::RenderableBackend`] wraps that context in
//! the activate/deactivate discipline the renderer expects, and
//! [`driver::FrameDriver`] schedules frames against the host's paint cycle.
//!
//! Exactly one graphics API is compiled in, picked by cargo feature:
//! `canvas-opengl` (default), `canvas-vulkan` or `canvas-metal`.

pub mod backend;
pub mod driver;
pub mod gpu;
pub mod host;

pub use backend::{BackendScope, RenderableBackend, RendererBackend};
pub use driver::{
    FrameDriver, FrontendHandle, Renderer, RendererFrontend, RendererObserver, RunLoop, Scheduler,
};
pub use gpu::*;
pub use host::{CanvasSurface, HostCanvas, HostFrontend, PlatformSurfaceInfo};

#[cfg(any(
    all(feature = "canvas-opengl", feature = "canvas-vulkan"),
    all(feature = "canvas-opengl", feature = "canvas-metal"),
    all(feature = "canvas-vulkan", feature = "canvas-metal"),
))]
compile_error!(
    "graphics backends are mutually exclusive; enable only one of `canvas-opengl`, `canvas-vulkan`, or `canvas-metal`"
);

#[cfg(all(feature = "canvas-metal", not(target_vendor = "apple")))]
compile_error!("`canvas-metal` is only available on Apple targets");

/// Backend bound to the graphics API selected at build time.
#[cfg(any(feature = "canvas-opengl", feature = "canvas-vulkan", feature = "canvas-metal"))]
pub type CanvasBackend<C> = RenderableBackend<C, SelectedContext>;

/// Frame driver bound to the graphics API selected at build time.
#[cfg(any(feature = "canvas-opengl", feature = "canvas-vulkan", feature = "canvas-metal"))]
pub type CanvasDriver<C, R> = FrameDriver<C, SelectedContext, R>;
