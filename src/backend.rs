//! The renderer-facing backend: a context provider behind the host's surface lock.

use std::ffi::CStr;

use log::{debug, error, trace, warn};

use crate::gpu::{
    Binding, CanvasError, ContextInfo, ContextProvider, InitPolicy, ProcAddress, Renderable,
    Result, Size,
};
use crate::host::{CanvasSurface, HostCanvas};

/// What the renderer may do with a backend while it is active.
pub trait RendererBackend {
    type Context;

    /// The default presentation target.
    fn renderable(&self) -> Renderable;

    /// Binds the default framebuffer and a full-size viewport.
    fn bind_renderable(&mut self) -> Result<()>;

    /// Presents the finished frame.
    fn swap(&mut self) -> Result<()>;

    /// Resolves an extension entry point; `None` means the feature is unavailable.
    fn extension_function_pointer(&self, name: &CStr) -> Option<ProcAddress>;

    /// Resets cached binding assumptions after state changes made behind the
    /// backend's back.
    fn update_assumed_state(&mut self);

    fn wait(&mut self) -> Result<()>;

    fn context_mut(&mut self) -> Option<&mut Self::Context>;
}

/// Binds a [`ContextProvider`] to a host canvas.
///
/// Every use of the context happens between [`activate`](Self::activate) and
/// [`deactivate`](Self::deactivate), which hold the host's surface lock.
/// [`scope`](Self::scope) pairs them automatically.
pub struct RenderableBackend<C: HostCanvas, G: ContextProvider> {
    context: Option<G>,
    info: ContextInfo,
    size: Size,
    assumed: Option<Binding>,
    active: bool,
    surface: CanvasSurface<C>,
}

impl<C: HostCanvas, G: ContextProvider> RenderableBackend<C, G> {
    /// Acquires the canvas surface and, for eager providers, creates the context.
    pub fn new(canvas: &C, info: ContextInfo) -> Result<Self> {
        let surface = CanvasSurface::acquire(canvas)?;
        let size = canvas.size();

        let mut backend = Self {
            context: None,
            info,
            size,
            assumed: None,
            active: false,
            surface,
        };

        if G::INIT_POLICY == InitPolicy::Eager {
            backend.surface.lock()?;
            let created = backend.create_context();
            backend.surface.unlock();
            created?;
        }

        debug!("backend created at {}x{}", size.width, size.height);
        Ok(backend)
    }

    fn create_context(&mut self) -> Result<()> {
        let ctx = G::init(self.surface.platform_info(), &self.info, self.size)?;
        self.context = Some(ctx);
        self.assumed = None;
        Ok(())
    }

    /// Locks the host surface and makes the context current, creating it first
    /// if the provider is lazy.
    pub fn activate(&mut self) -> Result<()> {
        if self.active {
            return Err(CanvasError::ScopeViolation("activate called while active"));
        }

        self.surface.lock()?;
        if let Err(err) = self.bind_current() {
            self.surface.unlock();
            return Err(err);
        }

        self.active = true;
        trace!("backend activated");
        Ok(())
    }

    fn bind_current(&mut self) -> Result<()> {
        if self.context.is_none() {
            self.create_context()?;
        }
        match self.context.as_mut() {
            Some(ctx) => ctx.make_current(),
            None => Err(CanvasError::MakeCurrentFailed),
        }
    }

    /// Releases the context and unlocks the host surface.
    ///
    /// The lock is released even if unbinding the context fails.
    pub fn deactivate(&mut self) -> Result<()> {
        if !self.active {
            return Err(CanvasError::ScopeViolation("deactivate called while inactive"));
        }

        let released = match self.context.as_mut() {
            Some(ctx) => ctx.release_current(),
            None => Ok(()),
        };
        self.surface.unlock();
        self.active = false;
        trace!("backend deactivated");
        released
    }

    /// Activates the backend for the lifetime of the returned guard.
    pub fn scope(&mut self) -> Result<BackendScope<'_, C, G>> {
        self.activate()?;
        Ok(BackendScope { backend: self })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Records the new canvas size and forwards it to the context.
    pub fn set_size(&mut self, size: Size) {
        if size == self.size {
            return;
        }
        self.size = size;
        self.assumed = None;
        if let Some(ctx) = self.context.as_mut() {
            ctx.resize(size);
        }
        debug!("backend resized to {}x{}", size.width, size.height);
    }

    pub fn default_renderable(&self) -> Renderable {
        Renderable {
            size: self.size,
            framebuffer: 0,
        }
    }

    /// Resolves through the context once it exists, and through the API
    /// loader before that.
    pub fn extension_function_pointer(&self, name: &CStr) -> Option<ProcAddress> {
        match self.context.as_ref() {
            Some(ctx) => ctx.proc_address(name),
            None => G::loader_proc_address(name),
        }
    }

    pub fn update_assumed_state(&mut self) {
        self.assumed = Some(Binding::default_for(self.size));
    }

    /// Blocks until the context has finished all submitted work.
    pub fn wait(&mut self) -> Result<()> {
        match self.context.as_mut() {
            Some(ctx) => ctx.wait(),
            None => Ok(()),
        }
    }

    pub fn context(&self) -> Option<&G> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut G> {
        self.context.as_mut()
    }

    fn require_active(&self, op: &'static str) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(CanvasError::ScopeViolation(op))
        }
    }

    fn bind_renderable(&mut self) -> Result<()> {
        self.require_active("bind outside an activation scope")?;
        let binding = Binding::default_for(self.size);
        if self.assumed == Some(binding) {
            return Ok(());
        }
        if let Some(ctx) = self.context.as_mut() {
            ctx.bind(&binding)?;
        }
        self.assumed = Some(binding);
        Ok(())
    }

    fn swap(&mut self) -> Result<()> {
        self.require_active("swap outside an activation scope")?;
        match self.context.as_mut() {
            Some(ctx) => ctx.present(),
            None => Ok(()),
        }
    }
}

impl<C: HostCanvas, G: ContextProvider> Drop for RenderableBackend<C, G> {
    fn drop(&mut self) {
        if self.active {
            if let Err(err) = self.deactivate() {
                warn!("failed to deactivate backend during teardown: {err}");
            }
        }
        if let Some(ctx) = self.context.take() {
            // Best-effort: a refused lock still destroys the context.
            let locked = match self.surface.lock() {
                Ok(_) => true,
                Err(err) => {
                    warn!("destroying context without the surface lock: {err}");
                    false
                }
            };
            ctx.destroy();
            if locked {
                self.surface.unlock();
            }
        }
        debug!("backend destroyed");
    }
}

/// An active backend; deactivates on drop, whatever path leaves the scope.
pub struct BackendScope<'a, C: HostCanvas, G: ContextProvider> {
    backend: &'a mut RenderableBackend<C, G>,
}

impl<C: HostCanvas, G: ContextProvider> BackendScope<'_, C, G> {
    pub fn size(&self) -> Size {
        self.backend.size()
    }
}

impl<C: HostCanvas, G: ContextProvider> RendererBackend for BackendScope<'_, C, G> {
    type Context = G;

    fn renderable(&self) -> Renderable {
        self.backend.default_renderable()
    }

    fn bind_renderable(&mut self) -> Result<()> {
        self.backend.bind_renderable()
    }

    fn swap(&mut self) -> Result<()> {
        self.backend.swap()
    }

    fn extension_function_pointer(&self, name: &CStr) -> Option<ProcAddress> {
        self.backend.extension_function_pointer(name)
    }

    fn update_assumed_state(&mut self) {
        self.backend.update_assumed_state()
    }

    fn wait(&mut self) -> Result<()> {
        self.backend.wait()
    }

    fn context_mut(&mut self) -> Option<&mut G> {
        self.backend.context_mut()
    }
}

impl<C: HostCanvas, G: ContextProvider> Drop for BackendScope<'_, C, G> {
    fn drop(&mut self) {
        if let Err(err) = self.backend.deactivate() {
            error!("failed to leave backend scope: {err}");
        }
    }
}
