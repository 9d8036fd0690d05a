//! Frame scheduling between the rendering engine and the host's paint cycle.
//!
//! The engine pushes scene snapshots through [`FrameDriver::update`] from
//! whatever thread it likes; the host answers each repaint request by calling
//! [`FrameDriver::render`] from its paint callback, which renders the latest
//! snapshot inside an activation scope.

pub mod run_loop;

pub use run_loop::{RunLoop, Scheduler};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::backend::{RenderableBackend, RendererBackend};
use crate::gpu::{CanvasError, ContextInfo, ContextProvider, Result, Size};
use crate::host::{HostCanvas, HostFrontend};

/// Notifications the engine sends about frame progress. All hooks default to no-ops.
pub trait RendererObserver {
    fn invalidate(&self) {}

    fn will_start_rendering_frame(&self) {}

    fn did_finish_rendering_frame(&self, _needs_repaint: bool) {}

    fn did_fail_rendering_frame(&self, _error: &CanvasError) {}
}

/// The rendering engine, generic over the context it draws with.
pub trait Renderer<G> {
    /// Scene snapshot handed over on every update.
    type Params: Send + Sync + 'static;

    /// Renders one frame from `params`. Called with the backend active.
    fn render<B>(&mut self, backend: &mut B, params: Arc<Self::Params>) -> Result<()>
    where
        B: RendererBackend<Context = G>;

    fn set_observer(&mut self, observer: Option<Weak<dyn RendererObserver>>);
}

/// The engine-facing side of a driver.
pub trait RendererFrontend {
    type Params;

    /// Tears the driver down. Later calls do nothing.
    fn reset(&mut self);

    /// Replaces the observer. The caller keeps ownership; only a weak
    /// reference is held.
    fn set_observer(&mut self, observer: Weak<dyn RendererObserver>);

    /// Stores `params` as the snapshot for the next frame and asks the host to repaint.
    fn update(&self, params: Arc<Self::Params>);

    /// Queue for work that has to run on the driver's run loop.
    fn thread_pool(&self) -> Option<Scheduler>;
}

struct Shared<P> {
    params: Mutex<Option<Arc<P>>>,
    host: Mutex<Option<Weak<dyn HostFrontend>>>,
    reset: AtomicBool,
}

impl<P> Shared<P> {
    fn host(&self) -> Option<Arc<dyn HostFrontend>> {
        self.host.lock().as_ref().and_then(Weak::upgrade)
    }

    fn update(&self, params: Arc<P>) {
        {
            // The flag only flips under this lock, so no store lands after reset.
            let mut slot = self.params.lock();
            if self.reset.load(Ordering::Acquire) {
                return;
            }
            *slot = Some(params);
        }
        if let Some(host) = self.host() {
            host.request_repaint();
        }
    }

    /// Marks the slot dead. Returns false if it already was.
    fn close(&self) -> bool {
        let _slot = self.params.lock();
        !self.reset.swap(true, Ordering::AcqRel)
    }

    fn snapshot(&self) -> Option<Arc<P>> {
        self.params.lock().clone()
    }
}

/// `Send + Sync` handle through which engine threads feed a [`FrameDriver`].
pub struct FrontendHandle<P> {
    shared: Arc<Shared<P>>,
    scheduler: Option<Scheduler>,
}

impl<P> Clone for FrontendHandle<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<P> FrontendHandle<P> {
    /// Last-write-wins replacement of the pending snapshot.
    pub fn update(&self, params: impl Into<Arc<P>>) {
        self.shared.update(params.into());
    }

    pub fn thread_pool(&self) -> Option<Scheduler> {
        self.scheduler.clone()
    }

    pub fn is_reset(&self) -> bool {
        self.shared.reset.load(Ordering::Acquire)
    }
}

/// Owns the renderer, its backend and run loop for one host canvas.
///
/// Lives in `Running` from construction until [`reset`](RendererFrontend::reset)
/// (or drop), after which every operation is a no-op.
pub struct FrameDriver<C: HostCanvas, G: ContextProvider, R: Renderer<G>> {
    renderer: Option<R>,
    observer: Option<Weak<dyn RendererObserver>>,
    shared: Arc<Shared<R::Params>>,
    backend: Option<RenderableBackend<C, G>>,
    run_loop: Option<RunLoop>,
}

impl<C, G, R> FrameDriver<C, G, R>
where
    C: HostCanvas,
    G: ContextProvider,
    R: Renderer<G>,
{
    /// Builds the backend for `canvas` and a renderer over it.
    ///
    /// `renderer_factory` receives the freshly created backend and the pixel
    /// ratio. The ratio is for the renderer only; the backend keeps the
    /// canvas size as reported. Only a weak reference to `frontend` is kept.
    pub fn new<F>(
        frontend: &Arc<F>,
        canvas: &C,
        pixel_ratio: f32,
        info: ContextInfo,
        renderer_factory: impl FnOnce(&mut RenderableBackend<C, G>, f32) -> Result<R>,
    ) -> Result<Self>
    where
        F: HostFrontend + 'static,
    {
        let run_loop = RunLoop::new();
        let host: Weak<dyn HostFrontend> = Arc::downgrade(frontend) as Weak<dyn HostFrontend>;
        let shared = Arc::new(Shared {
            params: Mutex::new(None),
            host: Mutex::new(Some(host)),
            reset: AtomicBool::new(false),
        });

        let mut backend = RenderableBackend::new(canvas, info)?;
        let renderer = renderer_factory(&mut backend, pixel_ratio)?;

        let callback_state = Arc::downgrade(&shared);
        run_loop.set_platform_callback(move || {
            let Some(shared) = callback_state.upgrade() else {
                return;
            };
            if let Some(host) = shared.host() {
                host.request_run_once();
            }
        });

        info!("frame driver started (pixel ratio {pixel_ratio})");
        Ok(Self {
            renderer: Some(renderer),
            observer: None,
            shared,
            backend: Some(backend),
            run_loop: Some(run_loop),
        })
    }

    /// Renders the latest snapshot. Does nothing before the first update or after reset.
    ///
    /// Must only be called from the host's paint callback. A failed frame is
    /// dropped; the snapshot stays for the next paint.
    pub fn render(&mut self) -> Result<()> {
        let (Some(renderer), Some(backend)) = (self.renderer.as_mut(), self.backend.as_mut())
        else {
            return Ok(());
        };
        if self.shared.params.lock().is_none() {
            return Ok(());
        }

        let result = backend.scope().and_then(|mut scope| {
            let Some(params) = self.shared.snapshot() else {
                return Ok(());
            };
            renderer.render(&mut scope, params)
        });

        if let Err(err) = &result {
            warn!("frame dropped: {err}");
            if let Some(observer) = self.observer.as_ref().and_then(Weak::upgrade) {
                observer.did_fail_rendering_frame(err);
            }
        }
        result
    }

    /// Pumps the run loop once; the host's answer to `request_run_once`.
    pub fn run_once(&self) -> usize {
        self.run_loop.as_ref().map_or(0, RunLoop::run_once)
    }

    pub fn set_size(&mut self, size: Size) {
        if let Some(backend) = self.backend.as_mut() {
            backend.set_size(size);
        }
    }

    /// A thread-safe handle engine threads can update through.
    pub fn frontend(&self) -> FrontendHandle<R::Params> {
        FrontendHandle {
            shared: Arc::clone(&self.shared),
            scheduler: self.thread_pool(),
        }
    }

    pub fn backend(&self) -> Option<&RenderableBackend<C, G>> {
        self.backend.as_ref()
    }

    pub fn renderer(&self) -> Option<&R> {
        self.renderer.as_ref()
    }

    pub fn is_reset(&self) -> bool {
        self.shared.reset.load(Ordering::Acquire)
    }
}

impl<C, G, R> RendererFrontend for FrameDriver<C, G, R>
where
    C: HostCanvas,
    G: ContextProvider,
    R: Renderer<G>,
{
    type Params = R::Params;

    fn reset(&mut self) {
        if !self.shared.close() {
            return;
        }
        self.renderer = None;
        self.observer = None;
        self.shared.params.lock().take();
        self.shared.host.lock().take();
        self.backend = None;
        self.run_loop = None;
        debug!("frame driver reset");
    }

    fn set_observer(&mut self, observer: Weak<dyn RendererObserver>) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        renderer.set_observer(Some(observer.clone()));
        self.observer = Some(observer);
    }

    fn update(&self, params: Arc<R::Params>) {
        self.shared.update(params);
    }

    fn thread_pool(&self) -> Option<Scheduler> {
        self.run_loop.as_ref().map(RunLoop::scheduler)
    }
}

impl<C, G, R> Drop for FrameDriver<C, G, R>
where
    C: HostCanvas,
    G: ContextProvider,
    R: Renderer<G>,
{
    fn drop(&mut self) {
        self.reset();
    }
}
