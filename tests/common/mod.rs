#![allow(dead_code)]

//! In-process stand-ins for the host toolkit and the graphics API.
//!
//! Host and context both append to one thread-local event log so tests can
//! assert the order in which calls crossed the boundary.

use std::cell::{Cell, RefCell};
use std::ffi::{c_void, CStr};
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use canvas_gfx::host::{DrawingSurface, HostToolkit, LockFlags, SurfaceInfoBlock};
use canvas_gfx::*;

thread_local! {
    static EVENTS: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
    static LOCK_DEPTH: Cell<i32> = const { Cell::new(0) };
    static CONTEXT: RefCell<ContextProbe> = RefCell::new(ContextProbe::default());
}

/// Clears the event log and the fake context's state for this thread.
pub fn reset() {
    let _ = env_logger::builder().is_test(true).try_init();
    EVENTS.with(|e| e.borrow_mut().clear());
    LOCK_DEPTH.with(|d| d.set(0));
    CONTEXT.with(|c| *c.borrow_mut() = ContextProbe::default());
}

fn record(event: &'static str) {
    EVENTS.with(|e| e.borrow_mut().push(event));
}

pub fn events() -> Vec<&'static str> {
    EVENTS.with(|e| e.borrow().clone())
}

pub fn count(event: &str) -> usize {
    EVENTS.with(|e| e.borrow().iter().filter(|ev| **ev == event).count())
}

/// Successful locks minus unlocks.
pub fn lock_depth() -> i32 {
    LOCK_DEPTH.with(Cell::get)
}

////////////////////////////////////////////////////////////////////////////////
// Host
////////////////////////////////////////////////////////////////////////////////

/// Switches for each step of the surface protocol.
pub struct HostConfig {
    pub toolkit: Cell<bool>,
    pub surface: Cell<bool>,
    pub lock_error: Cell<bool>,
    pub info: Cell<bool>,
    pub platform: Cell<bool>,
    pub size: Cell<Size>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            toolkit: Cell::new(true),
            surface: Cell::new(true),
            lock_error: Cell::new(false),
            info: Cell::new(true),
            platform: Cell::new(true),
            size: Cell::new(Size::new(800, 600)),
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeCanvas {
    pub config: Rc<HostConfig>,
}

impl FakeCanvas {
    pub fn new(size: Size) -> Self {
        let canvas = Self::default();
        canvas.config.size.set(size);
        canvas
    }
}

pub struct FakeToolkit {
    config: Rc<HostConfig>,
}

pub struct FakeSurface {
    config: Rc<HostConfig>,
}

pub struct FakeInfo {
    config: Rc<HostConfig>,
}

impl HostCanvas for FakeCanvas {
    type Toolkit = FakeToolkit;

    fn toolkit(&self) -> Option<FakeToolkit> {
        self.config.toolkit.get().then(|| FakeToolkit {
            config: Rc::clone(&self.config),
        })
    }

    fn size(&self) -> Size {
        self.config.size.get()
    }
}

impl HostToolkit<FakeCanvas> for FakeToolkit {
    type Surface = FakeSurface;

    fn drawing_surface(&self, _canvas: &FakeCanvas) -> Option<FakeSurface> {
        record("get_surface");
        self.config.surface.get().then(|| FakeSurface {
            config: Rc::clone(&self.config),
        })
    }

    fn free_drawing_surface(&self, _surface: FakeSurface) {
        record("free_surface");
    }
}

impl DrawingSurface for FakeSurface {
    type Info = FakeInfo;

    fn lock(&self) -> LockFlags {
        if self.config.lock_error.get() {
            record("lock_refused");
            return LockFlags::ERROR;
        }
        record("lock");
        LOCK_DEPTH.with(|d| d.set(d.get() + 1));
        LockFlags::empty()
    }

    fn unlock(&self) {
        record("unlock");
        LOCK_DEPTH.with(|d| d.set(d.get() - 1));
    }

    fn surface_info(&self) -> Option<FakeInfo> {
        record("get_info");
        self.config.info.get().then(|| FakeInfo {
            config: Rc::clone(&self.config),
        })
    }

    fn free_surface_info(&self, _info: FakeInfo) {
        record("free_info");
    }
}

impl SurfaceInfoBlock for FakeInfo {
    fn platform_info(&self) -> Option<PlatformSurfaceInfo> {
        self.config.platform.get().then(|| PlatformSurfaceInfo::Xlib {
            display: NonNull::dangling(),
            drawable: 0x2a,
            screen: 0,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Context
////////////////////////////////////////////////////////////////////////////////

#[derive(Default, Clone)]
pub struct ContextProbe {
    pub fail_init: bool,
    pub fail_make_current: bool,
    pub fail_present: bool,
    pub init_size: Option<Size>,
    pub init_under_lock: Option<bool>,
    pub current_under_lock: Vec<bool>,
    pub binds: Vec<Binding>,
    pub resizes: Vec<Size>,
    pub rebuilds: usize,
    pub destroy_under_lock: Option<bool>,
}

pub fn probe() -> ContextProbe {
    CONTEXT.with(|c| c.borrow().clone())
}

pub fn configure(f: impl FnOnce(&mut ContextProbe)) {
    CONTEXT.with(|c| f(&mut c.borrow_mut()));
}

/// A context that only records what it was asked to do.
///
/// `EAGER` picks the init policy so both backend construction paths can be
/// exercised without a GPU.
pub struct FakeContext<const EAGER: bool> {
    invalidation: SurfaceInvalidation,
}

pub type EagerContext = FakeContext<true>;
pub type LazyContext = FakeContext<false>;

pub const FAKE_EXTENSION: &CStr = c"glFakeExtension";

/// Resolvable through the loader, with or without a context.
pub const FAKE_LOADER_FN: &CStr = c"glFakeLoaderFunction";

impl<const EAGER: bool> FakeContext<EAGER> {
    /// Drains the rebuild request the way a swapchain would before acquiring.
    pub fn acquire(&mut self) -> Option<Size> {
        let rebuilt = self.invalidation.take();
        if rebuilt.is_some() {
            configure(|p| p.rebuilds += 1);
        }
        rebuilt
    }
}

impl<const EAGER: bool> ContextProvider for FakeContext<EAGER> {
    const INIT_POLICY: InitPolicy = if EAGER {
        InitPolicy::Eager
    } else {
        InitPolicy::Lazy
    };

    fn init(_surface: &PlatformSurfaceInfo, _info: &ContextInfo, size: Size) -> Result<Self> {
        let under_lock = lock_depth() > 0;
        let fail = CONTEXT.with(|c| {
            let mut p = c.borrow_mut();
            p.init_under_lock = Some(under_lock);
            p.init_size = Some(size);
            p.fail_init
        });
        if fail {
            record("init_failed");
            return Err(CanvasError::ContextCreationFailed("fake".into()));
        }
        record("init");
        Ok(Self {
            invalidation: SurfaceInvalidation::new(size),
        })
    }

    fn make_current(&mut self) -> Result<()> {
        let under_lock = lock_depth() > 0;
        let fail = CONTEXT.with(|c| {
            let mut p = c.borrow_mut();
            p.current_under_lock.push(under_lock);
            p.fail_make_current
        });
        if fail {
            return Err(CanvasError::MakeCurrentFailed);
        }
        record("make_current");
        Ok(())
    }

    fn release_current(&mut self) -> Result<()> {
        record("release_current");
        Ok(())
    }

    fn bind(&mut self, binding: &Binding) -> Result<()> {
        record("bind");
        configure(|p| p.binds.push(*binding));
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if CONTEXT.with(|c| c.borrow().fail_present) {
            return Err(CanvasError::Render("present failed".into()));
        }
        record("present");
        Ok(())
    }

    fn resize(&mut self, size: Size) {
        configure(|p| p.resizes.push(size));
        self.invalidation.resize(size);
    }

    fn proc_address(&self, name: &CStr) -> Option<ProcAddress> {
        (name == FAKE_EXTENSION)
            .then(NonNull::<c_void>::dangling)
            .or_else(|| Self::loader_proc_address(name))
    }

    fn loader_proc_address(name: &CStr) -> Option<ProcAddress> {
        (name == FAKE_LOADER_FN).then(NonNull::<c_void>::dangling)
    }

    fn wait(&mut self) -> Result<()> {
        record("wait");
        Ok(())
    }

    fn destroy(self) {
        let under_lock = lock_depth() > 0;
        configure(|p| p.destroy_under_lock = Some(under_lock));
        record("destroy");
    }
}

////////////////////////////////////////////////////////////////////////////////
// Engine and host frontend
////////////////////////////////////////////////////////////////////////////////

#[derive(Debug)]
pub struct Scene {
    pub id: u32,
}

/// Frames as seen by [`FakeRenderer`]: scene id and renderable size.
pub type FrameLog = Arc<Mutex<Vec<(u32, Size)>>>;

pub struct FakeRenderer {
    pub frames: FrameLog,
    pub pixel_ratio: f32,
    pub fail_next: Rc<Cell<bool>>,
    pub observer: Option<Weak<dyn RendererObserver>>,
}

impl FakeRenderer {
    pub fn new(pixel_ratio: f32) -> Self {
        Self {
            frames: Arc::default(),
            pixel_ratio,
            fail_next: Rc::default(),
            observer: None,
        }
    }
}

impl<const EAGER: bool> Renderer<FakeContext<EAGER>> for FakeRenderer {
    type Params = Scene;

    fn render<B>(&mut self, backend: &mut B, params: Arc<Scene>) -> Result<()>
    where
        B: RendererBackend<Context = FakeContext<EAGER>>,
    {
        if let Some(observer) = self.observer.as_ref().and_then(Weak::upgrade) {
            observer.will_start_rendering_frame();
        }
        if let Some(ctx) = backend.context_mut() {
            ctx.acquire();
        }
        backend.bind_renderable()?;
        if self.fail_next.replace(false) {
            return Err(CanvasError::Render("scene rejected".into()));
        }
        let size = backend.renderable().size;
        self.frames.lock().unwrap().push((params.id, size));
        backend.swap()?;
        if let Some(observer) = self.observer.as_ref().and_then(Weak::upgrade) {
            observer.did_finish_rendering_frame(false);
        }
        Ok(())
    }

    fn set_observer(&mut self, observer: Option<Weak<dyn RendererObserver>>) {
        self.observer = observer;
    }
}

#[derive(Default)]
pub struct FakeFrontend {
    pub run_once_requests: AtomicUsize,
    pub repaint_requests: AtomicUsize,
}

impl FakeFrontend {
    pub fn run_once_requests(&self) -> usize {
        self.run_once_requests.load(Ordering::SeqCst)
    }

    pub fn repaint_requests(&self) -> usize {
        self.repaint_requests.load(Ordering::SeqCst)
    }
}

impl HostFrontend for FakeFrontend {
    fn request_run_once(&self) {
        self.run_once_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn request_repaint(&self) {
        self.repaint_requests.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeObserver {
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
    pub failed: AtomicUsize,
}

impl RendererObserver for FakeObserver {
    fn will_start_rendering_frame(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn did_finish_rendering_frame(&self, _needs_repaint: bool) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn did_fail_rendering_frame(&self, _error: &CanvasError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

pub type Driver<const EAGER: bool> = FrameDriver<FakeCanvas, FakeContext<EAGER>, FakeRenderer>;

/// A driver over a lazy fake context, as an OpenGL build would create it.
pub fn lazy_driver(
    frontend: &Arc<FakeFrontend>,
    canvas: &FakeCanvas,
    pixel_ratio: f32,
) -> Result<Driver<false>> {
    FrameDriver::new(frontend, canvas, pixel_ratio, ContextInfo::default(), |_, ratio| {
        Ok(FakeRenderer::new(ratio))
    })
}

/// A driver over an eager fake context, as a Vulkan build would create it.
pub fn eager_driver(
    frontend: &Arc<FakeFrontend>,
    canvas: &FakeCanvas,
    pixel_ratio: f32,
) -> Result<Driver<true>> {
    FrameDriver::new(frontend, canvas, pixel_ratio, ContextInfo::default(), |_, ratio| {
        Ok(FakeRenderer::new(ratio))
    })
}
