mod common;

use canvas_gfx::*;
use common::*;

type LazyBackend = RenderableBackend<FakeCanvas, LazyContext>;
type EagerBackend = RenderableBackend<FakeCanvas, EagerContext>;

#[test]
fn lazy_context_is_created_on_first_activation_under_lock() {
    reset();
    let canvas = FakeCanvas::default();
    let mut backend = LazyBackend::new(&canvas, ContextInfo::default()).expect("backend");
    assert!(!backend.has_context());
    assert_eq!(count("init"), 0);

    backend.activate().expect("activate");
    assert!(backend.has_context());
    assert_eq!(probe().init_under_lock, Some(true));
    assert_eq!(probe().current_under_lock, [true]);
    assert_eq!(lock_depth(), 1);

    backend.deactivate().expect("deactivate");
    backend.activate().expect("activate");
    backend.deactivate().expect("deactivate");
    assert_eq!(count("init"), 1);
    assert_eq!(lock_depth(), 0);
}

#[test]
fn eager_context_is_created_with_the_backend() {
    reset();
    let canvas = FakeCanvas::new(Size::new(320, 200));
    let backend = EagerBackend::new(&canvas, ContextInfo::default()).expect("backend");

    assert!(backend.has_context());
    assert_eq!(probe().init_under_lock, Some(true));
    assert_eq!(probe().init_size, Some(Size::new(320, 200)));
    assert_eq!(lock_depth(), 0);
    assert_eq!(count("make_current"), 0);
}

#[test]
fn failed_eager_init_leaks_nothing() {
    reset();
    configure(|p| p.fail_init = true);
    let canvas = FakeCanvas::default();

    let err = EagerBackend::new(&canvas, ContextInfo::default()).err();
    assert!(matches!(err, Some(CanvasError::ContextCreationFailed(_))));
    assert_eq!(lock_depth(), 0);
    assert_eq!(count("free_info"), 1);
    assert_eq!(count("free_surface"), 1);
}

#[test]
fn activation_pairs_lock_with_make_current() {
    reset();
    let canvas = FakeCanvas::default();
    let mut backend = LazyBackend::new(&canvas, ContextInfo::default()).expect("backend");
    let setup = events().len();

    backend.activate().expect("activate");
    backend.deactivate().expect("deactivate");
    assert_eq!(
        &events()[setup..],
        ["lock", "init", "make_current", "release_current", "unlock"]
    );
}

#[test]
fn nested_activation_is_rejected() {
    reset();
    let canvas = FakeCanvas::default();
    let mut backend = LazyBackend::new(&canvas, ContextInfo::default()).expect("backend");

    backend.activate().expect("activate");
    assert!(matches!(backend.activate(), Err(CanvasError::ScopeViolation(_))));
    assert_eq!(lock_depth(), 1);
    assert!(backend.is_active());

    backend.deactivate().expect("deactivate");
    assert!(matches!(backend.deactivate(), Err(CanvasError::ScopeViolation(_))));
    assert_eq!(lock_depth(), 0);
}

#[test]
fn refused_lock_fails_activation() {
    reset();
    let canvas = FakeCanvas::default();
    let mut backend = LazyBackend::new(&canvas, ContextInfo::default()).expect("backend");

    canvas.config.lock_error.set(true);
    assert!(matches!(backend.activate(), Err(CanvasError::SurfaceUnavailable)));
    assert!(!backend.is_active());
    assert!(!backend.has_context());
}

#[test]
fn failed_lazy_init_releases_lock_and_retries() {
    reset();
    configure(|p| p.fail_init = true);
    let canvas = FakeCanvas::default();
    let mut backend = LazyBackend::new(&canvas, ContextInfo::default()).expect("backend");

    assert!(matches!(backend.activate(), Err(CanvasError::ContextCreationFailed(_))));
    assert_eq!(lock_depth(), 0);
    assert!(!backend.is_active());

    configure(|p| p.fail_init = false);
    backend.activate().expect("activate");
    assert!(backend.has_context());
    backend.deactivate().expect("deactivate");
}

#[test]
fn failed_make_current_releases_lock() {
    reset();
    configure(|p| p.fail_make_current = true);
    let canvas = FakeCanvas::default();
    let mut backend = EagerBackend::new(&canvas, ContextInfo::default()).expect("backend");

    assert!(matches!(backend.activate(), Err(CanvasError::MakeCurrentFailed)));
    assert_eq!(lock_depth(), 0);
    assert!(!backend.is_active());
}

#[test]
fn scope_deactivates_on_every_exit() {
    reset();
    let canvas = FakeCanvas::default();
    let mut backend = LazyBackend::new(&canvas, ContextInfo::default()).expect("backend");

    let result: Result<()> = backend.scope().and_then(|mut scope| {
        scope.bind_renderable()?;
        Err(CanvasError::Render("boom".into()))
    });
    assert!(result.is_err());
    assert!(!backend.is_active());
    assert_eq!(lock_depth(), 0);
    assert_eq!(count("release_current"), 1);

    {
        let mut scope = backend.scope().expect("scope");
        scope.swap().expect("swap");
    }
    assert_eq!(lock_depth(), 0);
    assert_eq!(count("present"), 1);
}

#[test]
fn bind_only_reaches_the_context_when_state_changed() {
    reset();
    let canvas = FakeCanvas::new(Size::new(640, 480));
    let mut backend = EagerBackend::new(&canvas, ContextInfo::default()).expect("backend");

    {
        let mut scope = backend.scope().expect("scope");
        scope.bind_renderable().expect("bind");
        scope.bind_renderable().expect("bind");
    }
    assert_eq!(probe().binds, [Binding::default_for(Size::new(640, 480))]);

    backend.set_size(Size::new(320, 240));
    {
        let mut scope = backend.scope().expect("scope");
        scope.bind_renderable().expect("bind");
        scope.update_assumed_state();
        scope.bind_renderable().expect("bind");
    }
    assert_eq!(probe().binds.len(), 2);
    assert_eq!(probe().binds[1].viewport.size, Size::new(320, 240));
}

#[test]
fn resize_is_forwarded_once_per_change() {
    reset();
    let canvas = FakeCanvas::new(Size::new(800, 600));
    let mut backend = EagerBackend::new(&canvas, ContextInfo::default()).expect("backend");

    backend.set_size(Size::new(800, 600));
    assert!(probe().resizes.is_empty());

    backend.set_size(Size::new(400, 300));
    backend.set_size(Size::new(400, 300));
    assert_eq!(probe().resizes, [Size::new(400, 300)]);
    assert_eq!(backend.default_renderable().size, Size::new(400, 300));
    assert_eq!(backend.default_renderable().framebuffer, 0);
}

#[test]
fn collapsed_canvas_rebuilds_once_when_restored() {
    reset();
    let canvas = FakeCanvas::new(Size::new(800, 600));
    let mut backend = EagerBackend::new(&canvas, ContextInfo::default()).expect("backend");

    backend.set_size(Size::new(0, 0));
    backend.set_size(Size::new(800, 600));
    backend.set_size(Size::new(1024, 768));

    let ctx = backend.context_mut().expect("context");
    assert_eq!(ctx.acquire(), Some(Size::new(1024, 768)));
    assert_eq!(ctx.acquire(), None);
    assert_eq!(probe().rebuilds, 1);
}

#[test]
fn resize_before_lazy_init_sizes_the_new_context() {
    reset();
    let canvas = FakeCanvas::new(Size::new(800, 600));
    let mut backend = LazyBackend::new(&canvas, ContextInfo::default()).expect("backend");

    backend.set_size(Size::new(200, 100));
    assert!(probe().resizes.is_empty());

    backend.activate().expect("activate");
    backend.deactivate().expect("deactivate");
    assert_eq!(probe().init_size, Some(Size::new(200, 100)));
}

#[test]
fn extension_pointers_resolve_through_the_context() {
    reset();
    let canvas = FakeCanvas::default();
    let mut backend = LazyBackend::new(&canvas, ContextInfo::default()).expect("backend");
    assert!(backend.extension_function_pointer(FAKE_EXTENSION).is_none());

    backend.activate().expect("activate");
    assert!(backend.extension_function_pointer(FAKE_EXTENSION).is_some());
    assert!(backend.extension_function_pointer(c"glMissing").is_none());
    backend.deactivate().expect("deactivate");
}

#[test]
fn loader_entry_points_resolve_before_the_context_exists() {
    reset();
    let canvas = FakeCanvas::default();
    let mut backend = LazyBackend::new(&canvas, ContextInfo::default()).expect("backend");
    assert!(!backend.has_context());
    assert!(backend.extension_function_pointer(FAKE_LOADER_FN).is_some());
    assert!(backend.extension_function_pointer(c"glMissing").is_none());

    backend.activate().expect("activate");
    assert!(backend.extension_function_pointer(FAKE_LOADER_FN).is_some());
    backend.deactivate().expect("deactivate");
}

#[test]
fn drop_while_active_unlocks_then_destroys() {
    reset();
    let canvas = FakeCanvas::default();
    let mut backend = EagerBackend::new(&canvas, ContextInfo::default()).expect("backend");
    backend.activate().expect("activate");
    let setup = events().len();

    drop(backend);
    assert_eq!(
        &events()[setup..],
        [
            "release_current",
            "unlock",
            "lock",
            "destroy",
            "unlock",
            "free_info",
            "free_surface"
        ]
    );
    assert_eq!(lock_depth(), 0);
}

#[test]
fn context_is_destroyed_under_the_surface_lock() {
    reset();
    let canvas = FakeCanvas::default();
    let backend = EagerBackend::new(&canvas, ContextInfo::default()).expect("backend");

    drop(backend);
    assert_eq!(probe().destroy_under_lock, Some(true));
    assert_eq!(lock_depth(), 0);
}

#[test]
fn refused_lock_at_teardown_still_destroys() {
    reset();
    let canvas = FakeCanvas::default();
    let backend = EagerBackend::new(&canvas, ContextInfo::default()).expect("backend");
    canvas.config.lock_error.set(true);
    let setup = events().len();

    drop(backend);
    assert_eq!(
        &events()[setup..],
        ["lock_refused", "destroy", "free_info", "free_surface"]
    );
    assert_eq!(probe().destroy_under_lock, Some(false));
    assert_eq!(lock_depth(), 0);
}

#[test]
fn wait_without_context_is_a_no_op() {
    reset();
    let canvas = FakeCanvas::default();
    let mut backend = LazyBackend::new(&canvas, ContextInfo::default()).expect("backend");
    backend.wait().expect("wait");
    assert_eq!(count("wait"), 0);

    backend.activate().expect("activate");
    backend.wait().expect("wait");
    backend.deactivate().expect("deactivate");
    assert_eq!(count("wait"), 1);
}
