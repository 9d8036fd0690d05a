use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use log::trace;
use parking_lot::Mutex;

type Task = Box<dyn FnOnce() + Send + 'static>;
type PlatformCallback = Arc<dyn Fn() + Send + Sync + 'static>;

struct LoopState {
    alive: AtomicBool,
    callback: Mutex<Option<PlatformCallback>>,
}

impl LoopState {
    fn notify(&self) {
        // Cloned out so the callback can schedule again without deadlocking.
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Cooperative task queue pumped from outside.
///
/// Nothing runs on its own: every [`Scheduler::schedule`] calls the platform
/// callback, which asks the host to call [`RunLoop::run_once`] on its thread.
pub struct RunLoop {
    tx: Sender<Task>,
    rx: Receiver<Task>,
    state: Arc<LoopState>,
}

/// Cloneable handle that queues tasks onto a [`RunLoop`] from any thread.
#[derive(Clone)]
pub struct Scheduler {
    tx: Sender<Task>,
    state: Arc<LoopState>,
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLoop {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            state: Arc::new(LoopState {
                alive: AtomicBool::new(true),
                callback: Mutex::new(None),
            }),
        }
    }

    /// Installs the hook invoked whenever a task is scheduled.
    pub fn set_platform_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.state.callback.lock() = Some(Arc::new(callback));
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler {
            tx: self.tx.clone(),
            state: Arc::clone(&self.state),
        }
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Runs the tasks that were queued when called and returns how many ran.
    ///
    /// Tasks scheduled by those tasks wait for the next call.
    pub fn run_once(&self) -> usize {
        let queued = self.rx.len();
        let mut ran = 0;
        while ran < queued {
            let Ok(task) = self.rx.try_recv() else {
                break;
            };
            task();
            ran += 1;
        }
        if ran > 0 {
            trace!("run loop ran {ran} task(s)");
        }
        ran
    }
}

impl Drop for RunLoop {
    fn drop(&mut self) {
        self.state.alive.store(false, Ordering::Release);
        self.state.callback.lock().take();
        let discarded = self.rx.try_iter().count();
        if discarded > 0 {
            trace!("run loop dropped {discarded} pending task(s)");
        }
    }
}

impl Scheduler {
    /// Queues `task` and pokes the host. Returns false once the loop is gone.
    pub fn schedule(&self, task: impl FnOnce() + Send + 'static) -> bool {
        if !self.state.alive.load(Ordering::Acquire) {
            return false;
        }
        if self.tx.send(Box::new(task)).is_err() {
            return false;
        }
        self.state.notify();
        true
    }

    pub fn is_alive(&self) -> bool {
        self.state.alive.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn scheduled_tasks_wait_for_run_once() {
        let run_loop = RunLoop::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        assert!(run_loop.scheduler().schedule(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(run_loop.run_once(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(run_loop.run_once(), 0);
    }

    #[test]
    fn scheduling_invokes_platform_callback() {
        let run_loop = RunLoop::new();
        let pokes = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&pokes);
        run_loop.set_platform_callback(move || {
            p.fetch_add(1, Ordering::SeqCst);
        });
        let scheduler = run_loop.scheduler();
        scheduler.schedule(|| {});
        scheduler.schedule(|| {});
        assert_eq!(pokes.load(Ordering::SeqCst), 2);
        assert_eq!(run_loop.pending(), 2);
    }

    #[test]
    fn tasks_scheduled_while_running_wait_for_next_pump() {
        let run_loop = RunLoop::new();
        let scheduler = run_loop.scheduler();
        let inner = scheduler.clone();
        scheduler.schedule(move || {
            inner.schedule(|| {});
        });
        assert_eq!(run_loop.run_once(), 1);
        assert_eq!(run_loop.pending(), 1);
        assert_eq!(run_loop.run_once(), 1);
    }

    #[test]
    fn scheduler_outliving_loop_is_inert() {
        let run_loop = RunLoop::new();
        let pokes = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&pokes);
        run_loop.set_platform_callback(move || {
            p.fetch_add(1, Ordering::SeqCst);
        });
        let scheduler = run_loop.scheduler();
        drop(run_loop);
        assert!(!scheduler.is_alive());
        assert!(!scheduler.schedule(|| {}));
        assert_eq!(pokes.load(Ordering::SeqCst), 0);
    }
}
