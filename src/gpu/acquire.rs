//! The per-frame image acquisition sequence of a swapchain presenter.
//!
//! Kept apart from the Vulkan calls so the fence and rebuild bookkeeping can
//! be driven by a fake target.
#![cfg_attr(not(feature = "canvas-vulkan"), allow(dead_code))]

use log::{debug, warn};

use super::{CanvasError, Result, Size, SurfaceInvalidation};

/// Outcome of a single acquire call that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquired {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

/// What [`acquire_frame`] needs from a presenter.
///
/// The acquire fence starts signalled and must be signalled again whenever
/// an acquire call does not consume it.
pub(crate) trait AcquireTarget {
    fn invalidation(&mut self) -> &mut SurfaceInvalidation;

    fn has_swapchain(&self) -> bool;

    fn rebuild(&mut self, size: Size) -> Result<()>;

    fn wait_and_reset_fence(&mut self) -> Result<()>;

    /// Replaces the fence with a signalled one.
    fn rearm_fence(&mut self) -> Result<()>;

    /// Acquires an image, handing the fence to the presentation engine.
    fn acquire(&mut self) -> Result<Acquired>;
}

/// Rebuilds if a resize is pending, then acquires the next image index.
///
/// A failed rebuild stays pending and a failed acquire leaves the fence
/// signalled, so the next frame can retry without blocking.
pub(crate) fn acquire_frame<T: AcquireTarget>(target: &mut T) -> Result<u32> {
    if let Some(size) = target.invalidation().take() {
        if let Err(err) = target.rebuild(size) {
            target.invalidation().invalidate();
            return Err(err);
        }
    }

    if !target.has_swapchain() {
        return Err(CanvasError::Render(
            "no swapchain for an empty surface".to_string(),
        ));
    }

    target.wait_and_reset_fence()?;
    let acquired = target.acquire();

    let err = match acquired {
        Ok(Acquired::Image { index, suboptimal }) => {
            if suboptimal {
                target.invalidation().invalidate();
            }
            return Ok(index);
        }
        Ok(Acquired::OutOfDate) => {
            debug!("swapchain out of date");
            target.invalidation().invalidate();
            CanvasError::Render("swapchain out of date".to_string())
        }
        Err(err) => err,
    };

    if let Err(rearm) = target.rearm_fence() {
        warn!("failed to re-signal the acquire fence: {rearm}");
    }
    Err(err)
}
