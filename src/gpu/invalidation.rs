use super::Size;

/// Tracks whether the presentation surface has to be rebuilt before the next frame.
///
/// A rebuild is requested once per distinct non-empty extent. Empty extents
/// (a minimised or collapsed canvas) never request one, but a later non-empty
/// extent does even if it equals the extent seen before the collapse.
#[derive(Debug, Default, Clone)]
pub struct SurfaceInvalidation {
    extent: Size,
    pending: bool,
}

impl SurfaceInvalidation {
    pub fn new(extent: Size) -> Self {
        Self {
            extent,
            pending: false,
        }
    }

    /// Records a new extent. Returns true when this call raised the rebuild request.
    pub fn resize(&mut self, size: Size) -> bool {
        if size.is_empty() {
            self.extent = size;
            return false;
        }
        if size == self.extent {
            return false;
        }

        self.extent = size;
        let raised = !self.pending;
        self.pending = true;
        raised
    }

    /// Forces a rebuild at the current extent, e.g. after an out-of-date swapchain.
    pub fn invalidate(&mut self) {
        if !self.extent.is_empty() {
            self.pending = true;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn extent(&self) -> Size {
        self.extent
    }

    /// Consumes the pending request, returning the extent to rebuild at.
    pub fn take(&mut self) -> Option<Size> {
        if std::mem::take(&mut self.pending) {
            Some(self.extent)
        } else {
            None
        }
    }
}
