//! Cooperative cancellation for running submissions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Handle for cooperative cancellation of a submission.
///
/// `AbortHandle` is a shared flag. It can be cloned and handed to another
/// task or thread, and any clone can trigger the abort, which every other
/// clone then observes. The interpreter checks it before and after
/// compilation, on every loop iteration, on every function call and while
/// waiting in `Thread.Sleep` / `Wait`.
///
/// # Example
///
/// ```
/// use scriptpad_core::execute::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let handle_clone = handle.clone();
///
/// assert!(!handle.is_aborted());
///
/// // Trigger abort from any clone
/// handle_clone.abort();
///
/// // All clones see the abort
/// assert!(handle.is_aborted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    /// Shared abort flag.
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Create a new abort handle.
    pub fn new() -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Request abort of the running submission.
    ///
    /// Scripts are not interrupted preemptively; the run stops at its next
    /// cancellation point.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Clear the flag so the handle can be reused for the next submission.
    pub fn reset(&self) {
        self.aborted.store(false, Ordering::Relaxed);
    }
}
