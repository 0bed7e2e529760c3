//! Cancellation handle shared by all session timers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::AbortHandle;

type Cleanup = Box<dyn FnOnce() + Send>;

/// Handle to a scheduled timer task.
///
/// Clones refer to the same timer. Dropping a handle does not cancel the
/// timer; call [`TimerHandle::cancel`].
#[derive(Clone)]
pub struct TimerHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    cancelled: AtomicBool,
    abort: Mutex<Option<AbortHandle>>,
    cleanup: Mutex<Option<Cleanup>>,
}

impl TimerHandle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                cancelled: AtomicBool::new(false),
                abort: Mutex::new(None),
                cleanup: Mutex::new(None),
            }),
        }
    }

    /// Ties the handle to the spawned task.
    pub(crate) fn attach(&self, abort: AbortHandle) {
        if self.is_cancelled() {
            abort.abort();
            return;
        }
        *self.inner.abort.lock().unwrap_or_else(PoisonError::into_inner) = Some(abort);
    }

    /// Registers work to run exactly once when the timer is cancelled.
    pub(crate) fn on_cancel(&self, cleanup: impl FnOnce() + Send + 'static) {
        *self
            .inner
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(cleanup));
    }

    /// Stops the timer. Safe to call any number of times, from any task,
    /// including the timer's own callback.
    ///
    /// Once this returns, the timer's callback will not be invoked and any
    /// registered cleanup (such as removing activity listeners) has run.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let cleanup = self
            .inner
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }

        let abort = self
            .inner
            .abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(abort) = abort {
            abort.abort();
        }
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
