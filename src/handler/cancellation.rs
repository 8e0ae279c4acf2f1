use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Cooperative cancellation signal threaded through an [`super::OperationContext`].
///
/// `cancel()` is synchronous, idempotent, and non-blocking (§5): it flips a
/// flag and wakes anyone waiting on [`CancellationHandle::cancelled`].
/// Handlers that perform no suspension points never need to look at this;
/// handlers that do long-running or externally-suspended work should poll
/// [`is_cancelled`](Self::is_cancelled) or race it against their I/O.
#[derive(Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called. If it already has been,
    /// resolves immediately.
    ///
    /// The `notified()` future is constructed before the flag check so a
    /// `cancel()` racing in between is never missed: `Notify` registers the
    /// waiter at creation time, not at first `.await`, so a `notify_waiters()`
    /// landing in that window still wakes it (tokio's documented pattern for
    /// this exact check-then-wait race).
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}
