//! Cancellation handle shared by the loader (spec §4.3 "Cancellation").

use tokio_util::sync::CancellationToken;

/// A handle that can be used to request cancellation of an in-flight fetch.
///
/// Cloning shares the same underlying token: cancelling any clone cancels all of
/// them, which is what lets [`crate::loader::Loader::cancel`] reach into the
/// in-flight table without holding a lock across the fetch itself.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Requests cancellation. The loader observes this the next time it reaches a
    /// `tokio::select!` suspension point (spec §4.3's listed suspension points:
    /// connect, send-body, receive-headers, receive-body-chunk, auth-challenge).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_pending_wait_immediately() {
        let handle = CancelHandle::new();
        let waiter = handle.clone();

        let task = tokio::spawn(async move {
            waiter.cancelled().await;
        });

        tokio::task::yield_now().await;
        handle.cancel();

        tokio::time::timeout(std::time::Duration::from_millis(200), task)
            .await
            .expect("cancel should wake the waiting task")
            .expect("task ok");
    }

    #[test]
    fn is_cancelled_reflects_cancel_call() {
        let handle = CancelHandle::new();
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
    }
}
