use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifetime of one mounted agent view.
///
/// Every asynchronous operation started on behalf of a view carries a clone
/// of its scope. Once the scope is cancelled, late results are discarded
/// instead of being written into view state.
#[derive(Debug, Clone)]
pub struct ViewScope {
    cancelled: Arc<watch::Sender<bool>>,
}

impl Default for ViewScope {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewScope {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            cancelled: Arc::new(tx),
        }
    }

    /// Returns true only for the call that actually cancelled the scope.
    pub fn cancel(&self) -> bool {
        self.cancelled.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolves once the scope is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.subscribe();
        // The sender lives in `self`, so this only errors if it was dropped.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Drives `fut` unless the scope is cancelled first. `None` means the
    /// result, if any, belongs to a view that no longer exists.
    pub async fn run<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = fut => {
                if self.is_cancelled() {
                    None
                } else {
                    Some(output)
                }
            }
        }
    }
}
