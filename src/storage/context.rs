use std::future::{pending, Future};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use super::StoreError;

/// Caller-supplied cancellation and deadline for a single store operation.
///
/// Every store method takes one. When the deadline passes or the paired
/// [`CancelHandle`] fires, the in-flight operation is dropped and fails with
/// [`StoreError::Timeout`] or [`StoreError::Canceled`]. Dropping a pending write
/// rolls back its database transaction, so nothing half-written becomes visible.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels every [`CallContext`] derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CallContext {
    /// No deadline, not cancellable.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_in(timeout)
    }

    /// Context plus the handle that cancels it.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            deadline: None,
            cancel: Some(rx),
        };
        (ctx, CancelHandle { tx })
    }

    /// Set a deadline, keeping an earlier one if present.
    pub fn deadline_in(mut self, timeout: Duration) -> Self {
        let at = Instant::now() + timeout;
        self.deadline = Some(self.deadline.map_or(at, |d| d.min(at)));
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Drive `op` to completion unless the context is canceled or expires first.
    /// Cancellation wins over an expired deadline, which wins over completion.
    pub async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let canceled = async {
            match self.cancel.clone() {
                Some(mut rx) => {
                    let fired = rx.wait_for(|canceled| *canceled).await.is_ok();
                    if !fired {
                        // Handle dropped without canceling.
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = canceled => Err(StoreError::Canceled),
            _ = expired => Err(StoreError::Timeout),
            result = op => result,
        }
    }
}
