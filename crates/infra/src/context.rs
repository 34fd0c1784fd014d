//! Per-call deadline and cancellation.

use std::future::pending;
use std::time::Duration;

use tokio::sync::watch;

use crate::store::Deadline;

/// Why a call stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    DeadlineExceeded,
    Cancelled,
}

/// Create a linked cancel handle / signal pair.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Fires the paired [`CancelSignal`]s. Dropping the handle does not cancel.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; never resolves if the handle is dropped first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            pending::<()>().await;
        }
    }
}

/// Deadline and cancellation carried by one coordinator call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Deadline,
    cancel: Option<CancelSignal>,
}

impl CallContext {
    /// No deadline, not cancellable.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = self.deadline.min(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Deadline::after(timeout))
    }

    pub fn with_cancellation(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Current interruption, if any. Cancellation wins over an expired deadline.
    pub fn interruption(&self) -> Option<Interruption> {
        if self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled) {
            Some(Interruption::Cancelled)
        } else if self.deadline.has_expired() {
            Some(Interruption::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves when the call is cancelled or its deadline passes; pending
    /// forever for a background context.
    pub async fn interrupted(&self) -> Interruption {
        let cancelled = async {
            match &self.cancel {
                Some(signal) => signal.cancelled().await,
                None => pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline.instant() {
                Some(at) => tokio::time::sleep_until(at).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Interruption::Cancelled,
            _ = expired => Interruption::DeadlineExceeded,
        }
    }
}
