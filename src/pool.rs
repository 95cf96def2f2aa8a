//! Concurrency pool and cancellation primitives.
//!
//! `QuerySlots` bounds the number of simultaneous in-flight query tasks with
//! a semaphore; permits are only ever acquired and released, never inspected.
//! `CancelToken` is an explicit, clonable cancellation handle passed into
//! every long-running engine operation so per-explore recursion and the
//! poller compose under structured concurrency.

use std::sync::Arc;

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

/// Bounded pool of query slots.
#[derive(Debug, Clone)]
pub struct QuerySlots {
    semaphore: Arc<Semaphore>,
}

impl QuerySlots {
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Wait for a free slot. The permit is released on drop.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Cancelled)
    }
}

/// Explicit cancellation token.
///
/// Cloning is cheap; cancelling any clone cancels them all.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        while !*receiver.borrow() {
            if receiver.changed().await.is_err() {
                // All senders dropped without cancelling; treat as pending
                // forever rather than spuriously resolving.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
