//! Process-wide cap on simultaneous remote API calls

use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Counting semaphore shared by every engine that talks to the remote API
///
/// Clones share the same permits, so one governor handed to several engines
/// bounds their combined in-flight remote calls.
#[derive(Debug, Clone)]
pub struct ConcurrencyGovernor {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyGovernor {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Waits for a slot; the slot is released when the permit drops
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.semaphore.clone().acquire_owned().await
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.limit - self.available()
    }
}
