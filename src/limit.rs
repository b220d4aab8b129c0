use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default global connection cap. The backend is rate-sensitive; going much
/// higher starts tripping its throttling.
pub const DEFAULT_CONNECTIONS: usize = 50;

/// Counting admission gate shared by every network operation in the process.
///
/// One unit is held for the duration of one request. Permits are RAII: they
/// release on success, error, and task cancellation alike, so a failed fetch
/// can never leak capacity.
#[derive(Clone)]
pub struct RateLimiter {
    sem: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Wait for an admission unit. The semaphore is never closed, so the
    /// acquire can only fail if the process is already tearing down.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.sem
            .clone()
            .acquire_owned()
            .await
            .expect("rate limiter semaphore closed")
    }

    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}
