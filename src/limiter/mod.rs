use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Result, ScraperError};

/// Bounds the number of concurrently in-flight calls to a fixed slot count.
///
/// A reusable primitive, not tied to any one engine instance: clone it to
/// share a bound, or build a fresh limiter for an independent one. Permits
/// release on drop, so a slot frees on every exit path of the wrapped call.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    bound: usize,
}

pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// A zero bound would deadlock every caller, so it is clamped to 1.
    pub fn new(bound: usize) -> Self {
        let bound = bound.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(bound)),
            bound,
        }
    }

    /// Blocks until a slot frees.
    pub async fn acquire(&self) -> Result<LimiterPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ScraperError::Session("concurrency limiter closed".to_string()))?;
        Ok(LimiterPermit { _permit: permit })
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
