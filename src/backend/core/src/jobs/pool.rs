//! Worker pool: a fixed set of concurrent execution slots.
//!
//! Concurrency is bounded with a tokio `Semaphore`; a permit is one
//! conversion slot and is held for the whole supervised execution of a job,
//! including its retries. Slots release when the permit is marked (or
//! dropped), never mid-retry.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::Result;

/// Statistics tracked across the pool's lifetime.
#[derive(Default)]
struct PoolStats {
    jobs_started: AtomicU64,
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    current_concurrent: AtomicUsize,
    peak_concurrent: AtomicUsize,
}

impl PoolStats {
    fn record_acquire(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
        let current = self.current_concurrent.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_concurrent.fetch_max(current, Ordering::Relaxed);
    }

    fn record_release(&self) {
        self.current_concurrent.fetch_sub(1, Ordering::Relaxed);
    }
}

/// A held execution slot; releases back to the pool on drop.
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<PoolStats>,
    marked: bool,
}

impl WorkerPermit {
    /// Record a successful execution and release the slot.
    pub fn mark_success(mut self) {
        self.stats.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
        self.marked = true;
    }

    /// Record a failed execution and release the slot.
    pub fn mark_failure(mut self) {
        self.stats.jobs_failed.fetch_add(1, Ordering::Relaxed);
        self.marked = true;
    }
}

impl Drop for WorkerPermit {
    fn drop(&mut self) {
        self.stats.record_release();
        if !self.marked {
            // Dropped without an outcome; count as failed so the totals add up.
            self.stats.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Snapshot of pool statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerPoolStats {
    pub max_workers: usize,
    pub active_workers: usize,
    pub jobs_started: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub peak_concurrent: usize,
}

/// Bounded set of concurrent execution slots.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    stats: Arc<PoolStats>,
    max_workers: usize,
}

impl WorkerPool {
    /// Create a pool with the given number of slots.
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        tracing::info!(max_workers, "worker pool created");
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            stats: Arc::new(PoolStats::default()),
            max_workers,
        }
    }

    /// Maximum worker count.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Currently free slots.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Currently held slots.
    pub fn active_workers(&self) -> usize {
        self.max_workers - self.semaphore.available_permits()
    }

    /// Check if every slot is taken.
    pub fn is_at_capacity(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<WorkerPermit> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        self.stats.record_acquire();
        Ok(WorkerPermit {
            _permit: permit,
            stats: self.stats.clone(),
            marked: false,
        })
    }

    /// Take a slot without waiting, `None` when at capacity.
    pub fn try_acquire(&self) -> Option<WorkerPermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                self.stats.record_acquire();
                Some(WorkerPermit {
                    _permit: permit,
                    stats: self.stats.clone(),
                    marked: false,
                })
            }
            Err(_) => None,
        }
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            max_workers: self.max_workers,
            active_workers: self.active_workers(),
            jobs_started: self.stats.jobs_started.load(Ordering::Relaxed),
            jobs_succeeded: self.stats.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.stats.jobs_failed.load(Ordering::Relaxed),
            peak_concurrent: self.stats.peak_concurrent.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pool_creation() {
        let pool = WorkerPool::new(4);
        assert_eq!(pool.max_workers(), 4);
        assert_eq!(pool.available_permits(), 4);
        assert_eq!(pool.active_workers(), 0);
        assert!(!pool.is_at_capacity());

        // Zero is clamped so the pool can always make progress.
        let pool = WorkerPool::new(0);
        assert_eq!(pool.max_workers(), 1);
    }

    #[tokio::test]
    async fn test_acquire_release() {
        let pool = WorkerPool::new(2);

        let permit1 = pool.acquire().await.unwrap();
        assert_eq!(pool.available_permits(), 1);

        let permit2 = pool.acquire().await.unwrap();
        assert!(pool.is_at_capacity());

        permit1.mark_success();
        assert_eq!(pool.available_permits(), 1);

        permit2.mark_failure();
        assert_eq!(pool.available_permits(), 2);

        let stats = pool.stats();
        assert_eq!(stats.jobs_started, 2);
        assert_eq!(stats.jobs_succeeded, 1);
        assert_eq!(stats.jobs_failed, 1);
    }

    #[tokio::test]
    async fn test_try_acquire() {
        let pool = WorkerPool::new(1);

        let permit1 = pool.try_acquire();
        assert!(permit1.is_some());
        assert!(pool.try_acquire().is_none());

        drop(permit1);
        assert!(pool.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_concurrency_bound_under_load() {
        let pool = Arc::new(WorkerPool::new(3));

        let mut handles = vec![];
        for _ in 0..20 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let permit = pool.acquire().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
                permit.mark_success();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.jobs_started, 20);
        assert_eq!(stats.jobs_succeeded, 20);
        assert!(stats.peak_concurrent <= 3);
        assert_eq!(pool.available_permits(), 3);
    }
}
