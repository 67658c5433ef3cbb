//! In-memory job record store with admission control and FIFO queuing.
//!
//! The store is the single shared mutable structure of the system. One lock
//! guards both the record map and the pending queue, and every status change
//! funnels through [`Job::transition`], so transitions are atomic with
//! respect to concurrent readers (status polls, the aggregator) and writers
//! (the dispatcher, the sweeper).

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};

use crate::error::{DocpressError, Result};
use crate::telemetry::metrics;

use super::{Job, JobId, JobStatus};

struct JobEntry {
    record: Job,
    status_tx: watch::Sender<JobStatus>,
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<JobId, JobEntry>,
    /// Admission order of still-queued jobs; front is dispatched next.
    pending: VecDeque<JobId>,
}

/// Point-in-time counts per state.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct JobCounters {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    pub cleaned: usize,
}

/// Mapping from job identifier to job record, plus the pending FIFO queue.
pub struct JobStore {
    inner: RwLock<StoreInner>,
    queued_notify: Notify,
    max_queue_size: usize,
}

impl JobStore {
    /// Create a store with the given queue capacity (0 = unlimited).
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            queued_notify: Notify::new(),
            max_queue_size,
        }
    }

    /// Admission gate: enqueue a freshly created job, or reject with
    /// `QueueFull` without mutating any state.
    pub fn admit(&self, job: Job) -> Result<Job> {
        let mut inner = self.inner.write();

        if self.max_queue_size > 0 && inner.pending.len() >= self.max_queue_size {
            return Err(DocpressError::queue_full(self.max_queue_size));
        }

        let (status_tx, _) = watch::channel(job.status);
        let record = job.clone();
        inner.pending.push_back(job.id);
        inner.jobs.insert(job.id, JobEntry { record: job, status_tx });
        metrics::set_queue_depth(inner.pending.len());
        drop(inner);

        self.queued_notify.notify_one();
        metrics::record_job_submitted();
        info!(job_id = %record.id, file = %record.input_path.display(), "job admitted");
        Ok(record)
    }

    /// Fetch a snapshot of a job record.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.inner.read().jobs.get(&id).map(|e| e.record.clone())
    }

    /// How many queued jobs are ahead of this one, `None` when not queued.
    pub fn queue_position(&self, id: JobId) -> Option<usize> {
        self.inner.read().pending.iter().position(|&p| p == id)
    }

    /// Subscribe to status changes of a job.
    pub fn subscribe(&self, id: JobId) -> Option<watch::Receiver<JobStatus>> {
        self.inner.read().jobs.get(&id).map(|e| e.status_tx.subscribe())
    }

    /// Wait for the oldest queued job, transition it to `running`, and return
    /// its record. Called only by the dispatcher, which holds a worker permit
    /// before popping, so a job leaves the queue exactly when a slot is free.
    pub async fn next_queued(&self) -> Job {
        loop {
            let notified = self.queued_notify.notified();
            if let Some(job) = self.pop_queued() {
                return job;
            }
            notified.await;
        }
    }

    fn pop_queued(&self) -> Option<Job> {
        let mut inner = self.inner.write();
        while let Some(id) = inner.pending.pop_front() {
            let queue_len = inner.pending.len();
            if let Some(entry) = inner.jobs.get_mut(&id) {
                if entry.record.transition(JobStatus::Running).is_ok() {
                    let _ = entry.status_tx.send_replace(JobStatus::Running);
                    let record = entry.record.clone();
                    metrics::set_queue_depth(queue_len);
                    metrics::set_running_jobs(count_status(&inner, JobStatus::Running));
                    debug!(job_id = %record.id, "job dequeued");
                    return Some(record);
                }
            }
        }
        None
    }

    /// Record the current attempt index while the job stays `running`.
    pub fn set_retries(&self, id: JobId, retries: u32) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.jobs.get_mut(&id) {
            entry.record.retries = retries;
            entry.record.last_modified_at = Utc::now();
        }
    }

    /// Terminal success: `running → done`, artifact path recorded.
    pub fn complete(&self, id: JobId, output_path: PathBuf) -> Result<()> {
        self.finish(id, JobStatus::Done, Some(output_path), None)
    }

    /// Terminal failure: `running → failed`, reason recorded.
    pub fn fail(&self, id: JobId, reason: String) -> Result<()> {
        self.finish(id, JobStatus::Failed, None, Some(reason))
    }

    fn finish(
        &self,
        id: JobId,
        status: JobStatus,
        output_path: Option<PathBuf>,
        error_message: Option<String>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| DocpressError::job_not_found(id))?;
        entry.record.transition(status)?;
        if output_path.is_some() {
            entry.record.output_path = output_path;
        }
        if error_message.is_some() {
            entry.record.error_message = error_message;
        }
        let _ = entry.status_tx.send_replace(status);
        metrics::set_running_jobs(count_status(&inner, JobStatus::Running));
        Ok(())
    }

    /// Sweeper transition: `done | failed → cleaned`, artifact reference
    /// dropped.
    pub fn mark_cleaned(&self, id: JobId) -> Result<()> {
        let mut inner = self.inner.write();
        let entry = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| DocpressError::job_not_found(id))?;
        entry.record.transition(JobStatus::Cleaned)?;
        entry.record.output_path = None;
        let _ = entry.status_tx.send_replace(JobStatus::Cleaned);
        Ok(())
    }

    /// Jobs whose artifacts are due for cleanup: `done`/`failed` with a
    /// terminal transition older than the cutoff.
    pub fn sweep_candidates(&self, cutoff: DateTime<Utc>) -> Vec<(JobId, PathBuf)> {
        self.inner
            .read()
            .jobs
            .values()
            .filter(|e| {
                matches!(e.record.status, JobStatus::Done | JobStatus::Failed)
                    && e.record.finished_at.map(|f| f < cutoff).unwrap_or(false)
            })
            .map(|e| (e.record.id, e.record.workdir.clone()))
            .collect()
    }

    /// Evict terminal records older than the cutoff, returning what was
    /// removed so the caller can reclaim any directory still on disk.
    pub fn evict_expired(&self, cutoff: DateTime<Utc>) -> Vec<(JobId, PathBuf)> {
        let mut inner = self.inner.write();
        let expired: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|e| {
                e.record.status.is_terminal()
                    && e.record.finished_at.map(|f| f < cutoff).unwrap_or(false)
            })
            .map(|e| e.record.id)
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(entry) = inner.jobs.remove(&id) {
                info!(job_id = %id, "job record evicted after TTL");
                removed.push((id, entry.record.workdir));
            }
        }
        removed
    }

    /// Point-in-time counts for the status aggregator.
    pub fn counters(&self) -> JobCounters {
        let inner = self.inner.read();
        let mut counters = JobCounters {
            total: inner.jobs.len(),
            ..Default::default()
        };
        for entry in inner.jobs.values() {
            match entry.record.status {
                JobStatus::Queued => counters.queued += 1,
                JobStatus::Running => counters.running += 1,
                JobStatus::Done => counters.done += 1,
                JobStatus::Failed => counters.failed += 1,
                JobStatus::Cleaned => counters.cleaned += 1,
            }
        }
        counters
    }

    /// Test hook: pretend a job finished in the past.
    #[cfg(test)]
    pub(crate) fn backdate_finished(&self, id: JobId, finished_at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.jobs.get_mut(&id) {
            entry.record.finished_at = Some(finished_at);
            entry.record.last_modified_at = finished_at;
        }
    }
}

fn count_status(inner: &StoreInner, status: JobStatus) -> usize {
    inner
        .jobs
        .values()
        .filter(|e| e.record.status == status)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn new_job(max_retries: u32) -> Job {
        let id = JobId::new();
        Job::new(
            id,
            PathBuf::from(format!("/tmp/docpress/{}/input/doc.odt", id)),
            PathBuf::from(format!("/tmp/docpress/{}", id)),
            None,
            max_retries,
        )
    }

    #[test]
    fn test_admit_and_get() {
        let store = JobStore::new(0);
        let job = store.admit(new_job(2)).unwrap();

        let fetched = store.get(job.id).unwrap();
        assert_eq!(fetched.status, JobStatus::Queued);
        assert_eq!(fetched.retries, 0);
        assert!(store.get(JobId::new()).is_none());
    }

    #[test]
    fn test_queue_capacity_enforced() {
        let store = JobStore::new(2);
        store.admit(new_job(0)).unwrap();
        store.admit(new_job(0)).unwrap();

        let err = store.admit(new_job(0)).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::QueueFull);

        // Rejection created no record.
        assert_eq!(store.counters().total, 2);
    }

    #[test]
    fn test_unlimited_queue_never_rejects() {
        let store = JobStore::new(0);
        for _ in 0..2000 {
            store.admit(new_job(0)).unwrap();
        }
        assert_eq!(store.counters().queued, 2000);
    }

    #[tokio::test]
    async fn test_fifo_dequeue_order() {
        let store = JobStore::new(0);
        let first = store.admit(new_job(0)).unwrap();
        let second = store.admit(new_job(0)).unwrap();
        let third = store.admit(new_job(0)).unwrap();

        assert_eq!(store.queue_position(first.id), Some(0));
        assert_eq!(store.queue_position(second.id), Some(1));
        assert_eq!(store.queue_position(third.id), Some(2));

        let popped = store.next_queued().await;
        assert_eq!(popped.id, first.id);
        assert_eq!(popped.status, JobStatus::Running);
        assert_eq!(store.queue_position(first.id), None);
        assert_eq!(store.queue_position(second.id), Some(0));

        assert_eq!(store.next_queued().await.id, second.id);
        assert_eq!(store.next_queued().await.id, third.id);
    }

    #[tokio::test]
    async fn test_next_queued_wakes_on_admission() {
        let store = std::sync::Arc::new(JobStore::new(0));

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.next_queued().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let job = store.admit(new_job(0)).unwrap();
        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped.id, job.id);
    }

    #[tokio::test]
    async fn test_complete_and_fail_notify_watchers() {
        let store = JobStore::new(0);

        let job = store.admit(new_job(0)).unwrap();
        let mut rx = store.subscribe(job.id).unwrap();
        let running = store.next_queued().await;
        store
            .complete(running.id, running.workdir.join("doc.pdf"))
            .unwrap();

        rx.wait_for(|s| s.is_terminal()).await.unwrap();
        let done = store.get(job.id).unwrap();
        assert_eq!(done.status, JobStatus::Done);
        assert!(done.output_path.is_some());
        assert!(done.finished_at.is_some());

        let job = store.admit(new_job(0)).unwrap();
        let running = store.next_queued().await;
        store.fail(running.id, "converter failed (code 1)".into()).unwrap();
        let failed = store.get(job.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("converter failed (code 1)")
        );
    }

    #[tokio::test]
    async fn test_mark_cleaned_only_from_terminal() {
        let store = JobStore::new(0);
        let job = store.admit(new_job(0)).unwrap();

        // Still queued: refuse.
        assert!(store.mark_cleaned(job.id).is_err());

        let running = store.next_queued().await;
        store.complete(running.id, running.workdir.join("doc.pdf")).unwrap();
        store.mark_cleaned(job.id).unwrap();

        let cleaned = store.get(job.id).unwrap();
        assert_eq!(cleaned.status, JobStatus::Cleaned);
        assert!(cleaned.output_path.is_none());
    }

    #[tokio::test]
    async fn test_sweep_candidates_and_eviction() {
        let store = JobStore::new(0);
        let job = store.admit(new_job(0)).unwrap();
        let running = store.next_queued().await;
        store.complete(running.id, running.workdir.join("doc.pdf")).unwrap();

        let now = Utc::now();
        assert!(store.sweep_candidates(now - chrono::Duration::hours(1)).is_empty());

        store.backdate_finished(job.id, now - chrono::Duration::hours(2));
        let due = store.sweep_candidates(now - chrono::Duration::hours(1));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, job.id);

        store.mark_cleaned(job.id).unwrap();
        // Cleaned jobs are no longer artifact-sweep candidates.
        assert!(store.sweep_candidates(now - chrono::Duration::hours(1)).is_empty());

        let evicted = store.evict_expired(now - chrono::Duration::hours(1));
        assert_eq!(evicted.len(), 1);
        assert!(store.get(job.id).is_none());
    }

    #[tokio::test]
    async fn test_counters() {
        let store = JobStore::new(0);
        let a = store.admit(new_job(0)).unwrap();
        store.admit(new_job(0)).unwrap();

        let running = store.next_queued().await;
        assert_eq!(running.id, a.id);

        let counters = store.counters();
        assert_eq!(counters.total, 2);
        assert_eq!(counters.queued, 1);
        assert_eq!(counters.running, 1);
        assert_eq!(counters.done, 0);

        store.complete(a.id, a.workdir.join("doc.pdf")).unwrap();
        let counters = store.counters();
        assert_eq!(counters.running, 0);
        assert_eq!(counters.done, 1);
    }
}
