//! The conversion service: the object tying the store, the worker pool, and
//! the converter backend together, plus the read-only status aggregator.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{available_cpus, CleanupConfig, Config, ConverterConfig};
use crate::convert::Converter;
use crate::error::{DocpressError, Result};

use super::runner::{self, DispatcherHandle};
use super::{Job, JobCounters, JobId, JobStatus, JobStore, WorkerPool};

/// An upload written to disk but not yet admitted.
///
/// Admission rejections leave no job record; the caller discards the staged
/// directory instead.
#[derive(Debug)]
pub struct StagedUpload {
    pub id: JobId,
    pub workdir: PathBuf,
    pub input_path: PathBuf,
}

/// Aggregate point-in-time view of the service.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub status: String,
    pub uptime_seconds: u64,
    pub convert_timeout_seconds: u64,
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub max_queue_size: usize,
    pub artifact_ttl_seconds: u64,
    pub record_ttl_seconds: u64,
    pub total_jobs: usize,
    pub queue_length: usize,
    pub running_jobs: usize,
    pub done_jobs: usize,
    pub failed_jobs: usize,
    pub cleaned_jobs: usize,
    pub peak_concurrency: usize,
    pub cpu_cores: usize,
    pub data_dir_used_bytes: u64,
    pub data_dir_free_bytes: u64,
}

/// Owns the job store, the worker pool, and the converter backend.
pub struct ConvertService {
    store: JobStore,
    pool: WorkerPool,
    converter: Arc<dyn Converter>,
    converter_cfg: ConverterConfig,
    cleanup_cfg: CleanupConfig,
    data_dir: PathBuf,
    started_at: Instant,
}

impl ConvertService {
    /// Build the service from configuration and a converter backend.
    pub fn new(config: &Config, converter: Arc<dyn Converter>) -> Self {
        let concurrency = config.converter.effective_concurrency();
        Self {
            store: JobStore::new(config.converter.max_queue_size),
            pool: WorkerPool::new(concurrency),
            converter,
            converter_cfg: config.converter.clone(),
            cleanup_cfg: config.cleanup.clone(),
            data_dir: config.storage.data_dir.clone(),
            started_at: Instant::now(),
        }
    }

    /// Start the dispatcher pulling queued jobs into worker slots.
    pub fn start(self: Arc<Self>) -> DispatcherHandle {
        runner::start_dispatcher(self)
    }

    /// Allocate a working directory for an incoming upload.
    ///
    /// The returned `input_path` is where the caller must write the upload
    /// before submitting.
    pub async fn stage(&self, filename: &str) -> Result<StagedUpload> {
        // Only the final component; an upload must not escape its workdir.
        let filename = Path::new(filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty() && n != "." && n != "..")
            .ok_or_else(|| DocpressError::invalid_input("Upload has no usable filename"))?;

        let id = JobId::new();
        let workdir = self.data_dir.join(id.to_string());
        let input_dir = workdir.join("input");
        tokio::fs::create_dir_all(&input_dir).await?;

        Ok(StagedUpload {
            id,
            workdir,
            input_path: input_dir.join(filename),
        })
    }

    /// Admit a staged upload into the queue.
    ///
    /// On `QueueFull` no record is created; the caller discards the staged
    /// directory.
    pub fn submit(&self, staged: &StagedUpload, convert_to: Option<String>) -> Result<Job> {
        let job = Job::new(
            staged.id,
            staged.input_path.clone(),
            staged.workdir.clone(),
            convert_to,
            self.converter_cfg.max_retries,
        );
        self.store.admit(job)
    }

    /// Remove a staged upload that never got admitted.
    pub async fn discard_staged(&self, staged: &StagedUpload) {
        let _ = tokio::fs::remove_dir_all(&staged.workdir).await;
    }

    /// Fetch a job record.
    pub fn job(&self, id: JobId) -> Result<Job> {
        self.store.get(id).ok_or_else(|| DocpressError::job_not_found(id))
    }

    /// Queue position for a still-queued job.
    pub fn queue_position(&self, id: JobId) -> Option<usize> {
        self.store.queue_position(id)
    }

    /// Block until the job reaches a terminal state, then return its record.
    ///
    /// A caller abandoning this future does not cancel the conversion; the
    /// dispatcher owns execution and the job simply completes as usual.
    pub async fn wait(&self, id: JobId) -> Result<Job> {
        let mut rx = self
            .store
            .subscribe(id)
            .ok_or_else(|| DocpressError::job_not_found(id))?;
        // Err here means the record was evicted mid-wait; fall through to the
        // lookup so the caller gets a JobNotFound.
        let _ = rx.wait_for(|status| status.is_terminal()).await;
        self.job(id)
    }

    /// Resolve the downloadable artifact for a job.
    pub fn artifact(&self, id: JobId) -> Result<PathBuf> {
        let job = self.job(id)?;
        match (job.status, job.output_path) {
            (JobStatus::Done, Some(path)) => Ok(path),
            (status, _) => Err(DocpressError::artifact_unavailable(id, status)),
        }
    }

    /// Compute the aggregate status snapshot (read-only).
    pub fn snapshot(&self) -> SystemStatus {
        let counters: JobCounters = self.store.counters();
        let pool_stats = self.pool.stats();
        let (used, free) = disk_stats(&self.data_dir);

        SystemStatus {
            status: "ok".to_string(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            convert_timeout_seconds: self.converter_cfg.timeout.as_secs(),
            max_concurrency: self.pool.max_workers(),
            max_retries: self.converter_cfg.max_retries,
            max_queue_size: self.converter_cfg.max_queue_size,
            artifact_ttl_seconds: self.cleanup_cfg.artifact_ttl.as_secs(),
            record_ttl_seconds: self.cleanup_cfg.record_ttl.as_secs(),
            total_jobs: counters.total,
            queue_length: counters.queued,
            running_jobs: counters.running,
            done_jobs: counters.done,
            failed_jobs: counters.failed,
            cleaned_jobs: counters.cleaned,
            peak_concurrency: pool_stats.peak_concurrent,
            cpu_cores: available_cpus(),
            data_dir_used_bytes: used,
            data_dir_free_bytes: free,
        }
    }

    pub(crate) fn store(&self) -> &JobStore {
        &self.store
    }

    pub(crate) fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub(crate) fn converter(&self) -> &Arc<dyn Converter> {
        &self.converter
    }

    pub(crate) fn converter_cfg(&self) -> &ConverterConfig {
        &self.converter_cfg
    }

    pub(crate) fn cleanup_cfg(&self) -> &CleanupConfig {
        &self.cleanup_cfg
    }
}

#[cfg(unix)]
fn disk_stats(path: &Path) -> (u64, u64) {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) else {
        return (0, 0);
    };
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(cpath.as_ptr(), &mut stat) };
    if rc != 0 {
        return (0, 0);
    }
    let total = stat.f_frsize as u64 * stat.f_blocks as u64;
    let free = stat.f_frsize as u64 * stat.f_bavail as u64;
    (total.saturating_sub(free), free)
}

#[cfg(not(unix))]
fn disk_stats(_path: &Path) -> (u64, u64) {
    (0, 0)
}
