//! TTL-based cleanup sweeper.
//!
//! A periodic background task that reclaims disk space and bookkeeping
//! records for terminal jobs. Each pass is idempotent: artifacts of aged
//! `done`/`failed` jobs are deleted and the jobs move to `cleaned`; terminal
//! records past the record TTL are evicted entirely. Queued and running jobs
//! are never touched. A TTL of zero disables that half of the sweep.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::service::ConvertService;

/// What a single sweep pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs whose artifacts were deleted and state moved to `cleaned`
    pub artifacts_cleaned: usize,
    /// Job records evicted after the record TTL
    pub records_evicted: usize,
}

/// Handle for controlling the running sweeper.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop after the current pass.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the sweeper task to finish.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Spawn the periodic sweeper.
pub fn start_sweeper(service: Arc<ConvertService>) -> SweeperHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let interval = service.cleanup_cfg().interval.max(Duration::from_secs(1));

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a restart does not
        // race jobs admitted during startup.
        ticker.tick().await;

        info!(interval_secs = interval.as_secs(), "cleanup sweeper started");
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    let report = sweep_once(&service).await;
                    if report != SweepReport::default() {
                        info!(
                            artifacts_cleaned = report.artifacts_cleaned,
                            records_evicted = report.records_evicted,
                            "cleanup pass finished"
                        );
                    }
                }
            }
        }
        info!("cleanup sweeper stopped");
    });

    SweeperHandle {
        shutdown: shutdown_tx,
        handle,
    }
}

/// Run one sweep pass.
pub async fn sweep_once(service: &ConvertService) -> SweepReport {
    let mut report = SweepReport::default();
    let now = Utc::now();
    let cfg = service.cleanup_cfg();

    if !cfg.artifact_ttl.is_zero() {
        let cutoff = now - chrono_duration(cfg.artifact_ttl);
        for (id, workdir) in service.store().sweep_candidates(cutoff) {
            if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    error!(job_id = %id, error = %e, "failed to remove job directory");
                    continue;
                }
            }
            match service.store().mark_cleaned(id) {
                Ok(()) => {
                    info!(job_id = %id, "artifacts cleaned after retention period");
                    report.artifacts_cleaned += 1;
                }
                // The job raced into another state; leave it for a later pass.
                Err(e) => error!(job_id = %id, error = %e, "failed to mark job cleaned"),
            }
        }
    }

    if !cfg.record_ttl.is_zero() {
        let cutoff = now - chrono_duration(cfg.record_ttl);
        for (id, workdir) in service.store().evict_expired(cutoff) {
            // Usually already reclaimed by the artifact sweep; evicted
            // records must not leak their directories either way.
            if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    error!(job_id = %id, error = %e, "failed to remove job directory");
                }
            }
            report.records_evicted += 1;
        }
    }

    report
}

fn chrono_duration(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::convert::{ConvertOutcome, ConvertRequest, Converter};
    use crate::jobs::JobStatus;
    use async_trait::async_trait;
    use std::path::Path;

    struct CopyConverter;

    #[async_trait]
    impl Converter for CopyConverter {
        async fn run(&self, req: &ConvertRequest) -> ConvertOutcome {
            let output = req.outdir.join("out.pdf");
            match tokio::fs::write(&output, b"%PDF-1.4").await {
                Ok(()) => ConvertOutcome::Success { output_path: output },
                Err(e) => ConvertOutcome::Failure {
                    reason: e.to_string(),
                },
            }
        }
    }

    fn test_service(data_dir: &Path, artifact_ttl: Duration, record_ttl: Duration) -> Arc<ConvertService> {
        let mut config = Config::default();
        config.storage.data_dir = data_dir.to_path_buf();
        config.converter.max_concurrency = 1;
        config.cleanup.artifact_ttl = artifact_ttl;
        config.cleanup.record_ttl = record_ttl;
        Arc::new(ConvertService::new(&config, Arc::new(CopyConverter)))
    }

    async fn finished_job(service: &Arc<ConvertService>) -> crate::jobs::Job {
        let staged = service.stage("doc.odt").await.unwrap();
        tokio::fs::write(&staged.input_path, b"doc").await.unwrap();
        let job = service.submit(&staged, None).unwrap();

        let dispatcher = service.clone().start();
        let done = tokio::time::timeout(Duration::from_secs(5), service.wait(job.id))
            .await
            .unwrap()
            .unwrap();
        dispatcher.shutdown();
        dispatcher.join().await;
        done
    }

    #[tokio::test]
    async fn test_fresh_terminal_jobs_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path(), Duration::from_secs(3600), Duration::from_secs(86400));
        let job = finished_job(&service).await;

        let report = sweep_once(&service).await;
        assert_eq!(report, SweepReport::default());
        assert_eq!(service.job(job.id).unwrap().status, JobStatus::Done);
        assert!(job.workdir.exists());
    }

    #[tokio::test]
    async fn test_aged_artifacts_are_cleaned_then_record_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path(), Duration::from_secs(3600), Duration::from_secs(7200));
        let job = finished_job(&service).await;
        assert!(job.workdir.exists());

        // Older than the artifact TTL but younger than the record TTL.
        service
            .store()
            .backdate_finished(job.id, Utc::now() - ChronoDuration::seconds(5400));
        let report = sweep_once(&service).await;
        assert_eq!(report.artifacts_cleaned, 1);
        assert_eq!(report.records_evicted, 0);

        let cleaned = service.job(job.id).unwrap();
        assert_eq!(cleaned.status, JobStatus::Cleaned);
        assert!(cleaned.output_path.is_none());
        assert!(!job.workdir.exists());

        // Older than the record TTL: the record disappears.
        service
            .store()
            .backdate_finished(job.id, Utc::now() - ChronoDuration::seconds(8000));
        let report = sweep_once(&service).await;
        assert_eq!(report.records_evicted, 1);
        assert!(service.job(job.id).is_err());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path(), Duration::from_secs(60), Duration::from_secs(86400));
        let job = finished_job(&service).await;

        service
            .store()
            .backdate_finished(job.id, Utc::now() - ChronoDuration::seconds(120));

        let first = sweep_once(&service).await;
        assert_eq!(first.artifacts_cleaned, 1);

        // No new terminal jobs: a second pass changes nothing.
        let second = sweep_once(&service).await;
        assert_eq!(second, SweepReport::default());
        assert_eq!(service.job(job.id).unwrap().status, JobStatus::Cleaned);
    }

    #[tokio::test]
    async fn test_zero_ttls_disable_sweeping() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path(), Duration::ZERO, Duration::ZERO);
        let job = finished_job(&service).await;

        service
            .store()
            .backdate_finished(job.id, Utc::now() - ChronoDuration::days(365));
        let report = sweep_once(&service).await;
        assert_eq!(report, SweepReport::default());
        assert_eq!(service.job(job.id).unwrap().status, JobStatus::Done);
        assert!(job.workdir.exists());
    }
}
