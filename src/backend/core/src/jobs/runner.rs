//! Job dispatch and retry supervision.
//!
//! A single dispatcher task couples the worker pool to the queue: it waits
//! for a free slot, pops the oldest queued job, and hands it to the
//! supervisor on a spawned task. The supervisor drives the converter through
//! the retry budget and lands the job in its terminal state; the slot is
//! released only then.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::convert::{ConvertOutcome, ConvertRequest};
use crate::telemetry::metrics;

use super::service::ConvertService;
use super::Job;

/// Handle for controlling the running dispatcher.
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Signal the dispatcher to stop pulling new jobs.
    ///
    /// Jobs already handed to the supervisor run to completion.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the dispatcher task to finish.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Spawn the dispatcher loop.
pub(crate) fn start_dispatcher(service: Arc<ConvertService>) -> DispatcherHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        info!(
            concurrency = service.pool().max_workers(),
            "conversion dispatcher started"
        );

        loop {
            // A slot first, then a job: a queued job transitions to running
            // exactly when a slot is free for it.
            let permit = tokio::select! {
                _ = shutdown_rx.changed() => break,
                permit = service.pool().acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = tokio::select! {
                _ = shutdown_rx.changed() => break,
                job = service.store().next_queued() => job,
            };

            let service = service.clone();
            tokio::spawn(async move {
                let succeeded = supervise(&service, &job).await;
                if succeeded {
                    permit.mark_success();
                } else {
                    permit.mark_failure();
                }
            });
        }

        info!("conversion dispatcher stopped");
    });

    DispatcherHandle {
        shutdown: shutdown_tx,
        handle,
    }
}

/// Retry supervisor: run the converter until success or the retry budget is
/// exhausted, then record the terminal state. Returns whether the job
/// succeeded.
///
/// Every attempt is a fresh converter invocation; a hung process is killed by
/// the executor, never reused. Retries are immediate, with no backoff.
pub(crate) async fn supervise(service: &ConvertService, job: &Job) -> bool {
    let request = ConvertRequest {
        input_path: job.input_path.clone(),
        outdir: job.workdir.clone(),
        convert_to: job.convert_to.clone(),
    };
    let timeout_secs = service.converter_cfg().timeout.as_secs();
    let started = Instant::now();

    let mut last_reason = String::new();
    for attempt in 0..=job.max_retries {
        if attempt > 0 {
            service.store().set_retries(job.id, attempt);
            info!(job_id = %job.id, attempt, "retrying conversion");
        }

        match service.converter().run(&request).await {
            ConvertOutcome::Success { output_path } => {
                metrics::record_attempt("success");
                if let Err(e) = service.store().complete(job.id, output_path) {
                    warn!(job_id = %job.id, error = %e, "failed to record completion");
                    return false;
                }
                metrics::record_job_completed(started.elapsed().as_secs_f64());
                info!(job_id = %job.id, attempt, "conversion finished");
                return true;
            }
            ConvertOutcome::Failure { reason } => {
                metrics::record_attempt("failure");
                warn!(job_id = %job.id, attempt, reason = %reason, "conversion attempt failed");
                last_reason = reason;
            }
            ConvertOutcome::TimedOut => {
                metrics::record_attempt("timeout");
                warn!(job_id = %job.id, attempt, timeout_secs, "conversion attempt timed out");
                last_reason = format!("conversion timed out after {}s", timeout_secs);
            }
        }
    }

    if let Err(e) = service.store().fail(job.id, last_reason) {
        warn!(job_id = %job.id, error = %e, "failed to record failure");
    }
    metrics::record_job_failed();
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::convert::Converter;
    use crate::jobs::JobStatus;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    struct FailingConverter {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Converter for FailingConverter {
        async fn run(&self, _req: &ConvertRequest) -> ConvertOutcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            ConvertOutcome::Failure {
                reason: "simulated converter crash".to_string(),
            }
        }
    }

    struct TimingOutConverter {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Converter for TimingOutConverter {
        async fn run(&self, _req: &ConvertRequest) -> ConvertOutcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            ConvertOutcome::TimedOut
        }
    }

    struct FlakyConverter {
        attempts: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl Converter for FlakyConverter {
        async fn run(&self, req: &ConvertRequest) -> ConvertOutcome {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                ConvertOutcome::Failure {
                    reason: "transient failure".to_string(),
                }
            } else {
                ConvertOutcome::Success {
                    output_path: req.outdir.join("out.pdf"),
                }
            }
        }
    }

    /// Completes one conversion per released permit.
    struct GatedConverter {
        gate: Semaphore,
    }

    #[async_trait]
    impl Converter for GatedConverter {
        async fn run(&self, req: &ConvertRequest) -> ConvertOutcome {
            match self.gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => {
                    return ConvertOutcome::Failure {
                        reason: "gate closed".to_string(),
                    }
                }
            }
            ConvertOutcome::Success {
                output_path: req.outdir.join("out.pdf"),
            }
        }
    }

    /// Tracks concurrent invocations and the order inputs were seen.
    struct TrackingConverter {
        current: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<PathBuf>>,
    }

    impl TrackingConverter {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                order: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Converter for TrackingConverter {
        async fn run(&self, req: &ConvertRequest) -> ConvertOutcome {
            self.order.lock().push(req.input_path.clone());
            let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            ConvertOutcome::Success {
                output_path: req.outdir.join("out.pdf"),
            }
        }
    }

    fn test_service(
        converter: Arc<dyn Converter>,
        data_dir: &Path,
        concurrency: usize,
        max_retries: u32,
        max_queue_size: usize,
    ) -> Arc<ConvertService> {
        let mut config = Config::default();
        config.storage.data_dir = data_dir.to_path_buf();
        config.converter.max_concurrency = concurrency;
        config.converter.max_retries = max_retries;
        config.converter.max_queue_size = max_queue_size;
        config.converter.timeout = Duration::from_secs(5);
        Arc::new(ConvertService::new(&config, converter))
    }

    async fn submit_file(service: &ConvertService, name: &str) -> Job {
        let staged = service.stage(name).await.unwrap();
        tokio::fs::write(&staged.input_path, b"document bytes").await.unwrap();
        service.submit(&staged, None).unwrap()
    }

    async fn wait_terminal(service: &ConvertService, job: &Job) -> Job {
        tokio::time::timeout(Duration::from_secs(5), service.wait(job.id))
            .await
            .expect("job did not reach a terminal state in time")
            .unwrap()
    }

    #[tokio::test]
    async fn test_always_failing_converter_exhausts_retries() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Arc::new(FailingConverter {
            attempts: AtomicU32::new(0),
        });
        let service = test_service(converter.clone(), dir.path(), 1, 2, 0);
        let _dispatcher = service.clone().start();

        let job = submit_file(&service, "report.docx").await;
        let done = wait_terminal(&service, &job).await;

        // Exactly 3 attempts: the first plus 2 retries.
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(converter.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(done.retries, 2);
        assert!(done.retries <= done.max_retries);
        assert!(done
            .error_message
            .as_deref()
            .unwrap()
            .contains("simulated converter crash"));
        assert!(done.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_timeout_attempts_are_retried_then_fail() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Arc::new(TimingOutConverter {
            attempts: AtomicU32::new(0),
        });
        let service = test_service(converter.clone(), dir.path(), 1, 1, 0);
        let _dispatcher = service.clone().start();

        let job = submit_file(&service, "slides.pptx").await;
        let done = wait_terminal(&service, &job).await;

        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(converter.attempts.load(Ordering::SeqCst), 2);
        assert!(done.error_message.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_flaky_converter_succeeds_after_retry() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Arc::new(FlakyConverter {
            attempts: AtomicU32::new(0),
            fail_first: 1,
        });
        let service = test_service(converter, dir.path(), 1, 2, 0);
        let _dispatcher = service.clone().start();

        let job = submit_file(&service, "sheet.xlsx").await;
        let done = wait_terminal(&service, &job).await;

        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.retries, 1);
        assert!(done.output_path.is_some());
        assert!(done.error_message.is_none());
    }

    #[tokio::test]
    async fn test_jobs_run_in_admission_order() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Arc::new(TrackingConverter::new());
        let service = test_service(converter.clone(), dir.path(), 1, 0, 0);
        let _dispatcher = service.clone().start();

        let mut jobs = Vec::new();
        for i in 0..5 {
            jobs.push(submit_file(&service, &format!("doc-{}.odt", i)).await);
        }
        for job in &jobs {
            wait_terminal(&service, job).await;
        }

        let order = converter.order.lock().clone();
        let expected: Vec<PathBuf> = jobs.iter().map(|j| j.input_path.clone()).collect();
        assert_eq!(order, expected);
    }

    #[tokio::test]
    async fn test_concurrency_bound_holds() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Arc::new(TrackingConverter::new());
        let service = test_service(converter.clone(), dir.path(), 2, 0, 0);
        let _dispatcher = service.clone().start();

        let mut jobs = Vec::new();
        for i in 0..8 {
            jobs.push(submit_file(&service, &format!("doc-{}.odt", i)).await);
        }
        for job in &jobs {
            wait_terminal(&service, job).await;
        }

        assert!(converter.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(service.pool().stats().jobs_succeeded, 8);
    }

    #[tokio::test]
    async fn test_queue_full_rejection_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Arc::new(GatedConverter {
            gate: Semaphore::new(0),
        });
        let service = test_service(converter.clone(), dir.path(), 1, 0, 1);
        let _dispatcher = service.clone().start();

        // First job occupies the single worker slot (blocked inside the
        // converter), leaving the queue empty.
        let first = submit_file(&service, "a.docx").await;
        let deadline = Instant::now() + Duration::from_secs(5);
        while service.job(first.id).unwrap().status == JobStatus::Queued {
            assert!(Instant::now() < deadline, "first job never started");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Second fills the queue; third must be rejected.
        let second = submit_file(&service, "b.docx").await;
        assert_eq!(service.queue_position(second.id), Some(0));

        let staged = service.stage("c.docx").await.unwrap();
        tokio::fs::write(&staged.input_path, b"x").await.unwrap();
        let err = service.submit(&staged, None).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::QueueFull);

        converter.gate.add_permits(2);
        assert_eq!(wait_terminal(&service, &first).await.status, JobStatus::Done);
        assert_eq!(wait_terminal(&service, &second).await.status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_dispatcher_shutdown_stops_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Arc::new(TrackingConverter::new());
        let service = test_service(converter.clone(), dir.path(), 1, 0, 0);
        let dispatcher = service.clone().start();

        let job = submit_file(&service, "a.odt").await;
        wait_terminal(&service, &job).await;

        dispatcher.shutdown();
        tokio::time::timeout(Duration::from_secs(1), dispatcher.join())
            .await
            .expect("dispatcher did not stop");

        // Admitted after shutdown: stays queued.
        let queued = submit_file(&service, "b.odt").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.job(queued.id).unwrap().status, JobStatus::Queued);
    }
}
