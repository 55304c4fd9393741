use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::executor::Executor;
use crate::limit::DualLimiter;
use crate::metrics::MetricsCollector;
use crate::queue::JobQueue;
use crate::types::{ExecutionOutcome, Job, JobId, JobResult, TerminalStatus};

/// Lower bound on the admission retry sleep. `wait_time` can report zero
/// when another worker claims freed headroom between the reading and the
/// admission attempt; without a floor that turns into a hot loop.
const MIN_ADMISSION_WAIT: Duration = Duration::from_millis(10);

/// One worker of the dispatcher's pool.
///
/// Loops over: claim a job (bounded wait), wait for limiter headroom
/// (cancellable sleep), execute, report. The stop signal is honored at
/// every transition boundary; an in-flight execution is allowed to finish
/// and report rather than being aborted mid-call.
pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) limiter: Arc<DualLimiter>,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) results: Arc<DashMap<JobId, JobResult>>,
    pub(crate) stop: watch::Receiver<bool>,
    pub(crate) max_retries: u32,
    pub(crate) idle_wait: Duration,
}

impl Worker {
    pub(crate) async fn run(mut self) {
        log::debug!("worker {} up", self.id);
        loop {
            if *self.stop.borrow() {
                break;
            }
            let Some(job) = self.queue.pop(self.idle_wait).await else {
                continue;
            };
            self.metrics.job_claimed();

            if !self.wait_for_admission(&job).await {
                // Stop signal fired while waiting; hand the job back
                // untouched so nothing is lost or double-counted.
                self.metrics.job_released();
                self.queue.requeue(job);
                break;
            }

            self.metrics.record_attempt();
            let outcome = self.executor.execute(&job.payload).await;
            self.report(job, outcome);
        }
        log::debug!("worker {} stopped", self.id);
    }

    /// Sleep-and-retry until the limiter admits the job. Returns `false`
    /// when the stop signal interrupts the wait.
    async fn wait_for_admission(&mut self, job: &Job) -> bool {
        loop {
            let now = Instant::now();
            if self.limiter.try_admit(now, job.estimated_units) {
                return true;
            }
            let wait = self
                .limiter
                .wait_time(now, job.estimated_units)
                .max(MIN_ADMISSION_WAIT);
            log::debug!(
                "worker {} waiting {}ms for headroom (job {})",
                self.id,
                wait.as_millis(),
                job.id
            );
            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                _ = self.stop.changed() => {
                    if *self.stop.borrow() {
                        return false;
                    }
                }
            }
        }
    }

    /// Drive the job to its next state: terminal record or requeue
    fn report(&self, mut job: Job, outcome: ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Success { units, latency } => {
                self.metrics.record_success(units, latency);
                self.finish(job, TerminalStatus::Succeeded, Some(units), Some(latency));
            }
            ExecutionOutcome::RateLimited => {
                if job.retry_count() >= self.max_retries {
                    log::debug!("job {} exhausted its {} retries", job.id, self.max_retries);
                    self.metrics.record_retries_exhausted();
                    self.finish(job, TerminalStatus::RetriesExhausted, None, None);
                } else {
                    job.mark_requeued();
                    log::debug!("job {} rate-limited, requeue {}", job.id, job.retry_count());
                    self.metrics.record_requeue();
                    self.queue.requeue(job);
                }
            }
            ExecutionOutcome::HardFailure(reason) => {
                log::debug!("job {} failed terminally: {reason}", job.id);
                self.metrics.record_hard_failure();
                self.finish(job, TerminalStatus::Failed(reason), None, None);
            }
        }
    }

    fn finish(
        &self,
        job: Job,
        status: TerminalStatus,
        units: Option<u64>,
        latency: Option<Duration>,
    ) {
        self.results.insert(
            job.id,
            JobResult {
                id: job.id,
                status,
                attempts: job.attempts(),
                units,
                latency,
            },
        );
        self.queue.complete();
    }
}
