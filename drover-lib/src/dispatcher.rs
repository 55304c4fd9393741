use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::executor::Executor;
use crate::limit::{DualLimiter, LimiterConfig};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::queue::JobQueue;
use crate::types::{BatchReport, Job, JobId, JobResult, JobSpec, Result};
use crate::worker::Worker;

/// Default number of concurrent workers
const DEFAULT_WORKER_COUNT: usize = 3;
/// Default number of requeues before a rate-limited job is given up on
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default bounded wait for a queue claim before re-checking for shutdown
const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(500);

/// Configuration of a batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Size of the worker pool
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Rate limits shared by all workers
    #[serde(default)]
    pub limits: LimiterConfig,

    /// How often a rate-limited job is requeued before it is reported as
    /// retries-exhausted
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound on how long an idle worker waits for a claim before
    /// re-checking the stop signal
    #[serde(default = "default_idle_wait", with = "humantime_serde")]
    pub idle_wait: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            limits: LimiterConfig::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            idle_wait: DEFAULT_IDLE_WAIT,
        }
    }
}

const fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

const fn default_idle_wait() -> Duration {
    DEFAULT_IDLE_WAIT
}

/// Cloneable live observer of a running batch.
///
/// `snapshot` is a local in-process read and may be polled at any
/// frequency; it never blocks the workers for long.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    collector: Arc<MetricsCollector>,
    limiter: Arc<DualLimiter>,
    queue: Arc<JobQueue>,
}

impl MetricsHandle {
    /// Take a consistent point-in-time reading of the run
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let usage = self.limiter.utilization(Instant::now());
        self.collector.snapshot(usage, self.queue.len() as u64)
    }
}

/// Owns the worker pool, the shared queue and limiter, and the requeue
/// policy for one batch run.
///
/// A dispatcher runs a single batch: [`Dispatcher::run`] consumes it,
/// blocks until every submitted job reached exactly one terminal outcome,
/// stops the pool, and returns the aggregated report. Live metrics are
/// available throughout via [`Dispatcher::metrics`].
pub struct Dispatcher {
    config: DispatcherConfig,
    limiter: Arc<DualLimiter>,
    queue: Arc<JobQueue>,
    metrics: Arc<MetricsCollector>,
    executor: Arc<dyn Executor>,
}

impl Dispatcher {
    /// Create a dispatcher over the given executor
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidLimiterConfig`](crate::ErrorKind) when
    /// the limiter config is unusable.
    pub fn new(config: DispatcherConfig, executor: Arc<dyn Executor>) -> Result<Self> {
        let limiter = Arc::new(DualLimiter::new(config.limits)?);
        Ok(Self {
            config,
            limiter,
            queue: Arc::new(JobQueue::new()),
            metrics: Arc::new(MetricsCollector::new()),
            executor,
        })
    }

    /// Live observer handle; clone it into whatever renders progress
    #[must_use]
    pub fn metrics(&self) -> MetricsHandle {
        MetricsHandle {
            collector: Arc::clone(&self.metrics),
            limiter: Arc::clone(&self.limiter),
            queue: Arc::clone(&self.queue),
        }
    }

    /// Run the batch to completion.
    ///
    /// Seeds the queue, starts the pool, waits until the queue is drained
    /// (empty and nothing in flight), signals stop, and waits for every
    /// worker to wind down before reporting. Stop only takes effect at
    /// worker state-machine boundaries, never mid-execution.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CapacityExceeded`](crate::ErrorKind) if any
    /// job's estimate exceeds the token limit itself — checked up front,
    /// before anything is enqueued — and
    /// [`ErrorKind::WorkerPanic`](crate::ErrorKind) if a worker dies.
    pub async fn run(self, jobs: Vec<JobSpec>) -> Result<BatchReport> {
        // No amount of waiting can admit these; fail the whole submission
        // before a single worker starts.
        for spec in &jobs {
            self.limiter.check_job(spec.estimated_units)?;
        }

        let results: Arc<DashMap<JobId, JobResult>> = Arc::new(DashMap::new());
        let (stop_tx, stop_rx) = watch::channel(false);

        self.metrics.mark_started();
        self.metrics.record_submitted(jobs.len() as u64);
        for (i, spec) in jobs.into_iter().enumerate() {
            self.queue.push(Job::new(JobId(i as u64), spec));
        }

        log::info!(
            "dispatching {} jobs across {} workers",
            self.queue.len(),
            self.config.worker_count
        );

        let handles: Vec<_> = (0..self.config.worker_count)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: Arc::clone(&self.queue),
                    limiter: Arc::clone(&self.limiter),
                    metrics: Arc::clone(&self.metrics),
                    executor: Arc::clone(&self.executor),
                    results: Arc::clone(&results),
                    stop: stop_rx.clone(),
                    max_retries: self.config.max_retries,
                    idle_wait: self.config.idle_wait,
                };
                tokio::spawn(worker.run())
            })
            .collect();
        drop(stop_rx);

        // Wait until every claim has been resolved and nothing is left.
        while !self.queue.is_drained() {
            self.queue.resolved().await;
        }
        self.metrics.mark_finished();

        log::debug!("queue drained, stopping workers");
        let _ = stop_tx.send(true);
        for joined in join_all(handles).await {
            joined?;
        }

        let mut results: Vec<JobResult> = results.iter().map(|r| r.value().clone()).collect();
        results.sort_by_key(|r| r.id);

        let snapshot = self.metrics.snapshot(
            self.limiter.utilization(Instant::now()),
            self.queue.len() as u64,
        );

        Ok(BatchReport { snapshot, results })
    }
}

/// Dispatch a batch with one call.
///
/// Convenience wrapper for the common case; build a [`Dispatcher`]
/// yourself when you need a live [`MetricsHandle`] during the run.
///
/// # Errors
///
/// Same as [`Dispatcher::run`].
pub async fn dispatch(
    jobs: Vec<JobSpec>,
    config: DispatcherConfig,
    executor: Arc<dyn Executor>,
) -> Result<BatchReport> {
    Dispatcher::new(config, executor)?.run(jobs).await
}
