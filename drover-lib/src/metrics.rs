use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::ser::SerializeStruct;
use tokio::time::Instant;

use crate::limit::RateUsage;

/// Trailing window used for the instantaneous queries-per-second reading
const QPS_WINDOW: Duration = Duration::from_secs(10);

/// Token consumption statistics over successful jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenStats {
    /// Sum of actual units over all successes
    pub total: u64,
    /// Smallest single-job consumption; `0` before the first success
    pub min: u64,
    /// Largest single-job consumption
    pub max: u64,
    /// Mean consumption per successful job, rounded
    pub mean: u64,
}

/// Latency distribution over completed execution attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyStats {
    /// Fastest observed attempt
    pub min: Option<Duration>,
    /// Slowest observed attempt
    pub max: Option<Duration>,
    /// Mean latency
    pub mean: Option<Duration>,
    /// Median latency
    pub median: Option<Duration>,
}

impl Serialize for LatencyStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let ms = |duration: Option<Duration>| duration.map(|d| d.as_millis());

        let mut s = serializer.serialize_struct("LatencyStats", 4)?;
        s.serialize_field("min_ms", &ms(self.min))?;
        s.serialize_field("max_ms", &ms(self.max))?;
        s.serialize_field("mean_ms", &ms(self.mean))?;
        s.serialize_field("median_ms", &ms(self.median))?;
        s.end()
    }
}

/// A consistent point-in-time reading of a batch run.
///
/// Snapshots are immutable copies; observers may hold or serialize them
/// freely while the run continues.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Jobs handed in at submission
    pub submitted: u64,
    /// Jobs that reached the successful terminal state
    pub succeeded: u64,
    /// Jobs terminally rejected by the service
    pub failed: u64,
    /// Jobs that ran out of retry budget under sustained rate limiting
    pub retries_exhausted: u64,
    /// Total requeue events (one job may contribute several)
    pub requeued: u64,
    /// Jobs currently claimed by a worker
    pub in_flight: u64,
    /// Jobs waiting in the backlog
    pub queued: u64,
    /// Utilization of the two rate windows
    pub usage: RateUsage,
    /// Execution attempts per second over the trailing few seconds
    pub qps: f64,
    /// Token consumption over successful jobs
    pub tokens: TokenStats,
    /// Latency distribution over completed attempts
    pub latency: LatencyStats,
    /// Wall-clock time since the run started
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Jobs that reached a terminal outcome
    #[must_use]
    pub const fn completed(&self) -> u64 {
        self.succeeded + self.failed + self.retries_exhausted
    }

    /// `true` once every submitted job reached a terminal outcome
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.completed() == self.submitted
    }
}

/// Accumulators that need more than an atomic increment
#[derive(Debug, Default)]
struct Samples {
    latencies: Vec<Duration>,
    total_units: u64,
    min_units: Option<u64>,
    max_units: u64,
    /// Timestamps of recent execution attempts, for the QPS reading
    attempts: VecDeque<Instant>,
}

impl Samples {
    fn token_stats(&self) -> TokenStats {
        let count = self.latencies.len() as u64;
        TokenStats {
            total: self.total_units,
            min: self.min_units.unwrap_or(0),
            max: self.max_units,
            mean: if count == 0 {
                0
            } else {
                self.total_units.div_ceil(count)
            },
        }
    }

    fn latency_stats(&self) -> LatencyStats {
        if self.latencies.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted = self.latencies.clone();
        sorted.sort();
        let mid = sorted.len() / 2;
        let median = if sorted.len().is_multiple_of(2) {
            (sorted[mid - 1] + sorted[mid]) / 2
        } else {
            sorted[mid]
        };

        let total: Duration = sorted.iter().sum();
        #[allow(clippy::cast_possible_truncation)]
        let mean = total / (sorted.len() as u32);

        LatencyStats {
            min: sorted.first().copied(),
            max: sorted.last().copied(),
            mean: Some(mean),
            median: Some(median),
        }
    }

    fn qps(&mut self, now: Instant) -> f64 {
        while let Some(&stamp) = self.attempts.front() {
            if now.saturating_duration_since(stamp) < QPS_WINDOW {
                break;
            }
            self.attempts.pop_front();
        }
        #[allow(clippy::cast_precision_loss)]
        let qps = self.attempts.len() as f64 / QPS_WINDOW.as_secs_f64();
        qps
    }
}

/// Process-wide accumulator of counts, latencies, and rate readings.
///
/// The counts are commutative, so they live in plain atomics; latencies
/// and token stats share one short-lived mutex. [`MetricsCollector::snapshot`]
/// takes that lock briefly and copies, so writers are never blocked for
/// long.
#[derive(Debug)]
pub struct MetricsCollector {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries_exhausted: AtomicU64,
    requeued: AtomicU64,
    in_flight: AtomicU64,
    samples: Mutex<Samples>,
    started_at: Mutex<Option<Instant>>,
    finished_at: Mutex<Option<Instant>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a collector with all counters at zero
    #[must_use]
    pub fn new() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retries_exhausted: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            samples: Mutex::new(Samples::default()),
            started_at: Mutex::new(None),
            finished_at: Mutex::new(None),
        }
    }

    /// Record the batch size at submission time
    pub fn record_submitted(&self, count: u64) {
        self.submitted.fetch_add(count, Ordering::Relaxed);
    }

    /// Mark the start of the run, for the elapsed reading
    ///
    /// # Panics
    ///
    /// Panics if the timer mutex is poisoned.
    pub fn mark_started(&self) {
        *self.started_at.lock().unwrap() = Some(Instant::now());
    }

    /// Freeze the elapsed reading once the run has drained
    ///
    /// # Panics
    ///
    /// Panics if the timer mutex is poisoned.
    pub fn mark_finished(&self) {
        *self.finished_at.lock().unwrap() = Some(Instant::now());
    }

    /// A worker claimed a job
    pub fn job_claimed(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// A claimed job was handed back without an attempt (shutdown path)
    pub fn job_released(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// An execution attempt is about to start
    ///
    /// # Panics
    ///
    /// Panics if the samples mutex is poisoned.
    pub fn record_attempt(&self) {
        self.samples.lock().unwrap().attempts.push_back(Instant::now());
    }

    /// A job completed successfully
    ///
    /// # Panics
    ///
    /// Panics if the samples mutex is poisoned.
    pub fn record_success(&self, units: u64, latency: Duration) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);

        let mut samples = self.samples.lock().unwrap();
        samples.latencies.push(latency);
        samples.total_units += units;
        samples.max_units = samples.max_units.max(units);
        samples.min_units = Some(samples.min_units.map_or(units, |min| min.min(units)));
    }

    /// A rate-limited job went back onto the queue
    pub fn record_requeue(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// A job was terminally rejected by the service
    pub fn record_hard_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// A job ran out of retry budget
    pub fn record_retries_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Take a consistent reading. `usage` and `queued` come from the
    /// limiter and queue, which the collector does not own.
    ///
    /// # Panics
    ///
    /// Panics if a mutex is poisoned.
    pub fn snapshot(&self, usage: RateUsage, queued: u64) -> MetricsSnapshot {
        let now = Instant::now();
        let (tokens, latency, qps) = {
            let mut samples = self.samples.lock().unwrap();
            (
                samples.token_stats(),
                samples.latency_stats(),
                samples.qps(now),
            )
        };

        let elapsed = match (
            *self.started_at.lock().unwrap(),
            *self.finished_at.lock().unwrap(),
        ) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => now.saturating_duration_since(start),
            _ => Duration::ZERO,
        };

        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            queued,
            usage,
            qps,
            tokens,
            latency,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot(collector: &MetricsCollector) -> MetricsSnapshot {
        collector.snapshot(RateUsage::default(), 0)
    }

    #[tokio::test]
    async fn test_counters() {
        let collector = MetricsCollector::new();
        collector.record_submitted(5);

        collector.job_claimed();
        collector.record_success(100, Duration::from_millis(20));
        collector.job_claimed();
        collector.record_requeue();
        collector.job_claimed();
        collector.record_hard_failure();
        collector.job_claimed();
        collector.record_retries_exhausted();

        let reading = snapshot(&collector);
        assert_eq!(reading.submitted, 5);
        assert_eq!(reading.succeeded, 1);
        assert_eq!(reading.requeued, 1);
        assert_eq!(reading.failed, 1);
        assert_eq!(reading.retries_exhausted, 1);
        assert_eq!(reading.in_flight, 0);
        assert_eq!(reading.completed(), 3);
        assert!(!reading.is_complete());
    }

    #[tokio::test]
    async fn test_token_stats() {
        let collector = MetricsCollector::new();
        for units in [30, 10, 20] {
            collector.job_claimed();
            collector.record_success(units, Duration::from_millis(5));
        }

        let tokens = snapshot(&collector).tokens;
        assert_eq!(tokens.total, 60);
        assert_eq!(tokens.min, 10);
        assert_eq!(tokens.max, 30);
        assert_eq!(tokens.mean, 20);
    }

    #[tokio::test]
    async fn test_token_stats_empty() {
        let tokens = snapshot(&MetricsCollector::new()).tokens;
        assert_eq!(tokens, TokenStats::default());
    }

    #[tokio::test]
    async fn test_latency_median_even_count() {
        let collector = MetricsCollector::new();
        for ms in [100, 200, 150, 250] {
            collector.job_claimed();
            collector.record_success(1, Duration::from_millis(ms));
        }

        let latency = snapshot(&collector).latency;
        assert_eq!(latency.min, Some(Duration::from_millis(100)));
        assert_eq!(latency.max, Some(Duration::from_millis(250)));
        assert_eq!(latency.median, Some(Duration::from_millis(175)));
        assert_eq!(latency.mean, Some(Duration::from_millis(175)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_qps_window() {
        let collector = MetricsCollector::new();
        for _ in 0..20 {
            collector.record_attempt();
        }
        let reading = snapshot(&collector);
        assert!((reading.qps - 2.0).abs() < f64::EPSILON);

        // Attempts age out of the trailing window
        tokio::time::advance(QPS_WINDOW + Duration::from_secs(1)).await;
        let reading = snapshot(&collector);
        assert!(reading.qps.abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_freezes_at_finish() {
        let collector = MetricsCollector::new();
        collector.mark_started();
        tokio::time::advance(Duration::from_secs(3)).await;
        collector.mark_finished();
        tokio::time::advance(Duration::from_secs(60)).await;

        assert_eq!(snapshot(&collector).elapsed, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_snapshot_serializes_latency_in_millis() {
        let collector = MetricsCollector::new();
        collector.job_claimed();
        collector.record_success(10, Duration::from_millis(42));

        let json = serde_json::to_value(snapshot(&collector)).unwrap();
        assert_eq!(json["latency"]["median_ms"], 42);
    }
}
