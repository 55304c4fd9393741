use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::config::LimiterConfig;
use super::window::RateWindow;
use crate::{ErrorKind, Result};

/// Live utilization of the two rate windows, for metrics snapshots
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateUsage {
    /// Requests admitted within the trailing window
    pub rpm_used: u64,
    /// Configured request limit; `0` for unlimited
    pub rpm_limit: u64,
    /// Token units admitted within the trailing window
    pub tpm_used: u64,
    /// Configured token limit; `0` for unlimited
    pub tpm_limit: u64,
}

/// The windows share one mutex so that checking both and recording both
/// is a single critical section.
#[derive(Debug)]
struct Axes {
    requests: Option<RateWindow>,
    tokens: Option<RateWindow>,
}

/// Admission gate combining a request window and a token window.
///
/// A unit of work passes only when both windows have headroom for its
/// cost, and the check-and-record happens atomically with respect to all
/// other admission attempts: without that, two workers could each observe
/// headroom and both proceed past a now-violated limit.
///
/// One instance is shared by every worker of a dispatcher; there is no
/// ambient global state.
#[derive(Debug)]
pub struct DualLimiter {
    axes: Mutex<Axes>,
    config: LimiterConfig,
}

impl DualLimiter {
    /// Build a limiter from its config. An axis with a limit of `0` is
    /// left out and never consulted.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidLimiterConfig`] for an unusable config.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        config.validate()?;
        let requests = (config.max_rpm > 0).then(|| RateWindow::new(config.max_rpm, config.window));
        let tokens = (config.max_tpm > 0).then(|| RateWindow::new(config.max_tpm, config.window));
        Ok(Self {
            axes: Mutex::new(Axes { requests, tokens }),
            config,
        })
    }

    /// The config this limiter was built from
    #[must_use]
    pub const fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Reject estimates that could never be admitted, no matter how long a
    /// worker waited. Called once per job at submission time.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CapacityExceeded`] when `estimated_units`
    /// exceeds the token limit itself.
    pub fn check_job(&self, estimated_units: u64) -> Result<()> {
        if self.config.max_tpm > 0 && estimated_units > self.config.max_tpm {
            return Err(ErrorKind::CapacityExceeded {
                estimated: estimated_units,
                limit: self.config.max_tpm,
            });
        }
        Ok(())
    }

    /// Atomically try to admit one request costing `token_units`.
    ///
    /// Either both windows record the cost or neither does; partial
    /// admission would leak budget that no request consumed.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn try_admit(&self, now: Instant, token_units: u64) -> bool {
        let mut axes = self.axes.lock().unwrap();

        if let Some(requests) = &mut axes.requests
            && requests.headroom(now) < 1
        {
            log::debug!("admission refused: request window exhausted");
            return false;
        }
        if let Some(tokens) = &mut axes.tokens
            && tokens.headroom(now) < token_units
        {
            log::debug!("admission refused: token window lacks {token_units} units");
            return false;
        }

        // Both checks passed under the lock we still hold, so recording
        // cannot fail.
        if let Some(requests) = &mut axes.requests {
            requests
                .record(now, 1)
                .expect("request window had headroom under the same lock");
        }
        if let Some(tokens) = &mut axes.tokens {
            tokens
                .record(now, token_units)
                .expect("token window had headroom under the same lock");
        }
        true
    }

    /// How long a worker should wait before retrying admission: the larger
    /// of the two windows' times until headroom.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn wait_time(&self, now: Instant, token_units: u64) -> Duration {
        let mut axes = self.axes.lock().unwrap();
        let request_wait = axes
            .requests
            .as_mut()
            .map_or(Duration::ZERO, |w| w.time_until_headroom(now, 1));
        let token_wait = axes
            .tokens
            .as_mut()
            .map_or(Duration::ZERO, |w| w.time_until_headroom(now, token_units));
        request_wait.max(token_wait)
    }

    /// Current utilization of both windows
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn utilization(&self, now: Instant) -> RateUsage {
        let mut axes = self.axes.lock().unwrap();
        RateUsage {
            rpm_used: axes.requests.as_mut().map_or(0, |w| w.used(now)),
            rpm_limit: self.config.max_rpm,
            tpm_used: axes.tokens.as_mut().map_or(0, |w| w.used(now)),
            tpm_limit: self.config.max_tpm,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pretty_assertions::assert_eq;

    fn limiter(max_rpm: u64, max_tpm: u64) -> DualLimiter {
        DualLimiter::new(LimiterConfig::new(max_rpm, max_tpm)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_requires_both_windows() {
        let limiter = limiter(2, 100);
        let now = Instant::now();

        assert!(limiter.try_admit(now, 50));
        assert!(limiter.try_admit(now, 50));

        // Token window is now full; request window still has no headroom
        // either, but crucially a refused admission records nothing.
        assert!(!limiter.try_admit(now, 1));
        let usage = limiter.utilization(now);
        assert_eq!(usage.rpm_used, 2);
        assert_eq!(usage.tpm_used, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_partial_admission() {
        let limiter = limiter(10, 100);
        let now = Instant::now();

        assert!(limiter.try_admit(now, 80));
        // Request axis has plenty of headroom, token axis does not.
        assert!(!limiter.try_admit(now, 30));

        // The refused attempt must not have charged the request window.
        let usage = limiter.utilization(now);
        assert_eq!(usage.rpm_used, 1);
        assert_eq!(usage.tpm_used, 80);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_axis_never_refuses() {
        let limiter = limiter(0, 0);
        let now = Instant::now();
        for _ in 0..10_000 {
            assert!(limiter.try_admit(now, 1_000_000));
        }
        assert_eq!(limiter.wait_time(now, 1_000_000), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_time_is_max_of_axes() {
        let limiter = limiter(1, 1000);
        let start = Instant::now();
        assert!(limiter.try_admit(start, 900));

        let later = start + Duration::from_secs(10);
        // Request axis: must wait for the single slot to age out (50 s).
        // Token axis: 200 units fit right away.
        assert_eq!(limiter.wait_time(later, 200), Duration::from_secs(50));

        // Both axes blocked: token shortfall also resolves at 50 s here,
        // request axis still dominates.
        assert_eq!(limiter.wait_time(later, 200), limiter.wait_time(later, 150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_job_rejects_impossible_estimate() {
        let limiter = limiter(10, 1000);
        assert!(limiter.check_job(1000).is_ok());
        assert_eq!(
            limiter.check_job(1001).unwrap_err(),
            ErrorKind::CapacityExceeded {
                estimated: 1001,
                limit: 1000
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_job_unlimited_tokens_accepts_all() {
        let limiter = limiter(10, 0);
        assert!(limiter.check_job(u64::MAX).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_admission_never_oversubscribes() {
        let limiter = Arc::new(limiter(50, 5000));
        let mut handles = Vec::new();

        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                let mut admitted = 0;
                for _ in 0..100 {
                    if limiter.try_admit(Instant::now(), 100) {
                        admitted += 1;
                    }
                    tokio::task::yield_now().await;
                }
                admitted
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }

        // 2000 concurrent attempts within a fraction of the window, but
        // both limits hold: at most 50 requests / 5000 tokens admitted.
        assert_eq!(total, 50);
        let usage = limiter.utilization(Instant::now());
        assert!(usage.rpm_used <= 50);
        assert!(usage.tpm_used <= 5000);
    }
}
