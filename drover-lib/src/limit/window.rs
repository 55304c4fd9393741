use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::{ErrorKind, Result};

/// A rolling accounting ledger for a single rate-limited resource.
///
/// Events are `(timestamp, units)` pairs; anything older than the window
/// span is evicted before every query, so the retained sum is always the
/// consumption of the trailing window. The request axis records one unit
/// per request, the token axis records the job's unit cost.
///
/// Timestamps use [`tokio::time::Instant`], so tests can drive the window
/// with a paused clock.
#[derive(Debug)]
pub struct RateWindow {
    events: VecDeque<(Instant, u64)>,
    used: u64,
    limit: u64,
    span: Duration,
}

impl RateWindow {
    /// Create a new window. `limit` is the maximum total units allowed in
    /// any trailing `span`.
    #[must_use]
    pub fn new(limit: u64, span: Duration) -> Self {
        Self {
            events: VecDeque::new(),
            used: 0,
            limit,
            span,
        }
    }

    /// Drop all events that have aged out of the trailing window.
    /// Must run before every admission check.
    fn evict(&mut self, now: Instant) {
        while let Some(&(stamp, units)) = self.events.front() {
            if now.saturating_duration_since(stamp) < self.span {
                break;
            }
            self.used -= units;
            self.events.pop_front();
        }
    }

    /// Remaining units admissible at `now`
    pub fn headroom(&mut self, now: Instant) -> u64 {
        self.evict(now);
        self.limit - self.used
    }

    /// Units consumed within the trailing window at `now`
    pub fn used(&mut self, now: Instant) -> u64 {
        self.evict(now);
        self.used
    }

    /// The configured limit of this window
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Record a consumption event.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::CapacityExceeded`] when the window lacks
    /// headroom for `units`. Callers must hold the same lock across the
    /// headroom check and this call; the error here is the backstop, not
    /// the admission mechanism.
    pub fn record(&mut self, now: Instant, units: u64) -> Result<()> {
        if self.headroom(now) < units {
            return Err(ErrorKind::CapacityExceeded {
                estimated: units,
                limit: self.limit,
            });
        }
        self.events.push_back((now, units));
        self.used += units;
        Ok(())
    }

    /// How long until enough of the oldest events expire to free `units`.
    ///
    /// Zero when the window already has headroom. `units` larger than the
    /// limit itself can never be admitted; that is rejected when jobs are
    /// submitted, so this only answers for admissible costs.
    pub fn time_until_headroom(&mut self, now: Instant, units: u64) -> Duration {
        self.evict(now);
        if self.used + units <= self.limit {
            return Duration::ZERO;
        }
        let shortfall = self.used + units - self.limit;
        let mut freed = 0;
        for &(stamp, event_units) in &self.events {
            freed += event_units;
            if freed >= shortfall {
                return (stamp + self.span).saturating_duration_since(now);
            }
        }
        // Only reachable for costs above the limit; bounded by a full span.
        self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SPAN: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_headroom_starts_at_limit() {
        let mut window = RateWindow::new(100, SPAN);
        assert_eq!(window.headroom(Instant::now()), 100);
        assert_eq!(window.used(Instant::now()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_reduces_headroom() {
        let mut window = RateWindow::new(100, SPAN);
        let now = Instant::now();
        window.record(now, 30).unwrap();
        window.record(now, 20).unwrap();
        assert_eq!(window.headroom(now), 50);
        assert_eq!(window.used(now), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_without_headroom_fails() {
        let mut window = RateWindow::new(100, SPAN);
        let now = Instant::now();
        window.record(now, 90).unwrap();
        let err = window.record(now, 20).unwrap_err();
        assert_eq!(
            err,
            ErrorKind::CapacityExceeded {
                estimated: 20,
                limit: 100
            }
        );
        // Nothing was recorded by the failed attempt
        assert_eq!(window.used(now), 90);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_age_out() {
        let mut window = RateWindow::new(100, SPAN);
        let start = Instant::now();
        window.record(start, 100).unwrap();
        assert_eq!(window.headroom(start), 0);

        // One second short of expiry the event still counts
        let almost = start + SPAN - Duration::from_secs(1);
        assert_eq!(window.headroom(almost), 0);

        // At exactly one span the event has aged out
        assert_eq!(window.headroom(start + SPAN), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_until_headroom_zero_when_admissible() {
        let mut window = RateWindow::new(100, SPAN);
        let now = Instant::now();
        window.record(now, 40).unwrap();
        assert_eq!(window.time_until_headroom(now, 60), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_until_headroom_waits_for_oldest() {
        let mut window = RateWindow::new(100, SPAN);
        let start = Instant::now();
        window.record(start, 60).unwrap();
        let later = start + Duration::from_secs(10);
        window.record(later, 40).unwrap();

        // 30 more units need the first event (60 units) to expire,
        // which happens a full span after it was recorded.
        let wait = window.time_until_headroom(later, 30);
        assert_eq!(wait, SPAN - Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_until_headroom_spans_multiple_events() {
        let mut window = RateWindow::new(10, SPAN);
        let start = Instant::now();
        for i in 0..10 {
            window.record(start + Duration::from_secs(i), 1).unwrap();
        }
        let now = start + Duration::from_secs(9);

        // Freeing 3 units requires the third-oldest event to expire
        let wait = window.time_until_headroom(now, 3);
        assert_eq!(wait, SPAN - Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_sum_never_exceeds_limit() {
        let mut window = RateWindow::new(50, SPAN);
        let start = Instant::now();

        // Densely sampled admission attempts over several spans; every
        // granted admission must leave the retained sum within the limit.
        for tick in 0..600 {
            let now = start + Duration::from_millis(tick * 500);
            if window.headroom(now) >= 7 {
                window.record(now, 7).unwrap();
            }
            assert!(window.used(now) <= 50);
        }
    }
}
