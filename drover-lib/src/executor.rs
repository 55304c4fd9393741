use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;

use crate::types::ExecutionOutcome;

/// The opaque execution call the dispatcher drives.
///
/// Implementations must be safe to call concurrently from multiple
/// workers; the dispatcher shares one executor across the whole pool.
/// Everything the dispatcher needs to know about an attempt is carried in
/// the returned [`ExecutionOutcome`] — transient rejections are requeued,
/// hard failures are not.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute one payload and report how it went
    async fn execute(&self, payload: &str) -> ExecutionOutcome;
}

/// An executor that completes locally, without network I/O.
///
/// Useful for demos and load experiments: each call sleeps for the
/// configured latency and reports a unit consumption derived from the
/// payload, so runs are deterministic without a randomness dependency.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    latency: Duration,
    min_units: u64,
    max_units: u64,
}

impl SimulatedExecutor {
    /// Create a simulation reporting between `min_units` and `max_units`
    /// consumed units per payload
    #[must_use]
    pub const fn new(latency: Duration, min_units: u64, max_units: u64) -> Self {
        Self {
            latency,
            min_units,
            max_units,
        }
    }

    fn units_for(&self, payload: &str) -> u64 {
        let spread = self.max_units.saturating_sub(self.min_units);
        if spread == 0 {
            return self.min_units;
        }
        let mut hasher = DefaultHasher::new();
        payload.hash(&mut hasher);
        self.min_units + hasher.finish() % (spread + 1)
    }
}

impl Default for SimulatedExecutor {
    /// Latency and unit spread in the ballpark of a small chat-completion
    /// call
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 5, 100)
    }
}

#[async_trait]
impl Executor for SimulatedExecutor {
    async fn execute(&self, payload: &str) -> ExecutionOutcome {
        tokio::time::sleep(self.latency).await;
        ExecutionOutcome::Success {
            units: self.units_for(payload),
            latency: self.latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_units_are_deterministic_and_bounded() {
        let executor = SimulatedExecutor::new(Duration::from_millis(10), 5, 100);

        let first = executor.execute("payload one").await;
        let second = executor.execute("payload one").await;
        assert_eq!(first, second);

        for i in 0..50 {
            let outcome = executor.execute(&format!("payload {i}")).await;
            match outcome {
                ExecutionOutcome::Success { units, .. } => {
                    assert!((5..=100).contains(&units));
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_fixed_units() {
        let executor = SimulatedExecutor::new(Duration::ZERO, 42, 42);
        let outcome = executor.execute("anything").await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Success {
                units: 42,
                latency: Duration::ZERO
            }
        );
    }
}
