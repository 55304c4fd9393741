use std::fmt::Display;
use std::time::Duration;

use serde::Serialize;

use super::JobId;
use crate::metrics::MetricsSnapshot;

/// Outcome of a single execution attempt, as reported by an
/// [`Executor`](crate::Executor).
///
/// The dispatcher only needs to tell "rate-limited, retry later" apart from
/// "hard failure, do not retry" and "success"; any vendor-specific error
/// detail is folded into the hard-failure reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The request completed; the service reported its actual unit
    /// consumption and the attempt latency was observed by the executor
    Success {
        /// Token units actually consumed
        units: u64,
        /// Wall-clock latency of the attempt
        latency: Duration,
    },
    /// Transient resource-exhaustion signal; the job is requeued
    RateLimited,
    /// Permanent rejection (malformed payload, failed auth, ...);
    /// never retried
    HardFailure(String),
}

/// Terminal state of a job. Once a job reaches one of these it is never
/// processed again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TerminalStatus {
    /// The job completed successfully
    Succeeded,
    /// The service rejected the job permanently, with the preserved reason
    Failed(String),
    /// The job kept getting rate-limited until its retry budget ran out.
    /// Distinct from [`TerminalStatus::Failed`] so callers can tell "gave
    /// up due to load" from "rejected by the service".
    RetriesExhausted,
}

impl TerminalStatus {
    /// Whether this is the successful terminal state
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::RetriesExhausted => f.write_str("retries exhausted"),
        }
    }
}

/// Final record for one job, correlated to the submission by id
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    /// The job this record belongs to
    pub id: JobId,
    /// How the job ended
    pub status: TerminalStatus,
    /// Total attempts made, counting the initial one
    pub attempts: u32,
    /// Actual token units consumed (successful jobs only)
    pub units: Option<u64>,
    /// Latency of the final attempt (successful jobs only)
    #[serde(with = "humantime_serde")]
    pub latency: Option<Duration>,
}

/// Everything a finished batch run reports back: the final metrics
/// snapshot plus one terminal record per submitted job, ordered by id.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Final metrics at the moment the queue drained
    pub snapshot: MetricsSnapshot,
    /// Per-job terminal outcomes, sorted by job id
    pub results: Vec<JobResult>,
}

impl BatchReport {
    /// `true` when every submitted job succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.status.is_success())
    }
}
