use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Stable identifier of a job within one batch submission.
///
/// Assigned from submission order and used to correlate live metrics with
/// final results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A unit of work as handed in by the caller: the opaque request content
/// plus an upper bound on the token units it will consume.
///
/// The estimate is what the token window is charged at admission time,
/// before the actual consumption is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Opaque request content; the dispatcher never inspects it
    pub payload: String,
    /// Caller-supplied upper bound on the token units this job will consume
    pub estimated_units: u64,
}

impl JobSpec {
    /// Create a new job spec
    #[must_use]
    pub fn new<P: Into<String>>(payload: P, estimated_units: u64) -> Self {
        Self {
            payload: payload.into(),
            estimated_units,
        }
    }
}

/// One unit of work while it moves through the queue and workers.
///
/// Immutable except for the retry count, which grows by one every time the
/// job is requeued after a rate-limit rejection.
#[derive(Debug, Clone)]
pub struct Job {
    /// Stable identifier, assigned at submission
    pub id: JobId,
    /// Opaque request content
    pub payload: String,
    /// Upper bound on token units, used for admission
    pub estimated_units: u64,
    retry_count: u32,
}

impl Job {
    pub(crate) fn new(id: JobId, spec: JobSpec) -> Self {
        Self {
            id,
            payload: spec.payload,
            estimated_units: spec.estimated_units,
            retry_count: 0,
        }
    }

    /// How often this job has been requeued after a rate-limit rejection
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Attempts made so far, counting the initial one
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.retry_count + 1
    }

    pub(crate) fn mark_requeued(&mut self) {
        self.retry_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_count_starts_at_zero() {
        let job = Job::new(JobId(0), JobSpec::new("payload", 100));
        assert_eq!(job.retry_count(), 0);
        assert_eq!(job.attempts(), 1);
    }

    #[test]
    fn test_mark_requeued_increments() {
        let mut job = Job::new(JobId(7), JobSpec::new("payload", 100));
        job.mark_requeued();
        job.mark_requeued();
        assert_eq!(job.retry_count(), 2);
        assert_eq!(job.attempts(), 3);
    }
}
