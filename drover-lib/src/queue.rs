use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::types::Job;

/// Ordered backlog of pending jobs, shared by all workers.
///
/// FIFO with requeue-appends-to-tail semantics: a rate-limited job goes to
/// the back of the line so retries never monopolize the queue ahead of
/// fresh work. A popped job is claimed exactly once and counts as
/// in-flight until its worker reports it back via [`JobQueue::complete`]
/// or [`JobQueue::requeue`].
#[derive(Debug, Default)]
pub struct JobQueue {
    backlog: Mutex<VecDeque<Job>>,
    /// Jobs claimed by a worker but not yet reported back.
    /// Updated while holding the backlog lock so drain checks are
    /// consistent.
    in_flight: AtomicUsize,
    /// Wakes one idle worker when a job arrives
    pushed: Notify,
    /// Wakes the dispatcher whenever a claim is resolved
    resolved: Notify,
}

impl JobQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the tail and wake one waiting worker.
    /// Used both for seeding the batch and for requeueing.
    ///
    /// # Panics
    ///
    /// Panics if the backlog mutex is poisoned.
    pub fn push(&self, job: Job) {
        self.backlog.lock().unwrap().push_back(job);
        self.pushed.notify_one();
    }

    /// Claim the next job, if any
    ///
    /// # Panics
    ///
    /// Panics if the backlog mutex is poisoned.
    pub fn try_pop(&self) -> Option<Job> {
        let mut backlog = self.backlog.lock().unwrap();
        let job = backlog.pop_front();
        if job.is_some() {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
        }
        job
    }

    /// Claim the next job, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout so callers can re-check their stop signal
    /// instead of blocking indefinitely on an empty queue.
    pub async fn pop(&self, timeout: Duration) -> Option<Job> {
        if let Some(job) = self.try_pop() {
            return Some(job);
        }
        let _ = tokio::time::timeout(timeout, self.pushed.notified()).await;
        self.try_pop()
    }

    /// Report a claimed job as terminally resolved
    pub fn complete(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.resolved.notify_one();
    }

    /// Return a claimed job to the tail of the backlog.
    ///
    /// The push happens before the claim is released so the queue never
    /// looks drained while the job changes hands.
    ///
    /// # Panics
    ///
    /// Panics if the backlog mutex is poisoned.
    pub fn requeue(&self, job: Job) {
        {
            let mut backlog = self.backlog.lock().unwrap();
            backlog.push_back(job);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        self.pushed.notify_one();
        self.resolved.notify_one();
    }

    /// Number of jobs waiting in the backlog
    ///
    /// # Panics
    ///
    /// Panics if the backlog mutex is poisoned.
    pub fn len(&self) -> usize {
        self.backlog.lock().unwrap().len()
    }

    /// `true` when the backlog is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of jobs currently claimed by workers
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// `true` when the backlog is empty and no claim is outstanding.
    /// This is the dispatcher's shutdown condition.
    ///
    /// # Panics
    ///
    /// Panics if the backlog mutex is poisoned.
    pub fn is_drained(&self) -> bool {
        let backlog = self.backlog.lock().unwrap();
        backlog.is_empty() && self.in_flight.load(Ordering::SeqCst) == 0
    }

    /// Wait until a claim is resolved, then return. Callers loop on
    /// [`JobQueue::is_drained`] around this.
    pub(crate) async fn resolved(&self) {
        self.resolved.notified().await;
    }
}
