mod error;
mod job;
mod outcome;

pub use error::ErrorKind;
pub use job::{Job, JobId, JobSpec};
pub use outcome::{BatchReport, ExecutionOutcome, JobResult, TerminalStatus};

/// The [`Result`] type alias used by this crate
pub type Result<T> = std::result::Result<T, ErrorKind>;
