//! `drover` dispatches large batches of independent API requests to a
//! token-metered service under two simultaneous rolling-minute budgets:
//! requests per minute and token units per minute. A pool of concurrent
//! workers shares one admission gate; rate-limited rejections are requeued
//! to the back of the line, and live throughput/latency metrics are
//! available throughout the run.
//!
//! "Hello world" example:
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use drover_lib::{DispatcherConfig, JobSpec, Result, SimulatedExecutor, dispatch};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let jobs = (0..10)
//!         .map(|i| JobSpec::new(format!("request {i}"), 100))
//!         .collect();
//!     let executor = Arc::new(SimulatedExecutor::new(Duration::from_millis(5), 50, 100));
//!
//!     let report = dispatch(jobs, DispatcherConfig::default(), executor).await?;
//!     assert!(report.is_success());
//!     println!("{} succeeded", report.snapshot.succeeded);
//!     Ok(())
//! }
//! ```
//!
//! For rate-limited runs and live observation, build a [`Dispatcher`]
//! yourself:
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use drover_lib::{Dispatcher, DispatcherConfig, JobSpec, LimiterConfig, SimulatedExecutor};
//!
//! #[tokio::main]
//! async fn main() -> drover_lib::Result<()> {
//!     let config = DispatcherConfig {
//!         limits: LimiterConfig::new(60, 10_000),
//!         ..Default::default()
//!     };
//!     let executor = Arc::new(SimulatedExecutor::new(Duration::from_millis(5), 50, 100));
//!     let dispatcher = Dispatcher::new(config, executor)?;
//!
//!     let live = dispatcher.metrics();
//!     let jobs = vec![JobSpec::new("request", 100)];
//!     let report = dispatcher.run(jobs).await?;
//!
//!     assert!(live.snapshot().is_complete());
//!     assert_eq!(report.snapshot.succeeded, 1);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
doc_comment::doctest!("../../README.md");

mod client;
mod dispatcher;
mod executor;
mod limit;
mod metrics;
mod queue;
mod types;
mod worker;

pub use client::{DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, RemoteClient, RemoteClientBuilder};
pub use dispatcher::{Dispatcher, DispatcherConfig, MetricsHandle, dispatch};
pub use executor::{Executor, SimulatedExecutor};
pub use limit::{DualLimiter, LimiterConfig, RateUsage, RateWindow};
pub use metrics::{LatencyStats, MetricsCollector, MetricsSnapshot, TokenStats};
pub use queue::JobQueue;
pub use types::{
    BatchReport, ErrorKind, ExecutionOutcome, Job, JobId, JobResult, JobSpec, Result,
    TerminalStatus,
};
