//! Dual rolling-window rate limiting.
//!
//! Admission of a unit of work is a single atomic decision against two
//! independent budgets: requests per rolling window and token units per
//! rolling window. Workers consult [`DualLimiter::try_admit`] before every
//! execution attempt and sleep for [`DualLimiter::wait_time`] when refused.
//!
//! # Architecture
//!
//! - [`RateWindow`]: one rolling ledger of timestamped consumption events
//! - [`DualLimiter`]: composes the request and token windows into one gate
//! - [`LimiterConfig`]: the two limits and the shared window length
//! - [`RateUsage`]: live utilization reading for metrics snapshots

mod config;
mod limiter;
mod window;

pub use config::LimiterConfig;
pub use limiter::{DualLimiter, RateUsage};
pub use window::RateWindow;
