use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ErrorKind, Result};

/// Default length of the rolling accounting window
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Limits for the dual rolling-window admission gate.
///
/// A limit of `0` disables that axis entirely, i.e. the batch runs
/// unlimited on that resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum requests admitted per rolling window; `0` for unlimited
    #[serde(default)]
    pub max_rpm: u64,

    /// Maximum token units admitted per rolling window; `0` for unlimited
    #[serde(default)]
    pub max_tpm: u64,

    /// Length of the rolling window both limits are accounted over
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_rpm: 0,
            max_tpm: 0,
            window: DEFAULT_WINDOW,
        }
    }
}

const fn default_window() -> Duration {
    DEFAULT_WINDOW
}

impl LimiterConfig {
    /// Create a config with both limits over the default window
    #[must_use]
    pub const fn new(max_rpm: u64, max_tpm: u64) -> Self {
        Self {
            max_rpm,
            max_tpm,
            window: DEFAULT_WINDOW,
        }
    }

    /// `true` when neither axis is limited
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.max_rpm == 0 && self.max_tpm == 0
    }

    /// Check that the config describes a usable limiter
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidLimiterConfig`] for a zero-length window.
    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(ErrorKind::InvalidLimiterConfig(
                "window length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
