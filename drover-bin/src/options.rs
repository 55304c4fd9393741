use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use drover_lib::{DispatcherConfig, LimiterConfig};

const HELP_MSG_CONFIG: &str = "TOML file with the full dispatcher configuration
(worker_count, limits, max_retries, idle_wait).
When given, it replaces the individual rate flags.";

#[derive(Parser, Debug)]
#[command(
    name = "drover",
    version,
    about = "Dispatch batches of API requests under request and token budgets"
)]
pub(crate) struct Options {
    /// File with one request payload per line.
    /// Reads payloads from stdin when omitted.
    pub(crate) input: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 3)]
    pub(crate) workers: usize,

    /// Maximum requests per rolling minute (0 for unlimited)
    #[arg(long, default_value_t = 0)]
    pub(crate) max_rpm: u64,

    /// Maximum token units per rolling minute (0 for unlimited)
    #[arg(long, default_value_t = 0)]
    pub(crate) max_tpm: u64,

    /// How often a rate-limited request is requeued before it is given up
    /// on
    #[arg(long, default_value_t = 3)]
    pub(crate) max_retries: u32,

    /// Token units charged per request at admission time, before the
    /// actual consumption is known
    #[arg(long, default_value_t = 200)]
    pub(crate) estimated_units: u64,

    /// Endpoint receiving each payload as an HTTP POST
    #[arg(short, long, env = "DROVER_ENDPOINT")]
    pub(crate) endpoint: Option<String>,

    /// Bearer token sent in the Authorization header
    #[arg(long, env = "DROVER_API_TOKEN", hide_env_values = true)]
    pub(crate) api_token: Option<String>,

    /// Per-attempt timeout for the remote endpoint
    #[arg(long, value_parser = humantime::parse_duration, default_value = "15s")]
    pub(crate) timeout: Duration,

    /// Run against a local simulation instead of a remote endpoint
    #[arg(long)]
    pub(crate) offline: bool,

    /// Simulated per-request latency in offline mode
    #[arg(long, value_parser = humantime::parse_duration, default_value = "500ms")]
    pub(crate) offline_latency: Duration,

    #[arg(short, long, help = HELP_MSG_CONFIG)]
    pub(crate) config: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long)]
    pub(crate) no_progress: bool,

    /// Print the final report as JSON instead of the text summary
    #[arg(long)]
    pub(crate) json: bool,
}

impl Options {
    /// The dispatcher configuration: either the TOML file as-is, or one
    /// assembled from the individual flags.
    pub(crate) fn dispatcher_config(&self) -> Result<DispatcherConfig> {
        if let Some(path) = &self.config {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {}", path.display()))?;
            let config: DispatcherConfig = toml::from_str(&raw)
                .with_context(|| format!("cannot parse config file {}", path.display()))?;
            return Ok(config);
        }

        Ok(DispatcherConfig {
            worker_count: self.workers,
            limits: LimiterConfig::new(self.max_rpm, self.max_tpm),
            max_retries: self.max_retries,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flags_build_config() {
        let options = Options::parse_from([
            "drover",
            "--workers",
            "5",
            "--max-rpm",
            "60",
            "--max-tpm",
            "9000",
            "--max-retries",
            "1",
            "--offline",
        ]);

        let config = options.dispatcher_config().unwrap();
        assert_eq!(config.worker_count, 5);
        assert_eq!(config.limits, LimiterConfig::new(60, 9000));
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn test_defaults() {
        let options = Options::parse_from(["drover", "--offline"]);
        let config = options.dispatcher_config().unwrap();
        assert_eq!(config, DispatcherConfig::default());
        assert_eq!(options.estimated_units, 200);
        assert_eq!(options.timeout, Duration::from_secs(15));
    }
}
