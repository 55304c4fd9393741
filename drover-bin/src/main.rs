//! `drover` dispatches a batch of API request payloads to a remote
//! endpoint under two simultaneous budgets: requests per rolling minute
//! and token units per rolling minute. Rate-limited requests are requeued
//! automatically and a live progress line shows throughput while the
//! batch runs.
//!
//! Dispatch a file of payloads (one per line) against an endpoint:
//! ```sh
//! drover requests.jsonl --endpoint https://api.example.com/v1/complete \
//!     --max-rpm 60 --max-tpm 10000 --workers 8
//! ```
//!
//! Pipe payloads in and run a local simulation (no network):
//! ```sh
//! seq 100 | drover --offline --max-rpm 120
//! ```
#![warn(clippy::all, clippy::pedantic)]

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use drover_lib::{
    Dispatcher, Executor, JobSpec, MetricsHandle, RemoteClientBuilder, SimulatedExecutor,
};
use log::info;
use secrecy::SecretString;

mod options;
mod progress;
mod stats;

use options::Options;
use progress::Progress;
use stats::BatchStats;

/// How often the progress line is refreshed from a live snapshot
const REFRESH_INTERVAL: Duration = Duration::from_millis(200);

/// Exit code when at least one job did not succeed
const EXIT_FAILURES: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let options = Options::parse();

    let jobs = read_jobs(&options)?;
    if jobs.is_empty() {
        bail!("no payloads to dispatch");
    }
    let config = options.dispatcher_config()?;
    let executor = build_executor(&options)?;

    info!(
        "dispatching {} payloads with {} workers",
        jobs.len(),
        config.worker_count
    );

    let dispatcher = Dispatcher::new(config, executor)?;
    let progress = Progress::new(options.no_progress || options.json);
    let ticker = spawn_ticker(dispatcher.metrics(), progress.clone());

    let report = dispatcher.run(jobs).await?;

    ticker.abort();
    progress.finish();

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", BatchStats(report.clone()));
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_FAILURES))
    }
}

/// Load one payload per non-empty line, from the input file or stdin
fn read_jobs(options: &Options) -> Result<Vec<JobSpec>> {
    let reader: Box<dyn BufRead> = match &options.input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("cannot open input file {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut jobs = Vec::new();
    for line in reader.lines() {
        let line = line.context("cannot read payload line")?;
        if line.trim().is_empty() {
            continue;
        }
        jobs.push(JobSpec::new(line, options.estimated_units));
    }
    Ok(jobs)
}

fn build_executor(options: &Options) -> Result<Arc<dyn Executor>> {
    if options.offline {
        return Ok(Arc::new(SimulatedExecutor::new(
            options.offline_latency,
            5,
            options.estimated_units.max(5),
        )));
    }

    let Some(endpoint) = &options.endpoint else {
        bail!("either --endpoint or --offline is required");
    };

    let client = RemoteClientBuilder::builder()
        .endpoint(Some(endpoint.clone()))
        .api_token(options.api_token.clone().map(SecretString::from))
        .timeout(Some(options.timeout))
        .build()
        .client()?;
    Ok(Arc::new(client))
}

/// Refresh the progress line from live snapshots until aborted
fn spawn_ticker(live: MetricsHandle, progress: Progress) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            progress.update(&live.snapshot());
            tokio::time::sleep(REFRESH_INTERVAL).await;
        }
    })
}
