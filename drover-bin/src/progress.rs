use std::sync::LazyLock;

use drover_lib::MetricsSnapshot;
use indicatif::{ProgressBar as Bar, ProgressStyle};

const TEMPLATE: &str = "{pos}/{len} {bar:40.238} {wide_msg}";
const PROGRESS_CHARS: &str = "━ ━";

static STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::with_template(TEMPLATE)
        .expect("Valid progress bar")
        .progress_chars(PROGRESS_CHARS)
});

/// Report live batch progress to the CLI.
#[derive(Clone)]
pub(crate) struct Progress {
    bar: Option<Bar>,
}

impl Progress {
    pub(crate) fn new(hidden: bool) -> Self {
        let bar = if hidden {
            None
        } else {
            let bar = Bar::new_spinner().with_style(STYLE.clone());
            bar.set_length(0);
            bar.set_message("Dispatching...");
            Some(bar)
        };

        Progress { bar }
    }

    /// Refresh the bar from a live snapshot.
    /// Progress is reported on stderr and NOT on stdout.
    pub(crate) fn update(&self, snapshot: &MetricsSnapshot) {
        self.with_bar(|bar| {
            bar.set_length(snapshot.submitted);
            bar.set_position(snapshot.completed());
            bar.set_message(message(snapshot));
        });
    }

    pub(crate) fn finish(&self) {
        self.with_bar(Bar::finish_and_clear);
    }

    fn with_bar<F>(&self, action: F)
    where
        F: FnOnce(&Bar),
    {
        if let Some(bar) = &self.bar {
            action(bar);
        }
    }
}

/// The wide-message part of the bar: live rates and the requeue count
fn message(snapshot: &MetricsSnapshot) -> String {
    let mut parts = vec![format!("{:.1} req/s", snapshot.qps)];

    if snapshot.usage.rpm_limit > 0 {
        parts.push(format!(
            "rpm {}/{}",
            snapshot.usage.rpm_used, snapshot.usage.rpm_limit
        ));
    }
    if snapshot.usage.tpm_limit > 0 {
        parts.push(format!(
            "tpm {}/{}",
            snapshot.usage.tpm_used, snapshot.usage.tpm_limit
        ));
    }
    if snapshot.requeued > 0 {
        parts.push(format!("requeued {}", snapshot.requeued));
    }

    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use drover_lib::{LatencyStats, RateUsage, TokenStats};

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: 10,
            succeeded: 4,
            failed: 0,
            retries_exhausted: 0,
            requeued: 2,
            in_flight: 3,
            queued: 3,
            usage: RateUsage {
                rpm_used: 5,
                rpm_limit: 60,
                tpm_used: 800,
                tpm_limit: 10_000,
            },
            qps: 1.5,
            tokens: TokenStats::default(),
            latency: LatencyStats::default(),
            elapsed: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_message_shows_limited_axes() {
        let message = message(&snapshot());
        assert!(message.contains("1.5 req/s"));
        assert!(message.contains("rpm 5/60"));
        assert!(message.contains("tpm 800/10000"));
        assert!(message.contains("requeued 2"));
    }

    #[test]
    fn test_message_hides_unlimited_axes() {
        let mut reading = snapshot();
        reading.usage.rpm_limit = 0;
        reading.usage.tpm_limit = 0;
        reading.requeued = 0;

        let message = message(&reading);
        assert!(!message.contains("rpm"));
        assert!(!message.contains("tpm"));
        assert!(!message.contains("requeued"));
    }
}
