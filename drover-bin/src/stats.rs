use std::fmt::{self, Display};

use console::style;
use drover_lib::{BatchReport, JobResult, TerminalStatus};
use pad::{Alignment, PadStr};

// Maximum padding for each entry in the final statistics output
const MAX_PADDING: usize = 22;

pub(crate) fn color_result(result: &JobResult) -> String {
    let line = format!("{} {} ({} attempts)", result.id, result.status, result.attempts);
    let out = match result.status {
        TerminalStatus::Succeeded => style(line).green().bright(),
        TerminalStatus::RetriesExhausted => style(line).yellow().bright(),
        TerminalStatus::Failed(_) => style(line).red().bright(),
    };
    out.to_string()
}

fn write_stat(f: &mut fmt::Formatter, title: &str, stat: u64, newline: bool) -> fmt::Result {
    let fill = title.chars().count();
    f.write_str(title)?;
    f.write_str(
        &stat
            .to_string()
            .pad(MAX_PADDING - fill, '.', Alignment::Right, false),
    )?;

    if newline {
        f.write_str("\n")?;
    }

    Ok(())
}

/// Text rendering of a finished batch run
pub(crate) struct BatchStats(pub(crate) BatchReport);

impl BatchStats {
    fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.0
            .results
            .iter()
            .filter(|r| !r.status.is_success())
    }
}

impl Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = &self.0.snapshot;
        let separator = "-".repeat(MAX_PADDING + 1);

        writeln!(f, "\u{1f4dd} Summary")?; // 📝
        writeln!(f, "{separator}")?;
        write_stat(f, "\u{1f50d} Total", snapshot.submitted, true)?; // 🔍
        write_stat(f, "\u{2705} Succeeded", snapshot.succeeded, true)?; // ✅
        write_stat(f, "\u{1f501} Requeued", snapshot.requeued, true)?; // 🔁
        write_stat(f, "\u{1f6d1} Gave up", snapshot.retries_exhausted, true)?; // 🛑
        write_stat(f, "\u{1f6ab} Failed", snapshot.failed, true)?; // 🚫
        write_stat(f, "\u{1fa99} Tokens", snapshot.tokens.total, true)?; // 🪙

        let median = snapshot
            .latency
            .median
            .map_or_else(|| "N/A".to_string(), |d| format!("{}ms", d.as_millis()));
        writeln!(
            f,
            "\u{23f1} Median latency{}",
            median.pad(MAX_PADDING - 16, '.', Alignment::Right, false)
        )?; // ⏱
        write!(
            f,
            "\u{23f3} Elapsed{}",
            format!("{:.1}s", snapshot.elapsed.as_secs_f64()).pad(
                MAX_PADDING - 9,
                '.',
                Alignment::Right,
                false
            )
        )?; // ⏳

        let mut failures = self.failures().peekable();
        if failures.peek().is_some() {
            // Using leading newlines over trailing ones (e.g. `writeln!`)
            // lets us avoid extra newlines without any additional logic.
            write!(f, "\n\nFailures")?;
            for result in failures {
                write!(f, "\n{}", color_result(result))?;
            }
        }

        Ok(())
    }
}
