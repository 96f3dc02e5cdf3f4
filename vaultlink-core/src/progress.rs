//! Progress reporting for full-vault builds.
//!
//! The CLI uses `IndicatifReporter`; library callers and tests use
//! `NoopReporter`.

use indicatif::{ProgressBar, ProgressStyle};

/// Receives progress of a long-running operation. Must be shareable with the
/// parallel parse phase.
pub trait ProgressReporter: Send + Sync {
    /// Begin a new phase with an optional total count.
    fn start(&self, phase: &str, total: Option<u64>);

    /// Advance progress by the given amount.
    fn advance(&self, amount: u64);

    /// Mark the current phase as finished.
    fn finish(&self);

    /// Display an informational line without disturbing the bar.
    fn message(&self, msg: &str);
}

#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&self, _phase: &str, _total: Option<u64>) {}
    fn advance(&self, _amount: u64) {}
    fn finish(&self) {}
    fn message(&self, _msg: &str) {}
}

/// Reporter drawing an `indicatif` bar on stderr.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifReporter {
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::new(0),
        }
    }

    /// A reporter that tracks progress without drawing anything.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn start(&self, phase: &str, total: Option<u64>) {
        let template = if total.is_some() {
            "{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}"
        } else {
            "{spinner:.green} {msg} {pos} documents"
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            self.bar.set_style(style.progress_chars("=> "));
        }
        self.bar.set_length(total.unwrap_or(0));
        self.bar.set_message(phase.to_string());
        self.bar.reset();
    }

    fn advance(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn message(&self, msg: &str) {
        self.bar.println(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_reporter_is_silent() {
        let reporter = NoopReporter;
        reporter.start("parsing", Some(3));
        reporter.advance(3);
        reporter.message("hello");
        reporter.finish();
    }

    #[test]
    fn hidden_indicatif_reporter_counts() {
        let reporter = IndicatifReporter::hidden();
        reporter.start("parsing", Some(10));
        reporter.advance(4);
        reporter.advance(6);
        assert_eq!(reporter.bar.position(), 10);
        reporter.finish();
    }
}
