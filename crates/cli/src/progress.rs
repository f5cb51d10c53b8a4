//! indicatif rendering of run progress.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use prconflict_core::matrix::Verdict;
use prconflict_core::progress::{Phase, Progress};

use crate::style;

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// A spinner for open-ended steps such as API calls.
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {prefix:<12} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_strings(TICKS)
        .progress_chars("=> ")
}

/// One bar, reset at every phase. Cloning shares the bar.
#[derive(Clone)]
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(bar_style());
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Progress for TerminalProgress {
    fn phase_started(&self, phase: Phase, total: usize) {
        self.bar.reset();
        self.bar.set_length(total as u64);
        self.bar.set_prefix(phase.to_string());
        self.bar.set_message("");
        self.bar.enable_steady_tick(Duration::from_millis(100));
    }

    fn candidate_fetched(&self, number: u64) {
        self.bar.set_message(format!("#{}", number));
        self.bar.inc(1);
    }

    fn trial_finished(&self, first: u64, second: u64, verdict: Verdict) {
        if verdict.is_conflict() {
            self.bar.set_message(format!("#{} then #{} conflicts", first, second));
        }
        self.bar.inc(1);
    }

    fn phase_finished(&self, phase: Phase) {
        if phase == Phase::Prepare {
            self.bar.inc(1);
        }
        self.bar.println(style::dim(&format!("  {} done", phase)));
    }
}
