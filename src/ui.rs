//! Console stages for the `clipper` binary.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::pipeline::{RunSummary, SegmentOutcome};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    #[default]
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    /// `disable_pretty` turns `Auto` into plain output (CI logs, `NO_COLOR`).
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn is_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.is_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}..."));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    pub fn report(&self, summary: &RunSummary) {
        for line in summary_lines(summary) {
            eprintln!("{line}");
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("done: {} ({})", self.name, format_duration(self.start.elapsed()));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Lines printed by `Ui::report`.
pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![
        format!("frames processed:  {}", summary.frames),
        format!("detections:        {}", summary.detections),
        format!(
            "approach events:   {} ({} too short)",
            summary.events_opened, summary.events_discarded
        ),
        format!("segments emitted:  {}", summary.segments.len()),
    ];
    for (segment, outcome) in summary.segment_outcomes() {
        let detail = match outcome {
            SegmentOutcome::Written(path) => path.display().to_string(),
            SegmentOutcome::Lost(reason) => format!("LOST ({reason})"),
        };
        lines.push(format!(
            "  {:>8.2}s - {:>8.2}s  {}",
            segment.start_time, segment.end_time, detail
        ));
    }
    if summary.source_errors > 0 {
        lines.push(format!("skipped reads:     {}", summary.source_errors));
    }
    if summary.encode_failures > 0 {
        lines.push(format!("encode failures:   {}", summary.encode_failures));
    }
    if summary.detector_failures > 0 {
        lines.push(format!("detector faults:   {}", summary.detector_failures));
    }
    if let Some(err) = &summary.source_error {
        lines.push(format!("input ended early: {err}"));
    }
    lines
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
