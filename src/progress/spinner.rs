//! Terminal spinner for interactive builds

use super::{ProgressEvent, ProgressHandler};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct SpinnerHandler {
    bar: ProgressBar,
}

impl SpinnerHandler {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{elapsed:>4}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    /// Spinner that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for SpinnerHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHandler for SpinnerHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { tag, .. } => {
                self.bar.set_message(format!("building {}", tag));
            }
            ProgressEvent::PhaseStarted { phase } => {
                self.bar.set_message(phase.clone());
            }
            ProgressEvent::PhaseComplete { .. } => {}
            ProgressEvent::StageBuildStarted { stage, tag } => {
                self.bar
                    .set_message(format!("building {} stage as {}", stage, tag));
            }
            ProgressEvent::StageBuildComplete {
                stage, duration, ..
            } => {
                self.bar.println(format!(
                    "\u{2713} {} stage built in {:.1}s",
                    stage,
                    duration.as_secs_f64()
                ));
            }
            ProgressEvent::VerificationCheck {
                check,
                passed,
                detail,
            } => {
                let mark = if *passed { "\u{2713}" } else { "\u{2717}" };
                self.bar.println(format!("{} {}: {}", mark, check, detail));
            }
            ProgressEvent::Completed { total_time } => {
                self.bar.finish_and_clear();
                self.bar
                    .println(format!("Done in {:.1}s", total_time.as_secs_f64()));
            }
            ProgressEvent::Failed { error } => {
                self.bar.abandon_with_message(format!("failed: {}", error));
            }
        }
    }
}
