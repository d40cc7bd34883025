//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { source, tag } => {
                info!(source = %source, tag = %tag, "Starting pipeline");
            }
            ProgressEvent::PhaseStarted { phase } => {
                debug!(phase = %phase, "Starting phase");
            }
            ProgressEvent::PhaseComplete { phase, duration } => {
                info!(
                    phase = %phase,
                    duration_ms = duration.as_millis(),
                    "Phase complete"
                );
            }
            ProgressEvent::StageBuildStarted { stage, tag } => {
                info!(stage = %stage, tag = %tag, "Building stage");
            }
            ProgressEvent::StageBuildComplete {
                stage,
                image_id,
                duration,
            } => {
                info!(
                    stage = %stage,
                    image = %image_id,
                    duration_ms = duration.as_millis(),
                    "Stage built"
                );
            }
            ProgressEvent::VerificationCheck {
                check,
                passed,
                detail,
            } => {
                if *passed {
                    debug!(check = %check, detail = %detail, "Check passed");
                } else {
                    warn!(check = %check, detail = %detail, "Check failed");
                }
            }
            ProgressEvent::Completed { total_time } => {
                info!(total_time_ms = total_time.as_millis(), "Pipeline complete");
            }
            ProgressEvent::Failed { error } => {
                warn!(error = %error, "Pipeline failed");
            }
        }
    }
}
