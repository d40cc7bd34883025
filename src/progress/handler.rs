//! Progress handler trait and events

use std::time::Duration;

/// Events emitted while the pipeline runs
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Pipeline started
    Started { source: String, tag: String },

    PhaseStarted { phase: String },

    PhaseComplete { phase: String, duration: Duration },

    /// An image stage build was submitted to the engine
    StageBuildStarted { stage: String, tag: String },

    StageBuildComplete {
        stage: String,
        image_id: String,
        duration: Duration,
    },

    /// One post-build check on the production image
    VerificationCheck {
        check: String,
        passed: bool,
        detail: String,
    },

    /// Pipeline completed successfully
    Completed { total_time: Duration },

    /// Pipeline failed
    Failed { error: String },
}

/// Trait for handling progress events during a pipeline run
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
