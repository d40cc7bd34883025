use thiserror::Error;

/// Fatal pipeline outcomes. Every variant aborts the build; there are no retries.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline spec is invalid: {0}")]
    Validation(String),

    #[error("Build context error: {0}")]
    Context(String),

    #[error("Dependency installation failed in {stage} stage: {message}")]
    DependencyInstall { stage: String, message: String },

    #[error("Compilation failed: {message}")]
    Compilation { message: String },

    #[error("Artifact missing at {path}: {message}")]
    MissingArtifact { path: String, message: String },

    #[error("Image verification failed: {0}")]
    Verification(String),

    #[error("Container engine error: {0}")]
    Engine(String),
}

impl PipelineError {
    /// Process exit code reported by the CLI for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Validation(_)
            | PipelineError::Context(_)
            | PipelineError::Engine(_) => 1,
            PipelineError::DependencyInstall { .. } => 2,
            PipelineError::Compilation { .. } => 3,
            PipelineError::MissingArtifact { .. } => 4,
            PipelineError::Verification(_) => 5,
        }
    }

    /// Find a `PipelineError` anywhere in an `anyhow` chain
    pub fn find(error: &anyhow::Error) -> Option<&PipelineError> {
        error.chain().find_map(|e| e.downcast_ref::<PipelineError>())
    }
}
