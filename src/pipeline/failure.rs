//! Mapping of engine build failures to pipeline errors

use crate::engine::BuildFailure;
use crate::error::PipelineError;
use crate::output::schema::PipelineSpec;
use crate::render::dockerfile::MISSING_ARTIFACT_MARKER;

/// Log lines carried into the error message
const MESSAGE_TAIL_LINES: usize = 12;

const INSTALL_MARKERS: &[&str] = &["apt-get install", "apt-get update", "apk add"];

const INSTALL_LOG_MARKERS: &[&str] = &[
    "Unable to locate package",
    "has no installation candidate",
    "unable to select packages",
    "Temporary failure resolving",
];

const COMPILE_LOG_MARKERS: &[&str] = &["could not compile", "error[E", "error: linking with"];

pub fn classify_failure(
    stage: &str,
    failure: &BuildFailure,
    spec: &PipelineSpec,
) -> PipelineError {
    let message = describe(failure);
    let step = failure.step.as_deref().unwrap_or("");
    let log = failure.log_tail.join("\n");
    let mentions = |markers: &[&str]| {
        markers
            .iter()
            .any(|m| log.contains(m) || failure.message.contains(m))
    };

    if mentions(&[MISSING_ARTIFACT_MARKER][..])
        || step.contains(MISSING_ARTIFACT_MARKER)
        || (step.starts_with("COPY --from=") && step.contains(&spec.artifact_path()))
    {
        return PipelineError::MissingArtifact {
            path: spec.artifact_path(),
            message,
        };
    }

    if step.starts_with("RUN") && INSTALL_MARKERS.iter().any(|m| step.contains(m)) {
        return PipelineError::DependencyInstall {
            stage: stage.to_string(),
            message,
        };
    }

    let is_build_command = spec
        .builder
        .commands
        .iter()
        .any(|command| step.strip_prefix("RUN ").map(str::trim) == Some(command.trim()));
    if is_build_command {
        return PipelineError::Compilation { message };
    }

    if step.is_empty() {
        if mentions(INSTALL_LOG_MARKERS) {
            return PipelineError::DependencyInstall {
                stage: stage.to_string(),
                message,
            };
        }
        if mentions(COMPILE_LOG_MARKERS) {
            return PipelineError::Compilation { message };
        }
    }

    PipelineError::Engine(format!("{} stage build failed: {}", stage, message))
}

fn describe(failure: &BuildFailure) -> String {
    let mut message = failure.message.clone();
    if let Some(step) = &failure.step {
        message = format!("{} (at `{}`)", message, step);
    }
    let start = failure.log_tail.len().saturating_sub(MESSAGE_TAIL_LINES);
    for line in &failure.log_tail[start..] {
        message.push_str("\n  ");
        message.push_str(line);
    }
    message
}
