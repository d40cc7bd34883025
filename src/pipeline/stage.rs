use super::context::StageImage;
use super::failure::classify_failure;
use crate::engine::{BuildOutcome, BuildRequest, ContainerEngine};
use crate::error::PipelineError;
use crate::image::Digest;
use crate::output::schema::PipelineSpec;
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::render::BuildContext;
use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct StageBuild<'a> {
    pub stage: &'a str,
    pub tag: &'a str,
    pub no_cache: bool,
    pub pull: bool,
    pub timeout: Duration,
}

/// Builds one Dockerfile stage and inspects the result.
///
/// A failed build is classified into the matching `PipelineError`.
pub async fn build_stage(
    engine: &dyn ContainerEngine,
    spec: &PipelineSpec,
    context: &BuildContext,
    build: StageBuild<'_>,
    progress: &dyn ProgressHandler,
) -> Result<StageImage> {
    progress.on_progress(&ProgressEvent::StageBuildStarted {
        stage: build.stage.to_string(),
        tag: build.tag.to_string(),
    });

    let start = Instant::now();
    let request = BuildRequest {
        tag: build.tag.to_string(),
        target: build.stage.to_string(),
        dockerfile: context.dockerfile_path().to_string(),
        context: context.archive().to_vec(),
        no_cache: build.no_cache,
        pull: build.pull,
        timeout: build.timeout,
    };

    let image_id = match engine.build(request).await? {
        BuildOutcome::Built { image_id } => image_id,
        BuildOutcome::Failed(failure) => {
            warn!(
                stage = build.stage,
                step = failure.step.as_deref().unwrap_or("unknown"),
                message = %failure.message,
                "Stage build failed"
            );
            return Err(classify_failure(build.stage, &failure, spec).into());
        }
    };

    let summary = engine.inspect(build.tag).await?.ok_or_else(|| {
        PipelineError::Engine(format!("image {} missing after build", build.tag))
    })?;
    let build_time = start.elapsed();

    info!(
        stage = build.stage,
        tag = build.tag,
        image = %image_id,
        size = summary.size,
        "Stage image ready"
    );
    progress.on_progress(&ProgressEvent::StageBuildComplete {
        stage: build.stage.to_string(),
        image_id: image_id.clone(),
        duration: build_time,
    });

    Ok(StageImage {
        stage: build.stage.to_string(),
        tag: build.tag.to_string(),
        image_id,
        size: summary.size,
        build_time,
    })
}

/// Reads the artifact out of an image and digests it
pub async fn read_artifact(
    engine: &dyn ContainerEngine,
    image: &str,
    path: &str,
) -> Result<(Digest, u64)> {
    let file = engine
        .read_file(image, path)
        .await?
        .ok_or_else(|| PipelineError::MissingArtifact {
            path: path.to_string(),
            message: format!("not found in image {}", image),
        })?;
    let contents = file.contents;

    if contents.is_empty() {
        return Err(PipelineError::MissingArtifact {
            path: path.to_string(),
            message: format!("empty file in image {}", image),
        }
        .into());
    }

    Ok((Digest::sha256(&contents), contents.len() as u64))
}
