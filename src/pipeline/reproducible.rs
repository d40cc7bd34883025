//! Rebuild check: unchanged inputs must compile to a byte-identical artifact

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::config::PipelineConfig;
use super::stage::{build_stage, read_artifact, StageBuild};
use crate::engine::ContainerEngine;
use crate::error::PipelineError;
use crate::image::Digest;
use crate::output::schema::{PipelineSpec, BUILDER_STAGE};
use crate::progress::ProgressHandler;
use crate::render::{BuildContext, DockerfileRenderer};
use crate::validation::Validator;

#[derive(Debug, Clone, Serialize)]
pub struct ReproducibilityReport {
    pub context_hash: Digest,
    pub first: Digest,
    pub second: Digest,
    pub identical: bool,
}

impl ReproducibilityReport {
    pub fn ensure_identical(&self) -> Result<()> {
        if self.identical {
            return Ok(());
        }
        Err(PipelineError::Verification(format!(
            "artifact is not reproducible: {} != {}",
            self.first, self.second
        ))
        .into())
    }
}

/// Builds the builder stage twice from the same context without the layer
/// cache and compares the two artifact digests.
pub async fn verify_reproducible(
    engine: Arc<dyn ContainerEngine>,
    spec: &PipelineSpec,
    source_root: &Path,
    config: &PipelineConfig,
    progress: &dyn ProgressHandler,
) -> Result<ReproducibilityReport> {
    Validator::new()
        .validate(spec)
        .map_err(|e| PipelineError::Validation(e.to_string()))?;

    let dockerfile = DockerfileRenderer::render(spec).context("Failed to render Dockerfile")?;
    let root = source_root.to_path_buf();
    let build_context = tokio::task::spawn_blocking(move || BuildContext::from_source(&root, &dockerfile))
        .await
        .context("Context packaging task failed")??;

    let artifact_path = spec.artifact_path();
    let mut digests = Vec::with_capacity(2);
    for attempt in 1..=2 {
        let tag = format!("{}-repro-{}", config.builder_tag(), Uuid::new_v4().simple());
        info!(attempt, tag = %tag, "Building builder stage without cache");

        let image = build_stage(
            engine.as_ref(),
            spec,
            &build_context,
            StageBuild {
                stage: BUILDER_STAGE,
                tag: &tag,
                no_cache: true,
                pull: config.pull && attempt == 1,
                timeout: config.timeout,
            },
            progress,
        )
        .await
        .with_context(|| format!("Reproducibility build {} failed", attempt))?;

        let result = read_artifact(engine.as_ref(), &image.tag, &artifact_path).await;
        if let Err(e) = engine.remove_image(&image.tag).await {
            warn!(tag = %image.tag, error = %e, "Failed to remove reproducibility image");
        }
        let (digest, _) = result?;
        digests.push(digest);
    }

    let second = digests.pop().ok_or_else(|| PipelineError::Engine("missing second build".into()))?;
    let first = digests.pop().ok_or_else(|| PipelineError::Engine("missing first build".into()))?;
    let identical = first == second;
    if identical {
        info!(digest = %first, "Artifact is reproducible");
    } else {
        warn!(first = %first, second = %second, "Artifact differs between builds");
    }

    Ok(ReproducibilityReport {
        context_hash: build_context.hash().clone(),
        first,
        second,
        identical,
    })
}
