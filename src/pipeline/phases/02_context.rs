use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::render::{BuildContext, DockerfileRenderer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

/// Renders the Dockerfile and packages the source tree with it
pub struct ContextPhase;

#[async_trait]
impl WorkflowPhase for ContextPhase {
    fn name(&self) -> &'static str {
        "ContextPhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let dockerfile =
            DockerfileRenderer::render(&context.spec).context("Failed to render Dockerfile")?;

        let root = context.source_root.clone();
        let rendered = dockerfile.clone();
        let build_context =
            tokio::task::spawn_blocking(move || BuildContext::from_source(&root, &rendered))
                .await
                .context("Context packaging task failed")??;

        info!(
            files = build_context.files().len(),
            bytes = build_context.size(),
            hash = %build_context.hash(),
            "Build context packaged"
        );

        context.dockerfile = Some(dockerfile);
        context.build_context = Some(build_context);
        Ok(())
    }
}
