use crate::error::PipelineError;
use crate::output::schema::PRODUCTION_STAGE;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::pipeline::stage::{build_stage, StageBuild};
use anyhow::Result;
use async_trait::async_trait;

/// Builds the `production` stage from the same context
///
/// The builder stage layers were produced by `BuilderPhase`, so this build
/// always uses the layer cache and never compiles twice.
pub struct ProductionPhase;

#[async_trait]
impl WorkflowPhase for ProductionPhase {
    fn name(&self) -> &'static str {
        "ProductionPhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        if context.builder.is_none() {
            return Err(PipelineError::Engine(
                "production stage requires a built builder stage".to_string(),
            )
            .into());
        }
        let build_context = context.build_context.as_ref().ok_or_else(|| {
            PipelineError::Context("build context must be packaged before the production stage".into())
        })?;
        let tag = context.config.tag.clone();

        let image = build_stage(
            context.engine.as_ref(),
            &context.spec,
            build_context,
            StageBuild {
                stage: PRODUCTION_STAGE,
                tag: &tag,
                no_cache: false,
                pull: false,
                timeout: context.config.timeout,
            },
            context.progress.as_ref(),
        )
        .await?;

        context.production = Some(image);
        Ok(())
    }
}
