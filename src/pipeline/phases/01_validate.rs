use crate::error::PipelineError;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

pub struct ValidatePhase;

#[async_trait]
impl WorkflowPhase for ValidatePhase {
    fn name(&self) -> &'static str {
        "ValidatePhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        context
            .validator
            .validate(&context.spec)
            .map_err(|e| PipelineError::Validation(e.to_string()))?;

        crate::image::ImageRef::parse(&context.config.tag)
            .map_err(|e| PipelineError::Validation(format!("invalid tag: {}", e)))?;

        debug!(
            rules = ?context.validator.rule_names(),
            "Pipeline spec passed validation"
        );
        Ok(())
    }
}
