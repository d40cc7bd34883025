use super::context::{PhaseTiming, PipelineContext};
use super::phase_trait::WorkflowPhase;
use super::phases::{
    builder::BuilderPhase, context::ContextPhase, production::ProductionPhase,
    validate::ValidatePhase, verify::VerifyPhase,
};
use super::report::BuildReport;
use crate::error::PipelineError;
use crate::progress::ProgressEvent;
use anyhow::{Context, Result};
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct PipelineOrchestrator {
    phases: Vec<Box<dyn WorkflowPhase>>,
}

impl Default for PipelineOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineOrchestrator {
    pub fn new() -> Self {
        Self {
            phases: vec![
                Box::new(ValidatePhase),
                Box::new(ContextPhase),
                Box::new(BuilderPhase),
                Box::new(ProductionPhase),
                Box::new(VerifyPhase),
            ],
        }
    }

    pub fn with_phases(phases: Vec<Box<dyn WorkflowPhase>>) -> Self {
        Self { phases }
    }

    pub fn phase_names(&self) -> Vec<&'static str> {
        self.phases.iter().map(|p| p.name()).collect()
    }

    /// Runs every phase in order and reports the finished images
    ///
    /// The first failing phase aborts the run. A production image that fails
    /// verification is moved off the release tag to `<tag>-rejected`. A
    /// successful run removes the builder image unless `keep_builder` is set.
    pub async fn execute(&self, context: &mut PipelineContext) -> Result<BuildReport> {
        let start = Instant::now();
        let started_at = Utc::now();
        info!(
            source = %context.source_root.display(),
            tag = %context.config.tag,
            "Starting image pipeline"
        );
        context.emit(ProgressEvent::Started {
            source: context.source_root.display().to_string(),
            tag: context.config.tag.clone(),
        });

        for phase in &self.phases {
            let phase_name = phase.name();
            info!("Phase: {}", phase_name);
            context.emit(ProgressEvent::PhaseStarted {
                phase: phase_name.to_string(),
            });

            let phase_start = Instant::now();
            let result = phase
                .execute(context)
                .await
                .with_context(|| format!("Phase {} failed", phase_name));

            if let Err(e) = result {
                if matches!(PipelineError::find(&e), Some(PipelineError::Verification(_))) {
                    reject_production(context).await;
                }
                context.emit(ProgressEvent::Failed {
                    error: format!("{:#}", e),
                });
                return Err(e);
            }

            let duration = phase_start.elapsed();
            context.timings.push(PhaseTiming {
                phase: phase_name.to_string(),
                duration,
            });
            context.emit(ProgressEvent::PhaseComplete {
                phase: phase_name.to_string(),
                duration,
            });
            debug!("Phase {} complete", phase_name);
        }

        if !context.config.keep_builder {
            if let Some(builder) = &context.builder {
                // The production image is already tagged, so a leftover builder is only disk usage
                if let Err(e) = context.engine.remove_image(&builder.tag).await {
                    warn!(tag = %builder.tag, error = %e, "Failed to remove builder image");
                }
            }
        }

        let total_time = start.elapsed();
        let report = BuildReport::from_context(context, started_at, total_time)?;
        info!(
            tag = %report.tag,
            size_reduction = %format!("{:.1}%", report.size_reduction * 100.0),
            "Pipeline complete"
        );
        context.emit(ProgressEvent::Completed { total_time });

        Ok(report)
    }
}

/// Keeps a rejected image for inspection without leaving it runnable under the release tag
async fn reject_production(context: &mut PipelineContext) {
    let Some(production) = context.production.as_mut() else {
        return;
    };
    let rejected = context.config.rejected_tag();

    match context.engine.retag(&production.tag, &rejected).await {
        Ok(()) => {
            warn!(tag = %production.tag, rejected = %rejected, "Production image rejected");
            production.tag = rejected;
        }
        Err(e) => {
            warn!(tag = %production.tag, error = %e, "Failed to retag rejected image, removing it");
            if let Err(e) = context.engine.remove_image(&production.tag).await {
                warn!(tag = %production.tag, error = %e, "Failed to remove rejected image");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngine;
    use crate::output::schema::PipelineSpec;
    use crate::pipeline::config::PipelineConfig;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct FailingPhase;

    #[async_trait]
    impl WorkflowPhase for FailingPhase {
        fn name(&self) -> &'static str {
            "FailingPhase"
        }

        async fn execute(&self, _context: &mut PipelineContext) -> Result<()> {
            anyhow::bail!("nope")
        }
    }

    #[test]
    fn test_default_phase_order() {
        let orchestrator = PipelineOrchestrator::new();
        assert_eq!(
            orchestrator.phase_names(),
            vec![
                "ValidatePhase",
                "ContextPhase",
                "BuilderPhase",
                "ProductionPhase",
                "VerifyPhase"
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_names_phase() {
        let spec = PipelineSpec::default();
        let mut ctx = PipelineContext::new(
            Arc::new(MockEngine::for_spec(&spec)),
            spec,
            PathBuf::from("."),
            PipelineConfig::default(),
        );
        let orchestrator = PipelineOrchestrator::with_phases(vec![Box::new(FailingPhase)]);

        let err = orchestrator.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "Phase FailingPhase failed");
        assert!(ctx.timings.is_empty());
    }
}
