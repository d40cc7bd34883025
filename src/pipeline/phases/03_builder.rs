use crate::error::PipelineError;
use crate::output::schema::BUILDER_STAGE;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::pipeline::stage::{build_stage, StageBuild};
use anyhow::Result;
use async_trait::async_trait;

/// Builds the `builder` stage: toolchain, source and the compiled artifact
pub struct BuilderPhase;

#[async_trait]
impl WorkflowPhase for BuilderPhase {
    fn name(&self) -> &'static str {
        "BuilderPhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let build_context = context.build_context.as_ref().ok_or_else(|| {
            PipelineError::Context("build context must be packaged before the builder stage".into())
        })?;
        let tag = context.config.builder_tag();

        let image = build_stage(
            context.engine.as_ref(),
            &context.spec,
            build_context,
            StageBuild {
                stage: BUILDER_STAGE,
                tag: &tag,
                no_cache: context.config.no_cache,
                pull: context.config.pull,
                timeout: context.config.timeout,
            },
            context.progress.as_ref(),
        )
        .await?;

        context.builder = Some(image);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BuildFailure, MockEngine};
    use crate::output::schema::PipelineSpec;
    use crate::pipeline::config::PipelineConfig;
    use crate::render::{BuildContext, DockerfileRenderer};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn prepared(engine: MockEngine, spec: PipelineSpec) -> (PipelineContext, Arc<MockEngine>, TempDir) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"risk_model\"\n").unwrap();
        let dockerfile = DockerfileRenderer::render(&spec).unwrap();

        let engine = Arc::new(engine);
        let mut ctx = PipelineContext::new(
            engine.clone(),
            spec,
            dir.path().to_path_buf(),
            PipelineConfig::default().with_tag("risk_model:test").with_no_cache(true),
        );
        ctx.build_context = Some(BuildContext::from_source(dir.path(), &dockerfile).unwrap());
        (ctx, engine, dir)
    }

    #[tokio::test]
    async fn test_builder_phase_tags_builder_image() {
        let spec = PipelineSpec::default();
        let (mut ctx, engine, _dir) = prepared(MockEngine::for_spec(&spec), spec);

        BuilderPhase.execute(&mut ctx).await.unwrap();

        let builder = ctx.builder.unwrap();
        assert_eq!(builder.tag, "risk_model:test-builder");
        assert_eq!(builder.stage, "builder");
        let builds = engine.builds();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].target, "builder");
        assert!(builds[0].no_cache);
    }

    #[tokio::test]
    async fn test_builder_phase_compilation_failure() {
        let spec = PipelineSpec::default();
        let engine = MockEngine::for_spec(&spec).with_failure(
            BUILDER_STAGE,
            BuildFailure::new("returned a non-zero code: 101").with_step("RUN cargo build --release"),
        );
        let (mut ctx, engine, _dir) = prepared(engine, spec);

        let err = BuilderPhase.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(
            PipelineError::find(&err),
            Some(PipelineError::Compilation { .. })
        ));
        assert!(ctx.builder.is_none());
        assert!(!engine.has_image("risk_model:test-builder"));
    }

    #[tokio::test]
    async fn test_builder_phase_requires_context() {
        let spec = PipelineSpec::default();
        let (mut ctx, _engine, _dir) = prepared(MockEngine::for_spec(&spec), spec);
        ctx.build_context = None;
        assert!(BuilderPhase.execute(&mut ctx).await.is_err());
    }
}
