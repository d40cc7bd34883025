use super::fixture_path;
use anyhow::{Context, Result};
use bollard::container::ListContainersOptions;
use bollard::Docker;
use riskbox::engine::{
    check_docker, BuildOutcome, BuildRequest, ContainerEngine, DockerEngine, RunOptions,
};
use riskbox::pipeline::{
    verify_reproducible, BuildReport, PipelineConfig, PipelineContext, PipelineOrchestrator,
    ReproducibilityReport,
};
use riskbox::progress::LoggingHandler;
use riskbox::render::BuildContext;
use riskbox::PipelineSpec;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Per-stage build timeout for fixture builds
const BUILD_TIMEOUT: Duration = Duration::from_secs(1800);

/// Runs the pipeline against a real Docker daemon under unique tags and
/// removes every image it created on `cleanup`.
pub struct ContainerTestHarness {
    engine: Arc<DockerEngine>,
    tags: Vec<String>,
}

impl ContainerTestHarness {
    pub async fn new() -> Result<Self> {
        anyhow::ensure!(check_docker().await?, "Docker daemon not reachable");
        Ok(Self {
            engine: Arc::new(DockerEngine::connect()?),
            tags: Vec::new(),
        })
    }

    pub fn unique_tag(&mut self) -> String {
        let tag = format!("riskbox-test/risk_model:{}", Uuid::new_v4().simple());
        self.tags.push(tag.clone());
        self.tags.push(riskbox::config::builder_tag(&tag));
        self.tags.push(riskbox::config::rejected_tag(&tag));
        tag
    }

    fn config(&self, tag: &str) -> PipelineConfig {
        PipelineConfig::default()
            .with_tag(tag)
            .with_timeout(BUILD_TIMEOUT)
    }

    pub async fn build(&mut self, fixture: &Path) -> Result<(String, Result<BuildReport>)> {
        let tag = self.unique_tag();
        let spec = PipelineSpec::discover(fixture)?;
        let mut context = PipelineContext::new(
            self.engine.clone(),
            spec,
            fixture.to_path_buf(),
            self.config(&tag),
        )
        .with_progress(Arc::new(LoggingHandler));

        let result = PipelineOrchestrator::new().execute(&mut context).await;
        Ok((tag, result))
    }

    pub async fn verify_reproducible(&mut self, fixture: &Path) -> Result<ReproducibilityReport> {
        let tag = self.unique_tag();
        let spec = PipelineSpec::discover(fixture)?;
        verify_reproducible(
            self.engine.clone(),
            &spec,
            fixture,
            &self.config(&tag),
            &LoggingHandler,
        )
        .await
    }

    pub async fn run(&self, tag: &str) -> Result<(i64, String)> {
        let output = self
            .engine
            .run(tag, RunOptions::default())
            .await
            .with_context(|| format!("Failed to run {}", tag))?;
        Ok((output.exit_code, output.log_tail.join("\n")))
    }

    /// Image on top of `base` whose entrypoint does not exist, so it can be
    /// created but never started
    pub async fn build_unstartable(&mut self, base: &str) -> Result<String> {
        let tag = self.unique_tag();
        let dockerfile = format!(
            "FROM {} AS unstartable\nENTRYPOINT [\"/riskbox-missing-entrypoint\"]\n",
            base
        );
        let context = BuildContext::from_source(&fixture_path("stub-exit-42"), &dockerfile)?;
        let outcome = self
            .engine
            .build(BuildRequest {
                tag: tag.clone(),
                target: "unstartable".to_string(),
                dockerfile: context.dockerfile_path().to_string(),
                context: context.archive().to_vec(),
                no_cache: false,
                pull: false,
                timeout: BUILD_TIMEOUT,
            })
            .await?;
        match outcome {
            BuildOutcome::Built { .. } => Ok(tag),
            BuildOutcome::Failed(failure) => anyhow::bail!("build failed: {}", failure.message),
        }
    }

    /// Containers, running or stopped, created from `tag`
    pub async fn containers_from(&self, tag: &str) -> Result<usize> {
        let docker = Docker::connect_with_local_defaults()?;
        let mut filters = HashMap::new();
        filters.insert("ancestor".to_string(), vec![tag.to_string()]);
        let containers = docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;
        Ok(containers.len())
    }

    pub async fn image_exists(&self, tag: &str) -> Result<bool> {
        Ok(self.engine.inspect(tag).await?.is_some())
    }

    pub async fn cleanup(self) {
        for tag in &self.tags {
            let _ = self.engine.remove_image(tag).await;
        }
    }
}
