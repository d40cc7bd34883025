//! Command handlers. Each returns the process exit code.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::commands::{
    BuildArgs, FormatArgs, RenderArgs, ReproducibleArgs, RunArgs, SourceArgs, ValidateArgs,
};
use super::output::{HealthStatus, OutputFormat, OutputFormatter, ValidationSummary};
use crate::config::RiskboxConfig;
use crate::engine::{check_docker, ContainerEngine, DockerEngine, RunOptions};
use crate::error::PipelineError;
use crate::output::schema::PipelineSpec;
use crate::pipeline::{verify_reproducible, PipelineConfig, PipelineContext, PipelineOrchestrator};
use crate::progress::{LoggingHandler, ProgressHandler, SpinnerHandler};
use crate::render::render_dockerignore;
use crate::validation::Validator;

/// Exit code for a failed command: the `PipelineError` code if one is in the chain
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    PipelineError::find(error).map(|e| e.exit_code()).unwrap_or(1)
}

fn report_failure(error: &anyhow::Error) -> i32 {
    debug!("Command failed: {:?}", error);
    eprintln!("Error: {:#}", error);
    exit_code_for(error)
}

fn finish(result: Result<i32>) -> i32 {
    result.unwrap_or_else(|e| report_failure(&e))
}

fn write_output(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Output written");
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn load_spec(args: &SourceArgs) -> Result<PipelineSpec> {
    let root = args.source_root();
    PipelineSpec::resolve(args.spec.as_deref(), &root)
        .map_err(|e| anyhow::Error::from(PipelineError::Validation(format!("{:#}", e))))
}

fn load_config() -> Result<RiskboxConfig> {
    let config = RiskboxConfig::default();
    config
        .validate()
        .map_err(|e| PipelineError::Validation(e.to_string()))?;
    Ok(config)
}

async fn connect_engine() -> Result<Arc<dyn ContainerEngine>> {
    if !check_docker().await? {
        return Err(PipelineError::Engine(
            "Docker daemon not reachable (set DOCKER_HOST or start the daemon)".to_string(),
        )
        .into());
    }
    Ok(Arc::new(DockerEngine::connect()?))
}

fn progress_handler(quiet: bool) -> Arc<dyn ProgressHandler> {
    if !quiet && atty::is(atty::Stream::Stderr) {
        Arc::new(SpinnerHandler::new())
    } else {
        Arc::new(LoggingHandler)
    }
}

pub fn handle_render(args: &RenderArgs) -> i32 {
    finish(render(args))
}

fn render(args: &RenderArgs) -> Result<i32> {
    let content = if args.dockerignore {
        render_dockerignore(&args.source.source_root())?
    } else {
        let spec = load_spec(&args.source)?;
        OutputFormatter::new(args.format.into()).format_spec(&spec)?
    };
    write_output(&content, args.output.as_deref())?;
    Ok(0)
}

pub fn handle_validate(args: &ValidateArgs) -> i32 {
    finish(validate(args))
}

fn validate(args: &ValidateArgs) -> Result<i32> {
    let spec = load_spec(&args.source)?;
    let validator = Validator::new();
    let result = validator.validate(&spec);

    let summary = ValidationSummary {
        valid: result.is_ok(),
        artifact: spec.metadata.artifact.clone(),
        rules: validator.rule_names().iter().map(|r| r.to_string()).collect(),
        error: result.as_ref().err().map(|e| e.to_string()),
    };
    print!(
        "{}",
        OutputFormatter::new(OutputFormat::Human).format_validation(&summary)?
    );

    result.map_err(|e| PipelineError::Validation(e.to_string()))?;
    Ok(0)
}

pub async fn handle_build(args: &BuildArgs, quiet: bool) -> i32 {
    finish(run_build(args, quiet).await)
}

async fn run_build(args: &BuildArgs, quiet: bool) -> Result<i32> {
    let config = load_config()?;
    let spec = load_spec(&args.source)?;

    let mut pipeline_config = PipelineConfig::from_config(&config)
        .with_no_cache(config.no_cache || args.no_cache)
        .with_keep_builder(config.keep_builder || args.keep_builder)
        .with_pull(args.pull);
    if let Some(tag) = &args.tag {
        pipeline_config = pipeline_config.with_tag(tag.clone());
    }
    if let Some(secs) = args.timeout {
        pipeline_config = pipeline_config.with_timeout(Duration::from_secs(secs));
    }
    debug!(?pipeline_config, "Resolved build options");

    let engine = connect_engine().await?;
    let mut context = PipelineContext::new(engine, spec, args.source.source_root(), pipeline_config)
        .with_progress(progress_handler(quiet));

    let report = PipelineOrchestrator::new().execute(&mut context).await?;

    if !quiet || args.output.is_some() {
        let formatted = OutputFormatter::new(args.format.into()).format_report(&report)?;
        write_output(&formatted, args.output.as_deref())?;
    }
    Ok(0)
}

pub async fn handle_run(args: &RunArgs) -> i32 {
    finish(run_image(args).await)
}

async fn run_image(args: &RunArgs) -> Result<i32> {
    let config = load_config()?;
    let tag = args.tag.clone().unwrap_or(config.tag);

    let engine = connect_engine().await?;
    if engine.inspect(&tag).await?.is_none() {
        return Err(PipelineError::Engine(format!(
            "image {} not found; run `riskbox build` first",
            tag
        ))
        .into());
    }

    info!(image = %tag, "Running production image");
    let output = engine
        .run(
            &tag,
            RunOptions {
                args: args.args.clone(),
                echo: true,
                keep: args.keep,
            },
        )
        .await?;

    info!(exit_code = output.exit_code, "Container exited");
    if output.exit_code != 0 {
        debug!(tail = %output.log_tail.join("\n"), "Last container output");
    }
    Ok(i32::try_from(output.exit_code).unwrap_or(1))
}

pub async fn handle_verify_reproducible(args: &ReproducibleArgs, quiet: bool) -> i32 {
    finish(run_reproducible(args, quiet).await)
}

async fn run_reproducible(args: &ReproducibleArgs, quiet: bool) -> Result<i32> {
    let config = load_config()?;
    let spec = load_spec(&args.source)?;
    let engine = connect_engine().await?;
    let progress = progress_handler(quiet);

    let report = verify_reproducible(
        engine,
        &spec,
        &args.source.source_root(),
        &PipelineConfig::from_config(&config),
        progress.as_ref(),
    )
    .await?;

    print!(
        "{}",
        OutputFormatter::new(args.format.into()).format_reproducibility(&report)?
    );
    report.ensure_identical()?;
    Ok(0)
}

pub async fn handle_health(args: &FormatArgs) -> i32 {
    finish(run_health(args).await)
}

async fn run_health(args: &FormatArgs) -> Result<i32> {
    let status = if check_docker().await? {
        let engine = DockerEngine::connect()?;
        match engine.info().await {
            Ok(info) => HealthStatus {
                available: true,
                message: "Docker daemon reachable".to_string(),
                engine: Some(info),
            },
            Err(e) => HealthStatus {
                available: false,
                message: format!("{:#}", e),
                engine: None,
            },
        }
    } else {
        HealthStatus {
            available: false,
            message: "Docker daemon not reachable".to_string(),
            engine: None,
        }
    };

    print!("{}", OutputFormatter::new(args.format.into()).format_health(&status)?);
    Ok(if status.available { 0 } else { 1 })
}

pub fn handle_config(args: &FormatArgs) -> i32 {
    finish(show_config(args))
}

fn show_config(args: &FormatArgs) -> Result<i32> {
    let config = RiskboxConfig::default();
    print!("{}", OutputFormatter::new(args.format.into()).format_config(&config)?);
    config
        .validate()
        .map_err(|e| PipelineError::Validation(e.to_string()))?;
    Ok(0)
}
