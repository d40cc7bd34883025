//! Rendering of a `PipelineSpec` into a multi-stage Dockerfile
//!
//! The builder stage is named `builder` and the shippable stage `production`, so
//! each can be built on its own with `--target`. The production stage only ever
//! receives the artifact through `COPY --from=builder`.

use crate::output::schema::{PipelineSpec, BUILDER_STAGE, PRODUCTION_STAGE};
use crate::stack::InstallScript;
use anyhow::{Context, Result};

/// Marker printed by the builder stage when the compiled artifact is absent or not executable
pub const MISSING_ARTIFACT_MARKER: &str = "riskbox: artifact missing or not executable at";

const SYNTAX_DIRECTIVE: &str = "# syntax=docker/dockerfile:1";

pub struct DockerfileRenderer;

impl DockerfileRenderer {
    pub fn render(spec: &PipelineSpec) -> Result<String> {
        let mut lines: Vec<String> = vec![SYNTAX_DIRECTIVE.to_string(), String::new()];

        Self::render_builder(spec, &mut lines)?;
        lines.push(String::new());
        Self::render_production(spec, &mut lines)?;

        let mut dockerfile = lines.join("\n");
        dockerfile.push('\n');
        Ok(dockerfile)
    }

    fn render_builder(spec: &PipelineSpec, lines: &mut Vec<String>) -> Result<()> {
        let artifact_path = spec.artifact_path();

        lines.push(format!(
            "# Builder stage: toolchain, native libraries and source for {}",
            spec.metadata.artifact
        ));
        lines.push(format!("FROM {} AS {}", spec.builder.image, BUILDER_STAGE));
        lines.push(String::new());

        let manager = spec.builder_package_manager()?;
        if let Some(script) = manager.install_script(&spec.builder_packages()?) {
            lines.extend(render_run(&script));
            lines.push(String::new());
        }

        lines.push(format!("WORKDIR {}", spec.builder.workdir));
        lines.push("COPY . .".to_string());
        lines.push(String::new());

        for command in &spec.builder.commands {
            lines.push(format!("RUN {}", command));
        }
        lines.push(format!(
            "RUN test -f {path} && test -s {path} && test -x {path} || {{ echo \"{marker} {path}\" >&2; exit 1; }}",
            path = artifact_path,
            marker = MISSING_ARTIFACT_MARKER
        ));
        Ok(())
    }

    fn render_production(spec: &PipelineSpec, lines: &mut Vec<String>) -> Result<()> {
        lines.push("# Production stage: runtime libraries, trust store and the artifact".to_string());
        lines.push(format!("FROM {} AS {}", spec.production.image, PRODUCTION_STAGE));
        lines.push(String::new());

        let manager = spec.production_package_manager()?;
        if let Some(script) = manager.install_script(&spec.runtime_packages()?) {
            lines.extend(render_run(&script));
            lines.push(String::new());
        }

        lines.push(format!(
            "COPY --from={} {} {}",
            BUILDER_STAGE,
            spec.artifact_path(),
            spec.production.artifact_dest
        ));

        if !spec.production.ports.is_empty() {
            let ports: Vec<String> = spec.production.ports.iter().map(u16::to_string).collect();
            lines.push(format!("EXPOSE {}", ports.join(" ")));
        }

        let entrypoint =
            serde_json::to_string(&spec.entrypoint()).context("Failed to encode entrypoint")?;
        lines.push(format!("ENTRYPOINT {}", entrypoint));
        Ok(())
    }
}

/// One `RUN` instruction, one package per line, continued with backslashes
fn render_run(script: &InstallScript) -> Vec<String> {
    let mut steps: Vec<String> = script.setup.iter().map(|s| s.to_string()).collect();
    steps.push(script.install.to_string());

    let mut lines = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        let prefix = if i == 0 { "RUN" } else { "    &&" };
        lines.push(format!("{} {} \\", prefix, step));
    }
    for package in &script.packages {
        lines.push(format!("        {} \\", package));
    }
    for cleanup in &script.cleanup {
        lines.push(format!("    && {} \\", cleanup));
    }

    if let Some(last) = lines.last_mut() {
        let trimmed = last.trim_end_matches(" \\").to_string();
        *last = trimmed;
    }
    lines
}
