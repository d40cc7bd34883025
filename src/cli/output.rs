//! Output formatting for JSON, YAML, human-readable text and Dockerfiles
//!
//! `Dockerfile` only applies to the pipeline spec itself; every other
//! document rejects it.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::RiskboxConfig;
use crate::engine::EngineInfo;
use crate::output::schema::PipelineSpec;
use crate::pipeline::{BuildReport, ReproducibilityReport};
use crate::render::DockerfileRenderer;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Human,
    Dockerfile,
}

/// Container engine health as reported by `riskbox health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub available: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub valid: bool,
    pub artifact: String,
    pub rules: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_spec(&self, spec: &PipelineSpec) -> Result<String> {
        match self.format {
            OutputFormat::Dockerfile => DockerfileRenderer::render(spec),
            OutputFormat::Json => spec.to_json(),
            OutputFormat::Yaml => spec.to_yaml(),
            OutputFormat::Human => self.format_spec_human(spec),
        }
    }

    pub fn format_validation(&self, summary: &ValidationSummary) -> Result<String> {
        match self.format {
            OutputFormat::Human => {
                let mut output = String::new();
                if summary.valid {
                    output.push_str(&format!(
                        "\u{2713} Pipeline spec for {} is valid\n",
                        summary.artifact
                    ));
                } else {
                    output.push_str(&format!(
                        "\u{2717} Pipeline spec for {} is invalid\n",
                        summary.artifact
                    ));
                }
                output.push_str(&format!("Rules: {}\n", summary.rules.join(", ")));
                if let Some(ref error) = summary.error {
                    output.push_str(&format!("Error: {}\n", error));
                }
                Ok(output)
            }
            _ => self.serialize(summary, "validation result"),
        }
    }

    pub fn format_report(&self, report: &BuildReport) -> Result<String> {
        match self.format {
            OutputFormat::Human => Ok(report.to_human()),
            _ => self.serialize(report, "build report"),
        }
    }

    pub fn format_reproducibility(&self, report: &ReproducibilityReport) -> Result<String> {
        match self.format {
            OutputFormat::Human => {
                let mut output = String::new();
                if report.identical {
                    output.push_str("\u{2713} Artifact is reproducible\n");
                } else {
                    output.push_str("\u{2717} Artifact differs between builds\n");
                }
                output.push_str(&format!("{}\n\n", RULE));
                output.push_str(&format!("Context:       {}\n", report.context_hash));
                output.push_str(&format!("First build:   {}\n", report.first));
                output.push_str(&format!("Second build:  {}\n", report.second));
                Ok(output)
            }
            _ => self.serialize(report, "reproducibility report"),
        }
    }

    pub fn format_config(&self, config: &RiskboxConfig) -> Result<String> {
        match self.format {
            OutputFormat::Human => Ok(config.to_string()),
            _ => {
                let map: BTreeMap<String, String> = config.to_display_map().into_iter().collect();
                self.serialize(&map, "config")
            }
        }
    }

    pub fn format_health(&self, status: &HealthStatus) -> Result<String> {
        match self.format {
            OutputFormat::Human => {
                let mut output = String::new();
                output.push_str("Container Engine Health\n");
                output.push_str(&format!("{}\n\n", RULE));

                let symbol = if status.available { "\u{2713}" } else { "\u{2717}" };
                output.push_str(&format!("{} docker\n", symbol));
                output.push_str(&format!(
                    "  Status: {}\n",
                    if status.available {
                        "Available"
                    } else {
                        "Unavailable"
                    }
                ));
                output.push_str(&format!("  Message: {}\n", status.message));
                if let Some(ref engine) = status.engine {
                    output.push_str(&format!(
                        "  Engine: {} (API {}, {}/{})\n",
                        engine.version, engine.api_version, engine.os, engine.arch
                    ));
                }
                Ok(output)
            }
            _ => self.serialize(status, "health status"),
        }
    }

    fn format_spec_human(&self, spec: &PipelineSpec) -> Result<String> {
        let mut output = String::new();
        output.push_str(&format!("Pipeline for {}\n", spec.metadata.artifact));
        output.push_str(&format!("{}\n\n", RULE));

        output.push_str("Builder Stage:\n");
        output.push_str(&format!("\u{251C}\u{2500} Image:     {}\n", spec.builder.image));
        output.push_str(&format!("\u{251C}\u{2500} Profile:   {}\n", spec.builder.profile.name()));
        output.push_str(&format!(
            "\u{251C}\u{2500} Packages:  {}\n",
            spec.builder_packages()?.join(" ")
        ));
        for command in &spec.builder.commands {
            output.push_str(&format!("\u{251C}\u{2500} Run:       {}\n", command));
        }
        output.push_str(&format!("\u{2514}\u{2500} Artifact:  {}\n\n", spec.artifact_path()));

        output.push_str("Production Stage:\n");
        output.push_str(&format!("\u{251C}\u{2500} Image:       {}\n", spec.production.image));
        output.push_str(&format!(
            "\u{251C}\u{2500} Packages:    {}\n",
            spec.runtime_packages()?.join(" ")
        ));
        output.push_str(&format!("\u{251C}\u{2500} Artifact:    {}\n", spec.production.artifact_dest));
        if !spec.production.ports.is_empty() {
            let ports: Vec<String> = spec.production.ports.iter().map(|p| p.to_string()).collect();
            output.push_str(&format!("\u{251C}\u{2500} Ports:       {}\n", ports.join(", ")));
        }
        output.push_str(&format!(
            "\u{2514}\u{2500} Entrypoint:  {}\n",
            spec.entrypoint().join(" ")
        ));

        Ok(output)
    }

    fn serialize<T: Serialize>(&self, value: &T, what: &str) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value)
                .with_context(|| format!("Failed to serialize {} to JSON", what)),
            OutputFormat::Yaml => serde_yaml::to_string(value)
                .with_context(|| format!("Failed to serialize {} to YAML", what)),
            OutputFormat::Human | OutputFormat::Dockerfile => {
                bail!("{} cannot be written as a Dockerfile", what)
            }
        }
    }
}
