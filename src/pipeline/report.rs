//! Summary of a finished pipeline run

use std::fmt::Write as _;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::context::{duration_secs, ArtifactInfo, CheckResult, PhaseTiming, PipelineContext, StageImage};
use crate::error::PipelineError;
use crate::image::Digest;

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Production image tag
    pub tag: String,
    pub builder: StageImage,
    pub production: StageImage,
    /// Whether the builder image was left in the engine
    pub builder_kept: bool,
    pub context_hash: Digest,
    pub artifact: ArtifactInfo,
    pub checks: Vec<CheckResult>,
    pub timings: Vec<PhaseTiming>,
    pub started_at: DateTime<Utc>,
    /// Fraction of the builder image size saved by the production image
    pub size_reduction: f64,
    #[serde(with = "duration_secs")]
    pub total_time: Duration,
}

impl BuildReport {
    pub fn from_context(
        context: &PipelineContext,
        started_at: DateTime<Utc>,
        total_time: Duration,
    ) -> Result<Self> {
        let missing = |what: &str| PipelineError::Engine(format!("pipeline finished without {}", what));

        let builder = context.builder.clone().ok_or_else(|| missing("a builder image"))?;
        let production = context
            .production
            .clone()
            .ok_or_else(|| missing("a production image"))?;
        let artifact = context.artifact.clone().ok_or_else(|| missing("an artifact digest"))?;
        let context_hash = context
            .build_context
            .as_ref()
            .map(|c| c.hash().clone())
            .ok_or_else(|| missing("a build context"))?;

        Ok(Self {
            tag: production.tag.clone(),
            size_reduction: size_reduction(builder.size, production.size),
            builder_kept: context.config.keep_builder,
            builder,
            production,
            context_hash,
            artifact,
            checks: context.checks.clone(),
            timings: context.timings.clone(),
            started_at,
            total_time,
        })
    }

    pub fn to_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\u{2713} Image {} built", self.tag);
        let _ = writeln!(out, "{}\n", "\u{2501}".repeat(42));

        let _ = writeln!(out, "Images:");
        let _ = writeln!(
            out,
            "\u{251C}\u{2500} builder:     {} ({}){}",
            self.builder.tag,
            human_size(self.builder.size),
            if self.builder_kept { "" } else { " removed" }
        );
        let _ = writeln!(
            out,
            "\u{2514}\u{2500} production:  {} ({}, {:.1}% smaller)\n",
            self.production.tag,
            human_size(self.production.size),
            self.size_reduction * 100.0
        );

        let _ = writeln!(out, "Artifact:");
        let _ = writeln!(out, "\u{251C}\u{2500} path:    {}", self.artifact.dest);
        let _ = writeln!(out, "\u{251C}\u{2500} size:    {}", human_size(self.artifact.size));
        let _ = writeln!(out, "\u{2514}\u{2500} digest:  {}\n", self.artifact.digest);

        let _ = writeln!(out, "Checks:");
        for check in &self.checks {
            let mark = if check.passed { "\u{2713}" } else { "\u{2717}" };
            let _ = writeln!(out, "  {} {}: {}", mark, check.name, check.detail);
        }

        let _ = writeln!(out, "\nContext: {}", self.context_hash);
        let _ = writeln!(
            out,
            "Finished in {:.1}s (started {})",
            self.total_time.as_secs_f64(),
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        out
    }
}

pub(crate) fn size_reduction(builder: u64, production: u64) -> f64 {
    if builder == 0 || production >= builder {
        return 0.0;
    }
    1.0 - production as f64 / builder as f64
}

pub(crate) fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
