//! Pipeline context: long-lived dependencies plus the state phases hand to each other

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::engine::ContainerEngine;
use crate::image::Digest;
use crate::output::schema::PipelineSpec;
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::render::BuildContext;
use crate::validation::Validator;

use super::config::PipelineConfig;

/// A stage image the engine built
#[derive(Debug, Clone, Serialize)]
pub struct StageImage {
    pub stage: String,
    pub tag: String,
    pub image_id: String,
    pub size: u64,
    #[serde(with = "duration_secs")]
    pub build_time: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    /// Path inside the builder image
    pub path: String,
    /// Path inside the production image
    pub dest: String,
    pub digest: Digest,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseTiming {
    pub phase: String,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

pub struct PipelineContext {
    pub engine: Arc<dyn ContainerEngine>,

    pub validator: Arc<Validator>,

    pub progress: Arc<dyn ProgressHandler>,

    pub config: PipelineConfig,

    pub spec: PipelineSpec,

    pub source_root: PathBuf,

    pub dockerfile: Option<String>,

    pub build_context: Option<BuildContext>,

    pub builder: Option<StageImage>,

    pub production: Option<StageImage>,

    pub artifact: Option<ArtifactInfo>,

    pub checks: Vec<CheckResult>,

    pub timings: Vec<PhaseTiming>,
}

impl PipelineContext {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        spec: PipelineSpec,
        source_root: PathBuf,
        config: PipelineConfig,
    ) -> Self {
        Self {
            engine,
            validator: Arc::new(Validator::new()),
            progress: Arc::new(NoOpHandler),
            config,
            spec,
            source_root,
            dockerfile: None,
            build_context: None,
            builder: None,
            production: None,
            artifact: None,
            checks: Vec::new(),
            timings: Vec::new(),
        }
    }

    pub fn with_validator(mut self, validator: Arc<Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn emit(&self, event: ProgressEvent) {
        self.progress.on_progress(&event);
    }

    pub fn record_check(&mut self, name: &str, passed: bool, detail: impl Into<String>) {
        let detail = detail.into();
        self.emit(ProgressEvent::VerificationCheck {
            check: name.to_string(),
            passed,
            detail: detail.clone(),
        });
        self.checks.push(CheckResult {
            name: name.to_string(),
            passed,
            detail,
        });
    }

    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

pub(crate) mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}
