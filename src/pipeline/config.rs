use crate::config::{builder_tag, rejected_tag, RiskboxConfig};
use std::time::Duration;

/// Per-run build options
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Production image tag
    pub tag: String,
    pub timeout: Duration,
    pub no_cache: bool,
    /// Ask the engine to pull newer base image layers
    pub pull: bool,
    /// Keep the builder image once the production image is verified
    pub keep_builder: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tag: "risk_model:local".to_string(),
            timeout: Duration::from_secs(3600),
            no_cache: false,
            pull: false,
            keep_builder: false,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RiskboxConfig) -> Self {
        Self {
            tag: config.tag.clone(),
            timeout: config.build_timeout(),
            no_cache: config.no_cache,
            pull: false,
            keep_builder: config.keep_builder,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    pub fn with_pull(mut self, pull: bool) -> Self {
        self.pull = pull;
        self
    }

    pub fn with_keep_builder(mut self, keep_builder: bool) -> Self {
        self.keep_builder = keep_builder;
        self
    }

    pub fn builder_tag(&self) -> String {
        builder_tag(&self.tag)
    }

    pub fn rejected_tag(&self) -> String {
        rejected_tag(&self.tag)
    }
}
