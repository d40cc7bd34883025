//! Configuration management for riskbox
//!
//! Tool settings come from environment variables with sensible defaults. The
//! pipeline itself is described by a `PipelineSpec`, loaded from a spec file or
//! discovered in the source tree.
//!
//! # Environment Variables
//!
//! - `RISKBOX_LOG_LEVEL`: Logging level - default: "info"
//! - `RISKBOX_TAG`: Production image tag - default: "risk_model:local"
//! - `RISKBOX_BUILD_TIMEOUT`: Per-stage build timeout in seconds - default: "3600"
//! - `RISKBOX_KEEP_BUILDER`: Keep the builder image after a build (true|false) - default: "false"
//! - `RISKBOX_NO_CACHE`: Build without the layer cache (true|false) - default: "false"
//!
//! # Example
//!
//! ```no_run
//! use riskbox::RiskboxConfig;
//! use std::env;
//!
//! env::set_var("RISKBOX_TAG", "registry.example.com/risk_model:1.4.2");
//!
//! let config = RiskboxConfig::default();
//! config.validate().expect("Invalid configuration");
//! ```

use crate::output::schema::PipelineSpec;
use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_TAG: &str = "risk_model:local";
const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 3600;
const MAX_BUILD_TIMEOUT_SECS: u64 = 6 * 3600;

/// Spec file looked up at the root of the source tree
pub const SPEC_FILE_NAME: &str = "riskbox.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Tool configuration loaded from `RISKBOX_*` environment variables
#[derive(Debug, Clone)]
pub struct RiskboxConfig {
    /// Tag applied to the production image; the builder image gets `<tag>-builder`
    pub tag: String,

    pub build_timeout_secs: u64,

    pub keep_builder: bool,

    pub no_cache: bool,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for RiskboxConfig {
    fn default() -> Self {
        let tag = env::var("RISKBOX_TAG").unwrap_or_else(|_| DEFAULT_TAG.to_string());

        let build_timeout_secs = env::var("RISKBOX_BUILD_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_BUILD_TIMEOUT_SECS);

        let keep_builder = env::var("RISKBOX_KEEP_BUILDER")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        let no_cache = env::var("RISKBOX_NO_CACHE")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        let log_level = env::var("RISKBOX_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            tag,
            build_timeout_secs,
            keep_builder,
            no_cache,
            log_level,
        }
    }
}

impl RiskboxConfig {
    /// Validates the configuration
    ///
    /// Checks that the timeout is within range, the tag is a usable image
    /// reference and the log level is known.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Build timeout must be at least 1 second".to_string(),
            ));
        }
        if self.build_timeout_secs > MAX_BUILD_TIMEOUT_SECS {
            return Err(ConfigError::ValidationFailed(
                "Build timeout cannot exceed 6 hours".to_string(),
            ));
        }

        crate::image::ImageRef::parse(&self.tag).map_err(|e| ConfigError::ParseError {
            field: "RISKBOX_TAG".to_string(),
            error: e.to_string(),
        })?;

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn builder_tag(&self) -> String {
        builder_tag(&self.tag)
    }

    pub fn to_display_map(&self) -> std::collections::HashMap<String, String> {
        let mut map = std::collections::HashMap::new();

        map.insert("tag".to_string(), self.tag.clone());
        map.insert("builder_tag".to_string(), self.builder_tag());
        map.insert(
            "build_timeout_secs".to_string(),
            self.build_timeout_secs.to_string(),
        );
        map.insert("keep_builder".to_string(), self.keep_builder.to_string());
        map.insert("no_cache".to_string(), self.no_cache.to_string());
        map.insert("log_level".to_string(), self.log_level.clone());

        map
    }
}

impl fmt::Display for RiskboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Riskbox Configuration:")?;
        writeln!(f, "  Tag: {}", self.tag)?;
        writeln!(f, "  Builder Tag: {}", self.builder_tag())?;
        writeln!(f, "  Build Timeout: {}s", self.build_timeout_secs)?;
        writeln!(f, "  Keep Builder: {}", self.keep_builder)?;
        writeln!(f, "  No Cache: {}", self.no_cache)?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}

/// Builder image tag derived from the production tag
///
/// `risk_model:1.0` becomes `risk_model:1.0-builder`; an untagged name gets
/// `:builder`.
pub fn builder_tag(tag: &str) -> String {
    derived_tag(tag, "builder")
}

/// Tag a production image is moved to when it fails verification
pub fn rejected_tag(tag: &str) -> String {
    derived_tag(tag, "rejected")
}

fn derived_tag(tag: &str, suffix: &str) -> String {
    let last_segment = tag.rsplit('/').next().unwrap_or(tag);
    if last_segment.contains(':') {
        format!("{}-{}", tag, suffix)
    } else {
        format!("{}:{}", tag, suffix)
    }
}

impl PipelineSpec {
    /// Loads a spec file, choosing the format from its extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read spec file {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let spec = match extension.as_deref() {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML spec {}", path.display()))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML spec {}", path.display()))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON spec {}", path.display()))?,
            _ => anyhow::bail!(
                "Unsupported spec file extension for {} (expected .toml, .yaml, .yml or .json)",
                path.display()
            ),
        };

        debug!(path = %path.display(), "Loaded pipeline spec");
        Ok(spec)
    }

    /// Uses `riskbox.toml` from the source root when present, otherwise the default spec
    pub fn discover(source_root: &Path) -> Result<Self> {
        let candidate = source_root.join(SPEC_FILE_NAME);
        if candidate.is_file() {
            info!(path = %candidate.display(), "Using pipeline spec from source tree");
            Self::load(&candidate)
        } else {
            debug!(
                source = %source_root.display(),
                "No {} found, using default pipeline spec",
                SPEC_FILE_NAME
            );
            Ok(Self::default())
        }
    }

    /// Explicit spec file if given, else discovery in the source tree
    pub fn resolve(spec_file: Option<&Path>, source_root: &Path) -> Result<Self> {
        match spec_file {
            Some(path) => Self::load(path),
            None => Self::discover(source_root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::BuilderProfile;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn remove(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_configuration() {
        let _guards = vec![
            EnvGuard::remove("RISKBOX_TAG"),
            EnvGuard::remove("RISKBOX_BUILD_TIMEOUT"),
            EnvGuard::remove("RISKBOX_KEEP_BUILDER"),
            EnvGuard::remove("RISKBOX_NO_CACHE"),
            EnvGuard::set("RISKBOX_LOG_LEVEL", DEFAULT_LOG_LEVEL),
        ];

        let config = RiskboxConfig::default();

        assert_eq!(config.tag, DEFAULT_TAG);
        assert_eq!(config.build_timeout_secs, DEFAULT_BUILD_TIMEOUT_SECS);
        assert!(!config.keep_builder);
        assert!(!config.no_cache);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _guards = vec![
            EnvGuard::set("RISKBOX_TAG", "ghcr.io/acme/risk_model:2.1.0"),
            EnvGuard::set("RISKBOX_BUILD_TIMEOUT", "900"),
            EnvGuard::set("RISKBOX_KEEP_BUILDER", "true"),
            EnvGuard::set("RISKBOX_NO_CACHE", "true"),
            EnvGuard::set("RISKBOX_LOG_LEVEL", "DEBUG"),
        ];

        let config = RiskboxConfig::default();

        assert_eq!(config.tag, "ghcr.io/acme/risk_model:2.1.0");
        assert_eq!(config.builder_tag(), "ghcr.io/acme/risk_model:2.1.0-builder");
        assert_eq!(config.build_timeout(), Duration::from_secs(900));
        assert!(config.keep_builder);
        assert!(config.no_cache);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_unparseable_values_fall_back() {
        let _guards = vec![
            EnvGuard::set("RISKBOX_BUILD_TIMEOUT", "soon"),
            EnvGuard::set("RISKBOX_NO_CACHE", "yes please"),
        ];

        let config = RiskboxConfig::default();
        assert_eq!(config.build_timeout_secs, DEFAULT_BUILD_TIMEOUT_SECS);
        assert!(!config.no_cache);
    }

    #[test]
    #[serial]
    fn test_configuration_validation_invalid_timeout() {
        let mut config = RiskboxConfig::default();
        config.build_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.build_timeout_secs = MAX_BUILD_TIMEOUT_SECS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_configuration_validation_invalid_log_level() {
        let mut config = RiskboxConfig::default();
        config.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    #[serial]
    fn test_configuration_validation_invalid_tag() {
        let mut config = RiskboxConfig::default();
        config.tag = "Risk Model".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_builder_tag() {
        assert_eq!(builder_tag("risk_model:1.0"), "risk_model:1.0-builder");
        assert_eq!(builder_tag("risk_model"), "risk_model:builder");
        assert_eq!(
            builder_tag("localhost:5000/risk_model"),
            "localhost:5000/risk_model:builder"
        );
    }

    #[test]
    fn test_rejected_tag() {
        assert_eq!(rejected_tag("risk_model:1.0"), "risk_model:1.0-rejected");
        assert_eq!(rejected_tag("localhost:5000/risk_model"), "localhost:5000/risk_model:rejected");
    }

    #[test]
    #[serial]
    fn test_config_display() {
        let config = RiskboxConfig::default();
        let display = format!("{}", config);
        assert!(display.contains("Riskbox Configuration:"));
        assert!(display.contains("Builder Tag:"));
        assert!(config.to_display_map().contains_key("build_timeout_secs"));
    }

    #[test]
    fn test_load_yaml_spec() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(
            &path,
            "builder:\n  profile: minimal\nproduction:\n  requires_tls: false\n",
        )
        .unwrap();

        let spec = PipelineSpec::load(&path).unwrap();
        assert_eq!(spec.builder.profile, BuilderProfile::Minimal);
        assert!(!spec.production.requires_tls);
    }

    #[test]
    fn test_load_json_spec() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"metadata": {"artifact": "scorer"}}"#).unwrap();

        let spec = PipelineSpec::load(&path).unwrap();
        assert_eq!(spec.metadata.artifact, "scorer");
        assert_eq!(spec.artifact_path(), "/usr/src/risk_model/target/release/scorer");
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.ini");
        std::fs::write(&path, "").unwrap();

        let err = PipelineSpec::load(&path).unwrap_err();
        assert!(err.to_string().contains("Unsupported spec file extension"));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("riskbox.toml");
        std::fs::write(&path, "[builder\nimage = ").unwrap();

        assert!(PipelineSpec::load(&path).is_err());
    }

    #[test]
    fn test_discover_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let spec = PipelineSpec::discover(dir.path()).unwrap();
        assert_eq!(spec, PipelineSpec::default());
    }

    #[test]
    fn test_discover_reads_spec_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SPEC_FILE_NAME),
            "[production]\nports = [8000]\n",
        )
        .unwrap();

        let spec = PipelineSpec::discover(dir.path()).unwrap();
        assert_eq!(spec.production.ports, vec![8000]);
    }

    #[test]
    fn test_resolve_prefers_explicit_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SPEC_FILE_NAME), "[production]\nports = [1]\n").unwrap();
        let explicit = dir.path().join("other.toml");
        std::fs::write(&explicit, "[production]\nports = [2]\n").unwrap();

        let spec = PipelineSpec::resolve(Some(&explicit), dir.path()).unwrap();
        assert_eq!(spec.production.ports, vec![2]);
    }
}
