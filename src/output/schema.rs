//! PipelineSpec schema data structures
//!
//! A `PipelineSpec` is the declarative description of the two-stage image build:
//! a builder stage that compiles the artifact and a production stage that ships
//! only that artifact with its runtime libraries.

use crate::image::ImageRef;
use crate::stack::{BuilderProfile, PackageManager};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub const DEFAULT_ARTIFACT: &str = "risk_model";
pub const DEFAULT_BUILDER_IMAGE: &str = "rust:1.83.0-bookworm";
pub const DEFAULT_PRODUCTION_IMAGE: &str = "debian:bookworm-slim";
pub const DEFAULT_WORKDIR: &str = "/usr/src/risk_model";
pub const DEFAULT_ARTIFACT_DEST: &str = "/usr/local/bin/risk_model";
pub const BUILDER_STAGE: &str = "builder";
pub const PRODUCTION_STAGE: &str = "production";

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_null_default_version<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_else(default_version))
}

fn default_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(
        default = "default_version",
        deserialize_with = "deserialize_null_default_version"
    )]
    pub version: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub metadata: PipelineMetadata,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub builder: BuilderStage,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub production: ProductionStage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineMetadata {
    /// Name of the executable the builder produces
    pub artifact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for PipelineMetadata {
    fn default() -> Self {
        Self {
            artifact: DEFAULT_ARTIFACT.to_string(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderStage {
    /// Pinned toolchain image
    pub image: String,
    pub profile: BuilderProfile,
    /// Packages installed in addition to the profile's set
    pub packages: Vec<String>,
    pub workdir: String,
    pub commands: Vec<String>,
    /// Overrides `<workdir>/target/release/<artifact>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
}

impl Default for BuilderStage {
    fn default() -> Self {
        Self {
            image: DEFAULT_BUILDER_IMAGE.to_string(),
            profile: BuilderProfile::default(),
            packages: Vec::new(),
            workdir: DEFAULT_WORKDIR.to_string(),
            commands: vec!["cargo build --release".to_string()],
            artifact_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionStage {
    /// Pinned minimal runtime image
    pub image: String,
    /// Packages installed in addition to the profile's runtime set
    pub packages: Vec<String>,
    pub artifact_dest: String,
    /// Defaults to `[artifact_dest]`
    pub entrypoint: Vec<String>,
    pub ports: Vec<u16>,
    /// Whether the artifact makes outbound TLS calls and needs the trust store
    pub requires_tls: bool,
}

impl Default for ProductionStage {
    fn default() -> Self {
        Self {
            image: DEFAULT_PRODUCTION_IMAGE.to_string(),
            packages: Vec::new(),
            artifact_dest: DEFAULT_ARTIFACT_DEST.to_string(),
            entrypoint: Vec::new(),
            ports: Vec::new(),
            requires_tls: true,
        }
    }
}

impl Default for PipelineSpec {
    fn default() -> Self {
        Self {
            version: default_version(),
            metadata: PipelineMetadata::default(),
            builder: BuilderStage::default(),
            production: ProductionStage::default(),
        }
    }
}

impl PipelineSpec {
    pub fn builder_image(&self) -> Result<ImageRef> {
        ImageRef::parse(&self.builder.image).context("Invalid builder image")
    }

    pub fn production_image(&self) -> Result<ImageRef> {
        ImageRef::parse(&self.production.image).context("Invalid production image")
    }

    pub fn builder_package_manager(&self) -> Result<PackageManager> {
        Ok(PackageManager::for_image(&self.builder_image()?))
    }

    pub fn production_package_manager(&self) -> Result<PackageManager> {
        Ok(PackageManager::for_image(&self.production_image()?))
    }

    /// Profile packages plus extras, sorted and deduplicated
    pub fn builder_packages(&self) -> Result<Vec<String>> {
        let manager = self.builder_package_manager()?;
        let mut packages = self.builder.profile.build_packages(manager);
        packages.extend(self.builder.packages.iter().cloned());
        packages.sort();
        packages.dedup();
        Ok(packages)
    }

    pub fn runtime_packages(&self) -> Result<Vec<String>> {
        let manager = self.production_package_manager()?;
        let mut packages = self.builder.profile.runtime_packages(manager);
        if !self.production.requires_tls {
            packages.retain(|p| p != "ca-certificates");
        }
        packages.extend(self.production.packages.iter().cloned());
        packages.sort();
        packages.dedup();
        Ok(packages)
    }

    /// Fixed path of the compiled artifact inside the builder stage
    pub fn artifact_path(&self) -> String {
        self.builder.artifact_path.clone().unwrap_or_else(|| {
            format!(
                "{}/target/release/{}",
                self.builder.workdir.trim_end_matches('/'),
                self.metadata.artifact
            )
        })
    }

    pub fn entrypoint(&self) -> Vec<String> {
        if self.production.entrypoint.is_empty() {
            vec![self.production.artifact_dest.clone()]
        } else {
            self.production.entrypoint.clone()
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize PipelineSpec to YAML")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize PipelineSpec to JSON")
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize PipelineSpec to TOML")
    }
}

impl fmt::Display for PipelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_yaml() {
            Ok(yaml) => write!(f, "{}", yaml),
            Err(e) => write!(f, "Error formatting PipelineSpec: {}", e),
        }
    }
}
