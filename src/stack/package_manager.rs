//! Distribution package managers used by the base images

use crate::image::ImageRef;
use serde::{Deserialize, Serialize};

/// Repository prefixes of apk-based images
const APK_IMAGES: &[&str] = &["alpine", "wolfi-base", "chainguard/", "wolfi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Apt,
    Apk,
}

impl PackageManager {
    pub fn for_image(image: &ImageRef) -> Self {
        let repository = image.repository.as_str();
        let is_apk = APK_IMAGES
            .iter()
            .any(|prefix| {
                repository == prefix.trim_end_matches('/') || repository.starts_with(prefix)
            })
            || image.name().starts_with("alpine")
            || image
                .tag
                .as_deref()
                .map(|tag| tag.contains("alpine"))
                .unwrap_or(false);

        if is_apk {
            PackageManager::Apk
        } else {
            PackageManager::Apt
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt",
            PackageManager::Apk => "apk",
        }
    }

    /// Install script for `packages`, clearing the package cache in the same layer.
    ///
    /// Packages are sorted and deduplicated so output does not depend on spec ordering.
    pub fn install_script(&self, packages: &[String]) -> Option<InstallScript> {
        if packages.is_empty() {
            return None;
        }

        let mut sorted = packages.to_vec();
        sorted.sort();
        sorted.dedup();

        Some(match self {
            PackageManager::Apt => InstallScript {
                setup: vec!["apt-get update"],
                install: "apt-get install -y --no-install-recommends",
                packages: sorted,
                cleanup: vec!["rm -rf /var/lib/apt/lists/*"],
            },
            PackageManager::Apk => InstallScript {
                setup: vec![],
                install: "apk add --no-cache",
                packages: sorted,
                cleanup: vec![],
            },
        })
    }

    pub fn install_command(&self, packages: &[String]) -> Option<String> {
        self.install_script(packages).map(|script| script.to_command())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallScript {
    pub setup: Vec<&'static str>,
    pub install: &'static str,
    pub packages: Vec<String>,
    pub cleanup: Vec<&'static str>,
}

impl InstallScript {
    pub fn to_command(&self) -> String {
        let mut parts: Vec<String> = self.setup.iter().map(|s| s.to_string()).collect();
        parts.push(format!("{} {}", self.install, self.packages.join(" ")));
        parts.extend(self.cleanup.iter().map(|s| s.to_string()));
        parts.join(" && ")
    }
}
