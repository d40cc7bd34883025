//! Native dependency sets for the builder and production stages

use super::package_manager::PackageManager;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Packages that only exist to compile or link code
const TOOLCHAIN_PACKAGES: &[&str] = &[
    "autoconf",
    "automake",
    "binutils",
    "build-base",
    "build-essential",
    "cargo",
    "clang",
    "cmake",
    "g++",
    "gcc",
    "libtool",
    "llvm",
    "make",
    "meson",
    "musl-dev",
    "ninja-build",
    "pkg-config",
    "pkgconf",
    "protobuf-compiler",
    "rust",
    "rustc",
];

const TOOLCHAIN_PREFIXES: &[&str] = &["gcc-", "g++-", "clang-", "llvm-", "rust-", "cargo-"];

const DEVELOPMENT_SUFFIXES: &[&str] = &["-dev", "-devel", "-headers", "-static"];

/// Which native build dependencies the builder stage installs.
///
/// `Minimal` covers TLS linking only. `Full` adds the compilers, headers and
/// build tools needed by crates with native components (protobuf, udev, zstd).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuilderProfile {
    Minimal,
    #[default]
    Full,
}

impl BuilderProfile {
    pub fn name(&self) -> &'static str {
        match self {
            BuilderProfile::Minimal => "minimal",
            BuilderProfile::Full => "full",
        }
    }

    pub fn build_packages(&self, manager: PackageManager) -> Vec<String> {
        let packages: &[&str] = match (self, manager) {
            (BuilderProfile::Minimal, PackageManager::Apt) => &["libssl-dev", "pkg-config"],
            (BuilderProfile::Full, PackageManager::Apt) => &[
                "build-essential",
                "clang",
                "cmake",
                "libclang-dev",
                "libssl-dev",
                "libudev-dev",
                "libzstd-dev",
                "pkg-config",
                "protobuf-compiler",
                "zlib1g-dev",
            ],
            (BuilderProfile::Minimal, PackageManager::Apk) => &["openssl-dev", "pkgconf"],
            (BuilderProfile::Full, PackageManager::Apk) => &[
                "build-base",
                "clang",
                "cmake",
                "eudev-dev",
                "openssl-dev",
                "pkgconf",
                "protobuf-dev",
                "zlib-dev",
                "zstd-dev",
            ],
        };
        packages.iter().map(|p| p.to_string()).collect()
    }

    /// Shared libraries the artifact links against at run time, plus the trust store
    pub fn runtime_packages(&self, manager: PackageManager) -> Vec<String> {
        let packages: &[&str] = match (self, manager) {
            (BuilderProfile::Minimal, PackageManager::Apt) => &["ca-certificates", "libssl3"],
            (BuilderProfile::Full, PackageManager::Apt) => {
                &["ca-certificates", "libssl3", "libudev1"]
            }
            (BuilderProfile::Minimal, PackageManager::Apk) => {
                &["ca-certificates", "libgcc", "libssl3"]
            }
            (BuilderProfile::Full, PackageManager::Apk) => {
                &["ca-certificates", "eudev-libs", "libgcc", "libssl3"]
            }
        };
        packages.iter().map(|p| p.to_string()).collect()
    }
}

impl fmt::Display for BuilderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BuilderProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(BuilderProfile::Minimal),
            "full" => Ok(BuilderProfile::Full),
            other => Err(format!(
                "Invalid builder profile: {}. Valid options: minimal, full",
                other
            )),
        }
    }
}

/// Whether a distribution package is compiler, build tool or development header material
pub fn is_toolchain_package(name: &str) -> bool {
    let name = name.trim();
    // apt allows version pins like `gcc=4:12.2.0-3`
    let name = name.split(['=', '<', '>', '~']).next().unwrap_or(name);

    TOOLCHAIN_PACKAGES.contains(&name)
        || TOOLCHAIN_PREFIXES.iter().any(|p| name.starts_with(p))
        || DEVELOPMENT_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Binaries whose presence in an image means a toolchain was shipped
pub const TOOLCHAIN_BINARIES: &[&str] = &[
    "/usr/local/cargo/bin/cargo",
    "/usr/local/cargo/bin/rustc",
    "/usr/bin/cargo",
    "/usr/bin/rustc",
    "/usr/bin/gcc",
    "/usr/bin/cc",
    "/usr/bin/clang",
    "/usr/bin/ld",
];

/// CA bundle location shared by the Debian and Alpine `ca-certificates` packages
pub const TRUST_STORE_PATH: &str = "/etc/ssl/certs/ca-certificates.crt";
