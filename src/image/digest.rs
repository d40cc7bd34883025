use anyhow::{Context, Result};
use serde::{Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;

/// Content digest of an image, artifact or build context, printed as `sha256:<hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: String,
    hash: String,
}

impl Digest {
    /// Parses the `sha256:<hex>` form used in image references and engine ids
    pub fn parse(value: &str) -> Result<Self> {
        let (algorithm, hash) = value
            .split_once(':')
            .with_context(|| format!("Digest {:?} is missing its algorithm prefix", value))?;

        if algorithm.is_empty() || hash.is_empty() {
            anyhow::bail!("Digest {:?} has an empty algorithm or hash", value);
        }
        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("Digest {:?} is not hexadecimal", value);
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            hash: hash.to_lowercase(),
        })
    }

    /// SHA-256 digest of raw bytes
    pub fn sha256(data: &[u8]) -> Self {
        Self {
            algorithm: "sha256".to_string(),
            hash: hex::encode(Sha256::digest(data)),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Lowercase hex without the algorithm prefix
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hash)
    }
}
