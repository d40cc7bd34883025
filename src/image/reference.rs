//! Parsing of `[registry/]repository[:tag][@digest]` image references

use super::digest::Digest;
use anyhow::{Context, Result};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn repository_regex() -> &'static Regex {
    static REPOSITORY_REGEX: OnceLock<Regex> = OnceLock::new();
    REPOSITORY_REGEX.get_or_init(|| {
        Regex::new(
            r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*$",
        )
        .expect("valid regex")
    })
}

fn tag_regex() -> &'static Regex {
    static TAG_REGEX: OnceLock<Regex> = OnceLock::new();
    TAG_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("valid regex"))
}

/// Repositories whose images ship a compiler toolchain
const TOOLCHAIN_REPOSITORIES: &[&str] = &[
    "rust",
    "gcc",
    "golang",
    "clang",
    "buildpack-deps",
    "rust-musl-builder",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<Digest>,
}

impl ImageRef {
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            anyhow::bail!("Image reference cannot be empty");
        }
        if reference.chars().any(char::is_whitespace) {
            anyhow::bail!("Image reference cannot contain whitespace: {}", reference);
        }

        let (name_and_tag, digest) = match reference.split_once('@') {
            Some((name, digest)) => (
                name,
                Some(
                    Digest::parse(digest)
                        .with_context(|| format!("Invalid digest in image {}", reference))?,
                ),
            ),
            None => (reference, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones belong to a registry port
        let last_slash = name_and_tag.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name_and_tag[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (
                    &name_and_tag[..split],
                    Some(name_and_tag[split + 1..].to_string()),
                )
            }
            None => (name_and_tag, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, name.to_string()),
        };

        if !repository_regex().is_match(&repository) {
            anyhow::bail!("Invalid image repository '{}' in {}", repository, reference);
        }

        if let Some(tag) = &tag {
            if !tag_regex().is_match(tag) {
                anyhow::bail!("Invalid image tag '{}' in {}", tag, reference);
            }
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Last path component of the repository (`cgr.dev/chainguard/wolfi-base` -> `wolfi-base`)
    pub fn name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }

    /// A reference is pinned when it names a digest or an explicit tag other than `latest`
    pub fn is_pinned(&self) -> bool {
        if self.digest.is_some() {
            return true;
        }
        matches!(self.tag.as_deref(), Some(tag) if tag != "latest")
    }

    pub fn is_toolchain_image(&self) -> bool {
        if TOOLCHAIN_REPOSITORIES.contains(&self.name()) {
            return true;
        }
        self.tag
            .as_deref()
            .map(|tag| tag.ends_with("-dev"))
            .unwrap_or(false)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
