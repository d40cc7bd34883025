//! Build context packaging
//!
//! The source tree is sent to the engine as a gzip tar. Entries are sorted and
//! written with normalized metadata so the same tree always yields the same
//! archive bytes and context hash.

use crate::error::PipelineError;
use crate::image::Digest;
use anyhow::{Context, Result};
use flate2::{Compression, GzBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// Name of the rendered Dockerfile inside the context archive
pub const CONTEXT_DOCKERFILE: &str = ".riskbox.Dockerfile";

pub const DOCKERIGNORE_FILE: &str = ".dockerignore";

/// Paths never sent to the builder: build output, VCS metadata and local secrets.
/// Anchored at the source root, so `src/target/` is still source.
const DEFAULT_IGNORE_PATTERNS: &[&str] = &["/target", "/.git", "/.env", "**/*.rs.bk"];

pub fn default_ignore_patterns() -> &'static [&'static str] {
    DEFAULT_IGNORE_PATTERNS
}

/// The `.dockerignore` equivalent of what `BuildContext::from_source` packages for `root`
pub fn render_dockerignore(root: &Path) -> Result<String> {
    let mut out = String::from("# Generated by riskbox\n");
    for pattern in ignore_patterns(root)? {
        out.push_str(&pattern);
        out.push('\n');
    }
    Ok(out)
}

/// Root `.dockerignore` patterns followed by the defaults, so the defaults win
fn ignore_patterns(root: &Path) -> Result<Vec<String>> {
    let path = root.join(DOCKERIGNORE_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    let mut patterns: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(anchor)
        .collect();
    patterns.extend(DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()));
    Ok(patterns)
}

/// Docker matches `.dockerignore` patterns from the context root only
fn anchor(pattern: &str) -> String {
    let (negation, body) = match pattern.strip_prefix('!') {
        Some(rest) => ("!", rest),
        None => ("", pattern),
    };
    let body = body.trim_start_matches("./");
    if body.starts_with('/') || body.starts_with("**/") {
        format!("{}{}", negation, body)
    } else {
        format!("{}/{}", negation, body)
    }
}

fn ignore_matcher(root: &Path) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in ignore_patterns(root)? {
        builder
            .add_line(None, &pattern)
            .with_context(|| format!("Invalid ignore pattern {}", pattern))?;
    }
    builder.build().context("Failed to build ignore rules")
}

#[derive(Debug, Clone)]
pub struct BuildContext {
    archive: Vec<u8>,
    hash: Digest,
    files: Vec<PathBuf>,
}

impl BuildContext {
    /// Packages `root` plus the rendered `dockerfile` into a deterministic archive
    pub fn from_source(root: &Path, dockerfile: &str) -> Result<Self> {
        check_manifest(root)?;

        let files = collect_files(root)?;
        info!(
            source = %root.display(),
            files = files.len(),
            "Packaging build context"
        );

        let encoder = GzBuilder::new()
            .mtime(0)
            .write(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);

        for rel in &files {
            let full = root.join(rel);
            let metadata = std::fs::symlink_metadata(&full)
                .with_context(|| format!("Failed to read metadata for {}", full.display()))?;

            let mut header = tar::Header::new_gnu();
            header.set_metadata_in_mode(&metadata, tar::HeaderMode::Deterministic);

            if metadata.file_type().is_symlink() {
                let target = std::fs::read_link(&full)
                    .with_context(|| format!("Failed to read link {}", full.display()))?;
                builder
                    .append_link(&mut header, rel, &target)
                    .with_context(|| format!("Failed to archive link {}", rel.display()))?;
            } else {
                let file = File::open(&full)
                    .with_context(|| format!("Failed to open {}", full.display()))?;
                builder
                    .append_data(&mut header, rel, file)
                    .with_context(|| format!("Failed to archive {}", rel.display()))?;
            }
            trace!(path = %rel.display(), "Archived");
        }

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(dockerfile.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        builder
            .append_data(&mut header, CONTEXT_DOCKERFILE, dockerfile.as_bytes())
            .context("Failed to archive Dockerfile")?;

        let archive = builder
            .into_inner()
            .context("Failed to finish context archive")?
            .finish()
            .context("Failed to compress context archive")?;

        let hash = Digest::sha256(&archive);
        debug!(bytes = archive.len(), hash = %hash, "Build context ready");

        Ok(Self {
            archive,
            hash,
            files,
        })
    }

    pub fn archive(&self) -> &[u8] {
        &self.archive
    }

    pub fn hash(&self) -> &Digest {
        &self.hash
    }

    /// Source files included, relative to the root, in archive order
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn size(&self) -> usize {
        self.archive.len()
    }

    pub fn dockerfile_path(&self) -> &'static str {
        CONTEXT_DOCKERFILE
    }
}

/// The tree must describe a buildable Cargo project
fn check_manifest(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Err(PipelineError::Context(format!(
            "source root {} is not a directory",
            root.display()
        ))
        .into());
    }

    let manifest_path = root.join("Cargo.toml");
    let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
        PipelineError::Context(format!(
            "no readable Cargo.toml in {}: {}",
            root.display(),
            e
        ))
    })?;

    let manifest: toml::Table = content.parse().map_err(|e| {
        PipelineError::Context(format!("{} is not valid TOML: {}", manifest_path.display(), e))
    })?;

    if !manifest.contains_key("package") && !manifest.contains_key("workspace") {
        return Err(PipelineError::Context(format!(
            "{} has neither [package] nor [workspace]",
            manifest_path.display()
        ))
        .into());
    }

    if !root.join("Cargo.lock").is_file() {
        warn!(
            source = %root.display(),
            "No Cargo.lock found; dependency versions may differ between builds"
        );
    }
    Ok(())
}

fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let matcher = ignore_matcher(root)?;

    let mut files = Vec::new();
    for result in WalkBuilder::new(root)
        .standard_filters(false)
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !matcher.matched(entry.path(), is_dir).is_ignore()
        })
        .build()
    {
        let entry = result.context("Failed to read directory entry")?;
        let is_file_or_link = entry
            .file_type()
            .map(|t| t.is_file() || t.is_symlink())
            .unwrap_or(false);
        if !is_file_or_link {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .context("Failed to strip source root")?
            .to_path_buf();
        if rel == Path::new(CONTEXT_DOCKERFILE) {
            continue;
        }
        files.push(rel);
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    const MANIFEST: &str = "[package]\nname = \"risk_model\"\nversion = \"0.1.0\"\nedition = \"2021\"\n";

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Cargo.toml", MANIFEST);
        write(dir.path(), "Cargo.lock", "version = 3\n");
        write(dir.path(), "src/main.rs", "fn main() {}\n");
        dir
    }

    fn entries(context: &BuildContext) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(GzDecoder::new(context.archive()));
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let path = entry.path().unwrap().display().to_string();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (path, data)
            })
            .collect()
    }

    #[test]
    fn test_context_includes_sources_and_dockerfile() {
        let dir = project();
        let context = BuildContext::from_source(dir.path(), "FROM scratch\n").unwrap();

        let entries = entries(&context);
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["Cargo.lock", "Cargo.toml", "src/main.rs", CONTEXT_DOCKERFILE]
        );
        assert_eq!(entries[3].1, b"FROM scratch\n");
        assert_eq!(context.dockerfile_path(), ".riskbox.Dockerfile");
    }

    #[test]
    fn test_context_skips_build_output_and_secrets() {
        let dir = project();
        write(dir.path(), "target/release/risk_model", "binary");
        write(dir.path(), ".git/HEAD", "ref: refs/heads/main\n");
        write(dir.path(), ".env", "HELIUS_API_KEY=secret\n");
        write(dir.path(), "src/lib.rs.bk", "backup");
        write(dir.path(), ".gitignore", "/scratch\n");
        write(dir.path(), DOCKERIGNORE_FILE, "fixtures/large\n");
        write(dir.path(), "fixtures/large/blob.bin", "big");

        let context = BuildContext::from_source(dir.path(), "FROM scratch\n").unwrap();
        let files: Vec<String> = context
            .files()
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        assert!(files.contains(&"src/main.rs".to_string()));
        assert!(files.contains(&".gitignore".to_string()));
        assert!(files.iter().all(|f| !f.starts_with("target/")));
        assert!(files.iter().all(|f| !f.starts_with(".git/")));
        assert!(!files.contains(&".env".to_string()));
        assert!(!files.contains(&"src/lib.rs.bk".to_string()));
        assert!(!files.contains(&"fixtures/large/blob.bin".to_string()));
    }

    #[test]
    fn test_context_keeps_nested_dirs_named_like_ignored_ones() {
        let dir = project();
        write(dir.path(), "src/target/mod.rs", "pub fn price() {}\n");
        write(dir.path(), "src/env/.env", "# fixture\n");
        write(dir.path(), "target/release/risk_model", "binary");

        let context = BuildContext::from_source(dir.path(), "FROM scratch\n").unwrap();
        let files: Vec<String> = context
            .files()
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        assert_eq!(
            files,
            vec![
                "Cargo.lock",
                "Cargo.toml",
                "src/env/.env",
                "src/main.rs",
                "src/target/mod.rs",
            ]
        );
    }

    #[test]
    fn test_only_root_dockerignore_applies() {
        let dir = project();
        write(dir.path(), DOCKERIGNORE_FILE, "*.csv\n");
        write(dir.path(), "prices.csv", "a,b\n");
        write(dir.path(), "data/prices.csv", "a,b\n");
        write(dir.path(), "data/.dockerignore", "seed.sql\n");
        write(dir.path(), "data/seed.sql", "select 1;\n");

        let context = BuildContext::from_source(dir.path(), "FROM scratch\n").unwrap();
        let files: Vec<String> = context
            .files()
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        assert!(!files.contains(&"prices.csv".to_string()));
        assert!(files.contains(&"data/prices.csv".to_string()));
        assert!(files.contains(&"data/seed.sql".to_string()));
    }

    #[test]
    fn test_render_dockerignore_matches_packaging_rules() {
        let dir = project();
        write(dir.path(), DOCKERIGNORE_FILE, "# local\n*.csv\n!keep.csv\n/docs\n");

        let rendered = render_dockerignore(dir.path()).unwrap();
        let lines: Vec<&str> = rendered.lines().skip(1).collect();
        assert_eq!(
            lines,
            vec!["/*.csv", "!/keep.csv", "/docs", "/target", "/.git", "/.env", "**/*.rs.bk"]
        );

        let bare = TempDir::new().unwrap();
        assert_eq!(
            render_dockerignore(bare.path()).unwrap().lines().count(),
            DEFAULT_IGNORE_PATTERNS.len() + 1
        );
    }

    #[test]
    fn test_context_hash_is_deterministic() {
        let first = project();
        let second = project();

        let a = BuildContext::from_source(first.path(), "FROM scratch\n").unwrap();
        let b = BuildContext::from_source(second.path(), "FROM scratch\n").unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.archive(), b.archive());

        write(second.path(), "src/main.rs", "fn main() { std::process::exit(1) }\n");
        let c = BuildContext::from_source(second.path(), "FROM scratch\n").unwrap();
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_context_requires_manifest() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/main.rs", "fn main() {}\n");

        let err = BuildContext::from_source(dir.path(), "").unwrap_err();
        assert!(matches!(
            PipelineError::find(&err),
            Some(PipelineError::Context(_))
        ));
    }

    #[test]
    fn test_context_rejects_manifest_without_package() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Cargo.toml", "[dependencies]\nserde = \"1\"\n");

        let err = BuildContext::from_source(dir.path(), "").unwrap_err();
        assert!(err.to_string().contains("neither [package] nor [workspace]"));
    }

    #[test]
    fn test_context_accepts_workspace_manifest() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Cargo.toml", "[workspace]\nmembers = [\"risk_model\"]\n");
        assert!(BuildContext::from_source(dir.path(), "").is_ok());
    }

    #[test]
    fn test_render_dockerignore() {
        let dir = TempDir::new().unwrap();
        let rendered = render_dockerignore(dir.path()).unwrap();
        for pattern in default_ignore_patterns() {
            assert!(rendered.lines().any(|line| line == *pattern));
        }
    }
}
