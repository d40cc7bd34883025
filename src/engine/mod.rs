//! Container engine abstraction
//!
//! The pipeline only talks to a `ContainerEngine`. `DockerEngine` drives a
//! Docker-compatible daemon through its HTTP API; `MockEngine` keeps images in
//! memory for tests.

pub mod docker;
pub mod mock;

pub use docker::{check_docker, DockerEngine};
pub use mock::MockEngine;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Lines of build output kept for failure reports
pub const LOG_TAIL_LINES: usize = 40;

#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Tag applied to the built image
    pub tag: String,
    /// Dockerfile stage to stop at
    pub target: String,
    /// Dockerfile path inside the context archive
    pub dockerfile: String,
    /// Gzip tar build context
    pub context: Vec<u8>,
    pub no_cache: bool,
    pub pull: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    /// Instruction that was executing when the build stopped, if known
    pub step: Option<String>,
    pub message: String,
    pub log_tail: Vec<String>,
}

impl BuildFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            step: None,
            message: message.into(),
            log_tail: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_log_tail(mut self, lines: Vec<String>) -> Self {
        self.log_tail = lines;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Built { image_id: String },
    Failed(BuildFailure),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSummary {
    pub id: String,
    pub size: u64,
}

/// A regular file read out of an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub contents: Vec<u8>,
    /// Permission bits from the image layer
    pub mode: u32,
}

impl ImageFile {
    pub fn new(contents: impl Into<Vec<u8>>, mode: u32) -> Self {
        Self {
            contents: contents.into(),
            mode,
        }
    }

    /// Executable by someone, so the kernel will exec it
    pub fn is_executable(&self) -> bool {
        self.mode & 0o111 != 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Arguments appended to the image entrypoint
    pub args: Vec<String>,
    /// Copy container output to this process's stdout/stderr as it arrives
    pub echo: bool,
    /// Keep the stopped container instead of removing it
    pub keep: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: i64,
    /// Last `LOG_TAIL_LINES` lines of container output
    pub log_tail: Vec<String>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn info(&self) -> Result<EngineInfo>;

    /// Builds one stage. Build errors reported by the engine come back as
    /// `BuildOutcome::Failed`; `Err` means the engine itself could not be used.
    async fn build(&self, request: BuildRequest) -> Result<BuildOutcome>;

    /// `None` when no image has the tag
    async fn inspect(&self, tag: &str) -> Result<Option<ImageSummary>>;

    /// Contents and mode of a regular file in the image, following symlinks.
    /// `None` when the path does not exist.
    async fn read_file(&self, image: &str, path: &str) -> Result<Option<ImageFile>>;

    async fn path_exists(&self, image: &str, path: &str) -> Result<bool>;

    /// Runs the image's entrypoint to completion
    async fn run(&self, image: &str, options: RunOptions) -> Result<RunOutput>;

    /// Moves `tag` to `new_tag`; afterwards `tag` no longer resolves
    async fn retag(&self, tag: &str, new_tag: &str) -> Result<()>;

    /// Missing images are not an error
    async fn remove_image(&self, tag: &str) -> Result<()>;
}

/// Keeps the last `LOG_TAIL_LINES` lines
pub(crate) fn push_tail(tail: &mut Vec<String>, line: String) {
    tail.push(line);
    if tail.len() > LOG_TAIL_LINES {
        let excess = tail.len() - LOG_TAIL_LINES;
        tail.drain(..excess);
    }
}
