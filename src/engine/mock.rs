//! In-memory `ContainerEngine` for tests
//!
//! Stages are keyed by build target. A successful build of a target tags an
//! image whose filesystem is the target's configured file set.

use super::{
    BuildFailure, BuildOutcome, BuildRequest, ContainerEngine, EngineInfo, ImageFile,
    ImageSummary, RunOptions, RunOutput,
};
use crate::image::Digest;
use crate::output::schema::{PipelineSpec, BUILDER_STAGE, PRODUCTION_STAGE};
use crate::stack::{TOOLCHAIN_BINARIES, TRUST_STORE_PATH};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

const BUILDER_SIZE: u64 = 1_800_000_000;
const PRODUCTION_SIZE: u64 = 95_000_000;
const ARTIFACT_BYTES: &[u8] = b"\x7fELF\x02\x01\x01risk_model";
const EXECUTABLE: u32 = 0o755;
const REGULAR: u32 = 0o644;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub tag: String,
    pub target: String,
    pub no_cache: bool,
}

#[derive(Debug, Clone, Default)]
struct StageImage {
    files: BTreeMap<String, ImageFile>,
    size: u64,
}

#[derive(Debug, Default)]
struct MockState {
    stages: HashMap<String, StageImage>,
    failures: HashMap<String, BuildFailure>,
    images: HashMap<String, (String, StageImage)>,
    builds: Vec<BuildRecord>,
    removed: Vec<String>,
    runs: Vec<(String, Vec<String>)>,
    run_exit_code: i64,
    unstable_artifact: bool,
    artifact_path: String,
}

pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    /// Engine whose builds of `spec` succeed and produce a well-formed image pair
    pub fn for_spec(spec: &PipelineSpec) -> Self {
        let artifact_path = spec.artifact_path();

        let mut builder = StageImage {
            size: BUILDER_SIZE,
            ..Default::default()
        };
        builder.files.insert(
            artifact_path.clone(),
            ImageFile::new(ARTIFACT_BYTES, EXECUTABLE),
        );
        builder.files.insert(
            format!("{}/Cargo.toml", spec.builder.workdir),
            ImageFile::new(b"[package]".to_vec(), REGULAR),
        );
        for binary in TOOLCHAIN_BINARIES {
            builder
                .files
                .insert(binary.to_string(), ImageFile::new(b"tool".to_vec(), EXECUTABLE));
        }

        let mut production = StageImage {
            size: PRODUCTION_SIZE,
            ..Default::default()
        };
        production.files.insert(
            spec.production.artifact_dest.clone(),
            ImageFile::new(ARTIFACT_BYTES, EXECUTABLE),
        );
        if spec.production.requires_tls {
            production.files.insert(
                TRUST_STORE_PATH.to_string(),
                ImageFile::new(b"-----BEGIN CERTIFICATE-----".to_vec(), REGULAR),
            );
        }

        let mut stages = HashMap::new();
        stages.insert(BUILDER_STAGE.to_string(), builder);
        stages.insert(PRODUCTION_STAGE.to_string(), production);

        Self {
            state: Mutex::new(MockState {
                stages,
                artifact_path,
                ..Default::default()
            }),
        }
    }

    pub fn with_failure(self, target: &str, failure: BuildFailure) -> Self {
        self.lock().failures.insert(target.to_string(), failure);
        self
    }

    /// Adds or replaces a file; a replaced file keeps its mode
    pub fn with_file(self, target: &str, path: &str, contents: &[u8]) -> Self {
        {
            let mut state = self.lock();
            let files = &mut state.stages.entry(target.to_string()).or_default().files;
            let mode = files.get(path).map_or(REGULAR, |f| f.mode);
            files.insert(path.to_string(), ImageFile::new(contents, mode));
        }
        self
    }

    pub fn with_file_mode(self, target: &str, path: &str, mode: u32) -> Self {
        if let Some(file) = self
            .lock()
            .stages
            .get_mut(target)
            .and_then(|stage| stage.files.get_mut(path))
        {
            file.mode = mode;
        }
        self
    }

    pub fn without_file(self, target: &str, path: &str) -> Self {
        if let Some(stage) = self.lock().stages.get_mut(target) {
            stage.files.remove(path);
        }
        self
    }

    pub fn with_size(self, target: &str, size: u64) -> Self {
        self.lock().stages.entry(target.to_string()).or_default().size = size;
        self
    }

    pub fn with_run_exit_code(self, code: i64) -> Self {
        self.lock().run_exit_code = code;
        self
    }

    /// Every builder build produces different artifact bytes
    pub fn with_unstable_artifact(self) -> Self {
        self.lock().unstable_artifact = true;
        self
    }

    pub fn builds(&self) -> Vec<BuildRecord> {
        self.lock().builds.clone()
    }

    pub fn removed_images(&self) -> Vec<String> {
        self.lock().removed.clone()
    }

    pub fn runs(&self) -> Vec<(String, Vec<String>)> {
        self.lock().runs.clone()
    }

    pub fn has_image(&self, tag: &str) -> bool {
        self.lock().images.contains_key(tag)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn info(&self) -> Result<EngineInfo> {
        Ok(EngineInfo {
            version: "mock".to_string(),
            api_version: "1.45".to_string(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
        })
    }

    async fn build(&self, request: BuildRequest) -> Result<BuildOutcome> {
        let mut state = self.lock();
        state.builds.push(BuildRecord {
            tag: request.tag.clone(),
            target: request.target.clone(),
            no_cache: request.no_cache,
        });

        if let Some(failure) = state.failures.get(&request.target) {
            return Ok(BuildOutcome::Failed(failure.clone()));
        }

        let mut image = state
            .stages
            .get(&request.target)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown build target {}", request.target))?;

        if state.unstable_artifact && request.target == BUILDER_STAGE {
            let nonce = state.builds.len().to_string();
            let artifact_path = state.artifact_path.clone();
            if let Some(artifact) = image.files.get_mut(&artifact_path) {
                artifact.contents.extend_from_slice(nonce.as_bytes());
            }
        }

        let mut fingerprint = request.target.clone().into_bytes();
        for (path, file) in &image.files {
            fingerprint.extend_from_slice(path.as_bytes());
            fingerprint.extend_from_slice(&file.contents);
        }
        let image_id = Digest::sha256(&fingerprint).to_string();

        state
            .images
            .insert(request.tag.clone(), (image_id.clone(), image));
        Ok(BuildOutcome::Built { image_id })
    }

    async fn inspect(&self, tag: &str) -> Result<Option<ImageSummary>> {
        Ok(self.lock().images.get(tag).map(|(id, image)| ImageSummary {
            id: id.clone(),
            size: image.size,
        }))
    }

    async fn read_file(&self, image: &str, path: &str) -> Result<Option<ImageFile>> {
        let state = self.lock();
        let (_, stage) = state
            .images
            .get(image)
            .ok_or_else(|| anyhow::anyhow!("no such image: {}", image))?;
        Ok(stage.files.get(path).cloned())
    }

    async fn path_exists(&self, image: &str, path: &str) -> Result<bool> {
        let state = self.lock();
        let (_, stage) = state
            .images
            .get(image)
            .ok_or_else(|| anyhow::anyhow!("no such image: {}", image))?;
        let dir_prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(stage.files.contains_key(path)
            || stage.files.keys().any(|p| p.starts_with(&dir_prefix)))
    }

    async fn run(&self, image: &str, options: RunOptions) -> Result<RunOutput> {
        let mut state = self.lock();
        if !state.images.contains_key(image) {
            anyhow::bail!("no such image: {}", image);
        }
        state.runs.push((image.to_string(), options.args));
        Ok(RunOutput {
            exit_code: state.run_exit_code,
            log_tail: Vec::new(),
        })
    }

    async fn retag(&self, tag: &str, new_tag: &str) -> Result<()> {
        let mut state = self.lock();
        let image = state
            .images
            .remove(tag)
            .ok_or_else(|| anyhow::anyhow!("no such image: {}", tag))?;
        state.images.insert(new_tag.to_string(), image);
        Ok(())
    }

    async fn remove_image(&self, tag: &str) -> Result<()> {
        let mut state = self.lock();
        state.images.remove(tag);
        state.removed.push(tag.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(tag: &str, target: &str) -> BuildRequest {
        BuildRequest {
            tag: tag.to_string(),
            target: target.to_string(),
            dockerfile: ".riskbox.Dockerfile".to_string(),
            context: Vec::new(),
            no_cache: false,
            pull: false,
            timeout: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_mock_builds_and_inspects() {
        let engine = MockEngine::for_spec(&PipelineSpec::default());
        let outcome = engine
            .build(request("risk_model:t", PRODUCTION_STAGE))
            .await
            .unwrap();
        assert!(matches!(outcome, BuildOutcome::Built { .. }));

        let summary = engine.inspect("risk_model:t").await.unwrap().unwrap();
        assert_eq!(summary.size, PRODUCTION_SIZE);
        assert!(engine
            .path_exists("risk_model:t", "/usr/local/bin")
            .await
            .unwrap());
        assert!(!engine
            .path_exists("risk_model:t", "/usr/src/risk_model")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let engine = MockEngine::for_spec(&PipelineSpec::default())
            .with_failure(BUILDER_STAGE, BuildFailure::new("boom"));
        let outcome = engine
            .build(request("risk_model:t-builder", BUILDER_STAGE))
            .await
            .unwrap();
        assert!(matches!(outcome, BuildOutcome::Failed(_)));
        assert!(!engine.has_image("risk_model:t-builder"));
    }

    #[tokio::test]
    async fn test_mock_unstable_artifact() {
        let spec = PipelineSpec::default();
        let engine = MockEngine::for_spec(&spec).with_unstable_artifact();

        engine.build(request("a", BUILDER_STAGE)).await.unwrap();
        engine.build(request("b", BUILDER_STAGE)).await.unwrap();
        let first = engine.read_file("a", &spec.artifact_path()).await.unwrap();
        let second = engine.read_file("b", &spec.artifact_path()).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_mock_run_reports_exit_code() {
        let engine = MockEngine::for_spec(&PipelineSpec::default()).with_run_exit_code(42);
        engine
            .build(request("risk_model:t", PRODUCTION_STAGE))
            .await
            .unwrap();

        let output = engine
            .run(
                "risk_model:t",
                RunOptions {
                    args: vec!["--dry-run".to_string()],
                    echo: false,
                    keep: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(output.exit_code, 42);
        assert!(engine.run("missing:tag", RunOptions::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_file_modes_and_retag() {
        let spec = PipelineSpec::default();
        let dest = spec.production.artifact_dest.clone();
        let engine = MockEngine::for_spec(&spec).with_file_mode(PRODUCTION_STAGE, &dest, 0o644);
        engine
            .build(request("risk_model:t", PRODUCTION_STAGE))
            .await
            .unwrap();

        let artifact = engine.read_file("risk_model:t", &dest).await.unwrap().unwrap();
        assert!(!artifact.is_executable());

        engine.retag("risk_model:t", "risk_model:t-rejected").await.unwrap();
        assert!(!engine.has_image("risk_model:t"));
        assert!(engine.has_image("risk_model:t-rejected"));
        assert!(engine.retag("risk_model:t", "risk_model:other").await.is_err());
    }
}
