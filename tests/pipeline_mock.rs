//! Pipeline integration tests against the in-memory engine
//!
//! These run the full phase sequence (validate, context, builder, production,
//! verify) without Docker.

use riskbox::engine::{BuildFailure, MockEngine};
use riskbox::output::schema::{BUILDER_STAGE, PRODUCTION_STAGE};
use riskbox::pipeline::{verify_reproducible, PipelineConfig, PipelineContext, PipelineOrchestrator};
use riskbox::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use riskbox::{PipelineError, PipelineSpec};
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use yare::parameterized;

const TAG: &str = "risk_model:1.4.2";
const BUILDER_TAG: &str = "risk_model:1.4.2-builder";
const REJECTED_TAG: &str = "risk_model:1.4.2-rejected";

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressHandler for RecordingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn create_source() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("Cargo.toml"),
        "[package]\nname = \"risk_model\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
    )
    .unwrap();
    fs::write(dir.path().join("Cargo.lock"), "version = 3\n").unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
    dir
}

fn context(engine: Arc<MockEngine>, source: &TempDir, config: PipelineConfig) -> PipelineContext {
    PipelineContext::new(
        engine,
        PipelineSpec::default(),
        source.path().to_path_buf(),
        config,
    )
}

fn config() -> PipelineConfig {
    PipelineConfig::default().with_tag(TAG)
}

#[tokio::test]
async fn test_successful_build() {
    let source = create_source();
    let engine = Arc::new(MockEngine::for_spec(&PipelineSpec::default()));
    let progress = Arc::new(RecordingHandler::default());
    let mut ctx = context(engine.clone(), &source, config()).with_progress(progress.clone());

    let report = PipelineOrchestrator::new().execute(&mut ctx).await.unwrap();

    assert_eq!(report.tag, TAG);
    assert_eq!(report.builder.tag, BUILDER_TAG);
    assert!(report.checks.iter().all(|c| c.passed));
    assert!(report.size_reduction > 0.9);
    assert_eq!(report.timings.len(), 5);
    assert_eq!(report.artifact.dest, "/usr/local/bin/risk_model");

    let targets: Vec<String> = engine.builds().into_iter().map(|b| b.target).collect();
    assert_eq!(targets, vec![BUILDER_STAGE, PRODUCTION_STAGE]);
    assert!(engine.has_image(TAG));
    assert!(!engine.has_image(BUILDER_TAG));
    assert_eq!(engine.removed_images(), vec![BUILDER_TAG.to_string()]);

    let events = progress.events.lock().unwrap();
    assert!(matches!(events.first(), Some(ProgressEvent::Started { .. })));
    assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));
}

#[tokio::test]
async fn test_keep_builder() {
    let source = create_source();
    let engine = Arc::new(MockEngine::for_spec(&PipelineSpec::default()));
    let mut ctx = context(engine.clone(), &source, config().with_keep_builder(true));

    let report = PipelineOrchestrator::new().execute(&mut ctx).await.unwrap();

    assert!(report.builder_kept);
    assert!(engine.has_image(BUILDER_TAG));
    assert!(engine.removed_images().is_empty());
}

#[tokio::test]
async fn test_report_serializes() {
    let source = create_source();
    let engine = Arc::new(MockEngine::for_spec(&PipelineSpec::default()));
    let mut ctx = context(engine, &source, config());

    let report = PipelineOrchestrator::new().execute(&mut ctx).await.unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["tag"], TAG);
    assert!(json["artifact"]["digest"].as_str().unwrap().starts_with("sha256:"));
    assert!(json["context_hash"].as_str().unwrap().starts_with("sha256:"));
    assert!(report.to_human().contains("Checks:"));
}

#[parameterized(
    builder_install = { BUILDER_STAGE, "RUN apt-get update     && apt-get install -y --no-install-recommends libssl-dev", 2 },
    compile = { BUILDER_STAGE, "RUN cargo build --release", 3 },
    artifact_check = { BUILDER_STAGE, "RUN test -f /usr/src/risk_model/target/release/risk_model && test -s /usr/src/risk_model/target/release/risk_model && test -x /usr/src/risk_model/target/release/risk_model || { echo \"riskbox: artifact missing or not executable at /usr/src/risk_model/target/release/risk_model\" >&2; exit 1; }", 4 },
    runtime_install = { PRODUCTION_STAGE, "RUN apt-get update     && apt-get install -y --no-install-recommends ca-certificates", 2 },
    artifact_copy = { PRODUCTION_STAGE, "COPY --from=builder /usr/src/risk_model/target/release/risk_model /usr/local/bin/risk_model", 4 },
)]
fn test_stage_failure_exit_codes(stage: &str, step: &str, exit_code: i32) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    runtime.block_on(async {
        let source = create_source();
        let engine = Arc::new(
            MockEngine::for_spec(&PipelineSpec::default())
                .with_failure(stage, BuildFailure::new("returned a non-zero code").with_step(step)),
        );
        let mut ctx = context(engine.clone(), &source, config());

        let err = PipelineOrchestrator::new().execute(&mut ctx).await.unwrap_err();

        assert_eq!(PipelineError::find(&err).unwrap().exit_code(), exit_code);
        assert!(!engine.has_image(TAG));
        assert!(ctx.production.is_none());
    });
}

#[tokio::test]
async fn test_compile_failure_skips_production_build() {
    let source = create_source();
    let engine = Arc::new(MockEngine::for_spec(&PipelineSpec::default()).with_failure(
        BUILDER_STAGE,
        BuildFailure::new("returned a non-zero code: 101")
            .with_step("RUN cargo build --release")
            .with_log_tail(vec!["error: could not compile `risk_model`".to_string()]),
    ));
    let progress = Arc::new(RecordingHandler::default());
    let mut ctx = context(engine.clone(), &source, config()).with_progress(progress.clone());

    let err = PipelineOrchestrator::new().execute(&mut ctx).await.unwrap_err();

    assert_eq!(err.to_string(), "Phase BuilderPhase failed");
    assert!(format!("{:#}", err).contains("could not compile"));
    assert_eq!(engine.builds().len(), 1);
    assert!(matches!(
        progress.events.lock().unwrap().last(),
        Some(ProgressEvent::Failed { .. })
    ));
}

#[tokio::test]
async fn test_toolchain_in_production_fails_verification() {
    let source = create_source();
    let engine = Arc::new(MockEngine::for_spec(&PipelineSpec::default()).with_file(
        PRODUCTION_STAGE,
        "/usr/bin/gcc",
        b"gcc",
    ));
    let mut ctx = context(engine.clone(), &source, config());

    let err = PipelineOrchestrator::new().execute(&mut ctx).await.unwrap_err();

    assert_eq!(PipelineError::find(&err).unwrap().exit_code(), 5);
    assert!(format!("{:#}", err).contains("/usr/bin/gcc"));
    // The rejected image stays for inspection but is no longer runnable as the release
    assert!(!engine.has_image(TAG));
    assert!(engine.has_image(REJECTED_TAG));
    assert_eq!(ctx.production.as_ref().unwrap().tag, REJECTED_TAG);
    assert!(engine.has_image(BUILDER_TAG));
    assert!(engine.removed_images().is_empty());
}

#[tokio::test]
async fn test_non_executable_artifact_rejected() {
    let source = create_source();
    let spec = PipelineSpec::default();
    let engine = Arc::new(MockEngine::for_spec(&spec).with_file_mode(
        PRODUCTION_STAGE,
        &spec.production.artifact_dest,
        0o644,
    ));
    let mut ctx = context(engine.clone(), &source, config());

    let err = PipelineOrchestrator::new().execute(&mut ctx).await.unwrap_err();

    assert_eq!(PipelineError::find(&err).unwrap().exit_code(), 5);
    assert!(format!("{:#}", err).contains("artifact_executable"));
    assert!(!engine.has_image(TAG));
}

#[tokio::test]
async fn test_build_failure_leaves_no_rejected_image() {
    let source = create_source();
    let engine = Arc::new(MockEngine::for_spec(&PipelineSpec::default()).with_failure(
        PRODUCTION_STAGE,
        BuildFailure::new("returned a non-zero code: 100")
            .with_step("RUN apt-get update && apt-get install -y ca-certificates"),
    ));
    let mut ctx = context(engine.clone(), &source, config());

    PipelineOrchestrator::new().execute(&mut ctx).await.unwrap_err();

    assert!(!engine.has_image(REJECTED_TAG));
    assert!(ctx.production.is_none());
}

#[tokio::test]
async fn test_unpinned_image_rejected_before_build() {
    let source = create_source();
    let mut spec = PipelineSpec::default();
    spec.production.image = "debian:latest".to_string();
    let engine = Arc::new(MockEngine::for_spec(&spec));
    let mut ctx = PipelineContext::new(engine.clone(), spec, source.path().to_path_buf(), config());

    let err = PipelineOrchestrator::new().execute(&mut ctx).await.unwrap_err();

    assert_eq!(PipelineError::find(&err).unwrap().exit_code(), 1);
    assert!(engine.builds().is_empty());
}

#[tokio::test]
async fn test_source_without_manifest_rejected() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("main.rs"), "fn main() {}\n").unwrap();
    let engine = Arc::new(MockEngine::for_spec(&PipelineSpec::default()));
    let mut ctx = context(engine.clone(), &source, config());

    let err = PipelineOrchestrator::new().execute(&mut ctx).await.unwrap_err();

    assert_eq!(err.to_string(), "Phase ContextPhase failed");
    assert!(matches!(
        PipelineError::find(&err),
        Some(PipelineError::Context(_))
    ));
    assert!(engine.builds().is_empty());
}

#[tokio::test]
async fn test_reproducible_rebuild() {
    let source = create_source();
    let spec = PipelineSpec::default();

    let stable = Arc::new(MockEngine::for_spec(&spec));
    let report = verify_reproducible(stable, &spec, source.path(), &config(), &NoOpHandler)
        .await
        .unwrap();
    assert!(report.identical);

    let unstable = Arc::new(MockEngine::for_spec(&spec).with_unstable_artifact());
    let report = verify_reproducible(unstable, &spec, source.path(), &config(), &NoOpHandler)
        .await
        .unwrap();
    assert!(!report.identical);
    assert!(report.ensure_identical().is_err());
}
