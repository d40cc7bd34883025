use crate::error::PipelineError;
use crate::pipeline::context::{ArtifactInfo, PipelineContext};
use crate::pipeline::phase_trait::WorkflowPhase;
use crate::pipeline::stage::read_artifact;
use crate::stack::{TOOLCHAIN_BINARIES, TRUST_STORE_PATH};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

pub const CHECK_ARTIFACT: &str = "artifact_transferred";
pub const CHECK_EXECUTABLE: &str = "artifact_executable";
pub const CHECK_NO_TOOLCHAIN: &str = "no_toolchain";
pub const CHECK_NO_SOURCE: &str = "no_source_tree";
pub const CHECK_TRUST_STORE: &str = "trust_store";
pub const CHECK_SIZE: &str = "smaller_than_builder";

/// Inspects both stage images and checks the production image contract
///
/// Every check runs even after one fails, so the error lists all of them.
pub struct VerifyPhase;

#[async_trait]
impl WorkflowPhase for VerifyPhase {
    fn name(&self) -> &'static str {
        "VerifyPhase"
    }

    async fn execute(&self, context: &mut PipelineContext) -> Result<()> {
        let (builder, production) = match (&context.builder, &context.production) {
            (Some(b), Some(p)) => (b.clone(), p.clone()),
            _ => {
                return Err(PipelineError::Engine(
                    "verification requires both stage images".to_string(),
                )
                .into())
            }
        };
        let engine = context.engine.clone();
        let artifact_path = context.spec.artifact_path();
        let artifact_dest = context.spec.production.artifact_dest.clone();

        let (digest, size) = read_artifact(engine.as_ref(), &builder.tag, &artifact_path).await?;

        match engine.read_file(&production.tag, &artifact_dest).await? {
            Some(shipped) => {
                let shipped_digest = crate::image::Digest::sha256(&shipped.contents);
                if shipped.contents.is_empty() {
                    context.record_check(
                        CHECK_ARTIFACT,
                        false,
                        format!("{} is empty", artifact_dest),
                    );
                } else if shipped_digest == digest {
                    context.record_check(
                        CHECK_ARTIFACT,
                        true,
                        format!("{} ({} bytes, {})", artifact_dest, size, digest),
                    );
                } else {
                    context.record_check(
                        CHECK_ARTIFACT,
                        false,
                        format!(
                            "{} has digest {}, builder produced {}",
                            artifact_dest, shipped_digest, digest
                        ),
                    );
                }
                context.record_check(
                    CHECK_EXECUTABLE,
                    shipped.is_executable(),
                    format!("{} mode {:o}", artifact_dest, shipped.mode & 0o7777),
                );
            }
            None => context.record_check(
                CHECK_ARTIFACT,
                false,
                format!("{} not found in {}", artifact_dest, production.tag),
            ),
        }

        let mut found_tools = Vec::new();
        for binary in TOOLCHAIN_BINARIES {
            if engine.path_exists(&production.tag, binary).await? {
                found_tools.push(*binary);
            }
        }
        if found_tools.is_empty() {
            context.record_check(CHECK_NO_TOOLCHAIN, true, "no compiler or build tool found");
        } else {
            context.record_check(
                CHECK_NO_TOOLCHAIN,
                false,
                format!("found {}", found_tools.join(", ")),
            );
        }

        let workdir = context.spec.builder.workdir.clone();
        if engine.path_exists(&production.tag, &workdir).await? {
            context.record_check(CHECK_NO_SOURCE, false, format!("{} present", workdir));
        } else {
            context.record_check(CHECK_NO_SOURCE, true, format!("{} absent", workdir));
        }

        if context.spec.production.requires_tls {
            let present = engine.path_exists(&production.tag, TRUST_STORE_PATH).await?;
            let detail = if present {
                format!("{} present", TRUST_STORE_PATH)
            } else {
                format!("{} missing", TRUST_STORE_PATH)
            };
            context.record_check(CHECK_TRUST_STORE, present, detail);
        }

        context.record_check(
            CHECK_SIZE,
            production.size < builder.size,
            format!("{} bytes vs {} bytes", production.size, builder.size),
        );

        context.artifact = Some(ArtifactInfo {
            path: artifact_path,
            dest: artifact_dest,
            digest,
            size,
        });

        let failed: Vec<String> = context
            .failed_checks()
            .iter()
            .map(|c| format!("{}: {}", c.name, c.detail))
            .collect();
        if !failed.is_empty() {
            warn!(failed = failed.len(), "Production image failed verification");
            return Err(PipelineError::Verification(failed.join("; ")).into());
        }

        info!(checks = context.checks.len(), "Production image verified");
        Ok(())
    }
}
