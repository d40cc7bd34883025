use crate::output::schema::PipelineSpec;
use crate::stack::is_toolchain_package;
use anyhow::Result;

pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, spec: &PipelineSpec) -> Result<()>;
}

pub struct RequiredFieldsRule;

impl ValidationRule for RequiredFieldsRule {
    fn name(&self) -> &'static str {
        "RequiredFields"
    }

    fn validate(&self, spec: &PipelineSpec) -> Result<()> {
        if spec.version.is_empty() {
            anyhow::bail!("Version cannot be empty");
        }
        let artifact = &spec.metadata.artifact;
        if artifact.is_empty() {
            anyhow::bail!("Artifact name cannot be empty");
        }
        if artifact.contains('/') || artifact == "." || artifact == ".." {
            anyhow::bail!("Artifact name must be a plain file name, got '{}'", artifact);
        }
        if spec.builder.image.is_empty() {
            anyhow::bail!("Builder image cannot be empty");
        }
        if spec.production.image.is_empty() {
            anyhow::bail!("Production image cannot be empty");
        }
        if spec.builder.workdir.is_empty() {
            anyhow::bail!("Builder workdir cannot be empty");
        }
        if spec.production.artifact_dest.is_empty() {
            anyhow::bail!("Production artifact destination cannot be empty");
        }
        Ok(())
    }
}

pub struct ReleaseBuildRule;

impl ValidationRule for ReleaseBuildRule {
    fn name(&self) -> &'static str {
        "ReleaseBuild"
    }

    fn validate(&self, spec: &PipelineSpec) -> Result<()> {
        if spec.builder.commands.is_empty() {
            anyhow::bail!("Builder commands cannot be empty");
        }
        for (i, command) in spec.builder.commands.iter().enumerate() {
            if command.trim().is_empty() {
                anyhow::bail!("Builder command[{}] cannot be empty", i);
            }
            let is_cargo_build = command.split_whitespace().take(2).eq(["cargo", "build"]);
            if is_cargo_build && !builds_release_profile(command) {
                anyhow::bail!(
                    "Builder command[{}] must build in release mode: {}",
                    i,
                    command
                );
            }
        }
        Ok(())
    }
}

/// `--release`, `-r`, `--profile release` or `--profile=release`
fn builds_release_profile(command: &str) -> bool {
    let mut args = command.split_whitespace();
    while let Some(arg) = args.next() {
        match arg {
            "--release" | "-r" | "--profile=release" => return true,
            "--profile" if args.next() == Some("release") => return true,
            _ => {}
        }
    }
    false
}

pub struct PinnedImagesRule;

impl ValidationRule for PinnedImagesRule {
    fn name(&self) -> &'static str {
        "PinnedImages"
    }

    fn validate(&self, spec: &PipelineSpec) -> Result<()> {
        for (stage, image) in [
            ("builder", spec.builder_image()?),
            ("production", spec.production_image()?),
        ] {
            if !image.is_pinned() {
                anyhow::bail!(
                    "{} image '{}' must be pinned to an explicit tag or digest, not latest",
                    stage,
                    image
                );
            }
        }
        Ok(())
    }
}

pub struct NoToolchainInProductionRule;

impl ValidationRule for NoToolchainInProductionRule {
    fn name(&self) -> &'static str {
        "NoToolchainInProduction"
    }

    fn validate(&self, spec: &PipelineSpec) -> Result<()> {
        let image = spec.production_image()?;
        if image.is_toolchain_image() {
            anyhow::bail!(
                "Production image '{}' ships a compiler toolchain; use a minimal runtime base",
                image
            );
        }

        let toolchain: Vec<String> = spec
            .runtime_packages()?
            .into_iter()
            .filter(|p| is_toolchain_package(p))
            .collect();
        if !toolchain.is_empty() {
            anyhow::bail!(
                "Production stage installs build-only packages: {}",
                toolchain.join(", ")
            );
        }
        Ok(())
    }
}

pub struct FixedArtifactPathsRule;

impl ValidationRule for FixedArtifactPathsRule {
    fn name(&self) -> &'static str {
        "FixedArtifactPaths"
    }

    fn validate(&self, spec: &PipelineSpec) -> Result<()> {
        let artifact_path = spec.artifact_path();
        for (label, path) in [
            ("Builder workdir", spec.builder.workdir.as_str()),
            ("Artifact path", artifact_path.as_str()),
            ("Artifact destination", spec.production.artifact_dest.as_str()),
        ] {
            if !path.starts_with('/') {
                anyhow::bail!("{} must be absolute, got '{}'", label, path);
            }
            if path.contains(['*', '?', '[']) {
                anyhow::bail!("{} must name exactly one file, got '{}'", label, path);
            }
        }
        if spec.production.artifact_dest.ends_with('/') {
            anyhow::bail!(
                "Artifact destination must be a file path, got '{}'",
                spec.production.artifact_dest
            );
        }
        Ok(())
    }
}

pub struct EntrypointRunsArtifactRule;

impl ValidationRule for EntrypointRunsArtifactRule {
    fn name(&self) -> &'static str {
        "EntrypointRunsArtifact"
    }

    fn validate(&self, spec: &PipelineSpec) -> Result<()> {
        let entrypoint = spec.entrypoint();
        match entrypoint.first() {
            Some(program) if program == &spec.production.artifact_dest => Ok(()),
            Some(program) => anyhow::bail!(
                "Entrypoint must execute the artifact at {}, got '{}'",
                spec.production.artifact_dest,
                program
            ),
            None => anyhow::bail!("Entrypoint cannot be empty"),
        }
    }
}
