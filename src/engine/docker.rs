use super::{
    push_tail, BuildFailure, BuildOutcome, BuildRequest, ContainerEngine, EngineInfo, ImageFile,
    ImageSummary, RunOptions, RunOutput,
};
use crate::error::PipelineError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, DownloadFromContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{BuildImageOptions, RemoveImageOptions, TagImageOptions};
use bollard::models::BuildInfo;
use bollard::Docker;
use futures_util::stream::{Stream, StreamExt};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

const DOCKER_SOCKET_PATH: &str = "/var/run/docker.sock";
const MAX_SYMLINK_HOPS: usize = 8;

/// Check if a Docker daemon is reachable
pub async fn check_docker() -> Result<bool> {
    if std::env::var_os("DOCKER_HOST").is_none() && !Path::new(DOCKER_SOCKET_PATH).exists() {
        debug!("Docker socket not found at {}", DOCKER_SOCKET_PATH);
        return Ok(false);
    }

    let docker = match Docker::connect_with_local_defaults() {
        Ok(d) => d,
        Err(e) => {
            debug!("Failed to connect to Docker: {}", e);
            return Ok(false);
        }
    };

    match docker.version().await {
        Ok(v) => {
            debug!(
                "Docker API version: {}",
                v.api_version.unwrap_or_else(|| "0.0".to_string())
            );
            Ok(true)
        }
        Err(e) => {
            debug!("Failed to get Docker version: {}", e);
            Ok(false)
        }
    }
}

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| PipelineError::Engine(format!("failed to connect to Docker: {}", e)))?;
        Ok(Self { docker })
    }

    async fn create_inert_container(&self, image: &str) -> Result<String> {
        let config = Config {
            image: Some(image.to_string()),
            ..Default::default()
        };
        let container = self
            .docker
            .create_container::<String, String>(None, config)
            .await
            .with_context(|| format!("Failed to create container from {}", image))?;
        Ok(container.id)
    }

    async fn remove_container(&self, id: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self.docker.remove_container(id, Some(options)).await {
            warn!(container = id, error = %e, "Failed to remove container");
        }
    }

    /// Tar archive of `path` as returned by the engine, `None` on 404
    async fn download(&self, container: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let stream = self.docker.download_from_container(container, Some(options));
        futures_util::pin_mut!(stream);

        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => archive.extend_from_slice(&bytes),
                Err(BollardError::DockerResponseServerError {
                    status_code: 404, ..
                }) => return Ok(None),
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to read {} from container", path));
                }
            }
        }
        Ok(Some(archive))
    }

    async fn read_file_in(&self, container: &str, path: &str) -> Result<Option<ImageFile>> {
        let mut current = path.to_string();
        for _ in 0..MAX_SYMLINK_HOPS {
            let Some(archive) = self.download(container, &current).await? else {
                return Ok(None);
            };
            match first_entry(&archive)? {
                ArchiveEntry::File(file) => return Ok(Some(file)),
                ArchiveEntry::Symlink(target) => {
                    debug!(from = %current, to = %target, "Following symlink");
                    current = resolve_link(&current, &target);
                }
                ArchiveEntry::Other => anyhow::bail!("{} is not a regular file", current),
            }
        }
        anyhow::bail!("Too many levels of symlinks resolving {}", path)
    }

    async fn wait_for_exit(&self, id: &str) -> Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let stream = self.docker.wait_container(id, Some(options));
        futures_util::pin_mut!(stream);

        let mut interrupted = false;
        loop {
            tokio::select! {
                item = stream.next() => {
                    return match item {
                        Some(Ok(response)) => Ok(response.status_code),
                        Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
                        Some(Err(e)) => Err(e).context("Failed waiting for container"),
                        None => anyhow::bail!("Container wait ended without an exit status"),
                    };
                }
                _ = tokio::signal::ctrl_c(), if !interrupted => {
                    interrupted = true;
                    info!(container = id, "Interrupt received, sending SIGTERM to container");
                    let options = KillContainerOptions { signal: "SIGTERM" };
                    if let Err(e) = self.docker.kill_container(id, Some(options)).await {
                        warn!(container = id, error = %e, "Failed to signal container");
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn info(&self) -> Result<EngineInfo> {
        let version = self
            .docker
            .version()
            .await
            .map_err(|e| PipelineError::Engine(format!("Docker is not reachable: {}", e)))?;
        Ok(EngineInfo {
            version: version.version.unwrap_or_default(),
            api_version: version.api_version.unwrap_or_default(),
            os: version.os.unwrap_or_default(),
            arch: version.arch.unwrap_or_default(),
        })
    }

    async fn build(&self, request: BuildRequest) -> Result<BuildOutcome> {
        info!(
            tag = %request.tag,
            target = %request.target,
            no_cache = request.no_cache,
            "Building image stage"
        );

        let options = BuildImageOptions {
            dockerfile: request.dockerfile.clone(),
            t: request.tag.clone(),
            target: request.target.clone(),
            rm: true,
            forcerm: true,
            pull: request.pull,
            nocache: request.no_cache,
            ..Default::default()
        };
        let stream = self
            .docker
            .build_image(options, None, Some(request.context.into()));
        futures_util::pin_mut!(stream);

        let outcome = tokio::time::timeout(request.timeout, consume_build_stream(stream))
            .await
            .map_err(|_| {
                PipelineError::Engine(format!(
                    "{} stage build timed out after {}s",
                    request.target,
                    request.timeout.as_secs()
                ))
            })??;

        match outcome {
            BuildOutcome::Built { image_id } if image_id.is_empty() => {
                let summary = self.inspect(&request.tag).await?.ok_or_else(|| {
                    PipelineError::Engine(format!(
                        "build finished but image {} is missing",
                        request.tag
                    ))
                })?;
                Ok(BuildOutcome::Built {
                    image_id: summary.id,
                })
            }
            other => Ok(other),
        }
    }

    async fn inspect(&self, tag: &str) -> Result<Option<ImageSummary>> {
        match self.docker.inspect_image(tag).await {
            Ok(image) => Ok(Some(ImageSummary {
                id: image.id.unwrap_or_default(),
                size: image.size.unwrap_or_default().max(0) as u64,
            })),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to inspect image {}", tag)),
        }
    }

    async fn read_file(&self, image: &str, path: &str) -> Result<Option<ImageFile>> {
        let container = self.create_inert_container(image).await?;
        let result = self.read_file_in(&container, path).await;
        self.remove_container(&container).await;
        result
    }

    async fn path_exists(&self, image: &str, path: &str) -> Result<bool> {
        let container = self.create_inert_container(image).await?;
        let result = self.download(&container, path).await;
        self.remove_container(&container).await;
        Ok(result?.is_some())
    }

    async fn run(&self, image: &str, options: RunOptions) -> Result<RunOutput> {
        let config = Config {
            image: Some(image.to_string()),
            cmd: if options.args.is_empty() {
                None
            } else {
                Some(options.args.clone())
            },
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container::<String, String>(None, config)
            .await
            .map_err(|e| PipelineError::Engine(format!("failed to create container: {}", e)))?;
        let id = container.id;

        if let Err(e) = self
            .docker
            .start_container(&id, None::<StartContainerOptions<String>>)
            .await
        {
            self.remove_container(&id).await;
            return Err(PipelineError::Engine(format!("failed to start container: {}", e)).into());
        }
        info!(container = %id, image, "Container started");

        let logs = tokio::spawn(collect_logs(self.docker.clone(), id.clone(), options.echo));
        let exit_code = self.wait_for_exit(&id).await;
        let log_tail = match logs.await {
            Ok(Ok(tail)) => tail,
            Ok(Err(e)) => {
                warn!(container = %id, error = %e, "Failed to collect container logs");
                Vec::new()
            }
            Err(e) => {
                warn!(container = %id, error = %e, "Log collection task failed");
                Vec::new()
            }
        };

        if !options.keep {
            self.remove_container(&id).await;
        }

        let exit_code = exit_code?;
        info!(container = %id, exit_code, "Container exited");
        Ok(RunOutput {
            exit_code,
            log_tail,
        })
    }

    async fn retag(&self, tag: &str, new_tag: &str) -> Result<()> {
        let (repo, version) = split_tag(new_tag);
        let options = TagImageOptions {
            repo: repo.to_string(),
            tag: version.to_string(),
        };
        self.docker
            .tag_image(tag, Some(options))
            .await
            .with_context(|| format!("Failed to tag {} as {}", tag, new_tag))?;

        // Without force, removing a tag of a multiply-tagged image only untags it
        let options = RemoveImageOptions {
            force: false,
            noprune: true,
        };
        self.docker
            .remove_image(tag, Some(options), None)
            .await
            .with_context(|| format!("Failed to untag {}", tag))?;
        debug!(from = tag, to = new_tag, "Retagged image");
        Ok(())
    }

    async fn remove_image(&self, tag: &str) -> Result<()> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_image(tag, Some(options), None).await {
            Ok(_) => {
                debug!(tag, "Removed image");
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove image {}", tag)),
        }
    }
}

async fn consume_build_stream<S>(mut stream: S) -> Result<BuildOutcome>
where
    S: Stream<Item = Result<BuildInfo, BollardError>> + Unpin,
{
    let mut tail = Vec::new();
    let mut step: Option<String> = None;
    let mut image_id = String::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(info) => {
                if let Some(text) = info.stream {
                    for line in text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
                        if let Some(instruction) = parse_step(line) {
                            step = Some(instruction);
                        }
                        debug!(target: "riskbox::build", "{}", line);
                        push_tail(&mut tail, line.to_string());
                    }
                }

                let error = info
                    .error
                    .or_else(|| info.error_detail.and_then(|detail| detail.message));
                if let Some(message) = error {
                    return Ok(BuildOutcome::Failed(failure(message, step, tail)));
                }

                if let Some(id) = info.aux.and_then(|aux| aux.id) {
                    image_id = id;
                }
            }
            Err(BollardError::DockerStreamError { error }) => {
                return Ok(BuildOutcome::Failed(failure(error, step, tail)));
            }
            Err(e) => {
                return Err(PipelineError::Engine(format!("build stream failed: {}", e)).into());
            }
        }
    }

    Ok(BuildOutcome::Built { image_id })
}

fn failure(message: String, step: Option<String>, tail: Vec<String>) -> BuildFailure {
    let failure = BuildFailure::new(message.trim()).with_log_tail(tail);
    match step {
        Some(step) => failure.with_step(step),
        None => failure,
    }
}

/// `Step 4/12 : RUN cargo build --release` -> `RUN cargo build --release`
fn parse_step(line: &str) -> Option<String> {
    let rest = line.strip_prefix("Step ")?;
    let (_, instruction) = rest.split_once(" : ")?;
    Some(instruction.trim().to_string())
}

/// `registry:5000/risk_model:1.0` -> (`registry:5000/risk_model`, `1.0`)
fn split_tag(reference: &str) -> (&str, &str) {
    let name_start = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[name_start..].rfind(':') {
        Some(i) => (&reference[..name_start + i], &reference[name_start + i + 1..]),
        None => (reference, "latest"),
    }
}

enum ArchiveEntry {
    File(ImageFile),
    Symlink(String),
    Other,
}

fn first_entry(archive: &[u8]) -> Result<ArchiveEntry> {
    let mut archive = tar::Archive::new(archive);
    let mut entries = archive.entries().context("Failed to read archive")?;
    let Some(entry) = entries.next() else {
        anyhow::bail!("Engine returned an empty archive");
    };
    let mut entry = entry.context("Failed to read archive entry")?;

    let entry_type = entry.header().entry_type();
    if entry_type.is_file() {
        let mode = entry.header().mode().context("Failed to read file mode")?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .context("Failed to read file from archive")?;
        Ok(ArchiveEntry::File(ImageFile::new(data, mode)))
    } else if entry_type.is_symlink() {
        let target = entry
            .link_name()
            .context("Failed to read link target")?
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(ArchiveEntry::Symlink(target))
    } else {
        Ok(ArchiveEntry::Other)
    }
}

/// Absolute path a symlink at `link` pointing to `target` resolves to
fn resolve_link(link: &str, target: &str) -> String {
    let joined = if target.starts_with('/') {
        PathBuf::from(target)
    } else {
        Path::new(link)
            .parent()
            .unwrap_or_else(|| Path::new("/"))
            .join(target)
    };

    let mut normalized = PathBuf::from("/");
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    normalized.to_string_lossy().into_owned()
}

/// Follows the container's output until it exits, keeping only the last lines
async fn collect_logs(docker: Docker, id: String, echo: bool) -> Result<Vec<String>> {
    let options = LogsOptions::<String> {
        follow: true,
        stdout: true,
        stderr: true,
        ..Default::default()
    };
    let stream = docker.logs(&id, Some(options));
    futures_util::pin_mut!(stream);

    let mut tail = Vec::new();
    while let Some(item) = stream.next().await {
        let item = item.context("Failed to read container logs")?;
        if echo {
            match &item {
                LogOutput::StdErr { message } => {
                    let mut stderr = std::io::stderr();
                    stderr.write_all(message)?;
                    stderr.flush()?;
                }
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    let mut stdout = std::io::stdout();
                    stdout.write_all(message)?;
                    stdout.flush()?;
                }
                LogOutput::StdIn { .. } => {}
            }
        }
        append_output(&mut tail, &item);
    }
    Ok(tail)
}

fn append_output(tail: &mut Vec<String>, item: &LogOutput) {
    for line in item.to_string().lines() {
        push_tail(tail, line.to_string());
    }
}
