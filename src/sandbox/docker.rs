use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions,
    ListContainersOptions, LogOutput, RemoveContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::service::ContainerStateStatusEnum;
use bollard::Docker;
use chrono::Utc;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    CommandOutput, SandboxClient, SandboxError, SandboxHandle, SandboxRequest, MANAGED_LABEL,
};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Sandbox backend that runs each sandbox as a local Docker container.
pub(crate) struct DockerSandboxClient {
    docker: Docker,
    ready_timeout: Duration,
}

impl DockerSandboxClient {
    /// Connects to the local Docker daemon and checks that it responds.
    pub async fn connect(ready_timeout: Duration) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            SandboxError::unavailable(format!("Failed to connect to Docker: {e}"))
        })?;

        docker.ping().await.map_err(|e| {
            SandboxError::unavailable(format!("Cannot ping Docker daemon. Is Docker running? {e}"))
        })?;

        Ok(Self {
            docker,
            ready_timeout,
        })
    }

    /// Removes sandboxes left behind by earlier runs.
    pub async fn cleanup_orphaned(&self) -> Result<u32, SandboxError> {
        let filters = HashMap::from([(
            "label".to_string(),
            vec![format!("{MANAGED_LABEL}=true")],
        )]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        let mut removed = 0;
        for container in containers {
            let Some(id) = container.id else { continue };
            match self.delete(&id).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove orphaned sandbox {}: {}", id, e),
            }
        }

        Ok(removed)
    }

    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!("Pulling sandbox image {}", image);
        let mut stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(progress) = stream.next().await {
            let progress = progress?;
            if let Some(status) = progress.status {
                debug!("pull {}: {}", image, status);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl SandboxClient for DockerSandboxClient {
    async fn create(&self, request: &SandboxRequest) -> Result<SandboxHandle, SandboxError> {
        self.ensure_image(&request.image).await?;

        let name = format!(
            "swe-grep-{}",
            uuid::Uuid::new_v4().simple().to_string().get(..12).unwrap_or_default()
        );

        let memory = parse_memory_limit(&request.memory)?;
        let cpus = request.cpus.parse::<f64>().unwrap_or(2.0);
        #[allow(clippy::cast_possible_truncation)]
        let nano_cpus = (cpus * 1_000_000_000.0) as i64;

        let config = ContainerConfig {
            image: Some(request.image.clone()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            working_dir: Some(request.workdir.clone()),
            labels: Some(HashMap::from([(
                MANAGED_LABEL.to_string(),
                "true".to_string(),
            )])),
            host_config: Some(bollard::service::HostConfig {
                memory: Some(memory),
                nano_cpus: Some(nano_cpus),
                ..Default::default()
            }),
            ..Default::default()
        };

        debug!("Creating sandbox container: {}", name);
        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await?;

        let start = async {
            self.docker
                .start_container::<String>(&name, None)
                .await
                .map_err(SandboxError::from)
        };
        start_or_discard(&name, start, self.delete(&name)).await?;

        Ok(SandboxHandle {
            id: name,
            created_at: Utc::now(),
        })
    }

    async fn wait_for_creation(&self, id: &str) -> Result<(), SandboxError> {
        let poll = async {
            loop {
                let inspect = self
                    .docker
                    .inspect_container(id, None::<InspectContainerOptions>)
                    .await?;

                if let Some(state) = inspect.state {
                    if state.running == Some(true) {
                        return Ok::<(), SandboxError>(());
                    }
                    if let Some(
                        status @ (ContainerStateStatusEnum::EXITED
                        | ContainerStateStatusEnum::DEAD
                        | ContainerStateStatusEnum::REMOVING),
                    ) = state.status
                    {
                        return Err(SandboxError::unhealthy(format!(
                            "container {id} is {status:?}"
                        )));
                    }
                }

                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(self.ready_timeout, poll)
            .await
            .map_err(|_| SandboxError::timeout(self.ready_timeout))?
    }

    async fn execute_command(
        &self,
        id: &str,
        command: &str,
    ) -> Result<CommandOutput, SandboxError> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(vec!["sh", "-c", command]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut output = CommandOutput::default();

        if let StartExecResults::Attached {
            output: mut stream, ..
        } = self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        output.stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        output.stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Err(e) => {
                        return Err(SandboxError::exec_failed(format!(
                            "Error reading exec output: {e}"
                        )));
                    }
                    _ => {}
                }
            }
        }

        output.exit_code = self.docker.inspect_exec(&exec.id).await?.exit_code;
        Ok(output)
    }

    async fn delete(&self, id: &str) -> Result<(), SandboxError> {
        debug!("Removing sandbox container: {}", id);
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| match SandboxError::from(e) {
                SandboxError::Api { status: 404, .. } => SandboxError::not_found(id),
                other => other,
            })
    }
}

/// Awaits `start`. On failure the created-but-unstarted container is
/// removed with `discard` before the start error is returned.
async fn start_or_discard<S, D>(name: &str, start: S, discard: D) -> Result<(), SandboxError>
where
    S: Future<Output = Result<(), SandboxError>>,
    D: Future<Output = Result<(), SandboxError>>,
{
    let Err(e) = start.await else {
        return Ok(());
    };
    if let Err(cleanup) = discard.await {
        warn!("Failed to remove unstarted sandbox {}: {}", name, cleanup);
    }
    Err(e)
}

/// Parse memory limit string (e.g., "8g", "512m") to bytes
fn parse_memory_limit(limit: &str) -> Result<i64, SandboxError> {
    let limit = limit.to_lowercase();
    let invalid = |_| SandboxError::exec_failed(format!("Invalid memory limit: {limit}"));

    if let Some(num) = limit.strip_suffix('g') {
        let gigs: i64 = num.parse().map_err(invalid)?;
        Ok(gigs * 1024 * 1024 * 1024)
    } else if let Some(num) = limit.strip_suffix('m') {
        let megs: i64 = num.parse().map_err(invalid)?;
        Ok(megs * 1024 * 1024)
    } else {
        limit.parse().map_err(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_parse_memory_limit() {
        assert_eq!(parse_memory_limit("8g").unwrap(), 8 * 1024 * 1024 * 1024);
        assert_eq!(parse_memory_limit("512m").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_memory_limit("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_limit("1048576").unwrap(), 1_048_576);
    }

    #[tokio::test]
    async fn test_failed_start_removes_container() {
        let removed = AtomicBool::new(false);

        let result = start_or_discard(
            "swe-grep-abc",
            async { Err(SandboxError::api(409, "container is marked for removal")) },
            async {
                removed.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;

        assert!(matches!(result, Err(SandboxError::Api { status: 409, .. })));
        assert!(removed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_successful_start_keeps_container() {
        let removed = AtomicBool::new(false);

        let result = start_or_discard("swe-grep-abc", async { Ok(()) }, async {
            removed.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(result.is_ok());
        assert!(!removed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_start_error_wins_over_cleanup_error() {
        let result = start_or_discard(
            "swe-grep-abc",
            async { Err(SandboxError::api(502, "bad gateway")) },
            async { Err(SandboxError::not_found("swe-grep-abc")) },
        )
        .await;

        assert!(matches!(result, Err(SandboxError::Api { status: 502, .. })));
    }

    #[test]
    fn test_parse_memory_limit_rejects_garbage() {
        let err = parse_memory_limit("lots").unwrap_err();
        assert!(err.to_string().contains("Invalid memory limit"));
    }
}
