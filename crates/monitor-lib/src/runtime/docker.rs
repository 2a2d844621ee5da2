//! Docker engine binding over bollard

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::ContainerSummaryStateEnum;
use bollard::Docker;
use tokio_stream::StreamExt;
use tracing::debug;

use super::{ContainerAttrs, ContainerRuntime, ExecOutput, RawStats};
use crate::error::CollectorError;
use crate::models::{ContainerInfo, ContainerState};

/// Runtime collaborator backed by the local Docker daemon
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the platform defaults (`DOCKER_HOST` or the local socket)
    pub fn connect() -> Result<Self, CollectorError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| CollectorError::Enumeration(format!("cannot connect to Docker: {}", e)))?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>, CollectorError> {
        let options = bollard::query_parameters::ListContainersOptions {
            all,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| CollectorError::Enumeration(e.to_string()))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.clone());
                let state = match c.state {
                    Some(ContainerSummaryStateEnum::RUNNING) => ContainerState::Running,
                    Some(ContainerSummaryStateEnum::PAUSED) => ContainerState::Paused,
                    _ => ContainerState::Stopped,
                };
                Some(ContainerInfo { id, name, state })
            })
            .collect())
    }

    async fn stats(&self, container_id: &str) -> Result<RawStats, CollectorError> {
        let stats_error = |message: String| CollectorError::Stats {
            container_id: container_id.to_string(),
            message,
        };

        // Non-streaming but not one-shot, so the engine fills precpu_stats
        let options = bollard::query_parameters::StatsOptionsBuilder::new()
            .stream(false)
            .one_shot(false)
            .build();

        let mut stream = Box::pin(self.docker.stats(container_id, Some(options)));
        let stats = stream
            .next()
            .await
            .ok_or_else(|| stats_error("stats stream returned no data".to_string()))?
            .map_err(|e| stats_error(e.to_string()))?;

        let value = serde_json::to_value(&stats).map_err(|e| stats_error(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| stats_error(e.to_string()))
    }

    async fn exec(&self, container_id: &str, command: &[String]) -> Result<ExecOutput, CollectorError> {
        let exec_error = |message: String| CollectorError::Exec {
            container_id: container_id.to_string(),
            message,
        };

        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions::<String> {
                    cmd: Some(command.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(false),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        let mut stdout = String::new();
        match self
            .docker
            .start_exec(&exec.id, None::<bollard::exec::StartExecOptions>)
            .await
            .map_err(|e| exec_error(e.to_string()))?
        {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    if let LogOutput::StdOut { message } = chunk.map_err(|e| exec_error(e.to_string()))? {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                }
            }
            StartExecResults::Detached => {
                debug!(container_id = %container_id, "Exec started detached");
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code,
            stdout,
        })
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerAttrs, CollectorError> {
        let info = self
            .docker
            .inspect_container(
                container_id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
            .map_err(|e| CollectorError::Inspect {
                container_id: container_id.to_string(),
                message: e.to_string(),
            })?;

        let config = info.config.unwrap_or_default();
        Ok(ContainerAttrs {
            labels: config.labels.unwrap_or_default().into_iter().collect(),
            env: config.env.unwrap_or_default(),
        })
    }
}
