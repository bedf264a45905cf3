//! Docker runtime backed by the local daemon socket

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, StartContainerOptions, StopContainerOptions};
use bollard::errors::Error as DockerError;
use bollard::models::ContainerStateStatusEnum;
use bollard::{Docker, API_DEFAULT_VERSION};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::runtime::{
    ContainerInspection, ContainerRuntime, ContainerState, RuntimeError, RuntimeResult,
};

/// Length of the short container ID form shown in API responses
const SHORT_ID_LEN: usize = 12;

/// Container runtime that talks to a Docker daemon
///
/// Connection setup is lazy: `connect` validates configuration but the
/// daemon is only contacted when an operation runs.
pub struct DockerRuntime {
    docker: Docker,
    operation_timeout: Duration,
    stop_grace: Duration,
}

impl DockerRuntime {
    /// Connect using the configured socket path, or the platform default
    pub fn connect(config: &RuntimeConfig) -> RuntimeResult<Self> {
        let docker = match &config.socket_path {
            Some(path) => Docker::connect_with_socket(
                path,
                config.operation_timeout_secs,
                API_DEFAULT_VERSION,
            ),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        Ok(Self {
            docker,
            operation_timeout: config.operation_timeout(),
            stop_grace: config.stop_grace(),
        })
    }

    fn timeout_error(&self, operation: &str, bound: Duration) -> RuntimeError {
        RuntimeError::Timeout {
            operation: operation.to_string(),
            seconds: bound.as_secs(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect(&self, container: &str) -> RuntimeResult<ContainerInspection> {
        debug!("Inspecting container {}", container);

        let inspect = self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>);
        let response = tokio::time::timeout(self.operation_timeout, inspect)
            .await
            .map_err(|_| self.timeout_error("inspect", self.operation_timeout))?
            .map_err(|e| map_error(container, e))?;

        let state = response
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(map_state)
            .unwrap_or(ContainerState::Unknown);

        Ok(ContainerInspection {
            state,
            container_id: response.id.as_deref().map(short_id),
            image: response.config.and_then(|c| c.image),
        })
    }

    async fn start(&self, container: &str) -> RuntimeResult<()> {
        info!("Starting container {}", container);

        let start = self
            .docker
            .start_container(container, None::<StartContainerOptions<String>>);
        match tokio::time::timeout(self.operation_timeout, start).await {
            Err(_) => Err(self.timeout_error("start", self.operation_timeout)),
            Ok(Ok(())) => Ok(()),
            // 304: the container was already running when the daemon got the
            // request; the desired state holds
            Ok(Err(DockerError::DockerResponseServerError {
                status_code: 304, ..
            })) => Ok(()),
            Ok(Err(e)) => Err(map_error(container, e)),
        }
    }

    async fn stop(&self, container: &str) -> RuntimeResult<()> {
        info!(
            "Stopping container {} (grace {}s)",
            container,
            self.stop_grace.as_secs()
        );

        // The daemon waits up to the grace period before SIGKILL, so the
        // request bound must cover both the grace period and the API call.
        let bound = self.operation_timeout + self.stop_grace;
        let options = StopContainerOptions {
            t: self.stop_grace.as_secs() as i64,
        };
        let stop = self.docker.stop_container(container, Some(options));
        match tokio::time::timeout(bound, stop).await {
            Err(_) => Err(self.timeout_error("stop", bound)),
            Ok(Ok(())) => Ok(()),
            // 304: already stopped
            Ok(Err(DockerError::DockerResponseServerError {
                status_code: 304, ..
            })) => Ok(()),
            Ok(Err(e)) => Err(map_error(container, e)),
        }
    }
}

/// Map a daemon state to the states this service models
fn map_state(status: ContainerStateStatusEnum) -> ContainerState {
    match status {
        ContainerStateStatusEnum::RUNNING => ContainerState::Running,
        ContainerStateStatusEnum::EXITED => ContainerState::Exited,
        ContainerStateStatusEnum::RESTARTING => ContainerState::Restarting,
        _ => ContainerState::Unknown,
    }
}

/// Map a bollard error to a runtime error
fn map_error(container: &str, err: DockerError) -> RuntimeError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(container.to_string()),
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Api(format!("status {}: {}", status_code, message)),
        other => RuntimeError::Unavailable(other.to_string()),
    }
}

/// Truncate a full container ID to its short form
fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}
