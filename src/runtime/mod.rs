//! Container runtime abstraction
//!
//! This module defines the interface the control plane uses to inspect and
//! drive container lifecycle state. The production implementation talks to
//! a local Docker daemon; tests substitute an in-memory fake.
//!
//! Runtime state is never cached: every query goes to the daemon so the
//! answer reflects the container as it is right now.

pub mod docker;

pub use docker::DockerRuntime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur during runtime operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    /// No container with the given name exists
    #[error("Container not found: {0}")]
    NotFound(String),

    /// The runtime daemon could not be reached
    #[error("Runtime unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete within its deadline
    #[error("Operation {operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// The daemon rejected the request
    #[error("Runtime API error: {0}")]
    Api(String),
}

/// Lifecycle state of a container as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerState {
    /// Container process is up
    Running,
    /// Container exists but its process has stopped
    Exited,
    /// Container is in a restart loop
    Restarting,
    /// No container with this name exists
    NotFound,
    /// Runtime returned a state this service does not model
    Unknown,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Running => "running",
            ContainerState::Exited => "exited",
            ContainerState::Restarting => "restarting",
            ContainerState::NotFound => "not-found",
            ContainerState::Unknown => "unknown",
        }
    }

    /// Whether a start request for a container in this state is a no-op
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw facts returned by a runtime inspection
#[derive(Debug, Clone)]
pub struct ContainerInspection {
    pub state: ContainerState,
    pub container_id: Option<String>,
    pub image: Option<String>,
}

/// Point-in-time status of a named container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatus {
    /// Container name as registered in the cluster
    pub name: String,
    /// Lifecycle state at the moment of observation
    pub state: ContainerState,
    /// Short (12 character) container ID, if the container exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Image the container was created from, if the container exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// When the runtime was queried
    pub observed_at: DateTime<Utc>,
}

impl ContainerStatus {
    /// Build a status from a fresh runtime inspection
    pub fn from_inspection(name: impl Into<String>, inspection: ContainerInspection) -> Self {
        Self {
            name: name.into(),
            state: inspection.state,
            container_id: inspection.container_id,
            image: inspection.image,
            observed_at: Utc::now(),
        }
    }

    /// Status for a registered node whose container does not exist
    pub fn not_found(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ContainerState::NotFound,
            container_id: None,
            image: None,
            observed_at: Utc::now(),
        }
    }
}

/// Interface to a container runtime
///
/// Implementations must query the live daemon on every call. Callers rely
/// on `inspect` reflecting current state, not a snapshot.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Look up the current state of a named container
    async fn inspect(&self, container: &str) -> RuntimeResult<ContainerInspection>;

    /// Start a stopped container
    async fn start(&self, container: &str) -> RuntimeResult<()>;

    /// Stop a running container, allowing it a grace period to exit
    async fn stop(&self, container: &str) -> RuntimeResult<()>;
}
