//! kelpie - Storage Cluster Control Plane
//!
//! A control plane for SeaweedFS-style storage clusters: container lifecycle
//! control, node health probing, and a live S3 operation feed behind one
//! HTTP API.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration loading, env overrides, and validation
//! - [`registry`] - Static map of logical node names to cluster nodes
//! - [`runtime`] - Container runtime access (Docker) behind a trait
//! - [`health`] - Background health probing with debounced transitions
//! - [`events`] - S3 access-log ingestion and the bounded event buffer
//! - [`server`] - axum HTTP server, routes, and authentication
//! - [`metrics`] - Prometheus collectors and text exposition
//! - [`utils`] - Common helpers
//!
//! Container status is never cached: every read goes to the runtime. The
//! health record map and the event buffer are the only shared mutable
//! state, each owned by its component and fed by a dedicated background
//! task.
//!
//! # Example
//!
//! ```no_run
//! use kelpie::config::Config;
//! use kelpie::server::ControlPlaneServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let server = ControlPlaneServer::new(config)?;
//!     server
//!         .start_with_shutdown(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod runtime;
pub mod server;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::events::{EventCollector, S3Operation, S3OperationEvent};
    pub use crate::health::{HealthMonitor, HealthRecord, HealthState};
    pub use crate::registry::{ClusterRegistry, Node, NodeRole};
    pub use crate::runtime::{ContainerRuntime, ContainerState, ContainerStatus};
    pub use crate::server::{AppState, ControlPlaneServer};
}

// Direct re-exports for convenience
pub use config::Config;
pub use error::{Error, Result};
