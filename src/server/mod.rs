//! Control plane HTTP server
//!
//! This module wires the cluster registry, container runtime, health
//! monitor and event collector into one axum application and manages the
//! background tasks that keep them fed.

pub mod api;
pub mod auth;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{AuthConfig, Config};
use crate::events::{EventCollector, LineSource, TcpLineSource};
use crate::health::HealthMonitor;
use crate::registry::{ClusterRegistry, RegistryError};
use crate::runtime::{ContainerRuntime, DockerRuntime};

use api::create_router;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Cluster membership, fixed at startup
    pub registry: Arc<ClusterRegistry>,

    /// Container runtime, queried live on every request
    pub runtime: Arc<dyn ContainerRuntime>,

    /// Probe records for every registered node
    pub health: Arc<HealthMonitor>,

    /// Buffered S3 operation feed
    pub events: Arc<EventCollector>,

    /// Credentials and read-protection policy
    pub auth: AuthConfig,

    /// Server start time
    pub start_time: Instant,
}

// ============================================================================
// Control Plane Server
// ============================================================================

/// Main control plane server
pub struct ControlPlaneServer {
    config: Config,
    state: AppState,
    shutdown_tx: watch::Sender<bool>,
}

impl ControlPlaneServer {
    /// Create a server connected to the local Docker daemon
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let runtime = DockerRuntime::connect(&config.runtime)
            .map_err(|e| ServerError::RuntimeError(e.to_string()))?;
        Self::with_runtime(config, Arc::new(runtime))
    }

    /// Create a server over an explicit runtime implementation
    pub fn with_runtime(
        config: Config,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;

        let registry = Arc::new(ClusterRegistry::from_entries(&config.cluster.nodes)?);
        let health = Arc::new(HealthMonitor::new(config.probe.clone()));
        let events = Arc::new(EventCollector::new(config.events.clone()));

        let state = AppState {
            registry,
            runtime,
            health,
            events,
            auth: config.auth.clone(),
            start_time: Instant::now(),
        };

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            state,
            shutdown_tx,
        })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Address the HTTP listener binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        // Add CORS layer if enabled
        if self.config.server.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        // Add tracing layer if enabled
        if self.config.server.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start with graceful shutdown
    ///
    /// Runs until the shutdown future resolves, then stops the probe and
    /// collector tasks and waits for them to finish.
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let addr = self.bind_addr();

        tracing::info!("Starting control plane server on {}", addr);

        let tasks = self.spawn_background_tasks();

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        // HTTP is down; stop probes and the collector
        let _ = self.shutdown_tx.send(true);
        for task in tasks {
            let _ = task.await;
        }

        tracing::info!("Control plane server shutdown complete");
        Ok(())
    }

    /// Start probe tasks and the event collector
    fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = self
            .state
            .health
            .clone()
            .spawn_probe_tasks(self.state.registry.clone(), self.shutdown_tx.subscribe());

        let source: Arc<dyn LineSource> =
            Arc::new(TcpLineSource::new(self.config.events.source_addr.clone()));
        let collector = self.state.events.clone();
        tasks.push(tokio::spawn(
            collector.run(source, self.shutdown_tx.subscribe()),
        ));

        tracing::info!(
            "Background tasks started: {} probe tasks, 1 event collector",
            tasks.len() - 1
        );
        tasks
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid cluster definition
    #[error("Registry error: {0}")]
    RegistryError(#[from] RegistryError),

    /// Container runtime could not be set up
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// Failed to bind to address
    #[error("Failed to bind: {0}")]
    BindError(String),

    /// Server error
    #[error("Server error: {0}")]
    ServeError(String),
}

// ============================================================================
// Tests
// ============================================================================
