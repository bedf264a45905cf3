//! REST API handlers for the control plane server
//!
//! This module defines the API routes and handlers: container status and
//! lifecycle, per-node health, the S3 operation feed, and service
//! endpoints (root info, health check, Prometheus metrics).

use axum::{
    extract::{MatchedPath, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::events::S3OperationEvent;
use crate::health::HealthRecord;
use crate::metrics;
use crate::registry::{Node, RegistryStats};
use crate::runtime::{ContainerState, ContainerStatus, RuntimeError};

use super::auth;
use super::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Service health response
#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    pub timestamp: DateTime<Utc>,
}

/// Service info response
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub cluster: RegistryStats,
    pub endpoints: Vec<&'static str>,
}

/// Container list response
#[derive(Debug, Serialize)]
pub struct ContainerListResponse {
    pub containers: Vec<ContainerStatus>,
    pub total: usize,
}

/// Lifecycle action response
#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub node: String,
    pub action: String,
    pub message: String,
}

/// S3 operation feed response
#[derive(Debug, Serialize)]
pub struct OperationsResponse {
    pub operations: Vec<S3OperationEvent>,
    pub count: usize,
    /// Events accepted since startup, across buffer evictions
    pub total_ingested: u64,
    /// Malformed or oversized lines dropped since startup
    pub total_dropped: u64,
}

/// Query parameters for the S3 operation feed
#[derive(Debug, Deserialize)]
pub struct OperationsQuery {
    pub since: Option<String>,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    // Everything under the auth gate: reads pass through unless
    // protect_reads is set, writes always need credentials
    let guarded = Router::new()
        .route("/api/containers", get(list_containers))
        .route(
            "/api/containers/{name}",
            get(container_status)
                .post(start_container)
                .delete(stop_container),
        )
        .route("/api/containers/{name}/health", get(container_health))
        .route("/s3-operations", get(s3_operations))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/", get(service_info))
        .route("/health", get(service_health))
        .route("/metrics", get(metrics_endpoint))
        .merge(guarded)
        .route_layer(middleware::from_fn(track_metrics))
        .with_state(state)
}

/// Record request count and latency per matched route
async fn track_metrics(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

/// Translate an error into its HTTP response
fn error_response(err: &Error) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        error!("API error ({}): {}", err.category().as_str(), err);
    } else {
        debug!("API error ({}): {}", err.category().as_str(), err);
    }
    (status, Json(ApiResponse::<()>::error(err.public_message()))).into_response()
}

// ============================================================================
// Service Handlers
// ============================================================================

/// Service info endpoint
async fn service_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(ServiceInfo {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cluster: state.registry.stats(),
        endpoints: vec![
            "/health",
            "/metrics",
            "/api/containers",
            "/api/containers/{name}",
            "/api/containers/{name}/health",
            "/s3-operations",
        ],
    }))
}

/// Health check endpoint
async fn service_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(ServiceHealth {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        timestamp: Utc::now(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => error_response(&Error::from(e.context("Failed to encode metrics"))),
    }
}

// ============================================================================
// Container Handlers
// ============================================================================

/// Inspect a node's container, reporting a missing container as a status
/// rather than an error
async fn fetch_status(state: &AppState, node: &Node) -> Result<ContainerStatus, Error> {
    match state.runtime.inspect(&node.container).await {
        Ok(inspection) => Ok(ContainerStatus::from_inspection(&node.name, inspection)),
        Err(RuntimeError::NotFound(_)) => Ok(ContainerStatus::not_found(&node.name)),
        Err(e) => Err(Error::Runtime(e)),
    }
}

/// List the status of every registered container
async fn list_containers(State(state): State<AppState>) -> Response {
    let lookups = state
        .registry
        .nodes()
        .iter()
        .map(|node| fetch_status(&state, node));

    match futures::future::try_join_all(lookups).await {
        Ok(containers) => {
            let total = containers.len();
            (
                StatusCode::OK,
                Json(ApiResponse::success(ContainerListResponse {
                    containers,
                    total,
                })),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Get the status of one registered container
async fn container_status(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let Some(node) = state.registry.get(&name) else {
        return error_response(&Error::NodeNotFound(name));
    };

    match fetch_status(&state, node).await {
        Ok(status) => (StatusCode::OK, Json(ApiResponse::success(status))).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Get the probe record for one registered node
async fn container_health(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    if !state.registry.contains(&name) {
        return error_response(&Error::NodeNotFound(name));
    }

    // A node not yet probed reports as unknown
    let record = state
        .health
        .record(&name)
        .await
        .unwrap_or_else(|| HealthRecord::new(&name));
    (StatusCode::OK, Json(ApiResponse::success(record))).into_response()
}

#[derive(Clone, Copy, PartialEq)]
enum LifecycleAction {
    Start,
    Stop,
}

impl LifecycleAction {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

/// Start a registered container
async fn start_container(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    run_lifecycle(state, name, LifecycleAction::Start).await
}

/// Stop a registered container
async fn stop_container(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    run_lifecycle(state, name, LifecycleAction::Stop).await
}

/// Shared lifecycle flow: inspect first, no-op if the container is already
/// in the requested state, otherwise dispatch and report 202
async fn run_lifecycle(state: AppState, name: String, action: LifecycleAction) -> Response {
    let Some(node) = state.registry.get(&name) else {
        metrics::record_lifecycle_action(action.as_str(), "unknown-node");
        return error_response(&Error::NodeNotFound(name));
    };

    let inspection = match state.runtime.inspect(&node.container).await {
        Ok(inspection) => inspection,
        Err(e) => {
            metrics::record_lifecycle_action(action.as_str(), "error");
            return error_response(&Error::Runtime(e));
        }
    };

    let already_there = match action {
        LifecycleAction::Start => inspection.state.is_running(),
        LifecycleAction::Stop => inspection.state == ContainerState::Exited,
    };
    if already_there {
        let message = match action {
            LifecycleAction::Start => format!("Container {} is already running", name),
            LifecycleAction::Stop => format!("Container {} is already stopped", name),
        };
        metrics::record_lifecycle_action(action.as_str(), "no-op");
        return (
            StatusCode::OK,
            Json(ApiResponse::success(LifecycleResponse {
                node: name,
                action: action.as_str().to_string(),
                message,
            })),
        )
            .into_response();
    }

    let result = match action {
        LifecycleAction::Start => state.runtime.start(&node.container).await,
        LifecycleAction::Stop => state.runtime.stop(&node.container).await,
    };

    match result {
        Ok(()) => {
            info!(
                "Dispatched {} for node {} (container {})",
                action.as_str(),
                name,
                node.container
            );
            metrics::record_lifecycle_action(action.as_str(), "dispatched");
            let message = match action {
                LifecycleAction::Start => format!("Container {} started", name),
                LifecycleAction::Stop => format!("Container {} stopped", name),
            };
            (
                StatusCode::ACCEPTED,
                Json(ApiResponse::success(LifecycleResponse {
                    node: name,
                    action: action.as_str().to_string(),
                    message,
                })),
            )
                .into_response()
        }
        Err(e) => {
            metrics::record_lifecycle_action(action.as_str(), "error");
            error_response(&Error::Runtime(e))
        }
    }
}

// ============================================================================
// Event Handlers
// ============================================================================

/// Query the buffered S3 operation feed
async fn s3_operations(
    State(state): State<AppState>,
    Query(query): Query<OperationsQuery>,
) -> Response {
    let operations = match query.since.as_deref() {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(cutoff) => state.events.since(cutoff.with_timezone(&Utc)).await,
            Err(_) => {
                return error_response(&Error::bad_request(format!(
                    "Invalid since timestamp: {}. Expected RFC 3339",
                    raw
                )));
            }
        },
        None => state.events.snapshot().await,
    };

    let count = operations.len();
    (
        StatusCode::OK,
        Json(ApiResponse::success(OperationsResponse {
            operations,
            count,
            total_ingested: state.events.total_ingested(),
            total_dropped: state.events.total_dropped(),
        })),
    )
        .into_response()
}

// ============================================================================
// Tests
// ============================================================================
