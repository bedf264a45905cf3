//! Prometheus metrics for the kelpie control plane
//!
//! This module provides metrics tracking for:
//! - API server: request counts, request latency, lifecycle actions
//! - Cluster: probe durations and failures, node health states, S3 event ingest
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram_vec, Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec,
    TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all API server metrics
struct ApiMetrics {
    requests: CounterVec,
    request_duration: HistogramVec,
    lifecycle_actions: CounterVec,
}

/// Container for all cluster metrics
struct ClusterMetrics {
    probe_duration: HistogramVec,
    probe_failures: CounterVec,
    node_health: GaugeVec,
    events_ingested: Counter,
    events_dropped: Counter,
    event_buffer_size: Gauge,
}

/// Global storage for API server metrics
static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

/// Global storage for cluster metrics
static CLUSTER_METRICS: OnceLock<ClusterMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
///
/// # Returns
///
/// `Ok(())` if all metrics were registered successfully,
/// `Err` with description if any registration failed.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = kelpie::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
///     // Application can continue without metrics
/// }
/// ```
pub fn init_metrics() -> anyhow::Result<()> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    // Register API server metrics
    let api = ApiMetrics {
        requests: register_counter_vec!(
            "kelpie_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        request_duration: register_histogram_vec!(
            "kelpie_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )?,
        lifecycle_actions: register_counter_vec!(
            "kelpie_lifecycle_actions_total",
            "Total container lifecycle actions by action and outcome",
            &["action", "outcome"]
        )?,
    };

    // Register cluster metrics
    let cluster = ClusterMetrics {
        probe_duration: register_histogram_vec!(
            "kelpie_probe_duration_seconds",
            "Health probe duration in seconds",
            &["node"],
            vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]
        )?,
        probe_failures: register_counter_vec!(
            "kelpie_probe_failures_total",
            "Total failed health probes by node",
            &["node"]
        )?,
        node_health: register_gauge_vec!(
            "kelpie_node_health",
            "Node health state (0 = unknown, 1 = unreachable, 2 = degraded, 3 = healthy)",
            &["node"]
        )?,
        events_ingested: register_counter!(
            "kelpie_events_ingested_total",
            "Total S3 operation events accepted into the buffer"
        )?,
        events_dropped: register_counter!(
            "kelpie_events_dropped_total",
            "Total malformed event lines dropped"
        )?,
        event_buffer_size: register_gauge!(
            "kelpie_event_buffer_size",
            "Current number of events held in the ring buffer"
        )?,
    };

    // Store metrics - these should always succeed since we just created them
    API_METRICS
        .set(api)
        .map_err(|_| anyhow::anyhow!("API metrics already initialized"))?;
    CLUSTER_METRICS
        .set(cluster)
        .map_err(|_| anyhow::anyhow!("Cluster metrics already initialized"))?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    API_METRICS.get().is_some() && CLUSTER_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record an API request with its response status and duration
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = API_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.request_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

/// Record a container lifecycle action (start/stop) and its outcome
pub fn record_lifecycle_action(action: &str, outcome: &str) {
    if let Some(m) = API_METRICS.get() {
        m.lifecycle_actions
            .with_label_values(&[action, outcome])
            .inc();
    }
}

/// Record the duration of a completed health probe
pub fn record_probe_duration(node: &str, duration_secs: f64) {
    if let Some(m) = CLUSTER_METRICS.get() {
        m.probe_duration
            .with_label_values(&[node])
            .observe(duration_secs);
    }
}

/// Record a failed health probe (transport error or timeout)
pub fn record_probe_failure(node: &str) {
    if let Some(m) = CLUSTER_METRICS.get() {
        m.probe_failures.with_label_values(&[node]).inc();
    }
}

/// Update the health state gauge for a node
///
/// State codes: 0 = unknown, 1 = unreachable, 2 = degraded, 3 = healthy.
pub fn update_node_health(node: &str, state_code: i64) {
    if let Some(m) = CLUSTER_METRICS.get() {
        m.node_health
            .with_label_values(&[node])
            .set(state_code as f64);
    }
}

/// Record an event accepted into the ring buffer
pub fn record_event_ingested() {
    if let Some(m) = CLUSTER_METRICS.get() {
        m.events_ingested.inc();
    }
}

/// Record a malformed event line that was dropped
pub fn record_event_dropped() {
    if let Some(m) = CLUSTER_METRICS.get() {
        m.events_dropped.inc();
    }
}

/// Update the ring buffer size gauge
pub fn update_event_buffer_size(size: usize) {
    if let Some(m) = CLUSTER_METRICS.get() {
        m.event_buffer_size.set(size as f64);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        // Initialize metrics if not already done
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics() {
        // Should succeed or return Ok if already initialized
        let result = init_metrics();
        assert!(result.is_ok());

        // Second call should also be Ok (idempotent)
        let result2 = init_metrics();
        assert!(result2.is_ok());
    }

    #[test]
    fn test_metrics_initialized() {
        ensure_metrics_initialized();
        assert!(metrics_initialized());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        let result = encode_metrics();
        assert!(result.is_ok());
        let text = result.unwrap();
        // After initialization, we should see our metrics
        assert!(text.contains("kelpie_") || text.is_empty());
    }

    #[test]
    fn test_api_request_recording() {
        ensure_metrics_initialized();
        record_api_request("/api/containers", 200, 0.005);
        record_lifecycle_action("start", "dispatched");
        // Verify it doesn't panic
    }

    #[test]
    fn test_cluster_metrics() {
        ensure_metrics_initialized();
        record_probe_duration("master1", 0.012);
        record_probe_failure("master1");
        update_node_health("master1", 3);
        record_event_ingested();
        record_event_dropped();
        update_event_buffer_size(42);
        // Verify it doesn't panic
    }

    #[test]
    fn test_metrics_noop_without_init() {
        // These should not panic even if called before initialization
        // (in a fresh test environment where init hasn't been called)
        record_api_request("/test", 200, 0.001);
        record_lifecycle_action("stop", "already-stopped");
        record_probe_duration("test", 0.1);
        record_probe_failure("test");
        update_node_health("test", 0);
        record_event_ingested();
        record_event_dropped();
        update_event_buffer_size(0);
    }
}
