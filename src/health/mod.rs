//! Node health probing
//!
//! Each registered node gets its own probe task that issues an HTTP GET to
//! the node's health endpoint on a fixed interval. Probe outcomes drive a
//! per-node state machine:
//!
//! - `Unknown`: not probed yet (startup state)
//! - `Healthy`: last probe returned a 2xx response
//! - `Degraded`: endpoint responded, but with a non-2xx status
//! - `Unreachable`: probes are failing at the transport level
//!
//! Transient failures are debounced: a node that was reachable keeps its
//! last state until `failure_threshold` consecutive probes fail. A node that
//! was never reached goes `Unreachable` on the first failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ProbeConfig;
use crate::metrics;
use crate::registry::{ClusterRegistry, Node};

// ============================================================================
// Health States
// ============================================================================

/// Probe-derived health state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Unknown,
    Healthy,
    Degraded,
    Unreachable,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unreachable => "unreachable",
        }
    }

    /// Numeric code for the health gauge
    pub fn code(&self) -> i64 {
        match self {
            HealthState::Unknown => 0,
            HealthState::Unreachable => 1,
            HealthState::Degraded => 2,
            HealthState::Healthy => 3,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a single probe attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Endpoint answered with a 2xx status
    Success { latency_ms: u64 },
    /// Endpoint answered, but with an error status
    AppError { status: u16, latency_ms: u64 },
    /// No response: connection refused, DNS failure, or timeout
    Failure { error: String },
}

// ============================================================================
// Probe Records
// ============================================================================

/// Accumulated probe history for one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Node name as registered in the cluster
    pub node: String,
    /// Current debounced state
    pub state: HealthState,
    /// Latency of the last completed probe, if the endpoint responded
    pub latency_ms: Option<u64>,
    /// When the node last returned a 2xx response
    pub last_success: Option<DateTime<Utc>>,
    /// Consecutive transport-level failures since the last response
    pub consecutive_failures: u32,
    /// Description of the most recent problem
    pub last_error: Option<String>,
    /// When the node was last probed
    pub checked_at: Option<DateTime<Utc>>,
}

impl HealthRecord {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            state: HealthState::Unknown,
            latency_ms: None,
            last_success: None,
            consecutive_failures: 0,
            last_error: None,
            checked_at: None,
        }
    }

    /// Fold a probe outcome into the record
    ///
    /// Any completed response (success or error status) resets the failure
    /// counter: the node is reachable, whatever it answered.
    pub fn apply(&mut self, outcome: &ProbeOutcome, failure_threshold: u32) {
        let now = Utc::now();
        self.checked_at = Some(now);

        match outcome {
            ProbeOutcome::Success { latency_ms } => {
                self.state = HealthState::Healthy;
                self.latency_ms = Some(*latency_ms);
                self.last_success = Some(now);
                self.consecutive_failures = 0;
                self.last_error = None;
            }
            ProbeOutcome::AppError { status, latency_ms } => {
                self.state = HealthState::Degraded;
                self.latency_ms = Some(*latency_ms);
                self.consecutive_failures = 0;
                self.last_error = Some(format!("endpoint returned status {}", status));
            }
            ProbeOutcome::Failure { error } => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.latency_ms = None;
                self.last_error = Some(error.clone());

                // A node never reached flips immediately; a previously
                // reachable node keeps its state until the threshold
                if self.state == HealthState::Unknown
                    || self.consecutive_failures >= failure_threshold
                {
                    self.state = HealthState::Unreachable;
                }
            }
        }
    }
}

// ============================================================================
// Health Monitor
// ============================================================================

/// Owns probe records for every registered node and the tasks that feed them
pub struct HealthMonitor {
    records: Arc<RwLock<HashMap<String, HealthRecord>>>,
    client: reqwest::Client,
    config: ProbeConfig,
}

impl HealthMonitor {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Current record for a node, if it has been seeded
    pub async fn record(&self, node: &str) -> Option<HealthRecord> {
        self.records.read().await.get(node).cloned()
    }

    /// Fold a probe outcome into a node's record, updating gauges and
    /// logging state transitions
    pub async fn apply(&self, node: &str, outcome: ProbeOutcome) {
        let mut records = self.records.write().await;
        let record = records
            .entry(node.to_string())
            .or_insert_with(|| HealthRecord::new(node));

        let previous = record.state;
        record.apply(&outcome, self.config.failure_threshold);

        if record.state != previous {
            info!("Node {} health: {} -> {}", node, previous, record.state);
        }
        if matches!(outcome, ProbeOutcome::Failure { .. }) {
            metrics::record_probe_failure(node);
        }
        metrics::update_node_health(node, record.state.code());
    }

    /// Issue one probe against a node's health endpoint
    pub async fn probe_once(&self, node: &Node) -> ProbeOutcome {
        let start = Instant::now();
        let request = self.client.get(&node.health_url).send();

        match tokio::time::timeout(self.config.timeout(), request).await {
            Ok(Ok(response)) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                metrics::record_probe_duration(&node.name, start.elapsed().as_secs_f64());

                let status = response.status();
                if status.is_success() {
                    ProbeOutcome::Success { latency_ms }
                } else {
                    ProbeOutcome::AppError {
                        status: status.as_u16(),
                        latency_ms,
                    }
                }
            }
            Ok(Err(e)) => ProbeOutcome::Failure {
                error: e.to_string(),
            },
            Err(_) => ProbeOutcome::Failure {
                error: format!(
                    "probe timed out after {}ms",
                    self.config.timeout().as_millis()
                ),
            },
        }
    }

    /// Spawn one probe task per registered node
    ///
    /// Tasks probe immediately, then on every interval tick, until the
    /// shutdown signal flips.
    pub fn spawn_probe_tasks(
        self: Arc<Self>,
        registry: Arc<ClusterRegistry>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        registry
            .nodes()
            .iter()
            .map(|node| {
                let monitor = Arc::clone(&self);
                tokio::spawn(monitor.probe_loop(node.clone(), shutdown.clone()))
            })
            .collect()
    }

    async fn probe_loop(self: Arc<Self>, node: Node, mut shutdown: watch::Receiver<bool>) {
        // Seed the record so the API reports Unknown before the first probe
        {
            let mut records = self.records.write().await;
            records
                .entry(node.name.clone())
                .or_insert_with(|| HealthRecord::new(&node.name));
        }

        let mut ticker = tokio::time::interval(self.config.interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.probe_once(&node).await;
                    self.apply(&node.name, outcome).await;
                }
                _ = shutdown.changed() => {
                    debug!("Probe task for {} shutting down", node.name);
                    return;
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
