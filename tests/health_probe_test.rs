//! Health prober tests against mock node endpoints

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kelpie::config::{NodeEntry, ProbeConfig};
use kelpie::health::{HealthMonitor, HealthState, ProbeOutcome};
use kelpie::registry::{ClusterRegistry, Node, NodeRole};

fn probe_config() -> ProbeConfig {
    ProbeConfig {
        interval_secs: 2,
        timeout_secs: 1,
        failure_threshold: 3,
    }
}

fn node_at(url: &str) -> Node {
    Node {
        name: "master1".to_string(),
        role: NodeRole::Master,
        container: "master1".to_string(),
        health_url: url.to_string(),
    }
}

/// A 200 response classifies as a success with a measured latency
#[tokio::test]
async fn test_probe_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cluster/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"IsLeader\":true}"))
        .expect(1)
        .mount(&server)
        .await;

    let monitor = HealthMonitor::new(probe_config());
    let node = node_at(&format!("{}/cluster/status", server.uri()));

    let outcome = monitor.probe_once(&node).await;
    assert!(matches!(outcome, ProbeOutcome::Success { .. }));
}

/// An error status classifies as an application error, not a failure
#[tokio::test]
async fn test_probe_app_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let monitor = HealthMonitor::new(probe_config());
    let node = node_at(&format!("{}/status", server.uri()));

    let outcome = monitor.probe_once(&node).await;
    assert!(matches!(
        outcome,
        ProbeOutcome::AppError { status: 503, .. }
    ));
}

/// A response slower than the probe deadline classifies as a failure
#[tokio::test]
async fn test_probe_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let monitor = HealthMonitor::new(probe_config());
    let node = node_at(&format!("{}/status", server.uri()));

    let outcome = monitor.probe_once(&node).await;
    match outcome {
        ProbeOutcome::Failure { error } => assert!(error.contains("timed out")),
        other => panic!("expected Failure, got {:?}", other),
    }
}

/// A dead endpoint classifies as a failure
#[tokio::test]
async fn test_probe_connection_refused() {
    let monitor = HealthMonitor::new(probe_config());
    // Nothing listens here
    let node = node_at("http://127.0.0.1:1/status");

    let outcome = monitor.probe_once(&node).await;
    assert!(matches!(outcome, ProbeOutcome::Failure { .. }));
}

/// A healthy node survives failures below the threshold, then flips
#[tokio::test]
async fn test_debounce_through_monitor() {
    let monitor = HealthMonitor::new(probe_config());

    monitor
        .apply("volume1", ProbeOutcome::Success { latency_ms: 4 })
        .await;
    assert_eq!(
        monitor.record("volume1").await.unwrap().state,
        HealthState::Healthy
    );

    for expected_failures in 1..=2u32 {
        monitor
            .apply(
                "volume1",
                ProbeOutcome::Failure {
                    error: "connection reset".to_string(),
                },
            )
            .await;
        let record = monitor.record("volume1").await.unwrap();
        assert_eq!(record.state, HealthState::Healthy);
        assert_eq!(record.consecutive_failures, expected_failures);
    }

    // Third consecutive failure crosses the configured threshold
    monitor
        .apply(
            "volume1",
            ProbeOutcome::Failure {
                error: "connection reset".to_string(),
            },
        )
        .await;
    let record = monitor.record("volume1").await.unwrap();
    assert_eq!(record.state, HealthState::Unreachable);
    assert_eq!(record.consecutive_failures, 3);
}

/// The spawned probe tasks produce a record for every node after the
/// first cycle, and shut down cleanly
#[tokio::test]
async fn test_probe_tasks_cover_all_nodes() {
    let healthy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&healthy)
        .await;

    let degraded = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&degraded)
        .await;

    let entries = vec![
        NodeEntry {
            name: "master1".to_string(),
            role: None,
            container: None,
            health_url: Some(format!("{}/cluster/status", healthy.uri())),
        },
        NodeEntry {
            name: "volume1".to_string(),
            role: None,
            container: None,
            health_url: Some(format!("{}/status", degraded.uri())),
        },
        NodeEntry {
            name: "filer1".to_string(),
            role: None,
            container: None,
            // Nothing listens here
            health_url: Some("http://127.0.0.1:1/".to_string()),
        },
    ];
    let registry = Arc::new(ClusterRegistry::from_entries(&entries).unwrap());

    let monitor = Arc::new(HealthMonitor::new(probe_config()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = monitor.clone().spawn_probe_tasks(registry, shutdown_rx);
    assert_eq!(tasks.len(), 3);

    // The first probe fires immediately; give it time to complete
    tokio::time::sleep(Duration::from_millis(500)).await;

    let master = monitor.record("master1").await.unwrap();
    assert_eq!(master.state, HealthState::Healthy);
    assert!(master.latency_ms.is_some());
    assert!(master.last_success.is_some());

    let volume = monitor.record("volume1").await.unwrap();
    assert_eq!(volume.state, HealthState::Degraded);
    assert_eq!(
        volume.last_error.as_deref(),
        Some("endpoint returned status 500")
    );

    // One failed probe from Unknown goes straight to unreachable
    let filer = monitor.record("filer1").await.unwrap();
    assert_eq!(filer.state, HealthState::Unreachable);
    assert_eq!(filer.consecutive_failures, 1);

    shutdown_tx.send(true).unwrap();
    for task in tasks {
        task.await.unwrap();
    }
}

/// A node that starts answering again recovers from unreachable
#[tokio::test]
async fn test_recovery_after_outage() {
    let monitor = HealthMonitor::new(probe_config());

    for _ in 0..4 {
        monitor
            .apply(
                "filer1",
                ProbeOutcome::Failure {
                    error: "timed out".to_string(),
                },
            )
            .await;
    }
    assert_eq!(
        monitor.record("filer1").await.unwrap().state,
        HealthState::Unreachable
    );

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let node = node_at(&format!("{}/", server.uri()));

    let outcome = monitor.probe_once(&node).await;
    monitor.apply("filer1", outcome).await;

    let record = monitor.record("filer1").await.unwrap();
    assert_eq!(record.state, HealthState::Healthy);
    assert_eq!(record.consecutive_failures, 0);
}
