//! Serve command: run the control plane server

use anyhow::{Context, Result};
use std::path::Path;

use crate::commands::setup_tracing;
use crate::config::Config;
use crate::metrics;
use crate::server::ControlPlaneServer;

/// Load configuration, start the server, and run until Ctrl+C
pub async fn run(
    config_path: Option<&Path>,
    log_format: Option<&str>,
    verbose: bool,
) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    setup_tracing(&config.logging, log_format, verbose);

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
        // The server runs fine without metrics
    }

    print_banner(&config);

    let server =
        ControlPlaneServer::new(config).context("Failed to create control plane server")?;

    server
        .start_with_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                }
                Err(e) => {
                    tracing::error!("Failed to wait for Ctrl+C: {}", e);
                }
            }
        })
        .await?;

    println!("Control plane server stopped.");
    Ok(())
}

fn print_banner(config: &Config) {
    println!("Starting Control Plane Server");
    println!("=============================");
    println!("  Bind: {}:{}", config.server.host, config.server.port);
    println!("  Cluster nodes: {}", config.cluster.nodes.len());
    println!(
        "  Probe: every {}s, timeout {}s, threshold {}",
        config.probe.interval_secs, config.probe.timeout_secs, config.probe.failure_threshold
    );
    println!(
        "  Event source: {} (buffer {})",
        config.events.source_addr, config.events.buffer_capacity
    );
    println!(
        "  CORS: {}",
        if config.server.enable_cors {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  Protected reads: {}",
        if config.auth.protect_reads {
            "yes"
        } else {
            "no"
        }
    );
    println!();
    println!("API Endpoints:");
    println!("  GET    /                             - Service info");
    println!("  GET    /health                       - Health check");
    println!("  GET    /metrics                      - Prometheus metrics");
    println!("  GET    /api/containers               - List container status");
    println!("  GET    /api/containers/{{name}}        - Container status");
    println!("  POST   /api/containers/{{name}}        - Start container");
    println!("  DELETE /api/containers/{{name}}        - Stop container");
    println!("  GET    /api/containers/{{name}}/health - Node health");
    println!("  GET    /s3-operations                - S3 operation feed");
    println!();
    println!("Press Ctrl+C to stop.\n");
}
