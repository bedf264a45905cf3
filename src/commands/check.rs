//! Check command: validate configuration and print the cluster layout

use anyhow::{Context, Result};
use std::path::Path;

use crate::commands::setup_tracing;
use crate::config::Config;
use crate::registry::ClusterRegistry;

/// Load and validate configuration, then print what the server would run
pub fn run(config_path: Option<&Path>, log_format: Option<&str>, verbose: bool) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    setup_tracing(&config.logging, log_format, verbose);

    config.validate().context("Configuration is invalid")?;
    let registry = ClusterRegistry::from_entries(&config.cluster.nodes)
        .context("Cluster definition is invalid")?;

    println!("Configuration OK");
    println!("================");
    println!("  Bind: {}:{}", config.server.host, config.server.port);
    println!("  Cluster: {}", registry.stats().display());
    println!();
    for node in registry.nodes() {
        println!(
            "  {:<12} {:<8} container={} health={}",
            node.name,
            node.role.as_str(),
            node.container,
            node.health_url
        );
    }
    println!();
    println!("  Auth user: {}", config.auth.username);
    println!(
        "  Protected reads: {}",
        if config.auth.protect_reads {
            "yes"
        } else {
            "no"
        }
    );
    Ok(())
}
