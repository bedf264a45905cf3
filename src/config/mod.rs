//! Configuration management for the kelpie control plane
//!
//! Configuration is layered: compiled defaults, then an optional TOML file,
//! then KELPIE_* environment variables on top. `validate()` runs before the
//! server starts; an invalid configuration is fatal at startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::registry::NodeRole;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Container runtime configuration
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Cluster node definitions
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Health probing configuration
    #[serde(default)]
    pub probe: ProbeConfig,

    /// S3 access-log collection configuration
    #[serde(default)]
    pub events: EventsConfig,

    /// API authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Allow cross-origin requests from any origin
    pub enable_cors: bool,

    /// Log each request through the tracing layer
    pub enable_request_logging: bool,
}

/// Container runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Docker socket path; platform defaults when unset
    pub socket_path: Option<String>,

    /// Bound on a single runtime call, in seconds
    pub operation_timeout_secs: u64,

    /// Seconds a container gets to exit before the runtime kills it
    pub stop_grace_secs: u64,
}

/// Cluster node definitions
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClusterConfig {
    /// Registered nodes; must not be empty
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

/// One configured cluster node
///
/// Only `name` is required. The role is inferred from the name when
/// omitted, the container identity defaults to the name, and the health
/// URL defaults to the role's standard endpoint on the container host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeEntry {
    /// Logical node name, also the API path segment
    pub name: String,

    /// Cluster role (master, volume, filer)
    pub role: Option<NodeRole>,

    /// Container identity in the runtime
    pub container: Option<String>,

    /// Explicit health endpoint
    pub health_url: Option<String>,
}

/// Health probing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Seconds between probes of one node
    pub interval_secs: u64,

    /// Per-probe deadline in seconds; must be below the interval
    pub timeout_secs: u64,

    /// Consecutive transport failures before a node flips to unreachable
    pub failure_threshold: u32,
}

/// S3 access-log collection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// TCP address of the access-log stream
    pub source_addr: String,

    /// Event ring buffer capacity
    pub buffer_capacity: usize,

    /// Originating-node label for log lines that do not carry one
    pub source_label: String,

    /// Initial reconnect delay in milliseconds
    pub reconnect_base_delay_ms: u64,

    /// Reconnect delay cap in milliseconds
    pub reconnect_max_delay_ms: u64,
}

/// API authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Basic auth user
    pub username: String,

    /// Basic auth password; no default, provisioning sets it
    pub password: String,

    /// Require credentials on read routes as well
    pub protect_reads: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from an optional file path, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("KELPIE_HOST") {
            self.server.host = host;
        }
        self.server.port = std::env::var("KELPIE_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(self.server.port);
        self.server.enable_cors = std::env::var("KELPIE_ENABLE_CORS")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(self.server.enable_cors);
        self.server.enable_request_logging = std::env::var("KELPIE_REQUEST_LOGGING")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(self.server.enable_request_logging);

        if let Ok(socket) = std::env::var("KELPIE_DOCKER_SOCKET") {
            self.runtime.socket_path = Some(socket);
        }
        self.runtime.operation_timeout_secs = std::env::var("KELPIE_OPERATION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(self.runtime.operation_timeout_secs);
        self.runtime.stop_grace_secs = std::env::var("KELPIE_STOP_GRACE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(self.runtime.stop_grace_secs);

        if let Ok(nodes) = std::env::var("KELPIE_NODES") {
            self.cluster.nodes = parse_nodes_env(&nodes);
        }

        self.probe.interval_secs = std::env::var("KELPIE_PROBE_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(self.probe.interval_secs);
        self.probe.timeout_secs = std::env::var("KELPIE_PROBE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(self.probe.timeout_secs);
        self.probe.failure_threshold = std::env::var("KELPIE_FAILURE_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(self.probe.failure_threshold);

        if let Ok(addr) = std::env::var("KELPIE_EVENTS_ADDR") {
            self.events.source_addr = addr;
        }
        self.events.buffer_capacity = std::env::var("KELPIE_BUFFER_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(self.events.buffer_capacity);
        if let Ok(label) = std::env::var("KELPIE_SOURCE_LABEL") {
            self.events.source_label = label;
        }

        if let Ok(user) = std::env::var("KELPIE_ADMIN_USER") {
            self.auth.username = user;
        }
        if let Ok(password) = std::env::var("KELPIE_ADMIN_PASSWORD") {
            self.auth.password = password;
        }
        self.auth.protect_reads = std::env::var("KELPIE_PROTECT_READS")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(self.auth.protect_reads);

        if let Ok(level) = std::env::var("KELPIE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("KELPIE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must not be 0");
        }

        if self.cluster.nodes.is_empty() {
            anyhow::bail!("cluster.nodes must not be empty: the registry is static and needs at least one node");
        }

        if self.probe.timeout_secs >= self.probe.interval_secs {
            anyhow::bail!(
                "probe.timeout_secs ({}) must be strictly less than probe.interval_secs ({})",
                self.probe.timeout_secs,
                self.probe.interval_secs
            );
        }

        if self.probe.timeout_secs == 0 {
            anyhow::bail!("probe.timeout_secs must be greater than 0");
        }

        if self.probe.failure_threshold == 0 {
            anyhow::bail!("probe.failure_threshold must be greater than 0");
        }

        if self.runtime.operation_timeout_secs == 0 {
            anyhow::bail!("runtime.operation_timeout_secs must be greater than 0");
        }

        if self.events.buffer_capacity == 0 {
            anyhow::bail!("events.buffer_capacity must be greater than 0");
        }

        if self.events.reconnect_base_delay_ms == 0 {
            anyhow::bail!("events.reconnect_base_delay_ms must be greater than 0");
        }

        if self.events.reconnect_max_delay_ms < self.events.reconnect_base_delay_ms {
            anyhow::bail!("events.reconnect_max_delay_ms must not be below the base delay");
        }

        if self.auth.username.is_empty() || self.auth.password.is_empty() {
            anyhow::bail!(
                "auth credentials must be set (auth.username / auth.password or KELPIE_ADMIN_PASSWORD)"
            );
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("logging.level '{}' is not a valid level", other),
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("logging.format '{}' must be 'text' or 'json'", other),
        }

        Ok(())
    }
}

impl RuntimeConfig {
    /// Get the runtime call bound as Duration
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Get the stop grace period as Duration
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

impl ProbeConfig {
    /// Get the probe interval as Duration
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Get the per-probe deadline as Duration
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EventsConfig {
    /// Get the initial reconnect delay as Duration
    #[must_use]
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    /// Get the reconnect delay cap as Duration
    #[must_use]
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}

/// Parse the KELPIE_NODES override: comma-separated `name` or `name:role`
/// entries, e.g. `master1,volume1:volume,filer1:filer`.
fn parse_nodes_env(raw: &str) -> Vec<NodeEntry> {
    raw.split(',')
        .map(str::trim)
        .filter(|spec| !spec.is_empty())
        .map(|spec| {
            let (name, role) = match spec.split_once(':') {
                Some((name, role)) => (name, role.parse::<NodeRole>().ok()),
                None => (spec, None),
            };
            NodeEntry {
                name: name.to_string(),
                role,
                container: None,
                health_url: None,
            }
        })
        .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            operation_timeout_secs: 10,
            stop_grace_secs: 10,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            timeout_secs: 2,
            failure_threshold: 3,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            source_addr: String::from("127.0.0.1:5140"),
            buffer_capacity: 500,
            source_label: String::from("s3"),
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: String::from("admin"),
            password: String::new(),
            protect_reads: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.cluster.nodes = parse_nodes_env("master1,volume1,filer1");
        config.auth.password = String::from("secret");
        config
    }

    #[test]
    fn test_default_config_is_incomplete() {
        // Until nodes and a password are provisioned the config must not
        // pass validation.
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_probe_timeout_must_be_below_interval() {
        let mut config = valid_config();
        config.probe.interval_secs = 5;
        config.probe.timeout_secs = 5;
        assert!(config.validate().is_err());

        config.probe.timeout_secs = 4;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = valid_config();
        config.probe.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_buffer_capacity_rejected() {
        let mut config = valid_config();
        config.events.buffer_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_password_rejected() {
        let mut config = valid_config();
        config.auth.password.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_log_format_rejected() {
        let mut config = valid_config();
        config.logging.format = String::from("yaml");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_helpers() {
        let config = valid_config();
        assert_eq!(config.probe.interval(), Duration::from_secs(5));
        assert_eq!(config.probe.timeout(), Duration::from_secs(2));
        assert_eq!(config.runtime.operation_timeout(), Duration::from_secs(10));
        assert_eq!(
            config.events.reconnect_base_delay(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_parse_nodes_env() {
        let nodes = parse_nodes_env("master1, volume1:volume ,filer1:filer,");
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].name, "master1");
        assert_eq!(nodes[0].role, None);
        assert_eq!(nodes[1].name, "volume1");
        assert_eq!(nodes[1].role, Some(NodeRole::Volume));
        assert_eq!(nodes[2].role, Some(NodeRole::Filer));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
host = "127.0.0.1"
port = 9000
enable_cors = false
enable_request_logging = true

[probe]
interval_secs = 10
timeout_secs = 3
failure_threshold = 5

[[cluster.nodes]]
name = "master1"

[[cluster.nodes]]
name = "store-a"
role = "volume"
container = "seaweed_volume_a"

[auth]
username = "ops"
password = "hunter2"
protect_reads = true
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert!(!config.server.enable_cors);
        assert_eq!(config.probe.failure_threshold, 5);
        assert_eq!(config.cluster.nodes.len(), 2);
        assert_eq!(config.cluster.nodes[1].role, Some(NodeRole::Volume));
        assert_eq!(
            config.cluster.nodes[1].container.as_deref(),
            Some("seaweed_volume_a")
        );
        assert!(config.auth.protect_reads);
        // Unspecified sections fall back to defaults.
        assert_eq!(config.events.buffer_capacity, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_missing() {
        assert!(Config::from_file(Path::new("/nonexistent/kelpie.toml")).is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("KELPIE_PORT", "9999");
        std::env::set_var("KELPIE_NODES", "master1,filer1");
        std::env::set_var("KELPIE_ADMIN_PASSWORD", "from-env");
        std::env::set_var("KELPIE_PROTECT_READS", "true");

        let config = Config::from_env();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.cluster.nodes.len(), 2);
        assert_eq!(config.auth.password, "from-env");
        assert!(config.auth.protect_reads);

        std::env::remove_var("KELPIE_PORT");
        std::env::remove_var("KELPIE_NODES");
        std::env::remove_var("KELPIE_ADMIN_PASSWORD");
        std::env::remove_var("KELPIE_PROTECT_READS");
    }

    #[test]
    #[serial]
    fn test_env_ignores_unparseable_numbers() {
        std::env::set_var("KELPIE_PORT", "not-a-port");

        let config = Config::from_env();
        assert_eq!(config.server.port, 8080);

        std::env::remove_var("KELPIE_PORT");
    }
}
