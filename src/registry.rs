//! Static cluster registry
//!
//! Maps logical node names to their runtime identity, health endpoint, and
//! role. The registry is built from configuration once at startup and never
//! mutated afterwards, so lookups take no lock.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::NodeEntry;

// ============================================================================
// Node Role
// ============================================================================

/// Role of a storage node within the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Volume,
    Filer,
}

impl NodeRole {
    /// Infer the role from a node name by substring match, case-insensitive.
    ///
    /// Filer wins over master, master over volume, when a name contains
    /// several role substrings.
    pub fn infer(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.contains("filer") {
            Some(NodeRole::Filer)
        } else if name.contains("master") {
            Some(NodeRole::Master)
        } else if name.contains("volume") {
            Some(NodeRole::Volume)
        } else {
            None
        }
    }

    /// Default health endpoint for this role on the given host.
    ///
    /// Masters answer on the cluster status route, volume servers on their
    /// status route, and filers on the root path.
    pub fn default_health_url(&self, host: &str) -> String {
        match self {
            NodeRole::Master => format!("http://{}:9333/cluster/status", host),
            NodeRole::Volume => format!("http://{}:8080/status", host),
            NodeRole::Filer => format!("http://{}:8888/", host),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Volume => "volume",
            NodeRole::Filer => "filer",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "master" => Ok(NodeRole::Master),
            "volume" => Ok(NodeRole::Volume),
            "filer" => Ok(NodeRole::Filer),
            other => Err(format!("unknown node role: {}", other)),
        }
    }
}

// ============================================================================
// Node
// ============================================================================

/// A registered cluster node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Logical name; the API path segment operators use
    pub name: String,

    /// Role within the storage cluster
    pub role: NodeRole,

    /// Container identity handed to the runtime client
    pub container: String,

    /// Endpoint the health prober hits
    pub health_url: String,
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable name-to-node map built from configuration at startup
#[derive(Debug, PartialEq)]
pub struct ClusterRegistry {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl ClusterRegistry {
    /// Build and validate the registry from configured node entries.
    ///
    /// Fails on an empty node list, duplicate names, a node whose role can
    /// neither be read from config nor inferred from its name, and health
    /// URLs that do not parse.
    pub fn from_entries(entries: &[NodeEntry]) -> Result<Self, RegistryError> {
        if entries.is_empty() {
            return Err(RegistryError::EmptyRegistry);
        }

        let mut nodes = Vec::with_capacity(entries.len());
        let mut index = HashMap::with_capacity(entries.len());

        for entry in entries {
            if index.contains_key(&entry.name) {
                return Err(RegistryError::DuplicateNode(entry.name.clone()));
            }

            let role = match entry.role {
                Some(role) => role,
                None => NodeRole::infer(&entry.name)
                    .ok_or_else(|| RegistryError::UnknownRole(entry.name.clone()))?,
            };
            let container = entry
                .container
                .clone()
                .unwrap_or_else(|| entry.name.clone());
            let health_url = entry
                .health_url
                .clone()
                .unwrap_or_else(|| role.default_health_url(&container));

            if let Err(e) = Url::parse(&health_url) {
                return Err(RegistryError::InvalidHealthUrl {
                    node: entry.name.clone(),
                    reason: e.to_string(),
                });
            }

            index.insert(entry.name.clone(), nodes.len());
            nodes.push(Node {
                name: entry.name.clone(),
                role,
                container,
                health_url,
            });
        }

        Ok(Self { nodes, index })
    }

    /// Look up a node by logical name
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All nodes, in configuration order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Per-role counts for banners and the service info route
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.nodes.len(),
            masters: 0,
            volumes: 0,
            filers: 0,
        };
        for node in &self.nodes {
            match node.role {
                NodeRole::Master => stats.masters += 1,
                NodeRole::Volume => stats.volumes += 1,
                NodeRole::Filer => stats.filers += 1,
            }
        }
        stats
    }
}

/// Summary of registry composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub masters: usize,
    pub volumes: usize,
    pub filers: usize,
}

impl RegistryStats {
    /// Format stats for display
    pub fn display(&self) -> String {
        format!(
            "{} nodes ({} master, {} volume, {} filer)",
            self.total, self.masters, self.volumes, self.filers
        )
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Registry construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("cluster registry is empty: configure at least one node")]
    EmptyRegistry,

    #[error("duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("cannot determine role for node '{0}': set role explicitly or use a name containing master, volume, or filer")]
    UnknownRole(String),

    #[error("invalid health URL for node '{node}': {reason}")]
    InvalidHealthUrl { node: String, reason: String },
}
