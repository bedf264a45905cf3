//! Common test utilities

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kelpie::config::{Config, NodeEntry};
use kelpie::runtime::{
    ContainerInspection, ContainerRuntime, ContainerState, RuntimeError, RuntimeResult,
};

/// In-memory container runtime for driving the API without a daemon
///
/// Holds a name -> state map, records every start/stop call, and can be
/// switched into a failure mode where every call returns a fixed error.
pub struct FakeRuntime {
    states: Mutex<HashMap<String, ContainerState>>,
    calls: Mutex<Vec<String>>,
    fail_with: Mutex<Option<RuntimeError>>,
}

impl FakeRuntime {
    pub fn new(states: &[(&str, ContainerState)]) -> Arc<Self> {
        Arc::new(Self {
            states: Mutex::new(
                states
                    .iter()
                    .map(|(name, state)| (name.to_string(), *state))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
        })
    }

    /// Every start/stop call observed, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Make every runtime call fail with the given error
    pub fn fail_with(&self, error: RuntimeError) {
        *self.fail_with.lock().unwrap() = Some(error);
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn inspect(&self, container: &str) -> RuntimeResult<ContainerInspection> {
        if let Some(error) = self.fail_with.lock().unwrap().clone() {
            return Err(error);
        }
        match self.states.lock().unwrap().get(container) {
            Some(state) => Ok(ContainerInspection {
                state: *state,
                container_id: Some("a1b2c3d4e5f6".to_string()),
                image: Some("chrislusf/seaweedfs:3.80".to_string()),
            }),
            None => Err(RuntimeError::NotFound(container.to_string())),
        }
    }

    async fn start(&self, container: &str) -> RuntimeResult<()> {
        if let Some(error) = self.fail_with.lock().unwrap().clone() {
            return Err(error);
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("start:{}", container));
        self.states
            .lock()
            .unwrap()
            .insert(container.to_string(), ContainerState::Running);
        Ok(())
    }

    async fn stop(&self, container: &str) -> RuntimeResult<()> {
        if let Some(error) = self.fail_with.lock().unwrap().clone() {
            return Err(error);
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("stop:{}", container));
        self.states
            .lock()
            .unwrap()
            .insert(container.to_string(), ContainerState::Exited);
        Ok(())
    }
}

/// Node entry with everything derived from the name
pub fn node_entry(name: &str) -> NodeEntry {
    NodeEntry {
        name: name.to_string(),
        role: None,
        container: None,
        health_url: None,
    }
}

/// Config with a two-node cluster and test credentials
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.cluster.nodes = vec![node_entry("master1"), node_entry("volume1")];
    config.auth.username = "admin".to_string();
    config.auth.password = "secret".to_string();
    config
}
