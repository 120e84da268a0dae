//! Per-server pool of live agent instances.
//!
//! Maps `agent_id` to the instance and serializes create/clone/delete under
//! one mutex. Handlers take `Arc` clones of instances, so deleting an agent
//! while one of its replies is in flight leaves the worker holding a live
//! handle rather than faulting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::info;

use super::{registry, Agent, AgentConfig, AgentId};

/// Errors from agent lifecycle operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The agent id is not present in the pool.
    #[error("Agent [{0}] not exists")]
    NotFound(AgentId),
    /// The constructor blob names a class nobody registered.
    #[error("Unknown agent class [{0}]")]
    UnknownClass(String),
    /// Creation of a new agent was requested without a constructor blob.
    #[error("Agent [{0}] has no constructor config")]
    MissingConfig(AgentId),
    /// The class factory failed.
    #[error("Failed to construct agent of class [{class_name}]: {source:#}")]
    Construction {
        /// Class whose factory failed.
        class_name: String,
        /// Underlying construction failure.
        #[source]
        source: anyhow::Error,
    },
}

/// Thread-safe map from agent id to live instance.
#[derive(Clone, Default)]
pub struct AgentPool {
    agents: Arc<Mutex<HashMap<AgentId, Arc<dyn Agent>>>>,
}

impl AgentPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the agent exists.
    pub fn exists(&self, agent_id: &str) -> bool {
        self.agents.lock().unwrap().contains_key(agent_id)
    }

    /// Point lookup returning a shared handle.
    pub fn get(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.lock().unwrap().get(agent_id).cloned()
    }

    /// Creates an agent under the requested id.
    ///
    /// No-op when the id already exists. Otherwise the class registry builds
    /// the instance from the blob and its id is forced to `agent_id` before
    /// insertion, so there are never partial entries.
    pub fn create(&self, agent_id: &str, config: Option<AgentConfig>) -> Result<(), PoolError> {
        let mut agents = self.agents.lock().unwrap();
        if agents.contains_key(agent_id) {
            return Ok(());
        }
        let config = config.ok_or_else(|| PoolError::MissingConfig(agent_id.to_string()))?;
        let mut agent = build_agent(&config)?;
        agent.set_agent_id(agent_id.to_string());
        agents.insert(agent_id.to_string(), Arc::from(agent));
        info!("create agent instance [{agent_id}]");
        Ok(())
    }

    /// Deletes the agent if present; no-op otherwise.
    pub fn delete(&self, agent_id: &str) {
        if self.agents.lock().unwrap().remove(agent_id).is_some() {
            info!("delete agent instance [{agent_id}]");
        }
    }

    /// Clones an agent from its recorded `init_settings`.
    ///
    /// The clone gets a freshly generated id, which is returned.
    pub fn clone_agent(&self, agent_id: &str) -> Result<AgentId, PoolError> {
        let source = self
            .get(agent_id)
            .ok_or_else(|| PoolError::NotFound(agent_id.to_string()))?;
        let agent = build_agent(source.init_settings())?;
        let new_id = agent.agent_id().to_string();
        self.agents
            .lock()
            .unwrap()
            .insert(new_id.clone(), Arc::from(agent));
        info!("clone agent instance [{agent_id}] into [{new_id}]");
        Ok(new_id)
    }

    /// Number of live agents.
    pub fn len(&self) -> usize {
        self.agents.lock().unwrap().len()
    }

    /// Whether the pool holds no agents.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_agent(config: &AgentConfig) -> Result<Box<dyn Agent>, PoolError> {
    let factory = registry::agent_class(&config.class_name)
        .ok_or_else(|| PoolError::UnknownClass(config.class_name.clone()))?;
    factory(config.clone()).map_err(|source| PoolError::Construction {
        class_name: config.class_name.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::builtin::register_builtin_agents;
    use crate::agent::builtin::EchoAgent;

    fn echo_config() -> AgentConfig {
        AgentConfig::new(EchoAgent::CLASS_NAME).kwarg("name", "echo-under-test")
    }

    #[test]
    fn test_create_exists_delete() {
        register_builtin_agents();
        let pool = AgentPool::new();
        assert!(!pool.exists("a1"));

        pool.create("a1", Some(echo_config())).unwrap();
        assert!(pool.exists("a1"));
        assert_eq!(pool.get("a1").unwrap().agent_id(), "a1");

        pool.delete("a1");
        assert!(!pool.exists("a1"));
        // Deleting again is a no-op.
        pool.delete("a1");
    }

    #[test]
    fn test_create_existing_id_is_noop() {
        register_builtin_agents();
        let pool = AgentPool::new();
        pool.create("a1", Some(echo_config())).unwrap();
        let first = pool.get("a1").unwrap();

        // Second create with no config would fail if it tried to construct.
        pool.create("a1", None).unwrap();
        assert!(Arc::ptr_eq(&first, &pool.get("a1").unwrap()));
    }

    #[test]
    fn test_create_without_config_fails() {
        let pool = AgentPool::new();
        let err = pool.create("a1", None).unwrap_err();
        assert!(matches!(err, PoolError::MissingConfig(_)));
    }

    #[test]
    fn test_create_unknown_class_fails() {
        let pool = AgentPool::new();
        let err = pool
            .create("a1", Some(AgentConfig::new("never-registered")))
            .unwrap_err();
        assert!(matches!(err, PoolError::UnknownClass(_)));
    }

    #[test]
    fn test_clone_uses_init_settings() {
        register_builtin_agents();
        let pool = AgentPool::new();
        pool.create("a1", Some(echo_config())).unwrap();

        let new_id = pool.clone_agent("a1").unwrap();
        assert_ne!(new_id, "a1");
        let cloned = pool.get(&new_id).unwrap();
        let original = pool.get("a1").unwrap();
        assert_eq!(cloned.name(), "echo-under-test");
        assert_eq!(cloned.init_settings(), original.init_settings());
    }

    #[test]
    fn test_clone_missing_agent_fails() {
        let pool = AgentPool::new();
        let err = pool.clone_agent("ghost").unwrap_err();
        assert!(matches!(err, PoolError::NotFound(_)));
    }
}
