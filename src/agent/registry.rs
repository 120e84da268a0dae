//! Process-wide registry of agent classes.
//!
//! Agent classes are looked up by name at `_create_agent` time. Each
//! agent-implementation module registers its constructor once at startup;
//! no reflection is involved.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use tracing::debug;

use super::{Agent, AgentConfig};

/// Constructor function for a registered agent class.
pub type AgentFactory =
    Arc<dyn Fn(AgentConfig) -> anyhow::Result<Box<dyn Agent>> + Send + Sync>;

static AGENT_CLASSES: Lazy<RwLock<HashMap<String, AgentFactory>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Registers an agent class under `class_name`.
///
/// Registering the same name again replaces the previous factory.
pub fn register_agent_class<F>(class_name: impl Into<String>, factory: F)
where
    F: Fn(AgentConfig) -> anyhow::Result<Box<dyn Agent>> + Send + Sync + 'static,
{
    let class_name = class_name.into();
    debug!("register agent class [{class_name}]");
    AGENT_CLASSES
        .write()
        .unwrap()
        .insert(class_name, Arc::new(factory));
}

/// Looks up the constructor for a class name.
pub fn agent_class(class_name: &str) -> Option<AgentFactory> {
    AGENT_CLASSES.read().unwrap().get(class_name).cloned()
}

/// Names of all registered classes.
pub fn registered_classes() -> Vec<String> {
    AGENT_CLASSES.read().unwrap().keys().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::builtin::EchoAgent;

    #[test]
    fn test_register_and_lookup() {
        register_agent_class("registry-test-echo", |config| {
            Ok(Box::new(EchoAgent::from_config(config)?) as Box<dyn Agent>)
        });

        let factory = agent_class("registry-test-echo").expect("class should be registered");
        let agent = factory(AgentConfig::new("registry-test-echo")).unwrap();
        assert_eq!(agent.init_settings().class_name, "registry-test-echo");
        assert!(registered_classes().contains(&"registry-test-echo".to_string()));
    }

    #[test]
    fn test_unknown_class_is_none() {
        assert!(agent_class("no-such-class").is_none());
    }
}
