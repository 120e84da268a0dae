//! Built-in demo agent classes.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{generate_agent_id, registry, Agent, AgentConfig, AgentId};
use crate::message::{Message, Msg};

/// An agent whose reply repeats the content of its input.
///
/// The speaker name comes from the `name` kwarg, falling back to the first
/// positional argument, then to `"echo"`.
pub struct EchoAgent {
    name: String,
    agent_id: AgentId,
    init_settings: AgentConfig,
}

impl EchoAgent {
    /// Class name this agent registers under.
    pub const CLASS_NAME: &'static str = "echo";

    /// Builds an instance from a constructor blob.
    pub fn from_config(config: AgentConfig) -> anyhow::Result<Self> {
        let name = config
            .kwargs
            .get("name")
            .and_then(Value::as_str)
            .or_else(|| config.args.first().and_then(Value::as_str))
            .unwrap_or(Self::CLASS_NAME)
            .to_string();
        Ok(Self {
            name,
            agent_id: generate_agent_id(),
            init_settings: config,
        })
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn set_agent_id(&mut self, agent_id: AgentId) {
        self.agent_id = agent_id;
    }

    fn init_settings(&self) -> &AgentConfig {
        &self.init_settings
    }

    async fn reply(&self, input: Option<Message>) -> anyhow::Result<Message> {
        let content = input
            .as_ref()
            .and_then(Message::as_msg)
            .map(|msg| msg.content.clone())
            .unwrap_or(Value::Null);
        Ok(Message::Msg(Msg::new(self.name.clone(), content)))
    }

    async fn observe(&self, inputs: Vec<Message>) -> anyhow::Result<()> {
        debug!("agent [{}] observed {} message(s)", self.agent_id, inputs.len());
        Ok(())
    }
}

/// Registers the built-in agent classes; safe to call more than once.
pub fn register_builtin_agents() {
    registry::register_agent_class(EchoAgent::CLASS_NAME, |config| {
        Ok(Box::new(EchoAgent::from_config(config)?) as Box<dyn Agent>)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_repeats_content() {
        let agent = EchoAgent::from_config(AgentConfig::new("echo").kwarg("name", "parrot"))
            .unwrap();
        let input = Message::Msg(Msg::new("user", "hello"));
        let mut reply = agent.reply(Some(input)).await.unwrap();
        assert_eq!(*reply.content().await.unwrap(), "hello");
        assert_eq!(reply.name(), "parrot");
    }

    #[tokio::test]
    async fn test_echo_null_on_missing_input() {
        let agent = EchoAgent::from_config(AgentConfig::new("echo")).unwrap();
        let reply = agent.reply(None).await.unwrap();
        assert_eq!(reply.as_msg().unwrap().content, Value::Null);
        assert_eq!(reply.name(), "echo");
    }

    #[test]
    fn test_name_from_positional_arg() {
        let agent = EchoAgent::from_config(AgentConfig::new("echo").arg("polly")).unwrap();
        assert_eq!(agent.name(), "polly");
    }
}
