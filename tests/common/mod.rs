//! Shared fixtures: agent classes exercising the platform from tests.

use async_trait::async_trait;
use rpc_ai_agents::agent::builtin::register_builtin_agents;
use rpc_ai_agents::agent::registry::register_agent_class;
use rpc_ai_agents::agent::{generate_agent_id, Agent, AgentConfig, AgentId};
use rpc_ai_agents::message::{Message, Msg};
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

/// An agent whose `reply` always fails.
pub struct BoomAgent {
    agent_id: AgentId,
    init_settings: AgentConfig,
}

#[async_trait]
impl Agent for BoomAgent {
    fn name(&self) -> &str {
        "boom"
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

    async fn reply(&self, _input: Option<Message>) -> anyhow::Result<Message> {
        anyhow::bail!("BoomAgent always explodes")
    }

    async fn observe(&self, _inputs: Vec<Message>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An agent that sleeps for `delay_ms` before echoing its input.
pub struct SleepyAgent {
    agent_id: AgentId,
    init_settings: AgentConfig,
    delay: Duration,
}

#[async_trait]
impl Agent for SleepyAgent {
    fn name(&self) -> &str {
        "sleepy"
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
        tokio::time::sleep(self.delay).await;
        let content = input
            .as_ref()
            .and_then(Message::as_msg)
            .map(|msg| msg.content.clone())
            .unwrap_or(Value::Null);
        Ok(Message::Msg(Msg::new("sleepy", content)))
    }

    async fn observe(&self, _inputs: Vec<Message>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An agent that records everything it observes.
///
/// Its `reply` returns the recorded contents, which lets tests check what
/// `observe` actually delivered.
pub struct TapeAgent {
    agent_id: AgentId,
    init_settings: AgentConfig,
    observed: Mutex<Vec<Value>>,
}

#[async_trait]
impl Agent for TapeAgent {
    fn name(&self) -> &str {
        "tape"
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

    async fn reply(&self, _input: Option<Message>) -> anyhow::Result<Message> {
        let observed = self.observed.lock().unwrap().clone();
        Ok(Message::Msg(Msg::new("tape", Value::Array(observed))))
    }

    async fn observe(&self, inputs: Vec<Message>) -> anyhow::Result<()> {
        let mut observed = self.observed.lock().unwrap();
        for message in &inputs {
            let content = message
                .as_msg()
                .map(|msg| msg.content.clone())
                .unwrap_or(Value::Null);
            observed.push(content);
        }
        Ok(())
    }
}

/// Registers every test agent class plus the built-ins.
pub fn register_test_agents() {
    register_builtin_agents();
    register_agent_class("boom", |config| {
        Ok(Box::new(BoomAgent {
            agent_id: generate_agent_id(),
            init_settings: config,
        }) as Box<dyn Agent>)
    });
    register_agent_class("sleepy", |config| {
        let delay_ms = config
            .kwargs
            .get("delay_ms")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(Box::new(SleepyAgent {
            agent_id: generate_agent_id(),
            delay: Duration::from_millis(delay_ms),
            init_settings: config,
        }) as Box<dyn Agent>)
    });
    register_agent_class("tape", |config| {
        Ok(Box::new(TapeAgent {
            agent_id: generate_agent_id(),
            init_settings: config,
            observed: Mutex::new(Vec::new()),
        }) as Box<dyn Agent>)
    });
}
