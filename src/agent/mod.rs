//! Agent abstraction hosted by the platform.
//!
//! An agent is an opaque stateful object with `reply` and `observe`
//! capabilities. The platform constructs agents from a registered class name
//! plus an [`AgentConfig`] constructor blob, addresses them by `agent_id`,
//! and treats them as fully polymorphic beyond that contract.

/// Built-in demo agent classes.
pub mod builtin;
/// Per-server pool of live agent instances.
pub mod pool;
/// Process-wide registry of agent classes.
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::message::{CodecError, Message};

/// Unique identifier of an agent instance within a server.
pub type AgentId = String;

/// Current version of the constructor blob encoding.
pub const AGENT_CONFIG_VERSION: u32 = 1;

fn default_version() -> u32 {
    AGENT_CONFIG_VERSION
}

/// Serialized constructor arguments for an agent class.
///
/// The encoding is a versioned JSON document restricted to JSON values:
/// positional `args` and named `kwargs` may hold strings, numbers, booleans,
/// nulls, arrays and objects, nothing else. Documents declaring another
/// version are rejected with [`CodecError::UnsupportedVersion`]. The same
/// structure doubles as the `init_settings` every agent records at
/// construction, which cloning relies on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Encoding version, currently [`AGENT_CONFIG_VERSION`].
    #[serde(default = "default_version")]
    pub version: u32,
    /// Registered class name to construct.
    pub class_name: String,
    /// Positional constructor arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Named constructor arguments.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl AgentConfig {
    /// Creates an empty config for the given class.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            version: AGENT_CONFIG_VERSION,
            class_name: class_name.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Sets a named argument.
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    /// Encodes the blob for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a blob, rejecting unsupported versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let config: AgentConfig = serde_json::from_slice(bytes)?;
        if config.version != AGENT_CONFIG_VERSION {
            return Err(CodecError::UnsupportedVersion(config.version));
        }
        Ok(config)
    }
}

/// Capability set every hosted agent class must satisfy.
///
/// Implementations own their re-entrancy: the platform may run several
/// `reply` invocations for one instance concurrently and never serializes
/// them per agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Speaker name used on reply handshakes.
    fn name(&self) -> &str;

    /// Identifier of this instance.
    fn agent_id(&self) -> &str;

    /// Overrides the identifier; used when a client supplies its own id.
    fn set_agent_id(&mut self, agent_id: AgentId);

    /// Constructor arguments captured at construction.
    fn init_settings(&self) -> &AgentConfig;

    /// Computes a reply to the (possibly absent) input message.
    async fn reply(&self, input: Option<Message>) -> anyhow::Result<Message>;

    /// Ingests messages without producing a reply.
    async fn observe(&self, inputs: Vec<Message>) -> anyhow::Result<()>;
}

/// Generates a random agent id.
pub fn generate_agent_id() -> AgentId {
    Uuid::new_v4().simple().to_string()
}
