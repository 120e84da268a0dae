//! Message types exchanged between clients, servers and agents.
//!
//! A [`Message`] is either a concrete [`Msg`] or a [`Placeholder`] standing in
//! for a reply that has not been computed yet. Placeholders carry only a
//! locator (host, port, agent id, task id); the first read of a semantic
//! field resolves them against the origin server and replaces the variant in
//! place, so resolution happens at most once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::rpc::client::RpcClient;
use crate::rpc::RpcError;

/// Status tag carried by failure messages.
pub const STATUS_ERROR: &str = "ERROR";

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The document is not valid JSON or does not match the schema.
    #[error("Malformed message document: {0}")]
    Json(#[from] serde_json::Error),
    /// A binary payload is not valid base64.
    #[error("Malformed binary payload: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The agent constructor blob declares a version this build cannot read.
    #[error("Unsupported agent config version {0}")]
    UnsupportedVersion(u32),
    /// The payload decoded, but its shape is not usable in this position.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

fn default_role() -> String {
    "assistant".to_string()
}

/// A concrete domain message.
///
/// Value object: encoding and decoding round-trips every field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Msg {
    /// Speaker label.
    pub name: String,
    /// Speaker role, defaults to `assistant`.
    #[serde(default = "default_role")]
    pub role: String,
    /// Opaque content; string, structured value, or null.
    #[serde(default)]
    pub content: Value,
    /// Optional resource reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Stable message id.
    pub id: Uuid,
    /// Identifier of the deferred server-side task this message refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<u64>,
    /// Set to [`STATUS_ERROR`] on failure-carrying messages.
    #[serde(
        rename = "__status",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<String>,
}

impl Msg {
    /// Creates a message with the default `assistant` role.
    pub fn new(name: impl Into<String>, content: impl Into<Value>) -> Self {
        Self::with_role(name, default_role(), content)
    }

    /// Creates a message with an explicit role.
    pub fn with_role(
        name: impl Into<String>,
        role: impl Into<String>,
        content: impl Into<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            content: content.into(),
            url: None,
            timestamp: Utc::now(),
            id: Uuid::new_v4(),
            task_id: None,
            status: None,
        }
    }

    /// Creates a failure-carrying message tagged with [`STATUS_ERROR`].
    pub fn error(content: impl Into<String>) -> Self {
        let mut msg = Msg::new(STATUS_ERROR, Value::String(content.into()));
        msg.status = Some(STATUS_ERROR.to_string());
        msg
    }

    /// Whether this message carries a failure.
    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some(STATUS_ERROR)
    }
}

/// Locator for a reply that is still being computed on a remote server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Placeholder {
    /// Name of the agent that will produce the reply.
    pub name: String,
    /// Host of the origin server.
    pub host: String,
    /// Port of the origin server.
    pub port: u16,
    /// Agent the task was dispatched to.
    pub agent_id: String,
    /// Task to fetch on resolution.
    pub task_id: u64,
}

/// A message that is either concrete or a deferred result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "__type")]
pub enum Message {
    /// A concrete message.
    Msg(Msg),
    /// An unresolved reply; resolves to a concrete message on first read.
    Placeholder(Placeholder),
}

impl Message {
    /// Speaker label, available without resolving.
    pub fn name(&self) -> &str {
        match self {
            Message::Msg(m) => &m.name,
            Message::Placeholder(p) => &p.name,
        }
    }

    /// Task id, available without resolving.
    pub fn task_id(&self) -> Option<u64> {
        match self {
            Message::Msg(m) => m.task_id,
            Message::Placeholder(p) => Some(p.task_id),
        }
    }

    /// Whether this message is still unresolved.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Message::Placeholder(_))
    }

    /// The concrete message, if already available.
    pub fn as_msg(&self) -> Option<&Msg> {
        match self {
            Message::Msg(m) => Some(m),
            Message::Placeholder(_) => None,
        }
    }

    /// Resolves this message in place and returns the concrete value.
    ///
    /// For a placeholder this issues a single `_get` call to the origin
    /// server and blocks until the task completes, expires, or the
    /// connection drops. Once resolved, later calls return the stored value
    /// without touching the network. Business failures do not surface here:
    /// the resolved message may carry [`STATUS_ERROR`] instead.
    pub async fn resolve(&mut self) -> Result<&Msg, RpcError> {
        if let Message::Placeholder(p) = &*self {
            let client = RpcClient::new(p.host.clone(), p.port, p.agent_id.clone());
            let msg = client.get_result(p.task_id).await?;
            *self = Message::Msg(msg);
        }
        match self {
            Message::Msg(m) => Ok(m),
            Message::Placeholder(p) => Err(RpcError::Unresolvable(p.task_id)),
        }
    }

    /// Resolves if necessary and returns the content.
    pub async fn content(&mut self) -> Result<&Value, RpcError> {
        Ok(&self.resolve().await?.content)
    }

    /// Resolves if necessary and returns the resource reference.
    pub async fn url(&mut self) -> Result<Option<&str>, RpcError> {
        Ok(self.resolve().await?.url.as_deref())
    }

    /// Encodes this message as a self-describing JSON document.
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a message from its JSON form.
    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encodes a sequence of messages, each with its own type tag.
    pub fn batch_to_json(msgs: &[Message]) -> Result<String, CodecError> {
        Ok(serde_json::to_string(msgs)?)
    }

    /// Decodes a sequence of messages.
    pub fn batch_from_json(text: &str) -> Result<Vec<Message>, CodecError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl From<Msg> for Message {
    fn from(msg: Msg) -> Self {
        Message::Msg(msg)
    }
}
