//! Client side of the agent RPC transport.
//!
//! Each call opens its own connection, sends one request frame and awaits
//! one response frame. Clients are cheap value objects bound to a
//! `(host, port, agent_id)` triple.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use super::{frame_codec, RpcCode, RpcError, RpcRequest, RpcResponse, TaskQuery};
use crate::agent::AgentConfig;
use crate::message::{CodecError, Message, Msg};
use crate::task::TaskId;

/// Client bound to one agent on one server.
#[derive(Debug, Clone)]
pub struct RpcClient {
    host: String,
    port: u16,
    agent_id: String,
}

impl RpcClient {
    /// Creates a client for `agent_id` at `host:port`.
    pub fn new(host: impl Into<String>, port: u16, agent_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            agent_id: agent_id.into(),
        }
    }

    /// Agent this client addresses.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Server host this client connects to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port this client connects to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Issues one unary call and returns the raw response payload.
    pub async fn call_func(&self, target_func: &str, value: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        debug!(
            "calling [{target_func}] on agent [{}] at {}:{}",
            self.agent_id, self.host, self.port
        );
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let mut framed = Framed::new(stream, frame_codec());

        let request = RpcRequest {
            target_func: target_func.to_string(),
            agent_id: self.agent_id.clone(),
            value,
        };
        framed
            .send(Bytes::from(serde_json::to_vec(&request)?))
            .await?;

        let frame = framed.next().await.ok_or(RpcError::ConnectionClosed)??;
        let response: RpcResponse = serde_json::from_slice(&frame)?;
        match response.code {
            RpcCode::Ok => Ok(response.value),
            code => Err(RpcError::Status {
                code,
                message: response.message,
            }),
        }
    }

    /// Creates the agent on the server from a constructor blob.
    pub async fn create_agent(&self, config: Option<&AgentConfig>) -> Result<(), RpcError> {
        let value = match config {
            Some(config) => config.to_bytes()?,
            None => Vec::new(),
        };
        self.call_func("_create_agent", value).await?;
        Ok(())
    }

    /// Deletes the agent on the server.
    pub async fn delete_agent(&self) -> Result<(), RpcError> {
        self.call_func("_delete_agent", Vec::new()).await?;
        Ok(())
    }

    /// Clones the agent on the server, returning the new agent id.
    pub async fn clone_agent(&self) -> Result<String, RpcError> {
        let bytes = self.call_func("_clone_agent", Vec::new()).await?;
        String::from_utf8(bytes)
            .map_err(|err| CodecError::InvalidPayload(err.to_string()).into())
    }

    /// Schedules a reply task; returns the handshake message carrying its
    /// task id without waiting for the reply itself.
    pub async fn reply(&self, input: Option<&Message>) -> Result<Msg, RpcError> {
        let value = match input {
            Some(message) => message.to_json()?.into_bytes(),
            None => Vec::new(),
        };
        let bytes = self.call_func("_reply", value).await?;
        decode_concrete(&bytes)
    }

    /// Delivers messages to the agent's `observe`.
    pub async fn observe(&self, inputs: &[Message]) -> Result<(), RpcError> {
        let value = Message::batch_to_json(inputs)?.into_bytes();
        self.call_func("_observe", value).await?;
        Ok(())
    }

    /// Fetches the result of a task, blocking until it completes or expires.
    pub async fn get_result(&self, task_id: TaskId) -> Result<Msg, RpcError> {
        let value = serde_json::to_vec(&TaskQuery { task_id })?;
        let bytes = self.call_func("_get", value).await?;
        decode_concrete(&bytes)
    }
}

fn decode_concrete(bytes: &[u8]) -> Result<Msg, RpcError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| CodecError::InvalidPayload(err.to_string()))?;
    match Message::from_json(text)? {
        Message::Msg(msg) => Ok(msg),
        Message::Placeholder(placeholder) => Err(RpcError::Unresolvable(placeholder.task_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_concrete_accepts_msg() {
        let wire = Message::Msg(Msg::new("a", "x")).to_json().unwrap();
        let msg = decode_concrete(wire.as_bytes()).unwrap();
        assert_eq!(msg.name, "a");
    }

    #[test]
    fn test_decode_concrete_rejects_placeholder() {
        let wire = Message::Placeholder(crate::message::Placeholder {
            name: "a".to_string(),
            host: "h".to_string(),
            port: 1,
            agent_id: "x".to_string(),
            task_id: 9,
        })
        .to_json()
        .unwrap();
        let err = decode_concrete(wire.as_bytes()).unwrap_err();
        assert!(matches!(err, RpcError::Unresolvable(9)));
    }
}
