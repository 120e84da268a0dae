//! The platform agents run on.
//!
//! [`AgentPlatform`] implements the RPC service: it dispatches handler names
//! to implementations, schedules reply tasks on the runtime, and feeds
//! results into the bounded result pool. Reply tasks run with unbounded
//! concurrency, including several at once for the same agent; re-entrancy is
//! the agent implementation's concern, never the platform's.

/// TCP serve loop and graceful shutdown.
pub mod server;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::agent::pool::{AgentPool, PoolError};
use crate::agent::{Agent, AgentConfig};
use crate::message::{CodecError, Message, Msg};
use crate::rpc::{RpcCode, RpcError, RpcRequest, RpcResponse, TaskQuery};
use crate::task::result_pool::ResultPool;
use crate::task::TaskId;

/// Errors produced by handler dispatch.
///
/// Only registry and codec problems surface as RPC failures. Agent
/// execution failures never do: they are stored in the result pool as
/// error-tagged messages and observed by resolving the placeholder.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// `target_func` is not a recognized handler.
    #[error("Unsupported method {0}")]
    UnknownMethod(String),
    /// The addressed agent does not exist on this server.
    #[error("Agent [{0}] not exists")]
    UnknownAgent(String),
    /// Agent lifecycle operation failed.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Request payload failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A placeholder in an `_observe` batch could not be resolved.
    #[error("Failed to resolve placeholder input: {0}")]
    Resolve(#[from] RpcError),
    /// The agent's `observe` failed.
    #[error("Agent observe failed: {0:#}")]
    Observe(anyhow::Error),
}

impl PlatformError {
    fn code(&self) -> RpcCode {
        match self {
            PlatformError::UnknownMethod(_)
            | PlatformError::UnknownAgent(_)
            | PlatformError::Codec(_) => RpcCode::InvalidArgument,
            PlatformError::Pool(PoolError::Construction { .. }) => RpcCode::Internal,
            PlatformError::Pool(_) => RpcCode::InvalidArgument,
            PlatformError::Resolve(_) | PlatformError::Observe(_) => RpcCode::Internal,
        }
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(err: serde_json::Error) -> Self {
        PlatformError::Codec(CodecError::Json(err))
    }
}

/// Server-side service hosting agents and their deferred replies.
pub struct AgentPlatform {
    agents: AgentPool,
    result_pool: ResultPool,
    task_counter: AtomicU64,
}

impl AgentPlatform {
    /// Creates a platform whose result pool holds `max_pool_size` entries
    /// for at most `max_timeout`.
    pub fn new(max_pool_size: usize, max_timeout: Duration) -> Self {
        Self {
            agents: AgentPool::new(),
            result_pool: ResultPool::new(max_pool_size, max_timeout),
            task_counter: AtomicU64::new(0),
        }
    }

    /// The agent pool, exposed for embedding servers.
    pub fn agents(&self) -> &AgentPool {
        &self.agents
    }

    fn next_task_id(&self) -> TaskId {
        self.task_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Runs one RPC and maps handler errors onto response status codes.
    pub async fn call_func(&self, request: RpcRequest) -> RpcResponse {
        match self.dispatch(&request).await {
            Ok(value) => RpcResponse::ok(value),
            Err(err) => {
                error!("handler [{}] failed: {err}", request.target_func);
                RpcResponse::error(err.code(), err.to_string())
            }
        }
    }

    async fn dispatch(&self, request: &RpcRequest) -> Result<Vec<u8>, PlatformError> {
        let requires_agent = matches!(
            request.target_func.as_str(),
            "_delete_agent" | "_clone_agent" | "_reply" | "_observe"
        );
        if requires_agent && !self.agents.exists(&request.agent_id) {
            return Err(PlatformError::UnknownAgent(request.agent_id.clone()));
        }
        match request.target_func.as_str() {
            "_create_agent" => self.create_agent(request),
            "_delete_agent" => self.delete_agent(request),
            "_clone_agent" => self.clone_agent(request),
            "_reply" => self.reply(request),
            "_observe" => self.observe(request).await,
            "_get" => self.get(request).await,
            other => Err(PlatformError::UnknownMethod(other.to_string())),
        }
    }

    fn create_agent(&self, request: &RpcRequest) -> Result<Vec<u8>, PlatformError> {
        let config = if request.value.is_empty() {
            None
        } else {
            Some(AgentConfig::from_bytes(&request.value)?)
        };
        self.agents.create(&request.agent_id, config)?;
        Ok(Vec::new())
    }

    fn delete_agent(&self, request: &RpcRequest) -> Result<Vec<u8>, PlatformError> {
        self.agents.delete(&request.agent_id);
        Ok(Vec::new())
    }

    fn clone_agent(&self, request: &RpcRequest) -> Result<Vec<u8>, PlatformError> {
        let new_id = self.agents.clone_agent(&request.agent_id)?;
        Ok(new_id.into_bytes())
    }

    /// Schedules a reply task and immediately returns the handshake message
    /// carrying the fresh task id, without waiting for the agent.
    fn reply(&self, request: &RpcRequest) -> Result<Vec<u8>, PlatformError> {
        let input = decode_optional_message(&request.value)?;
        let agent = self
            .agents
            .get(&request.agent_id)
            .ok_or_else(|| PlatformError::UnknownAgent(request.agent_id.clone()))?;

        let task_id = self.next_task_id();
        self.result_pool.insert_pending(task_id);
        let pool = self.result_pool.clone();
        let worker_agent = Arc::clone(&agent);
        tokio::spawn(async move {
            process_task(pool, worker_agent, task_id, input).await;
        });

        let mut handshake = Msg::new(agent.name(), Value::Null);
        handshake.task_id = Some(task_id);
        Ok(Message::Msg(handshake).to_json()?.into_bytes())
    }

    async fn observe(&self, request: &RpcRequest) -> Result<Vec<u8>, PlatformError> {
        let text = payload_text(&request.value)?;
        let mut inputs = Message::batch_from_json(text)?;
        for message in &mut inputs {
            if message.is_placeholder() {
                message.resolve().await?;
            }
        }
        let agent = self
            .agents
            .get(&request.agent_id)
            .ok_or_else(|| PlatformError::UnknownAgent(request.agent_id.clone()))?;
        agent.observe(inputs).await.map_err(PlatformError::Observe)?;
        Ok(Vec::new())
    }

    /// Blocks until the queried task finishes, expires, or is evicted.
    async fn get(&self, request: &RpcRequest) -> Result<Vec<u8>, PlatformError> {
        let query: TaskQuery = serde_json::from_slice(&request.value)?;
        let message = match self.result_pool.wait(query.task_id).await {
            Some(message) => message,
            None => {
                debug!("task [{}] unknown or expired", query.task_id);
                Message::Msg(Msg::error(format!(
                    "Task [{}] not exists or has expired",
                    query.task_id
                )))
            }
        };
        Ok(message.to_json()?.into_bytes())
    }
}

fn payload_text(value: &[u8]) -> Result<&str, PlatformError> {
    std::str::from_utf8(value)
        .map_err(|err| PlatformError::Codec(CodecError::InvalidPayload(err.to_string())))
}

fn decode_optional_message(value: &[u8]) -> Result<Option<Message>, PlatformError> {
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(Message::from_json(payload_text(value)?)?))
}

/// Executes one reply task and stores its outcome.
///
/// A placeholder input is resolved against its origin server first. Agent
/// failures are captured as error-tagged messages; nothing escapes the
/// worker.
async fn process_task(
    pool: ResultPool,
    agent: Arc<dyn Agent>,
    task_id: TaskId,
    input: Option<Message>,
) {
    let input = match input {
        Some(mut message) => {
            if message.is_placeholder() {
                if let Err(err) = message.resolve().await {
                    let detail =
                        format!("Error in agent [{}]:\n{err:#}", agent.agent_id());
                    error!("{detail}");
                    pool.complete(task_id, Message::Msg(Msg::error(detail)));
                    return;
                }
            }
            Some(message)
        }
        None => None,
    };
    match agent.reply(input).await {
        Ok(result) => pool.complete(task_id, result),
        Err(err) => {
            let detail = format!("Error in agent [{}]:\n{err:?}", agent.agent_id());
            error!("{detail}");
            pool.complete(task_id, Message::Msg(Msg::error(detail)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::builtin::{register_builtin_agents, EchoAgent};

    fn request(target_func: &str, agent_id: &str, value: Vec<u8>) -> RpcRequest {
        RpcRequest {
            target_func: target_func.to_string(),
            agent_id: agent_id.to_string(),
            value,
        }
    }

    fn platform() -> AgentPlatform {
        register_builtin_agents();
        AgentPlatform::new(64, Duration::from_secs(60))
    }

    fn echo_blob() -> Vec<u8> {
        AgentConfig::new(EchoAgent::CLASS_NAME).to_bytes().unwrap()
    }

    #[tokio::test]
    async fn test_unknown_method_is_invalid_argument() {
        let platform = platform();
        let response = platform
            .call_func(request("_frobnicate", "a1", Vec::new()))
            .await;
        assert_eq!(response.code, RpcCode::InvalidArgument);
        assert_eq!(response.message, "Unsupported method _frobnicate");
    }

    #[tokio::test]
    async fn test_missing_agent_is_invalid_argument() {
        let platform = platform();
        let response = platform.call_func(request("_reply", "ghost", Vec::new())).await;
        assert_eq!(response.code, RpcCode::InvalidArgument);
        assert_eq!(response.message, "Agent [ghost] not exists");
    }

    #[tokio::test]
    async fn test_create_then_reply_then_get() {
        let platform = platform();
        let created = platform
            .call_func(request("_create_agent", "a1", echo_blob()))
            .await;
        assert_eq!(created.code, RpcCode::Ok);

        let input = Message::Msg(Msg::new("user", "ping"));
        let handshake = platform
            .call_func(request("_reply", "a1", input.to_json().unwrap().into_bytes()))
            .await;
        assert_eq!(handshake.code, RpcCode::Ok);
        let handshake =
            Message::from_json(std::str::from_utf8(&handshake.value).unwrap()).unwrap();
        let task_id = handshake.task_id().expect("handshake carries a task id");
        assert_eq!(handshake.as_msg().unwrap().content, Value::Null);

        let query = serde_json::to_vec(&TaskQuery { task_id }).unwrap();
        let fetched = platform.call_func(request("_get", "", query)).await;
        assert_eq!(fetched.code, RpcCode::Ok);
        let result = Message::from_json(std::str::from_utf8(&fetched.value).unwrap()).unwrap();
        assert_eq!(result.as_msg().unwrap().content, "ping");
    }

    #[tokio::test]
    async fn test_task_ids_strictly_increase() {
        let platform = platform();
        platform
            .call_func(request("_create_agent", "a1", echo_blob()))
            .await;

        let mut last = 0;
        for _ in 0..5 {
            let response = platform.call_func(request("_reply", "a1", Vec::new())).await;
            let handshake =
                Message::from_json(std::str::from_utf8(&response.value).unwrap()).unwrap();
            let task_id = handshake.task_id().unwrap();
            assert!(task_id > last);
            last = task_id;
        }
    }

    #[tokio::test]
    async fn test_get_unknown_task_returns_error_msg_in_band() {
        let platform = platform();
        let query = serde_json::to_vec(&TaskQuery { task_id: 4242 }).unwrap();
        let response = platform.call_func(request("_get", "", query)).await;
        // Not an RPC failure: the error travels in-band.
        assert_eq!(response.code, RpcCode::Ok);
        let message = Message::from_json(std::str::from_utf8(&response.value).unwrap()).unwrap();
        assert!(message.as_msg().unwrap().is_error());
    }

    #[tokio::test]
    async fn test_create_unknown_class_is_rpc_error() {
        let platform = platform();
        let blob = AgentConfig::new("never-registered").to_bytes().unwrap();
        let response = platform.call_func(request("_create_agent", "a1", blob)).await;
        assert_eq!(response.code, RpcCode::InvalidArgument);
        assert!(response.message.contains("never-registered"));
    }

    #[tokio::test]
    async fn test_clone_returns_new_agent_id() {
        let platform = platform();
        platform
            .call_func(request("_create_agent", "a1", echo_blob()))
            .await;
        let response = platform.call_func(request("_clone_agent", "a1", Vec::new())).await;
        assert_eq!(response.code, RpcCode::Ok);
        let new_id = String::from_utf8(response.value).unwrap();
        assert_ne!(new_id, "a1");
        assert!(platform.agents().exists(&new_id));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let platform = platform();
        platform
            .call_func(request("_create_agent", "a1", echo_blob()))
            .await;
        assert_eq!(
            platform
                .call_func(request("_delete_agent", "a1", Vec::new()))
                .await
                .code,
            RpcCode::Ok
        );
        // Second delete fails the existence check in dispatch.
        assert_eq!(
            platform
                .call_func(request("_delete_agent", "a1", Vec::new()))
                .await
                .code,
            RpcCode::InvalidArgument
        );
    }

    #[tokio::test]
    async fn test_observe_accepts_batch() {
        let platform = platform();
        platform
            .call_func(request("_create_agent", "a1", echo_blob()))
            .await;
        let batch = Message::batch_to_json(&[
            Message::Msg(Msg::new("u", "one")),
            Message::Msg(Msg::new("u", "two")),
        ])
        .unwrap();
        let response = platform
            .call_func(request("_observe", "a1", batch.into_bytes()))
            .await;
        assert_eq!(response.code, RpcCode::Ok);
        assert!(response.value.is_empty());
    }
}
