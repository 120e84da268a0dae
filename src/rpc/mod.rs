//! Framed unary RPC transport.
//!
//! Every call is one request frame and one response frame. Frames are
//! length-delimited with a hard size limit; the body is a JSON envelope
//! whose opaque payload bytes travel base64-armored. The envelope carries
//! three fields only: the target handler name, the agent id, and the
//! payload.

/// Client side of the transport.
pub mod client;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::codec::LengthDelimitedCodec;

use crate::message::CodecError;
use crate::task::TaskId;

/// Hard cap on a single request or response frame.
pub const MAX_FRAME_LENGTH: usize = 10 * 1024 * 1024; // 10MB

/// Builds the frame codec shared by both ends of a connection.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

/// Request envelope: which handler to run, on which agent, with what payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    /// Handler name, e.g. `_reply`.
    pub target_func: String,
    /// Agent the call addresses; may be empty for `_get`.
    #[serde(default)]
    pub agent_id: String,
    /// Handler-specific payload.
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<u8>,
}

/// Status of a finished call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcCode {
    /// The handler ran; the payload is its result.
    Ok,
    /// Unknown method, missing agent, or malformed payload.
    InvalidArgument,
    /// The handler failed for another reason.
    Internal,
}

/// Response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    /// Call status.
    pub code: RpcCode,
    /// Human-readable detail for non-`Ok` codes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Handler result payload; empty for side-effect-only handlers.
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<u8>,
}

impl RpcResponse {
    /// A successful response carrying a payload.
    pub fn ok(value: Vec<u8>) -> Self {
        Self {
            code: RpcCode::Ok,
            message: String::new(),
            value,
        }
    }

    /// A successful response with no payload.
    pub fn empty() -> Self {
        Self::ok(Vec::new())
    }

    /// A failed response.
    pub fn error(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            value: Vec::new(),
        }
    }
}

/// Payload of a `_get` call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskQuery {
    /// Task to fetch.
    pub task_id: TaskId,
}

/// Errors seen by RPC callers.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The server answered with a non-`Ok` status.
    #[error("Rpc failed with {code:?}: {message}")]
    Status {
        /// Status code the server returned.
        code: RpcCode,
        /// Detail message the server returned.
        message: String,
    },
    /// The connection dropped before a response frame arrived.
    #[error("Connection closed before a response arrived")]
    ConnectionClosed,
    /// A `_get` returned yet another placeholder instead of a concrete value.
    #[error("Task [{0}] resolved to another placeholder")]
    Unresolvable(TaskId),
    /// Transport failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Envelope or payload failed to encode or decode.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        RpcError::Codec(CodecError::Json(err))
    }
}
