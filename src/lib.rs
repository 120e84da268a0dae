//! RPC AI Agents - a distributed platform for stateful AI agents
//!
//! This library hosts long-lived agent objects on platform servers,
//! dispatches asynchronous reply tasks to them, and hands results back to
//! callers as placeholders that resolve lazily on first read. Servers run
//! supervised on background threads with automatic port selection; clients
//! talk to them over a framed unary RPC transport.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Agent trait, class registry, and per-server agent pool
pub mod agent;
/// Configuration and logging
pub mod core;
/// Supervised server lifecycle and port selection
pub mod launcher;
/// Messages, placeholders, and their codec
pub mod message;
/// The RPC service hosting agents
pub mod platform;
/// Client-side agent proxy
pub mod proxy;
/// Framed unary RPC transport
pub mod rpc;
/// Task ids and the bounded result pool
pub mod task;

/// Re-exports of commonly used types
pub mod prelude {
    pub use crate::agent::builtin::{register_builtin_agents, EchoAgent};
    pub use crate::agent::registry::register_agent_class;
    pub use crate::agent::{Agent, AgentConfig, AgentId};
    pub use crate::core::{
        config::{ConfigError, InitConfig, PlatformConfig},
        logging::{init_default_logging, init_logging, LogFormat, LoggingConfig, LoggingError},
    };
    pub use crate::launcher::ServerLauncher;
    pub use crate::message::{Message, Msg, Placeholder};
    pub use crate::platform::AgentPlatform;
    pub use crate::proxy::{RpcAgent, RpcAgentConfig};
    pub use crate::rpc::client::RpcClient;
}

/// Result type for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Message or blob codec errors
    #[error("Codec error: {0}")]
    Codec(#[from] message::CodecError),

    /// RPC transport errors
    #[error("Rpc error: {0}")]
    Rpc(#[from] rpc::RpcError),

    /// Agent lifecycle errors
    #[error("Agent pool error: {0}")]
    Pool(#[from] agent::pool::PoolError),

    /// Server launch errors
    #[error("Launch error: {0}")]
    Launch(#[from] launcher::LaunchError),

    /// Proxy state errors
    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] core::config::ConfigError),

    /// Logging setup errors
    #[error("Logging error: {0}")]
    Logging(#[from] core::logging::LoggingError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
