//! Standalone agent platform server.
//!
//! Binds a platform server with the built-in agent classes registered and
//! serves until interrupted. Useful for hosting agents that remote
//! [`rpc_ai_agents::proxy::RpcAgent`] proxies connect to.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rpc_ai_agents::agent::builtin::register_builtin_agents;
use rpc_ai_agents::core::config::{
    PlatformConfig, DEFAULT_MAX_POOL_SIZE, DEFAULT_MAX_TIMEOUT_SECS,
};
use rpc_ai_agents::core::logging::{init_logging, LogFormat, LoggingConfig};
use rpc_ai_agents::platform::{server, AgentPlatform};
use tokio::sync::broadcast;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rpc-ai-agents")]
#[command(author, version, about = "A distributed RPC platform for hosting stateful AI agents")]
struct Cli {
    /// Port to listen on; picked automatically when omitted
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen on all interfaces instead of loopback only
    #[arg(long)]
    public: bool,

    /// Max number of task results the server can accommodate
    #[arg(long, default_value_t = DEFAULT_MAX_POOL_SIZE)]
    max_pool_size: usize,

    /// Seconds before a task result expires
    #[arg(long, default_value_t = DEFAULT_MAX_TIMEOUT_SECS)]
    max_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json, pretty, compact)
    #[arg(long, default_value = "compact")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = match cli.log_format.as_str() {
        "json" => LogFormat::Json,
        "pretty" => LogFormat::Pretty,
        _ => LogFormat::Compact,
    };
    init_logging(&LoggingConfig {
        format,
        level: cli.log_level.clone(),
    })?;

    let config = PlatformConfig {
        port: cli.port,
        local_mode: !cli.public,
        max_pool_size: cli.max_pool_size,
        max_timeout_secs: cli.max_timeout_secs,
        ..Default::default()
    };
    config.validate()?;

    register_builtin_agents();

    let listener = server::bind_server(config.port, config.local_mode).await?;
    let platform = Arc::new(AgentPlatform::new(config.max_pool_size, config.max_age()));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(());
        }
    });

    server::serve(platform, listener, shutdown_rx).await;
    Ok(())
}
