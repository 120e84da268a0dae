//! Client-side proxy for a remote agent.
//!
//! An [`RpcAgent`] either owns a local server (launched eagerly or on first
//! use) or connects to one that already runs elsewhere. Its `reply` never
//! waits for the agent's work: it returns a placeholder that resolves on
//! first read.

use thiserror::Error;
use tracing::debug;

use crate::agent::{generate_agent_id, AgentConfig, AgentId};
use crate::core::config::{InitConfig, PlatformConfig, DEFAULT_HOST};
use crate::launcher::ServerLauncher;
use crate::message::{Message, Placeholder};
use crate::rpc::client::RpcClient;
use crate::Error;

/// Errors specific to proxy state.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The proxy neither has a connection nor owns a server to launch.
    #[error("Proxy is not connected and does not own a server")]
    NotConnected,
    /// The server's reply handshake did not carry a task id.
    #[error("Reply handshake did not carry a task id")]
    MissingTaskId,
}

/// Options for constructing an [`RpcAgent`].
#[derive(Debug, Clone)]
pub struct RpcAgentConfig {
    /// Name of the agent; placeholders returned by `reply` carry it.
    pub name: String,
    /// Hostname of the server; ignored (forced to loopback) when the proxy
    /// launches its own.
    pub host: String,
    /// Port of an already-running server; `None` makes the proxy own one.
    pub port: Option<u16>,
    /// Constructor blob sent with `_create_agent`.
    pub agent_config: Option<AgentConfig>,
    /// Result pool capacity of an owned server.
    pub max_pool_size: usize,
    /// Result TTL of an owned server, in seconds.
    pub max_timeout_secs: u64,
    /// Whether an owned server binds loopback only.
    pub local_mode: bool,
    /// Defer launching an owned server until the first call.
    pub lazy_launch: bool,
    /// Agent id to use; generated randomly when absent.
    pub agent_id: Option<AgentId>,
    /// Assume the remote agent already exists instead of creating it.
    pub connect_existing: bool,
    /// Process-init settings an owned server replays at startup.
    pub init: Option<InitConfig>,
}

impl RpcAgentConfig {
    /// Options with defaults for a proxy named `name` that owns a lazily
    /// launched local server.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: DEFAULT_HOST.to_string(),
            port: None,
            agent_config: None,
            max_pool_size: crate::core::config::DEFAULT_MAX_POOL_SIZE,
            max_timeout_secs: crate::core::config::DEFAULT_MAX_TIMEOUT_SECS,
            local_mode: true,
            lazy_launch: true,
            agent_id: None,
            connect_existing: false,
            init: None,
        }
    }
}

/// Proxy to an agent hosted on a platform server.
pub struct RpcAgent {
    name: String,
    host: String,
    port: Option<u16>,
    agent_id: AgentId,
    agent_config: Option<AgentConfig>,
    client: Option<RpcClient>,
    launcher: Option<ServerLauncher>,
}

impl RpcAgent {
    /// Constructs a proxy according to `config`.
    ///
    /// Without a port the proxy owns a local server and, unless
    /// `lazy_launch` is set, starts it and creates the remote agent now.
    /// With a port it connects to the existing server and, unless
    /// `connect_existing` is set, creates the remote agent there.
    pub async fn new(config: RpcAgentConfig) -> Result<Self, Error> {
        let agent_id = config.agent_id.unwrap_or_else(generate_agent_id);
        match config.port {
            None => {
                let platform_config = PlatformConfig {
                    host: DEFAULT_HOST.to_string(),
                    port: None,
                    local_mode: config.local_mode,
                    max_pool_size: config.max_pool_size,
                    max_timeout_secs: config.max_timeout_secs,
                };
                let mut launcher = ServerLauncher::new(platform_config);
                if let Some(init) = config.init {
                    launcher = launcher.with_init(init);
                }
                let mut proxy = Self {
                    name: config.name,
                    host: DEFAULT_HOST.to_string(),
                    port: None,
                    agent_id,
                    agent_config: config.agent_config,
                    client: None,
                    launcher: Some(launcher),
                };
                if !config.lazy_launch {
                    proxy.client().await?;
                }
                Ok(proxy)
            }
            Some(port) => {
                let client = RpcClient::new(config.host.clone(), port, agent_id.clone());
                if !config.connect_existing {
                    client.create_agent(config.agent_config.as_ref()).await?;
                }
                Ok(Self {
                    name: config.name,
                    host: config.host,
                    port: Some(port),
                    agent_id,
                    agent_config: config.agent_config,
                    client: Some(client),
                    launcher: None,
                })
            }
        }
    }

    /// Proxy for an agent that already exists on a running server.
    pub fn for_existing(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        agent_id: AgentId,
    ) -> Self {
        let host = host.into();
        Self {
            name: name.into(),
            client: Some(RpcClient::new(host.clone(), port, agent_id.clone())),
            host,
            port: Some(port),
            agent_id,
            agent_config: None,
            launcher: None,
        }
    }

    /// Name carried by placeholders this proxy returns.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier of the remote agent.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Port of the server, once known.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Launches the owned server if not yet running and returns the client.
    async fn client(&mut self) -> Result<&RpcClient, Error> {
        if self.client.is_none() {
            let launcher = self
                .launcher
                .as_mut()
                .ok_or(ProxyError::NotConnected)?;
            let port = launcher.launch()?;
            debug!("proxy [{}] launched its server on port {port}", self.agent_id);
            self.port = Some(port);
            let client = RpcClient::new(self.host.clone(), port, self.agent_id.clone());
            client.create_agent(self.agent_config.as_ref()).await?;
            self.client = Some(client);
        }
        self.client.as_ref().ok_or(ProxyError::NotConnected.into())
    }

    /// Schedules a reply and returns a placeholder bound to this proxy.
    ///
    /// The placeholder carries the task id harvested from the handshake;
    /// nothing waits for the agent's work here.
    pub async fn reply(&mut self, input: Option<Message>) -> Result<Message, Error> {
        let name = self.name.clone();
        let client = self.client().await?;
        let handshake = client.reply(input.as_ref()).await?;
        let task_id = handshake.task_id.ok_or(ProxyError::MissingTaskId)?;
        Ok(Message::Placeholder(Placeholder {
            name,
            host: client.host().to_string(),
            port: client.port(),
            agent_id: client.agent_id().to_string(),
            task_id,
        }))
    }

    /// Delivers messages to the remote agent's `observe`; synchronous.
    pub async fn observe(&mut self, inputs: Vec<Message>) -> Result<(), Error> {
        let client = self.client().await?;
        client.observe(&inputs).await?;
        Ok(())
    }

    /// Clones this agent on its server into a set of independent proxies.
    ///
    /// Issues `_clone_agent` once per new instance. With `including_self`
    /// the first returned proxy addresses this proxy's own agent and only
    /// `num_instances - 1` clones are created.
    pub async fn clone_instances(
        &mut self,
        num_instances: usize,
        including_self: bool,
    ) -> Result<Vec<RpcAgent>, Error> {
        let to_generate = if including_self {
            num_instances.saturating_sub(1)
        } else {
            num_instances
        };
        self.client().await?;
        let name = self.name.clone();
        let host = self.host.clone();
        let port = self.port.ok_or(ProxyError::NotConnected)?;

        let mut instances = Vec::with_capacity(num_instances);
        if including_self {
            instances.push(Self::for_existing(
                name.clone(),
                host.clone(),
                port,
                self.agent_id.clone(),
            ));
        }
        for _ in 0..to_generate {
            let client = self.client().await?;
            let new_id = client.clone_agent().await?;
            instances.push(Self::for_existing(name.clone(), host.clone(), port, new_id));
        }
        Ok(instances)
    }

    /// Shuts the owned server down; no-op for proxies that only connect.
    ///
    /// Also happens when the proxy is dropped.
    pub fn stop(&mut self) {
        if let Some(launcher) = self.launcher.as_mut() {
            launcher.shutdown();
        }
    }
}

impl Drop for RpcAgent {
    fn drop(&mut self) {
        self.stop();
    }
}
