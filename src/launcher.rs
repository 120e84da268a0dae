//! Supervised server lifecycle.
//!
//! A [`ServerLauncher`] owns a platform server running on a dedicated
//! background thread with its own tokio runtime. Launch hands the actual
//! bound port back over a one-shot channel and waits for the started signal;
//! shutdown broadcasts the stop signal and joins the thread, which drains
//! in-flight handlers for a bounded window first.

use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::core::config::{InitConfig, PlatformConfig};
use crate::platform::{server, AgentPlatform};

/// Probe timeout when checking whether a requested port is occupied.
const PORT_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Errors that can occur while launching or supervising a server.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Socket setup failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The server thread died before reporting its bound port.
    #[error("Server thread exited before startup completed")]
    Bootstrap,
    /// The launcher already supervises a running server.
    #[error("Server is already running on port [{0}]")]
    AlreadyRunning(u16),
}

/// Finds an unoccupied port by binding an ephemeral socket.
pub fn find_available_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Validates a requested port, substituting a free one when necessary.
///
/// With no port given, an ephemeral port is selected. With a port given, a
/// loopback connect probe decides: a successful connect means the port is
/// occupied and a fresh one is returned instead.
pub fn check_port(port: Option<u16>) -> std::io::Result<u16> {
    match port {
        None => {
            let port = find_available_port()?;
            warn!("Server port is not provided, automatically select [{port}] as the port number");
            Ok(port)
        }
        Some(port) => {
            let addr = SocketAddr::from(([127, 0, 0, 1], port));
            if std::net::TcpStream::connect_timeout(&addr, PORT_PROBE_TIMEOUT).is_ok() {
                let new_port = find_available_port()?;
                warn!("Port [{port}] is occupied, use [{new_port}] instead");
                Ok(new_port)
            } else {
                Ok(port)
            }
        }
    }
}

/// Supervisor of one background platform server.
pub struct ServerLauncher {
    config: PlatformConfig,
    init: Option<InitConfig>,
    port: Option<u16>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerLauncher {
    /// Creates a launcher for the given configuration; nothing runs yet.
    pub fn new(config: PlatformConfig) -> Self {
        Self {
            config,
            init: None,
            port: None,
            shutdown_tx: None,
            thread: None,
        }
    }

    /// Attaches process-init settings the server thread replays at startup.
    pub fn with_init(mut self, init: InitConfig) -> Self {
        self.init = Some(init);
        self
    }

    /// The actual bound port, once launched.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Whether a supervised server is currently running.
    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Starts the server and blocks until it is reachable.
    ///
    /// Returns the actual bound port, which may differ from the requested
    /// one when that port was occupied.
    pub fn launch(&mut self) -> Result<u16, LaunchError> {
        if self.thread.is_some() {
            return Err(LaunchError::AlreadyRunning(self.port.unwrap_or(0)));
        }

        let (port_tx, port_rx) = mpsc::channel();
        let (started_tx, started_rx) = mpsc::channel();
        let (shutdown_tx, _) = broadcast::channel(1);
        let shutdown_rx = shutdown_tx.subscribe();
        let config = self.config.clone();
        let init = self.init.clone();

        let thread = thread::Builder::new()
            .name("rpc-agent-server".to_string())
            .spawn(move || run_server_thread(config, init, port_tx, started_tx, shutdown_rx))?;

        let port = port_rx.recv().map_err(|_| LaunchError::Bootstrap)?;
        started_rx.recv().map_err(|_| LaunchError::Bootstrap)?;

        self.port = Some(port);
        self.shutdown_tx = Some(shutdown_tx);
        self.thread = Some(thread);
        info!("Launch agent server at [{}:{port}] success", self.config.host);
        Ok(port)
    }

    /// Signals the server to stop and joins its thread.
    ///
    /// The join is bounded by the server's drain window. Safe to call more
    /// than once; later calls are no-ops.
    pub fn shutdown(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("agent server thread panicked during shutdown");
            }
            if let Some(port) = self.port {
                info!("Agent server at port [{port}] is stopped");
            }
        }
    }

    /// Blocks until the server terminates on its own.
    pub fn wait_until_terminate(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ServerLauncher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_server_thread(
    config: PlatformConfig,
    init: Option<InitConfig>,
    port_tx: mpsc::Sender<u16>,
    started_tx: mpsc::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
) {
    if let Some(init) = init {
        init.apply();
    }
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to build server runtime: {err}");
            return;
        }
    };
    runtime.block_on(async move {
        let listener = match server::bind_server(config.port, config.local_mode).await {
            Ok(listener) => listener,
            Err(err) => {
                error!("failed to bind server socket: {err}");
                return;
            }
        };
        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(err) => {
                error!("failed to read bound address: {err}");
                return;
            }
        };
        let platform = Arc::new(AgentPlatform::new(config.max_pool_size, config.max_age()));
        if port_tx.send(port).is_err() {
            return;
        }
        let _ = started_tx.send(());
        server::serve(platform, listener, shutdown_rx).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_port_keeps_free_port() {
        let free = find_available_port().unwrap();
        assert_eq!(check_port(Some(free)).unwrap(), free);
    }

    #[test]
    fn test_check_port_replaces_occupied_port() {
        let occupied = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = occupied.local_addr().unwrap().port();
        let chosen = check_port(Some(port)).unwrap();
        assert_ne!(chosen, port);
    }

    #[test]
    fn test_check_port_assigns_when_missing() {
        let port = check_port(None).unwrap();
        assert!(port > 0);
    }
}
