//! TCP serve loop for the agent platform.
//!
//! One connection may carry many sequential calls; each call is a single
//! request frame answered by a single response frame. Shutdown stops
//! accepting, then drains in-flight connections for a bounded window before
//! aborting them.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use super::AgentPlatform;
use crate::launcher::check_port;
use crate::rpc::{frame_codec, RpcCode, RpcRequest, RpcResponse};

/// How long shutdown waits for in-flight connections before aborting them.
pub const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// Binds the server socket, retrying with a freshly chosen port on failure.
///
/// `local_mode` restricts the listener to the loopback interface.
pub async fn bind_server(
    requested: Option<u16>,
    local_mode: bool,
) -> std::io::Result<TcpListener> {
    let mut requested = requested;
    loop {
        let port = check_port(requested)?;
        let host = if local_mode {
            Ipv4Addr::LOCALHOST
        } else {
            Ipv4Addr::UNSPECIFIED
        };
        info!("Starting rpc server at port [{port}]...");
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                info!("rpc server at port [{port}] started successfully");
                return Ok(listener);
            }
            Err(err) => {
                warn!("Failed to start rpc server at port [{port}] ({err}), try another port");
                requested = None;
            }
        }
    }
}

/// Accepts and serves connections until the shutdown signal fires.
///
/// Returns only after every handler has finished or been aborted, so once a
/// caller observes this future complete, no further handlers run.
pub async fn serve(
    platform: Arc<AgentPlatform>,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
) {
    let port = listener.local_addr().map(|addr| addr.port()).unwrap_or(0);
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let platform = Arc::clone(&platform);
                    connections.spawn(handle_connection(platform, stream, peer));
                }
                Err(err) => warn!("failed to accept connection: {err}"),
            },
        }
    }
    drop(listener);

    info!("Stopping rpc server at port [{port}]");
    let drained = tokio::time::timeout(SHUTDOWN_DRAIN, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("drain window elapsed, aborting remaining handlers");
        connections.abort_all();
        while connections.join_next().await.is_some() {}
    }
    info!("rpc server at port [{port}] stopped successfully");
}

async fn handle_connection(platform: Arc<AgentPlatform>, stream: TcpStream, peer: SocketAddr) {
    debug!("connection from {peer}");
    let mut framed = Framed::new(stream, frame_codec());
    while let Some(frame) = framed.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!("dropping connection from {peer}: {err}");
                return;
            }
        };
        let response = match serde_json::from_slice::<RpcRequest>(&frame) {
            Ok(request) => platform.call_func(request).await,
            Err(err) => {
                RpcResponse::error(RpcCode::InvalidArgument, format!("Malformed request: {err}"))
            }
        };
        let body = match serde_json::to_vec(&response) {
            Ok(body) => body,
            Err(err) => {
                error!("failed to encode response for {peer}: {err}");
                return;
            }
        };
        if let Err(err) = framed.send(Bytes::from(body)).await {
            warn!("failed to answer {peer}: {err}");
            return;
        }
    }
    debug!("connection from {peer} closed");
}
