//! UDP transport for the cache node
//!
//! Two sockets: the client-facing socket on the well-known address, and an
//! ephemeral socket connected to the backend. Each has its own receive
//! task, so a client waiting on the backend never delays a cache hit.
//! Relayed responses leave through the client-facing socket, which keeps
//! the node transparent to clients.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CacheNode, RequestDecision};
use crate::config::NodeConfig;
use crate::error::Result;
use crate::protocol::MAX_DATAGRAM_LEN;

/// Bound cache node, ready to run
pub struct CacheNodeServer {
    node: CacheNode,
    config: NodeConfig,
    client_socket: Arc<UdpSocket>,
    backend_socket: Arc<UdpSocket>,
}

impl CacheNodeServer {
    /// Build a node sized by `config.slots`, bind the client socket and
    /// connect the backend socket
    pub async fn bind(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        let node = CacheNode::new(config.slots)?;

        let client_socket = UdpSocket::bind(config.listen).await?;

        let backend_local: SocketAddr = if config.backend.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let backend_socket = UdpSocket::bind(backend_local).await?;
        backend_socket.connect(config.backend).await?;

        info!(
            "Cache node listening on {} (backend {}, {} learned slots)",
            client_socket.local_addr()?,
            config.backend,
            node.learned().capacity()
        );

        Ok(Self {
            node,
            config,
            client_socket: Arc::new(client_socket),
            backend_socket: Arc::new(backend_socket),
        })
    }

    /// Client-facing address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.client_socket.local_addr()?)
    }

    /// Handle to the node state
    pub fn node(&self) -> &CacheNode {
        &self.node
    }

    /// Run the receive loops and the pending sweeper until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let clients = client_loop(
            self.node.clone(),
            self.client_socket.clone(),
            self.backend_socket.clone(),
            shutdown.clone(),
        );
        let backend = backend_loop(
            self.node.clone(),
            self.client_socket.clone(),
            self.backend_socket.clone(),
            shutdown.clone(),
        );
        let sweeper = sweep_loop(self.node.clone(), self.config.clone(), shutdown);

        tokio::join!(clients, backend, sweeper);

        info!("Cache node stopped");
        Ok(())
    }
}

async fn client_loop(
    node: CacheNode,
    client_socket: Arc<UdpSocket>,
    backend_socket: Arc<UdpSocket>,
    shutdown: CancellationToken,
) {
    let mut buf = [0u8; MAX_DATAGRAM_LEN];

    loop {
        let (len, client) = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = client_socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    warn!("Client socket receive error: {}", e);
                    continue;
                }
            },
        };

        match node.on_request(&buf[..len], client) {
            RequestDecision::Respond { response, tier } => {
                debug!(%client, tier = %tier, "{}", response);
                if let Err(e) = client_socket.send_to(&response.encode(), client).await {
                    warn!(%client, "Failed to answer client: {}", e);
                }
            }
            RequestDecision::Forward(request) => {
                if let Err(e) = backend_socket.send(&request.encode()).await {
                    warn!(key = request.key, "Failed to forward to backend: {}", e);
                }
            }
            RequestDecision::Drop => {}
        }
    }
}

async fn backend_loop(
    node: CacheNode,
    client_socket: Arc<UdpSocket>,
    backend_socket: Arc<UdpSocket>,
    shutdown: CancellationToken,
) {
    let mut buf = [0u8; MAX_DATAGRAM_LEN];

    loop {
        let len = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = backend_socket.recv(&mut buf) => match received {
                Ok(len) => len,
                Err(e) => {
                    // ICMP port unreachable surfaces here when the backend is down
                    warn!("Backend socket receive error: {}", e);
                    continue;
                }
            },
        };

        let Some(relay) = node.on_backend_response(&buf[..len]) else {
            continue;
        };

        let payload = relay.response.encode();
        for client in relay.clients {
            debug!(%client, "relay {}", relay.response);
            if let Err(e) = client_socket.send_to(&payload, client).await {
                warn!(%client, "Failed to relay backend response: {}", e);
            }
        }
    }
}

async fn sweep_loop(node: CacheNode, config: NodeConfig, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(config.sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                node.expire_pending(config.pending_timeout);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
