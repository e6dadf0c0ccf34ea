//! UDP server for a backend store

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::BackendStore;
use crate::error::Result;
use crate::protocol::{Request, Response, MAX_DATAGRAM_LEN};

/// Serves a [`BackendStore`] over the lookup protocol
pub struct BackendServer {
    socket: UdpSocket,
    store: Arc<dyn BackendStore>,
}

impl BackendServer {
    /// Bind the server socket
    pub async fn bind(addr: SocketAddr, store: Arc<dyn BackendStore>) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("Backend store listening on {}", socket.local_addr()?);
        Ok(Self { socket, store })
    }

    /// Address the server is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Answer requests until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];

        loop {
            let (len, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("Backend receive error: {}", e);
                        continue;
                    }
                },
            };

            let request = match Request::decode(&buf[..len]) {
                Ok(request) => request,
                Err(e) => {
                    debug!(%peer, "Dropping datagram: {}", e);
                    continue;
                }
            };

            let response = match self.store.get(request.key).await {
                Ok(Some(value)) => Response::found(request.key, value),
                Ok(None) => Response::not_found(request.key),
                Err(e) => {
                    warn!(%peer, key = request.key, "Backend store error: {}", e);
                    continue;
                }
            };
            debug!(%peer, "Req({}) -> {}", request.key, response);

            if let Err(e) = self.socket.send_to(&response.encode(), peer).await {
                warn!(%peer, "Backend send error: {}", e);
            }
        }

        info!("Backend store stopped");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
