//! Lookup Client
//!
//! One request, one response, bounded wait. Retrying is the caller's job.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{Request, Response, MAX_DATAGRAM_LEN};

/// Default wait for a response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Key maps to this value
    Found(u32),
    /// Key is not in the system
    NotFound,
}

impl From<Response> for Lookup {
    fn from(response: Response) -> Self {
        match response.value() {
            Some(value) => Lookup::Found(value),
            None => Lookup::NotFound,
        }
    }
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Found(value) => write!(f, "{}", value),
            Lookup::NotFound => write!(f, "NOTFOUND"),
        }
    }
}

/// Send one request for `key` to `server` and wait up to `timeout` for the
/// matching response. Malformed datagrams and responses for other keys are
/// ignored.
pub async fn lookup(server: SocketAddr, key: u32, timeout: Duration) -> Result<Lookup> {
    let local: SocketAddr = if server.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let socket = UdpSocket::bind(local).await?;
    socket.send_to(&Request::new(key).encode(), server).await?;

    tokio::time::timeout(timeout, recv_matching(&socket, key))
        .await
        .map_err(|_| Error::Timeout {
            key,
            timeout_ms: timeout.as_millis() as u64,
        })?
}

async fn recv_matching(socket: &UdpSocket, key: u32) -> Result<Lookup> {
    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    loop {
        let (len, from) = socket.recv_from(&mut buf).await?;
        match Response::decode(&buf[..len]) {
            Ok(response) if response.key == key => return Ok(Lookup::from(response)),
            Ok(response) => debug!(%from, "Ignoring response for key {}", response.key),
            Err(e) => debug!(%from, "Ignoring datagram: {}", e),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
