//! Wire Protocol Codec
//!
//! Fixed-size request and response messages exchanged over UDP between the
//! client, the cache node and the backend store. Every datagram carries
//! exactly one message; there is no framing beyond the datagram boundary.
//!
//! # Layout (network byte order)
//!
//! ```text
//! Request  (4 bytes): ┌───────────┐
//!                     │ key (u32) │
//!                     └───────────┘
//! Response (9 bytes): ┌───────────┬────────────┬─────────────┐
//!                     │ key (u32) │ valid (u8) │ value (u32) │
//!                     └───────────┴────────────┴─────────────┘
//! ```
//!
//! The codec is stateless and is the only place wire sizes are defined.

mod proptest;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Well-known UDP port for the lookup protocol
pub const UDP_PORT: u16 = 1234;

/// Encoded request size in bytes
pub const REQUEST_LEN: usize = 4;

/// Encoded response size in bytes
pub const RESPONSE_LEN: usize = 9;

/// Receive buffer size; anything larger than a response is malformed anyway
pub const MAX_DATAGRAM_LEN: usize = 1024;

/// Single-key lookup request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Request {
    /// Requested key
    pub key: u32,
}

impl Request {
    /// Create a request for `key`
    pub fn new(key: u32) -> Self {
        Self { key }
    }

    /// Encode to wire format
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REQUEST_LEN);
        buf.put_u32(self.key);
        buf.freeze()
    }

    /// Decode from a datagram
    pub fn decode(mut datagram: &[u8]) -> Result<Self> {
        check_len("request", REQUEST_LEN, datagram.len())?;
        Ok(Self {
            key: datagram.get_u32(),
        })
    }
}

/// Lookup response: either a value or "not found"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Response {
    /// Echoed request key
    pub key: u32,
    /// Whether the key was found
    pub valid: bool,
    /// Value, meaningful only when `valid`
    pub value: u32,
}

impl Response {
    /// Positive response
    pub fn found(key: u32, value: u32) -> Self {
        Self {
            key,
            valid: true,
            value,
        }
    }

    /// Negative response; value is always zero
    pub fn not_found(key: u32) -> Self {
        Self {
            key,
            valid: false,
            value: 0,
        }
    }

    /// The value if found
    pub fn value(&self) -> Option<u32> {
        self.valid.then_some(self.value)
    }

    /// Encode to wire format
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RESPONSE_LEN);
        buf.put_u32(self.key);
        buf.put_u8(u8::from(self.valid));
        buf.put_u32(self.value);
        buf.freeze()
    }

    /// Decode from a datagram. Any non-zero valid byte counts as found.
    pub fn decode(mut datagram: &[u8]) -> Result<Self> {
        check_len("response", RESPONSE_LEN, datagram.len())?;
        let key = datagram.get_u32();
        let valid = datagram.get_u8() != 0;
        let value = datagram.get_u32();
        Ok(Self { key, valid, value })
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.valid {
            write!(f, "Res({}={})", self.key, self.value)
        } else {
            write!(f, "Res({}=NOTFOUND)", self.key)
        }
    }
}

fn check_len(message: &'static str, expected: usize, actual: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::Format {
            message,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Encode a request for `key`
pub fn encode_request(key: u32) -> Bytes {
    Request::new(key).encode()
}

/// Decode a request datagram into its key
pub fn decode_request(datagram: &[u8]) -> Result<u32> {
    Request::decode(datagram).map(|r| r.key)
}

/// Encode a response
pub fn encode_response(key: u32, valid: bool, value: u32) -> Bytes {
    Response { key, valid, value }.encode()
}

/// Decode a response datagram into `(key, valid, value)`
pub fn decode_response(datagram: &[u8]) -> Result<(u32, bool, u32)> {
    Response::decode(datagram).map(|r| (r.key, r.valid, r.value))
}

// =============================================================================
// Tests
// =============================================================================
