//! Cache Node
//!
//! Request/response decision logic of the in-network cache.
//!
//! # Request Lifecycle
//!
//! ```text
//! RECEIVED ──decode error──▶ (dropped)
//!    │
//!    ▼
//! CHECK_PINNED ──hit──▶ RESPONDED   (no backend traffic, learned untouched)
//!    │ miss
//!    ▼
//! CHECK_LEARNED ──hit──▶ RESPONDED  (no backend traffic, learned untouched)
//!    │ miss
//!    ▼
//! FORWARDED ──backend response──▶ observe (if found) ──▶ RESPONDED
//! ```
//!
//! The node never retries the backend. A client whose backend round-trip is
//! lost simply times out, and the sweeper eventually forgets it.

mod pending;
mod server;

pub use pending::PendingTable;
pub use server::CacheNodeServer;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::cache::{CacheTier, LearnedCache, Observation, PinnedCache, PinnedEntry};
use crate::error::Result;
use crate::metrics::{DropSource, MetricsSnapshot, NodeMetrics};
use crate::protocol::{Request, Response};

/// What to do with a client datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDecision {
    /// Answer the client directly from a cache tier
    Respond { response: Response, tier: CacheTier },
    /// Send the request to the backend store
    Forward(Request),
    /// Malformed datagram, send nothing
    Drop,
}

/// A backend response and the clients it must be relayed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay {
    pub response: Response,
    pub clients: Vec<SocketAddr>,
}

/// Shared state of one cache node
#[derive(Debug)]
struct NodeState {
    pinned: PinnedCache,
    learned: LearnedCache,
    pending: PendingTable,
    metrics: NodeMetrics,
}

/// Cheaply cloneable handle to the node's cache state and decision logic
#[derive(Debug, Clone)]
pub struct CacheNode {
    state: Arc<NodeState>,
}

impl CacheNode {
    /// Create a node with an empty pinned cache and `slots` learned slots
    pub fn new(slots: usize) -> Result<Self> {
        Ok(Self {
            state: Arc::new(NodeState {
                pinned: PinnedCache::new(),
                learned: LearnedCache::new(slots)?,
                pending: PendingTable::new(),
                metrics: NodeMetrics::new()?,
            }),
        })
    }

    /// Handle one datagram from a client
    pub fn on_request(&self, datagram: &[u8], client: SocketAddr) -> RequestDecision {
        let state = &self.state;

        let request = match Request::decode(datagram) {
            Ok(request) => request,
            Err(e) => {
                debug!(%client, "Dropping client datagram: {}", e);
                state.metrics.record_dropped(DropSource::Client);
                return RequestDecision::Drop;
            }
        };
        let key = request.key;

        if let Some(value) = state.pinned.lookup(key) {
            trace!(%client, key, value, "pinned hit");
            state.metrics.record_pinned_hit();
            return RequestDecision::Respond {
                response: Response::found(key, value),
                tier: CacheTier::Pinned,
            };
        }

        if let Some(value) = state.learned.lookup(key) {
            trace!(%client, key, value, "learned hit");
            state.metrics.record_learned_hit();
            return RequestDecision::Respond {
                response: Response::found(key, value),
                tier: CacheTier::Learned,
            };
        }

        let waiting = state.pending.register(key, client);
        trace!(%client, key, waiting, "miss, forwarding to backend");
        state.metrics.record_forwarded();
        RequestDecision::Forward(request)
    }

    /// Handle one datagram from the backend. Returns `None` for malformed
    /// datagrams; otherwise the relay, whose client list may be empty.
    pub fn on_backend_response(&self, datagram: &[u8]) -> Option<Relay> {
        let state = &self.state;

        let response = match Response::decode(datagram) {
            Ok(response) => response,
            Err(e) => {
                debug!("Dropping backend datagram: {}", e);
                state.metrics.record_dropped(DropSource::Backend);
                return None;
            }
        };
        state.metrics.record_backend_response(response.valid);

        // Learn before relaying so any later request for the key hits
        let response = match response.value() {
            Some(value) => {
                self.learn(response.key, value);
                response
            }
            None => Response::not_found(response.key),
        };

        let clients = state.pending.take(response.key);
        if clients.is_empty() {
            trace!(key = response.key, "backend response with no waiting client");
        }
        state.metrics.record_relayed(clients.len());

        Some(Relay { response, clients })
    }

    fn learn(&self, key: u32, value: u32) {
        match self.state.learned.observe(key, value) {
            Observation::Evicted {
                key: evicted,
                value: old,
            } => {
                debug!(
                    key,
                    evicted,
                    slot = self.state.learned.slot_of(key),
                    "learned entry evicted ({}={})",
                    evicted,
                    old
                );
                self.state.metrics.record_eviction();
            }
            Observation::Refreshed { previous } if previous != value => {
                debug!(key, previous, value, "learned value changed");
            }
            _ => {}
        }
    }

    /// Forget clients that have waited longer than `timeout`
    pub fn expire_pending(&self, timeout: Duration) -> usize {
        let expired = self.state.pending.expire(timeout);
        if expired > 0 {
            debug!(expired, "Dropped stale pending clients");
            self.state.metrics.record_pending_expired(expired);
        }
        self.refresh_gauges();
        expired
    }

    /// Install or overwrite a pinned rule
    pub fn install_rule(&self, key: u32, value: u32) -> Option<u32> {
        let previous = self.state.pinned.install(key, value);
        self.refresh_gauges();
        previous
    }

    /// Remove a pinned rule
    pub fn remove_rule(&self, key: u32) -> Option<u32> {
        let removed = self.state.pinned.remove(key);
        self.refresh_gauges();
        removed
    }

    /// All pinned rules, ordered by key
    pub fn read_rules(&self) -> Vec<PinnedEntry> {
        self.state.pinned.entries()
    }

    /// Pinned tier
    pub fn pinned(&self) -> &PinnedCache {
        &self.state.pinned
    }

    /// Learned tier
    pub fn learned(&self) -> &LearnedCache {
        &self.state.learned
    }

    /// Pending correlation table
    pub fn pending(&self) -> &PendingTable {
        &self.state.pending
    }

    /// Node metrics
    pub fn metrics(&self) -> &NodeMetrics {
        &self.state.metrics
    }

    /// Counter snapshot with fresh gauges
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.refresh_gauges();
        self.state.metrics.snapshot()
    }

    fn refresh_gauges(&self) {
        self.state.metrics.update_gauges(
            self.state.pending.keys(),
            self.state.pinned.len(),
            self.state.learned.occupied(),
        );
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_request, encode_response};

    fn client(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 2], port))
    }

    fn node() -> CacheNode {
        CacheNode::new(64).unwrap()
    }

    /// Drive a miss through the backend with the given answer
    fn resolve(node: &CacheNode, key: u32, answer: Option<u32>, from: SocketAddr) -> Relay {
        assert_eq!(
            node.on_request(&encode_request(key), from),
            RequestDecision::Forward(Request::new(key))
        );
        let datagram = match answer {
            Some(value) => encode_response(key, true, value),
            None => encode_response(key, false, 0),
        };
        node.on_backend_response(&datagram).unwrap()
    }

    #[test]
    fn test_miss_forwards_and_learns() {
        let node = node();

        let relay = resolve(&node, 1, Some(11), client(4000));
        assert_eq!(relay.response, Response::found(1, 11));
        assert_eq!(relay.clients, vec![client(4000)]);
        assert_eq!(node.learned().lookup(1), Some(11));
    }

    #[test]
    fn test_learned_hit_after_backend_response() {
        let node = node();
        resolve(&node, 1, Some(11), client(4000));

        assert_eq!(
            node.on_request(&encode_request(1), client(4001)),
            RequestDecision::Respond {
                response: Response::found(1, 11),
                tier: CacheTier::Learned,
            }
        );
        assert_eq!(node.snapshot().forwarded, 1);
        assert_eq!(node.snapshot().learned_hits, 1);
    }

    #[test]
    fn test_pinned_hit_skips_backend() {
        let node = node();
        node.install_rule(3, 33);

        assert_eq!(
            node.on_request(&encode_request(3), client(4000)),
            RequestDecision::Respond {
                response: Response::found(3, 33),
                tier: CacheTier::Pinned,
            }
        );
        assert_eq!(node.pending().keys(), 0);
        assert_eq!(node.learned().occupied(), 0);
    }

    #[test]
    fn test_pinned_overrides_learned() {
        let node = node();
        resolve(&node, 3, Some(876), client(4000));
        node.install_rule(3, 33);

        assert_eq!(
            node.on_request(&encode_request(3), client(4000)),
            RequestDecision::Respond {
                response: Response::found(3, 33),
                tier: CacheTier::Pinned,
            }
        );

        // Removing the rule exposes the learned entry again
        assert_eq!(node.remove_rule(3), Some(33));
        assert_eq!(
            node.on_request(&encode_request(3), client(4000)),
            RequestDecision::Respond {
                response: Response::found(3, 876),
                tier: CacheTier::Learned,
            }
        );
    }

    #[test]
    fn test_no_negative_caching() {
        let node = node();

        let relay = resolve(&node, 123, None, client(4000));
        assert_eq!(relay.response, Response::not_found(123));
        assert_eq!(node.learned().occupied(), 0);

        // Still a miss the second time
        assert_eq!(
            node.on_request(&encode_request(123), client(4000)),
            RequestDecision::Forward(Request::new(123))
        );
    }

    #[test]
    fn test_not_found_value_is_zeroed() {
        let node = node();
        node.on_request(&encode_request(9), client(4000));

        let relay = node
            .on_backend_response(&encode_response(9, false, 0xdead))
            .unwrap();
        assert_eq!(relay.response, Response::not_found(9));
    }

    #[test]
    fn test_collision_evicts_and_forwards_again() {
        let node = node();
        let k1 = 1;
        let slot = node.learned().slot_of(k1);
        let k2 = (2..u32::MAX)
            .find(|k| node.learned().slot_of(*k) == slot)
            .unwrap();

        resolve(&node, k1, Some(11), client(4000));
        resolve(&node, k2, Some(22), client(4000));

        assert_eq!(node.snapshot().evictions, 1);
        assert_eq!(
            node.on_request(&encode_request(k1), client(4000)),
            RequestDecision::Forward(Request::new(k1))
        );
    }

    #[test]
    fn test_malformed_datagrams_dropped() {
        let node = node();

        assert_eq!(node.on_request(&[1, 2], client(4000)), RequestDecision::Drop);
        assert_eq!(node.on_backend_response(&[0; 4]), None);

        let snapshot = node.snapshot();
        assert_eq!(snapshot.dropped_client, 1);
        assert_eq!(snapshot.dropped_backend, 1);
        assert_eq!(snapshot.forwarded, 0);
    }

    #[test]
    fn test_relay_fans_out_to_all_waiters() {
        let node = node();
        node.on_request(&encode_request(5), client(4000));
        node.on_request(&encode_request(5), client(4001));

        let relay = node
            .on_backend_response(&encode_response(5, true, 55))
            .unwrap();
        assert_eq!(relay.clients, vec![client(4000), client(4001)]);
        assert_eq!(node.pending().keys(), 0);
        assert_eq!(node.snapshot().relayed, 2);
    }

    #[test]
    fn test_unsolicited_response_still_learned() {
        let node = node();

        let relay = node
            .on_backend_response(&encode_response(8, true, 88))
            .unwrap();
        assert!(relay.clients.is_empty());
        assert_eq!(node.learned().lookup(8), Some(88));
    }

    #[test]
    fn test_expire_pending() {
        let node = node();
        node.on_request(&encode_request(1), client(4000));
        assert_eq!(node.snapshot().pending_keys, 1);

        assert_eq!(node.expire_pending(Duration::ZERO), 1);
        let snapshot = node.snapshot();
        assert_eq!(snapshot.pending_keys, 0);
        assert_eq!(snapshot.pending_expired, 1);
    }

    #[test]
    fn test_install_rule_idempotent() {
        let node = node();
        assert_eq!(node.install_rule(3, 876), None);
        assert_eq!(node.install_rule(3, 33), Some(876));

        let rules = node.read_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!((rules[0].key, rules[0].value), (3, 33));
        assert_eq!(node.snapshot().pinned_entries, 1);
    }
}
