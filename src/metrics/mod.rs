//! Node Metrics
//!
//! Prometheus counters and gauges for the cache node. Each node owns its own
//! registry so several nodes can live in one process (tests do this).

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Where a dropped datagram came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropSource {
    /// Client-facing socket
    Client,
    /// Backend-facing socket
    Backend,
}

impl DropSource {
    fn label(self) -> &'static str {
        match self {
            DropSource::Client => "client",
            DropSource::Backend => "backend",
        }
    }
}

/// Prometheus metrics for one cache node
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    requests: IntCounterVec,
    backend_responses: IntCounterVec,
    dropped: IntCounterVec,
    evictions: IntCounter,
    relayed: IntCounter,
    pending_expired: IntCounter,
    pending_keys: IntGauge,
    pinned_entries: IntGauge,
    learned_occupied: IntGauge,
}

impl std::fmt::Debug for NodeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMetrics")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl NodeMetrics {
    /// Create and register all node metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("netcache_requests_total", "Client requests by outcome"),
            &["outcome"],
        )?;
        let backend_responses = IntCounterVec::new(
            Opts::new(
                "netcache_backend_responses_total",
                "Backend responses observed by result",
            ),
            &["result"],
        )?;
        let dropped = IntCounterVec::new(
            Opts::new(
                "netcache_dropped_datagrams_total",
                "Malformed datagrams dropped by source",
            ),
            &["source"],
        )?;
        let evictions = IntCounter::new(
            "netcache_learned_evictions_total",
            "Learned entries displaced by a colliding key",
        )?;
        let relayed = IntCounter::new(
            "netcache_relayed_responses_total",
            "Backend responses relayed to waiting clients",
        )?;
        let pending_expired = IntCounter::new(
            "netcache_pending_expired_total",
            "Waiting clients dropped after the pending timeout",
        )?;
        let pending_keys = IntGauge::new(
            "netcache_pending_keys",
            "Keys with at least one client waiting on the backend",
        )?;
        let pinned_entries =
            IntGauge::new("netcache_pinned_entries", "Installed pinned rules")?;
        let learned_occupied = IntGauge::new(
            "netcache_learned_occupied_slots",
            "Valid slots in the learned cache",
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(backend_responses.clone()))?;
        registry.register(Box::new(dropped.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(relayed.clone()))?;
        registry.register(Box::new(pending_expired.clone()))?;
        registry.register(Box::new(pending_keys.clone()))?;
        registry.register(Box::new(pinned_entries.clone()))?;
        registry.register(Box::new(learned_occupied.clone()))?;

        Ok(Self {
            registry,
            requests,
            backend_responses,
            dropped,
            evictions,
            relayed,
            pending_expired,
            pending_keys,
            pinned_entries,
            learned_occupied,
        })
    }

    pub fn record_pinned_hit(&self) {
        self.requests.with_label_values(&["pinned_hit"]).inc();
    }

    pub fn record_learned_hit(&self) {
        self.requests.with_label_values(&["learned_hit"]).inc();
    }

    pub fn record_forwarded(&self) {
        self.requests.with_label_values(&["forwarded"]).inc();
    }

    pub fn record_backend_response(&self, found: bool) {
        let result = if found { "found" } else { "not_found" };
        self.backend_responses.with_label_values(&[result]).inc();
    }

    pub fn record_dropped(&self, source: DropSource) {
        self.dropped.with_label_values(&[source.label()]).inc();
    }

    pub fn record_eviction(&self) {
        self.evictions.inc();
    }

    pub fn record_relayed(&self, clients: usize) {
        self.relayed.inc_by(clients as u64);
    }

    pub fn record_pending_expired(&self, clients: usize) {
        self.pending_expired.inc_by(clients as u64);
    }

    /// Refresh the occupancy gauges
    pub fn update_gauges(&self, pending_keys: usize, pinned: usize, learned_occupied: usize) {
        self.pending_keys.set(pending_keys as i64);
        self.pinned_entries.set(pinned as i64);
        self.learned_occupied.set(learned_occupied as i64);
    }

    /// Plain counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        let count = |vec: &IntCounterVec, label: &str| vec.with_label_values(&[label]).get();

        MetricsSnapshot {
            pinned_hits: count(&self.requests, "pinned_hit"),
            learned_hits: count(&self.requests, "learned_hit"),
            forwarded: count(&self.requests, "forwarded"),
            backend_found: count(&self.backend_responses, "found"),
            backend_not_found: count(&self.backend_responses, "not_found"),
            dropped_client: count(&self.dropped, "client"),
            dropped_backend: count(&self.dropped, "backend"),
            evictions: self.evictions.get(),
            relayed: self.relayed.get(),
            pending_expired: self.pending_expired.get(),
            pending_keys: self.pending_keys.get() as u64,
            pinned_entries: self.pinned_entries.get() as u64,
            learned_occupied: self.learned_occupied.get() as u64,
        }
    }

    /// Prometheus text exposition
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

/// Snapshot of node counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub pinned_hits: u64,
    pub learned_hits: u64,
    pub forwarded: u64,
    pub backend_found: u64,
    pub backend_not_found: u64,
    pub dropped_client: u64,
    pub dropped_backend: u64,
    pub evictions: u64,
    pub relayed: u64,
    pub pending_expired: u64,
    pub pending_keys: u64,
    pub pinned_entries: u64,
    pub learned_occupied: u64,
}

impl MetricsSnapshot {
    /// Fraction of requests answered without the backend
    pub fn hit_ratio(&self) -> f64 {
        let hits = (self.pinned_hits + self.learned_hits) as f64;
        let total = hits + self.forwarded as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
