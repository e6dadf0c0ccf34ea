//! Administrative Interface
//!
//! Control-plane surface of the cache node: pinned rule management
//! (`InstallRule`, `ReadRules`, `RemoveRule`), health checks, metrics and
//! diagnostics, served over HTTP.
//!
//! # Endpoints
//!
//! ```text
//! GET    /rules          → [{key, value, installed_at}]
//! POST   /rules          ← {key, value}   → installed rule
//! DELETE /rules/{key}    → removed rule | 404
//! GET    /learned        → [{slot, key, value}]
//! GET    /stats          → counters and occupancy
//! GET    /healthz        → live, ready and pending backlog
//! GET    /livez          → liveness
//! GET    /readyz         → readiness
//! GET    /metrics        → Prometheus text format
//! ```

mod client;
mod health;
mod http;

pub use client::AdminClient;
pub use health::{HealthReport, NodeLifecycle};
pub use http::{handle, AdminServer};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::PinnedEntry;
use crate::config::RulesFile;
use crate::error::{Error, Result};
use crate::metrics::MetricsSnapshot;
use crate::node::CacheNode;

/// Pending keys above which `/healthz` reports a backlog
pub const DEFAULT_PENDING_WARN_THRESHOLD: usize = 10_000;

/// Body of an `InstallRule` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRule {
    pub key: u32,
    pub value: u32,
}

/// Result of a `RemoveRule` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedRule {
    pub key: u32,
    pub value: u32,
}

/// One valid learned slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedSlot {
    pub slot: usize,
    pub key: u32,
    pub value: u32,
}

/// Occupancy and counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStats {
    pub learned_capacity: usize,
    pub learned_occupied: usize,
    pub pinned_entries: usize,
    pub pending_clients: usize,
    pub hit_ratio: f64,
    pub counters: MetricsSnapshot,
}

/// Admin operations over a cache node
#[derive(Debug, Clone)]
pub struct AdminService {
    node: CacheNode,
    lifecycle: Arc<NodeLifecycle>,
    pending_warn_threshold: usize,
}

impl AdminService {
    pub fn new(node: CacheNode, lifecycle: Arc<NodeLifecycle>) -> Self {
        Self {
            node,
            lifecycle,
            pending_warn_threshold: DEFAULT_PENDING_WARN_THRESHOLD,
        }
    }

    /// Override the backlog threshold for pending keys
    pub fn with_pending_warn_threshold(mut self, threshold: usize) -> Self {
        self.pending_warn_threshold = threshold;
        self
    }

    /// `InstallRule`: idempotent upsert into the pinned cache
    pub fn install_rule(&self, key: u32, value: u32) -> Result<PinnedEntry> {
        match self.node.install_rule(key, value) {
            Some(previous) if previous != value => {
                info!(key, previous, value, "Pinned rule updated")
            }
            Some(_) => {}
            None => info!(key, value, "Pinned rule installed"),
        }

        self.node
            .pinned()
            .entry(key)
            .ok_or_else(|| Error::Internal(format!("rule {} vanished after install", key)))
    }

    /// `ReadRules`: every pinned rule, ordered by key
    pub fn read_rules(&self) -> Vec<PinnedEntry> {
        self.node.read_rules()
    }

    /// `RemoveRule`
    pub fn remove_rule(&self, key: u32) -> Option<RemovedRule> {
        let value = self.node.remove_rule(key)?;
        info!(key, value, "Pinned rule removed");
        Some(RemovedRule { key, value })
    }

    /// Install every rule of a seed file, returning how many were installed
    pub fn load_rules(&self, rules: &RulesFile) -> Result<usize> {
        for rule in &rules.rules {
            self.install_rule(rule.key, rule.value)?;
        }
        Ok(rules.rules.len())
    }

    /// Valid learned slots, ordered by slot
    pub fn learned(&self) -> Vec<LearnedSlot> {
        self.node
            .learned()
            .snapshot()
            .into_iter()
            .map(|(slot, entry)| LearnedSlot {
                slot,
                key: entry.key,
                value: entry.value,
            })
            .collect()
    }

    pub fn stats(&self) -> NodeStats {
        let counters = self.node.snapshot();
        NodeStats {
            learned_capacity: self.node.learned().capacity(),
            learned_occupied: self.node.learned().occupied(),
            pinned_entries: self.node.pinned().len(),
            pending_clients: self.node.pending().waiting(),
            hit_ratio: counters.hit_ratio(),
            counters,
        }
    }

    /// Liveness, readiness and pending backlog
    pub fn health(&self) -> HealthReport {
        HealthReport::new(
            &self.lifecycle,
            self.node.pending().keys(),
            self.pending_warn_threshold,
        )
    }

    pub fn lifecycle(&self) -> &NodeLifecycle {
        &self.lifecycle
    }

    /// Prometheus exposition as `(content type, body)`
    pub fn metrics_text(&self) -> Result<(String, Vec<u8>)> {
        self.node.snapshot();
        self.node.metrics().encode()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSpec;
    use crate::protocol::encode_request;

    fn admin() -> AdminService {
        let lifecycle = Arc::new(NodeLifecycle::new());
        lifecycle.mark_ready();
        AdminService::new(CacheNode::new(16).unwrap(), lifecycle)
    }

    #[test]
    fn test_install_and_read_rules() {
        let admin = admin();
        let entry = admin.install_rule(3, 876).unwrap();
        assert_eq!((entry.key, entry.value), (3, 876));

        admin.install_rule(3, 33).unwrap();
        admin.install_rule(1, 321).unwrap();

        let rules: Vec<(u32, u32)> = admin.read_rules().iter().map(|r| (r.key, r.value)).collect();
        assert_eq!(rules, vec![(1, 321), (3, 33)]);
    }

    #[test]
    fn test_remove_rule() {
        let admin = admin();
        admin.install_rule(2, 543).unwrap();

        assert_eq!(admin.remove_rule(2), Some(RemovedRule { key: 2, value: 543 }));
        assert_eq!(admin.remove_rule(2), None);
        assert!(admin.read_rules().is_empty());
    }

    #[test]
    fn test_load_rules() {
        let admin = admin();
        let rules = RulesFile {
            rules: vec![
                RuleSpec { key: 1, value: 321 },
                RuleSpec { key: 2, value: 543 },
                RuleSpec { key: 3, value: 33 },
            ],
        };

        assert_eq!(admin.load_rules(&rules).unwrap(), 3);
        assert_eq!(admin.stats().pinned_entries, 3);
    }

    #[test]
    fn test_learned_listing() {
        let admin = admin();
        admin
            .node
            .on_backend_response(&crate::protocol::encode_response(1, true, 11))
            .unwrap();

        let learned = admin.learned();
        assert_eq!(learned.len(), 1);
        assert_eq!((learned[0].key, learned[0].value), (1, 11));
        assert_eq!(learned[0].slot, admin.node.learned().slot_of(1));
    }

    #[test]
    fn test_health_reports_backlog() {
        let admin = admin().with_pending_warn_threshold(1);
        assert!(!admin.health().backlogged);

        let client = "127.0.0.1:4000".parse().unwrap();
        admin.node.on_request(&encode_request(1), client);
        admin.node.on_request(&encode_request(2), client);

        let health = admin.health();
        assert_eq!(health.pending_keys, 2);
        assert!(health.backlogged);
        assert!(health.is_serving());
    }

    #[test]
    fn test_stats() {
        let admin = admin();
        admin.install_rule(3, 33).unwrap();
        let client = "127.0.0.1:4000".parse().unwrap();
        admin.node.on_request(&encode_request(3), client);
        admin.node.on_request(&encode_request(4), client);

        let stats = admin.stats();
        assert_eq!(stats.learned_capacity, 16);
        assert_eq!(stats.pending_clients, 1);
        assert_eq!(stats.counters.pinned_hits, 1);
        assert_eq!(stats.counters.forwarded, 1);
        assert!((stats.hit_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metrics_text() {
        let admin = admin();
        admin.install_rule(3, 33).unwrap();

        let (_, body) = admin.metrics_text().unwrap();
        let body = String::from_utf8(body).unwrap();
        assert!(body.contains("netcache_pinned_entries 1"));
    }
}
