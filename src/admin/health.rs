//! Node liveness and readiness
//!
//! A node is live from process start until shutdown begins, and ready once
//! its UDP sockets are bound. A pending backlog above the configured
//! threshold is reported but does not make the node unready: hits are still
//! served from the caches while the backend catches up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Start/stop flags shared between `main` and the admin server
#[derive(Debug)]
pub struct NodeLifecycle {
    started: Instant,
    live: AtomicBool,
    ready: AtomicBool,
}

impl NodeLifecycle {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    /// Sockets are bound; start answering `/readyz`
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Shutdown has begun
    pub fn mark_stopping(&self) {
        self.ready.store(false, Ordering::Release);
        self.live.store(false, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for NodeLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub live: bool,
    pub ready: bool,
    /// Keys with at least one client waiting on the backend
    pub pending_keys: usize,
    /// `pending_keys` is above the warning threshold
    pub backlogged: bool,
    pub uptime_seconds: u64,
    pub version: String,
}

impl HealthReport {
    pub fn new(lifecycle: &NodeLifecycle, pending_keys: usize, warn_threshold: usize) -> Self {
        Self {
            live: lifecycle.is_live(),
            ready: lifecycle.is_ready(),
            pending_keys,
            backlogged: pending_keys > warn_threshold,
            uptime_seconds: lifecycle.uptime_seconds(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Live and ready; a backlog alone does not stop the node serving
    pub fn is_serving(&self) -> bool {
        self.live && self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = NodeLifecycle::new();
        assert!(lifecycle.is_live());
        assert!(!lifecycle.is_ready());

        lifecycle.mark_ready();
        assert!(lifecycle.is_ready());

        lifecycle.mark_stopping();
        assert!(!lifecycle.is_live());
        assert!(!lifecycle.is_ready());
    }

    #[test]
    fn test_report_serving_only_when_bound() {
        let lifecycle = NodeLifecycle::new();
        assert!(!HealthReport::new(&lifecycle, 0, 10).is_serving());

        lifecycle.mark_ready();
        let report = HealthReport::new(&lifecycle, 0, 10);
        assert!(report.is_serving());
        assert!(!report.backlogged);
    }

    #[test]
    fn test_backlog_reported_while_serving() {
        let lifecycle = NodeLifecycle::new();
        lifecycle.mark_ready();

        assert!(!HealthReport::new(&lifecycle, 10, 10).backlogged);
        let report = HealthReport::new(&lifecycle, 11, 10);
        assert!(report.backlogged);
        assert!(report.is_serving());
    }

    #[test]
    fn test_report_json() {
        let lifecycle = NodeLifecycle::new();
        let json = serde_json::to_value(HealthReport::new(&lifecycle, 3, 10)).unwrap();
        assert_eq!(json["pending_keys"], 3);
        assert_eq!(json["ready"], false);
        assert_eq!(json["backlogged"], false);
    }
}
