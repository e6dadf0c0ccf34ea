//! Pending Correlation Table
//!
//! UDP carries no session, so the node remembers which clients are waiting
//! on a forwarded key. A backend response for that key is relayed to every
//! waiter and clears the entry.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
struct Waiter {
    addr: SocketAddr,
    since: Instant,
}

/// Clients waiting on the backend, keyed by request key
#[derive(Debug, Default)]
pub struct PendingTable {
    waiters: DashMap<u32, Vec<Waiter>>,
}

impl PendingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `addr` waits on `key`. A client already waiting on the
    /// key is refreshed rather than added twice. Returns the number of
    /// clients now waiting on the key.
    pub fn register(&self, key: u32, addr: SocketAddr) -> usize {
        self.register_at(key, addr, Instant::now())
    }

    fn register_at(&self, key: u32, addr: SocketAddr, now: Instant) -> usize {
        let mut waiters = self.waiters.entry(key).or_default();
        match waiters.iter_mut().find(|w| w.addr == addr) {
            Some(existing) => existing.since = now,
            None => waiters.push(Waiter { addr, since: now }),
        }
        waiters.len()
    }

    /// Remove and return every client waiting on `key`
    pub fn take(&self, key: u32) -> Vec<SocketAddr> {
        self.waiters
            .remove(&key)
            .map(|(_, waiters)| waiters.into_iter().map(|w| w.addr).collect())
            .unwrap_or_default()
    }

    /// Drop waiters older than `timeout`, returning how many were dropped
    pub fn expire(&self, timeout: Duration) -> usize {
        self.expire_at(timeout, Instant::now())
    }

    fn expire_at(&self, timeout: Duration, now: Instant) -> usize {
        let mut expired = 0;
        self.waiters.retain(|_, waiters| {
            let before = waiters.len();
            waiters.retain(|w| now.saturating_duration_since(w.since) < timeout);
            expired += before - waiters.len();
            !waiters.is_empty()
        });
        expired
    }

    /// Keys with at least one waiter
    pub fn keys(&self) -> usize {
        self.waiters.len()
    }

    /// Total waiting clients
    pub fn waiting(&self) -> usize {
        self.waiters.iter().map(|e| e.value().len()).sum()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_register_and_take() {
        let table = PendingTable::new();
        assert_eq!(table.register(1, addr(5000)), 1);
        assert_eq!(table.register(1, addr(5001)), 2);
        assert_eq!(table.keys(), 1);
        assert_eq!(table.waiting(), 2);

        let clients = table.take(1);
        assert_eq!(clients, vec![addr(5000), addr(5001)]);
        assert_eq!(table.keys(), 0);
        assert!(table.take(1).is_empty());
    }

    #[test]
    fn test_same_client_registered_once() {
        let table = PendingTable::new();
        table.register(7, addr(5000));
        assert_eq!(table.register(7, addr(5000)), 1);
        assert_eq!(table.take(7), vec![addr(5000)]);
    }

    #[test]
    fn test_keys_are_independent() {
        let table = PendingTable::new();
        table.register(1, addr(5000));
        table.register(2, addr(5001));

        assert_eq!(table.take(2), vec![addr(5001)]);
        assert_eq!(table.take(1), vec![addr(5000)]);
    }

    #[test]
    fn test_expire() {
        let table = PendingTable::new();
        let start = Instant::now();
        table.register_at(1, addr(5000), start);
        table.register_at(1, addr(5001), start + Duration::from_secs(3));
        table.register_at(2, addr(5002), start);

        let expired = table.expire_at(Duration::from_secs(5), start + Duration::from_secs(6));
        assert_eq!(expired, 2);
        assert_eq!(table.keys(), 1);
        assert_eq!(table.take(1), vec![addr(5001)]);
    }

    #[test]
    fn test_reregister_refreshes_deadline() {
        let table = PendingTable::new();
        let start = Instant::now();
        table.register_at(1, addr(5000), start);
        table.register_at(1, addr(5000), start + Duration::from_secs(4));

        let expired = table.expire_at(Duration::from_secs(5), start + Duration::from_secs(6));
        assert_eq!(expired, 0);
        assert_eq!(table.waiting(), 1);
    }
}
