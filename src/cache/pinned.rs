//! Pinned Cache - Administratively Installed Entries
//!
//! Exact-match table written only by the admin interface. Entries never
//! expire and are never created from traffic.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A pinned rule as reported by `ReadRules`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedEntry {
    /// Matched key
    pub key: u32,
    /// Value returned for the key
    pub value: u32,
    /// When the rule was last written
    pub installed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    value: u32,
    installed_at: DateTime<Utc>,
}

/// Exact-match key → value table
#[derive(Debug, Default)]
pub struct PinnedCache {
    entries: DashMap<u32, Slot>,
}

impl PinnedCache {
    /// Create an empty pinned cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a rule, returning the value it replaced
    pub fn install(&self, key: u32, value: u32) -> Option<u32> {
        let slot = Slot {
            value,
            installed_at: Utc::now(),
        };
        self.entries.insert(key, slot).map(|old| old.value)
    }

    /// Exact-match lookup
    pub fn lookup(&self, key: u32) -> Option<u32> {
        self.entries.get(&key).map(|slot| slot.value)
    }

    /// Full rule for a key
    pub fn entry(&self, key: u32) -> Option<PinnedEntry> {
        self.entries.get(&key).map(|slot| PinnedEntry {
            key,
            value: slot.value,
            installed_at: slot.installed_at,
        })
    }

    /// Remove a rule, returning its value
    pub fn remove(&self, key: u32) -> Option<u32> {
        self.entries.remove(&key).map(|(_, slot)| slot.value)
    }

    /// All rules, ordered by key
    pub fn entries(&self) -> Vec<PinnedEntry> {
        let mut entries: Vec<PinnedEntry> = self
            .entries
            .iter()
            .map(|e| PinnedEntry {
                key: *e.key(),
                value: e.value().value,
                installed_at: e.value().installed_at,
            })
            .collect();
        entries.sort_by_key(|e| e.key);
        entries
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no rules are installed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_lookup() {
        let cache = PinnedCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.lookup(3), None);

        assert_eq!(cache.install(3, 33), None);
        assert_eq!(cache.lookup(3), Some(33));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entry(3).map(|e| e.value), Some(33));
        assert!(cache.entry(4).is_none());
    }

    #[test]
    fn test_install_is_idempotent_upsert() {
        let cache = PinnedCache::new();
        cache.install(3, 876);
        assert_eq!(cache.install(3, 33), Some(876));

        let entries = cache.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, 3);
        assert_eq!(entries[0].value, 33);
    }

    #[test]
    fn test_remove() {
        let cache = PinnedCache::new();
        cache.install(1, 321);

        assert_eq!(cache.remove(1), Some(321));
        assert_eq!(cache.remove(1), None);
        assert_eq!(cache.lookup(1), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_entries_sorted_by_key() {
        let cache = PinnedCache::new();
        for key in [9, 2, 5, 1] {
            cache.install(key, key * 10);
        }

        let keys: Vec<u32> = cache.entries().iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![1, 2, 5, 9]);
    }

    #[test]
    fn test_install_refreshes_timestamp() {
        let cache = PinnedCache::new();
        cache.install(4, 1);
        let first = cache.entries()[0].installed_at;

        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.install(4, 2);
        let second = cache.entries()[0].installed_at;

        assert!(second > first);
    }

    #[test]
    fn test_concurrent_installs() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(PinnedCache::new());

        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100u32 {
                        cache.install(t * 1000 + i, i);
                        assert_eq!(cache.lookup(t * 1000 + i), Some(i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 800);
    }

    #[test]
    fn test_entry_serialization() {
        let cache = PinnedCache::new();
        cache.install(3, 33);

        let json = serde_json::to_string(&cache.entries()).unwrap();
        assert!(json.contains("\"key\":3"));
        assert!(json.contains("\"value\":33"));

        let parsed: Vec<PinnedEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cache.entries());
    }
}
