//! Two-Tier Lookup Cache
//!
//! The cache node answers requests from two tiers before falling back to the
//! backend store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                            Lookup Order                                  │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  Pinned Cache (admin)     │ Learned Cache (traffic)   │ Backend Store    │
//! │  ┌────────────────────┐   │ ┌─────────────────────┐   │ ┌──────────────┐ │
//! │  │ Sharded exact-match│   │ │ Direct-mapped slots │   │ │ UDP peer     │ │
//! │  │ key → value        │   │ │ fnv1a(key) & (N-1)  │   │ │ (authority)  │ │
//! │  │ never expires      │   │ │ evict on collision  │   │ │              │ │
//! │  └────────────────────┘   │ └─────────────────────┘   │ └──────────────┘ │
//! │            │              │           ▲               │        │         │
//! │            │              │           └──── observe ──┼────────┘         │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - Pinned entries always win over learned entries
//! - Learned entries are written only from positive backend responses
//! - No negative caching, no TTL
//! - Per-slot locking in the learned tier, cache-line padded slots

mod learned;
mod pinned;

pub use learned::{fnv1a_32, LearnedCache, LearnedEntry, Observation};
pub use pinned::{PinnedCache, PinnedEntry};

/// Default number of learned cache slots
pub const DEFAULT_LEARNED_SLOTS: usize = 1024;

/// Which tier answered a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// Administratively installed entry
    Pinned,
    /// Entry learned from backend traffic
    Learned,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::Pinned => write!(f, "pinned"),
            CacheTier::Learned => write!(f, "learned"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_slots_is_power_of_two() {
        assert!(DEFAULT_LEARNED_SLOTS.is_power_of_two());
    }

    #[test]
    fn test_cache_tier_display() {
        assert_eq!(format!("{}", CacheTier::Pinned), "pinned");
        assert_eq!(format!("{}", CacheTier::Learned), "learned");
    }
}
