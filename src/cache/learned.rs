//! Learned Cache - Direct-Mapped Register Table
//!
//! Fixed-size table populated by snooping positive backend responses.
//!
//! # Design
//!
//! - `N` pre-allocated slots, `N` a power of two, never resized
//! - Slot index is `fnv1a_32(key) & (N - 1)`
//! - Direct-mapped: one entry per slot, a colliding key evicts the occupant
//!   and lookups never try a second slot
//! - Each slot has its own RwLock and is padded to a cache line so writers
//!   on different slots never contend

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{Error, Result};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the key's network-order bytes
#[inline]
pub fn fnv1a_32(key: u32) -> u32 {
    key.to_be_bytes().iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Contents of one slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LearnedEntry {
    /// Stored key
    pub key: u32,
    /// Stored value
    pub value: u32,
    /// Whether the slot holds anything
    pub valid: bool,
}

/// What an `observe` did to its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The slot was empty
    Filled,
    /// The slot already held this key
    Refreshed { previous: u32 },
    /// The slot held a different key, which is now gone
    Evicted { key: u32, value: u32 },
}

/// Direct-mapped learned cache
pub struct LearnedCache {
    slots: Box<[CachePadded<RwLock<LearnedEntry>>]>,
    mask: usize,
    occupied: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for LearnedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearnedCache")
            .field("capacity", &self.capacity())
            .field("occupied", &self.occupied())
            .finish()
    }
}

impl LearnedCache {
    /// Create a table with `slots` entries. `slots` must be a non-zero power of two.
    pub fn new(slots: usize) -> Result<Self> {
        if slots == 0 || !slots.is_power_of_two() {
            return Err(Error::Config(format!(
                "learned cache slots must be a non-zero power of two, got {}",
                slots
            )));
        }

        let slots: Vec<CachePadded<RwLock<LearnedEntry>>> = (0..slots)
            .map(|_| CachePadded::new(RwLock::new(LearnedEntry::default())))
            .collect();

        Ok(Self {
            mask: slots.len() - 1,
            slots: slots.into_boxed_slice(),
            occupied: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Slot index for a key
    #[inline]
    pub fn slot_of(&self, key: u32) -> usize {
        fnv1a_32(key) as usize & self.mask
    }

    /// Hit only if the slot is valid and holds exactly `key`
    pub fn lookup(&self, key: u32) -> Option<u32> {
        let entry = *self.slots[self.slot_of(key)].read();

        if entry.valid && entry.key == key {
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.value)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Write `{key, value, valid}` into the key's slot, replacing whatever was there
    pub fn observe(&self, key: u32, value: u32) -> Observation {
        let mut slot = self.slots[self.slot_of(key)].write();
        let previous = *slot;
        *slot = LearnedEntry {
            key,
            value,
            valid: true,
        };
        drop(slot);

        if !previous.valid {
            self.occupied.fetch_add(1, Ordering::Relaxed);
            Observation::Filled
        } else if previous.key == key {
            Observation::Refreshed {
                previous: previous.value,
            }
        } else {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            Observation::Evicted {
                key: previous.key,
                value: previous.value,
            }
        }
    }

    /// Number of slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of valid slots
    pub fn occupied(&self) -> usize {
        self.occupied.load(Ordering::Relaxed)
    }

    /// Lookup hits so far
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookup misses so far
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Collisions that displaced a different key
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Valid entries with their slot index
    pub fn snapshot(&self) -> Vec<(usize, LearnedEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| {
                let entry = *slot.read();
                entry.valid.then_some((idx, entry))
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
