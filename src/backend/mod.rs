//! Backend Store
//!
//! Authoritative key → value source. The cache node never calls a store
//! directly; it talks to a [`BackendServer`] over the same UDP protocol the
//! clients use, which is what lets it snoop the replies.
//!
//! # Design
//!
//! - Async store trait so other backends can be plugged in
//! - In-memory store backed by DashMap for tests and the `backend` subcommand

mod server;

pub use server::BackendServer;

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{Error, Result};

/// Default seed of the reference backend
pub const DEFAULT_SEED: [(u32, u32); 2] = [(1, 11), (2, 22)];

/// Authoritative key-value store
#[async_trait]
pub trait BackendStore: Send + Sync {
    /// Look up a key
    async fn get(&self, key: u32) -> Result<Option<u32>>;

    /// Insert or overwrite a key
    async fn put(&self, key: u32, value: u32) -> Result<()>;

    /// Get store statistics
    fn stats(&self) -> BackendStats;
}

/// Backend store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Number of stored keys
    pub keys: u64,
    /// Lookups served
    pub lookups: u64,
    /// Lookups that found a value
    pub found: u64,
    /// Lookups that found nothing
    pub not_found: u64,
}

/// In-memory backend store
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    store: DashMap<u32, u32>,
    lookups: AtomicU64,
    found: AtomicU64,
    not_found: AtomicU64,
}

impl InMemoryBackend {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `pairs`
    pub fn with_entries(pairs: impl IntoIterator<Item = (u32, u32)>) -> Self {
        let backend = Self::new();
        for (key, value) in pairs {
            backend.store.insert(key, value);
        }
        backend
    }
}

#[async_trait]
impl BackendStore for InMemoryBackend {
    async fn get(&self, key: u32) -> Result<Option<u32>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let value = self.store.get(&key).map(|v| *v);
        match value {
            Some(_) => self.found.fetch_add(1, Ordering::Relaxed),
            None => self.not_found.fetch_add(1, Ordering::Relaxed),
        };
        Ok(value)
    }

    async fn put(&self, key: u32, value: u32) -> Result<()> {
        self.store.insert(key, value);
        Ok(())
    }

    fn stats(&self) -> BackendStats {
        BackendStats {
            keys: self.store.len() as u64,
            lookups: self.lookups.load(Ordering::Relaxed),
            found: self.found.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
        }
    }
}

/// Parse a `KEY=VALUE` seed argument
pub fn parse_seed(arg: &str) -> Result<(u32, u32)> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| Error::Config(format!("expected KEY=VALUE, got '{}'", arg)))?;

    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|e| Error::Config(format!("invalid number '{}' in '{}': {}", s, arg, e)))
    };

    Ok((parse(key)?, parse(value)?))
}

/// [`DEFAULT_SEED`] followed by the parsed `KEY=VALUE` arguments
///
/// Arguments extend the defaults rather than replace them; fed to
/// [`InMemoryBackend::with_entries`], a later pair for the same key wins.
pub fn seed_pairs<S: AsRef<str>>(args: &[S]) -> Result<Vec<(u32, u32)>> {
    let mut pairs = DEFAULT_SEED.to_vec();
    for arg in args {
        pairs.push(parse_seed(arg.as_ref())?);
    }
    Ok(pairs)
}

// =============================================================================
// Tests
// =============================================================================
