//! netcache - Transparent In-Network Key-Value Cache
//!
//! A cache node that sits on the path between clients and an authoritative
//! key-value store, answering `u32 → u32` lookups from two tiers before the
//! request ever reaches the store.
//!
//! # Architecture
//!
//! ```text
//! ┌────────┐  Request(k)   ┌──────────────────────────────┐  Request(k)  ┌─────────┐
//! │ Client │──────────────▶│          Cache Node          │─────────────▶│ Backend │
//! │        │◀──────────────│  ┌────────┐   ┌──────────┐   │◀─────────────│  Store  │
//! └────────┘  Response     │  │ Pinned │──▶│ Learned  │   │  Response    └─────────┘
//!                          │  └────────┘   └──────────┘   │  (snooped)
//!                          └──────────────▲───────────────┘
//!                                         │ InstallRule / ReadRules / RemoveRule
//!                                   ┌─────┴─────┐
//!                                   │ Admin HTTP│
//!                                   └───────────┘
//! ```
//!
//! # Modules
//!
//! - [`protocol`] - Fixed-size UDP wire codec
//! - [`cache`] - Pinned and learned cache tiers
//! - [`node`] - Request decision logic and UDP transport
//! - [`backend`] - Authoritative store and its UDP server
//! - [`client`] - One-shot lookup client
//! - [`admin`] - Rule management, health and metrics over HTTP
//! - [`config`] - Node configuration and rule seed files
//! - [`metrics`] - Prometheus metrics
//! - [`error`] - Error types

pub mod admin;
pub mod backend;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod node;
pub mod protocol;

// Re-export commonly used types
pub use admin::{AdminClient, AdminServer, AdminService};
pub use backend::{BackendServer, BackendStore, InMemoryBackend};
pub use cache::{LearnedCache, PinnedCache};
pub use client::{lookup, Lookup};
pub use config::{NodeConfig, RulesFile};
pub use error::{Error, Result};
pub use node::{CacheNode, CacheNodeServer};
pub use protocol::{Request, Response};
