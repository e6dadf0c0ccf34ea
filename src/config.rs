//! Node configuration and the pinned-rule seed file

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_LEARNED_SLOTS;
use crate::error::{Error, Result};
use crate::protocol::UDP_PORT;

/// Default time a client may wait on the backend before it is forgotten
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pending sweep period
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Cache node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Client-facing UDP address
    pub listen: SocketAddr,
    /// Backend store address
    pub backend: SocketAddr,
    /// Learned cache slots (power of two)
    pub slots: usize,
    /// How long a forwarded request waits for the backend
    pub pending_timeout: Duration,
    /// How often stale waiters are swept
    pub sweep_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], UDP_PORT)),
            backend: SocketAddr::from(([127, 0, 0, 1], UDP_PORT + 1)),
            slots: DEFAULT_LEARNED_SLOTS,
            pending_timeout: DEFAULT_PENDING_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl NodeConfig {
    /// Check invariants that the node relies on
    pub fn validate(&self) -> Result<()> {
        if self.slots == 0 || !self.slots.is_power_of_two() {
            return Err(Error::Config(format!(
                "slots must be a non-zero power of two, got {}",
                self.slots
            )));
        }
        if self.pending_timeout.is_zero() {
            return Err(Error::Config("pending timeout must be non-zero".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::Config("sweep interval must be non-zero".into()));
        }
        if self.listen == self.backend {
            return Err(Error::Config(format!(
                "listen and backend addresses are both {}",
                self.listen
            )));
        }
        Ok(())
    }
}

/// One pinned rule in a rules file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub key: u32,
    pub value: u32,
}

/// Pinned rules installed at startup
///
/// ```yaml
/// rules:
///   - key: 3
///     value: 33
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesFile {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl RulesFile {
    /// Parse rules from YAML text
    pub fn from_yaml(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Load rules from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let rules_error = |reason: String| Error::RulesFile {
            path: path.display().to_string(),
            reason,
        };

        let text = std::fs::read_to_string(path).map_err(|e| rules_error(e.to_string()))?;
        Self::from_yaml(&text).map_err(|e| rules_error(e.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================
