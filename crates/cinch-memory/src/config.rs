//! Configuration for the memory components.
//!
//! Each component takes its own config struct at construction; nothing is
//! read from the environment or from process-wide globals. [`MemoryConfig`]
//! bundles all three so an orchestrator can embed one section in its own
//! config file.
//!
//! # Examples
//!
//! ```
//! use cinch_memory::config::{ContextWindowConfig, DurableStoreConfig, StateStoreConfig};
//! use std::time::Duration;
//!
//! let context = ContextWindowConfig::default()
//!     .with_max_tokens(8192)
//!     .with_reserve_tokens(1024);
//! assert_eq!(context.budget(), 7168);
//!
//! let state = StateStoreConfig::default().with_max_history(500);
//! assert!(state.enable_history);
//!
//! let durable = DurableStoreConfig::new("/tmp/agent-memory")
//!     .with_default_ttl(Duration::from_secs(3600));
//! assert_eq!(durable.default_ttl, Some(Duration::from_secs(3600)));
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ── Context window ────────────────────────────────────────────────

/// Token budget for a [`ContextWindow`](crate::context::ContextWindow).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextWindowConfig {
    /// Total context size in estimated tokens. Default: `4096`.
    pub max_tokens: usize,
    /// Tokens held back for the model's response. Default: `512`.
    pub reserve_tokens: usize,
}

impl Default for ContextWindowConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            reserve_tokens: 512,
        }
    }
}

impl ContextWindowConfig {
    pub fn new(max_tokens: usize, reserve_tokens: usize) -> Self {
        Self {
            max_tokens,
            reserve_tokens,
        }
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_reserve_tokens(mut self, tokens: usize) -> Self {
        self.reserve_tokens = tokens;
        self
    }

    /// Tokens available to the system message plus rolling messages.
    pub fn budget(&self) -> usize {
        self.max_tokens.saturating_sub(self.reserve_tokens)
    }
}

// ── Scoped state ──────────────────────────────────────────────────

/// Change-history settings for a [`ScopedStateStore`](crate::state::ScopedStateStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateStoreConfig {
    /// Whether `set` records changes for rollback. Default: `true`.
    pub enable_history: bool,
    /// Capacity of the history ring. Default: `100`.
    pub max_history: usize,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            enable_history: true,
            max_history: 100,
        }
    }
}

impl StateStoreConfig {
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Disable change tracking entirely. Rollback becomes unavailable.
    pub fn without_history(mut self) -> Self {
        self.enable_history = false;
        self
    }
}

// ── Durable store ─────────────────────────────────────────────────

/// Location and expiry defaults for a [`DurableStore`](crate::durable::DurableStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableStoreConfig {
    /// Directory holding the index and one record file per key.
    /// Default: `.memory`.
    pub storage_dir: PathBuf,
    /// TTL applied when `store` is called without one. Default: none
    /// (entries never expire).
    #[serde(with = "opt_secs")]
    pub default_ttl: Option<Duration>,
}

impl Default for DurableStoreConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(".memory"),
            default_ttl: None,
        }
    }
}

impl DurableStoreConfig {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }
}

// ── Bundle ────────────────────────────────────────────────────────

/// All three component configs in one serializable section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub context: ContextWindowConfig,
    pub state: StateStoreConfig,
    pub durable: DurableStoreConfig,
}

/// Serialize an optional duration as fractional seconds.
pub(crate) mod opt_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_secs_f64()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        secs.map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
