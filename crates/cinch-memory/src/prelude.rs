//! Convenience re-exports for common `cinch-memory` types.
//!
//! ```ignore
//! use cinch_memory::prelude::*;
//! ```
//!
//! Lower-level pieces (transcript formatting, record file naming, the
//! history entry type) stay in their modules. The crate's `Result<T>` alias
//! is not re-exported; it would shadow `std::result::Result`.

// ── Config ──────────────────────────────────────────────────────────
pub use crate::config::{ContextWindowConfig, DurableStoreConfig, MemoryConfig, StateStoreConfig};

// ── Context window ──────────────────────────────────────────────────
pub use crate::context::{ContextMessage, ContextWindow, MessageRole, Summarizer, TokenUsage};

// ── Scoped state ────────────────────────────────────────────────────
pub use crate::state::{
    FnWatcher, LoggingWatcher, Scope, ScopedStateStore, StateEvent, StateSnapshot, StateWatcher,
    WatchId,
};

// ── Durable store ───────────────────────────────────────────────────
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::durable::{DurableEntry, DurableStore, TaggedValue};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::MemoryError;
