//! Working memory for long-running `cinch-rs` agents.
//!
//! `cinch-memory` provides three independent building blocks that an
//! orchestrator wires together:
//!
//! - a token-budgeted **conversation window** that builds the next LLM call,
//! - a thread-safe **scoped state store** agents use to hand data to each
//!   other within a workflow,
//! - a **durable store** that persists results across process restarts.
//!
//! None of them depends on the others, and none reads process-wide
//! configuration: each takes its config struct at construction.
//!
//! ```
//! use cinch_memory::prelude::*;
//! use serde_json::json;
//!
//! let mut window = ContextWindow::new(ContextWindowConfig::new(100, 20));
//! window.set_system_message("You are a release assistant.");
//! window.add_message(MessageRole::User, "Cut 1.4.0", None);
//!
//! let state = ScopedStateStore::default();
//! state.set("release", json!("1.4.0"), Scope::Workflow, "planner");
//! assert_eq!(state.get("release", Scope::Workflow), Some(json!("1.4.0")));
//! assert_eq!(window.get_context().len(), 2);
//! ```
//!
//! # Where to find things
//!
//! - **Keep a conversation under budget:** [`ContextWindow`](context::ContextWindow)
//!   evicts the oldest messages first and pins the system message. Collapse
//!   history with [`summarize_old`](context::ContextWindow::summarize_old) and
//!   any [`Summarizer`](context::Summarizer).
//!
//! - **Share state between agents:** [`ScopedStateStore`](state::ScopedStateStore)
//!   with its four [`Scope`](state::Scope)s. Register a
//!   [`StateWatcher`](state::StateWatcher) to react to writes, and use
//!   [`rollback`](state::ScopedStateStore::rollback) or
//!   [`snapshot`](state::ScopedStateStore::snapshot) to undo them.
//!
//! - **Persist across runs:** [`DurableStore`](durable::DurableStore) with
//!   per-entry TTL and tags. Inject a [`ManualClock`](clock::ManualClock) to
//!   drive expiry in tests.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | [`ContextWindow`](context::ContextWindow), token estimate, usage report, summarizer hook |
//! | [`state`] | [`ScopedStateStore`](state::ScopedStateStore), scopes, history, watchers, snapshots |
//! | [`durable`] | [`DurableStore`](durable::DurableStore), on-disk records and index |
//! | [`config`] | Per-component config structs and the [`MemoryConfig`](config::MemoryConfig) bundle |
//! | [`clock`] | Time source used for TTL expiry |
//! | [`error`] | [`MemoryError`] and [`Result`] |
//!
//! # Failure model
//!
//! Agent loops should not die on a memory hiccup. Capacity failures, missing
//! keys, expired entries, and corrupt files all come back as `false`, `None`,
//! or an empty collection, and anything unexpected is logged through
//! `tracing`. Only [`DurableStore::open`](durable::DurableStore::open) returns
//! a `Result`.

pub mod clock;
pub mod config;
pub mod context;
pub mod durable;
pub mod error;
pub mod prelude;
pub mod state;

pub use error::{MemoryError, Result};
