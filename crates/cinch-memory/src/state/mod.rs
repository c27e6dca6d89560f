//! Shared scoped state for agents in a workflow.
//!
//! [`ScopedStateStore`] keeps one key/value table per [`Scope`], records each
//! write in a bounded [`StateChange`] history, and notifies per-key
//! [`StateWatcher`]s. Multiple threads may share one store behind an `Arc`.
//!
//! ```
//! use cinch_memory::state::{FnWatcher, Scope, ScopedStateStore};
//! use serde_json::json;
//!
//! let store = ScopedStateStore::default();
//! store.watch("status", FnWatcher::new(|event| {
//!     tracing::info!("{} is now {}", event.key, event.new);
//!     Ok(())
//! }));
//! store.set("status", json!("running"), Scope::Workflow, "orchestrator");
//! assert_eq!(store.get_history(Some("status"), None, None).len(), 1);
//! ```

mod history;
mod scope;
mod store;
mod watch;

pub use history::StateChange;
pub use scope::Scope;
pub use store::{ScopedStateStore, StateSnapshot};
pub use watch::{FnWatcher, LoggingWatcher, StateEvent, StateWatcher, WatchId};
