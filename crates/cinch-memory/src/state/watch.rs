//! Observers for state transitions.
//!
//! | Watcher | Use case |
//! |---------|----------|
//! | [`FnWatcher`] | Quick closures for simple callbacks |
//! | [`LoggingWatcher`] | Structured logging of every change via `tracing` |
//! | Custom `impl StateWatcher` | Monitoring surfaces, metrics, triggers |

use serde_json::Value;
use tracing::debug;

use super::scope::Scope;

/// A single transition, as seen by a watcher.
#[derive(Debug, Clone, Copy)]
pub struct StateEvent<'a> {
    pub key: &'a str,
    pub scope: Scope,
    /// Value before the write, `None` if the key was absent in `scope`.
    pub old: Option<&'a Value>,
    pub new: &'a Value,
    pub source: &'a str,
}

/// Observer for writes to a key.
///
/// Watchers are registered per key name and fire for writes in any scope.
/// They run synchronously on the writing thread, after the new value is in
/// place. An `Err` (or a panic) is logged and otherwise ignored: it never
/// undoes the write or reaches the writer.
///
/// The store's lock is re-entrant, so a watcher may read or write the same
/// store from inside `on_change`. It must not block on another thread that is
/// itself waiting on the store.
///
/// # Example
///
/// ```
/// use cinch_memory::state::{StateEvent, StateWatcher};
///
/// struct Alarm;
///
/// impl StateWatcher for Alarm {
///     fn on_change(&self, event: &StateEvent<'_>) -> Result<(), String> {
///         if event.new.as_str() == Some("failed") {
///             return Err(format!("{} failed", event.key));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait StateWatcher: Send + Sync {
    fn on_change(&self, event: &StateEvent<'_>) -> Result<(), String>;
}

/// A watcher backed by a closure.
///
/// ```ignore
/// let id = store.watch("status", FnWatcher::new(|event| {
///     println!("{} -> {}", event.key, event.new);
///     Ok(())
/// }));
/// ```
pub struct FnWatcher<F>(F)
where
    F: Fn(&StateEvent<'_>) -> Result<(), String> + Send + Sync;

impl<F> FnWatcher<F>
where
    F: Fn(&StateEvent<'_>) -> Result<(), String> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> StateWatcher for FnWatcher<F>
where
    F: Fn(&StateEvent<'_>) -> Result<(), String> + Send + Sync,
{
    fn on_change(&self, event: &StateEvent<'_>) -> Result<(), String> {
        (self.0)(event)
    }
}

/// Logs every change it sees at debug level.
pub struct LoggingWatcher;

impl StateWatcher for LoggingWatcher {
    fn on_change(&self, event: &StateEvent<'_>) -> Result<(), String> {
        match event.old {
            Some(old) => debug!(
                "[{}] {}.{}: {} -> {}",
                event.source, event.scope, event.key, old, event.new
            ),
            None => debug!(
                "[{}] {}.{}: (absent) -> {}",
                event.source, event.scope, event.key, event.new
            ),
        }
        Ok(())
    }
}

/// Handle returned by [`ScopedStateStore::watch`](super::ScopedStateStore::watch),
/// used to remove exactly that registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub(crate) u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fn_watcher_forwards_event() {
        let watcher = FnWatcher::new(|event: &StateEvent<'_>| {
            if event.old.is_none() && event.new == &Value::from(1) {
                Ok(())
            } else {
                Err("unexpected".into())
            }
        });
        let new = Value::from(1);
        let event = StateEvent {
            key: "k",
            scope: Scope::Task,
            old: None,
            new: &new,
            source: "test",
        };
        assert!(watcher.on_change(&event).is_ok());
    }

    #[test]
    fn logging_watcher_never_fails() {
        let old = Value::from("a");
        let new = Value::from("b");
        let event = StateEvent {
            key: "k",
            scope: Scope::Global,
            old: Some(&old),
            new: &new,
            source: "test",
        };
        assert!(LoggingWatcher.on_change(&event).is_ok());
    }
}
