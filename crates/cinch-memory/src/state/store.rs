//! Thread-safe scoped key/value table with history, watchers, and rollback.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::history::{History, StateChange};
use super::scope::Scope;
use super::watch::{StateEvent, StateWatcher, WatchId};
use crate::config::StateStoreConfig;
use crate::error::panic_message;

// ── Snapshot ───────────────────────────────────────────────────────

/// Full copy of every scope's table, independent of history.
///
/// Serializes as `{"global": {...}, "workflow": {...}, ...}`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct StateSnapshot {
    scopes: BTreeMap<Scope, BTreeMap<String, Value>>,
}

impl StateSnapshot {
    /// Entries for one scope, if the snapshot covers it.
    pub fn scope(&self, scope: Scope) -> Option<&BTreeMap<String, Value>> {
        self.scopes.get(&scope)
    }

    /// Scopes covered by the snapshot.
    pub fn scopes(&self) -> impl Iterator<Item = Scope> + '_ {
        self.scopes.keys().copied()
    }
}

impl From<BTreeMap<Scope, BTreeMap<String, Value>>> for StateSnapshot {
    fn from(scopes: BTreeMap<Scope, BTreeMap<String, Value>>) -> Self {
        Self { scopes }
    }
}

// ── Store ──────────────────────────────────────────────────────────

type WatcherList = Vec<(WatchId, Arc<dyn StateWatcher>)>;

struct Inner {
    entries: BTreeMap<(Scope, String), Value>,
    history: History,
    watchers: HashMap<String, WatcherList>,
    next_watch_id: u64,
}

impl Inner {
    fn scope_entries(&self, scope: Scope) -> BTreeMap<String, Value> {
        self.entries
            .range((scope, String::new())..)
            .take_while(|((s, _), _)| *s == scope)
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Concurrent key/value table over four disjoint [`Scope`]s.
///
/// Every operation takes one re-entrant lock, so operations are linearizable
/// and a watcher running on the writing thread can call back into the store.
/// Values go in and come out by value (`serde_json::Value` clones are deep),
/// so no caller ever holds a reference into the table.
///
/// Each `set` records the prior value in a bounded history ring that drives
/// [`rollback`](Self::rollback). `delete`, `restore`, and `rollback` itself
/// are not recorded.
///
/// # Example
///
/// ```
/// use cinch_memory::config::StateStoreConfig;
/// use cinch_memory::state::{Scope, ScopedStateStore};
/// use serde_json::json;
///
/// let store = ScopedStateStore::new(StateStoreConfig::default());
/// store.set("plan", json!(["lint", "test"]), Scope::Workflow, "planner");
/// store.set("plan", json!(["test"]), Scope::Workflow, "reviewer");
/// assert!(store.get("plan", Scope::Agent).is_none());
///
/// assert!(store.rollback(1));
/// assert_eq!(store.get("plan", Scope::Workflow), Some(json!(["lint", "test"])));
/// ```
pub struct ScopedStateStore {
    config: StateStoreConfig,
    inner: ReentrantMutex<RefCell<Inner>>,
}

impl ScopedStateStore {
    pub fn new(config: StateStoreConfig) -> Self {
        let inner = Inner {
            entries: BTreeMap::new(),
            history: History::new(config.max_history),
            watchers: HashMap::new(),
            next_watch_id: 0,
        };
        Self {
            config,
            inner: ReentrantMutex::new(RefCell::new(inner)),
        }
    }

    pub fn config(&self) -> &StateStoreConfig {
        &self.config
    }

    /// Store `value` at `(scope, key)`, record the change, then notify every
    /// watcher registered for `key`.
    pub fn set(&self, key: &str, value: impl Into<Value>, scope: Scope, source: &str) {
        let value = value.into();
        let guard = self.inner.lock();

        // The RefCell borrow ends before watchers run so they can re-enter.
        let (old, watchers) = {
            let mut inner = guard.borrow_mut();
            let old = inner
                .entries
                .insert((scope, key.to_string()), value.clone());

            if self.config.enable_history {
                let change = StateChange {
                    key: key.to_string(),
                    old_value: old.clone(),
                    new_value: value.clone(),
                    scope,
                    timestamp: Utc::now(),
                    source: source.to_string(),
                };
                if let Some(dropped) = inner.history.push(change) {
                    trace!("History full; dropped change to {}.{}", dropped.scope, dropped.key);
                }
            }

            let watchers: WatcherList = inner.watchers.get(key).cloned().unwrap_or_default();
            (old, watchers)
        };

        let event = StateEvent {
            key,
            scope,
            old: old.as_ref(),
            new: &value,
            source,
        };
        notify(&watchers, &event);
        drop(guard);
    }

    /// Copy of the value at `(scope, key)`.
    pub fn get(&self, key: &str, scope: Scope) -> Option<Value> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        inner.entries.get(&(scope, key.to_string())).cloned()
    }

    /// Copy of the value at `(scope, key)`, or `default` if absent.
    pub fn get_or(&self, key: &str, scope: Scope, default: Value) -> Value {
        self.get(key, scope).unwrap_or(default)
    }

    /// Copy of every entry in `scope`.
    pub fn get_all(&self, scope: Scope) -> BTreeMap<String, Value> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        inner.scope_entries(scope)
    }

    /// Remove `(scope, key)`. Returns whether it existed. Not recorded in
    /// history and does not notify watchers.
    pub fn delete(&self, key: &str, scope: Scope) -> bool {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.entries.remove(&(scope, key.to_string())).is_some()
    }

    /// Apply [`set`](Self::set) to each entry in order.
    ///
    /// Each entry is its own recorded change. The whole merge runs under the
    /// lock, but it is not atomic: if a watcher panics through, earlier
    /// entries stay applied. Rolling back a merge of `n` entries takes
    /// `rollback(n)`.
    pub fn merge<I, K, V>(&self, entries: I, scope: Scope, source: &str)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let _guard = self.inner.lock();
        for (key, value) in entries {
            self.set(key.as_ref(), value, scope, source);
        }
    }

    /// Register `watcher` for writes to `key` in any scope.
    pub fn watch(&self, key: &str, watcher: impl StateWatcher + 'static) -> WatchId {
        self.watch_arc(key, Arc::new(watcher))
    }

    /// Register a shared watcher, e.g. one instance observing several keys.
    pub fn watch_arc(&self, key: &str, watcher: Arc<dyn StateWatcher>) -> WatchId {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let id = WatchId(inner.next_watch_id);
        inner.next_watch_id += 1;
        inner
            .watchers
            .entry(key.to_string())
            .or_default()
            .push((id, watcher));
        id
    }

    /// Remove one watcher (`Some(id)`) or every watcher (`None`) for `key`.
    /// Returns how many were removed.
    pub fn unwatch(&self, key: &str, id: Option<WatchId>) -> usize {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let Some(list) = inner.watchers.get_mut(key) else {
            return 0;
        };
        let removed = match id {
            Some(id) => {
                let before = list.len();
                list.retain(|(wid, _)| *wid != id);
                before - list.len()
            }
            None => list.len(),
        };
        if id.is_none() || list.is_empty() {
            inner.watchers.remove(key);
        }
        removed
    }

    /// Undo the `steps` most recent changes, newest first.
    ///
    /// Each undone change puts back the prior value, or removes the key if it
    /// was absent before. Returns `false` and changes nothing if fewer than
    /// `steps` changes are recorded. Watchers are not notified.
    pub fn rollback(&self, steps: usize) -> bool {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if steps > inner.history.len() {
            debug!(
                "Rollback of {steps} step(s) refused; only {} recorded",
                inner.history.len()
            );
            return false;
        }

        let Inner {
            entries, history, ..
        } = &mut *inner;
        for _ in 0..steps {
            let Some(change) = history.pop_newest() else {
                break;
            };
            let slot = (change.scope, change.key);
            match change.old_value {
                Some(old) => {
                    entries.insert(slot, old);
                }
                None => {
                    entries.remove(&slot);
                }
            }
        }
        debug!("Rolled back {steps} change(s)");
        true
    }

    /// Recorded changes, oldest first, optionally filtered by key and scope.
    /// `limit` keeps only the most recent matches.
    pub fn get_history(
        &self,
        key: Option<&str>,
        scope: Option<Scope>,
        limit: Option<usize>,
    ) -> Vec<StateChange> {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        let matches = |c: &&StateChange| {
            key.is_none_or(|k| c.key == k) && scope.is_none_or(|s| c.scope == s)
        };
        let mut changes: Vec<StateChange> = inner
            .history
            .iter()
            .rev()
            .filter(matches)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        changes.reverse();
        changes
    }

    /// Number of recorded changes available for rollback.
    pub fn history_len(&self) -> usize {
        self.inner.lock().borrow().history.len()
    }

    /// Copy out every scope.
    pub fn snapshot(&self) -> StateSnapshot {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        let scopes = Scope::ALL
            .into_iter()
            .map(|scope| (scope, inner.scope_entries(scope)))
            .collect();
        StateSnapshot { scopes }
    }

    /// Replace each scope present in `snapshot` wholesale. Scopes the
    /// snapshot does not mention are left alone; history is untouched.
    pub fn restore(&self, snapshot: &StateSnapshot) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        for (&scope, data) in &snapshot.scopes {
            inner.entries.retain(|(s, _), _| *s != scope);
            inner.entries.extend(
                data.iter()
                    .map(|(key, value)| ((scope, key.clone()), value.clone())),
            );
        }
    }

    /// Empty one scope, or every scope when `scope` is `None`.
    ///
    /// The whole history ring is cleared in both cases, including changes
    /// recorded against scopes that were not emptied.
    pub fn clear(&self, scope: Option<Scope>) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        match scope {
            Some(scope) => inner.entries.retain(|(s, _), _| *s != scope),
            None => inner.entries.clear(),
        }
        inner.history.clear();
    }
}

impl Default for ScopedStateStore {
    fn default() -> Self {
        Self::new(StateStoreConfig::default())
    }
}

/// Run watchers in registration order, containing any failure.
fn notify(watchers: &[(WatchId, Arc<dyn StateWatcher>)], event: &StateEvent<'_>) {
    for (id, watcher) in watchers {
        match catch_unwind(AssertUnwindSafe(|| watcher.on_change(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                key = event.key,
                scope = %event.scope,
                watch_id = id.0,
                error = %e,
                "State watcher failed"
            ),
            Err(payload) => warn!(
                key = event.key,
                scope = %event.scope,
                watch_id = id.0,
                panic = %panic_message(payload.as_ref()),
                "State watcher panicked"
            ),
        }
    }
}
