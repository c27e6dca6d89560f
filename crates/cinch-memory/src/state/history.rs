//! Bounded change history backing rollback.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::scope::Scope;

/// One recorded `set`.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct StateChange {
    pub key: String,
    /// Value before the write, or `None` if the key was absent. Rollback
    /// removes the key again in that case.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    pub new_value: Value,
    pub scope: Scope,
    pub timestamp: DateTime<Utc>,
    /// Free-form label naming the writer (an agent name, a workflow step).
    pub source: String,
}

/// Ring of the most recent changes, oldest first. Pushing past capacity
/// drops the oldest entry.
#[derive(Debug)]
pub(crate) struct History {
    changes: VecDeque<StateChange>,
    capacity: usize,
}

impl History {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            changes: VecDeque::new(),
            capacity,
        }
    }

    /// Append a change, returning the entry dropped to make room, if any.
    pub(crate) fn push(&mut self, change: StateChange) -> Option<StateChange> {
        if self.capacity == 0 {
            return Some(change);
        }
        let dropped = if self.changes.len() >= self.capacity {
            self.changes.pop_front()
        } else {
            None
        };
        self.changes.push_back(change);
        dropped
    }

    pub(crate) fn pop_newest(&mut self) -> Option<StateChange> {
        self.changes.pop_back()
    }

    pub(crate) fn len(&self) -> usize {
        self.changes.len()
    }

    pub(crate) fn clear(&mut self) {
        self.changes.clear();
    }

    pub(crate) fn iter(&self) -> impl DoubleEndedIterator<Item = &StateChange> {
        self.changes.iter()
    }
}
