use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One persisted record.
///
/// On disk this is a pretty-printed JSON object:
///
/// ```json
/// {
///   "key": "run/42/summary",
///   "value": {"status": "ok"},
///   "created_at": "2026-01-05T09:30:00Z",
///   "ttl": 3600.0,
///   "tags": ["run", "summary"]
/// }
/// ```
///
/// `ttl` is fractional seconds, or `null` for an entry that never expires.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DurableEntry {
    pub key: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::config::opt_secs", default)]
    pub ttl: Option<Duration>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DurableEntry {
    /// Instant after which the entry counts as expired. `None` if it has no
    /// TTL or the deadline is past the representable range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = TimeDelta::from_std(self.ttl?).ok()?;
        self.created_at.checked_add_signed(ttl)
    }

    /// Strictly past the deadline: an entry is still live at exactly
    /// `created_at + ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|deadline| now > deadline)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
