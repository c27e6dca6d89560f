//! Disk-backed key/value store with TTL and tags.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::disk;
use super::entry::DurableEntry;
use super::index::RecordIndex;
use crate::clock::{self, Clock};
use crate::config::DurableStoreConfig;
use crate::error::{MemoryError, Result};

/// A `{key, value}` pair returned by [`DurableStore::search_by_tag`].
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TaggedValue {
    pub key: String,
    pub value: Value,
}

/// Outcome of looking a key up on disk.
enum Lookup {
    Live(DurableEntry),
    Expired,
    Gone,
}

/// One JSON record per key plus an `index.json` listing the live keys.
///
/// Expiry is lazy: an expired entry stays on disk until it is retrieved or
/// swept by [`cleanup_expired`](Self::cleanup_expired). Index entries whose
/// record has vanished (or no longer parses) are dropped the next time they
/// are touched.
///
/// The store does no locking of its own. Reads take `&mut self` because they
/// may heal the index; wrap the store in a mutex to share it.
///
/// # Example
///
/// ```no_run
/// use cinch_memory::config::DurableStoreConfig;
/// use cinch_memory::durable::DurableStore;
/// use serde_json::json;
/// use std::time::Duration;
///
/// # fn main() -> cinch_memory::Result<()> {
/// let mut store = DurableStore::open(DurableStoreConfig::new(".memory"))?;
/// store.store("run/42", json!({"status": "ok"}), Some(Duration::from_secs(3600)), &["run"]);
/// assert_eq!(store.retrieve("run/42"), Some(json!({"status": "ok"})));
/// # Ok(())
/// # }
/// ```
pub struct DurableStore {
    dir: PathBuf,
    index: RecordIndex,
    default_ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl DurableStore {
    /// Open (creating if needed) the store at `config.storage_dir`.
    pub fn open(config: DurableStoreConfig) -> Result<Self> {
        Self::open_with_clock(config, clock::system())
    }

    /// Like [`open`](Self::open), reading time from `clock` for TTL checks.
    pub fn open_with_clock(config: DurableStoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let dir = config.storage_dir;
        std::fs::create_dir_all(&dir).map_err(|e| MemoryError::io(&dir, e))?;
        let index = RecordIndex::load(&dir)?;
        debug!("Opened memory store at {} ({} keys)", dir.display(), index.len());
        Ok(Self {
            dir,
            index,
            default_ttl: config.default_ttl,
            clock,
        })
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Persist `value` under `key`, replacing any previous record.
    ///
    /// `ttl` falls back to the configured default. Returns `false` (and logs)
    /// if the key collides with another key's record file or a write fails.
    pub fn store(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        ttl: Option<Duration>,
        tags: &[&str],
    ) -> bool {
        let entry = DurableEntry {
            key: key.to_string(),
            value: value.into(),
            created_at: self.clock.now(),
            ttl: ttl.or(self.default_ttl),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        };
        match self.try_store(entry) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, "Failed to store memory entry: {e}");
                false
            }
        }
    }

    /// Serialize `value` and [`store`](Self::store) it.
    pub fn store_as<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        tags: &[&str],
    ) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => self.store(key, value, ttl, tags),
            Err(e) => {
                warn!(key, "Failed to serialize memory entry: {e}");
                false
            }
        }
    }

    fn try_store(&mut self, entry: DurableEntry) -> Result<()> {
        let record = self.index.claim(&entry.key)?;
        disk::write_json_atomic(&self.dir, &record, &entry)?;
        // Record is on disk; a failed index save below leaves it orphaned.
        self.index.insert(&entry.key, record);
        self.index.save(&self.dir)
    }

    /// Remove `key`'s record and index entry. `false` if it was not indexed.
    pub fn delete(&mut self, key: &str) -> bool {
        let Some(record) = self.index.remove(key) else {
            return false;
        };
        if let Err(e) = disk::remove_file(&self.dir.join(&record)) {
            warn!(key, "Failed to remove memory record: {e}");
        }
        self.save_index();
        true
    }

    /// Delete every entry. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let keys = self.list_keys();
        let removed = keys.iter().filter(|key| self.delete(key)).count();
        self.save_index();
        debug!("Cleared {removed} memory entries");
        removed
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Value stored under `key`, or `None` if it is absent, expired, or its
    /// record is missing or unreadable. An expired entry is deleted.
    pub fn retrieve(&mut self, key: &str) -> Option<Value> {
        self.retrieve_entry(key).map(|entry| entry.value)
    }

    /// Like [`retrieve`](Self::retrieve), returning the full record.
    pub fn retrieve_entry(&mut self, key: &str) -> Option<DurableEntry> {
        match self.lookup(key) {
            Lookup::Live(entry) => Some(entry),
            Lookup::Expired => {
                debug!(key, "Memory entry expired");
                self.delete(key);
                None
            }
            Lookup::Gone => None,
        }
    }

    /// [`retrieve`](Self::retrieve) and deserialize into `T`.
    pub fn retrieve_as<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let value = self.retrieve(key)?;
        serde_json::from_value(value)
            .inspect_err(|e| warn!(key, "Memory entry has unexpected shape: {e}"))
            .ok()
    }

    /// Every live entry carrying `tag`, in key order. Expired entries are
    /// skipped but not deleted.
    pub fn search_by_tag(&mut self, tag: &str) -> Vec<TaggedValue> {
        let mut found = Vec::new();
        for key in self.list_keys() {
            if let Lookup::Live(entry) = self.lookup(&key)
                && entry.has_tag(tag)
            {
                found.push(TaggedValue {
                    key,
                    value: entry.value,
                });
            }
        }
        found
    }

    /// Delete every expired entry. Returns how many were removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let mut removed = 0;
        for key in self.list_keys() {
            if matches!(self.lookup(&key), Lookup::Expired) && self.delete(&key) {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Swept {removed} expired memory entries");
        }
        removed
    }

    /// Every indexed key, sorted. May include expired entries not yet swept.
    pub fn list_keys(&self) -> Vec<String> {
        self.index.keys().map(str::to_string).collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.len() == 0
    }

    /// Storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Load `key`'s record and classify it, dropping the index entry if the
    /// record is missing or corrupt.
    fn lookup(&mut self, key: &str) -> Lookup {
        let Some(record) = self.index.get(key) else {
            return Lookup::Gone;
        };
        let path = self.dir.join(record);
        match self.read_record(key, &path) {
            Ok(Some(entry)) if entry.is_expired(self.clock.now()) => Lookup::Expired,
            Ok(Some(entry)) => Lookup::Live(entry),
            Ok(None) => {
                debug!(key, "Memory record missing; dropping index entry");
                self.heal(key);
                Lookup::Gone
            }
            Err(e @ (MemoryError::Json { .. } | MemoryError::RecordMismatch { .. })) => {
                warn!(key, "Corrupt memory record; dropping index entry: {e}");
                self.heal(key);
                Lookup::Gone
            }
            Err(e) => {
                warn!(key, "Failed to read memory record: {e}");
                Lookup::Gone
            }
        }
    }

    fn read_record(&self, key: &str, path: &Path) -> Result<Option<DurableEntry>> {
        let Some(entry) = disk::read_json::<DurableEntry>(path)? else {
            return Ok(None);
        };
        if entry.key != key {
            return Err(MemoryError::RecordMismatch {
                path: path.to_path_buf(),
                expected: key.to_string(),
                found: entry.key,
            });
        }
        Ok(Some(entry))
    }

    /// Drop a stale index entry without touching any file.
    fn heal(&mut self, key: &str) {
        self.index.remove(key);
        self.save_index();
    }

    fn save_index(&self) {
        if let Err(e) = self.index.save(&self.dir) {
            warn!("Failed to save memory index: {e}");
        }
    }
}
