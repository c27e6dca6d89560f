//! The key → record file index.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::disk;
use crate::error::{MemoryError, Result};

/// File name of the index inside the storage directory.
pub const INDEX_FILE: &str = "index.json";

const RECORD_SUFFIX: &str = ".json";
const RESERVED_STEM: &str = "index";

/// Map a key to a file-name-safe stem.
///
/// Path separators, characters Windows forbids in file names, and control
/// characters become `_`. Distinct keys can share a stem (`a/b` and `a_b`);
/// the store detects that and refuses the second key.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Record file name for `key`.
pub fn record_name(key: &str) -> String {
    format!("{}{RECORD_SUFFIX}", sanitize_key(key))
}

/// Authoritative list of live keys and the record file holding each.
///
/// Record locations are stored relative to the storage directory so the
/// directory can be moved. An absolute location still resolves, since
/// `Path::join` with an absolute path yields that path.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(transparent)]
pub(crate) struct RecordIndex {
    records: BTreeMap<String, String>,
}

impl RecordIndex {
    /// Load `dir/index.json`. A missing file is an empty index; so is a
    /// corrupt one, which is logged and will be overwritten on the next save.
    pub(crate) fn load(dir: &Path) -> Result<Self> {
        match disk::read_json::<Self>(&dir.join(INDEX_FILE)) {
            Ok(Some(index)) => Ok(index),
            Ok(None) => Ok(Self::default()),
            Err(e @ MemoryError::Json { .. }) => {
                warn!("Ignoring unreadable memory index: {e}");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn save(&self, dir: &Path) -> Result<()> {
        disk::write_json_atomic(dir, INDEX_FILE, self)
    }

    /// Record file name `key` should be written to, refusing names owned by
    /// another key or reserved for the index itself.
    pub(crate) fn claim(&self, key: &str) -> Result<String> {
        let stem = sanitize_key(key);
        if stem == RESERVED_STEM {
            return Err(MemoryError::ReservedKey(key.to_string()));
        }
        let record = format!("{stem}{RECORD_SUFFIX}");
        if let Some(existing) = self.other_owner_of(&record, key) {
            return Err(MemoryError::KeyCollision {
                key: key.to_string(),
                existing: existing.to_string(),
                record,
            });
        }
        Ok(record)
    }

    /// Key other than `key` whose location names the file `record`.
    /// Locations are compared by file name, so absolute entries match too.
    fn other_owner_of(&self, record: &str, key: &str) -> Option<&str> {
        self.records
            .iter()
            .filter(|(owner, _)| owner.as_str() != key)
            .find(|(_, location)| {
                Path::new(location.as_str()).file_name() == Some(OsStr::new(record))
            })
            .map(|(owner, _)| owner.as_str())
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(String::as_str)
    }

    pub(crate) fn insert(&mut self, key: &str, record: String) {
        self.records.insert(key.to_string(), record);
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<String> {
        self.records.remove(key)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_key("run/42\\step"), "run_42_step");
        assert_eq!(sanitize_key("a:b*c?d\"e<f>g|h"), "a_b_c_d_e_f_g_h");
        assert_eq!(sanitize_key("tab\there"), "tab_here");
        assert_eq!(sanitize_key("plain-key.v2"), "plain-key.v2");
        assert_eq!(record_name("x/y"), "x_y.json");
    }

    #[test]
    fn claim_detects_collisions() {
        let mut index = RecordIndex::default();
        let record = index.claim("a/b").unwrap();
        index.insert("a/b", record);

        assert_eq!(index.claim("a/b").unwrap(), "a_b.json");
        let err = index.claim("a_b").unwrap_err();
        assert!(matches!(
            err,
            MemoryError::KeyCollision { ref existing, .. } if existing == "a/b"
        ));
    }

    #[test]
    fn claim_matches_absolute_locations_by_file_name() {
        let mut index = RecordIndex::default();
        index.insert("x/y", "/var/lib/agent/.memory/x_y.json".into());

        let err = index.claim("x_y").unwrap_err();
        assert!(matches!(
            err,
            MemoryError::KeyCollision { ref existing, ref record, .. }
                if existing == "x/y" && record == "x_y.json"
        ));
        assert_eq!(index.claim("x/y").unwrap(), "x_y.json");
    }

    #[test]
    fn claim_refuses_index_file_name() {
        let index = RecordIndex::default();
        assert!(matches!(index.claim("index"), Err(MemoryError::ReservedKey(_))));
        assert!(index.claim("index/2").is_ok());
    }

    #[test]
    fn load_tolerates_missing_and_corrupt_files() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(RecordIndex::load(tmp.path()).unwrap().len(), 0);

        std::fs::write(tmp.path().join(INDEX_FILE), "[[[").unwrap();
        assert_eq!(RecordIndex::load(tmp.path()).unwrap().len(), 0);
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let mut index = RecordIndex::default();
        index.insert("k", "k.json".into());
        index.save(tmp.path()).unwrap();

        let raw = std::fs::read_to_string(tmp.path().join(INDEX_FILE)).unwrap();
        assert!(raw.contains("\"k\": \"k.json\""));
        let loaded = RecordIndex::load(tmp.path()).unwrap();
        assert_eq!(loaded.get("k"), Some("k.json"));
    }
}
