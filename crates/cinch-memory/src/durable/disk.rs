//! File helpers shared by the index and record writers.

use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{MemoryError, Result};

/// Serialize `value` to `dir/name` via a temp file and rename, so readers
/// never observe a half-written file.
pub(super) fn write_json_atomic<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp_path = dir.join(format!(".{name}.tmp"));
    let final_path = dir.join(name);
    std::fs::write(&tmp_path, json).map_err(|e| MemoryError::io(&tmp_path, e))?;
    std::fs::rename(&tmp_path, &final_path).map_err(|e| MemoryError::io(&final_path, e))
}

/// Read and parse `path`. `Ok(None)` if the file does not exist.
pub(super) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(MemoryError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| MemoryError::json(path, e))
}

/// Remove `path`, treating an already-missing file as success.
pub(super) fn remove_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MemoryError::io(path, e)),
    }
}
