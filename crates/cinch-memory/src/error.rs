//! Crate error type.
//!
//! Most public operations swallow failures and return a sentinel (`false`,
//! `None`, an empty collection) so that a long-running agent loop never dies
//! on a memory hiccup. The [`MemoryError`] variants below are what those
//! operations log before returning the sentinel, and what the few fallible
//! entry points (such as [`DurableStore::open`](crate::durable::DurableStore::open))
//! return directly.

use std::path::PathBuf;

/// Errors produced by the memory components.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// A filesystem operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted file exists but does not parse.
    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be converted to or from JSON.
    #[error("value serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Two distinct keys sanitize to the same record file name.
    #[error("key {key:?} maps to record {record:?}, already owned by key {existing:?}")]
    KeyCollision {
        key: String,
        existing: String,
        record: String,
    },

    /// A record file names a different key than the index says it holds.
    #[error("record {} holds key {found:?}, expected {expected:?}", path.display())]
    RecordMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// The key sanitizes to a file name the store reserves for itself.
    #[error("key {0:?} maps to a reserved file name")]
    ReservedKey(String),

    /// A scope name did not match any known scope.
    #[error("unknown scope {0:?} (expected global, workflow, agent, or task)")]
    UnknownScope(String),
}

impl MemoryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Render the payload of a caught panic for logging.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_message_names_both_keys() {
        let err = MemoryError::KeyCollision {
            key: "a/b".into(),
            existing: "a_b".into(),
            record: "a_b.json".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"a/b\""));
        assert!(msg.contains("\"a_b\""));
        assert!(msg.contains("a_b.json"));
    }

    #[test]
    fn io_error_includes_path() {
        let err = MemoryError::io(
            "/tmp/missing.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing.json"));
    }

    #[test]
    fn panic_message_handles_str_and_string() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
