//! Disk-backed memory that survives process restarts.
//!
//! Layout of a storage directory:
//!
//! ```text
//! .memory/
//!   index.json          {"run/42": "run_42.json", ...}
//!   run_42.json         one DurableEntry per key
//! ```
//!
//! The record write and the index write are separate steps. A crash between
//! them leaves either an orphan record (harmless, overwritten by the next
//! store of that key) or an index entry without a record, which is dropped
//! the next time the key is read.

mod disk;
mod entry;
mod index;
mod store;

pub use entry::DurableEntry;
pub use index::{INDEX_FILE, record_name, sanitize_key};
pub use store::{DurableStore, TaggedValue};
