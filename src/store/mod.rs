//! Record store access
//!
//! The framework consumes a record store through a narrow, read-only
//! contract: enumerate keys in the store's native order and fetch a value
//! by key. Stores are never mutated during a job.
//!
//! # Backends
//!
//! - `directory`: one file per record, key = file name (sorted by name)
//! - `memory`: insertion-ordered records held in memory
//! - `rocks`: RocksDB opened read-only (feature `rocksdb`)

pub mod directory;
pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use directory::DirectoryRecordStore;
pub use memory::MemoryRecordStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksRecordStore;

use crate::error::{StoreError, StoreResult};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Lazy, finite sequence of keys in store order
pub type KeyIter<'a> = Box<dyn Iterator<Item = StoreResult<String>> + 'a>;

/// Read-only view of a key-value record store
pub trait RecordStore: Send + Sync {
    /// Short description used in logs
    fn description(&self) -> String;

    /// Enumerate keys in the store's native order
    ///
    /// Every call starts a fresh pass; the order is the same on every pass.
    fn keys(&self) -> KeyIter<'_>;

    /// Fetch the value stored under `key`
    fn get(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Number of records
    fn count(&self) -> StoreResult<u64> {
        let mut count = 0u64;
        for key in self.keys() {
            key?;
            count += 1;
        }
        Ok(count)
    }

    /// Length in bytes of the longest key (0 for an empty store)
    fn max_key_len(&self) -> StoreResult<u32> {
        let mut max = 0usize;
        for key in self.keys() {
            max = max.max(key?.len());
        }
        u32::try_from(max).map_err(|_| StoreError::InvalidKey(format!("key length {} exceeds u32", max)))
    }
}

/// Shared handle to an opened store
pub type SharedRecordStore = Arc<dyn RecordStore>;

/// Open the store at `path` read-only, picking the backend from its layout
///
/// A directory holding a RocksDB `CURRENT` file opens as RocksDB when the
/// `rocksdb` feature is enabled; any other directory opens as a directory
/// store.
pub fn open_read_only<P: AsRef<Path>>(path: P) -> StoreResult<SharedRecordStore> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(StoreError::NotFound {
            path: path.to_path_buf(),
        });
    }

    #[cfg(feature = "rocksdb")]
    if path.join("CURRENT").is_file() {
        debug!(path = %path.display(), "Opening RocksDB record store");
        return Ok(Arc::new(RocksRecordStore::open(path)?));
    }

    debug!(path = %path.display(), "Opening directory record store");
    Ok(Arc::new(DirectoryRecordStore::open(path)?))
}
