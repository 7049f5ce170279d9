//! RocksDB record store
//!
//! Opens an existing RocksDB read-only and serves its default column
//! family in key order.

use crate::error::{StoreError, StoreResult};
use crate::store::{KeyIter, RecordStore};
use rocksdb::{IteratorMode, Options, DB};
use std::path::{Path, PathBuf};

/// Read-only record store over a RocksDB database
pub struct RocksRecordStore {
    db: DB,
    path: PathBuf,
}

impl RocksRecordStore {
    /// Open an existing RocksDB read-only
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let opts = Options::default();
        let db = DB::open_for_read_only(&opts, &path, false)?;
        Ok(Self { db, path })
    }
}

impl RecordStore for RocksRecordStore {
    fn description(&self) -> String {
        format!("rocksdb:{}", self.path.display())
    }

    fn keys(&self) -> KeyIter<'_> {
        Box::new(self.db.iterator(IteratorMode::Start).map(|result| {
            let (key, _) = result?;
            String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::InvalidKey(format!("non UTF-8 key: {}", e)))
        }))
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.db
            .get(key.as_bytes())?
            .ok_or_else(|| StoreError::KeyNotFound {
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_rocks_store_reads_in_key_order() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("input.rocks");
        {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            let db = DB::open(&opts, &db_path).unwrap();
            db.put(b"k2", b"two").unwrap();
            db.put(b"k1", b"one").unwrap();
            db.flush().unwrap();
        }

        let store = RocksRecordStore::open(&db_path).unwrap();
        let keys: Vec<String> = store.keys().collect::<Result<_, _>>().unwrap();

        assert_eq!(keys, vec!["k1", "k2"]);
        assert_eq!(store.get("k2").unwrap(), b"two");
        assert!(matches!(store.get("k3"), Err(StoreError::KeyNotFound { .. })));
    }
}
