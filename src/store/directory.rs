//! Directory-backed record store
//!
//! Each regular file in the directory is one record: the file name is the
//! key and the contents are the value. Hidden files (leading `.`) hold
//! store metadata and are not records. Keys are listed once when the store
//! is opened and served in byte order of their names.

use crate::error::{StoreError, StoreResult};
use crate::store::{KeyIter, RecordStore};
use std::path::{Path, PathBuf};

/// Read-only record store over a directory of files
#[derive(Debug)]
pub struct DirectoryRecordStore {
    root: PathBuf,
    keys: Vec<String>,
}

impl DirectoryRecordStore {
    /// Open a directory as a record store
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let root = path.as_ref().to_path_buf();
        let io_err = |e: std::io::Error| StoreError::Io {
            path: root.clone(),
            reason: e.to_string(),
        };

        if !root.is_dir() {
            return Err(StoreError::NotFound { path: root });
        }

        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&root).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !entry.file_type().map_err(io_err)?.is_file() {
                continue;
            }

            let name = entry.file_name().into_string().map_err(|name| {
                StoreError::InvalidKey(format!("non UTF-8 file name {:?}", name))
            })?;
            if name.starts_with('.') {
                continue;
            }
            keys.push(name);
        }
        keys.sort_unstable();

        Ok(Self { root, keys })
    }

    /// Directory holding the records
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RecordStore for DirectoryRecordStore {
    fn description(&self) -> String {
        format!("directory:{}", self.root.display())
    }

    fn keys(&self) -> KeyIter<'_> {
        Box::new(self.keys.iter().cloned().map(Ok))
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(StoreError::InvalidKey(format!("'{}' is not a record name", key)));
        }

        let path = self.root.join(key);
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::KeyNotFound {
                key: key.to_string(),
            },
            _ => StoreError::Io {
                path,
                reason: e.to_string(),
            },
        })
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.keys.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_keys_sorted_and_hidden_skipped() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b"), b"2").unwrap();
        std::fs::write(dir.path().join("a"), b"1").unwrap();
        std::fs::write(dir.path().join(".rscontrol"), b"meta").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let store = DirectoryRecordStore::open(dir.path()).unwrap();
        let keys: Vec<String> = store.keys().collect::<Result<_, _>>().unwrap();

        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_get_missing_key() {
        let dir = tempdir().unwrap();
        let store = DirectoryRecordStore::open(dir.path()).unwrap();

        assert!(matches!(
            store.get("missing"),
            Err(StoreError::KeyNotFound { .. })
        ));
        assert!(matches!(
            store.get("../etc/passwd"),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_open_file_is_not_a_store() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();

        assert!(matches!(
            DirectoryRecordStore::open(&file),
            Err(StoreError::NotFound { .. })
        ));
    }
}
