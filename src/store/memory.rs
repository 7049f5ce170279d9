//! In-memory record store
//!
//! Keeps records in insertion order, which is also its iteration order.

use crate::error::{StoreError, StoreResult};
use crate::store::{KeyIter, RecordStore};
use std::collections::HashMap;

/// Insertion-ordered record store held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Vec<(String, Vec<u8>)>,
    index: HashMap<String, usize>,
}

impl MemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(key, value)` pairs; a repeated key replaces the
    /// earlier value in place
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let mut store = Self::new();
        for (key, value) in records {
            store.insert(key, value);
        }
        store
    }

    /// Insert or replace a record
    pub fn insert(&mut self, key: String, value: Vec<u8>) {
        match self.index.get(&key) {
            Some(&pos) => self.records[pos].1 = value,
            None => {
                self.index.insert(key.clone(), self.records.len());
                self.records.push((key, value));
            }
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn description(&self) -> String {
        format!("memory:{} records", self.records.len())
    }

    fn keys(&self) -> KeyIter<'_> {
        Box::new(self.records.iter().map(|(key, _)| Ok(key.clone())))
    }

    fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.index
            .get(key)
            .map(|&pos| self.records[pos].1.clone())
            .ok_or_else(|| StoreError::KeyNotFound {
                key: key.to_string(),
            })
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_kept() {
        let store = MemoryRecordStore::from_records(vec![
            ("zeta".to_string(), vec![1]),
            ("alpha".to_string(), vec![2]),
            ("zeta".to_string(), vec![3]),
        ]);

        let keys: Vec<String> = store.keys().collect::<Result<_, _>>().unwrap();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert_eq!(store.get("zeta").unwrap(), vec![3]);
        assert!(matches!(store.get("beta"), Err(StoreError::KeyNotFound { .. })));
    }
}
