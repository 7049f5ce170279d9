//! Work package types
//!
//! A WorkPackage is the unit of work shipped to a worker: an ordered run of
//! records from the input store plus its position in the job.

use serde::{Deserialize, Serialize};

use crate::error::PackageError;

/// Default upper bound on the encoded size of one work package (1 GiB)
pub const DEFAULT_MAX_PACKAGE_BYTES: u64 = 1 << 30;

/// A single `(key, value)` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Record key
    pub key: String,
    /// Record value (empty when the job ships keys only)
    pub value: Vec<u8>,
}

impl Record {
    /// Create a record
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// One chunk of the input store, in store order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkPackage {
    chunk_index: u64,
    chunk_count: u64,
    entries: Vec<Record>,
}

impl WorkPackage {
    /// Create an empty package for chunk `chunk_index` of `chunk_count`
    pub fn new(chunk_index: u64, chunk_count: u64) -> Result<Self, PackageError> {
        Self::with_entries(chunk_index, chunk_count, Vec::new())
    }

    /// Create a package holding `entries`
    pub fn with_entries(
        chunk_index: u64,
        chunk_count: u64,
        entries: Vec<Record>,
    ) -> Result<Self, PackageError> {
        if chunk_index >= chunk_count {
            return Err(PackageError::InvalidIndex {
                index: chunk_index,
                count: chunk_count,
            });
        }
        Ok(Self {
            chunk_index,
            chunk_count,
            entries,
        })
    }

    /// Zero-based position of this chunk in the job
    pub fn chunk_index(&self) -> u64 {
        self.chunk_index
    }

    /// Total number of chunks in the job
    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    /// Records in store order
    pub fn entries(&self) -> &[Record] {
        &self.entries
    }

    /// Consume the package, returning its records
    pub fn into_entries(self) -> Vec<Record> {
        self.entries
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the package has no records
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a record
    pub fn push(&mut self, record: Record) {
        self.entries.push(record);
    }

    /// Iterate the keys
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|r| r.key.as_str())
    }

    /// Sum of value lengths
    pub fn value_bytes(&self) -> u64 {
        self.entries.iter().map(|r| r.value.len() as u64).sum()
    }

    /// Whether this is the last chunk of the job
    pub fn is_last(&self) -> bool {
        self.chunk_index + 1 == self.chunk_count
    }

    /// Size of the bincode encoding of this package
    pub fn encoded_len(&self) -> Result<u64, PackageError> {
        bincode::serialized_size(self).map_err(|e| PackageError::Encode(e.to_string()))
    }

    /// Check the invariants of a package received off the wire
    pub fn validate(&self) -> Result<(), PackageError> {
        if self.chunk_index >= self.chunk_count {
            return Err(PackageError::InvalidIndex {
                index: self.chunk_index,
                count: self.chunk_count,
            });
        }
        Ok(())
    }
}
