//! Partitioning of a record store into work packages
//!
//! The chunker walks the store in its native key order and seals a package
//! every `chunk_size` records. It counts the keys up front so the chunk
//! count is final on every package, then fetches values lazily one chunk at
//! a time so dispatch can start before the walk is finished.

use crate::error::{ConfigError, PackageError, Result, StoreError};
use crate::package::types::{Record, WorkPackage, DEFAULT_MAX_PACKAGE_BYTES};
use crate::store::{KeyIter, RecordStore};
use tracing::{debug, trace};

/// Number of chunks needed for `records` records
pub fn chunk_count_for(records: u64, chunk_size: u32) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    records.div_ceil(chunk_size as u64)
}

/// Produces the work packages of one job
pub struct Chunker<'a> {
    store: &'a dyn RecordStore,
    keys: KeyIter<'a>,
    chunk_size: usize,
    record_count: u64,
    chunk_count: u64,
    next_index: u64,
    include_values: bool,
    max_package_bytes: u64,
}

impl<'a> Chunker<'a> {
    /// Create a chunker over `store`
    ///
    /// Performs one key-only pass to count the records.
    pub fn new(store: &'a dyn RecordStore, chunk_size: u32) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                property: "Chunk Size".into(),
                value: "0".into(),
                reason: "must be greater than zero".into(),
            }
            .into());
        }

        let record_count = store.count()?;
        let chunk_count = chunk_count_for(record_count, chunk_size);

        debug!(
            store = %store.description(),
            records = record_count,
            chunk_size = chunk_size,
            chunks = chunk_count,
            "Chunking record store"
        );

        Ok(Self {
            store,
            keys: store.keys(),
            chunk_size: chunk_size as usize,
            record_count,
            chunk_count,
            next_index: 0,
            include_values: true,
            max_package_bytes: DEFAULT_MAX_PACKAGE_BYTES,
        })
    }

    /// Ship values with keys (default) or keys only
    pub fn include_values(mut self, include: bool) -> Self {
        self.include_values = include;
        self
    }

    /// Set the maximum encoded package size
    pub fn max_package_bytes(mut self, max: u64) -> Self {
        self.max_package_bytes = max;
        self
    }

    /// Total number of chunks this job will produce
    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    /// Total number of records in the store
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Chunks sealed so far
    pub fn chunks_produced(&self) -> u64 {
        self.next_index
    }

    /// Check if every chunk has been produced
    pub fn is_exhausted(&self) -> bool {
        self.next_index >= self.chunk_count
    }

    /// Seal the next chunk, or `None` once the store is exhausted
    pub fn next_package(&mut self) -> Result<Option<WorkPackage>> {
        let remaining = self
            .record_count
            .saturating_sub(self.next_index * self.chunk_size as u64);
        let mut entries = Vec::with_capacity(self.chunk_size.min(remaining as usize));

        while entries.len() < self.chunk_size {
            let Some(key) = self.keys.next() else {
                break;
            };
            let key = key?;
            let value = if self.include_values {
                self.store.get(&key)?
            } else {
                Vec::new()
            };
            entries.push(Record { key, value });
        }

        if entries.is_empty() {
            if self.next_index < self.chunk_count {
                return Err(StoreError::Changed(format!(
                    "store ended after {} of {} chunks",
                    self.next_index, self.chunk_count
                ))
                .into());
            }
            return Ok(None);
        }

        if self.next_index >= self.chunk_count {
            return Err(StoreError::Changed(format!(
                "store holds more than the {} records counted",
                self.record_count
            ))
            .into());
        }

        let is_last = self.next_index + 1 == self.chunk_count;
        if !is_last && entries.len() < self.chunk_size {
            return Err(StoreError::Changed(format!(
                "chunk {} ended early with {} records",
                self.next_index,
                entries.len()
            ))
            .into());
        }

        let package = WorkPackage::with_entries(self.next_index, self.chunk_count, entries)?;
        let size = package.encoded_len()?;
        if size > self.max_package_bytes {
            return Err(PackageError::TooLarge {
                size,
                max: self.max_package_bytes,
            }
            .into());
        }

        trace!(
            chunk = package.chunk_index(),
            records = package.len(),
            bytes = size,
            "Chunk sealed"
        );

        self.next_index += 1;
        Ok(Some(package))
    }
}

impl Iterator for Chunker<'_> {
    type Item = Result<WorkPackage>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_package().transpose()
    }
}
