//! Built-in processor that summarizes each work package
//!
//! Writes one logsheet entry per package with its record count, value bytes
//! and key range. It can be told to fail on given chunk indices, which is
//! how failure handling is drilled from the CLI.

use crate::error::{ProcessError, ProcessorError};
use crate::logsheet::{append_or_warn, Severity, SharedLogsheet};
use crate::package::WorkPackage;
use crate::processor::{ProcessorFactory, WorkPackageProcessor};
use humansize::{format_size, BINARY};
use std::collections::HashSet;
use tracing::debug;

/// Logsheet source name of this processor
const SOURCE: &str = "summary";

/// Summarizes packages into the logsheet
#[derive(Clone, Default)]
pub struct RecordSummaryProcessor {
    fatal_chunks: HashSet<u64>,
    recoverable_chunks: HashSet<u64>,
    logsheet: Option<SharedLogsheet>,
    initialized: bool,
    packages: u64,
    records: u64,
    bytes: u64,
}

impl RecordSummaryProcessor {
    /// Create a processor factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail fatally when processing these chunks
    pub fn fail_fatally_on<I: IntoIterator<Item = u64>>(mut self, chunks: I) -> Self {
        self.fatal_chunks.extend(chunks);
        self
    }

    /// Fail recoverably when processing these chunks
    pub fn fail_recoverably_on<I: IntoIterator<Item = u64>>(mut self, chunks: I) -> Self {
        self.recoverable_chunks.extend(chunks);
        self
    }

    /// Packages processed by this instance
    pub fn packages(&self) -> u64 {
        self.packages
    }

    /// Records processed by this instance
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Value bytes processed by this instance
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    fn log(&self, severity: Severity, message: &str) {
        if let Some(logsheet) = &self.logsheet {
            append_or_warn(logsheet.as_ref(), severity, message, SOURCE);
        }
    }
}

impl WorkPackageProcessor for RecordSummaryProcessor {
    fn process_work_package(&mut self, package: &WorkPackage) -> Result<(), ProcessError> {
        let chunk = package.chunk_index();

        if self.fatal_chunks.contains(&chunk) {
            return Err(ProcessError::Fatal(format!(
                "chunk {} of {}: configured to fail fatally",
                chunk,
                package.chunk_count()
            )));
        }
        if self.recoverable_chunks.contains(&chunk) {
            return Err(ProcessError::Recoverable(format!(
                "chunk {} of {}: configured to fail",
                chunk,
                package.chunk_count()
            )));
        }

        let bytes = package.value_bytes();
        self.packages += 1;
        self.records += package.len() as u64;
        self.bytes += bytes;

        let first = package.keys().next().unwrap_or("");
        let last = package.keys().last().unwrap_or("");
        self.log(
            Severity::Info,
            &format!(
                "chunk {} of {}: {} records, {} ({} .. {})",
                chunk,
                package.chunk_count(),
                package.len(),
                format_size(bytes, BINARY),
                first,
                last
            ),
        );

        debug!(chunk = chunk, records = package.len(), "Package summarized");
        Ok(())
    }

    fn set_logsheet(&mut self, logsheet: SharedLogsheet) {
        self.logsheet = Some(logsheet);
    }

    fn logsheet(&self) -> Option<SharedLogsheet> {
        self.logsheet.clone()
    }
}

impl ProcessorFactory for RecordSummaryProcessor {
    type Processor = RecordSummaryProcessor;

    fn perform_initialization(&mut self, logsheet: &SharedLogsheet) -> Result<(), ProcessorError> {
        self.logsheet = Some(logsheet.clone());
        self.initialized = true;
        self.log(Severity::Debug, "initialized");
        Ok(())
    }

    fn new_processor(&self, logsheet: &SharedLogsheet) -> Result<Self::Processor, ProcessorError> {
        if !self.initialized {
            return Err(ProcessorError::Construction(
                "factory used before perform_initialization".into(),
            ));
        }

        Ok(Self {
            fatal_chunks: self.fatal_chunks.clone(),
            recoverable_chunks: self.recoverable_chunks.clone(),
            logsheet: Some(logsheet.clone()),
            initialized: true,
            packages: 0,
            records: 0,
            bytes: 0,
        })
    }

    fn perform_shutdown(&mut self) -> Result<(), ProcessorError> {
        self.log(Severity::Debug, "shut down");
        self.initialized = false;
        Ok(())
    }
}
