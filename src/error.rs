//! Error types for record-jogger
//!
//! This module defines the error hierarchy for the framework:
//! - Configuration and properties errors
//! - Record store errors
//! - Work package encoding errors
//! - Interconnect (message passing) errors
//! - Processor lifecycle and processing errors
//! - Worker errors
//!
//! Library code returns these thiserror types; the binary wraps them with
//! anyhow context.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for record-jogger
#[derive(Error, Debug)]
pub enum JoggerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Record store errors
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    /// Work package errors
    #[error("Work package error: {0}")]
    Package(#[from] PackageError),

    /// Interconnect errors
    #[error("Interconnect error: {0}")]
    Transport(#[from] TransportError),

    /// Logsheet errors
    #[error("Logsheet error: {0}")]
    Logsheet(#[from] LogsheetError),

    /// Worker errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Configuration and properties errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Properties file could not be read
    #[error("Could not open properties '{path}': {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// Line is not a `Key = Value` pair
    #[error("Malformed property on line {line}: '{content}'")]
    MalformedLine { line: usize, content: String },

    /// One or more required properties are absent
    #[error("Missing required properties: {}", .0.join(", "))]
    MissingRequired(Vec<String>),

    /// Property is present but its value is unusable
    #[error("Invalid value '{value}' for property '{property}': {reason}")]
    InvalidValue {
        property: String,
        value: String,
        reason: String,
    },

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Input record store could not be opened read-only
    #[error("Could not open record store '{path}': {source}")]
    StoreOpen {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}

/// Record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store location does not exist
    #[error("Record store not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Key lookup failed
    #[error("Key not found: '{key}'")]
    KeyNotFound { key: String },

    /// Underlying I/O failure
    #[error("I/O error on '{path}': {reason}")]
    Io { path: PathBuf, reason: String },

    /// Key is not usable (non UTF-8, empty)
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Store contents changed while a job was reading it
    #[error("Record store changed during the job: {0}")]
    Changed(String),

    /// RocksDB operation failed
    #[cfg(feature = "rocksdb")]
    #[error("RocksDB error: {0}")]
    Rocks(#[from] rocksdb::Error),
}

/// Work package errors
#[derive(Error, Debug, Clone)]
pub enum PackageError {
    /// Encoded package exceeds the frame limit
    #[error("Work package exceeds maximum size: {size} bytes > {max} bytes")]
    TooLarge { size: u64, max: u64 },

    /// Serialization failed
    #[error("Failed to encode message: {0}")]
    Encode(String),

    /// Deserialization failed
    #[error("Failed to decode message: {0}")]
    Decode(String),

    /// Chunk index outside the chunk count
    #[error("Chunk index {index} out of range for {count} chunks")]
    InvalidIndex { index: u64, count: u64 },
}

/// Interconnect errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// No endpoint with this rank
    #[error("Unknown rank {0}")]
    UnknownRank(usize),

    /// Peer endpoint has gone away
    #[error("Endpoint {rank} disconnected")]
    Disconnected { rank: usize },

    /// Every peer of this endpoint has gone away
    #[error("All peers disconnected")]
    AllDisconnected,

    /// Frame could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] PackageError),
}

/// Logsheet errors
#[derive(Error, Debug)]
pub enum LogsheetError {
    /// Writing the sink failed
    #[error("Logsheet I/O error on '{path}': {reason}")]
    Io { path: PathBuf, reason: String },

    /// URL scheme is not supported
    #[error("Unsupported logsheet URL '{0}': expected file:// or a path")]
    UnsupportedUrl(String),
}

/// Errors raised by a processor factory
#[derive(Error, Debug, Clone)]
pub enum ProcessorError {
    /// One-time initialization failed
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Processor instance could not be constructed
    #[error("Processor construction failed: {0}")]
    Construction(String),

    /// One-time shutdown failed
    #[error("Shutdown failed: {0}")]
    Shutdown(String),
}

/// Error raised while processing one work package
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// Package failed, worker remains usable
    #[error("{0}")]
    Recoverable(String),

    /// Worker can no longer be trusted and must stop
    #[error("{0}")]
    Fatal(String),
}

impl ProcessError {
    /// Check if the worker may continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProcessError::Recoverable(_))
    }
}

/// Worker errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker thread panicked outside package processing
    #[error("Worker {rank} panicked: {message}")]
    Panicked { rank: usize, message: String },

    /// Worker thread could not be spawned
    #[error("Failed to spawn worker {rank}: {reason}")]
    SpawnFailed { rank: usize, reason: String },

    /// Worker lost its connection to the coordinator
    #[error("Worker {rank} interconnect failed: {source}")]
    Transport {
        rank: usize,
        #[source]
        source: TransportError,
    },

    /// Worker sent a message that is invalid in its current state
    #[error("Unexpected message from worker {rank}: {message}")]
    UnexpectedMessage { rank: usize, message: String },
}

/// Result type alias for JoggerError
pub type Result<T> = std::result::Result<T, JoggerError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for TransportError
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Outcome of processing a single work package, as reported to the
/// distributor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageStatus {
    /// Package processed
    Completed,

    /// Package failed, worker still usable
    RecoverableError(String),

    /// Worker retired
    FatalError(String),
}

impl PackageStatus {
    /// Returns true if this status retires the worker
    pub fn is_fatal(&self) -> bool {
        matches!(self, PackageStatus::FatalError(_))
    }

    /// Returns the error message, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            PackageStatus::Completed => None,
            PackageStatus::RecoverableError(msg) | PackageStatus::FatalError(msg) => Some(msg),
        }
    }
}

impl From<std::result::Result<(), ProcessError>> for PackageStatus {
    fn from(result: std::result::Result<(), ProcessError>) -> Self {
        match result {
            Ok(()) => PackageStatus::Completed,
            Err(ProcessError::Recoverable(msg)) => PackageStatus::RecoverableError(msg),
            Err(ProcessError::Fatal(msg)) => PackageStatus::FatalError(msg),
        }
    }
}
