//! Logsheet: the shared status channel of a job
//!
//! Every component of a job (the distributor, each worker, each processor)
//! writes status and error entries to one logsheet. Sinks serialize whole
//! entries, so entries from concurrent workers never interleave.
//!
//! # Sinks
//!
//! - [`FileLogsheet`]: one line per entry appended to a file
//! - [`MemoryLogsheet`]: entries kept in memory (tests, embedding)
//! - [`TracingLogsheet`]: entries forwarded as `tracing` events
//! - [`ScopedLogsheet`]: view prefixing sources with a worker scope

mod sinks;

pub use sinks::{FileLogsheet, MemoryLogsheet, ScopedLogsheet, TracingLogsheet};

use crate::error::LogsheetError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Severity of a logsheet entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Debug => write!(f, "DEBUG"),
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// One logsheet entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was appended
    pub timestamp: DateTime<Utc>,
    /// Entry severity
    pub severity: Severity,
    /// Identifier of the producing entity (e.g. `worker-3`)
    pub source: String,
    /// Free-form message
    pub message: String,
}

impl LogEntry {
    /// Create an entry stamped with the current time
    pub fn new(severity: Severity, message: &str, source: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            source: source.to_string(),
            message: message.to_string(),
        }
    }

    /// Render as a single line (embedded newlines escaped)
    pub fn to_line(&self) -> String {
        format!(
            "{} {} [{}] {}",
            self.timestamp.to_rfc3339(),
            self.severity,
            self.source,
            self.message.replace('\n', "\\n")
        )
    }
}

/// Append-only destination for job status entries
///
/// Implementations must be safe for concurrent callers and must write each
/// entry atomically.
pub trait Logsheet: Send + Sync {
    /// Append one entry
    fn append(&self, severity: Severity, message: &str, source: &str) -> Result<(), LogsheetError>;
}

/// Logsheet shared by reference between the framework and processors
pub type SharedLogsheet = Arc<dyn Logsheet>;

/// Append an entry; a failing sink is reported through tracing and
/// otherwise ignored
pub fn append_or_warn(logsheet: &dyn Logsheet, severity: Severity, message: &str, source: &str) {
    if let Err(e) = logsheet.append(severity, message, source) {
        warn!(error = %e, source = source, "Failed to append logsheet entry");
    }
}

/// Open the logsheet named by a `Logsheet URL` property
///
/// `None` forwards entries to tracing. Accepted URLs are `file://<path>` and
/// plain paths.
pub fn open_logsheet(url: Option<&str>) -> Result<SharedLogsheet, LogsheetError> {
    match url {
        Some(url) => Ok(Arc::new(FileLogsheet::create(logsheet_path(url)?)?)),
        None => Ok(Arc::new(TracingLogsheet)),
    }
}

/// File path named by a logsheet URL, as written (relative paths stay
/// relative)
pub fn logsheet_path(url: &str) -> Result<PathBuf, LogsheetError> {
    let path = match url.split_once("://") {
        Some(("file", path)) => PathBuf::from(path),
        Some(_) => return Err(LogsheetError::UnsupportedUrl(url.to_string())),
        None => PathBuf::from(url),
    };

    if path.as_os_str().is_empty() {
        return Err(LogsheetError::UnsupportedUrl(url.to_string()));
    }
    Ok(path)
}
