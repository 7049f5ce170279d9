//! Logsheet sink implementations

use crate::error::LogsheetError;
use crate::logsheet::{LogEntry, Logsheet, Severity, SharedLogsheet};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Logsheet appending one line per entry to a file
pub struct FileLogsheet {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileLogsheet {
    /// Open `path` for appending, creating it if needed
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, LogsheetError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LogsheetError::Io {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Logsheet for FileLogsheet {
    fn append(&self, severity: Severity, message: &str, source: &str) -> Result<(), LogsheetError> {
        let line = LogEntry::new(severity, message, source).to_line();

        // Held across write and flush so the entry lands in one piece
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)
            .and_then(|_| writer.flush())
            .map_err(|e| LogsheetError::Io {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }
}

/// Logsheet view that prefixes every source with a fixed scope
///
/// Workers hand processors a scoped view so entries written by a processor
/// as `summary` land as `worker-3/summary`.
#[derive(Clone)]
pub struct ScopedLogsheet {
    inner: SharedLogsheet,
    scope: String,
}

impl ScopedLogsheet {
    /// Wrap `inner`, prefixing sources with `scope`
    pub fn new(inner: SharedLogsheet, scope: impl Into<String>) -> Self {
        Self {
            inner,
            scope: scope.into(),
        }
    }

    /// The scope prefix
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl Logsheet for ScopedLogsheet {
    fn append(&self, severity: Severity, message: &str, source: &str) -> Result<(), LogsheetError> {
        if source.is_empty() {
            return self.inner.append(severity, message, &self.scope);
        }
        self.inner
            .append(severity, message, &format!("{}/{}", self.scope, source))
    }
}

/// Logsheet keeping entries in memory
#[derive(Default)]
pub struct MemoryLogsheet {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogsheet {
    /// Create an empty logsheet
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries in append order
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if nothing has been appended
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entries with exactly this severity
    pub fn with_severity(&self, severity: Severity) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.severity == severity)
            .cloned()
            .collect()
    }

    /// Entries from this source
    pub fn from_source(&self, source: &str) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.source == source)
            .cloned()
            .collect()
    }
}

impl Logsheet for MemoryLogsheet {
    fn append(&self, severity: Severity, message: &str, source: &str) -> Result<(), LogsheetError> {
        self.entries.lock().push(LogEntry::new(severity, message, source));
        Ok(())
    }
}

/// Logsheet forwarding entries to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogsheet;

impl Logsheet for TracingLogsheet {
    fn append(&self, severity: Severity, message: &str, source: &str) -> Result<(), LogsheetError> {
        match severity {
            Severity::Debug => tracing::debug!(source = source, "{}", message),
            Severity::Info => tracing::info!(source = source, "{}", message),
            Severity::Warning => tracing::warn!(source = source, "{}", message),
            Severity::Error | Severity::Fatal => {
                tracing::error!(source = source, severity = %severity, "{}", message)
            }
        }
        Ok(())
    }
}
