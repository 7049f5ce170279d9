//! Job resource descriptors
//!
//! A job is described by a properties file. [`Resources`] validates what
//! every job shares (worker count, logsheet); [`RecordStoreResources`] adds
//! the input record store and chunk size. Job types that need more
//! properties pass their names in as extra requirements, and every missing
//! name is reported in one error.
//!
//! Relative paths (the record store, a file logsheet) resolve against the
//! directory holding the properties file.

mod record_store;

pub use record_store::{RecordStoreResources, CHUNK_SIZE, INPUT_RECORD_STORE};

use crate::config::{default_workers, validate_worker_count, Properties};
use crate::error::{ConfigError, LogsheetError};
use crate::logsheet::{logsheet_path, FileLogsheet, SharedLogsheet, TracingLogsheet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Number of workers to run per node (defaults to the CPU count)
pub const WORKERS_PER_NODE: &str = "Workers Per Node";

/// Where logsheet entries go (`file://path` or a path)
pub const LOGSHEET_URL: &str = "Logsheet URL";

/// Validated properties shared by every job type
#[derive(Debug, Clone)]
pub struct Resources {
    path: PathBuf,
    properties: Properties,
    workers_per_node: u32,
    logsheet_url: Option<String>,
}

impl Resources {
    /// Properties every job must define
    ///
    /// Empty at this level: the worker count and logsheet have defaults.
    pub fn required_properties() -> Vec<&'static str> {
        Vec::new()
    }

    /// Load and validate a properties file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::open_with_requirements(path, &[])
    }

    /// Load a properties file that must also define `extra`
    pub fn open_with_requirements<P: AsRef<Path>>(path: P, extra: &[&str]) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let properties = Properties::load(path)?;
        Self::from_properties(path, properties, extra)
    }

    /// Validate already-parsed properties
    ///
    /// `path` is where they came from; relative paths in the properties
    /// resolve against its directory.
    pub fn from_properties(path: &Path, properties: Properties, extra: &[&str]) -> Result<Self, ConfigError> {
        let mut required: Vec<&str> = Self::required_properties();
        for name in extra {
            if !required.contains(name) {
                required.push(*name);
            }
        }

        let missing = properties.missing(&required);
        if !missing.is_empty() {
            return Err(ConfigError::MissingRequired(missing));
        }

        let workers_per_node = if properties.contains(WORKERS_PER_NODE) {
            let count = properties.require_positive(WORKERS_PER_NODE)?;
            validate_worker_count(count as usize)?;
            count
        } else {
            default_workers() as u32
        };

        let logsheet_url = properties
            .get(LOGSHEET_URL)
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        debug!(
            path = %path.display(),
            workers = workers_per_node,
            logsheet = logsheet_url.as_deref().unwrap_or("tracing"),
            "Resources loaded"
        );

        Ok(Self {
            path: path.to_path_buf(),
            properties,
            workers_per_node,
            logsheet_url,
        })
    }

    /// Properties file these resources came from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All parsed properties
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Workers to run per node
    pub fn workers_per_node(&self) -> u32 {
        self.workers_per_node
    }

    /// Configured logsheet URL, if any
    pub fn logsheet_url(&self) -> Option<&str> {
        self.logsheet_url.as_deref()
    }

    /// File the configured logsheet writes to, resolved like every other
    /// path property
    pub fn logsheet_path(&self) -> Result<Option<PathBuf>, LogsheetError> {
        self.logsheet_url()
            .map(|url| logsheet_path(url).map(|path| self.resolve(path)))
            .transpose()
    }

    /// Open the configured logsheet
    pub fn open_logsheet(&self) -> Result<SharedLogsheet, LogsheetError> {
        match self.logsheet_path()? {
            Some(path) => Ok(Arc::new(FileLogsheet::create(path)?)),
            None => Ok(Arc::new(TracingLogsheet)),
        }
    }

    /// Resolve a path property against the properties file's directory
    pub fn resolve<P: AsRef<Path>>(&self, value: P) -> PathBuf {
        let candidate = value.as_ref();
        if candidate.is_absolute() {
            return candidate.to_path_buf();
        }
        match self.path.parent() {
            Some(dir) => dir.join(candidate),
            None => candidate.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_open_base_resources() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("job.properties");
        fs::write(&path, "Workers Per Node = 4\nLogsheet URL = job.log\n").unwrap();

        let resources = Resources::open(&path).unwrap();
        assert_eq!(resources.workers_per_node(), 4);
        assert_eq!(resources.logsheet_url(), Some("job.log"));
        assert_eq!(resources.resolve("data"), dir.path().join("data"));
        assert_eq!(resources.resolve("/abs/data"), PathBuf::from("/abs/data"));
    }

    #[test]
    fn test_missing_requirements_reported_together() {
        let props = Properties::parse("Chunk Size = 3\n").unwrap();
        let err = Resources::from_properties(Path::new("job.properties"), props, &["Gallery", "Reference Set", "Gallery"])
            .unwrap_err();

        match err {
            ConfigError::MissingRequired(names) => {
                assert_eq!(names, vec!["Gallery".to_string(), "Reference Set".to_string()])
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_worker_count_must_be_positive() {
        let props = Properties::parse("Workers Per Node = 0\n").unwrap();
        assert!(matches!(
            Resources::from_properties(Path::new("p"), props, &[]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unreadable_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Resources::open(dir.path().join("absent.properties")),
            Err(ConfigError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_blank_logsheet_url_means_tracing() {
        let props = Properties::parse("Workers Per Node = 2\nLogsheet URL =\n").unwrap();
        let resources = Resources::from_properties(Path::new("p"), props, &[]).unwrap();
        assert_eq!(resources.logsheet_url(), None);
        assert!(resources.open_logsheet().is_ok());
    }

    #[test]
    fn test_workers_per_node_defaults_to_cpus() {
        let props = Properties::parse("Logsheet URL = job.log\n").unwrap();
        let resources = Resources::from_properties(Path::new("p"), props, &[]).unwrap();
        assert_eq!(resources.workers_per_node() as usize, default_workers());
        assert!(resources.workers_per_node() >= 1);
    }

    #[test]
    fn test_relative_logsheet_lands_beside_properties() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("job.properties");

        for (url, file) in [("job.log", "job.log"), ("file://sheets/run.log", "sheets/run.log")] {
            if let Some(parent) = dir.path().join(file).parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, format!("Logsheet URL = {}\n", url)).unwrap();

            let resources = Resources::open(&path).unwrap();
            assert_eq!(resources.logsheet_path().unwrap(), Some(dir.path().join(file)));

            let sheet = resources.open_logsheet().unwrap();
            sheet.append(crate::logsheet::Severity::Info, "placed", "test").unwrap();
            assert!(fs::read_to_string(dir.path().join(file)).unwrap().contains("placed"));
        }
    }
}
