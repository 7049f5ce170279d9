//! Resources of a job driven by an input record store

use crate::error::{ConfigError, LogsheetError};
use crate::logsheet::SharedLogsheet;
use crate::resources::Resources;
use crate::store::{open_read_only, SharedRecordStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Path of the input record store
pub const INPUT_RECORD_STORE: &str = "Input Record Store";

/// Records per work package
pub const CHUNK_SIZE: &str = "Chunk Size";

/// Validated configuration of a record store job, with the store open
/// read-only
#[derive(Clone)]
pub struct RecordStoreResources {
    resources: Resources,
    store_path: PathBuf,
    store_name: String,
    store_dir: PathBuf,
    chunk_size: u32,
    max_key_size: u32,
    store: SharedRecordStore,
}

impl RecordStoreResources {
    /// Properties a record store job must define
    pub fn required_properties() -> Vec<&'static str> {
        let mut required = Resources::required_properties();
        required.extend([INPUT_RECORD_STORE, CHUNK_SIZE]);
        required
    }

    /// Load a properties file and open its record store
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::open_with_requirements(path, &[])
    }

    /// Load a properties file that must also define `extra`
    pub fn open_with_requirements<P: AsRef<Path>>(path: P, extra: &[&str]) -> Result<Self, ConfigError> {
        let mut required: Vec<&str> = Self::required_properties();
        required.extend_from_slice(extra);

        // All names are checked before any value is parsed
        let resources = Resources::open_with_requirements(path, &required)?;
        Self::open_store(resources)
    }

    /// Open the record store named by validated base resources
    pub fn from_resources(resources: Resources) -> Result<Self, ConfigError> {
        let missing = resources.properties().missing(&Self::required_properties());
        if !missing.is_empty() {
            return Err(ConfigError::MissingRequired(missing));
        }
        Self::open_store(resources)
    }

    /// Parse the store properties and open the store; names are already
    /// known to be present
    fn open_store(resources: Resources) -> Result<Self, ConfigError> {
        let chunk_size = resources.properties().require_positive(CHUNK_SIZE)?;

        let raw_path = resources.properties().require(INPUT_RECORD_STORE)?;
        if raw_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                property: INPUT_RECORD_STORE.into(),
                value: String::new(),
                reason: "path is empty".into(),
            });
        }
        let store_path = resources.resolve(raw_path);

        let store_name = store_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let store_dir = store_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let store = open_read_only(&store_path).map_err(|source| ConfigError::StoreOpen {
            path: store_path.clone(),
            source,
        })?;

        // On failure the store handle is dropped here, before returning
        let max_key_size = store.max_key_len().map_err(|source| ConfigError::StoreOpen {
            path: store_path.clone(),
            source,
        })?;

        info!(
            store = %store.description(),
            chunk_size = chunk_size,
            max_key_size = max_key_size,
            "Record store opened"
        );
        debug!(name = %store_name, dir = %store_dir.display(), "Record store location");

        Ok(Self {
            resources,
            store_path,
            store_name,
            store_dir,
            chunk_size,
            max_key_size,
            store,
        })
    }

    /// Base resources
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    /// Records per package
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Length of the longest key in the store
    pub fn max_key_size(&self) -> u32 {
        self.max_key_size
    }

    /// Shared read-only store handle
    pub fn record_store(&self) -> SharedRecordStore {
        Arc::clone(&self.store)
    }

    /// Full path of the store
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Base name of the store
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Directory holding the store
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Workers to run per node
    pub fn workers_per_node(&self) -> u32 {
        self.resources.workers_per_node()
    }

    /// Open the configured logsheet
    pub fn open_logsheet(&self) -> Result<SharedLogsheet, LogsheetError> {
        self.resources.open_logsheet()
    }
}

impl std::fmt::Debug for RecordStoreResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStoreResources")
            .field("store", &self.store.description())
            .field("chunk_size", &self.chunk_size)
            .field("max_key_size", &self.max_key_size)
            .field("workers_per_node", &self.workers_per_node())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn job(properties: &str) -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let store = dir.path().join("fingerprints");
        fs::create_dir(&store).unwrap();
        fs::write(store.join("alpha"), b"1").unwrap();
        fs::write(store.join("beta-long-key"), b"22").unwrap();

        let path = dir.path().join("job.properties");
        fs::write(&path, properties).unwrap();
        (dir, path)
    }

    #[test]
    fn test_open_record_store_job() {
        let (dir, path) = job(
            "Input Record Store = fingerprints\n\
             Chunk Size = 2\n\
             Workers Per Node = 3\n",
        );

        let resources = RecordStoreResources::open(&path).unwrap();
        assert_eq!(resources.chunk_size(), 2);
        assert_eq!(resources.max_key_size(), "beta-long-key".len() as u32);
        assert_eq!(resources.store_name(), "fingerprints");
        assert_eq!(resources.store_dir(), dir.path());
        assert_eq!(resources.workers_per_node(), 3);
        assert_eq!(resources.record_store().count().unwrap(), 2);
    }

    #[test]
    fn test_all_missing_names_reported() {
        let (_dir, path) = job("Logsheet URL = job.log\n");

        match RecordStoreResources::open_with_requirements(&path, &["Reference Gallery"]) {
            Err(ConfigError::MissingRequired(names)) => assert_eq!(
                names,
                vec![
                    INPUT_RECORD_STORE.to_string(),
                    CHUNK_SIZE.to_string(),
                    "Reference Gallery".to_string(),
                ]
            ),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_chunk_size_must_be_positive() {
        for bad in ["0", "-4", "four"] {
            let (_dir, path) = job(&format!(
                "Input Record Store = fingerprints\nChunk Size = {}\nWorkers Per Node = 1\n",
                bad
            ));
            assert!(
                matches!(
                    RecordStoreResources::open(&path),
                    Err(ConfigError::InvalidValue { .. })
                ),
                "chunk size {}",
                bad
            );
        }
    }

    #[test]
    fn test_missing_store() {
        let (_dir, path) = job(
            "Input Record Store = nowhere\nChunk Size = 2\nWorkers Per Node = 1\n",
        );
        assert!(matches!(
            RecordStoreResources::open(&path),
            Err(ConfigError::StoreOpen {
                source: StoreError::NotFound { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_required_properties_compose() {
        assert_eq!(
            RecordStoreResources::required_properties(),
            vec![INPUT_RECORD_STORE, CHUNK_SIZE]
        );
    }

    #[test]
    fn test_extra_requirements_extend_composed_list() {
        let (_dir, path) = job(
            "Input Record Store = fingerprints
             Chunk Size = 2
             Reference Gallery = refs
",
        );

        let resources = RecordStoreResources::open_with_requirements(&path, &["Reference Gallery"]).unwrap();
        assert_eq!(resources.resources().properties().get("Reference Gallery"), Some("refs"));
        assert_eq!(resources.workers_per_node() as usize, crate::config::default_workers());

        let (_dir, path) = job("Chunk Size = 2
");
        match RecordStoreResources::open_with_requirements(&path, &[CHUNK_SIZE, "Reference Gallery"]) {
            Err(ConfigError::MissingRequired(names)) => {
                assert_eq!(names, vec![INPUT_RECORD_STORE.to_string(), "Reference Gallery".to_string()])
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_from_resources_checks_store_properties() {
        let (_dir, path) = job("Workers Per Node = 2
");
        let base = Resources::open(&path).unwrap();
        match RecordStoreResources::from_resources(base) {
            Err(ConfigError::MissingRequired(names)) => {
                assert_eq!(names, vec![INPUT_RECORD_STORE.to_string(), CHUNK_SIZE.to_string()])
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
