//! Integration tests for record-jogger
//!
//! These run whole jobs in-process: a distributor on the test thread and
//! worker threads behind the local interconnect.

use parking_lot::Mutex;
use record_jogger::distributor::{DispatchConfig, Distributor, JobStatus};
use record_jogger::error::{ConfigError, JoggerError, ProcessError, ProcessorError, StoreError};
use record_jogger::interconnect::LocalInterconnect;
use record_jogger::job::LocalJob;
use record_jogger::logsheet::{MemoryLogsheet, Severity, SharedLogsheet};
use record_jogger::package::WorkPackage;
use record_jogger::processor::{ProcessorFactory, WorkPackageProcessor};
use record_jogger::receiver::WorkerHandle;
use record_jogger::resources::RecordStoreResources;
use record_jogger::store::{MemoryRecordStore, SharedRecordStore};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// One `process_work_package` call as seen by a processor
#[derive(Debug, Clone)]
struct Seen {
    worker: String,
    chunk_index: u64,
    chunk_count: u64,
    keys: Vec<String>,
}

/// Shared counters observed across all factory clones
#[derive(Default)]
struct Journal {
    seen: Mutex<Vec<Seen>>,
    init_attempts: AtomicUsize,
    initialized: AtomicUsize,
    shutdowns: AtomicUsize,
}

/// Processor that records every call and fails on request
#[derive(Clone)]
struct Recorder {
    journal: Arc<Journal>,
    fatal_chunks: HashSet<u64>,
    failed_inits: usize,
    logsheet: Option<SharedLogsheet>,
}

impl Recorder {
    fn new(journal: &Arc<Journal>) -> Self {
        Self {
            journal: Arc::clone(journal),
            fatal_chunks: HashSet::new(),
            failed_inits: 0,
            logsheet: None,
        }
    }

    fn fatal_on(mut self, chunks: &[u64]) -> Self {
        self.fatal_chunks.extend(chunks);
        self
    }

    /// The first `count` workers to initialize fail
    fn failing_inits(mut self, count: usize) -> Self {
        self.failed_inits = count;
        self
    }
}

impl WorkPackageProcessor for Recorder {
    fn process_work_package(&mut self, package: &WorkPackage) -> Result<(), ProcessError> {
        let worker = std::thread::current().name().unwrap_or("?").to_string();
        self.journal.seen.lock().push(Seen {
            worker,
            chunk_index: package.chunk_index(),
            chunk_count: package.chunk_count(),
            keys: package.keys().map(str::to_string).collect(),
        });

        if self.fatal_chunks.contains(&package.chunk_index()) {
            return Err(ProcessError::Fatal("device lost".into()));
        }
        Ok(())
    }

    fn set_logsheet(&mut self, logsheet: SharedLogsheet) {
        self.logsheet = Some(logsheet);
    }

    fn logsheet(&self) -> Option<SharedLogsheet> {
        self.logsheet.clone()
    }
}

impl ProcessorFactory for Recorder {
    type Processor = Recorder;

    fn perform_initialization(&mut self, _logsheet: &SharedLogsheet) -> Result<(), ProcessorError> {
        let attempt = self.journal.init_attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failed_inits {
            return Err(ProcessorError::Initialization("license server unreachable".into()));
        }
        self.journal.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn new_processor(&self, _logsheet: &SharedLogsheet) -> Result<Self::Processor, ProcessorError> {
        Ok(self.clone())
    }

    fn perform_shutdown(&mut self) -> Result<(), ProcessorError> {
        self.journal.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Run a job over an in-memory store through the public building blocks
fn run_memory_job(
    store: MemoryRecordStore,
    chunk_size: u32,
    workers: usize,
    factory: Recorder,
    sheet: &Arc<MemoryLogsheet>,
) -> record_jogger::JobSummary {
    let (coordinator, endpoints) = LocalInterconnect::star(workers);
    let handles: Vec<WorkerHandle> = endpoints
        .into_iter()
        .map(|endpoint| WorkerHandle::spawn(factory.clone(), endpoint, sheet.clone()).unwrap())
        .collect();

    let store: SharedRecordStore = Arc::new(store);
    let summary = Distributor::new(
        coordinator,
        store,
        DispatchConfig::new(chunk_size, workers),
        sheet.clone(),
    )
    .run()
    .unwrap();

    for handle in handles {
        handle.join().unwrap();
    }
    summary
}

fn numbered_store(n: usize) -> MemoryRecordStore {
    MemoryRecordStore::from_records((1..=n).map(|i| (format!("k{}", i), format!("v{}", i).into_bytes())))
}

/// Write a directory store and a properties file describing it
fn directory_job(records: usize, properties: &str) -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let store = dir.path().join("gallery");
    fs::create_dir(&store).unwrap();
    for i in 0..records {
        fs::write(store.join(format!("print-{:04}", i)), vec![b'x'; 16]).unwrap();
    }
    let path = dir.path().join("job.properties");
    fs::write(&path, properties).unwrap();
    (dir, path)
}

#[test]
fn test_ten_keys_chunk_size_four() {
    let journal = Arc::new(Journal::default());
    let sheet = Arc::new(MemoryLogsheet::new());

    let summary = run_memory_job(numbered_store(10), 4, 1, Recorder::new(&journal), &sheet);

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.total_chunks, 3);

    let mut seen = journal.seen.lock().clone();
    seen.sort_by_key(|s| s.chunk_index);
    let keys: Vec<Vec<String>> = seen.iter().map(|s| s.keys.clone()).collect();
    assert_eq!(
        keys,
        vec![
            vec!["k1", "k2", "k3", "k4"],
            vec!["k5", "k6", "k7", "k8"],
            vec!["k9", "k10"],
        ]
    );
    assert!(seen.iter().all(|s| s.chunk_count == 3));
}

#[test]
fn test_every_key_processed_exactly_once_in_order() {
    for (records, chunk_size, workers) in [(1, 1, 1), (17, 5, 3), (64, 8, 4), (100, 7, 6)] {
        let journal = Arc::new(Journal::default());
        let sheet = Arc::new(MemoryLogsheet::new());

        let summary = run_memory_job(
            numbered_store(records),
            chunk_size,
            workers,
            Recorder::new(&journal),
            &sheet,
        );

        let expected_chunks = records.div_ceil(chunk_size as usize) as u64;
        assert_eq!(summary.total_chunks, expected_chunks);
        assert_eq!(summary.completed_chunks, expected_chunks);

        let mut seen = journal.seen.lock().clone();
        seen.sort_by_key(|s| s.chunk_index);
        let all: Vec<String> = seen.iter().flat_map(|s| s.keys.clone()).collect();
        let expected: Vec<String> = (1..=records).map(|i| format!("k{}", i)).collect();
        assert_eq!(all, expected, "records={} chunk_size={}", records, chunk_size);

        for s in &seen[..seen.len() - 1] {
            assert_eq!(s.keys.len(), chunk_size as usize);
        }
    }
}

#[test]
fn test_empty_store_dispatches_nothing_but_shuts_down() {
    let journal = Arc::new(Journal::default());
    let sheet = Arc::new(MemoryLogsheet::new());

    let summary = run_memory_job(MemoryRecordStore::new(), 4, 3, Recorder::new(&journal), &sheet);

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.total_chunks, 0);
    assert_eq!(summary.dispatched_chunks, 0);
    assert!(journal.seen.lock().is_empty());
    assert_eq!(journal.shutdowns.load(Ordering::SeqCst), 3);
}

#[test]
fn test_fatal_worker_receives_nothing_further() {
    let journal = Arc::new(Journal::default());
    let sheet = Arc::new(MemoryLogsheet::new());

    let summary = run_memory_job(
        numbered_store(40),
        4,
        2,
        Recorder::new(&journal).fatal_on(&[1]),
        &sheet,
    );

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.lost_chunks, vec![1]);
    assert_eq!(summary.workers_retired, 1);
    assert_eq!(summary.completed_chunks, 9);

    let seen = journal.seen.lock().clone();
    let fatal_at = seen.iter().position(|s| s.chunk_index == 1).unwrap();
    let retired = seen[fatal_at].worker.clone();
    assert!(
        seen[fatal_at + 1..].iter().all(|s| s.worker != retired),
        "retired worker {} processed more packages",
        retired
    );

    // every chunk except the lost one was processed once
    let mut chunks: Vec<u64> = seen.iter().map(|s| s.chunk_index).collect();
    chunks.sort_unstable();
    assert_eq!(chunks, (0..10).collect::<Vec<_>>());

    assert!(sheet
        .from_source("distributor")
        .iter()
        .any(|e| e.severity == Severity::Error && e.message.contains("chunk 1")));
    assert_eq!(journal.shutdowns.load(Ordering::SeqCst), 2);
}

#[test]
fn test_all_workers_fatal_fails_job() {
    let journal = Arc::new(Journal::default());
    let sheet = Arc::new(MemoryLogsheet::new());

    let summary = run_memory_job(
        numbered_store(40),
        4,
        2,
        Recorder::new(&journal).fatal_on(&(0..10).collect::<Vec<_>>()),
        &sheet,
    );

    assert!(matches!(summary.status, JobStatus::Failed(_)));
    assert_eq!(summary.workers_retired, 2);
    assert_eq!(summary.lost_chunks.len(), 2);
    assert_eq!(summary.dispatched_chunks, 2);
    assert_eq!(summary.undispatched_chunks(), 8);
    assert_eq!(journal.seen.lock().len(), 2);
}

#[test]
fn test_shutdown_once_per_initialized_worker() {
    let journal = Arc::new(Journal::default());
    let sheet = Arc::new(MemoryLogsheet::new());

    let summary = run_memory_job(
        numbered_store(30),
        3,
        4,
        Recorder::new(&journal).failing_inits(1).fatal_on(&[4]),
        &sheet,
    );

    assert_eq!(summary.workers_failed_init, 1);
    assert_eq!(summary.workers_retired, 1);
    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(journal.initialized.load(Ordering::SeqCst), 3);
    assert_eq!(journal.shutdowns.load(Ordering::SeqCst), 3);
}

#[test]
fn test_every_worker_failing_init_fails_job() {
    let journal = Arc::new(Journal::default());
    let sheet = Arc::new(MemoryLogsheet::new());

    let summary = run_memory_job(
        numbered_store(8),
        2,
        2,
        Recorder::new(&journal).failing_inits(2),
        &sheet,
    );

    assert!(matches!(summary.status, JobStatus::Failed(_)));
    assert_eq!(summary.workers_failed_init, 2);
    assert_eq!(summary.dispatched_chunks, 0);
    assert_eq!(journal.shutdowns.load(Ordering::SeqCst), 0);
    assert_eq!(
        sheet
            .with_severity(Severity::Error)
            .iter()
            .filter(|e| e.message.contains("failed to initialize"))
            .count(),
        2
    );
}

#[test]
fn test_local_job_from_properties() {
    let (dir, path) = directory_job(
        50,
        "# nightly gallery job\n\
         Input Record Store = gallery\n\
         Chunk Size = 8\n\
         Workers Per Node = 3\n\
         Logsheet URL = job.log\n",
    );
    let log_path = dir.path().join("job.log");
    let journal = Arc::new(Journal::default());

    let resources = RecordStoreResources::open(&path).unwrap();
    assert_eq!(resources.max_key_size(), "print-0000".len() as u32);

    assert_eq!(resources.resources().logsheet_path().unwrap(), Some(log_path.clone()));

    // No override: the relative logsheet resolves beside the properties file
    let outcome = LocalJob::new(resources, Recorder::new(&journal)).run().unwrap();

    assert_eq!(outcome.summary.status, JobStatus::Completed);
    assert_eq!(outcome.summary.total_chunks, 7);
    assert_eq!(outcome.summary.records, 50);
    assert_eq!(outcome.summary.bytes, 50 * 16);
    assert_eq!(outcome.workers.len(), 3);

    let log = fs::read_to_string(&log_path).unwrap();
    assert!(log.lines().any(|l| l.contains("[distributor]") && l.contains("started")));
}

#[test]
fn test_configuration_errors() {
    // missing required properties are reported together
    let (_dir, path) = directory_job(1, "Chunk Size = 4\n");
    match RecordStoreResources::open(&path) {
        Err(ConfigError::MissingRequired(names)) => {
            assert_eq!(names, vec!["Input Record Store"])
        }
        other => panic!("unexpected: {:?}", other),
    }

    // chunk size must be positive
    let (_dir, path) = directory_job(
        1,
        "Input Record Store = gallery\nChunk Size = 0\nWorkers Per Node = 1\n",
    );
    assert!(matches!(
        RecordStoreResources::open(&path),
        Err(ConfigError::InvalidValue { .. })
    ));

    // store must exist
    let (_dir, path) = directory_job(
        1,
        "Input Record Store = missing\nChunk Size = 2\nWorkers Per Node = 1\n",
    );
    assert!(matches!(
        RecordStoreResources::open(&path),
        Err(ConfigError::StoreOpen {
            source: StoreError::NotFound { .. },
            ..
        })
    ));

    // malformed line
    let (_dir, path) = directory_job(1, "Input Record Store gallery\n");
    assert!(matches!(
        RecordStoreResources::open(&path),
        Err(ConfigError::MalformedLine { line: 1, .. })
    ));
}

#[test]
fn test_unsupported_logsheet_url_aborts_before_dispatch() {
    let (_dir, path) = directory_job(
        4,
        "Input Record Store = gallery\n\
         Chunk Size = 2\n\
         Workers Per Node = 1\n\
         Logsheet URL = syslog://localhost\n",
    );
    let journal = Arc::new(Journal::default());

    let resources = RecordStoreResources::open(&path).unwrap();
    let result = LocalJob::new(resources, Recorder::new(&journal)).run();

    assert!(matches!(result, Err(JoggerError::Logsheet(_))));
    assert_eq!(journal.init_attempts.load(Ordering::SeqCst), 0);
}
