//! Local job runner
//!
//! Runs one job inside this process: the calling thread plays the
//! coordinator, and each worker runs on its own thread with its own clone
//! of the processor factory. The only things workers share are the
//! logsheet and the message channels.

use crate::config::validate_worker_count;
use crate::distributor::{DispatchConfig, Distributor, JobSummary, ProgressHook};
use crate::error::Result;
use crate::interconnect::{LocalInterconnect, FRAME_OVERHEAD};
use crate::logsheet::SharedLogsheet;
use crate::package::DEFAULT_MAX_PACKAGE_BYTES;
use crate::processor::ProcessorFactory;
use crate::receiver::{WorkerHandle, WorkerReport};
use crate::resources::RecordStoreResources;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a local job
#[derive(Debug)]
pub struct JobOutcome {
    /// Coordinator's view of the job
    pub summary: JobSummary,

    /// Per-worker reports, in rank order (workers that could not be
    /// joined are missing)
    pub workers: Vec<WorkerReport>,
}

/// A record store job run by worker threads in this process
pub struct LocalJob<F> {
    resources: RecordStoreResources,
    factory: F,
    workers: usize,
    include_values: bool,
    max_package_bytes: u64,
    logsheet: Option<SharedLogsheet>,
    progress: Option<ProgressHook>,
    shutdown: Arc<AtomicBool>,
}

impl<F: ProcessorFactory> LocalJob<F> {
    /// Create a job using the configured worker count and logsheet
    pub fn new(resources: RecordStoreResources, factory: F) -> Self {
        let workers = resources.workers_per_node() as usize;
        Self {
            resources,
            factory,
            workers,
            include_values: true,
            max_package_bytes: DEFAULT_MAX_PACKAGE_BYTES,
            logsheet: None,
            progress: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the worker count
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Ship keys without values
    pub fn keys_only(mut self, keys_only: bool) -> Self {
        self.include_values = !keys_only;
        self
    }

    /// Set the maximum encoded package size
    pub fn max_package_bytes(mut self, max: u64) -> Self {
        self.max_package_bytes = max;
        self
    }

    /// Use this logsheet instead of the configured one
    pub fn logsheet(mut self, logsheet: SharedLogsheet) -> Self {
        self.logsheet = Some(logsheet);
        self
    }

    /// Install a progress callback
    pub fn on_progress(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    /// Get a clone of the interrupt flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the workers, run the distributor, and join everything
    pub fn run(self) -> Result<JobOutcome> {
        validate_worker_count(self.workers)?;

        let logsheet = match self.logsheet {
            Some(logsheet) => logsheet,
            None => self.resources.open_logsheet()?,
        };

        let (coordinator, endpoints) = LocalInterconnect::star_with_limit(
            self.workers,
            self.max_package_bytes.saturating_add(FRAME_OVERHEAD),
        );

        let mut handles = Vec::with_capacity(self.workers);
        for endpoint in endpoints {
            match WorkerHandle::spawn(self.factory.clone(), endpoint, Arc::clone(&logsheet)) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Spawned workers see the coordinator vanish and stop
                    drop(coordinator);
                    join_all(handles);
                    return Err(e.into());
                }
            }
        }
        info!(count = handles.len(), "Workers spawned");

        let config = DispatchConfig {
            chunk_size: self.resources.chunk_size(),
            workers: self.workers,
            include_values: self.include_values,
            max_package_bytes: self.max_package_bytes,
        };
        let mut distributor = Distributor::new(coordinator, self.resources.record_store(), config, logsheet)
            .with_shutdown_flag(self.shutdown);
        if let Some(hook) = self.progress {
            distributor = distributor.on_progress(hook);
        }

        let summary = distributor.run();
        let workers = join_all(handles);

        Ok(JobOutcome {
            summary: summary?,
            workers,
        })
    }
}

/// Join worker threads, keeping the reports of those that finished cleanly
fn join_all(handles: Vec<WorkerHandle>) -> Vec<WorkerReport> {
    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        let rank = handle.rank();
        match handle.join() {
            Ok(report) => reports.push(report),
            Err(e) => warn!(worker = rank, error = %e, "Worker failed to join cleanly"),
        }
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributor::JobStatus;
    use crate::logsheet::MemoryLogsheet;
    use crate::processor::RecordSummaryProcessor;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn resources(records: usize, chunk_size: u32, workers: u32) -> (TempDir, RecordStoreResources) {
        let dir = tempdir().unwrap();
        let store = dir.path().join("store");
        fs::create_dir(&store).unwrap();
        for i in 0..records {
            fs::write(store.join(format!("rec{:03}", i)), format!("value {}", i)).unwrap();
        }

        let path = dir.path().join("job.properties");
        fs::write(
            &path,
            format!(
                "Input Record Store = store\nChunk Size = {}\nWorkers Per Node = {}\n",
                chunk_size, workers
            ),
        )
        .unwrap();

        let resources = RecordStoreResources::open(&path).unwrap();
        (dir, resources)
    }

    #[test]
    fn test_local_job_processes_every_record() {
        let (_dir, resources) = resources(25, 4, 3);
        let sheet = Arc::new(MemoryLogsheet::new());

        let outcome = LocalJob::new(resources, RecordSummaryProcessor::new())
            .logsheet(sheet.clone())
            .run()
            .unwrap();

        assert_eq!(outcome.summary.status, JobStatus::Completed);
        assert_eq!(outcome.summary.total_chunks, 7);
        assert_eq!(outcome.summary.completed_chunks, 7);
        assert_eq!(outcome.summary.records, 25);

        assert_eq!(outcome.workers.len(), 3);
        assert_eq!(outcome.workers.iter().map(|w| w.records).sum::<u64>(), 25);
        assert!(outcome.workers.iter().all(|w| w.shutdown_performed));
    }

    #[test]
    fn test_worker_override_and_keys_only() {
        let (_dir, resources) = resources(6, 2, 8);

        let outcome = LocalJob::new(resources, RecordSummaryProcessor::new())
            .workers(1)
            .keys_only(true)
            .logsheet(Arc::new(MemoryLogsheet::new()))
            .run()
            .unwrap();

        assert_eq!(outcome.workers.len(), 1);
        assert_eq!(outcome.summary.bytes, 0);
        assert_eq!(outcome.summary.records, 6);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let (_dir, resources) = resources(1, 1, 1);
        assert!(LocalJob::new(resources, RecordSummaryProcessor::new())
            .workers(0)
            .run()
            .is_err());
    }
}
