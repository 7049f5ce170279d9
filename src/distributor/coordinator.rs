//! Distributor run loop
//!
//! The distributor is responsible for:
//! - Chunking the record store in key order
//! - Handing each idle worker one package at a time
//! - Retiring workers that fail fatally or never start
//! - Draining outstanding statuses, then shutting the pool down
//! - Reporting everything to the logsheet and the job summary

use crate::distributor::{DistributorState, JobProgress, JobStatus, JobSummary, WorkerPool, WorkerSlot};
use crate::error::{JoggerError, PackageStatus, Result, TransportError, WorkerError};
use crate::interconnect::{Envelope, Interconnect, Message, Rank};
use crate::logsheet::{append_or_warn, Severity, SharedLogsheet};
use crate::package::{Chunker, WorkPackage, DEFAULT_MAX_PACKAGE_BYTES};
use crate::store::SharedRecordStore;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Logsheet source of every distributor entry
const SOURCE: &str = "distributor";

/// Receive timeout; bounds how late the interrupt flag is noticed
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Callback invoked after every package status
pub type ProgressHook = Box<dyn FnMut(&JobProgress) + Send>;

/// Dispatch settings of one job
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Records per package
    pub chunk_size: u32,

    /// Number of workers (ranks 1..=workers); a distributor sizes its
    /// pool from the interconnect and overrides a mismatch
    pub workers: usize,

    /// Ship values with keys
    pub include_values: bool,

    /// Largest encoded package
    pub max_package_bytes: u64,
}

impl DispatchConfig {
    /// Settings with values shipped and the default package limit
    pub fn new(chunk_size: u32, workers: usize) -> Self {
        Self {
            chunk_size,
            workers,
            include_values: true,
            max_package_bytes: DEFAULT_MAX_PACKAGE_BYTES,
        }
    }
}

/// Coordinates one job over an interconnect
pub struct Distributor<I> {
    job_id: Uuid,
    config: DispatchConfig,
    interconnect: I,
    store: SharedRecordStore,
    logsheet: SharedLogsheet,
    pool: WorkerPool,
    state: DistributorState,
    shutdown: Arc<AtomicBool>,
    progress: Option<ProgressHook>,
    summary: JobSummary,
}

impl<I: Interconnect> Distributor<I> {
    /// Create a distributor for workers that are already spawned
    ///
    /// The pool holds one slot per interconnect peer.
    pub fn new(
        interconnect: I,
        store: SharedRecordStore,
        mut config: DispatchConfig,
        logsheet: SharedLogsheet,
    ) -> Self {
        let peers = interconnect.peer_count();
        if config.workers != peers {
            warn!(
                configured = config.workers,
                peers = peers,
                "Worker count differs from interconnect peers, using peers"
            );
            config.workers = peers;
        }

        let job_id = Uuid::new_v4();
        Self {
            job_id,
            pool: WorkerPool::new(config.workers),
            summary: JobSummary::new(job_id, config.workers),
            config,
            interconnect,
            store,
            logsheet,
            state: DistributorState::Idle,
            shutdown: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Install a progress callback
    pub fn on_progress(mut self, hook: ProgressHook) -> Self {
        self.progress = Some(hook);
        self
    }

    /// Share an existing interrupt flag
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    /// Job identifier
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Current state
    pub fn state(&self) -> DistributorState {
        self.state
    }

    /// Get a clone of the interrupt flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the job to completion
    ///
    /// Returns `Err` only when the interconnect fails; every other failure
    /// is reported through [`JobSummary::status`].
    pub fn run(mut self) -> Result<JobSummary> {
        let start = Instant::now();

        info!(
            job = %self.job_id,
            store = %self.store.description(),
            chunk_size = self.config.chunk_size,
            workers = self.config.workers,
            "Starting job"
        );
        self.log(
            Severity::Info,
            &format!(
                "job {} started: store {}, chunk size {}, {} workers",
                self.job_id,
                self.store.description(),
                self.config.chunk_size,
                self.config.workers
            ),
        );

        self.set_state(DistributorState::Chunking);
        let mut ended: Option<JobStatus> = None;

        let store = Arc::clone(&self.store);
        let mut chunker = match Chunker::new(store.as_ref(), self.config.chunk_size) {
            Ok(chunker) => Some(
                chunker
                    .include_values(self.config.include_values)
                    .max_package_bytes(self.config.max_package_bytes),
            ),
            Err(e) => {
                ended = Some(self.fail(format!("chunking failed: {}", e)));
                None
            }
        };
        self.summary.total_chunks = chunker.as_ref().map_or(0, Chunker::chunk_count);
        debug!(chunks = self.summary.total_chunks, "Chunk count established");

        self.set_state(DistributorState::Dispatching);
        let mut pending: Option<WorkPackage> = None;

        loop {
            if ended.is_none() && self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown signal received");
                self.log(Severity::Warning, "interrupted; no further chunks dispatched");
                ended = Some(JobStatus::Interrupted);
            }

            if ended.is_none() {
                if let Some(chunker) = chunker.as_mut() {
                    match self.dispatch(chunker, &mut pending) {
                        Ok(()) => {}
                        Err(e @ JoggerError::Transport(_)) => return Err(e),
                        Err(e) => ended = Some(self.fail(format!("chunking failed: {}", e))),
                    }
                }
            }

            let exhausted = pending.is_none() && chunker.as_ref().map_or(true, Chunker::is_exhausted);

            if ended.is_none() && !exhausted && self.pool.live() == 0 {
                let reason = format!(
                    "all {} workers retired with {} of {} chunks undispatched",
                    self.pool.size(),
                    self.summary.undispatched_chunks(),
                    self.summary.total_chunks
                );
                ended = Some(self.fail(reason));
            }

            if (exhausted || ended.is_some()) && self.state == DistributorState::Dispatching {
                self.set_state(DistributorState::Draining);
            }

            if self.state == DistributorState::Draining && !self.pool.has_outstanding() {
                break;
            }

            if let Some(envelope) = self.interconnect.receive_timeout(POLL_INTERVAL)? {
                self.handle(envelope);
            }
        }

        self.shut_down_workers()?;

        self.set_state(DistributorState::Terminated);
        self.summary.state = self.state;
        self.summary.status = ended.unwrap_or(JobStatus::Completed);
        self.summary.duration = start.elapsed();

        info!(
            job = %self.job_id,
            status = %self.summary.status,
            completed = self.summary.completed_chunks,
            recoverable = self.summary.recoverable_chunks,
            lost = self.summary.lost_chunks.len(),
            total = self.summary.total_chunks,
            duration_secs = self.summary.duration.as_secs(),
            "Job finished"
        );
        self.log(
            Severity::Info,
            &format!(
                "job {} {}: {} of {} chunks completed, {} failed, {} lost",
                self.job_id,
                self.summary.status,
                self.summary.completed_chunks,
                self.summary.total_chunks,
                self.summary.recoverable_chunks,
                self.summary.lost_chunks.len()
            ),
        );

        Ok(self.summary)
    }

    /// Hand packages to idle workers until either runs out
    fn dispatch(&mut self, chunker: &mut Chunker<'_>, pending: &mut Option<WorkPackage>) -> Result<()> {
        loop {
            let package = match pending.take() {
                Some(package) => package,
                None => match chunker.next_package()? {
                    Some(package) => package,
                    None => return Ok(()),
                },
            };

            let Some(rank) = self.pool.next_idle() else {
                *pending = Some(package);
                return Ok(());
            };

            let chunk = package.chunk_index();
            let records = package.len() as u64;
            let bytes = package.value_bytes();
            let message = Message::Package(package);

            match self.interconnect.send(rank, &message) {
                Ok(()) => {}
                Err(TransportError::Disconnected { .. }) => {
                    self.retire_lost(rank, "disconnected");
                    if let Message::Package(package) = message {
                        *pending = Some(package);
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            self.pool.mark_busy(rank, chunk);
            self.summary.dispatched_chunks += 1;
            self.summary.records += records;
            self.summary.bytes += bytes;

            trace!(worker = rank, chunk = chunk, records = records, "Package dispatched");
        }
    }

    /// Apply one message from a worker
    fn handle(&mut self, envelope: Envelope) {
        let rank = envelope.from;
        match envelope.message {
            Message::Ready => {
                if self.pool.mark_ready(rank) {
                    debug!(worker = rank, "Worker ready");
                } else {
                    self.unexpected(rank, "Ready");
                }
            }
            Message::InitFailed(reason) => {
                if self.pool.slot(rank) != Some(&WorkerSlot::Starting) {
                    self.unexpected(rank, "InitFailed");
                    return;
                }
                self.pool.retire(rank, reason.clone());
                self.summary.workers_failed_init += 1;

                warn!(worker = rank, error = %reason, "Worker failed to initialize");
                self.log(
                    Severity::Error,
                    &format!("worker-{} failed to initialize: {}", rank, reason),
                );
            }
            Message::Status {
                chunk_index,
                status,
            } => self.handle_status(rank, chunk_index, status),
            other => self.unexpected(rank, other.kind()),
        }
    }

    fn handle_status(&mut self, rank: Rank, chunk: u64, status: PackageStatus) {
        let slot = self.pool.slot(rank).cloned();
        if slot != Some(WorkerSlot::Busy(chunk)) {
            warn!(worker = rank, chunk = chunk, slot = ?slot, "Status for a chunk the worker did not hold");
            self.log(
                Severity::Warning,
                &format!("worker-{} reported chunk {} while in state {:?}; ignored", rank, chunk, slot),
            );
            // A worker stops after any fatal status
            if let PackageStatus::FatalError(msg) = status {
                if slot.as_ref().is_some_and(WorkerSlot::is_live) {
                    self.retire_lost(rank, &msg);
                    self.report_progress();
                }
            }
            return;
        }

        match &status {
            PackageStatus::FatalError(msg) => self.pool.retire(rank, msg.clone()),
            _ => self.pool.complete(rank),
        };

        match status {
            PackageStatus::Completed => {
                self.summary.completed_chunks += 1;
                trace!(worker = rank, chunk = chunk, "Chunk completed");
            }
            PackageStatus::RecoverableError(msg) => {
                self.summary.recoverable_chunks += 1;
                warn!(worker = rank, chunk = chunk, error = %msg, "Chunk failed");
                self.log(
                    Severity::Error,
                    &format!("chunk {} failed on worker-{}: {}", chunk, rank, msg),
                );
            }
            PackageStatus::FatalError(msg) => {
                self.summary.lost_chunks.push(chunk);
                self.summary.workers_retired += 1;
                error!(
                    worker = rank,
                    chunk = chunk,
                    live = self.pool.live(),
                    error = %msg,
                    "Worker retired after fatal error"
                );
                self.log(
                    Severity::Error,
                    &format!(
                        "worker-{} retired after fatal error on chunk {} (chunk lost): {}",
                        rank, chunk, msg
                    ),
                );
            }
        }

        self.report_progress();
    }

    /// Retire a worker that is gone; a chunk it held is lost
    fn retire_lost(&mut self, rank: Rank, reason: &str) {
        let in_flight = self.pool.retire(rank, reason);
        self.summary.workers_retired += 1;
        if let Some(chunk) = in_flight {
            self.summary.lost_chunks.push(chunk);
        }
        error!(worker = rank, reason = reason, lost = ?in_flight, "Worker retired");
        self.log(Severity::Error, &format!("worker-{} retired: {}", rank, reason));
    }

    /// Broadcast `Shutdown` and wait for every live worker to acknowledge
    fn shut_down_workers(&mut self) -> Result<()> {
        let mut awaiting: BTreeSet<Rank> = self.pool.live_ranks().into_iter().collect();
        let reached = self.interconnect.broadcast(&Message::Shutdown)?;
        debug!(reached = reached, awaiting = awaiting.len(), "Shutdown broadcast");

        while !awaiting.is_empty() {
            match self.interconnect.receive_timeout(POLL_INTERVAL) {
                Ok(Some(Envelope {
                    from,
                    message: Message::ShutdownComplete { error },
                })) => {
                    if !awaiting.remove(&from) {
                        self.unexpected(from, "ShutdownComplete");
                        continue;
                    }
                    if let Some(reason) = error {
                        self.log(
                            Severity::Error,
                            &format!("worker-{} shutdown failed: {}", from, reason),
                        );
                    }
                    trace!(worker = from, "Worker shut down");
                }
                Ok(Some(envelope)) => self.unexpected(envelope.from, envelope.message.kind()),
                Ok(None) => {}
                Err(TransportError::AllDisconnected) => {
                    warn!(missing = ?awaiting, "Workers left without acknowledging shutdown");
                    self.log(
                        Severity::Warning,
                        &format!("{} workers left without acknowledging shutdown", awaiting.len()),
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    fn report_progress(&mut self) {
        let snapshot = JobProgress {
            total_chunks: self.summary.total_chunks,
            finished_chunks: self.summary.completed_chunks
                + self.summary.recoverable_chunks
                + self.summary.lost_chunks.len() as u64,
            lost_chunks: self.summary.lost_chunks.len() as u64,
            live_workers: self.pool.live(),
        };
        if let Some(hook) = self.progress.as_mut() {
            hook(&snapshot);
        }
    }

    fn unexpected(&self, rank: Rank, kind: &str) {
        let err = WorkerError::UnexpectedMessage {
            rank,
            message: kind.to_string(),
        };
        warn!(state = %self.state, "{}", err);
        self.log(Severity::Warning, &err.to_string());
    }

    fn fail(&self, reason: String) -> JobStatus {
        error!(job = %self.job_id, reason = %reason, "Job failed");
        self.log(Severity::Error, &reason);
        JobStatus::Failed(reason)
    }

    fn set_state(&mut self, state: DistributorState) {
        debug!(from = %self.state, to = %state, "Distributor state");
        self.state = state;
    }

    fn log(&self, severity: Severity, message: &str) {
        append_or_warn(self.logsheet.as_ref(), severity, message, SOURCE);
    }
}
