//! Worker role: runs a processor against packages sent by the coordinator
//!
//! Each worker:
//! - Owns its own clone of the processor factory
//! - Initializes it and builds one processor, then reports `Ready`
//! - Processes one package at a time and reports its status
//! - Runs `perform_shutdown` on `Shutdown`, after a fatal error, or when
//!   the coordinator goes away
//!
//! Panics inside processor code are caught and reported as fatal, so the
//! coordinator always hears back from a worker it is waiting on.

use crate::error::{PackageStatus, TransportError, WorkerError};
use crate::interconnect::{Interconnect, Message, Rank, COORDINATOR};
use crate::logsheet::{append_or_warn, Severity, ScopedLogsheet, SharedLogsheet};
use crate::processor::{ProcessorFactory, WorkPackageProcessor};
use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// How long a worker blocks on its inbox before polling again
const RECEIVE_POLL: Duration = Duration::from_millis(500);

/// Why a worker stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Initialization or construction failed
    InitFailed(String),
    /// Coordinator sent `Shutdown`
    Shutdown,
    /// A package failed fatally
    Retired(String),
    /// The coordinator endpoint went away
    CoordinatorLost,
}

/// What a worker did during the job
#[derive(Debug, Clone)]
pub struct WorkerReport {
    /// Worker rank
    pub rank: Rank,
    /// Packages processed, whatever their status
    pub packages: u64,
    /// Records in those packages
    pub records: u64,
    /// Whether `perform_shutdown` ran
    pub shutdown_performed: bool,
    /// Error returned by `perform_shutdown`, if any
    pub shutdown_error: Option<String>,
    /// Why the worker stopped
    pub exit: WorkerExit,
}

impl WorkerReport {
    fn new(rank: Rank) -> Self {
        Self {
            rank,
            packages: 0,
            records: 0,
            shutdown_performed: false,
            shutdown_error: None,
            exit: WorkerExit::CoordinatorLost,
        }
    }
}

/// Worker loop bound to one interconnect endpoint
pub struct Receiver<F, I> {
    factory: F,
    interconnect: I,
    logsheet: SharedLogsheet,
}

impl<F, I> Receiver<F, I>
where
    F: ProcessorFactory,
    I: Interconnect,
{
    /// Create a receiver; entries it writes are scoped to `worker-<rank>`
    pub fn new(factory: F, interconnect: I, logsheet: SharedLogsheet) -> Self {
        let scope = format!("worker-{}", interconnect.rank());
        Self {
            factory,
            interconnect,
            logsheet: Arc::new(ScopedLogsheet::new(logsheet, scope)),
        }
    }

    /// Rank of this worker
    pub fn rank(&self) -> Rank {
        self.interconnect.rank()
    }

    /// Run until shutdown, a fatal error, or loss of the coordinator
    pub fn run(self) -> Result<WorkerReport, WorkerError> {
        let Self {
            mut factory,
            interconnect,
            logsheet,
        } = self;
        let rank = interconnect.rank();
        let mut report = WorkerReport::new(rank);
        let transport = |source: TransportError| WorkerError::Transport { rank, source };

        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".into());
        info!(worker = rank, host = %host, "Worker starting");
        append_or_warn(logsheet.as_ref(), Severity::Debug, &format!("started on {}", host), "");

        if let Err(reason) = guarded(|| factory.perform_initialization(&logsheet)) {
            report.exit = init_failed(&interconnect, &logsheet, reason).map_err(transport)?;
            return Ok(report);
        }

        let mut processor = match guarded(|| factory.new_processor(&logsheet)) {
            Ok(processor) => processor,
            Err(reason) => {
                shutdown(&mut factory, &logsheet, &mut report);
                report.exit = init_failed(&interconnect, &logsheet, reason).map_err(transport)?;
                return Ok(report);
            }
        };
        processor.set_logsheet(Arc::clone(&logsheet));

        let served = interconnect
            .send(COORDINATOR, &Message::Ready)
            .and_then(|_| serve(&interconnect, &mut processor, &logsheet, &mut report));

        shutdown(&mut factory, &logsheet, &mut report);
        drop(processor);

        report.exit = served.map_err(transport)?;
        if report.exit == WorkerExit::Shutdown {
            interconnect
                .send(
                    COORDINATOR,
                    &Message::ShutdownComplete {
                        error: report.shutdown_error.clone(),
                    },
                )
                .map_err(transport)?;
        }

        info!(
            worker = rank,
            packages = report.packages,
            records = report.records,
            exit = ?report.exit,
            "Worker stopped"
        );
        Ok(report)
    }
}

/// Process packages until the coordinator ends the job
fn serve<P, I>(
    interconnect: &I,
    processor: &mut P,
    logsheet: &SharedLogsheet,
    report: &mut WorkerReport,
) -> Result<WorkerExit, TransportError>
where
    P: WorkPackageProcessor,
    I: Interconnect,
{
    loop {
        let envelope = match interconnect.receive_timeout(RECEIVE_POLL) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(TransportError::AllDisconnected) => {
                warn!(worker = report.rank, "Coordinator disconnected");
                return Ok(WorkerExit::CoordinatorLost);
            }
            Err(e) => return Err(e),
        };

        match envelope.message {
            Message::Package(package) => {
                let chunk = package.chunk_index();
                let status = match panic::catch_unwind(AssertUnwindSafe(|| {
                    processor.process_work_package(&package)
                })) {
                    Ok(result) => PackageStatus::from(result),
                    Err(payload) => {
                        PackageStatus::FatalError(format!("panicked: {}", panic_message(&payload)))
                    }
                };

                report.packages += 1;
                report.records += package.len() as u64;

                match &status {
                    PackageStatus::Completed => {
                        trace!(worker = report.rank, chunk = chunk, "Package completed");
                    }
                    PackageStatus::RecoverableError(msg) => {
                        warn!(worker = report.rank, chunk = chunk, error = %msg, "Package failed");
                        append_or_warn(
                            logsheet.as_ref(),
                            Severity::Error,
                            &format!("chunk {}: {}", chunk, msg),
                            "",
                        );
                    }
                    PackageStatus::FatalError(msg) => {
                        error!(worker = report.rank, chunk = chunk, error = %msg, "Package failed fatally");
                        append_or_warn(
                            logsheet.as_ref(),
                            Severity::Fatal,
                            &format!("chunk {}: {}", chunk, msg),
                            "",
                        );
                    }
                }

                let retired = match &status {
                    PackageStatus::FatalError(msg) => Some(msg.clone()),
                    _ => None,
                };
                interconnect.send(
                    COORDINATOR,
                    &Message::Status {
                        chunk_index: chunk,
                        status,
                    },
                )?;

                if let Some(reason) = retired {
                    return Ok(WorkerExit::Retired(reason));
                }
            }
            Message::Shutdown => {
                debug!(worker = report.rank, "Shutdown received");
                return Ok(WorkerExit::Shutdown);
            }
            other => {
                warn!(
                    worker = report.rank,
                    from = envelope.from,
                    kind = other.kind(),
                    "Ignoring unexpected message"
                );
            }
        }
    }
}

/// Report a failed start to the coordinator
fn init_failed<I: Interconnect>(
    interconnect: &I,
    logsheet: &SharedLogsheet,
    reason: String,
) -> Result<WorkerExit, TransportError> {
    error!(worker = interconnect.rank(), error = %reason, "Worker initialization failed");
    append_or_warn(
        logsheet.as_ref(),
        Severity::Error,
        &format!("initialization failed: {}", reason),
        "",
    );
    interconnect.send(COORDINATOR, &Message::InitFailed(reason.clone()))?;
    Ok(WorkerExit::InitFailed(reason))
}

/// Run the factory's one-time shutdown
fn shutdown<F: ProcessorFactory>(factory: &mut F, logsheet: &SharedLogsheet, report: &mut WorkerReport) {
    report.shutdown_performed = true;
    if let Err(reason) = guarded(|| factory.perform_shutdown()) {
        warn!(worker = report.rank, error = %reason, "Processor shutdown failed");
        append_or_warn(
            logsheet.as_ref(),
            Severity::Error,
            &format!("shutdown failed: {}", reason),
            "",
        );
        report.shutdown_error = Some(reason);
    }
}

/// Call processor code, folding errors and panics into a message
fn guarded<T, E: Display>(f: impl FnOnce() -> Result<T, E>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!("panicked: {}", panic_message(&payload))),
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A worker running on its own thread
pub struct WorkerHandle {
    rank: Rank,
    handle: Option<JoinHandle<Result<WorkerReport, WorkerError>>>,
}

impl WorkerHandle {
    /// Spawn a worker thread serving `interconnect`
    pub fn spawn<F, I>(factory: F, interconnect: I, logsheet: SharedLogsheet) -> Result<Self, WorkerError>
    where
        F: ProcessorFactory,
        I: Interconnect + 'static,
    {
        let rank = interconnect.rank();
        let receiver = Receiver::new(factory, interconnect, logsheet);

        let handle = thread::Builder::new()
            .name(format!("jogger-worker-{}", rank))
            .spawn(move || receiver.run())
            .map_err(|e| WorkerError::SpawnFailed {
                rank,
                reason: e.to_string(),
            })?;

        Ok(Self {
            rank,
            handle: Some(handle),
        })
    }

    /// Worker rank
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<WorkerReport, WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|payload| {
                Err(WorkerError::Panicked {
                    rank: self.rank,
                    message: panic_message(&payload),
                })
            }),
            None => Err(WorkerError::Panicked {
                rank: self.rank,
                message: "worker already joined".into(),
            }),
        }
    }
}
