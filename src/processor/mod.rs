//! Work package processor contract
//!
//! An application plugs its logic into the framework by implementing two
//! capabilities, usually on one type:
//!
//! - [`ProcessorFactory`] (factory personality): one-time initialization,
//!   construction of the worker-local processor, one-time shutdown. Every
//!   worker owns its own clone of the factory.
//! - [`WorkPackageProcessor`] (worker personality): processes one package
//!   at a time and reports through the shared logsheet.
//!
//! Per worker the framework calls, in order:
//!
//! ```text
//! perform_initialization ─▶ new_processor ─▶ set_logsheet
//!        ─▶ process_work_package × N ─▶ perform_shutdown
//! ```
//!
//! `perform_shutdown` runs exactly once for every worker whose
//! `perform_initialization` succeeded, including workers whose processor
//! could not be built, workers that never received a package, and workers
//! retired by a fatal error.

mod summary;

pub use summary::RecordSummaryProcessor;

use crate::error::{ProcessError, ProcessorError};
use crate::logsheet::SharedLogsheet;
use crate::package::WorkPackage;

/// Worker personality: processes work packages
pub trait WorkPackageProcessor: Send {
    /// Process the records of one package
    ///
    /// `ProcessError::Fatal` means this worker can no longer be trusted;
    /// it receives no further packages. A panic is treated as fatal.
    fn process_work_package(&mut self, package: &WorkPackage) -> Result<(), ProcessError>;

    /// Set the logsheet used for this processor's entries
    fn set_logsheet(&mut self, logsheet: SharedLogsheet);

    /// The logsheet currently in use
    fn logsheet(&self) -> Option<SharedLogsheet>;
}

/// Factory personality: builds and tears down worker-local processors
pub trait ProcessorFactory: Clone + Send + 'static {
    /// Processor type handed to the worker loop
    type Processor: WorkPackageProcessor;

    /// One-time setup before any processor is built on this worker
    fn perform_initialization(&mut self, logsheet: &SharedLogsheet) -> Result<(), ProcessorError>;

    /// Build the worker-local processor
    fn new_processor(&self, logsheet: &SharedLogsheet) -> Result<Self::Processor, ProcessorError>;

    /// One-time teardown after the last package on this worker
    fn perform_shutdown(&mut self) -> Result<(), ProcessorError> {
        Ok(())
    }
}
