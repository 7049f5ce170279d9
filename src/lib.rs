//! record-jogger - Distributed Record Store Processing
//!
//! Splits a read-only key-value record store into fixed-size work packages
//! and fans them out to a pool of workers, each running an application
//! supplied processor. Designed for batch jobs over large record stores
//! (fingerprint galleries, feature databases) where every record must be
//! visited exactly once.
//!
//! # Features
//!
//! - **Ordered Chunking**: Keys are read in the store's native order and
//!   sealed into packages of `Chunk Size` records; every key lands in
//!   exactly one package.
//!
//! - **Pluggable Processors**: Applications implement a factory personality
//!   (initialize, build, shut down) and a worker personality (process a
//!   package) for their logic.
//!
//! - **Failure Isolation**: A worker that fails fatally (or panics) is
//!   retired and its chunk reported as lost; the rest of the pool keeps
//!   going.
//!
//! - **Shared Logsheet**: Every component reports to one logsheet whose
//!   entries never interleave.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Record Store (read-only)                      │
//! │              directory / memory / RocksDB backends               │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ keys in store order
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Distributor (rank 0)                         │
//! │   Chunker ─▶ idle queue (round-robin) ─▶ one package per worker  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ Interconnect (bincode frames)
//!          ┌────────────────────┼────────────────────┐
//!          ▼                    ▼                    ▼
//! ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐
//! │ Receiver 1      │  │ Receiver 2      │  │ Receiver N      │
//! │  factory clone  │  │  factory clone  │  │  factory clone  │
//! │  processor      │  │  processor      │  │  processor      │
//! └────────┬────────┘  └────────┬────────┘  └────────┬────────┘
//!          └────────────────────┼────────────────────┘
//!                               ▼
//!                    ┌──────────────────┐
//!                    │     Logsheet     │
//!                    └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Validate a job
//! record-jogger check job.properties
//!
//! # Run it with 16 local workers and a progress bar
//! record-jogger run job.properties -w 16 -p
//!
//! # Machine-readable summary
//! record-jogger run job.properties --format json
//! ```

pub mod config;
pub mod distributor;
pub mod error;
pub mod interconnect;
pub mod job;
pub mod logsheet;
pub mod package;
pub mod processor;
pub mod progress;
pub mod receiver;
pub mod resources;
pub mod store;

pub use config::{CliArgs, OutputFormat, Properties};
pub use distributor::{Distributor, DistributorState, JobStatus, JobSummary};
pub use error::{JoggerError, PackageStatus, ProcessError, ProcessorError, Result};
pub use job::{JobOutcome, LocalJob};
pub use logsheet::{Logsheet, Severity, SharedLogsheet};
pub use package::{Record, WorkPackage};
pub use processor::{ProcessorFactory, RecordSummaryProcessor, WorkPackageProcessor};
pub use resources::{RecordStoreResources, Resources};
pub use store::{RecordStore, SharedRecordStore};
