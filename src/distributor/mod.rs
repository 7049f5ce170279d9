//! Coordinator role: chunks the record store and fans packages out to workers
//!
//! ```text
//!  Idle ─▶ Chunking ─▶ Dispatching ─▶ Draining ─▶ Terminated
//! ```
//!
//! The distributor owns the record store and the worker pool. Workers only
//! ever see packages; every status comes back over the interconnect.

mod coordinator;
mod pool;

pub use coordinator::{DispatchConfig, Distributor, ProgressHook};
pub use pool::{WorkerPool, WorkerSlot};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle state of a distributor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DistributorState {
    /// Created, not yet running
    Idle,
    /// Counting the store and setting up chunking
    Chunking,
    /// Handing out packages
    Dispatching,
    /// Waiting for outstanding statuses and shutdown acknowledgements
    Draining,
    /// Job over
    Terminated,
}

impl std::fmt::Display for DistributorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistributorState::Idle => write!(f, "idle"),
            DistributorState::Chunking => write!(f, "chunking"),
            DistributorState::Dispatching => write!(f, "dispatching"),
            DistributorState::Draining => write!(f, "draining"),
            DistributorState::Terminated => write!(f, "terminated"),
        }
    }
}

/// How a job ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum JobStatus {
    /// Every chunk was handed out and every live worker shut down
    Completed,
    /// The job stopped before every chunk was handed out
    Failed(String),
    /// Stopped by the interrupt flag
    Interrupted,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed(reason) => write!(f, "failed: {}", reason),
            JobStatus::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Snapshot passed to the progress hook after every status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobProgress {
    /// Chunks in the job
    pub total_chunks: u64,
    /// Chunks whose status has come back
    pub finished_chunks: u64,
    /// Chunks lost to fatal errors
    pub lost_chunks: u64,
    /// Workers not retired
    pub live_workers: usize,
}

/// Result of a finished job
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    /// Job identifier
    pub job_id: Uuid,

    /// Final distributor state
    pub state: DistributorState,

    /// How the job ended
    pub status: JobStatus,

    /// Chunks in the job
    pub total_chunks: u64,

    /// Chunks sent to a worker
    pub dispatched_chunks: u64,

    /// Chunks processed without error
    pub completed_chunks: u64,

    /// Chunks that failed recoverably
    pub recoverable_chunks: u64,

    /// Chunks in flight on a worker that failed fatally (not retried)
    pub lost_chunks: Vec<u64>,

    /// Workers spawned for the job
    pub workers_started: usize,

    /// Workers that failed to initialize
    pub workers_failed_init: usize,

    /// Workers retired by a fatal error
    pub workers_retired: usize,

    /// Records dispatched
    pub records: u64,

    /// Value bytes dispatched
    pub bytes: u64,

    /// When the job started
    pub started_at: DateTime<Utc>,

    /// Wall time of the job
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl JobSummary {
    pub(crate) fn new(job_id: Uuid, workers: usize) -> Self {
        Self {
            job_id,
            state: DistributorState::Idle,
            status: JobStatus::Completed,
            total_chunks: 0,
            dispatched_chunks: 0,
            completed_chunks: 0,
            recoverable_chunks: 0,
            lost_chunks: Vec::new(),
            workers_started: workers,
            workers_failed_init: 0,
            workers_retired: 0,
            records: 0,
            bytes: 0,
            started_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    /// Check if the job completed with every chunk processed cleanly
    pub fn is_clean(&self) -> bool {
        self.status == JobStatus::Completed
            && self.lost_chunks.is_empty()
            && self.recoverable_chunks == 0
    }

    /// Chunks never sent to a worker
    pub fn undispatched_chunks(&self) -> u64 {
        self.total_chunks.saturating_sub(self.dispatched_chunks)
    }

    /// Records dispatched per second
    pub fn records_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.records as f64 / secs
        } else {
            0.0
        }
    }

    /// Render as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_json() {
        let mut summary = JobSummary::new(Uuid::new_v4(), 4);
        summary.state = DistributorState::Terminated;
        summary.status = JobStatus::Failed("all workers retired".into());
        summary.total_chunks = 3;
        summary.dispatched_chunks = 1;
        summary.lost_chunks = vec![0];
        summary.duration = Duration::from_millis(1500);

        let value: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(value["state"], "Terminated");
        assert_eq!(value["status"]["status"], "failed");
        assert_eq!(value["status"]["reason"], "all workers retired");
        assert_eq!(value["lost_chunks"][0], 0);
        assert_eq!(value["duration_secs"], 1.5);
        assert_eq!(summary.undispatched_chunks(), 2);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_records_per_second() {
        let mut summary = JobSummary::new(Uuid::new_v4(), 1);
        assert_eq!(summary.records_per_second(), 0.0);
        summary.records = 1000;
        summary.duration = Duration::from_secs(4);
        assert!((summary.records_per_second() - 250.0).abs() < 0.01);
    }
}
