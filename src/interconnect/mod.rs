//! Message transport between the coordinator and workers
//!
//! Every participant of a job has a rank: the coordinator is rank 0, workers
//! are ranks 1..=N. Messages travel as bincode frames so nothing but bytes
//! crosses an endpoint boundary, the same as between processes.
//!
//! Delivery is reliable and ordered per pair of ranks.

mod local;

pub use local::LocalInterconnect;

use crate::error::{PackageError, PackageStatus, TransportResult};
use crate::package::{WorkPackage, DEFAULT_MAX_PACKAGE_BYTES};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Position of a participant in the job
pub type Rank = usize;

/// Rank of the coordinator
pub const COORDINATOR: Rank = 0;

/// Headroom on top of the package limit for the message envelope
pub const FRAME_OVERHEAD: u64 = 4096;

/// Largest frame an endpoint accepts by default
pub const DEFAULT_MAX_FRAME_BYTES: u64 = DEFAULT_MAX_PACKAGE_BYTES + FRAME_OVERHEAD;

/// Messages exchanged during a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Worker initialized and waits for packages
    Ready,

    /// Worker could not initialize and leaves the job
    InitFailed(String),

    /// Package for a worker to process
    Package(WorkPackage),

    /// Outcome of one package
    Status {
        chunk_index: u64,
        status: PackageStatus,
    },

    /// Coordinator ends the job
    Shutdown,

    /// Worker ran its shutdown; `error` is set if that failed
    ShutdownComplete { error: Option<String> },
}

impl Message {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Ready => "Ready",
            Message::InitFailed(_) => "InitFailed",
            Message::Package(_) => "Package",
            Message::Status { .. } => "Status",
            Message::Shutdown => "Shutdown",
            Message::ShutdownComplete { .. } => "ShutdownComplete",
        }
    }
}

/// A received message together with its sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: Rank,
    pub message: Message,
}

/// Encode a message into a frame no larger than `max_bytes`
pub fn encode_frame(message: &Message, max_bytes: u64) -> Result<Vec<u8>, PackageError> {
    let size = bincode::serialized_size(message).map_err(|e| PackageError::Encode(e.to_string()))?;
    if size > max_bytes {
        return Err(PackageError::TooLarge {
            size,
            max: max_bytes,
        });
    }
    bincode::serialize(message).map_err(|e| PackageError::Encode(e.to_string()))
}

/// Decode a frame, re-checking package invariants
pub fn decode_frame(frame: &[u8]) -> Result<Message, PackageError> {
    let message: Message =
        bincode::deserialize(frame).map_err(|e| PackageError::Decode(e.to_string()))?;
    if let Message::Package(package) = &message {
        package.validate()?;
    }
    Ok(message)
}

/// Point-to-point messaging for one participant
pub trait Interconnect: Send {
    /// Rank of this endpoint
    fn rank(&self) -> Rank;

    /// Number of peers this endpoint can address
    fn peer_count(&self) -> usize;

    /// Send `message` to `to`
    fn send(&self, to: Rank, message: &Message) -> TransportResult<()>;

    /// Wait up to `timeout` for the next message from any peer
    ///
    /// Returns `Ok(None)` on timeout. Messages already queued are returned
    /// before a disconnect is reported.
    fn receive_timeout(&self, timeout: Duration) -> TransportResult<Option<Envelope>>;

    /// Send `message` to every peer still connected
    ///
    /// Returns the number of peers reached.
    fn broadcast(&self, message: &Message) -> TransportResult<usize>;
}
