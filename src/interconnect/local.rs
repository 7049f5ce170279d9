//! In-process interconnect over crossbeam channels
//!
//! Builds a star of endpoints: the coordinator can reach every worker, each
//! worker can reach the coordinator. Each endpoint owns one inbox; frames
//! are encoded on send and decoded on receive.

use crate::error::{TransportError, TransportResult};
use crate::interconnect::{
    decode_frame, encode_frame, Envelope, Interconnect, Message, Rank, COORDINATOR,
    DEFAULT_MAX_FRAME_BYTES,
};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::trace;

/// Frame tagged with the sender's rank
type Frame = (Rank, Vec<u8>);

/// One endpoint of an in-process job
pub struct LocalInterconnect {
    rank: Rank,
    inbox: Receiver<Frame>,
    peers: BTreeMap<Rank, Sender<Frame>>,
    max_frame_bytes: u64,
}

impl LocalInterconnect {
    /// Build a coordinator endpoint and `workers` worker endpoints
    ///
    /// Worker endpoints are returned in rank order, starting at rank 1.
    pub fn star(workers: usize) -> (Self, Vec<Self>) {
        Self::star_with_limit(workers, DEFAULT_MAX_FRAME_BYTES)
    }

    /// Same as [`star`](Self::star) with a custom frame limit
    pub fn star_with_limit(workers: usize, max_frame_bytes: u64) -> (Self, Vec<Self>) {
        let (coordinator_tx, coordinator_rx) = unbounded();

        let mut coordinator_peers = BTreeMap::new();
        let mut endpoints = Vec::with_capacity(workers);

        for rank in 1..=workers {
            let (tx, rx) = unbounded();
            coordinator_peers.insert(rank, tx);

            let mut peers = BTreeMap::new();
            peers.insert(COORDINATOR, coordinator_tx.clone());

            endpoints.push(Self {
                rank,
                inbox: rx,
                peers,
                max_frame_bytes,
            });
        }

        let coordinator = Self {
            rank: COORDINATOR,
            inbox: coordinator_rx,
            peers: coordinator_peers,
            max_frame_bytes,
        };

        (coordinator, endpoints)
    }

    /// Ranks this endpoint can send to
    pub fn peers(&self) -> impl Iterator<Item = Rank> + '_ {
        self.peers.keys().copied()
    }

    fn encode(&self, message: &Message) -> TransportResult<Vec<u8>> {
        encode_frame(message, self.max_frame_bytes).map_err(TransportError::from)
    }
}

impl Interconnect for LocalInterconnect {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, to: Rank, message: &Message) -> TransportResult<()> {
        let peer = self.peers.get(&to).ok_or(TransportError::UnknownRank(to))?;
        let frame = self.encode(message)?;

        trace!(from = self.rank, to = to, kind = message.kind(), bytes = frame.len(), "Send");

        peer.send((self.rank, frame))
            .map_err(|_| TransportError::Disconnected { rank: to })
    }

    fn receive_timeout(&self, timeout: Duration) -> TransportResult<Option<Envelope>> {
        let (from, frame) = match self.inbox.recv_timeout(timeout) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => return Ok(None),
            Err(RecvTimeoutError::Disconnected) => return Err(TransportError::AllDisconnected),
        };

        let message = decode_frame(&frame).map_err(TransportError::from)?;
        trace!(at = self.rank, from = from, kind = message.kind(), "Receive");

        Ok(Some(Envelope { from, message }))
    }

    fn broadcast(&self, message: &Message) -> TransportResult<usize> {
        let frame = self.encode(message)?;
        let mut reached = 0;

        for (&rank, peer) in &self.peers {
            if peer.send((self.rank, frame.clone())).is_ok() {
                reached += 1;
            } else {
                trace!(from = self.rank, to = rank, "Broadcast skipped disconnected peer");
            }
        }

        Ok(reached)
    }
}
