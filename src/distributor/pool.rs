//! Worker pool bookkeeping for the distributor
//!
//! Tracks one slot per worker rank. Idle workers wait in a FIFO so they are
//! served round-robin in the order they became idle.

use crate::interconnect::Rank;
use std::collections::VecDeque;

/// State of one worker as seen by the distributor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerSlot {
    /// Spawned, not yet reported `Ready` or `InitFailed`
    Starting,
    /// Waiting for a package
    Idle,
    /// Processing the given chunk
    Busy(u64),
    /// No longer receives packages
    Retired(String),
}

impl WorkerSlot {
    /// Check if the worker still takes part in the job
    pub fn is_live(&self) -> bool {
        !matches!(self, WorkerSlot::Retired(_))
    }
}

/// Pool of workers indexed by rank (ranks start at 1)
#[derive(Debug)]
pub struct WorkerPool {
    slots: Vec<WorkerSlot>,
    idle: VecDeque<Rank>,
}

impl WorkerPool {
    /// Pool of `workers` workers, all starting
    pub fn new(workers: usize) -> Self {
        Self {
            slots: vec![WorkerSlot::Starting; workers],
            idle: VecDeque::with_capacity(workers),
        }
    }

    /// Total number of workers, retired ones included
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// State of worker `rank`
    pub fn slot(&self, rank: Rank) -> Option<&WorkerSlot> {
        self.slots.get(rank.checked_sub(1)?)
    }

    fn slot_mut(&mut self, rank: Rank) -> Option<&mut WorkerSlot> {
        self.slots.get_mut(rank.checked_sub(1)?)
    }

    /// Move a starting worker to idle; false if it was not starting
    pub fn mark_ready(&mut self, rank: Rank) -> bool {
        let Some(slot) = self.slot_mut(rank) else {
            return false;
        };
        if *slot != WorkerSlot::Starting {
            return false;
        }
        *slot = WorkerSlot::Idle;
        self.idle.push_back(rank);
        true
    }

    /// Take the longest-idle worker
    pub fn next_idle(&mut self) -> Option<Rank> {
        // Retired workers may still sit in the queue
        while let Some(rank) = self.idle.pop_front() {
            if self.slot(rank) == Some(&WorkerSlot::Idle) {
                return Some(rank);
            }
        }
        None
    }

    /// Record that `rank` now holds `chunk`
    pub fn mark_busy(&mut self, rank: Rank, chunk: u64) {
        if let Some(slot) = self.slot_mut(rank) {
            *slot = WorkerSlot::Busy(chunk);
        }
    }

    /// Record a status from `rank`, returning the chunk it held
    ///
    /// The worker goes back to the end of the idle queue. Returns `None`
    /// if the worker was not busy.
    pub fn complete(&mut self, rank: Rank) -> Option<u64> {
        let slot = self.slot_mut(rank)?;
        let WorkerSlot::Busy(chunk) = *slot else {
            return None;
        };
        *slot = WorkerSlot::Idle;
        self.idle.push_back(rank);
        Some(chunk)
    }

    /// Retire `rank`, returning the chunk it held, if any
    pub fn retire(&mut self, rank: Rank, reason: impl Into<String>) -> Option<u64> {
        let slot = self.slot_mut(rank)?;
        let in_flight = match slot {
            WorkerSlot::Busy(chunk) => Some(*chunk),
            _ => None,
        };
        *slot = WorkerSlot::Retired(reason.into());
        in_flight
    }

    /// Workers not retired
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_live()).count()
    }

    /// Ranks of workers not retired
    pub fn live_ranks(&self) -> Vec<Rank> {
        self.ranks_where(WorkerSlot::is_live)
    }

    /// Workers holding a package
    pub fn busy(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, WorkerSlot::Busy(_)))
            .count()
    }

    /// Workers that have not reported after spawning
    pub fn starting(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, WorkerSlot::Starting))
            .count()
    }

    /// Check if any status or start-up report is still owed
    pub fn has_outstanding(&self) -> bool {
        self.busy() > 0 || self.starting() > 0
    }

    fn ranks_where(&self, pred: impl Fn(&WorkerSlot) -> bool) -> Vec<Rank> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| pred(s))
            .map(|(i, _)| i + 1)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_in_idle_order() {
        let mut pool = WorkerPool::new(3);
        pool.mark_ready(2);
        pool.mark_ready(1);
        pool.mark_ready(3);

        assert_eq!(pool.next_idle(), Some(2));
        pool.mark_busy(2, 0);
        assert_eq!(pool.next_idle(), Some(1));
        pool.mark_busy(1, 1);

        assert_eq!(pool.complete(2), Some(0));
        assert_eq!(pool.next_idle(), Some(3));
        assert_eq!(pool.next_idle(), Some(2));
        assert_eq!(pool.next_idle(), None);
    }

    #[test]
    fn test_retire_returns_in_flight_chunk() {
        let mut pool = WorkerPool::new(2);
        pool.mark_ready(1);
        pool.mark_ready(2);
        let rank = pool.next_idle().unwrap();
        pool.mark_busy(rank, 7);

        assert_eq!(pool.retire(rank, "disk gone"), Some(7));
        assert_eq!(pool.live(), 1);
        assert_eq!(pool.live_ranks(), vec![2]);
        assert!(!pool.has_outstanding());

        // retired workers are skipped even if queued
        assert_eq!(pool.retire(2, "init"), None);
        assert_eq!(pool.next_idle(), None);
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn test_starting_workers_are_outstanding() {
        let mut pool = WorkerPool::new(2);
        assert_eq!(pool.starting(), 2);
        assert!(pool.has_outstanding());

        assert!(pool.mark_ready(1));
        assert!(!pool.mark_ready(1));
        pool.retire(2, "init failed");
        assert!(!pool.has_outstanding());
        assert_eq!(pool.slot(2), Some(&WorkerSlot::Retired("init failed".into())));
    }

    #[test]
    fn test_unknown_rank_ignored() {
        let mut pool = WorkerPool::new(1);
        assert!(!pool.mark_ready(0));
        assert!(!pool.mark_ready(5));
        assert_eq!(pool.complete(5), None);
        assert_eq!(pool.slot(0), None);
    }
}
