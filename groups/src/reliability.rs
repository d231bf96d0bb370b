//! Per-client delivery tracking for records sent under packet ids.
//!
//! A record sent in a packet stays outstanding until that packet is acked.
//! A negative ack moves it to the pending queue unchanged, so the retry
//! carries the same content rather than a recomputed one.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};
use wire::PacketId;

/// What an ack did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Nothing was outstanding under the packet id.
    Unknown,
    /// The record was delivered and dropped.
    Retired,
    /// The record was lost and queued for retry.
    Requeued,
}

#[derive(Debug)]
pub struct ReliabilityTracker<R> {
    outstanding: HashMap<PacketId, R>,
    pending: VecDeque<R>,
}

impl<R> Default for ReliabilityTracker<R> {
    fn default() -> Self {
        Self {
            outstanding: HashMap::new(),
            pending: VecDeque::new(),
        }
    }
}

impl<R> ReliabilityTracker<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `record` with `packet_id`.
    ///
    /// A record still outstanding under a reused id is treated as lost.
    pub fn record_sent(&mut self, packet_id: PacketId, record: R) {
        if let Some(stale) = self.outstanding.insert(packet_id, record) {
            warn!(packet_id = packet_id.raw(), "packet id reused while in flight; requeueing");
            self.pending.push_back(stale);
        }
    }

    pub fn on_ack(&mut self, packet_id: PacketId, delivered: bool) -> AckOutcome {
        match self.outstanding.remove(&packet_id) {
            None => AckOutcome::Unknown,
            Some(_) if delivered => AckOutcome::Retired,
            Some(record) => {
                debug!(packet_id = packet_id.raw(), "record lost; queued for retry");
                self.pending.push_back(record);
                AckOutcome::Requeued
            }
        }
    }

    /// Takes the oldest record waiting for retry.
    pub fn take_pending(&mut self) -> Option<R> {
        self.pending.pop_front()
    }

    /// Puts a record back at the head of the retry queue.
    pub fn requeue_front(&mut self, record: R) {
        self.pending.push_front(record);
    }

    /// Appends a record that was never sent, such as a split remainder.
    pub fn queue(&mut self, record: R) {
        self.pending.push_back(record);
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    #[must_use]
    pub fn has_outstanding(&self) -> bool {
        !self.outstanding.is_empty()
    }

    /// No record is waiting for an ack or a retry.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.outstanding.is_empty()
    }

    #[must_use]
    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn clear(&mut self) {
        self.outstanding.clear();
        self.pending.clear();
    }
}
