//! The send primitive the registry writes to.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use wire::{Endpoint, MessageKind};

/// A 1200-byte MTU minus one byte of transport message id.
pub const DEFAULT_MTU_BYTES: usize = 1199;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The endpoint is gone. The registry tears down its client state.
    #[error("endpoint {endpoint} disconnected")]
    Disconnected { endpoint: Endpoint },
}

/// Outbound message sink.
///
/// The transport also owns delivery notification: for every state-sync
/// message it must eventually report exactly one ack per packet id through
/// [`ReplicationServer::on_ack`](crate::ReplicationServer::on_ack).
pub trait Transport {
    fn send(
        &mut self,
        endpoint: Endpoint,
        kind: MessageKind,
        payload: &[u8],
        reliable: bool,
    ) -> Result<(), TransportError>;

    /// Largest message the endpoint accepts, if the transport knows it.
    fn mtu_bytes(&self, _endpoint: Endpoint) -> Option<usize> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(
        &mut self,
        endpoint: Endpoint,
        kind: MessageKind,
        payload: &[u8],
        reliable: bool,
    ) -> Result<(), TransportError> {
        (**self).send(endpoint, kind, payload, reliable)
    }

    fn mtu_bytes(&self, endpoint: Endpoint) -> Option<usize> {
        (**self).mtu_bytes(endpoint)
    }
}

/// Who a forced replication goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTarget {
    Endpoint(Endpoint),
    /// Every subscribed client except the given one.
    BroadcastExcept(Option<Endpoint>),
}

impl SendTarget {
    pub const BROADCAST: Self = Self::BroadcastExcept(None);

    #[must_use]
    pub fn includes(self, endpoint: Endpoint) -> bool {
        match self {
            Self::Endpoint(target) => target == endpoint,
            Self::BroadcastExcept(except) => except != Some(endpoint),
        }
    }
}

/// A message captured by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub endpoint: Endpoint,
    pub kind: MessageKind,
    pub payload: Vec<u8>,
    pub reliable: bool,
}

/// In-process transport that queues every message it is given.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    outbox: Vec<Outbound>,
    disconnected: BTreeSet<Endpoint>,
    mtu: BTreeMap<Endpoint, usize>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mtu(&mut self, endpoint: Endpoint, bytes: usize) {
        self.mtu.insert(endpoint, bytes);
    }

    /// Makes every later send to `endpoint` fail.
    pub fn disconnect(&mut self, endpoint: Endpoint) {
        self.disconnected.insert(endpoint);
    }

    #[must_use]
    pub fn outbox(&self) -> &[Outbound] {
        &self.outbox
    }

    pub fn drain(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }
}

impl Transport for MemoryTransport {
    fn send(
        &mut self,
        endpoint: Endpoint,
        kind: MessageKind,
        payload: &[u8],
        reliable: bool,
    ) -> Result<(), TransportError> {
        if self.disconnected.contains(&endpoint) {
            return Err(TransportError::Disconnected { endpoint });
        }
        self.outbox.push(Outbound {
            endpoint,
            kind,
            payload: payload.to_vec(),
            reliable,
        });
        Ok(())
    }

    fn mtu_bytes(&self, endpoint: Endpoint) -> Option<usize> {
        self.mtu.get(&endpoint).copied()
    }
}
