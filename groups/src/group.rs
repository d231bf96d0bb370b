//! The state group contract.

use std::fmt;

use bitstream::{BitReader, BitWriter};
use wire::{Endpoint, PacketId};

use crate::client::ClientInfo;
use crate::error::GroupResult;

/// Category tag of a state group. Used for logging and metrics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GroupKind {
    Physics,
    Inventory,
    Collection,
    Generic,
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Physics => "physics",
            Self::Inventory => "inventory",
            Self::Collection => "collection",
            Self::Generic => "generic",
        };
        write!(f, "{name}")
    }
}

/// Result of a [`StateGroup::serialize`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The payload was written and is tracked under the packet id.
    Sent,
    /// Nothing useful fits below the budget. The group wrote nothing it
    /// cares about and changed no client state; the caller rewinds.
    DidNotFit,
}

/// One independently synchronized aspect of a replicable.
///
/// A group serves every client through per-client state created by
/// [`create_client_data`](Self::create_client_data). It must never be
/// asked to serialize for an endpoint it has no client state for.
///
/// [`serialize`](Self::serialize) is deterministic given the domain state and
/// the client's group state. [`deserialize`](Self::deserialize) reads exactly
/// the layout `serialize` writes.
pub trait StateGroup {
    fn kind(&self) -> GroupKind;

    /// Creates the per-client group state for `client`.
    fn create_client_data(&mut self, client: &ClientInfo);

    /// Drops the per-client group state for `endpoint`.
    fn destroy_client_data(&mut self, endpoint: Endpoint);

    /// Client-side periodic housekeeping.
    fn client_update(&mut self) {}

    /// Priority of sending this group to `client` now. Zero means skip.
    ///
    /// The scheduler multiplies the result by `frames_since_sync`.
    fn group_priority(&mut self, frames_since_sync: u32, client: &ClientInfo) -> f32;

    /// Writes the group payload for `endpoint`, staying at or below
    /// `max_bit_position` in `writer`.
    fn serialize(
        &mut self,
        writer: &mut BitWriter,
        endpoint: Endpoint,
        packet_id: PacketId,
        max_bit_position: usize,
    ) -> GroupResult<SyncOutcome>;

    /// Reads a payload written by `serialize` and applies it.
    fn deserialize(&mut self, reader: &mut BitReader<'_>) -> GroupResult<()>;

    /// Delivery notification for a packet this group wrote into.
    fn on_ack(&mut self, endpoint: Endpoint, packet_id: PacketId, delivered: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display() {
        assert_eq!(GroupKind::Physics.to_string(), "physics");
        assert_eq!(GroupKind::Inventory.to_string(), "inventory");
    }
}
