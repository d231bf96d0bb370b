//! Error types for the replication registry.

use groups::GroupError;
use thiserror::Error;
use wire::{Endpoint, ReplicableId, WireError};

use crate::transport::TransportError;

/// Result type for registry operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors returned by registry entry points.
///
/// [`ReplicationServer::tick`](crate::ReplicationServer::tick) never returns
/// one: inside a tick, errors are logged and handled per client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ReplicationError {
    /// The endpoint is not subscribed.
    #[error("unknown client {endpoint}")]
    UnknownClient { endpoint: Endpoint },

    /// The replicable is not registered.
    #[error("unknown replicable {replicable}")]
    UnknownReplicable { replicable: ReplicableId },

    #[error("client {endpoint} is already subscribed")]
    AlreadySubscribed { endpoint: Endpoint },

    #[error("replicable {replicable} is already registered")]
    DuplicateReplicable { replicable: ReplicableId },

    /// More groups than a one-byte group index can address.
    #[error("replicable {replicable} has {count} groups, at most 256 are addressable")]
    TooManyGroups { replicable: ReplicableId, count: usize },

    /// A replicable names a dependency that does not exist where it must.
    #[error("replicable {replicable} depends on missing {dependency}")]
    MissingDependency {
        replicable: ReplicableId,
        dependency: ReplicableId,
    },

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Wire error.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Group error.
    #[error("group error: {0}")]
    Group(#[from] GroupError),
}
