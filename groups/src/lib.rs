//! State groups for netsync replication.
//!
//! A state group is one independently synchronized aspect of a replicable:
//! its physics, its inventory, any keyed collection. The scheduler only
//! sees the [`StateGroup`] trait; each group keeps whatever per-client
//! state it needs between `create_client_data` and `destroy_client_data`.
//!
//! # Features
//!
//! - Physics group with movement classes and a starvation ramp
//! - Diff records against a per-client acknowledged snapshot
//! - Splitting of diffs that exceed the bit budget, with verbatim retry
//! - Duplicate suppression on the receiving side
//!
//! # Design Principles
//!
//! - **Serialize never mutates on failure** - `DidNotFit` leaves client state as it was.
//! - **Anchor once** - a client's snapshot moves only when every part of a diff is acked.
//! - **Errors stay local** - a group error costs one section, never the tick.

mod client;
mod collection;
mod diff;
mod error;
mod group;
mod history;
mod inventory;
mod physics;
mod priority;
mod reliability;

pub use client::{ClientContext, ClientInfo, ClientView, ContextKind};
pub use collection::{CollectionGroup, CollectionStats, CollectionSyncConfig, ItemCollection};
pub use diff::{
    compute_diff, read_record, record_bits, split_to_fit, write_no_changes,
    write_record, DiffRecord, Split, SyncItem,
};
pub use error::{GroupError, GroupResult};
pub use group::{GroupKind, StateGroup, SyncOutcome};
pub use history::ReceivedHistory;
pub use inventory::{Inventory, InventoryItem};
pub use physics::{BodyState, MovementClass, PhysicsBody, PhysicsGroup, PhysicsStats};
pub use priority::{ramp_priority, PrioritySettings};
pub use reliability::{AckOutcome, ReliabilityTracker};
