//! Replicable registry and priority scheduler for netsync replication.
//!
//! The server side keeps every registered replicable with its state groups
//! and, per subscribed client, the set of replicables that exist on that
//! client. Each tick it reconciles that set against view relevance, ranks
//! all groups by priority and time since their last sync, and packs as many
//! as fit into one state-sync frame per client.
//!
//! The client side decodes create, destroy and state-sync messages and hands
//! each section to the matching local group.
//!
//! # Features
//!
//! - Relevance-driven create and destroy with dependency ordering
//! - Starvation-free ranking (`priority x frames_since_sync`)
//! - Per-client bit budgets taken from the transport MTU or the client info
//! - Forced replication that bypasses the scheduler
//! - Nestable pause tokens; acks keep flowing while paused
//!
//! # Design Principles
//!
//! - **One client's failure is local** - a transport error drops that client, not the tick.
//! - **Acks are the transport's job** - the registry only maps packet ids back to groups.
//! - **Deterministic order** - clients and replicables are visited in id order.

mod client;
mod config;
mod error;
mod pause;
mod server;
mod transport;

pub use client::{ClientStats, ReplicaFactory, ReplicationClient};
pub use config::ServerConfig;
pub use error::{ReplicationError, ReplicationResult};
pub use pause::PauseToken;
pub use server::{BasicReplicable, Replicable, ReplicationServer, ReplicationStats};
pub use transport::{
    MemoryTransport, Outbound, SendTarget, Transport, TransportError, DEFAULT_MTU_BYTES,
};
