//! Per-client interest context consumed by priority functions.

use std::collections::HashMap;

use codec::Vec3d;
use wire::{Endpoint, ReplicableId};

/// What the player behind a client is currently interacting with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ContextKind {
    #[default]
    None,
    /// An inventory screen is open.
    Inventory,
    /// A production (assembler) screen is open.
    Production,
    /// A terminal screen is open.
    Terminal,
}

/// Interaction context: a kind plus the entity it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientContext {
    pub kind: ContextKind,
    pub entity: Option<ReplicableId>,
}

impl ClientContext {
    #[must_use]
    pub const fn new(kind: ContextKind, entity: Option<ReplicableId>) -> Self {
        Self { kind, entity }
    }
}

/// Spatial view used for relevance.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientView {
    pub position: Vec3d,
    pub radius: f64,
}

impl ClientView {
    #[must_use]
    pub const fn new(position: Vec3d, radius: f64) -> Self {
        Self { position, radius }
    }

    #[must_use]
    pub fn contains(&self, point: Vec3d) -> bool {
        self.position.distance_sq(point) <= self.radius * self.radius
    }
}

/// Read-only interest information about one connected client.
///
/// Supplied by the session layer; the registry only stamps
/// [`frame`](Self::frame) before asking groups for priorities.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientInfo {
    pub endpoint: Endpoint,
    /// Replication frame counter at the time of the priority query.
    pub frame: u64,
    /// Entity the player is controlling, if any.
    pub controlled_entity: Option<ReplicableId>,
    pub context: ClientContext,
    /// Relevance view. Without one, everything is relevant.
    pub view: Option<ClientView>,
    /// Per-tick bit budget override. Defaults to the transport MTU.
    pub budget_bits: Option<usize>,
    default_importance: f32,
    importance: HashMap<ReplicableId, f32>,
}

impl ClientInfo {
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            frame: 0,
            controlled_entity: None,
            context: ClientContext::default(),
            view: None,
            budget_bits: None,
            default_importance: 1.0,
            importance: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_controlled_entity(mut self, entity: ReplicableId) -> Self {
        self.controlled_entity = Some(entity);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: ClientContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_view(mut self, view: ClientView) -> Self {
        self.view = Some(view);
        self
    }

    #[must_use]
    pub fn with_budget_bits(mut self, bits: usize) -> Self {
        self.budget_bits = Some(bits);
        self
    }

    #[must_use]
    pub fn with_default_importance(mut self, importance: f32) -> Self {
        self.default_importance = importance;
        self
    }

    #[must_use]
    pub fn with_importance(mut self, replicable: ReplicableId, importance: f32) -> Self {
        self.set_importance(replicable, importance);
        self
    }

    pub fn set_importance(&mut self, replicable: ReplicableId, importance: f32) {
        self.importance.insert(replicable, importance);
    }

    /// Base importance of a replicable for this client.
    #[must_use]
    pub fn importance(&self, replicable: ReplicableId) -> f32 {
        self.importance
            .get(&replicable)
            .copied()
            .unwrap_or(self.default_importance)
    }

    /// Whether a replicable at `position` is inside the client's view.
    #[must_use]
    pub fn sees(&self, position: Option<Vec3d>) -> bool {
        match (self.view, position) {
            (Some(view), Some(position)) => view.contains(position),
            _ => true,
        }
    }
}
