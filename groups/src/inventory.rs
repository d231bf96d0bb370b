//! Inventory items and a plain inventory container.

use std::collections::HashSet;

use bitstream::{BitReader, BitWriter};
use wire::ReplicableId;

use crate::client::{ClientContext, ContextKind};
use crate::collection::ItemCollection;
use crate::diff::SyncItem;
use crate::error::GroupResult;

/// A stack of one item type inside an inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InventoryItem {
    /// Slot-independent id, unique within the inventory.
    pub id: u32,
    pub type_id: u16,
    pub subtype_id: u16,
    pub amount: i64,
}

impl InventoryItem {
    #[must_use]
    pub const fn new(id: u32, type_id: u16, subtype_id: u16, amount: i64) -> Self {
        Self {
            id,
            type_id,
            subtype_id,
            amount,
        }
    }
}

impl SyncItem for InventoryItem {
    fn item_id(&self) -> u32 {
        self.id
    }

    fn same_identity(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.subtype_id == other.subtype_id
    }

    fn amount(&self) -> i64 {
        self.amount
    }

    fn write(&self, writer: &mut BitWriter) -> GroupResult<()> {
        writer.write_varu32(self.id);
        writer.write_u16(self.type_id);
        writer.write_u16(self.subtype_id);
        writer.write_vars64(self.amount);
        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> GroupResult<Self> {
        Ok(Self {
            id: reader.read_varu32()?,
            type_id: reader.read_u16()?,
            subtype_id: reader.read_u16()?,
            amount: reader.read_vars64()?,
        })
    }
}

/// Ordered item container with a change counter.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    items: Vec<InventoryItem>,
    revision: u64,
    owner: Option<ReplicableId>,
    forced_priority: Option<f32>,
    reachable_from: HashSet<ReplicableId>,
    production: bool,
    refreshes: u64,
}

impl Inventory {
    #[must_use]
    pub fn new(owner: Option<ReplicableId>) -> Self {
        Self {
            owner,
            ..Self::default()
        }
    }

    /// Marks this inventory as belonging to a production block, which makes
    /// it relevant in a production context.
    #[must_use]
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&InventoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Appends `item`, replacing any item with the same id in place.
    pub fn add(&mut self, item: InventoryItem) {
        match self.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
        self.touch();
    }

    /// Sets the amount of item `id`. Returns `false` if there is no such item.
    pub fn set_amount(&mut self, id: u32, amount: i64) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return false;
        };
        if item.amount != amount {
            item.amount = amount;
            self.touch();
        }
        true
    }

    pub fn remove(&mut self, id: u32) -> Option<InventoryItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        self.touch();
        Some(self.items.remove(index))
    }

    pub fn set_forced_priority(&mut self, priority: Option<f32>) {
        self.forced_priority = priority;
    }

    /// Lets a client interacting with `entity` see this inventory.
    pub fn set_reachable_from(&mut self, entity: ReplicableId) {
        self.reachable_from.insert(entity);
    }

    /// Times a received diff has been applied.
    #[must_use]
    pub const fn refresh_count(&self) -> u64 {
        self.refreshes
    }
}

impl ItemCollection for Inventory {
    type Item = InventoryItem;

    fn items(&self) -> Vec<InventoryItem> {
        self.items.clone()
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn owner(&self) -> Option<ReplicableId> {
        self.owner
    }

    fn forced_priority(&self) -> Option<f32> {
        self.forced_priority
    }

    fn relevant_to(&self, context: &ClientContext) -> bool {
        let Some(entity) = context.entity else {
            return false;
        };
        if Some(entity) == self.owner {
            return true;
        }
        match context.kind {
            ContextKind::Inventory => self.reachable_from.contains(&entity),
            ContextKind::Production => self.production && self.reachable_from.contains(&entity),
            ContextKind::None | ContextKind::Terminal => false,
        }
    }

    fn apply_amount_delta(&mut self, id: u32, delta: i64) {
        if let Some(item) = self.items.iter_mut().find(|item| item.id == id) {
            item.amount = item.amount.wrapping_add(delta);
            self.touch();
        }
    }

    fn remove_item(&mut self, id: u32) {
        self.remove(id);
    }

    fn insert_item(&mut self, position: usize, item: InventoryItem) {
        self.items.retain(|existing| existing.id != item.id);
        let position = position.min(self.items.len());
        self.items.insert(position, item);
        self.touch();
    }

    fn refresh(&mut self) {
        self.refreshes += 1;
    }
}
