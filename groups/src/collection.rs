//! Delta-compressed sync of a keyed item collection.
//!
//! Per client the group keeps the last snapshot the client is known to
//! hold. Each logical update is a [`DiffRecord`] against that snapshot,
//! possibly split across several packets. The snapshot is replaced by the
//! diffed state only once every part has been acked, and no new diff is
//! computed while any part is still pending or in flight.
//!
//! A part that has gone out once is only ever resent whole: the client may
//! already hold it, and only an identical `(message_id, part)` is recognized
//! as a duplicate. The receiver applies the parts of a message in part
//! order, holding back any that arrive early.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::rc::Rc;

use bitstream::{BitReader, BitWriter};
use tracing::{debug, trace};
use wire::{Endpoint, MessageId, PacketId, ReplicableId};

use crate::client::{ClientContext, ClientInfo, ContextKind};
use crate::diff::{
    compute_diff, read_record, record_bits, split_to_fit, write_no_changes, write_record,
    DiffRecord, SyncItem,
};
use crate::error::{GroupError, GroupResult};
use crate::group::{GroupKind, StateGroup, SyncOutcome};
use crate::history::ReceivedHistory;
use crate::reliability::{AckOutcome, ReliabilityTracker};

/// A collection whose contents are replicated item by item.
pub trait ItemCollection {
    type Item: SyncItem;

    /// Current items in iteration order.
    fn items(&self) -> Vec<Self::Item>;
    /// Counter that changes whenever the contents change.
    fn revision(&self) -> u64;
    /// Entity the collection belongs to.
    fn owner(&self) -> Option<ReplicableId> {
        None
    }
    /// Overrides the relevance-based priority in an inventory context.
    fn forced_priority(&self) -> Option<f32> {
        None
    }
    fn relevant_to(&self, context: &ClientContext) -> bool {
        context.entity.is_some() && context.entity == self.owner()
    }

    fn apply_amount_delta(&mut self, id: u32, delta: i64);
    fn remove_item(&mut self, id: u32);
    /// Inserts at `position`, clamped to the current length. An existing
    /// item with the same id is replaced.
    fn insert_item(&mut self, position: usize, item: Self::Item);
    /// Called once after a received diff has been applied.
    fn refresh(&mut self) {}
}

impl<C: ItemCollection> ItemCollection for Rc<RefCell<C>> {
    type Item = C::Item;

    fn items(&self) -> Vec<Self::Item> {
        self.borrow().items()
    }

    fn revision(&self) -> u64 {
        self.borrow().revision()
    }

    fn owner(&self) -> Option<ReplicableId> {
        self.borrow().owner()
    }

    fn forced_priority(&self) -> Option<f32> {
        self.borrow().forced_priority()
    }

    fn relevant_to(&self, context: &ClientContext) -> bool {
        self.borrow().relevant_to(context)
    }

    fn apply_amount_delta(&mut self, id: u32, delta: i64) {
        self.borrow_mut().apply_amount_delta(id, delta);
    }

    fn remove_item(&mut self, id: u32) {
        self.borrow_mut().remove_item(id);
    }

    fn insert_item(&mut self, position: usize, item: Self::Item) {
        self.borrow_mut().insert_item(position, item);
    }

    fn refresh(&mut self) {
        self.borrow_mut().refresh();
    }
}

/// Collection sync tuning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollectionSyncConfig {
    /// Priority of a dirty, relevant collection before the frame multiplier.
    pub priority_weight: f32,
    /// Received `(message_id, part)` pairs remembered for dedup.
    pub history_size: NonZeroUsize,
    /// Contexts in which a collection relevant to the context entity is sent.
    pub context_kinds: Vec<ContextKind>,
}

impl Default for CollectionSyncConfig {
    fn default() -> Self {
        Self {
            priority_weight: 1000.0,
            history_size: NonZeroUsize::new(256).unwrap_or(NonZeroUsize::MIN),
            context_kinds: vec![ContextKind::Inventory, ContextKind::Production],
        }
    }
}

impl CollectionSyncConfig {
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            history_size: NonZeroUsize::new(16).unwrap_or(NonZeroUsize::MIN),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_priority_weight(mut self, weight: f32) -> Self {
        self.priority_weight = weight;
        self
    }

    #[must_use]
    pub fn with_history_size(mut self, size: NonZeroUsize) -> Self {
        self.history_size = size;
        self
    }
}

/// Counters for both directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollectionStats {
    pub diffs_started: u64,
    pub parts_sent: u64,
    pub retries_sent: u64,
    pub splits: u64,
    pub snapshots_anchored: u64,
    pub records_applied: u64,
    pub duplicates_dropped: u64,
    /// Parts that arrived before an earlier part of the same message.
    pub parts_held: u64,
}

/// A part waiting for an ack or a retry.
struct Outgoing<I> {
    record: DiffRecord<I>,
    /// Whether the part has been written to a packet before.
    transmitted: bool,
}

struct ClientCollectionState<I> {
    /// Last snapshot the client is known to hold, in iteration order.
    known: Vec<I>,
    /// Snapshot the in-progress message brings the client to.
    planned: Option<Vec<I>>,
    seen_revision: Option<u64>,
    message_id: MessageId,
    next_part: u32,
    tracker: ReliabilityTracker<Outgoing<I>>,
}

impl<I> ClientCollectionState<I> {
    fn new() -> Self {
        Self {
            known: Vec::new(),
            planned: None,
            seen_revision: None,
            message_id: MessageId::default(),
            next_part: 1,
            tracker: ReliabilityTracker::new(),
        }
    }
}

/// Receive side of the message currently being reassembled.
struct Incoming<I> {
    message_id: Option<MessageId>,
    next_part: u32,
    early: BTreeMap<u32, DiffRecord<I>>,
}

impl<I> Default for Incoming<I> {
    fn default() -> Self {
        Self {
            message_id: None,
            next_part: 0,
            early: BTreeMap::new(),
        }
    }
}

/// State group syncing an [`ItemCollection`] with per-client diffs.
pub struct CollectionGroup<C: ItemCollection> {
    collection: C,
    kind: GroupKind,
    config: CollectionSyncConfig,
    clients: HashMap<Endpoint, ClientCollectionState<C::Item>>,
    history: ReceivedHistory<(MessageId, u32)>,
    incoming: Incoming<C::Item>,
    stats: CollectionStats,
}

impl<C: ItemCollection> CollectionGroup<C> {
    pub fn new(collection: C, config: CollectionSyncConfig) -> Self {
        let history = ReceivedHistory::new(config.history_size);
        Self {
            collection,
            kind: GroupKind::Collection,
            config,
            clients: HashMap::new(),
            history,
            incoming: Incoming::default(),
            stats: CollectionStats::default(),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: GroupKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut C {
        &mut self.collection
    }

    #[must_use]
    pub const fn stats(&self) -> CollectionStats {
        self.stats
    }

    /// Snapshot `endpoint` is known to hold, if it is subscribed.
    pub fn known_snapshot(&self, endpoint: Endpoint) -> Option<&[C::Item]> {
        self.clients.get(&endpoint).map(|state| state.known.as_slice())
    }

    /// Whether `endpoint` has parts waiting for retry or for an ack.
    #[must_use]
    pub fn is_in_progress(&self, endpoint: Endpoint) -> bool {
        self.clients
            .get(&endpoint)
            .is_some_and(|state| !state.tracker.is_idle())
    }

    fn serialize_retry(
        &mut self,
        writer: &mut BitWriter,
        endpoint: Endpoint,
        packet_id: PacketId,
        available: usize,
    ) -> GroupResult<Option<SyncOutcome>> {
        let Some(state) = self.clients.get_mut(&endpoint) else {
            return Err(GroupError::UnknownClient { endpoint });
        };
        let Some(pending) = state.tracker.take_pending() else {
            return Ok(None);
        };
        if pending.transmitted {
            let bits = match record_bits(&pending.record) {
                Ok(bits) => bits,
                Err(err) => {
                    state.tracker.requeue_front(pending);
                    return Err(err);
                }
            };
            if bits > available {
                trace!(?endpoint, bits, available, "retry waits for a larger budget");
                state.tracker.requeue_front(pending);
                return Ok(Some(SyncOutcome::DidNotFit));
            }
            if let Err(err) = write_record(writer, &pending.record) {
                state.tracker.requeue_front(pending);
                return Err(err);
            }
            trace!(
                ?endpoint,
                packet_id = packet_id.raw(),
                message_id = pending.record.message_id.raw(),
                part = pending.record.part,
                "collection part retried"
            );
            state.tracker.record_sent(packet_id, pending);
            self.stats.retries_sent += 1;
            self.stats.parts_sent += 1;
            return Ok(Some(SyncOutcome::Sent));
        }

        // A remainder that never went out may be cut further.
        let split = match split_to_fit(&pending.record, available) {
            Ok(Some(split)) => split,
            Ok(None) => {
                state.tracker.requeue_front(pending);
                return Ok(Some(SyncOutcome::DidNotFit));
            }
            Err(err) => {
                state.tracker.requeue_front(pending);
                return Err(err);
            }
        };
        if let Err(err) = write_record(writer, &split.sent) {
            state.tracker.requeue_front(pending);
            return Err(err);
        }
        if let Some(mut rest) = split.remainder {
            rest.part = state.next_part;
            state.next_part = state.next_part.wrapping_add(1);
            debug!(
                ?endpoint,
                message_id = rest.message_id.raw(),
                part = rest.part,
                "remainder split again"
            );
            self.stats.splits += 1;
            state.tracker.requeue_front(Outgoing {
                record: rest,
                transmitted: false,
            });
        }
        trace!(
            ?endpoint,
            packet_id = packet_id.raw(),
            message_id = split.sent.message_id.raw(),
            part = split.sent.part,
            "collection remainder sent"
        );
        state.tracker.record_sent(
            packet_id,
            Outgoing {
                record: split.sent,
                transmitted: true,
            },
        );
        self.stats.parts_sent += 1;
        Ok(Some(SyncOutcome::Sent))
    }

    fn apply(&mut self, record: DiffRecord<C::Item>) {
        self.incoming.next_part = record.part.wrapping_add(1);
        for (&id, &delta) in &record.changed {
            self.collection.apply_amount_delta(id, delta);
        }
        for &id in &record.removed {
            self.collection.remove_item(id);
        }
        for (position, item) in record.added {
            self.collection.insert_item(position as usize, item);
        }
        self.stats.records_applied += 1;
    }
}

impl<C: ItemCollection> StateGroup for CollectionGroup<C> {
    fn kind(&self) -> GroupKind {
        self.kind
    }

    fn create_client_data(&mut self, client: &ClientInfo) {
        self.clients
            .entry(client.endpoint)
            .or_insert_with(ClientCollectionState::new);
    }

    fn destroy_client_data(&mut self, endpoint: Endpoint) {
        self.clients.remove(&endpoint);
    }

    fn group_priority(&mut self, _frames_since_sync: u32, client: &ClientInfo) -> f32 {
        let Some(state) = self.clients.get(&client.endpoint) else {
            return 0.0;
        };
        let weight = self.config.priority_weight;
        if state.tracker.has_pending() {
            return weight;
        }
        let dirty = state.seen_revision != Some(self.collection.revision());
        if !dirty || state.tracker.has_outstanding() {
            return 0.0;
        }

        let owner = self.collection.owner();
        if owner.is_some() && (owner == client.controlled_entity || owner == client.context.entity) {
            return weight;
        }
        if self.config.context_kinds.contains(&client.context.kind) {
            if let Some(forced) = self.collection.forced_priority() {
                return forced * weight;
            }
            if self.collection.relevant_to(&client.context) {
                return weight;
            }
        }
        0.0
    }

    fn serialize(
        &mut self,
        writer: &mut BitWriter,
        endpoint: Endpoint,
        packet_id: PacketId,
        max_bit_position: usize,
    ) -> GroupResult<SyncOutcome> {
        let available = max_bit_position.saturating_sub(writer.bit_position());
        if let Some(outcome) = self.serialize_retry(writer, endpoint, packet_id, available)? {
            return Ok(outcome);
        }

        let revision = self.collection.revision();
        let Some(state) = self.clients.get_mut(&endpoint) else {
            return Err(GroupError::UnknownClient { endpoint });
        };
        if available == 0 {
            return Ok(SyncOutcome::DidNotFit);
        }
        if state.seen_revision == Some(revision) || state.tracker.has_outstanding() {
            write_no_changes(writer);
            return Ok(SyncOutcome::Sent);
        }

        let items = self.collection.items();
        let record = compute_diff(state.message_id, 0, &items, &state.known);
        if !record.has_changes() {
            state.seen_revision = Some(revision);
            write_no_changes(writer);
            return Ok(SyncOutcome::Sent);
        }
        let Some(split) = split_to_fit(&record, available)? else {
            return Ok(SyncOutcome::DidNotFit);
        };
        write_record(writer, &split.sent)?;

        state.planned = Some(items);
        state.seen_revision = Some(revision);
        state.message_id = state.message_id.next();
        state.next_part = 1;
        if let Some(mut rest) = split.remainder {
            rest.part = state.next_part;
            state.next_part += 1;
            debug!(
                ?endpoint,
                message_id = rest.message_id.raw(),
                sent = split.sent.entry_count(),
                remaining = rest.entry_count(),
                "diff split"
            );
            self.stats.splits += 1;
            state.tracker.queue(Outgoing {
                record: rest,
                transmitted: false,
            });
        }
        trace!(
            ?endpoint,
            packet_id = packet_id.raw(),
            message_id = split.sent.message_id.raw(),
            entries = split.sent.entry_count(),
            "collection diff sent"
        );
        state.tracker.record_sent(
            packet_id,
            Outgoing {
                record: split.sent,
                transmitted: true,
            },
        );
        self.stats.diffs_started += 1;
        self.stats.parts_sent += 1;
        Ok(SyncOutcome::Sent)
    }

    fn deserialize(&mut self, reader: &mut BitReader<'_>) -> GroupResult<()> {
        let Some(record) = read_record::<C::Item>(reader)? else {
            return Ok(());
        };
        let key = (record.message_id, record.part);
        let current = self.incoming.message_id == Some(record.message_id);
        if self.history.contains(&key) || (current && record.part < self.incoming.next_part) {
            trace!(
                message_id = record.message_id.raw(),
                part = record.part,
                "duplicate diff dropped"
            );
            self.stats.duplicates_dropped += 1;
            return Ok(());
        }
        if !current {
            // The sender starts a message only once every part of the
            // previous one was delivered.
            if !self.incoming.early.is_empty() {
                debug!(
                    message_id = record.message_id.raw(),
                    dropped = self.incoming.early.len(),
                    "unfinished message superseded"
                );
            }
            self.incoming = Incoming {
                message_id: Some(record.message_id),
                ..Incoming::default()
            };
        }
        if record.part != self.incoming.next_part {
            if self.incoming.early.len() >= self.config.history_size.get() {
                return Err(GroupError::Malformed {
                    what: "too many early parts",
                });
            }
            trace!(
                message_id = record.message_id.raw(),
                part = record.part,
                expected = self.incoming.next_part,
                "diff part held"
            );
            self.history.insert(key);
            self.incoming.early.insert(record.part, record);
            self.stats.parts_held += 1;
            return Ok(());
        }

        self.history.insert(key);
        self.apply(record);
        while let Some(next) = self.incoming.early.remove(&self.incoming.next_part) {
            self.apply(next);
        }
        self.collection.refresh();
        Ok(())
    }

    fn on_ack(&mut self, endpoint: Endpoint, packet_id: PacketId, delivered: bool) {
        let Some(state) = self.clients.get_mut(&endpoint) else {
            return;
        };
        let outcome = state.tracker.on_ack(packet_id, delivered);
        trace!(?endpoint, packet_id = packet_id.raw(), delivered, ?outcome, "collection ack");
        if outcome == AckOutcome::Unknown || !state.tracker.is_idle() {
            return;
        }
        if let Some(planned) = state.planned.take() {
            state.known = planned;
            self.stats.snapshots_anchored += 1;
            debug!(?endpoint, items = state.known.len(), "snapshot anchored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Inventory, InventoryItem};

    const CLIENT: Endpoint = Endpoint::new(3);

    fn server_group(amounts: &[i64]) -> CollectionGroup<Inventory> {
        let mut inventory = Inventory::new(Some(ReplicableId::new(10)));
        for (i, &amount) in amounts.iter().enumerate() {
            inventory.add(InventoryItem::new(i as u32 + 1, 1, 0, amount));
        }
        let mut group = CollectionGroup::new(inventory, CollectionSyncConfig::for_testing());
        group.create_client_data(&ClientInfo::new(CLIENT));
        group
    }

    fn send(group: &mut CollectionGroup<Inventory>, packet: u8, max: usize) -> (SyncOutcome, Vec<u8>) {
        let mut writer = BitWriter::new();
        let outcome = group
            .serialize(&mut writer, CLIENT, PacketId::new(packet), max)
            .unwrap();
        (outcome, writer.finish())
    }

    fn decode(bytes: &[u8]) -> Option<DiffRecord<InventoryItem>> {
        read_record(&mut BitReader::new(bytes)).unwrap()
    }

    fn owner_client() -> ClientInfo {
        ClientInfo::new(CLIENT).with_controlled_entity(ReplicableId::new(10))
    }

    #[test]
    fn priority_follows_dirty_and_owner() {
        let mut group = server_group(&[5]);
        assert!((group.group_priority(1, &owner_client()) - 1000.0).abs() < f32::EPSILON);
        let stranger = ClientInfo::new(CLIENT);
        assert_eq!(group.group_priority(1, &stranger), 0.0);

        send(&mut group, 0, 10_000);
        // In flight: nothing new to send until acked.
        assert_eq!(group.group_priority(1, &owner_client()), 0.0);
        group.on_ack(CLIENT, PacketId::new(0), true);
        assert_eq!(group.group_priority(1, &owner_client()), 0.0);
    }

    #[test]
    fn pending_retry_always_has_priority() {
        let mut group = server_group(&[5]);
        send(&mut group, 0, 10_000);
        group.on_ack(CLIENT, PacketId::new(0), false);
        let stranger = ClientInfo::new(CLIENT);
        assert!(group.group_priority(1, &stranger) > 0.0);
    }

    #[test]
    fn context_relevance() {
        let mut inventory = Inventory::new(Some(ReplicableId::new(10)));
        inventory.add(InventoryItem::new(1, 1, 0, 1));
        inventory.set_reachable_from(ReplicableId::new(77));
        let mut group = CollectionGroup::new(inventory, CollectionSyncConfig::for_testing());
        group.create_client_data(&ClientInfo::new(CLIENT));

        let terminal = ClientInfo::new(CLIENT)
            .with_context(ClientContext::new(ContextKind::Terminal, Some(ReplicableId::new(77))));
        assert_eq!(group.group_priority(1, &terminal), 0.0);
        let screen = ClientInfo::new(CLIENT)
            .with_context(ClientContext::new(ContextKind::Inventory, Some(ReplicableId::new(77))));
        assert!(group.group_priority(1, &screen) > 0.0);

        group.collection_mut().set_forced_priority(Some(0.5));
        assert!((group.group_priority(1, &screen) - 500.0).abs() < 1e-3);
    }

    #[test]
    fn first_send_is_full_snapshot_then_anchors() {
        let mut group = server_group(&[5, 10, 2]);
        let (outcome, bytes) = send(&mut group, 0, 10_000);
        assert_eq!(outcome, SyncOutcome::Sent);
        let record = decode(&bytes).unwrap();
        assert_eq!(record.added.len(), 3);
        assert!(group.known_snapshot(CLIENT).unwrap().is_empty());

        group.on_ack(CLIENT, PacketId::new(0), true);
        assert_eq!(group.known_snapshot(CLIENT).unwrap().len(), 3);
        assert_eq!(group.stats().snapshots_anchored, 1);

        let (_, bytes) = send(&mut group, 1, 10_000);
        assert!(decode(&bytes).is_none());
    }

    #[test]
    fn lost_packet_is_retried_verbatim() {
        let mut group = server_group(&[5, 10]);
        let (_, first) = send(&mut group, 0, 10_000);
        group.on_ack(CLIENT, PacketId::new(0), false);

        // A mutation in between must not change the retried bytes.
        group.collection_mut().set_amount(1, 99);
        let (_, retry) = send(&mut group, 1, 10_000);
        assert_eq!(first, retry);

        group.on_ack(CLIENT, PacketId::new(1), true);
        let (_, next) = send(&mut group, 2, 10_000);
        let record = decode(&next).unwrap();
        assert_eq!(record.changed.get(&1), Some(&94));
        assert_eq!(record.message_id, MessageId::new(1));
    }

    #[test]
    fn does_not_fit_leaves_state_untouched() {
        let mut group = server_group(&[5, 10]);
        let (outcome, bytes) = send(&mut group, 0, 10);
        assert_eq!(outcome, SyncOutcome::DidNotFit);
        assert!(bytes.is_empty());
        assert!(!group.is_in_progress(CLIENT));
        assert!(group.group_priority(1, &owner_client()) > 0.0);
    }

    #[test]
    fn unknown_client_is_an_error() {
        let mut group = server_group(&[1]);
        let mut writer = BitWriter::new();
        let err = group
            .serialize(&mut writer, Endpoint::new(99), PacketId::new(0), 1000)
            .unwrap_err();
        assert_eq!(err, GroupError::UnknownClient { endpoint: Endpoint::new(99) });
    }

    #[test]
    fn receiver_applies_and_drops_duplicates() {
        let mut server = server_group(&[5, 10, 2]);
        let (_, bytes) = send(&mut server, 0, 10_000);

        let mut replica = CollectionGroup::new(Inventory::new(None), CollectionSyncConfig::for_testing());
        replica.deserialize(&mut BitReader::new(&bytes)).unwrap();
        replica.deserialize(&mut BitReader::new(&bytes)).unwrap();
        let amounts: Vec<i64> = replica.collection().items().iter().map(|i| i.amount).collect();
        assert_eq!(amounts, vec![5, 10, 2]);
        assert_eq!(replica.stats().duplicates_dropped, 1);
        assert_eq!(replica.collection().refresh_count(), 1);
    }

    fn replica() -> CollectionGroup<Inventory> {
        CollectionGroup::new(Inventory::new(None), CollectionSyncConfig::for_testing())
    }

    fn ids(group: &CollectionGroup<Inventory>) -> Vec<u32> {
        group.collection().items().iter().map(|item| item.id).collect()
    }

    #[test]
    fn delivered_part_reported_lost_is_resent_whole() {
        let mut server = server_group(&[100; 30]);
        let mut client = replica();
        let (_, initial) = send(&mut server, 0, 10_000);
        client.deserialize(&mut BitReader::new(&initial)).unwrap();
        server.on_ack(CLIENT, PacketId::new(0), true);

        for id in 1..=30 {
            server.collection_mut().set_amount(id, 101);
        }
        let (_, update) = send(&mut server, 1, 10_000);
        client.deserialize(&mut BitReader::new(&update)).unwrap();
        // The packet arrived but its ack says otherwise.
        server.on_ack(CLIENT, PacketId::new(1), false);

        let (outcome, bytes) = send(&mut server, 2, 120);
        assert_eq!(outcome, SyncOutcome::DidNotFit);
        assert!(bytes.is_empty());
        assert_eq!(server.stats().splits, 0);

        let (outcome, retry) = send(&mut server, 3, 10_000);
        assert_eq!(outcome, SyncOutcome::Sent);
        assert_eq!(retry, update);
        client.deserialize(&mut BitReader::new(&retry)).unwrap();
        assert_eq!(client.stats().duplicates_dropped, 1);
        assert!(client.collection().items().iter().all(|item| item.amount == 101));
    }

    #[test]
    fn untransmitted_remainder_splits_again() {
        let mut server = server_group(&[1; 12]);
        let (_, first) = send(&mut server, 0, 120);
        let head = decode(&first).unwrap();
        assert!(head.added.len() < 12);
        let (_, second) = send(&mut server, 1, 120);
        let next = decode(&second).unwrap();
        assert_eq!(next.part, 1);
        assert!(server.stats().splits >= 2);
    }

    #[test]
    fn early_part_waits_for_the_one_before_it() {
        let mut server = server_group(&[5, 6]);
        let mut client = replica();
        let (_, initial) = send(&mut server, 0, 10_000);
        client.deserialize(&mut BitReader::new(&initial)).unwrap();
        server.on_ack(CLIENT, PacketId::new(0), true);

        server.collection_mut().remove(1);
        server.collection_mut().add(InventoryItem::new(3, 1, 0, 7));
        let removal_only = DiffRecord::<InventoryItem> {
            removed: vec![1],
            ..DiffRecord::empty(MessageId::new(1), 0)
        };
        let budget = record_bits(&removal_only).unwrap();
        let (_, removal) = send(&mut server, 1, budget);
        assert_eq!(decode(&removal).unwrap().removed, vec![1]);
        let (_, insertion) = send(&mut server, 2, 10_000);
        assert_eq!(decode(&insertion).unwrap().part, 1);

        client.deserialize(&mut BitReader::new(&insertion)).unwrap();
        assert_eq!(ids(&client), vec![1, 2]);
        assert_eq!(client.stats().parts_held, 1);

        client.deserialize(&mut BitReader::new(&removal)).unwrap();
        assert_eq!(ids(&client), vec![2, 3]);
        assert_eq!(ids(&client), ids(&server));
        assert_eq!(client.stats().records_applied, 3);
    }

    #[test]
    fn cut_short_record_applies_nothing() {
        let mut server = server_group(&[5, 10, 2]);
        let (_, bytes) = send(&mut server, 0, 10_000);
        let bits = record_bits(&decode(&bytes).unwrap()).unwrap();

        let mut client = replica();
        let mut reader = BitReader::new(&bytes).window(0, bits - 1).unwrap();
        assert!(client.deserialize(&mut reader).is_err());
        assert!(client.collection().is_empty());
        assert_eq!(client.stats().records_applied, 0);
    }
}
