//! Server-side replicable registry and per-client priority scheduler.
//!
//! Every tick, for each subscribed client in endpoint order:
//!
//! 1. Relevance: replicables that left the client's view (and are not
//!    pinned by a forced replication) or lost their dependency are
//!    destroyed; relevant ones whose dependency exists are created.
//! 2. Scheduling: every group of every created replicable is asked for a
//!    priority. Nonzero ones are ranked by `priority x frames_since_sync`
//!    and serialized into one state-sync frame until the bit budget runs out.
//!
//! A transport failure for a client tears down that client only.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bitstream::BitWriter;
use codec::Vec3d;
use groups::{ClientInfo, StateGroup, SyncOutcome};
use tracing::{debug, info, trace, warn};
use wire::{
    abandon_section, begin_frame, begin_section, end_frame, finish_section, CreateMessage,
    DestroyMessage, Endpoint, MessageKind, PacketId, ReplicableId, SectionHeader,
};

use crate::config::ServerConfig;
use crate::error::{ReplicationError, ReplicationResult};
use crate::pause::{PauseGate, PauseToken};
use crate::transport::{SendTarget, Transport};

/// A domain object visible to replication.
pub trait Replicable {
    /// Discriminator the client's replica factory dispatches on.
    fn type_tag(&self) -> u16;
    /// World position for view relevance. `None` means relevant everywhere.
    fn position(&self) -> Option<Vec3d> {
        None
    }
    /// Initial state carried by the create message.
    fn create_payload(&self) -> Vec<u8>;
    /// Replicable that must exist on a client before this one.
    fn dependency(&self) -> Option<ReplicableId> {
        None
    }
}

/// Plain [`Replicable`] with a fixed payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasicReplicable {
    pub type_tag: u16,
    pub position: Option<Vec3d>,
    pub payload: Vec<u8>,
    pub dependency: Option<ReplicableId>,
}

impl BasicReplicable {
    #[must_use]
    pub fn new(type_tag: u16) -> Self {
        Self {
            type_tag,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_position(mut self, position: Vec3d) -> Self {
        self.position = Some(position);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_dependency(mut self, dependency: ReplicableId) -> Self {
        self.dependency = Some(dependency);
        self
    }
}

impl Replicable for BasicReplicable {
    fn type_tag(&self) -> u16 {
        self.type_tag
    }

    fn position(&self) -> Option<Vec3d> {
        self.position
    }

    fn create_payload(&self) -> Vec<u8> {
        self.payload.clone()
    }

    fn dependency(&self) -> Option<ReplicableId> {
        self.dependency
    }
}

/// Registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplicationStats {
    pub ticks: u64,
    pub paused_ticks: u64,
    pub packets_sent: u64,
    pub groups_serialized: u64,
    pub groups_did_not_fit: u64,
    pub group_overflows: u64,
    pub group_errors: u64,
    pub acks_processed: u64,
    pub acks_lost: u64,
    pub acks_unknown: u64,
    pub creates_sent: u64,
    pub destroys_sent: u64,
    pub clients_dropped: u64,
}

type GroupKey = (ReplicableId, u8);

struct Entry {
    replicable: Box<dyn Replicable>,
    groups: Vec<Box<dyn StateGroup>>,
}

struct ClientSlot {
    info: ClientInfo,
    created: BTreeSet<ReplicableId>,
    /// Forced replicables kept alive regardless of view.
    pinned: BTreeSet<ReplicableId>,
    frames_since_sync: HashMap<GroupKey, u32>,
    next_packet: PacketId,
    in_flight: HashMap<PacketId, Vec<GroupKey>>,
}

impl ClientSlot {
    fn new(info: ClientInfo) -> Self {
        Self {
            info,
            created: BTreeSet::new(),
            pinned: BTreeSet::new(),
            frames_since_sync: HashMap::new(),
            next_packet: PacketId::new(0),
            in_flight: HashMap::new(),
        }
    }
}

fn group_mut(
    entries: &mut BTreeMap<ReplicableId, Entry>,
    replicable: ReplicableId,
    index: u8,
) -> Option<&mut Box<dyn StateGroup>> {
    entries
        .get_mut(&replicable)?
        .groups
        .get_mut(usize::from(index))
}

/// Authoritative side of replication.
pub struct ReplicationServer<T> {
    transport: T,
    config: ServerConfig,
    entries: BTreeMap<ReplicableId, Entry>,
    clients: BTreeMap<Endpoint, ClientSlot>,
    pause: PauseGate,
    frame: u64,
    stats: ReplicationStats,
}

impl<T: Transport> ReplicationServer<T> {
    pub fn new(transport: T, config: ServerConfig) -> Self {
        Self {
            transport,
            config,
            entries: BTreeMap::new(),
            clients: BTreeMap::new(),
            pause: PauseGate::default(),
            frame: 0,
            stats: ReplicationStats::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> ReplicationStats {
        self.stats
    }

    /// Number of unpaused ticks so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_subscribed(&self, endpoint: Endpoint) -> bool {
        self.clients.contains_key(&endpoint)
    }

    pub fn client_info(&self, endpoint: Endpoint) -> Option<&ClientInfo> {
        self.clients.get(&endpoint).map(|slot| &slot.info)
    }

    /// Whether `replicable` currently exists on `endpoint`.
    #[must_use]
    pub fn is_created(&self, endpoint: Endpoint, replicable: ReplicableId) -> bool {
        self.clients
            .get(&endpoint)
            .is_some_and(|slot| slot.created.contains(&replicable))
    }

    #[must_use]
    pub fn contains_replicable(&self, replicable: ReplicableId) -> bool {
        self.entries.contains_key(&replicable)
    }

    /// Packets sent to `endpoint` that have not been acked yet.
    #[must_use]
    pub fn in_flight(&self, endpoint: Endpoint) -> usize {
        self.clients
            .get(&endpoint)
            .map_or(0, |slot| slot.in_flight.len())
    }

    /// Pauses scheduling until every returned token is dropped.
    pub fn pause_replication(&self) -> PauseToken {
        self.pause.acquire()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// Registers a replicable. Clients see it from the next tick on, once relevant.
    pub fn add_replicable(
        &mut self,
        id: ReplicableId,
        replicable: Box<dyn Replicable>,
        groups: Vec<Box<dyn StateGroup>>,
    ) -> ReplicationResult<()> {
        if self.entries.contains_key(&id) {
            return Err(ReplicationError::DuplicateReplicable { replicable: id });
        }
        if groups.len() > usize::from(u8::MAX) + 1 {
            return Err(ReplicationError::TooManyGroups {
                replicable: id,
                count: groups.len(),
            });
        }
        debug!(replicable = %id, groups = groups.len(), "replicable registered");
        self.entries.insert(id, Entry { replicable, groups });
        Ok(())
    }

    /// Destroys the replicable on every client that has it and unregisters it.
    ///
    /// Dependents are destroyed on the next tick.
    pub fn remove_replicable(&mut self, id: ReplicableId) -> ReplicationResult<()> {
        if !self.entries.contains_key(&id) {
            return Err(ReplicationError::UnknownReplicable { replicable: id });
        }
        let holders: Vec<Endpoint> = self
            .clients
            .iter()
            .filter(|(_, slot)| slot.created.contains(&id))
            .map(|(endpoint, _)| *endpoint)
            .collect();
        for endpoint in holders {
            if let Err(err) = self.destroy_on(endpoint, id) {
                warn!(?endpoint, %err, "destroy failed; dropping client");
                self.drop_client(endpoint);
            }
        }
        self.entries.remove(&id);
        debug!(replicable = %id, "replicable removed");
        Ok(())
    }

    /// Starts replicating to a client. Relevant replicables are created
    /// immediately; their groups start from an empty client snapshot.
    pub fn subscribe(&mut self, mut info: ClientInfo) -> ReplicationResult<()> {
        let endpoint = info.endpoint;
        if self.clients.contains_key(&endpoint) {
            return Err(ReplicationError::AlreadySubscribed { endpoint });
        }
        info.frame = self.frame;
        self.clients.insert(endpoint, ClientSlot::new(info));
        info!(?endpoint, "client subscribed");
        if let Err(err) = self.refresh_relevance(endpoint) {
            self.drop_client(endpoint);
            return Err(err);
        }
        Ok(())
    }

    /// Drops all client state for `endpoint`. Nothing is sent.
    pub fn unsubscribe(&mut self, endpoint: Endpoint) -> ReplicationResult<()> {
        if !self.teardown(endpoint) {
            return Err(ReplicationError::UnknownClient { endpoint });
        }
        info!(?endpoint, "client unsubscribed");
        Ok(())
    }

    /// Replaces the interest information of a subscribed client.
    pub fn update_client_info(&mut self, mut info: ClientInfo) -> ReplicationResult<()> {
        let endpoint = info.endpoint;
        let slot = self
            .clients
            .get_mut(&endpoint)
            .ok_or(ReplicationError::UnknownClient { endpoint })?;
        info.frame = slot.info.frame;
        slot.info = info;
        Ok(())
    }

    /// Runs one replication pass over every client.
    pub fn tick(&mut self) {
        if self.pause.is_paused() {
            self.stats.paused_ticks += 1;
            trace!(depth = self.pause.depth(), "replication paused");
            return;
        }
        self.frame += 1;
        self.stats.ticks += 1;

        let endpoints: Vec<Endpoint> = self.clients.keys().copied().collect();
        let mut dropped = Vec::new();
        for endpoint in endpoints {
            let result = match self.refresh_relevance(endpoint) {
                Ok(()) => self.sync_client(endpoint),
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => {}
                Err(ReplicationError::Transport(err)) => {
                    warn!(?endpoint, %err, "transport failed; dropping client");
                    dropped.push(endpoint);
                }
                Err(err) => warn!(?endpoint, %err, "client tick failed"),
            }
        }
        for endpoint in dropped {
            self.drop_client(endpoint);
        }
    }

    /// Delivery notification for a state-sync packet. Processed while paused too.
    pub fn on_ack(&mut self, endpoint: Endpoint, packet_id: PacketId, delivered: bool) {
        let Self {
            entries,
            clients,
            stats,
            ..
        } = self;
        let Some(slot) = clients.get_mut(&endpoint) else {
            warn!(?endpoint, packet_id = packet_id.raw(), "ack from unknown client");
            stats.acks_unknown += 1;
            return;
        };
        let Some(carried) = slot.in_flight.remove(&packet_id) else {
            warn!(?endpoint, packet_id = packet_id.raw(), "ack for unknown packet");
            stats.acks_unknown += 1;
            return;
        };
        stats.acks_processed += 1;
        if !delivered {
            stats.acks_lost += 1;
        }
        trace!(
            ?endpoint,
            packet_id = packet_id.raw(),
            delivered,
            sections = carried.len(),
            "ack"
        );
        for (id, index) in carried {
            if !slot.created.contains(&id) {
                continue;
            }
            if let Some(group) = group_mut(entries, id, index) {
                group.on_ack(endpoint, packet_id, delivered);
            }
        }
    }

    /// Creates `id` (dependencies first) and sends all of its groups right
    /// now, bypassing the scheduler.
    ///
    /// With `dependency` set, only clients that already have that replicable
    /// are targeted. Forced replicables stay created regardless of view until
    /// [`release_forced`](Self::release_forced).
    pub fn force_replicate(
        &mut self,
        id: ReplicableId,
        dependency: Option<ReplicableId>,
        target: SendTarget,
    ) -> ReplicationResult<()> {
        if !self.entries.contains_key(&id) {
            return Err(ReplicationError::UnknownReplicable { replicable: id });
        }
        if let Some(dependency) = dependency {
            if !self.entries.contains_key(&dependency) {
                return Err(ReplicationError::MissingDependency {
                    replicable: id,
                    dependency,
                });
            }
        }
        let chain = self.dependency_chain(id)?;
        let endpoints: Vec<Endpoint> = self
            .clients
            .iter()
            .filter(|(endpoint, slot)| {
                target.includes(**endpoint)
                    && dependency.map_or(true, |dep| slot.created.contains(&dep))
            })
            .map(|(endpoint, _)| *endpoint)
            .collect();

        let mut first_error = None;
        for endpoint in endpoints {
            if let Err(err) = self.force_on(endpoint, id, &chain) {
                warn!(?endpoint, replicable = %id, %err, "forced replication failed");
                if matches!(err, ReplicationError::Transport(_)) {
                    self.drop_client(endpoint);
                }
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Lets view relevance destroy a force-replicated replicable again.
    pub fn release_forced(&mut self, id: ReplicableId) {
        for slot in self.clients.values_mut() {
            slot.pinned.remove(&id);
        }
    }

    /// `id` and its dependencies, root first.
    fn dependency_chain(&self, id: ReplicableId) -> ReplicationResult<Vec<ReplicableId>> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(dependency) = self
            .entries
            .get(&current)
            .and_then(|entry| entry.replicable.dependency())
        {
            if !self.entries.contains_key(&dependency) {
                return Err(ReplicationError::MissingDependency {
                    replicable: current,
                    dependency,
                });
            }
            if chain.contains(&dependency) {
                break;
            }
            chain.push(dependency);
            current = dependency;
        }
        chain.reverse();
        Ok(chain)
    }

    fn force_on(
        &mut self,
        endpoint: Endpoint,
        id: ReplicableId,
        chain: &[ReplicableId],
    ) -> ReplicationResult<()> {
        for &link in chain {
            if !self.is_created(endpoint, link) {
                self.create_on(endpoint, link)?;
            }
            if let Some(slot) = self.clients.get_mut(&endpoint) {
                slot.pinned.insert(link);
            }
        }
        let group_count = self.entries.get(&id).map_or(0, |entry| entry.groups.len());
        let order: Vec<GroupKey> = (0..group_count).map(|index| (id, index as u8)).collect();
        debug!(?endpoint, replicable = %id, "forced replication");
        self.write_sync(endpoint, order)
    }

    fn create_on(&mut self, endpoint: Endpoint, id: ReplicableId) -> ReplicationResult<()> {
        let Self {
            entries,
            clients,
            transport,
            config,
            stats,
            ..
        } = self;
        let slot = clients
            .get_mut(&endpoint)
            .ok_or(ReplicationError::UnknownClient { endpoint })?;
        let entry = entries
            .get_mut(&id)
            .ok_or(ReplicationError::UnknownReplicable { replicable: id })?;

        let message = CreateMessage {
            replicable: id,
            type_tag: entry.replicable.type_tag(),
            dependency: entry.replicable.dependency(),
            payload: entry.replicable.create_payload(),
        };
        let kind = if message.payload.len() > config.stream_threshold_bytes {
            MessageKind::ReplicationCreateStreamed
        } else {
            MessageKind::ReplicationCreate
        };
        transport.send(endpoint, kind, &message.encode(), kind.is_reliable())?;

        for (index, group) in entry.groups.iter_mut().enumerate() {
            group.create_client_data(&slot.info);
            slot.frames_since_sync.insert((id, index as u8), 0);
        }
        slot.created.insert(id);
        stats.creates_sent += 1;
        debug!(?endpoint, replicable = %id, ?kind, "replicable created on client");
        Ok(())
    }

    fn destroy_on(&mut self, endpoint: Endpoint, id: ReplicableId) -> ReplicationResult<()> {
        let Self {
            entries,
            clients,
            transport,
            stats,
            ..
        } = self;
        let slot = clients
            .get_mut(&endpoint)
            .ok_or(ReplicationError::UnknownClient { endpoint })?;
        if !slot.created.remove(&id) {
            return Ok(());
        }
        slot.pinned.remove(&id);
        slot.frames_since_sync.retain(|(replicable, _), _| *replicable != id);
        if let Some(entry) = entries.get_mut(&id) {
            for group in &mut entry.groups {
                group.destroy_client_data(endpoint);
            }
        }
        let message = DestroyMessage { replicable: id };
        let kind = MessageKind::ReplicationDestroy;
        transport.send(endpoint, kind, &message.encode(), kind.is_reliable())?;
        stats.destroys_sent += 1;
        debug!(?endpoint, replicable = %id, "replicable destroyed on client");
        Ok(())
    }

    /// Brings the client's created set in line with relevance and dependencies.
    fn refresh_relevance(&mut self, endpoint: Endpoint) -> ReplicationResult<()> {
        loop {
            let slot = self
                .clients
                .get(&endpoint)
                .ok_or(ReplicationError::UnknownClient { endpoint })?;
            let stale: Vec<ReplicableId> = slot
                .created
                .iter()
                .copied()
                .filter(|id| match self.entries.get(id) {
                    None => true,
                    Some(entry) => {
                        let orphaned = entry
                            .replicable
                            .dependency()
                            .is_some_and(|dep| !slot.created.contains(&dep));
                        let out_of_view = !slot.pinned.contains(id)
                            && !slot.info.sees(entry.replicable.position());
                        orphaned || out_of_view
                    }
                })
                .collect();
            if stale.is_empty() {
                break;
            }
            for id in stale {
                self.destroy_on(endpoint, id)?;
            }
        }

        loop {
            let slot = self
                .clients
                .get(&endpoint)
                .ok_or(ReplicationError::UnknownClient { endpoint })?;
            let ready: Vec<ReplicableId> = self
                .entries
                .iter()
                .filter(|(id, entry)| {
                    !slot.created.contains(id)
                        && entry
                            .replicable
                            .dependency()
                            .map_or(true, |dep| slot.created.contains(&dep))
                        && slot.info.sees(entry.replicable.position())
                })
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                return Ok(());
            }
            for id in ready {
                self.create_on(endpoint, id)?;
            }
        }
    }

    /// Ranks the client's groups and writes one state-sync frame.
    fn sync_client(&mut self, endpoint: Endpoint) -> ReplicationResult<()> {
        let frame = self.frame;
        let Self {
            entries, clients, ..
        } = self;
        let slot = clients
            .get_mut(&endpoint)
            .ok_or(ReplicationError::UnknownClient { endpoint })?;
        slot.info.frame = frame;

        let mut candidates: Vec<(f32, GroupKey)> = Vec::new();
        for &id in &slot.created {
            let Some(entry) = entries.get_mut(&id) else {
                continue;
            };
            for (index, group) in entry.groups.iter_mut().enumerate() {
                let key = (id, index as u8);
                let frames = slot.frames_since_sync.entry(key).or_insert(0);
                *frames = frames.saturating_add(1);
                let frames = *frames;
                let priority = group.group_priority(frames, &slot.info);
                if priority > 0.0 && priority.is_finite() {
                    candidates.push((priority * frames as f32, key));
                }
            }
        }
        if candidates.is_empty() {
            return Ok(());
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        let order = candidates.into_iter().map(|(_, key)| key).collect();
        self.write_sync(endpoint, order)
    }

    /// Serializes groups in `order` into one frame and sends it if any
    /// section was written.
    fn write_sync(&mut self, endpoint: Endpoint, order: Vec<GroupKey>) -> ReplicationResult<()> {
        let Self {
            entries,
            clients,
            transport,
            config,
            stats,
            ..
        } = self;
        let slot = clients
            .get_mut(&endpoint)
            .ok_or(ReplicationError::UnknownClient { endpoint })?;

        let packet_id = slot.next_packet;
        if let Some(stale) = slot.in_flight.remove(&packet_id) {
            warn!(
                ?endpoint,
                packet_id = packet_id.raw(),
                sections = stale.len(),
                "packet id reused before ack; reporting loss"
            );
            for (id, index) in stale {
                if let Some(group) = group_mut(entries, id, index) {
                    group.on_ack(endpoint, packet_id, false);
                }
            }
        }

        let mtu = transport
            .mtu_bytes(endpoint)
            .unwrap_or(config.default_mtu_bytes);
        let budget_bits = slot.info.budget_bits.unwrap_or(mtu.saturating_mul(8));
        // The closing `more` bit is always written.
        let max = budget_bits.saturating_sub(1);
        let mut writer = BitWriter::with_capacity(mtu);
        begin_frame(&mut writer, packet_id);

        let mut carried = Vec::new();
        for (id, index) in order {
            let Some(group) = group_mut(entries, id, index) else {
                continue;
            };
            let header = SectionHeader::new(id, index);
            if writer.bit_position() + header.encoded_bits() + config.min_section_bits > max {
                stats.groups_did_not_fit += 1;
                if config.keep_trying_after_overflow {
                    continue;
                }
                break;
            }
            let mark = begin_section(&mut writer, header);
            match group.serialize(&mut writer, endpoint, packet_id, max) {
                Ok(SyncOutcome::Sent) if writer.bit_position() <= max => {
                    match finish_section(&mut writer, mark) {
                        Ok(bits) => {
                            trace!(?endpoint, replicable = %id, index, bits, "section written");
                            carried.push((id, index));
                            slot.frames_since_sync.insert((id, index), 0);
                            stats.groups_serialized += 1;
                        }
                        Err(err) => {
                            abandon_section(&mut writer, mark)?;
                            warn!(?endpoint, replicable = %id, index, %err, "section rejected");
                            group.on_ack(endpoint, packet_id, false);
                            stats.group_errors += 1;
                        }
                    }
                }
                Ok(SyncOutcome::Sent) => {
                    abandon_section(&mut writer, mark)?;
                    warn!(
                        ?endpoint,
                        replicable = %id,
                        index,
                        kind = %group.kind(),
                        max,
                        "group wrote past its budget"
                    );
                    group.on_ack(endpoint, packet_id, false);
                    stats.group_overflows += 1;
                    if !config.keep_trying_after_overflow {
                        break;
                    }
                }
                Ok(SyncOutcome::DidNotFit) => {
                    abandon_section(&mut writer, mark)?;
                    stats.groups_did_not_fit += 1;
                    if !config.keep_trying_after_overflow {
                        break;
                    }
                }
                Err(err) => {
                    abandon_section(&mut writer, mark)?;
                    warn!(?endpoint, replicable = %id, index, %err, "group serialize failed");
                    group.on_ack(endpoint, packet_id, false);
                    stats.group_errors += 1;
                }
            }
        }
        if carried.is_empty() {
            return Ok(());
        }

        end_frame(&mut writer);
        let bytes = writer.finish();
        slot.next_packet = packet_id.next();
        slot.in_flight.insert(packet_id, carried);
        transport.send(endpoint, MessageKind::StateSync, &bytes, false)?;
        stats.packets_sent += 1;
        Ok(())
    }

    /// Removes the client slot and its group state. Returns `false` if absent.
    fn teardown(&mut self, endpoint: Endpoint) -> bool {
        let Some(slot) = self.clients.remove(&endpoint) else {
            return false;
        };
        for id in &slot.created {
            if let Some(entry) = self.entries.get_mut(id) {
                for group in &mut entry.groups {
                    group.destroy_client_data(endpoint);
                }
            }
        }
        true
    }

    fn drop_client(&mut self, endpoint: Endpoint) {
        if self.teardown(endpoint) {
            self.stats.clients_dropped += 1;
            info!(?endpoint, "client dropped");
        }
    }
}
