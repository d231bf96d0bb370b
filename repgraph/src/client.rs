//! Client-side replica table.

use std::collections::BTreeMap;

use groups::StateGroup;
use tracing::{debug, trace, warn};
use wire::{
    CreateMessage, DestroyMessage, FrameReader, Limits, MessageKind, PacketId, ReplicableId,
};

use crate::error::{ReplicationError, ReplicationResult};

/// Builds the local replica for a create message.
pub trait ReplicaFactory {
    /// Returns the replica's groups in the same order the server registered
    /// them, or `None` for a type tag this client does not know.
    fn create(&mut self, message: &CreateMessage) -> Option<Vec<Box<dyn StateGroup>>>;

    /// Called after a replica's groups were dropped.
    fn destroy(&mut self, _replicable: ReplicableId) {}
}

/// Receive-side counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientStats {
    pub creates: u64,
    pub creates_rejected: u64,
    pub destroys: u64,
    pub frames: u64,
    pub sections_applied: u64,
    pub sections_skipped: u64,
    pub section_errors: u64,
}

struct Replica {
    dependency: Option<ReplicableId>,
    groups: Vec<Box<dyn StateGroup>>,
}

/// Applies server messages to local replicas.
pub struct ReplicationClient<F> {
    factory: F,
    limits: Limits,
    replicas: BTreeMap<ReplicableId, Replica>,
    stats: ClientStats,
}

impl<F: ReplicaFactory> ReplicationClient<F> {
    pub fn new(factory: F, limits: Limits) -> Self {
        Self {
            factory,
            limits,
            replicas: BTreeMap::new(),
            stats: ClientStats::default(),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    #[must_use]
    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    #[must_use]
    pub fn contains(&self, replicable: ReplicableId) -> bool {
        self.replicas.contains_key(&replicable)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Like [`receive`](Self::receive) with an unparsed kind byte.
    pub fn receive_raw(
        &mut self,
        kind: u8,
        payload: &[u8],
    ) -> ReplicationResult<Option<PacketId>> {
        self.receive(MessageKind::parse(kind)?, payload)
    }

    /// Applies one message. State-sync frames return their packet id, which
    /// the transport acknowledges back to the server.
    ///
    /// Sections for unknown replicas and sections whose group fails to
    /// decode are skipped; only a broken frame layout is an error.
    pub fn receive(
        &mut self,
        kind: MessageKind,
        payload: &[u8],
    ) -> ReplicationResult<Option<PacketId>> {
        match kind {
            MessageKind::ReplicationCreate | MessageKind::ReplicationCreateStreamed => {
                let message = CreateMessage::decode(payload, &self.limits)?;
                self.apply_create(&message)?;
                Ok(None)
            }
            MessageKind::ReplicationDestroy => {
                let message = DestroyMessage::decode(payload)?;
                self.apply_destroy(message.replicable);
                Ok(None)
            }
            MessageKind::StateSync => self.apply_frame(payload).map(Some),
        }
    }

    /// Calls `client_update` on every group of every replica.
    pub fn update(&mut self) {
        for replica in self.replicas.values_mut() {
            for group in &mut replica.groups {
                group.client_update();
            }
        }
    }

    fn apply_create(&mut self, message: &CreateMessage) -> ReplicationResult<()> {
        let id = message.replicable;
        if let Some(dependency) = message.dependency {
            if !self.replicas.contains_key(&dependency) {
                return Err(ReplicationError::MissingDependency {
                    replicable: id,
                    dependency,
                });
            }
        }
        if self.replicas.contains_key(&id) {
            debug!(replicable = %id, "replica recreated");
            self.apply_destroy(id);
        }
        let Some(groups) = self.factory.create(message) else {
            warn!(replicable = %id, type_tag = message.type_tag, "no replica for type tag");
            self.stats.creates_rejected += 1;
            return Ok(());
        };
        debug!(replicable = %id, groups = groups.len(), "replica created");
        self.replicas.insert(
            id,
            Replica {
                dependency: message.dependency,
                groups,
            },
        );
        self.stats.creates += 1;
        Ok(())
    }

    fn apply_destroy(&mut self, id: ReplicableId) {
        if self.replicas.remove(&id).is_none() {
            debug!(replicable = %id, "destroy for unknown replica");
            return;
        }
        let orphans: Vec<ReplicableId> = self
            .replicas
            .iter()
            .filter(|(_, replica)| replica.dependency == Some(id))
            .map(|(child, _)| *child)
            .collect();
        self.factory.destroy(id);
        self.stats.destroys += 1;
        debug!(replicable = %id, "replica destroyed");
        for child in orphans {
            self.apply_destroy(child);
        }
    }

    fn apply_frame(&mut self, bytes: &[u8]) -> ReplicationResult<PacketId> {
        let mut frame = FrameReader::new(bytes, &self.limits)?;
        let packet_id = frame.packet_id();
        self.stats.frames += 1;
        while let Some(section) = frame.next_section()? {
            let id = section.header.replicable;
            let index = section.header.group_index;
            let group = self
                .replicas
                .get_mut(&id)
                .and_then(|replica| replica.groups.get_mut(usize::from(index)));
            match group {
                None => {
                    trace!(replicable = %id, index, "section for unknown group skipped");
                    self.stats.sections_skipped += 1;
                }
                Some(group) => {
                    let mut payload = frame.payload(&section)?;
                    match group.deserialize(&mut payload) {
                        Ok(()) => self.stats.sections_applied += 1,
                        Err(err) => {
                            warn!(replicable = %id, index, %err, "group payload rejected");
                            self.stats.section_errors += 1;
                        }
                    }
                }
            }
            frame.end_section(&section)?;
        }
        Ok(packet_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;

    impl ReplicaFactory for Empty {
        fn create(&mut self, message: &CreateMessage) -> Option<Vec<Box<dyn StateGroup>>> {
            (message.type_tag == 1).then(Vec::new)
        }
    }

    fn create(id: u64, type_tag: u16, dependency: Option<u64>) -> Vec<u8> {
        CreateMessage {
            replicable: ReplicableId::new(id),
            type_tag,
            dependency: dependency.map(ReplicableId::new),
            payload: vec![],
        }
        .encode()
    }

    #[test]
    fn dependency_must_exist() {
        let mut client = ReplicationClient::new(Empty, Limits::for_testing());
        let err = client
            .receive(MessageKind::ReplicationCreate, &create(2, 1, Some(1)))
            .unwrap_err();
        assert!(matches!(err, ReplicationError::MissingDependency { .. }));
        client
            .receive(MessageKind::ReplicationCreate, &create(1, 1, None))
            .unwrap();
        client
            .receive(MessageKind::ReplicationCreate, &create(2, 1, Some(1)))
            .unwrap();
        assert_eq!(client.len(), 2);
    }

    #[test]
    fn destroy_cascades_to_dependents() {
        let mut client = ReplicationClient::new(Empty, Limits::for_testing());
        client
            .receive(MessageKind::ReplicationCreate, &create(1, 1, None))
            .unwrap();
        client
            .receive(MessageKind::ReplicationCreate, &create(2, 1, Some(1)))
            .unwrap();
        let destroy = DestroyMessage {
            replicable: ReplicableId::new(1),
        }
        .encode();
        client
            .receive(MessageKind::ReplicationDestroy, &destroy)
            .unwrap();
        assert!(client.is_empty());
        assert_eq!(client.stats().destroys, 2);
    }

    #[test]
    fn unknown_type_tag_is_counted() {
        let mut client = ReplicationClient::new(Empty, Limits::for_testing());
        client
            .receive(MessageKind::ReplicationCreate, &create(1, 9, None))
            .unwrap();
        assert!(client.is_empty());
        assert_eq!(client.stats().creates_rejected, 1);
    }

    #[test]
    fn unknown_kind_byte() {
        let mut client = ReplicationClient::new(Empty, Limits::for_testing());
        assert!(matches!(
            client.receive_raw(99, &[]),
            Err(ReplicationError::Wire(_))
        ));
    }
}
