//! Message kinds and the create/destroy message layouts.

use bitstream::{BitReader, BitWriter};

use crate::error::{WireError, WireResult};
use crate::ids::ReplicableId;
use crate::limits::Limits;

/// Kind of a replication message handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MessageKind {
    /// A replicable became visible to the client.
    ReplicationCreate = 1,
    /// As [`ReplicationCreate`](Self::ReplicationCreate), with a payload large
    /// enough that the transport should stream it.
    ReplicationCreateStreamed = 2,
    /// A replicable is no longer visible to the client.
    ReplicationDestroy = 3,
    /// A state-sync frame of group sections.
    StateSync = 4,
}

impl MessageKind {
    /// Parses a message kind from a raw byte.
    pub fn parse(kind: u8) -> WireResult<Self> {
        match kind {
            1 => Ok(Self::ReplicationCreate),
            2 => Ok(Self::ReplicationCreateStreamed),
            3 => Ok(Self::ReplicationDestroy),
            4 => Ok(Self::StateSync),
            _ => Err(WireError::UnknownMessageKind { kind }),
        }
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Lifecycle messages ride the reliable channel; state sync does not.
    #[must_use]
    pub const fn is_reliable(self) -> bool {
        !matches!(self, Self::StateSync)
    }
}

/// Tells a client to instantiate a replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMessage {
    pub replicable: ReplicableId,
    /// Application-defined type discriminator for the replica factory.
    pub type_tag: u16,
    /// Replicable that must already exist on the client.
    pub dependency: Option<ReplicableId>,
    /// Opaque initial state produced by the replicable.
    pub payload: Vec<u8>,
}

impl CreateMessage {
    /// Encodes the message into a fresh byte buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BitWriter::with_capacity(self.payload.len() + 16);
        writer.write_varu64(self.replicable.raw());
        writer.write_u16(self.type_tag);
        writer.write_bool(self.dependency.is_some());
        if let Some(dependency) = self.dependency {
            writer.write_varu64(dependency.raw());
        }
        writer.write_varu64(self.payload.len() as u64);
        for byte in &self.payload {
            writer.write_u8(*byte);
        }
        writer.finish()
    }

    pub fn decode(bytes: &[u8], limits: &Limits) -> WireResult<Self> {
        let mut reader = BitReader::new(bytes);
        let replicable = ReplicableId::new(reader.read_varu64()?);
        let type_tag = reader.read_u16()?;
        let dependency = if reader.read_bool()? {
            Some(ReplicableId::new(reader.read_varu64()?))
        } else {
            None
        };
        let len = usize::try_from(reader.read_varu64()?).unwrap_or(usize::MAX);
        if len > limits.max_create_payload_bytes {
            return Err(WireError::PayloadTooLarge {
                len,
                max: limits.max_create_payload_bytes,
            });
        }
        let available = reader.bits_remaining() / 8;
        if len > available {
            return Err(bitstream::BitError::EndOfBuffer {
                requested: len * 8,
                available: reader.bits_remaining(),
            }
            .into());
        }
        let mut payload = Vec::with_capacity(len);
        for _ in 0..len {
            payload.push(reader.read_u8()?);
        }
        ensure_consumed(&reader)?;
        Ok(Self {
            replicable,
            type_tag,
            dependency,
            payload,
        })
    }
}

/// Tells a client to drop a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyMessage {
    pub replicable: ReplicableId,
}

impl DestroyMessage {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BitWriter::with_capacity(4);
        writer.write_varu64(self.replicable.raw());
        writer.finish()
    }

    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut reader = BitReader::new(bytes);
        let replicable = ReplicableId::new(reader.read_varu64()?);
        ensure_consumed(&reader)?;
        Ok(Self { replicable })
    }
}

/// Anything short of a whole byte is padding.
fn ensure_consumed(reader: &BitReader<'_>) -> WireResult<()> {
    let bits = reader.bits_remaining();
    if bits >= 8 {
        return Err(WireError::TrailingData { bits });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parse_roundtrip() {
        for kind in [
            MessageKind::ReplicationCreate,
            MessageKind::ReplicationCreateStreamed,
            MessageKind::ReplicationDestroy,
            MessageKind::StateSync,
        ] {
            assert_eq!(MessageKind::parse(kind.raw()).unwrap(), kind);
        }
        assert_eq!(
            MessageKind::parse(0),
            Err(WireError::UnknownMessageKind { kind: 0 })
        );
    }

    #[test]
    fn only_state_sync_is_unreliable() {
        assert!(MessageKind::ReplicationCreate.is_reliable());
        assert!(MessageKind::ReplicationDestroy.is_reliable());
        assert!(!MessageKind::StateSync.is_reliable());
    }

    #[test]
    fn create_with_dependency() {
        let msg = CreateMessage {
            replicable: ReplicableId::new(900),
            type_tag: 7,
            dependency: Some(ReplicableId::new(3)),
            payload: vec![1, 2, 3, 250],
        };
        let bytes = msg.encode();
        assert_eq!(CreateMessage::decode(&bytes, &Limits::default()).unwrap(), msg);
    }

    #[test]
    fn create_payload_limit_is_enforced() {
        let msg = CreateMessage {
            replicable: ReplicableId::new(1),
            type_tag: 0,
            dependency: None,
            payload: vec![0; 5000],
        };
        let bytes = msg.encode();
        let err = CreateMessage::decode(&bytes, &Limits::for_testing()).unwrap_err();
        assert_eq!(err, WireError::PayloadTooLarge { len: 5000, max: 4096 });
    }

    #[test]
    fn truncated_create_fails() {
        let msg = CreateMessage {
            replicable: ReplicableId::new(1),
            type_tag: 0,
            dependency: None,
            payload: vec![9; 10],
        };
        let bytes = msg.encode();
        assert!(CreateMessage::decode(&bytes[..bytes.len() - 3], &Limits::default()).is_err());
    }

    #[test]
    fn destroy_rejects_trailing_bytes() {
        let mut bytes = DestroyMessage {
            replicable: ReplicableId::new(12),
        }
        .encode();
        assert_eq!(
            DestroyMessage::decode(&bytes).unwrap().replicable,
            ReplicableId::new(12)
        );
        bytes.push(0);
        assert!(matches!(
            DestroyMessage::decode(&bytes),
            Err(WireError::TrailingData { .. })
        ));
    }
}
