//! Identifier newtypes shared by every replication layer.

use std::fmt;

/// A network peer: the server or one connected client.
///
/// Endpoints are assigned by the transport and remain stable for the
/// lifetime of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Endpoint(u64);

impl Endpoint {
    /// The authoritative server.
    pub const SERVER: Self = Self(0);

    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_server(self) -> bool {
        self.0 == Self::SERVER.0
    }
}

impl From<u64> for Endpoint {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep#{}", self.0)
    }
}

/// One-byte packet identifier, cycling per connection.
///
/// Used only to correlate a later delivery acknowledgment with the state
/// that was sent in the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PacketId(u8);

impl PacketId {
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// The following id, wrapping after 255.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl From<u8> for PacketId {
    fn from(id: u8) -> Self {
        Self(id)
    }
}

/// Identity of a replicable, stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplicableId(u64);

impl ReplicableId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for ReplicableId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ReplicableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rep#{}", self.0)
    }
}

/// Logical message counter of a collection diff, per (group, client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageId(u32);

impl MessageId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl From<u32> for MessageId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_id_wraps() {
        assert_eq!(PacketId::new(254).next(), PacketId::new(255));
        assert_eq!(PacketId::new(255).next(), PacketId::new(0));
    }

    #[test]
    fn message_id_wraps() {
        assert_eq!(MessageId::new(u32::MAX).next(), MessageId::new(0));
    }

    #[test]
    fn server_endpoint() {
        assert!(Endpoint::SERVER.is_server());
        assert!(!Endpoint::new(3).is_server());
        assert_eq!(Endpoint::new(3).to_string(), "ep#3");
    }

    #[test]
    fn conversions() {
        assert_eq!(ReplicableId::from(9).raw(), 9);
        assert_eq!(PacketId::from(7).raw(), 7);
        assert_eq!(Endpoint::from(5u64), Endpoint::new(5));
    }
}
