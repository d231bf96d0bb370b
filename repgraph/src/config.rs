//! Registry configuration.

use wire::Limits;

use crate::transport::DEFAULT_MTU_BYTES;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerConfig {
    /// Per-tick budget in bytes when neither the transport nor the client
    /// info supplies one.
    pub default_mtu_bytes: usize,
    /// Payload bits a section must have room for beyond its header before a
    /// group is asked to serialize.
    pub min_section_bits: usize,
    /// Create payloads larger than this are sent as streamed creates.
    pub stream_threshold_bytes: usize,
    /// After a group does not fit, keep offering the remaining budget to
    /// lower-priority groups.
    pub keep_trying_after_overflow: bool,
    /// Decoding limits used by the client side.
    pub limits: Limits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_mtu_bytes: DEFAULT_MTU_BYTES,
            min_section_bits: 8,
            stream_threshold_bytes: 1024,
            keep_trying_after_overflow: true,
            limits: Limits::default(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            default_mtu_bytes: 256,
            stream_threshold_bytes: 64,
            limits: Limits::for_testing(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_default_mtu_bytes(mut self, bytes: usize) -> Self {
        self.default_mtu_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_stream_threshold_bytes(mut self, bytes: usize) -> Self {
        self.stream_threshold_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_keep_trying_after_overflow(mut self, keep_trying: bool) -> Self {
        self.keep_trying_after_overflow = keep_trying;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_is_mtu() {
        assert_eq!(ServerConfig::default().default_mtu_bytes, 1199);
    }

    #[test]
    fn builders() {
        let config = ServerConfig::for_testing()
            .with_default_mtu_bytes(64)
            .with_keep_trying_after_overflow(false);
        assert_eq!(config.default_mtu_bytes, 64);
        assert!(!config.keep_trying_after_overflow);
    }
}
