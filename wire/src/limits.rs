//! Configurable limits for bounded decoding.

/// Wire-level limits enforced while parsing inbound messages.
///
/// These bound the work a malformed or hostile frame can cause. They do
/// not affect what the server chooses to send.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Limits {
    /// Maximum number of group sections in one state-sync frame.
    pub max_sections: usize,

    /// Maximum create payload size in bytes.
    pub max_create_payload_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            // A full MTU of minimal sections.
            max_sections: 1024,
            max_create_payload_bytes: 1024 * 1024,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_sections: 16,
            max_create_payload_bytes: 4096,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_sections: usize::MAX,
            max_create_payload_bytes: usize::MAX,
        }
    }
}
