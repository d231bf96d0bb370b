//! Reference-counted scheduling gate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub(crate) struct PauseGate {
    holders: Arc<AtomicUsize>,
}

impl PauseGate {
    pub(crate) fn acquire(&self) -> PauseToken {
        self.holders.fetch_add(1, Ordering::AcqRel);
        PauseToken {
            holders: Arc::clone(&self.holders),
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.depth() > 0
    }

    pub(crate) fn depth(&self) -> usize {
        self.holders.load(Ordering::Acquire)
    }
}

/// Holds replication paused until dropped.
///
/// Tokens nest: scheduling resumes when the last outstanding token is
/// dropped. Ack processing continues while paused.
#[derive(Debug)]
#[must_use = "replication resumes as soon as the token is dropped"]
pub struct PauseToken {
    holders: Arc<AtomicUsize>,
}

impl Drop for PauseToken {
    fn drop(&mut self) {
        self.holders.fetch_sub(1, Ordering::AcqRel);
    }
}
