//! Bounded history of received message keys.

use std::collections::HashSet;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// A fixed-capacity ring of recently seen keys.
///
/// When full, inserting evicts the oldest key. A key evicted this way is
/// treated as new if it arrives again.
#[derive(Debug)]
pub struct ReceivedHistory<K> {
    entries: Vec<Option<K>>,
    index: HashSet<K>,
    head: usize,
    len: usize,
}

impl<K: Copy + Eq + Hash> ReceivedHistory<K> {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        let cap = capacity.get();
        let mut entries = Vec::with_capacity(cap);
        entries.resize_with(cap, || None);
        Self {
            entries,
            index: HashSet::with_capacity(cap),
            head: 0,
            len: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains(key)
    }

    /// Records `key`. Returns `false` if it is already in the history.
    pub fn insert(&mut self, key: K) -> bool {
        if self.index.contains(&key) {
            return false;
        }
        let cap = self.entries.len();
        if self.len < cap {
            let idx = (self.head + self.len) % cap;
            self.entries[idx] = Some(key);
            self.len += 1;
        } else {
            if let Some(evicted) = self.entries[self.head].replace(key) {
                self.index.remove(&evicted);
            }
            self.head = (self.head + 1) % cap;
        }
        self.index.insert(key);
        true
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|entry| *entry = None);
        self.index.clear();
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(cap: usize) -> ReceivedHistory<u32> {
        ReceivedHistory::new(NonZeroUsize::new(cap).unwrap())
    }

    #[test]
    fn duplicates_are_detected() {
        let mut h = history(4);
        assert!(h.insert(1));
        assert!(h.insert(2));
        assert!(!h.insert(1));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut h = history(2);
        assert!(h.insert(1));
        assert!(h.insert(2));
        assert!(h.insert(3));
        assert!(!h.contains(&1));
        assert!(h.contains(&2));
        assert!(h.contains(&3));
        assert!(h.insert(1));
        assert!(!h.contains(&2));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut h = history(3);
        h.insert(7);
        h.clear();
        assert!(h.is_empty());
        assert!(h.insert(7));
        assert_eq!(h.capacity(), 3);
    }
}
