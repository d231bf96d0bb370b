//! Collection diff records: computation, budgeted splitting and encoding.
//!
//! Layout:
//!
//! ```text
//! has_changes: bool
//! message_id: varu32
//! part: varu32
//! changed? bool  -> count: varu32, count x (id: varu32, delta: vars64)
//! removed? bool  -> count: varu32, count x (id: varu32)
//! added?   bool  -> count: varu32, count x (position: varu32, item)
//! ```
//!
//! Added items carry their position in the authoritative order. An item
//! that changed identity or moved relative to the other kept items is
//! removed and added again. Splitting keeps section order, so every removal
//! travels in the same or an earlier part than any addition, and additions
//! are spread over parts in ascending position. Applying the parts in part
//! order therefore reproduces the authoritative order exactly.

use std::collections::{BTreeMap, BTreeSet};

use bitstream::{varint_bits, vars64_bits, BitReader, BitWriter};
use wire::MessageId;

use crate::error::{GroupError, GroupResult};

/// One entry of a keyed collection.
pub trait SyncItem: Clone {
    /// Key of the item within its collection.
    fn item_id(&self) -> u32;
    /// Whether `other` is the same kind of thing, so that only the amount
    /// can differ. An item with a different identity is resent whole.
    fn same_identity(&self, other: &Self) -> bool;
    fn amount(&self) -> i64;
    fn write(&self, writer: &mut BitWriter) -> GroupResult<()>;
    fn read(reader: &mut BitReader<'_>) -> GroupResult<Self>
    where
        Self: Sized;
}

/// Changes between a client's last-known snapshot and the authoritative collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffRecord<I> {
    pub message_id: MessageId,
    /// Part number within a split message. Zero for the first send.
    pub part: u32,
    /// Item id to signed amount delta.
    pub changed: BTreeMap<u32, i64>,
    pub removed: Vec<u32>,
    /// Position in authoritative iteration order to item.
    pub added: BTreeMap<u32, I>,
}

impl<I> DiffRecord<I> {
    #[must_use]
    pub fn empty(message_id: MessageId, part: u32) -> Self {
        Self {
            message_id,
            part,
            changed: BTreeMap::new(),
            removed: Vec::new(),
            added: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty() || !self.removed.is_empty() || !self.added.is_empty()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.changed.len() + self.removed.len() + self.added.len()
    }
}

/// Diffs `items` against the `known` snapshot, both in iteration order.
#[must_use]
pub fn compute_diff<I: SyncItem>(
    message_id: MessageId,
    part: u32,
    items: &[I],
    known: &[I],
) -> DiffRecord<I> {
    let mut record = DiffRecord::empty(message_id, part);
    let known_at: BTreeMap<u32, (usize, &I)> = known
        .iter()
        .enumerate()
        .map(|(ordinal, item)| (item.item_id(), (ordinal, item)))
        .collect();
    let mut kept = BTreeSet::new();
    // Kept items must appear in the same relative order as in `known`.
    let mut last_kept = None;

    for (position, item) in items.iter().enumerate() {
        let id = item.item_id();
        match known_at.get(&id) {
            Some(&(ordinal, previous))
                if previous.same_identity(item) && last_kept.map_or(true, |last| ordinal > last) =>
            {
                last_kept = Some(ordinal);
                kept.insert(id);
                let delta = item.amount().wrapping_sub(previous.amount());
                if delta != 0 {
                    record.changed.insert(id, delta);
                }
            }
            _ => {
                record.added.insert(position as u32, item.clone());
            }
        }
    }

    record.removed = known
        .iter()
        .map(SyncItem::item_id)
        .filter(|id| !kept.contains(id))
        .collect();
    record
}

/// A record cut to a bit budget.
#[derive(Debug, Clone, PartialEq)]
pub struct Split<I> {
    /// The prefix that fits. Same message id and part as the input.
    pub sent: DiffRecord<I>,
    /// Everything after the cut. Its part must be renumbered before sending.
    pub remainder: Option<DiffRecord<I>>,
}

fn header_bits<I>(record: &DiffRecord<I>) -> usize {
    1 + varint_bits(u64::from(record.message_id.raw())) + varint_bits(u64::from(record.part)) + 3
}

fn item_bits<I: SyncItem>(item: &I) -> GroupResult<usize> {
    let mut scratch = BitWriter::new();
    item.write(&mut scratch)?;
    Ok(scratch.bits_written())
}

/// Greedy packer over the three sections. Once one entry does not fit,
/// every later entry goes to the remainder, preserving section order.
struct Packer {
    budget: usize,
    used: usize,
    section_entries: usize,
    section_bits: usize,
    full: bool,
}

impl Packer {
    fn new(budget: usize, header: usize) -> Self {
        Self {
            budget,
            used: header,
            section_entries: 0,
            section_bits: 0,
            full: false,
        }
    }

    fn try_add(&mut self, entry_bits: usize) -> bool {
        if self.full {
            return false;
        }
        let count = self.section_entries as u64 + 1;
        let total = self.used + varint_bits(count) + self.section_bits + entry_bits;
        if total > self.budget {
            self.full = true;
            return false;
        }
        self.section_entries += 1;
        self.section_bits += entry_bits;
        true
    }

    fn close_section(&mut self) {
        if self.section_entries > 0 {
            self.used += varint_bits(self.section_entries as u64) + self.section_bits;
        }
        self.section_entries = 0;
        self.section_bits = 0;
    }
}

/// Cuts `record` so the written prefix takes at most `available_bits`.
///
/// Returns `Ok(None)` if not even one entry fits.
pub fn split_to_fit<I: SyncItem>(
    record: &DiffRecord<I>,
    available_bits: usize,
) -> GroupResult<Option<Split<I>>> {
    let header = header_bits(record);
    if header > available_bits {
        return Ok(None);
    }
    let mut packer = Packer::new(available_bits, header);
    let mut sent = DiffRecord::empty(record.message_id, record.part);
    let mut rest = DiffRecord::empty(record.message_id, record.part);

    for (&id, &delta) in &record.changed {
        if packer.try_add(varint_bits(u64::from(id)) + vars64_bits(delta)) {
            sent.changed.insert(id, delta);
        } else {
            rest.changed.insert(id, delta);
        }
    }
    packer.close_section();

    for &id in &record.removed {
        if packer.try_add(varint_bits(u64::from(id))) {
            sent.removed.push(id);
        } else {
            rest.removed.push(id);
        }
    }
    packer.close_section();

    for (&position, item) in &record.added {
        let fits = !packer.full && packer.try_add(varint_bits(u64::from(position)) + item_bits(item)?);
        if fits {
            sent.added.insert(position, item.clone());
        } else {
            rest.added.insert(position, item.clone());
        }
    }

    if !sent.has_changes() && record.has_changes() {
        return Ok(None);
    }
    let remainder = rest.has_changes().then_some(rest);
    Ok(Some(Split { sent, remainder }))
}

/// Exact encoded size of `record`.
pub fn record_bits<I: SyncItem>(record: &DiffRecord<I>) -> GroupResult<usize> {
    if !record.has_changes() {
        return Ok(1);
    }
    let mut bits = header_bits(record);
    let mut section = |count: usize, entries: usize| {
        if count > 0 {
            bits += varint_bits(count as u64) + entries;
        }
    };
    section(
        record.changed.len(),
        record
            .changed
            .iter()
            .map(|(&id, &delta)| varint_bits(u64::from(id)) + vars64_bits(delta))
            .sum(),
    );
    section(
        record.removed.len(),
        record.removed.iter().map(|&id| varint_bits(u64::from(id))).sum(),
    );
    let mut added = 0;
    for (&position, item) in &record.added {
        added += varint_bits(u64::from(position)) + item_bits(item)?;
    }
    section(record.added.len(), added);
    Ok(bits)
}

/// Writes the single `has_changes = false` bit.
pub fn write_no_changes(writer: &mut BitWriter) {
    writer.write_bool(false);
}

pub fn write_record<I: SyncItem>(writer: &mut BitWriter, record: &DiffRecord<I>) -> GroupResult<()> {
    if !record.has_changes() {
        write_no_changes(writer);
        return Ok(());
    }
    writer.write_bool(true);
    writer.write_varu32(record.message_id.raw());
    writer.write_varu32(record.part);

    writer.write_bool(!record.changed.is_empty());
    if !record.changed.is_empty() {
        writer.write_varu32(record.changed.len() as u32);
        for (&id, &delta) in &record.changed {
            writer.write_varu32(id);
            writer.write_vars64(delta);
        }
    }

    writer.write_bool(!record.removed.is_empty());
    if !record.removed.is_empty() {
        writer.write_varu32(record.removed.len() as u32);
        for &id in &record.removed {
            writer.write_varu32(id);
        }
    }

    writer.write_bool(!record.added.is_empty());
    if !record.added.is_empty() {
        writer.write_varu32(record.added.len() as u32);
        for (&position, item) in &record.added {
            writer.write_varu32(position);
            item.write(writer)?;
        }
    }
    Ok(())
}

fn read_count(reader: &mut BitReader<'_>) -> GroupResult<usize> {
    if !reader.read_bool()? {
        return Ok(0);
    }
    let count = reader.read_varu32()? as usize;
    if count == 0 {
        return Err(GroupError::Malformed {
            what: "empty section",
        });
    }
    // Every entry takes at least one varint group.
    if count > reader.bits_remaining() / 8 {
        return Err(GroupError::Malformed {
            what: "section count",
        });
    }
    Ok(count)
}

/// Reads a record written by [`write_record`]. `None` means no changes.
pub fn read_record<I: SyncItem>(reader: &mut BitReader<'_>) -> GroupResult<Option<DiffRecord<I>>> {
    if !reader.read_bool()? {
        return Ok(None);
    }
    let message_id = MessageId::new(reader.read_varu32()?);
    let part = reader.read_varu32()?;
    let mut record = DiffRecord::empty(message_id, part);

    for _ in 0..read_count(reader)? {
        let id = reader.read_varu32()?;
        let delta = reader.read_vars64()?;
        if record.changed.insert(id, delta).is_some() {
            return Err(GroupError::Malformed {
                what: "duplicate changed id",
            });
        }
    }

    let removed = read_count(reader)?;
    record.removed.reserve(removed);
    for _ in 0..removed {
        record.removed.push(reader.read_varu32()?);
    }

    for _ in 0..read_count(reader)? {
        let position = reader.read_varu32()?;
        let item = I::read(reader)?;
        if record.added.insert(position, item).is_some() {
            return Err(GroupError::Malformed {
                what: "duplicate item position",
            });
        }
    }
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InventoryItem;

    fn item(id: u32, amount: i64) -> InventoryItem {
        InventoryItem::new(id, 1, 0, amount)
    }

    #[test]
    fn first_diff_adds_everything() {
        let items = [item(1, 5), item(2, 10), item(3, 2)];
        let record = compute_diff(MessageId::new(0), 0, &items, &[]);
        assert_eq!(record.added.len(), 3);
        assert!(record.changed.is_empty());
        assert!(record.removed.is_empty());
        assert_eq!(record.added.get(&1), Some(&item(2, 10)));
    }

    #[test]
    fn unchanged_collection_has_no_changes() {
        let items = [item(1, 5), item(2, 10)];
        let record = compute_diff(MessageId::new(1), 0, &items, &items);
        assert!(!record.has_changes());
    }

    #[test]
    fn amount_change_is_a_signed_delta() {
        let before = [item(1, 5), item(2, 10), item(3, 2)];
        let after = [item(1, 5), item(2, 7), item(3, 2)];
        let record = compute_diff(MessageId::new(1), 0, &after, &before);
        assert_eq!(record.changed, BTreeMap::from([(2, -3)]));
        assert!(record.removed.is_empty());
        assert!(record.added.is_empty());
    }

    #[test]
    fn identity_change_resends_item() {
        let before = [item(1, 5)];
        let after = [InventoryItem::new(1, 2, 0, 5)];
        let record = compute_diff(MessageId::new(1), 0, &after, &before);
        assert_eq!(record.removed, vec![1]);
        assert_eq!(record.added.get(&0), Some(&after[0]));
        assert!(record.changed.is_empty());
    }

    #[test]
    fn moved_item_is_removed_and_added() {
        let before = [item(1, 5), item(2, 6), item(3, 7)];
        let after = [item(2, 6), item(3, 8), item(1, 5)];
        let record = compute_diff(MessageId::new(1), 0, &after, &before);
        assert_eq!(record.changed, BTreeMap::from([(3, 1)]));
        assert_eq!(record.removed, vec![1]);
        assert_eq!(record.added, BTreeMap::from([(2, item(1, 5))]));
    }

    #[test]
    fn vanished_items_are_removed() {
        let before = [item(1, 5), item(2, 10)];
        let after = [item(2, 10)];
        let record = compute_diff(MessageId::new(1), 0, &after, &before);
        assert_eq!(record.removed, vec![1]);
        assert!(!record.changed.contains_key(&2));
    }

    #[test]
    fn encoded_size_matches_record_bits() {
        let before = [item(1, 5), item(2, 10), item(9, 1)];
        let after = [item(1, 500), item(2, 10), item(300, -4)];
        let record = compute_diff(MessageId::new(77), 3, &after, &before);
        let mut writer = BitWriter::new();
        write_record(&mut writer, &record).unwrap();
        assert_eq!(writer.bits_written(), record_bits(&record).unwrap());
        let bytes = writer.finish();
        let decoded: DiffRecord<InventoryItem> =
            read_record(&mut BitReader::new(&bytes)).unwrap().unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn empty_record_is_one_bit() {
        let record: DiffRecord<InventoryItem> = DiffRecord::empty(MessageId::new(4), 0);
        let mut writer = BitWriter::new();
        write_record(&mut writer, &record).unwrap();
        assert_eq!(writer.bits_written(), 1);
        let bytes = writer.finish();
        assert!(read_record::<InventoryItem>(&mut BitReader::new(&bytes))
            .unwrap()
            .is_none());
    }

    #[test]
    fn whole_record_fits_without_remainder() {
        let items = [item(1, 5), item(2, 10)];
        let record = compute_diff(MessageId::new(0), 0, &items, &[]);
        let split = split_to_fit(&record, 10_000).unwrap().unwrap();
        assert_eq!(split.sent, record);
        assert!(split.remainder.is_none());
    }

    #[test]
    fn split_respects_budget_and_partitions_entries() {
        let items: Vec<_> = (0..40).map(|i| item(i, i64::from(i) + 1)).collect();
        let record = compute_diff(MessageId::new(5), 0, &items, &[]);
        let full = record_bits(&record).unwrap();
        let budget = full / 3;

        let split = split_to_fit(&record, budget).unwrap().unwrap();
        assert!(record_bits(&split.sent).unwrap() <= budget);
        let rest = split.remainder.unwrap();
        assert_eq!(rest.message_id, record.message_id);
        assert_eq!(split.sent.added.len() + rest.added.len(), 40);
        assert!(split.sent.added.keys().max() < rest.added.keys().min());
    }

    #[test]
    fn nothing_fits() {
        let items = [item(1, 5)];
        let record = compute_diff(MessageId::new(0), 0, &items, &[]);
        assert!(split_to_fit(&record, 12).unwrap().is_none());
        assert!(split_to_fit(&record, 3).unwrap().is_none());
    }

    #[test]
    fn split_keeps_section_order() {
        let before: Vec<_> = (0..20).map(|i| item(i, 1)).collect();
        let mut after: Vec<_> = (0..10).map(|i| item(i, 2)).collect();
        after.push(item(100, 1));
        let record = compute_diff(MessageId::new(1), 0, &after, &before);
        assert_eq!(record.changed.len(), 10);
        assert_eq!(record.removed.len(), 10);

        let budget = header_bits(&record) + 8 + 10 * 16 + 4;
        let split = split_to_fit(&record, budget).unwrap().unwrap();
        assert_eq!(split.sent.changed.len(), 10);
        assert!(split.sent.added.is_empty());
        let rest = split.remainder.unwrap();
        assert_eq!(split.sent.removed.len() + rest.removed.len(), 10);
        assert_eq!(rest.added.len(), 1);
    }

    #[test]
    fn truncated_record_fails_cleanly() {
        let items: Vec<_> = (0..5).map(|i| item(i, 3)).collect();
        let record = compute_diff(MessageId::new(0), 0, &items, &[]);
        let mut writer = BitWriter::new();
        write_record(&mut writer, &record).unwrap();
        let bytes = writer.finish();
        let cut = &bytes[..bytes.len() / 2];
        assert!(read_record::<InventoryItem>(&mut BitReader::new(cut)).is_err());
    }
}
