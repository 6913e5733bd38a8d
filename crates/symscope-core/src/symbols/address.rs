//! Address lookup over symbol ranges.

use std::cmp::Ordering;

use tracing::debug;

use crate::interval::{Interval, IntervalIndex};
use crate::store::RecordStore;
use crate::types::{SymbolId, SymbolKind};

#[derive(Debug, Clone, Copy)]
struct Entry
{
    id: SymbolId,
    kind: SymbolKind,
    depth: u32,
    length: u64,
}

/// Sized ranges in an interval index plus zero-length points sorted by address.
#[derive(Debug)]
pub(crate) struct AddressIndex
{
    sized: IntervalIndex<Entry>,
    points: Vec<(u64, Entry)>,
}

impl AddressIndex
{
    pub fn build(store: &RecordStore) -> Self
    {
        let mut depth = vec![0u32; store.len()];
        let mut sized = Vec::new();
        let mut points = Vec::new();

        for id in store.ids().skip(1) {
            let Some(record) = store.record(id) else {
                continue;
            };
            let Some(kind) = record.kind() else {
                continue;
            };
            if store.malformed_reason(id).is_some() {
                continue;
            }
            // Valid records have a preceding parent, so its depth is already known.
            let own_depth = record.parent.map_or(0, |parent| depth[parent.index()] + 1);
            depth[id.index()] = own_depth;

            if kind.is_type() {
                continue;
            }
            let Some(start) = record.address else {
                continue;
            };
            let entry = Entry {
                id,
                kind,
                depth: own_depth,
                length: record.length,
            };
            if record.length == 0 {
                points.push((start, entry));
            } else {
                sized.push(Interval {
                    start,
                    end: start.saturating_add(record.length),
                    value: entry,
                });
            }
        }
        points.sort_by_key(|(address, entry)| (*address, entry.id));

        let sized = IntervalIndex::new(sized);
        debug!(ranges = sized.len(), points = points.len(), "built address index");
        Self { sized, points }
    }

    /// Innermost symbol at `address`, optionally restricted to one kind.
    pub fn lookup(&self, address: u64, kind: Option<SymbolKind>) -> Option<SymbolId>
    {
        let wanted = |entry: &Entry| kind.map_or(true, |kind| entry.kind == kind);

        let sized = self
            .sized
            .containing(address)
            .map(|interval| interval.value)
            .filter(wanted)
            .min_by(innermost_first);
        if let Some(entry) = sized {
            return Some(entry.id);
        }

        let start = self.points.partition_point(|(point, _)| *point < address);
        self.points[start..]
            .iter()
            .take_while(|(point, _)| *point == address)
            .map(|(_, entry)| *entry)
            .filter(wanted)
            .min_by(innermost_first)
            .map(|entry| entry.id)
    }
}

/// Smaller range first, then deeper in the tree, then lower id.
fn innermost_first(a: &Entry, b: &Entry) -> Ordering
{
    a.length
        .cmp(&b.length)
        .then_with(|| b.depth.cmp(&a.depth))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::store::{RawRecord, StoreBuilder};

    #[test]
    fn test_equal_ranges_prefer_the_deeper_symbol()
    {
        let mut builder = StoreBuilder::new("t");
        let root = builder.root();
        let func = builder.push(RawRecord::new(SymbolKind::Function).child_of(root).at(0x100, 0x10));
        let block = builder.push(RawRecord::new(SymbolKind::Block).child_of(func).at(0x100, 0x10));
        let index = AddressIndex::build(&builder.build());

        assert_eq!(index.lookup(0x105, None), Some(block));
        assert_eq!(index.lookup(0x105, Some(SymbolKind::Function)), Some(func));
    }

    #[test]
    fn test_zero_length_symbols_only_match_exactly()
    {
        let mut builder = StoreBuilder::new("t");
        let root = builder.root();
        let label = builder.push(RawRecord::new(SymbolKind::Label).child_of(root).at(0x200, 0));
        let index = AddressIndex::build(&builder.build());

        assert_eq!(index.lookup(0x200, None), Some(label));
        assert_eq!(index.lookup(0x201, None), None);
    }
}
