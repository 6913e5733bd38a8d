//! Sorted name index backing name queries.

use regex::Regex;
use tracing::debug;

use crate::demangle::make_symbol_name;
use crate::store::RecordStore;
use crate::types::SymbolId;

/// `(key, id)` pairs sorted by key, then id.
///
/// Each valid named record contributes its stored name and, when different,
/// its demangled name. The case-folded variant lowercases every key.
#[derive(Debug)]
pub(crate) struct NameIndex
{
    keys: Vec<(Box<str>, SymbolId)>,
}

impl NameIndex
{
    pub fn build(store: &RecordStore, fold_case: bool) -> Self
    {
        let mut keys = Vec::new();
        for id in store.ids() {
            if store.malformed_reason(id).is_some() {
                continue;
            }
            let Some(record) = store.record(id) else {
                continue;
            };
            let Some(raw) = record.name.as_deref().filter(|_| !record.is_modifier()) else {
                continue;
            };

            let fold = |name: &str| -> Box<str> {
                if fold_case {
                    name.to_lowercase().into_boxed_str()
                } else {
                    name.into()
                }
            };

            keys.push((fold(raw), id));
            if let Some(demangled) = make_symbol_name(raw).demangled() {
                if demangled != raw {
                    keys.push((fold(demangled), id));
                }
            }
        }
        keys.sort_unstable();
        keys.dedup();

        debug!(keys = keys.len(), fold_case, "built name index");
        Self { keys }
    }

    /// Identifiers whose key equals `key`.
    pub fn exact<'a>(&'a self, key: &'a str) -> impl Iterator<Item = SymbolId> + 'a
    {
        let start = self.keys.partition_point(|(candidate, _)| &**candidate < key);
        self.keys[start..]
            .iter()
            .take_while(move |(candidate, _)| &**candidate == key)
            .map(|(_, id)| *id)
    }

    /// Identifiers whose key starts with `prefix`.
    pub fn prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = SymbolId> + 'a
    {
        let start = self.keys.partition_point(|(candidate, _)| &**candidate < prefix);
        self.keys[start..]
            .iter()
            .take_while(move |(candidate, _)| candidate.starts_with(prefix))
            .map(|(_, id)| *id)
    }

    /// Identifiers whose key matches `regex`.
    pub fn matching<'a>(&'a self, regex: &'a Regex) -> impl Iterator<Item = SymbolId> + 'a
    {
        self.keys
            .iter()
            .filter(move |(candidate, _)| regex.is_match(candidate))
            .map(|(_, id)| *id)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::store::{RawRecord, StoreBuilder};
    use crate::types::SymbolKind;

    fn store() -> RecordStore
    {
        let mut builder = StoreBuilder::new("t");
        let root = builder.root();
        for name in ["alpha", "alphabet", "Beta", "_ZN4core3fmt5write17h0123456789abcdefE"] {
            builder.push(RawRecord::new(SymbolKind::Function).named(name).child_of(root));
        }
        builder.build()
    }

    #[test]
    fn test_exact_and_prefix()
    {
        let index = NameIndex::build(&store(), false);
        assert_eq!(index.exact("alpha").collect::<Vec<_>>(), vec![SymbolId::new(1)]);
        assert_eq!(index.prefix("alpha").count(), 2);
        assert_eq!(index.exact("beta").count(), 0);
    }

    #[test]
    fn test_demangled_names_are_indexed()
    {
        let index = NameIndex::build(&store(), false);
        assert_eq!(index.exact("core::fmt::write").collect::<Vec<_>>(), vec![SymbolId::new(4)]);
    }

    #[test]
    fn test_folded_index_lowercases_keys()
    {
        let index = NameIndex::build(&store(), true);
        assert_eq!(index.exact("beta").collect::<Vec<_>>(), vec![SymbolId::new(3)]);
    }
}
