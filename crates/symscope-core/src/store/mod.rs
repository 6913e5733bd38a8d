//! # Record Store
//!
//! The flat, cross-referencing record table every backend produces.
//!
//! A store holds one [`RawRecord`] per debug-store entity, addressed by
//! [`SymbolId`], plus a file-name table and per-compiland line rows. Loaders
//! (PDB, DWARF) and tests build stores through [`StoreBuilder`]; the query
//! layer only ever reads them. Stores are immutable once built and shared
//! between Sessions through `Arc`.
//!
//! ## Record validity
//!
//! [`StoreBuilder::build`] classifies every record once:
//!
//! - a non-root symbol must name a parent that exists, precedes it, is valid,
//!   and is not a modifier;
//! - a type reference must land on a type record (possibly through a chain of
//!   modifiers of bounded depth).
//!
//! Records failing these checks are *malformed*. They stay in their parent's
//! child list when the parent link is usable, and the Session skips them with
//! a diagnostic when a query reaches them. The root record and the line tables
//! are structural and are checked by the Session instead.

mod builder;
mod record;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub use builder::StoreBuilder;
pub use record::{FileId, LineRow, RawRecord, RecordAttrs, RecordTag};

use crate::diagnostics::Diagnostic;
use crate::error::{DebugInfoError, Result};
use crate::types::{Architecture, DebugSignature, Qualifiers, SourceFormat, SymbolId, SymbolKind};

/// Longest modifier chain followed when resolving a type reference.
pub(crate) const MAX_MODIFIER_DEPTH: usize = 16;

/// Store-wide metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHeader
{
    /// Name of the store (PDB file name, image file name, or caller-chosen).
    pub name: String,
    pub format: SourceFormat,
    pub signature: Option<DebugSignature>,
    pub architecture: Option<Architecture>,
}

/// Immutable record table.
#[derive(Debug)]
pub struct RecordStore
{
    header: StoreHeader,
    records: Vec<RawRecord>,
    malformed: HashMap<SymbolId, String>,
    child_start: Vec<u32>,
    child_list: Vec<SymbolId>,
    files: Vec<Arc<str>>,
    lines: BTreeMap<SymbolId, Vec<LineRow>>,
    load_diagnostics: Vec<Diagnostic>,
}

impl RecordStore
{
    pub fn header(&self) -> &StoreHeader
    {
        &self.header
    }

    /// Number of records, malformed ones and modifiers included.
    pub fn len(&self) -> usize
    {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.records.is_empty()
    }

    /// Raw record behind `id`, regardless of validity.
    pub fn record(&self, id: SymbolId) -> Option<&RawRecord>
    {
        self.records.get(id.index())
    }

    /// Reason the record was classified as malformed, if it was.
    pub fn malformed_reason(&self, id: SymbolId) -> Option<&str>
    {
        self.malformed.get(&id).map(String::as_str)
    }

    /// Number of malformed records.
    pub fn malformed_count(&self) -> usize
    {
        self.malformed.len()
    }

    /// Children of `id` in stored order, malformed records included.
    pub fn children(&self, id: SymbolId) -> &[SymbolId]
    {
        let index = id.index();
        match (self.child_start.get(index), self.child_start.get(index + 1)) {
            (Some(&start), Some(&end)) => &self.child_list[start as usize..end as usize],
            _ => &[],
        }
    }

    /// All record identifiers in store order.
    pub fn ids(&self) -> impl Iterator<Item = SymbolId> + '_
    {
        (0..self.records.len()).filter_map(SymbolId::from_index)
    }

    /// File name behind a line row's [`FileId`].
    pub fn file(&self, id: FileId) -> Option<&Arc<str>>
    {
        self.files.get(id.0 as usize)
    }

    pub fn files(&self) -> &[Arc<str>]
    {
        &self.files
    }

    /// Raw line rows keyed by compiland.
    pub fn line_tables(&self) -> &BTreeMap<SymbolId, Vec<LineRow>>
    {
        &self.lines
    }

    /// Diagnostics raised while the provider's records were converted.
    pub fn load_diagnostics(&self) -> &[Diagnostic]
    {
        &self.load_diagnostics
    }

    /// Check the global-scope record.
    ///
    /// ## Errors
    ///
    /// [`DebugInfoError::CorruptStore`] if the store is empty or its first
    /// record is not a parentless `Exe` symbol.
    pub fn verify_root(&self) -> Result<()>
    {
        let root = self
            .records
            .first()
            .ok_or_else(|| DebugInfoError::CorruptStore("record table is empty".to_string()))?;
        if root.kind() != Some(SymbolKind::Exe) || root.parent.is_some() {
            return Err(DebugInfoError::CorruptStore(format!(
                "first record is {:?}, expected a parentless exe record",
                root.tag
            )));
        }
        Ok(())
    }

    /// Follow `type_ref` through modifier records.
    ///
    /// Returns the first non-modifier target (or `None` for `void`) and the
    /// union of the qualifiers crossed on the way. Chains were bounded when the
    /// store was built, so this never loops.
    pub(crate) fn strip_modifiers(&self, type_ref: Option<SymbolId>) -> (Option<SymbolId>, Qualifiers)
    {
        let mut qualifiers = Qualifiers::NONE;
        let mut current = type_ref;
        for _ in 0..=MAX_MODIFIER_DEPTH {
            match current.and_then(|id| self.record(id)) {
                Some(record) if record.is_modifier() => {
                    qualifiers = qualifiers.merge(record.attrs.qualifiers);
                    current = record.type_ref;
                }
                _ => break,
            }
        }
        (current, qualifiers)
    }
}
