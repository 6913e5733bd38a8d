//! # Line Mapper
//!
//! Address to source-line mapping and back.
//!
//! Each compiland's raw line rows are normalized once per Session, on the
//! first line query:
//!
//! 1. rows are sorted by address;
//! 2. rows without an explicit length extend to the next row, but never past
//!    the end of the function containing them, so padding between functions
//!    maps to no line (a trailing row without a length ends with its function,
//!    or is dropped outside any function);
//! 3. entries overlapping their successor are clipped and empty entries are
//!    dropped, with one diagnostic per compiland that needed it.
//!
//! Line tables keyed to something other than a valid compiland, or rows
//! naming a file that is not in the store's file table, are structural
//! corruption and abort the Session.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticStage};
use crate::error::{DebugInfoError, Result};
use crate::interval::{Interval, IntervalIndex};
use crate::session::Session;
use crate::store::LineRow;
use crate::types::{Address, AddressRange, SymbolId, SymbolKind};

/// A contiguous address range mapped to one source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry
{
    pub range: AddressRange,
    pub file: Arc<str>,
    pub line: u32,
    pub column: Option<u32>,
    pub compiland: SymbolId,
}

impl LineEntry
{
    pub fn address(&self) -> Address
    {
        self.range.start()
    }

    pub fn length(&self) -> u64
    {
        self.range.length()
    }

    pub fn contains(&self, address: Address) -> bool
    {
        self.range.contains(address)
    }
}

impl fmt::Display for LineEntry
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} {}:{}", self.range, self.file, self.line)?;
        if let Some(column) = self.column {
            write!(f, ":{column}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct EntryRef
{
    compiland: SymbolId,
    index: u32,
}

/// Normalized line tables of every compiland, with lookup indexes.
#[derive(Debug)]
pub(crate) struct LineIndex
{
    tables: HashMap<SymbolId, Vec<LineEntry>>,
    by_address: IntervalIndex<EntryRef>,
    by_line: HashMap<u32, Vec<EntryRef>>,
}

impl LineIndex
{
    pub fn build(session: &Session) -> Result<Self>
    {
        let store = session.store();
        let mut tables = HashMap::new();
        let mut intervals = Vec::new();
        let mut by_line: HashMap<u32, Vec<EntryRef>> = HashMap::new();

        for (&compiland, rows) in store.line_tables() {
            match store.record(compiland).and_then(|record| record.kind()) {
                Some(SymbolKind::Compiland) if store.malformed_reason(compiland).is_none() => {}
                Some(kind) => {
                    return Err(DebugInfoError::CorruptStore(format!(
                        "line table keyed to {compiland}, a {kind} rather than a valid compiland"
                    )));
                }
                None => {
                    return Err(DebugInfoError::CorruptStore(format!(
                        "line table keyed to missing record {compiland}"
                    )));
                }
            }

            let (entries, clipped) = normalize(session, compiland, rows)?;
            if clipped > 0 {
                session.emit(Diagnostic::new(
                    Some(compiland),
                    DiagnosticStage::LineTable,
                    format!("clipped {clipped} overlapping line entries"),
                ));
            }

            for (index, entry) in entries.iter().enumerate() {
                let entry_ref = EntryRef {
                    compiland,
                    index: u32::try_from(index).unwrap_or(u32::MAX),
                };
                intervals.push(Interval {
                    start: entry.range.start().value(),
                    end: entry.range.end().value(),
                    value: entry_ref,
                });
                by_line.entry(entry.line).or_default().push(entry_ref);
            }
            tables.insert(compiland, entries);
        }

        let by_address = IntervalIndex::new(intervals);
        debug!(compilands = tables.len(), entries = by_address.len(), "built line index");
        Ok(Self {
            tables,
            by_address,
            by_line,
        })
    }

    fn entry(&self, entry_ref: EntryRef) -> Option<&LineEntry>
    {
        self.tables.get(&entry_ref.compiland)?.get(entry_ref.index as usize)
    }
}

fn normalize(session: &Session, compiland: SymbolId, rows: &[LineRow]) -> Result<(Vec<LineEntry>, usize)>
{
    let store = session.store();
    let mut sorted: Vec<&LineRow> = rows.iter().collect();
    sorted.sort_by_key(|row| row.address);

    let mut entries: Vec<LineEntry> = Vec::with_capacity(sorted.len());
    let mut clipped = 0;
    for (position, row) in sorted.iter().enumerate() {
        let file = store.file(row.file).ok_or_else(|| {
            DebugInfoError::CorruptStore(format!(
                "line row of {compiland} names file #{} outside the file table",
                row.file.raw()
            ))
        })?;

        let next = sorted.get(position + 1).map(|next| next.address);
        let mut length = match row.length {
            Some(length) => length,
            None => {
                let to_next = next.map(|next| next.saturating_sub(row.address));
                let to_function_end = function_end(session, row.address).map(|end| end - row.address);
                match (to_next, to_function_end) {
                    (Some(to_next), Some(to_end)) => to_next.min(to_end),
                    (Some(length), None) | (None, Some(length)) => length,
                    (None, None) => 0,
                }
            }
        };
        if let Some(next) = next {
            let limit = next.saturating_sub(row.address);
            if length > limit {
                // Implied lengths never overlap; only explicit ones are reported.
                if row.length.is_some() {
                    clipped += 1;
                }
                length = limit;
            }
        }
        if length == 0 {
            continue;
        }

        entries.push(LineEntry {
            range: AddressRange::new(Address::new(row.address), length),
            file: Arc::clone(file),
            line: row.line,
            column: row.column,
            compiland,
        });
    }

    Ok((entries, clipped))
}

/// End of the innermost function enclosing `address`, if any.
fn function_end(session: &Session, address: u64) -> Option<u64>
{
    let id = session.address_index().lookup(address, Some(SymbolKind::Function))?;
    let record = session.store().record(id)?;
    let end = record.address?.checked_add(record.length)?;
    (end > address).then_some(end)
}

/// Whether a stored file name matches a user-supplied one.
///
/// Comparison ignores case and path separator style; `query` may also be a
/// trailing run of whole path components of `stored`.
pub(crate) fn file_matches(stored: &str, query: &str) -> bool
{
    let stored = normalize_path(stored);
    let query = normalize_path(query);
    if query.is_empty() {
        return false;
    }
    if stored == query {
        return true;
    }
    stored.len() > query.len()
        && stored.ends_with(&query)
        && stored.as_bytes()[stored.len() - query.len() - 1] == b'/'
}

fn normalize_path(path: &str) -> String
{
    path.trim().replace('\\', "/").to_lowercase()
}

/// Line-number view of one Session.
#[derive(Debug, Clone, Copy)]
pub struct LineMapper<'s>
{
    session: &'s Session,
}

impl<'s> LineMapper<'s>
{
    pub(crate) fn new(session: &'s Session) -> Self
    {
        Self { session }
    }

    /// Line entry covering `address`.
    ///
    /// When entries of different compilands overlap, the smallest wins, then
    /// the lower compiland id.
    ///
    /// ## Errors
    ///
    /// - [`DebugInfoError::NotFound`] if no entry covers the address
    /// - [`DebugInfoError::CorruptStore`] on structural line-table corruption
    pub fn resolve_line(&self, address: impl Into<Address>) -> Result<LineEntry>
    {
        let address = address.into();
        let index = self.session.line_index()?;
        index
            .by_address
            .containing(address.value())
            .filter_map(|interval| index.entry(interval.value))
            .min_by(|a, b| a.length().cmp(&b.length()).then_with(|| a.compiland.cmp(&b.compiland)))
            .cloned()
            .ok_or_else(|| DebugInfoError::NotFound(format!("no line information for {address}")))
    }

    /// Every address range mapped to `file`:`line`, sorted by address.
    ///
    /// ## Errors
    ///
    /// - [`DebugInfoError::NotFound`] if nothing maps to that line
    /// - [`DebugInfoError::CorruptStore`] on structural line-table corruption
    pub fn resolve_address(&self, file: &str, line: u32) -> Result<Vec<AddressRange>>
    {
        let index = self.session.line_index()?;
        let mut ranges: Vec<AddressRange> = index
            .by_line
            .get(&line)
            .into_iter()
            .flatten()
            .filter_map(|entry_ref| index.entry(*entry_ref))
            .filter(|entry| file_matches(&entry.file, file))
            .map(|entry| entry.range)
            .collect();
        ranges.sort_unstable();
        ranges.dedup();

        if ranges.is_empty() {
            return Err(DebugInfoError::NotFound(format!("no code for {file}:{line}")));
        }
        Ok(ranges)
    }

    /// Line entries of one compiland, sorted by address.
    ///
    /// ## Errors
    ///
    /// - [`DebugInfoError::WrongKind`] if `compiland` is not a compiland
    /// - [`DebugInfoError::CorruptStore`] on structural line-table corruption
    pub fn line_entries_for_compiland(&self, compiland: SymbolId) -> Result<Vec<LineEntry>>
    {
        self.check_compiland(compiland)?;
        let index = self.session.line_index()?;
        Ok(index.tables.get(&compiland).cloned().unwrap_or_default())
    }

    /// Distinct source files of one compiland, in order of first appearance by address.
    ///
    /// ## Errors
    ///
    /// Same as [`LineMapper::line_entries_for_compiland`].
    pub fn source_files(&self, compiland: SymbolId) -> Result<Vec<Arc<str>>>
    {
        self.check_compiland(compiland)?;
        let index = self.session.line_index()?;
        let mut seen = HashSet::new();
        Ok(index
            .tables
            .get(&compiland)
            .into_iter()
            .flatten()
            .filter(|entry| seen.insert(Arc::clone(&entry.file)))
            .map(|entry| Arc::clone(&entry.file))
            .collect())
    }

    fn check_compiland(&self, id: SymbolId) -> Result<()>
    {
        let symbol = self.session.symbol(id)?;
        if symbol.kind() != SymbolKind::Compiland {
            return Err(DebugInfoError::WrongKind {
                id,
                expected: "compiland",
                actual: symbol.kind(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_file_matching_ignores_case_and_separators()
    {
        assert!(file_matches(r"C:\src\Main.c", "main.c"));
        assert!(file_matches(r"C:\src\main.c", "src/main.c"));
        assert!(file_matches("/home/me/src/main.c", "/home/me/src/main.c"));
        assert!(file_matches(r"C:\SRC\MAIN.C", r"c:\src\main.c"));
    }

    #[test]
    fn test_file_matching_needs_whole_components()
    {
        assert!(!file_matches("/src/domain.c", "main.c"));
        assert!(!file_matches("/src/main.c", ""));
        assert!(!file_matches("main.c", "src/main.c"));
    }
}
