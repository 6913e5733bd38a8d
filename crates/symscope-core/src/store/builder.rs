//! Incremental construction of a [`RecordStore`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use super::{FileId, LineRow, RawRecord, RecordStore, StoreHeader, MAX_MODIFIER_DEPTH};
use crate::diagnostics::Diagnostic;
use crate::types::{Architecture, DebugSignature, SourceFormat, SymbolId, SymbolKind};

/// Builds a [`RecordStore`] one record at a time.
///
/// Identifiers are handed out in push order, so a parent must be pushed
/// before its children. Type references may point anywhere, including
/// forward into records pushed later.
///
/// ## Example
///
/// ```rust
/// use symscope_core::store::{RawRecord, StoreBuilder};
/// use symscope_core::types::SymbolKind;
///
/// let mut builder = StoreBuilder::new("demo.exe");
/// let unit = builder.push(RawRecord::new(SymbolKind::Compiland).named("main.obj").child_of(builder.root()));
/// builder.push(RawRecord::new(SymbolKind::Function).named("main").child_of(unit).at(0x1000, 0x20));
/// let store = builder.build();
/// assert_eq!(store.children(unit).len(), 1);
/// ```
#[derive(Debug)]
pub struct StoreBuilder
{
    header: StoreHeader,
    records: Vec<RawRecord>,
    files: Vec<Arc<str>>,
    file_ids: HashMap<Arc<str>, FileId>,
    lines: BTreeMap<SymbolId, Vec<LineRow>>,
    diagnostics: Vec<Diagnostic>,
}

impl StoreBuilder
{
    /// Start a store whose global scope is an `Exe` record called `name`.
    pub fn new(name: impl Into<String>) -> Self
    {
        let mut builder = Self::without_root(name);
        let root = RawRecord::new(SymbolKind::Exe).named(builder.header.name.clone());
        builder.records.push(root);
        builder
    }

    /// Start a store with no records at all.
    ///
    /// The first pushed record becomes the global scope and must be a
    /// parentless `Exe` record, otherwise Sessions refuse the store.
    pub fn without_root(name: impl Into<String>) -> Self
    {
        Self {
            header: StoreHeader {
                name: name.into(),
                format: SourceFormat::Memory,
                signature: None,
                architecture: None,
            },
            records: Vec::new(),
            files: Vec::new(),
            file_ids: HashMap::new(),
            lines: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: SourceFormat) -> Self
    {
        self.header.format = format;
        self
    }

    #[must_use]
    pub fn with_signature(mut self, signature: Option<DebugSignature>) -> Self
    {
        self.header.signature = signature;
        self
    }

    #[must_use]
    pub fn with_architecture(mut self, architecture: Option<Architecture>) -> Self
    {
        self.header.architecture = architecture;
        self
    }

    /// Identifier of the global scope.
    pub fn root(&self) -> SymbolId
    {
        SymbolId::ROOT
    }

    pub fn len(&self) -> usize
    {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.records.is_empty()
    }

    /// Append a record and return its identifier.
    pub fn push(&mut self, record: RawRecord) -> SymbolId
    {
        let id = SymbolId::new(u32::try_from(self.records.len()).unwrap_or(u32::MAX));
        self.records.push(record);
        id
    }

    pub fn record(&self, id: SymbolId) -> Option<&RawRecord>
    {
        self.records.get(id.index())
    }

    /// Mutable access to an already pushed record (used to patch type references).
    pub fn record_mut(&mut self, id: SymbolId) -> Option<&mut RawRecord>
    {
        self.records.get_mut(id.index())
    }

    /// Size of the type behind `type_ref`, looking through modifier records.
    ///
    /// Unknown or unresolved types have size 0.
    pub fn type_size(&self, type_ref: Option<SymbolId>) -> u64
    {
        let mut current = type_ref;
        for _ in 0..=MAX_MODIFIER_DEPTH {
            match current.and_then(|id| self.record(id)) {
                Some(record) if record.is_modifier() => current = record.type_ref,
                Some(record) => return record.length,
                None => return 0,
            }
        }
        0
    }

    /// Intern a file name.
    pub fn add_file(&mut self, name: &str) -> FileId
    {
        if let Some(id) = self.file_ids.get(name) {
            return *id;
        }
        let id = FileId(u32::try_from(self.files.len()).unwrap_or(u32::MAX));
        let name: Arc<str> = Arc::from(name);
        self.files.push(Arc::clone(&name));
        self.file_ids.insert(name, id);
        id
    }

    /// Append one line row to `compiland`'s table.
    pub fn add_line(&mut self, compiland: SymbolId, row: LineRow)
    {
        self.lines.entry(compiland).or_default().push(row);
    }

    /// Append line rows to `compiland`'s table.
    pub fn add_lines(&mut self, compiland: SymbolId, rows: impl IntoIterator<Item = LineRow>)
    {
        self.lines.entry(compiland).or_default().extend(rows);
    }

    /// Record a provider record that could not be converted.
    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic)
    {
        self.diagnostics.push(diagnostic);
    }

    /// Classify records, index children, and freeze the store.
    pub fn build(self) -> RecordStore
    {
        let mut malformed: HashMap<SymbolId, String> = HashMap::new();
        for (index, record) in self.records.iter().enumerate().skip(1) {
            let Some(id) = SymbolId::from_index(index) else {
                break;
            };
            if let Some(reason) = check_record(&self.records, &malformed, id, record) {
                malformed.insert(id, reason);
            }
        }

        let mut counts = vec![0u32; self.records.len()];
        for (index, record) in self.records.iter().enumerate().skip(1) {
            if let Some(parent) = listed_parent(index, record) {
                counts[parent.index()] += 1;
            }
        }

        let mut child_start = Vec::with_capacity(self.records.len() + 1);
        let mut total = 0u32;
        child_start.push(0);
        for count in &counts {
            total += count;
            child_start.push(total);
        }

        let mut cursor: Vec<u32> = child_start[..self.records.len()].to_vec();
        let mut child_list = vec![SymbolId::ROOT; total as usize];
        for (index, record) in self.records.iter().enumerate().skip(1) {
            let (Some(id), Some(parent)) = (SymbolId::from_index(index), listed_parent(index, record)) else {
                continue;
            };
            let slot = &mut cursor[parent.index()];
            child_list[*slot as usize] = id;
            *slot += 1;
        }

        debug!(
            store = %self.header.name,
            records = self.records.len(),
            malformed = malformed.len(),
            files = self.files.len(),
            compilands_with_lines = self.lines.len(),
            "built record store"
        );

        RecordStore {
            header: self.header,
            records: self.records,
            malformed,
            child_start,
            child_list,
            files: self.files,
            lines: self.lines,
            load_diagnostics: self.diagnostics,
        }
    }
}

/// Parent under which a record is listed: any in-range, preceding parent.
///
/// Malformed records are still listed when their parent link is usable, so
/// that walking the tree reports them instead of silently losing them.
fn listed_parent(index: usize, record: &RawRecord) -> Option<SymbolId>
{
    if record.is_modifier() {
        return None;
    }
    record.parent.filter(|parent| parent.index() < index)
}

fn check_record(
    records: &[RawRecord],
    malformed: &HashMap<SymbolId, String>,
    id: SymbolId,
    record: &RawRecord,
) -> Option<String>
{
    if let Some(kind) = record.kind() {
        if kind == SymbolKind::Exe {
            return Some("only the first record may be the global scope".to_string());
        }
        let Some(parent) = record.parent else {
            return Some("record has no parent".to_string());
        };
        if parent.index() >= records.len() {
            return Some(format!("parent {parent} does not exist"));
        }
        if parent >= id {
            return Some(format!("parent {parent} does not precede the record"));
        }
        if malformed.contains_key(&parent) {
            return Some(format!("parent {parent} is malformed"));
        }
        if records[parent.index()].is_modifier() {
            return Some(format!("parent {parent} is a modifier record"));
        }
    }

    let mut current = record.type_ref;
    let mut depth = 0;
    while let Some(target) = current {
        let Some(target_record) = records.get(target.index()) else {
            return Some(format!("type reference {target} does not exist"));
        };
        match target_record.kind() {
            None => {
                depth += 1;
                if depth > MAX_MODIFIER_DEPTH {
                    return Some(format!("modifier chain through {target} is cyclic or too deep"));
                }
                current = target_record.type_ref;
            }
            Some(kind) if kind.is_type() => break,
            Some(kind) => return Some(format!("type reference {target} is a {kind}, not a type")),
        }
    }

    None
}
