//! Raw records and line rows.

use crate::types::{BasicType, BitField, DataKind, Qualifiers, SymbolId, SymbolKind, UdtKind};

/// What a raw record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordTag
{
    /// A symbol of the given kind.
    Symbol(SymbolKind),
    /// A transparent qualifier record (`const`, `volatile`, `__unaligned`)
    /// wrapping its `type_ref`. Never materialized; its qualifiers are folded
    /// into whatever references it.
    Modifier,
}

/// Kind-specific attributes of a record. Unused fields stay at their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordAttrs
{
    pub data_kind: Option<DataKind>,
    pub udt_kind: Option<UdtKind>,
    pub basic_type: Option<BasicType>,
    /// Member or base-class offset in bytes.
    pub offset: Option<i64>,
    pub bit_field: Option<BitField>,
    /// Array element count.
    pub count: Option<u64>,
    /// Constant or enumerator value.
    pub value: Option<i64>,
    /// Forward declaration (no definition in this record).
    pub forward: bool,
    /// Pointer is a C++ reference.
    pub reference: bool,
    /// Base class is virtual.
    pub virtual_base: bool,
    /// Qualifiers carried by a `Modifier` record.
    pub qualifiers: Qualifiers,
}

/// One entry of the record table.
///
/// ```rust
/// use symscope_core::store::RawRecord;
/// use symscope_core::types::{SymbolId, SymbolKind};
///
/// let record = RawRecord::new(SymbolKind::Function).named("main").child_of(SymbolId::ROOT).at(0x1000, 0x40);
/// assert_eq!(record.name.as_deref(), Some("main"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord
{
    pub tag: RecordTag,
    pub name: Option<String>,
    /// Containing record; `None` only for the global scope and modifiers.
    pub parent: Option<SymbolId>,
    /// Type of the entity (data type, return type, pointee, element, typedef target...).
    pub type_ref: Option<SymbolId>,
    pub address: Option<u64>,
    /// Length in bytes (code range length, or type size for types).
    pub length: u64,
    pub attrs: RecordAttrs,
}

impl RawRecord
{
    /// Empty record of the given symbol kind.
    pub fn new(kind: SymbolKind) -> Self
    {
        Self {
            tag: RecordTag::Symbol(kind),
            name: None,
            parent: None,
            type_ref: None,
            address: None,
            length: 0,
            attrs: RecordAttrs::default(),
        }
    }

    /// Modifier record applying `qualifiers` to `target` (`None` means `void`).
    pub fn modifier(qualifiers: Qualifiers, target: Option<SymbolId>) -> Self
    {
        Self {
            tag: RecordTag::Modifier,
            type_ref: target,
            attrs: RecordAttrs {
                qualifiers,
                ..RecordAttrs::default()
            },
            ..Self::new(SymbolKind::Exe)
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self
    {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn child_of(mut self, parent: SymbolId) -> Self
    {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn typed(mut self, type_ref: SymbolId) -> Self
    {
        self.type_ref = Some(type_ref);
        self
    }

    #[must_use]
    pub fn at(mut self, address: u64, length: u64) -> Self
    {
        self.address = Some(address);
        self.length = length;
        self
    }

    #[must_use]
    pub fn sized(mut self, length: u64) -> Self
    {
        self.length = length;
        self
    }

    #[must_use]
    pub fn with_attrs(mut self, attrs: RecordAttrs) -> Self
    {
        self.attrs = attrs;
        self
    }

    /// Symbol kind, or `None` for modifier records.
    pub fn kind(&self) -> Option<SymbolKind>
    {
        match self.tag {
            RecordTag::Symbol(kind) => Some(kind),
            RecordTag::Modifier => None,
        }
    }

    pub fn is_modifier(&self) -> bool
    {
        self.tag == RecordTag::Modifier
    }
}

/// Index into the store's file-name table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub(crate) u32);

impl FileId
{
    pub const fn raw(self) -> u32
    {
        self.0
    }
}

/// One row of a compiland's line table, as recorded by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRow
{
    pub address: u64,
    /// Explicit length; `None` means "up to the next row".
    pub length: Option<u64>,
    pub file: FileId,
    pub line: u32,
    pub column: Option<u32>,
}
