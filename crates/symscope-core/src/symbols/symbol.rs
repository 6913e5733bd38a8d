//! Materialized symbols.

use std::fmt;

use crate::demangle::make_symbol_name;
use crate::error::{DebugInfoError, Result};
use crate::store::{RecordAttrs, RecordStore};
use crate::types::{
    Address, AddressRange, BasicType, BitField, DataKind, Qualifiers, SymbolId, SymbolKind, SymbolName, UdtKind,
};

/// A node of the symbol table.
///
/// Symbols are materialized from the record store on first access and
/// memoized by the Session, which hands out the same `Arc<Symbol>` for every
/// later lookup of the same id. They are never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol
{
    id: SymbolId,
    kind: SymbolKind,
    name: Option<SymbolName>,
    address: Option<Address>,
    length: u64,
    parent: Option<SymbolId>,
    type_id: Option<SymbolId>,
    type_qualifiers: Qualifiers,
    attrs: RecordAttrs,
}

impl Symbol
{
    pub fn id(&self) -> SymbolId
    {
        self.id
    }

    pub fn kind(&self) -> SymbolKind
    {
        self.kind
    }

    /// Preferred name (demangled when possible).
    pub fn name(&self) -> Option<&str>
    {
        self.name.as_ref().map(SymbolName::display_name)
    }

    /// Name with its raw form and language.
    pub fn symbol_name(&self) -> Option<&SymbolName>
    {
        self.name.as_ref()
    }

    pub fn address(&self) -> Option<Address>
    {
        self.address
    }

    /// Length in bytes: the code range for scopes, the size for types and data.
    pub fn length(&self) -> u64
    {
        self.length
    }

    /// Address range, when the symbol has an address.
    pub fn range(&self) -> Option<AddressRange>
    {
        self.address.map(|start| AddressRange::new(start, self.length))
    }

    /// Containing symbol; `None` only for the global scope.
    pub fn parent(&self) -> Option<SymbolId>
    {
        self.parent
    }

    /// Type of this symbol with modifier records already stripped.
    pub fn type_id(&self) -> Option<SymbolId>
    {
        self.type_id
    }

    /// Qualifiers collected from the modifiers between this symbol and its type.
    pub fn type_qualifiers(&self) -> Qualifiers
    {
        self.type_qualifiers
    }

    pub fn data_kind(&self) -> Option<DataKind>
    {
        self.attrs.data_kind
    }

    pub fn udt_kind(&self) -> Option<UdtKind>
    {
        self.attrs.udt_kind
    }

    pub fn basic_type(&self) -> Option<BasicType>
    {
        self.attrs.basic_type
    }

    /// Member or base-class offset in bytes.
    pub fn offset(&self) -> Option<i64>
    {
        self.attrs.offset
    }

    pub fn bit_field(&self) -> Option<BitField>
    {
        self.attrs.bit_field
    }

    /// Element count of an array type.
    pub fn count(&self) -> Option<u64>
    {
        self.attrs.count
    }

    /// Value of a constant or enumerator.
    pub fn value(&self) -> Option<i64>
    {
        self.attrs.value
    }

    pub fn is_forward(&self) -> bool
    {
        self.attrs.forward
    }

    pub fn is_reference(&self) -> bool
    {
        self.attrs.reference
    }

    pub fn is_virtual_base(&self) -> bool
    {
        self.attrs.virtual_base
    }
}

impl fmt::Display for Symbol
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} {} {}", self.id, self.kind, self.name().unwrap_or("<anonymous>"))?;
        if let Some(range) = self.range() {
            write!(f, " {range}")?;
        }
        Ok(())
    }
}

/// Build a [`Symbol`] from the record behind `id`.
pub(crate) fn materialize(store: &RecordStore, id: SymbolId) -> Result<Symbol>
{
    let record = store
        .record(id)
        .ok_or_else(|| DebugInfoError::NotFound(format!("no symbol {id}")))?;
    let Some(kind) = record.kind() else {
        return Err(DebugInfoError::NotFound(format!("{id} is a modifier record, not a symbol")));
    };
    if let Some(reason) = store.malformed_reason(id) {
        return Err(DebugInfoError::MalformedRecord {
            id,
            reason: reason.to_string(),
        });
    }

    let (type_id, type_qualifiers) = store.strip_modifiers(record.type_ref);

    Ok(Symbol {
        id,
        kind,
        name: record.name.as_deref().map(make_symbol_name),
        address: record.address.map(Address::new),
        length: record.length,
        parent: record.parent,
        type_id,
        type_qualifiers,
        attrs: record.attrs.clone(),
    })
}
