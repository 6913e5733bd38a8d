//! DWARF record loading through gimli.
//!
//! Every unit is walked once in DIE order. Each DIE that maps to a symbol
//! kind becomes one record; namespaces are transparent (they only prefix the
//! names below them) and unsupported tags are skipped with their subtree.
//! Type references are collected as section offsets and patched once every
//! unit has been read, so references across units and forward references
//! resolve alike.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use gimli::{
    constants, AttributeValue, ColumnType, DebuggingInformationEntry, DwAt, DwAte, Dwarf, EndianArcSlice,
    LineProgramHeader, Operation, Reader, RunTimeEndian, SectionId, Unit, UnitSectionOffset,
};
use tracing::{debug, warn};

use super::image::DwarfSections;
use crate::diagnostics::{Diagnostic, DiagnosticStage};
use crate::error::{map_dwarf_error, Result};
use crate::store::{FileId, LineRow, RawRecord, RecordAttrs, RecordStore, StoreBuilder};
use crate::types::{
    Architecture, BasicType, BitField, DataKind, DebugSignature, Qualifiers, SourceFormat, SymbolId, SymbolKind,
    UdtKind,
};

type OwnedReader = EndianArcSlice<RunTimeEndian>;
type OwnedDwarf = Dwarf<OwnedReader>;
type Die<'a, 'u> = DebuggingInformationEntry<'a, 'u, OwnedReader>;

const MAX_SIZE_DEPTH: usize = 16;

/// Loads a record store from DWARF sections.
#[derive(Debug)]
pub(crate) struct DwarfProvider
{
    name: String,
    format: SourceFormat,
    signature: Option<DebugSignature>,
    architecture: Architecture,
    bias: u64,
    sections: DwarfSections,
    publics: Vec<(String, u64)>,
}

impl DwarfProvider
{
    pub fn new(
        name: String,
        format: SourceFormat,
        signature: Option<DebugSignature>,
        architecture: Architecture,
        bias: u64,
        sections: DwarfSections,
    ) -> Self
    {
        Self {
            name,
            format,
            signature,
            architecture,
            bias,
            sections,
            publics: Vec::new(),
        }
    }

    /// Symbol-table entries added as public symbols under the global scope.
    #[must_use]
    pub fn with_publics(mut self, publics: Vec<(String, u64)>) -> Self
    {
        self.publics = publics;
        self
    }

    pub fn load(self) -> Result<RecordStore>
    {
        let dwarf = Dwarf::load(|section| Ok::<_, gimli::Error>(self.section_reader(section)))
            .map_err(|err| map_dwarf_error("loading DWARF sections", err))?;

        let builder = StoreBuilder::new(self.name.clone())
            .with_format(self.format)
            .with_signature(self.signature.clone())
            .with_architecture(Some(self.architecture));
        let mut loader = DwarfLoader::new(&dwarf, builder, self.bias);

        let mut headers = dwarf.units();
        while let Some(header) = headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
        {
            let offset = header.offset();
            // A damaged unit costs its own records, not the whole store.
            let loaded = dwarf
                .unit(header)
                .map_err(|err| map_dwarf_error("parsing compilation unit", err))
                .and_then(|unit| loader.load_unit(&unit));
            if let Err(err) = loaded {
                warn!(unit = ?offset, error = %err, "skipping unreadable DWARF unit");
                loader.builder.push_diagnostic(Diagnostic::new(
                    None,
                    DiagnosticStage::Load,
                    format!("skipped unit at {offset:?}: {err}"),
                ));
            }
        }

        loader.resolve_types();
        loader.add_publics(&self.publics);
        Ok(loader.builder.build())
    }

    fn section_reader(&self, id: SectionId) -> OwnedReader
    {
        let data = self
            .sections
            .sections
            .get(id.name())
            .cloned()
            .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
        EndianArcSlice::new(data, self.sections.endian)
    }
}

/// Position in the DIE tree while walking one unit.
#[derive(Debug, Clone)]
struct Scope
{
    depth: isize,
    record: Option<(SymbolId, SymbolKind)>,
    /// Name contributed to qualified names below this scope.
    prefix: Option<String>,
    skip: bool,
}

impl Scope
{
    fn record(id: SymbolId, kind: SymbolKind) -> Self
    {
        Self {
            depth: 0,
            record: Some((id, kind)),
            prefix: None,
            skip: false,
        }
    }

    fn named(mut self, prefix: Option<String>) -> Self
    {
        self.prefix = prefix;
        self
    }

    fn transparent(prefix: Option<String>) -> Self
    {
        Self {
            depth: 0,
            record: None,
            prefix,
            skip: false,
        }
    }

    fn skip() -> Self
    {
        Self {
            depth: 0,
            record: None,
            prefix: None,
            skip: true,
        }
    }
}

struct DwarfLoader<'d>
{
    dwarf: &'d OwnedDwarf,
    builder: StoreBuilder,
    bias: u64,
    offsets: HashMap<UnitSectionOffset<usize>, SymbolId>,
    pending: Vec<(SymbolId, UnitSectionOffset<usize>)>,
    /// Records whose size derives from their type once references resolve.
    derived_sizes: Vec<SymbolId>,
}

impl<'d> DwarfLoader<'d>
{
    fn new(dwarf: &'d OwnedDwarf, builder: StoreBuilder, bias: u64) -> Self
    {
        Self {
            dwarf,
            builder,
            bias,
            offsets: HashMap::new(),
            pending: Vec::new(),
            derived_sizes: Vec::new(),
        }
    }

    fn load_unit(&mut self, unit: &Unit<OwnedReader>) -> Result<()>
    {
        let mut cursor = unit.entries();
        let mut depth: isize = 0;
        let mut scopes: Vec<Scope> = Vec::new();
        let mut compiland = None;

        while let Some((delta, entry)) = cursor.next_dfs().map_err(|err| map_dwarf_error("traversing DIE tree", err))? {
            depth += delta;
            while scopes.last().is_some_and(|scope| scope.depth >= depth) {
                scopes.pop();
            }
            if scopes.last().is_some_and(|scope| scope.skip) {
                continue;
            }

            let mut scope = self.convert(unit, entry, &scopes)?;
            if let Some((id, SymbolKind::Compiland)) = scope.record {
                compiland.get_or_insert(id);
            }
            scope.depth = depth;
            scopes.push(scope);
        }

        if let Some(compiland) = compiland {
            self.load_lines(unit, compiland)?;
        }
        Ok(())
    }

    fn convert(&mut self, unit: &Unit<OwnedReader>, entry: &Die<'_, '_>, scopes: &[Scope]) -> Result<Scope>
    {
        let (parent, parent_kind) = scopes
            .iter()
            .rev()
            .find_map(|scope| scope.record)
            .unwrap_or((SymbolId::ROOT, SymbolKind::Exe));

        let scope = match entry.tag() {
            constants::DW_TAG_compile_unit | constants::DW_TAG_partial_unit => {
                let name = self.name(unit, entry)?.unwrap_or_else(|| "<unknown unit>".to_string());
                let record = RawRecord::new(SymbolKind::Compiland).named(name).child_of(SymbolId::ROOT);
                Scope::record(self.push(unit, entry, record), SymbolKind::Compiland)
            }
            constants::DW_TAG_namespace => {
                let name = self.name(unit, entry)?.unwrap_or_else(|| "(anonymous namespace)".to_string());
                Scope::transparent(Some(name))
            }
            constants::DW_TAG_subprogram => {
                if attr_flag(entry, constants::DW_AT_declaration)? {
                    return Ok(Scope::skip());
                }
                let mut record = RawRecord::new(SymbolKind::Function).child_of(parent);
                record.name = self.name(unit, entry)?.map(|name| qualify(scopes, &name));
                if let Some((start, length)) = self.pc_range(unit, entry)? {
                    record = record.at(start, length);
                }
                Scope::record(self.push(unit, entry, record), SymbolKind::Function)
            }
            constants::DW_TAG_lexical_block => {
                let mut record = RawRecord::new(SymbolKind::Block).child_of(parent);
                if let Some((start, length)) = self.pc_range(unit, entry)? {
                    record = record.at(start, length);
                }
                Scope::record(self.push(unit, entry, record), SymbolKind::Block)
            }
            constants::DW_TAG_inlined_subroutine => {
                let mut record = RawRecord::new(SymbolKind::InlineSite).child_of(parent);
                record.name = self.name(unit, entry)?;
                if let Some((start, length)) = self.pc_range(unit, entry)? {
                    record = record.at(start, length);
                }
                Scope::record(self.push(unit, entry, record), SymbolKind::InlineSite)
            }
            constants::DW_TAG_label => {
                let mut record = RawRecord::new(SymbolKind::Label).child_of(parent);
                record.name = self.name(unit, entry)?;
                if let Some(address) = self.low_pc(unit, entry)? {
                    record = record.at(address, 0);
                }
                Scope::record(self.push(unit, entry, record), SymbolKind::Label)
            }
            constants::DW_TAG_variable => self.variable(unit, entry, scopes, parent, parent_kind)?,
            constants::DW_TAG_formal_parameter => match parent_kind {
                SymbolKind::FunctionType => {
                    let record = RawRecord::new(SymbolKind::FunctionArgType).child_of(parent);
                    let id = self.push(unit, entry, record);
                    self.typed(unit, entry, id)?;
                    Scope::record(id, SymbolKind::FunctionArgType)
                }
                SymbolKind::Function | SymbolKind::InlineSite => {
                    let mut record = RawRecord::new(SymbolKind::Data).child_of(parent).with_attrs(RecordAttrs {
                        data_kind: Some(DataKind::Param),
                        ..RecordAttrs::default()
                    });
                    record.name = self.name(unit, entry)?;
                    let id = self.push(unit, entry, record);
                    self.typed(unit, entry, id)?;
                    Scope::record(id, SymbolKind::Data)
                }
                _ => Scope::skip(),
            },
            constants::DW_TAG_member => self.member(unit, entry, parent)?,
            constants::DW_TAG_inheritance => {
                let virtuality = entry
                    .attr_value(constants::DW_AT_virtuality)
                    .map_err(|err| map_dwarf_error("reading DW_AT_virtuality", err))?;
                let record = RawRecord::new(SymbolKind::BaseClass).child_of(parent).with_attrs(RecordAttrs {
                    offset: Some(self.member_offset(unit, entry)?.unwrap_or(0)),
                    virtual_base: matches!(
                        virtuality,
                        Some(AttributeValue::Virtuality(v)) if v != constants::DW_VIRTUALITY_none
                    ),
                    ..RecordAttrs::default()
                });
                let id = self.push(unit, entry, record);
                self.typed(unit, entry, id)?;
                Scope::record(id, SymbolKind::BaseClass)
            }
            constants::DW_TAG_base_type | constants::DW_TAG_unspecified_type => {
                let size = attr_udata(entry, constants::DW_AT_byte_size)?.unwrap_or(0);
                let basic = match entry
                    .attr_value(constants::DW_AT_encoding)
                    .map_err(|err| map_dwarf_error("reading DW_AT_encoding", err))?
                {
                    Some(AttributeValue::Encoding(encoding)) => basic_type(encoding, size),
                    _ => BasicType::Void,
                };
                let mut record = RawRecord::new(SymbolKind::BaseType)
                    .child_of(SymbolId::ROOT)
                    .sized(size)
                    .with_attrs(RecordAttrs {
                        basic_type: Some(basic),
                        ..RecordAttrs::default()
                    });
                record.name = self.name(unit, entry)?;
                Scope::record(self.push(unit, entry, record), SymbolKind::BaseType)
            }
            constants::DW_TAG_pointer_type
            | constants::DW_TAG_reference_type
            | constants::DW_TAG_rvalue_reference_type
            | constants::DW_TAG_ptr_to_member_type => {
                let size = attr_udata(entry, constants::DW_AT_byte_size)?
                    .unwrap_or_else(|| u64::from(unit.encoding().address_size));
                let mut record = RawRecord::new(SymbolKind::PointerType)
                    .child_of(SymbolId::ROOT)
                    .sized(size)
                    .with_attrs(RecordAttrs {
                        reference: matches!(
                            entry.tag(),
                            constants::DW_TAG_reference_type | constants::DW_TAG_rvalue_reference_type
                        ),
                        ..RecordAttrs::default()
                    });
                record.name = self.name(unit, entry)?;
                let id = self.push(unit, entry, record);
                self.typed(unit, entry, id)?;
                Scope::record(id, SymbolKind::PointerType)
            }
            constants::DW_TAG_array_type => {
                let size = attr_udata(entry, constants::DW_AT_byte_size)?;
                let mut record = RawRecord::new(SymbolKind::ArrayType)
                    .child_of(SymbolId::ROOT)
                    .sized(size.unwrap_or(0));
                record.name = self.name(unit, entry)?;
                let id = self.push(unit, entry, record);
                if size.is_none() {
                    self.derived_sizes.push(id);
                }
                self.typed(unit, entry, id)?;
                Scope::record(id, SymbolKind::ArrayType)
            }
            constants::DW_TAG_subrange_type => {
                if parent_kind == SymbolKind::ArrayType {
                    let count = subrange_count(entry)?;
                    if let Some(record) = self.builder.record_mut(parent) {
                        record.attrs.count = match (record.attrs.count, count) {
                            (None, count) => count,
                            (Some(outer), Some(inner)) => Some(outer.saturating_mul(inner)),
                            (Some(_), None) => None,
                        };
                    }
                }
                Scope::skip()
            }
            constants::DW_TAG_structure_type
            | constants::DW_TAG_class_type
            | constants::DW_TAG_union_type
            | constants::DW_TAG_interface_type => {
                let udt_kind = match entry.tag() {
                    constants::DW_TAG_class_type => UdtKind::Class,
                    constants::DW_TAG_union_type => UdtKind::Union,
                    constants::DW_TAG_interface_type => UdtKind::Interface,
                    _ => UdtKind::Struct,
                };
                let name = self.name(unit, entry)?.map(|name| qualify(scopes, &name));
                let mut record = RawRecord::new(SymbolKind::Udt)
                    .child_of(SymbolId::ROOT)
                    .sized(attr_udata(entry, constants::DW_AT_byte_size)?.unwrap_or(0))
                    .with_attrs(RecordAttrs {
                        udt_kind: Some(udt_kind),
                        forward: attr_flag(entry, constants::DW_AT_declaration)?,
                        ..RecordAttrs::default()
                    });
                record.name = name.clone();
                Scope::record(self.push(unit, entry, record), SymbolKind::Udt).named(name)
            }
            constants::DW_TAG_enumeration_type => {
                let name = self.name(unit, entry)?.map(|name| qualify(scopes, &name));
                let size = attr_udata(entry, constants::DW_AT_byte_size)?;
                let mut record = RawRecord::new(SymbolKind::Enum)
                    .child_of(SymbolId::ROOT)
                    .sized(size.unwrap_or(0))
                    .with_attrs(RecordAttrs {
                        forward: attr_flag(entry, constants::DW_AT_declaration)?,
                        ..RecordAttrs::default()
                    });
                record.name = name.clone();
                let id = self.push(unit, entry, record);
                if size.is_none() {
                    self.derived_sizes.push(id);
                }
                self.typed(unit, entry, id)?;
                Scope::record(id, SymbolKind::Enum).named(name)
            }
            constants::DW_TAG_enumerator => {
                let value = attr_sdata(entry, constants::DW_AT_const_value)?;
                let mut record = RawRecord::new(SymbolKind::Data).child_of(parent).with_attrs(RecordAttrs {
                    data_kind: Some(DataKind::Constant),
                    value,
                    ..RecordAttrs::default()
                });
                record.name = self.name(unit, entry)?;
                Scope::record(self.push(unit, entry, record), SymbolKind::Data)
            }
            constants::DW_TAG_typedef => {
                let mut record = RawRecord::new(SymbolKind::Typedef).child_of(SymbolId::ROOT);
                record.name = self.name(unit, entry)?.map(|name| qualify(scopes, &name));
                let id = self.push(unit, entry, record);
                self.derived_sizes.push(id);
                self.typed(unit, entry, id)?;
                Scope::record(id, SymbolKind::Typedef)
            }
            constants::DW_TAG_subroutine_type => {
                let record = RawRecord::new(SymbolKind::FunctionType).child_of(SymbolId::ROOT);
                let id = self.push(unit, entry, record);
                self.typed(unit, entry, id)?;
                Scope::record(id, SymbolKind::FunctionType)
            }
            constants::DW_TAG_const_type
            | constants::DW_TAG_volatile_type
            | constants::DW_TAG_restrict_type
            | constants::DW_TAG_atomic_type => {
                let qualifiers = match entry.tag() {
                    constants::DW_TAG_const_type => Qualifiers::CONST,
                    constants::DW_TAG_volatile_type => Qualifiers {
                        is_volatile: true,
                        ..Qualifiers::NONE
                    },
                    _ => Qualifiers::NONE,
                };
                let id = self.push(unit, entry, RawRecord::modifier(qualifiers, None));
                self.typed(unit, entry, id)?;
                Scope::skip()
            }
            _ => Scope::skip(),
        };
        Ok(scope)
    }

    fn variable(
        &mut self,
        unit: &Unit<OwnedReader>,
        entry: &Die<'_, '_>,
        scopes: &[Scope],
        parent: SymbolId,
        parent_kind: SymbolKind,
    ) -> Result<Scope>
    {
        if attr_flag(entry, constants::DW_AT_declaration)? && parent_kind != SymbolKind::Udt {
            return Ok(Scope::skip());
        }

        let address = self.location_address(unit, entry)?;
        let value = attr_sdata(entry, constants::DW_AT_const_value)?;
        let in_code = matches!(parent_kind, SymbolKind::Function | SymbolKind::Block | SymbolKind::InlineSite);
        let data_kind = if parent_kind == SymbolKind::Udt {
            DataKind::StaticMember
        } else if value.is_some() && address.is_none() {
            DataKind::Constant
        } else if in_code {
            if address.is_some() {
                DataKind::StaticLocal
            } else {
                DataKind::Local
            }
        } else if attr_flag(entry, constants::DW_AT_external)? {
            DataKind::Global
        } else {
            DataKind::FileStatic
        };

        let mut record = RawRecord::new(SymbolKind::Data).child_of(parent).with_attrs(RecordAttrs {
            data_kind: Some(data_kind),
            value,
            ..RecordAttrs::default()
        });
        record.name = self.name(unit, entry)?.map(|name| if in_code { name } else { qualify(scopes, &name) });
        if let Some(address) = address {
            record = record.at(address, 0);
        }
        let id = self.push(unit, entry, record);
        if address.is_some() {
            self.derived_sizes.push(id);
        }
        self.typed(unit, entry, id)?;
        Ok(Scope::record(id, SymbolKind::Data))
    }

    fn member(&mut self, unit: &Unit<OwnedReader>, entry: &Die<'_, '_>, parent: SymbolId) -> Result<Scope>
    {
        let mut offset = self.member_offset(unit, entry)?;
        let mut bit_field = None;
        if let Some(width) = attr_udata(entry, constants::DW_AT_bit_size)? {
            let byte_size = attr_udata(entry, constants::DW_AT_byte_size)?;
            if let Some(bit_offset) = attr_udata(entry, constants::DW_AT_data_bit_offset)? {
                let unit_bits = byte_size.map_or(8, |size| size.max(1) * 8);
                offset = Some(i64::try_from(bit_offset / unit_bits * (unit_bits / 8)).unwrap_or(i64::MAX));
                bit_field = Some((bit_offset % unit_bits, width));
            } else if let Some(bit_offset) = attr_udata(entry, constants::DW_AT_bit_offset)? {
                // Counted from the most significant bit of the storage unit.
                let unit_bits = byte_size.unwrap_or(4) * 8;
                bit_field = Some((unit_bits.saturating_sub(bit_offset).saturating_sub(width), width));
            }
        }

        let mut record = RawRecord::new(SymbolKind::Data).child_of(parent).with_attrs(RecordAttrs {
            data_kind: Some(DataKind::Member),
            offset: Some(offset.unwrap_or(0)),
            bit_field: bit_field.map(|(position, width)| BitField {
                position: u32::try_from(position).unwrap_or(u32::MAX),
                width: u32::try_from(width).unwrap_or(u32::MAX),
            }),
            ..RecordAttrs::default()
        });
        record.name = self.name(unit, entry)?;
        let id = self.push(unit, entry, record);
        self.typed(unit, entry, id)?;
        Ok(Scope::record(id, SymbolKind::Data))
    }

    fn push(&mut self, unit: &Unit<OwnedReader>, entry: &Die<'_, '_>, record: RawRecord) -> SymbolId
    {
        let id = self.builder.push(record);
        self.offsets.insert(entry.offset().to_unit_section_offset(unit), id);
        id
    }

    /// Queue `id`'s `DW_AT_type` for resolution once every unit is loaded.
    fn typed(&mut self, unit: &Unit<OwnedReader>, entry: &Die<'_, '_>, id: SymbolId) -> Result<()>
    {
        let target = match entry
            .attr_value(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading DW_AT_type", err))?
        {
            Some(AttributeValue::UnitRef(offset)) => offset.to_unit_section_offset(unit),
            Some(AttributeValue::DebugInfoRef(offset)) => UnitSectionOffset::from(offset),
            Some(other) => {
                self.builder.push_diagnostic(Diagnostic::new(
                    Some(id),
                    DiagnosticStage::Load,
                    format!("unsupported type reference form {other:?}"),
                ));
                return Ok(());
            }
            None => return Ok(()),
        };
        self.pending.push((id, target));
        Ok(())
    }

    fn resolve_types(&mut self)
    {
        let pending = std::mem::take(&mut self.pending);
        let mut unresolved = 0usize;
        for (id, target) in pending {
            match self.offsets.get(&target).copied() {
                Some(type_id) => {
                    if let Some(record) = self.builder.record_mut(id) {
                        record.type_ref = Some(type_id);
                    }
                }
                None => {
                    unresolved += 1;
                    self.builder.push_diagnostic(Diagnostic::new(
                        Some(id),
                        DiagnosticStage::Load,
                        format!("type reference to unsupported or missing DIE {target:?}"),
                    ));
                }
            }
        }

        for id in std::mem::take(&mut self.derived_sizes) {
            let size = derived_size(&self.builder, id, 0);
            if let Some(record) = self.builder.record_mut(id) {
                if record.length == 0 {
                    record.length = size;
                }
            }
        }
        debug!(records = self.builder.len(), unresolved, "resolved DWARF type references");
    }

    fn add_publics(&mut self, publics: &[(String, u64)])
    {
        let root = self.builder.root();
        for (name, address) in publics {
            self.builder
                .push(RawRecord::new(SymbolKind::PublicSymbol).named(name.clone()).child_of(root).at(*address, 0));
        }
    }

    fn load_lines(&mut self, unit: &Unit<OwnedReader>, compiland: SymbolId) -> Result<()>
    {
        let Some(program) = unit.line_program.clone() else {
            return Ok(());
        };

        let mut files: HashMap<u64, FileId> = HashMap::new();
        let mut open: Option<(u64, FileId, u32, Option<u32>)> = None;
        let mut rows = program.rows();
        while let Some((header, row)) = rows
            .next_row()
            .map_err(|err| map_dwarf_error("reading line program", err))?
        {
            let address = row.address();
            if let Some((start, file, line, column)) = open.take() {
                if address > start {
                    self.builder.add_line(
                        compiland,
                        LineRow {
                            address: start.saturating_sub(self.bias),
                            length: Some(address - start),
                            file,
                            line,
                            column,
                        },
                    );
                }
            }
            if row.end_sequence() {
                continue;
            }
            let Some(line) = row.line() else {
                continue;
            };

            let file = match files.get(&row.file_index()) {
                Some(file) => *file,
                None => {
                    let name = self.file_name(unit, header, row.file_index())?;
                    let file = self.builder.add_file(&name);
                    files.insert(row.file_index(), file);
                    file
                }
            };
            let column = match row.column() {
                ColumnType::LeftEdge => None,
                ColumnType::Column(column) => u32::try_from(column.get()).ok(),
            };
            open = Some((address, file, u32::try_from(line.get()).unwrap_or(u32::MAX), column));
        }
        Ok(())
    }

    fn file_name(&self, unit: &Unit<OwnedReader>, header: &LineProgramHeader<OwnedReader>, index: u64) -> Result<String>
    {
        let Some(file) = header.file(index) else {
            return Ok(format!("<file {index}>"));
        };
        let mut path = PathBuf::new();
        if let Some(comp_dir) = &unit.comp_dir {
            let comp_dir = comp_dir
                .to_string_lossy()
                .map_err(|err| map_dwarf_error("decoding DW_AT_comp_dir", err))?;
            path.push(comp_dir.as_ref());
        }
        if let Some(directory) = file.directory(header) {
            path.push(self.attr_to_string(unit, directory)?);
        }
        path.push(self.attr_to_string(unit, file.path_name())?);
        Ok(path.to_string_lossy().into_owned())
    }

    /// `DW_AT_name`, falling back to the declaration or abstract origin the DIE refers to.
    fn name(&self, unit: &Unit<OwnedReader>, entry: &Die<'_, '_>) -> Result<Option<String>>
    {
        if let Some(value) = entry
            .attr_value(constants::DW_AT_name)
            .map_err(|err| map_dwarf_error("reading DW_AT_name", err))?
        {
            return Ok(Some(self.attr_to_string(unit, value)?));
        }
        for origin in [constants::DW_AT_specification, constants::DW_AT_abstract_origin] {
            if let Some(AttributeValue::UnitRef(offset)) = entry
                .attr_value(origin)
                .map_err(|err| map_dwarf_error("reading DIE origin", err))?
            {
                let target = unit
                    .entry(offset)
                    .map_err(|err| map_dwarf_error("resolving DIE origin", err))?;
                if let Some(value) = target
                    .attr_value(constants::DW_AT_name)
                    .map_err(|err| map_dwarf_error("reading origin DW_AT_name", err))?
                {
                    return Ok(Some(self.attr_to_string(unit, value)?));
                }
            }
        }
        Ok(None)
    }

    fn attr_to_string(&self, unit: &Unit<OwnedReader>, value: AttributeValue<OwnedReader>) -> Result<String>
    {
        let reader = self
            .dwarf
            .attr_string(unit, value)
            .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
        let owned = match reader.to_string() {
            Ok(cow) => cow.into_owned(),
            Err(_) => reader
                .to_string_lossy()
                .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
                .into_owned(),
        };
        Ok(owned)
    }

    fn low_pc(&self, unit: &Unit<OwnedReader>, entry: &Die<'_, '_>) -> Result<Option<u64>>
    {
        let Some(value) = entry
            .attr_value(constants::DW_AT_low_pc)
            .map_err(|err| map_dwarf_error("reading DW_AT_low_pc", err))?
        else {
            return Ok(None);
        };
        let address = self
            .dwarf
            .attr_address(unit, value)
            .map_err(|err| map_dwarf_error("resolving DW_AT_low_pc", err))?;
        Ok(address.map(|address| address.saturating_sub(self.bias)))
    }

    /// Covering range of a DIE's code as `(start, length)`, bias removed.
    fn pc_range(&self, unit: &Unit<OwnedReader>, entry: &Die<'_, '_>) -> Result<Option<(u64, u64)>>
    {
        let mut ranges = self
            .dwarf
            .die_ranges(unit, entry)
            .map_err(|err| map_dwarf_error("reading DIE ranges", err))?;
        let mut bounds: Option<(u64, u64)> = None;
        while let Some(range) = ranges.next().map_err(|err| map_dwarf_error("iterating DIE ranges", err))? {
            if range.end <= range.begin {
                continue;
            }
            bounds = Some(match bounds {
                Some((start, end)) => (start.min(range.begin), end.max(range.end)),
                None => (range.begin, range.end),
            });
        }
        Ok(bounds.map(|(start, end)| (start.saturating_sub(self.bias), end - start)))
    }

    /// Static address of a variable whose location is a single `DW_OP_addr`.
    fn location_address(&self, unit: &Unit<OwnedReader>, entry: &Die<'_, '_>) -> Result<Option<u64>>
    {
        let Some(AttributeValue::Exprloc(expression)) = entry
            .attr_value(constants::DW_AT_location)
            .map_err(|err| map_dwarf_error("reading DW_AT_location", err))?
        else {
            return Ok(None);
        };
        let mut operations = expression.operations(unit.encoding());
        let address = match operations.next() {
            Ok(Some(Operation::Address { address })) => Some(address),
            Ok(Some(Operation::AddressIndex { index })) => self.dwarf.address(unit, index).ok(),
            _ => None,
        };
        Ok(address.map(|address| address.saturating_sub(self.bias)))
    }

    fn member_offset(&self, unit: &Unit<OwnedReader>, entry: &Die<'_, '_>) -> Result<Option<i64>>
    {
        let Some(attr) = entry
            .attr(constants::DW_AT_data_member_location)
            .map_err(|err| map_dwarf_error("reading DW_AT_data_member_location", err))?
        else {
            return Ok(None);
        };
        if let Some(offset) = attr.udata_value() {
            return Ok(i64::try_from(offset).ok());
        }
        if let AttributeValue::Exprloc(expression) = attr.value() {
            let mut operations = expression.operations(unit.encoding());
            if let Ok(Some(Operation::PlusConstant { value })) = operations.next() {
                return Ok(i64::try_from(value).ok());
            }
        }
        Ok(None)
    }
}

/// Size of a record whose size follows from its type.
fn derived_size(builder: &StoreBuilder, id: SymbolId, depth: usize) -> u64
{
    if depth > MAX_SIZE_DEPTH {
        return 0;
    }
    let Some(record) = builder.record(id) else {
        return 0;
    };
    if record.length > 0 && depth > 0 {
        return record.length;
    }
    let Some(target) = record.type_ref else {
        return record.length;
    };
    let target = strip_modifiers(builder, target);
    let element = match builder.record(target).and_then(RawRecord::kind) {
        Some(SymbolKind::Typedef | SymbolKind::ArrayType | SymbolKind::Enum) => {
            derived_size(builder, target, depth + 1)
        }
        _ => builder.type_size(Some(target)),
    };
    match record.kind() {
        Some(SymbolKind::ArrayType) => record.attrs.count.map_or(0, |count| count.saturating_mul(element)),
        _ => element,
    }
}

fn strip_modifiers(builder: &StoreBuilder, mut id: SymbolId) -> SymbolId
{
    for _ in 0..MAX_SIZE_DEPTH {
        match builder.record(id) {
            Some(record) if record.is_modifier() => match record.type_ref {
                Some(next) => id = next,
                None => break,
            },
            _ => break,
        }
    }
    id
}

fn qualify(scopes: &[Scope], name: &str) -> String
{
    let mut qualified: Vec<&str> = scopes.iter().filter_map(|scope| scope.prefix.as_deref()).collect();
    if qualified.is_empty() {
        return name.to_string();
    }
    qualified.push(name);
    qualified.join("::")
}

fn attr_udata(entry: &Die<'_, '_>, name: DwAt) -> Result<Option<u64>>
{
    Ok(entry
        .attr(name)
        .map_err(|err| map_dwarf_error("reading DWARF attribute", err))?
        .and_then(|attr| attr.udata_value()))
}

fn attr_sdata(entry: &Die<'_, '_>, name: DwAt) -> Result<Option<i64>>
{
    Ok(entry
        .attr(name)
        .map_err(|err| map_dwarf_error("reading DWARF attribute", err))?
        .and_then(|attr| {
            attr.sdata_value()
                .or_else(|| attr.udata_value().and_then(|value| i64::try_from(value).ok()))
        }))
}

fn attr_flag(entry: &Die<'_, '_>, name: DwAt) -> Result<bool>
{
    Ok(matches!(
        entry
            .attr_value(name)
            .map_err(|err| map_dwarf_error("reading DWARF flag", err))?,
        Some(AttributeValue::Flag(true))
    ))
}

/// Element count of one `DW_TAG_subrange_type`.
fn subrange_count(entry: &Die<'_, '_>) -> Result<Option<u64>>
{
    if let Some(count) = attr_udata(entry, constants::DW_AT_count)? {
        return Ok(Some(count));
    }
    let lower = attr_sdata(entry, constants::DW_AT_lower_bound)?.unwrap_or(0);
    Ok(attr_sdata(entry, constants::DW_AT_upper_bound)?
        .and_then(|upper| u64::try_from(upper - lower + 1).ok()))
}

fn basic_type(encoding: DwAte, size: u64) -> BasicType
{
    match encoding {
        constants::DW_ATE_boolean => BasicType::Bool,
        constants::DW_ATE_float => BasicType::Float,
        constants::DW_ATE_complex_float => BasicType::Complex,
        constants::DW_ATE_signed => BasicType::Int,
        constants::DW_ATE_unsigned | constants::DW_ATE_unsigned_char | constants::DW_ATE_address => BasicType::UInt,
        constants::DW_ATE_signed_char => BasicType::Char,
        constants::DW_ATE_UTF => match size {
            1 => BasicType::Char8,
            2 => BasicType::Char16,
            _ => BasicType::Char32,
        },
        _ => BasicType::NoType,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_qualify_joins_enclosing_prefixes()
    {
        let scopes = vec![
            Scope::transparent(Some("outer".to_string())),
            Scope::record(SymbolId::new(1), SymbolKind::Udt).named(Some("Widget".to_string())),
        ];
        assert_eq!(qualify(&scopes, "draw"), "outer::Widget::draw");
        assert_eq!(qualify(&[], "main"), "main");
    }

    #[test]
    fn test_basic_type_by_encoding()
    {
        assert_eq!(basic_type(constants::DW_ATE_signed, 4), BasicType::Int);
        assert_eq!(basic_type(constants::DW_ATE_UTF, 4), BasicType::Char32);
        assert_eq!(basic_type(constants::DW_ATE_boolean, 1), BasicType::Bool);
    }

    #[test]
    fn test_derived_sizes_follow_typedefs_and_arrays()
    {
        let mut builder = StoreBuilder::new("t");
        let root = builder.root();
        let int = builder.push(RawRecord::new(SymbolKind::BaseType).child_of(root).sized(4));
        let alias = builder.push(RawRecord::new(SymbolKind::Typedef).child_of(root).typed(int));
        let mut array = RawRecord::new(SymbolKind::ArrayType).child_of(root).typed(alias);
        array.attrs.count = Some(3);
        let array = builder.push(array);

        assert_eq!(derived_size(&builder, alias, 0), 4);
        assert_eq!(derived_size(&builder, array, 0), 12);
    }
}
