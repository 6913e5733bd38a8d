//! PDB record loading through the `pdb` crate.
//!
//! The type stream is converted lazily: a type index becomes a record the
//! first time something references it, and its own references and children
//! are filled in from a work queue, so deep or cyclic type graphs never
//! recurse. Module symbol streams are then walked with a scope stack keyed on
//! each scope's end index.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::path::{Path, PathBuf};

use pdb::{
    AddressMap, ClassKind, FallibleIterator, IdData, IdFinder, IdIndex, PdbInternalSectionOffset, StringTable,
    SymbolData, SymbolIndex, TypeData, TypeFinder, TypeIndex, Variant, PDB,
};
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::diagnostics::{Diagnostic, DiagnosticStage};
use crate::error::{map_pdb_error, Result};
use crate::store::{FileId, LineRow, RawRecord, RecordAttrs, RecordStore, StoreBuilder};
use crate::types::{
    Architecture, BasicType, BitField, DataKind, DebugSignature, Qualifiers, SourceFormat, SymbolId, SymbolKind,
    UdtKind,
};

/// First non-primitive type index.
const FIRST_TYPE_INDEX: u32 = 0x1000;

/// Line numbers the compiler uses for hidden code.
const HIDDEN_LINES: [u32; 2] = [0x00fe_efee, 0x00f0_0f00];

/// Procedure symbol kinds whose type index is really an id-stream index.
const S_LPROC32_ID: u16 = 0x1146;
const S_GPROC32_ID: u16 = 0x1147;
const S_LPROC32_DPC_ID: u16 = 0x1156;

/// A located PDB, header already validated.
#[derive(Debug)]
pub(crate) struct PdbProvider
{
    path: PathBuf,
    file: File,
    signature: DebugSignature,
    architecture: Option<Architecture>,
}

impl PdbProvider
{
    /// Open `path` and read its identity without touching the symbol streams.
    ///
    /// ## Errors
    ///
    /// [`DebugInfoError::Format`](crate::DebugInfoError::Format) if the file
    /// is not an MSF 7.00 container, I/O errors otherwise.
    pub fn open(path: &Path) -> Result<Self>
    {
        let file = File::open(path)?;
        let mut pdb = PDB::open(file.try_clone()?).map_err(|err| map_pdb_error("opening PDB", err))?;

        let information = pdb
            .pdb_information()
            .map_err(|err| map_pdb_error("reading PDB information stream", err))?;
        let debug_information = pdb
            .debug_information()
            .map_err(|err| map_pdb_error("reading DBI stream", err))?;
        let age = debug_information.age().unwrap_or(information.age);
        let architecture = debug_information.machine_type().ok().map(machine_architecture);

        let signature = DebugSignature::CodeView {
            guid: information.guid.to_bytes_le(),
            age,
        };
        debug!(path = %path.display(), %signature, "read PDB header");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            signature,
            architecture,
        })
    }

    pub fn signature(&self) -> &DebugSignature
    {
        &self.signature
    }

    pub fn architecture(&self) -> Option<Architecture>
    {
        self.architecture
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn load(self) -> Result<RecordStore>
    {
        let name = self
            .path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |name| name.to_string_lossy().into_owned());
        let mut pdb = PDB::open(self.file).map_err(|err| map_pdb_error("opening PDB", err))?;

        let debug_information = pdb
            .debug_information()
            .map_err(|err| map_pdb_error("reading DBI stream", err))?;
        let address_map = pdb
            .address_map()
            .map_err(|err| map_pdb_error("reading section map", err))?;
        let string_table = pdb.string_table().ok();

        let type_information = pdb
            .type_information()
            .map_err(|err| map_pdb_error("reading TPI stream", err))?;
        let mut type_finder = type_information.finder();
        let mut type_iter = type_information.iter();
        while type_iter
            .next()
            .map_err(|err| map_pdb_error("indexing TPI stream", err))?
            .is_some()
        {
            type_finder.update(&type_iter);
        }

        // Old PDBs have no IPI stream; id-indexed procedures then stay untyped.
        let id_information = pdb.id_information().ok();
        let id_finder = match &id_information {
            Some(id_information) => {
                let mut finder = id_information.finder();
                let mut iter = id_information.iter();
                while let Ok(Some(_)) = iter.next() {
                    finder.update(&iter);
                }
                Some(finder)
            }
            None => None,
        };

        let builder = StoreBuilder::new(name)
            .with_format(SourceFormat::Pdb)
            .with_signature(Some(self.signature.clone()))
            .with_architecture(self.architecture);
        let pointer_size = u64::from(self.architecture.unwrap_or(Architecture::X86_64).pointer_size_bytes());
        let mut loader = PdbLoader {
            builder,
            types: &type_finder,
            ids: id_finder.as_ref(),
            address_map: &address_map,
            string_table: string_table.as_ref(),
            pointer_size,
            memo: HashMap::new(),
            primitives: HashMap::new(),
            pending: VecDeque::new(),
            arrays: Vec::new(),
            enums: Vec::new(),
            resized: Vec::new(),
            typedefs: HashSet::new(),
            data_seen: HashSet::new(),
        };

        let mut modules = debug_information
            .modules()
            .map_err(|err| map_pdb_error("reading module list", err))?;
        let mut module_count = 0usize;
        while let Some(module) = modules
            .next()
            .map_err(|err| map_pdb_error("iterating module list", err))?
        {
            module_count += 1;
            let compiland = loader.builder.push(
                RawRecord::new(SymbolKind::Compiland)
                    .named(module.module_name().into_owned())
                    .child_of(SymbolId::ROOT),
            );
            let module_info = match pdb.module_info(&module) {
                Ok(Some(module_info)) => module_info,
                Ok(None) => continue,
                Err(err) => {
                    loader.diagnostic(Some(compiland), format!("module stream unreadable: {err}"));
                    continue;
                }
            };
            if let Err(err) = loader.load_module_symbols(&module_info, compiland) {
                loader.diagnostic(Some(compiland), format!("module symbols truncated: {err}"));
            }
            if let Err(err) = loader.load_module_lines(&module_info, compiland) {
                loader.diagnostic(Some(compiland), format!("module line program truncated: {err}"));
            }
        }

        let global_symbols = pdb
            .global_symbols()
            .map_err(|err| map_pdb_error("reading global symbol stream", err))?;
        let mut globals = global_symbols.iter();
        while let Some(symbol) = globals
            .next()
            .map_err(|err| map_pdb_error("iterating global symbols", err))?
        {
            match symbol.parse() {
                Ok(data) => loader.global_symbol(data),
                Err(pdb::Error::UnimplementedSymbolKind(_)) => {}
                Err(err) => loader.diagnostic(None, format!("global symbol {:?} unreadable: {err}", symbol.index())),
            }
        }

        loader.finish_types();
        info!(modules = module_count, records = loader.builder.len(), "converted PDB records");
        Ok(loader.builder.build())
    }
}

fn machine_architecture(machine: pdb::MachineType) -> Architecture
{
    match machine {
        pdb::MachineType::X86 => Architecture::X86,
        pdb::MachineType::Amd64 => Architecture::X86_64,
        pdb::MachineType::Arm | pdb::MachineType::ArmNT | pdb::MachineType::Thumb => Architecture::Arm,
        pdb::MachineType::Arm64 => Architecture::Arm64,
        _ => Architecture::Unknown("pdb"),
    }
}

/// `'t` borrows the type streams, `'s` is the PDB source.
struct PdbLoader<'a, 't, 's>
{
    builder: StoreBuilder,
    types: &'a TypeFinder<'t>,
    ids: Option<&'a IdFinder<'t>>,
    address_map: &'a AddressMap<'s>,
    string_table: Option<&'a StringTable<'s>>,
    pointer_size: u64,
    memo: HashMap<u32, Option<SymbolId>>,
    primitives: HashMap<u32, SymbolId>,
    /// Types pushed but not yet filled in.
    pending: VecDeque<(SymbolId, TypeIndex)>,
    /// Arrays and their total byte size, counted once element sizes are known.
    arrays: Vec<(SymbolId, u64)>,
    enums: Vec<SymbolId>,
    /// Records sized from their type before enum sizes were known.
    resized: Vec<SymbolId>,
    typedefs: HashSet<String>,
    data_seen: HashSet<(u64, String)>,
}

impl PdbLoader<'_, '_, '_>
{
    fn diagnostic(&mut self, record: Option<SymbolId>, message: String)
    {
        self.builder
            .push_diagnostic(Diagnostic::new(record, DiagnosticStage::Load, message));
    }

    fn rva(&self, offset: PdbInternalSectionOffset) -> Option<u64>
    {
        offset.to_rva(self.address_map).map(|rva| u64::from(rva.0))
    }

    fn load_module_symbols(&mut self, module_info: &pdb::ModuleInfo<'_>, compiland: SymbolId) -> pdb::Result<()>
    {
        let mut scopes: SmallVec<[(SymbolIndex, SymbolId, SymbolKind); 8]> = SmallVec::new();
        let mut symbols = module_info.symbols()?;

        while let Some(symbol) = symbols.next()? {
            let index = symbol.index();
            while scopes.last().is_some_and(|(end, _, _)| index >= *end) {
                scopes.pop();
            }
            let (parent, parent_kind) = scopes
                .last()
                .map_or((compiland, SymbolKind::Compiland), |(_, id, kind)| (*id, *kind));
            let in_code = parent_kind != SymbolKind::Compiland;

            let data = match symbol.parse() {
                Ok(data) => data,
                Err(pdb::Error::UnimplementedSymbolKind(_)) => continue,
                Err(err) => {
                    self.diagnostic(Some(parent), format!("symbol {index:?} unreadable: {err}"));
                    continue;
                }
            };

            match data {
                SymbolData::Procedure(procedure) => {
                    let mut record = RawRecord::new(SymbolKind::Function)
                        .named(procedure.name.to_string().into_owned())
                        .child_of(parent);
                    if let Some(rva) = self.rva(procedure.offset) {
                        record = record.at(rva, u64::from(procedure.len));
                    }
                    let function_type = if matches!(symbol.raw_kind(), S_LPROC32_ID | S_GPROC32_ID | S_LPROC32_DPC_ID) {
                        self.function_type_of_id(IdIndex(procedure.type_index.0))
                    } else {
                        Some(procedure.type_index)
                    };
                    record.type_ref = function_type.and_then(|index| self.intern(index));
                    let id = self.builder.push(record);
                    scopes.push((procedure.end, id, SymbolKind::Function));
                }
                SymbolData::Thunk(thunk) => {
                    let mut record = RawRecord::new(SymbolKind::Thunk)
                        .named(thunk.name.to_string().into_owned())
                        .child_of(parent);
                    if let Some(rva) = self.rva(thunk.offset) {
                        record = record.at(rva, u64::from(thunk.len));
                    }
                    let id = self.builder.push(record);
                    scopes.push((thunk.end, id, SymbolKind::Thunk));
                }
                SymbolData::Block(block) => {
                    let mut record = RawRecord::new(SymbolKind::Block).child_of(parent);
                    let name = block.name.to_string();
                    if !name.is_empty() {
                        record.name = Some(name.into_owned());
                    }
                    if let Some(rva) = self.rva(block.offset) {
                        record = record.at(rva, u64::from(block.len));
                    }
                    let id = self.builder.push(record);
                    scopes.push((block.end, id, SymbolKind::Block));
                }
                SymbolData::InlineSite(site) => {
                    let mut record = RawRecord::new(SymbolKind::InlineSite).child_of(parent);
                    record.name = self.inlinee_name(site.inlinee);
                    let id = self.builder.push(record);
                    scopes.push((site.end, id, SymbolKind::InlineSite));
                }
                SymbolData::Local(local) => {
                    let data_kind = if local.flags.isparam { DataKind::Param } else { DataKind::Local };
                    let name = local.name.to_string().into_owned();
                    let record = self.data_record(parent, name, data_kind, local.type_index);
                    self.builder.push(record);
                }
                SymbolData::RegisterRelative(local) => {
                    let name = local.name.to_string().into_owned();
                    let record = self.data_record(parent, name, DataKind::Local, local.type_index);
                    self.builder.push(record);
                }
                SymbolData::Data(data) => {
                    let data_kind = if in_code {
                        DataKind::StaticLocal
                    } else if data.global {
                        DataKind::Global
                    } else {
                        DataKind::FileStatic
                    };
                    let name = data.name.to_string().into_owned();
                    let rva = self.rva(data.offset);
                    if let Some(rva) = rva {
                        self.data_seen.insert((rva, name.clone()));
                    }
                    let record = self.data_record(parent, name, data_kind, data.type_index);
                    match rva {
                        Some(rva) => {
                            let size = self.builder.type_size(record.type_ref);
                            self.push_sized(record.at(rva, size));
                        }
                        None => {
                            self.builder.push(record);
                        }
                    }
                }
                SymbolData::Constant(constant) => {
                    let mut record = self.data_record(
                        parent,
                        constant.name.to_string().into_owned(),
                        DataKind::Constant,
                        constant.type_index,
                    );
                    record.attrs.value = Some(variant_value(constant.value));
                    self.builder.push(record);
                }
                SymbolData::Label(label) => {
                    let mut record = RawRecord::new(SymbolKind::Label)
                        .named(label.name.to_string().into_owned())
                        .child_of(parent);
                    if let Some(rva) = self.rva(label.offset) {
                        record = record.at(rva, 0);
                    }
                    self.builder.push(record);
                }
                SymbolData::UserDefinedType(udt) => self.typedef(udt.name.to_string().into_owned(), udt.type_index),
                _ => {}
            }
        }
        Ok(())
    }

    fn global_symbol(&mut self, data: SymbolData<'_>)
    {
        match data {
            SymbolData::Public(public) => {
                let mut record = RawRecord::new(SymbolKind::PublicSymbol)
                    .named(public.name.to_string().into_owned())
                    .child_of(SymbolId::ROOT);
                if let Some(rva) = self.rva(public.offset) {
                    record = record.at(rva, 0);
                }
                self.builder.push(record);
            }
            SymbolData::Data(data) => {
                let name = data.name.to_string().into_owned();
                let rva = self.rva(data.offset);
                if let Some(rva) = rva {
                    if !self.data_seen.insert((rva, name.clone())) {
                        return;
                    }
                }
                let data_kind = if data.global { DataKind::Global } else { DataKind::FileStatic };
                let record = self.data_record(SymbolId::ROOT, name, data_kind, data.type_index);
                match rva {
                    Some(rva) => {
                        let size = self.builder.type_size(record.type_ref);
                        self.push_sized(record.at(rva, size));
                    }
                    None => {
                        self.builder.push(record);
                    }
                }
            }
            SymbolData::Constant(constant) => {
                let mut record = self.data_record(
                    SymbolId::ROOT,
                    constant.name.to_string().into_owned(),
                    DataKind::Constant,
                    constant.type_index,
                );
                record.attrs.value = Some(variant_value(constant.value));
                self.builder.push(record);
            }
            SymbolData::UserDefinedType(udt) => self.typedef(udt.name.to_string().into_owned(), udt.type_index),
            _ => {}
        }
    }

    fn data_record(&mut self, parent: SymbolId, name: String, data_kind: DataKind, type_index: TypeIndex) -> RawRecord
    {
        let mut record = RawRecord::new(SymbolKind::Data)
            .named(name)
            .child_of(parent)
            .with_attrs(RecordAttrs {
                data_kind: Some(data_kind),
                ..RecordAttrs::default()
            });
        record.type_ref = self.intern(type_index);
        record
    }

    /// `S_UDT` aliases become typedefs, once per name. The compiler emits one
    /// for nearly every struct under the struct's own name; those add nothing.
    fn typedef(&mut self, name: String, type_index: TypeIndex)
    {
        if !self.typedefs.insert(name.clone()) {
            return;
        }
        let target = self.intern(type_index);
        if names_itself(&self.builder, target, &name) {
            return;
        }
        let mut record = RawRecord::new(SymbolKind::Typedef).named(name).child_of(SymbolId::ROOT);
        record.type_ref = target;
        record.length = self.builder.type_size(record.type_ref);
        self.push_sized(record);
    }

    /// Push a record whose length is its type's size.
    fn push_sized(&mut self, record: RawRecord) -> SymbolId
    {
        let pending = record.length == 0 && record.type_ref.is_some();
        let id = self.builder.push(record);
        if pending {
            self.resized.push(id);
        }
        id
    }

    fn function_type_of_id(&self, index: IdIndex) -> Option<TypeIndex>
    {
        match self.ids?.find(index).and_then(|id| id.parse()) {
            Ok(IdData::Function(function)) => Some(function.function_type),
            Ok(IdData::MemberFunction(function)) => Some(function.function_type),
            _ => None,
        }
    }

    fn inlinee_name(&self, index: IdIndex) -> Option<String>
    {
        match self.ids?.find(index).and_then(|id| id.parse()) {
            Ok(IdData::Function(function)) => Some(function.name.to_string().into_owned()),
            Ok(IdData::MemberFunction(function)) => Some(function.name.to_string().into_owned()),
            _ => None,
        }
    }

    fn load_module_lines(&mut self, module_info: &pdb::ModuleInfo<'_>, compiland: SymbolId) -> pdb::Result<()>
    {
        let program = module_info.line_program()?;
        let mut files: HashMap<u32, FileId> = HashMap::new();
        let mut lines = program.lines();
        while let Some(line) = lines.next()? {
            if HIDDEN_LINES.contains(&line.line_start) || line.line_start == 0 {
                continue;
            }
            let Some(address) = self.rva(line.offset) else {
                continue;
            };
            let file = match files.get(&line.file_index.0) {
                Some(file) => *file,
                None => {
                    let name = program
                        .get_file_info(line.file_index)
                        .ok()
                        .zip(self.string_table)
                        .and_then(|(file_info, strings)| file_info.name.to_string_lossy(strings).ok())
                        .map_or_else(|| format!("<file {}>", line.file_index.0), |name| name.into_owned());
                    let file = self.builder.add_file(&name);
                    files.insert(line.file_index.0, file);
                    file
                }
            };
            self.builder.add_line(
                compiland,
                LineRow {
                    address,
                    length: line.length.map(u64::from),
                    file,
                    line: line.line_start,
                    column: None,
                },
            );
        }
        Ok(())
    }

    /// Record for `index`, pushing it on first use. `None` means `void` or unusable.
    fn intern(&mut self, index: TypeIndex) -> Option<SymbolId>
    {
        if index.0 < FIRST_TYPE_INDEX {
            return self.primitive(index.0);
        }
        if let Some(known) = self.memo.get(&index.0) {
            return *known;
        }
        // Guards against a type that reaches itself before it is pushed.
        self.memo.insert(index.0, None);

        let data = match self.types.find(index).and_then(|item| item.parse()) {
            Ok(data) => data,
            Err(err) => {
                self.diagnostic(None, format!("type {:#x} unreadable: {err}", index.0));
                return None;
            }
        };

        let record = match data {
            TypeData::Class(class) => {
                let udt_kind = match class.kind {
                    ClassKind::Class => UdtKind::Class,
                    ClassKind::Struct => UdtKind::Struct,
                    ClassKind::Interface => UdtKind::Interface,
                };
                let name = class.name.to_string().into_owned();
                udt_record(name, udt_kind, class.size, class.properties.forward_reference())
            }
            TypeData::Union(union) => udt_record(
                union.name.to_string().into_owned(),
                UdtKind::Union,
                union.size,
                union.properties.forward_reference(),
            ),
            TypeData::Enumeration(enumeration) => RawRecord::new(SymbolKind::Enum)
                .named(enumeration.name.to_string().into_owned())
                .child_of(SymbolId::ROOT)
                .with_attrs(RecordAttrs {
                    forward: enumeration.properties.forward_reference(),
                    ..RecordAttrs::default()
                }),
            TypeData::Pointer(pointer) => {
                let size = match pointer.attributes.size() {
                    0 => self.pointer_size,
                    size => u64::from(size),
                };
                RawRecord::new(SymbolKind::PointerType)
                    .child_of(SymbolId::ROOT)
                    .sized(size)
                    .with_attrs(RecordAttrs {
                        reference: pointer.attributes.is_reference(),
                        ..RecordAttrs::default()
                    })
            }
            TypeData::Modifier(modifier) => RawRecord::modifier(
                Qualifiers {
                    is_const: modifier.constant,
                    is_volatile: modifier.volatile,
                    is_unaligned: modifier.unaligned,
                },
                None,
            ),
            TypeData::Array(array) => {
                let size = array.dimensions.first().copied().map_or(0, u64::from);
                RawRecord::new(SymbolKind::ArrayType).child_of(SymbolId::ROOT).sized(size)
            }
            TypeData::Procedure(_) | TypeData::MemberFunction(_) => {
                RawRecord::new(SymbolKind::FunctionType).child_of(SymbolId::ROOT)
            }
            TypeData::Bitfield(bitfield) => {
                // Only meaningful on a member; elsewhere it stands for its storage type.
                let underlying = self.intern(bitfield.underlying_type);
                self.memo.insert(index.0, underlying);
                return underlying;
            }
            _ => return None,
        };

        let id = self.builder.push(record);
        self.memo.insert(index.0, Some(id));
        self.pending.push_back((id, index));
        Some(id)
    }

    /// Built-in type encoded directly in a type index below `0x1000`.
    fn primitive(&mut self, raw: u32) -> Option<SymbolId>
    {
        if let Some(id) = self.primitives.get(&raw) {
            return Some(*id);
        }
        let mode = (raw >> 8) & 0xf;
        let kind = raw & 0xff;

        let id = if mode == 0 {
            let (basic, size) = primitive_kind(kind)?;
            self.builder.push(
                RawRecord::new(SymbolKind::BaseType)
                    .child_of(SymbolId::ROOT)
                    .sized(size)
                    .with_attrs(RecordAttrs {
                        basic_type: Some(basic),
                        ..RecordAttrs::default()
                    }),
            )
        } else {
            let size = match mode {
                1 => 2,
                2 | 3 | 4 => 4,
                5 => 6,
                6 => 8,
                7 => 16,
                _ => self.pointer_size,
            };
            let pointee = if kind == 0x03 { None } else { self.primitive(kind) };
            let mut record = RawRecord::new(SymbolKind::PointerType).child_of(SymbolId::ROOT).sized(size);
            record.type_ref = pointee;
            self.builder.push(record)
        };
        self.primitives.insert(raw, id);
        Some(id)
    }

    /// Fill type references and children of every pushed type.
    fn drain(&mut self)
    {
        while let Some((id, index)) = self.pending.pop_front() {
            let data = match self.types.find(index).and_then(|item| item.parse()) {
                Ok(data) => data,
                Err(_) => continue,
            };
            match data {
                TypeData::Class(class) => {
                    if let Some(fields) = class.fields {
                        self.field_list(id, fields);
                    }
                }
                TypeData::Union(union) => self.field_list(id, union.fields),
                TypeData::Enumeration(enumeration) => {
                    self.set_type(id, enumeration.underlying_type);
                    self.enums.push(id);
                    self.field_list(id, enumeration.fields);
                }
                TypeData::Pointer(pointer) => self.set_type(id, pointer.underlying_type),
                TypeData::Modifier(modifier) => self.set_type(id, modifier.underlying_type),
                TypeData::Array(array) => {
                    self.set_type(id, array.element_type);
                    let size = array.dimensions.first().copied().map_or(0, u64::from);
                    self.arrays.push((id, size));
                }
                TypeData::Procedure(procedure) => {
                    if let Some(return_type) = procedure.return_type {
                        self.set_type(id, return_type);
                    }
                    self.argument_list(id, procedure.argument_list);
                }
                TypeData::MemberFunction(function) => {
                    self.set_type(id, function.return_type);
                    self.argument_list(id, function.argument_list);
                }
                _ => {}
            }
        }
    }

    fn set_type(&mut self, id: SymbolId, index: TypeIndex)
    {
        let target = self.intern(index);
        if let Some(record) = self.builder.record_mut(id) {
            record.type_ref = target;
        }
    }

    fn argument_list(&mut self, function: SymbolId, index: TypeIndex)
    {
        let arguments = match self.types.find(index).and_then(|item| item.parse()) {
            Ok(TypeData::ArgumentList(list)) => list.arguments,
            Ok(_) => return,
            Err(err) => {
                self.diagnostic(Some(function), format!("argument list {:#x} unreadable: {err}", index.0));
                return;
            }
        };
        for argument in arguments {
            let mut record = RawRecord::new(SymbolKind::FunctionArgType).child_of(function);
            record.type_ref = self.intern(argument);
            self.builder.push(record);
        }
    }

    fn field_list(&mut self, owner: SymbolId, first: TypeIndex)
    {
        let mut visited = HashSet::new();
        let mut next = Some(first);
        while let Some(index) = next.take() {
            if index.0 < FIRST_TYPE_INDEX || !visited.insert(index.0) {
                break;
            }
            let list = match self.types.find(index).and_then(|item| item.parse()) {
                Ok(TypeData::FieldList(list)) => list,
                Ok(_) => break,
                Err(err) => {
                    self.diagnostic(Some(owner), format!("field list {:#x} unreadable: {err}", index.0));
                    break;
                }
            };
            for field in list.fields {
                self.field(owner, field);
            }
            next = list.continuation;
        }
    }

    fn field(&mut self, owner: SymbolId, field: TypeData<'_>)
    {
        let record = match field {
            TypeData::Member(member) => {
                let (type_ref, bit_field) = self.member_type(member.field_type);
                let mut record = RawRecord::new(SymbolKind::Data)
                    .named(member.name.to_string().into_owned())
                    .child_of(owner)
                    .with_attrs(RecordAttrs {
                        data_kind: Some(DataKind::Member),
                        offset: Some(i64::try_from(member.offset).unwrap_or(i64::MAX)),
                        bit_field,
                        ..RecordAttrs::default()
                    });
                record.type_ref = type_ref;
                record
            }
            TypeData::StaticMember(member) => {
                let mut record = RawRecord::new(SymbolKind::Data)
                    .named(member.name.to_string().into_owned())
                    .child_of(owner)
                    .with_attrs(RecordAttrs {
                        data_kind: Some(DataKind::StaticMember),
                        ..RecordAttrs::default()
                    });
                record.type_ref = self.intern(member.field_type);
                record
            }
            TypeData::BaseClass(base) => {
                let mut record = RawRecord::new(SymbolKind::BaseClass).child_of(owner).with_attrs(RecordAttrs {
                    offset: Some(i64::from(base.offset)),
                    ..RecordAttrs::default()
                });
                record.type_ref = self.intern(base.base_class);
                record
            }
            TypeData::VirtualBaseClass(base) => {
                let mut record = RawRecord::new(SymbolKind::BaseClass).child_of(owner).with_attrs(RecordAttrs {
                    offset: Some(i64::from(base.base_pointer_offset)),
                    virtual_base: true,
                    ..RecordAttrs::default()
                });
                record.type_ref = self.intern(base.base_class);
                record
            }
            TypeData::Enumerate(enumerate) => RawRecord::new(SymbolKind::Data)
                .named(enumerate.name.to_string().into_owned())
                .child_of(owner)
                .with_attrs(RecordAttrs {
                    data_kind: Some(DataKind::Constant),
                    value: Some(variant_value(enumerate.value)),
                    ..RecordAttrs::default()
                }),
            _ => return,
        };
        self.builder.push(record);
    }

    /// Member type, unwrapping a bit-field record into its storage type.
    fn member_type(&mut self, index: TypeIndex) -> (Option<SymbolId>, Option<BitField>)
    {
        if index.0 >= FIRST_TYPE_INDEX {
            if let Ok(TypeData::Bitfield(bitfield)) = self.types.find(index).and_then(|item| item.parse()) {
                let bit_field = BitField {
                    position: u32::from(bitfield.position),
                    width: u32::from(bitfield.length),
                };
                return (self.intern(bitfield.underlying_type), Some(bit_field));
            }
        }
        (self.intern(index), None)
    }

    /// Drain remaining types and derive sizes that depend on other types.
    fn finish_types(&mut self)
    {
        self.drain();
        for id in std::mem::take(&mut self.enums) {
            let size = self.builder.record(id).map_or(0, |record| self.builder.type_size(record.type_ref));
            if let Some(record) = self.builder.record_mut(id) {
                record.length = size;
            }
        }
        for (id, size) in std::mem::take(&mut self.arrays) {
            let element = self.builder.record(id).map_or(0, |record| self.builder.type_size(record.type_ref));
            if let Some(record) = self.builder.record_mut(id) {
                record.attrs.count = (element > 0).then(|| size / element);
            }
        }
        for id in std::mem::take(&mut self.resized) {
            let size = self.builder.record(id).map_or(0, |record| self.builder.type_size(record.type_ref));
            if let Some(record) = self.builder.record_mut(id) {
                record.length = size;
            }
        }
        debug!(types = self.memo.len(), primitives = self.primitives.len(), "converted PDB types");
    }
}

/// Whether `target` is a record already called `name`.
fn names_itself(builder: &StoreBuilder, target: Option<SymbolId>, name: &str) -> bool
{
    target
        .and_then(|id| builder.record(id))
        .and_then(|record| record.name.as_deref())
        .is_some_and(|target_name| target_name == name)
}

fn udt_record(name: String, udt_kind: UdtKind, size: u64, forward: bool) -> RawRecord
{
    RawRecord::new(SymbolKind::Udt)
        .named(name)
        .child_of(SymbolId::ROOT)
        .sized(size)
        .with_attrs(RecordAttrs {
            udt_kind: Some(udt_kind),
            forward,
            ..RecordAttrs::default()
        })
}

fn variant_value(value: Variant) -> i64
{
    match value {
        Variant::U8(v) => i64::from(v),
        Variant::U16(v) => i64::from(v),
        Variant::U32(v) => i64::from(v),
        Variant::U64(v) => i64::from_ne_bytes(v.to_ne_bytes()),
        Variant::I8(v) => i64::from(v),
        Variant::I16(v) => i64::from(v),
        Variant::I32(v) => i64::from(v),
        Variant::I64(v) => v,
    }
}

/// Basic type and size for the low byte of a primitive type index.
fn primitive_kind(kind: u32) -> Option<(BasicType, u64)>
{
    let mapped = match kind {
        0x00 => return None,
        0x03 => (BasicType::Void, 0),
        0x08 => (BasicType::Hresult, 4),
        0x10 | 0x70 => (BasicType::Char, 1),
        0x20 | 0x69 => (BasicType::UInt, 1),
        0x68 => (BasicType::Int, 1),
        0x71 => (BasicType::WChar, 2),
        0x7a => (BasicType::Char16, 2),
        0x7b => (BasicType::Char32, 4),
        0x7c => (BasicType::Char8, 1),
        0x11 | 0x72 => (BasicType::Int, 2),
        0x21 | 0x73 => (BasicType::UInt, 2),
        0x12 => (BasicType::Long, 4),
        0x22 => (BasicType::ULong, 4),
        0x74 => (BasicType::Int, 4),
        0x75 => (BasicType::UInt, 4),
        0x13 | 0x76 => (BasicType::Int, 8),
        0x23 | 0x77 => (BasicType::UInt, 8),
        0x14 | 0x78 => (BasicType::Int, 16),
        0x24 | 0x79 => (BasicType::UInt, 16),
        0x46 => (BasicType::Float, 2),
        0x40 | 0x45 => (BasicType::Float, 4),
        0x44 => (BasicType::Float, 6),
        0x41 => (BasicType::Float, 8),
        0x42 => (BasicType::Float, 10),
        0x43 => (BasicType::Float, 16),
        0x50 => (BasicType::Complex, 8),
        0x51 => (BasicType::Complex, 16),
        0x52 => (BasicType::Complex, 20),
        0x53 => (BasicType::Complex, 32),
        0x30 => (BasicType::Bool, 1),
        0x31 => (BasicType::Bool, 2),
        0x32 => (BasicType::Bool, 4),
        0x33 => (BasicType::Bool, 8),
        _ => (BasicType::NoType, 0),
    };
    Some(mapped)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_primitive_kinds()
    {
        assert_eq!(primitive_kind(0x74), Some((BasicType::Int, 4)));
        assert_eq!(primitive_kind(0x23), Some((BasicType::UInt, 8)));
        assert_eq!(primitive_kind(0x41), Some((BasicType::Float, 8)));
        assert_eq!(primitive_kind(0x00), None);
    }

    #[test]
    fn test_variant_values()
    {
        assert_eq!(variant_value(Variant::I16(-3)), -3);
        assert_eq!(variant_value(Variant::U32(7)), 7);
        assert_eq!(variant_value(Variant::U64(u64::MAX)), -1);
    }

    #[test]
    fn test_self_named_udt_alias_is_detected()
    {
        let mut builder = StoreBuilder::new("app.pdb");
        let node = builder.push(udt_record("Node".to_string(), UdtKind::Struct, 0x10, false));
        assert!(names_itself(&builder, Some(node), "Node"));
        assert!(!names_itself(&builder, Some(node), "NodeAlias"));
        assert!(!names_itself(&builder, None, "Node"));

        let int = builder.push(RawRecord::new(SymbolKind::BaseType).child_of(SymbolId::ROOT).sized(4));
        assert!(!names_itself(&builder, Some(int), "int"));
    }

    #[test]
    fn test_machine_architecture()
    {
        assert_eq!(machine_architecture(pdb::MachineType::Amd64), Architecture::X86_64);
        assert_eq!(machine_architecture(pdb::MachineType::X86), Architecture::X86);
    }
}
