//! Tests for opening files from disk

use std::fs;
use std::path::{Path, PathBuf};

use object::write::{Object, StandardSection, Symbol, SymbolSection};
use object::{BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind as ObjectSymbolKind, SymbolScope};
use symscope_core::{
    Architecture, DataKind, DataSource, DebugInfoError, MatchMode, OpenOptions, SourceFormat, SymbolKind,
};
use tempfile::TempDir;

fn isolated() -> OpenOptions
{
    OpenOptions::new().use_env_symbol_path(false)
}

/// A relocatable x86-64 ELF object with one function and no debug sections.
fn stripped_elf() -> Vec<u8>
{
    let mut obj = Object::new(BinaryFormat::Elf, object::Architecture::X86_64, Endianness::Little);
    let text = obj.section_id(StandardSection::Text);
    let offset = obj.append_section_data(text, &[0xc3; 16], 16);
    obj.add_symbol(Symbol {
        name: b"entry".to_vec(),
        value: offset,
        size: 16,
        kind: ObjectSymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(text),
        flags: SymbolFlags::None,
    });
    obj.write().unwrap()
}

/// `.debug_abbrev` and `.debug_info` of one DWARF 4 unit:
///
/// ```text
/// compile_unit "demo.c" [0x1000, 0x1100)
///     namespace "app"
///         subprogram "compute" [0x1000, 0x1020)
///     base_type "int" (signed, 4 bytes)
///     variable "counter": int, external, at 0x2000
/// ```
fn dwarf_sections() -> (Vec<u8>, Vec<u8>)
{
    #[rustfmt::skip]
    let abbrev = vec![
        1, 0x11, 1, 0x03, 0x08, 0x11, 0x01, 0x12, 0x06, 0, 0,
        2, 0x39, 1, 0x03, 0x08, 0, 0,
        3, 0x2e, 0, 0x03, 0x08, 0x11, 0x01, 0x12, 0x06, 0, 0,
        4, 0x24, 0, 0x03, 0x08, 0x3e, 0x0b, 0x0b, 0x0b, 0, 0,
        5, 0x34, 0, 0x03, 0x08, 0x49, 0x13, 0x3f, 0x19, 0x02, 0x18, 0, 0,
        0,
    ];

    const HEADER_LEN: u32 = 11;
    let mut dies = Vec::new();
    dies.push(1);
    dies.extend_from_slice(b"demo.c\0");
    dies.extend_from_slice(&0x1000u64.to_le_bytes());
    dies.extend_from_slice(&0x100u32.to_le_bytes());

    dies.push(2);
    dies.extend_from_slice(b"app\0");
    dies.push(3);
    dies.extend_from_slice(b"compute\0");
    dies.extend_from_slice(&0x1000u64.to_le_bytes());
    dies.extend_from_slice(&0x20u32.to_le_bytes());
    dies.push(0);

    let int_offset = HEADER_LEN + u32::try_from(dies.len()).unwrap();
    dies.push(4);
    dies.extend_from_slice(b"int\0");
    dies.extend_from_slice(&[0x05, 4]);

    dies.push(5);
    dies.extend_from_slice(b"counter\0");
    dies.extend_from_slice(&int_offset.to_le_bytes());
    // DW_OP_addr 0x2000
    dies.extend_from_slice(&[9, 0x03]);
    dies.extend_from_slice(&0x2000u64.to_le_bytes());
    dies.push(0);

    let mut info = Vec::new();
    info.extend_from_slice(&(HEADER_LEN - 4 + u32::try_from(dies.len()).unwrap()).to_le_bytes());
    info.extend_from_slice(&4u16.to_le_bytes());
    info.extend_from_slice(&0u32.to_le_bytes());
    info.push(8);
    info.extend_from_slice(&dies);
    (abbrev, info)
}

fn text_object() -> Object<'static>
{
    let mut obj = Object::new(BinaryFormat::Elf, object::Architecture::X86_64, Endianness::Little);
    let text = obj.section_id(StandardSection::Text);
    obj.append_section_data(text, &[0xc3; 0x100], 16);
    obj
}

fn add_dwarf(obj: &mut Object<'_>)
{
    let (abbrev, info) = dwarf_sections();
    for (name, data) in [(".debug_abbrev", abbrev), (".debug_info", info)] {
        let section = obj.add_section(Vec::new(), name.as_bytes().to_vec(), SectionKind::Debug);
        obj.append_section_data(section, &data, 1);
    }
}

/// `NT_GNU_BUILD_ID` note carrying `id`.
fn add_build_id(obj: &mut Object<'_>, id: &[u8])
{
    let mut note = Vec::new();
    note.extend_from_slice(&4u32.to_le_bytes());
    note.extend_from_slice(&u32::try_from(id.len()).unwrap().to_le_bytes());
    note.extend_from_slice(&3u32.to_le_bytes());
    note.extend_from_slice(b"GNU\0");
    note.extend_from_slice(id);
    while note.len() % 4 != 0 {
        note.push(0);
    }
    let section = obj.add_section(Vec::new(), b".note.gnu.build-id".to_vec(), SectionKind::Note);
    obj.append_section_data(section, &note, 4);
}

/// `.gnu_debuglink` naming `file`; the CRC is not checked on open.
fn add_debuglink(obj: &mut Object<'_>, file: &str)
{
    let mut link = file.as_bytes().to_vec();
    link.push(0);
    while link.len() % 4 != 0 {
        link.push(0);
    }
    link.extend_from_slice(&0u32.to_le_bytes());
    let section = obj.add_section(Vec::new(), b".gnu_debuglink".to_vec(), SectionKind::Other);
    obj.append_section_data(section, &link, 4);
}

/// Same object as [`stripped_elf`] plus the DWARF of [`dwarf_sections`].
fn elf_with_dwarf() -> Vec<u8>
{
    let mut obj = text_object();
    add_dwarf(&mut obj);
    obj.write().unwrap()
}

/// A stripped image with `build_id` that points at `app.debug`, and that
/// companion carrying the DWARF under `companion_id`.
fn write_debuglink_pair(dir: &Path, build_id: &[u8], companion_id: &[u8]) -> PathBuf
{
    let mut image = text_object();
    add_build_id(&mut image, build_id);
    add_debuglink(&mut image, "app.debug");
    let path = dir.join("app");
    fs::write(&path, image.write().unwrap()).unwrap();

    let mut companion = text_object();
    add_build_id(&mut companion, companion_id);
    add_dwarf(&mut companion);
    fs::write(dir.join("app.debug"), companion.write().unwrap()).unwrap();
    path
}

#[test]
fn test_missing_file_is_not_found()
{
    let dir = TempDir::new().unwrap();
    let result = DataSource::open_with(dir.path().join("nope.exe"), &isolated());
    assert!(matches!(result, Err(DebugInfoError::NotFound(_))));
}

#[test]
fn test_directory_is_not_an_image()
{
    let dir = TempDir::new().unwrap();
    assert!(matches!(DataSource::open_with(dir.path(), &isolated()), Err(DebugInfoError::Format(_))));
}

#[test]
fn test_garbage_is_format_error()
{
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbage.bin");
    fs::write(&path, b"this is not an executable image at all").unwrap();
    assert!(matches!(DataSource::open_with(&path, &isolated()), Err(DebugInfoError::Format(_))));
}

#[test]
fn test_image_without_debug_info()
{
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stripped.o");
    fs::write(&path, stripped_elf()).unwrap();

    let source = DataSource::open_with(&path, &isolated()).unwrap();
    assert_eq!(source.format(), SourceFormat::Elf);
    assert_eq!(source.architecture(), Some(Architecture::X86_64));
    assert_eq!(source.path(), path.as_path());
    assert!(!source.has_debug_store());
    assert!(source.debug_store_path().is_none());
    assert!(matches!(source.create_session(), Err(DebugInfoError::NotFound(_))));
}

#[test]
fn test_explicit_store_must_exist()
{
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stripped.o");
    fs::write(&path, stripped_elf()).unwrap();

    let options = isolated().with_debug_store(dir.path().join("missing.debug"));
    assert!(matches!(DataSource::open_with(&path, &options), Err(DebugInfoError::NotFound(_))));
}

#[test]
fn test_embedded_dwarf()
{
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("demo.o");
    fs::write(&path, elf_with_dwarf()).unwrap();

    let source = DataSource::open_with(&path, &isolated()).unwrap();
    assert!(source.has_debug_store());
    assert!(source.debug_store_path().is_none());
    let session = source.create_session().unwrap();

    let units: Vec<_> = session.symbols().by_kind(SymbolKind::Compiland).unwrap().iter().collect();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].name(), Some("demo.c"));

    let compute = session.find_unique("app::compute", SymbolKind::Function).unwrap();
    assert_eq!(compute.address().map(|a| a.value()), Some(0x1000));
    assert_eq!(compute.length(), 0x20);
    assert_eq!(compute.parent(), Some(units[0].id()));
    assert_eq!(session.find_symbol_by_address(0x1010u64, None).unwrap().id(), compute.id());

    let counter = session.find_unique("counter", SymbolKind::Data).unwrap();
    assert_eq!(counter.data_kind(), Some(DataKind::Global));
    assert_eq!(counter.address().map(|a| a.value()), Some(0x2000));
    assert_eq!(counter.length(), 4);
    assert_eq!(session.types().type_name(counter.type_id().unwrap()).unwrap(), "int");
    assert_eq!(session.find_symbol_by_address(0x2003u64, None).unwrap().id(), counter.id());

    let prefixed: Vec<_> = session
        .find_symbols_by_name("app::", None, MatchMode::Prefix)
        .unwrap()
        .iter()
        .map(|symbol| symbol.id())
        .collect();
    assert_eq!(prefixed, vec![compute.id()]);
    assert!(session.diagnostics().is_empty());
}

#[test]
fn test_debuglink_build_id_mismatch()
{
    let dir = TempDir::new().unwrap();
    let path = write_debuglink_pair(dir.path(), &[0x01; 20], &[0x02; 20]);

    match DataSource::open_with(&path, &isolated()) {
        Err(DebugInfoError::Mismatch { store, expected, found }) => {
            assert_eq!(store, dir.path().join("app.debug"));
            assert!(expected.contains("0101"), "unexpected {expected}");
            assert!(found.contains("0202"), "unexpected {found}");
        }
        other => panic!("Expected Mismatch, got {other:?}"),
    }
}

#[test]
fn test_debuglink_companion_with_matching_build_id()
{
    let dir = TempDir::new().unwrap();
    let path = write_debuglink_pair(dir.path(), &[0x01; 20], &[0x01; 20]);

    let source = DataSource::open_with(&path, &isolated()).unwrap();
    assert_eq!(source.debug_store_path(), Some(dir.path().join("app.debug").as_path()));
    let session = source.create_session().unwrap();
    let compute = session.find_unique("app::compute", SymbolKind::Function).unwrap();
    assert_eq!(compute.address().map(|a| a.value()), Some(0x1000));
}

#[cfg(all(target_os = "linux", debug_assertions))]
#[test]
fn test_own_executable_debug_info()
{
    let exe = std::env::current_exe().unwrap();
    let source = DataSource::open_with(&exe, &isolated()).unwrap();
    assert_eq!(source.format(), SourceFormat::Elf);
    let session = source.create_session().unwrap();

    let functions: Vec<_> = session
        .find_symbols_by_name("test_own_executable_debug_info$", Some(SymbolKind::Function), MatchMode::Regex)
        .unwrap()
        .iter()
        .filter(|function| function.address().is_some())
        .collect();
    assert!(!functions.is_empty());

    let address = functions[0].address().unwrap();
    let found = session.find_symbol_by_address(address, Some(SymbolKind::Function)).unwrap();
    assert_eq!(found.address(), Some(address));

    let line = session.resolve_line(address).unwrap();
    assert!(line.file.ends_with("open.rs"), "unexpected file {}", line.file);
}
