//! Tests for address to source-line mapping

use symscope_core::store::{LineRow, RawRecord, StoreBuilder};
use symscope_core::{Address, AddressRange, DataSource, DebugInfoError, DiagnosticStage, SymbolId, SymbolKind};

struct Fixture
{
    source: DataSource,
    main_unit: SymbolId,
    util_unit: SymbolId,
    empty_unit: SymbolId,
    function: SymbolId,
}

fn row(address: u64, length: Option<u64>, file: symscope_core::store::FileId, line: u32) -> LineRow
{
    LineRow {
        address,
        length,
        file,
        line,
        column: None,
    }
}

fn fixture() -> Fixture
{
    let mut builder = StoreBuilder::new("app.exe");
    let root = builder.root();
    let main_unit = builder.push(RawRecord::new(SymbolKind::Compiland).named("main.obj").child_of(root));
    let function =
        builder.push(RawRecord::new(SymbolKind::Function).named("main").child_of(main_unit).at(0x1000, 0x20));
    let util_unit = builder.push(RawRecord::new(SymbolKind::Compiland).named("util.obj").child_of(root));
    let empty_unit = builder.push(RawRecord::new(SymbolKind::Compiland).named("empty.obj").child_of(root));

    let main_c = builder.add_file("C:\\src\\main.c");
    let util_c = builder.add_file("/src/util.c");
    // Stored out of order on purpose; tables are sorted by address.
    builder.add_lines(
        main_unit,
        [
            row(0x1010, None, main_c, 10),
            row(0x1000, None, main_c, 10),
            row(0x1008, None, main_c, 11),
            LineRow {
                column: Some(5),
                ..row(0x1018, Some(8), main_c, 12)
            },
        ],
    );
    // The first explicit length runs into the second row.
    builder.add_lines(util_unit, [row(0x2000, Some(0x20), util_c, 5), row(0x2010, Some(0x10), util_c, 6)]);

    Fixture {
        source: DataSource::from_records("app.exe", builder.build()),
        main_unit,
        util_unit,
        empty_unit,
        function,
    }
}

#[test]
fn test_resolve_line()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();

    let entry = session.resolve_line(0x1004u64).unwrap();
    assert_eq!(entry.range, AddressRange::new(Address::new(0x1000), 8));
    assert_eq!(&*entry.file, "C:\\src\\main.c");
    assert_eq!(entry.line, 10);
    assert_eq!(entry.column, None);
    assert_eq!(entry.compiland, fx.main_unit);

    let last = session.resolve_line(0x101cu64).unwrap();
    assert_eq!(last.line, 12);
    assert_eq!(last.column, Some(5));
    assert_eq!(last.to_string(), "[0x00001018, 0x00001020) C:\\src\\main.c:12:5");

    assert!(matches!(session.resolve_line(0x1020u64), Err(DebugInfoError::NotFound(_))));
    assert!(matches!(session.resolve_line(0x0fffu64), Err(DebugInfoError::NotFound(_))));
}

#[test]
fn test_resolve_address_matches_file_loosely()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();

    let ranges = session.resolve_address("main.c", 10).unwrap();
    assert_eq!(
        ranges,
        vec![
            AddressRange::new(Address::new(0x1000), 8),
            AddressRange::new(Address::new(0x1010), 8)
        ]
    );
    assert_eq!(
        session.resolve_address("SRC/MAIN.C", 11).unwrap(),
        vec![AddressRange::new(Address::new(0x1008), 8)]
    );
    assert_eq!(
        session.resolve_address("\\src\\util.c", 5).unwrap(),
        vec![AddressRange::new(Address::new(0x2000), 0x10)]
    );

    // Suffixes must cover whole path components.
    assert!(matches!(session.resolve_address("ain.c", 10), Err(DebugInfoError::NotFound(_))));
    assert!(matches!(session.resolve_address("main.c", 99), Err(DebugInfoError::NotFound(_))));
}

#[test]
fn test_line_round_trip()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    let entries = session.lines().line_entries_for_compiland(fx.main_unit).unwrap();
    assert_eq!(entries.len(), 4);

    for entry in &entries {
        assert_eq!(session.resolve_line(entry.range.start()).unwrap(), *entry);
        let ranges = session.resolve_address(&entry.file, entry.line).unwrap();
        assert!(ranges.contains(&entry.range));
    }
}

#[test]
fn test_compiland_tables_are_sorted()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    let starts: Vec<u64> = session
        .lines()
        .line_entries_for_compiland(fx.main_unit)
        .unwrap()
        .iter()
        .map(|entry| entry.range.start().value())
        .collect();
    assert_eq!(starts, vec![0x1000, 0x1008, 0x1010, 0x1018]);
    assert!(session.lines().line_entries_for_compiland(fx.empty_unit).unwrap().is_empty());
}

#[test]
fn test_source_files()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    let files = session.lines().source_files(fx.main_unit).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(&*files[0], "C:\\src\\main.c");
    assert_eq!(&*session.lines().source_files(fx.util_unit).unwrap()[0], "/src/util.c");
}

#[test]
fn test_compiland_queries_reject_other_kinds()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    match session.lines().line_entries_for_compiland(fx.function) {
        Err(DebugInfoError::WrongKind { id, expected, actual }) => {
            assert_eq!(id, fx.function);
            assert_eq!(expected, "compiland");
            assert_eq!(actual, SymbolKind::Function);
        }
        other => panic!("Expected WrongKind, got {other:?}"),
    }
}

#[test]
fn test_overlapping_rows_are_clipped_and_reported()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    let entries = session.lines().line_entries_for_compiland(fx.util_unit).unwrap();
    assert_eq!(entries[0].range, AddressRange::new(Address::new(0x2000), 0x10));
    assert_eq!(entries[1].range, AddressRange::new(Address::new(0x2010), 0x10));

    let diagnostics = session.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].stage, DiagnosticStage::LineTable);
    assert_eq!(diagnostics[0].record, Some(fx.util_unit));
    assert!(!session.is_aborted());
}

#[test]
fn test_implied_lengths_stop_at_function_end()
{
    let mut builder = StoreBuilder::new("app.exe");
    let root = builder.root();
    let unit = builder.push(RawRecord::new(SymbolKind::Compiland).named("pad.obj").child_of(root));
    builder.push(RawRecord::new(SymbolKind::Function).named("first").child_of(unit).at(0x3000, 0x10));
    builder.push(RawRecord::new(SymbolKind::Function).named("second").child_of(unit).at(0x3020, 0x10));
    let pad_c = builder.add_file("/src/pad.c");
    builder.add_lines(
        unit,
        [row(0x3000, None, pad_c, 1), row(0x3008, None, pad_c, 2), row(0x3020, None, pad_c, 7)],
    );
    let source = DataSource::from_records("app.exe", builder.build());
    let session = source.create_session().unwrap();

    // 0x3010..0x3020 is padding between the two functions.
    let tail = session.resolve_line(0x300cu64).unwrap();
    assert_eq!(tail.range, AddressRange::new(Address::new(0x3008), 8));
    assert!(matches!(session.resolve_line(0x3010u64), Err(DebugInfoError::NotFound(_))));
    assert!(matches!(session.resolve_line(0x301fu64), Err(DebugInfoError::NotFound(_))));

    // A trailing row without a length ends with its function.
    let last = session.resolve_line(0x302fu64).unwrap();
    assert_eq!(last.range, AddressRange::new(Address::new(0x3020), 0x10));
    assert_eq!(last.line, 7);
    assert!(session.diagnostics().is_empty());
}
