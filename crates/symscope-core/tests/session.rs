//! Tests for symbol lookup through a Session

use std::sync::Arc;

use symscope_core::store::{LineRow, RawRecord, RecordAttrs, StoreBuilder};
use symscope_core::{
    diagnostic_channel, DataKind, DataSource, DebugInfoError, Diagnostic, DiagnosticStage, MatchMode, SessionOptions,
    SymbolId, SymbolKind,
};

struct Fixture
{
    source: DataSource,
    unit: SymbolId,
    main: SymbolId,
    block: SymbolId,
    helper: SymbolId,
    helper_init: SymbolId,
    counter: SymbolId,
    label: SymbolId,
    public_main: SymbolId,
}

fn data(kind: DataKind) -> RecordAttrs
{
    RecordAttrs {
        data_kind: Some(kind),
        ..RecordAttrs::default()
    }
}

fn fixture() -> Fixture
{
    let mut builder = StoreBuilder::new("app.exe");
    let root = builder.root();
    let unit = builder.push(RawRecord::new(SymbolKind::Compiland).named("main.obj").child_of(root).at(0x1000, 0x100));
    let main = builder.push(RawRecord::new(SymbolKind::Function).named("main").child_of(unit).at(0x1000, 0x40));
    let block = builder.push(RawRecord::new(SymbolKind::Block).child_of(main).at(0x1010, 0x10));
    let label = builder.push(RawRecord::new(SymbolKind::Label).named("retry").child_of(main).at(0x1020, 0));
    let helper = builder.push(RawRecord::new(SymbolKind::Function).named("Helper").child_of(unit).at(0x1040, 0x20));
    let helper_init =
        builder.push(RawRecord::new(SymbolKind::Function).named("helper_init").child_of(unit).at(0x1060, 0x10));
    let counter = builder.push(
        RawRecord::new(SymbolKind::Data)
            .named("g_counter")
            .child_of(unit)
            .at(0x2000, 4)
            .with_attrs(data(DataKind::Global)),
    );
    let public_main = builder.push(RawRecord::new(SymbolKind::PublicSymbol).named("main").child_of(root).at(0x1000, 0));

    Fixture {
        source: DataSource::from_records("app.exe", builder.build()),
        unit,
        main,
        block,
        helper,
        helper_init,
        counter,
        label,
        public_main,
    }
}

fn ids<I: IntoIterator<Item = Arc<symscope_core::Symbol>>>(symbols: I) -> Vec<SymbolId>
{
    symbols.into_iter().map(|symbol| symbol.id()).collect()
}

#[test]
fn test_session_is_send()
{
    fn assert_send<T: Send>() {}
    assert_send::<symscope_core::Session>();
}

#[test]
fn test_global_scope()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    let root = session.global_scope().unwrap();
    assert_eq!(root.id(), SymbolId::ROOT);
    assert_eq!(root.kind(), SymbolKind::Exe);
    assert_eq!(root.name(), Some("app.exe"));
    assert_eq!(root.parent(), None);
}

#[test]
fn test_symbols_are_memoized()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    let first = session.symbol(fx.main).unwrap();
    let second = session.symbols().get(fx.main).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let via_name = session.find_unique("main", SymbolKind::Function).unwrap();
    assert!(Arc::ptr_eq(&first, &via_name));
}

#[test]
fn test_sessions_do_not_share_symbols()
{
    let fx = fixture();
    let one = fx.source.create_session().unwrap();
    let two = fx.source.create_session().unwrap();
    let a = one.symbol(fx.main).unwrap();
    let b = two.symbol(fx.main).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.range(), b.range());
}

#[test]
fn test_unknown_id_is_not_found()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    assert!(matches!(session.symbol(SymbolId::new(999)), Err(DebugInfoError::NotFound(_))));
}

#[test]
fn test_ancestors_end_at_global_scope()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    let chain = session.symbols().ancestors(fx.block).unwrap();
    assert_eq!(ids(chain), vec![fx.main, fx.unit, SymbolId::ROOT]);
    assert!(session.symbols().ancestors(SymbolId::ROOT).unwrap().is_empty());
}

#[test]
fn test_children_in_stored_order()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    let children = session.symbols().children(fx.unit).unwrap();
    let expected = vec![fx.main, fx.helper, fx.helper_init, fx.counter];
    assert_eq!(ids(children.iter()), expected);
    // A second pass yields the same sequence.
    assert_eq!(ids(&children), expected);

    for child in children.iter() {
        assert_eq!(child.parent(), Some(fx.unit));
    }
    assert_eq!(ids(session.symbols().children(fx.main).unwrap().iter()), vec![fx.block, fx.label]);
}

#[test]
fn test_by_kind()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    let functions = session.symbols().by_kind(SymbolKind::Function).unwrap();
    assert_eq!(ids(functions.iter()), vec![fx.main, fx.helper, fx.helper_init]);
    assert_eq!(session.symbols().by_kind(SymbolKind::Thunk).unwrap().iter().count(), 0);
}

#[test]
fn test_find_by_name_modes()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    let find = |name: &str, kind: Option<SymbolKind>, mode: MatchMode| {
        ids(session.find_symbols_by_name(name, kind, mode).unwrap().iter())
    };

    assert_eq!(find("Helper", None, MatchMode::Exact), vec![fx.helper]);
    assert_eq!(find("helper", None, MatchMode::Exact), Vec::<SymbolId>::new());
    assert_eq!(find("HELPER", None, MatchMode::ExactIgnoreCase), vec![fx.helper]);
    assert_eq!(find("helper", None, MatchMode::Prefix), vec![fx.helper_init]);
    assert_eq!(find("helper", None, MatchMode::PrefixIgnoreCase), vec![fx.helper, fx.helper_init]);
    assert_eq!(find("^h.*_init$", None, MatchMode::Regex), vec![fx.helper_init]);
    assert_eq!(find("main", None, MatchMode::Exact), vec![fx.main, fx.public_main]);
    assert_eq!(find("main", Some(SymbolKind::PublicSymbol), MatchMode::Exact), vec![fx.public_main]);
}

#[test]
fn test_invalid_regex()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    let result = session.find_symbols_by_name("(unclosed", None, MatchMode::Regex);
    assert!(matches!(result, Err(DebugInfoError::InvalidPattern(_))));
}

#[test]
fn test_find_unique()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    assert_eq!(session.find_unique("g_counter", SymbolKind::Data).unwrap().id(), fx.counter);
    assert!(matches!(
        session.find_unique("g_counter", SymbolKind::Function),
        Err(DebugInfoError::NotFound(_))
    ));

    let mut builder = StoreBuilder::new("dup.exe");
    let root = builder.root();
    builder.push(RawRecord::new(SymbolKind::Function).named("dup").child_of(root).at(0x10, 1));
    builder.push(RawRecord::new(SymbolKind::Function).named("dup").child_of(root).at(0x20, 1));
    let source = DataSource::from_records("dup.exe", builder.build());
    let session = source.create_session().unwrap();
    match session.find_unique("dup", SymbolKind::Function) {
        Err(DebugInfoError::Ambiguous { name, count }) => {
            assert_eq!(name, "dup");
            assert_eq!(count, 2);
        }
        other => panic!("Expected Ambiguous, got {other:?}"),
    }
}

#[test]
fn test_find_by_address_prefers_innermost()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    let at = |address: u64, kind: Option<SymbolKind>| session.find_symbol_by_address(address, kind).map(|s| s.id());

    assert_eq!(at(0x1015, None).unwrap(), fx.block);
    assert_eq!(at(0x1005, None).unwrap(), fx.main);
    assert_eq!(at(0x1015, Some(SymbolKind::Function)).unwrap(), fx.main);
    assert_eq!(at(0x1050, None).unwrap(), fx.helper);
    assert_eq!(at(0x10f0, None).unwrap(), fx.unit);
    assert_eq!(at(0x2003, None).unwrap(), fx.counter);
    assert!(matches!(at(0x5000, None), Err(DebugInfoError::NotFound(_))));
    assert!(matches!(at(0x2004, None), Err(DebugInfoError::NotFound(_))));
}

#[test]
fn test_zero_length_symbols_match_exact_address_only()
{
    let fx = fixture();
    let session = fx.source.create_session().unwrap();
    // The enclosing function wins over the label at the same address.
    assert_eq!(session.find_symbol_by_address(0x1020u64, None).unwrap().id(), fx.main);
    assert_eq!(session.find_symbol_by_address(0x1020u64, Some(SymbolKind::Label)).unwrap().id(), fx.label);
    assert!(session.find_symbol_by_address(0x1021u64, Some(SymbolKind::Label)).is_err());
}

#[test]
fn test_equal_ranges_prefer_deeper_symbol()
{
    let mut builder = StoreBuilder::new("tie.exe");
    let root = builder.root();
    let outer = builder.push(RawRecord::new(SymbolKind::Function).named("outer").child_of(root).at(0x3000, 0x10));
    let inner = builder.push(RawRecord::new(SymbolKind::Block).child_of(outer).at(0x3000, 0x10));
    let source = DataSource::from_records("tie.exe", builder.build());
    let session = source.create_session().unwrap();
    assert_eq!(session.find_symbol_by_address(0x3008u64, None).unwrap().id(), inner);
}

#[test]
fn test_malformed_child_is_skipped_with_diagnostic()
{
    let mut builder = StoreBuilder::new("bad.exe");
    let root = builder.root();
    let func = builder.push(RawRecord::new(SymbolKind::Function).named("f").child_of(root).at(0x10, 0x10));
    let broken = builder.push(RawRecord::new(SymbolKind::Data).named("broken").child_of(root).typed(func));
    let fine = builder.push(RawRecord::new(SymbolKind::Data).named("fine").child_of(root));
    let source = DataSource::from_records("bad.exe", builder.build());

    let (sender, receiver) = diagnostic_channel();
    let session = source.create_session_with(SessionOptions::new().with_diagnostics(sender)).unwrap();

    let children = session.symbols().children(SymbolId::ROOT).unwrap();
    assert_eq!(ids(children.iter()), vec![func, fine]);
    assert_eq!(ids(children.iter()), vec![func, fine]);

    // Reported once per record and stage, however often it is revisited.
    let received: Vec<Diagnostic> = receiver.try_iter().collect();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].record, Some(broken));
    assert_eq!(received[0].stage, DiagnosticStage::Materialize);
    assert_eq!(session.diagnostics(), received);

    assert!(matches!(session.symbol(broken), Err(DebugInfoError::MalformedRecord { id, .. }) if id == broken));
    assert!(!session.is_aborted());
}

#[test]
fn test_load_diagnostics_are_replayed()
{
    let mut builder = StoreBuilder::new("load.exe");
    builder.push_diagnostic(Diagnostic::new(None, DiagnosticStage::Load, "unsupported record 0x1234"));
    let source = DataSource::from_records("load.exe", builder.build());

    let (sender, receiver) = diagnostic_channel();
    let session = source.create_session_with(SessionOptions::new().with_diagnostics(sender)).unwrap();
    let received: Vec<Diagnostic> = receiver.try_iter().collect();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].stage, DiagnosticStage::Load);
    assert!(received[0].message.contains("0x1234"));
    assert_eq!(session.diagnostics().len(), 1);
}

#[test]
fn test_missing_root_is_corrupt()
{
    let source = DataSource::from_records("empty", StoreBuilder::without_root("empty").build());
    assert!(matches!(source.create_session(), Err(DebugInfoError::CorruptStore(_))));
}

#[test]
fn test_structural_failure_aborts_session()
{
    let mut builder = StoreBuilder::new("corrupt.exe");
    let root = builder.root();
    let func = builder.push(RawRecord::new(SymbolKind::Function).named("f").child_of(root).at(0x10, 0x10));
    let file = builder.add_file("f.c");
    // Line tables belong to compilands only.
    builder.add_line(
        func,
        LineRow {
            address: 0x10,
            length: None,
            file,
            line: 1,
            column: None,
        },
    );
    let source = DataSource::from_records("corrupt.exe", builder.build());
    let session = source.create_session().unwrap();

    assert!(session.symbol(func).is_ok());
    assert!(matches!(session.resolve_line(0x10u64), Err(DebugInfoError::CorruptStore(_))));
    assert!(session.is_aborted());
    assert!(matches!(session.global_scope(), Err(DebugInfoError::CorruptStore(_))));
    assert!(matches!(
        session.find_symbols_by_name("f", None, MatchMode::Exact),
        Err(DebugInfoError::CorruptStore(_))
    ));

    // Other Sessions over the same store are unaffected until they hit the same table.
    let other = source.create_session().unwrap();
    assert!(other.symbol(func).is_ok());
}

#[test]
fn test_session_outlives_source_handle()
{
    let fx = fixture();
    let main = fx.main;
    let session = fx.source.create_session().unwrap();
    assert!(session.source().is_some());
    drop(fx);
    assert!(session.source().is_none());
    assert_eq!(session.symbol(main).unwrap().name(), Some("main"));
}

#[test]
fn test_decorated_publics_are_found_by_readable_name()
{
    let mut builder = StoreBuilder::new("app.pdb");
    let root = builder.root();
    let public = |name: &str, address: u64| {
        RawRecord::new(SymbolKind::PublicSymbol).named(name).child_of(root).at(address, 0)
    };
    let msvc = builder.push(public("?bar@ns@@YAHH@Z", 0x1000));
    let itanium = builder.push(public("_ZN2ns3bazEi", 0x1010));
    let source = DataSource::from_records("app.pdb", builder.build());
    let session = source.create_session().unwrap();

    let found = session.find_unique("ns::bar", SymbolKind::PublicSymbol).unwrap();
    assert_eq!(found.id(), msvc);
    assert_eq!(found.name(), Some("ns::bar"));
    assert_eq!(found.symbol_name().unwrap().raw(), "?bar@ns@@YAHH@Z");
    assert_eq!(session.find_unique("?bar@ns@@YAHH@Z", SymbolKind::PublicSymbol).unwrap().id(), msvc);

    assert_eq!(ids(session.find_symbols_by_name("ns::", None, MatchMode::Prefix).unwrap().iter()), vec![msvc, itanium]);
}
