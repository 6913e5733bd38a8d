//! # Session
//!
//! The active query context over one loaded store.
//!
//! A Session owns every memo cache used by queries: materialized symbols,
//! the name and address indexes, the line tables, and the map from type
//! names to their definitions. Each cache is built on first use. Sessions are
//! `Send` but not `Sync` (the caches sit behind `RefCell` and
//! `once_cell::unsync::OnceCell`), so one Session can move to a worker thread
//! but never be shared. Open one Session per thread instead; they all share
//! the same immutable [`RecordStore`].
//!
//! ## Failure semantics
//!
//! - Record-level corruption is skipped. A [`Diagnostic`] is logged with
//!   `tracing::warn!`, stored in the snapshot returned by
//!   [`Session::diagnostics`], and sent on the optional channel.
//! - Structural corruption is fatal. The query that hits it returns
//!   [`DebugInfoError::CorruptStore`] and so does every later query.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use once_cell::unsync::OnceCell;
use tracing::{debug, warn};

use crate::diagnostics::{Diagnostic, DiagnosticSender, DiagnosticStage};
use crate::error::{DebugInfoError, Result};
use crate::lines::{LineEntry, LineIndex, LineMapper};
use crate::source::{DataSource, SourceInner};
use crate::store::RecordStore;
use crate::symbols::address::AddressIndex;
use crate::symbols::names::NameIndex;
use crate::symbols::{materialize, MatchMode, NameQuery, Symbol, SymbolIndex};
use crate::typegraph::TypeGraph;
use crate::types::{Address, AddressRange, SymbolId, SymbolKind};

/// Options for [`DataSource::create_session_with`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions
{
    diagnostics: Option<DiagnosticSender>,
}

impl SessionOptions
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Send every diagnostic raised by the Session to `sender`.
    ///
    /// Diagnostics recorded while the store was loaded are replayed first.
    #[must_use]
    pub fn with_diagnostics(mut self, sender: DiagnosticSender) -> Self
    {
        self.diagnostics = Some(sender);
        self
    }
}

#[derive(Debug)]
struct DiagnosticSink
{
    sender: Option<DiagnosticSender>,
    reported: RefCell<HashSet<(SymbolId, DiagnosticStage)>>,
    log: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticSink
{
    fn emit(&self, diagnostic: Diagnostic)
    {
        // One report per record and stage; enumerations revisit records freely.
        if let Some(id) = diagnostic.record {
            if !self.reported.borrow_mut().insert((id, diagnostic.stage)) {
                return;
            }
        }

        warn!(record = ?diagnostic.record, stage = %diagnostic.stage, "{}", diagnostic.message);
        if let Some(sender) = &self.sender {
            // A dropped receiver only means nobody is listening any more.
            let _ = sender.send(diagnostic.clone());
        }
        self.log.borrow_mut().push(diagnostic);
    }
}

/// Live query context.
///
/// Obtained from [`DataSource::create_session`]. See the [module
/// documentation](self) for caching and failure semantics.
#[derive(Debug)]
pub struct Session
{
    source: Weak<SourceInner>,
    store: Arc<RecordStore>,
    memo: RefCell<HashMap<SymbolId, Arc<Symbol>>>,
    names: OnceCell<NameIndex>,
    folded_names: OnceCell<NameIndex>,
    addresses: OnceCell<AddressIndex>,
    lines: OnceCell<LineIndex>,
    definitions: OnceCell<HashMap<(SymbolKind, String), SymbolId>>,
    sink: DiagnosticSink,
    aborted: RefCell<Option<String>>,
}

impl Session
{
    pub(crate) fn new(source: Weak<SourceInner>, store: Arc<RecordStore>, options: SessionOptions) -> Self
    {
        let session = Self {
            source,
            store,
            memo: RefCell::new(HashMap::new()),
            names: OnceCell::new(),
            folded_names: OnceCell::new(),
            addresses: OnceCell::new(),
            lines: OnceCell::new(),
            definitions: OnceCell::new(),
            sink: DiagnosticSink {
                sender: options.diagnostics,
                reported: RefCell::new(HashSet::new()),
                log: RefCell::new(Vec::new()),
            },
            aborted: RefCell::new(None),
        };

        for diagnostic in session.store.load_diagnostics() {
            session.sink.emit(diagnostic.clone());
        }
        debug!(store = %session.store.header().name, "session created");
        session
    }

    /// Root symbol of the store (kind `Exe`).
    ///
    /// ## Errors
    ///
    /// [`DebugInfoError::CorruptStore`] if the Session was aborted.
    pub fn global_scope(&self) -> Result<Arc<Symbol>>
    {
        self.symbol(SymbolId::ROOT)
    }

    /// Symbol by identifier, memoized.
    ///
    /// ## Errors
    ///
    /// - [`DebugInfoError::NotFound`] if no such symbol exists
    /// - [`DebugInfoError::MalformedRecord`] if the record was skipped as malformed
    /// - [`DebugInfoError::CorruptStore`] if the Session was aborted
    pub fn symbol(&self, id: SymbolId) -> Result<Arc<Symbol>>
    {
        self.ensure_alive()?;
        self.materialize(id)
    }

    /// Lazily matched symbols by name.
    ///
    /// `kind` restricts the result to one symbol kind. Both the stored name
    /// and its demangled form are matched. The returned query can be iterated
    /// any number of times; it yields nothing when no symbol matches.
    ///
    /// ## Errors
    ///
    /// - [`DebugInfoError::InvalidPattern`] if a [`MatchMode::Regex`] pattern does not compile
    /// - [`DebugInfoError::CorruptStore`] if the Session was aborted
    ///
    /// ## Example
    ///
    /// ```rust
    /// use symscope_core::store::{RawRecord, StoreBuilder};
    /// use symscope_core::{DataSource, MatchMode, SymbolKind};
    ///
    /// let mut builder = StoreBuilder::new("demo");
    /// let root = builder.root();
    /// builder.push(RawRecord::new(SymbolKind::Function).named("DbgPrint").child_of(root).at(0x1000, 0x10));
    /// let source = DataSource::from_records("demo", builder.build());
    /// let session = source.create_session()?;
    ///
    /// let query = session.find_symbols_by_name("dbgprint", None, MatchMode::ExactIgnoreCase)?;
    /// let found: Vec<_> = query.iter().collect();
    /// assert_eq!(found.len(), 1);
    /// # Ok::<(), symscope_core::DebugInfoError>(())
    /// ```
    pub fn find_symbols_by_name(&self, name: &str, kind: Option<SymbolKind>, mode: MatchMode) -> Result<NameQuery<'_>>
    {
        self.ensure_alive()?;
        NameQuery::new(self, name, kind, mode)
    }

    /// Exact lookup that requires exactly one match.
    ///
    /// ## Errors
    ///
    /// - [`DebugInfoError::NotFound`] when nothing matches
    /// - [`DebugInfoError::Ambiguous`] when several symbols match
    /// - [`DebugInfoError::CorruptStore`] if the Session was aborted
    pub fn find_unique(&self, name: &str, kind: SymbolKind) -> Result<Arc<Symbol>>
    {
        let mut matches = self.find_symbols_by_name(name, Some(kind), MatchMode::Exact)?.iter();
        let first = matches
            .next()
            .ok_or_else(|| DebugInfoError::NotFound(format!("no {kind} named '{name}'")))?;
        let rest = matches.count();
        if rest > 0 {
            return Err(DebugInfoError::Ambiguous {
                name: name.to_string(),
                count: rest + 1,
            });
        }
        Ok(first)
    }

    /// Innermost symbol whose range encloses `address`.
    ///
    /// The smallest enclosing range wins; equal sizes prefer the symbol deeper
    /// in the containment tree, then the lower id. Zero-length symbols
    /// (labels, publics) match only their exact address and only when no sized
    /// range encloses it.
    ///
    /// ## Errors
    ///
    /// - [`DebugInfoError::NotFound`] if nothing encloses the address
    /// - [`DebugInfoError::CorruptStore`] if the Session was aborted
    pub fn find_symbol_by_address(&self, address: impl Into<Address>, kind: Option<SymbolKind>) -> Result<Arc<Symbol>>
    {
        self.symbols().at_address(address, kind)
    }

    /// Source line covering `address`.
    ///
    /// ## Errors
    ///
    /// - [`DebugInfoError::NotFound`] if no line entry covers the address
    /// - [`DebugInfoError::CorruptStore`] if the line tables are inconsistent (aborts the Session)
    pub fn resolve_line(&self, address: impl Into<Address>) -> Result<LineEntry>
    {
        self.lines().resolve_line(address)
    }

    /// Every address range mapped to `file`:`line`.
    ///
    /// ## Errors
    ///
    /// - [`DebugInfoError::NotFound`] if nothing maps to that line
    /// - [`DebugInfoError::CorruptStore`] if the line tables are inconsistent (aborts the Session)
    pub fn resolve_address(&self, file: &str, line: u32) -> Result<Vec<AddressRange>>
    {
        self.lines().resolve_address(file, line)
    }

    /// Containment, kind, and address view of the symbol table.
    pub fn symbols(&self) -> SymbolIndex<'_>
    {
        SymbolIndex::new(self)
    }

    /// Typed projection of the type symbols.
    pub fn types(&self) -> TypeGraph<'_>
    {
        TypeGraph::new(self)
    }

    /// Address and source-line mappings.
    pub fn lines(&self) -> LineMapper<'_>
    {
        LineMapper::new(self)
    }

    /// Snapshot of the diagnostics emitted so far.
    pub fn diagnostics(&self) -> Vec<Diagnostic>
    {
        self.sink.log.borrow().clone()
    }

    /// The DataSource this Session came from, if it is still alive.
    pub fn source(&self) -> Option<DataSource>
    {
        self.source.upgrade().map(DataSource::from_inner)
    }

    /// The shared store.
    pub fn store(&self) -> &RecordStore
    {
        &self.store
    }

    /// Whether a structural failure aborted this Session.
    pub fn is_aborted(&self) -> bool
    {
        self.aborted.borrow().is_some()
    }

    pub(crate) fn ensure_alive(&self) -> Result<()>
    {
        match &*self.aborted.borrow() {
            Some(message) => Err(DebugInfoError::CorruptStore(message.clone())),
            None => Ok(()),
        }
    }

    /// Pass `result` through, aborting the Session on structural errors.
    pub(crate) fn guard<T>(&self, result: Result<T>) -> Result<T>
    {
        if let Err(DebugInfoError::CorruptStore(message)) = &result {
            let mut aborted = self.aborted.borrow_mut();
            if aborted.is_none() {
                warn!(store = %self.store.header().name, "session aborted: {message}");
                *aborted = Some(message.clone());
            }
        }
        result
    }

    pub(crate) fn emit(&self, diagnostic: Diagnostic)
    {
        self.sink.emit(diagnostic);
    }

    /// Memoized materialization, without the liveness check.
    pub(crate) fn materialize(&self, id: SymbolId) -> Result<Arc<Symbol>>
    {
        if let Some(symbol) = self.memo.borrow().get(&id) {
            return Ok(Arc::clone(symbol));
        }
        let symbol = Arc::new(materialize(&self.store, id)?);
        self.memo.borrow_mut().insert(id, Arc::clone(&symbol));
        Ok(symbol)
    }

    /// Materialize for an enumeration: malformed records become a diagnostic and `None`.
    pub(crate) fn materialize_or_skip(&self, id: SymbolId, stage: DiagnosticStage) -> Option<Arc<Symbol>>
    {
        match self.materialize(id) {
            Ok(symbol) => Some(symbol),
            Err(DebugInfoError::MalformedRecord { id, reason }) => {
                self.emit(Diagnostic::new(Some(id), stage, format!("skipped malformed record: {reason}")));
                None
            }
            Err(err) => {
                self.emit(Diagnostic::new(Some(id), stage, format!("skipped record: {err}")));
                None
            }
        }
    }

    pub(crate) fn name_index(&self, fold_case: bool) -> &NameIndex
    {
        let cell = if fold_case { &self.folded_names } else { &self.names };
        cell.get_or_init(|| NameIndex::build(&self.store, fold_case))
    }

    pub(crate) fn address_index(&self) -> &AddressIndex
    {
        self.addresses.get_or_init(|| AddressIndex::build(&self.store))
    }

    pub(crate) fn line_index(&self) -> Result<&LineIndex>
    {
        self.ensure_alive()?;
        let result = self.lines.get_or_try_init(|| LineIndex::build(self));
        self.guard(result)
    }

    /// Map from (kind, name) to the first non-forward definition.
    pub(crate) fn definitions(&self) -> &HashMap<(SymbolKind, String), SymbolId>
    {
        self.definitions.get_or_init(|| {
            let mut map = HashMap::new();
            for id in self.store.ids() {
                if self.store.malformed_reason(id).is_some() {
                    continue;
                }
                let Some(record) = self.store.record(id) else {
                    continue;
                };
                let (Some(kind), Some(name)) = (record.kind(), record.name.as_ref()) else {
                    continue;
                };
                if matches!(kind, SymbolKind::Udt | SymbolKind::Enum) && !record.attrs.forward {
                    map.entry((kind, name.clone())).or_insert(id);
                }
            }
            debug!(definitions = map.len(), "built type definition index");
            map
        })
    }
}
