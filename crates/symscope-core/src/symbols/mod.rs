//! # Symbol Index
//!
//! Navigable, lazily materialized view over the symbol table.
//!
//! Every enumeration here is a query value: constructing it checks the
//! Session and validates arguments, and each call to `iter()` starts a fresh
//! pass. Symbols are materialized one at a time as the iterator advances, and
//! memoized by the Session. Malformed records met along the way are skipped
//! with a diagnostic.

pub(crate) mod address;
pub(crate) mod names;
mod symbol;

use std::sync::Arc;

use regex::RegexBuilder;

pub(crate) use symbol::materialize;
pub use symbol::Symbol;

use crate::diagnostics::DiagnosticStage;
use crate::error::{DebugInfoError, Result};
use crate::session::Session;
use crate::types::{Address, SymbolId, SymbolKind};

/// How [`Session::find_symbols_by_name`] compares names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatchMode
{
    /// Whole name, case-sensitive.
    #[default]
    Exact,
    /// Whole name, ignoring ASCII and Unicode case.
    ExactIgnoreCase,
    /// Name starts with the pattern, case-sensitive.
    Prefix,
    /// Name starts with the pattern, ignoring case.
    PrefixIgnoreCase,
    /// Regular expression (`regex` syntax) that must match somewhere in the
    /// name; anchor it with `^...$` for whole-name matches and use `(?i)` to
    /// ignore case.
    Regex,
}

#[derive(Debug, Clone)]
enum NameMatcher
{
    Exact
    {
        key: String,
        fold: bool,
    },
    Prefix
    {
        key: String,
        fold: bool,
    },
    Regex(regex::Regex),
}

/// Symbols matching a name, restricted to an optional kind.
#[derive(Debug, Clone)]
pub struct NameQuery<'s>
{
    session: &'s Session,
    matcher: NameMatcher,
    kind: Option<SymbolKind>,
}

impl<'s> NameQuery<'s>
{
    pub(crate) fn new(session: &'s Session, name: &str, kind: Option<SymbolKind>, mode: MatchMode) -> Result<Self>
    {
        let matcher = match mode {
            MatchMode::Exact => NameMatcher::Exact {
                key: name.to_string(),
                fold: false,
            },
            MatchMode::ExactIgnoreCase => NameMatcher::Exact {
                key: name.to_lowercase(),
                fold: true,
            },
            MatchMode::Prefix => NameMatcher::Prefix {
                key: name.to_string(),
                fold: false,
            },
            MatchMode::PrefixIgnoreCase => NameMatcher::Prefix {
                key: name.to_lowercase(),
                fold: true,
            },
            MatchMode::Regex => NameMatcher::Regex(RegexBuilder::new(name).build()?),
        };
        Ok(Self { session, matcher, kind })
    }

    /// Start a pass over the matching symbols, in store order.
    pub fn iter(&self) -> SymbolIter<'s>
    {
        let mut ids: Vec<SymbolId> = match &self.matcher {
            NameMatcher::Exact { key, fold } => self.session.name_index(*fold).exact(key).collect(),
            NameMatcher::Prefix { key, fold } => self.session.name_index(*fold).prefix(key).collect(),
            NameMatcher::Regex(regex) => self.session.name_index(false).matching(regex).collect(),
        };
        ids.sort_unstable();
        ids.dedup();
        if let Some(kind) = self.kind {
            let store = self.session.store();
            ids.retain(|id| store.record(*id).and_then(|record| record.kind()) == Some(kind));
        }
        SymbolIter::new(self.session, ids)
    }
}

impl<'s> IntoIterator for &NameQuery<'s>
{
    type Item = Arc<Symbol>;
    type IntoIter = SymbolIter<'s>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.iter()
    }
}

/// Lazily materializing iterator over a list of identifiers.
#[derive(Debug)]
pub struct SymbolIter<'s>
{
    session: &'s Session,
    ids: std::vec::IntoIter<SymbolId>,
}

impl<'s> SymbolIter<'s>
{
    fn new(session: &'s Session, ids: Vec<SymbolId>) -> Self
    {
        Self {
            session,
            ids: ids.into_iter(),
        }
    }
}

impl Iterator for SymbolIter<'_>
{
    type Item = Arc<Symbol>;

    fn next(&mut self) -> Option<Self::Item>
    {
        for id in self.ids.by_ref() {
            if let Some(symbol) = self.session.materialize_or_skip(id, DiagnosticStage::Materialize) {
                return Some(symbol);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>)
    {
        (0, Some(self.ids.len()))
    }
}

/// Children of one symbol, in stored order.
#[derive(Debug, Clone, Copy)]
pub struct Children<'s>
{
    session: &'s Session,
    parent: SymbolId,
}

impl<'s> Children<'s>
{
    /// Start a pass over the children.
    pub fn iter(&self) -> ChildIter<'s>
    {
        ChildIter {
            session: self.session,
            ids: self.session.store().children(self.parent).iter(),
        }
    }

    /// Identifier of the parent.
    pub fn parent(&self) -> SymbolId
    {
        self.parent
    }
}

impl<'s> IntoIterator for &Children<'s>
{
    type Item = Arc<Symbol>;
    type IntoIter = ChildIter<'s>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.iter()
    }
}

/// Iterator over [`Children`].
#[derive(Debug, Clone)]
pub struct ChildIter<'s>
{
    session: &'s Session,
    ids: std::slice::Iter<'s, SymbolId>,
}

impl Iterator for ChildIter<'_>
{
    type Item = Arc<Symbol>;

    fn next(&mut self) -> Option<Self::Item>
    {
        for id in self.ids.by_ref() {
            if let Some(symbol) = self.session.materialize_or_skip(*id, DiagnosticStage::Materialize) {
                return Some(symbol);
            }
        }
        None
    }
}

/// Every symbol of one kind, across the whole store.
#[derive(Debug, Clone, Copy)]
pub struct KindQuery<'s>
{
    session: &'s Session,
    kind: SymbolKind,
}

impl<'s> KindQuery<'s>
{
    /// Start a pass over the store.
    pub fn iter(&self) -> KindIter<'s>
    {
        KindIter {
            session: self.session,
            kind: self.kind,
            next: 0,
        }
    }
}

impl<'s> IntoIterator for &KindQuery<'s>
{
    type Item = Arc<Symbol>;
    type IntoIter = KindIter<'s>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.iter()
    }
}

/// Iterator over [`KindQuery`]; scans the record table as it advances.
#[derive(Debug, Clone)]
pub struct KindIter<'s>
{
    session: &'s Session,
    kind: SymbolKind,
    next: usize,
}

impl Iterator for KindIter<'_>
{
    type Item = Arc<Symbol>;

    fn next(&mut self) -> Option<Self::Item>
    {
        let store = self.session.store();
        while self.next < store.len() {
            let id = SymbolId::from_index(self.next)?;
            self.next += 1;
            if store.record(id).and_then(|record| record.kind()) != Some(self.kind) {
                continue;
            }
            if let Some(symbol) = self.session.materialize_or_skip(id, DiagnosticStage::Materialize) {
                return Some(symbol);
            }
        }
        None
    }
}

/// View over the symbol table of one Session.
#[derive(Debug, Clone, Copy)]
pub struct SymbolIndex<'s>
{
    session: &'s Session,
}

impl<'s> SymbolIndex<'s>
{
    pub(crate) fn new(session: &'s Session) -> Self
    {
        Self { session }
    }

    /// Memoized lookup: the same `Arc<Symbol>` for every call with the same id.
    ///
    /// ## Errors
    ///
    /// Same as [`Session::symbol`].
    pub fn get(&self, id: SymbolId) -> Result<Arc<Symbol>>
    {
        self.session.symbol(id)
    }

    /// Children of `id` in stored order.
    ///
    /// ## Errors
    ///
    /// Fails if `id` itself cannot be materialized or the Session was aborted.
    pub fn children(&self, id: SymbolId) -> Result<Children<'s>>
    {
        self.session.symbol(id)?;
        Ok(Children {
            session: self.session,
            parent: id,
        })
    }

    /// Ancestors of `id`, from its parent up to and including the global scope.
    ///
    /// The global scope itself has no ancestors.
    ///
    /// ## Errors
    ///
    /// Fails if `id` cannot be materialized or the Session was aborted.
    pub fn ancestors(&self, id: SymbolId) -> Result<Vec<Arc<Symbol>>>
    {
        let mut current = self.session.symbol(id)?;
        let mut chain = Vec::new();
        // Parents always precede their children, so the walk is finite.
        while let Some(parent) = current.parent() {
            current = self.session.materialize(parent)?;
            chain.push(Arc::clone(&current));
        }
        Ok(chain)
    }

    /// Every symbol of `kind`, scanned lazily.
    ///
    /// ## Errors
    ///
    /// [`DebugInfoError::CorruptStore`] if the Session was aborted.
    pub fn by_kind(&self, kind: SymbolKind) -> Result<KindQuery<'s>>
    {
        self.session.ensure_alive()?;
        Ok(KindQuery {
            session: self.session,
            kind,
        })
    }

    /// Same as [`Session::find_symbols_by_name`].
    ///
    /// ## Errors
    ///
    /// Same as [`Session::find_symbols_by_name`].
    pub fn by_name(&self, name: &str, kind: Option<SymbolKind>, mode: MatchMode) -> Result<NameQuery<'s>>
    {
        self.session.find_symbols_by_name(name, kind, mode)
    }

    /// Innermost symbol enclosing `address`; see [`Session::find_symbol_by_address`].
    ///
    /// ## Errors
    ///
    /// Same as [`Session::find_symbol_by_address`].
    pub fn at_address(&self, address: impl Into<Address>, kind: Option<SymbolKind>) -> Result<Arc<Symbol>>
    {
        self.session.ensure_alive()?;
        let address = address.into();
        let id = self
            .session
            .address_index()
            .lookup(address.value(), kind)
            .ok_or_else(|| DebugInfoError::NotFound(format!("no symbol at {address}")))?;
        self.session.materialize(id)
    }
}
