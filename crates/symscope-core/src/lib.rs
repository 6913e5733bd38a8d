//! # symscope-core
//!
//! Debug-information access layer for compiled binaries.
//!
//! This crate opens a binary together with its debug store and answers
//! questions about it:
//! - Symbols by name, by address, by kind, and by containment
//! - Types with resolved members, bases, pointees and forward declarations
//! - Source lines for addresses and addresses for source lines
//!
//! ## Supported stores
//!
//! - **PE + PDB**: located through the image's CodeView record, next to the
//!   image, or on a symbol path (`_NT_SYMBOL_PATH`, `SYMSCOPE_SYMBOL_PATH`)
//! - **ELF + DWARF**: embedded, or in a `.gnu_debuglink` / build-id companion
//! - **Mach-O + DWARF**: embedded, or in a `.dSYM` bundle
//!
//! Container and stream parsing is delegated to `object`, `pdb` and `gimli`;
//! every backend is converted into the same [`store::RecordStore`] and queried
//! through one object model.
//!
//! ## Example
//!
//! ```rust,no_run
//! use symscope_core::{DataSource, MatchMode, SymbolKind};
//!
//! let source = DataSource::open("target/debug/app")?;
//! let session = source.create_session()?;
//! for function in session.find_symbols_by_name("main", Some(SymbolKind::Function), MatchMode::Exact)?.iter() {
//!     let line = session.resolve_line(function.address().unwrap_or_default())?;
//!     println!("{function} at {line}");
//! }
//! # Ok::<(), symscope_core::DebugInfoError>(())
//! ```

pub(crate) mod demangle;
pub mod diagnostics;
pub mod error;
pub(crate) mod interval;
pub mod lines;
pub(crate) mod loader;
pub mod session;
pub mod source;
pub mod store;
pub mod symbols;
pub mod typegraph;
pub mod types;

pub use diagnostics::{diagnostic_channel, Diagnostic, DiagnosticReceiver, DiagnosticSender, DiagnosticStage};
// Re-export commonly used types
pub use error::{DebugInfoError, Result};
pub use lines::{LineEntry, LineMapper};
pub use session::{Session, SessionOptions};
pub use source::{DataSource, Export, OpenOptions};
pub use symbols::{ChildIter, Children, KindIter, KindQuery, MatchMode, NameQuery, Symbol, SymbolIndex, SymbolIter};
pub use typegraph::{
    BaseClass, Enumerator, Member, Signature, TypeCategory, TypeEdge, TypeGraph, TypeSymbol, TypeVisit, TypeWalk,
};
pub use types::{
    Address, AddressRange, Architecture, BasicType, BitField, DataKind, DebugSignature, Qualifiers, SourceFormat,
    SymbolId, SymbolKind, SymbolLanguage, SymbolName, UdtKind,
};
