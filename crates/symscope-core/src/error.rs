//! # Error Types
//!
//! Error handling for debug-information access.
//!
//! Two kinds of corruption are distinguished:
//!
//! - **Record-level**: a single record is inconsistent (dangling parent, type
//!   reference to nowhere, unparsable provider record). Enumerations skip it and
//!   emit a [`Diagnostic`](crate::Diagnostic); a direct lookup of that record
//!   returns [`DebugInfoError::MalformedRecord`].
//! - **Structural**: a table the whole store depends on is inconsistent (root
//!   record, stream headers, line tables keyed to unknown compilands). This is
//!   [`DebugInfoError::CorruptStore`] and aborts the Session that observed it.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{SymbolId, SymbolKind};

/// Main error type for debug-information operations
#[derive(Error, Debug)]
pub enum DebugInfoError
{
    /// A file, debug store, symbol, or line mapping does not exist
    ///
    /// Returned when:
    /// - `open` is given a path with no file behind it
    /// - `create_session` is called on a source without any debug store
    /// - an address or file/line pair has no mapping
    /// - `find_unique` matches nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// The file is not a recognized image or symbol store
    #[error("Unrecognized format: {0}")]
    Format(String),

    /// A candidate debug store was found but its signature does not match the binary
    ///
    /// `expected` is the signature embedded in the image and `found` the one
    /// read from the last candidate examined.
    #[error("Debug store {} does not match the image: expected {expected}, found {found}", store.display())]
    Mismatch
    {
        store: PathBuf,
        expected: String,
        found: String,
    },

    /// The store's structural tables are inconsistent
    ///
    /// Once a Session sees this error every later query on it fails with the
    /// same message.
    #[error("Corrupt debug store: {0}")]
    CorruptStore(String),

    /// The symbol exists but has the wrong kind for the requested operation
    #[error("Symbol {id} is a {actual}, expected {expected}")]
    WrongKind
    {
        id: SymbolId,
        expected: &'static str,
        actual: SymbolKind,
    },

    /// The record behind this identifier is malformed and was skipped
    #[error("Malformed record {id}: {reason}")]
    MalformedRecord
    {
        id: SymbolId,
        reason: String,
    },

    /// An exact lookup that requires one match found several
    #[error("{count} symbols named '{name}', expected exactly one")]
    Ambiguous
    {
        name: String,
        count: usize,
    },

    /// A regular-expression name pattern failed to compile
    #[error("Invalid name pattern: {0}")]
    InvalidPattern(String),

    /// I/O errors (reading images or symbol stores)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for debug-information operations
pub type Result<T> = std::result::Result<T, DebugInfoError>;

impl From<regex::Error> for DebugInfoError
{
    fn from(err: regex::Error) -> Self
    {
        DebugInfoError::InvalidPattern(err.to_string())
    }
}

impl DebugInfoError
{
    /// Whether this error aborts the Session that produced it.
    pub fn is_structural(&self) -> bool
    {
        matches!(self, DebugInfoError::CorruptStore(_))
    }
}

/// Wrap a gimli error with context.
pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> DebugInfoError
{
    DebugInfoError::CorruptStore(format!("{context}: {err}"))
}

/// Wrap a pdb error with context.
///
/// Missing streams and I/O failures keep their own meaning; everything else is
/// treated as structural corruption of the store.
pub(crate) fn map_pdb_error(context: &str, err: pdb::Error) -> DebugInfoError
{
    match err {
        pdb::Error::IoError(io) => DebugInfoError::Io(io),
        pdb::Error::UnrecognizedFileFormat => DebugInfoError::Format(format!("{context}: not an MSF 7.00 file")),
        other => DebugInfoError::CorruptStore(format!("{context}: {other}")),
    }
}

/// Wrap an object error with context.
pub(crate) fn map_object_error(context: &str, err: object::Error) -> DebugInfoError
{
    DebugInfoError::Format(format!("{context}: {err}"))
}
