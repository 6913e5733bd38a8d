//! Symbol identifiers and names.

use std::fmt;

/// Store-local symbol identifier.
///
/// Identifiers are indices into the record table of one store. They are
/// stable for the lifetime of the store and meaningless across stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(u32);

impl SymbolId
{
    /// The global scope (`Exe`) record is always the first record.
    pub const ROOT: Self = SymbolId(0);

    /// Create an identifier from its raw index.
    pub const fn new(raw: u32) -> Self
    {
        SymbolId(raw)
    }

    /// Raw index.
    pub const fn raw(self) -> u32
    {
        self.0
    }

    pub(crate) fn index(self) -> usize
    {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Option<Self>
    {
        u32::try_from(index).ok().map(SymbolId)
    }
}

impl fmt::Display for SymbolId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for SymbolId
{
    fn from(raw: u32) -> Self
    {
        SymbolId(raw)
    }
}

/// Programming language associated with a symbol name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLanguage
{
    /// Rust symbol (legacy or v0 mangling, or a `::` path).
    Rust,
    /// C++ symbol (Itanium `_Z` or MSVC `?` decoration).
    Cpp,
    /// C symbol or other plain identifier.
    C,
    /// Nothing to go on.
    Unknown,
}

impl fmt::Display for SymbolLanguage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SymbolLanguage::Rust => "rust",
            SymbolLanguage::Cpp => "c++",
            SymbolLanguage::C => "c",
            SymbolLanguage::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// A symbol name as stored, plus its demangled form when one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolName
{
    raw: String,
    demangled: Option<String>,
    language: SymbolLanguage,
}

impl SymbolName
{
    /// Construct from a stored name.
    pub fn new(raw: String, demangled: Option<String>, language: SymbolLanguage) -> Self
    {
        Self {
            raw,
            demangled,
            language,
        }
    }

    /// Name exactly as recorded in the debug store.
    pub fn raw(&self) -> &str
    {
        &self.raw
    }

    /// Demangled form, if the raw name was mangled.
    pub fn demangled(&self) -> Option<&str>
    {
        self.demangled.as_deref()
    }

    /// Preferred presentation (demangled, falling back to raw).
    pub fn display_name(&self) -> &str
    {
        self.demangled.as_deref().unwrap_or(&self.raw)
    }

    /// Language classification for the name.
    pub fn language(&self) -> SymbolLanguage
    {
        self.language
    }
}

impl fmt::Display for SymbolName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.display_name())
    }
}
