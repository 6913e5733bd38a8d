//! # Symbol Kinds and Attributes
//!
//! The closed set of symbol kinds a store can hold, and the kind-specific
//! attribute enums attached to them. The vocabulary follows the PDB symbol
//! model; the DWARF loader maps its tags onto the same kinds.

use std::fmt;

/// Kind of a symbol record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind
{
    /// Global scope of the store; exactly one, always [`SymbolId::ROOT`](crate::SymbolId::ROOT).
    Exe,
    /// One translation unit / object module.
    Compiland,
    /// Function with code.
    Function,
    /// Lexical block inside a function.
    Block,
    /// Inlined call site.
    InlineSite,
    /// Thunk / trampoline.
    Thunk,
    /// Variable, parameter, member, or named constant; see [`DataKind`].
    Data,
    /// Code label.
    Label,
    /// Public (exported or linker-visible) symbol.
    PublicSymbol,
    /// Struct, class, union, or interface.
    Udt,
    /// Enumeration type.
    Enum,
    /// Function signature type.
    FunctionType,
    /// One argument of a function signature.
    FunctionArgType,
    /// Pointer or reference type.
    PointerType,
    /// Array type.
    ArrayType,
    /// Built-in scalar type.
    BaseType,
    /// Type alias.
    Typedef,
    /// Base class entry of a UDT.
    BaseClass,
}

impl SymbolKind
{
    /// Every kind, in declaration order.
    pub const ALL: [SymbolKind; 18] = [
        SymbolKind::Exe,
        SymbolKind::Compiland,
        SymbolKind::Function,
        SymbolKind::Block,
        SymbolKind::InlineSite,
        SymbolKind::Thunk,
        SymbolKind::Data,
        SymbolKind::Label,
        SymbolKind::PublicSymbol,
        SymbolKind::Udt,
        SymbolKind::Enum,
        SymbolKind::FunctionType,
        SymbolKind::FunctionArgType,
        SymbolKind::PointerType,
        SymbolKind::ArrayType,
        SymbolKind::BaseType,
        SymbolKind::Typedef,
        SymbolKind::BaseClass,
    ];

    /// Whether symbols of this kind are types (projectable into the type graph).
    pub const fn is_type(self) -> bool
    {
        matches!(
            self,
            SymbolKind::Udt
                | SymbolKind::Enum
                | SymbolKind::FunctionType
                | SymbolKind::PointerType
                | SymbolKind::ArrayType
                | SymbolKind::BaseType
                | SymbolKind::Typedef
        )
    }

    /// Whether symbols of this kind describe code ranges (scopes for address lookup).
    pub const fn is_scope(self) -> bool
    {
        matches!(
            self,
            SymbolKind::Compiland
                | SymbolKind::Function
                | SymbolKind::Block
                | SymbolKind::InlineSite
                | SymbolKind::Thunk
        )
    }

    /// Lower-case name, as accepted by [`str::parse`].
    pub const fn as_str(self) -> &'static str
    {
        match self {
            SymbolKind::Exe => "exe",
            SymbolKind::Compiland => "compiland",
            SymbolKind::Function => "function",
            SymbolKind::Block => "block",
            SymbolKind::InlineSite => "inline-site",
            SymbolKind::Thunk => "thunk",
            SymbolKind::Data => "data",
            SymbolKind::Label => "label",
            SymbolKind::PublicSymbol => "public",
            SymbolKind::Udt => "udt",
            SymbolKind::Enum => "enum",
            SymbolKind::FunctionType => "function-type",
            SymbolKind::FunctionArgType => "function-arg-type",
            SymbolKind::PointerType => "pointer-type",
            SymbolKind::ArrayType => "array-type",
            SymbolKind::BaseType => "base-type",
            SymbolKind::Typedef => "typedef",
            SymbolKind::BaseClass => "base-class",
        }
    }
}

impl fmt::Display for SymbolKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SymbolKind
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        SymbolKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown symbol kind '{s}'"))
    }
}

/// Storage class of a [`SymbolKind::Data`] symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind
{
    Unknown,
    Local,
    StaticLocal,
    Param,
    ObjectPtr,
    FileStatic,
    Global,
    Member,
    StaticMember,
    Constant,
}

/// Flavor of a [`SymbolKind::Udt`] symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UdtKind
{
    Struct,
    Class,
    Union,
    Interface,
    TaggedUnion,
}

impl UdtKind
{
    /// C-style keyword used when rendering the type.
    pub const fn keyword(self) -> &'static str
    {
        match self {
            UdtKind::Struct => "struct",
            UdtKind::Class => "class",
            UdtKind::Union | UdtKind::TaggedUnion => "union",
            UdtKind::Interface => "interface",
        }
    }
}

/// Built-in scalar type of a [`SymbolKind::BaseType`] symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicType
{
    NoType,
    Void,
    Char,
    WChar,
    Int,
    UInt,
    Float,
    Bcd,
    Bool,
    Long,
    ULong,
    Currency,
    Date,
    Variant,
    Complex,
    Bit,
    Bstr,
    Hresult,
    Char16,
    Char32,
    Char8,
}

impl BasicType
{
    /// C spelling of the type for a given size in bytes.
    pub fn c_name(self, size: u64) -> &'static str
    {
        match (self, size) {
            (BasicType::NoType, _) => "<no type>",
            (BasicType::Void, _) => "void",
            (BasicType::Char, _) => "char",
            (BasicType::WChar, _) => "wchar_t",
            (BasicType::Int, 1) => "signed char",
            (BasicType::Int, 2) => "short",
            (BasicType::Int, 8) => "__int64",
            (BasicType::Int, 16) => "__int128",
            (BasicType::Int, _) => "int",
            (BasicType::UInt, 1) => "unsigned char",
            (BasicType::UInt, 2) => "unsigned short",
            (BasicType::UInt, 8) => "unsigned __int64",
            (BasicType::UInt, 16) => "unsigned __int128",
            (BasicType::UInt, _) => "unsigned int",
            (BasicType::Float, 4) => "float",
            (BasicType::Float, 10 | 16) => "long double",
            (BasicType::Float, _) => "double",
            (BasicType::Bcd, _) => "BCD",
            (BasicType::Bool, _) => "bool",
            (BasicType::Long, _) => "long",
            (BasicType::ULong, _) => "unsigned long",
            (BasicType::Currency, _) => "CURRENCY",
            (BasicType::Date, _) => "DATE",
            (BasicType::Variant, _) => "VARIANT",
            (BasicType::Complex, _) => "_Complex",
            (BasicType::Bit, _) => "bit",
            (BasicType::Bstr, _) => "BSTR",
            (BasicType::Hresult, _) => "HRESULT",
            (BasicType::Char16, _) => "char16_t",
            (BasicType::Char32, _) => "char32_t",
            (BasicType::Char8, _) => "char8_t",
        }
    }
}

/// Type qualifiers collected from transparent modifier records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Qualifiers
{
    pub is_const: bool,
    pub is_volatile: bool,
    pub is_unaligned: bool,
}

impl Qualifiers
{
    /// No qualifiers.
    pub const NONE: Self = Qualifiers {
        is_const: false,
        is_volatile: false,
        is_unaligned: false,
    };

    /// `const` only.
    pub const CONST: Self = Qualifiers {
        is_const: true,
        is_volatile: false,
        is_unaligned: false,
    };

    /// Union of two qualifier sets.
    #[must_use]
    pub const fn merge(self, other: Qualifiers) -> Self
    {
        Qualifiers {
            is_const: self.is_const || other.is_const,
            is_volatile: self.is_volatile || other.is_volatile,
            is_unaligned: self.is_unaligned || other.is_unaligned,
        }
    }

    /// Whether no qualifier is set.
    pub const fn is_empty(self) -> bool
    {
        !(self.is_const || self.is_volatile || self.is_unaligned)
    }
}

impl fmt::Display for Qualifiers
{
    /// Renders as a prefix, e.g. `const volatile ` (with trailing space), or nothing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.is_const {
            f.write_str("const ")?;
        }
        if self.is_volatile {
            f.write_str("volatile ")?;
        }
        if self.is_unaligned {
            f.write_str("__unaligned ")?;
        }
        Ok(())
    }
}

/// Bit-field placement of a data member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitField
{
    /// Bit position within the containing storage unit.
    pub position: u32,
    /// Width in bits.
    pub width: u32,
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str()
    {
        for kind in SymbolKind::ALL {
            assert_eq!(kind.as_str().parse::<SymbolKind>().unwrap(), kind);
        }
        assert_eq!("Pointer_Type".parse::<SymbolKind>().unwrap(), SymbolKind::PointerType);
        assert!("widget".parse::<SymbolKind>().is_err());
    }

    #[test]
    fn test_type_kinds()
    {
        assert!(SymbolKind::Udt.is_type());
        assert!(SymbolKind::Typedef.is_type());
        assert!(!SymbolKind::Function.is_type());
        assert!(!SymbolKind::BaseClass.is_type());
    }

    #[test]
    fn test_basic_type_names_depend_on_size()
    {
        assert_eq!(BasicType::Int.c_name(4), "int");
        assert_eq!(BasicType::Int.c_name(8), "__int64");
        assert_eq!(BasicType::UInt.c_name(1), "unsigned char");
        assert_eq!(BasicType::Float.c_name(8), "double");
        assert_eq!(BasicType::Float.c_name(4), "float");
    }

    #[test]
    fn test_qualifier_prefix()
    {
        let both = Qualifiers::CONST.merge(Qualifiers {
            is_volatile: true,
            ..Qualifiers::NONE
        });
        assert_eq!(both.to_string(), "const volatile ");
        assert_eq!(Qualifiers::NONE.to_string(), "");
        assert!(Qualifiers::NONE.is_empty());
    }
}
