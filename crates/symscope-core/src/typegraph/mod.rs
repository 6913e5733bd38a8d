//! # Type Graph
//!
//! Typed projection of the symbols that describe types.
//!
//! A [`TypeSymbol`] wraps a type-kind [`Symbol`] with its category and the
//! qualifiers collected from the modifier records in front of it. The
//! relationships (members, bases, pointee/element, typedef targets, function
//! signatures) are resolved on demand through the Session's memo, so the
//! graph is never materialized as a whole. Forward declarations resolve to
//! the definition with the same kind and name when the store has one.
//!
//! The graph may be cyclic (`struct Node { Node* next; }`, mutually
//! referencing structs). The relationship accessors only look one edge away
//! and [`TypeGraph::walk`] keeps a visited set, so nothing here recurses
//! without bound.

mod render;
mod walk;

use std::fmt;
use std::sync::Arc;

pub use walk::{TypeEdge, TypeVisit, TypeWalk};

use crate::diagnostics::{Diagnostic, DiagnosticStage};
use crate::error::{DebugInfoError, Result};
use crate::session::Session;
use crate::symbols::Symbol;
use crate::types::{BasicType, BitField, DataKind, Qualifiers, SymbolId, SymbolKind, UdtKind};

/// Category of a type symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory
{
    Basic(BasicType),
    Pointer
    {
        reference: bool,
    },
    Array
    {
        count: Option<u64>,
    },
    Udt(UdtKind),
    Enum,
    FunctionSignature,
    Typedef,
}

/// A type symbol with its category and qualifiers.
#[derive(Debug, Clone)]
pub struct TypeSymbol
{
    symbol: Arc<Symbol>,
    category: TypeCategory,
    qualifiers: Qualifiers,
}

impl TypeSymbol
{
    pub fn id(&self) -> SymbolId
    {
        self.symbol.id()
    }

    pub fn symbol(&self) -> &Arc<Symbol>
    {
        &self.symbol
    }

    pub fn name(&self) -> Option<&str>
    {
        self.symbol.name()
    }

    /// Size in bytes.
    pub fn size(&self) -> u64
    {
        self.symbol.length()
    }

    pub fn category(&self) -> TypeCategory
    {
        self.category
    }

    pub fn qualifiers(&self) -> Qualifiers
    {
        self.qualifiers
    }

    /// Whether this is still a forward declaration (no definition was found).
    pub fn is_forward(&self) -> bool
    {
        self.symbol.is_forward()
    }

    fn qualified(mut self, qualifiers: Qualifiers) -> Self
    {
        self.qualifiers = self.qualifiers.merge(qualifiers);
        self
    }
}

impl PartialEq for TypeSymbol
{
    fn eq(&self, other: &Self) -> bool
    {
        self.id() == other.id() && self.qualifiers == other.qualifiers
    }
}

impl Eq for TypeSymbol {}

impl fmt::Display for TypeSymbol
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}{}", self.qualifiers, self.name().unwrap_or("<anonymous>"))
    }
}

/// A data member of a UDT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member
{
    /// The member's own symbol.
    pub id: SymbolId,
    /// `None` for anonymous members.
    pub name: Option<String>,
    pub ty: TypeSymbol,
    /// Byte offset; `None` for static members.
    pub offset: Option<i64>,
    pub bit_field: Option<BitField>,
    pub is_static: bool,
}

/// A direct base class of a UDT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseClass
{
    pub ty: TypeSymbol,
    pub offset: i64,
    pub is_virtual: bool,
}

/// One named value of an enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumerator
{
    pub name: String,
    pub value: i64,
}

/// Return and argument types of a function signature. `None` means `void`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature
{
    pub return_type: Option<TypeSymbol>,
    pub arguments: Vec<Option<TypeSymbol>>,
}

/// Type-graph view of one Session.
#[derive(Debug, Clone, Copy)]
pub struct TypeGraph<'s>
{
    session: &'s Session,
}

impl<'s> TypeGraph<'s>
{
    pub(crate) fn new(session: &'s Session) -> Self
    {
        Self { session }
    }

    /// Project a symbol into the type graph.
    ///
    /// Forward-declared UDTs and enums resolve to their definition when the
    /// store has one with the same kind and name.
    ///
    /// ## Errors
    ///
    /// - [`DebugInfoError::WrongKind`] if the symbol is not a type
    /// - the lookup errors of [`Session::symbol`]
    pub fn resolve_type(&self, id: SymbolId) -> Result<TypeSymbol>
    {
        let symbol = self.session.symbol(id)?;
        if !symbol.kind().is_type() {
            return Err(DebugInfoError::WrongKind {
                id,
                expected: "type",
                actual: symbol.kind(),
            });
        }

        let symbol = if symbol.is_forward() {
            self.definition_of(&symbol).unwrap_or(symbol)
        } else {
            symbol
        };
        Ok(project(symbol))
    }

    /// Data members of a UDT in declaration order.
    ///
    /// Members whose record is malformed or has no type are skipped with a
    /// diagnostic.
    ///
    /// ## Errors
    ///
    /// [`DebugInfoError::WrongKind`] if `id` is not a UDT.
    pub fn members(&self, id: SymbolId) -> Result<Vec<Member>>
    {
        let udt = self.expect_category(id, "udt", |category| matches!(category, TypeCategory::Udt(_)))?;
        let mut members = Vec::new();
        for child in self.children(udt.id()) {
            let is_static = match (child.kind(), child.data_kind()) {
                (SymbolKind::Data, Some(DataKind::Member)) => false,
                (SymbolKind::Data, Some(DataKind::StaticMember)) => true,
                _ => continue,
            };
            let Some(ty) = self.type_of(&child)? else {
                self.skip(child.id(), "data member has no type");
                continue;
            };
            members.push(Member {
                id: child.id(),
                name: child.name().map(str::to_string),
                ty,
                offset: if is_static { None } else { Some(child.offset().unwrap_or(0)) },
                bit_field: child.bit_field(),
                is_static,
            });
        }
        Ok(members)
    }

    /// Direct base classes of a UDT.
    ///
    /// ## Errors
    ///
    /// [`DebugInfoError::WrongKind`] if `id` is not a UDT.
    pub fn base_types(&self, id: SymbolId) -> Result<Vec<BaseClass>>
    {
        let udt = self.expect_category(id, "udt", |category| matches!(category, TypeCategory::Udt(_)))?;
        let mut bases = Vec::new();
        for child in self.children(udt.id()) {
            if child.kind() != SymbolKind::BaseClass {
                continue;
            }
            let Some(ty) = self.type_of(&child)? else {
                self.skip(child.id(), "base class entry has no type");
                continue;
            };
            bases.push(BaseClass {
                ty,
                offset: child.offset().unwrap_or(0),
                is_virtual: child.is_virtual_base(),
            });
        }
        Ok(bases)
    }

    /// Pointee of a pointer or element of an array. `None` means `void`.
    ///
    /// ## Errors
    ///
    /// [`DebugInfoError::WrongKind`] if `id` is neither a pointer nor an array.
    pub fn element_type(&self, id: SymbolId) -> Result<Option<TypeSymbol>>
    {
        let ty = self.expect_category(id, "pointer or array", |category| {
            matches!(category, TypeCategory::Pointer { .. } | TypeCategory::Array { .. })
        })?;
        self.type_of(ty.symbol())
    }

    /// Target of a typedef or underlying integer type of an enum.
    ///
    /// ## Errors
    ///
    /// [`DebugInfoError::WrongKind`] if `id` is neither a typedef nor an enum.
    pub fn underlying_type(&self, id: SymbolId) -> Result<Option<TypeSymbol>>
    {
        let ty = self.expect_category(id, "typedef or enum", |category| {
            matches!(category, TypeCategory::Typedef | TypeCategory::Enum)
        })?;
        self.type_of(ty.symbol())
    }

    /// Named values of an enum in declaration order.
    ///
    /// ## Errors
    ///
    /// [`DebugInfoError::WrongKind`] if `id` is not an enum.
    pub fn enumerators(&self, id: SymbolId) -> Result<Vec<Enumerator>>
    {
        let ty = self.expect_category(id, "enum", |category| category == TypeCategory::Enum)?;
        Ok(self
            .children(ty.id())
            .filter(|child| child.kind() == SymbolKind::Data)
            .filter_map(|child| {
                Some(Enumerator {
                    name: child.name()?.to_string(),
                    value: child.value().unwrap_or(0),
                })
            })
            .collect())
    }

    /// Return and argument types of a function signature.
    ///
    /// ## Errors
    ///
    /// [`DebugInfoError::WrongKind`] if `id` is not a function signature type.
    pub fn signature(&self, id: SymbolId) -> Result<Signature>
    {
        let ty =
            self.expect_category(id, "function signature", |category| category == TypeCategory::FunctionSignature)?;
        let return_type = self.type_of(ty.symbol())?;
        let mut arguments = Vec::new();
        for child in self.children(ty.id()) {
            if child.kind() == SymbolKind::FunctionArgType {
                arguments.push(self.type_of(&child)?);
            }
        }
        Ok(Signature {
            return_type,
            arguments,
        })
    }

    /// Breadth-first walk over every type reachable from `id`.
    ///
    /// ## Errors
    ///
    /// Same as [`TypeGraph::resolve_type`] for the starting type.
    pub fn walk(&self, id: SymbolId) -> Result<TypeWalk<'s>>
    {
        let start = self.resolve_type(id)?;
        Ok(TypeWalk::new(*self, start))
    }

    /// Every type reachable from `id`, each exactly once, starting with `id` itself.
    ///
    /// ## Errors
    ///
    /// Same as [`TypeGraph::walk`].
    pub fn reachable(&self, id: SymbolId) -> Result<Vec<TypeSymbol>>
    {
        Ok(self.walk(id)?.map(|visit| visit.ty).collect())
    }

    /// C-style spelling of a type, e.g. `const char*`, `int[0x10]`, `int (*)(int, char)`.
    ///
    /// ## Errors
    ///
    /// Same as [`TypeGraph::resolve_type`].
    pub fn type_name(&self, id: SymbolId) -> Result<String>
    {
        let ty = self.resolve_type(id)?;
        Ok(render::Renderer::new(*self).name(&ty))
    }

    /// C-style spelling of an already resolved type, keeping the qualifiers
    /// it carries (a `const` member stays `const`).
    pub fn type_name_of(&self, ty: &TypeSymbol) -> String
    {
        render::Renderer::new(*self).name(ty)
    }

    /// Layout dump of a UDT, one member per line with its offset.
    ///
    /// ```text
    /// struct Node /* 0x10 */
    /// {
    ///     /* 0x000 */ int value;
    ///     /* 0x008 */ struct Node* next;
    /// };
    /// ```
    ///
    /// ## Errors
    ///
    /// [`DebugInfoError::WrongKind`] if `id` is not a UDT.
    pub fn render_udt(&self, id: SymbolId) -> Result<String>
    {
        let udt = self.expect_category(id, "udt", |category| matches!(category, TypeCategory::Udt(_)))?;
        let bases = self.base_types(udt.id())?;
        let members = self.members(udt.id())?;
        Ok(render::Renderer::new(*self).udt(&udt, &bases, &members))
    }

    pub(crate) fn session(&self) -> &'s Session
    {
        self.session
    }

    /// Resolve the type referenced by `symbol`, carrying its qualifiers.
    ///
    /// Malformed or non-type targets are reported and read as `None`.
    pub(crate) fn type_of(&self, symbol: &Symbol) -> Result<Option<TypeSymbol>>
    {
        let Some(target) = symbol.type_id() else {
            return Ok(None);
        };
        match self.resolve_type(target) {
            Ok(ty) => Ok(Some(ty.qualified(symbol.type_qualifiers()))),
            Err(err) if err.is_structural() => Err(err),
            Err(err) => {
                self.skip(symbol.id(), &format!("type reference {target} unusable: {err}"));
                Ok(None)
            }
        }
    }

    /// Valid children of `id`; malformed ones are reported and skipped.
    pub(crate) fn children(&self, id: SymbolId) -> impl Iterator<Item = Arc<Symbol>> + 's
    {
        let session = self.session;
        session
            .store()
            .children(id)
            .iter()
            .filter_map(move |child| session.materialize_or_skip(*child, DiagnosticStage::TypeGraph))
    }

    fn skip(&self, id: SymbolId, reason: &str)
    {
        self.session
            .emit(Diagnostic::new(Some(id), DiagnosticStage::TypeGraph, reason.to_string()));
    }

    fn expect_category(
        &self,
        id: SymbolId,
        expected: &'static str,
        accept: impl Fn(TypeCategory) -> bool,
    ) -> Result<TypeSymbol>
    {
        let ty = self.resolve_type(id)?;
        if accept(ty.category()) {
            Ok(ty)
        } else {
            Err(DebugInfoError::WrongKind {
                id,
                expected,
                actual: ty.symbol().kind(),
            })
        }
    }

    fn definition_of(&self, forward: &Symbol) -> Option<Arc<Symbol>>
    {
        let name = forward.symbol_name()?.raw().to_string();
        let definition = *self.session.definitions().get(&(forward.kind(), name))?;
        self.session.materialize(definition).ok()
    }
}

fn project(symbol: Arc<Symbol>) -> TypeSymbol
{
    let category = match symbol.kind() {
        SymbolKind::BaseType => TypeCategory::Basic(symbol.basic_type().unwrap_or(BasicType::NoType)),
        SymbolKind::PointerType => TypeCategory::Pointer {
            reference: symbol.is_reference(),
        },
        SymbolKind::ArrayType => TypeCategory::Array { count: symbol.count() },
        SymbolKind::Udt => TypeCategory::Udt(symbol.udt_kind().unwrap_or(UdtKind::Struct)),
        SymbolKind::Enum => TypeCategory::Enum,
        SymbolKind::FunctionType => TypeCategory::FunctionSignature,
        _ => TypeCategory::Typedef,
    };
    TypeSymbol {
        symbol,
        category,
        qualifiers: Qualifiers::NONE,
    }
}
