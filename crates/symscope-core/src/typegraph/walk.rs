//! Breadth-first traversal of the type graph.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use super::{TypeCategory, TypeGraph, TypeSymbol};
use crate::error::Result;
use crate::types::SymbolId;

/// How a visited type was reached from its predecessor in the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeEdge
{
    /// The starting type.
    Root,
    /// Type of a data member; carries the member name.
    Member(Option<String>),
    Base,
    /// Pointee or array element.
    Element,
    /// Typedef target or enum underlying type.
    Target,
    Return,
    Argument(usize),
}

impl fmt::Display for TypeEdge
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            TypeEdge::Root => f.write_str("root"),
            TypeEdge::Member(Some(name)) => write!(f, "member {name}"),
            TypeEdge::Member(None) => f.write_str("anonymous member"),
            TypeEdge::Base => f.write_str("base"),
            TypeEdge::Element => f.write_str("element"),
            TypeEdge::Target => f.write_str("target"),
            TypeEdge::Return => f.write_str("return"),
            TypeEdge::Argument(index) => write!(f, "argument {index}"),
        }
    }
}

/// One step of a [`TypeWalk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeVisit
{
    pub ty: TypeSymbol,
    /// Edges between the starting type and this one.
    pub depth: usize,
    pub edge: TypeEdge,
}

/// Iterator over every type reachable from a starting type, each visited once.
///
/// Uses an explicit queue and a visited set keyed by type id, so cyclic
/// graphs terminate. Iteration stops early if the Session is aborted.
#[derive(Debug)]
pub struct TypeWalk<'s>
{
    graph: TypeGraph<'s>,
    queue: VecDeque<TypeVisit>,
    visited: HashSet<SymbolId>,
}

impl<'s> TypeWalk<'s>
{
    pub(crate) fn new(graph: TypeGraph<'s>, start: TypeSymbol) -> Self
    {
        let mut visited = HashSet::new();
        visited.insert(start.id());
        let mut queue = VecDeque::new();
        queue.push_back(TypeVisit {
            ty: start,
            depth: 0,
            edge: TypeEdge::Root,
        });
        Self { graph, queue, visited }
    }

    fn neighbours(&self, ty: &TypeSymbol) -> Result<Vec<(TypeSymbol, TypeEdge)>>
    {
        let graph = &self.graph;
        let id = ty.id();
        let mut next = Vec::new();
        match ty.category() {
            TypeCategory::Basic(_) => {}
            TypeCategory::Udt(_) => {
                for base in graph.base_types(id)? {
                    next.push((base.ty, TypeEdge::Base));
                }
                for member in graph.members(id)? {
                    next.push((member.ty, TypeEdge::Member(member.name)));
                }
            }
            TypeCategory::Pointer { .. } | TypeCategory::Array { .. } => {
                next.extend(graph.element_type(id)?.map(|element| (element, TypeEdge::Element)));
            }
            TypeCategory::Typedef | TypeCategory::Enum => {
                next.extend(graph.underlying_type(id)?.map(|target| (target, TypeEdge::Target)));
            }
            TypeCategory::FunctionSignature => {
                let signature = graph.signature(id)?;
                next.extend(signature.return_type.map(|ret| (ret, TypeEdge::Return)));
                for (index, argument) in signature.arguments.into_iter().enumerate() {
                    next.extend(argument.map(|arg| (arg, TypeEdge::Argument(index))));
                }
            }
        }
        Ok(next)
    }
}

impl Iterator for TypeWalk<'_>
{
    type Item = TypeVisit;

    fn next(&mut self) -> Option<Self::Item>
    {
        let visit = self.queue.pop_front()?;
        match self.neighbours(&visit.ty) {
            Ok(neighbours) => {
                for (ty, edge) in neighbours {
                    if self.visited.insert(ty.id()) {
                        self.queue.push_back(TypeVisit {
                            ty,
                            depth: visit.depth + 1,
                            edge,
                        });
                    }
                }
            }
            Err(_) => {
                // Only structural failures reach here; the Session is already aborted.
                self.queue.clear();
            }
        }
        Some(visit)
    }
}
