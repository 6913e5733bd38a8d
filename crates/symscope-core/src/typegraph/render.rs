//! C-style type names and UDT layout dumps.

use std::collections::HashSet;
use std::fmt::Write;

use super::{BaseClass, Member, TypeCategory, TypeGraph, TypeSymbol};
use crate::types::SymbolId;

const RECURSIVE: &str = "<recursive>";

pub(crate) struct Renderer<'s>
{
    graph: TypeGraph<'s>,
    active: HashSet<SymbolId>,
}

impl<'s> Renderer<'s>
{
    pub fn new(graph: TypeGraph<'s>) -> Self
    {
        Self {
            graph,
            active: HashSet::new(),
        }
    }

    /// Spelling of `ty`, qualifiers included.
    pub fn name(&mut self, ty: &TypeSymbol) -> String
    {
        if !self.active.insert(ty.id()) {
            return RECURSIVE.to_string();
        }
        let name = self.spell(ty);
        self.active.remove(&ty.id());
        name
    }

    fn spell(&mut self, ty: &TypeSymbol) -> String
    {
        let qualifiers = ty.qualifiers();
        match ty.category() {
            TypeCategory::Basic(basic) => {
                format!("{qualifiers}{}", ty.name().unwrap_or_else(|| basic.c_name(ty.size())))
            }
            TypeCategory::Udt(kind) => format!("{qualifiers}{} {}", kind.keyword(), tag_name(ty)),
            TypeCategory::Enum => format!("{qualifiers}enum {}", tag_name(ty)),
            TypeCategory::Typedef => format!("{qualifiers}{}", tag_name(ty)),
            TypeCategory::Pointer { reference } => {
                let sigil = if reference { "&" } else { "*" };
                let mut name = match self.graph.element_type(ty.id()) {
                    Ok(Some(pointee)) if pointee.category() == TypeCategory::FunctionSignature => {
                        self.function(&pointee, &format!("({sigil})"))
                    }
                    Ok(Some(pointee)) => format!("{}{sigil}", self.name(&pointee)),
                    Ok(None) => format!("void{sigil}"),
                    Err(_) => format!("<unknown>{sigil}"),
                };
                // Qualifiers of the pointer itself follow the sigil.
                let suffix = qualifiers.to_string();
                if !suffix.is_empty() {
                    name.push(' ');
                    name.push_str(suffix.trim_end());
                }
                name
            }
            TypeCategory::Array { count } => {
                let element = match self.graph.element_type(ty.id()) {
                    Ok(Some(element)) => self.name(&element),
                    Ok(None) => "void".to_string(),
                    Err(_) => "<unknown>".to_string(),
                };
                match count {
                    Some(count) => format!("{qualifiers}{element}[0x{count:x}]"),
                    None => format!("{qualifiers}{element}[]"),
                }
            }
            // `name` already holds this id in `active`.
            TypeCategory::FunctionSignature => self.signature(ty, ""),
        }
    }

    /// Signature reached through a pointer, spelled around `declarator`.
    fn function(&mut self, ty: &TypeSymbol, declarator: &str) -> String
    {
        if !self.active.insert(ty.id()) {
            return RECURSIVE.to_string();
        }
        let spelled = self.signature(ty, declarator);
        self.active.remove(&ty.id());
        spelled
    }

    /// `ret declarator(args)`, with `declarator` empty for a bare signature.
    fn signature(&mut self, ty: &TypeSymbol, declarator: &str) -> String
    {
        match self.graph.signature(ty.id()) {
            Ok(signature) => {
                let ret = match &signature.return_type {
                    Some(ret) => self.name(ret),
                    None => "void".to_string(),
                };
                let arguments: Vec<String> = signature
                    .arguments
                    .iter()
                    .map(|argument| match argument {
                        Some(argument) => self.name(argument),
                        None => "void".to_string(),
                    })
                    .collect();
                format!("{ret} {declarator}({})", arguments.join(", "))
            }
            Err(_) => format!("<unknown> {declarator}()"),
        }
    }

    /// Layout dump of a UDT with its bases and members.
    pub fn udt(&mut self, udt: &TypeSymbol, bases: &[BaseClass], members: &[Member]) -> String
    {
        let mut out = String::new();
        let keyword = match udt.category() {
            TypeCategory::Udt(kind) => kind.keyword(),
            _ => "struct",
        };
        let _ = write!(out, "{keyword} {}", tag_name(udt));
        if !bases.is_empty() {
            let bases: Vec<String> = bases
                .iter()
                .map(|base| {
                    let name = self.name(&base.ty);
                    if base.is_virtual {
                        format!("virtual {name}")
                    } else {
                        name
                    }
                })
                .collect();
            let _ = write!(out, " : {}", bases.join(", "));
        }
        let _ = writeln!(out, " /* 0x{:x} */", udt.size());
        out.push_str("{\n");

        for member in members {
            out.push_str("    ");
            if member.is_static {
                out.push_str("static ");
            } else {
                let offset = member.offset.unwrap_or(0);
                match member.bit_field {
                    Some(bits) => {
                        let _ = write!(out, "/* 0x{offset:03x}:{:x} */ ", bits.position);
                    }
                    None => {
                        let _ = write!(out, "/* 0x{offset:03x} */ ");
                    }
                }
            }
            let _ = write!(out, "{};", self.declaration(member));
            out.push('\n');
        }
        out.push_str("};\n");
        out
    }

    fn declaration(&mut self, member: &Member) -> String
    {
        let name = member.name.as_deref().unwrap_or("<anonymous>");
        if let TypeCategory::Array { count } = member.ty.category() {
            let element = match self.graph.element_type(member.ty.id()) {
                Ok(Some(element)) => self.name(&element),
                _ => "void".to_string(),
            };
            let count = count.map(|count| format!("0x{count:x}")).unwrap_or_default();
            return format!("{}{element} {name}[{count}]", member.ty.qualifiers());
        }
        let declaration = format!("{} {name}", self.name(&member.ty));
        match member.bit_field {
            Some(bits) => format!("{declaration} : {}", bits.width),
            None => declaration,
        }
    }
}

fn tag_name(ty: &TypeSymbol) -> &str
{
    ty.name().unwrap_or("<anonymous>")
}
