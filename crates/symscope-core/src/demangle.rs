//! Symbol name demangling and language detection.
//!
//! Rust names (legacy `_ZN...E` and v0 `_R...`) are demangled with
//! `rustc-demangle`; the hash suffix is dropped so that lookups by the
//! demangled path are stable across builds. C++ names are undecorated down
//! to their qualified name, without parameters or return type, so they index
//! the same way as names read from DWARF:
//!
//! - `_Z...` Itanium names go through `cpp_demangle`
//! - `?...` MSVC names go through `msvc-demangler`
//!
//! A decorated name that fails to undecorate is still classified as C++.
//! Qualified or templated names (`::`, `<`) are left `Unknown`, plain
//! identifiers are C.

use cpp_demangle::{DemangleOptions, Symbol as ItaniumSymbol};
use msvc_demangler::DemangleFlags;
use rustc_demangle::try_demangle;

use crate::types::{SymbolLanguage, SymbolName};

/// Create a `SymbolName` from a name stored in the debug store.
pub(crate) fn make_symbol_name(raw: &str) -> SymbolName
{
    if let Ok(demangled) = try_demangle(raw) {
        let demangled = format!("{demangled:#}");
        return SymbolName::new(raw.to_string(), Some(demangled), SymbolLanguage::Rust);
    }
    if raw.starts_with("_Z") {
        return SymbolName::new(raw.to_string(), undecorate_itanium(raw), SymbolLanguage::Cpp);
    }
    if raw.starts_with('?') {
        return SymbolName::new(raw.to_string(), undecorate_msvc(raw), SymbolLanguage::Cpp);
    }

    let language = if raw.contains("::") || raw.contains('<') {
        SymbolLanguage::Unknown
    } else if raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '@') {
        SymbolLanguage::C
    } else {
        SymbolLanguage::Unknown
    };

    SymbolName::new(raw.to_string(), None, language)
}

fn undecorate_itanium(raw: &str) -> Option<String>
{
    let symbol = ItaniumSymbol::new(raw.as_bytes()).ok()?;
    let options = DemangleOptions::new().no_params().no_return_type();
    symbol.demangle(&options).ok().filter(|name| !name.is_empty() && name != raw)
}

fn undecorate_msvc(raw: &str) -> Option<String>
{
    msvc_demangler::demangle(raw, DemangleFlags::NAME_ONLY)
        .ok()
        .filter(|name| !name.is_empty() && name != raw)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_rust_legacy_name_is_demangled_without_hash()
    {
        let name = make_symbol_name("_ZN4core3fmt5write17h0123456789abcdefE");
        assert_eq!(name.language(), SymbolLanguage::Rust);
        assert_eq!(name.demangled(), Some("core::fmt::write"));
        assert_eq!(name.display_name(), "core::fmt::write");
    }

    #[test]
    fn test_msvc_decorated_name_is_undecorated()
    {
        let name = make_symbol_name("?foo@@YAXXZ");
        assert_eq!(name.language(), SymbolLanguage::Cpp);
        assert_eq!(name.demangled(), Some("foo"));
        assert_eq!(name.raw(), "?foo@@YAXXZ");

        let qualified = make_symbol_name("?bar@ns@@YAHH@Z");
        assert_eq!(qualified.demangled(), Some("ns::bar"));
    }

    #[test]
    fn test_itanium_name_is_undecorated()
    {
        let name = make_symbol_name("_ZN2ns3barEi");
        assert_eq!(name.language(), SymbolLanguage::Cpp);
        assert_eq!(name.demangled(), Some("ns::bar"));
        assert_eq!(name.display_name(), "ns::bar");

        assert_eq!(make_symbol_name("_Z3fooi").demangled(), Some("foo"));
    }

    #[test]
    fn test_undecodable_cpp_name_keeps_raw_form()
    {
        let name = make_symbol_name("?");
        assert_eq!(name.language(), SymbolLanguage::Cpp);
        assert_eq!(name.demangled(), None);
        assert_eq!(name.display_name(), "?");
    }

    #[test]
    fn test_plain_and_qualified_names()
    {
        assert_eq!(make_symbol_name("DbgPrint").language(), SymbolLanguage::C);
        assert_eq!(make_symbol_name("_main").language(), SymbolLanguage::C);
        assert_eq!(make_symbol_name("std::vector<int>").language(), SymbolLanguage::Unknown);
    }
}
