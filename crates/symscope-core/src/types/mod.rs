//! # Types
//!
//! Value types shared by the store, the loaders, and the query views.

pub mod address;
pub mod image;
pub mod kinds;
pub mod symbols;

// Re-export all public types
pub use address::{Address, AddressRange};
pub use image::{Architecture, DebugSignature, SourceFormat};
pub use kinds::{BasicType, BitField, DataKind, Qualifiers, SymbolKind, UdtKind};
pub use symbols::{SymbolId, SymbolLanguage, SymbolName};
