//! Binary image parsing and DWARF section loading.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use gimli::RunTimeEndian;
use object::{Object, ObjectSection, ObjectSymbol};

use crate::error::{map_object_error, Result};
use crate::source::Export;
use crate::types::{Address, Architecture, DebugSignature, SourceFormat};

pub(crate) const DWARF_SECTIONS: &[(&str, &[&str])] = &[
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_line", &[".debug_line", "__debug_line"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offsets"]),
    (".debug_types", &[".debug_types", "__debug_types"]),
    (".debug_loc", &[".debug_loc", "__debug_loc"]),
    (".debug_loclists", &[".debug_loclists", "__debug_loclists"]),
];

/// Raw DWARF sections of one file, keyed by canonical section name.
#[derive(Clone)]
pub(crate) struct DwarfSections
{
    pub sections: HashMap<&'static str, Arc<[u8]>>,
    pub endian: RunTimeEndian,
}

impl std::fmt::Debug for DwarfSections
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        let mut names: Vec<_> = self.sections.keys().collect();
        names.sort_unstable();
        f.debug_struct("DwarfSections")
            .field("sections", &names)
            .field("endian", &self.endian)
            .finish()
    }
}

/// CodeView record of a PE image.
#[derive(Debug, Clone)]
pub(crate) struct CodeViewInfo
{
    /// PDB path as recorded by the linker.
    pub path: String,
    pub signature: DebugSignature,
}

/// Everything read from an image's headers.
#[derive(Debug)]
pub(crate) struct ImageFacts
{
    pub format: SourceFormat,
    pub architecture: Architecture,
    /// Subtracted from image addresses so they land in the debug store's address space.
    pub bias: u64,
    pub exports: Vec<Export>,
    pub code_view: Option<CodeViewInfo>,
    pub build_id: Option<Vec<u8>>,
    pub uuid: Option<[u8; 16]>,
    pub debuglink: Option<String>,
    /// Embedded DWARF, when the image carries a non-empty `.debug_info`.
    pub dwarf: Option<DwarfSections>,
    /// Defined function and data symbols from the symbol table, as `(name, address)`.
    pub publics: Vec<(String, u64)>,
}

impl ImageFacts
{
    /// Identity the debug store must carry: CodeView, build id, or UUID.
    pub fn signature(&self) -> Option<DebugSignature>
    {
        if let Some(code_view) = &self.code_view {
            return Some(code_view.signature.clone());
        }
        if let Some(build_id) = &self.build_id {
            return Some(DebugSignature::BuildId(build_id.clone()));
        }
        self.uuid.map(DebugSignature::Uuid)
    }
}

/// Parse an image's headers.
///
/// `format` is the container format the caller already identified.
pub(crate) fn read_image(file: &object::File<'_>, format: SourceFormat) -> Result<ImageFacts>
{
    let bias = match format {
        SourceFormat::Pe => file.relative_address_base(),
        _ => 0,
    };

    let exports = file
        .exports()
        .map_err(|err| map_object_error("reading export table", err))?
        .into_iter()
        .map(|export| Export {
            name: String::from_utf8_lossy(export.name()).into_owned(),
            address: Address::new(export.address().saturating_sub(bias)),
        })
        .collect();

    let code_view = file
        .pdb_info()
        .map_err(|err| map_object_error("reading CodeView record", err))?
        .map(|info| CodeViewInfo {
            path: String::from_utf8_lossy(info.path()).into_owned(),
            signature: DebugSignature::CodeView {
                guid: info.guid(),
                age: info.age(),
            },
        });

    // A malformed note only costs the identity.
    let build_id = file.build_id().ok().flatten().map(<[u8]>::to_vec);
    let uuid = file.mach_uuid().ok().flatten();
    let debuglink = file
        .gnu_debuglink()
        .ok()
        .flatten()
        .map(|(name, _crc)| String::from_utf8_lossy(name).into_owned());

    let publics = file
        .symbols()
        .filter(|symbol| symbol.is_definition())
        .filter(|symbol| matches!(symbol.kind(), object::SymbolKind::Text | object::SymbolKind::Data))
        .filter_map(|symbol| {
            let name = symbol.name().ok()?;
            (!name.is_empty()).then(|| (name.to_string(), symbol.address().saturating_sub(bias)))
        })
        .collect();

    Ok(ImageFacts {
        format,
        architecture: Architecture::from_object(file.architecture()),
        bias,
        exports,
        code_view,
        build_id,
        uuid,
        debuglink,
        dwarf: load_dwarf_sections(file)?,
        publics,
    })
}

/// DWARF sections of `file`, or `None` when it carries no `.debug_info`.
pub(crate) fn load_dwarf_sections(file: &object::File<'_>) -> Result<Option<DwarfSections>>
{
    let mut sections = HashMap::new();
    for (canonical, aliases) in DWARF_SECTIONS {
        if let Some(data) = load_section_bytes(file, aliases)? {
            sections.insert(*canonical, data);
        }
    }
    if sections.get(".debug_info").map_or(true, |data| data.is_empty()) {
        return Ok(None);
    }

    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };
    Ok(Some(DwarfSections { sections, endian }))
}

fn load_section_bytes(file: &object::File<'_>, names: &[&str]) -> Result<Option<Arc<[u8]>>>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let data = section
                .uncompressed_data()
                .map_err(|err| map_object_error(&format!("reading {name}"), err))?;
            return Ok(Some(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes),
                Cow::Owned(vec) => vec.into(),
            }));
        }
    }
    Ok(None)
}
