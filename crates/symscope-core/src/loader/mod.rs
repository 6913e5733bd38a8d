//! # Loaders
//!
//! Format detection, debug-store location, and conversion of provider
//! records into a [`RecordStore`].
//!
//! `open` only reads container headers. It identifies the file, reads the
//! image's identity, walks the candidate debug stores in priority order and
//! keeps the first one whose identity matches. The matching store is wrapped
//! in a [`Provider`] and converted later, on the first Session.

mod dwarf;
mod image;
mod pdb;
pub(crate) mod search;

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use object::{BinaryFormat, Object};
use tracing::{debug, info};

use self::dwarf::DwarfProvider;
use self::image::{load_dwarf_sections, read_image, ImageFacts};
use self::pdb::PdbProvider;
use crate::error::{map_object_error, DebugInfoError, Result};
use crate::source::{OpenOptions, Opened};
use crate::store::RecordStore;
use crate::types::{DebugSignature, SourceFormat};

/// First bytes of every MSF 7.00 (PDB) file.
const MSF_MAGIC: &[u8] = b"Microsoft C/C++ MSF 7.00\r\n\x1aDS";

/// A located debug store, ready to be converted.
#[derive(Debug)]
pub(crate) enum Provider
{
    Pdb(PdbProvider),
    Dwarf(DwarfProvider),
}

impl Provider
{
    pub fn load(self) -> Result<RecordStore>
    {
        match self {
            Provider::Pdb(provider) => provider.load(),
            Provider::Dwarf(provider) => provider.load(),
        }
    }
}

/// Open `path` and locate its debug store.
pub(crate) fn open(path: &Path, options: &OpenOptions) -> Result<Opened>
{
    require_file(path)?;
    if let Some(explicit) = options.debug_store() {
        require_file(explicit)?;
    }

    if is_msf(path)? {
        return open_standalone_pdb(path);
    }
    if has_extension(path, "pdb") {
        return Err(DebugInfoError::Format(format!("{} is not an MSF 7.00 file", path.display())));
    }

    let data = fs::read(path)?;
    let file = object::File::parse(&*data)
        .map_err(|err| map_object_error(&format!("parsing {}", path.display()), err))?;
    let format = match file.format() {
        BinaryFormat::Pe | BinaryFormat::Coff => SourceFormat::Pe,
        BinaryFormat::Elf => SourceFormat::Elf,
        BinaryFormat::MachO => SourceFormat::MachO,
        other => {
            return Err(DebugInfoError::Format(format!(
                "{}: unsupported container format {other:?}",
                path.display()
            )))
        }
    };
    let facts = read_image(&file, format)?;
    debug!(
        path = %path.display(),
        %format,
        architecture = %facts.architecture,
        signature = ?facts.signature(),
        embedded_dwarf = facts.dwarf.is_some(),
        "read image headers"
    );

    let dirs = search::search_dirs(options);
    match format {
        SourceFormat::Pe => open_pe(path, facts, options, &dirs),
        _ => open_dwarf_image(path, facts, options, &dirs),
    }
}

fn require_file(path: &Path) -> Result<()>
{
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(()),
        Ok(_) => Err(DebugInfoError::Format(format!("{} is not a regular file", path.display()))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Err(DebugInfoError::NotFound(format!("no file at {}", path.display())))
        }
        Err(err) => Err(DebugInfoError::Io(err)),
    }
}

fn is_msf(path: &Path) -> Result<bool>
{
    let mut header = [0u8; MSF_MAGIC.len()];
    let mut file = File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(header == MSF_MAGIC),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err.into()),
    }
}

fn has_extension(path: &Path, extension: &str) -> bool
{
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
}

fn open_standalone_pdb(path: &Path) -> Result<Opened>
{
    let provider = PdbProvider::open(path)?;
    Ok(Opened {
        format: SourceFormat::Pdb,
        architecture: provider.architecture(),
        signature: Some(provider.signature().clone()),
        debug_store_path: Some(path.to_path_buf()),
        exports: Vec::new(),
        provider: Some(Provider::Pdb(provider)),
    })
}

/// Last candidate that failed the identity check.
struct Rejected
{
    store: PathBuf,
    found: String,
}

fn mismatch(expected: &DebugSignature, rejected: Rejected) -> DebugInfoError
{
    DebugInfoError::Mismatch {
        store: rejected.store,
        expected: expected.to_string(),
        found: rejected.found,
    }
}

fn open_pe(path: &Path, mut facts: ImageFacts, options: &OpenOptions, dirs: &[PathBuf]) -> Result<Opened>
{
    let architecture = Some(facts.architecture);
    let signature = facts.signature();
    let exports = std::mem::take(&mut facts.exports);

    let Some(code_view) = facts.code_view.take() else {
        // MinGW images carry DWARF instead of a CodeView record.
        let provider = facts.dwarf.take().map(|sections| {
            Provider::Dwarf(
                DwarfProvider::new(file_label(path), SourceFormat::Pe, None, facts.architecture, facts.bias, sections)
                    .with_publics(std::mem::take(&mut facts.publics)),
            )
        });
        return Ok(Opened {
            format: SourceFormat::Pe,
            architecture,
            signature,
            debug_store_path: None,
            exports,
            provider,
        });
    };

    let candidates = search::pdb_candidates(path, &code_view.path, &code_view.signature, options.debug_store(), dirs);
    let mut rejected = None;
    for candidate in candidates {
        let provider = match PdbProvider::open(&candidate) {
            Ok(provider) => provider,
            Err(err) => {
                debug!(candidate = %candidate.display(), error = %err, "skipping unreadable PDB candidate");
                continue;
            }
        };
        if provider.signature() == &code_view.signature {
            info!(image = %path.display(), store = %candidate.display(), "located matching PDB");
            return Ok(Opened {
                format: SourceFormat::Pe,
                architecture: architecture.or(provider.architecture()),
                signature,
                debug_store_path: Some(candidate),
                exports,
                provider: Some(Provider::Pdb(provider)),
            });
        }
        debug!(candidate = %candidate.display(), found = %provider.signature(), "PDB signature mismatch");
        rejected = Some(Rejected {
            store: candidate,
            found: provider.signature().to_string(),
        });
    }

    if let Some(rejected) = rejected {
        return Err(mismatch(&code_view.signature, rejected));
    }
    debug!(image = %path.display(), pdb = %code_view.path, "no PDB candidate found");
    Ok(Opened {
        format: SourceFormat::Pe,
        architecture,
        signature,
        debug_store_path: None,
        exports,
        provider: None,
    })
}

fn open_dwarf_image(path: &Path, mut facts: ImageFacts, options: &OpenOptions, dirs: &[PathBuf]) -> Result<Opened>
{
    let format = facts.format;
    let architecture = facts.architecture;
    let signature = facts.signature();
    let exports = std::mem::take(&mut facts.exports);
    let publics = std::mem::take(&mut facts.publics);
    let opened = |provider: Option<DwarfProvider>, store: Option<PathBuf>| Opened {
        format,
        architecture: Some(architecture),
        signature: signature.clone(),
        debug_store_path: store,
        exports: exports.clone(),
        provider: provider.map(|provider| Provider::Dwarf(provider.with_publics(publics.clone()))),
    };

    if options.debug_store().is_none() {
        if let Some(sections) = facts.dwarf.take() {
            let provider = DwarfProvider::new(
                file_label(path),
                format,
                signature.clone(),
                architecture,
                facts.bias,
                sections,
            );
            return Ok(opened(Some(provider), None));
        }
    }

    let mut candidates: Vec<PathBuf> = options.debug_store().map(Path::to_path_buf).into_iter().collect();
    match format {
        SourceFormat::MachO => candidates.extend(search::dsym_candidates(path)),
        _ => {
            if let Some(build_id) = &facts.build_id {
                candidates.extend(search::build_id_candidates(build_id, dirs));
            }
            if let Some(link) = &facts.debuglink {
                candidates.extend(search::debuglink_candidates(path, link, dirs));
            }
        }
    }

    let mut rejected = None;
    for candidate in candidates {
        match open_companion(&candidate, signature.as_ref()) {
            Ok(Companion::Match(sections)) => {
                info!(image = %path.display(), store = %candidate.display(), "located matching debug file");
                let provider = DwarfProvider::new(
                    file_label(&candidate),
                    format,
                    signature.clone(),
                    architecture,
                    0,
                    sections,
                );
                return Ok(opened(Some(provider), Some(candidate)));
            }
            Ok(Companion::Mismatch(found)) => {
                debug!(candidate = %candidate.display(), %found, "debug file identity mismatch");
                rejected = Some(Rejected { store: candidate, found });
            }
            Ok(Companion::Unusable) => debug!(candidate = %candidate.display(), "debug file carries no DWARF"),
            Err(err) => debug!(candidate = %candidate.display(), error = %err, "skipping unreadable debug file"),
        }
    }

    // Embedded DWARF still wins over nothing when an explicit store was rejected.
    if let Some(sections) = facts.dwarf.take() {
        let provider =
            DwarfProvider::new(file_label(path), format, signature.clone(), architecture, facts.bias, sections);
        return Ok(opened(Some(provider), None));
    }
    if let (Some(expected), Some(rejected)) = (&signature, rejected) {
        return Err(mismatch(expected, rejected));
    }
    Ok(opened(None, None))
}

enum Companion
{
    Match(image::DwarfSections),
    Mismatch(String),
    Unusable,
}

fn open_companion(path: &Path, expected: Option<&DebugSignature>) -> Result<Companion>
{
    let data = fs::read(path)?;
    let file = object::File::parse(&*data)
        .map_err(|err| map_object_error(&format!("parsing {}", path.display()), err))?;

    let found = match expected {
        Some(DebugSignature::BuildId(_)) => {
            file.build_id().ok().flatten().map(|id| DebugSignature::BuildId(id.to_vec()))
        }
        Some(DebugSignature::Uuid(_)) => file.mach_uuid().ok().flatten().map(DebugSignature::Uuid),
        _ => None,
    };
    if let (Some(expected), Some(found)) = (expected, &found) {
        if expected != found {
            return Ok(Companion::Mismatch(found.to_string()));
        }
    }

    Ok(match load_dwarf_sections(&file)? {
        Some(sections) => Companion::Match(sections),
        None => Companion::Unusable,
    })
}

fn file_label(path: &Path) -> String
{
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_msf_magic_detection()
    {
        let temp = tempfile::tempdir().unwrap();
        let pdb = temp.path().join("fake.pdb");
        let mut bytes = MSF_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        fs::write(&pdb, &bytes).unwrap();
        assert!(is_msf(&pdb).unwrap());

        let short = temp.path().join("short.bin");
        fs::write(&short, b"MZ").unwrap();
        assert!(!is_msf(&short).unwrap());
    }

    #[test]
    fn test_pdb_extension_without_magic_is_format_error()
    {
        let temp = tempfile::tempdir().unwrap();
        let pdb = temp.path().join("broken.pdb");
        fs::write(&pdb, b"not a pdb at all").unwrap();
        let err = open(&pdb, &OpenOptions::new().use_env_symbol_path(false)).unwrap_err();
        assert!(matches!(err, DebugInfoError::Format(_)), "{err}");
    }

    #[test]
    fn test_missing_explicit_store_is_not_found()
    {
        let temp = tempfile::tempdir().unwrap();
        let image = temp.path().join("image.bin");
        fs::write(&image, b"garbage").unwrap();
        let options = OpenOptions::new().with_debug_store(temp.path().join("missing.pdb"));
        assert!(matches!(open(&image, &options), Err(DebugInfoError::NotFound(_))));
    }
}
