//! Debug-store candidate paths.
//!
//! Every function here only builds paths; nothing is opened. Candidates are
//! returned in priority order with duplicates removed, and only paths naming
//! an existing file are kept.

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use crate::source::OpenOptions;
use crate::types::DebugSignature;

/// Symbol path honored in addition to `_NT_SYMBOL_PATH`.
pub(crate) const SYMBOL_PATH_ENV: &str = "SYMSCOPE_SYMBOL_PATH";
pub(crate) const NT_SYMBOL_PATH_ENV: &str = "_NT_SYMBOL_PATH";

/// Conventional system-wide root for split ELF debug files.
const SYSTEM_DEBUG_DIR: &str = "/usr/lib/debug";

/// Local directories named by a `;`-separated symbol path.
///
/// `srv*cache*https://server` and `symsrv*dll*cache*url` contribute their
/// local cache directories, `cache*dir` contributes `dir`, and plain entries
/// are taken as they are. Remote URLs are ignored.
pub(crate) fn parse_symbol_path(value: &str) -> Vec<PathBuf>
{
    let mut dirs = Vec::new();
    for segment in value.split(';').map(str::trim).filter(|segment| !segment.is_empty()) {
        let mut parts = segment.split('*');
        let head = parts.next().unwrap_or_default();
        let rest: Vec<&str> = match head.to_ascii_lowercase().as_str() {
            "srv" | "cache" => parts.collect(),
            "symsrv" => parts.skip(1).collect(),
            _ => vec![segment],
        };
        dirs.extend(
            rest.into_iter()
                .filter(|part| !part.is_empty() && !part.contains("://"))
                .map(PathBuf::from),
        );
    }
    dirs
}

/// Search directories: explicit ones first, then the environment symbol paths.
pub(crate) fn search_dirs(options: &OpenOptions) -> Vec<PathBuf>
{
    let mut dirs: Vec<PathBuf> = options.search_dirs().to_vec();
    if options.env_symbol_path_enabled() {
        for name in [SYMBOL_PATH_ENV, NT_SYMBOL_PATH_ENV] {
            if let Ok(value) = env::var(name) {
                dirs.extend(parse_symbol_path(&value));
            }
        }
    }
    dedup(dirs)
}

/// PDB candidates for a PE image.
///
/// Order: explicit store, the path embedded in the CodeView record, the
/// image's directory (CodeView file name, then `<stem>.pdb`), then every
/// search directory flat and in symbol-server layout.
pub(crate) fn pdb_candidates(
    image: &Path,
    embedded: &str,
    signature: &DebugSignature,
    explicit: Option<&Path>,
    dirs: &[PathBuf],
) -> Vec<PathBuf>
{
    let mut candidates = Vec::new();
    candidates.extend(explicit.map(Path::to_path_buf));

    // The embedded path is usually a Windows path; take its last component on any host.
    let file_name = embedded.rsplit(['\\', '/']).next().unwrap_or_default().to_string();
    if !embedded.is_empty() {
        candidates.push(PathBuf::from(embedded));
    }

    let image_dir = image.parent().unwrap_or_else(|| Path::new("."));
    if !file_name.is_empty() {
        candidates.push(image_dir.join(&file_name));
    }
    if let Some(stem) = image.file_stem() {
        let mut name = stem.to_os_string();
        name.push(".pdb");
        candidates.push(image_dir.join(name));
    }

    if !file_name.is_empty() {
        let key = signature.symbol_server_key();
        for dir in dirs {
            candidates.push(dir.join(&file_name));
            candidates.push(dir.join(&file_name).join(&key).join(&file_name));
        }
    }

    existing(candidates)
}

/// Companion files named by an ELF `.gnu_debuglink` section.
pub(crate) fn debuglink_candidates(image: &Path, link: &str, dirs: &[PathBuf]) -> Vec<PathBuf>
{
    let image_dir = image.parent().unwrap_or_else(|| Path::new("."));
    let mut candidates = vec![image_dir.join(link), image_dir.join(".debug").join(link)];
    if let Ok(absolute) = image_dir.canonicalize() {
        if let Ok(relative) = absolute.strip_prefix("/") {
            candidates.push(Path::new(SYSTEM_DEBUG_DIR).join(relative).join(link));
        }
    }
    candidates.extend(dirs.iter().map(|dir| dir.join(link)));
    existing(candidates)
}

/// `.build-id/ab/cdef….debug` files under the search directories and the system debug root.
pub(crate) fn build_id_candidates(build_id: &[u8], dirs: &[PathBuf]) -> Vec<PathBuf>
{
    let Some((first, rest)) = build_id.split_first() else {
        return Vec::new();
    };
    let mut file_name: String = rest.iter().map(|byte| format!("{byte:02x}")).collect();
    file_name.push_str(".debug");
    let relative = Path::new(".build-id").join(format!("{first:02x}")).join(file_name);

    let candidates = dirs
        .iter()
        .map(PathBuf::as_path)
        .chain([Path::new(SYSTEM_DEBUG_DIR)])
        .map(|dir| dir.join(&relative))
        .collect();
    existing(candidates)
}

/// DWARF files inside a `.dSYM` bundle next to a Mach-O image.
pub(crate) fn dsym_candidates(image: &Path) -> Vec<PathBuf>
{
    let Some(file_name) = image.file_name() else {
        return Vec::new();
    };
    let mut bundle = image.as_os_str().to_os_string();
    bundle.push(".dSYM");
    let candidate = PathBuf::from(bundle)
        .join("Contents")
        .join("Resources")
        .join("DWARF")
        .join(file_name);
    existing(vec![candidate])
}

fn existing(candidates: Vec<PathBuf>) -> Vec<PathBuf>
{
    dedup(candidates).into_iter().filter(|path| path.is_file()).collect()
}

fn dedup(paths: Vec<PathBuf>) -> Vec<PathBuf>
{
    let mut seen = HashSet::new();
    paths.into_iter().filter(|path| seen.insert(path.clone())).collect()
}

#[cfg(test)]
mod tests
{
    use std::fs;

    use super::*;

    #[test]
    fn test_parse_symbol_path_keeps_local_directories()
    {
        let dirs =
            parse_symbol_path(r"srv*C:\symbols*https://msdl.microsoft.com/download/symbols;D:\pdbs;;cache*E:\cache");
        assert_eq!(
            dirs,
            vec![PathBuf::from(r"C:\symbols"), PathBuf::from(r"D:\pdbs"), PathBuf::from(r"E:\cache")]
        );
    }

    #[test]
    fn test_parse_symbol_path_symsrv_skips_dll()
    {
        let dirs = parse_symbol_path("symsrv*symsrv.dll*/var/cache/symbols*http://example.com");
        assert_eq!(dirs, vec![PathBuf::from("/var/cache/symbols")]);
    }

    #[test]
    fn test_pdb_candidates_cover_flat_and_symbol_server_layouts()
    {
        let temp = tempfile::tempdir().unwrap();
        let image = temp.path().join("app.exe");
        fs::write(&image, b"").unwrap();

        let signature = DebugSignature::CodeView {
            guid: [0x11; 16],
            age: 2,
        };
        let store = temp.path().join("store");
        let nested = store.join("app.pdb").join(signature.symbol_server_key());
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("app.pdb"), b"").unwrap();
        fs::write(temp.path().join("app.pdb"), b"").unwrap();

        let candidates = pdb_candidates(&image, r"C:\build\app.pdb", &signature, None, &[store.clone()]);
        assert_eq!(candidates, vec![temp.path().join("app.pdb"), nested.join("app.pdb")]);
    }

    #[test]
    fn test_build_id_candidate_layout()
    {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join(".build-id").join("ab");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cdef.debug"), b"").unwrap();

        let candidates = build_id_candidates(&[0xab, 0xcd, 0xef], &[temp.path().to_path_buf()]);
        assert_eq!(candidates, vec![dir.join("cdef.debug")]);
    }

    #[test]
    fn test_missing_candidates_are_dropped()
    {
        let temp = tempfile::tempdir().unwrap();
        assert!(dsym_candidates(&temp.path().join("tool")).is_empty());
        assert!(debuglink_candidates(&temp.path().join("tool"), "tool.debug", &[]).is_empty());
    }
}
