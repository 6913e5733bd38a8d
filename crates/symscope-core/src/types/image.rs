//! Image-level types: container format, architecture, and debug signatures.

use std::fmt;
use std::fmt::Write as _;

/// Container format of the file a [`DataSource`](crate::DataSource) was opened from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat
{
    /// Windows PE image (exe, dll, sys, ...).
    Pe,
    /// Standalone PDB (MSF 7.00) file.
    Pdb,
    /// ELF image or object.
    Elf,
    /// Mach-O image or object.
    MachO,
    /// Store built in memory.
    Memory,
}

impl fmt::Display for SourceFormat
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SourceFormat::Pe => "pe",
            SourceFormat::Pdb => "pdb",
            SourceFormat::Elf => "elf",
            SourceFormat::MachO => "mach-o",
            SourceFormat::Memory => "memory",
        };
        f.write_str(label)
    }
}

/// CPU architecture of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    X86,
    X86_64,
    Arm,
    Arm64,
    /// Anything else; the name comes from the container parser.
    Unknown(&'static str),
}

impl Architecture
{
    /// Size of a pointer in bytes for this architecture.
    #[must_use]
    pub const fn pointer_size_bytes(self) -> u8
    {
        match self {
            Architecture::X86 | Architecture::Arm => 4,
            Architecture::X86_64 | Architecture::Arm64 | Architecture::Unknown(_) => 8,
        }
    }

    pub(crate) fn from_object(arch: object::Architecture) -> Self
    {
        match arch {
            object::Architecture::I386 => Architecture::X86,
            object::Architecture::X86_64 | object::Architecture::X86_64_X32 => Architecture::X86_64,
            object::Architecture::Arm => Architecture::Arm,
            object::Architecture::Aarch64 | object::Architecture::Aarch64_Ilp32 => Architecture::Arm64,
            _ => Architecture::Unknown("unknown"),
        }
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Architecture::X86 => write!(f, "x86"),
            Architecture::X86_64 => write!(f, "x86_64"),
            Architecture::Arm => write!(f, "arm"),
            Architecture::Arm64 => write!(f, "arm64"),
            Architecture::Unknown(name) => write!(f, "{name}"),
        }
    }
}

/// Identity that ties an image to its debug store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DebugSignature
{
    /// PE CodeView RSDS record / PDB info stream: GUID (in file byte order) and age.
    CodeView
    {
        guid: [u8; 16],
        age: u32,
    },
    /// ELF `NT_GNU_BUILD_ID` note.
    BuildId(Vec<u8>),
    /// Mach-O `LC_UUID`.
    Uuid([u8; 16]),
}

impl DebugSignature
{
    /// Directory key used by symbol-server layouts: `<GUID><AGE>` for
    /// CodeView signatures, the lowercase build id or UUID otherwise.
    pub fn symbol_server_key(&self) -> String
    {
        match self {
            DebugSignature::CodeView { guid, age } => {
                let mut key = guid_string(guid).replace('-', "");
                let _ = write!(key, "{age:X}");
                key
            }
            DebugSignature::BuildId(bytes) => hex(bytes),
            DebugSignature::Uuid(bytes) => hex(bytes),
        }
    }
}

impl fmt::Display for DebugSignature
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            DebugSignature::CodeView { guid, age } => write!(f, "{{{}}} age {age}", guid_string(guid)),
            DebugSignature::BuildId(bytes) => write!(f, "build-id {}", hex(bytes)),
            DebugSignature::Uuid(bytes) => write!(f, "uuid {}", hex(bytes)),
        }
    }
}

/// Format a GUID stored in little-endian file order as `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`.
fn guid_string(guid: &[u8; 16]) -> String
{
    let data1 = u32::from_le_bytes([guid[0], guid[1], guid[2], guid[3]]);
    let data2 = u16::from_le_bytes([guid[4], guid[5]]);
    let data3 = u16::from_le_bytes([guid[6], guid[7]]);
    let mut out = format!("{data1:08X}-{data2:04X}-{data3:04X}-{:02X}{:02X}-", guid[8], guid[9]);
    for byte in &guid[10..] {
        let _ = write!(out, "{byte:02X}");
    }
    out
}

fn hex(bytes: &[u8]) -> String
{
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

#[cfg(test)]
mod tests
{
    use super::*;

    const GUID: [u8; 16] = [
        0xe0, 0x04, 0x25, 0x3f, 0x89, 0x4f, 0xd3, 0x11, 0x9a, 0x0c, 0x03, 0x05, 0xe8, 0x2c, 0x33, 0x01,
    ];

    #[test]
    fn test_codeview_symbol_server_key()
    {
        let signature = DebugSignature::CodeView { guid: GUID, age: 0x1a };
        assert_eq!(signature.symbol_server_key(), "3F2504E04F8911D39A0C0305E82C33011A");
    }

    #[test]
    fn test_codeview_display()
    {
        let signature = DebugSignature::CodeView { guid: GUID, age: 2 };
        assert_eq!(signature.to_string(), "{3F2504E0-4F89-11D3-9A0C-0305E82C3301} age 2");
    }

    #[test]
    fn test_build_id_key_is_lower_hex()
    {
        let signature = DebugSignature::BuildId(vec![0xab, 0x01, 0xff]);
        assert_eq!(signature.symbol_server_key(), "ab01ff");
    }

    #[test]
    fn test_pointer_sizes()
    {
        assert_eq!(Architecture::X86.pointer_size_bytes(), 4);
        assert_eq!(Architecture::Arm64.pointer_size_bytes(), 8);
    }
}
