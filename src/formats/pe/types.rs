//! Core PE data types and structures

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::error::IoError;

// PE constants
pub const DOS_SIGNATURE: u16 = 0x5A4D; // MZ
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";
pub const PE32_MAGIC: u16 = 0x10B;
pub const PE32PLUS_MAGIC: u16 = 0x20B;

pub const DOS_HEADER_SIZE: usize = 64;
pub const COFF_HEADER_SIZE: usize = 20;
pub const SECTION_HEADER_SIZE: usize = 40;
pub const IMPORT_DESCRIPTOR_SIZE: u64 = 20;

// Data directory indices
pub const IMAGE_DIRECTORY_ENTRY_IMPORT: usize = 1;
pub const IMAGE_NUMBEROF_DIRECTORY_ENTRIES: usize = 16;

pub const IMAGE_ORDINAL_FLAG32: u64 = 0x8000_0000;
pub const IMAGE_ORDINAL_FLAG64: u64 = 0x8000_0000_0000_0000;

/// PE parsing error types
#[derive(Debug, Error)]
pub enum PeError {
    #[error("Invalid DOS signature")]
    InvalidDosSignature,
    #[error("Invalid PE signature")]
    InvalidPeSignature,
    #[error("Invalid optional header magic: 0x{0:04x}")]
    InvalidMagic(u16),
    #[error("Truncated header: expected {expected} bytes, got {actual}")]
    TruncatedHeader { expected: usize, actual: usize },
    #[error(transparent)]
    Io(#[from] IoError),
}

pub type Result<T> = std::result::Result<T, PeError>;

/// COFF header (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoffHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub size_of_optional_header: u16,
}

/// Data directory entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 && self.size != 0
    }
}

/// The optional header fields the address layer depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalHeader {
    pub magic: u16,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub data_directories: Vec<DataDirectory>,
}

impl OptionalHeader {
    pub fn is_64bit(&self) -> bool {
        self.magic == PE32PLUS_MAGIC
    }
}

/// Section header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
}

impl SectionHeader {
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).to_string()
    }
}

/// Where in the file the bytes behind a decoded structure came from.
///
/// `from` is a physical offset, or [`Location::UNMAPPED`] when the structure's
/// virtual address is not backed by any section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub from: i64,
    pub size: u64,
}

impl Location {
    pub const UNMAPPED: i64 = -1;

    pub fn new(from: i64, size: u64) -> Self {
        Self { from, size }
    }

    pub fn is_unmapped(&self) -> bool {
        self.from == Self::UNMAPPED
    }
}

/// An import by name, with its hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameImport {
    pub hint: u16,
    pub name: String,
}

/// Everything imported from one DLL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub name: String,
    pub ordinal_imports: Vec<u16>,
    pub name_imports: Vec<NameImport>,
    pub locations: Vec<Location>,
}

impl Import {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn has_ordinal_imports(&self) -> bool {
        !self.ordinal_imports.is_empty()
    }
}

/// Parsed import directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSection {
    pub imports: Vec<Import>,
    /// Physical offset of the first import descriptor.
    pub directory_offset: u64,
}

impl ImportSection {
    /// Every location recorded while decoding, in import order.
    pub fn locations(&self) -> impl Iterator<Item = &Location> + '_ {
        self.imports.iter().flat_map(|i| i.locations.iter())
    }
}
