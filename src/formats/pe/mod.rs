//! PE header access for the mapping layer.
//!
//! [`PeHeaders`] decodes the headers the address layer needs and answers the
//! [`HeaderAccessor`] questions through a [`SectionLoader`].

pub mod directories;
pub mod headers;
pub mod sections;
pub mod types;
pub mod utils;

use tracing::debug;

use crate::config::ParseLimits;
use crate::io::FileAccessor;
use crate::mapping::HeaderAccessor;

use headers::*;
pub use directories::parse_imports;
pub use sections::SectionLoader;
pub use types::*;

/// Decoded PE headers of one file.
#[derive(Debug, Clone)]
pub struct PeHeaders {
    e_lfanew: u32,
    coff: CoffHeader,
    optional: OptionalHeader,
    sections: Vec<SectionHeader>,
    loader: SectionLoader,
}

impl PeHeaders {
    /// Parse headers from a file accessor.
    pub fn parse(file: &dyn FileAccessor, limits: &ParseLimits) -> Result<Self> {
        let e_lfanew = parse_dos_header(file)?;
        let coff = parse_coff_header(file, e_lfanew)?;

        let optional_offset = e_lfanew as u64 + 4 + COFF_HEADER_SIZE as u64;
        let optional = parse_optional_header(file, optional_offset, coff.size_of_optional_header)?;

        let section_offset = optional_offset + coff.size_of_optional_header as u64;
        let sections =
            parse_section_headers(file, section_offset, coff.number_of_sections, limits)?;

        let loader = SectionLoader::new(
            file.len(),
            optional.file_alignment,
            optional.section_alignment,
        );

        debug!(
            e_lfanew = e_lfanew,
            sections = sections.len(),
            file_alignment = optional.file_alignment,
            section_alignment = optional.section_alignment,
            low_alignment = loader.is_low_alignment_mode(),
            "Parsed PE headers"
        );

        Ok(Self {
            e_lfanew,
            coff,
            optional,
            sections,
            loader,
        })
    }

    pub fn e_lfanew(&self) -> u32 {
        self.e_lfanew
    }

    pub fn coff_header(&self) -> &CoffHeader {
        &self.coff
    }

    pub fn optional_header(&self) -> &OptionalHeader {
        &self.optional
    }

    pub fn loader(&self) -> &SectionLoader {
        &self.loader
    }

    pub fn is_64bit(&self) -> bool {
        self.optional.is_64bit()
    }

    /// Get data directory by index
    pub fn data_directory(&self, index: usize) -> Option<&DataDirectory> {
        self.optional.data_directories.get(index)
    }

    /// First valid section whose file bytes contain `offset`.
    pub fn section_by_offset(&self, offset: u64) -> Option<&SectionHeader> {
        self.loader.section_by_offset(&self.sections, offset)
    }
}

impl HeaderAccessor for PeHeaders {
    fn file_size(&self) -> u64 {
        self.loader.file_size()
    }

    fn is_low_alignment_mode(&self) -> bool {
        self.loader.is_low_alignment_mode()
    }

    fn section_headers(&self) -> &[SectionHeader] {
        &self.sections
    }

    fn is_valid_section(&self, header: &SectionHeader) -> bool {
        self.loader.is_valid_section(header)
    }

    fn read_size(&self, header: &SectionHeader) -> u64 {
        self.loader.read_size(header)
    }

    fn aligned_pointer_to_raw(&self, header: &SectionHeader) -> u64 {
        self.loader.aligned_pointer_to_raw(header)
    }

    fn aligned_virtual_address(&self, header: &SectionHeader) -> u64 {
        self.loader.aligned_virtual_address(header)
    }

    fn section_by_offset(&self, offset: u64) -> Option<&SectionHeader> {
        PeHeaders::section_by_offset(self, offset)
    }
}
