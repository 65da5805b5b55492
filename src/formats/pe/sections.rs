//! Section placement rules: alignment, clamped read sizes and validity.
//!
//! These follow what the Windows loader does rather than what the headers
//! claim. Raw pointers are rounded down to 0x200, virtual addresses up to the
//! section alignment, and the bytes read for a section never exceed its
//! aligned raw size, its aligned virtual size, or the end of the file.

use crate::core::address_range::PhysicalRange;
use crate::formats::pe::types::SectionHeader;
use crate::formats::pe::utils::{align_down, align_up};

/// Granularity the loader applies to raw pointers and raw sizes.
pub const RAW_ALIGNMENT: u64 = 0x200;

/// Largest alignment for which equal file and section alignment means the
/// image is mapped 1:1.
pub const MAX_LOW_ALIGNMENT: u32 = 0x800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionLoader {
    file_size: u64,
    file_alignment: u32,
    section_alignment: u32,
}

impl SectionLoader {
    pub fn new(file_size: u64, file_alignment: u32, section_alignment: u32) -> Self {
        Self {
            file_size,
            file_alignment,
            section_alignment,
        }
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// File and section alignment coincide and are small: virtual and
    /// physical offsets are the same.
    pub fn is_low_alignment_mode(&self) -> bool {
        self.file_alignment >= 1
            && self.file_alignment == self.section_alignment
            && self.file_alignment <= MAX_LOW_ALIGNMENT
    }

    pub fn aligned_pointer_to_raw(&self, header: &SectionHeader) -> u64 {
        let pointer = header.pointer_to_raw_data as u64;
        if self.is_low_alignment_mode() {
            pointer
        } else {
            align_down(pointer, RAW_ALIGNMENT)
        }
    }

    pub fn aligned_virtual_address(&self, header: &SectionHeader) -> u64 {
        let va = header.virtual_address as u64;
        if self.is_low_alignment_mode() {
            va
        } else {
            align_up(va, self.section_alignment as u64)
        }
    }

    pub fn aligned_size_of_raw(&self, header: &SectionHeader) -> u64 {
        align_up(header.size_of_raw_data as u64, RAW_ALIGNMENT)
    }

    pub fn aligned_virtual_size(&self, header: &SectionHeader) -> u64 {
        align_up(header.virtual_size as u64, self.section_alignment as u64)
    }

    /// Number of file bytes the loader maps for this section.
    pub fn read_size(&self, header: &SectionHeader) -> u64 {
        let pointer = self.aligned_pointer_to_raw(header);
        let raw_end = header.pointer_to_raw_data as u64 + header.size_of_raw_data as u64;

        let mut size = align_up(raw_end, self.file_alignment as u64).saturating_sub(pointer);
        size = size.min(self.aligned_size_of_raw(header));
        // A zero virtual size means only the raw size counts.
        if header.virtual_size != 0 {
            size = size.min(self.aligned_virtual_size(header));
        }

        if pointer >= self.file_size {
            0
        } else {
            size.min(self.file_size - pointer)
        }
    }

    /// A section is mapped only if it contributes at least one file byte.
    pub fn is_valid_section(&self, header: &SectionHeader) -> bool {
        self.read_size(header) > 0
    }

    /// File bytes backing the section.
    pub fn physical_range(&self, header: &SectionHeader) -> PhysicalRange {
        PhysicalRange::with_len(self.aligned_pointer_to_raw(header), self.read_size(header))
    }

    /// First valid section, in table order, whose file bytes contain `offset`.
    pub fn section_by_offset<'h>(
        &self,
        headers: &'h [SectionHeader],
        offset: u64,
    ) -> Option<&'h SectionHeader> {
        headers
            .iter()
            .filter(|h| self.is_valid_section(h))
            .find(|h| self.physical_range(h).contains(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(va: u32, vsize: u32, raw: u32, rsize: u32) -> SectionHeader {
        SectionHeader {
            virtual_address: va,
            virtual_size: vsize,
            pointer_to_raw_data: raw,
            size_of_raw_data: rsize,
            ..SectionHeader::default()
        }
    }

    #[test]
    fn test_low_alignment_mode() {
        assert!(SectionLoader::new(0, 0x200, 0x200).is_low_alignment_mode());
        assert!(SectionLoader::new(0, 1, 1).is_low_alignment_mode());
        assert!(!SectionLoader::new(0, 0x200, 0x1000).is_low_alignment_mode());
        assert!(!SectionLoader::new(0, 0x1000, 0x1000).is_low_alignment_mode());
        assert!(!SectionLoader::new(0, 0, 0).is_low_alignment_mode());
    }

    #[test]
    fn test_regular_section() {
        let loader = SectionLoader::new(0x600, 0x200, 0x1000);
        let h = header(0x1000, 0x200, 0x400, 0x200);
        assert_eq!(loader.aligned_pointer_to_raw(&h), 0x400);
        assert_eq!(loader.aligned_virtual_address(&h), 0x1000);
        assert_eq!(loader.read_size(&h), 0x200);
        assert!(loader.is_valid_section(&h));
    }

    #[test]
    fn test_misaligned_pointer_rounds_down() {
        let loader = SectionLoader::new(0x1000, 0x200, 0x1000);
        let h = header(0x1000, 0, 0x410, 0x100);
        assert_eq!(loader.aligned_pointer_to_raw(&h), 0x400);
        // fileAligned(0x510) - 0x400 = 0x200, capped by aligned raw size 0x200
        assert_eq!(loader.read_size(&h), 0x200);
    }

    #[test]
    fn test_virtual_address_rounds_up() {
        let loader = SectionLoader::new(0x1000, 0x200, 0x1000);
        let h = header(0x1800, 0x100, 0x400, 0x200);
        assert_eq!(loader.aligned_virtual_address(&h), 0x2000);
    }

    #[test]
    fn test_read_size_clamped_to_file() {
        let loader = SectionLoader::new(0x500, 0x200, 0x1000);
        let h = header(0x1000, 0x1000, 0x400, 0x1000);
        assert_eq!(loader.read_size(&h), 0x100);

        let past_eof = header(0x2000, 0x1000, 0x800, 0x200);
        assert_eq!(loader.read_size(&past_eof), 0);
        assert!(!loader.is_valid_section(&past_eof));
    }

    #[test]
    fn test_virtual_size_caps_read() {
        let loader = SectionLoader::new(0x10000, 0x200, 0x1000);
        let h = header(0x1000, 0x10, 0x400, 0x4000);
        assert_eq!(loader.read_size(&h), 0x1000);
    }

    #[test]
    fn test_empty_raw_section_invalid() {
        let loader = SectionLoader::new(0x1000, 0x200, 0x1000);
        let bss = header(0x3000, 0x1000, 0, 0);
        assert!(!loader.is_valid_section(&bss));
    }

    #[test]
    fn test_section_by_offset() {
        let loader = SectionLoader::new(0x1000, 0x200, 0x1000);
        let headers = vec![
            header(0x1000, 0x200, 0x400, 0x200),
            header(0x2000, 0x200, 0x600, 0x200),
        ];
        assert_eq!(loader.section_by_offset(&headers, 0x450), Some(&headers[0]));
        assert_eq!(loader.section_by_offset(&headers, 0x600), Some(&headers[1]));
        assert_eq!(loader.section_by_offset(&headers, 0x800), None);
        assert_eq!(loader.section_by_offset(&headers, 0x100), None);
    }
}
