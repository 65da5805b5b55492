//! Derives section mappings from decoded headers.

use tracing::{debug, warn};

use crate::core::address_range::{PhysicalRange, SectionMapping, VirtualRange};
use crate::formats::pe::types::SectionHeader;
use crate::mapping::Result;

/// What the mapping layer needs to know about a file's headers.
///
/// The validity policy and the read-size clamp live behind this trait so
/// callers can plug in their own rules.
pub trait HeaderAccessor {
    /// Total length of the file in bytes.
    fn file_size(&self) -> u64;

    /// Virtual and physical offsets coincide for the whole file.
    fn is_low_alignment_mode(&self) -> bool;

    /// Section headers in section-table order.
    fn section_headers(&self) -> &[SectionHeader];

    /// Whether the section gets a mapping at all.
    fn is_valid_section(&self, header: &SectionHeader) -> bool;

    /// File bytes mapped for the section, clamped to what the file holds.
    fn read_size(&self, header: &SectionHeader) -> u64;

    fn aligned_pointer_to_raw(&self, header: &SectionHeader) -> u64;

    fn aligned_virtual_address(&self, header: &SectionHeader) -> u64;

    /// The section owning a physical offset, if any.
    fn section_by_offset(&self, offset: u64) -> Option<&SectionHeader>;
}

/// Turns headers into an ordered list of section mappings.
pub struct MappingBuilder<'h> {
    headers: &'h dyn HeaderAccessor,
}

impl<'h> MappingBuilder<'h> {
    pub fn new(headers: &'h dyn HeaderAccessor) -> Self {
        Self { headers }
    }

    /// One mapping per accepted section, in section-table order.
    ///
    /// In low-alignment mode the whole file is mapped 1:1 instead.
    pub fn build(&self) -> Result<Vec<SectionMapping>> {
        let file_size = self.headers.file_size();
        if self.headers.is_low_alignment_mode() {
            debug!(file_size = file_size, "Low alignment mode, mapping file 1:1");
            let mapping = SectionMapping::new(
                VirtualRange::new(0, file_size),
                PhysicalRange::new(0, file_size),
            )?;
            return Ok(vec![mapping]);
        }

        let mut mappings = Vec::new();
        for (index, header) in self.headers.section_headers().iter().enumerate() {
            if !self.headers.is_valid_section(header) {
                debug!(index = index, name = %header.name(), "Skipping invalid section");
                continue;
            }
            let size = self.headers.read_size(header);
            let physical =
                PhysicalRange::with_len(self.headers.aligned_pointer_to_raw(header), size);
            let virt = VirtualRange::with_len(self.headers.aligned_virtual_address(header), size);
            let mapping = SectionMapping::new(virt, physical)?;
            debug!(index = index, name = %header.name(), mapping = %mapping, "Mapped section");
            mappings.push(mapping);
        }

        if let Some(last) = mappings.last() {
            let last_end = last.virtual_range().end;
            let highest = mappings
                .iter()
                .map(|m| m.virtual_range().end)
                .max()
                .unwrap_or(last_end);
            if highest != last_end {
                warn!(
                    last_end = last_end,
                    highest = highest,
                    "Last section does not end highest; mapped length is shorter than the image"
                );
            }
        }

        Ok(mappings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::pe::sections::SectionLoader;

    struct FakeHeaders {
        loader: SectionLoader,
        sections: Vec<SectionHeader>,
    }

    impl HeaderAccessor for FakeHeaders {
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
            self.loader.section_by_offset(&self.sections, offset)
        }
    }

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
    fn test_low_alignment_maps_whole_file() {
        let headers = FakeHeaders {
            loader: SectionLoader::new(0x345, 0x200, 0x200),
            sections: vec![header(0x1000, 0x200, 0x200, 0x200)],
        };
        let mappings = MappingBuilder::new(&headers).build().unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].virtual_range(), VirtualRange::new(0, 0x345));
        assert_eq!(mappings[0].physical_range(), PhysicalRange::new(0, 0x345));
    }

    #[test]
    fn test_one_mapping_per_valid_section_in_order() {
        let headers = FakeHeaders {
            loader: SectionLoader::new(0x1000, 0x200, 0x1000),
            sections: vec![
                header(0x2000, 0x200, 0x600, 0x200),
                header(0x3000, 0x1000, 0, 0), // no raw data
                header(0x1000, 0x200, 0x400, 0x200),
                header(0x4000, 0x200, 0x2000, 0x200), // past end of file
            ],
        };
        let mappings = MappingBuilder::new(&headers).build().unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].virtual_range(), VirtualRange::new(0x2000, 0x2200));
        assert_eq!(mappings[0].physical_range(), PhysicalRange::new(0x600, 0x800));
        assert_eq!(mappings[1].virtual_range(), VirtualRange::new(0x1000, 0x1200));
    }

    #[test]
    fn test_overstated_raw_size_is_clamped() {
        let headers = FakeHeaders {
            loader: SectionLoader::new(0x500, 0x200, 0x1000),
            sections: vec![header(0x1000, 0x1000, 0x400, 0x1000)],
        };
        let mappings = MappingBuilder::new(&headers).build().unwrap();
        assert_eq!(mappings[0].physical_range(), PhysicalRange::new(0x400, 0x500));
        assert_eq!(mappings[0].virtual_range(), VirtualRange::new(0x1000, 0x1100));
    }

    #[test]
    fn test_no_sections() {
        let headers = FakeHeaders {
            loader: SectionLoader::new(0x1000, 0x200, 0x1000),
            sections: vec![],
        };
        assert!(MappingBuilder::new(&headers).build().unwrap().is_empty());
    }
}
