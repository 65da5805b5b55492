//! Base scan over the section table.

use crate::anomaly::{
    Anomaly, AnomalyDetector, AnomalyPayload, AnomalySubtype, ScanContext, StructureKey,
};
use crate::core::address_range::VirtualRange;
use crate::error::Result;
use crate::mapping::HeaderAccessor;

/// First stage of every scan.
///
/// Reports sections the validity policy keeps out of the address space and
/// mapped sections whose virtual ranges overlap.
#[derive(Debug, Clone, Copy)]
pub struct BaseScan {
    section_checks: bool,
}

impl BaseScan {
    pub fn new(section_checks: bool) -> Self {
        Self { section_checks }
    }

    fn invalid_sections(headers: &dyn HeaderAccessor) -> Vec<Anomaly> {
        headers
            .section_headers()
            .iter()
            .enumerate()
            .filter(|(_, h)| !headers.is_valid_section(h))
            .map(|(index, h)| {
                let name = h.name();
                Anomaly::new(
                    AnomalySubtype::InvalidSection,
                    StructureKey::SectionTable,
                    format!(
                        "Section {} ({}) has no file data in bounds and is not mapped",
                        index + 1,
                        name
                    ),
                )
                .with_payload(AnomalyPayload::Sections(vec![name]))
            })
            .collect()
    }

    fn overlapping_sections(headers: &dyn HeaderAccessor) -> Vec<Anomaly> {
        let mapped: Vec<(String, VirtualRange)> = headers
            .section_headers()
            .iter()
            .filter(|h| headers.is_valid_section(h))
            .map(|h| {
                let range = VirtualRange::with_len(
                    headers.aligned_virtual_address(h),
                    headers.read_size(h),
                );
                (h.name(), range)
            })
            .collect();

        let mut found = Vec::new();
        for (i, (first, a)) in mapped.iter().enumerate() {
            for (second, b) in &mapped[i + 1..] {
                if let Some(shared) = a.intersection(b) {
                    found.push(
                        Anomaly::new(
                            AnomalySubtype::OverlappingSections,
                            StructureKey::SectionTable,
                            format!("Sections {} and {} overlap at v{}", first, second, shared),
                        )
                        .with_payload(AnomalyPayload::Sections(vec![
                            first.clone(),
                            second.clone(),
                        ])),
                    );
                }
            }
        }
        found
    }
}

impl Default for BaseScan {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AnomalyDetector for BaseScan {
    fn name(&self) -> &'static str {
        "base"
    }

    fn title(&self) -> &str {
        "Section table"
    }

    fn scan(&self, ctx: &ScanContext<'_>) -> Result<Vec<Anomaly>> {
        // In low alignment mode the file is mapped whole; sections drop nothing.
        if !self.section_checks || ctx.headers.is_low_alignment_mode() {
            return Ok(Vec::new());
        }
        let mut found = Self::invalid_sections(ctx.headers);
        found.extend(Self::overlapping_sections(ctx.headers));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::pe::sections::SectionLoader;
    use crate::formats::pe::types::SectionHeader;
    use crate::io::MemoryFile;
    use crate::mapping::AddressMapper;

    struct Table {
        loader: SectionLoader,
        sections: Vec<SectionHeader>,
    }

    impl HeaderAccessor for Table {
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

    fn section(name: &str, va: u32, raw: u32, rsize: u32) -> SectionHeader {
        let mut header = SectionHeader {
            virtual_address: va,
            virtual_size: rsize,
            pointer_to_raw_data: raw,
            size_of_raw_data: rsize,
            ..SectionHeader::default()
        };
        header.name[..name.len()].copy_from_slice(name.as_bytes());
        header
    }

    fn scan(table: &Table, checks: bool) -> Vec<Anomaly> {
        let file = MemoryFile::new(vec![0u8; table.loader.file_size() as usize]);
        let mapper = AddressMapper::new(vec![], &file);
        let ctx = ScanContext {
            file_name: "t",
            headers: table,
            mapper: &mapper,
            imports: None,
        };
        BaseScan::new(checks).scan(&ctx).unwrap()
    }

    #[test]
    fn test_clean_table() {
        let table = Table {
            loader: SectionLoader::new(0x800, 0x200, 0x1000),
            sections: vec![
                section(".text", 0x1000, 0x400, 0x200),
                section(".data", 0x2000, 0x600, 0x200),
            ],
        };
        assert!(scan(&table, true).is_empty());
    }

    #[test]
    fn test_invalid_and_overlapping() {
        let table = Table {
            loader: SectionLoader::new(0x800, 0x200, 0x1000),
            sections: vec![
                section(".text", 0x1000, 0x400, 0x400),
                section(".bad", 0x3000, 0x2000, 0x200),
                section(".data", 0x1000, 0x600, 0x200),
            ],
        };
        let found = scan(&table, true);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].subtype, AnomalySubtype::InvalidSection);
        assert!(found[0].description.contains(".bad"));
        assert_eq!(found[1].subtype, AnomalySubtype::OverlappingSections);
        assert_eq!(
            found[1].payload,
            Some(AnomalyPayload::Sections(vec![".text".into(), ".data".into()]))
        );

        assert!(scan(&table, false).is_empty());
    }

    #[test]
    fn test_low_alignment_is_quiet() {
        let table = Table {
            loader: SectionLoader::new(0x800, 0x200, 0x200),
            sections: vec![section(".bad", 0x3000, 0x2000, 0x200)],
        };
        assert!(scan(&table, true).is_empty());
    }
}
