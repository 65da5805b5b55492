//! Import table parsing
//!
//! The import directory is decoded through the [`AddressMapper`], the way the
//! loader sees it. Every structure read also records a [`Location`]: the file
//! offset its bytes came from, or [`Location::UNMAPPED`] when no section
//! backs its virtual address.

use tracing::{debug, warn};

use crate::config::ParseLimits;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::{until_nul, ReadExt};
use crate::formats::pe::PeHeaders;
use crate::mapping::{AddressMapper, Result};

struct ImportReader<'m, 'f> {
    mapper: &'m AddressMapper<'f>,
    limits: &'m ParseLimits,
    is_64bit: bool,
    total: usize,
}

impl ImportReader<'_, '_> {
    fn location(&self, rva: u64, size: u64) -> Location {
        let from = self
            .mapper
            .virtual_to_physical(rva)
            .and_then(|p| i64::try_from(p).ok())
            .unwrap_or(Location::UNMAPPED);
        Location::new(from, size)
    }

    /// NUL-terminated string at `rva`, with the location of its bytes.
    fn read_name(&self, rva: u64) -> Result<(String, Location)> {
        let raw = self
            .mapper
            .slice(rva, rva.saturating_add(self.limits.max_name_len as u64))?;
        let name = until_nul(&raw);
        let size = (name.len() + 1).min(raw.len()) as u64;
        Ok((String::from_utf8_lossy(name).into_owned(), self.location(rva, size)))
    }

    fn read_descriptor(&mut self, rva: u64) -> Result<Option<Import>> {
        let raw = self.mapper.slice(rva, rva + IMPORT_DESCRIPTOR_SIZE)?;
        if raw.iter().all(|&b| b == 0) {
            return Ok(None);
        }
        let field = |off: usize| raw.read_u32_le_at(off).unwrap_or(0) as u64;
        let original_first_thunk = field(0);
        let name_rva = field(12);
        let first_thunk = field(16);

        let (name, name_location) = self.read_name(name_rva)?;
        let mut import = Import::new(name);
        import.locations.push(self.location(rva, IMPORT_DESCRIPTOR_SIZE));
        import.locations.push(name_location);

        let thunk_rva = if original_first_thunk != 0 {
            original_first_thunk
        } else {
            first_thunk
        };
        if thunk_rva != 0 {
            self.read_thunks(thunk_rva, &mut import)?;
        }
        Ok(Some(import))
    }

    fn read_thunks(&mut self, start: u64, import: &mut Import) -> Result<()> {
        let (entry_size, ordinal_flag) = if self.is_64bit {
            (8u64, IMAGE_ORDINAL_FLAG64)
        } else {
            (4u64, IMAGE_ORDINAL_FLAG32)
        };

        let mut rva = start;
        while self.total < self.limits.max_imports {
            let value = self.mapper.read_long_le(rva, entry_size as usize)?;
            if value == 0 {
                break;
            }
            import.locations.push(self.location(rva, entry_size));

            if value & ordinal_flag != 0 {
                import.ordinal_imports.push((value & 0xFFFF) as u16);
            } else {
                let hint_rva = value & 0x7FFF_FFFF;
                let hint = self.mapper.read_u16_le(hint_rva)?;
                let (name, location) = self.read_name(hint_rva + 2)?;
                import.locations.push(self.location(hint_rva, 2 + location.size));
                import.name_imports.push(NameImport { hint, name });
            }

            self.total += 1;
            rva = rva.saturating_add(entry_size);
        }
        Ok(())
    }
}

/// Parse the import directory, if the file has one.
///
/// Returns `None` when the import data directory is absent or its address is
/// not backed by any section.
pub fn parse_imports(
    headers: &PeHeaders,
    mapper: &AddressMapper<'_>,
    limits: &ParseLimits,
) -> Result<Option<ImportSection>> {
    let Some(dir) = headers
        .data_directory(IMAGE_DIRECTORY_ENTRY_IMPORT)
        .filter(|d| d.is_present())
    else {
        return Ok(None);
    };
    let dir_rva = dir.virtual_address as u64;
    let Some(directory_offset) = mapper.virtual_to_physical(dir_rva) else {
        debug!(rva = dir_rva, "Import directory is not mapped");
        return Ok(None);
    };

    let mut reader = ImportReader {
        mapper,
        limits,
        is_64bit: headers.is_64bit(),
        total: 0,
    };
    let mut imports = Vec::new();
    for index in 0..limits.max_import_descriptors as u64 {
        let rva = dir_rva + index * IMPORT_DESCRIPTOR_SIZE;
        match reader.read_descriptor(rva)? {
            Some(import) => imports.push(import),
            None => break,
        }
        if reader.total >= limits.max_imports {
            warn!(limit = limits.max_imports, "Import limit reached");
            break;
        }
    }

    debug!(
        dlls = imports.len(),
        entries = reader.total,
        directory_offset = directory_offset,
        "Parsed import directory"
    );
    Ok(Some(ImportSection {
        imports,
        directory_offset,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address_range::{PhysicalRange, VirtualRange};
    use crate::io::MemoryFile;

    // A 32-bit import table laid out at virtual 0x2000, backed by file 0x200.
    fn import_image() -> Vec<u8> {
        let mut data = vec![0u8; 0x400];
        let base = 0x200;
        let put32 = |d: &mut Vec<u8>, at: usize, v: u32| {
            d[at..at + 4].copy_from_slice(&v.to_le_bytes());
        };
        // Descriptor 0: kernel32.dll, ILT at 0x2080, name at 0x2060
        put32(&mut data, base, 0x2080);
        put32(&mut data, base + 12, 0x2060);
        put32(&mut data, base + 16, 0x2080);
        // Descriptor 1 is zero (terminator).
        data[base + 0x60..base + 0x6C].copy_from_slice(b"KERNEL32.dll");
        // ILT: ordinal 5, then a name import, then terminator
        put32(&mut data, base + 0x80, 0x8000_0005);
        put32(&mut data, base + 0x84, 0x20A0);
        data[base + 0xA0..base + 0xA2].copy_from_slice(&7u16.to_le_bytes());
        data[base + 0xA2..base + 0xAD].copy_from_slice(b"CreateFileA");
        data
    }

    #[test]
    fn test_reader_decodes_descriptor() {
        let file = MemoryFile::new(import_image());
        let mapper = AddressMapper::from_ranges(
            [(VirtualRange::new(0x2000, 0x2200), PhysicalRange::new(0x200, 0x400))],
            &file,
        )
        .unwrap();
        let limits = ParseLimits::default();
        let mut reader = ImportReader {
            mapper: &mapper,
            limits: &limits,
            is_64bit: false,
            total: 0,
        };

        let import = reader.read_descriptor(0x2000).unwrap().unwrap();
        assert_eq!(import.name, "KERNEL32.dll");
        assert_eq!(import.ordinal_imports, vec![5]);
        assert_eq!(
            import.name_imports,
            vec![NameImport {
                hint: 7,
                name: "CreateFileA".to_string()
            }]
        );
        assert_eq!(
            import.locations,
            vec![
                Location::new(0x200, 20),
                Location::new(0x260, 13),
                Location::new(0x280, 4),
                Location::new(0x284, 4),
                Location::new(0x2A0, 14),
            ]
        );
        assert!(reader.read_descriptor(0x2014).unwrap().is_none());
    }

    #[test]
    fn test_unmapped_structures_use_sentinel() {
        let mut data = import_image();
        // Point the name outside every mapping.
        data[0x200 + 12..0x200 + 16].copy_from_slice(&0x9000u32.to_le_bytes());
        let file = MemoryFile::new(data);
        let mapper = AddressMapper::from_ranges(
            [(VirtualRange::new(0x2000, 0x2200), PhysicalRange::new(0x200, 0x400))],
            &file,
        )
        .unwrap();
        let limits = ParseLimits::default();
        let mut reader = ImportReader {
            mapper: &mapper,
            limits: &limits,
            is_64bit: false,
            total: 0,
        };
        let import = reader.read_descriptor(0x2000).unwrap().unwrap();
        assert_eq!(import.name, "");
        assert_eq!(import.locations[1], Location::new(Location::UNMAPPED, 1));
    }

    #[test]
    fn test_import_limit() {
        let file = MemoryFile::new(import_image());
        let mapper = AddressMapper::from_ranges(
            [(VirtualRange::new(0x2000, 0x2200), PhysicalRange::new(0x200, 0x400))],
            &file,
        )
        .unwrap();
        let limits = ParseLimits {
            max_imports: 1,
            ..ParseLimits::default()
        };
        let mut reader = ImportReader {
            mapper: &mapper,
            limits: &limits,
            is_64bit: false,
            total: 0,
        };
        let import = reader.read_descriptor(0x2000).unwrap().unwrap();
        assert_eq!(import.ordinal_imports, vec![5]);
        assert!(import.name_imports.is_empty());
    }
}
