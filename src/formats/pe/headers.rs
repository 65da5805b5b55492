//! PE header parsing
//!
//! Headers are read from the physical file. Unlike section data, a header
//! that is cut short is an error: nothing downstream can work without it.

use tracing::warn;

use crate::config::ParseLimits;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::ReadExt;
use crate::io::FileAccessor;

/// Reads exactly `len` bytes at `offset`, failing if the file ends first.
fn read_header_bytes(file: &dyn FileAccessor, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let n = file.read_at(offset, &mut buf)?;
    if n < len {
        return Err(PeError::TruncatedHeader {
            expected: len,
            actual: n,
        });
    }
    Ok(buf)
}

/// Parse the DOS header and return `e_lfanew`.
pub fn parse_dos_header(file: &dyn FileAccessor) -> Result<u32> {
    let data = read_header_bytes(file, 0, DOS_HEADER_SIZE)?;
    if data.read_u16_le_at(0) != Some(DOS_SIGNATURE) {
        return Err(PeError::InvalidDosSignature);
    }
    data.read_u32_le_at(0x3C).ok_or(PeError::TruncatedHeader {
        expected: DOS_HEADER_SIZE,
        actual: data.len(),
    })
}

/// Parse the PE signature and COFF header at `e_lfanew`.
pub fn parse_coff_header(file: &dyn FileAccessor, e_lfanew: u32) -> Result<CoffHeader> {
    let data = read_header_bytes(file, e_lfanew as u64, 4 + COFF_HEADER_SIZE)?;
    if data[..4] != PE_SIGNATURE {
        return Err(PeError::InvalidPeSignature);
    }
    let field16 = |off: usize| data.read_u16_le_at(4 + off).unwrap_or(0);

    Ok(CoffHeader {
        machine: field16(0),
        number_of_sections: field16(2),
        size_of_optional_header: field16(16),
    })
}

/// Parse the optional header at `offset`, `size` bytes long.
pub fn parse_optional_header(
    file: &dyn FileAccessor,
    offset: u64,
    size: u16,
) -> Result<OptionalHeader> {
    let data = read_header_bytes(file, offset, size as usize)?;
    let magic = data.read_u16_le_at(0).ok_or(PeError::TruncatedHeader {
        expected: 2,
        actual: data.len(),
    })?;

    let (fixed_len, image_base, rva_count_at) = match magic {
        PE32_MAGIC => (96, data.read_u32_le_at(28).map(u64::from), 92),
        PE32PLUS_MAGIC => (112, data.read_u64_le_at(24), 108),
        _ => return Err(PeError::InvalidMagic(magic)),
    };
    if data.len() < fixed_len {
        return Err(PeError::TruncatedHeader {
            expected: fixed_len,
            actual: data.len(),
        });
    }

    let field32 = |off: usize| data.read_u32_le_at(off).unwrap_or(0);
    let rva_count = (field32(rva_count_at) as usize).min(IMAGE_NUMBEROF_DIRECTORY_ENTRIES);

    // Directories that do not fit in the declared header size are dropped.
    let data_directories = (0..rva_count)
        .map_while(|i| {
            let at = fixed_len + i * 8;
            Some(DataDirectory {
                virtual_address: data.read_u32_le_at(at)?,
                size: data.read_u32_le_at(at + 4)?,
            })
        })
        .collect();

    Ok(OptionalHeader {
        magic,
        image_base: image_base.unwrap_or(0),
        section_alignment: field32(32),
        file_alignment: field32(36),
        data_directories,
    })
}

/// Parse up to `count` section headers at `offset`.
///
/// A table cut short by the end of the file yields the complete entries only.
pub fn parse_section_headers(
    file: &dyn FileAccessor,
    offset: u64,
    count: u16,
    limits: &ParseLimits,
) -> Result<Vec<SectionHeader>> {
    let mut count = count as usize;
    if count > limits.max_sections {
        warn!(
            declared = count,
            limit = limits.max_sections,
            "Section count exceeds limit; extra headers ignored"
        );
        count = limits.max_sections;
    }

    let mut data = vec![0u8; count * SECTION_HEADER_SIZE];
    let n = file.read_at(offset, &mut data)?;
    if n < data.len() {
        warn!(
            declared = count,
            complete = n / SECTION_HEADER_SIZE,
            "Section table truncated by end of file"
        );
    }

    Ok(data[..n]
        .chunks_exact(SECTION_HEADER_SIZE)
        .map(|raw| {
            let mut name = [0u8; 8];
            name.copy_from_slice(&raw[..8]);
            SectionHeader {
                name,
                virtual_size: raw.read_u32_le_at(8).unwrap_or(0),
                virtual_address: raw.read_u32_le_at(12).unwrap_or(0),
                size_of_raw_data: raw.read_u32_le_at(16).unwrap_or(0),
                pointer_to_raw_data: raw.read_u32_le_at(20).unwrap_or(0),
            }
        })
        .collect())
}
