//! Read access to a PE file's virtual address space.

use tracing::{debug, trace};

use crate::core::address_range::{ByteRange, PhysicalRange, SectionMapping, VirtualRange};
use crate::io::FileAccessor;
use crate::mapping::{MappingError, Result};

/// Bytes fetched per step by [`AddressMapper::find_first_match`].
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// The virtual address space of a file, reconstructed from section mappings.
///
/// Mappings keep the order they were given in. That order decides which
/// mapping answers a single-byte read (the first one covering the offset),
/// which one wins in a [`slice`](Self::slice) where mappings overlap (the last
/// one), and what [`len`](Self::len) reports (the end of the last one).
///
/// Nothing is cached: every read goes back to the file accessor. Offsets not
/// covered by any mapping read as zero, and so do bytes a mapping claims
/// past the end of the file. Only accessor failures surface as errors.
pub struct AddressMapper<'f> {
    mappings: Vec<SectionMapping>,
    file: &'f dyn FileAccessor,
    chunk_size: usize,
}

impl<'f> AddressMapper<'f> {
    pub fn new(mappings: Vec<SectionMapping>, file: &'f dyn FileAccessor) -> Self {
        debug!(
            mappings = mappings.len(),
            file_size = file.len(),
            "Creating address mapper"
        );
        Self {
            mappings,
            file,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Builds the mapper from raw range pairs, validating each pair.
    pub fn from_ranges<I>(ranges: I, file: &'f dyn FileAccessor) -> Result<Self>
    where
        I: IntoIterator<Item = (VirtualRange, PhysicalRange)>,
    {
        let mappings = ranges
            .into_iter()
            .map(|(v, p)| SectionMapping::new(v, p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(mappings, file))
    }

    /// Sets the search chunk size. Zero is treated as one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn mappings(&self) -> &[SectionMapping] {
        &self.mappings
    }

    pub fn file(&self) -> &'f dyn FileAccessor {
        self.file
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// End of the last mapping in list order, or 0 without mappings.
    ///
    /// This is not a maximum: a last mapping that ends below an earlier one
    /// shortens the space. See [`highest_address`](Self::highest_address).
    pub fn len(&self) -> u64 {
        self.mappings.last().map_or(0, |m| m.virtual_range().end)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest virtual end across all mappings.
    pub fn highest_address(&self) -> u64 {
        self.mappings
            .iter()
            .map(|m| m.virtual_range().end)
            .max()
            .unwrap_or(0)
    }

    /// First mapping, in list order, covering `offset`.
    fn mapping_for(&self, offset: u64) -> Option<&SectionMapping> {
        self.mappings
            .iter()
            .find(|m| m.virtual_range().contains(offset))
    }

    /// File offset backing a virtual offset, if any mapping covers it.
    pub fn virtual_to_physical(&self, offset: u64) -> Option<u64> {
        self.mapping_for(offset).and_then(|m| m.to_physical(offset))
    }

    /// Reads the byte at a virtual offset; unmapped offsets read as 0.
    pub fn byte_at(&self, offset: u64) -> Result<u8> {
        let Some(mapping) = self.mapping_for(offset) else {
            return Ok(0);
        };
        let mut buf = [0u8; 1];
        self.read_into(mapping, offset, &mut buf)?;
        Ok(buf[0])
    }

    /// Reads `size` bytes at a virtual offset through one mapping.
    ///
    /// Bytes outside the mapping, or past the end of the file, are zero.
    pub fn bytes_at(&self, mapping: &SectionMapping, offset: u64, size: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        self.read_into(mapping, offset, &mut buf)?;
        Ok(buf)
    }

    // Fills all of `buf`: file bytes first, zeros for whatever the mapping or
    // the file cannot supply.
    fn read_into(&self, mapping: &SectionMapping, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        if let Some(physical) = mapping.to_physical(offset) {
            let available = mapping.virtual_range().end - offset;
            let want = usize::try_from(available).map_or(buf.len(), |a| a.min(buf.len()));
            filled = self.file.read_at(physical, &mut buf[..want])?;
            trace!(
                offset = offset,
                physical = physical,
                requested = buf.len(),
                read = filled,
                "Mapped read"
            );
        }
        buf[filled..].fill(0);
        Ok(())
    }

    /// Returns the bytes of `[from, until)` as they appear in memory.
    ///
    /// Positions no mapping covers are zero. Where mappings overlap, the one
    /// later in the list overwrites earlier ones.
    pub fn slice(&self, from: u64, until: u64) -> Result<Vec<u8>> {
        let invalid = || MappingError::InvalidSlice { from, until };
        if from > until {
            return Err(invalid());
        }
        let len = usize::try_from(until - from).map_err(|_| invalid())?;
        let mut out = Vec::new();
        out.try_reserve_exact(len).map_err(|_| invalid())?;
        out.resize(len, 0);
        let window = ByteRange::new(from, until);

        for mapping in &self.mappings {
            let Some(hit) = mapping.virtual_range().intersection(&window) else {
                continue;
            };
            // Both bounds lie inside `window`, whose length fits in usize.
            let pos = (hit.start - from) as usize;
            let end = (hit.end - from) as usize;
            self.read_into(mapping, hit.start, &mut out[pos..end])?;
        }
        Ok(out)
    }

    /// Finds the first offset at or after `from` whose byte satisfies
    /// `predicate`, scanning chunk by chunk up to [`len`](Self::len).
    pub fn find_first_match<P>(&self, mut predicate: P, from: u64) -> Result<Option<u64>>
    where
        P: FnMut(u8) -> bool,
    {
        let end = self.len();
        let mut cursor = from;
        while cursor < end {
            let until = cursor.saturating_add(self.chunk_size as u64).min(end);
            let chunk = self.slice(cursor, until)?;
            if let Some(pos) = chunk.iter().position(|&b| predicate(b)) {
                return Ok(Some(cursor + pos as u64));
            }
            cursor = until;
        }
        Ok(None)
    }

    /// Finds the first occurrence of `value` at or after `from`.
    pub fn find_first_byte(&self, value: u8, from: u64) -> Result<Option<u64>> {
        self.find_first_match(|b| b == value, from)
    }

    /// Decodes `width` bytes (1 to 4) at `offset` as a little-endian integer.
    pub fn read_int_le(&self, offset: u64, width: usize) -> Result<u32> {
        if width == 0 || width > 4 {
            return Err(MappingError::InvalidWidth { width, max: 4 });
        }
        Ok(self.read_long_le(offset, width)? as u32)
    }

    /// Decodes `width` bytes (1 to 8) at `offset` as a little-endian integer.
    pub fn read_long_le(&self, offset: u64, width: usize) -> Result<u64> {
        if width == 0 || width > 8 {
            return Err(MappingError::InvalidWidth { width, max: 8 });
        }
        let bytes = self.slice(offset, offset.saturating_add(width as u64))?;
        let mut raw = [0u8; 8];
        raw[..bytes.len()].copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(raw))
    }

    pub fn read_u16_le(&self, offset: u64) -> Result<u16> {
        Ok(self.read_int_le(offset, 2)? as u16)
    }

    pub fn read_u32_le(&self, offset: u64) -> Result<u32> {
        self.read_int_le(offset, 4)
    }

    pub fn read_u64_le(&self, offset: u64) -> Result<u64> {
        self.read_long_le(offset, 8)
    }
}

impl std::fmt::Debug for AddressMapper<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressMapper")
            .field("mappings", &self.mappings)
            .field("file_size", &self.file.len())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}
