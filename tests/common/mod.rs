//! Common test utilities and helpers.
//!
//! Integration tests build small PE images in memory with [`PeBuilder`] and
//! write them to temporary files with [`create_temp_file`].

#![allow(dead_code)]

pub mod test_utils;

pub use test_utils::create_temp_file;

/// Offset of the PE signature in every built image.
pub const E_LFANEW: usize = 0x80;
/// Size of the PE32 optional header written by the builder.
pub const OPTIONAL_HEADER_SIZE: usize = 0xE0;

const OPTIONAL_HEADER_AT: usize = E_LFANEW + 4 + 20;
const SECTION_TABLE_AT: usize = OPTIONAL_HEADER_AT + OPTIONAL_HEADER_SIZE;

/// One section table entry.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: &'static str,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub pointer_to_raw_data: u32,
    pub size_of_raw_data: u32,
}

/// Builds a minimal PE32 image.
#[derive(Debug, Clone)]
pub struct PeBuilder {
    size: usize,
    file_alignment: u32,
    section_alignment: u32,
    sections: Vec<Section>,
    import_directory: Option<(u32, u32)>,
    patches: Vec<(usize, Vec<u8>)>,
}

impl PeBuilder {
    /// An image of `size` bytes with file alignment 0x200 and section
    /// alignment 0x1000.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            file_alignment: 0x200,
            section_alignment: 0x1000,
            sections: Vec::new(),
            import_directory: None,
            patches: Vec::new(),
        }
    }

    pub fn alignment(mut self, file_alignment: u32, section_alignment: u32) -> Self {
        self.file_alignment = file_alignment;
        self.section_alignment = section_alignment;
        self
    }

    pub fn section(
        mut self,
        name: &'static str,
        virtual_address: u32,
        virtual_size: u32,
        pointer_to_raw_data: u32,
        size_of_raw_data: u32,
    ) -> Self {
        self.sections.push(Section {
            name,
            virtual_address,
            virtual_size,
            pointer_to_raw_data,
            size_of_raw_data,
        });
        self
    }

    pub fn import_directory(mut self, rva: u32, size: u32) -> Self {
        self.import_directory = Some((rva, size));
        self
    }

    /// Writes `bytes` at file offset `at` after the headers are laid out.
    pub fn put(mut self, at: usize, bytes: &[u8]) -> Self {
        self.patches.push((at, bytes.to_vec()));
        self
    }

    pub fn put_u32(self, at: usize, value: u32) -> Self {
        self.put(at, &value.to_le_bytes())
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = vec![0u8; self.size];
        let put = |data: &mut Vec<u8>, at: usize, bytes: &[u8]| {
            data[at..at + bytes.len()].copy_from_slice(bytes);
        };

        put(&mut data, 0, b"MZ");
        put(&mut data, 0x3C, &(E_LFANEW as u32).to_le_bytes());
        put(&mut data, E_LFANEW, b"PE\0\0");

        // COFF header
        let coff = E_LFANEW + 4;
        put(&mut data, coff, &0x14Cu16.to_le_bytes());
        put(&mut data, coff + 2, &(self.sections.len() as u16).to_le_bytes());
        put(&mut data, coff + 16, &(OPTIONAL_HEADER_SIZE as u16).to_le_bytes());

        // Optional header
        let opt = OPTIONAL_HEADER_AT;
        put(&mut data, opt, &0x10Bu16.to_le_bytes());
        put(&mut data, opt + 28, &0x0040_0000u32.to_le_bytes());
        put(&mut data, opt + 32, &self.section_alignment.to_le_bytes());
        put(&mut data, opt + 36, &self.file_alignment.to_le_bytes());
        put(&mut data, opt + 92, &16u32.to_le_bytes());
        if let Some((rva, size)) = self.import_directory {
            put(&mut data, opt + 96 + 8, &rva.to_le_bytes());
            put(&mut data, opt + 96 + 12, &size.to_le_bytes());
        }

        for (i, s) in self.sections.iter().enumerate() {
            let at = SECTION_TABLE_AT + i * 40;
            put(&mut data, at, s.name.as_bytes());
            put(&mut data, at + 8, &s.virtual_size.to_le_bytes());
            put(&mut data, at + 12, &s.virtual_address.to_le_bytes());
            put(&mut data, at + 16, &s.size_of_raw_data.to_le_bytes());
            put(&mut data, at + 20, &s.pointer_to_raw_data.to_le_bytes());
        }

        for (at, bytes) in &self.patches {
            put(&mut data, *at, bytes);
        }
        data
    }
}

/// Fills `data[from..until]` with a position-dependent pattern that never
/// contains zero.
pub fn fill_pattern(data: &mut [u8], from: usize, until: usize) {
    for (i, b) in data[from..until].iter_mut().enumerate() {
        *b = (i % 251) as u8 + 1;
    }
}
