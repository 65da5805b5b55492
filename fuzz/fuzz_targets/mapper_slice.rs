#![no_main]
use libfuzzer_sys::fuzz_target;
use pemap::io::MemoryFile;
use pemap::mapping::{AddressMapper, PhysicalRange, VirtualRange};

// The first 16 bytes pick a mapping and a slice; the rest is the file.
fuzz_target!(|data: &[u8]| {
    if data.len() < 16 {
        return;
    }
    let word =
        |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]) as u64;
    let (va, len, from, span) = (word(0), word(4) & 0xFFFF, word(8), word(12) & 0xFFFF);

    let file = MemoryFile::new(data[16..].to_vec());
    let ranges = [(VirtualRange::with_len(va, len), PhysicalRange::with_len(0, len))];
    let Ok(mapper) = AddressMapper::from_ranges(ranges, &file) else {
        return;
    };
    if let Ok(bytes) = mapper.slice(from, from + span) {
        assert_eq!(bytes.len() as u64, span);
    }
});
