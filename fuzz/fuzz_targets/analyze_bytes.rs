#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let file = pemap::io::MemoryFile::new(data.to_vec());
    let _ = pemap::analyze_accessor("fuzz", &file, &pemap::Config::default());
});
