//! Shared test utilities for temporary files.

use std::io::Write;
use tempfile::NamedTempFile;

/// Creates a temporary file with the given content.
///
/// The file is removed when the returned `NamedTempFile` is dropped.
///
/// # Panics
///
/// Panics if the temporary file cannot be created or written.
pub fn create_temp_file(content: &[u8]) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_create_temp_file() {
        let content = b"hello world";
        let temp_file = create_temp_file(content);
        assert_eq!(fs::read(temp_file.path()).unwrap(), content);
    }
}
