//! Virtual address space reconstruction.
//!
//! [`MappingBuilder`] turns section headers into an ordered list of
//! [`SectionMapping`]s and [`AddressMapper`] serves reads over the resulting
//! virtual address space straight from the file.

pub mod builder;
pub mod mapper;

use thiserror::Error;

use crate::io::error::IoError;

pub use crate::core::address_range::{ByteRange, PhysicalRange, SectionMapping, VirtualRange};
pub use builder::{HeaderAccessor, MappingBuilder};
pub use mapper::{AddressMapper, DEFAULT_CHUNK_SIZE};

/// Errors raised while building or reading an address space.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A mapping whose two sides differ in length
    #[error("virtual range length {virtual_len:#x} differs from physical range length {physical_len:#x}")]
    LengthMismatch { virtual_len: u64, physical_len: u64 },

    /// A slice request with `from > until`, or one too large to allocate
    #[error("invalid slice [{from:#x}, {until:#x})")]
    InvalidSlice { from: u64, until: u64 },

    /// An integer width outside what the target type holds
    #[error("unsupported integer width {width} (maximum {max})")]
    InvalidWidth { width: usize, max: usize },

    /// The file accessor failed
    #[error(transparent)]
    Io(#[from] IoError),
}

pub type Result<T> = std::result::Result<T, MappingError>;
