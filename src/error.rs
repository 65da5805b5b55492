//! Error types for the pemap crate.
//!
//! Each layer owns a focused error enum; `PemapError` gathers them for the
//! top-level API.

use thiserror::Error;

use crate::formats::pe::PeError;
use crate::io::error::IoError;
use crate::mapping::MappingError;

/// Main error type for pemap operations.
#[derive(Debug, Error)]
pub enum PemapError {
    /// File access errors
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Malformed PE headers
    #[error("PE error: {0}")]
    Pe(#[from] PeError),

    /// Address mapping errors
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Report serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for PemapError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::StdIo(err))
    }
}

/// Result type alias for pemap operations
pub type Result<T> = std::result::Result<T, PemapError>;
