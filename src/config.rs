//! Configuration for file access, address mapping, parsing limits and scans.
//!
//! Every section has sensible defaults; partial JSON documents are accepted
//! and missing fields fall back to `Default`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PemapError, Result};

/// Master configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File access configuration.
    pub io: IoConfig,
    /// Address mapper configuration.
    pub mapper: MapperConfig,
    /// Resource limits for header and import parsing.
    pub limits: ParseLimits,
    /// Which anomaly checks run.
    pub scan: ScanConfig,
}

impl Config {
    /// Parses a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| PemapError::Config(e.to_string()))
    }

    /// Reads and parses a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PemapError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PemapError::Config(e.to_string()))
    }
}

/// How the file backing an address mapper is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// A fresh handle for every read.
    #[default]
    Transient,
    /// One shared read-only memory map.
    Mapped,
}

/// I/O configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Largest file that will be opened.
    pub max_file_size: u64,
    /// Access strategy.
    pub access: AccessMode,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024, // 100MB
            access: AccessMode::Transient,
        }
    }
}

/// Address mapper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Bytes fetched per step by the search operations.
    pub chunk_size: usize,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self { chunk_size: 512 }
    }
}

/// Limits applied while decoding headers and imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseLimits {
    /// Section headers read from the section table.
    pub max_sections: usize,
    /// Import descriptors read before giving up.
    pub max_import_descriptors: usize,
    /// Total import entries across all descriptors.
    pub max_imports: usize,
    /// Longest DLL or symbol name read.
    pub max_name_len: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_sections: 96,
            max_import_descriptors: 1024,
            max_imports: 10_000,
            max_name_len: 256,
        }
    }
}

/// Toggles for the anomaly checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Section table checks performed by the base scan.
    pub base_section_checks: bool,
    /// Import metadata outside the import directory's section.
    pub fractionated_imports: bool,
    /// kernel32.dll imported by ordinal.
    pub kernel32_ordinals: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            base_section_checks: true,
            fractionated_imports: true,
            kernel32_ordinals: true,
        }
    }
}
