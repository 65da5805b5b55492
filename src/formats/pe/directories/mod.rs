//! Data directory parsers

pub mod import;

pub use import::parse_imports;
