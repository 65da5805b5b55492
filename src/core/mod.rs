//! Core data types shared across modules.

pub mod address_range;
