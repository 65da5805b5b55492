//! Binary format decoders.

pub mod pe;
