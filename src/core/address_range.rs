//! Half-open byte ranges and the section mappings built from them.
//!
//! A [`ByteRange`] covers `[start, end)` in a single address space. The
//! [`VirtualRange`] and [`PhysicalRange`] newtypes tag a range with the space
//! it belongs to so a file offset can never be passed where a virtual offset
//! is expected. A [`SectionMapping`] pairs one range from each space; both
//! sides always have the same length.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

use crate::mapping::MappingError;

/// A half-open range `[start, end)` of byte offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// First offset in the range (inclusive)
    pub start: u64,
    /// One past the last offset (exclusive)
    pub end: u64,
}

impl ByteRange {
    /// Creates a range; an `end` below `start` yields an empty range at `start`.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Creates a range of `len` bytes starting at `start`, saturating at `u64::MAX`.
    pub fn with_len(start: u64, len: u64) -> Self {
        Self {
            start,
            end: start.saturating_add(len),
        }
    }

    /// Zero for a range whose `end` lies below its `start`.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True if `offset` lies in `[start, end)`.
    #[inline]
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end
    }

    /// True if `other` lies entirely inside this range.
    pub fn contains_range(&self, other: &ByteRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// True if the two ranges share at least one offset.
    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The shared part of two ranges, if any.
    pub fn intersection(&self, other: &ByteRange) -> Option<ByteRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(ByteRange { start, end })
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end)
    }
}

macro_rules! tagged_range {
    ($(#[$doc:meta])* $name:ident, $tag:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ByteRange);

        impl $name {
            pub fn new(start: u64, end: u64) -> Self {
                Self(ByteRange::new(start, end))
            }

            pub fn with_len(start: u64, len: u64) -> Self {
                Self(ByteRange::with_len(start, len))
            }

            /// The untagged range.
            pub fn range(&self) -> ByteRange {
                self.0
            }
        }

        impl Deref for $name {
            type Target = ByteRange;

            fn deref(&self) -> &ByteRange {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $tag, self.0)
            }
        }
    };
}

tagged_range!(
    /// A range of virtual offsets, as the sections appear once mapped.
    VirtualRange,
    "v"
);

tagged_range!(
    /// A range of physical offsets in the on-disk file.
    PhysicalRange,
    "p"
);

/// One section's virtual range paired with the file bytes that back it.
///
/// Only [`SectionMapping::new`] builds one, so both sides always agree in length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SectionMapping {
    virtual_range: VirtualRange,
    physical_range: PhysicalRange,
}

impl SectionMapping {
    /// Pairs two ranges, failing if their lengths differ.
    pub fn new(
        virtual_range: VirtualRange,
        physical_range: PhysicalRange,
    ) -> Result<Self, MappingError> {
        if virtual_range.len() != physical_range.len() {
            return Err(MappingError::LengthMismatch {
                virtual_len: virtual_range.len(),
                physical_len: physical_range.len(),
            });
        }
        Ok(Self {
            virtual_range,
            physical_range,
        })
    }

    pub fn virtual_range(&self) -> VirtualRange {
        self.virtual_range
    }

    pub fn physical_range(&self) -> PhysicalRange {
        self.physical_range
    }

    pub fn len(&self) -> u64 {
        self.virtual_range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.virtual_range.is_empty()
    }

    /// Translates a virtual offset covered by this mapping to a file offset.
    #[inline]
    pub fn to_physical(&self, offset: u64) -> Option<u64> {
        self.virtual_range
            .contains(offset)
            .then(|| self.physical_range.start + (offset - self.virtual_range.start))
    }
}

impl fmt::Display for SectionMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.virtual_range, self.physical_range)
    }
}
