use crate::PhysicalAddress;
use core::fmt;

/// A half-open range `[base, base + len)` of physical memory.
///
/// A range whose end would not fit in 64 bits is representable but never
/// valid: [`PhysicalRange::end`] returns `None` for it and the containment
/// helpers treat it as containing nothing.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalRange {
    pub base: PhysicalAddress,
    pub len: u64,
}

impl PhysicalRange {
    #[inline]
    #[must_use]
    pub const fn new(base: PhysicalAddress, len: u64) -> Self {
        Self { base, len }
    }

    /// Build the range `[start, end)`; `None` if `end < start`.
    #[inline]
    #[must_use]
    pub const fn from_bounds(start: PhysicalAddress, end: PhysicalAddress) -> Option<Self> {
        match end.offset_from(start) {
            Some(len) => Some(Self::new(start, len)),
            None => None,
        }
    }

    /// One past the last byte, or `None` if the range leaves the address space.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> Option<PhysicalAddress> {
        self.base.checked_add(self.len)
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn contains(&self, addr: PhysicalAddress) -> bool {
        self.end().is_some_and(|end| addr >= self.base && addr < end)
    }

    /// Whether `other` lies entirely within `self`.
    #[must_use]
    pub fn contains_range(&self, other: &Self) -> bool {
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => other.base >= self.base && other_end <= end,
            _ => false,
        }
    }

    /// Whether the two ranges share at least one byte.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => self.base < other_end && other.base < end,
            _ => true,
        }
    }
}

impl fmt::Debug for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PhysicalRange(0x{:X}..+0x{:X})",
            self.base.as_u64(),
            self.len
        )
    }
}

impl fmt::Display for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, +{:#x})", self.base, self.len)
    }
}
