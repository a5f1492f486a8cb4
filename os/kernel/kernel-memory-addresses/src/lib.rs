//! # Physical Address Types
//!
//! Strongly typed wrappers for the raw physical addresses, address ranges and
//! alignments handled by the kernel memory managers.
//!
//! ## Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PhysicalAddress`] | A raw 64-bit physical address. |
//! | [`PhysicalRange`] | A half-open `[base, base + len)` range of physical memory. |
//! | [`Alignment`] | A validated, non-zero power-of-two alignment. |
//!
//! All arithmetic that can leave the 64-bit address space is checked and
//! returns [`Option`]; nothing in this crate wraps silently.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let align = Alignment::new(0x1000).unwrap();
//! let pa = PhysicalAddress::new(0x0010_0042);
//! assert_eq!(pa.align_down(align).as_u64(), 0x0010_0000);
//! assert_eq!(pa.align_up(align).unwrap().as_u64(), 0x0010_1000);
//!
//! let range = PhysicalRange::new(PhysicalAddress::new(0x1000), 0x2000);
//! assert!(range.contains(PhysicalAddress::new(0x2fff)));
//! assert!(!range.contains(PhysicalAddress::new(0x3000)));
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` (where applicable), `Copy`, `Eq`,
//!   `Ord` and `Hash`.
//! - Alignment validity is established once, when an [`Alignment`] is built,
//!   so the helpers taking one never have to re-check it.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod alignment;
mod physical_address;
mod physical_range;

pub use alignment::{Alignment, AlignmentError};
pub use physical_address::PhysicalAddress;
pub use physical_range::PhysicalRange;

/// Round `value` up to the next multiple of `align`, or `None` on overflow.
#[inline]
#[must_use]
pub const fn checked_align_up(value: u64, align: Alignment) -> Option<u64> {
    let mask = align.get() - 1;
    match value.checked_add(mask) {
        Some(v) => Some(v & !mask),
        None => None,
    }
}

/// Round `value` down to a multiple of `align`.
#[inline]
#[must_use]
pub const fn align_down(value: u64, align: Alignment) -> u64 {
    value & !(align.get() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_helpers_round_to_boundaries() {
        let a = Alignment::new(16).unwrap();
        assert_eq!(checked_align_up(0, a), Some(0));
        assert_eq!(checked_align_up(1, a), Some(16));
        assert_eq!(checked_align_up(16, a), Some(16));
        assert_eq!(checked_align_up(17, a), Some(32));
        assert_eq!(align_down(31, a), 16);
    }

    #[test]
    fn align_up_reports_overflow() {
        let a = Alignment::new(0x1000).unwrap();
        assert_eq!(checked_align_up(u64::MAX - 1, a), None);
        assert_eq!(checked_align_up(u64::MAX & !0xFFF, a), Some(u64::MAX & !0xFFF));
    }

    #[test]
    fn address_alignment_round_trips() {
        let a = Alignment::new(0x1000).unwrap();
        let pa = PhysicalAddress::new(0x1234_5678);
        assert_eq!(pa.align_down(a).as_u64(), 0x1234_5000);
        assert_eq!(pa.align_up(a).unwrap().as_u64(), 0x1234_6000);
        assert!(!pa.is_aligned(a));
        assert!(pa.align_down(a).is_aligned(a));
    }

    #[test]
    fn ranges_report_overlap_and_containment() {
        let a = PhysicalRange::new(PhysicalAddress::new(0x1000), 0x1000);
        let b = PhysicalRange::new(PhysicalAddress::new(0x1800), 0x1000);
        let c = PhysicalRange::new(PhysicalAddress::new(0x2000), 0x1000);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c), "touching ranges do not overlap");
        assert_eq!(a.end(), Some(PhysicalAddress::new(0x2000)));
        assert!(a.contains_range(&PhysicalRange::new(PhysicalAddress::new(0x1400), 0x400)));
        assert!(!a.contains_range(&b));
    }
}
