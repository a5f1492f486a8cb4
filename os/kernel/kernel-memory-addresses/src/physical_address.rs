use crate::{Alignment, align_down, checked_align_up};
use core::fmt;
use core::ops::Add;

/// Physical memory address.
///
/// A thin wrapper around `u64` that carries intent: values of this type are
/// addresses in the physical address space managed by the kernel memory
/// managers, never virtual addresses or byte counts.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x4000);
/// assert_eq!((pa + 0x20).as_u64(), 0x4020);
/// assert_eq!(pa.checked_add(u64::MAX), None);
/// assert_eq!(format!("{pa}"), "0x0000000000004000");
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn checked_sub(self, rhs: u64) -> Option<Self> {
        match self.0.checked_sub(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Distance in bytes from `origin` up to `self`, or `None` if `self`
    /// lies below `origin`.
    #[inline]
    #[must_use]
    pub const fn offset_from(self, origin: Self) -> Option<u64> {
        self.0.checked_sub(origin.0)
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned(self, align: Alignment) -> bool {
        self.0 & (align.get() - 1) == 0
    }

    #[inline]
    #[must_use]
    pub const fn align_down(self, align: Alignment) -> Self {
        Self(align_down(self.0, align))
    }

    /// Round up to `align`, or `None` if that leaves the address space.
    #[inline]
    #[must_use]
    pub const fn align_up(self, align: Alignment) -> Option<Self> {
        match checked_align_up(self.0, align) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u64 {
    #[inline]
    fn from(a: PhysicalAddress) -> Self {
        a.as_u64()
    }
}

/// Offsetting an address. Panics on overflow in debug builds like any `u64`
/// addition; use [`PhysicalAddress::checked_add`] where the operands are
/// untrusted.
impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}
