use core::fmt;

/// A non-zero, power-of-two byte alignment.
///
/// Constructing an `Alignment` is the only place the power-of-two rule is
/// checked; every helper that accepts one relies on it.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// assert!(Alignment::new(4096).is_ok());
/// assert_eq!(Alignment::new(24), Err(AlignmentError(24)));
/// assert_eq!(Alignment::new(0), Err(AlignmentError(0)));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Alignment(u64);

/// The rejected value of an alignment that is not a power of two.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("alignment {0:#x} is not a power of two")]
pub struct AlignmentError(pub u64);

impl Alignment {
    /// Validate `value` as an alignment.
    ///
    /// # Errors
    /// Returns [`AlignmentError`] if `value` is zero or not a power of two.
    #[inline]
    pub const fn new(value: u64) -> Result<Self, AlignmentError> {
        if value.is_power_of_two() {
            Ok(Self(value))
        } else {
            Err(AlignmentError(value))
        }
    }

    /// Build an alignment from a value known at compile time.
    ///
    /// # Panics
    /// Panics (at compile time when used in a `const`) if `value` is not a
    /// power of two.
    #[inline]
    #[must_use]
    pub const fn new_const(value: u64) -> Self {
        assert!(value.is_power_of_two(), "alignment must be a power of two");
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The larger of two alignments.
    #[inline]
    #[must_use]
    pub const fn max(self, other: Self) -> Self {
        if self.0 >= other.0 { self } else { other }
    }
}

impl fmt::Debug for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Alignment({:#x})", self.0)
    }
}

impl TryFrom<u64> for Alignment {
    type Error = AlignmentError;

    #[inline]
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
