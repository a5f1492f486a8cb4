use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};

/// Ownership state of a [`Region`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegionState {
    /// Available for allocation.
    Free,
    /// Never handed out: low memory, the kernel image, frame 0.
    Reserved,
    /// Handed out by [`Kmm::alloc`](super::Kmm::alloc) or
    /// [`Kmm::claim`](super::Kmm::claim); one entry per allocation.
    Allocated,
}

impl RegionState {
    const fn label(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Reserved => "reserved",
            Self::Allocated => "allocated",
        }
    }
}

/// A run of whole frames sharing one [`RegionState`].
///
/// `base` and `len` are multiples of the frame size and `len` is never zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Region {
    pub base: PhysicalAddress,
    pub len: u64,
    pub state: RegionState,
}

impl Region {
    pub(super) const fn new(base: PhysicalAddress, len: u64, state: RegionState) -> Self {
        Self { base, len, state }
    }

    /// First address past the region. Regions always lie below the
    /// manager's total, so this cannot overflow.
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64() + self.len)
    }

    #[must_use]
    pub const fn range(&self) -> PhysicalRange {
        PhysicalRange::new(self.base, self.len)
    }

    #[must_use]
    pub const fn is_free(&self) -> bool {
        matches!(self.state, RegionState::Free)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>9} ({} KiB)",
            self.range(),
            self.state.label(),
            self.len / 1024
        )
    }
}
