//! Frame-granular memory providers the heap draws its arena from.

use crate::{MemoryError, MemoryResult};
use kernel_info::memory::{FRAME_ALIGN, FRAME_SIZE};
use kernel_memory_addresses::{Alignment, PhysicalAddress, PhysicalRange, checked_align_up};

/// Source of frame-aligned physical memory.
///
/// [`Kmm`](crate::kmm::Kmm) is the production implementation. The heap only
/// ever asks for its initial arena and for ranges directly above its current
/// end, which keeps the arena contiguous.
pub trait FrameSource {
    /// Allocate at least `size` bytes aligned to `align`.
    ///
    /// # Errors
    /// Whatever the provider reports; [`MemoryError::OutOfMemory`] when no
    /// suitable range is free.
    fn allocate_range(&mut self, size: u64, align: u64) -> MemoryResult<PhysicalAddress>;

    /// Allocate exactly `range`, which must currently be free.
    ///
    /// # Errors
    /// [`MemoryError::OutOfMemory`] when any part of the range is in use.
    fn claim_range(&mut self, range: PhysicalRange) -> MemoryResult<()>;

    /// Return a range previously obtained from this provider.
    ///
    /// # Errors
    /// [`MemoryError::InvalidFree`] or [`MemoryError::DoubleFree`] for
    /// addresses the provider did not hand out.
    fn release_range(&mut self, base: PhysicalAddress) -> MemoryResult<()>;
}

impl<T: FrameSource + ?Sized> FrameSource for &mut T {
    fn allocate_range(&mut self, size: u64, align: u64) -> MemoryResult<PhysicalAddress> {
        (**self).allocate_range(size, align)
    }

    fn claim_range(&mut self, range: PhysicalRange) -> MemoryResult<()> {
        (**self).claim_range(range)
    }

    fn release_range(&mut self, base: PhysicalAddress) -> MemoryResult<()> {
        (**self).release_range(base)
    }
}

/// A provider with nothing to give; pins a heap at its current size.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoGrowth;

impl FrameSource for NoGrowth {
    fn allocate_range(&mut self, _size: u64, _align: u64) -> MemoryResult<PhysicalAddress> {
        Err(MemoryError::OutOfMemory)
    }

    fn claim_range(&mut self, _range: PhysicalRange) -> MemoryResult<()> {
        Err(MemoryError::OutOfMemory)
    }

    fn release_range(&mut self, base: PhysicalAddress) -> MemoryResult<()> {
        Err(MemoryError::InvalidFree(base))
    }
}

/// Frames taken from the kmm in one piece and handed out upwards from the
/// base, so that consecutive requests are contiguous.
///
/// [`MemoryManager`](crate::MemoryManager) sets the heap's whole growth window
/// aside this way. Frame allocations can then never land directly above the
/// arena and block its growth.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameWindow {
    range: PhysicalRange,
    /// Bytes handed out, from the base up.
    used: u64,
}

impl FrameWindow {
    #[must_use]
    pub const fn new(range: PhysicalRange) -> Self {
        Self { range, used: 0 }
    }

    #[must_use]
    pub const fn range(&self) -> PhysicalRange {
        self.range
    }

    /// The part of the window handed out so far.
    #[must_use]
    pub const fn used(&self) -> PhysicalRange {
        PhysicalRange::new(self.range.base, self.used)
    }

    const fn cursor(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.range.base.as_u64() + self.used)
    }

    const fn remaining(&self) -> u64 {
        self.range.len - self.used
    }
}

impl FrameSource for FrameWindow {
    fn allocate_range(&mut self, size: u64, align: u64) -> MemoryResult<PhysicalAddress> {
        if size == 0 {
            return Err(MemoryError::ZeroSize);
        }
        let align = Alignment::new(align)?.max(FRAME_ALIGN);
        let size = checked_align_up(size, FRAME_ALIGN).ok_or(MemoryError::SizeOverflow(size))?;
        let start = self.cursor();
        if !start.is_aligned(align) || size > self.remaining() {
            return Err(MemoryError::OutOfMemory);
        }
        self.used += size;
        Ok(start)
    }

    fn claim_range(&mut self, range: PhysicalRange) -> MemoryResult<()> {
        if range.is_empty() {
            return Err(MemoryError::ZeroSize);
        }
        if !range.len.is_multiple_of(FRAME_SIZE) {
            return Err(MemoryError::AlignmentViolation(range.len));
        }
        if range.base != self.cursor() || range.len > self.remaining() {
            return Err(MemoryError::OutOfMemory);
        }
        self.used += range.len;
        Ok(())
    }

    /// Hands back everything from `base` upwards.
    fn release_range(&mut self, base: PhysicalAddress) -> MemoryResult<()> {
        let Some(offset) = base.offset_from(self.range.base) else {
            return Err(MemoryError::InvalidFree(base));
        };
        if !offset.is_multiple_of(FRAME_SIZE) {
            return Err(MemoryError::InvalidFree(base));
        }
        if offset >= self.used {
            return Err(if offset < self.range.len {
                MemoryError::DoubleFree(base)
            } else {
                MemoryError::InvalidFree(base)
            });
        }
        self.used = offset;
        Ok(())
    }
}
