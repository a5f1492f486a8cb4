//! # Kernel Physical Memory Manager (kmm)
//!
//! Owns the physical address space `[0, total)` and hands out frame-granular,
//! aligned ranges of it.
//!
//! ## Representation
//!
//! A fixed-capacity, address-ordered table of [`Region`]s that partitions the
//! address space exactly:
//!
//! ```text
//! 0        4K                 kernel image          total
//! +--------+--------+---------+=========+-----------+
//! |Reserved|  Free  |Allocated|Reserved |   Free    |
//! +--------+--------+---------+=========+-----------+
//! ```
//!
//! - Regions are contiguous, non-overlapping and never empty.
//! - Two Free regions are never adjacent; [`Kmm::free`] merges eagerly.
//! - Each Allocated region is exactly one allocation, so freeing needs only
//!   the base address.
//!
//! The table lives inline (no heap), which makes the manager usable before
//! any allocator exists and bounds the number of live allocations by
//! [`KMM_MAX_REGIONS`].
//!
//! ## Allocation
//!
//! First-fit in address order. The chosen Free region is split into at most
//! three parts (leading gap, allocation, trailing remainder); the table must
//! have room for the extra entries before anything is modified.

mod region;

pub use region::{Region, RegionState};

use crate::frame_alloc::FrameSource;
use crate::{MemoryError, MemoryResult};
use core::fmt;
use kernel_info::memory::{FRAME_ALIGN, FRAME_SIZE, KMM_MAX_REGIONS, LOW_MEMORY_END};
use kernel_memory_addresses::{
    Alignment, PhysicalAddress, PhysicalRange, align_down, checked_align_up,
};
use log::{debug, trace, warn};
use planck_noalloc::vec::ArrayVec;

/// Byte and frame accounting of a [`Kmm`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KmmStats {
    pub total: u64,
    pub reserved: u64,
    pub free: u64,
    pub allocated: u64,
    pub regions: usize,
}

impl KmmStats {
    #[must_use]
    pub const fn total_frames(&self) -> u64 {
        self.total / FRAME_SIZE
    }

    #[must_use]
    pub const fn used_frames(&self) -> u64 {
        (self.reserved + self.allocated) / FRAME_SIZE
    }

    #[must_use]
    pub const fn free_frames(&self) -> u64 {
        self.free / FRAME_SIZE
    }
}

/// The physical memory manager.
pub struct Kmm {
    regions: ArrayVec<Region, KMM_MAX_REGIONS>,
    total: u64,
}

impl Kmm {
    /// Build a manager for `[0, total_bytes)` with the given ranges reserved.
    ///
    /// `total_bytes` is rounded down to whole frames. Reserved ranges are
    /// validated as given and then widened outwards to frame boundaries;
    /// frame 0 is always reserved so that a null address is never handed out.
    ///
    /// # Errors
    /// - [`MemoryError::ZeroSize`] if less than one frame remains.
    /// - [`MemoryError::ReservationOutOfBounds`] for a range past `total_bytes`.
    /// - [`MemoryError::OverlappingReservation`] if two ranges overlap.
    /// - [`MemoryError::RegionTableFull`] if the layout needs too many regions.
    pub fn new(total_bytes: u64, reserved: &[PhysicalRange]) -> MemoryResult<Self> {
        let total = align_down(total_bytes, FRAME_ALIGN);
        if total == 0 {
            return Err(MemoryError::ZeroSize);
        }

        for (i, range) in reserved.iter().enumerate() {
            match range.end() {
                Some(end) if end.as_u64() <= total_bytes => {}
                _ => return Err(MemoryError::ReservationOutOfBounds(*range)),
            }
            if reserved[..i].iter().any(|other| other.overlaps(range)) {
                return Err(MemoryError::OverlappingReservation(*range));
            }
        }

        // Widened spans, sorted and merged where widening made them touch.
        let mut spans = ArrayVec::<PhysicalRange, KMM_MAX_REGIONS>::new();
        let null_frame = PhysicalRange::new(PhysicalAddress::zero(), FRAME_SIZE);
        for range in core::iter::once(&null_frame).chain(reserved) {
            if range.is_empty() {
                continue;
            }
            let start = range.base.align_down(FRAME_ALIGN);
            let end = range
                .end()
                .and_then(|end| end.align_up(FRAME_ALIGN))
                .map_or(total, |end| end.as_u64().min(total));
            if start.as_u64() >= end {
                continue;
            }
            insert_span(&mut spans, PhysicalRange::new(start, end - start.as_u64()))?;
        }

        let mut regions = ArrayVec::new();
        let mut cursor = 0;
        for span in spans.iter() {
            if span.base.as_u64() > cursor {
                push_region(
                    &mut regions,
                    Region::new(
                        PhysicalAddress::new(cursor),
                        span.base.as_u64() - cursor,
                        RegionState::Free,
                    ),
                )?;
            }
            push_region(
                &mut regions,
                Region::new(span.base, span.len, RegionState::Reserved),
            )?;
            cursor = span.base.as_u64() + span.len;
        }
        if cursor < total {
            push_region(
                &mut regions,
                Region::new(PhysicalAddress::new(cursor), total - cursor, RegionState::Free),
            )?;
        }

        let kmm = Self { regions, total };
        debug!(
            "kmm: managing {} KiB in {} regions, {} KiB reserved",
            total / 1024,
            kmm.regions.len(),
            kmm.reserved() / 1024
        );
        Ok(kmm)
    }

    /// The reservations a booted kernel starts from: the legacy low-memory
    /// area and the kernel image.
    #[must_use]
    pub const fn boot_reservations(kernel_image: PhysicalRange) -> [PhysicalRange; 2] {
        [
            PhysicalRange::new(PhysicalAddress::zero(), LOW_MEMORY_END),
            kernel_image,
        ]
    }

    /// Allocate `size` bytes (rounded up to frames) aligned to `align`
    /// (raised to at least one frame).
    ///
    /// # Errors
    /// [`MemoryError::ZeroSize`], [`MemoryError::AlignmentViolation`],
    /// [`MemoryError::SizeOverflow`], [`MemoryError::OutOfMemory`] or
    /// [`MemoryError::RegionTableFull`]. The table is unchanged on error.
    pub fn alloc(&mut self, size: u64, align: u64) -> MemoryResult<PhysicalAddress> {
        if size == 0 {
            return Err(MemoryError::ZeroSize);
        }
        let align = Alignment::new(align)?.max(FRAME_ALIGN);
        let size = checked_align_up(size, FRAME_ALIGN).ok_or(MemoryError::SizeOverflow(size))?;

        let mut table_full = false;
        for i in 0..self.regions.len() {
            let region = self.regions[i];
            if !region.is_free() {
                continue;
            }
            let Some(start) = region.base.align_up(align) else {
                continue;
            };
            match start.checked_add(size) {
                Some(end) if end <= region.end() => {}
                _ => continue,
            }
            match self.carve(i, start, size) {
                Ok(()) => {
                    trace!("kmm: alloc {size:#x} @ {start}");
                    return Ok(start);
                }
                Err(MemoryError::RegionTableFull) => table_full = true,
                Err(e) => return Err(e),
            }
        }

        if table_full {
            Err(MemoryError::RegionTableFull)
        } else {
            Err(MemoryError::OutOfMemory)
        }
    }

    /// Mark exactly `range` Allocated. It must lie wholly inside one Free
    /// region.
    ///
    /// # Errors
    /// [`MemoryError::ZeroSize`], [`MemoryError::AlignmentViolation`] for an
    /// unaligned range, [`MemoryError::OutOfMemory`] if any part is not Free,
    /// [`MemoryError::RegionTableFull`].
    pub fn claim(&mut self, range: PhysicalRange) -> MemoryResult<()> {
        if range.is_empty() {
            return Err(MemoryError::ZeroSize);
        }
        if !range.base.is_aligned(FRAME_ALIGN) {
            return Err(MemoryError::AlignmentViolation(range.base.as_u64()));
        }
        if !range.len.is_multiple_of(FRAME_SIZE) {
            return Err(MemoryError::AlignmentViolation(range.len));
        }

        let i = self.find(range.base).ok_or(MemoryError::OutOfMemory)?;
        let region = self.regions[i];
        if !region.is_free() || !region.range().contains_range(&range) {
            return Err(MemoryError::OutOfMemory);
        }
        self.carve(i, range.base, range.len)?;
        trace!("kmm: claimed {range}");
        Ok(())
    }

    /// Return an allocation to the Free pool.
    ///
    /// # Errors
    /// - [`MemoryError::DoubleFree`] if `addr` lies in a Free region.
    /// - [`MemoryError::InvalidFree`] if `addr` is unaligned, out of range,
    ///   reserved, or not the base of an allocation.
    ///
    /// The table is unchanged on error.
    pub fn free(&mut self, addr: PhysicalAddress) -> MemoryResult<()> {
        if !addr.is_aligned(FRAME_ALIGN) {
            warn!("kmm: free of unaligned address {addr}");
            return Err(MemoryError::InvalidFree(addr));
        }
        let Some(i) = self.find(addr) else {
            warn!("kmm: free of {addr} outside physical memory");
            return Err(MemoryError::InvalidFree(addr));
        };

        let region = self.regions[i];
        match region.state {
            RegionState::Free => {
                warn!("kmm: double free of {addr}");
                return Err(MemoryError::DoubleFree(addr));
            }
            RegionState::Reserved => {
                warn!("kmm: free of reserved address {addr}");
                return Err(MemoryError::InvalidFree(addr));
            }
            RegionState::Allocated if region.base != addr => {
                warn!("kmm: free of {addr} inside allocation at {}", region.base);
                return Err(MemoryError::InvalidFree(addr));
            }
            RegionState::Allocated => {}
        }

        self.regions[i].state = RegionState::Free;
        let mut i = i;
        if i + 1 < self.regions.len() && self.regions[i + 1].is_free() {
            let next = self.regions.remove(i + 1);
            self.regions[i].len += next.len;
        }
        if i > 0 && self.regions[i - 1].is_free() {
            let this = self.regions.remove(i);
            i -= 1;
            self.regions[i].len += this.len;
        }
        trace!("kmm: freed {addr}, now in {}", self.regions[i]);
        Ok(())
    }

    /// Allocate a single frame.
    ///
    /// # Errors
    /// See [`alloc`](Self::alloc).
    pub fn frame_alloc(&mut self) -> MemoryResult<PhysicalAddress> {
        self.alloc(FRAME_SIZE, FRAME_SIZE)
    }

    /// Free a single frame obtained from [`frame_alloc`](Self::frame_alloc).
    ///
    /// # Errors
    /// See [`free`](Self::free).
    pub fn frame_free(&mut self, addr: PhysicalAddress) -> MemoryResult<()> {
        self.free(addr)
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn reserved(&self) -> u64 {
        self.bytes_in(RegionState::Reserved)
    }

    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.bytes_in(RegionState::Free)
    }

    #[must_use]
    pub fn allocated_bytes(&self) -> u64 {
        self.bytes_in(RegionState::Allocated)
    }

    #[must_use]
    pub const fn total_frames(&self) -> u64 {
        self.total / FRAME_SIZE
    }

    /// Frames not available for allocation: reserved plus allocated.
    #[must_use]
    pub fn used_frames(&self) -> u64 {
        (self.reserved() + self.allocated_bytes()) / FRAME_SIZE
    }

    #[must_use]
    pub fn free_frames(&self) -> u64 {
        self.free_bytes() / FRAME_SIZE
    }

    /// The region table in address order.
    pub fn regions(&self) -> impl ExactSizeIterator<Item = Region> + '_ {
        self.regions.iter().copied()
    }

    #[must_use]
    pub fn stats(&self) -> KmmStats {
        KmmStats {
            total: self.total,
            reserved: self.reserved(),
            free: self.free_bytes(),
            allocated: self.allocated_bytes(),
            regions: self.regions.len(),
        }
    }

    /// Verify that the table partitions `[0, total)` and that the accounting
    /// adds up.
    ///
    /// # Errors
    /// [`MemoryError::CorruptionDetected`] naming the first offending region.
    pub fn check(&self) -> MemoryResult<KmmStats> {
        let mut cursor = PhysicalAddress::zero();
        let mut prev_free = false;
        for region in self.regions.iter() {
            let aligned =
                region.base.is_aligned(FRAME_ALIGN) && region.len.is_multiple_of(FRAME_SIZE);
            if region.base != cursor || region.len == 0 || !aligned {
                warn!("kmm: inconsistent region {region}");
                return Err(MemoryError::CorruptionDetected(region.base));
            }
            if prev_free && region.is_free() {
                warn!("kmm: unmerged free region {region}");
                return Err(MemoryError::CorruptionDetected(region.base));
            }
            prev_free = region.is_free();
            cursor = region
                .base
                .checked_add(region.len)
                .ok_or(MemoryError::CorruptionDetected(region.base))?;
        }
        if cursor.as_u64() != self.total {
            return Err(MemoryError::CorruptionDetected(cursor));
        }

        let stats = self.stats();
        if stats.reserved + stats.free + stats.allocated != stats.total {
            return Err(MemoryError::CorruptionDetected(PhysicalAddress::zero()));
        }
        Ok(stats)
    }

    /// Emit the accounting and the region table at `debug` level.
    pub fn log_status(&self) {
        let stats = self.stats();
        debug!(
            "kmm: {} frames total, {} used, {} free ({} KiB reserved, {} KiB allocated)",
            stats.total_frames(),
            stats.used_frames(),
            stats.free_frames(),
            stats.reserved / 1024,
            stats.allocated / 1024
        );
        for region in self.regions.iter() {
            debug!("kmm:   {region}");
        }
    }

    fn bytes_in(&self, state: RegionState) -> u64 {
        self.regions
            .iter()
            .filter(|r| r.state == state)
            .map(|r| r.len)
            .sum()
    }

    /// Index of the region containing `addr`.
    fn find(&self, addr: PhysicalAddress) -> Option<usize> {
        if addr.as_u64() >= self.total {
            return None;
        }
        // Region 0 starts at 0, so the partition point is at least 1.
        let idx = self.regions.as_slice().partition_point(|r| r.base <= addr);
        idx.checked_sub(1)
    }

    /// Split Free region `i` so that `[start, start + size)` becomes its own
    /// Allocated region. Fails without modification if the table cannot take
    /// the extra entries.
    fn carve(&mut self, i: usize, start: PhysicalAddress, size: u64) -> MemoryResult<()> {
        let region = self.regions[i];
        let lead = start.as_u64() - region.base.as_u64();
        let tail = region.end().as_u64() - (start.as_u64() + size);

        let extra = usize::from(lead > 0) + usize::from(tail > 0);
        if self.regions.len() + extra > KMM_MAX_REGIONS {
            return Err(MemoryError::RegionTableFull);
        }

        let mut at = i;
        if lead > 0 {
            self.regions[at].len = lead;
            at += 1;
            self.regions
                .insert(at, Region::new(start, size, RegionState::Allocated));
        } else {
            self.regions[at] = Region::new(start, size, RegionState::Allocated);
        }
        if tail > 0 {
            self.regions.insert(
                at + 1,
                Region::new(start + size, tail, RegionState::Free),
            );
        }
        Ok(())
    }
}

impl FrameSource for Kmm {
    fn allocate_range(&mut self, size: u64, align: u64) -> MemoryResult<PhysicalAddress> {
        self.alloc(size, align)
    }

    fn claim_range(&mut self, range: PhysicalRange) -> MemoryResult<()> {
        self.claim(range)
    }

    fn release_range(&mut self, base: PhysicalAddress) -> MemoryResult<()> {
        self.free(base)
    }
}

impl fmt::Debug for Kmm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kmm")
            .field("total", &self.total)
            .field("regions", &self.regions.as_slice())
            .finish()
    }
}

fn push_region(
    regions: &mut ArrayVec<Region, KMM_MAX_REGIONS>,
    region: Region,
) -> MemoryResult<()> {
    regions
        .try_push(region)
        .map_err(|_| MemoryError::RegionTableFull)
}

/// Insert a frame-aligned span in address order, merging with neighbours it
/// overlaps or touches.
fn insert_span(
    spans: &mut ArrayVec<PhysicalRange, KMM_MAX_REGIONS>,
    span: PhysicalRange,
) -> MemoryResult<()> {
    let mut start = span.base.as_u64();
    let mut end = start + span.len;

    let mut i = spans.as_slice().partition_point(|s| s.base.as_u64() < start);
    if i > 0 {
        let prev = spans[i - 1];
        if prev.base.as_u64() + prev.len >= start {
            i -= 1;
            start = prev.base.as_u64();
            end = end.max(prev.base.as_u64() + prev.len);
            spans.remove(i);
        }
    }
    while i < spans.len() && spans[i].base.as_u64() <= end {
        let next = spans.remove(i);
        end = end.max(next.base.as_u64() + next.len);
    }

    if spans.is_full() {
        return Err(MemoryError::RegionTableFull);
    }
    spans.insert(i, PhysicalRange::new(PhysicalAddress::new(start), end - start));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KERNEL: PhysicalRange = PhysicalRange::new(PhysicalAddress::new(0x2000), 0x1800);

    fn range(base: u64, len: u64) -> PhysicalRange {
        PhysicalRange::new(PhysicalAddress::new(base), len)
    }

    fn snapshot(kmm: &Kmm) -> Vec<Region> {
        kmm.regions().collect()
    }

    #[test]
    fn init_partitions_and_widens_reservations() {
        let kmm = Kmm::new(0x10_0800, &[KERNEL]).unwrap();
        assert_eq!(kmm.total(), 0x10_0000);
        let states: Vec<_> = kmm.regions().map(|r| (r.base.as_u64(), r.len, r.state)).collect();
        assert_eq!(
            states,
            vec![
                (0, 0x1000, RegionState::Reserved),
                (0x1000, 0x1000, RegionState::Free),
                (0x2000, 0x2000, RegionState::Reserved),
                (0x4000, 0x10_0000 - 0x4000, RegionState::Free),
            ]
        );
        let stats = kmm.check().unwrap();
        assert_eq!(stats.reserved, 0x3000);
        assert_eq!(stats.total_frames(), 256);
        assert_eq!(stats.used_frames(), 3);
    }

    #[test]
    fn reservation_touching_null_frame_merges() {
        let kmm = Kmm::new(0x8000, &[range(0x800, 0x1000)]).unwrap();
        let first = kmm.regions().next().unwrap();
        assert_eq!(first.range(), range(0, 0x2000));
        assert_eq!(first.state, RegionState::Reserved);
        kmm.check().unwrap();
    }

    #[test]
    fn init_rejects_bad_reservations() {
        assert_eq!(
            Kmm::new(0x8000, &[range(0x7000, 0x2000)]).unwrap_err(),
            MemoryError::ReservationOutOfBounds(range(0x7000, 0x2000))
        );
        assert_eq!(
            Kmm::new(0x8000, &[range(0x2000, 0x1000), range(0x2800, 0x100)]).unwrap_err(),
            MemoryError::OverlappingReservation(range(0x2800, 0x100))
        );
        assert_eq!(Kmm::new(0xFFF, &[]).unwrap_err(), MemoryError::ZeroSize);
    }

    #[test]
    fn boot_reservations_cover_low_memory() {
        let image = range(0x10_0000, 0x4_0000);
        let kmm = Kmm::new(0x100_0000, &Kmm::boot_reservations(image)).unwrap();
        assert_eq!(kmm.reserved(), LOW_MEMORY_END + 0x4_0000);
        let mut kmm = kmm;
        assert_eq!(kmm.frame_alloc(), Ok(PhysicalAddress::new(LOW_MEMORY_END)));
    }

    #[test]
    fn alloc_splits_with_alignment() {
        let mut kmm = Kmm::new(0x20000, &[]).unwrap();
        let a = kmm.alloc(1, 0x4000).unwrap();
        assert_eq!(a, PhysicalAddress::new(0x4000));
        // leading gap [0x1000, 0x4000) stays free and is used next.
        let b = kmm.alloc(0x2000, 0).unwrap_err();
        assert_eq!(b, MemoryError::AlignmentViolation(0));
        let b = kmm.alloc(0x2000, 1).unwrap();
        assert_eq!(b, PhysicalAddress::new(0x1000));
        assert_eq!(kmm.allocated_bytes(), 0x3000);
        kmm.check().unwrap();
    }

    #[test]
    fn alloc_rejects_bad_requests() {
        let mut kmm = Kmm::new(0x8000, &[]).unwrap();
        assert_eq!(kmm.alloc(0, 4096), Err(MemoryError::ZeroSize));
        assert_eq!(kmm.alloc(4096, 3), Err(MemoryError::AlignmentViolation(3)));
        assert_eq!(kmm.alloc(u64::MAX, 4096), Err(MemoryError::SizeOverflow(u64::MAX)));
        assert_eq!(kmm.alloc(0x8000, 4096), Err(MemoryError::OutOfMemory));
        assert_eq!(kmm.free_bytes(), 0x7000);
    }

    #[test]
    fn free_merges_both_neighbours() {
        let mut kmm = Kmm::new(0x10000, &[]).unwrap();
        let a = kmm.frame_alloc().unwrap();
        let b = kmm.frame_alloc().unwrap();
        let c = kmm.frame_alloc().unwrap();
        assert_eq!(kmm.regions().len(), 5);

        kmm.free(a).unwrap();
        kmm.free(c).unwrap();
        kmm.free(b).unwrap();
        assert_eq!(kmm.regions().len(), 2);
        assert_eq!(kmm.free_bytes(), 0xF000);
        kmm.check().unwrap();
    }

    #[test]
    fn allocations_are_never_merged() {
        let mut kmm = Kmm::new(0x10000, &[]).unwrap();
        let a = kmm.frame_alloc().unwrap();
        let b = kmm.frame_alloc().unwrap();
        kmm.free(b).unwrap();
        assert_eq!(kmm.free(b), Err(MemoryError::DoubleFree(b)));
        kmm.free(a).unwrap();
        kmm.check().unwrap();
    }

    #[test]
    fn rejected_frees_leave_table_unchanged() {
        let mut kmm = Kmm::new(0x10000, &[KERNEL]).unwrap();
        let a = kmm.alloc(0x2000, 4096).unwrap();
        let before = snapshot(&kmm);

        assert_eq!(kmm.free(a + 0x1000), Err(MemoryError::InvalidFree(a + 0x1000)));
        assert_eq!(kmm.free(a + 8), Err(MemoryError::InvalidFree(a + 8)));
        let image = PhysicalAddress::new(0x2000);
        assert_eq!(kmm.free(image), Err(MemoryError::InvalidFree(image)));
        let null = PhysicalAddress::zero();
        assert_eq!(kmm.free(null), Err(MemoryError::InvalidFree(null)));
        let past = PhysicalAddress::new(0x10000);
        assert_eq!(kmm.free(past), Err(MemoryError::InvalidFree(past)));
        let free = PhysicalAddress::new(0xF000);
        assert_eq!(kmm.free(free), Err(MemoryError::DoubleFree(free)));

        assert_eq!(snapshot(&kmm), before);
    }

    #[test]
    fn claim_exact_range() {
        let mut kmm = Kmm::new(0x10000, &[]).unwrap();
        kmm.claim(range(0x3000, 0x2000)).unwrap();
        assert_eq!(kmm.claim(range(0x4000, 0x1000)), Err(MemoryError::OutOfMemory));
        assert_eq!(
            kmm.claim(range(0x6000, 0x800)),
            Err(MemoryError::AlignmentViolation(0x800))
        );
        assert_eq!(kmm.claim(range(0, 0x1000)), Err(MemoryError::OutOfMemory));
        assert_eq!(kmm.claim(range(0xF000, 0x2000)), Err(MemoryError::OutOfMemory));
        kmm.free(PhysicalAddress::new(0x3000)).unwrap();
        assert_eq!(kmm.allocated_bytes(), 0);
        kmm.check().unwrap();
    }

    #[test]
    fn region_table_exhaustion_is_reported() {
        let mut kmm = Kmm::new(KMM_MAX_REGIONS as u64 * 2 * FRAME_SIZE, &[]).unwrap();
        let mut held = Vec::new();
        let err = loop {
            match kmm.frame_alloc() {
                Ok(a) => held.push(a),
                Err(e) => break e,
            }
        };
        assert_eq!(err, MemoryError::RegionTableFull);
        assert_eq!(kmm.regions().len(), KMM_MAX_REGIONS);
        assert!(kmm.free_frames() > 0);

        // Holes between allocations reuse their entries.
        for a in held.iter().step_by(2) {
            kmm.free(*a).unwrap();
        }
        kmm.check().unwrap();
        assert_eq!(kmm.frame_alloc(), Ok(held[0]));
    }
}
