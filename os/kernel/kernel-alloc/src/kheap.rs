//! # Kernel Heap (kheap)
//!
//! A byte-granular allocator on top of a contiguous arena of frames obtained
//! from a [`FrameSource`].
//!
//! ## Block layout
//!
//! The arena is tiled by blocks; there are no gaps:
//!
//! ```text
//! +--------+-------------------+--------+--------+---------- ...
//! | header |  payload (size)   | footer | header |  payload
//! +--------+-------------------+--------+--------+---------- ...
//! ^ block   ^ handle                     ^ next block
//! ```
//!
//! - The **header** carries an integrity tag, the allocated flag, the payload
//!   capacity and, for free blocks, the free-list links.
//! - The **footer** repeats tag, flag and capacity so the block in front of
//!   any block can be found in O(1) when coalescing.
//! - Capacities are multiples of [`HEAP_ALIGN`], so every handle is
//!   16-byte aligned.
//!
//! ## Policy
//!
//! - First-fit over an address-ordered, doubly linked free list.
//! - A fitting block is split when the surplus is at least
//!   [`SPLIT_THRESHOLD`]; otherwise it is handed out whole.
//! - Freeing coalesces with both neighbours in one step, so two free blocks
//!   are never adjacent. Headers swallowed by a merge are retired, which is
//!   what lets a second `free` of the same handle be recognised.
//! - When nothing fits, the arena grows by claiming the frames directly
//!   above it, up to the configured maximum.

mod block;
mod free_list;

pub use block::{BLOCK_OVERHEAD, FOOTER_SIZE, HEADER_SIZE, SPLIT_THRESHOLD};

use crate::frame_alloc::FrameSource;
use crate::phys_memory::PhysMemory;
use crate::{MemoryError, MemoryResult};
use block::{
    BLOCK_MAGIC, Header, RETIRED_MAGIC, footer_of, next_of, payload_of, read_footer, read_header,
    retire,
};
use kernel_info::memory::{
    FRAME_ALIGN, FRAME_SIZE, HEAP_ALIGN, HEAP_ALIGNMENT, HEAP_INITIAL_SIZE, HEAP_MAX_SIZE,
};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, align_down, checked_align_up};
use log::{debug, trace, warn};

/// Arena geometry of a [`Kheap`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    /// Bytes requested from the frame source at init, rounded up to frames.
    pub initial_size: u64,
    /// Upper bound the arena may grow to; never below the initial size.
    pub max_size: u64,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            initial_size: HEAP_INITIAL_SIZE,
            max_size: HEAP_MAX_SIZE,
        }
    }
}

/// Snapshot of the arena, as produced by [`Kheap::stats`] and
/// [`Kheap::check`].
///
/// `live_bytes + free_bytes + overhead_bytes` always equals the arena size.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeapStats {
    pub arena: PhysicalRange,
    pub max_size: u64,
    pub live_blocks: usize,
    pub live_bytes: u64,
    pub free_blocks: usize,
    pub free_bytes: u64,
    pub overhead_bytes: u64,
    pub largest_free: u64,
}

/// The kernel heap.
///
/// Block metadata lives in the arena itself and is reached through `M`.
pub struct Kheap<M> {
    mem: M,
    base: PhysicalAddress,
    /// Current arena size in bytes; a multiple of the frame size.
    size: u64,
    max_size: u64,
    /// Header address of the lowest free block.
    free_head: Option<PhysicalAddress>,
}

impl<M: PhysMemory> Kheap<M> {
    /// Obtain the initial arena from `frames` and cover it with one free
    /// block.
    ///
    /// # Errors
    /// See [`reset`](Self::reset).
    pub fn init<F: FrameSource + ?Sized>(
        frames: &mut F,
        mem: M,
        config: HeapConfig,
    ) -> MemoryResult<Self> {
        let mut heap = Self {
            mem,
            base: PhysicalAddress::zero(),
            size: 0,
            max_size: 0,
            free_head: None,
        };
        heap.reset(frames, config)?;
        Ok(heap)
    }

    /// Drop every allocation and start over on a fresh arena from `frames`.
    ///
    /// The previous arena is not handed back to `frames`; callers resetting
    /// the whole memory manager rebuild the frame source as well.
    ///
    /// # Errors
    /// - [`MemoryError::ZeroSize`] for a zero initial size.
    /// - Whatever `frames` reports when the arena cannot be allocated.
    /// - [`MemoryError::Unbacked`] if the memory cannot reach the arena; the
    ///   frames are returned to `frames` in that case.
    ///
    /// The heap is unchanged on error.
    pub fn reset<F: FrameSource + ?Sized>(
        &mut self,
        frames: &mut F,
        config: HeapConfig,
    ) -> MemoryResult<()> {
        if config.initial_size == 0 {
            return Err(MemoryError::ZeroSize);
        }
        let initial = checked_align_up(config.initial_size, FRAME_ALIGN)
            .ok_or(MemoryError::SizeOverflow(config.initial_size))?;
        let max_size = align_down(config.max_size, FRAME_ALIGN).max(initial);

        let base = frames.allocate_range(initial, FRAME_SIZE)?;
        if let Err(e) = self.write_block(base, &Header::free(initial - BLOCK_OVERHEAD, None, None)) {
            warn!("kheap: arena at {base} is not reachable: {e}");
            frames.release_range(base).ok();
            return Err(e);
        }
        self.base = base;
        self.size = initial;
        self.max_size = max_size;
        self.free_head = Some(base);

        debug!(
            "kheap: arena {} ({} KiB, max {} KiB)",
            self.arena(),
            initial / 1024,
            max_size / 1024
        );
        Ok(())
    }

    /// Allocate at least `size` bytes; the handle is 16-byte aligned.
    ///
    /// # Errors
    /// - [`MemoryError::ZeroSize`] for `size == 0`.
    /// - [`MemoryError::SizeOverflow`] if the request could never fit the
    ///   arena's maximum size.
    /// - [`MemoryError::OutOfMemory`] if no block fits and the arena cannot
    ///   grow enough. The heap is unchanged in that case.
    pub fn alloc<F: FrameSource + ?Sized>(
        &mut self,
        frames: &mut F,
        size: u64,
    ) -> MemoryResult<PhysicalAddress> {
        let need = self.request_size(size)?;
        let (at, header) = match self.find_fit(need)? {
            Some(found) => found,
            None => {
                self.grow(frames, need)?;
                self.find_fit(need)?.ok_or(MemoryError::OutOfMemory)?
            }
        };
        self.take(at, &header, need)?;

        let ptr = payload_of(at);
        trace!("kheap: alloc {size} -> {ptr}");
        Ok(ptr)
    }

    /// Return an allocation to the heap.
    ///
    /// # Errors
    /// - [`MemoryError::InvalidFree`] for a handle this heap never returned.
    /// - [`MemoryError::DoubleFree`] for a handle that is already free.
    /// - [`MemoryError::CorruptionDetected`] if the block's tags disagree.
    ///
    /// The heap is unchanged on error.
    pub fn free(&mut self, ptr: PhysicalAddress) -> MemoryResult<()> {
        let (at, header) = self
            .resolve(ptr)
            .inspect_err(|e| warn!("kheap: rejected free of {ptr}: {e}"))?;
        self.release(at, header.size)?;
        trace!("kheap: free {ptr}");
        Ok(())
    }

    /// Resize an allocation.
    ///
    /// - `ptr == None` allocates.
    /// - `new_size == 0` frees and yields `None`.
    /// - Shrinking and in-place growth keep the handle.
    /// - Otherwise the contents move to a new block and the old one is freed.
    ///
    /// # Errors
    /// As [`alloc`](Self::alloc) and [`free`](Self::free), except that a
    /// handle which is already free is [`MemoryError::InvalidFree`]. On error
    /// the original allocation is untouched.
    pub fn realloc<F: FrameSource + ?Sized>(
        &mut self,
        frames: &mut F,
        ptr: Option<PhysicalAddress>,
        new_size: u64,
    ) -> MemoryResult<Option<PhysicalAddress>> {
        let Some(ptr) = ptr else {
            if new_size == 0 {
                return Ok(None);
            }
            return self.alloc(frames, new_size).map(Some);
        };
        let (at, header) = self.live(ptr)?;
        if new_size == 0 {
            self.release(at, header.size)?;
            trace!("kheap: realloc {ptr} to nothing");
            return Ok(None);
        }

        let need = self.request_size(new_size)?;
        if need <= header.size {
            self.shrink(at, header.size, need)?;
            trace!("kheap: realloc {ptr} shrunk to {need}");
            return Ok(Some(ptr));
        }
        if self.grow_in_place(at, header.size, need)? {
            trace!("kheap: realloc {ptr} grew in place to {need}");
            return Ok(Some(ptr));
        }

        let moved = self.alloc(frames, new_size)?;
        if let Err(e) = self.mem.copy_within(ptr, moved, header.size.min(new_size)) {
            self.free(moved)?;
            return Err(e);
        }
        self.release(at, header.size)?;
        trace!("kheap: realloc {ptr} moved to {moved}");
        Ok(Some(moved))
    }

    /// Payload capacity of a live allocation; at least the requested size.
    ///
    /// # Errors
    /// [`MemoryError::InvalidFree`] if `ptr` is not a live allocation.
    pub fn capacity(&self, ptr: PhysicalAddress) -> MemoryResult<u64> {
        Ok(self.live(ptr)?.1.size)
    }

    /// Copy `data` into the payload of `ptr` at `offset`.
    ///
    /// # Errors
    /// [`MemoryError::InvalidFree`] for a handle that is not live,
    /// [`MemoryError::PayloadOverrun`] if the write would leave the payload.
    pub fn write(&mut self, ptr: PhysicalAddress, offset: u64, data: &[u8]) -> MemoryResult<()> {
        let capacity = self.capacity(ptr)?;
        let at = payload_span(ptr, capacity, offset, data.len() as u64)?;
        self.mem.write(at, data)
    }

    /// Copy `buf.len()` bytes of the payload of `ptr` at `offset` into `buf`.
    ///
    /// # Errors
    /// As [`write`](Self::write).
    pub fn read(&self, ptr: PhysicalAddress, offset: u64, buf: &mut [u8]) -> MemoryResult<()> {
        let capacity = self.capacity(ptr)?;
        let at = payload_span(ptr, capacity, offset, buf.len() as u64)?;
        self.mem.read(at, buf)
    }

    /// Set the whole payload of `ptr` to `byte`.
    ///
    /// # Errors
    /// [`MemoryError::InvalidFree`] for a handle that is not live.
    pub fn fill(&mut self, ptr: PhysicalAddress, byte: u8) -> MemoryResult<()> {
        let capacity = self.capacity(ptr)?;
        self.mem.fill(ptr, capacity, byte)
    }

    /// Walk the arena and tally it.
    ///
    /// # Errors
    /// [`MemoryError::CorruptionDetected`] at the first malformed block.
    pub fn stats(&self) -> MemoryResult<HeapStats> {
        let end = self.end();
        let mut stats = HeapStats {
            arena: self.arena(),
            max_size: self.max_size,
            live_blocks: 0,
            live_bytes: 0,
            free_blocks: 0,
            free_bytes: 0,
            overhead_bytes: 0,
            largest_free: 0,
        };

        let mut at = self.base;
        let mut prev_free = false;
        while at < end {
            let header = self.block_at(at)?;
            if header.is_allocated() {
                stats.live_blocks += 1;
                stats.live_bytes += header.size;
            } else {
                if prev_free {
                    warn!("kheap: uncoalesced free block at {at}");
                    return Err(MemoryError::CorruptionDetected(at));
                }
                stats.free_blocks += 1;
                stats.free_bytes += header.size;
                stats.largest_free = stats.largest_free.max(header.size);
            }
            stats.overhead_bytes += BLOCK_OVERHEAD;
            prev_free = !header.is_allocated();
            at = next_of(at, header.size);
        }
        Ok(stats)
    }

    /// Full consistency check: every block, the free list and the
    /// accounting identity.
    ///
    /// # Errors
    /// [`MemoryError::CorruptionDetected`] naming the first offending block.
    pub fn check(&self) -> MemoryResult<HeapStats> {
        let stats = self.stats()?;

        let end = self.end();
        let mut listed = 0;
        let mut prev = None;
        let mut cursor = self.free_head;
        while let Some(at) = cursor {
            let out_of_order = prev.is_some_and(|p| p >= at);
            if listed >= stats.free_blocks || at < self.base || at >= end || out_of_order {
                warn!("kheap: free list broken at {at}");
                return Err(MemoryError::CorruptionDetected(at));
            }
            let header = self.block_at(at)?;
            if header.is_allocated() || header.prev_free != prev {
                warn!("kheap: free list entry {at} is inconsistent");
                return Err(MemoryError::CorruptionDetected(at));
            }
            listed += 1;
            prev = Some(at);
            cursor = header.next_free;
        }
        if listed != stats.free_blocks {
            warn!(
                "kheap: {listed} listed free blocks, {} in arena",
                stats.free_blocks
            );
            return Err(MemoryError::CorruptionDetected(self.base));
        }

        if stats.live_bytes + stats.free_bytes + stats.overhead_bytes != self.size {
            return Err(MemoryError::CorruptionDetected(self.base));
        }
        Ok(stats)
    }

    #[must_use]
    pub const fn arena(&self) -> PhysicalRange {
        PhysicalRange::new(self.base, self.size)
    }

    #[must_use]
    pub const fn max_size(&self) -> u64 {
        self.max_size
    }

    pub const fn memory(&self) -> &M {
        &self.mem
    }

    /// Direct access to the backing memory, bypassing every check.
    pub const fn memory_mut(&mut self) -> &mut M {
        &mut self.mem
    }

    pub fn into_memory(self) -> M {
        self.mem
    }

    fn end(&self) -> PhysicalAddress {
        self.base + self.size
    }

    /// Payload capacity for a request, validated against the arena limit.
    fn request_size(&self, size: u64) -> MemoryResult<u64> {
        if size == 0 {
            return Err(MemoryError::ZeroSize);
        }
        let need =
            checked_align_up(size, HEAP_ALIGNMENT).ok_or(MemoryError::SizeOverflow(size))?;
        match need.checked_add(BLOCK_OVERHEAD) {
            Some(span) if span <= self.max_size => Ok(need),
            _ => Err(MemoryError::SizeOverflow(size)),
        }
    }

    /// Read and validate the block at `at`.
    fn block_at(&self, at: PhysicalAddress) -> MemoryResult<Header> {
        let header = read_header(&self.mem, at)?;
        let fits = at
            .checked_add(BLOCK_OVERHEAD)
            .and_then(|a| a.checked_add(header.size))
            .is_some_and(|next| next <= self.end());
        if header.magic != BLOCK_MAGIC || !fits || !header.size.is_multiple_of(HEAP_ALIGN) {
            warn!("kheap: malformed header at {at}");
            return Err(MemoryError::CorruptionDetected(at));
        }
        let footer = read_footer(&self.mem, footer_of(at, header.size))?;
        if footer != header.footer() {
            warn!("kheap: footer of block {at} does not match its header");
            return Err(MemoryError::CorruptionDetected(at));
        }
        Ok(header)
    }

    fn write_block(&mut self, at: PhysicalAddress, header: &Header) -> MemoryResult<()> {
        block::write_header(&mut self.mem, at, header)?;
        block::write_footer(&mut self.mem, footer_of(at, header.size), &header.footer())
    }

    /// Map a caller's handle to its allocated block.
    fn resolve(&self, ptr: PhysicalAddress) -> MemoryResult<(PhysicalAddress, Header)> {
        let invalid = MemoryError::InvalidFree(ptr);
        if !ptr.is_aligned(HEAP_ALIGNMENT) {
            return Err(invalid);
        }
        let at = ptr.checked_sub(HEADER_SIZE).ok_or(invalid)?;
        let inside = at >= self.base
            && at
                .checked_add(BLOCK_OVERHEAD)
                .is_some_and(|block_end| block_end <= self.end());
        if !inside {
            return Err(invalid);
        }

        let raw = read_header(&self.mem, at)?;
        match raw.magic {
            BLOCK_MAGIC if raw.is_allocated() => {}
            BLOCK_MAGIC | RETIRED_MAGIC => return Err(MemoryError::DoubleFree(ptr)),
            _ => return Err(invalid),
        }
        Ok((at, self.block_at(at)?))
    }

    /// [`resolve`](Self::resolve) for operations on live data, where a freed
    /// handle is simply not a valid one.
    fn live(&self, ptr: PhysicalAddress) -> MemoryResult<(PhysicalAddress, Header)> {
        self.resolve(ptr).map_err(|e| match e {
            MemoryError::DoubleFree(p) => MemoryError::InvalidFree(p),
            e => e,
        })
    }

    fn find_fit(&self, need: u64) -> MemoryResult<Option<(PhysicalAddress, Header)>> {
        let mut cursor = self.free_head;
        let mut budget = self.max_list_len();
        while let Some(at) = cursor {
            budget = budget
                .checked_sub(1)
                .ok_or(MemoryError::CorruptionDetected(at))?;
            let header = self.block_at(at)?;
            if header.is_allocated() {
                warn!("kheap: allocated block {at} on the free list");
                return Err(MemoryError::CorruptionDetected(at));
            }
            if header.size >= need {
                return Ok(Some((at, header)));
            }
            cursor = header.next_free;
        }
        Ok(None)
    }

    /// Hand out the free block at `at` for a request of `need` bytes.
    fn take(&mut self, at: PhysicalAddress, header: &Header, need: u64) -> MemoryResult<()> {
        let surplus = header.size - need;
        if surplus >= SPLIT_THRESHOLD {
            let rest = next_of(at, need);
            self.write_block(
                rest,
                &Header::free(surplus - BLOCK_OVERHEAD, header.prev_free, header.next_free),
            )?;
            self.relink(header.prev_free, header.next_free, Some(rest))?;
            self.write_block(at, &Header::allocated(need))
        } else {
            self.relink(header.prev_free, header.next_free, None)?;
            self.write_block(at, &Header::allocated(header.size))
        }
    }

    /// Turn the block at `at` (capacity `size`) free, merging it with free
    /// neighbours on both sides.
    fn release(&mut self, at: PhysicalAddress, size: u64) -> MemoryResult<()> {
        let next = next_of(at, size);
        let successor = if next < self.end() {
            let header = self.block_at(next)?;
            (!header.is_allocated()).then_some(header)
        } else {
            None
        };
        let predecessor = self.free_predecessor(at)?;

        match (predecessor, successor) {
            (Some((prev, ph)), Some(nh)) => {
                self.relink(nh.prev_free, nh.next_free, None)?;
                retire(&mut self.mem, next)?;
                retire(&mut self.mem, at)?;
                let merged = ph.size + size + nh.size + 2 * BLOCK_OVERHEAD;
                self.write_block(prev, &Header::free(merged, ph.prev_free, nh.next_free))
            }
            (Some((prev, ph)), None) => {
                retire(&mut self.mem, at)?;
                let merged = ph.size + size + BLOCK_OVERHEAD;
                self.write_block(prev, &Header::free(merged, ph.prev_free, ph.next_free))
            }
            (None, Some(nh)) => {
                retire(&mut self.mem, next)?;
                let merged = size + nh.size + BLOCK_OVERHEAD;
                self.write_block(at, &Header::free(merged, nh.prev_free, nh.next_free))?;
                self.relink(nh.prev_free, nh.next_free, Some(at))
            }
            (None, None) => {
                self.write_block(at, &Header::free(size, None, None))?;
                self.insert_sorted(at)
            }
        }
    }

    /// The block in front of `at`, if it is free.
    fn free_predecessor(&self, at: PhysicalAddress) -> MemoryResult<Option<(PhysicalAddress, Header)>> {
        if at <= self.base {
            return Ok(None);
        }
        let footer_at = at
            .checked_sub(FOOTER_SIZE)
            .ok_or(MemoryError::CorruptionDetected(at))?;
        let footer = read_footer(&self.mem, footer_at)?;
        if footer.magic != BLOCK_MAGIC {
            warn!("kheap: malformed footer in front of {at}");
            return Err(MemoryError::CorruptionDetected(at));
        }
        if footer.flags.allocated() {
            return Ok(None);
        }
        let prev = footer
            .size
            .checked_add(BLOCK_OVERHEAD)
            .and_then(|span| at.checked_sub(span))
            .filter(|prev| *prev >= self.base)
            .ok_or(MemoryError::CorruptionDetected(at))?;
        let header = self.block_at(prev)?;
        if header.is_allocated() {
            return Err(MemoryError::CorruptionDetected(prev));
        }
        Ok(Some((prev, header)))
    }

    /// Give back the tail of an allocation beyond `need` bytes.
    fn shrink(&mut self, at: PhysicalAddress, capacity: u64, need: u64) -> MemoryResult<()> {
        let surplus = capacity - need;
        if surplus < SPLIT_THRESHOLD {
            return Ok(());
        }
        let next = next_of(at, capacity);
        if next < self.end() {
            self.block_at(next)?;
        }

        let tail = next_of(at, need);
        let tail_size = surplus - BLOCK_OVERHEAD;
        self.write_block(at, &Header::allocated(need))?;
        self.write_block(tail, &Header::allocated(tail_size))?;
        self.release(tail, tail_size)
    }

    /// Extend an allocation into a free successor. Returns `false` if the
    /// successor is not free or too small; nothing changes then.
    fn grow_in_place(&mut self, at: PhysicalAddress, capacity: u64, need: u64) -> MemoryResult<bool> {
        let next = next_of(at, capacity);
        if next >= self.end() {
            return Ok(false);
        }
        let nh = self.block_at(next)?;
        let combined = capacity + BLOCK_OVERHEAD + nh.size;
        if nh.is_allocated() || combined < need {
            return Ok(false);
        }

        retire(&mut self.mem, next)?;
        let surplus = combined - need;
        if surplus >= SPLIT_THRESHOLD {
            let rest = next_of(at, need);
            self.write_block(
                rest,
                &Header::free(surplus - BLOCK_OVERHEAD, nh.prev_free, nh.next_free),
            )?;
            self.relink(nh.prev_free, nh.next_free, Some(rest))?;
            self.write_block(at, &Header::allocated(need))?;
        } else {
            self.relink(nh.prev_free, nh.next_free, None)?;
            self.write_block(at, &Header::allocated(combined))?;
        }
        Ok(true)
    }

    /// Claim frames above the arena so that a block of `need` bytes fits.
    fn grow<F: FrameSource + ?Sized>(&mut self, frames: &mut F, need: u64) -> MemoryResult<()> {
        let end = self.end();
        let trailing = self.trailing_free()?;
        let shortfall = match trailing {
            Some((_, header)) => need.saturating_sub(header.size),
            None => need + BLOCK_OVERHEAD,
        };
        let grow_by =
            checked_align_up(shortfall, FRAME_ALIGN).ok_or(MemoryError::OutOfMemory)?;
        if self.size.checked_add(grow_by).is_none_or(|s| s > self.max_size) {
            debug!("kheap: growth by {grow_by:#x} would exceed {:#x}", self.max_size);
            return Err(MemoryError::OutOfMemory);
        }

        let range = PhysicalRange::new(end, grow_by);
        if let Err(e) = frames.claim_range(range) {
            debug!("kheap: cannot claim {range}: {e}");
            return Err(MemoryError::OutOfMemory);
        }
        let mut byte = [0u8; 1];
        let reachable = self.mem.read(end, &mut byte).is_ok()
            && self.mem.read(end + (grow_by - 1), &mut byte).is_ok();
        if !reachable {
            warn!("kheap: claimed {range} is not reachable");
            frames.release_range(end).ok();
            return Err(MemoryError::OutOfMemory);
        }

        self.size += grow_by;
        match trailing {
            Some((at, header)) => self.write_block(
                at,
                &Header::free(header.size + grow_by, header.prev_free, header.next_free),
            )?,
            None => {
                self.write_block(end, &Header::free(grow_by - BLOCK_OVERHEAD, None, None))?;
                self.insert_sorted(end)?;
            }
        }
        debug!("kheap: grew arena to {}", self.arena());
        Ok(())
    }

    /// The last block of the arena, if it is free.
    fn trailing_free(&self) -> MemoryResult<Option<(PhysicalAddress, Header)>> {
        let end = self.end();
        let footer_at = end
            .checked_sub(FOOTER_SIZE)
            .ok_or(MemoryError::CorruptionDetected(end))?;
        let footer = read_footer(&self.mem, footer_at)?;
        if footer.magic != BLOCK_MAGIC {
            return Err(MemoryError::CorruptionDetected(footer_at));
        }
        if footer.flags.allocated() {
            return Ok(None);
        }
        let at = footer
            .size
            .checked_add(BLOCK_OVERHEAD)
            .and_then(|span| end.checked_sub(span))
            .filter(|at| *at >= self.base)
            .ok_or(MemoryError::CorruptionDetected(footer_at))?;
        Ok(Some((at, self.block_at(at)?)))
    }
}

/// Address of `len` payload bytes at `offset`, if they lie inside the
/// allocation.
fn payload_span(
    ptr: PhysicalAddress,
    capacity: u64,
    offset: u64,
    len: u64,
) -> MemoryResult<PhysicalAddress> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(ptr + offset),
        _ => Err(MemoryError::PayloadOverrun { ptr, offset, len }),
    }
}

#[cfg(test)]
mod tests;
