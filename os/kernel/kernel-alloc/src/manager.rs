//! # Memory Manager Context
//!
//! Binds one [`Kmm`] and the [`Kheap`] built on top of it into a single value
//! with an explicit `init`/`reset` lifecycle. Kernels that share it between
//! contexts wrap it in a [`SharedMemoryManager`]; every operation then runs
//! to completion under that one lock.
//!
//! The heap's whole growth window, `max_size` bytes, is taken from the kmm at
//! init and kept as a [`FrameWindow`]. The arena grows upwards through it, so
//! frame allocations made in the meantime never block heap growth.
//!
//! In the kernel, physical memory is reached through the direct map:
//!
//! ```rust,no_run
//! use kernel_alloc::phys_memory::HhdmPhysMemory;
//! use kernel_alloc::{HeapConfig, Kmm, MemoryManager, SharedMemoryManager};
//! use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};
//!
//! let total_bytes = 256 << 20;
//! let kernel_image = PhysicalRange::new(PhysicalAddress::new(0x10_0000), 0x40_0000);
//!
//! // SAFETY: the loader maps all of physical memory at HHDM_BASE.
//! let mem = unsafe { HhdmPhysMemory::new() };
//! let reserved = Kmm::boot_reservations(kernel_image);
//! let mm = MemoryManager::init(total_bytes, &reserved, mem, HeapConfig::default())?;
//!
//! let shared = SharedMemoryManager::new(mm);
//! let p = shared.with_lock(|mm| mm.kmalloc(256))?;
//! shared.with_lock(|mm| mm.kfree(p))?;
//! # Ok::<(), kernel_alloc::MemoryError>(())
//! ```

use crate::frame_alloc::FrameWindow;
use crate::kheap::{HeapConfig, HeapStats, Kheap};
use crate::kmm::{Kmm, KmmStats, RegionState};
use crate::phys_memory::PhysMemory;
use crate::{MemoryError, MemoryResult};
use kernel_info::memory::{FRAME_ALIGN, FRAME_SIZE, KMM_MAX_REGIONS};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, align_down, checked_align_up};
use kernel_sync::SpinLock;
use log::{debug, warn};
use planck_noalloc::vec::ArrayVec;

/// A [`MemoryManager`] behind the allocator-wide lock.
pub type SharedMemoryManager<M> = SpinLock<MemoryManager<M>>;

/// Physical memory manager and kernel heap, initialized together.
pub struct MemoryManager<M> {
    kmm: Kmm,
    heap: Kheap<M>,
    /// Frames reserved for the heap arena and its growth.
    window: FrameWindow,
    total_bytes: u64,
    reserved: ArrayVec<PhysicalRange, KMM_MAX_REGIONS>,
    config: HeapConfig,
}

impl<M: PhysMemory> MemoryManager<M> {
    /// Build the physical memory manager for `[0, total_bytes)`, set the heap's
    /// growth window aside and carve the initial arena out of it.
    ///
    /// # Errors
    /// Anything [`Kmm::new`] or [`Kheap::init`] reports;
    /// [`MemoryError::OutOfMemory`] if the window does not fit;
    /// [`MemoryError::RegionTableFull`] for more reservations than regions.
    pub fn init(
        total_bytes: u64,
        reserved: &[PhysicalRange],
        mem: M,
        config: HeapConfig,
    ) -> MemoryResult<Self> {
        let mut ranges = ArrayVec::new();
        for range in reserved {
            ranges
                .try_push(*range)
                .map_err(|_| MemoryError::RegionTableFull)?;
        }

        let mut kmm = Kmm::new(total_bytes, reserved)?;
        let mut window = reserve_window(&mut kmm, config)?;
        let heap = Kheap::init(&mut window, mem, config)?;
        debug!(
            "mm: ready, heap at {} in window {}, {} frames free",
            heap.arena(),
            window.range(),
            kmm.free_frames()
        );
        Ok(Self {
            kmm,
            heap,
            window,
            total_bytes,
            reserved: ranges,
            config,
        })
    }

    /// Forget every frame and heap allocation and return to the state right
    /// after [`init`](Self::init).
    ///
    /// # Errors
    /// As [`init`](Self::init); the manager is unchanged on error.
    pub fn reset(&mut self) -> MemoryResult<()> {
        let mut kmm = Kmm::new(self.total_bytes, self.reserved.as_slice())?;
        let mut window = reserve_window(&mut kmm, self.config)?;
        self.heap.reset(&mut window, self.config)?;
        self.kmm = kmm;
        self.window = window;
        debug!("mm: reset");
        Ok(())
    }

    /// Heap allocation; see [`Kheap::alloc`].
    ///
    /// # Errors
    /// As [`Kheap::alloc`].
    pub fn kmalloc(&mut self, size: u64) -> MemoryResult<PhysicalAddress> {
        self.heap.alloc(&mut self.window, size)
    }

    /// # Errors
    /// As [`Kheap::free`].
    pub fn kfree(&mut self, ptr: PhysicalAddress) -> MemoryResult<()> {
        self.heap.free(ptr)
    }

    /// # Errors
    /// As [`Kheap::realloc`].
    pub fn krealloc(
        &mut self,
        ptr: Option<PhysicalAddress>,
        size: u64,
    ) -> MemoryResult<Option<PhysicalAddress>> {
        self.heap.realloc(&mut self.window, ptr, size)
    }

    /// # Errors
    /// As [`Kmm::frame_alloc`].
    pub fn frame_alloc(&mut self) -> MemoryResult<PhysicalAddress> {
        self.kmm.frame_alloc()
    }

    /// Free a frame. Frames of the heap window are owned by the heap and
    /// cannot be freed here.
    ///
    /// # Errors
    /// [`MemoryError::InvalidFree`] for an address inside the heap window,
    /// otherwise as [`Kmm::frame_free`].
    pub fn frame_free(&mut self, addr: PhysicalAddress) -> MemoryResult<()> {
        if self.window.range().contains(addr) {
            warn!("mm: frame {addr} belongs to the heap window");
            return Err(MemoryError::InvalidFree(addr));
        }
        self.kmm.frame_free(addr)
    }

    /// Check both layers, that the arena is the used part of the heap window
    /// and that every window frame is allocated in the kmm.
    ///
    /// # Errors
    /// [`MemoryError::CorruptionDetected`] from either layer.
    pub fn check(&self) -> MemoryResult<(KmmStats, HeapStats)> {
        let kmm = self.kmm.check()?;
        let heap = self.heap.check()?;

        let arena = self.heap.arena();
        if arena != self.window.used() {
            warn!("mm: heap arena {arena} is not the used window {}", self.window.used());
            return Err(MemoryError::CorruptionDetected(arena.base));
        }
        let window = self.window.range();
        let orphaned = self
            .kmm
            .regions()
            .filter(|r| r.range().overlaps(&window))
            .find(|r| r.state != RegionState::Allocated);
        if let Some(region) = orphaned {
            warn!("mm: heap window {window} overlaps {region}");
            return Err(MemoryError::CorruptionDetected(region.base));
        }
        Ok((kmm, heap))
    }

    /// Frames set aside for the heap; the arena is its lower part.
    #[must_use]
    pub const fn heap_window(&self) -> PhysicalRange {
        self.window.range()
    }

    pub const fn kmm(&self) -> &Kmm {
        &self.kmm
    }

    pub const fn heap(&self) -> &Kheap<M> {
        &self.heap
    }

    pub const fn heap_mut(&mut self) -> &mut Kheap<M> {
        &mut self.heap
    }
}

/// Take the heap's full growth window from `kmm`, sized as [`Kheap`] sizes
/// its maximum arena.
fn reserve_window(kmm: &mut Kmm, config: HeapConfig) -> MemoryResult<FrameWindow> {
    if config.initial_size == 0 {
        return Err(MemoryError::ZeroSize);
    }
    let initial = checked_align_up(config.initial_size, FRAME_ALIGN)
        .ok_or(MemoryError::SizeOverflow(config.initial_size))?;
    let len = align_down(config.max_size, FRAME_ALIGN).max(initial);
    let base = kmm.alloc(len, FRAME_SIZE)?;
    Ok(FrameWindow::new(PhysicalRange::new(base, len)))
}
