//! # Memory Layout and Allocator Geometry

use kernel_memory_addresses::Alignment;

/// Granularity of the physical memory manager, in bytes.
pub const FRAME_SIZE: u64 = 4096;

/// [`FRAME_SIZE`] as an [`Alignment`].
pub const FRAME_ALIGN: Alignment = Alignment::new_const(FRAME_SIZE);

/// Low memory below this address (real-mode IVT, BDA, EBDA) is never handed
/// out. Reserved at 640 KiB rather than 1 MiB; the VGA/BIOS hole above it is
/// described by the firmware memory map.
pub const LOW_MEMORY_END: u64 = 0x000A_0000;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything mapped at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Capacity of the physical memory manager's region table.
///
/// Every `alloc` may add up to two regions (a leading gap and a trailing
/// remainder), so this bounds the number of simultaneously live physical
/// allocations rather than the amount of memory.
pub const KMM_MAX_REGIONS: usize = 128;

/// Payload alignment and size granularity of the kernel heap.
pub const HEAP_ALIGN: u64 = 16;

/// [`HEAP_ALIGN`] as an [`Alignment`].
pub const HEAP_ALIGNMENT: Alignment = Alignment::new_const(HEAP_ALIGN);

/// Smallest payload worth splitting off as a separate free block.
pub const HEAP_MIN_SPLIT: u64 = 16;

/// Default size of the heap arena requested from the frame allocator at init.
pub const HEAP_INITIAL_SIZE: u64 = 16 * FRAME_SIZE;

/// Default upper bound the heap arena may grow to.
pub const HEAP_MAX_SIZE: u64 = 1024 * FRAME_SIZE;

const _: () = {
    assert!(FRAME_SIZE.is_power_of_two());
    assert!(LOW_MEMORY_END.is_multiple_of(FRAME_SIZE));
    assert!(HEAP_ALIGN.is_power_of_two());
    assert!(HEAP_MIN_SPLIT.is_multiple_of(HEAP_ALIGN));
    assert!(HEAP_INITIAL_SIZE.is_multiple_of(FRAME_SIZE));
    assert!(HEAP_MAX_SIZE >= HEAP_INITIAL_SIZE);
    assert!(KMM_MAX_REGIONS >= 3);
};
