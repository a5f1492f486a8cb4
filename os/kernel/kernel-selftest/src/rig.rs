//! Fresh allocator instances for each scenario.
//!
//! - The kmm rig is a 1 MiB machine with the boot reservations of a real
//!   kernel: low memory and a 64 KiB kernel image at 768 KiB. That leaves
//!   [`KMM_RIG_FREE_FRAMES`] frames, few enough that exhausting them one by
//!   one stays within the region table.
//! - The heap rig is a 32 KiB machine whose memory is a stack-resident
//!   [`RamImage`]. Frame 0 and a one-frame kernel image put the arena at
//!   `0x2000`; it starts at one frame and may grow to four.

use crate::check::OrFail;
use crate::Failure;
use kernel_alloc::phys_memory::RamImage;
use kernel_alloc::{HeapConfig, Kmm, MemoryManager};
use kernel_info::memory::{FRAME_SIZE, LOW_MEMORY_END};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};
use planck_noalloc::vec::ArrayVec;

pub const KMM_RIG_TOTAL: u64 = 0x10_0000;

pub const KMM_RIG_IMAGE: PhysicalRange =
    PhysicalRange::new(PhysicalAddress::new(0xC_0000), 0x1_0000);

/// Frames the kmm rig can hand out.
pub const KMM_RIG_FREE_FRAMES: u64 =
    (KMM_RIG_TOTAL - LOW_MEMORY_END - KMM_RIG_IMAGE.len) / FRAME_SIZE;

pub const HEAP_RAM_SIZE: usize = 0x8000;

pub const HEAP_RIG_IMAGE: PhysicalRange =
    PhysicalRange::new(PhysicalAddress::new(0x1000), 0x1000);

pub const HEAP_RIG_CONFIG: HeapConfig = HeapConfig {
    initial_size: FRAME_SIZE,
    max_size: 4 * FRAME_SIZE,
};

pub type HeapRig = MemoryManager<RamImage<[u8; HEAP_RAM_SIZE]>>;

pub fn kmm_rig() -> Result<Kmm, Failure> {
    Kmm::new(KMM_RIG_TOTAL, &Kmm::boot_reservations(KMM_RIG_IMAGE)).or_fail("kmm init failed")
}

pub fn heap_rig() -> Result<HeapRig, Failure> {
    MemoryManager::init(
        HEAP_RAM_SIZE as u64,
        &[HEAP_RIG_IMAGE],
        RamImage::new(PhysicalAddress::zero(), [0u8; HEAP_RAM_SIZE]),
        HEAP_RIG_CONFIG,
    )
    .or_fail("heap init failed")
}

/// Remember an address; scenarios size their tables so this cannot fail
/// unless the allocator hands out more than it should.
pub fn hold<const N: usize>(
    held: &mut ArrayVec<PhysicalAddress, N>,
    addr: PhysicalAddress,
) -> Result<(), Failure> {
    held.try_push(addr)
        .map_err(|_| Failure::new("more allocations than expected"))
}

/// Deterministic xorshift64 sequence for the stress scenario.
pub struct XorShift(u64);

impl XorShift {
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub const fn step(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    /// A value in `0..bound`.
    pub const fn below(&mut self, bound: u64) -> u64 {
        self.step() % bound
    }
}
