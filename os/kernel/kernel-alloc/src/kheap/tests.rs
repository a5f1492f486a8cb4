use super::*;
use crate::frame_alloc::NoGrowth;
use crate::kmm::Kmm;
use crate::phys_memory::RamImage;

const BASE: PhysicalAddress = PhysicalAddress::new(0x2000);

struct Rig {
    kmm: Kmm,
    heap: Kheap<RamImage<Vec<u8>>>,
}

impl Rig {
    /// 64 KiB of physical memory with the first 8 KiB reserved; the arena
    /// therefore starts at [`BASE`].
    fn new(initial_size: u64, max_size: u64) -> Self {
        let image = PhysicalRange::new(PhysicalAddress::new(0x1000), 0x1000);
        let mut kmm = Kmm::new(0x10000, &[image]).unwrap();
        let ram = RamImage::new(PhysicalAddress::zero(), vec![0u8; 0x10000]);
        let heap = Kheap::init(
            &mut kmm,
            ram,
            HeapConfig {
                initial_size,
                max_size,
            },
        )
        .unwrap();
        Self { kmm, heap }
    }

    fn fixed() -> Self {
        Self::new(0x1000, 0x1000)
    }

    fn alloc(&mut self, size: u64) -> MemoryResult<PhysicalAddress> {
        self.heap.alloc(&mut self.kmm, size)
    }

    fn realloc(
        &mut self,
        ptr: Option<PhysicalAddress>,
        size: u64,
    ) -> MemoryResult<Option<PhysicalAddress>> {
        self.heap.realloc(&mut self.kmm, ptr, size)
    }

    fn stats(&self) -> HeapStats {
        self.heap.check().unwrap()
    }
}

#[test]
fn init_installs_one_free_block() {
    let rig = Rig::fixed();
    let stats = rig.stats();
    assert_eq!(stats.arena, PhysicalRange::new(BASE, 0x1000));
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_bytes, 0x1000 - BLOCK_OVERHEAD);
    assert_eq!(stats.live_blocks, 0);
    assert_eq!(rig.kmm.allocated_bytes(), 0x1000);
}

#[test]
fn init_fails_without_frames() {
    let ram = RamImage::new(PhysicalAddress::zero(), vec![0u8; 0x1000]);
    let err = Kheap::init(&mut NoGrowth, ram, HeapConfig::default()).err();
    assert_eq!(err, Some(MemoryError::OutOfMemory));
}

#[test]
fn init_returns_frames_it_cannot_reach() {
    let mut kmm = Kmm::new(0x10000, &[]).unwrap();
    let ram = RamImage::new(PhysicalAddress::new(0x8000), vec![0u8; 0x1000]);
    let config = HeapConfig {
        initial_size: 0x1000,
        max_size: 0x1000,
    };
    assert!(matches!(
        Kheap::init(&mut kmm, ram, config),
        Err(MemoryError::Unbacked(_))
    ));
    assert_eq!(kmm.allocated_bytes(), 0);
}

#[test]
fn handles_are_aligned_and_rounded() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(1).unwrap();
    let b = rig.alloc(17).unwrap();
    assert_eq!(a, BASE + HEADER_SIZE);
    assert!(b.is_aligned(HEAP_ALIGNMENT));
    assert_eq!(rig.heap.capacity(a), Ok(16));
    assert_eq!(rig.heap.capacity(b), Ok(32));
}

#[test]
fn split_leaves_remainder() {
    let mut rig = Rig::fixed();
    let before = rig.stats().free_bytes;
    rig.alloc(16).unwrap();
    let stats = rig.stats();
    assert_eq!(stats.free_bytes, before - 16 - BLOCK_OVERHEAD);
    assert_eq!(stats.free_blocks, 1);
}

#[test]
fn exact_fit_reuses_block_without_split() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(32).unwrap();
    rig.alloc(32).unwrap();
    rig.heap.free(a).unwrap();
    assert_eq!(rig.stats().free_blocks, 2);

    assert_eq!(rig.alloc(32), Ok(a));
    assert_eq!(rig.stats().free_blocks, 1);
}

#[test]
fn small_surplus_is_not_split() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(64).unwrap();
    rig.alloc(16).unwrap();
    rig.heap.free(a).unwrap();

    assert_eq!(rig.alloc(16), Ok(a));
    assert_eq!(rig.heap.capacity(a), Ok(64));
}

#[test]
fn free_coalesces_both_neighbours() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(32).unwrap();
    let b = rig.alloc(32).unwrap();
    let c = rig.alloc(32).unwrap();
    rig.alloc(32).unwrap();

    rig.heap.free(a).unwrap();
    rig.heap.free(c).unwrap();
    assert_eq!(rig.stats().free_blocks, 3);
    rig.heap.free(b).unwrap();

    let stats = rig.stats();
    assert_eq!(stats.free_blocks, 2);
    assert_eq!(rig.alloc(3 * 32 + 2 * BLOCK_OVERHEAD), Ok(a));
}

#[test]
fn adjacent_pair_merges_to_sum_plus_overhead() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(16).unwrap();
    let b = rig.alloc(16).unwrap();
    rig.alloc(16).unwrap();
    rig.heap.free(a).unwrap();
    rig.heap.free(b).unwrap();
    assert_eq!(rig.alloc(32), Ok(a));
    assert_eq!(rig.heap.capacity(a), Ok(16 + 16 + BLOCK_OVERHEAD));
}

#[test]
fn double_free_is_reported_and_harmless() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(32).unwrap();
    let b = rig.alloc(32).unwrap();
    rig.heap.free(a).unwrap();
    let before = rig.stats();

    assert_eq!(rig.heap.free(a), Err(MemoryError::DoubleFree(a)));
    assert_eq!(rig.stats(), before);

    // b merges into a and the tail; its header is retired.
    rig.heap.free(b).unwrap();
    assert_eq!(rig.heap.free(b), Err(MemoryError::DoubleFree(b)));
    assert_eq!(rig.heap.free(a), Err(MemoryError::DoubleFree(a)));
    assert_eq!(rig.stats().free_blocks, 1);
}

#[test]
fn invalid_free_is_rejected_without_change() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(64).unwrap();
    let before = rig.stats();

    for bogus in [
        PhysicalAddress::zero(),
        PhysicalAddress::new(0xdead),
        PhysicalAddress::new(0x1000),
        a + 16,
        BASE + 0x1000,
        PhysicalAddress::new(u64::MAX - 15),
    ] {
        assert_eq!(rig.heap.free(bogus), Err(MemoryError::InvalidFree(bogus)));
    }
    assert_eq!(rig.stats(), before);
    rig.heap.free(a).unwrap();
}

#[test]
fn damaged_footer_is_detected() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(32).unwrap();
    rig.heap.memory_mut().fill(a + 32, 4, 0xEE).unwrap();

    assert_eq!(rig.heap.free(a), Err(MemoryError::CorruptionDetected(BASE)));
    assert_eq!(rig.heap.check(), Err(MemoryError::CorruptionDetected(BASE)));
}

#[test]
fn broken_free_list_is_detected() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(32).unwrap();
    let b = rig.alloc(32).unwrap();
    rig.heap.free(a).unwrap();

    let b_header = b.checked_sub(HEADER_SIZE).unwrap();
    rig.heap
        .memory_mut()
        .write(BASE + 24, &b_header.as_u64().to_le_bytes())
        .unwrap();
    assert_eq!(
        rig.heap.check(),
        Err(MemoryError::CorruptionDetected(b_header))
    );
}

#[test]
fn zero_and_oversized_requests() {
    let mut rig = Rig::fixed();
    assert_eq!(rig.alloc(0), Err(MemoryError::ZeroSize));
    assert_eq!(rig.alloc(u64::MAX), Err(MemoryError::SizeOverflow(u64::MAX)));
    assert_eq!(rig.alloc(0x1000), Err(MemoryError::SizeOverflow(0x1000)));
    assert_eq!(rig.stats().live_blocks, 0);
}

#[test]
fn payload_access_is_bounds_checked() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(20).unwrap();
    rig.heap.write(a, 0, b"boundary tags").unwrap();
    rig.heap.write(a, 28, b"tail").unwrap();
    assert_eq!(
        rig.heap.write(a, 29, b"tail"),
        Err(MemoryError::PayloadOverrun {
            ptr: a,
            offset: 29,
            len: 4
        })
    );

    let mut buf = [0u8; 13];
    rig.heap.read(a, 0, &mut buf).unwrap();
    assert_eq!(&buf, b"boundary tags");

    rig.heap.fill(a, 0x5A).unwrap();
    rig.heap.read(a, 0, &mut buf).unwrap();
    assert_eq!(buf, [0x5A; 13]);
    rig.stats();

    rig.heap.free(a).unwrap();
    assert_eq!(rig.heap.read(a, 0, &mut buf), Err(MemoryError::InvalidFree(a)));
}

#[test]
fn realloc_shrinks_in_place() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(256).unwrap();
    rig.heap.write(a, 0, &[7; 32]).unwrap();

    assert_eq!(rig.realloc(Some(a), 32), Ok(Some(a)));
    assert_eq!(rig.heap.capacity(a), Ok(32));
    let stats = rig.stats();
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_bytes, 0x1000 - 2 * BLOCK_OVERHEAD - 32);

    let mut buf = [0u8; 32];
    rig.heap.read(a, 0, &mut buf).unwrap();
    assert_eq!(buf, [7; 32]);
}

#[test]
fn realloc_grows_into_free_successor() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(64).unwrap();
    rig.heap.write(a, 0, b"buddytest\0").unwrap();

    assert_eq!(rig.realloc(Some(a), 512), Ok(Some(a)));
    assert_eq!(rig.heap.capacity(a), Ok(512));
    let mut buf = [0u8; 10];
    rig.heap.read(a, 0, &mut buf).unwrap();
    assert_eq!(&buf, b"buddytest\0");
    assert_eq!(rig.stats().free_blocks, 1);
}

#[test]
fn realloc_moves_when_successor_is_live() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(64).unwrap();
    rig.alloc(16).unwrap();
    rig.heap.write(a, 0, &[0xC3; 64]).unwrap();

    let b = rig.realloc(Some(a), 512).unwrap().unwrap();
    assert_ne!(a, b);
    let mut buf = [0u8; 64];
    rig.heap.read(b, 0, &mut buf).unwrap();
    assert_eq!(buf, [0xC3; 64]);
    assert_eq!(rig.heap.free(a), Err(MemoryError::DoubleFree(a)));
    rig.stats();
}

#[test]
fn realloc_null_and_zero() {
    let mut rig = Rig::fixed();
    let a = rig.realloc(None, 40).unwrap().unwrap();
    assert_eq!(rig.heap.capacity(a), Ok(48));
    assert_eq!(rig.realloc(Some(a), 0), Ok(None));
    assert_eq!(rig.stats().live_blocks, 0);
    assert_eq!(rig.realloc(None, 0), Ok(None));
}

#[test]
fn realloc_of_freed_handle_is_invalid() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(32).unwrap();
    rig.alloc(32).unwrap();
    rig.heap.free(a).unwrap();
    assert_eq!(rig.realloc(Some(a), 64), Err(MemoryError::InvalidFree(a)));
    assert_eq!(rig.realloc(Some(a), 0), Err(MemoryError::InvalidFree(a)));
}

#[test]
fn failed_realloc_keeps_original() {
    let mut rig = Rig::fixed();
    let a = rig.alloc(64).unwrap();
    rig.alloc(2000).unwrap();
    rig.heap.write(a, 0, &[0x11; 64]).unwrap();
    let before = rig.stats();

    assert_eq!(rig.realloc(Some(a), 3000), Err(MemoryError::OutOfMemory));
    assert_eq!(rig.stats(), before);
    let mut buf = [0u8; 64];
    rig.heap.read(a, 0, &mut buf).unwrap();
    assert_eq!(buf, [0x11; 64]);
}

#[test]
fn arena_grows_by_claiming_following_frames() {
    let mut rig = Rig::new(0x1000, 0x4000);
    let a = rig.alloc(6000).unwrap();
    let stats = rig.stats();
    assert_eq!(stats.arena, PhysicalRange::new(BASE, 0x2000));
    assert_eq!(rig.kmm.allocated_bytes(), 0x2000);
    assert_eq!(rig.heap.capacity(a), Ok(6000));
    rig.kmm.check().unwrap();
}

#[test]
fn growth_stops_at_max_size_and_recovers() {
    let mut rig = Rig::new(0x1000, 0x4000);
    let mut held = Vec::new();
    let err = loop {
        match rig.alloc(1024) {
            Ok(p) => held.push(p),
            Err(e) => break e,
        }
    };
    assert_eq!(err, MemoryError::OutOfMemory);
    assert!(held.len() >= 12);
    let stats = rig.stats();
    assert!(stats.arena.len <= 0x4000);

    rig.heap.free(held[3]).unwrap();
    assert_eq!(rig.alloc(1024), Ok(held[3]));
    rig.stats();
}

#[test]
fn growth_blocked_by_neighbouring_allocation() {
    let mut rig = Rig::new(0x1000, 0x4000);
    let frame = rig.kmm.frame_alloc().unwrap();
    assert_eq!(frame, BASE + 0x1000);
    let before = rig.stats();

    assert_eq!(rig.alloc(6000), Err(MemoryError::OutOfMemory));
    assert_eq!(rig.stats(), before);
}

#[test]
fn seeded_churn_keeps_heap_consistent() {
    let mut rig = Rig::new(0x2000, 0x8000);
    let mut live: Vec<(PhysicalAddress, u64, u8)> = Vec::new();
    let mut seed = 0x2545_F491_u64;

    for round in 0..600u32 {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        let pick = (seed >> 33) as usize;
        let size = 1 + (seed >> 40) % 700;
        let tag = (round % 251) as u8;

        match pick % 3 {
            0 | 1 if live.len() < 24 => {
                if let Ok(p) = rig.alloc(size) {
                    rig.heap.fill(p, tag).unwrap();
                    live.push((p, size, tag));
                }
            }
            2 if !live.is_empty() => {
                let (p, old, t) = live[pick % live.len()];
                if let Ok(Some(q)) = rig.realloc(Some(p), size) {
                    let keep = old.min(size);
                    let mut buf = vec![0u8; keep as usize];
                    rig.heap.read(q, 0, &mut buf).unwrap();
                    assert!(buf.iter().all(|b| *b == t));
                    rig.heap.fill(q, t).unwrap();
                    let idx = pick % live.len();
                    live[idx] = (q, size, t);
                }
            }
            _ if !live.is_empty() => {
                let (p, _, _) = live.swap_remove(pick % live.len());
                rig.heap.free(p).unwrap();
            }
            _ => {}
        }

        let stats = rig.heap.check().unwrap();
        assert_eq!(stats.live_blocks, live.len());
        for (i, (p, size, _)) in live.iter().enumerate() {
            for (q, other, _) in &live[i + 1..] {
                let disjoint = p.as_u64() + size <= q.as_u64() || q.as_u64() + other <= p.as_u64();
                assert!(disjoint, "{p} and {q} overlap");
            }
        }
    }
}
