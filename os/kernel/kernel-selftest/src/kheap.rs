//! Kernel heap scenarios, driven through a [`MemoryManager`](kernel_alloc::MemoryManager)
//! so that arena growth goes through the kmm as it does in the kernel.

use crate::Failure;
use crate::check::{Checked, OrFail};
use crate::rig::{HEAP_RIG_CONFIG, HEAP_RIG_IMAGE, HeapRig, XorShift, heap_rig, hold};
use kernel_alloc::MemoryError;
use kernel_alloc::kheap::BLOCK_OVERHEAD;
use kernel_info::memory::{FRAME_SIZE, HEAP_ALIGN, HEAP_ALIGNMENT};
use kernel_memory_addresses::PhysicalAddress;
use planck_noalloc::vec::ArrayVec;

/// Upper bound of simultaneously live 32-byte blocks in the rig's arena.
const MAX_SMALL_BLOCKS: usize = 256;

/// Payload of the lone free block of a fresh rig.
const FRESH_CAPACITY: u64 = FRAME_SIZE - BLOCK_OVERHEAD;

fn fill(mm: &mut HeapRig, ptr: PhysicalAddress, tag: u8) -> Checked {
    mm.heap_mut().fill(ptr, tag).or_fail("fill failed")
}

/// Check that the whole payload of `ptr` still carries `tag`.
fn verify(mm: &HeapRig, ptr: PhysicalAddress, tag: u8) -> Checked {
    let capacity = mm.heap().capacity(ptr).or_fail("capacity of live block")?;
    verify_prefix(mm, ptr, capacity, tag)
}

/// Check that the first `len` payload bytes of `ptr` carry `tag`.
fn verify_prefix(mm: &HeapRig, ptr: PhysicalAddress, len: u64, tag: u8) -> Checked {
    let mut buf = [0u8; 64];
    let mut offset = 0;
    while offset < len {
        let n = (len - offset).min(buf.len() as u64);
        #[allow(clippy::cast_possible_truncation)]
        let chunk = &mut buf[..n as usize];
        mm.heap().read(ptr, offset, chunk).or_fail("read failed")?;
        ensure!(chunk.iter().all(|b| *b == tag), "payload clobbered");
        offset += n;
    }
    Ok(())
}

pub fn init() -> Checked {
    let mm = heap_rig()?;
    let (_, stats) = mm.check().or_fail("inconsistent after init")?;
    ensure_eq!(
        stats.arena.base.as_u64(),
        HEAP_RIG_IMAGE.base.as_u64() + HEAP_RIG_IMAGE.len,
        "arena base"
    );
    ensure_eq!(stats.arena.len, HEAP_RIG_CONFIG.initial_size, "arena size");
    ensure_eq!(stats.free_blocks as u64, 1, "free blocks");
    ensure_eq!(stats.free_bytes, FRESH_CAPACITY, "free bytes");
    ensure_eq!(stats.live_blocks as u64, 0, "live blocks");
    Ok(())
}

pub fn alloc_small() -> Checked {
    let mut mm = heap_rig()?;
    let p = mm.kmalloc(1).or_fail("alloc of 1 byte failed")?;
    ensure!(p.is_aligned(HEAP_ALIGNMENT), "payload not aligned");
    ensure_eq!(
        mm.heap().capacity(p).or_fail("capacity")?,
        HEAP_ALIGN,
        "capacity"
    );

    mm.heap_mut().write(p, 0, &[0x5A]).or_fail("write failed")?;
    let mut byte = [0u8; 1];
    mm.heap().read(p, 0, &mut byte).or_fail("read failed")?;
    ensure_eq!(u64::from(byte[0]), 0x5A, "byte read back");

    mm.kfree(p).or_fail("free failed")?;
    mm.check().or_fail("inconsistent")?;
    Ok(())
}

/// A hole that exactly fits the request is reused whole.
pub fn alloc_exact() -> Checked {
    let mut mm = heap_rig()?;
    let a = mm.kmalloc(32).or_fail("alloc failed")?;
    let guard = mm.kmalloc(32).or_fail("guard alloc failed")?;
    mm.kfree(a).or_fail("free failed")?;
    let (_, before) = mm.check().or_fail("inconsistent")?;
    ensure_eq!(before.free_blocks as u64, 2, "free blocks with hole");

    let b = mm.kmalloc(32).or_fail("exact alloc failed")?;
    ensure_eq!(b.as_u64(), a.as_u64(), "exact fit address");
    ensure_eq!(mm.heap().capacity(b).or_fail("capacity")?, 32, "capacity");
    let (_, after) = mm.check().or_fail("inconsistent")?;
    ensure_eq!(after.free_blocks as u64, 1, "free blocks after exact fit");
    ensure_eq!(after.free_bytes, before.free_bytes - 32, "free bytes");

    mm.kfree(guard).or_fail("free failed")?;
    mm.kfree(b).or_fail("free failed")?;
    Ok(())
}

/// A small allocation from a large block leaves `C - small - overhead`.
pub fn split() -> Checked {
    let mut mm = heap_rig()?;
    let p = mm.kmalloc(16).or_fail("alloc failed")?;
    let (_, stats) = mm.check().or_fail("inconsistent")?;
    ensure_eq!(
        stats.free_bytes,
        FRESH_CAPACITY - 16 - BLOCK_OVERHEAD,
        "remainder"
    );
    ensure_eq!(stats.free_blocks as u64, 1, "free blocks");
    ensure_eq!(stats.live_bytes, 16, "live bytes");
    mm.kfree(p).or_fail("free failed")?;
    Ok(())
}

pub fn free_reuse() -> Checked {
    let mut mm = heap_rig()?;
    let p = mm.kmalloc(64).or_fail("alloc failed")?;
    mm.kfree(p).or_fail("free failed")?;
    let q = mm.kmalloc(64).or_fail("second alloc failed")?;
    ensure_eq!(q.as_u64(), p.as_u64(), "reused address");
    Ok(())
}

/// Two freed neighbours become one block of `a + b + overhead`.
pub fn coalesce() -> Checked {
    let mut mm = heap_rig()?;
    let a = mm.kmalloc(16).or_fail("alloc a failed")?;
    let b = mm.kmalloc(16).or_fail("alloc b failed")?;
    let guard = mm.kmalloc(16).or_fail("guard alloc failed")?;

    mm.kfree(a).or_fail("free a failed")?;
    mm.kfree(b).or_fail("free b failed")?;
    let (_, stats) = mm.check().or_fail("inconsistent")?;
    ensure_eq!(stats.free_blocks as u64, 2, "free blocks after merge");

    let c = mm.kmalloc(32).or_fail("merged alloc failed")?;
    ensure_eq!(c.as_u64(), a.as_u64(), "merged block address");
    ensure_eq!(
        mm.heap().capacity(c).or_fail("capacity")?,
        16 + 16 + BLOCK_OVERHEAD,
        "merged capacity"
    );

    mm.kfree(c).or_fail("free failed")?;
    mm.kfree(guard).or_fail("free failed")?;
    let (_, stats) = mm.check().or_fail("inconsistent")?;
    ensure_eq!(stats.free_blocks as u64, 1, "free blocks at end");
    Ok(())
}

pub fn double_free() -> Checked {
    let mut mm = heap_rig()?;
    let p = mm.kmalloc(64).or_fail("alloc failed")?;
    let guard = mm.kmalloc(64).or_fail("guard alloc failed")?;
    mm.kfree(p).or_fail("first free failed")?;

    let (_, before) = mm.check().or_fail("inconsistent")?;
    ensure_err!(mm.kfree(p), MemoryError::DoubleFree(p), "second free");
    let (_, after) = mm.check().or_fail("inconsistent after double free")?;
    ensure!(after == before, "double free changed the heap");

    // Also once the block has been absorbed by a neighbour.
    mm.kfree(guard).or_fail("guard free failed")?;
    ensure_err!(
        mm.kfree(guard),
        MemoryError::DoubleFree(guard),
        "free of absorbed block"
    );
    Ok(())
}

pub fn invalid_free() -> Checked {
    let mut mm = heap_rig()?;
    let p = mm.kmalloc(64).or_fail("alloc failed")?;
    let (_, before) = mm.check().or_fail("inconsistent")?;

    let arena = mm.heap().arena();
    let past_arena = arena.end().ok_or(Failure::new("arena end"))? + 0x20;
    for addr in [
        PhysicalAddress::zero(),
        PhysicalAddress::new(0xdead),
        // Kernel image, where the kernel's own stack and statics live.
        HEAP_RIG_IMAGE.base + 0x40,
        past_arena,
        p + 8,
    ] {
        ensure_err!(
            mm.kfree(addr),
            MemoryError::InvalidFree(addr),
            "invalid free accepted"
        );
    }
    let (_, after) = mm.check().or_fail("inconsistent after invalid free")?;
    ensure!(after == before, "invalid free changed the heap");
    mm.kfree(p).or_fail("free of valid block failed")?;
    Ok(())
}

/// Shrinking keeps the handle and returns the tail.
pub fn realloc_shrink() -> Checked {
    let mut mm = heap_rig()?;
    let p = mm.kmalloc(128).or_fail("alloc failed")?;
    fill(&mut mm, p, 0xA5)?;
    let (_, before) = mm.check().or_fail("inconsistent")?;

    let q = mm
        .krealloc(Some(p), 64)
        .or_fail("shrink failed")?
        .ok_or(Failure::new("shrink returned nothing"))?;
    ensure_eq!(q.as_u64(), p.as_u64(), "shrunk handle");
    ensure_eq!(mm.heap().capacity(q).or_fail("capacity")?, 64, "capacity");
    verify(&mm, q, 0xA5)?;

    let (_, after) = mm.check().or_fail("inconsistent")?;
    ensure_eq!(after.free_bytes, before.free_bytes + 64, "free bytes");
    Ok(())
}

/// Growing moves the data when it must and keeps the handle when it can.
pub fn realloc_expand() -> Checked {
    const MARKER: &[u8] = b"buddytest\0";

    let mut mm = heap_rig()?;
    let p = mm.kmalloc(64).or_fail("alloc failed")?;
    let guard = mm.kmalloc(16).or_fail("guard alloc failed")?;
    mm.heap_mut().write(p, 0, MARKER).or_fail("write failed")?;

    let q = mm
        .krealloc(Some(p), 512)
        .or_fail("expand failed")?
        .ok_or(Failure::new("expand returned nothing"))?;
    ensure!(q != p, "blocked block grew in place");
    ensure!(mm.heap().capacity(q).or_fail("capacity")? >= 512, "capacity");
    let mut buf = [0u8; MARKER.len()];
    mm.heap().read(q, 0, &mut buf).or_fail("read failed")?;
    ensure!(buf == *MARKER, "contents lost in move");
    ensure_err!(mm.kfree(p), MemoryError::DoubleFree(p), "old handle");

    // `q` now borders the trailing free block.
    let r = mm
        .krealloc(Some(q), 1024)
        .or_fail("in-place expand failed")?
        .ok_or(Failure::new("expand returned nothing"))?;
    ensure_eq!(r.as_u64(), q.as_u64(), "in-place handle");
    mm.heap().read(r, 0, &mut buf).or_fail("read failed")?;
    ensure!(buf == *MARKER, "contents lost in place");

    mm.kfree(r).or_fail("free failed")?;
    mm.kfree(guard).or_fail("free failed")?;
    mm.check().or_fail("inconsistent")?;
    Ok(())
}

/// `realloc(None, n)` is `alloc(n)`.
pub fn realloc_null() -> Checked {
    let mut mm = heap_rig()?;
    let p = mm
        .krealloc(None, 128)
        .or_fail("realloc from nothing failed")?
        .ok_or(Failure::new("realloc from nothing returned nothing"))?;
    ensure!(mm.heap().capacity(p).or_fail("capacity")? >= 128, "capacity");
    ensure!(
        matches!(mm.krealloc(None, 0), Ok(None)),
        "realloc of nothing to nothing"
    );
    mm.kfree(p).or_fail("free failed")?;
    Ok(())
}

/// `realloc(p, 0)` is `free(p)`.
pub fn realloc_zero() -> Checked {
    let mut mm = heap_rig()?;
    let p = mm.kmalloc(64).or_fail("alloc failed")?;
    ensure!(
        matches!(mm.krealloc(Some(p), 0), Ok(None)),
        "realloc to zero kept the block"
    );
    let (_, stats) = mm.check().or_fail("inconsistent")?;
    ensure_eq!(stats.live_blocks as u64, 0, "live blocks");
    ensure_err!(mm.kfree(p), MemoryError::DoubleFree(p), "free after realloc to zero");
    ensure_err!(
        mm.krealloc(Some(p), 16),
        MemoryError::InvalidFree(p),
        "realloc of freed block"
    );
    Ok(())
}

/// The heap grows to its limit, then reports exhaustion and recovers.
pub fn oom() -> Checked {
    let mut mm = heap_rig()?;
    let mut held = ArrayVec::<PhysicalAddress, MAX_SMALL_BLOCKS>::new();
    loop {
        match mm.kmalloc(32) {
            Ok(p) => hold(&mut held, p)?,
            Err(MemoryError::OutOfMemory) => break,
            Err(e) => return Err(Failure::error("exhaustion ended early", e)),
        }
    }

    let (_, stats) = mm.check().or_fail("inconsistent when full")?;
    ensure_eq!(stats.arena.len, HEAP_RIG_CONFIG.max_size, "arena at limit");
    ensure!(stats.largest_free < 32, "free block left unused");
    ensure!(
        held.len() as u64 * (32 + BLOCK_OVERHEAD) + 2 * (32 + BLOCK_OVERHEAD) > stats.arena.len,
        "too few allocations"
    );

    let last = held.pop().ok_or(Failure::new("nothing allocated"))?;
    mm.kfree(last).or_fail("free failed")?;
    let again = mm.kmalloc(32).or_fail("alloc after recovery failed")?;
    ensure_eq!(again.as_u64(), last.as_u64(), "recovered block");
    hold(&mut held, again)?;

    for p in held.iter() {
        mm.kfree(*p).or_fail("free failed")?;
    }
    let (_, stats) = mm.check().or_fail("inconsistent after cleanup")?;
    ensure_eq!(stats.free_blocks as u64, 1, "free blocks after cleanup");
    Ok(())
}

/// Tagged blocks survive frees of their neighbours and a run of random
/// alloc, realloc and free churn, and never overlap.
pub fn stress_pattern() -> Checked {
    const SLOTS: usize = 10;

    let mut mm = heap_rig()?;
    let mut blocks = [None::<(PhysicalAddress, u8)>; SLOTS];
    for (i, slot) in blocks.iter_mut().enumerate() {
        let p = mm.kmalloc(32).or_fail("alloc failed")?;
        #[allow(clippy::cast_possible_truncation)]
        let tag = i as u8 + 1;
        fill(&mut mm, p, tag)?;
        *slot = Some((p, tag));
    }
    for slot in blocks.iter_mut().step_by(2) {
        if let Some((p, _)) = slot.take() {
            mm.kfree(p).or_fail("free of even block failed")?;
        }
    }

    let mid = mm.kmalloc(64).or_fail("alloc into fragmented heap failed")?;
    fill(&mut mm, mid, 0xEE)?;
    for (p, tag) in blocks.iter().flatten() {
        verify(&mm, *p, *tag)?;
    }
    mm.kfree(mid).or_fail("free failed")?;

    let mut rng = XorShift::new(0x9E37_79B9_7F4A_7C15);
    for round in 0..400u32 {
        #[allow(clippy::cast_possible_truncation)]
        let i = rng.below(SLOTS as u64) as usize;
        match blocks[i].take() {
            Some((p, tag)) if rng.below(3) == 0 => {
                verify(&mm, p, tag)?;
                let old = mm.heap().capacity(p).or_fail("capacity of live block")?;
                let size = 1 + rng.below(400);
                let q = match mm.krealloc(Some(p), size) {
                    Ok(Some(q)) => q,
                    Ok(None) => return Err(Failure::new("realloc returned no block")),
                    Err(MemoryError::OutOfMemory) => {
                        verify(&mm, p, tag)?;
                        blocks[i] = Some((p, tag));
                        continue;
                    }
                    Err(e) => return Err(Failure::error("realloc failed", e)),
                };
                verify_prefix(&mm, q, old.min(size), tag)?;
                #[allow(clippy::cast_possible_truncation)]
                let tag = (round % 250) as u8 + 1;
                fill(&mut mm, q, tag)?;
                blocks[i] = Some((q, tag));
            }
            Some((p, tag)) => {
                verify(&mm, p, tag)?;
                mm.kfree(p).or_fail("free failed")?;
            }
            None => {
                let size = 1 + rng.below(400);
                let p = match mm.kmalloc(size) {
                    Ok(p) => p,
                    Err(MemoryError::OutOfMemory) => continue,
                    Err(e) => return Err(Failure::error("alloc failed", e)),
                };
                #[allow(clippy::cast_possible_truncation)]
                let tag = (round % 250) as u8 + 1;
                fill(&mut mm, p, tag)?;
                blocks[i] = Some((p, tag));
            }
        }
        if round % 16 == 0 {
            mm.check().or_fail("inconsistent during churn")?;
        }
    }

    for (p, tag) in blocks.iter().flatten() {
        verify(&mm, *p, *tag)?;
        mm.kfree(*p).or_fail("free failed")?;
    }
    let (_, stats) = mm.check().or_fail("inconsistent after churn")?;
    ensure_eq!(stats.live_blocks as u64, 0, "live blocks");
    ensure_eq!(stats.free_blocks as u64, 1, "free blocks");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenarios_pass() {
        for scenario in [
            init,
            alloc_small,
            alloc_exact,
            split,
            free_reuse,
            coalesce,
            double_free,
            invalid_free,
            realloc_shrink,
            realloc_expand,
            realloc_null,
            realloc_zero,
            oom,
            stress_pattern,
        ] {
            assert_eq!(scenario(), Ok(()));
        }
    }

    #[test]
    fn verify_spots_a_clobbered_byte() {
        let mut mm = heap_rig().unwrap();
        let p = mm.kmalloc(40).unwrap();
        fill(&mut mm, p, 7).unwrap();
        mm.heap_mut().write(p, 39, &[8]).unwrap();
        assert_eq!(verify(&mm, p, 7), Err(Failure::new("payload clobbered")));
    }

    #[test]
    fn realloc_keeps_the_common_prefix() {
        let mut mm = heap_rig().unwrap();
        let p = mm.kmalloc(48).unwrap();
        fill(&mut mm, p, 3).unwrap();
        let blocker = mm.kmalloc(16).unwrap();

        let q = mm.krealloc(Some(p), 300).unwrap().unwrap();
        assert_ne!(q, p, "blocked block should move");
        assert_eq!(verify_prefix(&mm, q, 48, 3), Ok(()));

        let r = mm.krealloc(Some(q), 20).unwrap().unwrap();
        assert_eq!(verify_prefix(&mm, r, 20, 3), Ok(()));
        mm.kfree(r).unwrap();
        mm.kfree(blocker).unwrap();
        mm.check().unwrap();
    }
}
