//! Physical memory manager scenarios.

use crate::Failure;
use crate::check::{Checked, OrFail};
use crate::rig::{KMM_RIG_FREE_FRAMES, KMM_RIG_IMAGE, KMM_RIG_TOTAL, hold, kmm_rig};
use kernel_alloc::{Kmm, MemoryError};
use kernel_info::memory::{FRAME_ALIGN, FRAME_SIZE, KMM_MAX_REGIONS, LOW_MEMORY_END};
use kernel_memory_addresses::PhysicalAddress;
use planck_noalloc::vec::ArrayVec;

/// Allocate single frames until the kmm runs out.
fn drain(kmm: &mut Kmm, held: &mut ArrayVec<PhysicalAddress, KMM_MAX_REGIONS>) -> Checked {
    loop {
        match kmm.frame_alloc() {
            Ok(frame) => hold(held, frame)?,
            Err(MemoryError::OutOfMemory) => return Ok(()),
            Err(e) => return Err(Failure::error("exhaustion ended early", e)),
        }
    }
}

fn free_all(kmm: &mut Kmm, held: &[PhysicalAddress]) -> Checked {
    for frame in held {
        kmm.frame_free(*frame).or_fail("free of held frame rejected")?;
    }
    Ok(())
}

pub fn init_total() -> Checked {
    let kmm = kmm_rig()?;
    let stats = kmm.check().or_fail("inconsistent after init")?;
    ensure!(stats.total_frames() > 0, "no frames");
    ensure!(
        stats.used_frames() <= stats.total_frames(),
        "more frames used than exist"
    );
    ensure_eq!(stats.total_frames(), KMM_RIG_TOTAL / FRAME_SIZE, "total frames");
    ensure_eq!(
        stats.reserved,
        LOW_MEMORY_END + KMM_RIG_IMAGE.len,
        "reserved bytes"
    );
    ensure_eq!(stats.free_frames(), KMM_RIG_FREE_FRAMES, "free frames");
    ensure_eq!(stats.allocated, 0, "allocated bytes");
    Ok(())
}

/// Reserved memory is neither freeable nor handed out.
pub fn reserved() -> Checked {
    let mut kmm = kmm_rig()?;
    let before = kmm.stats();

    let null = PhysicalAddress::zero();
    ensure_err!(
        kmm.frame_free(null),
        MemoryError::InvalidFree(null),
        "freeing frame 0"
    );
    ensure_err!(
        kmm.frame_free(KMM_RIG_IMAGE.base),
        MemoryError::InvalidFree(KMM_RIG_IMAGE.base),
        "freeing the kernel image"
    );
    ensure!(kmm.stats() == before, "rejected free changed the kmm");

    let frame = kmm.frame_alloc().or_fail("alloc failed")?;
    ensure!(
        frame.as_u64() >= LOW_MEMORY_END,
        "frame handed out from low memory"
    );
    ensure!(!KMM_RIG_IMAGE.contains(frame), "frame inside the kernel image");
    Ok(())
}

/// Every free frame can be allocated, and each one is counted.
pub fn alloc_all() -> Checked {
    let mut kmm = kmm_rig()?;
    let before = kmm.used_frames();

    let mut held = ArrayVec::new();
    drain(&mut kmm, &mut held)?;
    ensure_eq!(held.len() as u64, KMM_RIG_FREE_FRAMES, "frames allocated");
    ensure_eq!(
        kmm.used_frames(),
        before + held.len() as u64,
        "used after alloc"
    );
    ensure!(
        held.iter().all(|f| f.as_u64() >= LOW_MEMORY_END && !KMM_RIG_IMAGE.contains(*f)),
        "reserved frame handed out"
    );

    free_all(&mut kmm, held.as_slice())?;
    ensure_eq!(kmm.used_frames(), before, "used after free");
    kmm.check().or_fail("inconsistent after free")?;
    Ok(())
}

pub fn alloc_align() -> Checked {
    let mut kmm = kmm_rig()?;
    let frame = kmm.frame_alloc().or_fail("alloc failed")?;
    ensure!(frame.is_aligned(FRAME_ALIGN), "frame not aligned");

    let big = kmm.alloc(FRAME_SIZE, 0x1_0000).or_fail("aligned alloc failed")?;
    ensure_eq!(big.as_u64() % 0x1_0000, 0, "64 KiB alignment");
    ensure_err!(
        kmm.alloc(FRAME_SIZE, 3),
        MemoryError::AlignmentViolation(3),
        "non-power-of-two alignment"
    );

    kmm.free(big).or_fail("free failed")?;
    kmm.frame_free(frame).or_fail("free failed")?;
    kmm.check().or_fail("inconsistent")?;
    Ok(())
}

/// A freed frame is the next one handed out.
pub fn reuse() -> Checked {
    let mut kmm = kmm_rig()?;
    let first = kmm.frame_alloc().or_fail("alloc failed")?;
    kmm.frame_free(first).or_fail("free failed")?;
    let second = kmm.frame_alloc().or_fail("realloc failed")?;
    ensure_eq!(second.as_u64(), first.as_u64(), "reused frame");
    Ok(())
}

/// A second free is reported and changes nothing.
pub fn double_free() -> Checked {
    let mut kmm = kmm_rig()?;
    let frame = kmm.frame_alloc().or_fail("alloc failed")?;
    kmm.frame_free(frame).or_fail("first free failed")?;

    let before = kmm.stats();
    ensure_err!(
        kmm.frame_free(frame),
        MemoryError::DoubleFree(frame),
        "second free"
    );
    ensure!(kmm.stats() == before, "double free changed the kmm");

    let again = kmm.frame_alloc().or_fail("alloc after double free failed")?;
    ensure_eq!(again.as_u64(), frame.as_u64(), "frame after double free");
    kmm.check().or_fail("inconsistent")?;
    Ok(())
}

/// Nonsense addresses are rejected without touching the table.
pub fn free_invalid() -> Checked {
    let mut kmm = kmm_rig()?;
    let held = kmm.frame_alloc().or_fail("alloc failed")?;
    let before = kmm.stats();

    for addr in [
        PhysicalAddress::zero(),
        PhysicalAddress::new(0xdead),
        PhysicalAddress::new(KMM_RIG_TOTAL),
        PhysicalAddress::new(u64::MAX & !(FRAME_SIZE - 1)),
    ] {
        ensure_err!(
            kmm.frame_free(addr),
            MemoryError::InvalidFree(addr),
            "invalid free accepted"
        );
    }
    ensure!(kmm.stats() == before, "invalid free changed the kmm");
    kmm.frame_free(held).or_fail("free of valid frame failed")?;
    Ok(())
}

/// Balanced alloc/free sequences leave the counts where they were.
pub fn consistency() -> Checked {
    let mut kmm = kmm_rig()?;
    let initial = kmm.check().or_fail("inconsistent after init")?;

    let mut held = ArrayVec::<PhysicalAddress, 10>::new();
    for _ in 0..10 {
        hold(&mut held, kmm.frame_alloc().or_fail("alloc failed")?)?;
    }
    ensure_eq!(
        kmm.used_frames(),
        initial.used_frames() + 10,
        "used after alloc"
    );
    kmm.check().or_fail("inconsistent while allocated")?;

    free_all(&mut kmm, held.as_slice())?;
    let after = kmm.check().or_fail("inconsistent after free")?;
    ensure_eq!(after.used_frames(), initial.used_frames(), "used after free");
    ensure_eq!(after.regions as u64, initial.regions as u64, "regions after free");
    Ok(())
}

/// Holes left by freeing every other frame are refilled first.
pub fn pattern() -> Checked {
    let mut kmm = kmm_rig()?;
    let initial = kmm.used_frames();

    let mut held = ArrayVec::<PhysicalAddress, 32>::new();
    for _ in 0..32 {
        hold(&mut held, kmm.frame_alloc().or_fail("alloc failed")?)?;
    }
    let mut holes = ArrayVec::<PhysicalAddress, 16>::new();
    for frame in held.iter().step_by(2) {
        kmm.frame_free(*frame).or_fail("free of even frame failed")?;
        hold(&mut holes, *frame)?;
    }

    let mut refilled = ArrayVec::<PhysicalAddress, 16>::new();
    for _ in 0..16 {
        let frame = kmm.frame_alloc().or_fail("refill failed")?;
        ensure!(holes.iter().any(|h| *h == frame), "refill skipped a hole");
        ensure!(refilled.iter().all(|r| *r != frame), "frame handed out twice");
        hold(&mut refilled, frame)?;
    }
    ensure_eq!(kmm.used_frames(), initial + 32, "used after refill");

    for (i, frame) in held.iter().enumerate() {
        if i % 2 == 1 {
            kmm.frame_free(*frame).or_fail("free of odd frame failed")?;
        }
    }
    free_all(&mut kmm, refilled.as_slice())?;
    ensure_eq!(kmm.used_frames(), initial, "used after cleanup");
    kmm.check().or_fail("inconsistent")?;
    Ok(())
}

/// Exhaustion is reported, and one free is enough to recover.
pub fn oom() -> Checked {
    let mut kmm = kmm_rig()?;
    let mut held = ArrayVec::new();
    drain(&mut kmm, &mut held)?;
    ensure!(!held.is_empty(), "nothing allocated");

    let before = kmm.stats();
    ensure_err!(kmm.frame_alloc(), MemoryError::OutOfMemory, "alloc when full");
    ensure_err!(
        kmm.alloc(2 * FRAME_SIZE, FRAME_SIZE),
        MemoryError::OutOfMemory,
        "multi-frame alloc when full"
    );
    ensure!(kmm.stats() == before, "failed alloc changed the kmm");

    let last = held.pop().ok_or(Failure::new("nothing allocated"))?;
    kmm.frame_free(last).or_fail("free failed")?;
    let again = kmm.frame_alloc().or_fail("alloc after recovery failed")?;
    ensure_eq!(again.as_u64(), last.as_u64(), "recovered frame");

    hold(&mut held, again)?;
    free_all(&mut kmm, held.as_slice())?;
    kmm.check().or_fail("inconsistent")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rig_fits_the_region_table() {
        // One region per allocated frame plus the two reservations.
        assert!(KMM_RIG_FREE_FRAMES + 2 <= KMM_MAX_REGIONS as u64);
    }

    #[test]
    fn scenarios_pass() {
        for scenario in [
            init_total,
            reserved,
            alloc_all,
            alloc_align,
            reuse,
            double_free,
            free_invalid,
            consistency,
            pattern,
            oom,
        ] {
            assert_eq!(scenario(), Ok(()));
        }
    }
}
