//! # Physical Memory Access
//!
//! The heap keeps its block headers inside the memory it manages, so it needs
//! to read and write physical memory. [`PhysMemory`] abstracts how that memory
//! is reached:
//!
//! - **Kernel**: [`HhdmPhysMemory`] goes through the higher-half direct map,
//!   where every physical address is visible at `HHDM_BASE + pa`.
//! - **Tests and self-tests**: [`RamImage`] is a plain byte buffer standing in
//!   for a window of physical memory.
//!
//! Every accessor is bounds-checked and reports [`MemoryError::Unbacked`]
//! instead of touching memory outside the window, so allocator code built on
//! top of this trait contains no pointer arithmetic of its own.

use crate::{MemoryError, MemoryResult};
use core::ops::Range;
use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};

/// Byte-level access to physical memory.
pub trait PhysMemory {
    /// Copy `buf.len()` bytes starting at `addr` into `buf`.
    ///
    /// # Errors
    /// [`MemoryError::Unbacked`] if any byte of the range is not accessible.
    fn read(&self, addr: PhysicalAddress, buf: &mut [u8]) -> MemoryResult<()>;

    /// Copy `data` to memory starting at `addr`.
    ///
    /// # Errors
    /// [`MemoryError::Unbacked`] if any byte of the range is not accessible.
    fn write(&mut self, addr: PhysicalAddress, data: &[u8]) -> MemoryResult<()>;

    /// Set `len` bytes starting at `addr` to `byte`.
    ///
    /// # Errors
    /// [`MemoryError::Unbacked`] if any byte of the range is not accessible.
    fn fill(&mut self, addr: PhysicalAddress, len: u64, byte: u8) -> MemoryResult<()>;

    /// Copy `len` bytes from `src` to `dst`; the ranges may overlap.
    ///
    /// # Errors
    /// [`MemoryError::Unbacked`] if any byte of either range is not accessible.
    fn copy_within(
        &mut self,
        src: PhysicalAddress,
        dst: PhysicalAddress,
        len: u64,
    ) -> MemoryResult<()>;
}

impl<T: PhysMemory + ?Sized> PhysMemory for &mut T {
    fn read(&self, addr: PhysicalAddress, buf: &mut [u8]) -> MemoryResult<()> {
        (**self).read(addr, buf)
    }

    fn write(&mut self, addr: PhysicalAddress, data: &[u8]) -> MemoryResult<()> {
        (**self).write(addr, data)
    }

    fn fill(&mut self, addr: PhysicalAddress, len: u64, byte: u8) -> MemoryResult<()> {
        (**self).fill(addr, len, byte)
    }

    fn copy_within(
        &mut self,
        src: PhysicalAddress,
        dst: PhysicalAddress,
        len: u64,
    ) -> MemoryResult<()> {
        (**self).copy_within(src, dst, len)
    }
}

/// A byte buffer standing in for the physical memory window
/// `[base, base + bytes.len())`.
///
/// ```rust
/// # use kernel_alloc::phys_memory::{PhysMemory, RamImage};
/// # use kernel_memory_addresses::PhysicalAddress;
/// let mut ram = RamImage::new(PhysicalAddress::new(0x1000), [0u8; 64]);
/// ram.write(PhysicalAddress::new(0x1010), b"kmm").unwrap();
/// let mut buf = [0u8; 3];
/// ram.read(PhysicalAddress::new(0x1010), &mut buf).unwrap();
/// assert_eq!(&buf, b"kmm");
/// assert!(ram.read(PhysicalAddress::new(0x0FFF), &mut buf).is_err());
/// ```
pub struct RamImage<B> {
    base: PhysicalAddress,
    bytes: B,
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> RamImage<B> {
    pub const fn new(base: PhysicalAddress, bytes: B) -> Self {
        Self { base, bytes }
    }

    /// The physical range this image stands in for.
    pub fn range(&self) -> PhysicalRange {
        PhysicalRange::new(self.base, self.bytes.as_ref().len() as u64)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_ref()
    }

    pub fn into_inner(self) -> B {
        self.bytes
    }

    /// Translate a physical range into an index range of the buffer.
    fn window(&self, addr: PhysicalAddress, len: u64) -> MemoryResult<Range<usize>> {
        let unbacked = MemoryError::Unbacked(PhysicalRange::new(addr, len));
        let start = addr.offset_from(self.base).ok_or(unbacked)?;
        let end = start.checked_add(len).ok_or(unbacked)?;
        if end > self.bytes.as_ref().len() as u64 {
            return Err(unbacked);
        }
        let start = usize::try_from(start).map_err(|_| unbacked)?;
        let end = usize::try_from(end).map_err(|_| unbacked)?;
        Ok(start..end)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> PhysMemory for RamImage<B> {
    fn read(&self, addr: PhysicalAddress, buf: &mut [u8]) -> MemoryResult<()> {
        let window = self.window(addr, buf.len() as u64)?;
        buf.copy_from_slice(&self.bytes.as_ref()[window]);
        Ok(())
    }

    fn write(&mut self, addr: PhysicalAddress, data: &[u8]) -> MemoryResult<()> {
        let window = self.window(addr, data.len() as u64)?;
        self.bytes.as_mut()[window].copy_from_slice(data);
        Ok(())
    }

    fn fill(&mut self, addr: PhysicalAddress, len: u64, byte: u8) -> MemoryResult<()> {
        let window = self.window(addr, len)?;
        self.bytes.as_mut()[window].fill(byte);
        Ok(())
    }

    fn copy_within(
        &mut self,
        src: PhysicalAddress,
        dst: PhysicalAddress,
        len: u64,
    ) -> MemoryResult<()> {
        let from = self.window(src, len)?;
        let to = self.window(dst, len)?;
        self.bytes.as_mut().copy_within(from, to.start);
        Ok(())
    }
}

/// [`PhysMemory`] for kernels with a higher-half direct map (HHDM).
///
/// Physical address `pa` is reached at virtual address `HHDM_BASE + pa`.
/// Only the address computation is checked; whether the target is mapped
/// is the constructor's contract.
pub struct HhdmPhysMemory {
    _private: (),
}

impl HhdmPhysMemory {
    /// # Safety
    /// - The HHDM mapping must be present and cover every physical range the
    ///   allocator will touch, writable, for the lifetime of the value.
    /// - No other code may hold references into those ranges while the
    ///   allocator accesses them.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }

    fn virt(addr: PhysicalAddress, len: u64) -> MemoryResult<*mut u8> {
        let unbacked = MemoryError::Unbacked(PhysicalRange::new(addr, len));
        let va = HHDM_BASE.checked_add(addr.as_u64()).ok_or(unbacked)?;
        va.checked_add(len).ok_or(unbacked)?;
        Ok(va as *mut u8)
    }
}

#[allow(unsafe_code)]
impl PhysMemory for HhdmPhysMemory {
    fn read(&self, addr: PhysicalAddress, buf: &mut [u8]) -> MemoryResult<()> {
        let va = Self::virt(addr, buf.len() as u64)?;
        // SAFETY: the constructor guarantees the HHDM covers the range.
        unsafe { core::ptr::copy_nonoverlapping(va, buf.as_mut_ptr(), buf.len()) };
        Ok(())
    }

    fn write(&mut self, addr: PhysicalAddress, data: &[u8]) -> MemoryResult<()> {
        let va = Self::virt(addr, data.len() as u64)?;
        // SAFETY: the constructor guarantees the HHDM covers the range.
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), va, data.len()) };
        Ok(())
    }

    fn fill(&mut self, addr: PhysicalAddress, len: u64, byte: u8) -> MemoryResult<()> {
        let va = Self::virt(addr, len)?;
        let count = usize::try_from(len)
            .map_err(|_| MemoryError::Unbacked(PhysicalRange::new(addr, len)))?;
        // SAFETY: the constructor guarantees the HHDM covers the range.
        unsafe { core::ptr::write_bytes(va, byte, count) };
        Ok(())
    }

    fn copy_within(
        &mut self,
        src: PhysicalAddress,
        dst: PhysicalAddress,
        len: u64,
    ) -> MemoryResult<()> {
        let from = Self::virt(src, len)?;
        let to = Self::virt(dst, len)?;
        let count = usize::try_from(len)
            .map_err(|_| MemoryError::Unbacked(PhysicalRange::new(src, len)))?;
        // SAFETY: the constructor guarantees the HHDM covers both ranges;
        // `copy` tolerates overlap.
        unsafe { core::ptr::copy(from, to, count) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_rejects_ranges_outside_window() {
        let mut ram = RamImage::new(PhysicalAddress::new(0x1000), vec![0u8; 0x100]);
        assert!(ram.write(PhysicalAddress::new(0x10F8), &[1; 8]).is_ok());
        assert_eq!(
            ram.write(PhysicalAddress::new(0x10F9), &[1; 8]),
            Err(MemoryError::Unbacked(PhysicalRange::new(
                PhysicalAddress::new(0x10F9),
                8
            )))
        );
        assert!(ram.fill(PhysicalAddress::new(0x0F00), 1, 0).is_err());
        assert!(ram.fill(PhysicalAddress::new(u64::MAX), 2, 0).is_err());
    }

    #[test]
    fn copy_within_handles_overlap() {
        let mut ram = RamImage::new(PhysicalAddress::zero(), [0u8; 16]);
        ram.write(PhysicalAddress::zero(), &[1, 2, 3, 4, 5, 6]).unwrap();
        ram.copy_within(PhysicalAddress::zero(), PhysicalAddress::new(2), 6)
            .unwrap();
        assert_eq!(&ram.as_bytes()[..8], &[1, 2, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn hhdm_rejects_addresses_past_the_direct_map() {
        // Any physical address whose direct-map alias would wrap the address
        // space is refused before memory is touched.
        #[allow(unsafe_code)]
        let mut mem = unsafe { HhdmPhysMemory::new() };
        let wraps = PhysicalAddress::new(u64::MAX - HHDM_BASE + 1);
        let mut buf = [0u8; 4];
        assert_eq!(
            mem.read(wraps, &mut buf),
            Err(MemoryError::Unbacked(PhysicalRange::new(wraps, 4)))
        );
        let tail = PhysicalAddress::new(u64::MAX - HHDM_BASE - 1);
        assert_eq!(
            mem.fill(tail, 4, 0),
            Err(MemoryError::Unbacked(PhysicalRange::new(tail, 4)))
        );
        assert!(mem.copy_within(tail, wraps, 1).is_err());
    }

    #[test]
    fn forwarding_through_mut_reference() {
        fn poke<M: PhysMemory>(mut mem: M) {
            mem.fill(PhysicalAddress::new(4), 4, 0xAB).unwrap();
        }
        let mut ram = RamImage::new(PhysicalAddress::zero(), [0u8; 8]);
        poke(&mut ram);
        assert_eq!(ram.as_bytes(), &[0, 0, 0, 0, 0xAB, 0xAB, 0xAB, 0xAB]);
    }
}
