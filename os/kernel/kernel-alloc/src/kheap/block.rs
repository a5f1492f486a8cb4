use crate::phys_memory::PhysMemory;
use crate::MemoryResult;
use bitfield_struct::bitfield;
use kernel_info::memory::HEAP_MIN_SPLIT;
use kernel_memory_addresses::PhysicalAddress;

/// Bytes in front of every payload.
pub const HEADER_SIZE: u64 = 32;

/// Bytes behind every payload.
pub const FOOTER_SIZE: u64 = 16;

/// Per-block bookkeeping cost.
pub const BLOCK_OVERHEAD: u64 = HEADER_SIZE + FOOTER_SIZE;

/// Minimum surplus worth splitting into a separate free block.
pub const SPLIT_THRESHOLD: u64 = BLOCK_OVERHEAD + HEAP_MIN_SPLIT;

/// Tag of every live block header and footer.
pub const BLOCK_MAGIC: u32 = 0x4B48_4250;

/// Tag written over a header whose block was absorbed by a neighbour.
pub const RETIRED_MAGIC: u32 = 0x4B48_5244;

const NIL: u64 = u64::MAX;

/// Flag word shared by header and footer.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct BlockFlags {
    /// Payload is owned by a caller.
    pub allocated: bool,
    #[bits(31)]
    __reserved: u32,
}

/// Block header, as laid out at the start of a block:
///
/// ```text
/// 0       4       8               16              24              32
/// +-------+-------+---------------+---------------+---------------+
/// | magic | flags |     size      |   prev_free   |   next_free   |
/// +-------+-------+---------------+---------------+---------------+
/// ```
///
/// All fields little-endian; `u64::MAX` encodes a missing link.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub flags: BlockFlags,
    /// Payload capacity in bytes.
    pub size: u64,
    pub prev_free: Option<PhysicalAddress>,
    pub next_free: Option<PhysicalAddress>,
}

impl Header {
    pub const fn free(
        size: u64,
        prev_free: Option<PhysicalAddress>,
        next_free: Option<PhysicalAddress>,
    ) -> Self {
        Self {
            magic: BLOCK_MAGIC,
            flags: BlockFlags::new(),
            size,
            prev_free,
            next_free,
        }
    }

    pub const fn allocated(size: u64) -> Self {
        Self {
            magic: BLOCK_MAGIC,
            flags: BlockFlags::new().with_allocated(true),
            size,
            prev_free: None,
            next_free: None,
        }
    }

    pub const fn is_allocated(&self) -> bool {
        self.flags.allocated()
    }

    pub const fn footer(&self) -> Footer {
        Footer {
            size: self.size,
            magic: self.magic,
            flags: self.flags,
        }
    }

    fn to_bytes(self) -> [u8; HEADER_SIZE as usize] {
        let mut b = [0u8; HEADER_SIZE as usize];
        b[0..4].copy_from_slice(&self.magic.to_le_bytes());
        b[4..8].copy_from_slice(&self.flags.into_bits().to_le_bytes());
        b[8..16].copy_from_slice(&self.size.to_le_bytes());
        b[16..24].copy_from_slice(&encode_link(self.prev_free).to_le_bytes());
        b[24..32].copy_from_slice(&encode_link(self.next_free).to_le_bytes());
        b
    }

    fn from_bytes(b: &[u8; HEADER_SIZE as usize]) -> Self {
        Self {
            magic: le_u32(&b[0..4]),
            flags: BlockFlags::from_bits(le_u32(&b[4..8])),
            size: le_u64(&b[8..16]),
            prev_free: decode_link(le_u64(&b[16..24])),
            next_free: decode_link(le_u64(&b[24..32])),
        }
    }
}

/// Block footer; mirrors the header so the previous block can be found from
/// the next one.
///
/// ```text
/// 0               8       12      16
/// +---------------+-------+-------+
/// |     size      | magic | flags |
/// +---------------+-------+-------+
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Footer {
    pub size: u64,
    pub magic: u32,
    pub flags: BlockFlags,
}

impl Footer {
    fn to_bytes(self) -> [u8; FOOTER_SIZE as usize] {
        let mut b = [0u8; FOOTER_SIZE as usize];
        b[0..8].copy_from_slice(&self.size.to_le_bytes());
        b[8..12].copy_from_slice(&self.magic.to_le_bytes());
        b[12..16].copy_from_slice(&self.flags.into_bits().to_le_bytes());
        b
    }

    fn from_bytes(b: &[u8; FOOTER_SIZE as usize]) -> Self {
        Self {
            size: le_u64(&b[0..8]),
            magic: le_u32(&b[8..12]),
            flags: BlockFlags::from_bits(le_u32(&b[12..16])),
        }
    }
}

/// Payload handle of the block whose header is at `header`.
pub fn payload_of(header: PhysicalAddress) -> PhysicalAddress {
    header + HEADER_SIZE
}

/// Footer address of a block with the given header and capacity.
pub fn footer_of(header: PhysicalAddress, size: u64) -> PhysicalAddress {
    header + HEADER_SIZE + size
}

/// Header address of the block following one with the given capacity.
pub fn next_of(header: PhysicalAddress, size: u64) -> PhysicalAddress {
    header + BLOCK_OVERHEAD + size
}

pub fn read_header<M: PhysMemory>(mem: &M, at: PhysicalAddress) -> MemoryResult<Header> {
    let mut b = [0u8; HEADER_SIZE as usize];
    mem.read(at, &mut b)?;
    Ok(Header::from_bytes(&b))
}

pub fn write_header<M: PhysMemory>(
    mem: &mut M,
    at: PhysicalAddress,
    header: &Header,
) -> MemoryResult<()> {
    mem.write(at, &header.to_bytes())
}

pub fn read_footer<M: PhysMemory>(mem: &M, at: PhysicalAddress) -> MemoryResult<Footer> {
    let mut b = [0u8; FOOTER_SIZE as usize];
    mem.read(at, &mut b)?;
    Ok(Footer::from_bytes(&b))
}

pub fn write_footer<M: PhysMemory>(
    mem: &mut M,
    at: PhysicalAddress,
    footer: &Footer,
) -> MemoryResult<()> {
    mem.write(at, &footer.to_bytes())
}

/// Overwrite only the tag of the header at `at`.
pub fn retire<M: PhysMemory>(mem: &mut M, at: PhysicalAddress) -> MemoryResult<()> {
    mem.write(at, &RETIRED_MAGIC.to_le_bytes())
}

const fn encode_link(link: Option<PhysicalAddress>) -> u64 {
    match link {
        Some(addr) => addr.as_u64(),
        None => NIL,
    }
}

const fn decode_link(raw: u64) -> Option<PhysicalAddress> {
    if raw == NIL {
        None
    } else {
        Some(PhysicalAddress::new(raw))
    }
}

fn le_u32(b: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(b);
    u32::from_le_bytes(raw)
}

fn le_u64(b: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(b);
    u64::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys_memory::RamImage;

    #[test]
    fn header_layout_is_stable() {
        let mut ram = RamImage::new(PhysicalAddress::zero(), [0u8; 64]);
        let header = Header::free(0x40, None, Some(PhysicalAddress::new(0x1230)));
        write_header(&mut ram, PhysicalAddress::new(16), &header).unwrap();

        let raw = &ram.as_bytes()[16..48];
        assert_eq!(&raw[0..4], &BLOCK_MAGIC.to_le_bytes());
        assert_eq!(&raw[4..8], &[0, 0, 0, 0]);
        assert_eq!(&raw[8..16], &0x40u64.to_le_bytes());
        assert_eq!(&raw[16..24], &[0xFF; 8]);
        assert_eq!(&raw[24..32], &0x1230u64.to_le_bytes());

        assert_eq!(read_header(&ram, PhysicalAddress::new(16)).unwrap(), header);
    }

    #[test]
    fn footer_mirrors_header() {
        let mut ram = RamImage::new(PhysicalAddress::zero(), [0u8; 16]);
        let header = Header::allocated(0x80);
        write_footer(&mut ram, PhysicalAddress::zero(), &header.footer()).unwrap();
        let footer = read_footer(&ram, PhysicalAddress::zero()).unwrap();
        assert!(footer.flags.allocated());
        assert_eq!(footer.size, 0x80);
        assert_eq!(footer.magic, BLOCK_MAGIC);
        assert_eq!(ram.as_bytes()[12], 1);
    }

    #[test]
    fn retire_rewrites_only_the_tag() {
        let mut ram = RamImage::new(PhysicalAddress::zero(), [0u8; 32]);
        let header = Header::allocated(0x30);
        write_header(&mut ram, PhysicalAddress::zero(), &header).unwrap();
        retire(&mut ram, PhysicalAddress::zero()).unwrap();
        let retired = read_header(&ram, PhysicalAddress::zero()).unwrap();
        assert_eq!(retired.magic, RETIRED_MAGIC);
        assert_eq!(retired.size, 0x30);
    }
}
