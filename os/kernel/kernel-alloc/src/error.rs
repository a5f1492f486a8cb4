use kernel_memory_addresses::{AlignmentError, PhysicalAddress, PhysicalRange};

/// Result type of every fallible memory-manager operation.
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Failure taxonomy shared by the physical memory manager and the heap.
///
/// All of these are expected, recoverable outcomes. An operation that returns
/// one of them has left the allocator state exactly as it found it, with the
/// exception of [`MemoryError::CorruptionDetected`], which reports state that
/// was already damaged before the call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("double free of {0}")]
    DoubleFree(PhysicalAddress),
    #[error("invalid free of {0}")]
    InvalidFree(PhysicalAddress),
    #[error("{0:#x} violates the required alignment")]
    AlignmentViolation(u64),
    #[error("corrupted allocator metadata at {0}")]
    CorruptionDetected(PhysicalAddress),
    #[error("request of {0} bytes cannot be represented")]
    SizeOverflow(u64),
    #[error("zero-sized request")]
    ZeroSize,
    #[error("reserved range {0} overlaps another reservation")]
    OverlappingReservation(PhysicalRange),
    #[error("reserved range {0} lies outside physical memory")]
    ReservationOutOfBounds(PhysicalRange),
    #[error("region table is full")]
    RegionTableFull,
    #[error("access of {len} bytes at offset {offset} overruns the allocation at {ptr}")]
    PayloadOverrun {
        ptr: PhysicalAddress,
        offset: u64,
        len: u64,
    },
    #[error("physical range {0} is not backed by memory")]
    Unbacked(PhysicalRange),
}

impl From<AlignmentError> for MemoryError {
    fn from(value: AlignmentError) -> Self {
        Self::AlignmentViolation(value.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_address() {
        let err = MemoryError::DoubleFree(PhysicalAddress::new(0x2040));
        assert_eq!(err.to_string(), "double free of 0x0000000000002040");
        let err: MemoryError = AlignmentError(24).into();
        assert_eq!(err.to_string(), "0x18 violates the required alignment");
    }
}
