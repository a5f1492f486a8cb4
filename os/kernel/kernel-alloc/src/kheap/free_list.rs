//! Free-list maintenance.
//!
//! The list is threaded through the `prev_free`/`next_free` fields of free
//! block headers and kept in **address order**, so a freed block's list
//! position is either inherited from the neighbour it absorbs or found by a
//! single ordered walk. Link updates touch headers only; footers carry no
//! links.

use super::Kheap;
use super::block::{read_header, write_header};
use crate::phys_memory::PhysMemory;
use crate::{MemoryError, MemoryResult};
use kernel_memory_addresses::PhysicalAddress;

impl<M: PhysMemory> Kheap<M> {
    /// Detach a list entry with the given links, splicing `replacement` into
    /// its position, or joining its neighbours when there is none.
    pub(super) fn relink(
        &mut self,
        prev: Option<PhysicalAddress>,
        next: Option<PhysicalAddress>,
        replacement: Option<PhysicalAddress>,
    ) -> MemoryResult<()> {
        match prev {
            Some(p) => self.set_next(p, replacement.or(next))?,
            None => self.free_head = replacement.or(next),
        }
        if let Some(n) = next {
            self.set_prev(n, replacement.or(prev))?;
        }
        Ok(())
    }

    /// Link the free block at `at` into the list at its address position.
    pub(super) fn insert_sorted(&mut self, at: PhysicalAddress) -> MemoryResult<()> {
        let mut prev = None;
        let mut cursor = self.free_head;
        let mut budget = self.max_list_len();
        while let Some(c) = cursor {
            if c > at {
                break;
            }
            budget = budget
                .checked_sub(1)
                .ok_or(MemoryError::CorruptionDetected(c))?;
            prev = Some(c);
            cursor = read_header(&self.mem, c)?.next_free;
        }

        let mut header = read_header(&self.mem, at)?;
        header.prev_free = prev;
        header.next_free = cursor;
        write_header(&mut self.mem, at, &header)?;

        self.relink(prev, cursor, Some(at))
    }

    /// Upper bound on the number of blocks the arena can hold; a walk longer
    /// than this has hit a cycle.
    pub(super) const fn max_list_len(&self) -> u64 {
        self.size / super::BLOCK_OVERHEAD + 1
    }

    fn set_next(&mut self, at: PhysicalAddress, next: Option<PhysicalAddress>) -> MemoryResult<()> {
        let mut header = read_header(&self.mem, at)?;
        header.next_free = next;
        write_header(&mut self.mem, at, &header)
    }

    fn set_prev(&mut self, at: PhysicalAddress, prev: Option<PhysicalAddress>) -> MemoryResult<()> {
        let mut header = read_header(&self.mem, at)?;
        header.prev_free = prev;
        write_header(&mut self.mem, at, &header)
    }
}
