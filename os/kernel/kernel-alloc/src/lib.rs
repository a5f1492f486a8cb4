//! # Kernel Memory Management Core
//!
//! Two allocators stacked on top of each other, plus the plumbing they share:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Kernel heap (kheap)                 │
//! │    • byte-granular alloc / free / realloc           │
//! │    • boundary tags, address-ordered free list       │
//! │    • grows by claiming frames above its arena       │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ FrameSource
//! ┌─────────────────▼───────────────────────────────────┐
//! │          Physical memory manager (kmm)              │
//! │    • Reserved / Free / Allocated region table       │
//! │    • frame-granular, aligned, first-fit             │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! - [`kmm`]: owns `[0, total)` and hands out frame ranges.
//! - [`kheap`]: carves byte allocations out of an arena of frames. Its block
//!   metadata lives in the arena and is reached through [`phys_memory`].
//! - [`MemoryManager`]: the two of them with a shared lifecycle;
//!   [`SharedMemoryManager`] puts it behind the allocator-wide lock.
//!
//! Every operation reports failure as a [`MemoryError`] and leaves the
//! allocator as it was. Nothing here panics on bad input.
//!
//! ## Example
//!
//! ```rust
//! use kernel_alloc::{HeapConfig, MemoryManager, phys_memory::RamImage};
//! use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};
//!
//! let kernel_image = PhysicalRange::new(PhysicalAddress::new(0x1000), 0x1000);
//! let ram = RamImage::new(PhysicalAddress::zero(), vec![0u8; 0x10000]);
//! let config = HeapConfig { initial_size: 0x1000, max_size: 0x4000 };
//! let mut mm = MemoryManager::init(0x10000, &[kernel_image], ram, config).unwrap();
//!
//! let p = mm.kmalloc(100).unwrap();
//! mm.heap_mut().write(p, 0, b"hello").unwrap();
//! let p = mm.krealloc(Some(p), 400).unwrap().unwrap();
//! mm.kfree(p).unwrap();
//! assert_eq!(mm.kfree(p), Err(kernel_alloc::MemoryError::DoubleFree(p)));
//! mm.check().unwrap();
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod error;
pub mod frame_alloc;
pub mod kheap;
pub mod kmm;
mod manager;
pub mod phys_memory;

pub use error::{MemoryError, MemoryResult};
pub use frame_alloc::{FrameSource, FrameWindow, NoGrowth};
pub use kheap::{HeapConfig, HeapStats, Kheap};
pub use kmm::{Kmm, KmmStats};
pub use manager::{MemoryManager, SharedMemoryManager};
