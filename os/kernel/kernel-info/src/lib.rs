//! # Kernel Memory Configuration
//!
//! This crate is the single source of the compile-time constants that shape
//! the kernel's memory managers. Both the physical memory manager and the heap
//! read their geometry from here, so the two layers cannot drift apart.
//!
//! ## Memory Layout ([`memory`])
//!
//! * **Frame Geometry**: frame size and alignment of the physical memory manager
//! * **Reserved Low Memory**: the range below [`LOW_MEMORY_END`](memory::LOW_MEMORY_END)
//!   that is never handed out
//! * **Direct Mapping**: the HHDM base used to reach physical memory
//! * **Heap Geometry**: payload alignment, split threshold, initial and maximum
//!   arena size
//!
//! ```text
//! Physical Address Space:
//!
//! 0x0000_0000           ┌─────────────────────────────────┐
//!                       │  Frame 0 (never allocated)      │
//! FRAME_SIZE            ├─────────────────────────────────┤
//!                       │  Low memory (reserved)          │
//! LOW_MEMORY_END        ├─────────────────────────────────┤
//!                       │  Kernel image (reserved)        │
//!                       ├─────────────────────────────────┤
//!                       │  Free frames                    │
//!                       │   └─ heap arena (allocated)     │
//! total_bytes           └─────────────────────────────────┘
//! ```
//!
//! All constants are validated by `const` assertions at compile time.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod memory;
