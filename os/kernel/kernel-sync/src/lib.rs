//! # Kernel synchronization primitives
//!
//! The memory managers are plain `&mut self` state machines; this crate
//! supplies the one lock that serializes access to them when the kernel is
//! preemptive or runs on more than one core.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
