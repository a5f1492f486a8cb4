//! # Memory Manager Self-Tests
//!
//! Named scenarios that drive the physical memory manager and the kernel heap
//! through scripted sequences. A test harness sends a command line such as
//! `kmm_reuse` over the serial port; the kernel looks it up here, runs it and
//! answers with the [`TestOutcome`] line:
//!
//! ```text
//! > kheap_coalesce
//! < PASSED
//! > kmm_consistency
//! < FAILED: used after free (got=177 expected=176)
//! ```
//!
//! Every scenario builds its own allocator instance, so runs do not depend
//! on each other or on their order. Nothing here allocates from the host.
//!
//! ```rust
//! let outcome = kernel_selftest::dispatch("kmm_reuse\r\n").unwrap();
//! assert_eq!(outcome.to_string(), "PASSED");
//! assert!(kernel_selftest::dispatch("reboot").is_none());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

#[macro_use]
mod check;
mod kheap;
mod kmm;
mod outcome;
mod rig;

use log::debug;

pub use outcome::{Failure, TestOutcome};

/// One named scenario.
#[derive(Debug, Copy, Clone)]
pub struct SelfTest {
    pub name: &'static str,
    pub run: fn() -> TestOutcome,
}

macro_rules! registry {
    ($($name:literal => $scenario:path),* $(,)?) => {
        &[$(SelfTest {
            name: $name,
            run: || TestOutcome::from($scenario()),
        }),*]
    };
}

/// Every scenario, in harness order.
pub static SELF_TESTS: &[SelfTest] = registry! {
    "kmm_init_total" => kmm::init_total,
    "kmm_reserved" => kmm::reserved,
    "kmm_alloc_all" => kmm::alloc_all,
    "kmm_alloc_align" => kmm::alloc_align,
    "kmm_reuse" => kmm::reuse,
    "kmm_double_free" => kmm::double_free,
    "kmm_free_invalid" => kmm::free_invalid,
    "kmm_consistency" => kmm::consistency,
    "kmm_pattern" => kmm::pattern,
    "kmm_oom" => kmm::oom,
    "kheap_init" => kheap::init,
    "kheap_alloc_small" => kheap::alloc_small,
    "kheap_alloc_exact" => kheap::alloc_exact,
    "kheap_split" => kheap::split,
    "kheap_free_reuse" => kheap::free_reuse,
    "kheap_coalesce" => kheap::coalesce,
    "kheap_double_free" => kheap::double_free,
    "kheap_invalid_free" => kheap::invalid_free,
    "kheap_realloc_shrink" => kheap::realloc_shrink,
    "kheap_realloc_expand" => kheap::realloc_expand,
    "kheap_realloc_null" => kheap::realloc_null,
    "kheap_realloc_zero" => kheap::realloc_zero,
    "kheap_oom" => kheap::oom,
    "kheap_stress_pattern" => kheap::stress_pattern,
};

#[must_use]
pub fn find(name: &str) -> Option<&'static SelfTest> {
    SELF_TESTS.iter().find(|test| test.name == name)
}

/// Run the scenario named by `command`. Surrounding whitespace, including
/// the line terminator, is ignored. `None` for unknown commands.
#[must_use]
pub fn dispatch(command: &str) -> Option<TestOutcome> {
    let name = command.trim();
    let test = find(name)?;
    let outcome = (test.run)();
    debug!("selftest: {name}: {outcome}");
    Some(outcome)
}

pub fn iter() -> impl Iterator<Item = &'static SelfTest> {
    SELF_TESTS.iter()
}
