//! Assertion helpers for scenarios. Each one returns a [`Failure`](crate::Failure)
//! from the enclosing function instead of panicking.

use crate::Failure;
use kernel_alloc::MemoryResult;

/// Return type of a scenario body.
pub type Checked = Result<(), Failure>;

/// Fail with `$reason` unless `$cond` holds.
macro_rules! ensure {
    ($cond:expr, $reason:literal) => {
        if !$cond {
            return Err($crate::Failure::new($reason));
        }
    };
}

/// Fail with `$reason` and both values unless the two `u64`s are equal.
macro_rules! ensure_eq {
    ($got:expr, $expected:expr, $reason:literal) => {{
        let got: u64 = $got;
        let expected: u64 = $expected;
        if got != expected {
            return Err($crate::Failure::mismatch($reason, got, expected));
        }
    }};
}

/// Fail unless `$result` is exactly `Err($error)`.
macro_rules! ensure_err {
    ($result:expr, $error:expr, $reason:literal) => {
        match $result {
            Err(e) if e == $error => {}
            Err(e) => return Err($crate::Failure::error($reason, e)),
            Ok(_) => return Err($crate::Failure::new($reason)),
        }
    };
}

/// Turns an allocator error into a scenario failure.
pub trait OrFail<T> {
    /// # Errors
    /// A [`Failure`] with `reason` carrying the allocator's error.
    fn or_fail(self, reason: &'static str) -> Result<T, Failure>;
}

impl<T> OrFail<T> for MemoryResult<T> {
    fn or_fail(self, reason: &'static str) -> Result<T, Failure> {
        self.map_err(|e| Failure::error(reason, e))
    }
}
