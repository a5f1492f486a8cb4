use core::fmt;
use kernel_alloc::MemoryError;

/// Result of one self-test run, rendered the way the serial harness expects
/// it: `PASSED` or `FAILED: <reason>`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed(Failure),
}

impl TestOutcome {
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl From<Result<(), Failure>> for TestOutcome {
    fn from(value: Result<(), Failure>) -> Self {
        match value {
            Ok(()) => Self::Passed,
            Err(failure) => Self::Failed(failure),
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("PASSED"),
            Self::Failed(failure) => write!(f, "FAILED: {failure}"),
        }
    }
}

/// Why a self-test failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: &'static str,
    /// Observed and expected value of a failed comparison.
    pub values: Option<(u64, u64)>,
    /// Error returned by the allocator, if that is what failed.
    pub error: Option<MemoryError>,
}

impl Failure {
    #[must_use]
    pub const fn new(reason: &'static str) -> Self {
        Self {
            reason,
            values: None,
            error: None,
        }
    }

    #[must_use]
    pub const fn mismatch(reason: &'static str, got: u64, expected: u64) -> Self {
        Self {
            reason,
            values: Some((got, expected)),
            error: None,
        }
    }

    #[must_use]
    pub const fn error(reason: &'static str, error: MemoryError) -> Self {
        Self {
            reason,
            values: None,
            error: Some(error),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason)?;
        if let Some((got, expected)) = self.values {
            write!(f, " (got={got} expected={expected})")?;
        }
        if let Some(error) = self.error {
            write!(f, ": {error}")?;
        }
        Ok(())
    }
}
