//! Kernel error types.
//!
//! Fallible surfaces in this kernel are narrow: allocation can run dry and
//! the test framework needs a value to report. Everything else is a fatal
//! contract violation handled by `kassert!`, so the error enum stays small.

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// A physical pool or the virtual window had no run of free pages.
    OutOfMemory {
        /// Pages the caller asked for.
        requested: usize,
    },
    /// A blocking primitive was used from a context that cannot block.
    InvalidContext {
        operation: &'static str,
    },
    /// A component was used before its `init` ran.
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
    /// A test-framework check did not hold.
    CheckFailed {
        what: &'static str,
    },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::OutOfMemory { requested } => {
                write!(f, "out of memory ({} pages requested)", requested)
            }
            KernelError::InvalidContext { operation } => {
                write!(f, "{} called from an invalid context", operation)
            }
            KernelError::InvalidState { expected, actual } => {
                write!(f, "invalid state: expected {}, found {}", expected, actual)
            }
            KernelError::CheckFailed { what } => write!(f, "check failed: {}", what),
        }
    }
}
