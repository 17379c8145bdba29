//! Error types
use core::fmt;

use crate::ipl::Ipl;

/// Error type for [`SoftIntr::establish`](crate::SoftIntr::establish).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstablishError {
    /// Handle storage is exhausted. The registering subsystem is expected to
    /// carry on without deferred work.
    OutOfMemory,
}

impl fmt::Display for EstablishError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("out of handle storage"),
        }
    }
}

/// A value does not name a software interrupt level.
///
/// The level set is fixed at compile time, so this always points at a coding
/// error. Registration paths treat it as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidLevelError {
    /// The index is outside `0..NUM_LEVELS`.
    BadIndex(u8),
    /// The IPL is not a software interrupt IPL.
    BadIpl(Ipl),
}

impl fmt::Display for InvalidLevelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadIndex(i) => write!(f, "unknown soft interrupt level index {i}"),
            Self::BadIpl(ipl) => write!(f, "unknown soft IPL {ipl}"),
        }
    }
}

/// Error type for [`SoftIntr::new`](crate::SoftIntr::new).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `num_cpus` is zero.
    NoCpus,
    /// `num_cpus` exceeds [`MAX_CPUS`](crate::MAX_CPUS).
    TooManyCpus,
    /// `max_handles` is zero.
    NoHandleStorage,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::NoCpus => "at least one CPU is required",
            Self::TooManyCpus => "too many CPUs",
            Self::NoHandleStorage => "handle storage must not be empty",
        })
    }
}

/// Error type for parsing [`SplAssertPolicy`](crate::SplAssertPolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsePolicyError;

impl fmt::Display for ParsePolicyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("expected 0, 1, 2, 3, or a policy name")
    }
}
