//! Boot-time configuration
use core::{fmt, str::FromStr};

use crate::error::{ConfigError, ParsePolicyError};

/// The maximum number of CPUs a [`SoftIntr`](crate::SoftIntr) can manage.
pub const MAX_CPUS: usize = 64;

/// What [`SoftIntr::assert_at_least`](crate::SoftIntr::assert_at_least)
/// does when the current IPL is too low.
///
/// The numeric forms match the values accepted by the `kern.splassert`
/// sysctl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplAssertPolicy {
    /// `0`: don't check.
    Disabled,
    /// `1`: log the violation and continue.
    #[default]
    Report,
    /// `2`: log the violation, then raise the IPL to the asserted level to
    /// limit the damage.
    Raise,
    /// `3`: panic.
    Panic,
}

impl FromStr for SplAssertPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" | "disabled" => Ok(Self::Disabled),
            "1" | "report" => Ok(Self::Report),
            "2" | "raise" => Ok(Self::Raise),
            "3" | "panic" => Ok(Self::Panic),
            _ => Err(ParsePolicyError),
        }
    }
}

impl fmt::Display for SplAssertPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::Report => "report",
            Self::Raise => "raise",
            Self::Panic => "panic",
        })
    }
}

/// Parameters for [`SoftIntr::new`](crate::SoftIntr::new).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The number of CPUs. Each one gets its own IPL, pending mask, and
    /// queues.
    pub num_cpus: usize,
    /// The capacity of the handle table. `establish` fails with
    /// `OutOfMemory` once this many handles are alive.
    pub max_handles: usize,
    /// See [`SplAssertPolicy`].
    pub splassert: SplAssertPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_cpus: 1,
            max_handles: 256,
            splassert: SplAssertPolicy::default(),
        }
    }
}

impl Config {
    pub fn with_num_cpus(self, num_cpus: usize) -> Self {
        Self { num_cpus, ..self }
    }

    pub fn with_max_handles(self, max_handles: usize) -> Self {
        Self {
            max_handles,
            ..self
        }
    }

    pub fn with_splassert(self, splassert: SplAssertPolicy) -> Self {
        Self { splassert, ..self }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.num_cpus == 0 {
            Err(ConfigError::NoCpus)
        } else if self.num_cpus > MAX_CPUS {
            Err(ConfigError::TooManyCpus)
        } else if self.max_handles == 0 {
            Err(ConfigError::NoHandleStorage)
        } else {
            Ok(())
        }
    }
}
