//! Configuration from environment variables
use softintr::{Config, ParsePolicyError};
use std::fmt;

/// The number of simulated CPUs.
pub const ENV_CPUS: &str = "SOFTINTR_CPUS";

/// The `splassert` policy (`0`-`3` or a policy name).
pub const ENV_SPLASSERT: &str = "SOFTINTR_SPLASSERT";

/// Error type for [`config_from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvConfigError {
    /// [`ENV_CPUS`] isn't a number.
    BadCpus(String),
    /// [`ENV_SPLASSERT`] isn't a policy.
    BadSplAssert(String),
}

impl fmt::Display for EnvConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadCpus(s) => write!(f, "{ENV_CPUS}={s:?} is not a CPU count"),
            Self::BadSplAssert(s) => {
                write!(f, "{ENV_SPLASSERT}={s:?}: {}", ParsePolicyError)
            }
        }
    }
}

impl std::error::Error for EnvConfigError {}

/// Build a [`Config`] from the process environment. Unset variables keep
/// their defaults.
pub fn config_from_env() -> Result<Config, EnvConfigError> {
    config_from_vars(|name| std::env::var(name).ok())
}

/// Build a [`Config`] from the variables `get` returns.
pub fn config_from_vars(
    get: impl Fn(&str) -> Option<String>,
) -> Result<Config, EnvConfigError> {
    let mut config = Config::default();

    if let Some(s) = get(ENV_CPUS) {
        let num_cpus = s
            .trim()
            .parse()
            .map_err(|_| EnvConfigError::BadCpus(s.clone()))?;
        config = config.with_num_cpus(num_cpus);
    }

    if let Some(s) = get(ENV_SPLASSERT) {
        let policy = s
            .parse()
            .map_err(|_| EnvConfigError::BadSplAssert(s.clone()))?;
        config = config.with_splassert(policy);
    }

    log::debug!("configuration from the environment: {config:?}");
    Ok(config)
}
