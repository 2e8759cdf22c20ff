//! Configuration loading and representation.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

pub const REPLAY_BATCH_SIZE_VAR: &str = "PERFREV_REPLAY_BATCH_SIZE";
pub const HIERARCHY_MAX_STALENESS_VAR: &str = "PERFREV_HIERARCHY_MAX_STALENESS_SECS";

const DEFAULT_REPLAY_BATCH_SIZE: usize = 500;
const DEFAULT_HIERARCHY_MAX_STALENESS_SECS: u64 = 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfraConfig {
    /// Events read from the global log per replay batch (at least 1).
    pub replay_batch_size: usize,
    /// How old a cached hierarchy index may get before it is rebuilt.
    pub hierarchy_max_staleness: Duration,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            replay_batch_size: DEFAULT_REPLAY_BATCH_SIZE,
            hierarchy_max_staleness: Duration::from_secs(DEFAULT_HIERARCHY_MAX_STALENESS_SECS),
        }
    }
}

impl InfraConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; missing keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let replay_batch_size = match lookup(REPLAY_BATCH_SIZE_VAR) {
            Some(raw) => {
                let size = parse::<usize>(REPLAY_BATCH_SIZE_VAR, &raw)?;
                if size == 0 {
                    return Err(ConfigError::Invalid {
                        key: REPLAY_BATCH_SIZE_VAR,
                        value: raw,
                        reason: "must be at least 1".to_string(),
                    });
                }
                size
            }
            None => {
                debug!(key = REPLAY_BATCH_SIZE_VAR, default = DEFAULT_REPLAY_BATCH_SIZE, "using default");
                defaults.replay_batch_size
            }
        };

        let hierarchy_max_staleness = match lookup(HIERARCHY_MAX_STALENESS_VAR) {
            Some(raw) => Duration::from_secs(parse::<u64>(HIERARCHY_MAX_STALENESS_VAR, &raw)?),
            None => {
                debug!(
                    key = HIERARCHY_MAX_STALENESS_VAR,
                    default = DEFAULT_HIERARCHY_MAX_STALENESS_SECS,
                    "using default"
                );
                defaults.hierarchy_max_staleness
            }
        };

        Ok(Self {
            replay_batch_size,
            hierarchy_max_staleness,
        })
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
