//! Ledger configuration, loaded from `FAULTBOOK_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::RetryPolicy;

pub const ENV_WRITE_STRATEGY: &str = "FAULTBOOK_WRITE_STRATEGY";
pub const ENV_MAX_CONFLICT_RETRIES: &str = "FAULTBOOK_MAX_CONFLICT_RETRIES";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "FAULTBOOK_STORE_RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "FAULTBOOK_STORE_RETRY_BASE_DELAY_MS";
pub const ENV_RETRY_MULTIPLIER: &str = "FAULTBOOK_STORE_RETRY_MULTIPLIER";
pub const ENV_RETRY_MAX_DELAY_MS: &str = "FAULTBOOK_STORE_RETRY_MAX_DELAY_MS";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// How the aggregator turns a report into a single store write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    /// Update; on a miss insert; on a duplicate key retry the update.
    #[default]
    InsertThenUpdate,

    /// One `find_and_update` carrying an upsert seed.
    NativeUpsert,
}

impl FromStr for WriteStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert_then_update" => Ok(Self::InsertThenUpdate),
            "native_upsert" => Ok(Self::NativeUpsert),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub write_strategy: WriteStrategy,

    /// Retries after a lost create race. Attempts = retries + 1.
    pub max_conflict_retries: u32,

    pub store_retry: RetryPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            write_strategy: WriteStrategy::default(),
            max_conflict_retries: 3,
            store_retry: RetryPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary lookup; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(strategy) = parse(&lookup, ENV_WRITE_STRATEGY)? {
            config.write_strategy = strategy;
        }
        if let Some(retries) = parse(&lookup, ENV_MAX_CONFLICT_RETRIES)? {
            config.max_conflict_retries = retries;
        }
        if let Some(attempts) = parse(&lookup, ENV_RETRY_MAX_ATTEMPTS)? {
            config.store_retry.max_attempts = attempts;
        }
        if let Some(ms) = parse(&lookup, ENV_RETRY_BASE_DELAY_MS)? {
            config.store_retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = parse::<f64, _>(&lookup, ENV_RETRY_MULTIPLIER)? {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(ConfigError::Invalid {
                    var: ENV_RETRY_MULTIPLIER,
                    value: multiplier.to_string(),
                });
            }
            config.store_retry.multiplier = multiplier;
        }
        if let Some(ms) = parse(&lookup, ENV_RETRY_MAX_DELAY_MS)? {
            config.store_retry.max_delay = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::Invalid { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.write_strategy, WriteStrategy::InsertThenUpdate);
        assert_eq!(config.max_conflict_retries, 3);
    }

    #[test]
    fn variables_override_defaults() {
        let config = LedgerConfig::from_lookup(lookup(&[
            (ENV_WRITE_STRATEGY, "native_upsert"),
            (ENV_MAX_CONFLICT_RETRIES, "5"),
            (ENV_RETRY_MAX_ATTEMPTS, "4"),
            (ENV_RETRY_BASE_DELAY_MS, "10"),
            (ENV_RETRY_MULTIPLIER, "3"),
            (ENV_RETRY_MAX_DELAY_MS, "250"),
        ]))
        .unwrap();

        assert_eq!(config.write_strategy, WriteStrategy::NativeUpsert);
        assert_eq!(config.max_conflict_retries, 5);
        assert_eq!(config.store_retry.max_attempts, 4);
        assert_eq!(config.store_retry.base_delay, Duration::from_millis(10));
        assert_eq!(config.store_retry.multiplier, 3.0);
        assert_eq!(config.store_retry.max_delay, Duration::from_millis(250));
    }

    #[test]
    fn unparsable_value_names_the_variable() {
        let err = LedgerConfig::from_lookup(lookup(&[(ENV_MAX_CONFLICT_RETRIES, "many")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: ENV_MAX_CONFLICT_RETRIES,
                value: "many".into(),
            }
        );

        let err = LedgerConfig::from_lookup(lookup(&[(ENV_WRITE_STRATEGY, "yolo")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_WRITE_STRATEGY, .. }));
    }

    #[test]
    fn shrinking_multiplier_is_rejected() {
        let err = LedgerConfig::from_lookup(lookup(&[(ENV_RETRY_MULTIPLIER, "0.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: ENV_RETRY_MULTIPLIER, .. }));
    }
}
