//! Configuration management

use std::str::FromStr;

use anyhow::{self, Context, Result};

use crate::defaults::{
    DEFAULT_IMPORT_MAX_BYTES, DEFAULT_IMPORT_MAX_ROW_ATTEMPTS, DEFAULT_IMPORT_RETRY_DELAY_MS,
    DEFAULT_NATS_URL,
};
use crate::types::{AggregateMode, ImportOptions, KeyCollisionPolicy, OverwritePolicy};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Largest CSV payload accepted by import.csv, in bytes
    pub import_max_bytes: usize,

    /// Import pipeline behavior
    pub import: ImportOptions,

    /// Clear all neighborhoods, households and readings on startup
    pub reset_on_start: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let nats_url = std::env::var("NATS_URL")
            .unwrap_or_else(|_| DEFAULT_NATS_URL.to_string());

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set")?;

        let import_max_bytes = env_or("IMPORT_MAX_BYTES", DEFAULT_IMPORT_MAX_BYTES)?;
        let import = import_options_from_env()?;

        let reset_on_start = env_or("RESET_ON_START", false)?;
        if reset_on_start {
            tracing::warn!("RESET_ON_START is set, all imported data will be cleared on startup");
        }

        Ok(Self {
            nats_url,
            database_url,
            import_max_bytes,
            import,
            reset_on_start,
        })
    }
}

/// Import pipeline settings; needs no connection strings
pub fn import_options_from_env() -> Result<ImportOptions> {
    dotenvy::dotenv().ok();

    let max_row_attempts = env_or("IMPORT_MAX_ROW_ATTEMPTS", DEFAULT_IMPORT_MAX_ROW_ATTEMPTS)?;
    if max_row_attempts == 0 {
        anyhow::bail!("IMPORT_MAX_ROW_ATTEMPTS must be at least 1");
    }

    Ok(ImportOptions {
        overwrite_policy: env_or("HOUSEHOLD_OVERWRITE_POLICY", OverwritePolicy::default())?,
        key_collision_policy: env_or("KEY_COLLISION_POLICY", KeyCollisionPolicy::default())?,
        aggregate_mode: env_or("AGGREGATE_MODE", AggregateMode::default())?,
        max_row_attempts,
        retry_delay_ms: env_or("IMPORT_RETRY_DELAY_MS", DEFAULT_IMPORT_RETRY_DELAY_MS)?,
    })
}

/// Read an optional variable, falling back to `default` when unset or empty
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid {}='{}': {}", name, value, e)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_uses_default_when_unset() {
        std::env::remove_var("AGUAS_TEST_UNSET_VAR");
        let value: u32 = env_or("AGUAS_TEST_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_env_or_parses_policy() {
        std::env::set_var("AGUAS_TEST_POLICY_VAR", "newer-period");
        let value: OverwritePolicy = env_or("AGUAS_TEST_POLICY_VAR", OverwritePolicy::Always).unwrap();
        assert_eq!(value, OverwritePolicy::NewerPeriod);
        std::env::remove_var("AGUAS_TEST_POLICY_VAR");
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        std::env::set_var("AGUAS_TEST_BAD_VAR", "lots");
        let result: Result<usize> = env_or("AGUAS_TEST_BAD_VAR", 1);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("AGUAS_TEST_BAD_VAR"));
        std::env::remove_var("AGUAS_TEST_BAD_VAR");
    }

    #[test]
    fn test_env_or_treats_empty_as_unset() {
        std::env::set_var("AGUAS_TEST_EMPTY_VAR", "  ");
        let value: bool = env_or("AGUAS_TEST_EMPTY_VAR", true).unwrap();
        assert!(value);
        std::env::remove_var("AGUAS_TEST_EMPTY_VAR");
    }

    #[test]
    #[ignore] // requires --test-threads=1 due to env var race
    fn test_config_import_defaults() {
        std::env::set_var("DATABASE_URL", "postgres://test");
        std::env::remove_var("AGGREGATE_MODE");
        std::env::remove_var("IMPORT_MAX_BYTES");

        let config = Config::from_env().unwrap();
        assert_eq!(config.import.aggregate_mode, AggregateMode::Incremental);
        assert_eq!(config.import_max_bytes, DEFAULT_IMPORT_MAX_BYTES);
        assert!(!config.reset_on_start);
    }
}
