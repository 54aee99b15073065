//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::NaiveTime;
use pact_engine_core::{CheckInPolicy, MissedDayPolicy, StatsPolicy};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,
    pub free_tier_pact_limit: u32,
    pub count_unscheduled_check_ins: bool,
    pub missed_days_count_as_fold: bool,
    pub late_after: Option<NaiveTime>,
    pub roast_max_attempts: u32,
    pub roast_retry_backoff: Duration,
    pub roast_queue_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address: SocketAddr =
            parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;
        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Engine Policies ---
        let free_tier_pact_limit = parse_or(&lookup, "FREE_TIER_PACT_LIMIT", Some(3))?;
        let count_unscheduled_check_ins =
            parse_or(&lookup, "COUNT_UNSCHEDULED_CHECK_INS", Some(true))?;
        let missed_days_count_as_fold =
            parse_or(&lookup, "MISSED_DAYS_COUNT_AS_FOLD", Some(false))?;
        let late_after = lookup("LATE_AFTER")
            .map(|raw| {
                NaiveTime::parse_from_str(&raw, "%H:%M").map_err(|e| {
                    ConfigError::InvalidValue("LATE_AFTER".to_string(), e.to_string())
                })
            })
            .transpose()?;

        // --- Roast Worker ---
        let roast_max_attempts: u32 = parse_or(&lookup, "ROAST_MAX_ATTEMPTS", Some(3))?;
        if roast_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "ROAST_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let backoff_ms: u64 = parse_or(&lookup, "ROAST_RETRY_BACKOFF_MS", Some(500))?;
        let roast_queue_capacity: usize = parse_or(&lookup, "ROAST_QUEUE_CAPACITY", Some(256))?;
        if roast_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "ROAST_QUEUE_CAPACITY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            free_tier_pact_limit,
            count_unscheduled_check_ins,
            missed_days_count_as_fold,
            late_after,
            roast_max_attempts,
            roast_retry_backoff: Duration::from_millis(backoff_ms),
            roast_queue_capacity,
        })
    }

    pub fn check_in_policy(&self) -> CheckInPolicy {
        CheckInPolicy {
            late_after: self.late_after,
        }
    }

    /// The stats policy for a view computed through `through`.
    pub fn stats_policy(&self, through: chrono::NaiveDate) -> StatsPolicy {
        StatsPolicy {
            include_unscheduled: self.count_unscheduled_check_ins,
            missed_days: if self.missed_days_count_as_fold {
                MissedDayPolicy::CountAsFold { through }
            } else {
                MissedDayPolicy::Ignore
            },
        }
    }
}

/// Parses `name` if set, otherwise falls back to `default` (or reports it missing).
fn parse_or<F, T>(lookup: &F, name: &str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(name.to_string())),
    }
}
