//! Application Configuration
//!
//! Configuration for the rental application layer.

use std::time::Duration;

use crate::domain::services::FinePolicy;

/// Rental application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalConfig {
    /// Lifetime of rental and return tokens
    pub token_ttl: Duration,
    /// How long expired tokens are kept as tombstones before deletion
    pub token_retention: Duration,
    /// Students with an outstanding fine above this cannot rent
    pub fine_ceiling: i64,
    /// Overtime minutes that accrue no fine
    pub grace_period_minutes: i64,
    /// Fine per overtime minute past the grace period
    pub fine_rate_per_minute: i64,
    /// Longest rental a guard can grant
    pub max_rental_minutes: u32,
    /// Period of the expiry sweeper
    pub sweep_interval: Duration,
}

impl Default for RentalConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(30),
            token_retention: Duration::from_secs(600),
            fine_ceiling: 500,
            grace_period_minutes: 15,
            fine_rate_per_minute: 5,
            max_rental_minutes: 12 * 60,
            sweep_interval: Duration::from_secs(10),
        }
    }
}

/// Error when reading configuration from the environment
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid value for {name}: {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
}

impl RentalConfig {
    pub const ENV_TOKEN_TTL_SECS: &'static str = "RENTAL_TOKEN_TTL_SECS";
    pub const ENV_TOKEN_RETENTION_SECS: &'static str = "RENTAL_TOKEN_RETENTION_SECS";
    pub const ENV_FINE_CEILING: &'static str = "RENTAL_FINE_CEILING";
    pub const ENV_GRACE_MINUTES: &'static str = "RENTAL_GRACE_MINUTES";
    pub const ENV_FINE_RATE: &'static str = "RENTAL_FINE_RATE_PER_MINUTE";
    pub const ENV_MAX_RENTAL_MINUTES: &'static str = "RENTAL_MAX_MINUTES";
    pub const ENV_SWEEP_INTERVAL_SECS: &'static str = "RENTAL_SWEEP_INTERVAL_SECS";

    /// Longest accepted token lifetime
    pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);
    /// Longest accepted tombstone retention
    pub const MAX_TOKEN_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    /// Read overrides from `RENTAL_*` environment variables; unset ones keep defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            token_ttl: secs(&lookup, Self::ENV_TOKEN_TTL_SECS, defaults.token_ttl)?,
            token_retention: secs(
                &lookup,
                Self::ENV_TOKEN_RETENTION_SECS,
                defaults.token_retention,
            )?,
            fine_ceiling: parsed(&lookup, Self::ENV_FINE_CEILING, defaults.fine_ceiling)?,
            grace_period_minutes: parsed(
                &lookup,
                Self::ENV_GRACE_MINUTES,
                defaults.grace_period_minutes,
            )?,
            fine_rate_per_minute: parsed(
                &lookup,
                Self::ENV_FINE_RATE,
                defaults.fine_rate_per_minute,
            )?,
            max_rental_minutes: parsed(
                &lookup,
                Self::ENV_MAX_RENTAL_MINUTES,
                defaults.max_rental_minutes,
            )?,
            sweep_interval: secs(
                &lookup,
                Self::ENV_SWEEP_INTERVAL_SECS,
                defaults.sweep_interval,
            )?,
        };

        if config.token_ttl.is_zero() {
            return Err(invalid(Self::ENV_TOKEN_TTL_SECS, "0"));
        }
        if config.token_ttl > Self::MAX_TOKEN_TTL {
            return Err(invalid(
                Self::ENV_TOKEN_TTL_SECS,
                &config.token_ttl.as_secs().to_string(),
            ));
        }
        if config.token_retention > Self::MAX_TOKEN_RETENTION {
            return Err(invalid(
                Self::ENV_TOKEN_RETENTION_SECS,
                &config.token_retention.as_secs().to_string(),
            ));
        }
        if config.sweep_interval.is_zero() {
            return Err(invalid(Self::ENV_SWEEP_INTERVAL_SECS, "0"));
        }
        if config.max_rental_minutes == 0 {
            return Err(invalid(Self::ENV_MAX_RENTAL_MINUTES, "0"));
        }
        if config.grace_period_minutes < 0 {
            return Err(invalid(
                Self::ENV_GRACE_MINUTES,
                &config.grace_period_minutes.to_string(),
            ));
        }
        if config.fine_rate_per_minute < 0 {
            return Err(invalid(
                Self::ENV_FINE_RATE,
                &config.fine_rate_per_minute.to_string(),
            ));
        }

        Ok(config)
    }

    pub fn fine_policy(&self) -> FinePolicy {
        FinePolicy::new(self.grace_period_minutes, self.fine_rate_per_minute)
    }
}

fn invalid(name: &'static str, value: &str) -> ConfigError {
    ConfigError {
        name,
        value: value.to_string(),
    }
}

fn parsed<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| invalid(name, &raw)),
        None => Ok(default),
    }
}

fn secs<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parsed(lookup, name, default.as_secs()).map(Duration::from_secs)
}
