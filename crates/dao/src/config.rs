//! Configuration for the data access layer
//!
//! `OrmConfig` carries the knobs that shape criteria compilation (join depth,
//! default page size, condition marker) and the isolation level used for
//! transactional units of work. `DatabaseConfig` adds the connection URL and
//! pool sizing. Both load from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backends::{DatabaseBackendType, DatabasePoolConfig};
use crate::database::IsolationLevel;

/// Alias of the root table in every compiled statement
pub const MAIN_TABLE_ALIAS: &str = "t_main";

/// Prefix of every joined table alias
pub const ALIAS_PREFIX: &str = "t_";

/// Reserved condition token that resolves to the root alias
pub const FROM_TOKEN: &str = "from";

pub const DEFAULT_JOIN_MAX_DEPTH: usize = 20;
pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const DEFAULT_CONDITION_MARKER: char = '@';

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Criteria compilation and unit-of-work settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrmConfig {
    /// Longest fetch path a criteria accepts
    pub join_max_depth: usize,
    /// Page size used by `Dao::paged_criteria` when none is given
    pub default_page_size: u64,
    /// Character that introduces a field reference in condition templates
    pub condition_marker: char,
    /// Isolation level applied when a transaction acquires the connection
    pub isolation_level: IsolationLevel,
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            join_max_depth: DEFAULT_JOIN_MAX_DEPTH,
            default_page_size: DEFAULT_PAGE_SIZE,
            condition_marker: DEFAULT_CONDITION_MARKER,
            isolation_level: IsolationLevel::ReadCommitted,
        }
    }
}

impl OrmConfig {
    /// Load from `ORM_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(depth) = lookup("ORM_JOIN_MAX_DEPTH") {
            config.join_max_depth = parse_value("join_max_depth", &depth, "positive integer")?;
        }

        if let Some(size) = lookup("ORM_PAGE_SIZE") {
            config.default_page_size = parse_value("default_page_size", &size, "positive integer")?;
        }

        if let Some(marker) = lookup("ORM_CONDITION_MARKER") {
            let mut chars = marker.chars();
            config.condition_marker = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "condition_marker".to_string(),
                        value: marker,
                        expected: "a single character".to_string(),
                    })
                }
            };
        }

        if let Some(level) = lookup("ORM_ISOLATION_LEVEL") {
            config.isolation_level = level.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.join_max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "join_max_depth".to_string(),
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            });
        }

        if self.default_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_page_size".to_string(),
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            });
        }

        if self.condition_marker.is_whitespace() || matches!(self.condition_marker, '?' | ')' | '.') {
            return Err(ConfigError::InvalidValue {
                field: "condition_marker".to_string(),
                value: self.condition_marker.to_string(),
                expected: "a character that is not whitespace, '?', ')' or '.'".to_string(),
            });
        }

        Ok(())
    }
}

/// Connection settings for a `Database`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool: DatabasePoolConfig,
    pub orm: OrmConfig,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: DatabasePoolConfig::default(),
            orm: OrmConfig::default(),
        }
    }

    /// Load from `DATABASE_*` and `ORM_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingEnvVar {
            var: "DATABASE_URL".to_string(),
        })?;

        let mut config = Self::new(url);

        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
            config.pool.max_connections = parse_value("max_connections", &max, "positive integer")?;
        }

        if let Some(min) = lookup("DATABASE_MIN_CONNECTIONS") {
            config.pool.min_connections = parse_value("min_connections", &min, "integer")?;
        }

        if let Some(timeout) = lookup("DATABASE_ACQUIRE_TIMEOUT") {
            let seconds: u64 = parse_value("acquire_timeout", &timeout, "seconds")?;
            config.pool.acquire_timeout = Duration::from_secs(seconds);
        }

        config.orm = OrmConfig::from_lookup(&lookup)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        DatabaseBackendType::from_url(&self.url).map_err(|_| ConfigError::InvalidValue {
            field: "url".to_string(),
            value: self.url.clone(),
            expected: "a mysql:// or sqlite: URL".to_string(),
        })?;

        if self.pool.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_connections".to_string(),
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            });
        }

        if self.pool.min_connections > self.pool.max_connections {
            return Err(ConfigError::InvalidValue {
                field: "min_connections".to_string(),
                value: self.pool.min_connections.to_string(),
                expected: format!("at most max_connections ({})", self.pool.max_connections),
            });
        }

        self.orm.validate()
    }
}

fn parse_value<T: FromStr>(field: &str, value: &str, expected: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    })
}
