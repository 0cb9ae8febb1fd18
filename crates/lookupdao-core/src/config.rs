//! Store configuration
//!
//! `DbConfig` is consumed once when a store is opened. Every field is passed
//! through to the SQLite engine adapter; nothing here is interpreted by the
//! repositories themselves.

use crate::errors::{DaoError, Result};
use lookupdao_core_types::Sensitive;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Dialect understood by the bundled engine adapter
pub const SQLITE_DIALECT: &str = "sqlite";

/// Connection, schema and pool settings for a store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Path of the SQLite database file
    pub url: String,
    /// Logical database name; SQLite only exposes `main`, so this is informational
    pub database: Option<String>,
    pub catalog: Option<String>,
    pub driver: String,
    pub user: Option<String>,
    pub password: Option<Sensitive<String>>,
    pub dialect: String,
    /// Drop and create registered tables on open, drop them again on close
    pub create_schema: bool,
    /// Log every executed statement at debug level
    pub show_sql: bool,
    pub max_pool_size: usize,
    pub min_pool_size: usize,
    pub idle_timeout_ms: u64,
    pub max_age_ms: u64,
    pub connection_timeout_ms: u64,
    pub test_query: Option<String>,
    /// How long a write waits on a row held exclusively by another session
    pub lock_wait_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            database: None,
            catalog: None,
            driver: SQLITE_DIALECT.to_string(),
            user: None,
            password: None,
            dialect: SQLITE_DIALECT.to_string(),
            create_schema: false,
            show_sql: false,
            max_pool_size: 4,
            min_pool_size: 2,
            idle_timeout_ms: 55_000,
            max_age_ms: 60_000,
            connection_timeout_ms: 20_000,
            test_query: Some("SELECT 1;".to_string()),
            lock_wait_timeout_ms: 5_000,
        }
    }
}

impl DbConfig {
    /// Default configuration for a database file
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self {
            url: path.as_ref().to_string_lossy().into_owned(),
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DbConfig = toml::from_str(text).map_err(|e| DaoError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML configuration file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| DaoError::InvalidConfig {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the settings the engine adapter cannot work without
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(DaoError::InvalidConfig { reason });

        if self.url.trim().is_empty() {
            return invalid("url must name a database file".to_string());
        }
        if self.url.trim() == ":memory:" {
            return invalid(
                "in-memory databases cannot be shared by pooled connections".to_string(),
            );
        }
        if !self.dialect.eq_ignore_ascii_case(SQLITE_DIALECT) {
            return invalid(format!("unsupported dialect '{}'", self.dialect));
        }
        if !self.driver.eq_ignore_ascii_case(SQLITE_DIALECT) {
            return invalid(format!("unsupported driver '{}'", self.driver));
        }
        if self.max_pool_size == 0 {
            return invalid("max_pool_size must be at least 1".to_string());
        }
        if self.min_pool_size > self.max_pool_size {
            return invalid(format!(
                "min_pool_size ({}) exceeds max_pool_size ({})",
                self.min_pool_size, self.max_pool_size
            ));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }
}
