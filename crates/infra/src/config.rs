//! Store selection from the environment.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `JOBFORGE_STORE` | `memory` | `memory`, `sqlite` or `postgres` |
//! | `JOBFORGE_SQLITE_URL` | `sqlite://jobforge.db?mode=rwc` | SQLite database |
//! | `DATABASE_URL` | none | Postgres database, required for `postgres` |
//! | `JOBFORGE_DB_MAX_CONNECTIONS` | `5` | SQL pool size |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::store::{InMemoryJobStore, InitError, JobStore, PostgresJobStore, SqliteJobStore};

pub const STORE_VAR: &str = "JOBFORGE_STORE";
pub const SQLITE_URL_VAR: &str = "JOBFORGE_SQLITE_URL";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "JOBFORGE_DB_MAX_CONNECTIONS";

pub const DEFAULT_SQLITE_URL: &str = "sqlite://jobforge.db?mode=rwc";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown job store backend '{0}' (expected memory, sqlite or postgres)")]
    UnknownBackend(String),

    #[error("{0} must be set")]
    MissingVar(&'static str),

    #[error("invalid value '{value}' for {name}: {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Which backend to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
    Postgres,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::Postgres => "postgres",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" | "in-memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// Resolved store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub sqlite_url: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            sqlite_url: DEFAULT_SQLITE_URL.to_string(),
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl StoreSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let backend = get(STORE_VAR)
            .map(|value| value.parse::<StoreBackend>())
            .transpose()?
            .unwrap_or_default();

        let max_connections = match get(MAX_CONNECTIONS_VAR) {
            Some(value) => parse_max_connections(&value)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let database_url = get(DATABASE_URL_VAR);
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar(DATABASE_URL_VAR));
        }

        Ok(Self {
            backend,
            sqlite_url: get(SQLITE_URL_VAR).unwrap_or_else(|| DEFAULT_SQLITE_URL.to_string()),
            database_url,
            max_connections,
        })
    }

    /// Construct the selected backend. Callers still run `initialize` on it.
    pub fn open(&self) -> Result<Arc<dyn JobStore>, InitError> {
        info!(backend = %self.backend, "opening job store");
        let store: Arc<dyn JobStore> = match self.backend {
            StoreBackend::Memory => Arc::new(InMemoryJobStore::new()),
            StoreBackend::Sqlite => {
                Arc::new(SqliteJobStore::connect(&self.sqlite_url, self.max_connections)?)
            }
            StoreBackend::Postgres => {
                let url = self.database_url.as_deref().ok_or_else(|| InitError::Connect {
                    backend: "postgres",
                    message: format!("{DATABASE_URL_VAR} is not configured"),
                })?;
                Arc::new(PostgresJobStore::connect(url, self.max_connections)?)
            }
        };
        Ok(store)
    }
}

fn parse_max_connections(value: &str) -> Result<u32, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidVar {
        name: MAX_CONNECTIONS_VAR,
        value: value.to_string(),
        reason,
    };
    match value.trim().parse::<u32>() {
        Ok(0) => Err(invalid("must be at least 1".to_string())),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(e.to_string())),
    }
}
