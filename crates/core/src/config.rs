//! Store configuration.
//!
//! Configuration is resolved once at process startup and then handed to
//! [`SqliteStore::open`](crate::store::SqliteStore::open). Nothing in the core reads environment
//! variables while serving a request; `from_lookup` exists so tests can supply values without
//! touching the process environment.

use crate::constants::{
    DATABASE_BUSY_TIMEOUT_DEFAULT_MS, DATABASE_BUSY_TIMEOUT_VAR, DATABASE_DIR_DEFAULT,
    DATABASE_DIR_VAR, DATABASE_FILE_EXTENSION, DATABASE_NAME_DEFAULT, DATABASE_NAME_VAR,
};
use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection parameters for the relational store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    database_dir: PathBuf,
    database_name: String,
    busy_timeout: Duration,
}

impl StoreConfig {
    /// Create a new `StoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if `database_name` is blank or contains a path
    /// separator.
    pub fn new(
        database_dir: PathBuf,
        database_name: impl Into<String>,
        busy_timeout: Duration,
    ) -> CoreResult<Self> {
        let database_name = database_name.into().trim().to_string();
        if database_name.is_empty() {
            return Err(CoreError::InvalidInput(
                "database name cannot be empty".into(),
            ));
        }
        if database_name.contains(['/', '\\']) {
            return Err(CoreError::InvalidInput(format!(
                "database name must not contain a path separator: {database_name}"
            )));
        }

        Ok(Self {
            database_dir,
            database_name,
            busy_timeout,
        })
    }

    /// Resolve configuration from the process environment.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through `lookup`, falling back to the documented defaults for
    /// unset or blank keys.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `APP_DATABASE_DIR` | `.` |
    /// | `APP_DATABASE_NAME` | `kwikmedical` |
    /// | `APP_DATABASE_BUSY_TIMEOUT_MS` | `5000` |
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CoreResult<Self> {
        let value = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_dir = value(DATABASE_DIR_VAR).unwrap_or_else(|| DATABASE_DIR_DEFAULT.into());
        let database_name =
            value(DATABASE_NAME_VAR).unwrap_or_else(|| DATABASE_NAME_DEFAULT.into());
        let busy_timeout_ms = value(DATABASE_BUSY_TIMEOUT_VAR)
            .map(|raw| {
                raw.parse::<u64>().map_err(|_| {
                    CoreError::InvalidInput(format!(
                        "{DATABASE_BUSY_TIMEOUT_VAR} must be a whole number of milliseconds, got {raw:?}"
                    ))
                })
            })
            .transpose()?
            .unwrap_or(DATABASE_BUSY_TIMEOUT_DEFAULT_MS);

        Self::new(
            PathBuf::from(database_dir),
            database_name,
            Duration::from_millis(busy_timeout_ms),
        )
    }

    pub fn database_dir(&self) -> &Path {
        &self.database_dir
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Full path of the database file.
    pub fn database_path(&self) -> PathBuf {
        self.database_dir
            .join(&self.database_name)
            .with_extension(DATABASE_FILE_EXTENSION)
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }
}
