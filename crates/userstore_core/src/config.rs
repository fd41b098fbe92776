//! Static database constants and runtime store configuration.
//!
//! # Responsibility
//! - Hold the fixed names and versions shared by schema, DAO and tests.
//! - Resolve runtime settings (database location, logging) from the
//!   environment with stable defaults.
//!
//! # Invariants
//! - `DatabaseConfig` values never change at runtime.
//! - `SCHEMA_VERSION` equals the latest registered migration version.

use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "USERSTORE_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "USERSTORE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "USERSTORE_LOG_DIR";

const DEFAULT_WORKER_NAME: &str = "userstore-db";
const MEMORY_PATH_TOKEN: &str = ":memory:";

/// Fixed naming and versioning constants for the user database.
pub struct DatabaseConfig;

impl DatabaseConfig {
    /// File name of the production database.
    pub const DATABASE_NAME: &'static str = "users.db";
    /// File name of the database used by test contexts.
    pub const TEST_DATABASE_NAME: &'static str = "users_test.db";
    /// Schema version mirrored into `PRAGMA user_version`.
    pub const SCHEMA_VERSION: u32 = 1;
    /// The single table holding `User` rows.
    pub const TABLE_USERS: &'static str = "users";
}

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

impl DatabaseLocation {
    /// Stable label used in log lines.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }
}

/// Runtime configuration for opening a `UserDatabase`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub location: DatabaseLocation,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Absolute log directory; `None` leaves logging to the host.
    pub log_dir: Option<PathBuf>,
    /// Thread name of the background query worker.
    pub worker_name: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: DatabaseLocation::File(
                std::env::temp_dir().join(DatabaseConfig::DATABASE_NAME),
            ),
            log_level: crate::logging::default_log_level().to_string(),
            log_dir: None,
            worker_name: DEFAULT_WORKER_NAME.to_string(),
        }
    }
}

impl StoreConfig {
    /// Production file database inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            location: DatabaseLocation::File(dir.as_ref().join(DatabaseConfig::DATABASE_NAME)),
            ..Self::default()
        }
    }

    /// Test file database inside `dir`, kept apart from production data.
    pub fn for_tests(dir: impl AsRef<Path>) -> Self {
        Self {
            location: DatabaseLocation::File(
                dir.as_ref().join(DatabaseConfig::TEST_DATABASE_NAME),
            ),
            ..Self::default()
        }
    }

    /// In-memory database; contents vanish with the handle.
    pub fn in_memory() -> Self {
        Self {
            location: DatabaseLocation::Memory,
            ..Self::default()
        }
    }

    /// Builds a config from `USERSTORE_*` environment variables.
    ///
    /// Blank values fall back to defaults. `USERSTORE_DB_PATH=:memory:`
    /// selects an in-memory database.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(path) = read(ENV_DB_PATH) {
            config.location = if path == MEMORY_PATH_TOKEN {
                DatabaseLocation::Memory
            } else {
                DatabaseLocation::File(PathBuf::from(path))
            };
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = level;
        }
        config.log_dir = read(ENV_LOG_DIR).map(PathBuf::from);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::{DatabaseConfig, DatabaseLocation, StoreConfig, ENV_DB_PATH, ENV_LOG_DIR};
    use crate::db::migrations::latest_version;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn schema_version_matches_latest_migration() {
        assert_eq!(DatabaseConfig::SCHEMA_VERSION, latest_version());
    }

    #[test]
    fn from_env_uses_defaults_for_missing_or_blank_values() {
        let config = StoreConfig::from_lookup(lookup(&[(ENV_DB_PATH, "   ")]));
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn from_env_reads_path_and_memory_token() {
        let file = StoreConfig::from_lookup(lookup(&[
            (ENV_DB_PATH, " /data/app/users.db "),
            (ENV_LOG_DIR, "/data/app/logs"),
        ]));
        assert_eq!(
            file.location,
            DatabaseLocation::File(PathBuf::from("/data/app/users.db"))
        );
        assert_eq!(file.log_dir, Some(PathBuf::from("/data/app/logs")));

        let memory = StoreConfig::from_lookup(lookup(&[(ENV_DB_PATH, ":memory:")]));
        assert_eq!(memory.location, DatabaseLocation::Memory);
    }

    #[test]
    fn test_config_uses_test_database_name() {
        let config = StoreConfig::for_tests("/tmp/x");
        assert_eq!(
            config.location,
            DatabaseLocation::File(PathBuf::from("/tmp/x").join(DatabaseConfig::TEST_DATABASE_NAME))
        );
    }
}
