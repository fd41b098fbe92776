//! Layered SQLite access for user records.
//!
//! Configuration → entity → data-access interface → database handle →
//! operation wrapper → repository facade. Callers outside this crate only
//! need `StoreConfig`, `UserDatabase`, `UserRepository` and `User`.

pub mod config;
pub mod dao;
pub mod db;
pub mod logging;
pub mod model;
pub mod ops;
pub mod repo;

pub use config::{DatabaseConfig, DatabaseLocation, StoreConfig};
pub use dao::user_dao::{DaoError, DaoResult, SqliteUserDao, UserDao};
pub use db::{DbError, DbResult, UserDatabase};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::user::{User, UserId, UserValidationError};
pub use ops::{DbOperations, OperationDescriptor, OperationEvent, OperationPhase, OperationSink};
pub use repo::user_repo::UserRepository;

/// Opens the store described by `config`: starts logging when a log
/// directory is configured, then opens and migrates the database.
pub fn open_store(config: &StoreConfig) -> Result<(UserDatabase, UserRepository), String> {
    init_logging_from_config(config)?;
    let database =
        UserDatabase::open(config).map_err(|err| format!("database open failed: {err}"))?;
    let repository = UserRepository::new(&database);
    Ok((database, repository))
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
