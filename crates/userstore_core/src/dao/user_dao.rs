//! User data-access contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the `users` query surface: fetch by id, fetch all,
//!   insert-or-replace (single and batch), delete, delete all.
//! - Translate between `users` rows and `User` records.
//!
//! # Invariants
//! - Write paths must call `User::validate()` before SQL mutations.
//! - Read paths must reject invalid persisted state instead of masking it.
//! - Batch writes are all-or-nothing.

use crate::config::DatabaseConfig;
use crate::db::migrations::current_user_version;
use crate::db::DbError;
use crate::model::user::{User, UserId, UserValidationError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const USER_SELECT_SQL: &str = "SELECT id, first_name, last_name FROM users";
const USER_UPSERT_SQL: &str =
    "INSERT OR REPLACE INTO users (id, first_name, last_name) VALUES (?1, ?2, ?3);";

pub type DaoResult<T> = Result<T, DaoError>;

/// Error for user persistence and query operations.
#[derive(Debug)]
pub enum DaoError {
    Validation(UserValidationError),
    Db(DbError),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl Display for DaoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted user data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
        }
    }
}

impl Error for DaoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<UserValidationError> for DaoError {
    fn from(value: UserValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for DaoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for DaoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Operations permitted against the `users` table.
pub trait UserDao {
    /// At most one row.
    fn get(&self, id: UserId) -> DaoResult<Option<User>>;
    /// All rows ordered by id.
    fn get_all(&self) -> DaoResult<Vec<User>>;
    /// Inserts, or replaces the row with the same id. Returns the row id.
    fn insert_or_replace(&self, user: &User) -> DaoResult<UserId>;
    /// Batch form of `insert_or_replace` in a single transaction.
    fn insert_or_replace_all(&self, users: &[User]) -> DaoResult<Vec<UserId>>;
    /// Deletes the row matching `user.id`. Unsaved users delete nothing.
    fn delete(&self, user: &User) -> DaoResult<usize>;
    /// Deletes every row and returns how many were removed.
    fn delete_all(&self) -> DaoResult<usize>;
}

/// SQLite-backed user DAO.
pub struct SqliteUserDao<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserDao<'conn> {
    /// Wraps a connection already opened through `db::open_*`.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Wraps an arbitrary connection after checking it is migrated.
    ///
    /// # Errors
    /// - `UninitializedConnection` when `user_version` differs from the schema version.
    /// - `MissingRequiredTable` when the `users` table does not exist.
    pub fn try_new(conn: &'conn Connection) -> DaoResult<Self> {
        let actual_version = current_user_version(conn)?;
        if actual_version != DatabaseConfig::SCHEMA_VERSION {
            return Err(DaoError::UninitializedConnection {
                expected_version: DatabaseConfig::SCHEMA_VERSION,
                actual_version,
            });
        }

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [DatabaseConfig::TABLE_USERS],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DaoError::MissingRequiredTable(DatabaseConfig::TABLE_USERS));
        }

        Ok(Self::new(conn))
    }
}

impl UserDao for SqliteUserDao<'_> {
    fn get(&self, id: UserId) -> DaoResult<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
        let user = stmt
            .query_row([id], |row| Ok(user_from_row(row)))
            .optional()?;
        user.transpose()
    }

    fn get_all(&self) -> DaoResult<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();

        while let Some(row) = rows.next()? {
            users.push(user_from_row(row)?);
        }

        Ok(users)
    }

    fn insert_or_replace(&self, user: &User) -> DaoResult<UserId> {
        user.validate()?;
        upsert(self.conn, user)
    }

    fn insert_or_replace_all(&self, users: &[User]) -> DaoResult<Vec<UserId>> {
        for user in users {
            user.validate()?;
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut ids = Vec::with_capacity(users.len());
        for user in users {
            ids.push(upsert(&tx, user)?);
        }
        tx.commit()?;

        Ok(ids)
    }

    fn delete(&self, user: &User) -> DaoResult<usize> {
        user.validate()?;
        let Some(id) = user.id else {
            return Ok(0);
        };

        let changed = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1;", [id])?;
        Ok(changed)
    }

    fn delete_all(&self) -> DaoResult<usize> {
        // A WHERE clause keeps SQLite off the truncate path, which skips the update hook.
        let changed = self
            .conn
            .execute("DELETE FROM users WHERE id IS NOT NULL;", [])?;
        Ok(changed)
    }
}

fn upsert(conn: &Connection, user: &User) -> DaoResult<UserId> {
    conn.execute(
        USER_UPSERT_SQL,
        params![
            user.id,
            user.first_name.as_deref(),
            user.last_name.as_deref()
        ],
    )?;
    Ok(user.id.unwrap_or_else(|| conn.last_insert_rowid()))
}

/// Maps one `users` row to a validated `User`.
pub fn user_from_row(row: &Row<'_>) -> DaoResult<User> {
    let id: UserId = row.get("id")?;
    let user = User {
        id: Some(id),
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
    };
    user
        .validate()
        .map_err(|err| DaoError::InvalidData(format!("{err} in users.id")))?;
    Ok(user)
}
