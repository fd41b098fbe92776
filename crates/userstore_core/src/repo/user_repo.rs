//! User repository facade.
//!
//! # Responsibility
//! - Provide `get`, `get_all`, `insert_or_update`, `delete`, `delete_all`
//!   and `observe` for callers outside the storage layer.
//! - Route each call through `DbOperations` to `SqliteUserDao`.
//!
//! # Invariants
//! - No business logic beyond delegation.
//! - DAO errors reach the caller unchanged.

use crate::config::DatabaseConfig;
use crate::dao::user_dao::{DaoError, DaoResult, SqliteUserDao, UserDao};
use crate::db::UserDatabase;
use crate::model::user::{User, UserId};
use crate::ops::{DbOperations, OperationDescriptor, OperationSink};
use futures::stream::BoxStream;
use rusqlite::Connection;
use std::sync::Arc;

const LOG_TAG: &str = "UserRepository";

/// Public entry point for user persistence.
#[derive(Clone)]
pub struct UserRepository {
    ops: DbOperations,
}

impl UserRepository {
    pub fn new(database: &UserDatabase) -> Self {
        Self {
            ops: database.operations(LOG_TAG),
        }
    }

    /// Same as `new`, with operation events routed to `sink`.
    pub fn with_sink(database: &UserDatabase, sink: Arc<dyn OperationSink>) -> Self {
        Self {
            ops: database.operations(LOG_TAG).with_sink(sink),
        }
    }

    pub async fn get(&self, id: UserId) -> DaoResult<Option<User>> {
        self.ops
            .execute_read("get", move |conn: &mut Connection| {
                SqliteUserDao::new(conn).get(id)
            })
            .await
    }

    pub async fn get_all(&self) -> DaoResult<Vec<User>> {
        self.ops
            .execute_read("get_all", |conn: &mut Connection| {
                SqliteUserDao::new(conn).get_all()
            })
            .await
    }

    /// Inserts `user`, or replaces the stored row with the same id.
    pub async fn insert_or_update(&self, user: User) -> DaoResult<()> {
        let descriptor = OperationDescriptor::new("insert_or_update").with_payload(&user);
        self.ops
            .execute_write(descriptor, move |conn: &mut Connection| {
                SqliteUserDao::new(conn).insert_or_replace(&user)
            })
            .await
    }

    /// Batch upsert; either every user is written or none is.
    pub async fn insert_or_update_all(&self, users: Vec<User>) -> DaoResult<()> {
        let descriptor = OperationDescriptor::new("insert_or_update_all").with_payload(&users);
        self.ops
            .execute_write(descriptor, move |conn: &mut Connection| {
                SqliteUserDao::new(conn).insert_or_replace_all(&users)
            })
            .await
    }

    /// Deletes the stored row whose id matches `user.id`.
    pub async fn delete(&self, user: User) -> DaoResult<()> {
        let descriptor = OperationDescriptor::new("delete").with_payload(&user);
        self.ops
            .execute_write(descriptor, move |conn: &mut Connection| {
                SqliteUserDao::new(conn).delete(&user)
            })
            .await
    }

    pub async fn delete_all(&self) -> DaoResult<()> {
        self.ops
            .execute_write("delete_all", |conn: &mut Connection| {
                SqliteUserDao::new(conn).delete_all()
            })
            .await
    }

    /// Live view of the whole table: one snapshot now, then one after every
    /// committed change to `users`.
    pub fn observe(&self) -> BoxStream<'static, Result<Vec<User>, DaoError>> {
        self.ops.execute_observe(
            "observe",
            DatabaseConfig::TABLE_USERS,
            |conn: &mut Connection| SqliteUserDao::new(conn).get_all(),
        )
    }
}
