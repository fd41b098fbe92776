//! User entity model.
//!
//! # Responsibility
//! - Define the in-memory record mapped to one `users` row.
//! - Validate identifier shape before persistence.
//!
//! # Invariants
//! - `id == None` means the record has not been persisted yet.
//! - Persisted identifiers are positive and assigned by storage.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Storage-assigned row identifier.
pub type UserId = i64;

/// Entity record for the `users` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// `None` until storage generates one on insert.
    pub id: Option<UserId>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Validation errors for `User` write paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    NonPositiveId(UserId),
}

impl Display for UserValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveId(id) => {
                write!(f, "user id must be positive when present, got {id}")
            }
        }
    }
}

impl Error for UserValidationError {}

impl User {
    /// Creates an unsaved user; storage assigns the id on insert.
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: None,
            first_name: Some(first_name.into()),
            last_name: Some(last_name.into()),
        }
    }

    /// Returns a copy bound to an existing identifier.
    pub fn with_id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether this record came from (or was written to) storage.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Joins the present name parts with a single space.
    pub fn display_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn validate(&self) -> Result<(), UserValidationError> {
        match self.id {
            Some(id) if id <= 0 => Err(UserValidationError::NonPositiveId(id)),
            _ => Ok(()),
        }
    }
}
