//! Error types for catalog operations.

use thiserror::Error;

use crate::db::DbErrorKind;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification of the failure.
        kind: DbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// No comic exists with the given id.
    #[error("comic not found: id {0}")]
    ComicNotFound(i64),

    /// No issue exists with the given id.
    #[error("issue not found: id {0}")]
    IssueNotFound(i64),

    /// A required field was empty.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the offending field.
        field: &'static str,
    },
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: DbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl CatalogError {
    /// Returns true when the error means the referenced entity does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ComicNotFound(_) | Self::IssueNotFound(_))
    }

    /// Returns the database failure classification when available.
    #[must_use]
    pub fn database_kind(&self) -> Option<DbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
