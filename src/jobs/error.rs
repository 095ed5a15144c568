//! Error types for job/step store operations.

use thiserror::Error;

use crate::db::DbErrorKind;
use crate::layout::LayoutError;

/// Errors that can occur during job store operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification of the failure.
        kind: DbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// No job exists with the given id.
    #[error(
        "download job not found: id {0}\n  Suggestion: The job may have been deleted; list jobs to see current ids"
    )]
    JobNotFound(i64),

    /// No step exists with the given id.
    #[error("download step not found: id {0}")]
    StepNotFound(i64),

    /// A job was requested without any issues.
    #[error("a download job needs at least one issue")]
    EmptyJob,

    /// A requested issue had no pages, so it would occupy an empty slot.
    #[error("issue in slot {issue_slot} has no pages")]
    EmptyIssue {
        /// Slot the empty issue would have taken.
        issue_slot: i64,
    },

    /// Two pages of one issue share a page number.
    #[error("duplicate page {page_number} in issue slot {issue_slot}")]
    DuplicatePage {
        /// Slot of the offending issue.
        issue_slot: i64,
        /// Repeated page number.
        page_number: i64,
    },

    /// Removing the job's directory tree failed.
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

impl From<sqlx::Error> for JobError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: DbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl JobError {
    /// Returns true when the error means the referenced entity does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound(_) | Self::StepNotFound(_))
    }
}
