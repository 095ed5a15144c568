//! Per-job directory tree under the download root.
//!
//! Layout:
//!
//! ```text
//! <download-root>/<job-id>/<issue-slot>/<page-number>.<ext>
//! <download-root>/<job-id>/<sanitized-name>.pdf
//! ```
//!
//! Every fetched page lands inside its job's tree, and jobs never share a
//! root, so concurrent jobs never contend on the filesystem.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::jobs::{Job, Step};

/// Filesystem failure while preparing or removing a job tree.
#[derive(Debug, Error)]
#[error("filesystem error at {path}: {source}")]
pub struct LayoutError {
    /// Path that failed.
    pub path: PathBuf,
    /// Underlying IO error.
    #[source]
    pub source: io::Error,
}

impl LayoutError {
    fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Resolves and manages job directories under a single download root.
#[derive(Debug, Clone)]
pub struct JobLayout {
    root: PathBuf,
}

impl JobLayout {
    /// Creates a layout rooted at `root`. Nothing is touched on disk yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The download root shared by all jobs.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<job-id>`
    #[must_use]
    pub fn job_root(&self, job_id: i64) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// `<root>/<job-id>/<issue-slot>`
    #[must_use]
    pub fn issue_dir(&self, job_id: i64, issue_slot: i64) -> PathBuf {
        self.job_root(job_id).join(issue_slot.to_string())
    }

    /// Deterministic on-disk location of a step's page image.
    #[must_use]
    pub fn page_path(&self, step: &Step) -> PathBuf {
        self.issue_dir(step.job_id, step.issue_slot)
            .join(format!("{}.{}", step.page_number, step.image_extension()))
    }

    /// Creates the job root and one directory per issue slot.
    ///
    /// Safe to call repeatedly; existing directories are left untouched so a
    /// retry can re-enter without cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] when a directory cannot be created.
    #[instrument(skip(self, job), fields(job_id = job.id, total_issues = job.total_issues))]
    pub async fn prepare(&self, job: &Job) -> Result<PathBuf, LayoutError> {
        let job_root = self.job_root(job.id);
        tokio::fs::create_dir_all(&job_root)
            .await
            .map_err(|e| LayoutError::new(&job_root, e))?;

        for slot in 0..job.total_issues {
            let dir = self.issue_dir(job.id, slot);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| LayoutError::new(&dir, e))?;
        }

        debug!(path = %job_root.display(), "job directories ready");
        Ok(job_root)
    }

    /// Recursively removes a job's tree.
    ///
    /// Returns `false` when there was nothing to remove.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] for any failure other than the tree being absent.
    #[instrument(skip(self))]
    pub async fn teardown(&self, job_id: i64) -> Result<bool, LayoutError> {
        let job_root = self.job_root(job_id);
        match tokio::fs::remove_dir_all(&job_root).await {
            Ok(()) => {
                debug!(path = %job_root.display(), "job directory removed");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LayoutError::new(job_root, e)),
        }
    }
}
