//! Durable job and step state.
//!
//! This module is the single source of truth for what remains to be fetched.
//! It records one [`Job`] per download run and one [`Step`] per page, and it
//! is the only place that writes a job's `complete` flag.
//!
//! # Overview
//!
//! - [`JobStore`] - `SQLite`-backed store
//! - [`JobRepository`] - seam used by the dispatcher to persist outcomes
//! - [`Job`], [`Step`], [`StepState`], [`PageKey`] - records and views
//! - [`JobError`] - operation error types
//!
//! # Example
//!
//! ```ignore
//! use comicdl_core::jobs::{JobStore, RequestedIssue, RequestedPage};
//! use comicdl_core::Database;
//!
//! let store = JobStore::new(Database::new_in_memory().await?);
//! let issue = RequestedIssue {
//!     pages: vec![RequestedPage { page_id: None, page_number: 1, image_link: url }],
//!     ..RequestedIssue::default()
//! };
//! let (job, steps) = store.create_job("Saga #1", &[issue]).await?;
//! ```

mod error;
mod model;
mod repository;

pub use error::JobError;
pub use model::{
    DEFAULT_IMAGE_EXTENSION, Job, JobListing, PageKey, RequestedIssue, RequestedPage, Step,
    StepState, image_extension,
};
pub use repository::JobRepository;

use tracing::{debug, info, instrument};

use crate::db::Database;
use crate::layout::JobLayout;

/// Result type for job store operations.
pub type Result<T> = std::result::Result<T, JobError>;

const JOB_COLUMNS: &str =
    "id, name, downloaded_pages, total_pages, total_issues, complete, created_at, updated_at";

const STEP_COLUMNS: &str = "id, job_id, page_id, image_link, page_number, issue_slot, issue_link, \
     complete, retry, attempts, last_error";

/// A step before it has been persisted.
struct PlannedStep<'a> {
    page: &'a RequestedPage,
    issue_slot: i64,
    issue_link: Option<&'a str>,
}

/// Expands requested issues into steps: issues in request order, pages in
/// page-number order, slots counted from 0.
fn plan_steps(issues: &[RequestedIssue]) -> Result<Vec<PlannedStep<'_>>> {
    if issues.is_empty() {
        return Err(JobError::EmptyJob);
    }

    let mut planned = Vec::new();
    for (slot, issue) in (0_i64..).zip(issues) {
        if issue.pages.is_empty() {
            return Err(JobError::EmptyIssue { issue_slot: slot });
        }

        let mut pages: Vec<&RequestedPage> = issue.pages.iter().collect();
        pages.sort_by_key(|page| page.page_number);

        if let Some(pair) = pages
            .windows(2)
            .find(|pair| pair[0].page_number == pair[1].page_number)
        {
            return Err(JobError::DuplicatePage {
                issue_slot: slot,
                page_number: pair[0].page_number,
            });
        }

        planned.extend(pages.into_iter().map(|page| PlannedStep {
            page,
            issue_slot: slot,
            issue_link: issue.issue_link.as_deref(),
        }));
    }

    Ok(planned)
}

/// Job/step store backed by `SQLite`.
#[derive(Debug, Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    /// Creates a store on top of an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates a job and all of its steps in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::EmptyJob`], [`JobError::EmptyIssue`] or
    /// [`JobError::DuplicatePage`] for malformed requests, and
    /// [`JobError::Database`] if persisting fails.
    #[instrument(skip(self, issues), fields(issues = issues.len()))]
    pub async fn create_job(
        &self,
        name: &str,
        issues: &[RequestedIssue],
    ) -> Result<(Job, Vec<Step>)> {
        let planned = plan_steps(issues)?;
        let total_pages = i64::try_from(planned.len()).unwrap_or(i64::MAX);
        let total_issues = i64::try_from(issues.len()).unwrap_or(i64::MAX);

        let mut tx = self.db.pool().begin().await?;

        let job = sqlx::query_as::<_, Job>(&format!(
            "INSERT INTO download_jobs (name, downloaded_pages, total_pages, total_issues, complete)
             VALUES (?, 0, ?, ?, 0)
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(name)
        .bind(total_pages)
        .bind(total_issues)
        .fetch_one(&mut *tx)
        .await?;

        let insert_step = format!(
            "INSERT INTO download_job_steps
                 (job_id, page_id, image_link, page_number, issue_slot, issue_link)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {STEP_COLUMNS}"
        );

        let mut steps = Vec::with_capacity(planned.len());
        for step in &planned {
            let created = sqlx::query_as::<_, Step>(&insert_step)
                .bind(job.id)
                .bind(step.page.page_id)
                .bind(&step.page.image_link)
                .bind(step.page.page_number)
                .bind(step.issue_slot)
                .bind(step.issue_link)
                .fetch_one(&mut *tx)
                .await?;
            steps.push(created);
        }

        tx.commit().await?;

        info!(
            job_id = job.id,
            total_pages, total_issues, "download job created"
        );
        Ok((job, steps))
    }

    /// Loads a job by id, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn find_job(&self, job_id: i64) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM download_jobs WHERE id = ?"
        ))
        .bind(job_id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(job)
    }

    /// Loads a job by id.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::JobNotFound`] if no job has this id.
    pub async fn get_job(&self, job_id: i64) -> Result<Job> {
        self.find_job(job_id)
            .await?
            .ok_or(JobError::JobNotFound(job_id))
    }

    /// All steps of a job in `(issue_slot, page_number)` order.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn steps(&self, job_id: i64) -> Result<Vec<Step>> {
        let steps = sqlx::query_as::<_, Step>(&format!(
            "SELECT {STEP_COLUMNS} FROM download_job_steps
             WHERE job_id = ?
             ORDER BY issue_slot ASC, page_number ASC"
        ))
        .bind(job_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(steps)
    }

    /// Steps still to fetch, in `(issue_slot, page_number)` order.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn incomplete_steps(&self, job_id: i64) -> Result<Vec<Step>> {
        let steps = sqlx::query_as::<_, Step>(&format!(
            "SELECT {STEP_COLUMNS} FROM download_job_steps
             WHERE job_id = ? AND complete = 0
             ORDER BY issue_slot ASC, page_number ASC"
        ))
        .bind(job_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(steps)
    }

    /// Marks a step fetched and bumps the job's page counter.
    ///
    /// Returns `false` if the step was already complete, in which case the
    /// counter is left alone. The counter uses an in-SQL increment so that
    /// concurrent workers never race on it.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::StepNotFound`] if no step has this id.
    #[instrument(skip(self))]
    pub async fn record_step_success(&self, step_id: i64) -> Result<bool> {
        let job_id = sqlx::query_scalar::<_, i64>(
            r"UPDATE download_job_steps
              SET complete = 1, retry = 0, last_error = NULL,
                  attempts = attempts + 1, updated_at = datetime('now')
              WHERE id = ? AND complete = 0
              RETURNING job_id",
        )
        .bind(step_id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(job_id) = job_id else {
            self.ensure_step_exists(step_id).await?;
            debug!(step_id, "step already complete");
            return Ok(false);
        };

        sqlx::query(
            r"UPDATE download_jobs
              SET downloaded_pages = downloaded_pages + 1, updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(job_id)
        .execute(self.db.pool())
        .await?;

        Ok(true)
    }

    /// Records a failed attempt: the step stays incomplete and is flagged for retry.
    ///
    /// A step that is already complete is never reverted.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::StepNotFound`] if no step has this id.
    #[instrument(skip(self), fields(reason = %reason))]
    pub async fn record_step_failure(&self, step_id: i64, reason: &str) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE download_job_steps
              SET retry = 1, last_error = ?,
                  attempts = attempts + 1, updated_at = datetime('now')
              WHERE id = ? AND complete = 0",
        )
        .bind(reason)
        .bind(step_id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            self.ensure_step_exists(step_id).await?;
        }
        Ok(())
    }

    /// Reconciles `downloaded_pages` with the steps and sets `complete` when
    /// no step is left to fetch. Returns the resulting `complete` value.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::JobNotFound`] if no job has this id.
    #[instrument(skip(self))]
    pub async fn mark_job_complete_if_done(&self, job_id: i64) -> Result<bool> {
        let complete = sqlx::query_scalar::<_, bool>(
            r"UPDATE download_jobs
              SET downloaded_pages = (
                      SELECT COUNT(*) FROM download_job_steps
                      WHERE job_id = download_jobs.id AND complete = 1
                  ),
                  complete = CASE WHEN EXISTS (
                      SELECT 1 FROM download_job_steps
                      WHERE job_id = download_jobs.id AND complete = 0
                  ) THEN 0 ELSE 1 END,
                  updated_at = datetime('now')
              WHERE id = ?
              RETURNING complete",
        )
        .bind(job_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or(JobError::JobNotFound(job_id))?;

        debug!(job_id, complete, "completion check");
        Ok(complete)
    }

    /// All jobs, split by completion.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_jobs(&self) -> Result<JobListing> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM download_jobs ORDER BY id ASC"
        ))
        .fetch_all(self.db.pool())
        .await?;

        let (complete, incomplete): (Vec<Job>, Vec<Job>) =
            jobs.into_iter().partition(|job| job.complete);
        Ok(JobListing {
            incomplete,
            complete,
        })
    }

    /// Jobs whose completion flag is set.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn complete_jobs(&self) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM download_jobs WHERE complete = 1 ORDER BY id ASC"
        ))
        .fetch_all(self.db.pool())
        .await?;
        Ok(jobs)
    }

    /// Deletes a job's steps, then the job, then its directory tree.
    ///
    /// Allowed in any job state. Returns the deleted job.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::JobNotFound`] if no job has this id, and
    /// [`JobError::Layout`] if the tree could not be removed (the records are
    /// already gone at that point).
    #[instrument(skip(self, layout))]
    pub async fn delete_job(&self, job_id: i64, layout: &JobLayout) -> Result<Job> {
        let job = self.get_job(job_id).await?;

        let mut tx = self.db.pool().begin().await?;
        let removed_steps = sqlx::query("DELETE FROM download_job_steps WHERE job_id = ?")
            .bind(job_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM download_jobs WHERE id = ?")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let removed_tree = layout.teardown(job_id).await?;
        info!(job_id, removed_steps, removed_tree, "download job deleted");
        Ok(job)
    }

    async fn ensure_step_exists(&self, step_id: i64) -> Result<()> {
        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM download_job_steps WHERE id = ?")
            .bind(step_id)
            .fetch_optional(self.db.pool())
            .await?;
        exists.map(|_| ()).ok_or(JobError::StepNotFound(step_id))
    }
}
