//! Download job operations exposed to callers.
//!
//! [`DownloadService`] drives a job through its phases: resolve issues, persist
//! the job and its steps, prepare the directory tree, fetch, run the
//! completion check, and assemble. The fetch and assembly phases of one job
//! never overlap.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::assemble::{AssembleError, Assembler, AssemblyOutcome};
use crate::catalog::{CatalogError, IssuePages, IssueSource};
use crate::download::{DispatchReport, Dispatcher, EngineError, HttpClient, PageFetcher};
use crate::jobs::{Job, JobError, JobListing, JobStore, RequestedIssue, RequestedPage, Step};
use crate::layout::{JobLayout, LayoutError};

/// Errors returned by [`DownloadService`] operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Catalog lookup failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Job store operation failed.
    #[error(transparent)]
    Job(#[from] JobError),

    /// Preparing the job's directory tree failed.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// The worker pool could not run.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Assembling the document failed.
    #[error(transparent)]
    Assemble(#[from] AssembleError),

    /// None of the requested issues could be used.
    #[error("none of the requested issues could be resolved ({} skipped)", skipped.len())]
    NoIssuesResolved {
        /// Why each issue was skipped.
        skipped: Vec<IssueFailure>,
    },
}

impl ServiceError {
    /// Returns true when the error means the referenced entity does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Catalog(e) => e.is_not_found(),
            Self::Job(e) => e.is_not_found(),
            Self::NoIssuesResolved { .. } => true,
            _ => false,
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// An issue left out of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueFailure {
    pub issue_id: i64,
    pub reason: String,
}

/// A job a bulk operation could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub job_id: i64,
    pub reason: String,
}

/// Result of creating or retrying a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRunSummary {
    /// Job state after the completion check.
    pub job: Job,
    /// Outcomes of the steps fetched in this run.
    pub dispatch: DispatchReport,
    /// Requested issues that were left out of the job.
    pub skipped_issues: Vec<IssueFailure>,
    /// Assembly result, when the assembler ran. An assembly error is
    /// reported here as [`AssemblyOutcome::Failed`] rather than failing the run.
    pub assembly: Option<AssemblyOutcome>,
}

/// Result of deleting all completed jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkDeleteSummary {
    pub deleted: Vec<Job>,
    pub failed: Vec<JobFailure>,
}

/// Derives a job name from its issues: `"<comic> - <issue>"` for one issue,
/// `"<comic> (<n> issues)"` for several.
#[must_use]
pub fn derive_job_name(issues: &[IssuePages]) -> String {
    match issues {
        [] => String::new(),
        [only] => format!("{} - {}", only.comic_title, only.issue.title),
        [first, ..] => format!("{} ({} issues)", first.comic_title, issues.len()),
    }
}

fn requested_issue(resolved: &IssuePages) -> RequestedIssue {
    RequestedIssue {
        issue_id: Some(resolved.issue.id),
        issue_link: Some(resolved.issue.link.clone()),
        pages: resolved
            .pages
            .iter()
            .map(|page| RequestedPage {
                page_id: Some(page.id),
                page_number: page.page_number,
                image_link: page.image_link.clone(),
            })
            .collect(),
    }
}

/// Orchestrates download jobs over the catalog, store, worker pool and assembler.
pub struct DownloadService {
    issues: Arc<dyn IssueSource>,
    store: Arc<JobStore>,
    layout: JobLayout,
    dispatcher: Dispatcher,
    fetcher: PageFetcher,
    assembler: Assembler,
}

impl std::fmt::Debug for DownloadService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadService")
            .field("layout", &self.layout)
            .field("concurrency", &self.dispatcher.concurrency())
            .finish_non_exhaustive()
    }
}

impl DownloadService {
    /// Creates a service.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Engine`] if `concurrency` is out of range.
    pub fn new(
        issues: Arc<dyn IssueSource>,
        store: JobStore,
        layout: JobLayout,
        client: HttpClient,
        concurrency: usize,
    ) -> Result<Self> {
        Ok(Self {
            issues,
            store: Arc::new(store),
            dispatcher: Dispatcher::new(concurrency)?,
            fetcher: PageFetcher::new(client, layout.clone()),
            assembler: Assembler::new(layout.clone()),
            layout,
        })
    }

    /// The underlying job store.
    #[must_use]
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// The directory layout jobs are written into.
    #[must_use]
    pub fn layout(&self) -> &JobLayout {
        &self.layout
    }

    /// Creates a job for `issue_ids` (in that order) and runs it.
    ///
    /// Unknown issues, and issues without pages, are listed in
    /// `skipped_issues` while the rest proceed. The document is assembled
    /// only if every page was fetched.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NoIssuesResolved`] when no issue is usable,
    /// [`ServiceError::Layout`] when the directory tree cannot be created (the
    /// job record remains and can be retried), and store errors. Assembly
    /// errors are reported in the summary.
    pub async fn create_download_job(
        &self,
        issue_ids: &[i64],
        name: Option<&str>,
    ) -> Result<JobRunSummary> {
        self.create_download_job_with(issue_ids, name, |_| {}).await
    }

    /// Same as [`create_download_job`](Self::create_download_job), calling
    /// `on_created` with the new job's id once it is stored and before any
    /// page is fetched.
    ///
    /// # Errors
    ///
    /// As for [`create_download_job`](Self::create_download_job).
    #[instrument(skip(self, issue_ids, on_created), fields(issues = issue_ids.len()))]
    pub async fn create_download_job_with<F>(
        &self,
        issue_ids: &[i64],
        name: Option<&str>,
        on_created: F,
    ) -> Result<JobRunSummary>
    where
        F: FnOnce(i64) + Send,
    {
        if issue_ids.is_empty() {
            return Err(JobError::EmptyJob.into());
        }

        let mut resolved = Vec::with_capacity(issue_ids.len());
        let mut skipped_issues = Vec::new();
        for &issue_id in issue_ids {
            match self.issues.issue_with_pages(issue_id).await {
                Ok(issue) if issue.pages.is_empty() => {
                    warn!(issue_id, "issue has no pages, skipping");
                    skipped_issues.push(IssueFailure {
                        issue_id,
                        reason: "issue has no pages".to_string(),
                    });
                }
                Ok(issue) => resolved.push(issue),
                Err(e) if e.is_not_found() => {
                    warn!(issue_id, "issue not found, skipping");
                    skipped_issues.push(IssueFailure {
                        issue_id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        if resolved.is_empty() {
            return Err(ServiceError::NoIssuesResolved {
                skipped: skipped_issues,
            });
        }

        let name = match name.map(str::trim) {
            Some(given) if !given.is_empty() => given.to_string(),
            _ => derive_job_name(&resolved),
        };
        let requested: Vec<RequestedIssue> = resolved.iter().map(requested_issue).collect();

        let (job, steps) = self.store.create_job(&name, &requested).await?;
        on_created(job.id);
        self.layout.prepare(&job).await?;

        let (job, dispatch) = self.run_steps(&job, steps).await?;
        let assembly = if job.complete {
            Some(self.assemble_for_run(&job).await)
        } else {
            None
        };

        Ok(JobRunSummary {
            job,
            dispatch,
            skipped_issues,
            assembly,
        })
    }

    /// Fetches the job's incomplete steps again, then assembles.
    ///
    /// Complete steps are never re-fetched. The assembler always runs, so a
    /// partially fetched job yields a partial document.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Job`] with [`JobError::JobNotFound`] for an
    /// unknown job, plus layout and store errors. Assembly errors are
    /// reported in the summary.
    #[instrument(skip(self))]
    pub async fn retry_download_job(&self, job_id: i64) -> Result<JobRunSummary> {
        let job = self.store.get_job(job_id).await?;
        self.layout.prepare(&job).await?;

        let steps = self.store.incomplete_steps(job_id).await?;
        info!(job_id, remaining = steps.len(), "retrying download job");

        let (job, dispatch) = self.run_steps(&job, steps).await?;
        let assembly = self.assemble_for_run(&job).await;

        Ok(JobRunSummary {
            job,
            dispatch,
            skipped_issues: Vec::new(),
            assembly: Some(assembly),
        })
    }

    /// All jobs, split into incomplete and complete.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Job`] if the query fails.
    pub async fn list_download_jobs(&self) -> Result<JobListing> {
        Ok(self.store.list_jobs().await?)
    }

    /// Deletes a job, its steps and its directory tree.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Job`] with [`JobError::JobNotFound`] for an
    /// unknown job.
    #[instrument(skip(self))]
    pub async fn delete_download_job(&self, job_id: i64) -> Result<Job> {
        Ok(self.store.delete_job(job_id, &self.layout).await?)
    }

    /// Deletes every completed job, continuing past individual failures.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Job`] if the completed jobs cannot be listed.
    #[instrument(skip(self))]
    pub async fn delete_completed_download_jobs(&self) -> Result<BulkDeleteSummary> {
        let mut summary = BulkDeleteSummary::default();

        for job in self.store.complete_jobs().await? {
            match self.store.delete_job(job.id, &self.layout).await {
                Ok(deleted) => summary.deleted.push(deleted),
                Err(e) => {
                    warn!(job_id = job.id, error = %e, "failed to delete completed job");
                    summary.failed.push(JobFailure {
                        job_id: job.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            deleted = summary.deleted.len(),
            failed = summary.failed.len(),
            "completed jobs deleted"
        );
        Ok(summary)
    }

    /// Assembles whatever pages of the job are on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Job`] with [`JobError::JobNotFound`] for an
    /// unknown job, and [`ServiceError::Assemble`] if assembly fails.
    #[instrument(skip(self))]
    pub async fn assemble_download_job(&self, job_id: i64) -> Result<AssemblyOutcome> {
        let job = self.store.get_job(job_id).await?;
        self.assemble(&job).await
    }

    /// Dispatches `steps`, then runs the completion check and reloads the job.
    async fn run_steps(&self, job: &Job, steps: Vec<Step>) -> Result<(Job, DispatchReport)> {
        let dispatch = self
            .dispatcher
            .run(&self.fetcher, Arc::clone(&self.store), job, steps)
            .await?;

        self.store.mark_job_complete_if_done(job.id).await?;
        let job = self.store.get_job(job.id).await?;

        info!(
            job_id = job.id,
            downloaded = job.downloaded_pages,
            total = job.total_pages,
            complete = job.complete,
            "download run finished"
        );
        Ok((job, dispatch))
    }

    /// Assembles within a create or retry run, folding an error into the
    /// outcome so the run's summary is still returned.
    async fn assemble_for_run(&self, job: &Job) -> AssemblyOutcome {
        match self.assemble(job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(job_id = job.id, error = %e, "assembly failed");
                AssemblyOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// A complete job is assembled from its steps, which checks that every
    /// page is on disk. Otherwise whatever is on disk is assembled.
    async fn assemble(&self, job: &Job) -> Result<AssemblyOutcome> {
        let outcome = if job.complete {
            let steps = self.store.steps(job.id).await?;
            self.assembler.assemble_steps(job, &steps).await?
        } else {
            self.assembler.assemble(job).await?
        };
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::{Issue, Page};

    fn issue_pages(comic: &str, title: &str, pages: usize) -> IssuePages {
        IssuePages {
            issue: Issue {
                id: 1,
                comic_id: 1,
                title: title.to_string(),
                link: "https://x/issue".to_string(),
                pages: i64::try_from(pages).unwrap(),
            },
            comic_title: comic.to_string(),
            pages: (1..=pages)
                .map(|n| Page {
                    id: i64::try_from(n).unwrap(),
                    issue_id: 1,
                    page_number: i64::try_from(n).unwrap(),
                    title: format!("Page {n}"),
                    image_link: format!("https://cdn/{n}.jpg"),
                })
                .collect(),
        }
    }

    #[test]
    fn test_derive_job_name_single_issue() {
        assert_eq!(
            derive_job_name(&[issue_pages("Saga", "Issue #1", 1)]),
            "Saga - Issue #1"
        );
    }

    #[test]
    fn test_derive_job_name_several_issues() {
        let issues = [
            issue_pages("Saga", "Issue #1", 1),
            issue_pages("Saga", "Issue #2", 1),
            issue_pages("Saga", "Issue #3", 1),
        ];
        assert_eq!(derive_job_name(&issues), "Saga (3 issues)");
    }

    #[test]
    fn test_requested_issue_carries_catalog_ids() {
        let requested = requested_issue(&issue_pages("Saga", "Issue #1", 2));
        assert_eq!(requested.issue_id, Some(1));
        assert_eq!(requested.pages.len(), 2);
        assert_eq!(requested.pages[1].page_id, Some(2));
        assert_eq!(requested.pages[1].image_link, "https://cdn/2.jpg");
    }

    #[test]
    fn test_service_error_not_found_classification() {
        assert!(ServiceError::from(JobError::JobNotFound(1)).is_not_found());
        assert!(ServiceError::from(CatalogError::IssueNotFound(1)).is_not_found());
        assert!(ServiceError::NoIssuesResolved { skipped: vec![] }.is_not_found());
        assert!(!ServiceError::from(JobError::EmptyJob).is_not_found());
    }
}
