//! Fetches one step's page image and records the outcome.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::{DownloadError, HttpClient};
use crate::jobs::{JobError, JobRepository, Step};
use crate::layout::JobLayout;

/// Outcome of a single fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepResult {
    /// Image written to its deterministic path.
    Success {
        /// Where the page landed.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
    },
    /// Network, timeout or HTTP status failure. The step is flagged for retry.
    TransientFailure {
        /// Recorded failure reason.
        reason: String,
    },
    /// Local failure (filesystem, or the outcome could not be persisted).
    Fatal {
        /// Failure reason.
        reason: String,
    },
}

impl StepResult {
    /// True for [`StepResult::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Error raised when a fetch outcome cannot be persisted.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Recording the outcome in the job store failed.
    #[error("failed to record step outcome: {0}")]
    Store(#[from] JobError),
}

/// Streams a step's image to disk and persists the outcome.
///
/// Never touches the job's `complete` flag; that is decided by the store's
/// completion check once a batch settles.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: HttpClient,
    layout: JobLayout,
}

impl PageFetcher {
    /// Creates a fetcher writing under `layout`.
    #[must_use]
    pub fn new(client: HttpClient, layout: JobLayout) -> Self {
        Self { client, layout }
    }

    /// The layout pages are written into.
    #[must_use]
    pub fn layout(&self) -> &JobLayout {
        &self.layout
    }

    /// Fetches `step` and records success or failure through `repo`.
    ///
    /// Fetch failures are reported in the returned [`StepResult`], not raised.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Store`] if the outcome could not be recorded.
    #[instrument(
        skip(self, repo, step),
        fields(step_id = step.id, job_id = step.job_id, issue_slot = step.issue_slot, page_number = step.page_number)
    )]
    pub async fn fetch<R>(&self, repo: &R, step: &Step) -> Result<StepResult, FetchError>
    where
        R: JobRepository + ?Sized,
    {
        let dest = self.layout.page_path(step);

        match self.client.download_to_path(&step.image_link, &dest).await {
            Ok(bytes) => {
                repo.record_step_success(step.id).await?;
                Ok(StepResult::Success { path: dest, bytes })
            }
            Err(e) => {
                let reason = e.to_string();
                repo.record_step_failure(step.id, &reason).await?;
                Ok(classify(&e, reason))
            }
        }
    }
}

fn classify(error: &DownloadError, reason: String) -> StepResult {
    if error.is_filesystem() {
        warn!(error = %reason, "page could not be written");
        StepResult::Fatal { reason }
    } else {
        info!(error = %reason, "page fetch failed, flagged for retry");
        StepResult::TransientFailure { reason }
    }
}
