//! Job and step records plus the request types used to create them.

use std::fmt;

use serde::Serialize;
use sqlx::FromRow;
use url::Url;

/// Extension used when an image link does not name a known image type.
pub const DEFAULT_IMAGE_EXTENSION: &str = "png";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// One download run over a set of issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Job {
    /// Unique identifier, also the job's folder name.
    pub id: i64,
    /// Human-readable name; sanitized before use as the output filename.
    pub name: String,
    /// Steps fetched successfully so far.
    pub downloaded_pages: i64,
    /// Number of steps in the job.
    pub total_pages: i64,
    /// Number of issue slots in the job.
    pub total_issues: i64,
    /// True once the completion check found no incomplete step.
    pub complete: bool,
    /// When the job was created.
    pub created_at: String,
    /// When the job was last updated.
    pub updated_at: String,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Job {{ id: {}, name: {}, pages: {}/{}, complete: {} }}",
            self.id, self.name, self.downloaded_pages, self.total_pages, self.complete
        )
    }
}

/// Assembly order of a page within a job: issue slot first, then page number.
///
/// The derived `Ord` compares fields in declaration order, which is exactly
/// the numeric `(issue_slot, page_number)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PageKey {
    /// 0-based position of the issue in the job request.
    pub issue_slot: i64,
    /// Page number within the issue.
    pub page_number: i64,
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.issue_slot, self.page_number)
    }
}

/// Fetch state of a step as recorded in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepState {
    /// Never attempted.
    Pending,
    /// Last attempt failed; the step is pending again.
    RetryPending {
        /// Reason recorded for the failed attempt.
        reason: Option<String>,
    },
    /// Fetched. Terminal.
    Complete,
}

/// Unit of work: one page image within one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Step {
    /// Unique identifier.
    pub id: i64,
    /// Owning job.
    pub job_id: i64,
    /// Catalog page this step was built from, if any.
    pub page_id: Option<i64>,
    /// Image URL to fetch.
    pub image_link: String,
    /// Page number within its issue.
    pub page_number: i64,
    /// 0-based position of the issue within the job.
    pub issue_slot: i64,
    /// Source issue URL, informational.
    pub issue_link: Option<String>,
    /// Set once the page has been fetched.
    pub complete: bool,
    /// Set when the most recent attempt failed.
    pub retry: bool,
    /// Number of fetch attempts made.
    pub attempts: i64,
    /// Reason for the most recent failure.
    pub last_error: Option<String>,
}

impl Step {
    /// Assembly ordering key.
    #[must_use]
    pub fn key(&self) -> PageKey {
        PageKey {
            issue_slot: self.issue_slot,
            page_number: self.page_number,
        }
    }

    /// Tagged view of the `complete`/`retry` flags.
    #[must_use]
    pub fn state(&self) -> StepState {
        if self.complete {
            StepState::Complete
        } else if self.retry {
            StepState::RetryPending {
                reason: self.last_error.clone(),
            }
        } else {
            StepState::Pending
        }
    }

    /// File extension the fetched image is stored under.
    #[must_use]
    pub fn image_extension(&self) -> &'static str {
        image_extension(&self.image_link)
    }
}

/// Picks a known image extension from the URL path, or [`DEFAULT_IMAGE_EXTENSION`].
#[must_use]
pub fn image_extension(image_link: &str) -> &'static str {
    let Ok(parsed) = Url::parse(image_link) else {
        return DEFAULT_IMAGE_EXTENSION;
    };
    let Some(last_segment) = parsed.path_segments().and_then(|mut s| s.next_back()) else {
        return DEFAULT_IMAGE_EXTENSION;
    };
    let Some((_, ext)) = last_segment.rsplit_once('.') else {
        return DEFAULT_IMAGE_EXTENSION;
    };

    IMAGE_EXTENSIONS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(ext))
        .copied()
        .unwrap_or(DEFAULT_IMAGE_EXTENSION)
}

/// A page to download, as supplied by the catalog or the crawler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedPage {
    /// Catalog page id, when the page is cataloged.
    pub page_id: Option<i64>,
    /// Page number within the issue.
    pub page_number: i64,
    /// Image URL.
    pub image_link: String,
}

/// An issue requested for download, with its pages in any order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestedIssue {
    /// Catalog issue id, informational.
    pub issue_id: Option<i64>,
    /// Source issue URL, copied onto each step.
    pub issue_link: Option<String>,
    /// Pages of the issue.
    pub pages: Vec<RequestedPage>,
}

/// Jobs split by completion, newest last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobListing {
    /// Jobs with at least one incomplete step.
    pub incomplete: Vec<Job>,
    /// Jobs whose steps are all complete.
    pub complete: Vec<Job>,
}
