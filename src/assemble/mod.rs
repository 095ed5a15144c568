//! Assembles a job's fetched pages into a single PDF.
//!
//! Pages are concatenated in numeric `(issue_slot, page_number)` order, never
//! lexicographic order, so slot `10` follows slot `9`. The document is written
//! to `<job-root>/<sanitized job name>.pdf`.
//!
//! Two entry points:
//! - [`Assembler::assemble`] scans the job tree on disk and assembles
//!   whatever images are present, which is safe on a partial job.
//! - [`Assembler::assemble_steps`] takes the order from the store's steps and
//!   requires every complete step's file to exist.

mod filename;
mod pdf;

pub use filename::{FALLBACK_NAME, MAX_STEM_BYTES, sanitize_job_name};

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::jobs::{Job, PageKey, Step};
use crate::layout::JobLayout;

/// Extension of the assembled document.
pub const OUTPUT_EXTENSION: &str = "pdf";

/// Errors that can occur while assembling a job.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// Reading the job tree or an image failed.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A page file is not a decodable image.
    #[error("cannot decode page image {path}: {message}")]
    Image {
        /// Offending file.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },

    /// A complete step has no file on disk.
    #[error("page {key} is marked complete but {path} is missing")]
    MissingPage {
        /// Position of the missing page.
        key: PageKey,
        /// Where the page was expected.
        path: PathBuf,
    },

    /// Building or saving the PDF failed.
    #[error("failed to write PDF: {0}")]
    Pdf(String),

    /// The blocking writer task did not finish.
    #[error("assembly task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AssembleError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an image decode error.
    pub fn image(path: impl Into<PathBuf>, source: &image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            message: source.to_string(),
        }
    }
}

/// What an assembly run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssemblyOutcome {
    /// A document was written.
    Assembled {
        /// Path of the document.
        path: PathBuf,
        /// Number of pages in it.
        pages: usize,
    },
    /// No page images were found; nothing was written.
    NothingToAssemble,
    /// Assembly was attempted as part of a job run and failed. The fetched
    /// pages stay on disk and recorded.
    Failed {
        /// Why the document could not be written.
        reason: String,
    },
}

/// Page image located on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageFile {
    /// Position parsed from the directory and file names.
    pub key: PageKey,
    /// Image path.
    pub path: PathBuf,
}

/// Writes assembled documents into each job's root.
#[derive(Debug, Clone)]
pub struct Assembler {
    layout: JobLayout,
}

impl Assembler {
    /// Creates an assembler over `layout`.
    #[must_use]
    pub fn new(layout: JobLayout) -> Self {
        Self { layout }
    }

    /// `<job-root>/<sanitized job name>.pdf`
    #[must_use]
    pub fn output_path(&self, job: &Job) -> PathBuf {
        self.layout
            .job_root(job.id)
            .join(format!("{}.{OUTPUT_EXTENSION}", sanitize_job_name(&job.name)))
    }

    /// Assembles every page image found under the job's root.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError`] if the tree cannot be read, an image cannot
    /// be decoded, or the document cannot be written.
    #[instrument(skip(self, job), fields(job_id = job.id))]
    pub async fn assemble(&self, job: &Job) -> Result<AssemblyOutcome, AssembleError> {
        let pages = scan_job_tree(&self.layout.job_root(job.id)).await?;
        self.write(job, pages).await
    }

    /// Assembles the complete steps of `steps`, in key order.
    ///
    /// Incomplete steps are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AssembleError::MissingPage`] if a complete step's file is
    /// absent, plus the errors of [`Assembler::assemble`].
    #[instrument(skip(self, job, steps), fields(job_id = job.id, steps = steps.len()))]
    pub async fn assemble_steps(
        &self,
        job: &Job,
        steps: &[Step],
    ) -> Result<AssemblyOutcome, AssembleError> {
        let mut pages = Vec::new();
        for step in steps.iter().filter(|step| step.complete) {
            let path = self.layout.page_path(step);
            let exists = tokio::fs::try_exists(&path)
                .await
                .map_err(|e| AssembleError::io(&path, e))?;
            if !exists {
                return Err(AssembleError::MissingPage {
                    key: step.key(),
                    path,
                });
            }
            pages.push(PageFile {
                key: step.key(),
                path,
            });
        }
        pages.sort();
        self.write(job, pages).await
    }

    async fn write(
        &self,
        job: &Job,
        pages: Vec<PageFile>,
    ) -> Result<AssemblyOutcome, AssembleError> {
        if pages.is_empty() {
            info!("no page images found, nothing to assemble");
            return Ok(AssemblyOutcome::NothingToAssemble);
        }

        let output = self.output_path(job);
        let images: Vec<PathBuf> = pages.into_iter().map(|page| page.path).collect();
        let target = output.clone();
        let written =
            tokio::task::spawn_blocking(move || pdf::write_pdf(&images, &target)).await??;

        info!(path = %output.display(), pages = written, "job assembled");
        Ok(AssemblyOutcome::Assembled {
            path: output,
            pages: written,
        })
    }
}

/// Lists page images under a job root in numeric `(slot, page)` order.
///
/// Entries whose names are not numeric (the assembled document, stray files)
/// are skipped. A missing root yields no pages.
///
/// # Errors
///
/// Returns [`AssembleError::Io`] if a directory cannot be read.
pub async fn scan_job_tree(job_root: &Path) -> Result<Vec<PageFile>, AssembleError> {
    let mut pages = Vec::new();

    let mut slots = match tokio::fs::read_dir(job_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(pages),
        Err(e) => return Err(AssembleError::io(job_root, e)),
    };

    while let Some(slot_entry) = slots
        .next_entry()
        .await
        .map_err(|e| AssembleError::io(job_root, e))?
    {
        let slot_path = slot_entry.path();
        if !slot_path.is_dir() {
            continue;
        }
        let Some(issue_slot) = numeric_name(&slot_entry.file_name().to_string_lossy()) else {
            debug!(path = %slot_path.display(), "skipping non-numeric directory");
            continue;
        };

        let mut files = tokio::fs::read_dir(&slot_path)
            .await
            .map_err(|e| AssembleError::io(&slot_path, e))?;
        while let Some(file_entry) = files
            .next_entry()
            .await
            .map_err(|e| AssembleError::io(&slot_path, e))?
        {
            let path = file_entry.path();
            if !path.is_file() {
                continue;
            }
            let page_number = path
                .file_stem()
                .and_then(|stem| numeric_name(&stem.to_string_lossy()));
            let Some(page_number) = page_number else {
                debug!(path = %path.display(), "skipping non-numeric file");
                continue;
            };

            pages.push(PageFile {
                key: PageKey {
                    issue_slot,
                    page_number,
                },
                path,
            });
        }
    }

    pages.sort();
    Ok(pages)
}

fn numeric_name(name: &str) -> Option<i64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_numeric_name() {
        assert_eq!(numeric_name("10"), Some(10));
        assert_eq!(numeric_name("007"), Some(7));
        assert_eq!(numeric_name("-1"), None);
        assert_eq!(numeric_name("1a"), None);
        assert_eq!(numeric_name(""), None);
    }

    #[tokio::test]
    async fn test_scan_orders_numerically_and_skips_strays() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for slot in ["0", "2", "10"] {
            for page in ["1.png", "10.jpg", "9.png"] {
                touch(&root.join(slot).join(page));
            }
        }
        touch(&root.join("Saga.pdf"));
        touch(&root.join("notes").join("1.png"));
        touch(&root.join("0").join("cover.png"));

        let pages = scan_job_tree(root).await.unwrap();
        let keys: Vec<String> = pages.iter().map(|p| p.key.to_string()).collect();
        assert_eq!(
            keys,
            ["0/1", "0/9", "0/10", "2/1", "2/9", "2/10", "10/1", "10/9", "10/10"]
        );
    }

    #[tokio::test]
    async fn test_scan_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let pages = scan_job_tree(&temp_dir.path().join("404")).await.unwrap();
        assert!(pages.is_empty());
    }

    #[test]
    fn test_output_path_uses_sanitized_name() {
        let assembler = Assembler::new(JobLayout::new("/data"));
        let job = Job {
            id: 3,
            name: " My:Comic/Title ".to_string(),
            downloaded_pages: 0,
            total_pages: 0,
            total_issues: 0,
            complete: false,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert_eq!(
            assembler.output_path(&job),
            PathBuf::from("/data/3/My_Comic_Title.pdf")
        );
    }
}
