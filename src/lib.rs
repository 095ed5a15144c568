//! comicdl core library
//!
//! This library downloads comic issues page by page into a durable,
//! resumable job and assembles the pages into one PDF per job.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`catalog`] - Comics, issues and page images to download from
//! - [`jobs`] - Durable job and step state
//! - [`layout`] - Per-job directory tree under the download root
//! - [`download`] - Streaming page fetcher and worker pool
//! - [`assemble`] - Ordered PDF assembly of fetched pages
//! - [`service`] - Job operations tying the above together
//! - [`config`] - Layered runtime settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assemble;
pub mod catalog;
pub mod config;
pub mod db;
pub mod download;
pub mod jobs;
pub mod layout;
pub mod service;

// Re-export commonly used types
pub use assemble::{AssembleError, Assembler, AssemblyOutcome, sanitize_job_name};
pub use catalog::{Catalog, CatalogError, IssueSource};
pub use config::{ConfigError, Settings};
pub use db::{Database, DatabaseOptions, DbError};
pub use download::{
    DEFAULT_CONCURRENCY, DispatchReport, Dispatcher, EngineError, HttpClient, PageFetcher,
    StepResult,
};
pub use jobs::{Job, JobError, JobStore, PageKey, Step, StepState};
pub use layout::{JobLayout, LayoutError};
pub use service::{BulkDeleteSummary, DownloadService, JobRunSummary, ServiceError};
