//! Page fetching and the worker pool that drives it.
//!
//! This module streams page images from their image links into the job's
//! directory tree and fans a batch of steps out over a bounded pool.
//!
//! # Features
//!
//! - Streaming downloads (memory use independent of image size)
//! - Deterministic destination per step, truncated on every attempt
//! - Configurable timeouts (30s connect, 30s request by default)
//! - Structured error types with full context
//! - Semaphore-gated fan-out with a peak in-flight measurement
//!
//! # Example
//!
//! ```no_run
//! use comicdl_core::download::HttpClient;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let bytes = client
//!     .download_to_path("https://cdn.example.com/p/01.jpg", Path::new("./1/0/1.jpg"))
//!     .await?;
//! println!("Downloaded {bytes} bytes");
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod dispatcher;
mod error;
mod fetcher;

pub use client::HttpClient;
pub use constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY,
    REQUEST_TIMEOUT_SECS,
};
pub use dispatcher::{DispatchReport, DispatchStats, Dispatcher, EngineError, StepReport};
pub use error::DownloadError;
pub use fetcher::{FetchError, PageFetcher, StepResult};
