//! Constants for the download module (timeouts, pool sizing).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default whole-request timeout for one page image (30 seconds).
///
/// Bounds a hung connection so it cannot hold a worker slot indefinitely.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default number of concurrent page fetches.
pub const DEFAULT_CONCURRENCY: usize = 4;
