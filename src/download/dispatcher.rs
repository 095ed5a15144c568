//! Worker pool for fetching a batch of steps concurrently.
//!
//! The dispatcher spawns one task per step and gates them with a semaphore,
//! so at most `concurrency` fetches are in flight at any moment. Unlike a
//! wave barrier, a finished fetch immediately frees its slot for the next.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use comicdl_core::download::{Dispatcher, HttpClient, PageFetcher};
//! use comicdl_core::jobs::JobStore;
//! use comicdl_core::{Database, JobLayout};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(JobStore::new(Database::new_in_memory().await?));
//! let fetcher = PageFetcher::new(HttpClient::new(), JobLayout::new("./downloads"));
//! let dispatcher = Dispatcher::new(4)?;
//! let job = store.get_job(1).await?;
//! let steps = store.incomplete_steps(job.id).await?;
//! let report = dispatcher.run(&fetcher, store, &job, steps).await?;
//! println!("{} fetched, {} failed", report.succeeded.len(), report.failed.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::fetcher::{PageFetcher, StepResult};
use crate::jobs::{Job, JobRepository, PageKey, Step};

/// Error type for dispatcher operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Live counters for one batch, shared by its tasks.
#[derive(Debug, Default)]
pub struct DispatchStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl DispatchStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps fetched successfully.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Steps that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn record(&self, result: &StepResult) {
        if result.is_success() {
            self.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Outcome of one step within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Step id.
    pub step_id: i64,
    /// Assembly position of the step.
    pub key: PageKey,
    /// What happened.
    pub result: StepResult,
}

/// Settled outcomes of a batch, each list in assembly order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Steps whose image was written and recorded.
    pub succeeded: Vec<StepReport>,
    /// Steps that failed, transiently or fatally.
    pub failed: Vec<StepReport>,
    /// Highest number of fetches observed running at once.
    pub peak_in_flight: usize,
}

impl DispatchReport {
    /// Number of steps dispatched.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Failed steps whose failure was fatal rather than transient.
    #[must_use]
    pub fn fatal(&self) -> impl Iterator<Item = &StepReport> {
        self.failed
            .iter()
            .filter(|report| matches!(report.result, StepResult::Fatal { .. }))
    }
}

/// Semaphore-gated fan-out over a batch of steps.
///
/// # Concurrency Model
///
/// - Each step runs in its own Tokio task
/// - A semaphore permit is acquired before spawning each task
/// - Permits are released automatically when the fetch settles (RAII)
/// - A step counts as settled only after its outcome is persisted
///
/// There is no automatic retry: a failed step stays flagged until the caller
/// dispatches it again.
#[derive(Debug)]
pub struct Dispatcher {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

impl Dispatcher {
    /// Creates a dispatcher allowing `concurrency` fetches in flight.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    #[instrument(level = "debug")]
    pub fn new(concurrency: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetches every step in `steps`, waiting until all have settled.
    ///
    /// Individual fetch failures do not fail the batch; they are listed in
    /// the returned report. A task that panics is reported as a fatal
    /// failure of its step.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the semaphore is closed.
    #[instrument(skip(self, fetcher, repo, job, steps), fields(job_id = job.id, steps = steps.len()))]
    pub async fn run<R>(
        &self,
        fetcher: &PageFetcher,
        repo: Arc<R>,
        job: &Job,
        steps: Vec<Step>,
    ) -> Result<DispatchReport, EngineError>
    where
        R: JobRepository + 'static,
    {
        let stats = Arc::new(DispatchStats::new());
        let mut handles = Vec::with_capacity(steps.len());

        info!(concurrency = self.concurrency, "dispatching steps");

        for step in steps {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let fetcher = fetcher.clone();
            let repo = Arc::clone(&repo);
            let stats = Arc::clone(&stats);
            let step_id = step.id;
            let key = step.key();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                stats.enter();

                let result = match fetcher.fetch(repo.as_ref(), &step).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(step_id = step.id, error = %e, "step outcome not persisted");
                        StepResult::Fatal {
                            reason: e.to_string(),
                        }
                    }
                };

                stats.record(&result);
                stats.leave();
                result
            });
            handles.push((step_id, key, handle));
        }

        debug!(task_count = handles.len(), "waiting for fetches to settle");

        let mut report = DispatchReport::default();
        for (step_id, key, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(step_id, error = %e, "fetch task panicked");
                    StepResult::Fatal {
                        reason: format!("fetch task failed: {e}"),
                    }
                }
            };

            let entry = StepReport {
                step_id,
                key,
                result,
            };
            if entry.result.is_success() {
                report.succeeded.push(entry);
            } else {
                report.failed.push(entry);
            }
        }

        report.succeeded.sort_by_key(|r| r.key);
        report.failed.sort_by_key(|r| r.key);
        report.peak_in_flight = stats.peak_in_flight();

        info!(
            completed = stats.completed(),
            failed = report.failed.len(),
            peak_in_flight = report.peak_in_flight,
            "batch settled"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_new_valid_concurrency() {
        assert_eq!(Dispatcher::new(1).unwrap().concurrency(), 1);
        assert_eq!(Dispatcher::new(4).unwrap().concurrency(), 4);
        assert_eq!(Dispatcher::new(100).unwrap().concurrency(), 100);
    }

    #[test]
    fn test_dispatcher_new_invalid_concurrency() {
        assert!(matches!(
            Dispatcher::new(0),
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
        assert!(matches!(
            Dispatcher::new(101),
            Err(EngineError::InvalidConcurrency { value: 101 })
        ));
    }

    #[test]
    fn test_dispatch_stats_tracks_peak() {
        let stats = DispatchStats::new();
        stats.enter();
        stats.enter();
        stats.leave();
        stats.enter();
        stats.leave();
        stats.leave();
        assert_eq!(stats.peak_in_flight(), 2);
    }

    #[test]
    fn test_dispatch_stats_thread_safe() {
        use std::thread;

        let stats = Arc::new(DispatchStats::new());
        let mut handles = Vec::new();

        for _ in 0..10 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.record(&StepResult::TransientFailure {
                        reason: "x".to_string(),
                    });
                    stats.record(&StepResult::Success {
                        path: "p".into(),
                        bytes: 1,
                    });
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.completed(), 1000);
        assert_eq!(stats.failed(), 1000);
    }

    #[test]
    fn test_report_fatal_filters_failures() {
        let key = PageKey {
            issue_slot: 0,
            page_number: 1,
        };
        let report = DispatchReport {
            succeeded: vec![],
            failed: vec![
                StepReport {
                    step_id: 1,
                    key,
                    result: StepResult::Fatal {
                        reason: "disk".to_string(),
                    },
                },
                StepReport {
                    step_id: 2,
                    key,
                    result: StepResult::TransientFailure {
                        reason: "HTTP 500".to_string(),
                    },
                },
            ],
            peak_in_flight: 1,
        };
        assert_eq!(report.total(), 2);
        assert_eq!(report.fatal().count(), 1);
    }

    #[test]
    fn test_engine_error_display() {
        let msg = EngineError::InvalidConcurrency { value: 0 }.to_string();
        assert!(msg.contains("invalid concurrency"));
        assert!(msg.contains("100"));
    }
}
