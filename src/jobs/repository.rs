//! Repository seam for step outcome persistence.
//!
//! The dispatcher and fetcher depend on this trait rather than on
//! [`JobStore`] directly, so worker tasks only see the writes they need.

use async_trait::async_trait;

use super::{JobStore, Result, Step};

/// Data-access contract used while a batch of steps is in flight.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Marks a step fetched and bumps the job counter. Returns `false` if it
    /// was already complete.
    async fn record_step_success(&self, step_id: i64) -> Result<bool>;

    /// Flags a step for retry with the failure reason.
    async fn record_step_failure(&self, step_id: i64, reason: &str) -> Result<()>;

    /// Steps still to fetch, in assembly order.
    async fn incomplete_steps(&self, job_id: i64) -> Result<Vec<Step>>;

    /// Reconciles counters and sets the job's completion flag when done.
    async fn mark_job_complete_if_done(&self, job_id: i64) -> Result<bool>;
}

#[async_trait]
impl JobRepository for JobStore {
    async fn record_step_success(&self, step_id: i64) -> Result<bool> {
        JobStore::record_step_success(self, step_id).await
    }

    async fn record_step_failure(&self, step_id: i64, reason: &str) -> Result<()> {
        JobStore::record_step_failure(self, step_id, reason).await
    }

    async fn incomplete_steps(&self, job_id: i64) -> Result<Vec<Step>> {
        JobStore::incomplete_steps(self, job_id).await
    }

    async fn mark_job_complete_if_done(&self, job_id: i64) -> Result<bool> {
        JobStore::mark_job_complete_if_done(self, job_id).await
    }
}
