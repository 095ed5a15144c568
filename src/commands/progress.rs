//! Progress UI (spinner) for job runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use comicdl_core::{Job, JobStore};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;

/// Spawns the spinner when requested.
/// `job_id` carries the watched job's id once it exists.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    store: JobStore,
    job_id: watch::Receiver<Option<i64>>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(store, job_id, Arc::clone(&stop));
    (Some(handle), stop)
}

/// Signals the spinner to stop and waits for it to clear.
pub(crate) async fn stop_progress_ui(
    handle: Option<tokio::task::JoinHandle<()>>,
    stop: &AtomicBool,
) {
    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = handle {
        let _ = handle.await;
    }
}

async fn watched_job(store: &JobStore, job_id: &watch::Receiver<Option<i64>>) -> Option<Job> {
    let job_id = (*job_id.borrow())?;
    store.find_job(job_id).await.ok().flatten()
}

fn spawn_spinner_inner(
    store: JobStore,
    job_id: watch::Receiver<Option<i64>>,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            let message = match watched_job(&store, &job_id).await {
                Some(job) => format!(
                    "[{}/{}] Downloading {}...",
                    job.downloaded_pages, job.total_pages, job.name
                ),
                None => "Preparing download job...".to_string(),
            };
            spinner.set_message(message);
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    })
}
