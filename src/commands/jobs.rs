//! Download job command handlers.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use comicdl_core::{
    AssemblyOutcome, Catalog, Database, DownloadService, HttpClient, JobLayout, JobRunSummary,
    JobStore, Settings,
};
use tokio::sync::watch;
use tracing::{info, warn};

use super::print_json;
use super::progress::{spawn_progress_ui, stop_progress_ui};
use crate::cli::JobsCommand;

/// Exit code when a run leaves pages to retry.
const EXIT_PARTIAL: u8 = 2;

fn build_service(settings: &Settings, db: Database) -> Result<DownloadService> {
    let catalog = Arc::new(Catalog::new(db.clone()));
    let client =
        HttpClient::new_with_timeouts(settings.connect_timeout_secs, settings.request_timeout_secs);
    let service = DownloadService::new(
        catalog,
        JobStore::new(db),
        JobLayout::new(&settings.download_root),
        client,
        settings.concurrency,
    )?;
    Ok(service)
}

pub async fn run_jobs_command(
    command: JobsCommand,
    settings: &Settings,
    db: Database,
    show_progress: bool,
) -> Result<ExitCode> {
    let service = build_service(settings, db)?;

    match command {
        JobsCommand::Create { issue_ids, name } => {
            let (created_tx, created_rx) = watch::channel(None);
            let (spinner, stop) =
                spawn_progress_ui(show_progress, service.store().clone(), created_rx);
            let result = service
                .create_download_job_with(&issue_ids, name.as_deref(), |job_id| {
                    let _ = created_tx.send(Some(job_id));
                })
                .await;
            stop_progress_ui(spinner, &stop).await;
            report_run(&result?)
        }
        JobsCommand::Retry { job_id } => {
            let (_known_tx, known_rx) = watch::channel(Some(job_id));
            let (spinner, stop) =
                spawn_progress_ui(show_progress, service.store().clone(), known_rx);
            let result = service.retry_download_job(job_id).await;
            stop_progress_ui(spinner, &stop).await;
            report_run(&result?)
        }
        JobsCommand::List => {
            print_json(&service.list_download_jobs().await?)?;
            Ok(ExitCode::SUCCESS)
        }
        JobsCommand::Delete { job_id } => {
            print_json(&service.delete_download_job(job_id).await?)?;
            Ok(ExitCode::SUCCESS)
        }
        JobsCommand::DeleteCompleted => {
            let summary = service.delete_completed_download_jobs().await?;
            print_json(&summary)?;
            if summary.failed.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_PARTIAL))
            }
        }
        JobsCommand::Assemble { job_id } => {
            print_json(&service.assemble_download_job(job_id).await?)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report_run(summary: &JobRunSummary) -> Result<ExitCode> {
    for skipped in &summary.skipped_issues {
        warn!(issue_id = skipped.issue_id, reason = %skipped.reason, "issue skipped");
    }
    info!(
        job_id = summary.job.id,
        downloaded = summary.job.downloaded_pages,
        total = summary.job.total_pages,
        failed = summary.dispatch.failed.len(),
        "job run finished"
    );
    print_json(summary)?;

    if let Some(AssemblyOutcome::Failed { reason }) = &summary.assembly {
        warn!(job_id = summary.job.id, %reason, "document was not assembled");
        return Ok(ExitCode::from(EXIT_PARTIAL));
    }

    if summary.job.complete {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(
            job_id = summary.job.id,
            "job is incomplete; run `comicdl jobs retry {}` to fetch the missing pages",
            summary.job.id
        );
        Ok(ExitCode::from(EXIT_PARTIAL))
    }
}
