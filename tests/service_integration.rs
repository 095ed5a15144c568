//! End-to-end scenarios for the download service: catalog, store, HTTP,
//! filesystem and assembly together.

use std::sync::Arc;

use comicdl_core::catalog::Catalog;
use comicdl_core::assemble::MAX_STEM_BYTES;
use comicdl_core::{
    AssemblyOutcome, Database, DownloadService, HttpClient, JobError, JobLayout, JobStore,
    ServiceError, StepResult,
};
use lopdf::Document;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::fixtures::{png_bytes, seed_issue};
use support::socket_guard::start_mock_server_or_skip;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

struct Harness {
    catalog: Catalog,
    service: DownloadService,
    temp_dir: TempDir,
}

async fn harness(concurrency: usize) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("comicdl.db"))
        .await
        .unwrap();
    let service = DownloadService::new(
        Arc::new(Catalog::new(db.clone())),
        JobStore::new(db.clone()),
        JobLayout::new(temp_dir.path().join("downloads")),
        HttpClient::new(),
        concurrency,
    )
    .unwrap();
    Harness {
        catalog: Catalog::new(db),
        service,
        temp_dir,
    }
}

fn links(server: &MockServer, prefix: &str, pages: usize) -> Vec<String> {
    (1..=pages)
        .map(|n| format!("{}/{prefix}/{n}.png", server.uri()))
        .collect()
}

async fn serve_ok(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(90)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_failed_page_then_retry_produces_complete_document() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/saga/2.png"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    serve_ok(&mock_server).await;

    let h = harness(4).await;
    let (_, issue_id) = seed_issue(
        &h.catalog,
        None,
        "Saga",
        "Issue #1",
        &links(&mock_server, "saga", 3),
    )
    .await;

    let first = h
        .service
        .create_download_job(&[issue_id], None)
        .await
        .unwrap();
    assert_eq!(first.job.name, "Saga - Issue #1");
    assert_eq!(first.job.downloaded_pages, 2);
    assert_eq!(first.job.total_pages, 3);
    assert!(!first.job.complete);
    assert!(first.assembly.is_none());
    let failed: Vec<String> = first
        .dispatch
        .failed
        .iter()
        .map(|r| r.key.to_string())
        .collect();
    assert_eq!(failed, ["0/2"]);

    let listing = h.service.list_download_jobs().await.unwrap();
    assert_eq!(listing.incomplete.len(), 1);
    assert!(listing.complete.is_empty());

    let second = h.service.retry_download_job(first.job.id).await.unwrap();
    assert!(second.job.complete);
    assert_eq!(second.job.downloaded_pages, 3);
    assert_eq!(second.dispatch.total(), 1);

    let Some(AssemblyOutcome::Assembled { path, pages }) = second.assembly else {
        panic!("expected an assembled document, got {:?}", second.assembly);
    };
    assert_eq!(pages, 3);
    assert_eq!(
        path,
        h.temp_dir
            .path()
            .join("downloads")
            .join(first.job.id.to_string())
            .join("Saga - Issue #1.pdf")
    );
    assert_eq!(Document::load(&path).unwrap().get_pages().len(), 3);
}

#[tokio::test]
async fn test_missing_issue_is_skipped_and_slots_follow_request_order() {
    let mock_server = require_mock_server!();
    serve_ok(&mock_server).await;

    let h = harness(2).await;
    let (comic_id, first) = seed_issue(
        &h.catalog,
        None,
        "Monstress",
        "Issue #1",
        &links(&mock_server, "m1", 2),
    )
    .await;
    let (_, second) = seed_issue(
        &h.catalog,
        Some(comic_id),
        "Monstress",
        "Issue #2",
        &links(&mock_server, "m2", 1),
    )
    .await;

    let summary = h
        .service
        .create_download_job(&[second, 9999, first], Some("Monstress Omnibus"))
        .await
        .unwrap();

    assert_eq!(summary.skipped_issues.len(), 1);
    assert_eq!(summary.skipped_issues[0].issue_id, 9999);
    assert_eq!(summary.job.name, "Monstress Omnibus");
    assert_eq!(summary.job.total_issues, 2);
    assert!(summary.job.complete);

    let steps = h.service.store().steps(summary.job.id).await.unwrap();
    let order: Vec<(String, String)> = steps
        .iter()
        .map(|s| (s.key().to_string(), s.image_link.rsplit('/').nth(1).unwrap().to_string()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("0/1".to_string(), "m2".to_string()),
            ("1/1".to_string(), "m1".to_string()),
            ("1/2".to_string(), "m1".to_string()),
        ]
    );
    assert!(matches!(
        summary.assembly,
        Some(AssemblyOutcome::Assembled { pages: 3, .. })
    ));
}

#[tokio::test]
async fn test_no_resolvable_issue_creates_nothing() {
    let h = harness(2).await;
    let err = h
        .service
        .create_download_job(&[404, 405], None)
        .await
        .unwrap_err();

    assert!(matches!(&err, ServiceError::NoIssuesResolved { skipped } if skipped.len() == 2));
    let listing = h.service.list_download_jobs().await.unwrap();
    assert!(listing.incomplete.is_empty() && listing.complete.is_empty());

    let err = h.service.create_download_job(&[], None).await.unwrap_err();
    assert!(matches!(err, ServiceError::Job(JobError::EmptyJob)));
}

#[tokio::test]
async fn test_delete_job_twice_reports_not_found() {
    let mock_server = require_mock_server!();
    serve_ok(&mock_server).await;

    let h = harness(2).await;
    let (_, issue_id) = seed_issue(
        &h.catalog,
        None,
        "Paper Girls",
        "Issue #1",
        &links(&mock_server, "pg", 2),
    )
    .await;
    let summary = h
        .service
        .create_download_job(&[issue_id], None)
        .await
        .unwrap();
    let job_root = h.service.layout().job_root(summary.job.id);
    assert!(job_root.exists());

    let deleted = h.service.delete_download_job(summary.job.id).await.unwrap();
    assert_eq!(deleted.id, summary.job.id);
    assert!(!job_root.exists());

    let err = h
        .service
        .delete_download_job(summary.job.id)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(h.service.retry_download_job(summary.job.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_completed_keeps_incomplete_jobs() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/broken/1.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    serve_ok(&mock_server).await;

    let h = harness(2).await;
    let (comic_id, good) = seed_issue(
        &h.catalog,
        None,
        "Descender",
        "Issue #1",
        &links(&mock_server, "good", 1),
    )
    .await;
    let (_, broken) = seed_issue(
        &h.catalog,
        Some(comic_id),
        "Descender",
        "Issue #2",
        &links(&mock_server, "broken", 1),
    )
    .await;

    let done = h.service.create_download_job(&[good], None).await.unwrap();
    let pending = h.service.create_download_job(&[broken], None).await.unwrap();
    assert!(done.job.complete);
    assert!(!pending.job.complete);

    let summary = h.service.delete_completed_download_jobs().await.unwrap();
    assert_eq!(
        summary.deleted.iter().map(|j| j.id).collect::<Vec<_>>(),
        vec![done.job.id]
    );
    assert!(summary.failed.is_empty());

    let listing = h.service.list_download_jobs().await.unwrap();
    assert!(listing.complete.is_empty());
    assert_eq!(listing.incomplete[0].id, pending.job.id);
}

#[tokio::test]
async fn test_assemble_partial_job_uses_pages_on_disk() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/partial/3.png"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;
    serve_ok(&mock_server).await;

    let h = harness(3).await;
    let (_, issue_id) = seed_issue(
        &h.catalog,
        None,
        "East of West",
        "Issue #1",
        &links(&mock_server, "partial", 3),
    )
    .await;
    let summary = h
        .service
        .create_download_job(&[issue_id], None)
        .await
        .unwrap();
    assert!(!summary.job.complete);

    let outcome = h
        .service
        .assemble_download_job(summary.job.id)
        .await
        .unwrap();
    assert!(matches!(outcome, AssemblyOutcome::Assembled { pages: 2, .. }));
}

#[tokio::test]
async fn test_html_page_with_status_200_stays_retryable() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/blocked/2.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html>blocked</html>"),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    serve_ok(&mock_server).await;

    let h = harness(2).await;
    let (_, issue_id) = seed_issue(
        &h.catalog,
        None,
        "Invincible",
        "Issue #1",
        &links(&mock_server, "blocked", 3),
    )
    .await;

    let first = h
        .service
        .create_download_job(&[issue_id], None)
        .await
        .unwrap();
    assert!(!first.job.complete);
    assert_eq!(first.job.downloaded_pages, 2);
    assert_eq!(first.dispatch.failed.len(), 1);
    let failure = &first.dispatch.failed[0];
    assert_eq!(failure.key.to_string(), "0/2");
    assert!(matches!(
        &failure.result,
        StepResult::TransientFailure { reason } if reason.contains("not a supported image")
    ));

    let steps = h.service.store().steps(first.job.id).await.unwrap();
    assert!(!steps[1].complete && steps[1].retry);
    assert!(!h.service.layout().page_path(&steps[1]).exists());

    let second = h.service.retry_download_job(first.job.id).await.unwrap();
    assert!(second.job.complete);
    assert!(matches!(
        second.assembly,
        Some(AssemblyOutcome::Assembled { pages: 3, .. })
    ));
}

#[tokio::test]
async fn test_assembly_failure_is_reported_in_run_summary() {
    let mock_server = require_mock_server!();
    serve_ok(&mock_server).await;

    let h = harness(2).await;
    let (_, issue_id) = seed_issue(
        &h.catalog,
        None,
        "Fables",
        "Issue #1",
        &links(&mock_server, "fables", 2),
    )
    .await;
    let first = h
        .service
        .create_download_job(&[issue_id], None)
        .await
        .unwrap();
    assert!(first.job.complete);

    let steps = h.service.store().steps(first.job.id).await.unwrap();
    std::fs::write(h.service.layout().page_path(&steps[0]), b"garbage").unwrap();

    let rerun = h.service.retry_download_job(first.job.id).await.unwrap();
    assert!(rerun.job.complete);
    assert_eq!(rerun.dispatch.total(), 0);
    assert!(matches!(
        &rerun.assembly,
        Some(AssemblyOutcome::Failed { reason }) if reason.contains("cannot decode page image")
    ));

    // The explicit operation still surfaces the error.
    let err = h
        .service
        .assemble_download_job(first.job.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Assemble(_)));
}

#[tokio::test]
async fn test_overlong_job_name_still_assembles() {
    let mock_server = require_mock_server!();
    serve_ok(&mock_server).await;

    let h = harness(2).await;
    let (_, issue_id) = seed_issue(
        &h.catalog,
        None,
        "Long",
        "Issue #1",
        &links(&mock_server, "long", 1),
    )
    .await;

    let name = "x".repeat(300);
    let summary = h
        .service
        .create_download_job(&[issue_id], Some(&name))
        .await
        .unwrap();

    assert_eq!(summary.job.name, name);
    let Some(AssemblyOutcome::Assembled { path, pages: 1 }) = summary.assembly else {
        panic!("expected an assembled document, got {:?}", summary.assembly);
    };
    let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert_eq!(file_name, format!("{}.pdf", "x".repeat(MAX_STEM_BYTES)));
    assert!(path.exists());
}

#[tokio::test]
async fn test_created_job_id_is_reported_before_fetching() {
    let mock_server = require_mock_server!();
    serve_ok(&mock_server).await;

    let h = harness(2).await;
    let (_, issue_id) = seed_issue(
        &h.catalog,
        None,
        "Paper Girls",
        "Issue #1",
        &links(&mock_server, "pg", 2),
    )
    .await;

    let mut reported = None;
    let summary = h
        .service
        .create_download_job_with(&[issue_id], None, |job_id| reported = Some(job_id))
        .await
        .unwrap();

    assert_eq!(reported, Some(summary.job.id));
    assert!(summary.job.complete);
}
