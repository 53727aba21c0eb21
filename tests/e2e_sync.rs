//! End-to-end lifecycle synchronization against a mocked backend.
//!
//! Drives the full path from batch submission through status polling to the
//! single download, including the stale-snapshot window after the download
//! settles and the retry path after a failed attempt.

mod common;

use common::{
    fast_config, mount_download, mount_download_missing_n, mount_mark_downloaded, mount_status,
    mount_status_n, mount_upload, requests_to, wait_for_event,
};
use pdfjob_sync::{Event, JobId, JobSyncClient, Phase, SourceKind, UploadStatus};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

const PROCESSING_J1: &str = r#"{
    "J1": {"total_pages": 10, "processed_pages": 2, "phase": "processing", "elapsed_seconds": 1.0}
}"#;

const COMPLETED_J1: &str = r#"{
    "J1": {"total_pages": 10, "processed_pages": 10, "phase": "completed", "elapsed_seconds": 4.2, "output_filename": "a.csv"}
}"#;

const ACCEPT_A_PDF: &str = r#"{
    "results": [{"filename": "a.pdf", "status": "processing", "job_id": "J1"}]
}"#;

#[tokio::test]
async fn submitted_job_downloads_exactly_once_despite_stale_snapshots() {
    let server = MockServer::start().await;
    mount_upload(&server, ACCEPT_A_PDF).await;
    mount_status_n(&server, PROCESSING_J1, 3).await;
    // The server keeps reporting `completed` forever: the mark-consumed call
    // is never observed by this stale backend.
    mount_status(&server, COMPLETED_J1).await;
    mount_download(&server, "a.csv", b"symbol,qty,price\n", 1).await;
    mount_mark_downloaded(&server, "J1").await;

    let dir = TempDir::new().unwrap();
    let client = JobSyncClient::new(fast_config(&server, dir.path(), SourceKind::Poll)).unwrap();
    let mut events = client.subscribe();

    let pdf = dir.path().join("a.pdf");
    std::fs::write(&pdf, b"%PDF-1.4 test").unwrap();
    let results = client.submit_files(&[pdf]).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, UploadStatus::Processing);
    assert_eq!(results[0].job_id, Some(JobId::new("J1")));

    wait_for_event(&mut events, |e| {
        matches!(e, Event::DownloadComplete { filename, .. } if filename == "a.csv")
    })
    .await;

    // Let a dozen more polls deliver the stale `completed` snapshot.
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(requests_to(&server, "/download/a.csv").await, 1);
    assert!(requests_to(&server, "/set-downloaded/J1").await >= 1);

    let saved = std::fs::read(dir.path().join("a.csv")).unwrap();
    assert_eq!(saved, b"symbol,qty,price\n");
    assert!(
        !dir.path().join("a (1).csv").exists(),
        "stale snapshots must not produce a second artifact"
    );

    assert_eq!(client.job_table()[&JobId::new("J1")].phase, Phase::Downloaded);

    client.shutdown().await;
}

#[tokio::test]
async fn failed_download_attempt_retries_on_the_next_poll() {
    let server = MockServer::start().await;
    mount_upload(&server, ACCEPT_A_PDF).await;
    mount_status(&server, COMPLETED_J1).await;
    // First attempt finds the artifact missing; the poll cadence retries.
    mount_download_missing_n(&server, "a.csv", 1).await;
    mount_download(&server, "a.csv", b"symbol,qty,price\n", 1).await;
    mount_mark_downloaded(&server, "J1").await;

    let dir = TempDir::new().unwrap();
    let client = JobSyncClient::new(fast_config(&server, dir.path(), SourceKind::Poll)).unwrap();
    let mut events = client.subscribe();

    let pdf = dir.path().join("a.pdf");
    std::fs::write(&pdf, b"%PDF-1.4 test").unwrap();
    client.submit_files(&[pdf]).await.unwrap();

    wait_for_event(&mut events, |e| matches!(e, Event::DownloadFailed { .. })).await;
    wait_for_event(&mut events, |e| matches!(e, Event::DownloadComplete { .. })).await;

    assert_eq!(requests_to(&server, "/download/a.csv").await, 2);
    let saved = std::fs::read(dir.path().join("a.csv")).unwrap();
    assert_eq!(saved, b"symbol,qty,price\n");

    client.shutdown().await;
}

#[tokio::test]
async fn failed_job_is_surfaced_and_never_downloaded() {
    let server = MockServer::start().await;
    mount_upload(
        &server,
        r#"{"results": [{"filename": "b.pdf", "status": "processing", "job_id": "J2"}]}"#,
    )
    .await;
    mount_status(
        &server,
        r#"{
            "J2": {"total_pages": 10, "processed_pages": 3, "phase": "failed", "elapsed_seconds": 2.0, "reason": "Unknown broker."}
        }"#,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let client = JobSyncClient::new(fast_config(&server, dir.path(), SourceKind::Poll)).unwrap();
    let mut events = client.subscribe();

    let pdf = dir.path().join("b.pdf");
    std::fs::write(&pdf, b"%PDF-1.4 test").unwrap();
    client.submit_files(&[pdf]).await.unwrap();

    let event = wait_for_event(&mut events, |e| matches!(e, Event::JobFailed { .. })).await;
    assert!(matches!(
        event,
        Event::JobFailed { job_id, reason }
            if job_id == JobId::new("J2") && reason.as_deref() == Some("Unknown broker.")
    ));

    // Several more polls re-deliver the failure; no download is ever tried.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let download_attempts = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().starts_with("/download/"))
        .count();
    assert_eq!(download_attempts, 0);
    assert_eq!(client.job_table()[&JobId::new("J2")].phase, Phase::Failed);

    client.shutdown().await;
}
