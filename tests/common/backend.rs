//! Scripted mock backend and fast client configuration for E2E tests

use pdfjob_sync::config::{
    BackendConfig, HealthConfig, RetryConfig, StorageConfig, SyncConfig,
};
use pdfjob_sync::{Config, Event, SourceKind};
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Client configuration pointed at the mock server, with cycles measured in
/// tens of milliseconds so tests settle quickly.
pub fn fast_config(server: &MockServer, output_dir: &Path, source: SourceKind) -> Config {
    Config {
        backend: BackendConfig {
            base_url: server.uri(),
            request_timeout: Duration::from_secs(2),
        },
        sync: SyncConfig {
            source,
            poll_interval: Duration::from_millis(20),
            reconnect_delay: Duration::from_millis(20),
        },
        storage: StorageConfig {
            output_dir: output_dir.to_path_buf(),
            ..Default::default()
        },
        health: HealthConfig {
            enabled: false,
            ..Default::default()
        },
        retry: RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        watch_folders: Vec::new(),
    }
}

/// Serve `body` for the next `times` GET /status requests
pub async fn mount_status_n(server: &MockServer, body: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json"))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Serve `body` for every remaining GET /status request
pub async fn mount_status(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json"))
        .mount(server)
        .await;
}

/// Accept POST /upload with a canned per-file result body
pub async fn mount_upload(server: &MockServer, body: &str) {
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json"))
        .mount(server)
        .await;
}

/// Serve an artifact on GET /download/{filename}, verifying it is hit
/// exactly `expected_hits` times over the test.
pub async fn mount_download(server: &MockServer, filename: &str, bytes: &[u8], expected_hits: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/download/{filename}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
        .expect(expected_hits)
        .mount(server)
        .await;
}

/// Answer 404 for the next `times` GET /download/{filename} requests
pub async fn mount_download_missing_n(server: &MockServer, filename: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/download/{filename}")))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Accept POST /set-downloaded/{job_id}
pub async fn mount_mark_downloaded(server: &MockServer, job_id: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/set-downloaded/{job_id}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"message": "Job marked as downloaded"}"#, "application/json"),
        )
        .mount(server)
        .await;
}

/// Number of requests the server has seen for an exact path
pub async fn requests_to(server: &MockServer, target: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == target)
        .count()
}

/// Receive events until one matches, failing the test after 5 seconds
pub async fn wait_for_event<F>(rx: &mut broadcast::Receiver<Event>, mut predicate: F) -> Event
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
