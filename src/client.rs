//! Client facade wiring submission, synchronization, and retrieval together.

use crate::backend::BackendClient;
use crate::config::{Config, SourceKind};
use crate::download::HttpDownloadExecutor;
use crate::engine::{EngineParams, SyncEngine};
use crate::error::{Error, Result};
use crate::folder_watcher::FolderWatcher;
use crate::health::HealthMonitor;
use crate::poll::StatusPoller;
use crate::push::{PushSource, SseConnector};
use crate::registry::{self, FilenameRegistry, SharedRegistry};
use crate::submit::UploadSubmitter;
use crate::types::{Event, HealthReport, JobId, JobTable, UploadResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

/// Buffer size for the event broadcast channel; slow subscribers that fall
/// this far behind start losing the oldest events.
const EVENT_CHANNEL_BUFFER: usize = 256;

/// Main client instance (cloneable - all fields are cheap handles)
///
/// Construction starts the background services: the lifecycle engine, the
/// configured status source (poll or push), the health monitor, and any
/// folder watchers. [`shutdown`](Self::shutdown) tears them down; in-flight
/// downloads are abandoned, not forcibly cancelled.
#[derive(Clone)]
pub struct JobSyncClient {
    submitter: Arc<UploadSubmitter>,
    registry: SharedRegistry,
    event_tx: broadcast::Sender<Event>,
    table_rx: watch::Receiver<JobTable>,
    health_rx: watch::Receiver<Option<HealthReport>>,
    cancel: CancellationToken,
    accepting_new: Arc<AtomicBool>,
}

impl JobSyncClient {
    /// Create a client and start its background services.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid backend configuration or a watch
    /// folder that cannot be set up.
    pub fn new(config: Config) -> Result<Self> {
        let backend = BackendClient::new(&config.backend)?;
        let registry = FilenameRegistry::shared();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_BUFFER);
        let (table_tx, table_rx) = watch::channel(JobTable::new());
        let cancel = CancellationToken::new();

        let executor = Arc::new(HttpDownloadExecutor::new(
            backend.clone(),
            config.storage.clone(),
        ));

        let (engine, feed) = SyncEngine::new(EngineParams {
            registry: registry.clone(),
            executor,
            ack: Arc::new(backend.clone()),
            retry: config.retry.clone(),
            event_tx: event_tx.clone(),
            table_tx,
            cancel: cancel.child_token(),
        });
        tokio::spawn(engine.run());

        match config.sync.source {
            SourceKind::Poll => {
                let poller = StatusPoller::new(
                    Arc::new(backend.clone()),
                    feed,
                    config.sync.poll_interval,
                    cancel.child_token(),
                );
                tokio::spawn(poller.run());
            }
            SourceKind::Push => {
                let source = PushSource::new(
                    Arc::new(SseConnector::new(backend.clone())),
                    feed,
                    config.sync.reconnect_delay,
                    cancel.child_token(),
                );
                tokio::spawn(source.run());
            }
        }

        let health_rx = if config.health.enabled {
            let (monitor, health_rx) = HealthMonitor::new(
                backend.clone(),
                &config.health,
                event_tx.clone(),
                cancel.child_token(),
            );
            tokio::spawn(monitor.run());
            health_rx
        } else {
            let (_tx, health_rx) = watch::channel(None);
            health_rx
        };

        let submitter = Arc::new(UploadSubmitter::new(
            backend,
            registry.clone(),
            config.retry.clone(),
            event_tx.clone(),
        ));

        let client = Self {
            submitter,
            registry,
            event_tx,
            table_rx,
            health_rx,
            cancel: cancel.clone(),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        if !config.watch_folders.is_empty() {
            let mut watcher = FolderWatcher::new(
                client.clone(),
                config.watch_folders.clone(),
                cancel.child_token(),
            )?;
            watcher.start()?;
            tokio::spawn(watcher.run());
        }

        Ok(client)
    }

    /// Submit a batch of local PDF files for processing.
    ///
    /// Results come back in input order, one per path. Submission is gated
    /// by the latest health report: while the backend reports its model
    /// runtime down, this returns [`Error::BackendUnavailable`] without
    /// contacting the server. Before the first report arrives submission is
    /// allowed optimistically.
    pub async fn submit_files(&self, paths: &[PathBuf]) -> Result<Vec<UploadResult>> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        {
            let report = self.health_rx.borrow();
            if let Some(report) = report.as_ref()
                && !report.is_healthy()
            {
                return Err(Error::BackendUnavailable(report.message.clone()));
            }
        }
        self.submitter.submit(paths).await
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Subscribe to lifecycle events as a [`futures::Stream`]
    pub fn event_stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.subscribe())
    }

    /// Point-in-time copy of the merged job table, for rendering
    ///
    /// Retains last-known status for jobs the server no longer reports. The
    /// phase presented here never moves backward for a given job: locally
    /// confirmed downloads outrank stale server snapshots (see
    /// [`crate::coordinator::JobLifecycleCoordinator`]).
    pub fn job_table(&self) -> JobTable {
        self.table_rx.borrow().clone()
    }

    /// The latest health report, if any probe has settled yet
    pub fn health(&self) -> Option<HealthReport> {
        self.health_rx.borrow().clone()
    }

    /// The originally submitted filename for a job, while the server still
    /// knows the job
    pub fn submitted_filename(&self, job_id: &JobId) -> Option<String> {
        registry::lock(&self.registry)
            .resolve(job_id)
            .map(str::to_string)
    }

    /// Gracefully shut down the client.
    ///
    /// Stops future polling, reconnection, and health probing, and refuses
    /// new submissions. In-flight downloads are abandoned (their tasks run
    /// to completion and settle into a closed channel) rather than aborted,
    /// so an artifact that is already being written is never truncated.
    pub async fn shutdown(&self) {
        tracing::info!("initiating graceful shutdown");
        self.accepting_new.store(false, Ordering::SeqCst);
        self.event_tx.send(Event::Shutdown).ok();
        self.cancel.cancel();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, HealthConfig, StorageConfig, SyncConfig};
    use std::time::Duration;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn idle_backend() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
            .mount(&server)
            .await;
        server
    }

    fn config_for(server: &MockServer, health_enabled: bool) -> Config {
        Config {
            backend: BackendConfig {
                base_url: server.uri(),
                request_timeout: Duration::from_secs(2),
            },
            sync: SyncConfig {
                poll_interval: Duration::from_millis(25),
                ..Default::default()
            },
            storage: StorageConfig::default(),
            health: HealthConfig {
                enabled: health_enabled,
                interval: Duration::from_millis(25),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn invalid_base_url_fails_construction() {
        let result = JobSyncClient::new(Config {
            backend: BackendConfig {
                base_url: "::not a url::".into(),
                request_timeout: Duration::from_secs(1),
            },
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn submission_is_gated_by_an_unhealthy_report() {
        let server = idle_backend().await;
        Mock::given(method("GET"))
            .and(url_path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"status": "unhealthy", "ollama_available": false, "message": "Ollama connection failed"}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = JobSyncClient::new(config_for(&server, true)).unwrap();

        // Wait until the first health report lands.
        let mut health_rx = client.health_rx.clone();
        tokio::time::timeout(Duration::from_secs(2), health_rx.wait_for(|r| r.is_some()))
            .await
            .expect("health report should arrive")
            .unwrap();

        let result = client.submit_files(&[PathBuf::from("a.pdf")]).await;
        assert!(matches!(result, Err(Error::BackendUnavailable(_))));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn submission_is_refused_after_shutdown() {
        let server = idle_backend().await;
        let client = JobSyncClient::new(config_for(&server, false)).unwrap();

        client.shutdown().await;

        let result = client.submit_files(&[PathBuf::from("a.pdf")]).await;
        assert!(matches!(result, Err(Error::ShuttingDown)));
    }

    #[tokio::test]
    async fn shutdown_broadcasts_the_shutdown_event() {
        let server = idle_backend().await;
        let client = JobSyncClient::new(config_for(&server, false)).unwrap();

        let mut events = client.subscribe();
        client.shutdown().await;

        let event = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(Event::Shutdown) = events.recv().await {
                    return Event::Shutdown;
                }
            }
        })
        .await
        .expect("shutdown event should be broadcast");
        assert!(matches!(event, Event::Shutdown));
    }

    #[tokio::test]
    async fn job_table_starts_empty_and_is_observable() {
        let server = idle_backend().await;
        let client = JobSyncClient::new(config_for(&server, false)).unwrap();

        assert!(client.job_table().is_empty());
        assert!(client.health().is_none());
        assert!(client.submitted_filename(&JobId::new("J1")).is_none());

        client.shutdown().await;
    }
}
