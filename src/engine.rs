//! Lifecycle engine: the single logical thread that owns the coordinator.
//!
//! All state mutation funnels through one task. Status updates are processed
//! in arrival order and each one runs to completion, including scheduling
//! its downstream downloads, before the next is looked at, so no two merges
//! ever interleave. Download attempts themselves run as separate tasks and
//! report back through the settled channel.

use crate::backend::ConsumedAck;
use crate::config::RetryConfig;
use crate::coordinator::{DownloadRequest, JobLifecycleCoordinator, MergeOutcome};
use crate::download::DownloadExecutor;
use crate::registry::SharedRegistry;
use crate::retry;
use crate::types::{DownloadOutcome, Event, JobId, JobStatus, JobTable};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Buffer size for the status feed channel
const STATUS_FEED_BUFFER: usize = 16;

/// Buffer size for the download-settled channel
const SETTLED_BUFFER: usize = 64;

/// A status delivery from either source strategy
#[derive(Debug)]
pub enum StatusUpdate {
    /// Full server-authoritative snapshot (poll strategy)
    Snapshot(JobTable),
    /// Single-job delta (push strategy)
    Single(JobId, JobStatus),
    /// Hint that an output artifact exists (push strategy)
    FileReady(String),
}

/// Sender half handed to a status source
pub type StatusFeed = mpsc::Sender<StatusUpdate>;

/// Parameters for constructing the lifecycle engine
pub(crate) struct EngineParams {
    /// Shared filename registry
    pub registry: SharedRegistry,
    /// Download executor invoked for each eligible job
    pub executor: Arc<dyn DownloadExecutor>,
    /// Mark-consumed acknowledgement sink
    pub ack: Arc<dyn ConsumedAck>,
    /// Retry policy for the acknowledgement call
    pub retry: RetryConfig,
    /// Event broadcast sender
    pub event_tx: broadcast::Sender<Event>,
    /// Observable job table published after every mutation
    pub table_tx: watch::Sender<JobTable>,
    /// Teardown signal
    pub cancel: CancellationToken,
}

/// The engine task; see the module docs for the threading discipline.
pub(crate) struct SyncEngine {
    coordinator: JobLifecycleCoordinator,
    executor: Arc<dyn DownloadExecutor>,
    ack: Arc<dyn ConsumedAck>,
    retry: RetryConfig,
    event_tx: broadcast::Sender<Event>,
    table_tx: watch::Sender<JobTable>,
    status_rx: mpsc::Receiver<StatusUpdate>,
    settled_tx: mpsc::Sender<(DownloadRequest, DownloadOutcome)>,
    settled_rx: mpsc::Receiver<(DownloadRequest, DownloadOutcome)>,
    cancel: CancellationToken,
}

impl SyncEngine {
    /// Build an engine and the feed its status source writes into
    pub(crate) fn new(params: EngineParams) -> (Self, StatusFeed) {
        let EngineParams {
            registry,
            executor,
            ack,
            retry,
            event_tx,
            table_tx,
            cancel,
        } = params;

        let (status_tx, status_rx) = mpsc::channel(STATUS_FEED_BUFFER);
        let (settled_tx, settled_rx) = mpsc::channel(SETTLED_BUFFER);

        let engine = Self {
            coordinator: JobLifecycleCoordinator::new(registry),
            executor,
            ack,
            retry,
            event_tx,
            table_tx,
            status_rx,
            settled_tx,
            settled_rx,
            cancel,
        };
        (engine, status_tx)
    }

    /// Run until teardown. In-flight download tasks are abandoned on
    /// cancellation, never aborted: they settle into a closed channel.
    pub(crate) async fn run(mut self) {
        tracing::info!("job lifecycle engine started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                settled = self.settled_rx.recv() => {
                    let Some((request, outcome)) = settled else { break };
                    self.handle_settled(request, outcome);
                }

                update = self.status_rx.recv() => {
                    let Some(update) = update else { break };
                    self.handle_update(update);
                }
            }
        }

        tracing::info!("job lifecycle engine stopped");
    }

    fn handle_update(&mut self, update: StatusUpdate) {
        let outcome = match update {
            StatusUpdate::Snapshot(snapshot) => self.coordinator.merge_snapshot(snapshot),
            StatusUpdate::Single(job_id, status) => self.coordinator.apply_update(job_id, status),
            StatusUpdate::FileReady(filename) => {
                let requests = self
                    .coordinator
                    .on_file_ready(&filename)
                    .into_iter()
                    .collect();
                MergeOutcome {
                    requests,
                    events: Vec::new(),
                }
            }
        };

        for event in outcome.events {
            self.event_tx.send(event).ok();
        }
        for request in outcome.requests {
            self.spawn_download(request);
        }
        self.publish_table();
    }

    fn handle_settled(&mut self, request: DownloadRequest, outcome: DownloadOutcome) {
        self.coordinator.on_download_settled(&request.job_id, &outcome);

        match outcome {
            DownloadOutcome::Success => {
                self.event_tx
                    .send(Event::DownloadComplete {
                        job_id: request.job_id.clone(),
                        filename: request.filename,
                    })
                    .ok();
                self.acknowledge_consumed(request.job_id);
            }
            DownloadOutcome::Failure(failure) => {
                self.event_tx
                    .send(Event::DownloadFailed {
                        job_id: request.job_id,
                        filename: request.filename,
                        reason: failure.to_string(),
                    })
                    .ok();
            }
        }
        self.publish_table();
    }

    fn spawn_download(&self, request: DownloadRequest) {
        tracing::info!(
            job_id = %request.job_id,
            filename = %request.filename,
            "starting download"
        );
        self.event_tx
            .send(Event::DownloadStarted {
                job_id: request.job_id.clone(),
                filename: request.filename.clone(),
            })
            .ok();

        let executor = Arc::clone(&self.executor);
        let settled_tx = self.settled_tx.clone();
        tokio::spawn(async move {
            let outcome = executor
                .fetch_and_save(&request.job_id, &request.filename)
                .await;
            if settled_tx.send((request, outcome)).await.is_err() {
                tracing::debug!("engine gone before download settled");
            }
        });
    }

    /// Ask the backend to mark the job consumed. Fire and forget with
    /// backoff: the call is idempotent and a miss only delays server-side
    /// convergence; the downloaded set already protects against
    /// re-triggering locally.
    fn acknowledge_consumed(&self, job_id: JobId) {
        let ack = Arc::clone(&self.ack);
        let retry_config = self.retry.clone();
        tokio::spawn(async move {
            if let Err(e) = retry::with_backoff(&retry_config, || ack.acknowledge(&job_id)).await {
                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    "failed to acknowledge download to backend"
                );
            }
        });
    }

    fn publish_table(&self) {
        self.table_tx.send_replace(self.coordinator.job_table());
    }
}
