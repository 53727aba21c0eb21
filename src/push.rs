//! Push-based status source with an explicit reconnecting state machine.
//!
//! A persistent event stream delivers discrete per-job updates that get
//! folded into the engine's state as single-entry merges, plus file-ready
//! hints that may short-circuit completion detection. The connection runs
//! through {Disconnected, Connecting, Connected, Reconnecting} with an
//! injectable reconnect delay, so the whole machine is testable without
//! real sockets. While disconnected, job state is preserved as last-known,
//! never cleared.

use crate::backend::BackendClient;
use crate::engine::{StatusFeed, StatusUpdate};
use crate::error::Result;
use crate::types::{JobId, JobStatus};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Discrete events delivered over the push stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PushEvent {
    /// Status delta for a single job
    JobUpdate {
        /// Job id
        job_id: JobId,
        /// New status for the job
        status: JobStatus,
    },
    /// Hint that an output artifact is ready for retrieval
    FileReady {
        /// Name of the artifact on the backend
        filename: String,
    },
}

/// Connection lifecycle of the push stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not running
    Disconnected,
    /// Attempting to open the stream
    Connecting,
    /// Stream open, events flowing
    Connected,
    /// Stream lost; waiting out the reconnect delay
    Reconnecting,
}

/// Boxed stream of push events
pub type PushEventStream = Pin<Box<dyn Stream<Item = Result<PushEvent>> + Send>>;

/// Opens the underlying event stream, abstracted so tests can script
/// connections without sockets.
#[async_trait]
pub trait EventStreamConnector: Send + Sync {
    /// Open a fresh event stream
    async fn connect(&self) -> Result<PushEventStream>;
}

/// Production connector: server-sent events from the backend's `/events`
/// endpoint, `data:` lines carrying JSON-encoded [`PushEvent`]s.
pub struct SseConnector {
    backend: BackendClient,
}

impl SseConnector {
    /// Create a connector over the given backend client
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl EventStreamConnector for SseConnector {
    async fn connect(&self) -> Result<PushEventStream> {
        let bytes = self.backend.open_event_stream().await?;
        let stream = futures::stream::unfold(
            (Box::pin(bytes), String::new(), VecDeque::new()),
            |(mut bytes, mut buffer, mut pending)| async move {
                loop {
                    if let Some(event) = pending.pop_front() {
                        return Some((Ok(event), (bytes, buffer, pending)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            pending.extend(parse_sse_chunk(&mut buffer, &chunk));
                        }
                        Some(Err(e)) => return Some((Err(e), (bytes, buffer, pending))),
                        None => return None,
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }
}

/// Fold a byte chunk into the line buffer and parse any completed
/// `data:` lines. Malformed payloads are logged and skipped; other SSE
/// fields (comments, ids) are ignored.
fn parse_sse_chunk(buffer: &mut String, chunk: &[u8]) -> Vec<PushEvent> {
    buffer.push_str(&String::from_utf8_lossy(chunk));

    let mut events = Vec::new();
    while let Some(newline) = buffer.find('\n') {
        let line: String = buffer.drain(..=newline).collect();
        let line = line.trim_end_matches(['\n', '\r']);
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim_start();
        if data.is_empty() {
            continue;
        }
        match serde_json::from_str::<PushEvent>(data) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!(error = %e, payload = data, "ignoring malformed push event");
            }
        }
    }
    events
}

/// What the pump loop decided about the source's future
enum PumpExit {
    /// Stream lost; go around through the reconnect delay
    Reconnect,
    /// Teardown or engine gone; stop the source entirely
    Stop,
}

/// Drives the push stream, feeding the lifecycle engine
pub struct PushSource {
    connector: Arc<dyn EventStreamConnector>,
    feed: StatusFeed,
    reconnect_delay: Duration,
    cancel: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
}

impl PushSource {
    /// Create a push source with an injectable reconnect delay
    pub fn new(
        connector: Arc<dyn EventStreamConnector>,
        feed: StatusFeed,
        reconnect_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            feed,
            reconnect_delay,
            cancel,
            state_tx,
        }
    }

    /// Observe connection state transitions
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Run the connect/pump/reconnect loop until teardown
    pub async fn run(self) {
        tracing::info!(reconnect_delay = ?self.reconnect_delay, "push source started");

        loop {
            if self.cancel.is_cancelled() || self.feed.is_closed() {
                break;
            }
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(stream) => {
                    self.set_state(ConnectionState::Connected);
                    if let PumpExit::Stop = self.pump(stream).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "push stream connection failed");
                }
            }

            self.set_state(ConnectionState::Reconnecting);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!("push source stopped");
    }

    async fn pump(&self, mut stream: PushEventStream) -> PumpExit {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return PumpExit::Stop,
                item = stream.next() => match item {
                    Some(Ok(event)) => {
                        if !self.forward(event).await {
                            return PumpExit::Stop;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "push stream error");
                        return PumpExit::Reconnect;
                    }
                    None => {
                        tracing::debug!("push stream ended");
                        return PumpExit::Reconnect;
                    }
                }
            }
        }
    }

    /// Translate a push event into an engine update; false when the engine
    /// has gone away.
    async fn forward(&self, event: PushEvent) -> bool {
        let update = match event {
            PushEvent::JobUpdate { job_id, status } => StatusUpdate::Single(job_id, status),
            PushEvent::FileReady { filename } => StatusUpdate::FileReady(filename),
        };
        self.feed.send(update).await.is_ok()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}
