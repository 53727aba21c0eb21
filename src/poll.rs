//! Periodic status polling with single-flight scheduling.
//!
//! The poller never lets requests overlap: the next tick is armed only after
//! the previous attempt settles, so a slow response delays, but never
//! duplicates, the following poll. Fetch failures skip the cycle silently
//! and leave existing state untouched.

use crate::engine::{StatusFeed, StatusUpdate};
use crate::error::Result;
use crate::types::JobTable;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Abstraction over the status round trip so the scheduling discipline can
/// be tested without a live backend.
#[async_trait]
pub trait StatusFetch: Send + Sync {
    /// Fetch the full server snapshot
    async fn fetch(&self) -> Result<JobTable>;
}

#[async_trait]
impl StatusFetch for crate::backend::BackendClient {
    async fn fetch(&self) -> Result<JobTable> {
        self.fetch_status().await
    }
}

/// Polls the status endpoint on a fixed delay, feeding full snapshots to the
/// lifecycle engine.
pub struct StatusPoller {
    fetcher: Arc<dyn StatusFetch>,
    feed: StatusFeed,
    interval: Duration,
    cancel: CancellationToken,
}

impl StatusPoller {
    /// Create a poller
    ///
    /// `interval` is measured from the previous attempt settling, not from
    /// its start (fixed delay, not fixed rate).
    pub fn new(
        fetcher: Arc<dyn StatusFetch>,
        feed: StatusFeed,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            feed,
            interval,
            cancel,
        }
    }

    /// Run the polling loop until teardown or until the engine goes away
    pub async fn run(self) {
        tracing::info!(interval = ?self.interval, "status poller started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.fetcher.fetch() => match result {
                    Ok(snapshot) => {
                        if self
                            .feed
                            .send(StatusUpdate::Snapshot(snapshot))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        // Transient failure: skip this cycle and keep the
                        // last-known state; the next tick retries.
                        tracing::debug!(error = %e, "status poll failed, retrying next tick");
                    }
                },
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("status poller stopped");
    }
}
