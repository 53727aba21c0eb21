//! Backend health monitoring.
//!
//! The health endpoint is probed on its own fixed interval, independent of
//! job-status polling. The latest report is published through a watch
//! channel, consulted by the client to gate submissions, and transitions
//! are announced as [`Event::HealthChanged`].

use crate::backend::BackendClient;
use crate::config::HealthConfig;
use crate::types::{Event, HealthReport};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

/// Periodically probes backend health and publishes the latest report
pub struct HealthMonitor {
    backend: BackendClient,
    interval: Duration,
    report_tx: watch::Sender<Option<HealthReport>>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl HealthMonitor {
    /// Create a monitor and the receiver its reports are published through.
    /// No report exists until the first probe settles.
    pub fn new(
        backend: BackendClient,
        config: &HealthConfig,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<Option<HealthReport>>) {
        let (report_tx, report_rx) = watch::channel(None);
        (
            Self {
                backend,
                interval: config.interval,
                report_tx,
                event_tx,
                cancel,
            },
            report_rx,
        )
    }

    /// Run the probe loop until teardown
    pub async fn run(self) {
        tracing::info!(interval = ?self.interval, "health monitor started");
        let mut last_healthy: Option<bool> = None;

        loop {
            let report = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.backend.health() => match result {
                    Ok(report) => report,
                    Err(e) => {
                        // An unreachable backend gates submissions the same
                        // way an unhealthy one does.
                        tracing::debug!(error = %e, "health probe failed");
                        HealthReport {
                            status: "unreachable".to_string(),
                            ollama_available: false,
                            message: e.to_string(),
                        }
                    }
                },
            };

            let healthy = report.is_healthy();
            if last_healthy != Some(healthy) {
                tracing::info!(healthy, message = %report.message, "backend health changed");
                self.event_tx
                    .send(Event::HealthChanged {
                        healthy,
                        message: report.message.clone(),
                    })
                    .ok();
                last_healthy = Some(healthy);
            }
            self.report_tx.send_replace(Some(report));

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("health monitor stopped");
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server_url: &str) -> BackendClient {
        BackendClient::new(&BackendConfig {
            base_url: server_url.to_string(),
            request_timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    fn monitor_for(
        backend: BackendClient,
    ) -> (
        HealthMonitor,
        watch::Receiver<Option<HealthReport>>,
        broadcast::Receiver<Event>,
        CancellationToken,
    ) {
        let (event_tx, events) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let (monitor, reports) = HealthMonitor::new(
            backend,
            &HealthConfig {
                enabled: true,
                interval: Duration::from_millis(20),
            },
            event_tx,
            cancel.clone(),
        );
        (monitor, reports, events, cancel)
    }

    #[tokio::test]
    async fn publishes_reports_and_announces_transitions() {
        let server = MockServer::start().await;
        // First probe healthy, every later probe unhealthy.
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"status": "healthy", "ollama_available": true, "message": "ok"}"#,
                "application/json",
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"status": "unhealthy", "ollama_available": false, "message": "Ollama connection failed"}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let (monitor, mut reports, mut events, cancel) = monitor_for(backend_for(&server.uri()));
        let handle = tokio::spawn(monitor.run());

        tokio::time::timeout(
            Duration::from_secs(2),
            reports.wait_for(|r| r.as_ref().is_some_and(|r| r.is_healthy())),
        )
        .await
        .expect("first report should be healthy")
        .unwrap();

        tokio::time::timeout(
            Duration::from_secs(2),
            reports.wait_for(|r| r.as_ref().is_some_and(|r| !r.is_healthy())),
        )
        .await
        .expect("later reports should flip to unhealthy")
        .unwrap();

        cancel.cancel();
        handle.await.unwrap();

        // Exactly two transitions were announced: none→healthy, healthy→unhealthy.
        let mut transitions = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let Event::HealthChanged { healthy, .. } = event {
                transitions.push(healthy);
            }
        }
        assert_eq!(transitions, vec![true, false]);
    }

    #[tokio::test]
    async fn unreachable_backend_reads_as_unhealthy() {
        // Nothing listens on this port.
        let (monitor, mut reports, _events, cancel) = monitor_for(backend_for("http://127.0.0.1:9"));
        let handle = tokio::spawn(monitor.run());

        let report = tokio::time::timeout(
            Duration::from_secs(2),
            reports.wait_for(|r| r.is_some()),
        )
        .await
        .expect("a synthesized report should appear")
        .unwrap()
        .clone()
        .unwrap();

        assert!(!report.is_healthy());
        assert_eq!(report.status, "unreachable");

        cancel.cancel();
        handle.await.unwrap();
    }
}
