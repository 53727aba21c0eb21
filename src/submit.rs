//! Batch submission of PDF files to the backend.

use crate::backend::{BackendClient, UploadFile};
use crate::config::RetryConfig;
use crate::error::Result;
use crate::registry::{self, SharedRegistry};
use crate::retry;
use crate::types::{Event, UploadResult, UploadStatus};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

/// Submits batches of local PDF files and records accepted jobs in the
/// filename registry.
pub struct UploadSubmitter {
    backend: BackendClient,
    registry: SharedRegistry,
    retry: RetryConfig,
    event_tx: broadcast::Sender<Event>,
}

impl UploadSubmitter {
    /// Create a submitter
    pub fn new(
        backend: BackendClient,
        registry: SharedRegistry,
        retry: RetryConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            backend,
            registry,
            retry,
            event_tx,
        }
    }

    /// Submit a batch of local files for processing.
    ///
    /// Returns one [`UploadResult`] per input path, in input order. Paths
    /// without a `.pdf` extension and unreadable files are rejected
    /// client-side without contacting the backend, mirroring the server's
    /// own validation; everything else goes up as one batch request.
    pub async fn submit(&self, paths: &[PathBuf]) -> Result<Vec<UploadResult>> {
        let mut results: Vec<Option<UploadResult>> = vec![None; paths.len()];
        let mut batch: Vec<(usize, UploadFile)> = Vec::new();

        for (index, path) in paths.iter().enumerate() {
            let filename = display_name(path);

            if !is_pdf(path) {
                results[index] = Some(rejected(filename, "file is not a PDF"));
                continue;
            }
            match tokio::fs::read(path).await {
                Ok(bytes) => batch.push((index, UploadFile { filename, bytes })),
                Err(e) => {
                    results[index] = Some(rejected(filename, &format!("could not read file: {e}")));
                }
            }
        }

        if !batch.is_empty() {
            let (indices, files): (Vec<usize>, Vec<UploadFile>) = batch.into_iter().unzip();
            let uploaded =
                retry::with_backoff(&self.retry, || self.backend.upload(files.clone())).await?;

            if uploaded.len() != indices.len() {
                tracing::warn!(
                    expected = indices.len(),
                    received = uploaded.len(),
                    "backend returned an unexpected result count"
                );
            }
            for (index, result) in indices.into_iter().zip(uploaded) {
                results[index] = Some(result);
            }
        }

        let results: Vec<UploadResult> = results.into_iter().flatten().collect();
        self.record_and_announce(&results);
        Ok(results)
    }

    /// Register accepted jobs and emit per-file events
    fn record_and_announce(&self, results: &[UploadResult]) {
        let mut registry = registry::lock(&self.registry);
        for result in results {
            match (&result.status, &result.job_id) {
                (UploadStatus::Processing, Some(job_id)) => {
                    tracing::info!(
                        job_id = %job_id,
                        filename = %result.filename,
                        "file accepted for processing"
                    );
                    registry.record(job_id.clone(), result.filename.clone());
                    self.event_tx
                        .send(Event::Submitted {
                            job_id: job_id.clone(),
                            filename: result.filename.clone(),
                            submitted_at: chrono::Utc::now(),
                        })
                        .ok();
                }
                _ => {
                    let reason = result
                        .reason
                        .clone()
                        .unwrap_or_else(|| "rejected by backend".to_string());
                    tracing::warn!(filename = %result.filename, reason = %reason, "file rejected");
                    self.event_tx
                        .send(Event::SubmissionRejected {
                            filename: result.filename.clone(),
                            reason,
                        })
                        .ok();
                }
            }
        }
    }
}

fn rejected(filename: String, reason: &str) -> UploadResult {
    UploadResult {
        filename,
        status: UploadStatus::Failed,
        reason: Some(reason.to_string()),
        job_id: None,
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

/// Check for a `.pdf` extension (case-insensitive)
pub(crate) fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}
