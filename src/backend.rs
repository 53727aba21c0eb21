//! Typed HTTP client for the processing backend.
//!
//! Wraps the five backend endpoints behind typed methods: batch upload,
//! status snapshot, artifact download, mark-consumed, and health. A missing
//! artifact (404) is distinguished from transport failures so the caller can
//! treat "not ready yet" differently from "network down".

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::types::{HealthReport, JobId, JobTable, UploadResult};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Timeout override for the long-lived push event stream; the client-level
/// request timeout would otherwise sever the connection mid-stream.
const EVENT_STREAM_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// One file payload in a batch submission
#[derive(Clone, Debug)]
pub struct UploadFile {
    /// Filename reported to the backend
    pub filename: String,
    /// Raw PDF bytes
    pub bytes: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    results: Vec<UploadResult>,
}

/// HTTP client wrapper for the processing backend
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BackendClient {
    /// Create a client from the backend configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the base URL does not parse, and a
    /// network error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| Error::Config {
            message: format!("invalid base_url '{}': {}", config.base_url, e),
            key: Some("base_url".to_string()),
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    /// Build an endpoint URL from path segments, preserving any base path
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| Error::Config {
                message: "base_url cannot be used as a base".to_string(),
                key: Some("base_url".to_string()),
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// Submit a batch of files for processing
    ///
    /// The backend answers with one [`UploadResult`] per input file, in input
    /// order; accepted files carry the assigned job id.
    pub async fn upload(&self, files: Vec<UploadFile>) -> Result<Vec<UploadResult>> {
        let mut form = reqwest::multipart::Form::new();
        for file in files {
            let part = reqwest::multipart::Part::bytes(file.bytes)
                .file_name(file.filename)
                .mime_str("application/pdf")?;
            form = form.part("files", part);
        }

        let url = self.endpoint(&["upload"])?;
        let response = self.http.post(url).multipart(form).send().await?;
        let response = Self::check_status(response).await?;
        let body: UploadResponse = response.json().await?;
        Ok(body.results)
    }

    /// Fetch the full server-authoritative job status snapshot
    pub async fn fetch_status(&self) -> Result<JobTable> {
        let url = self.endpoint(&["status"])?;
        let response = Self::check_status(self.http.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Retrieve the raw bytes of an output artifact
    ///
    /// # Errors
    ///
    /// A 404 response maps to [`Error::FileMissing`], distinguishable from
    /// transient transport failures.
    pub async fn download(&self, filename: &str) -> Result<Vec<u8>> {
        let url = self.endpoint(&["download", filename])?;
        let response = self.http.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::FileMissing(filename.to_string()));
        }
        let response = Self::check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Instruct the backend to transition a job's authoritative phase to
    /// `downloaded`. Idempotent: re-marking an already-downloaded job is not
    /// an error on the server side.
    pub async fn mark_downloaded(&self, job_id: &JobId) -> Result<()> {
        let url = self.endpoint(&["set-downloaded", job_id.as_str()])?;
        Self::check_status(self.http.post(url).send().await?).await?;
        Ok(())
    }

    /// Probe backend health
    pub async fn health(&self) -> Result<HealthReport> {
        let url = self.endpoint(&["health"])?;
        let response = Self::check_status(self.http.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Open the push event stream as raw byte chunks
    ///
    /// The per-request timeout is stretched far beyond the client default so
    /// the stream can stay open indefinitely.
    pub(crate) async fn open_event_stream(
        &self,
    ) -> Result<impl Stream<Item = Result<Vec<u8>>> + Send + use<>> {
        let url = self.endpoint(&["events"])?;
        let response = self
            .http
            .get(url)
            .header("Accept", "text/event-stream")
            .timeout(EVENT_STREAM_TIMEOUT)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(Error::from)))
    }

    /// Map non-success responses to [`Error::Backend`] with the body text
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(Error::Backend {
            status: status.as_u16(),
            message,
        })
    }
}

/// Acknowledgement sink for consumed jobs, abstracted so the lifecycle engine
/// can be exercised without a live backend.
#[async_trait]
pub trait ConsumedAck: Send + Sync {
    /// Request the backend mark `job_id` as downloaded
    async fn acknowledge(&self, job_id: &JobId) -> Result<()>;
}

#[async_trait]
impl ConsumedAck for BackendClient {
    async fn acknowledge(&self, job_id: &JobId) -> Result<()> {
        self.mark_downloaded(job_id).await
    }
}
