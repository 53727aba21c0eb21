//! Core types for pdfjob-sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a submitted job
///
/// Assigned by the backend at submission time and never reused. The client
/// treats it as an opaque string.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new JobId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Backend is still working through the pages
    Processing,
    /// Output artifact has been produced and awaits retrieval
    Completed,
    /// Backend gave up on this job
    Failed,
    /// Output artifact has been retrieved by a client
    Downloaded,
}

impl Phase {
    /// Position along the monotone lifecycle path, used to detect a job
    /// moving backward (an id being reused by the server).
    pub(crate) fn rank(self) -> u8 {
        match self {
            Phase::Processing => 0,
            Phase::Completed | Phase::Failed => 1,
            Phase::Downloaded => 2,
        }
    }

    /// Whether no further transitions are expected for this phase
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Failed | Phase::Downloaded)
    }
}

/// Server-reported status snapshot for one job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Total pages the backend intends to process
    pub total_pages: u32,

    /// Pages processed so far (0 ..= total_pages)
    pub processed_pages: u32,

    /// Current lifecycle phase
    pub phase: Phase,

    /// Wall-clock seconds the job has spent on the backend
    #[serde(default)]
    pub elapsed_seconds: f64,

    /// Name of the produced output artifact, once the backend has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,

    /// Failure cause reported by the backend, for failed jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Full server-authoritative mapping of known jobs to their status
pub type JobTable = HashMap<JobId, JobStatus>;

/// Per-file acceptance state at submission time
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Accepted; a job id was assigned
    Processing,
    /// Rejected; see the accompanying reason
    Failed,
}

/// Per-file outcome of a batch submission, in input order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    /// The submitted filename
    pub filename: String,

    /// Whether the backend accepted the file
    pub status: UploadStatus,

    /// Human-readable failure cause, for rejected files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Assigned job id, present iff the file was accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
}

/// Backend health probe result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Coarse status string, e.g. "healthy" or "unhealthy"
    pub status: String,

    /// Whether the model backend the processing pipeline depends on is up
    pub ollama_available: bool,

    /// Human-readable detail
    pub message: String,
}

impl HealthReport {
    /// Whether submissions should currently be permitted
    pub fn is_healthy(&self) -> bool {
        self.ollama_available
    }
}

/// Failure detail reported by a download attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadFailure {
    /// Output artifact not present on the backend (yet)
    FileMissing,
    /// Transport-level failure
    Network {
        /// Underlying transport error text
        reason: String,
    },
    /// Artifact was fetched but could not be written locally
    Save {
        /// Underlying I/O error text
        reason: String,
    },
}

impl std::fmt::Display for DownloadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadFailure::FileMissing => write!(f, "file missing on backend"),
            DownloadFailure::Network { reason } => write!(f, "network failure: {reason}"),
            DownloadFailure::Save { reason } => write!(f, "save failure: {reason}"),
        }
    }
}

/// Outcome of a single download attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Artifact fetched and persisted locally
    Success,
    /// Attempt failed; the job stays eligible for a later retry
    Failure(DownloadFailure),
}

/// Event emitted during the job lifecycle
///
/// Consumers subscribe through [`crate::JobSyncClient::subscribe`]; the
/// presentation layer renders from these plus the job table.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A file was accepted by the backend and assigned a job id
    Submitted {
        /// Assigned job id
        job_id: JobId,
        /// Originally submitted filename
        filename: String,
        /// Client-side submission timestamp
        submitted_at: DateTime<Utc>,
    },

    /// A file was rejected at submission time
    SubmissionRejected {
        /// The rejected filename
        filename: String,
        /// Rejection cause
        reason: String,
    },

    /// A job's page progress advanced
    JobProgress {
        /// Job id
        job_id: JobId,
        /// Pages processed so far
        processed_pages: u32,
        /// Total pages
        total_pages: u32,
    },

    /// The backend reported a job as failed
    JobFailed {
        /// Job id
        job_id: JobId,
        /// Failure cause, if the backend provided one
        reason: Option<String>,
    },

    /// A download attempt was started for a completed job
    DownloadStarted {
        /// Job id
        job_id: JobId,
        /// Resolved target filename
        filename: String,
    },

    /// A download attempt finished and the artifact is on disk
    DownloadComplete {
        /// Job id
        job_id: JobId,
        /// Resolved target filename
        filename: String,
    },

    /// A download attempt failed; it may be retried on a later snapshot
    DownloadFailed {
        /// Job id
        job_id: JobId,
        /// Resolved target filename
        filename: String,
        /// Failure detail
        reason: String,
    },

    /// The server no longer reports this job; local bookkeeping was pruned
    JobForgotten {
        /// Job id
        job_id: JobId,
    },

    /// The backend's health status changed
    HealthChanged {
        /// Whether submissions are currently permitted
        healthy: bool,
        /// Human-readable detail from the health probe
        message: String,
    },

    /// The client is shutting down
    Shutdown,
}
