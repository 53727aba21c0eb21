//! Configuration types for pdfjob-sync

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Backend endpoint configuration
///
/// Groups settings about how to reach the processing backend.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the processing backend (default: "http://localhost:8000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (default: 30 seconds)
    ///
    /// Applies to every request except the long-lived push event stream.
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// How job-status snapshots are obtained
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Periodic pull of the status endpoint
    #[default]
    Poll,
    /// Persistent event stream delivering per-job updates
    Push,
}

/// Status synchronization configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Which status source strategy to run
    #[serde(default)]
    pub source: SourceKind,

    /// Delay between status polls, measured from the previous attempt
    /// settling, so polls never overlap (default: 2 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Delay before reconnecting a dropped push stream (default: 3 seconds)
    #[serde(default = "default_reconnect_delay", with = "duration_serde")]
    pub reconnect_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            poll_interval: default_poll_interval(),
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

/// File collision handling when a download target already exists
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCollisionAction {
    /// Replace the existing file
    Overwrite,
    /// Add a numeric suffix, keeping earlier artifacts intact
    #[default]
    Rename,
}

/// Local storage for retrieved output artifacts
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Output directory (default: "./output")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Collision handling when the target file already exists
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_collision: FileCollisionAction::default(),
        }
    }
}

/// Health probing configuration
///
/// The health endpoint is polled on its own interval, independent of
/// job-status polling, and gates whether submission is permitted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Whether to run the health monitor at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between health probes (default: 10 seconds)
    #[serde(default = "default_health_interval", with = "duration_serde")]
    pub interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_health_interval(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// What to do with a PDF after it has been auto-submitted from a watch folder
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchFolderAction {
    /// Remove the file
    Delete,
    /// Move the file into a `submitted` subdirectory
    #[default]
    MoveToSubmitted,
    /// Leave the file in place
    Keep,
}

/// A directory watched for new PDF files to auto-submit
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchFolderConfig {
    /// Directory to watch (non-recursive)
    pub path: PathBuf,

    /// What to do with a file after successful submission
    #[serde(default)]
    pub after_submit: WatchFolderAction,
}

/// Main configuration for the job sync client
///
/// Fields are organized into logical sub-configs:
/// - [`backend`](BackendConfig): endpoint and request timeout
/// - [`sync`](SyncConfig): status source strategy and cadence
/// - [`storage`](StorageConfig): output directory and collision handling
/// - [`health`](HealthConfig): health probe cadence and gating
///
/// All sub-config fields are flattened for a flat JSON/TOML format.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend endpoint settings
    #[serde(flatten)]
    pub backend: BackendConfig,

    /// Status synchronization settings
    #[serde(flatten)]
    pub sync: SyncConfig,

    /// Local artifact storage settings
    #[serde(flatten)]
    pub storage: StorageConfig,

    /// Health probe settings
    #[serde(flatten)]
    pub health: HealthConfig,

    /// Retry behavior for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Directories watched for new PDFs to auto-submit
    #[serde(default)]
    pub watch_folders: Vec<WatchFolderConfig>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_health_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
