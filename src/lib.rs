//! # pdfjob-sync
//!
//! Client library for submitting PDF files to a remote processing backend,
//! tracking each job to completion, and retrieving the resulting output
//! exactly once per job.
//!
//! ## Design Philosophy
//!
//! pdfjob-sync is designed to be:
//! - **Correct under re-delivery** - duplicate, stale, and out-of-order
//!   status snapshots never cause a second download of the same job
//! - **Sensible defaults** - works out of the box against a local backend
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - consumers subscribe to lifecycle events and read an
//!   observable job table; no polling of the library itself required
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdfjob_sync::{Config, JobSyncClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let client = JobSyncClient::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Submit a batch; completed jobs download automatically.
//!     let results = client.submit_files(&["trades.pdf".into()]).await?;
//!     println!("Submitted: {:?}", results);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Typed HTTP client for the backend endpoints
pub mod backend;
/// Client facade
pub mod client;
/// Configuration types
pub mod config;
/// Job lifecycle coordination (the download-exactly-once core)
pub mod coordinator;
/// Output artifact retrieval and persistence
pub mod download;
/// The lifecycle engine task and status feed types
pub mod engine;
/// Error types
pub mod error;
/// Folder watching for automatic PDF submission
pub mod folder_watcher;
/// Backend health monitoring
pub mod health;
/// Periodic status polling (single-flight)
pub mod poll;
/// Push-based status source with reconnection
pub mod push;
/// Job id to filename registry
pub mod registry;
/// Retry logic with exponential backoff
pub mod retry;
/// Batch PDF submission
pub mod submit;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use backend::BackendClient;
pub use client::JobSyncClient;
pub use config::{Config, SourceKind};
pub use coordinator::{DownloadRequest, JobLifecycleCoordinator};
pub use download::{DownloadExecutor, HttpDownloadExecutor};
pub use error::{Error, Result};
pub use registry::FilenameRegistry;
pub use types::{
    DownloadFailure, DownloadOutcome, Event, HealthReport, JobId, JobStatus, JobTable, Phase,
    UploadResult, UploadStatus,
};

/// Helper function to run the client with graceful signal handling.
///
/// Waits for a termination signal and then calls the client's `shutdown()`
/// method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use pdfjob_sync::{Config, JobSyncClient, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = JobSyncClient::new(Config::default())?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(client).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(client: JobSyncClient) {
    wait_for_signal().await;
    client.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
