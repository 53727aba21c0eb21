//! Output artifact retrieval and local persistence.

use crate::backend::BackendClient;
use crate::config::{FileCollisionAction, StorageConfig};
use crate::error::Error;
use crate::types::{DownloadFailure, DownloadOutcome, JobId};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Fallback name for a server-supplied filename that reduces to nothing
const FALLBACK_NAME: &str = "output.csv";

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Executes the retrieval and save step for one completed job.
///
/// Implementations must report every failure mode through the outcome value;
/// a download attempt never takes the coordinating process down.
#[async_trait]
pub trait DownloadExecutor: Send + Sync {
    /// Fetch the named artifact and persist it locally
    async fn fetch_and_save(&self, job_id: &JobId, filename: &str) -> DownloadOutcome;
}

/// Production executor: fetches from the backend and writes into the
/// configured output directory.
pub struct HttpDownloadExecutor {
    backend: BackendClient,
    storage: StorageConfig,
}

impl HttpDownloadExecutor {
    /// Create an executor writing into the configured output directory
    pub fn new(backend: BackendClient, storage: StorageConfig) -> Self {
        Self { backend, storage }
    }

    async fn save(&self, filename: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.storage.output_dir).await?;

        // Server-supplied names are reduced to their final path component
        // before joining, so a hostile name cannot escape the output dir.
        let target = self.storage.output_dir.join(sanitize_filename(filename));
        let target = unique_path(&target, self.storage.file_collision);
        tokio::fs::write(&target, bytes).await?;
        Ok(target)
    }
}

#[async_trait]
impl DownloadExecutor for HttpDownloadExecutor {
    async fn fetch_and_save(&self, job_id: &JobId, filename: &str) -> DownloadOutcome {
        let bytes = match self.backend.download(filename).await {
            Ok(bytes) => bytes,
            Err(Error::FileMissing(_)) => {
                return DownloadOutcome::Failure(DownloadFailure::FileMissing);
            }
            Err(e) => {
                return DownloadOutcome::Failure(DownloadFailure::Network {
                    reason: e.to_string(),
                });
            }
        };

        match self.save(filename, &bytes).await {
            Ok(path) => {
                tracing::info!(
                    job_id = %job_id,
                    path = %path.display(),
                    size_bytes = bytes.len(),
                    "saved output artifact"
                );
                DownloadOutcome::Success
            }
            Err(e) => DownloadOutcome::Failure(DownloadFailure::Save {
                reason: e.to_string(),
            }),
        }
    }
}

/// Reduce a server-supplied filename to a bare file name
fn sanitize_filename(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_NAME)
        .to_string()
}

/// Resolve a target path according to the collision action. For Rename this
/// adds ` (1)`, ` (2)`, ... suffixes until the name is free; earlier
/// artifacts are never silently replaced.
fn unique_path(path: &Path, action: FileCollisionAction) -> PathBuf {
    match action {
        FileCollisionAction::Overwrite => path.to_path_buf(),
        FileCollisionAction::Rename => {
            if !path.exists() {
                return path.to_path_buf();
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output");
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().unwrap_or_else(|| Path::new("."));

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let candidate = match extension {
                    Some(ext) => parent.join(format!("{stem} ({i}).{ext}")),
                    None => parent.join(format!("{stem} ({i})")),
                };
                if !candidate.exists() {
                    return candidate;
                }
            }

            // Thousands of collisions deep; give up on renaming.
            path.to_path_buf()
        }
    }
}
