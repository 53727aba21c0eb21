//! Folder watching for automatic PDF submission
//!
//! This module watches configured directories for new `.pdf` files and
//! submits them through the client automatically. It supports:
//! - Automatic detection of new `.pdf` files
//! - Configurable post-submit actions (delete, move to a `submitted` folder, or keep)
//! - Non-recursive watching (only the specified directory, not subdirectories)

use crate::client::JobSyncClient;
use crate::config::{WatchFolderAction, WatchFolderConfig};
use crate::error::{Error, Result};
use crate::submit::is_pdf;
use crate::types::UploadStatus;
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Watches folders for new PDF files and submits them automatically
pub struct FolderWatcher {
    /// Filesystem watcher instance
    watcher: RecommendedWatcher,

    /// Channel for receiving filesystem events
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,

    /// Client used for submission
    client: JobSyncClient,

    /// Watched folder configurations
    configs: Vec<WatchFolderConfig>,

    /// Paths already handled this session, so Create/Modify event bursts and
    /// the Keep action do not resubmit the same file
    handled: HashSet<PathBuf>,

    /// Teardown signal
    cancel: CancellationToken,
}

impl FolderWatcher {
    /// Create a new folder watcher
    ///
    /// # Errors
    /// Returns an error if the filesystem watcher cannot be initialized
    pub fn new(
        client: JobSyncClient,
        configs: Vec<WatchFolderConfig>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.send(res) {
                    error!("Failed to send filesystem event: {}", e);
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::WatchFolder(e.to_string()))?;

        Ok(Self {
            watcher,
            rx,
            client,
            configs,
            handled: HashSet::new(),
            cancel,
        })
    }

    /// Start watching all configured folders
    ///
    /// # Errors
    /// Returns an error if any folder cannot be watched (e.g., permission denied)
    pub fn start(&mut self) -> Result<()> {
        for config in &self.configs {
            if !config.path.exists() {
                std::fs::create_dir_all(&config.path).map_err(|e| {
                    Error::WatchFolder(format!("Failed to create watch folder: {}", e))
                })?;
                info!("Created watch folder: {}", config.path.display());
            }

            self.watcher
                .watch(&config.path, RecursiveMode::NonRecursive)
                .map_err(|e| Error::WatchFolder(format!("Failed to watch folder: {}", e)))?;

            info!(
                "Watching folder: {} (after_submit: {:?})",
                config.path.display(),
                config.after_submit
            );
        }

        Ok(())
    }

    /// Run the folder watcher event loop until teardown
    pub async fn run(mut self) {
        info!("Folder watcher started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.rx.recv() => {
                    let Some(result) = result else { break };
                    match result {
                        Ok(event) => {
                            if let Err(e) = self.handle_event(event).await {
                                error!("Error handling folder event: {}", e);
                            }
                        }
                        Err(e) => {
                            error!("Filesystem watcher error: {}", e);
                        }
                    }
                }
            }
        }

        info!("Folder watcher stopped");
    }

    /// Handle a filesystem event
    ///
    /// Only creation and modification events for `.pdf` files trigger
    /// submission; everything else is ignored.
    async fn handle_event(&mut self, event: Event) -> Result<()> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in event.paths {
                    if is_pdf(&path) && !self.handled.contains(&path) {
                        self.process_pdf_file(&path).await?;
                    }
                }
            }
            _ => {
                // Ignore other event types (delete, access, etc.)
            }
        }

        Ok(())
    }

    /// Submit a newly detected PDF and apply the after-submit action
    async fn process_pdf_file(&mut self, path: &Path) -> Result<()> {
        debug!("Processing PDF file: {}", path.display());

        let config = self.find_config_for_path(path)?.clone();

        // Small delay so applications writing in chunks can finish.
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let results = match self.client.submit_files(&[path.to_path_buf()]).await {
            Ok(results) => results,
            Err(e) => {
                // Backend down or unhealthy: leave the file in place so a
                // later modification event can retry it.
                warn!("Failed to submit {} from watch folder: {}", path.display(), e);
                return Ok(());
            }
        };

        let accepted = results
            .first()
            .is_some_and(|r| r.status == UploadStatus::Processing);
        self.handled.insert(path.to_path_buf());

        if !accepted {
            warn!(
                "Watch folder file {} was rejected: {}",
                path.display(),
                results
                    .first()
                    .and_then(|r| r.reason.as_deref())
                    .unwrap_or("no reason given")
            );
            return Ok(());
        }

        info!("Submitted PDF from watch folder: {}", path.display());

        if let Err(e) = self.handle_after_submit(path, &config).await {
            error!(
                "Failed to handle after_submit action for {}: {}",
                path.display(),
                e
            );
        }

        Ok(())
    }

    /// Find the watch folder config that matches this path
    fn find_config_for_path(&self, path: &Path) -> Result<&WatchFolderConfig> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::WatchFolder("File has no parent directory".to_string()))?;

        self.configs
            .iter()
            .find(|c| c.path == parent)
            .ok_or_else(|| {
                Error::WatchFolder(format!(
                    "No watch folder config found for: {}",
                    parent.display()
                ))
            })
    }

    /// Execute the configured action after a successful submission
    async fn handle_after_submit(&self, path: &Path, config: &WatchFolderConfig) -> Result<()> {
        match config.after_submit {
            WatchFolderAction::Delete => {
                debug!("Deleting submitted PDF: {}", path.display());
                tokio::fs::remove_file(path)
                    .await
                    .map_err(|e| Error::WatchFolder(format!("Failed to delete file: {}", e)))?;
            }
            WatchFolderAction::MoveToSubmitted => {
                let parent = path.parent().ok_or_else(|| {
                    Error::WatchFolder("File has no parent directory".to_string())
                })?;
                let submitted_dir = parent.join("submitted");

                if !submitted_dir.exists() {
                    tokio::fs::create_dir(&submitted_dir).await.map_err(|e| {
                        Error::WatchFolder(format!("Failed to create submitted directory: {}", e))
                    })?;
                }

                let dest = submitted_dir.join(
                    path.file_name()
                        .ok_or_else(|| Error::WatchFolder("File has no filename".to_string()))?,
                );

                debug!("Moving PDF: {} -> {}", path.display(), dest.display());
                tokio::fs::rename(path, &dest)
                    .await
                    .map_err(|e| Error::WatchFolder(format!("Failed to move file: {}", e)))?;
            }
            WatchFolderAction::Keep => {
                // The handled set already prevents resubmission this session.
                debug!("Keeping submitted PDF in place: {}", path.display());
            }
        }

        Ok(())
    }
}
