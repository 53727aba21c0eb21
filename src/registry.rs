//! In-memory mapping from job ids to originally submitted filenames.

use crate::types::JobId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registry of originally submitted filenames, keyed by job id.
///
/// Populated by the submitter when the backend accepts a file and pruned
/// lazily on each full snapshot merge via [`reconcile`](Self::reconcile),
/// which bounds memory growth to the server's known job set.
#[derive(Debug, Default)]
pub struct FilenameRegistry {
    entries: HashMap<JobId, String>,
}

/// Shared registry handle: written by the submitter on acceptance, read and
/// reconciled by the coordinator. Both run on the same logical thread, so a
/// plain mutex with short critical sections is all the discipline needed.
pub type SharedRegistry = Arc<Mutex<FilenameRegistry>>;

/// Lock the shared registry. A poisoned lock only means some other task
/// panicked mid-access; the map itself stays usable, so recover the guard.
pub(crate) fn lock(registry: &SharedRegistry) -> MutexGuard<'_, FilenameRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FilenameRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty shared registry handle
    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Insert a mapping. First writer wins: a job id is never rebound to a
    /// different filename, so re-recording is a no-op.
    pub fn record(&mut self, job_id: JobId, filename: impl Into<String>) {
        self.entries.entry(job_id).or_insert_with(|| filename.into());
    }

    /// Look up the originally submitted filename for a job
    pub fn resolve(&self, job_id: &JobId) -> Option<&str> {
        self.entries.get(job_id).map(String::as_str)
    }

    /// Drop every entry whose job id is not in `known` and return the evicted
    /// ids. Called once per snapshot merge; the server forgetting a job is
    /// the only eviction trigger.
    pub fn reconcile(&mut self, known: &HashSet<JobId>) -> Vec<JobId> {
        let stale: Vec<JobId> = self
            .entries
            .keys()
            .filter(|id| !known.contains(*id))
            .cloned()
            .collect();
        for id in &stale {
            self.entries.remove(id);
        }
        stale
    }

    /// Number of registered jobs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
