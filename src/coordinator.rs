//! Job lifecycle coordination: snapshot merging, completion detection, and
//! the download-exactly-once guarantee.
//!
//! The coordinator is a plain single-threaded state machine. It never
//! performs I/O itself: completion detection yields [`DownloadRequest`]
//! values and observability yields [`Event`] values, both returned to the
//! caller (the lifecycle engine), which keeps every merge running to
//! completion before the next one starts.

use crate::registry::{self, SharedRegistry};
use crate::types::{DownloadOutcome, Event, JobId, JobStatus, JobTable, Phase};
use std::collections::HashSet;

/// A download the engine should execute for a job whose output is ready
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Job whose output artifact should be retrieved
    pub job_id: JobId,
    /// Resolved target filename on the backend
    pub filename: String,
}

/// Result of folding a snapshot or delta into local state
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Downloads to execute, at most one per newly-eligible job
    pub requests: Vec<DownloadRequest>,
    /// Observable happenings for the presentation layer
    pub events: Vec<Event>,
}

/// Maintains a monotone, idempotent view of job state and decides when the
/// single download per job happens.
pub struct JobLifecycleCoordinator {
    /// Merged server-authoritative view; retains last-known status for jobs
    /// the server no longer reports
    statuses: JobTable,

    /// Jobs with a download attempt currently outstanding
    in_flight: HashSet<JobId>,

    /// Jobs whose download this client has confirmed locally. Consulted in
    /// addition to `phase`, so a stale authoritative `completed` cannot
    /// re-trigger a download before the server observes the mark-consumed
    /// call. Pruned when the server itself reports `downloaded` or forgets
    /// the job entirely; never by wall clock.
    downloaded: HashSet<JobId>,

    /// Shared filename registry (written by the submitter, reconciled here)
    registry: SharedRegistry,
}

impl JobLifecycleCoordinator {
    /// Create a coordinator over a shared filename registry
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            statuses: JobTable::new(),
            in_flight: HashSet::new(),
            downloaded: HashSet::new(),
            registry,
        }
    }

    /// Merge a full server snapshot into local state.
    ///
    /// Snapshot semantics: every reported job overwrites local knowledge
    /// unconditionally (the server is authoritative and trusted to be
    /// monotone); jobs absent from the snapshot keep their last-known local
    /// status, but the registry and downloaded set are pruned to the
    /// reported id set. Safe to call repeatedly with identical data: the
    /// second call changes nothing observable and triggers no side effects.
    pub fn merge_snapshot(&mut self, snapshot: JobTable) -> MergeOutcome {
        let known: HashSet<JobId> = snapshot.keys().cloned().collect();
        let mut outcome = MergeOutcome::default();

        for (job_id, status) in snapshot {
            self.apply_status(job_id, status, &mut outcome);
        }

        // Lazy GC, full snapshots only: ids the server has forgotten.
        let forgotten = registry::lock(&self.registry).reconcile(&known);
        for job_id in forgotten {
            outcome.events.push(Event::JobForgotten { job_id });
        }
        self.downloaded.retain(|id| known.contains(id));

        outcome
    }

    /// Fold one pushed per-job update into local state.
    ///
    /// Single-entry merge with the same trigger guards as
    /// [`merge_snapshot`](Self::merge_snapshot), but no garbage collection:
    /// absence from a delta means nothing.
    pub fn apply_update(&mut self, job_id: JobId, status: JobStatus) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        self.apply_status(job_id, status, &mut outcome);
        outcome
    }

    /// Act on a push-side hint that an output artifact exists.
    ///
    /// The hint may short-circuit completed-phase detection for a job whose
    /// resolved target matches, but it routes through the same
    /// exactly-once guards as snapshot-driven triggers.
    pub fn on_file_ready(&mut self, filename: &str) -> Option<DownloadRequest> {
        let job_id = self.statuses.iter().find_map(|(id, status)| {
            (self.resolve_target(id, status).as_deref() == Some(filename)).then(|| id.clone())
        });

        let Some(job_id) = job_id else {
            tracing::debug!(filename, "file-ready hint matched no known job");
            return None;
        };

        if self.in_flight.contains(&job_id) || self.downloaded.contains(&job_id) {
            return None;
        }
        // A failed or already-downloaded job is not resurrected by a hint.
        if self
            .statuses
            .get(&job_id)
            .is_none_or(|status| status.phase.is_terminal())
        {
            return None;
        }

        self.in_flight.insert(job_id.clone());
        Some(DownloadRequest {
            job_id,
            filename: filename.to_string(),
        })
    }

    /// Record the outcome of a settled download attempt.
    ///
    /// On success the local phase moves to `downloaded` optimistically,
    /// ahead of the mark-consumed round trip; the downloaded set remembers
    /// the confirmation so stale snapshots cannot re-trigger. On failure the
    /// job keeps its `completed` phase and becomes eligible again on the
    /// next snapshot; retry pacing is the status cadence, not ours.
    pub fn on_download_settled(&mut self, job_id: &JobId, outcome: &DownloadOutcome) {
        self.in_flight.remove(job_id);
        match outcome {
            DownloadOutcome::Success => {
                self.downloaded.insert(job_id.clone());
                if let Some(status) = self.statuses.get_mut(job_id) {
                    status.phase = Phase::Downloaded;
                }
            }
            DownloadOutcome::Failure(failure) => {
                tracing::warn!(
                    job_id = %job_id,
                    error = %failure,
                    "download attempt failed; job stays eligible for retry"
                );
            }
        }
    }

    /// Point-in-time copy of the merged job table
    pub fn job_table(&self) -> JobTable {
        self.statuses.clone()
    }

    /// Whether a download attempt is currently outstanding for this job
    pub fn is_in_flight(&self, job_id: &JobId) -> bool {
        self.in_flight.contains(job_id)
    }

    /// Overwrite one job's status and detect a newly-eligible download
    fn apply_status(&mut self, job_id: JobId, mut status: JobStatus, outcome: &mut MergeOutcome) {
        let prev = self.statuses.get(&job_id);

        if let Some(prev) = prev
            && status.phase == Phase::Processing
            && prev.phase.rank() > Phase::Processing.rank()
        {
            // The server never moves a job backward, so this id is being
            // reused for a new job. Adopt the new lifecycle from scratch.
            tracing::warn!(
                job_id = %job_id,
                previous_phase = ?prev.phase,
                "job moved backward to processing; treating as a new job reusing the id"
            );
            self.downloaded.remove(&job_id);
        }

        if status.phase == Phase::Completed && self.downloaded.contains(&job_id) {
            // Our local confirmation outranks a stale `completed` until the
            // server observes the mark-consumed call; presenting `downloaded`
            // keeps the caller-visible phase sequence monotone.
            status.phase = Phase::Downloaded;
        } else if status.phase == Phase::Downloaded {
            // The server caught up; the extra bookkeeping can go.
            self.downloaded.remove(&job_id);
        }

        let progressed = prev.is_none_or(|p| {
            p.processed_pages != status.processed_pages || p.total_pages != status.total_pages
        });
        let newly_failed =
            status.phase == Phase::Failed && prev.is_none_or(|p| p.phase != Phase::Failed);

        if progressed && status.phase == Phase::Processing {
            outcome.events.push(Event::JobProgress {
                job_id: job_id.clone(),
                processed_pages: status.processed_pages,
                total_pages: status.total_pages,
            });
        }
        if newly_failed {
            outcome.events.push(Event::JobFailed {
                job_id: job_id.clone(),
                reason: status.reason.clone(),
            });
        }

        let completed = status.phase == Phase::Completed;
        self.statuses.insert(job_id.clone(), status);

        if completed && let Some(request) = self.trigger_if_eligible(&job_id) {
            outcome.requests.push(request);
        }
    }

    /// Apply the exactly-once guards and, if they pass, claim the job as
    /// in-flight and produce its download request.
    fn trigger_if_eligible(&mut self, job_id: &JobId) -> Option<DownloadRequest> {
        if self.in_flight.contains(job_id) || self.downloaded.contains(job_id) {
            return None;
        }
        let status = self.statuses.get(job_id)?;
        let Some(filename) = self.resolve_target(job_id, status) else {
            // Resolution anomaly: completed job with nothing to name the
            // artifact. Left undownloaded; not treated as an error.
            tracing::warn!(
                job_id = %job_id,
                "completed job has no resolvable filename; skipping download"
            );
            return None;
        };

        self.in_flight.insert(job_id.clone());
        Some(DownloadRequest {
            job_id: job_id.clone(),
            filename,
        })
    }

    /// Resolve the download target for a job: the server-reported output
    /// filename wins, else the submitted name with a trailing `.pdf`
    /// (case-insensitive) swapped for `.csv`.
    fn resolve_target(&self, job_id: &JobId, status: &JobStatus) -> Option<String> {
        if let Some(name) = &status.output_filename {
            return Some(name.clone());
        }
        let original = registry::lock(&self.registry)
            .resolve(job_id)
            .map(str::to_string)?;
        Some(derive_csv_name(&original))
    }
}

/// Swap a trailing `.pdf` (any case) for `.csv`; names without the extension
/// get `.csv` appended.
fn derive_csv_name(original: &str) -> String {
    if original.len() >= 4 && original[original.len() - 4..].eq_ignore_ascii_case(".pdf") {
        format!("{}.csv", &original[..original.len() - 4])
    } else {
        format!("{original}.csv")
    }
}
