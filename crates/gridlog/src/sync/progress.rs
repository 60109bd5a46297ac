//! Progress reporting for sync jobs.
//!
//! The orchestrator invokes one observer callback synchronously at batch
//! boundaries and per-record milestones; consumers (CLI output, tests)
//! decide what to do with the events.

use super::job::JobSnapshot;

/// Progress events emitted while a sync job runs.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// The job claimed the slot and is about to process its first batch.
    Started {
        job_id: uuid::Uuid,
        total_targets: usize,
        batch_size: usize,
    },

    /// One record's history was fetched and persisted.
    RecordSynced {
        record_id: String,
        events: usize,
        /// Whether a collection for this record already existed (an
        /// "updated" rather than "new" outcome). Reporting only; every
        /// sync re-fetches the full target set.
        previously_synced: bool,
    },

    /// One record turned out to have no history (the 404 outcome).
    RecordWithoutHistory { record_id: String },

    /// One record failed; tallied, not fatal (unless the job aborts right
    /// after with [`SyncProgress::Finished`] in a failed state).
    RecordFailed { record_id: String, error: String },

    /// A throttled request is backing off before its next attempt.
    RateLimitBackoff {
        record_id: String,
        attempt: u32,
        retry_after_ms: u64,
    },

    /// A batch finished: counters updated and events persisted.
    BatchComplete {
        batch_index: usize,
        batch_count: usize,
        snapshot: JobSnapshot,
    },

    /// The job reached a terminal state.
    Finished { snapshot: JobSnapshot },
}

/// Observer invoked synchronously by the orchestrator.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Invoke the callback if one is registered.
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(callback) = on_progress {
        callback(event);
    }
}
