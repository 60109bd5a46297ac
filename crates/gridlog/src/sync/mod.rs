//! The sync orchestrator: the batch-job state machine.
//!
//! A sync job enumerates every stored target record, fans fetches out in
//! bounded batches through the dispatcher, persists the resulting events per
//! batch, and reports progress until the target set is exhausted or a fatal
//! credential failure aborts it. At most one job runs at a time; the
//! single-flight invariant lives in [`JobRegistry`].

mod engine;
mod job;
mod progress;
mod types;

pub use engine::{SyncEngine, SyncEngineBuilder, SyncError};
pub use job::{
    JobRegistry, JobSnapshot, JobState, StartConflict, STALL_TIMEOUT_SECS,
    TERMINAL_RETENTION_SECS,
};
pub use progress::{emit, ProgressCallback, SyncProgress};
pub use types::{DEFAULT_BATCH_SIZE, MAX_BATCH_PAUSE_MS, MIN_BATCH_PAUSE_MS};
