//! The single-slot job registry.
//!
//! Exactly one sync job may be `Running` system-wide. Rather than an
//! implicit shared map, the registry is a single-slot arena guarded by a
//! check-and-set: starting a job atomically inspects the slot and either
//! claims it or reports the conflict. Stalled jobs (no progress for
//! [`STALL_TIMEOUT_SECS`]) are reclaimed lazily, on the next start attempt.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// A job with no progress for this long is considered stalled and may be
/// discarded by the next start attempt (30 minutes).
pub const STALL_TIMEOUT_SECS: i64 = 30 * 60;

/// How long a terminal job stays pollable before `snapshot` stops
/// returning it (15 minutes). The slot itself is reclaimed by the next
/// start.
pub const TERMINAL_RETENTION_SECS: i64 = 15 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Completed,
    Failed,
}

/// Point-in-time view of a sync job.
///
/// `processed` counts records whose outcome was fully handled (with
/// history, without history, or a tolerated per-record error); the record
/// whose fatal failure aborts a job is tallied in `errors` only.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_targets: usize,
    pub processed: usize,
    pub with_history: usize,
    pub without_history: usize,
    pub errors: usize,
    pub last_activity_at: DateTime<Utc>,
}

impl JobSnapshot {
    fn new(total_targets: usize, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: JobState::Running,
            started_at: now,
            ended_at: None,
            total_targets,
            processed: 0,
            with_history: 0,
            without_history: 0,
            errors: 0,
            last_activity_at: now,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Failed)
    }

    fn is_stalled(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Running
            && now - self.last_activity_at > Duration::seconds(STALL_TIMEOUT_SECS)
    }
}

/// A start attempt was rejected because a live job occupies the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartConflict {
    /// The job currently holding the slot.
    pub job_id: Uuid,
}

/// Single-slot arena holding at most one job record.
#[derive(Default)]
pub struct JobRegistry {
    slot: Mutex<Option<JobSnapshot>>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-set start: claims the slot with a fresh `Running` job, or
    /// reports the conflict if a live job holds it.
    ///
    /// Terminal and stalled occupants are discarded and replaced;
    /// `force_restart` additionally evicts a live job.
    pub fn try_start(
        &self,
        total_targets: usize,
        force_restart: bool,
    ) -> Result<Uuid, StartConflict> {
        let now = Utc::now();
        let mut slot = self
            .slot
            .lock()
            .expect("job registry lock should not be poisoned");

        if let Some(job) = slot.as_ref() {
            if job.state == JobState::Running && !job.is_stalled(now) && !force_restart {
                return Err(StartConflict { job_id: job.id });
            }
            if job.is_stalled(now) {
                tracing::warn!(job_id = %job.id, "discarding stalled sync job");
            }
        }

        let job = JobSnapshot::new(total_targets, now);
        let id = job.id;
        *slot = Some(job);
        Ok(id)
    }

    /// Snapshot a job by id. Terminal jobs stop being visible after the
    /// retention window.
    #[must_use]
    pub fn snapshot(&self, id: Uuid) -> Option<JobSnapshot> {
        let slot = self
            .slot
            .lock()
            .expect("job registry lock should not be poisoned");
        let job = slot.as_ref().filter(|job| job.id == id)?;

        if job.is_terminal() {
            let expired = job
                .ended_at
                .is_some_and(|t| Utc::now() - t > Duration::seconds(TERMINAL_RETENTION_SECS));
            if expired {
                return None;
            }
        }
        Some(job.clone())
    }

    /// Snapshot whatever occupies the slot, if anything.
    #[must_use]
    pub fn current(&self) -> Option<JobSnapshot> {
        self.slot
            .lock()
            .expect("job registry lock should not be poisoned")
            .clone()
    }

    /// Apply counter updates to a running job, refreshing its activity
    /// timestamp. Returns the updated snapshot (or `None` if the job no
    /// longer holds the slot).
    pub(crate) fn update(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut JobSnapshot),
    ) -> Option<JobSnapshot> {
        let mut slot = self
            .slot
            .lock()
            .expect("job registry lock should not be poisoned");
        let job = slot.as_mut().filter(|job| job.id == id)?;
        apply(job);
        job.last_activity_at = Utc::now();
        Some(job.clone())
    }

    /// Move a job into a terminal state.
    pub(crate) fn finish(&self, id: Uuid, state: JobState) -> Option<JobSnapshot> {
        self.update(id, |job| {
            job.state = state;
            job.ended_at = Some(Utc::now());
        })
    }
}
