//! The batch-job orchestrator.
//!
//! [`SyncEngine`] wires the session store, the dispatcher-backed fetcher,
//! and the history store together and drives the full-refresh batch loop:
//! enumerate targets, fetch each batch concurrently, persist per batch,
//! pause, repeat. A fatal credential failure aborts the job; every other
//! per-record failure is tallied and the job keeps going.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use sea_orm::DatabaseConnection;
use thiserror::Error;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::job::{JobRegistry, JobSnapshot, JobState};
use super::progress::{emit, ProgressCallback, SyncProgress};
use super::types::{MAX_BATCH_PAUSE_MS, MIN_BATCH_PAUSE_MS};
use crate::dispatch::{Dispatcher, DispatcherConfig};
use crate::history::{self, HistoryStoreError};
use crate::revision::{ChangeEvent, DiffParser, PlatformError, PolarityRule, RecordRef, RevisionFetcher};
use crate::session::{CredentialBlob, SessionError, SessionStore, SessionValidator};
use crate::targets;
use crate::HttpTransport;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no valid session: {0}")]
    Session(#[from] SessionError),

    /// Another live job holds the single slot. Poll `job_id` or retry
    /// with `force_restart`.
    #[error("a sync job is already running ({job_id})")]
    Conflict { job_id: Uuid },

    /// The job lost its registry slot mid-run (a forced restart evicted
    /// it). Its partial progress is no longer observable.
    #[error("sync job {job_id} was evicted from the registry")]
    Evicted { job_id: Uuid },

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    History(#[from] HistoryStoreError),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("engine builder is missing its {0}")]
    Configuration(&'static str),
}

/// Builder for [`SyncEngine`]. `db`, `transport`, and `base_url` are
/// required; everything else has production defaults.
#[derive(Default)]
pub struct SyncEngineBuilder {
    db: Option<Arc<DatabaseConnection>>,
    transport: Option<Arc<dyn HttpTransport>>,
    base_url: Option<String>,
    probe_url: Option<String>,
    dispatcher: DispatcherConfig,
    polarity: PolarityRule,
    skip_batch_pauses: bool,
    on_progress: Option<ProgressCallback>,
}

impl SyncEngineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn db(mut self, db: Arc<DatabaseConnection>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Root URL of the platform, e.g. `https://grid.example.com`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Endpoint the session probe hits. Defaults to
    /// `{base_url}/internal/whoami`.
    pub fn probe_url(mut self, probe_url: impl Into<String>) -> Self {
        self.probe_url = Some(probe_url.into());
        self
    }

    pub fn dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.dispatcher = config;
        self
    }

    pub fn polarity_rule(mut self, rule: PolarityRule) -> Self {
        self.polarity = rule;
        self
    }

    /// Disable the jittered inter-batch pause. Test hook; production
    /// syncs keep the pause.
    pub fn skip_batch_pauses(mut self) -> Self {
        self.skip_batch_pauses = true;
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub async fn build(self) -> Result<SyncEngine, SyncError> {
        let db = self.db.ok_or(SyncError::Configuration("database connection"))?;
        let transport = self.transport.ok_or(SyncError::Configuration("http transport"))?;
        let base_url = self.base_url.ok_or(SyncError::Configuration("base url"))?;
        let probe_url = self.probe_url.unwrap_or_else(|| {
            format!("{}/internal/whoami", base_url.trim_end_matches('/'))
        });

        let session = Arc::new(SessionStore::open(Arc::clone(&db)).await?);
        let validator = Arc::new(SessionValidator::new(Arc::clone(&transport), probe_url));
        let dispatcher = Dispatcher::new(transport, self.dispatcher);
        let fetcher = Arc::new(RevisionFetcher::new(
            dispatcher,
            Arc::clone(&session),
            DiffParser::new(self.polarity),
            &base_url,
        ));

        Ok(SyncEngine {
            db,
            session,
            validator,
            fetcher,
            registry: Arc::new(JobRegistry::new()),
            on_progress: self.on_progress.map(Arc::new),
            skip_batch_pauses: self.skip_batch_pauses,
        })
    }
}

/// The revision-history sync engine.
///
/// Cloning is cheap and shares all state (session cache, dispatcher
/// pacing, job registry), which is how the spawned batch loop keeps
/// operating on the same engine the caller polls.
#[derive(Clone)]
pub struct SyncEngine {
    db: Arc<DatabaseConnection>,
    session: Arc<SessionStore>,
    validator: Arc<SessionValidator>,
    fetcher: Arc<RevisionFetcher>,
    registry: Arc<JobRegistry>,
    on_progress: Option<Arc<ProgressCallback>>,
    skip_batch_pauses: bool,
}

impl SyncEngine {
    #[must_use]
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::new()
    }

    /// Start a sync job in the background and return its id immediately.
    ///
    /// Fails fast, before claiming the job slot, when no valid session is
    /// available. A live job in the slot is a [`SyncError::Conflict`]
    /// unless `force_restart` evicts it.
    pub async fn start_sync(
        &self,
        batch_size: usize,
        force_restart: bool,
    ) -> Result<Uuid, SyncError> {
        let (job_id, credential, targets) = self.prepare(batch_size, force_restart).await?;

        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(error) = engine
                .run_batches(job_id, credential, targets, batch_size)
                .await
            {
                tracing::error!(job_id = %job_id, %error, "sync job aborted");
            }
        });

        Ok(job_id)
    }

    /// Like [`SyncEngine::start_sync`] but drives the batch loop inline
    /// and returns the terminal snapshot. A job that aborted on expired
    /// credentials still comes back `Ok` with `state == Failed`; `Err` is
    /// reserved for infrastructure failures (session, conflict, storage).
    pub async fn run_to_completion(
        &self,
        batch_size: usize,
        force_restart: bool,
    ) -> Result<JobSnapshot, SyncError> {
        let (job_id, credential, targets) = self.prepare(batch_size, force_restart).await?;
        self.run_batches(job_id, credential, targets, batch_size)
            .await
    }

    /// Snapshot a job by id. `None` once the job has been replaced or its
    /// terminal snapshot has aged out.
    #[must_use]
    pub fn job_status(&self, job_id: Uuid) -> Option<JobSnapshot> {
        self.registry.snapshot(job_id)
    }

    /// Snapshot whatever job currently occupies the slot.
    #[must_use]
    pub fn current_job(&self) -> Option<JobSnapshot> {
        self.registry.current()
    }

    /// Ad-hoc single-record fetch, outside any job.
    ///
    /// Uses the same session accessor and dispatcher as the batch loop
    /// (so a 401 here still invalidates the session store) but never
    /// touches the job registry. Non-empty results are persisted.
    pub async fn fetch_one_record_history(
        &self,
        record: &RecordRef,
    ) -> Result<Vec<ChangeEvent>, SyncError> {
        let credential = self.session.current(&self.validator).await?;
        let events = self.fetcher.fetch(record, &credential, None).await?;
        if !events.is_empty() {
            history::upsert(self.db.as_ref(), record, &events).await?;
        }
        Ok(events)
    }

    /// Session fail-fast, target load, and the job-slot CAS, in that
    /// order: a start attempt with a dead session must not claim the slot.
    async fn prepare(
        &self,
        batch_size: usize,
        force_restart: bool,
    ) -> Result<(Uuid, CredentialBlob, Vec<RecordRef>), SyncError> {
        let credential = self.session.current(&self.validator).await?;
        let targets = targets::list_all(self.db.as_ref()).await?;

        let job_id = self
            .registry
            .try_start(targets.len(), force_restart)
            .map_err(|conflict| SyncError::Conflict {
                job_id: conflict.job_id,
            })?;

        tracing::info!(
            job_id = %job_id,
            total_targets = targets.len(),
            batch_size,
            "sync job started"
        );
        emit(
            self.on_progress.as_deref(),
            SyncProgress::Started {
                job_id,
                total_targets: targets.len(),
                batch_size,
            },
        );

        Ok((job_id, credential, targets))
    }

    async fn run_batches(
        &self,
        job_id: Uuid,
        credential: CredentialBlob,
        targets: Vec<RecordRef>,
        batch_size: usize,
    ) -> Result<JobSnapshot, SyncError> {
        let batch_size = batch_size.max(1);
        let batch_count = targets.len().div_ceil(batch_size);
        let credential = Arc::new(credential);

        // Previously synced ids feed the new-vs-updated distinction in
        // progress events only; every target is re-fetched regardless.
        let previously = match history::list_synced_record_ids(self.db.as_ref()).await {
            Ok(ids) => ids,
            Err(error) => {
                tracing::warn!(%error, "could not load synced record ids, reporting all as new");
                HashSet::new()
            }
        };

        for (batch_index, chunk) in targets.chunks(batch_size).enumerate() {
            let outcomes = self.fetch_batch(chunk, &credential).await;

            // Persist before tallying so batch-mates of a fatal record
            // still land on disk.
            let persistable: Vec<(RecordRef, Vec<ChangeEvent>)> = chunk
                .iter()
                .zip(&outcomes)
                .filter_map(|(record, outcome)| match outcome {
                    Some(Ok(events)) if !events.is_empty() => {
                        Some((record.clone(), events.clone()))
                    }
                    _ => None,
                })
                .collect();

            if !persistable.is_empty() {
                if let Err(error) = history::bulk_upsert(self.db.as_ref(), &persistable).await {
                    tracing::error!(job_id = %job_id, %error, "batch persistence failed");
                    self.finish(job_id, JobState::Failed)?;
                    return Err(error.into());
                }
            }

            let mut tally = BatchTally::default();
            // Set by the first fatal outcome; the abort is honored only
            // after the rest of the batch is tallied, since the whole
            // batch was already fetched and persisted.
            let mut fatal = None;

            for (record, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Some(Ok(events)) if !events.is_empty() => {
                        tally.processed += 1;
                        tally.with_history += 1;
                        emit(
                            self.on_progress.as_deref(),
                            SyncProgress::RecordSynced {
                                record_id: record.record_id.clone(),
                                events: events.len(),
                                previously_synced: previously.contains(&record.record_id),
                            },
                        );
                    }
                    Some(Ok(_)) => {
                        tally.processed += 1;
                        tally.without_history += 1;
                        emit(
                            self.on_progress.as_deref(),
                            SyncProgress::RecordWithoutHistory {
                                record_id: record.record_id.clone(),
                            },
                        );
                    }
                    Some(Err(error)) => {
                        tally.errors += 1;
                        let is_fatal = error.is_fatal();
                        if !is_fatal {
                            tally.processed += 1;
                        }
                        tracing::warn!(record = %record, %error, "record sync failed");
                        emit(
                            self.on_progress.as_deref(),
                            SyncProgress::RecordFailed {
                                record_id: record.record_id.clone(),
                                error: error.to_string(),
                            },
                        );
                        if is_fatal && fatal.is_none() {
                            fatal = Some(error);
                        }
                    }
                    None => {
                        tally.processed += 1;
                        tally.errors += 1;
                        emit(
                            self.on_progress.as_deref(),
                            SyncProgress::RecordFailed {
                                record_id: record.record_id.clone(),
                                error: "fetch task panicked".to_string(),
                            },
                        );
                    }
                }
            }

            let snapshot = self
                .registry
                .update(job_id, |job| {
                    job.processed += tally.processed;
                    job.with_history += tally.with_history;
                    job.without_history += tally.without_history;
                    job.errors += tally.errors;
                })
                .ok_or(SyncError::Evicted { job_id })?;

            if let Some(error) = fatal {
                tracing::error!(job_id = %job_id, %error, "fatal record error, aborting job");
                return self.finish(job_id, JobState::Failed);
            }

            emit(
                self.on_progress.as_deref(),
                SyncProgress::BatchComplete {
                    batch_index,
                    batch_count,
                    snapshot,
                },
            );

            if !self.skip_batch_pauses && batch_index + 1 < batch_count {
                let pause_ms =
                    rand::thread_rng().gen_range(MIN_BATCH_PAUSE_MS..=MAX_BATCH_PAUSE_MS);
                tokio::time::sleep(Duration::from_millis(pause_ms)).await;
            }
        }

        self.finish(job_id, JobState::Completed)
    }

    /// Fan one batch out through the dispatcher. Results come back in
    /// submission order; a slot is `None` only if its task panicked.
    async fn fetch_batch(
        &self,
        chunk: &[RecordRef],
        credential: &Arc<CredentialBlob>,
    ) -> Vec<Option<Result<Vec<ChangeEvent>, PlatformError>>> {
        let mut tasks = JoinSet::new();

        for (position, record) in chunk.iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let credential = Arc::clone(credential);
            let record = record.clone();
            let on_progress = self.on_progress.clone();

            tasks.spawn(async move {
                let record_id = record.record_id.clone();
                let notify = move |attempt: u32, delay: Duration| {
                    if let Some(callback) = &on_progress {
                        callback(SyncProgress::RateLimitBackoff {
                            record_id: record_id.clone(),
                            attempt,
                            retry_after_ms: delay.as_millis() as u64,
                        });
                    }
                };
                let outcome = fetcher.fetch(&record, &credential, Some(&notify)).await;
                (position, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<Vec<ChangeEvent>, PlatformError>>> =
            chunk.iter().map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, outcome)) => outcomes[position] = Some(outcome),
                Err(error) => tracing::error!(%error, "record fetch task panicked"),
            }
        }

        outcomes
    }

    fn finish(&self, job_id: Uuid, state: JobState) -> Result<JobSnapshot, SyncError> {
        let snapshot = self
            .registry
            .finish(job_id, state)
            .ok_or(SyncError::Evicted { job_id })?;
        tracing::info!(
            job_id = %job_id,
            state = ?snapshot.state,
            processed = snapshot.processed,
            with_history = snapshot.with_history,
            without_history = snapshot.without_history,
            errors = snapshot.errors,
            "sync job finished"
        );
        emit(
            self.on_progress.as_deref(),
            SyncProgress::Finished {
                snapshot: snapshot.clone(),
            },
        );
        Ok(snapshot)
    }
}

#[derive(Default)]
struct BatchTally {
    processed: usize,
    with_history: usize,
    without_history: usize,
    errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockTransport;

    #[tokio::test]
    async fn build_requires_a_database() {
        let result = SyncEngine::builder()
            .transport(Arc::new(MockTransport::new()))
            .base_url("https://grid.example.com")
            .build()
            .await;

        assert!(matches!(
            result,
            Err(SyncError::Configuration("database connection"))
        ));
    }

    #[tokio::test]
    async fn build_requires_a_base_url() {
        let db = sea_orm::MockDatabase::new(sea_orm::DatabaseBackend::Sqlite).into_connection();
        let result = SyncEngine::builder()
            .db(Arc::new(db))
            .transport(Arc::new(MockTransport::new()))
            .build()
            .await;

        assert!(matches!(
            result,
            Err(SyncError::Configuration("base url"))
        ));
    }
}
