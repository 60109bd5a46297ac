//! Persistent store for the single credential blob.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, DatabaseConnection, EntityTrait};
use tokio::sync::RwLock;

use crate::entity::prelude::{Session, SessionActiveModel, SessionColumn, SESSION_ROW_ID};

use super::blob::{CredentialBlob, SessionCookie, SessionState};
use super::error::SessionError;
use super::validate::SessionValidator;

/// Owns the credential blob: one database row plus an in-memory copy.
///
/// The store is the only writer of the session row. All consumers that need
/// a usable blob go through [`SessionStore::current`], which validates a
/// stale blob but never acquires a new one.
pub struct SessionStore {
    db: Arc<DatabaseConnection>,
    cached: RwLock<Option<CredentialBlob>>,
}

impl SessionStore {
    /// Open the store, loading any previously persisted blob.
    pub async fn open(db: Arc<DatabaseConnection>) -> Result<Self, SessionError> {
        let cached = match Session::find_by_id(SESSION_ROW_ID).one(db.as_ref()).await? {
            Some(row) => {
                let cookies: Vec<SessionCookie> = serde_json::from_str(&row.cookie_json)?;
                Some(CredentialBlob {
                    cookies,
                    valid: row.valid,
                    used_otp: row.used_otp,
                    validated_at: row.validated_at.with_timezone(&Utc),
                })
            }
            None => None,
        };

        Ok(Self {
            db,
            cached: RwLock::new(cached),
        })
    }

    /// The logical session state right now.
    pub async fn state(&self) -> SessionState {
        match self.cached.read().await.as_ref() {
            None => SessionState::Absent,
            Some(blob) => blob.state_at(Utc::now()),
        }
    }

    /// Store a freshly minted blob (called by the acquirer only).
    pub async fn save(&self, blob: CredentialBlob) -> Result<(), SessionError> {
        self.persist(&blob).await?;
        *self.cached.write().await = Some(blob);
        Ok(())
    }

    /// Force the stored blob to `Invalid`.
    ///
    /// Called whenever a 401/403 is observed anywhere in the system,
    /// regardless of the blob's claimed freshness. The in-memory flag flips
    /// even if the database write fails, so subsequent accessor calls fail
    /// fast either way.
    pub async fn invalidate(&self) {
        let mut guard = self.cached.write().await;
        let Some(blob) = guard.as_mut() else {
            return;
        };
        if !blob.valid {
            return;
        }
        blob.valid = false;

        let snapshot = blob.clone();
        drop(guard);

        if let Err(e) = self.persist(&snapshot).await {
            tracing::warn!(error = %e, "failed to persist session invalidation");
        }
    }

    /// The single accessor for a usable credential blob.
    ///
    /// - `Valid` and fresh: returns the blob immediately.
    /// - `Stale`: re-probes through `validator`; returns the refreshed blob
    ///   on success, fails with [`SessionError::NoValidSession`] if the
    ///   probe rejects it.
    /// - `Invalid` or `Absent`: fails with [`SessionError::NoValidSession`]
    ///   without any network call.
    ///
    /// Acquisition is never triggered from here.
    pub async fn current(
        &self,
        validator: &SessionValidator,
    ) -> Result<CredentialBlob, SessionError> {
        let blob = {
            let guard = self.cached.read().await;
            guard.clone().ok_or(SessionError::NoValidSession)?
        };

        match blob.state_at(Utc::now()) {
            SessionState::Valid => Ok(blob),
            SessionState::Invalid | SessionState::Absent => Err(SessionError::NoValidSession),
            SessionState::Stale => {
                tracing::debug!("session stale, re-probing");
                if validator.probe(&blob).await? {
                    let mut refreshed = blob;
                    refreshed.validated_at = Utc::now();
                    self.persist(&refreshed).await?;
                    *self.cached.write().await = Some(refreshed.clone());
                    Ok(refreshed)
                } else {
                    self.invalidate().await;
                    Err(SessionError::NoValidSession)
                }
            }
        }
    }

    /// Upsert the single session row. `created_at` is only written on
    /// insert, so it keeps the original mint time across probe refreshes.
    async fn persist(&self, blob: &CredentialBlob) -> Result<(), SessionError> {
        let model = SessionActiveModel {
            id: Set(SESSION_ROW_ID),
            cookie_json: Set(serde_json::to_string(&blob.cookies)?),
            valid: Set(blob.valid),
            used_otp: Set(blob.used_otp),
            validated_at: Set(blob.validated_at.fixed_offset()),
            created_at: Set(Utc::now().fixed_offset()),
        };

        Session::insert(model)
            .on_conflict(
                OnConflict::column(SessionColumn::Id)
                    .update_columns([
                        SessionColumn::CookieJson,
                        SessionColumn::Valid,
                        SessionColumn::UsedOtp,
                        SessionColumn::ValidatedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }
}
