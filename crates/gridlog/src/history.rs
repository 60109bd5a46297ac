//! Persistence operations for per-record change-event collections.
//!
//! An entry holds the latest known full set of events for its record, not a
//! growing log: upserting the same `record_id` again replaces the stored set
//! wholesale, so a re-sync is idempotent and always reflects current truth.

use std::collections::HashSet;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect};
use thiserror::Error;
use uuid::Uuid;

use crate::entity::prelude::{
    RecordHistory, RecordHistoryActiveModel, RecordHistoryColumn, RecordHistoryModel,
};
use crate::revision::{ChangeEvent, RecordRef};

#[derive(Debug, Error)]
pub enum HistoryStoreError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("stored events are corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

fn model_for(
    record: &RecordRef,
    events: &[ChangeEvent],
) -> Result<RecordHistoryActiveModel, HistoryStoreError> {
    Ok(RecordHistoryActiveModel {
        id: Set(Uuid::new_v4()),
        base_id: Set(record.base_id.clone()),
        table_id: Set(record.table_id.clone()),
        record_id: Set(record.record_id.clone()),
        events: Set(serde_json::to_value(events)?),
        event_count: Set(events.len() as i32),
        synced_at: Set(Utc::now().fixed_offset()),
    })
}

fn replace_on_conflict() -> OnConflict {
    OnConflict::column(RecordHistoryColumn::RecordId)
        .update_columns([
            RecordHistoryColumn::BaseId,
            RecordHistoryColumn::TableId,
            RecordHistoryColumn::Events,
            RecordHistoryColumn::EventCount,
            RecordHistoryColumn::SyncedAt,
        ])
        .to_owned()
}

/// Replace one record's stored event collection.
pub async fn upsert(
    db: &DatabaseConnection,
    record: &RecordRef,
    events: &[ChangeEvent],
) -> Result<(), HistoryStoreError> {
    RecordHistory::insert(model_for(record, events)?)
        .on_conflict(replace_on_conflict())
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Replace many records' event collections in one statement.
///
/// Used by the orchestrator after each batch so batch-mates commit together.
/// Returns the number of rows written.
pub async fn bulk_upsert(
    db: &DatabaseConnection,
    batch: &[(RecordRef, Vec<ChangeEvent>)],
) -> Result<u64, HistoryStoreError> {
    if batch.is_empty() {
        return Ok(0);
    }

    let models = batch
        .iter()
        .map(|(record, events)| model_for(record, events))
        .collect::<Result<Vec<_>, _>>()?;

    let written = RecordHistory::insert_many(models)
        .on_conflict(replace_on_conflict())
        .exec_without_returning(db)
        .await?;

    tracing::debug!(rows = written, "bulk upserted record histories");
    Ok(written)
}

/// Load one record's stored collection, if any.
pub async fn find_by_record_id(
    db: &DatabaseConnection,
    record_id: &str,
) -> Result<Option<RecordHistoryModel>, HistoryStoreError> {
    Ok(RecordHistory::find()
        .filter(RecordHistoryColumn::RecordId.eq(record_id))
        .one(db)
        .await?)
}

/// Decode the events column of a stored row.
pub fn decode_events(model: &RecordHistoryModel) -> Result<Vec<ChangeEvent>, HistoryStoreError> {
    Ok(serde_json::from_value(model.events.clone())?)
}

/// Record ids that already have a stored collection, for "new vs updated"
/// progress reporting. Never used to skip fetching.
pub async fn list_synced_record_ids(
    db: &DatabaseConnection,
) -> Result<HashSet<String>, HistoryStoreError> {
    let ids: Vec<String> = RecordHistory::find()
        .select_only()
        .column(RecordHistoryColumn::RecordId)
        .into_tuple()
        .all(db)
        .await?;
    Ok(ids.into_iter().collect())
}

#[cfg(all(test, feature = "migrate"))]
mod tests {
    use super::*;
    use crate::revision::FieldKind;

    async fn db() -> DatabaseConnection {
        crate::connect_and_migrate("sqlite::memory:")
            .await
            .expect("in-memory db")
    }

    fn record() -> RecordRef {
        RecordRef::new("base1", "tbl1", "rec1")
    }

    fn event(old: Option<&str>, new: Option<&str>) -> ChangeEvent {
        ChangeEvent {
            id: Uuid::new_v4(),
            record_id: "rec1".to_string(),
            field: FieldKind::Status,
            old_value: old.map(str::to_string),
            new_value: new.map(str::to_string),
            occurred_at: Utc::now(),
            actor: "ops@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_rather_than_accumulates() {
        let db = db().await;

        upsert(&db, &record(), &[event(None, Some("Todo")), event(Some("Todo"), Some("Doing"))])
            .await
            .expect("first upsert");

        // Re-sync with a different (smaller) set: only the latest survives.
        upsert(&db, &record(), &[event(Some("Doing"), Some("Done"))])
            .await
            .expect("second upsert");

        let row = find_by_record_id(&db, "rec1")
            .await
            .expect("query")
            .expect("row exists");
        assert_eq!(row.event_count, 1);

        let events = decode_events(&row).expect("decode");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].old_value.as_deref(), Some("Doing"));
        assert_eq!(events[0].new_value.as_deref(), Some("Done"));
    }

    #[tokio::test]
    async fn bulk_upsert_writes_all_rows_in_one_call() {
        let db = db().await;

        let batch = vec![
            (RecordRef::new("base1", "tbl1", "rec1"), vec![event(None, Some("A"))]),
            (RecordRef::new("base1", "tbl1", "rec2"), vec![event(None, Some("B"))]),
        ];
        let written = bulk_upsert(&db, &batch).await.expect("bulk upsert");
        assert_eq!(written, 2);

        let synced = list_synced_record_ids(&db).await.expect("ids");
        assert!(synced.contains("rec1") && synced.contains("rec2"));
    }

    #[tokio::test]
    async fn bulk_upsert_of_nothing_is_a_no_op() {
        let db = db().await;
        assert_eq!(bulk_upsert(&db, &[]).await.expect("empty"), 0);
    }
}
