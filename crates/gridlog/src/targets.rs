//! Read access to the externally supplied sync targets.
//!
//! The metadata-ingestion collaborator owns this table; the engine only
//! enumerates it. [`seed`] exists for tests and fixture loading.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait};
use uuid::Uuid;

use crate::entity::prelude::{SyncTarget, SyncTargetActiveModel, SyncTargetColumn};
use crate::revision::RecordRef;

/// All target record references, in stable (insertion) order.
pub async fn list_all(db: &DatabaseConnection) -> Result<Vec<RecordRef>, DbErr> {
    let rows = SyncTarget::find().all(db).await?;
    Ok(rows
        .into_iter()
        .map(|row| RecordRef {
            base_id: row.base_id,
            table_id: row.table_id,
            record_id: row.record_id,
        })
        .collect())
}

/// Number of stored targets.
pub async fn count(db: &DatabaseConnection) -> Result<u64, DbErr> {
    SyncTarget::find().count(db).await
}

/// Insert target references, ignoring ones already present.
/// Returns the number of newly inserted rows.
pub async fn seed(db: &DatabaseConnection, refs: &[RecordRef]) -> Result<u64, DbErr> {
    if refs.is_empty() {
        return Ok(0);
    }

    let now = Utc::now().fixed_offset();
    let models = refs.iter().map(|r| SyncTargetActiveModel {
        id: Set(Uuid::new_v4()),
        base_id: Set(r.base_id.clone()),
        table_id: Set(r.table_id.clone()),
        record_id: Set(r.record_id.clone()),
        created_at: Set(now),
    });

    SyncTarget::insert_many(models)
        .on_conflict(
            OnConflict::column(SyncTargetColumn::RecordId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await
}
