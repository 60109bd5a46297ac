//! Record history entity - the per-record change-event collection.
//!
//! One row per record, keyed by `record_id`. The `events` column holds the
//! latest known full set of change events for that record as a JSON array;
//! a re-sync replaces it wholesale rather than appending, so the stored set
//! always reflects current truth.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "record_history")]
pub struct Model {
    /// Internal UUID primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Base (workspace) the record belongs to.
    pub base_id: String,

    /// Table the record belongs to.
    pub table_id: String,

    /// Record identifier; unique across the collection.
    #[sea_orm(unique)]
    pub record_id: String,

    /// JSON array of `ChangeEvent`.
    pub events: Json,

    /// Number of events in `events`, denormalized for cheap reporting.
    pub event_count: i32,

    /// When this collection was last refreshed from the platform.
    pub synced_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
