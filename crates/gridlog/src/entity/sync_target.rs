//! Sync target entity - the externally supplied record references.
//!
//! Rows here come from the metadata-ingestion collaborator (which lists
//! workspaces, tables, and records); the sync engine only reads them to
//! enumerate the records whose history it should extract.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_targets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub base_id: String,

    pub table_id: String,

    #[sea_orm(unique)]
    pub record_id: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
