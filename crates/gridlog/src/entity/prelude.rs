//! Common re-exports for convenient entity usage.

pub use super::record_history::{
    ActiveModel as RecordHistoryActiveModel, Column as RecordHistoryColumn,
    Entity as RecordHistory, Model as RecordHistoryModel,
};
pub use super::session::{
    ActiveModel as SessionActiveModel, Column as SessionColumn, Entity as Session,
    Model as SessionModel, SESSION_ROW_ID,
};
pub use super::sync_target::{
    ActiveModel as SyncTargetActiveModel, Column as SyncTargetColumn, Entity as SyncTarget,
    Model as SyncTargetModel,
};
