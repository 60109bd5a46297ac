//! Session entity - the single stored browser-derived credential blob.
//!
//! The engine supports exactly one authenticated identity at a time, so this
//! table holds at most one row (fixed primary key [`SESSION_ROW_ID`]). The
//! row is written only by the credential acquirer (on mint) and the session
//! validator (on probe); everything else reads it through
//! [`crate::session::SessionStore`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Fixed primary key of the single session row.
pub const SESSION_ROW_ID: i32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "session")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,

    /// Serialized cookie set (JSON array of `SessionCookie`).
    pub cookie_json: String,

    /// Whether the blob was accepted on its last probe. A 401/403 observed
    /// anywhere in the system flips this to false immediately.
    pub valid: bool,

    /// Whether acquiring this blob required a one-time code.
    pub used_otp: bool,

    /// When the blob last passed validation.
    pub validated_at: DateTimeWithTimeZone,

    /// When the blob was minted.
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
