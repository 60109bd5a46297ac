//! Core revision-history types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to one record of the grid platform, supplied externally by the
/// metadata-ingestion collaborator. Read-only to this engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub base_id: String,
    pub table_id: String,
    pub record_id: String,
}

impl RecordRef {
    pub fn new(
        base_id: impl Into<String>,
        table_id: impl Into<String>,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            base_id: base_id.into(),
            table_id: table_id.into(),
            record_id: record_id.into(),
        }
    }
}

impl std::fmt::Display for RecordRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.base_id, self.table_id, self.record_id)
    }
}

/// The two field kinds the engine extracts history for. Activities touching
/// any other field type are discarded before an event is ever constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Assignee,
    Status,
}

/// One typed field change, immutable once created.
///
/// Invariant: at least one of `old_value` / `new_value` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: Uuid,
    pub record_id: String,
    pub field: FieldKind,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub actor: String,
}

/// One raw activity entry as returned by the internal endpoint.
///
/// Actor and timestamp are plain metadata on the entry; the change itself is
/// only described by the embedded HTML fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActivity {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub actor: String,
    pub diff_html: String,
}

/// The internal endpoint's response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityPage {
    pub activities: Vec<RawActivity>,
}
