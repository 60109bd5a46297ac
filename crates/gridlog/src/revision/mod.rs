//! Revision history: fetching raw activities and parsing them into events.
//!
//! The platform exposes a record's revision feed only through an internal,
//! undocumented endpoint whose entries embed the actual diff as an HTML
//! fragment. [`RevisionFetcher`] talks to that endpoint (through the
//! dispatcher) and [`DiffParser`] turns each fragment into zero or more
//! typed [`ChangeEvent`]s, so the rest of the engine never sees markup.

mod error;
mod fetcher;
mod parser;
mod types;

pub use error::PlatformError;
pub use fetcher::{RevisionFetcher, ACTIVITY_PAGE_SIZE};
pub use parser::{DiffParser, PolarityRule};
pub use types::{ActivityPage, ChangeEvent, FieldKind, RawActivity, RecordRef};
