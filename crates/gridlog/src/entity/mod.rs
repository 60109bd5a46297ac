//! SeaORM entity definitions for the gridlog database schema.

pub mod prelude;
pub mod record_history;
pub mod session;
pub mod sync_target;
