//! Shared sync constants.

/// Default number of records fetched per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Lower bound of the pacing pause between batches (milliseconds).
pub const MIN_BATCH_PAUSE_MS: u64 = 700;

/// Upper bound of the pacing pause between batches (milliseconds).
///
/// The pause lands around one second with jitter, on top of the
/// dispatcher's own pacing, so batch boundaries never burst the platform.
pub const MAX_BATCH_PAUSE_MS: u64 = 1_300;
