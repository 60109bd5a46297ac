//! Session lifecycle: the browser-derived credential blob and its keepers.
//!
//! The engine authenticates against the grid platform with a cookie set
//! harvested from a real browser login. This module owns that blob end to
//! end:
//!
//! - [`SessionStore`] persists the single blob and answers the one accessor
//!   everything else uses ([`SessionStore::current`]),
//! - [`SessionValidator`] probes whether a stored blob is still accepted,
//! - [`CredentialAcquirer`] mints a fresh blob through an interactive login
//!   (the chromiumoxide implementation lives behind the `browser` feature).
//!
//! Acquisition is expensive and visible (a full login, possibly with a
//! one-time code), so it is never triggered implicitly: the accessor only
//! validates or fails with [`SessionError::NoValidSession`].

mod acquire;
mod blob;
mod error;
mod store;
mod validate;

pub use acquire::CredentialAcquirer;
#[cfg(feature = "browser")]
pub use acquire::{BrowserAcquirer, BrowserAcquirerOptions};
pub use blob::{CredentialBlob, SessionCookie, SessionState, FRESHNESS_WINDOW_SECS};
pub use error::SessionError;
pub use store::SessionStore;
pub use validate::SessionValidator;
