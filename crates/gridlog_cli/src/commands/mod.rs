pub(crate) mod history;
pub(crate) mod migrate;
pub(crate) mod shared;
pub(crate) mod sync;
pub(crate) mod targets;
pub(crate) mod validate;

#[cfg(feature = "browser")]
pub(crate) mod login;
