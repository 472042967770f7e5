//! Error type for the key-value store.

use thiserror::Error;

/// Errors surfaced by store backends.
///
/// Corrupt values are deliberately NOT an error: a value of the wrong
/// width or encoding reads back as missing, so a half-written preference
/// can never wedge boot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying database or filesystem failure.
    #[error("storage i/o error: {0}")]
    Io(String),

    /// Namespace or key exceeds the backend's limits.
    #[error("key too long: {0} bytes")]
    KeyTooLong(usize),
}
