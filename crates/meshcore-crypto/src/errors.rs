//! Error types for cryptographic operations.

use thiserror::Error;

/// Result alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors produced by channel crypto and key agreement.
///
/// None of these carry key material or plaintext. Receivers drop the
/// offending frame; only the distinction between variants matters for
/// counters and tests.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// Authentication tag did not match under either HMAC key form.
    #[error("mac mismatch")]
    MacMismatch,

    /// Ciphertext length is not a positive multiple of the block size.
    #[error("misaligned ciphertext: {0} bytes")]
    Misaligned(usize),

    /// Decrypted plaintext shorter than the timestamp + flags prefix.
    #[error("group plaintext too short: {0} bytes")]
    PlaintextTooShort(usize),

    /// Peer public key could not be converted for key agreement.
    #[error("key conversion failed")]
    KeyConversion,

    /// Catch-all for primitive failures that should not occur with valid
    /// inputs.
    #[error("crypto operation failed")]
    CryptoFail,
}
