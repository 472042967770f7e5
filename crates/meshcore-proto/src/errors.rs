//! Error types for wire-format encoding and decoding.
//!
//! Every decode failure is a `ProtocolError`. Receivers treat all of them the
//! same way (drop the frame and bump a counter), but the distinct variants
//! keep diagnostics and tests precise.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced by the packet codec and payload parsers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Byte stream ended before the structure it claims to contain.
    #[error("truncated frame: need {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes the structure requires.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// Path length field exceeds the wire maximum.
    #[error("path too long: {0} entries (max {max})", max = crate::MAX_PATH_SIZE)]
    PathTooLong(u8),

    /// Payload does not fit the wire maximum.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Offending payload size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Path already holds the maximum number of hops.
    #[error("path full")]
    PathFull,

    /// Output buffer cannot hold the encoded frame.
    #[error("buffer too small: need {needed} bytes, capacity {capacity}")]
    BufferTooSmall {
        /// Bytes the encoded frame requires.
        needed: usize,
        /// Capacity of the caller's buffer.
        capacity: usize,
    },

    /// ADVERT payload shorter than the fixed prefix.
    #[error("advert too short: {0} bytes")]
    AdvertTooShort(usize),

    /// ADVERT app-data section exceeds its maximum.
    #[error("advert app-data too large: {0} bytes")]
    AdvertDataTooLarge(usize),

    /// ADVERT name bytes are not valid UTF-8.
    #[error("advert name is not valid UTF-8")]
    InvalidName,

    /// Group payload shorter than hash + MAC + one cipher block.
    #[error("group payload too short: {0} bytes")]
    GroupPayloadTooShort(usize),
}
