//! GRP_TXT / GRP_DATA payload framing.
//!
//! ```text
//! [channel_hash: 1] [mac: 2] [ciphertext: N * 16]
//! ```
//!
//! The channel hash is the first byte of SHA-256 of the channel key and only
//! demultiplexes; it is not authentication. The MAC and ciphertext are
//! opaque here; the crypto crate owns their verification. This module only
//! enforces the structural minimum of one full cipher block.

use crate::{
    CIPHER_BLOCK_SIZE, CIPHER_MAC_SIZE,
    errors::{ProtocolError, Result},
};

/// Smallest valid group payload: hash + MAC + one cipher block.
pub const GROUP_MIN_SIZE: usize = 1 + CIPHER_MAC_SIZE + CIPHER_BLOCK_SIZE;

/// Borrowed view of a group payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupPayload<'a> {
    /// First byte of SHA-256 of the channel key.
    pub channel_hash: u8,
    /// Truncated HMAC-SHA256 over the ciphertext, then the ciphertext
    /// itself. Handed to the crypto crate as-is.
    pub sealed: &'a [u8],
}

impl<'a> GroupPayload<'a> {
    /// Split a packet payload into channel hash and sealed bytes.
    ///
    /// # Errors
    ///
    /// `ProtocolError::GroupPayloadTooShort` below [`GROUP_MIN_SIZE`] bytes.
    /// Ciphertext alignment is left to the crypto layer.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        if payload.len() < GROUP_MIN_SIZE {
            return Err(ProtocolError::GroupPayloadTooShort(payload.len()));
        }
        Ok(Self { channel_hash: payload[0], sealed: &payload[1..] })
    }

    /// Assemble a packet payload from channel hash and sealed bytes.
    #[must_use]
    pub fn assemble(channel_hash: u8, sealed: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(1 + sealed.len());
        payload.push(channel_hash);
        payload.extend_from_slice(sealed);
        payload
    }
}
