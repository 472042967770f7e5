//! Canonical group message plaintext.
//!
//! What goes under the channel cipher:
//!
//! ```text
//! [timestamp: 4 LE] [flags: 1] ["<sender>: <text>"]
//! ```
//!
//! The terminator and padding are both zero bytes, so the encrypt side
//! needs no explicit NUL and the decrypt side's zero-strip recovers the
//! content exactly. A content without `": "` is all text with no sender;
//! some senders omit the prefix.

use crate::errors::{CryptoError, Result};

/// Decoded group message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    /// Sender's clock at send time, unix seconds.
    pub timestamp: u32,
    /// Message flags; zero for plain text.
    pub flags: u8,
    /// Sender display name, when the content carried one.
    pub sender: Option<String>,
    /// Message text.
    pub text: String,
}

/// Assemble the canonical plaintext for a group text message.
#[must_use]
pub fn build_plaintext(timestamp: u32, flags: u8, sender: &str, text: &str) -> Vec<u8> {
    let mut plaintext = Vec::with_capacity(4 + 1 + sender.len() + 2 + text.len());
    plaintext.extend_from_slice(&timestamp.to_le_bytes());
    plaintext.push(flags);
    plaintext.extend_from_slice(sender.as_bytes());
    plaintext.extend_from_slice(b": ");
    plaintext.extend_from_slice(text.as_bytes());
    plaintext
}

/// Parse a decrypted group plaintext.
///
/// # Errors
///
/// `CryptoError::PlaintextTooShort` below the 5-byte prefix. Content that
/// is not valid UTF-8 is replaced lossily rather than dropped; the MAC
/// already vouched for the bytes.
pub fn parse_plaintext(plaintext: &[u8]) -> Result<GroupMessage> {
    if plaintext.len() < 5 {
        return Err(CryptoError::PlaintextTooShort(plaintext.len()));
    }

    let mut ts = [0u8; 4];
    ts.copy_from_slice(&plaintext[..4]);
    let flags = plaintext[4];

    let content = String::from_utf8_lossy(&plaintext[5..]);
    let (sender, text) = match content.split_once(": ") {
        Some((sender, text)) => (Some(sender.to_owned()), text.to_owned()),
        None => (None, content.into_owned()),
    };

    Ok(GroupMessage { timestamp: u32::from_le_bytes(ts), flags, sender, text })
}
