//! Group channel cryptography.
//!
//! Channels are symmetric: everyone who knows the 16-byte key can read and
//! write. Keys derive from a password (or the channel name when no
//! password is set) by truncating its SHA-256; the well-known `#Public`
//! channel uses a fixed embedded key. A one-byte channel hash (the first
//! byte of SHA-256 of the key) demultiplexes incoming group traffic;
//! collisions are resolved by trial decryption, since only the right key
//! authenticates.
//!
//! A sealed message is `mac(2) || ciphertext(N*16)`: AES-128-ECB over the
//! zero-padded plaintext, authenticated by the first two bytes of
//! HMAC-SHA256 keyed with `key || 16 zero bytes`. Receivers retry the MAC
//! once with the raw 16-byte key for interoperability with older senders.
//!
//! # Security
//!
//! - The truncated MAC is checked in constant time, both key forms.
//! - Keys live in zeroizing containers; per-call cipher and HMAC contexts
//!   are dropped immediately, never shared.
//! - ECB with zero padding and a 16-bit MAC is the over-the-air contract,
//!   inherited from the deployed network; it is not a general-purpose AEAD
//!   and nothing else in this codebase uses it.

use aes::{
    Aes128,
    cipher::{BlockDecrypt as _, BlockEncrypt as _, KeyInit as _, generic_array::GenericArray},
};
use hmac::{Hmac, Mac as _};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq as _;
use zeroize::Zeroizing;

use crate::errors::{CryptoError, Result};

/// Symmetric channel key size in bytes (AES-128).
pub const CIPHER_KEY_SIZE: usize = 16;

/// AES block size in bytes.
pub const CIPHER_BLOCK_SIZE: usize = 16;

/// Truncated MAC size carried on the wire.
pub const CIPHER_MAC_SIZE: usize = 2;

/// Name of the well-known public channel.
pub const PUBLIC_CHANNEL_NAME: &str = "#Public";

/// Fixed key of the well-known `#Public` channel.
pub const PUBLIC_CHANNEL_KEY: [u8; CIPHER_KEY_SIZE] = [
    0x8b, 0x33, 0x87, 0xe9, 0xc5, 0xcd, 0xea, 0x6a, 0xc9, 0xe5, 0xed, 0xba, 0xa1, 0x15, 0xcd,
    0x72,
];

type HmacSha256 = Hmac<Sha256>;

/// A 16-byte symmetric channel key.
///
/// Zeroized on drop. Equality is constant-time: the key is the only thing
/// distinguishing two channels whose hashes collide.
#[derive(Clone)]
pub struct ChannelKey(Zeroizing<[u8; CIPHER_KEY_SIZE]>);

impl ChannelKey {
    /// Wrap raw key bytes (e.g. loaded from the channel store).
    #[must_use]
    pub fn from_bytes(bytes: [u8; CIPHER_KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Derive a key from a channel password or name.
    ///
    /// `#Public` maps to the embedded well-known key; anything else is the
    /// first 16 bytes of its SHA-256.
    #[must_use]
    pub fn derive(password_or_name: &str) -> Self {
        if password_or_name == PUBLIC_CHANNEL_NAME {
            return Self::from_bytes(PUBLIC_CHANNEL_KEY);
        }
        let digest = Sha256::digest(password_or_name.as_bytes());
        let mut key = [0u8; CIPHER_KEY_SIZE];
        key.copy_from_slice(&digest[..CIPHER_KEY_SIZE]);
        Self(Zeroizing::new(key))
    }

    /// The demultiplexing hash: first byte of SHA-256 of the key.
    #[must_use]
    pub fn channel_hash(&self) -> u8 {
        Sha256::digest(self.0.as_slice())[0]
    }

    /// Raw key bytes, for persistence only.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; CIPHER_KEY_SIZE] {
        &self.0
    }
}

impl PartialEq for ChannelKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(other.0.as_slice()).into()
    }
}

impl Eq for ChannelKey {}

impl std::fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelKey(hash={:#04x})", self.channel_hash())
    }
}

/// Seal a plaintext: returns `mac(2) || ciphertext(N*16)`.
///
/// The plaintext is zero-padded to a block multiple, one block minimum, so
/// the receiver's zero-strip recovers the original up to trailing zeros.
#[must_use]
pub fn encrypt(key: &ChannelKey, plaintext: &[u8]) -> Vec<u8> {
    let blocks = plaintext.len().div_ceil(CIPHER_BLOCK_SIZE).max(1);
    let mut padded = Zeroizing::new(vec![0u8; blocks * CIPHER_BLOCK_SIZE]);
    padded[..plaintext.len()].copy_from_slice(plaintext);

    let cipher = Aes128::new(GenericArray::from_slice(key.as_bytes()));
    for block in padded.chunks_exact_mut(CIPHER_BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }

    let mac = compute_mac(&expanded_hmac_key(key), &padded);
    let mut sealed = Vec::with_capacity(CIPHER_MAC_SIZE + padded.len());
    sealed.extend_from_slice(&mac);
    sealed.extend_from_slice(&padded);
    sealed
}

/// Open a sealed message: verifies the MAC, decrypts, strips padding.
///
/// # Errors
///
/// - `CryptoError::Misaligned` if the ciphertext is not a positive
///   multiple of 16 bytes
/// - `CryptoError::MacMismatch` if neither the expanded nor the legacy raw
///   HMAC key authenticates the ciphertext
pub fn decrypt(key: &ChannelKey, sealed: &[u8]) -> Result<Vec<u8>> {
    let Some((mac, ciphertext)) = sealed.split_at_checked(CIPHER_MAC_SIZE) else {
        return Err(CryptoError::Misaligned(sealed.len()));
    };
    if ciphertext.is_empty() || ciphertext.len() % CIPHER_BLOCK_SIZE != 0 {
        return Err(CryptoError::Misaligned(ciphertext.len()));
    }

    // Expanded key first; retry once with the raw key for older senders.
    let expected = compute_mac(&expanded_hmac_key(key), ciphertext);
    if !bool::from(expected.ct_eq(mac)) {
        let legacy = compute_mac(key.as_bytes(), ciphertext);
        if !bool::from(legacy.ct_eq(mac)) {
            return Err(CryptoError::MacMismatch);
        }
    }

    let cipher = Aes128::new(GenericArray::from_slice(key.as_bytes()));
    let mut plaintext = ciphertext.to_vec();
    for block in plaintext.chunks_exact_mut(CIPHER_BLOCK_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }

    let stripped = plaintext.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    plaintext.truncate(stripped);
    Ok(plaintext)
}

/// Raw AES-128-ECB encryption, zero-padding to a block multiple.
///
/// Bulk primitive for the async worker; channel traffic goes through
/// [`encrypt`] which adds the MAC.
#[must_use]
pub fn aes_ecb_encrypt(key: &[u8; CIPHER_KEY_SIZE], data: &[u8]) -> Vec<u8> {
    let blocks = data.len().div_ceil(CIPHER_BLOCK_SIZE).max(1);
    let mut padded = vec![0u8; blocks * CIPHER_BLOCK_SIZE];
    padded[..data.len()].copy_from_slice(data);

    let cipher = Aes128::new(GenericArray::from_slice(key));
    for block in padded.chunks_exact_mut(CIPHER_BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
    }
    padded
}

/// Raw AES-128-ECB decryption. No padding is stripped.
///
/// # Errors
///
/// `CryptoError::Misaligned` unless the input is a positive multiple of
/// 16 bytes.
pub fn aes_ecb_decrypt(key: &[u8; CIPHER_KEY_SIZE], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % CIPHER_BLOCK_SIZE != 0 {
        return Err(CryptoError::Misaligned(data.len()));
    }
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut plaintext = data.to_vec();
    for block in plaintext.chunks_exact_mut(CIPHER_BLOCK_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(block));
    }
    Ok(plaintext)
}

/// Full-width HMAC-SHA256, for the worker's bulk MAC operation.
#[must_use]
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let Ok(mut mac) = <HmacSha256 as hmac::Mac>::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts keys of any length");
    };
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// HMAC key for new traffic: `key || 16 zero bytes`.
fn expanded_hmac_key(key: &ChannelKey) -> [u8; 32] {
    let mut expanded = [0u8; 32];
    expanded[..CIPHER_KEY_SIZE].copy_from_slice(key.as_bytes());
    expanded
}

fn compute_mac(hmac_key: &[u8], ciphertext: &[u8]) -> [u8; CIPHER_MAC_SIZE] {
    let Ok(mut mac) = <HmacSha256 as hmac::Mac>::new_from_slice(hmac_key) else {
        unreachable!("HMAC-SHA256 accepts keys of any length");
    };
    mac.update(ciphertext);
    let tag = mac.finalize().into_bytes();
    [tag[0], tag[1]]
}
