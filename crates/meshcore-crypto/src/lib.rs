//! MeshCore cryptographic primitives.
//!
//! Pure building blocks with deterministic outputs: callers provide seeds
//! and key material, nothing here touches an entropy source or the clock.
//! That keeps every operation reproducible under the simulation harness.
//!
//! Three concerns live here:
//!
//! - **Identity** ([`Keypair`]): Ed25519 signing for ADVERTs and X25519
//!   key agreement for direct messages, both from one 32-byte seed.
//! - **Channels** ([`ChannelKey`], [`encrypt`]/[`decrypt`]): symmetric
//!   group encryption with a truncated-HMAC authenticator and a one-byte
//!   demultiplexing hash.
//! - **Messages** ([`GroupMessage`]): the canonical plaintext layout that
//!   goes under the channel cipher.
//!
//! # Security
//!
//! Private material (seeds, channel keys, shared secrets, padded
//! plaintexts) is zeroized on drop. MAC comparisons are constant-time.
//! Cipher and HMAC contexts are created per call and never shared.

pub mod channel;
pub mod errors;
pub mod keys;
pub mod message;

pub use channel::{
    CIPHER_BLOCK_SIZE, CIPHER_KEY_SIZE, CIPHER_MAC_SIZE, ChannelKey, PUBLIC_CHANNEL_KEY,
    PUBLIC_CHANNEL_NAME, aes_ecb_decrypt, aes_ecb_encrypt, decrypt, encrypt, hmac_sha256,
};
pub use errors::{CryptoError, Result};
pub use keys::{Keypair, PUB_KEY_SIZE, SEED_SIZE, SIGNATURE_SIZE, SharedSecret, verify};
pub use message::{GroupMessage, build_plaintext, parse_plaintext};
