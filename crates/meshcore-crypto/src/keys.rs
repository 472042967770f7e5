//! Ed25519 identity keys and X25519 key agreement.
//!
//! A node's identity is a single Ed25519 keypair derived from a 32-byte
//! seed. The same seed doubles as X25519 material for direct-message key
//! agreement: the Ed25519 secret scalar (SHA-512 of the seed, clamped) is
//! multiplied against the peer's public key converted from the Edwards to
//! the Montgomery curve via `u = (1+y)/(1-y)`. Both sides arrive at the
//! same shared secret because the scalars commute.
//!
//! # Security
//!
//! - Signatures are deterministic (standard Ed25519), so signing the same
//!   ADVERT twice leaks nothing.
//! - Seeds and shared secrets live in zeroizing containers; intermediate
//!   scalar material is zeroized before returning.
//! - Verification never panics on attacker-controlled bytes: malformed
//!   public keys or signatures simply verify false.

use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

use crate::errors::{CryptoError, Result};

/// Ed25519 seed size in bytes.
pub const SEED_SIZE: usize = 32;

/// Ed25519 public key size in bytes.
pub const PUB_KEY_SIZE: usize = 32;

/// Ed25519 signature size in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// A node identity keypair.
///
/// The public key's first byte is the node's one-byte path hash on the
/// wire, so two nodes whose keys share a first byte are indistinguishable
/// to forwarders; full keys disambiguate at the endpoints.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Reconstruct a keypair from its persisted seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; SEED_SIZE]) -> Self {
        Self { signing: SigningKey::from_bytes(seed) }
    }

    /// The seed to persist. Zeroized when the caller drops it.
    #[must_use]
    pub fn seed(&self) -> Zeroizing<[u8; SEED_SIZE]> {
        Zeroizing::new(self.signing.to_bytes())
    }

    /// The Ed25519 public key.
    #[must_use]
    pub fn public_key(&self) -> [u8; PUB_KEY_SIZE] {
        self.signing.verifying_key().to_bytes()
    }

    /// The node's one-byte wire identifier: first byte of the public key.
    #[must_use]
    pub fn path_hash(&self) -> u8 {
        self.public_key()[0]
    }

    /// Sign a message. Deterministic.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }

    /// Derive the X25519 shared secret with a peer identified by their
    /// Ed25519 public key.
    ///
    /// # Errors
    ///
    /// `CryptoError::KeyConversion` if the peer key is not a valid curve
    /// point or the agreement degenerates to the identity (low-order peer
    /// key).
    pub fn derive_shared(&self, their_pubkey: &[u8; PUB_KEY_SIZE]) -> Result<SharedSecret> {
        // Ed25519 secret scalar: SHA-512 of the seed, first half, clamped.
        let mut wide = Zeroizing::new([0u8; 64]);
        wide.copy_from_slice(&Sha512::digest(self.signing.to_bytes()));
        let mut scalar = Zeroizing::new([0u8; 32]);
        scalar.copy_from_slice(&wide[..32]);
        scalar[0] &= 0xF8;
        scalar[31] &= 0x7F;
        scalar[31] |= 0x40;

        let edwards = CompressedEdwardsY(*their_pubkey)
            .decompress()
            .ok_or(CryptoError::KeyConversion)?;
        let shared = edwards.to_montgomery().mul_clamped(*scalar);

        if shared.0 == [0u8; 32] {
            return Err(CryptoError::KeyConversion);
        }
        Ok(SharedSecret(Zeroizing::new(shared.0)))
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair").field("path_hash", &self.path_hash()).finish_non_exhaustive()
    }
}

/// Verify an Ed25519 signature.
///
/// Returns `false` for malformed keys or signatures instead of erroring;
/// callers only branch on validity.
#[must_use]
pub fn verify(
    message: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
    pubkey: &[u8; PUB_KEY_SIZE],
) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(pubkey) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(signature)).is_ok()
}

/// A derived X25519 shared secret, zeroized on drop.
pub struct SharedSecret(Zeroizing<[u8; 32]>);

impl SharedSecret {
    /// The raw shared secret bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}
