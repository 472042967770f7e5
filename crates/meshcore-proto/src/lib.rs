//! MeshCore wire format.
//!
//! Everything that crosses the air is defined here: the packet envelope
//! ([`Packet`]), the signed self-identification payload ([`Advert`]), and
//! the encrypted group payload framing ([`GroupPayload`]). The crate is
//! deliberately free of cryptography and I/O so that any consumer (the
//! mesh engine, test harnesses, host tooling) can frame and inspect
//! traffic without pulling in the rest of the stack.
//!
//! All multi-byte integers on the wire are little-endian.
//!
//! # Invariants
//!
//! - `Packet::decode` accepts a byte stream iff it is well-formed per the
//!   envelope rules; `encode(decode(x)) == x` for every such stream.
//! - Constants below are cross-implementation contract values and must not
//!   change.

pub mod advert;
pub mod errors;
pub mod group;
pub mod packet;

pub use advert::{Advert, AdvertFields, AppDataBuilder, LatLon, NodeRole};
pub use errors::{ProtocolError, Result};
pub use group::GroupPayload;
pub use packet::{Packet, PayloadType, RouteKind};

/// Ed25519 public key size in bytes.
pub const PUB_KEY_SIZE: usize = 32;

/// Persisted private key material: the 32-byte Ed25519 seed.
pub const SEED_SIZE: usize = 32;

/// Legacy persisted private key blob: seed followed by derived public key.
pub const LEGACY_PRV_KEY_SIZE: usize = 64;

/// Ed25519 signature size in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Symmetric channel key size (AES-128).
pub const CIPHER_KEY_SIZE: usize = 16;

/// AES block size in bytes.
pub const CIPHER_BLOCK_SIZE: usize = 16;

/// Truncated HMAC length carried on group payloads.
pub const CIPHER_MAC_SIZE: usize = 2;

/// Maximum packet payload in bytes.
pub const MAX_PACKET_PAYLOAD: usize = 184;

/// Maximum number of path entries.
pub const MAX_PATH_SIZE: usize = 64;

/// Maximum over-the-air frame size in bytes.
pub const MAX_TRANS_UNIT: usize = 255;

/// Maximum ADVERT app-data size in bytes.
pub const MAX_ADVERT_DATA_SIZE: usize = 32;

/// Size of one path entry (a truncated node hash).
pub const PATH_HASH_SIZE: usize = 1;

/// Size of the transport-codes field on transport routes.
pub const TRANSPORT_CODES_SIZE: usize = 4;
