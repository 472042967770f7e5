//! Error types for the mesh engine.

use thiserror::Error;

use meshcore_crypto::CryptoError;
use meshcore_proto::ProtocolError;
use meshcore_store::StoreError;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors surfaced by engine operations.
///
/// RX-path failures never appear here; malformed frames are dropped and
/// counted inside the tick. These are the errors a *caller* of the engine
/// (the script API, the boot sequence) must handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// Wire-format failure while building an outgoing packet.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Cryptographic failure while building an outgoing packet.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The transport's TX queue is full; retry next tick.
    #[error("transport backpressured")]
    Backpressured,

    /// The transport refused permanently.
    #[error("transport fatal")]
    RadioFatal,

    /// No joined channel with that name.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// Node names must be non-empty and fit the advert app-data budget.
    #[error("invalid node name")]
    InvalidNodeName,
}
