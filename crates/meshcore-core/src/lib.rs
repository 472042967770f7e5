//! MeshCore protocol engine.
//!
//! The mesh-facing half of the firmware: identity lifecycle, the flood
//! router, the node table, joined channels, and the top-level
//! [`MeshEngine`] that ties them to a radio. Protocol logic is sans-I/O
//! in the ways that matter for testing: time and randomness come from an
//! [`Environment`], the modem hides behind the [`Radio`] port, and
//! persistence behind `meshcore_store::KvStore`, so the whole engine
//! runs deterministically under the simulation harness.
//!
//! Single-threaded by design: one engine is owned by the main tick loop
//! and never shared. Blocking work (file I/O, bulk crypto) belongs to the
//! worker crate, not here.

pub mod channels;
pub mod engine;
pub mod env;
pub mod error;
pub mod identity;
pub mod node_table;
pub mod radio;
pub mod router;

#[cfg(test)]
pub(crate) mod test_env;

pub use channels::{CHANNELS_NAMESPACE, Channel, ChannelTable};
pub use engine::{
    DirectHook, GroupHook, GroupMessageRecord, HookResponse, MeshEngine, MeshStats, NodeHook,
    PacketHook,
};
pub use env::{Environment, MeshInstant, SystemEnv, TickInstant};
pub use error::{MeshError, Result};
pub use identity::{IDENTITY_NAMESPACE, Identity, MAX_NODE_NAME};
pub use node_table::{DEFAULT_NODE_CAPACITY, NodeInfo, NodeObservation, NodeTable};
pub use radio::{MemoryHub, MemoryRadio, Radio, RxMetadata, SendStatus};
pub use router::{FloodDecision, PendingRebroadcast, Router, RouterStats};
