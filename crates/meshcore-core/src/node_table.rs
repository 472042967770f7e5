//! Node table: everything we know about our neighbors.
//!
//! Entries are created and refreshed by incoming ADVERTs. Lookup is by
//! one-byte path hash (what forwarders see) or by full public key (what
//! endpoints need); two distinct nodes may share a path hash, so the
//! public key is the real identity and the table tolerates collisions.
//!
//! The table is capped; when full, the entry with the oldest `last_seen`
//! is evicted. Last-seen is monotone: a stale observation can never move
//! a node backwards in time.

use meshcore_proto::{LatLon, NodeRole, PUB_KEY_SIZE};

use crate::env::MeshInstant;

/// Default node table capacity.
pub const DEFAULT_NODE_CAPACITY: usize = 128;

/// One known neighbor.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo<I> {
    /// One-byte wire identifier (first byte of the public key).
    pub path_hash: u8,
    /// Full Ed25519 public key.
    pub public_key: [u8; PUB_KEY_SIZE],
    /// Advertised display name; empty until the node advertises one.
    pub name: String,
    /// Advertised role.
    pub role: NodeRole,
    /// Whether the most recent ADVERT signature verified.
    pub verified: bool,
    /// Monotonic time of the last observation.
    pub last_seen: I,
    /// Timestamp field of the most recent ADVERT (sender's clock).
    pub advert_timestamp: u32,
    /// RSSI of the last reception, dBm.
    pub rssi_dbm: i16,
    /// SNR of the last reception, dB.
    pub snr_db: f32,
    /// Path length of the packet that carried the last observation.
    pub hop_count: u8,
    /// Advertised position, if any.
    pub location: Option<LatLon>,
}

/// A fresh observation distilled from one ADVERT.
#[derive(Debug, Clone)]
pub struct NodeObservation<I> {
    /// Advertiser's public key.
    pub public_key: [u8; PUB_KEY_SIZE],
    /// Advertised name, when present.
    pub name: Option<String>,
    /// Advertised role.
    pub role: NodeRole,
    /// Signature verification outcome.
    pub verified: bool,
    /// Receive time.
    pub seen_at: I,
    /// ADVERT timestamp field.
    pub advert_timestamp: u32,
    /// Reception RSSI, dBm.
    pub rssi_dbm: i16,
    /// Reception SNR, dB.
    pub snr_db: f32,
    /// Hop count (received path length).
    pub hop_count: u8,
    /// Advertised position, when present.
    pub location: Option<LatLon>,
}

/// Fixed-capacity neighbor table.
pub struct NodeTable<I> {
    nodes: Vec<NodeInfo<I>>,
    capacity: usize,
}

impl<I: MeshInstant> NodeTable<I> {
    /// Create a table bounded to `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { nodes: Vec::new(), capacity: capacity.max(1) }
    }

    /// Number of known nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all known nodes, unordered.
    pub fn iter(&self) -> impl Iterator<Item = &NodeInfo<I>> {
        self.nodes.iter()
    }

    /// Primary lookup: first node matching a path hash.
    ///
    /// Hash collisions are possible; when they matter, use
    /// [`NodeTable::by_public_key`].
    #[must_use]
    pub fn by_path_hash(&self, hash: u8) -> Option<&NodeInfo<I>> {
        self.nodes.iter().find(|node| node.path_hash == hash)
    }

    /// Secondary lookup: exact public key.
    #[must_use]
    pub fn by_public_key(&self, public_key: &[u8; PUB_KEY_SIZE]) -> Option<&NodeInfo<I>> {
        self.nodes.iter().find(|node| &node.public_key == public_key)
    }

    /// All nodes sharing a path hash, for callers that must resolve a
    /// one-byte address despite collisions.
    pub fn by_path_hash_all(&self, hash: u8) -> impl Iterator<Item = &NodeInfo<I>> {
        self.nodes.iter().filter(move |node| node.path_hash == hash)
    }

    /// Drop every node not seen for `max_age`. Returns how many went.
    pub fn purge_older_than(&mut self, now: I, max_age: std::time::Duration) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|node| now - node.last_seen <= max_age);
        before - self.nodes.len()
    }

    /// Insert or refresh a node from an ADVERT observation.
    ///
    /// Refresh updates signal quality, hop count, timestamps, and
    /// verification; the name, role, and location only move forward (an
    /// ADVERT without a name does not erase a known one). Returns the
    /// updated entry.
    pub fn observe(&mut self, observation: NodeObservation<I>) -> &NodeInfo<I> {
        let index = self
            .nodes
            .iter()
            .position(|node| node.public_key == observation.public_key);

        match index {
            Some(index) => {
                let node = &mut self.nodes[index];
                node.last_seen = node.last_seen.max(observation.seen_at);
                node.advert_timestamp = observation.advert_timestamp;
                node.rssi_dbm = observation.rssi_dbm;
                node.snr_db = observation.snr_db;
                node.hop_count = observation.hop_count;
                node.verified = observation.verified;
                if let Some(name) = observation.name {
                    node.name = name;
                }
                if observation.role != NodeRole::Unspecified {
                    node.role = observation.role;
                }
                if observation.location.is_some() {
                    node.location = observation.location;
                }
                &self.nodes[index]
            },
            None => {
                if self.nodes.len() == self.capacity {
                    self.evict_oldest();
                }
                self.nodes.push(NodeInfo {
                    path_hash: observation.public_key[0],
                    public_key: observation.public_key,
                    name: observation.name.unwrap_or_default(),
                    role: observation.role,
                    verified: observation.verified,
                    last_seen: observation.seen_at,
                    advert_timestamp: observation.advert_timestamp,
                    rssi_dbm: observation.rssi_dbm,
                    snr_db: observation.snr_db,
                    hop_count: observation.hop_count,
                    location: observation.location,
                });
                // Just pushed.
                &self.nodes[self.nodes.len() - 1]
            },
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .nodes
            .iter()
            .enumerate()
            .min_by_key(|(_, node)| node.last_seen)
            .map(|(index, _)| index);
        if let Some(index) = oldest {
            let evicted = self.nodes.swap_remove(index);
            tracing::debug!(path_hash = evicted.path_hash, "evicted oldest node");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::TickInstant;

    fn observation(key_byte: u8, at_ms: u64) -> NodeObservation<TickInstant> {
        NodeObservation {
            public_key: [key_byte; PUB_KEY_SIZE],
            name: None,
            role: NodeRole::Unspecified,
            verified: true,
            seen_at: TickInstant::from_millis(at_ms),
            advert_timestamp: 1,
            rssi_dbm: -70,
            snr_db: 6.0,
            hop_count: 1,
            location: None,
        }
    }

    #[test]
    fn insert_and_lookup() {
        let mut table = NodeTable::new(DEFAULT_NODE_CAPACITY);
        table.observe(observation(0x42, 10));

        assert_eq!(table.len(), 1);
        assert!(table.by_path_hash(0x42).is_some());
        assert!(table.by_public_key(&[0x42; PUB_KEY_SIZE]).is_some());
        assert!(table.by_path_hash(0x43).is_none());
    }

    #[test]
    fn refresh_updates_signal_and_time() {
        let mut table = NodeTable::new(DEFAULT_NODE_CAPACITY);
        table.observe(observation(0x42, 10));

        let mut refresh = observation(0x42, 500);
        refresh.rssi_dbm = -50;
        refresh.hop_count = 3;
        table.observe(refresh);

        assert_eq!(table.len(), 1);
        let node = table.by_path_hash(0x42).unwrap();
        assert_eq!(node.rssi_dbm, -50);
        assert_eq!(node.hop_count, 3);
        assert_eq!(node.last_seen, TickInstant::from_millis(500));
    }

    #[test]
    fn last_seen_is_monotone() {
        let mut table = NodeTable::new(DEFAULT_NODE_CAPACITY);
        table.observe(observation(0x42, 500));
        table.observe(observation(0x42, 10));

        assert_eq!(table.by_path_hash(0x42).unwrap().last_seen, TickInstant::from_millis(500));
    }

    #[test]
    fn name_and_role_survive_anonymous_refresh() {
        let mut table = NodeTable::new(DEFAULT_NODE_CAPACITY);

        let mut named = observation(0x42, 10);
        named.name = Some("Alice".to_owned());
        named.role = NodeRole::Chat;
        table.observe(named);

        table.observe(observation(0x42, 20));

        let node = table.by_path_hash(0x42).unwrap();
        assert_eq!(node.name, "Alice");
        assert_eq!(node.role, NodeRole::Chat);
    }

    #[test]
    fn colliding_path_hashes_keep_both_nodes() {
        let mut table = NodeTable::new(DEFAULT_NODE_CAPACITY);

        let mut a = observation(0x42, 10);
        a.public_key[31] = 1;
        let mut b = observation(0x42, 20);
        b.public_key[31] = 2;

        table.observe(a);
        table.observe(b);

        assert_eq!(table.len(), 2);
        assert_eq!(table.by_path_hash(0x42).unwrap().path_hash, 0x42);
    }

    #[test]
    fn purge_drops_only_stale_nodes() {
        let mut table = NodeTable::new(DEFAULT_NODE_CAPACITY);
        table.observe(observation(0x01, 1_000));
        table.observe(observation(0x02, 60_000));

        let dropped = table.purge_older_than(
            TickInstant::from_millis(61_000),
            std::time::Duration::from_secs(30),
        );
        assert_eq!(dropped, 1);
        assert!(table.by_path_hash(0x01).is_none());
        assert!(table.by_path_hash(0x02).is_some());
    }

    #[test]
    fn path_hash_all_returns_every_collision() {
        let mut table = NodeTable::new(DEFAULT_NODE_CAPACITY);
        let mut a = observation(0x42, 10);
        a.public_key[31] = 1;
        let mut b = observation(0x42, 20);
        b.public_key[31] = 2;
        table.observe(a);
        table.observe(b);

        assert_eq!(table.by_path_hash_all(0x42).count(), 2);
        assert_eq!(table.by_path_hash_all(0x43).count(), 0);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut table = NodeTable::new(2);
        table.observe(observation(0x01, 100));
        table.observe(observation(0x02, 50));
        table.observe(observation(0x03, 200));

        assert_eq!(table.len(), 2);
        // 0x02 had the oldest last_seen.
        assert!(table.by_path_hash(0x02).is_none());
        assert!(table.by_path_hash(0x01).is_some());
        assert!(table.by_path_hash(0x03).is_some());
    }
}
