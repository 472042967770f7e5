//! Flood routing: duplicate suppression and scheduled rebroadcast.
//!
//! A received flood packet is rebroadcast by every node that is not
//! already in its path, after a randomized delay that de-correlates
//! neighbors who heard the same transmission. The path itself is the
//! dedup state: no global message IDs, no per-packet memory beyond the
//! pending queue.
//!
//! Direct packets never pass through here; the destination's hash is in
//! their path by construction and nobody else relays them.

use std::time::Duration;

use meshcore_proto::{Packet, ProtocolError};

use crate::env::{Environment, MeshInstant};

/// Default lower bound of the rebroadcast delay window.
pub const DEFAULT_DELAY_MIN: Duration = Duration::from_millis(50);

/// Default upper bound of the rebroadcast delay window.
pub const DEFAULT_DELAY_MAX: Duration = Duration::from_millis(200);

/// Router observability counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Rebroadcasts scheduled.
    pub scheduled: u64,
    /// Rebroadcasts handed to the transport.
    pub sent: u64,
    /// Flood packets suppressed because we were already in the path.
    pub duplicates: u64,
    /// Candidates dropped because the path was full.
    pub path_full: u64,
    /// Candidates dropped because re-encoding failed.
    pub encode_failures: u64,
    /// Entries dropped because the transport refused permanently.
    pub transport_drops: u64,
}

/// Why a packet did or did not get scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodDecision {
    /// Cloned, path-extended, and queued.
    Scheduled,
    /// Not a flood route; nothing to do.
    NotFlood,
    /// Our hash is already in the path.
    Duplicate,
    /// Path at capacity; candidate dropped.
    PathFull,
    /// Re-encoding after path extension failed; candidate dropped.
    EncodeFailed,
}

/// A serialized packet waiting for its send time.
#[derive(Debug)]
pub struct PendingRebroadcast<I> {
    frame: Vec<u8>,
    send_at: I,
    seq: u64,
}

impl<I> PendingRebroadcast<I> {
    /// The wire bytes to transmit.
    #[must_use]
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }
}

/// Flood router with a randomized-delay pending queue.
pub struct Router<I> {
    path_check: bool,
    delay_min: Duration,
    delay_max: Duration,
    pending: Vec<PendingRebroadcast<I>>,
    stats: RouterStats,
    next_seq: u64,
}

impl<I: MeshInstant> Router<I> {
    /// Create a router with the default 50-200 ms delay window.
    #[must_use]
    pub fn new() -> Self {
        Self {
            path_check: true,
            delay_min: DEFAULT_DELAY_MIN,
            delay_max: DEFAULT_DELAY_MAX,
            pending: Vec::new(),
            stats: RouterStats::default(),
            next_seq: 0,
        }
    }

    /// Enable or disable the already-in-path duplicate check.
    ///
    /// Disabling it turns the node into an unconditional repeater; used by
    /// range-test deployments.
    pub fn set_path_check(&mut self, enabled: bool) {
        self.path_check = enabled;
    }

    /// Whether the duplicate check is active.
    #[must_use]
    pub fn path_check(&self) -> bool {
        self.path_check
    }

    /// Reconfigure the delay window. A window with `min > max` collapses
    /// to a fixed `min` delay.
    pub fn set_delay_window(&mut self, min: Duration, max: Duration) {
        self.delay_min = min;
        self.delay_max = max.max(min);
    }

    /// Offer a received packet for rebroadcast.
    ///
    /// On acceptance the packet is cloned, our hash appended, re-encoded,
    /// and queued for `now + uniform(min, max)`.
    pub fn offer<E>(&mut self, packet: &Packet, self_hash: u8, env: &E) -> FloodDecision
    where
        E: Environment<Instant = I>,
    {
        if !packet.route.is_flood() {
            return FloodDecision::NotFlood;
        }
        if self.path_check && packet.is_in_path(self_hash) {
            self.stats.duplicates += 1;
            return FloodDecision::Duplicate;
        }

        let mut relay = *packet;
        if relay.add_to_path(self_hash) == Err(ProtocolError::PathFull) {
            self.stats.path_full += 1;
            return FloodDecision::PathFull;
        }

        let mut wire = [0u8; Packet::MAX_SIZE];
        let len = match relay.encode(&mut wire) {
            Ok(len) => len,
            Err(err) => {
                self.stats.encode_failures += 1;
                tracing::debug!(%err, "dropping rebroadcast candidate");
                return FloodDecision::EncodeFailed;
            },
        };

        let delay = env.random_delay(self.delay_min, self.delay_max);
        self.pending.push(PendingRebroadcast {
            frame: wire[..len].to_vec(),
            send_at: env.now() + delay,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        self.stats.scheduled += 1;
        FloodDecision::Scheduled
    }

    /// Pop the next due entry, FIFO on equal deadlines.
    ///
    /// The caller either transmits it (then calls [`Router::mark_sent`])
    /// or puts it back with [`Router::reinsert`] on backpressure.
    pub fn pop_due(&mut self, now: I) -> Option<PendingRebroadcast<I>> {
        let due = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.send_at <= now)
            .min_by_key(|(_, entry)| (entry.send_at, entry.seq))
            .map(|(index, _)| index)?;
        Some(self.pending.swap_remove(due))
    }

    /// Put an entry back after transport backpressure. Ordering is
    /// preserved: the sequence number still tie-breaks FIFO.
    pub fn reinsert(&mut self, entry: PendingRebroadcast<I>) {
        self.pending.push(entry);
    }

    /// Record a successful hand-off to the transport.
    pub fn mark_sent(&mut self) {
        self.stats.sent += 1;
    }

    /// Record an entry dropped because the transport refused permanently.
    pub fn mark_transport_drop(&mut self) {
        self.stats.transport_drops += 1;
    }

    /// Entries still waiting for their send time.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        self.stats
    }
}

impl<I: MeshInstant> Default for Router<I> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use meshcore_proto::{MAX_PATH_SIZE, PayloadType};

    use super::*;
    use crate::test_env::TestEnv;

    fn flood_packet(payload: &[u8]) -> Packet {
        Packet::flood(PayloadType::GrpTxt, payload).unwrap()
    }

    #[test]
    fn fresh_flood_is_scheduled_in_window() {
        let env = TestEnv::new(7);
        let mut router = Router::new();

        let mut packet = flood_packet(b"payload");
        packet.add_to_path(0xAA).unwrap();

        assert_eq!(router.offer(&packet, 0x42, &env), FloodDecision::Scheduled);
        assert_eq!(router.stats().scheduled, 1);

        // Not due before the minimum delay.
        assert!(router.pop_due(env.now() + Duration::from_millis(49)).is_none());

        // Due at the maximum delay, with our hash appended.
        let entry = router.pop_due(env.now() + Duration::from_millis(200)).unwrap();
        let relayed = Packet::decode(entry.frame()).unwrap();
        assert!(relayed.is_in_path(0x42));
        assert!(relayed.is_in_path(0xAA));
    }

    #[test]
    fn own_hash_in_path_suppresses() {
        let env = TestEnv::new(7);
        let mut router = Router::new();

        let mut packet = flood_packet(b"payload");
        packet.add_to_path(0x42).unwrap();

        assert_eq!(router.offer(&packet, 0x42, &env), FloodDecision::Duplicate);
        assert_eq!(router.stats().duplicates, 1);
        assert_eq!(router.pending_len(), 0);
    }

    #[test]
    fn path_check_disabled_relays_duplicates() {
        let env = TestEnv::new(7);
        let mut router = Router::new();
        router.set_path_check(false);

        let mut packet = flood_packet(b"payload");
        packet.add_to_path(0x42).unwrap();

        assert_eq!(router.offer(&packet, 0x42, &env), FloodDecision::Scheduled);
    }

    #[test]
    fn direct_routes_are_ignored() {
        let env = TestEnv::new(7);
        let mut router = Router::new();

        let packet =
            Packet::new(meshcore_proto::RouteKind::Direct, PayloadType::TxtMsg, b"x").unwrap();
        assert_eq!(router.offer(&packet, 0x42, &env), FloodDecision::NotFlood);
    }

    #[test]
    fn full_path_drops_candidate() {
        let env = TestEnv::new(7);
        let mut router = Router::new();

        let mut packet = flood_packet(b"payload");
        for hop in 0..MAX_PATH_SIZE {
            packet.add_to_path(hop as u8).unwrap();
        }

        // Path check off so the duplicate test does not trigger first
        // (every hash value 0..64 is present).
        router.set_path_check(false);
        assert_eq!(router.offer(&packet, 0xFF, &env), FloodDecision::PathFull);
        assert_eq!(router.stats().path_full, 1);
    }

    #[test]
    fn equal_deadlines_pop_fifo() {
        let env = TestEnv::new(7);
        let mut router = Router::new();
        router.set_delay_window(Duration::from_millis(100), Duration::from_millis(100));

        let first = flood_packet(b"first");
        let second = flood_packet(b"second");
        assert_eq!(router.offer(&first, 0x01, &env), FloodDecision::Scheduled);
        assert_eq!(router.offer(&second, 0x01, &env), FloodDecision::Scheduled);

        env.advance(100);
        let a = router.pop_due(env.now()).unwrap();
        let b = router.pop_due(env.now()).unwrap();
        assert_eq!(Packet::decode(a.frame()).unwrap().payload(), b"first");
        assert_eq!(Packet::decode(b.frame()).unwrap().payload(), b"second");
    }

    #[test]
    fn reinserted_entry_keeps_its_slot() {
        let env = TestEnv::new(7);
        let mut router = Router::new();
        router.set_delay_window(Duration::from_millis(10), Duration::from_millis(10));

        let first = flood_packet(b"first");
        let second = flood_packet(b"second");
        let _ = router.offer(&first, 0x01, &env);
        let _ = router.offer(&second, 0x01, &env);

        env.advance(10);
        let entry = router.pop_due(env.now()).unwrap();
        router.reinsert(entry);

        let again = router.pop_due(env.now()).unwrap();
        assert_eq!(Packet::decode(again.frame()).unwrap().payload(), b"first");
    }
}
