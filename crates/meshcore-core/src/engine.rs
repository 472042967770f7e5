//! Mesh engine: top-level dispatch and the tick loop.
//!
//! One [`MeshEngine`] owns the whole mesh-facing state of the node: the
//! identity, the radio, the flood router, the node table, the joined
//! channels, and the inbound message log. Everything runs on the single
//! main tick loop; [`MeshEngine::update`] is called at roughly 100 Hz
//! and does a bounded amount of work per call: pump the radio, take one
//! frame, dispatch it, flush due rebroadcasts, and fire the periodic
//! self-ADVERT.
//!
//! The UI layer observes the engine through hook slots rather than by
//! polling internals: `on_packet` (raw frames, may claim handling),
//! `on_node` (node table updates), `on_group` (raw group payloads,
//! replaces built-in decryption), and `on_direct` (TXT_MSG frames). Each
//! slot holds at most one hook; installing a new one returns the old.

use std::{collections::VecDeque, time::Duration};

use meshcore_crypto as crypto;
use meshcore_proto::{
    Advert, AppDataBuilder, GroupPayload, MAX_PACKET_PAYLOAD, MAX_TRANS_UNIT, NodeRole, Packet,
    PayloadType,
};

use crate::{
    channels::{Channel, ChannelTable},
    env::Environment,
    error::{MeshError, Result},
    identity::Identity,
    node_table::{DEFAULT_NODE_CAPACITY, NodeObservation, NodeTable},
    radio::{Radio, RxMetadata, SendStatus},
    router::{Router, RouterStats},
};

/// How long a decoded group message suppresses identical copies.
const GROUP_DEDUP_WINDOW: Duration = Duration::from_secs(30);

/// Bound on the in-memory message log.
const MESSAGE_LOG_CAP: usize = 64;

/// ADVERT payload version emitted by this implementation.
const ADVERT_VERSION: u8 = 1;

/// Hook verdict for a raw packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookResponse {
    /// The hook consumed the packet; built-in dispatch is skipped.
    pub handled: bool,
    /// Rebroadcast anyway (only consulted when `handled`).
    pub rebroadcast: bool,
}

/// Raw packet hook: sees every decoded frame before dispatch.
pub type PacketHook<I> = Box<dyn FnMut(&Packet, &RxMetadata<I>) -> HookResponse>;

/// Node hook: fires after every node table insert or refresh.
pub type NodeHook<I> = Box<dyn FnMut(&crate::node_table::NodeInfo<I>)>;

/// Group hook: receives raw group payloads instead of built-in
/// trial decryption.
pub type GroupHook<I> = Box<dyn FnMut(GroupPayload<'_>, &RxMetadata<I>)>;

/// Direct-message hook: receives TXT_MSG packets undecoded.
pub type DirectHook<I> = Box<dyn FnMut(&Packet, &RxMetadata<I>)>;

struct Hooks<I> {
    on_packet: Option<PacketHook<I>>,
    on_node: Option<NodeHook<I>>,
    on_group: Option<GroupHook<I>>,
    on_direct: Option<DirectHook<I>>,
}

impl<I> Default for Hooks<I> {
    fn default() -> Self {
        Self { on_packet: None, on_node: None, on_group: None, on_direct: None }
    }
}

/// One entry of the decoded group message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessageRecord {
    /// Channel the message decrypted under.
    pub channel_name: String,
    /// Wire channel hash.
    pub channel_hash: u8,
    /// Sender display name, when the plaintext carried one.
    pub sender: Option<String>,
    /// Message text.
    pub text: String,
    /// Sender's clock at send time, unix seconds.
    pub timestamp: u32,
    /// True for our own messages (trusted by construction).
    pub verified: bool,
    /// Read state; our own messages start read.
    pub is_read: bool,
    /// True when this node originated the message.
    pub outgoing: bool,
}

/// Engine counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshStats {
    /// Frames handed to the transport.
    pub tx: u64,
    /// Frames successfully decoded.
    pub rx: u64,
    /// Frames or payloads dropped as malformed.
    pub malformed: u64,
    /// Group messages suppressed by the dedup window.
    pub group_deduped: u64,
    /// Router counters.
    pub router: RouterStats,
    /// False when the identity could not be persisted at first boot.
    pub identity_persisted: bool,
}

/// The mesh protocol engine.
pub struct MeshEngine<R, E>
where
    E: Environment,
    R: Radio<Instant = E::Instant>,
{
    env: E,
    radio: R,
    identity: Identity,
    nodes: NodeTable<E::Instant>,
    router: Router<E::Instant>,
    channels: ChannelTable,
    hooks: Hooks<E::Instant>,
    messages: VecDeque<GroupMessageRecord>,
    recent_group: VecDeque<(u8, String, E::Instant)>,
    advert_interval: Duration,
    last_advert: Option<E::Instant>,
    tx: u64,
    rx: u64,
    malformed: u64,
    group_deduped: u64,
}

impl<R, E> MeshEngine<R, E>
where
    E: Environment,
    R: Radio<Instant = E::Instant>,
{
    /// Assemble an engine from its collaborators.
    ///
    /// Periodic self-ADVERT starts disabled; the caller opts in with
    /// [`MeshEngine::set_announce_interval`].
    pub fn new(env: E, radio: R, identity: Identity, channels: ChannelTable) -> Self {
        Self {
            env,
            radio,
            identity,
            nodes: NodeTable::new(DEFAULT_NODE_CAPACITY),
            router: Router::new(),
            channels,
            hooks: Hooks::default(),
            messages: VecDeque::new(),
            recent_group: VecDeque::new(),
            advert_interval: Duration::ZERO,
            last_advert: None,
            tx: 0,
            rx: 0,
            malformed: 0,
            group_deduped: 0,
        }
    }

    /// One tick of the main loop.
    pub fn update(&mut self) {
        self.radio.process_queue();
        self.poll_radio();
        self.flush_rebroadcasts();
        self.maybe_advert();
    }

    // RX

    fn poll_radio(&mut self) {
        if !self.radio.available() {
            return;
        }
        let mut buf = [0u8; MAX_TRANS_UNIT];
        let Some((len, meta)) = self.radio.receive(&mut buf) else {
            return;
        };
        match Packet::decode(&buf[..len]) {
            Ok(packet) => {
                self.rx += 1;
                self.dispatch(&packet, &meta);
            },
            Err(err) => {
                self.malformed += 1;
                tracing::debug!(%err, "dropping malformed frame");
            },
        }
    }

    fn dispatch(&mut self, packet: &Packet, meta: &RxMetadata<E::Instant>) {
        if let Some(hook) = self.hooks.on_packet.as_mut() {
            let response = hook(packet, meta);
            if response.handled {
                if response.rebroadcast {
                    self.offer_rebroadcast(packet);
                }
                return;
            }
        }

        match packet.payload_type {
            PayloadType::Advert => self.handle_advert(packet, meta),
            PayloadType::GrpTxt | PayloadType::GrpData => self.handle_group(packet, meta),
            PayloadType::TxtMsg => {
                if let Some(hook) = self.hooks.on_direct.as_mut() {
                    hook(packet, meta);
                } else {
                    tracing::trace!("no direct-message hook installed");
                }
            },
            other => tracing::trace!(?other, "no local handler"),
        }

        self.offer_rebroadcast(packet);
    }

    fn offer_rebroadcast(&mut self, packet: &Packet) {
        let _ = self.router.offer(packet, self.identity.path_hash(), &self.env);
    }

    fn handle_advert(&mut self, packet: &Packet, meta: &RxMetadata<E::Instant>) {
        let advert = match Advert::parse(packet.payload()) {
            Ok(advert) => advert,
            Err(err) => {
                self.malformed += 1;
                tracing::debug!(%err, "dropping malformed advert");
                return;
            },
        };

        // Our own ADVERT coming back around the mesh.
        if advert.pubkey == self.identity.public_key() {
            return;
        }

        let fields = match advert.app_data_fields() {
            Ok(fields) => fields,
            Err(err) => {
                self.malformed += 1;
                tracing::debug!(%err, "dropping advert with malformed app-data");
                return;
            },
        };

        // A bad signature demotes the entry to unverified, it does not
        // drop it: the neighbor is still physically there.
        let verified =
            crypto::verify(&advert.signing_data(), &advert.signature, &advert.pubkey);

        let node = self.nodes.observe(NodeObservation {
            public_key: advert.pubkey,
            name: fields.name.map(str::to_owned),
            role: fields.role,
            verified,
            seen_at: self.env.now(),
            advert_timestamp: advert.timestamp,
            rssi_dbm: meta.rssi_dbm,
            snr_db: meta.snr_db,
            hop_count: packet.path_len(),
            location: fields.location,
        });

        if let Some(hook) = self.hooks.on_node.as_mut() {
            hook(node);
        }
    }

    fn handle_group(&mut self, packet: &Packet, meta: &RxMetadata<E::Instant>) {
        let group = match GroupPayload::parse(packet.payload()) {
            Ok(group) => group,
            Err(err) => {
                self.malformed += 1;
                tracing::debug!(%err, "dropping malformed group payload");
                return;
            },
        };

        if let Some(hook) = self.hooks.on_group.as_mut() {
            hook(group, meta);
            return;
        }

        let Some((channel, message)) = self.trial_decrypt(&group) else {
            // Not for any of our channels; we still relay it.
            return;
        };

        if self.is_recent_duplicate(group.channel_hash, &message.text) {
            self.group_deduped += 1;
            return;
        }

        self.push_message(GroupMessageRecord {
            channel_name: channel.name,
            channel_hash: group.channel_hash,
            sender: message.sender,
            text: message.text,
            timestamp: message.timestamp,
            verified: false,
            is_read: false,
            outgoing: false,
        });
    }

    fn trial_decrypt(
        &mut self,
        group: &GroupPayload<'_>,
    ) -> Option<(Channel, crypto::GroupMessage)> {
        let candidates: Vec<Channel> =
            self.channels.decrypt_candidates(group.channel_hash).cloned().collect();

        for channel in candidates {
            let Ok(plaintext) = crypto::decrypt(&channel.key, group.sealed) else {
                continue;
            };
            match crypto::parse_plaintext(&plaintext) {
                Ok(message) => return Some((channel, message)),
                Err(err) => {
                    self.malformed += 1;
                    tracing::debug!(%err, "authenticated group message failed to parse");
                    return None;
                },
            }
        }
        None
    }

    fn is_recent_duplicate(&mut self, channel_hash: u8, text: &str) -> bool {
        let now = self.env.now();
        self.recent_group.retain(|(_, _, at)| now - *at < GROUP_DEDUP_WINDOW);

        if self
            .recent_group
            .iter()
            .any(|(hash, seen, _)| *hash == channel_hash && seen == text)
        {
            return true;
        }
        self.recent_group.push_back((channel_hash, text.to_owned(), now));
        false
    }

    fn push_message(&mut self, record: GroupMessageRecord) {
        if self.messages.len() == MESSAGE_LOG_CAP {
            self.messages.pop_front();
        }
        self.messages.push_back(record);
    }

    // TX

    fn flush_rebroadcasts(&mut self) {
        let now = self.env.now();
        while let Some(entry) = self.router.pop_due(now) {
            match self.radio.queue_send(entry.frame()) {
                SendStatus::Queued => {
                    self.tx += 1;
                    self.router.mark_sent();
                },
                SendStatus::Backpressured => {
                    self.router.reinsert(entry);
                    break;
                },
                SendStatus::Fatal => {
                    self.router.mark_transport_drop();
                    tracing::warn!("transport refused rebroadcast permanently");
                    break;
                },
            }
        }
    }

    fn maybe_advert(&mut self) {
        if self.advert_interval.is_zero() {
            return;
        }
        let now = self.env.now();
        let due = match self.last_advert {
            None => true,
            Some(at) => now - at >= self.advert_interval,
        };
        if due {
            if let Err(err) = self.send_advert() {
                tracing::warn!(%err, "periodic advert failed");
            }
        }
    }

    /// Broadcast a signed self-ADVERT now.
    pub fn send_advert(&mut self) -> Result<()> {
        let app_data =
            AppDataBuilder::new().role(NodeRole::Chat).name(self.identity.name()).build()?;
        let timestamp = self.env.unix_time_secs();

        let mut signing = Vec::with_capacity(32 + 4 + app_data.len());
        signing.extend_from_slice(&self.identity.public_key());
        signing.extend_from_slice(&timestamp.to_le_bytes());
        signing.extend_from_slice(&app_data);
        let signature = self.identity.sign(&signing);

        let advert = Advert::new(self.identity.public_key(), timestamp, signature, &app_data)?;
        let mut payload = [0u8; MAX_PACKET_PAYLOAD];
        let len = advert.encode(&mut payload)?;

        let mut packet = Packet::flood(PayloadType::Advert, &payload[..len])?;
        packet.payload_version = ADVERT_VERSION;
        packet.add_to_path(self.identity.path_hash())?;

        self.transmit(&packet)?;
        self.last_advert = Some(self.env.now());
        Ok(())
    }

    /// Encrypt and broadcast a text message on a joined channel, and
    /// record it locally as an outgoing message.
    pub fn send_group_text(&mut self, channel_name: &str, text: &str) -> Result<()> {
        let channel = self
            .channels
            .by_name(channel_name)
            .ok_or_else(|| MeshError::UnknownChannel(channel_name.to_owned()))?
            .clone();

        let timestamp = self.env.unix_time_secs();
        let plaintext = crypto::build_plaintext(timestamp, 0, self.identity.name(), text);
        let sealed = crypto::encrypt(&channel.key, &plaintext);
        let payload = GroupPayload::assemble(channel.hash, &sealed);

        let mut packet = Packet::flood(PayloadType::GrpTxt, &payload)?;
        packet.add_to_path(self.identity.path_hash())?;
        self.transmit(&packet)?;

        // Seed the dedup window so relayed echoes of our own message are
        // not surfaced as incoming.
        let now = self.env.now();
        self.recent_group.push_back((channel.hash, text.to_owned(), now));

        self.push_message(GroupMessageRecord {
            channel_name: channel.name,
            channel_hash: channel.hash,
            sender: Some(self.identity.name().to_owned()),
            text: text.to_owned(),
            timestamp,
            verified: true,
            is_read: true,
            outgoing: true,
        });
        Ok(())
    }

    /// Broadcast a pre-sealed group payload under an explicit channel
    /// hash. The script layer uses this for custom group traffic.
    pub fn send_group_packet(&mut self, channel_hash: u8, sealed: &[u8]) -> Result<()> {
        let payload = GroupPayload::assemble(channel_hash, sealed);
        let mut packet = Packet::flood(PayloadType::GrpData, &payload)?;
        packet.add_to_path(self.identity.path_hash())?;
        self.transmit(&packet)
    }

    fn transmit(&mut self, packet: &Packet) -> Result<()> {
        let mut wire = [0u8; Packet::MAX_SIZE];
        let len = packet.encode(&mut wire)?;
        match self.radio.queue_send(&wire[..len]) {
            SendStatus::Queued => {
                self.tx += 1;
                Ok(())
            },
            SendStatus::Backpressured => Err(MeshError::Backpressured),
            SendStatus::Fatal => Err(MeshError::RadioFatal),
        }
    }

    // Configuration and introspection

    /// Set the periodic ADVERT interval; zero disables.
    pub fn set_announce_interval(&mut self, interval: Duration) {
        self.advert_interval = interval;
    }

    /// Enable or disable flood duplicate checking.
    pub fn set_path_check(&mut self, enabled: bool) {
        self.router.set_path_check(enabled);
    }

    /// Reconfigure the rebroadcast delay window.
    pub fn set_rebroadcast_window(&mut self, min: Duration, max: Duration) {
        self.router.set_delay_window(min, max);
    }

    /// Install the raw packet hook; returns the previous one.
    pub fn set_on_packet(&mut self, hook: PacketHook<E::Instant>) -> Option<PacketHook<E::Instant>> {
        self.hooks.on_packet.replace(hook)
    }

    /// Install the node hook; returns the previous one.
    pub fn set_on_node(&mut self, hook: NodeHook<E::Instant>) -> Option<NodeHook<E::Instant>> {
        self.hooks.on_node.replace(hook)
    }

    /// Install the group hook; returns the previous one. While installed,
    /// built-in trial decryption is bypassed.
    pub fn set_on_group(&mut self, hook: GroupHook<E::Instant>) -> Option<GroupHook<E::Instant>> {
        self.hooks.on_group.replace(hook)
    }

    /// Install the direct-message hook; returns the previous one.
    pub fn set_on_direct(&mut self, hook: DirectHook<E::Instant>) -> Option<DirectHook<E::Instant>> {
        self.hooks.on_direct.replace(hook)
    }

    /// Drain the decoded message log.
    pub fn take_messages(&mut self) -> Vec<GroupMessageRecord> {
        self.messages.drain(..).collect()
    }

    /// Evict every node not heard from within `max_age`. Returns how
    /// many were dropped.
    pub fn purge_stale_nodes(&mut self, max_age: Duration) -> usize {
        self.nodes.purge_older_than(self.env.now(), max_age)
    }

    /// The node identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Mutable identity access (rename, reset).
    pub fn identity_mut(&mut self) -> &mut Identity {
        &mut self.identity
    }

    /// The neighbor table.
    #[must_use]
    pub fn nodes(&self) -> &NodeTable<E::Instant> {
        &self.nodes
    }

    /// The joined channels.
    #[must_use]
    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    /// Mutable channel table access (join/leave).
    pub fn channels_mut(&mut self) -> &mut ChannelTable {
        &mut self.channels
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> MeshStats {
        MeshStats {
            tx: self.tx,
            rx: self.rx,
            malformed: self.malformed,
            group_deduped: self.group_deduped,
            router: self.router.stats(),
            identity_persisted: self.identity.is_persisted(),
        }
    }
}
