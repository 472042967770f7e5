//! Script-facing API.
//!
//! The thin contract the UI scripting layer programs against. One
//! [`ScriptApi`] owns the engine, the settings store, the async worker
//! handle, and the event bus; scripts call into it, and it calls back
//! only through the hook slots and registered continuations. The API
//! refers to engine internals by value (snapshots, names, tokens), never
//! by holding references into them, so the script layer cannot create
//! reference cycles with the engine.
//!
//! [`ScriptApi::tick`] is the single pump: bus delivery first (so
//! handlers observe last tick's world), then the engine tick, then
//! worker results resuming their continuations.

use std::{collections::HashMap, time::Duration};

use thiserror::Error;

use meshcore_core::{
    ChannelTable, DirectHook, Environment, GroupHook, GroupMessageRecord, Identity, MeshEngine,
    MeshError, MeshStats, NodeHook, PacketHook, Radio, Result as MeshResult,
};
use meshcore_store::KvStore;
use meshcore_worker::{
    Request, SubmitError, Token, Worker, WorkerConfig, WorkerError, WorkerResult,
};

use crate::bus::{BusHandler, EventBus, SubscriptionId};

/// Store namespace for script-visible preferences.
pub const SETTINGS_NAMESPACE: &str = "settings";

/// Continuation resumed when its async result arrives.
pub type Continuation = Box<dyn FnOnce(WorkerResult)>;

/// Failures bringing the application layer up.
#[derive(Error, Debug)]
pub enum BootError {
    /// Identity or channel state could not be read.
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// The worker thread could not be spawned.
    #[error("worker spawn failed: {0}")]
    Worker(#[from] WorkerError),
}

/// The surface exposed to the UI scripting layer.
pub struct ScriptApi<R, E, S>
where
    E: Environment,
    R: Radio<Instant = E::Instant>,
    S: KvStore,
{
    engine: MeshEngine<R, E>,
    store: S,
    worker: Worker,
    bus: EventBus,
    continuations: HashMap<Token, Continuation>,
}

impl<R, E, S> ScriptApi<R, E, S>
where
    E: Environment,
    R: Radio<Instant = E::Instant>,
    S: KvStore,
{
    /// Assemble the API over its collaborators.
    pub fn new(engine: MeshEngine<R, E>, store: S, worker: Worker) -> Self {
        Self {
            engine,
            store,
            worker,
            bus: EventBus::new(),
            continuations: HashMap::new(),
        }
    }

    /// Bring the whole application layer up: load (or mint) the
    /// identity, load the joined channels, spawn the worker.
    ///
    /// Shutdown is `Drop`: dropping the API joins the worker thread;
    /// engine and store state is already durable.
    ///
    /// # Errors
    ///
    /// `BootError` when the store cannot be read or the worker thread
    /// cannot start. An unpersistable identity is NOT an error here;
    /// the node comes up degraded and reports it via
    /// [`ScriptApi::is_initialized`].
    pub fn boot(
        env: E,
        radio: R,
        store: S,
        worker_config: WorkerConfig,
    ) -> Result<Self, BootError> {
        let identity = Identity::load_or_generate(&store, &env)?;
        let channels = ChannelTable::load(&store)?;
        let engine = MeshEngine::new(env, radio, identity, channels);
        let worker = Worker::spawn(worker_config)?;
        Ok(Self::new(engine, store, worker))
    }

    /// One main-loop tick: bus, engine, worker results.
    pub fn tick(&mut self) {
        self.bus.dispatch();
        self.engine.update();
        self.pump_worker();
    }

    fn pump_worker(&mut self) {
        while let Some(result) = self.worker.poll_result() {
            match self.continuations.remove(&result.token) {
                Some(continuation) => continuation(result),
                None => {
                    tracing::debug!(
                        token = result.token.value(),
                        "result without continuation dropped"
                    );
                },
            }
        }
    }

    // mesh.*

    /// Broadcast a signed self-ADVERT now.
    pub fn send_advert(&mut self) -> MeshResult<()> {
        self.engine.send_advert()
    }

    /// Send a text message on a joined channel.
    pub fn send_group_text(&mut self, channel_name: &str, text: &str) -> MeshResult<()> {
        self.engine.send_group_text(channel_name, text)
    }

    /// Broadcast pre-sealed group bytes under an explicit channel hash.
    pub fn send_group_packet(&mut self, channel_hash: u8, sealed: &[u8]) -> MeshResult<()> {
        self.engine.send_group_packet(channel_hash, sealed)
    }

    /// Set the periodic ADVERT interval in milliseconds; 0 disables.
    pub fn set_announce_interval(&mut self, millis: u32) {
        self.engine.set_announce_interval(Duration::from_millis(u64::from(millis)));
    }

    /// Enable or disable flood duplicate checking.
    pub fn set_path_check(&mut self, enabled: bool) {
        self.engine.set_path_check(enabled);
    }

    /// Whether the mesh is up with a durably stored identity.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.engine.identity().is_persisted()
    }

    /// Six-hex-digit short identifier of this node.
    #[must_use]
    pub fn get_short_id(&self) -> String {
        self.engine.identity().short_id()
    }

    /// Rename this node (persisted, used in future ADVERTs).
    pub fn set_node_name(&mut self, name: &str) -> MeshResult<()> {
        let store = self.store.clone();
        self.engine.identity_mut().set_name(&store, name)
    }

    /// Drain group messages decoded since the last call.
    pub fn take_messages(&mut self) -> Vec<GroupMessageRecord> {
        self.engine.take_messages()
    }

    /// Counter snapshot for status screens.
    #[must_use]
    pub fn stats(&self) -> MeshStats {
        self.engine.stats()
    }

    /// Install the raw packet hook (at most one; returns the previous).
    pub fn on_packet(&mut self, hook: PacketHook<E::Instant>) -> Option<PacketHook<E::Instant>> {
        self.engine.set_on_packet(hook)
    }

    /// Install the group payload hook (at most one; returns the
    /// previous). Replaces built-in decryption while installed.
    pub fn on_group_packet(&mut self, hook: GroupHook<E::Instant>) -> Option<GroupHook<E::Instant>> {
        self.engine.set_on_group(hook)
    }

    /// Install the node hook (at most one; returns the previous).
    pub fn on_node(&mut self, hook: NodeHook<E::Instant>) -> Option<NodeHook<E::Instant>> {
        self.engine.set_on_node(hook)
    }

    /// Install the direct-message hook (at most one; returns the
    /// previous).
    pub fn on_direct_message(
        &mut self,
        hook: DirectHook<E::Instant>,
    ) -> Option<DirectHook<E::Instant>> {
        self.engine.set_on_direct(hook)
    }

    /// Direct engine access for screens that need more than the thin
    /// surface (channel management, node listing).
    pub fn engine_mut(&mut self) -> &mut MeshEngine<R, E> {
        &mut self.engine
    }

    // storage.*

    /// Read a string preference with a default.
    pub fn get_pref(&self, key: &str, default: &str) -> String {
        self.store
            .get_string(SETTINGS_NAMESPACE, key)
            .ok()
            .flatten()
            .unwrap_or_else(|| default.to_owned())
    }

    /// Write a string preference.
    pub fn set_pref(&self, key: &str, value: &str) -> MeshResult<()> {
        Ok(self.store.put_string(SETTINGS_NAMESPACE, key, value)?)
    }

    /// Read an integer preference with a default.
    pub fn get_pref_u32(&self, key: &str, default: u32) -> u32 {
        self.store.get_u32(SETTINGS_NAMESPACE, key).ok().flatten().unwrap_or(default)
    }

    /// Write an integer preference.
    pub fn set_pref_u32(&self, key: &str, value: u32) -> MeshResult<()> {
        Ok(self.store.put_u32(SETTINGS_NAMESPACE, key, value)?)
    }

    /// Read a boolean preference with a default.
    pub fn get_pref_bool(&self, key: &str, default: bool) -> bool {
        self.store.get_bool(SETTINGS_NAMESPACE, key).ok().flatten().unwrap_or(default)
    }

    /// Write a boolean preference.
    pub fn set_pref_bool(&self, key: &str, value: bool) -> MeshResult<()> {
        Ok(self.store.put_bool(SETTINGS_NAMESPACE, key, value)?)
    }

    // async worker (crypto.* and file I/O)

    /// Submit an async operation; the continuation runs on a later tick
    /// with the matching result.
    ///
    /// # Errors
    ///
    /// `SubmitError::Backpressured` when the request queue is full; the
    /// script retries next tick.
    pub fn submit_async(
        &mut self,
        request: Request,
        continuation: Continuation,
    ) -> Result<Token, SubmitError> {
        let token = self.worker.submit(request)?;
        self.continuations.insert(token, continuation);
        Ok(token)
    }

    /// Abandon a pending operation: its result is drained and dropped
    /// instead of resuming anything.
    pub fn cancel_async(&mut self, token: Token) {
        if self.continuations.remove(&token).is_some() {
            self.worker.retire(token);
        }
    }

    // bus

    /// Subscribe a handler to a topic.
    pub fn subscribe(&mut self, topic: &str, handler: BusHandler) -> SubscriptionId {
        self.bus.subscribe(topic, handler)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Queue a message for delivery at the start of the next tick.
    pub fn post(&mut self, topic: &str, payload: &[u8]) {
        self.bus.post(topic, payload);
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use meshcore_core::{
        ChannelTable, Identity, MemoryHub, MemoryRadio, SystemEnv,
    };
    use meshcore_store::MemoryStore;
    use meshcore_worker::{Output, WorkerConfig};

    use super::*;

    fn scratch_api(
        name: &str,
    ) -> ScriptApi<MemoryRadio<SystemEnv>, SystemEnv, MemoryStore> {
        let env = SystemEnv::new();
        let store = MemoryStore::new();
        let hub = MemoryHub::new(env);
        let identity = Identity::load_or_generate(&store, &env).unwrap();
        let engine = MeshEngine::new(env, hub.attach(), identity, ChannelTable::new());

        let base =
            std::env::temp_dir().join(format!("meshcore-api-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&base).unwrap();
        let worker = Worker::spawn(WorkerConfig {
            internal_root: base.clone(),
            sd_root: base.join("sd"),
        })
        .unwrap();

        ScriptApi::new(engine, store, worker)
    }

    #[test]
    fn prefs_round_trip_with_defaults() {
        let api = scratch_api("prefs");

        assert_eq!(api.get_pref("region", "EU868"), "EU868");
        api.set_pref("region", "US915").unwrap();
        assert_eq!(api.get_pref("region", "EU868"), "US915");

        assert_eq!(api.get_pref_u32("tx_power", 17), 17);
        api.set_pref_u32("tx_power", 22).unwrap();
        assert_eq!(api.get_pref_u32("tx_power", 17), 22);

        assert!(!api.get_pref_bool("dark", false));
        api.set_pref_bool("dark", true).unwrap();
        assert!(api.get_pref_bool("dark", false));
    }

    #[test]
    fn short_id_matches_identity() {
        let api = scratch_api("shortid");
        assert_eq!(api.get_short_id().len(), 6);
        assert!(api.is_initialized());
    }

    #[test]
    fn async_continuation_resumes_on_tick() {
        let mut api = scratch_api("continuation");

        let landed = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&landed);
        api.submit_async(
            Request::AesEncrypt { key: [7u8; 16], data: b"x".to_vec() },
            Box::new(move |result| {
                *slot.borrow_mut() = Some(result.outcome);
            }),
        )
        .unwrap();

        for _ in 0..2000 {
            api.tick();
            if landed.borrow().is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        match landed.borrow_mut().take() {
            Some(Ok(Output::Bytes(ciphertext))) => assert_eq!(ciphertext.len(), 16),
            other => unreachable!("continuation did not land: {other:?}"),
        }
    }

    #[test]
    fn cancelled_continuation_never_runs() {
        let mut api = scratch_api("cancel");

        let landed = Rc::new(RefCell::new(false));
        let slot = Rc::clone(&landed);
        let token = api
            .submit_async(
                Request::AesEncrypt { key: [7u8; 16], data: b"x".to_vec() },
                Box::new(move |_| *slot.borrow_mut() = true),
            )
            .unwrap();
        api.cancel_async(token);

        for _ in 0..50 {
            api.tick();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!*landed.borrow());
    }

    #[test]
    fn bus_delivery_happens_on_tick() {
        let mut api = scratch_api("bus");

        let hits = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&hits);
        api.subscribe("battery", Box::new(move |_, _| *counter.borrow_mut() += 1));

        api.post("battery", b"87");
        assert_eq!(*hits.borrow(), 0);

        api.tick();
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn set_node_name_flows_to_engine() {
        let mut api = scratch_api("rename");
        api.set_node_name("Basecamp").unwrap();
        assert_eq!(api.engine_mut().identity().name(), "Basecamp");
    }

    #[test]
    fn boot_brings_up_identity_and_channels() {
        let env = SystemEnv::new();
        let store = MemoryStore::new();
        let hub = MemoryHub::new(env);

        let base =
            std::env::temp_dir().join(format!("meshcore-api-boot-{}", std::process::id()));
        std::fs::create_dir_all(&base).unwrap();
        let config = WorkerConfig { internal_root: base.clone(), sd_root: base.join("sd") };

        let api = ScriptApi::boot(env, hub.attach(), store.clone(), config.clone()).unwrap();
        assert!(api.is_initialized());
        let first_id = api.get_short_id();
        drop(api);

        // Same store, same identity.
        let api = ScriptApi::boot(env, hub.attach(), store, config).unwrap();
        assert_eq!(api.get_short_id(), first_id);
    }
}
