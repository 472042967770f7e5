//! A cluster of engines on shared simulated airwaves.

use std::time::Duration;

use meshcore_core::{ChannelTable, Identity, MeshEngine};
use meshcore_store::MemoryStore;

use crate::{SimAirwaves, SimEnvironment, SimRadio};

/// Virtual time per simulation tick; every node updates once per tick.
const TICK: Duration = Duration::from_millis(10);

/// A simulated mesh of engines sharing one clock and one medium.
pub struct Cluster {
    /// The shared environment; advance time through [`Cluster::run`].
    pub env: SimEnvironment,
    airwaves: SimAirwaves,
    nodes: Vec<MeshEngine<SimRadio, SimEnvironment>>,
}

impl Cluster {
    /// Spin up `count` nodes with fresh identities, fully connected.
    ///
    /// Deterministic for a given `(seed, count)`: identities come from
    /// the seeded environment in attach order.
    #[must_use]
    pub fn new(seed: u64, count: usize) -> Self {
        let env = SimEnvironment::new(seed);
        let airwaves = SimAirwaves::new(env.clone());

        let nodes = (0..count)
            .map(|index| {
                let store = MemoryStore::new();
                let Ok(identity) = Identity::load_or_generate(&store, &env) else {
                    unreachable!("memory store cannot fail identity generation");
                };
                tracing::debug!(index, id = %identity.short_id(), "sim node up");
                MeshEngine::new(env.clone(), airwaves.attach(), identity, ChannelTable::new())
            })
            .collect();

        Self { env, airwaves, nodes }
    }

    /// One node, mutably.
    pub fn node(&mut self, index: usize) -> &mut MeshEngine<SimRadio, SimEnvironment> {
        &mut self.nodes[index]
    }

    /// One node, shared.
    #[must_use]
    pub fn node_ref(&self, index: usize) -> &MeshEngine<SimRadio, SimEnvironment> {
        &self.nodes[index]
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the cluster has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Connect or cut the link between two nodes.
    pub fn set_link(&mut self, a: usize, b: usize, connected: bool) {
        self.airwaves.set_link(a, b, connected);
    }

    /// Arrange the nodes in a line: only neighbors hear each other.
    pub fn make_line(&mut self) {
        for a in 0..self.nodes.len() {
            for b in a + 1..self.nodes.len() {
                self.set_link(a, b, b - a == 1);
            }
        }
    }

    /// Run the mesh for a stretch of virtual time, updating every node
    /// each 10 ms tick.
    pub fn run(&mut self, duration: Duration) {
        let ticks = (duration.as_millis() as u64).div_ceil(TICK.as_millis() as u64);
        for _ in 0..ticks {
            self.env.advance(TICK);
            for node in &mut self.nodes {
                node.update();
            }
        }
    }
}
