//! Shared deterministic environment for unit tests.

use std::sync::{Arc, Mutex};

use rand::{RngCore as _, SeedableRng as _};
use rand_chacha::ChaCha8Rng;

use crate::env::{Environment, TickInstant};

/// Seeded environment with a hand-stepped millisecond clock.
#[derive(Clone)]
pub(crate) struct TestEnv {
    clock: Arc<Mutex<u64>>,
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl TestEnv {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            clock: Arc::new(Mutex::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    pub(crate) fn advance(&self, millis: u64) {
        *self.clock.lock().unwrap() += millis;
    }
}

impl Environment for TestEnv {
    type Instant = TickInstant;

    fn now(&self) -> TickInstant {
        TickInstant::from_millis(*self.clock.lock().unwrap())
    }

    fn unix_time_secs(&self) -> u32 {
        1_700_000_000 + (*self.clock.lock().unwrap() / 1000) as u32
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}
