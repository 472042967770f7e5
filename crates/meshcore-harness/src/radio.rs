//! Simulated airwaves with an explicit link topology.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use meshcore_core::{Environment as _, Radio, RxMetadata, SendStatus, TickInstant};

use crate::SimEnvironment;

/// RSSI stamped on simulated receptions.
const SIM_RSSI_DBM: i16 = -74;

/// SNR stamped on simulated receptions.
const SIM_SNR_DB: f32 = 6.75;

/// TX queue depth per simulated radio.
const SIM_TX_QUEUE: usize = 8;

struct AirState {
    inboxes: Vec<VecDeque<(Vec<u8>, RxMetadata<TickInstant>)>>,
    /// `links[a][b]`: whether `b` hears `a`. Symmetric in practice but
    /// stored directionally so tests can model asymmetric links.
    links: Vec<Vec<bool>>,
}

/// The shared medium radios attach to. Fully connected by default.
#[derive(Clone)]
pub struct SimAirwaves {
    env: SimEnvironment,
    state: Arc<Mutex<AirState>>,
}

impl SimAirwaves {
    /// Create an empty medium.
    #[must_use]
    pub fn new(env: SimEnvironment) -> Self {
        Self {
            env,
            state: Arc::new(Mutex::new(AirState { inboxes: Vec::new(), links: Vec::new() })),
        }
    }

    /// Attach a radio, linked to every existing radio.
    pub fn attach(&self) -> SimRadio {
        let Ok(mut state) = self.state.lock() else {
            unreachable!("airwaves lock poisoned");
        };
        let index = state.inboxes.len();
        state.inboxes.push(VecDeque::new());
        for row in &mut state.links {
            row.push(true);
        }
        state.links.push(vec![true; index + 1]);
        SimRadio {
            env: self.env.clone(),
            state: Arc::clone(&self.state),
            index,
            tx_queue: VecDeque::new(),
        }
    }

    /// Connect or cut the (symmetric) link between two radios.
    pub fn set_link(&self, a: usize, b: usize, connected: bool) {
        let Ok(mut state) = self.state.lock() else {
            unreachable!("airwaves lock poisoned");
        };
        state.links[a][b] = connected;
        state.links[b][a] = connected;
    }
}

/// One node's radio on the simulated medium.
pub struct SimRadio {
    env: SimEnvironment,
    state: Arc<Mutex<AirState>>,
    index: usize,
    tx_queue: VecDeque<Vec<u8>>,
}

impl Radio for SimRadio {
    type Instant = TickInstant;

    fn available(&self) -> bool {
        self.state
            .lock()
            .map(|state| !state.inboxes[self.index].is_empty())
            .unwrap_or(false)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Option<(usize, RxMetadata<TickInstant>)> {
        let Ok(mut state) = self.state.lock() else {
            return None;
        };
        let (frame, meta) = state.inboxes[self.index].pop_front()?;
        if frame.len() > buf.len() {
            return None;
        }
        buf[..frame.len()].copy_from_slice(&frame);
        Some((frame.len(), meta))
    }

    fn queue_send(&mut self, frame: &[u8]) -> SendStatus {
        if self.tx_queue.len() >= SIM_TX_QUEUE {
            return SendStatus::Backpressured;
        }
        self.tx_queue.push_back(frame.to_vec());
        SendStatus::Queued
    }

    fn process_queue(&mut self) {
        let Some(frame) = self.tx_queue.pop_front() else {
            return;
        };
        let meta = RxMetadata {
            rssi_dbm: SIM_RSSI_DBM,
            snr_db: SIM_SNR_DB,
            timestamp: self.env.now(),
        };
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let own = self.index;
        for target in 0..state.inboxes.len() {
            if target != own && state.links[own][target] {
                state.inboxes[target].push_back((frame.clone(), meta));
            }
        }
    }
}
