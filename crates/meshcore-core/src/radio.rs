//! Radio transport facade.
//!
//! The engine talks to the physical modem through the narrow [`Radio`]
//! port: poll for a frame, queue a frame, pump the TX queue. The hardware
//! driver behind it owns duty-cycle pacing and bus serialization; the
//! contract here is only that at most one transmission is in flight and
//! that queued frames leave in FIFO order.
//!
//! [`MemoryRadio`] is the in-process implementation used by tests and the
//! simulation harness: every radio attached to the same [`MemoryHub`]
//! hears every other radio's transmissions, like a single shared channel
//! with no loss.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::env::Environment;

/// Default RSSI stamped on simulated receptions.
const SIM_RSSI_DBM: i16 = -62;

/// Default SNR stamped on simulated receptions.
const SIM_SNR_DB: f32 = 8.5;

/// Default TX queue depth for the in-memory radio.
const SIM_TX_QUEUE: usize = 8;

/// Outcome of queueing a frame for transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Accepted; will transmit in FIFO order.
    Queued,
    /// TX queue full; retry next tick.
    Backpressured,
    /// The transport is gone (hardware fault). Do not retry.
    Fatal,
}

/// Reception metadata attached to every incoming frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RxMetadata<I> {
    /// Received signal strength in dBm.
    pub rssi_dbm: i16,
    /// Signal-to-noise ratio in dB.
    pub snr_db: f32,
    /// Monotonic receive time.
    pub timestamp: I,
}

/// Narrow port around the physical (or simulated) modem.
pub trait Radio {
    /// Clock type stamped on RX metadata; matches the engine environment.
    type Instant: Copy;

    /// Whether a received frame is waiting.
    fn available(&self) -> bool;

    /// Pop one received frame into `buf`. Returns the frame length and
    /// metadata, or `None` when nothing is pending (or the frame exceeds
    /// `buf`, which can only mean corruption; such frames are dropped).
    fn receive(&mut self, buf: &mut [u8]) -> Option<(usize, RxMetadata<Self::Instant>)>;

    /// Queue a frame for transmission.
    fn queue_send(&mut self, frame: &[u8]) -> SendStatus;

    /// Pump the TX queue: transmit at most one frame, respecting the
    /// regulatory duty cycle. Called once per engine tick.
    fn process_queue(&mut self);
}

struct HubState<I> {
    inboxes: Vec<VecDeque<(Vec<u8>, RxMetadata<I>)>>,
}

/// Shared airwave connecting [`MemoryRadio`] instances.
pub struct MemoryHub<E: Environment> {
    env: E,
    state: Arc<Mutex<HubState<E::Instant>>>,
}

impl<E: Environment> MemoryHub<E> {
    /// Create an empty airwave.
    #[must_use]
    pub fn new(env: E) -> Self {
        Self { env, state: Arc::new(Mutex::new(HubState { inboxes: Vec::new() })) }
    }

    /// Attach a new radio to the airwave.
    pub fn attach(&self) -> MemoryRadio<E> {
        let index = {
            let Ok(mut state) = self.state.lock() else {
                unreachable!("airwave lock poisoned");
            };
            state.inboxes.push(VecDeque::new());
            state.inboxes.len() - 1
        };
        MemoryRadio {
            env: self.env.clone(),
            state: Arc::clone(&self.state),
            index,
            tx_queue: VecDeque::new(),
            capacity: SIM_TX_QUEUE,
        }
    }
}

/// In-process radio for tests and simulation.
pub struct MemoryRadio<E: Environment> {
    env: E,
    state: Arc<Mutex<HubState<E::Instant>>>,
    index: usize,
    tx_queue: VecDeque<Vec<u8>>,
    capacity: usize,
}

impl<E: Environment> Radio for MemoryRadio<E> {
    type Instant = E::Instant;

    fn available(&self) -> bool {
        self.state
            .lock()
            .map(|state| !state.inboxes[self.index].is_empty())
            .unwrap_or(false)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Option<(usize, RxMetadata<Self::Instant>)> {
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
        if self.tx_queue.len() >= self.capacity {
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
        for (index, inbox) in state.inboxes.iter_mut().enumerate() {
            if index != own {
                inbox.push_back((frame.clone(), meta));
            }
        }
    }
}
