//! Typed device settings over the `settings` namespace.
//!
//! The raw preference store is stringly-typed by design (scripts can
//! invent keys); the handful of settings the firmware itself consults
//! get typed accessors here so defaults and ranges live in one place.
//! Corrupt values fall back to defaults, per the store contract.

use meshcore_store::KvStore;

use crate::api::SETTINGS_NAMESPACE;

/// Default screen brightness, percent.
pub const DEFAULT_BRIGHTNESS: u32 = 80;

/// Default LoRa region table index.
pub const DEFAULT_REGION_INDEX: u32 = 0;

/// Default transmit power in dBm.
pub const DEFAULT_TX_POWER_DBM: u32 = 17;

/// Default packet time-to-live (maximum flood hops honored locally).
pub const DEFAULT_TTL: u32 = 8;

const KEY_BRIGHTNESS: &str = "brightness";
const KEY_REGION_INDEX: &str = "region_index";
const KEY_TX_POWER: &str = "tx_power_dbm";
const KEY_TTL: &str = "ttl";

/// Typed view over the firmware's own settings.
#[derive(Clone)]
pub struct DeviceSettings<S: KvStore> {
    store: S,
}

impl<S: KvStore> DeviceSettings<S> {
    /// Wrap a store handle.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Screen brightness, percent (0-100).
    #[must_use]
    pub fn brightness(&self) -> u32 {
        self.read(KEY_BRIGHTNESS, DEFAULT_BRIGHTNESS).min(100)
    }

    /// Set screen brightness; values over 100 are clamped.
    pub fn set_brightness(&self, percent: u32) -> meshcore_store::Result<()> {
        self.store.put_u32(SETTINGS_NAMESPACE, KEY_BRIGHTNESS, percent.min(100))
    }

    /// LoRa region table index.
    #[must_use]
    pub fn region_index(&self) -> u32 {
        self.read(KEY_REGION_INDEX, DEFAULT_REGION_INDEX)
    }

    /// Set the LoRa region table index.
    pub fn set_region_index(&self, index: u32) -> meshcore_store::Result<()> {
        self.store.put_u32(SETTINGS_NAMESPACE, KEY_REGION_INDEX, index)
    }

    /// Transmit power in dBm.
    #[must_use]
    pub fn tx_power_dbm(&self) -> u32 {
        self.read(KEY_TX_POWER, DEFAULT_TX_POWER_DBM)
    }

    /// Set transmit power in dBm.
    pub fn set_tx_power_dbm(&self, dbm: u32) -> meshcore_store::Result<()> {
        self.store.put_u32(SETTINGS_NAMESPACE, KEY_TX_POWER, dbm)
    }

    /// Flood time-to-live in hops.
    #[must_use]
    pub fn ttl(&self) -> u32 {
        self.read(KEY_TTL, DEFAULT_TTL)
    }

    /// Set flood time-to-live in hops.
    pub fn set_ttl(&self, hops: u32) -> meshcore_store::Result<()> {
        self.store.put_u32(SETTINGS_NAMESPACE, KEY_TTL, hops)
    }

    fn read(&self, key: &str, default: u32) -> u32 {
        self.store.get_u32(SETTINGS_NAMESPACE, key).ok().flatten().unwrap_or(default)
    }
}
