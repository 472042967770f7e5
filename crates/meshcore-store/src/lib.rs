//! Namespaced durable key-value storage.
//!
//! The identity blob, joined channels, and user settings all persist
//! through one small trait: byte values under `(namespace, key)` pairs,
//! with typed helpers layered on top. Writes are atomic per key (and per
//! batch via [`KvStore::put_many`]), so a power cut mid-write yields
//! either the old or the new value, never a torn one.
//!
//! Two backends: [`RedbStore`] for the device filesystem and
//! [`MemoryStore`] for tests and simulation. Implementations share state
//! across clones, so the store can be handed to several subsystems.
//!
//! # Invariants
//!
//! - A value that reads back with the wrong width or encoding for the
//!   typed accessor behaves as missing (`Ok(None)`), never as an error.
//! - `clear` removes exactly one namespace; others are untouched.

mod error;
mod memory;
mod redb_store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use redb_store::RedbStore;

/// Maximum combined namespace + key length accepted by backends.
pub const MAX_KEY_LEN: usize = 96;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Namespaced key-value storage.
///
/// Must be `Clone` (handed to identity, channels, and the script API) and
/// `Send + Sync` (the worker never touches it, but handles cross thread
/// boundaries at shutdown). All methods are synchronous: callers run on
/// the main tick loop and the backends are fast local writes.
pub trait KvStore: Clone + Send + Sync + 'static {
    /// Read raw bytes. `Ok(None)` when absent.
    fn get_bytes(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write raw bytes, atomically replacing any previous value.
    fn put_bytes(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()>;

    /// Remove one key. Removing an absent key is not an error.
    fn remove(&self, namespace: &str, key: &str) -> Result<()>;

    /// Remove every key in a namespace.
    fn clear(&self, namespace: &str) -> Result<()>;

    /// Write several keys in one atomic batch where the backend supports
    /// it. The default writes them one by one.
    fn put_many(&self, namespace: &str, entries: &[(&str, &[u8])]) -> Result<()> {
        for (key, value) in entries {
            self.put_bytes(namespace, key, value)?;
        }
        Ok(())
    }

    /// Read a UTF-8 string. Invalid UTF-8 reads as missing.
    fn get_string(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .get_bytes(namespace, key)?
            .and_then(|bytes| String::from_utf8(bytes).ok()))
    }

    /// Write a UTF-8 string.
    fn put_string(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.put_bytes(namespace, key, value.as_bytes())
    }

    /// Read a `u32` stored little-endian. Wrong width reads as missing.
    fn get_u32(&self, namespace: &str, key: &str) -> Result<Option<u32>> {
        Ok(self.get_bytes(namespace, key)?.and_then(|bytes| {
            let word: [u8; 4] = bytes.try_into().ok()?;
            Some(u32::from_le_bytes(word))
        }))
    }

    /// Write a `u32` little-endian.
    fn put_u32(&self, namespace: &str, key: &str, value: u32) -> Result<()> {
        self.put_bytes(namespace, key, &value.to_le_bytes())
    }

    /// Read a bool stored as one byte. Anything but `0`/`1` reads as
    /// missing.
    fn get_bool(&self, namespace: &str, key: &str) -> Result<Option<bool>> {
        Ok(self.get_bytes(namespace, key)?.and_then(|bytes| match bytes.as_slice() {
            [0] => Some(false),
            [1] => Some(true),
            _ => None,
        }))
    }

    /// Write a bool as one byte.
    fn put_bool(&self, namespace: &str, key: &str, value: bool) -> Result<()> {
        self.put_bytes(namespace, key, &[u8::from(value)])
    }
}

/// Composite key layout shared by backends: `[ns_len: 1][ns][key]`.
///
/// The length prefix keeps namespaces from aliasing (`ab`/`c` vs `a`/`bc`)
/// and gives `clear` an exact prefix to match.
pub(crate) fn encode_key(namespace: &str, key: &str) -> Result<Vec<u8>> {
    let total = namespace.len() + key.len();
    if total > MAX_KEY_LEN || namespace.len() > usize::from(u8::MAX) {
        return Err(StoreError::KeyTooLong(total));
    }
    let mut composite = Vec::with_capacity(1 + total);
    composite.push(namespace.len() as u8);
    composite.extend_from_slice(namespace.as_bytes());
    composite.extend_from_slice(key.as_bytes());
    Ok(composite)
}

/// Prefix matching every key of a namespace.
pub(crate) fn encode_prefix(namespace: &str) -> Result<Vec<u8>> {
    encode_key(namespace, "")
}
