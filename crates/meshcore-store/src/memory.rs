//! In-memory store for tests and simulation.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{KvStore, Result, StoreError, encode_key};

/// In-memory `KvStore` implementation.
///
/// A `HashMap` behind `Arc<Mutex<_>>` so clones share state, mirroring the
/// durable backend's semantics. A poisoned mutex surfaces as an I/O error
/// rather than a panic; acceptable for the test paths this backend serves.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_map<T>(
        &self,
        f: impl FnOnce(&mut HashMap<Vec<u8>, Vec<u8>>) -> T,
    ) -> Result<T> {
        let mut map = self.inner.lock().map_err(|_| StoreError::Io("lock poisoned".into()))?;
        Ok(f(&mut map))
    }
}

impl KvStore for MemoryStore {
    fn get_bytes(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let composite = encode_key(namespace, key)?;
        self.with_map(|map| map.get(&composite).cloned())
    }

    fn put_bytes(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()> {
        let composite = encode_key(namespace, key)?;
        self.with_map(|map| {
            map.insert(composite, value.to_vec());
        })
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        let composite = encode_key(namespace, key)?;
        self.with_map(|map| {
            map.remove(&composite);
        })
    }

    fn clear(&self, namespace: &str) -> Result<()> {
        let prefix = crate::encode_prefix(namespace)?;
        self.with_map(|map| {
            map.retain(|key, _| !key.starts_with(&prefix));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_round_trip() {
        let store = MemoryStore::new();
        store.put_bytes("identity", "privkey", &[1, 2, 3]).unwrap();
        assert_eq!(store.get_bytes("identity", "privkey").unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn missing_key_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get_bytes("identity", "absent").unwrap(), None);
    }

    #[test]
    fn clones_share_state() {
        let store = MemoryStore::new();
        let alias = store.clone();
        store.put_string("settings", "region", "EU868").unwrap();
        assert_eq!(alias.get_string("settings", "region").unwrap().as_deref(), Some("EU868"));
    }

    #[test]
    fn clear_is_namespace_scoped() {
        let store = MemoryStore::new();
        store.put_u32("settings", "ttl", 3).unwrap();
        store.put_u32("channels", "count", 1).unwrap();

        store.clear("settings").unwrap();
        assert_eq!(store.get_u32("settings", "ttl").unwrap(), None);
        assert_eq!(store.get_u32("channels", "count").unwrap(), Some(1));
    }

    #[test]
    fn typed_accessors_treat_corrupt_as_missing() {
        let store = MemoryStore::new();

        store.put_bytes("settings", "ttl", &[1, 2]).unwrap();
        assert_eq!(store.get_u32("settings", "ttl").unwrap(), None);

        store.put_bytes("settings", "dark", &[7]).unwrap();
        assert_eq!(store.get_bool("settings", "dark").unwrap(), None);

        store.put_bytes("settings", "name", &[0xFF, 0xFE]).unwrap();
        assert_eq!(store.get_string("settings", "name").unwrap(), None);
    }

    #[test]
    fn bool_round_trip() {
        let store = MemoryStore::new();
        store.put_bool("settings", "dark", true).unwrap();
        assert_eq!(store.get_bool("settings", "dark").unwrap(), Some(true));
    }

    #[test]
    fn put_many_writes_all() {
        let store = MemoryStore::new();
        store
            .put_many("identity", &[("privkey", &[1u8; 32][..]), ("pubkey", &[2u8; 32][..])])
            .unwrap();
        assert_eq!(store.get_bytes("identity", "privkey").unwrap(), Some(vec![1u8; 32]));
        assert_eq!(store.get_bytes("identity", "pubkey").unwrap(), Some(vec![2u8; 32]));
    }
}
