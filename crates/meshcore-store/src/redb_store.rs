//! Redb-backed durable storage implementation.
//!
//! One table holds every namespace, keyed by the shared composite layout.
//! Redb's ACID transactions give the per-key (and per-batch) atomicity the
//! identity blob relies on at first boot: either the whole keypair lands
//! or none of it does.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable as _, TableDefinition};

use crate::{KvStore, Result, StoreError, encode_key, encode_prefix};

/// Table: all namespaces.
/// Key: `[ns_len: 1][namespace][key]`
/// Value: raw bytes
const KV: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv");

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a database file at the given path.
    ///
    /// # Errors
    ///
    /// `StoreError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref()).map_err(|e| StoreError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(KV).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl KvStore for RedbStore {
    fn get_bytes(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let composite = encode_key(namespace, key)?;

        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(KV).map_err(|e| StoreError::Io(e.to_string()))?;
        let value = table
            .get(composite.as_slice())
            .map_err(|e| StoreError::Io(e.to_string()))?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    fn put_bytes(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()> {
        self.put_many(namespace, &[(key, value)])
    }

    fn put_many(&self, namespace: &str, entries: &[(&str, &[u8])]) -> Result<()> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(KV).map_err(|e| StoreError::Io(e.to_string()))?;
            for (key, value) in entries {
                let composite = encode_key(namespace, key)?;
                table
                    .insert(composite.as_slice(), *value)
                    .map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))
    }

    fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        let composite = encode_key(namespace, key)?;

        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(KV).map_err(|e| StoreError::Io(e.to_string()))?;
            table.remove(composite.as_slice()).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))
    }

    fn clear(&self, namespace: &str) -> Result<()> {
        let prefix = encode_prefix(namespace)?;

        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table = txn.open_table(KV).map_err(|e| StoreError::Io(e.to_string()))?;

            let doomed: Vec<Vec<u8>> = table
                .iter()
                .map_err(|e| StoreError::Io(e.to_string()))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let key = key.value().to_vec();
                    key.starts_with(&prefix).then_some(key)
                })
                .collect();

            for key in doomed {
                table.remove(key.as_slice()).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store(name: &str) -> (RedbStore, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("meshcore-store-{name}-{}.redb", std::process::id()));
        let _ = std::fs::remove_file(&path);
        (RedbStore::open(&path).unwrap(), path)
    }

    #[test]
    fn values_survive_reopen() {
        let (store, path) = scratch_store("reopen");
        store.put_bytes("identity", "privkey", &[9u8; 32]).unwrap();
        drop(store);

        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.get_bytes("identity", "privkey").unwrap(), Some(vec![9u8; 32]));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn put_many_is_one_batch() {
        let (store, path) = scratch_store("batch");
        store
            .put_many("identity", &[("privkey", &[1u8; 32][..]), ("pubkey", &[2u8; 32][..])])
            .unwrap();
        assert_eq!(store.get_bytes("identity", "pubkey").unwrap(), Some(vec![2u8; 32]));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn clear_scopes_to_namespace() {
        let (store, path) = scratch_store("clear");
        store.put_u32("settings", "ttl", 5).unwrap();
        store.put_string("identity", "nodename", "n1").unwrap();

        store.clear("settings").unwrap();
        assert_eq!(store.get_u32("settings", "ttl").unwrap(), None);
        assert_eq!(store.get_string("identity", "nodename").unwrap().as_deref(), Some("n1"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn remove_absent_key_is_ok() {
        let (store, path) = scratch_store("remove");
        store.remove("settings", "never-written").unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
