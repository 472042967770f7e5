//! Node identity lifecycle.
//!
//! The keypair lives in the `identity` store namespace as `privkey`
//! (32-byte seed), `pubkey`, and `nodename`. First boot draws a fresh
//! seed from the environment, persists all three in one atomic batch, and
//! names the node `Node-<hex(pubkey[0..3])>`. A persist failure is not
//! fatal: the node runs with an in-RAM identity and reports the degraded
//! state through [`Identity::is_persisted`] so the UI can warn.
//!
//! Loading tolerates history: a legacy 64-byte `privkey` blob (seed
//! followed by the derived public half) is accepted and its first 32
//! bytes used; a stored `pubkey` that does not match the seed marks the
//! record corrupt and triggers regeneration.

use meshcore_crypto::{Keypair, SEED_SIZE, SharedSecret};
use meshcore_proto::LEGACY_PRV_KEY_SIZE;
use meshcore_store::KvStore;
use zeroize::Zeroizing;

use crate::error::{MeshError, Result};

/// Store namespace holding the identity blob.
pub const IDENTITY_NAMESPACE: &str = "identity";

const KEY_PRIVKEY: &str = "privkey";
const KEY_PUBKEY: &str = "pubkey";
const KEY_NODENAME: &str = "nodename";

/// Maximum node name length in bytes; bounded by the ADVERT app-data
/// budget.
pub const MAX_NODE_NAME: usize = 16;

/// The node's identity: keypair plus display name.
pub struct Identity {
    keypair: Keypair,
    name: String,
    persisted: bool,
}

impl Identity {
    /// Load the identity from the store, generating and persisting a
    /// fresh one on first boot (or when the stored record is corrupt).
    ///
    /// # Errors
    ///
    /// `MeshError::Store` only for *read* failures. A failed first-boot
    /// *write* degrades to an unpersisted in-RAM identity instead.
    pub fn load_or_generate<S, E>(store: &S, env: &E) -> Result<Self>
    where
        S: KvStore,
        E: crate::env::Environment,
    {
        if let Some(identity) = Self::try_load(store)? {
            return Ok(identity);
        }

        let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
        env.random_bytes(seed.as_mut_slice());
        let keypair = Keypair::from_seed(&seed);
        let name = default_name(&keypair);

        let persisted = match store.put_many(
            IDENTITY_NAMESPACE,
            &[
                (KEY_PRIVKEY, seed.as_slice()),
                (KEY_PUBKEY, &keypair.public_key()),
                (KEY_NODENAME, name.as_bytes()),
            ],
        ) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, "identity persist failed; running unpersisted");
                false
            },
        };

        Ok(Self { keypair, name, persisted })
    }

    fn try_load<S: KvStore>(store: &S) -> Result<Option<Self>> {
        let Some(blob) = store.get_bytes(IDENTITY_NAMESPACE, KEY_PRIVKEY)? else {
            return Ok(None);
        };

        let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
        match blob.len() {
            SEED_SIZE | LEGACY_PRV_KEY_SIZE => seed.copy_from_slice(&blob[..SEED_SIZE]),
            other => {
                tracing::warn!(len = other, "corrupt privkey record; regenerating");
                return Ok(None);
            },
        }

        let keypair = Keypair::from_seed(&seed);

        // A pubkey that disagrees with the seed means a torn write
        // somewhere; treat the whole record as missing.
        if let Some(stored_pub) = store.get_bytes(IDENTITY_NAMESPACE, KEY_PUBKEY)? {
            if stored_pub != keypair.public_key() {
                tracing::warn!("stored pubkey does not match seed; regenerating");
                return Ok(None);
            }
        }

        let name = store
            .get_string(IDENTITY_NAMESPACE, KEY_NODENAME)?
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| default_name(&keypair));

        Ok(Some(Self { keypair, name, persisted: true }))
    }

    /// Regenerate the keypair and persist the replacement atomically.
    /// The old identity is unrecoverable afterwards.
    pub fn reset<S, E>(&mut self, store: &S, env: &E) -> Result<()>
    where
        S: KvStore,
        E: crate::env::Environment,
    {
        let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
        env.random_bytes(seed.as_mut_slice());
        let keypair = Keypair::from_seed(&seed);
        let name = default_name(&keypair);

        store.put_many(
            IDENTITY_NAMESPACE,
            &[
                (KEY_PRIVKEY, seed.as_slice()),
                (KEY_PUBKEY, &keypair.public_key()),
                (KEY_NODENAME, name.as_bytes()),
            ],
        )?;

        self.keypair = keypair;
        self.name = name;
        self.persisted = true;
        Ok(())
    }

    /// Rename the node and persist the new name.
    ///
    /// # Errors
    ///
    /// `MeshError::InvalidNodeName` when empty or over
    /// [`MAX_NODE_NAME`] bytes.
    pub fn set_name<S: KvStore>(&mut self, store: &S, name: &str) -> Result<()> {
        if name.is_empty() || name.len() > MAX_NODE_NAME {
            return Err(MeshError::InvalidNodeName);
        }
        store.put_string(IDENTITY_NAMESPACE, KEY_NODENAME, name)?;
        self.name = name.to_owned();
        Ok(())
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the identity survived to durable storage.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Ed25519 public key.
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    /// One-byte wire identifier: first byte of the public key.
    #[must_use]
    pub fn path_hash(&self) -> u8 {
        self.keypair.path_hash()
    }

    /// Short hex identifier shown in UIs: first three pubkey bytes.
    #[must_use]
    pub fn short_id(&self) -> String {
        let key = self.public_key();
        format!("{:02x}{:02x}{:02x}", key[0], key[1], key[2])
    }

    /// Sign a message with the node key.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.keypair.sign(message)
    }

    /// X25519 key agreement with a peer's Ed25519 public key.
    pub fn derive_shared(&self, their_pubkey: &[u8; 32]) -> Result<SharedSecret> {
        Ok(self.keypair.derive_shared(their_pubkey)?)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("name", &self.name)
            .field("short_id", &self.short_id())
            .field("persisted", &self.persisted)
            .finish_non_exhaustive()
    }
}

fn default_name(keypair: &Keypair) -> String {
    let key = keypair.public_key();
    format!("Node-{:02x}{:02x}{:02x}", key[0], key[1], key[2])
}

#[cfg(test)]
mod tests {
    use meshcore_store::MemoryStore;

    use super::*;
    use crate::test_env::TestEnv;

    #[test]
    fn first_boot_generates_and_persists() {
        let store = MemoryStore::new();
        let env = TestEnv::new(1);

        let identity = Identity::load_or_generate(&store, &env).unwrap();
        assert!(identity.is_persisted());
        assert!(identity.name().starts_with("Node-"));
        assert_eq!(identity.path_hash(), identity.public_key()[0]);

        let seed = store.get_bytes(IDENTITY_NAMESPACE, KEY_PRIVKEY).unwrap().unwrap();
        assert_eq!(seed.len(), SEED_SIZE);
    }

    #[test]
    fn second_boot_loads_same_identity() {
        let store = MemoryStore::new();
        let env = TestEnv::new(1);

        let first = Identity::load_or_generate(&store, &env).unwrap();
        let second = Identity::load_or_generate(&store, &env).unwrap();
        assert_eq!(first.public_key(), second.public_key());
        assert_eq!(first.name(), second.name());
    }

    #[test]
    fn legacy_64_byte_blob_is_accepted() {
        let store = MemoryStore::new();
        let env = TestEnv::new(1);

        let first = Identity::load_or_generate(&store, &env).unwrap();

        // Rewrite the record the way older firmware stored it.
        let seed = store.get_bytes(IDENTITY_NAMESPACE, KEY_PRIVKEY).unwrap().unwrap();
        let mut legacy = seed.clone();
        legacy.extend_from_slice(&first.public_key());
        store.put_bytes(IDENTITY_NAMESPACE, KEY_PRIVKEY, &legacy).unwrap();

        let reloaded = Identity::load_or_generate(&store, &env).unwrap();
        assert_eq!(reloaded.public_key(), first.public_key());
    }

    #[test]
    fn corrupt_record_regenerates() {
        let store = MemoryStore::new();
        let env = TestEnv::new(1);

        let first = Identity::load_or_generate(&store, &env).unwrap();
        store.put_bytes(IDENTITY_NAMESPACE, KEY_PRIVKEY, &[1, 2, 3]).unwrap();

        let second = Identity::load_or_generate(&store, &env).unwrap();
        assert_ne!(first.public_key(), second.public_key());
    }

    #[test]
    fn mismatched_pubkey_regenerates() {
        let store = MemoryStore::new();
        let env = TestEnv::new(1);

        let first = Identity::load_or_generate(&store, &env).unwrap();
        store.put_bytes(IDENTITY_NAMESPACE, KEY_PUBKEY, &[0u8; 32]).unwrap();

        let second = Identity::load_or_generate(&store, &env).unwrap();
        assert_ne!(first.public_key(), second.public_key());
    }

    #[test]
    fn reset_replaces_identity() {
        let store = MemoryStore::new();
        let env = TestEnv::new(1);

        let mut identity = Identity::load_or_generate(&store, &env).unwrap();
        let old_key = identity.public_key();

        identity.reset(&store, &env).unwrap();
        assert_ne!(identity.public_key(), old_key);

        let reloaded = Identity::load_or_generate(&store, &env).unwrap();
        assert_eq!(reloaded.public_key(), identity.public_key());
    }

    #[test]
    fn rename_persists_and_validates() {
        let store = MemoryStore::new();
        let env = TestEnv::new(1);

        let mut identity = Identity::load_or_generate(&store, &env).unwrap();
        identity.set_name(&store, "Alice").unwrap();
        assert_eq!(identity.name(), "Alice");

        assert_eq!(identity.set_name(&store, ""), Err(MeshError::InvalidNodeName));
        assert_eq!(
            identity.set_name(&store, "name-way-beyond-sixteen-bytes"),
            Err(MeshError::InvalidNodeName)
        );

        let reloaded = Identity::load_or_generate(&store, &env).unwrap();
        assert_eq!(reloaded.name(), "Alice");
    }
}
