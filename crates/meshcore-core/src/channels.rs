//! Joined-channel table with persistence.
//!
//! A channel is a name plus a 16-byte symmetric key; the engine trial-
//! decrypts incoming group traffic against every enabled channel. The
//! well-known `#Public` channel is always present and never persisted;
//! everything else round-trips through the `channels` store namespace as
//! `count`, `name<i>`, `enc<i>`, `key<i>`.

use meshcore_crypto::{CIPHER_KEY_SIZE, ChannelKey, PUBLIC_CHANNEL_NAME};
use meshcore_store::KvStore;

use crate::error::Result;

/// Store namespace holding joined channels.
pub const CHANNELS_NAMESPACE: &str = "channels";

/// One joined channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Display name, e.g. `#Public` or `#hikers`.
    pub name: String,
    /// Symmetric key; uniquely determines [`Channel::hash`].
    pub key: ChannelKey,
    /// Demultiplexing hash (first byte of SHA-256 of the key).
    pub hash: u8,
    /// Disabled channels stay joined but are skipped on decrypt.
    pub enabled: bool,
}

impl Channel {
    fn new(name: String, key: ChannelKey, enabled: bool) -> Self {
        let hash = key.channel_hash();
        Self { name, key, hash, enabled }
    }
}

/// The set of joined channels.
pub struct ChannelTable {
    channels: Vec<Channel>,
}

impl ChannelTable {
    /// Create a table holding only the implicit `#Public` channel.
    #[must_use]
    pub fn new() -> Self {
        let public = Channel::new(
            PUBLIC_CHANNEL_NAME.to_owned(),
            ChannelKey::derive(PUBLIC_CHANNEL_NAME),
            true,
        );
        Self { channels: vec![public] }
    }

    /// Load persisted channels on top of the implicit `#Public`.
    ///
    /// Corrupt entries (missing key, wrong key width) are skipped rather
    /// than failing the boot.
    pub fn load<S: KvStore>(store: &S) -> Result<Self> {
        let mut table = Self::new();

        let count = store.get_u32(CHANNELS_NAMESPACE, "count")?.unwrap_or(0);
        for i in 0..count {
            let Some(name) = store.get_string(CHANNELS_NAMESPACE, &format!("name{i}"))? else {
                continue;
            };
            let Some(key_bytes) = store.get_bytes(CHANNELS_NAMESPACE, &format!("key{i}"))? else {
                continue;
            };
            let Ok(key_bytes) = <[u8; CIPHER_KEY_SIZE]>::try_from(key_bytes.as_slice()) else {
                tracing::warn!(channel = %name, "skipping channel with corrupt key");
                continue;
            };
            let enabled =
                store.get_bool(CHANNELS_NAMESPACE, &format!("enc{i}"))?.unwrap_or(true);

            table.upsert(name, ChannelKey::from_bytes(key_bytes), enabled);
        }
        Ok(table)
    }

    /// Persist every channel except the implicit `#Public`.
    pub fn persist<S: KvStore>(&self, store: &S) -> Result<()> {
        store.clear(CHANNELS_NAMESPACE)?;

        let mut index = 0u32;
        for channel in &self.channels {
            if channel.name == PUBLIC_CHANNEL_NAME {
                continue;
            }
            store.put_string(CHANNELS_NAMESPACE, &format!("name{index}"), &channel.name)?;
            store.put_bytes(CHANNELS_NAMESPACE, &format!("key{index}"), channel.key.as_bytes())?;
            store.put_bool(CHANNELS_NAMESPACE, &format!("enc{index}"), channel.enabled)?;
            index += 1;
        }
        store.put_u32(CHANNELS_NAMESPACE, "count", index)?;
        Ok(())
    }

    /// Join a channel, deriving the key from `password` (or from the name
    /// when no password is given). Rejoining replaces the key.
    pub fn join(&mut self, name: &str, password: Option<&str>) -> &Channel {
        let key = ChannelKey::derive(password.unwrap_or(name));
        self.upsert(name.to_owned(), key, true)
    }

    /// Join a channel with an explicit key (e.g. shared out of band).
    pub fn join_with_key(&mut self, name: &str, key: ChannelKey) -> &Channel {
        self.upsert(name.to_owned(), key, true)
    }

    /// Leave a channel. `#Public` cannot be left, only disabled.
    pub fn leave(&mut self, name: &str) -> bool {
        if name == PUBLIC_CHANNEL_NAME {
            return false;
        }
        let before = self.channels.len();
        self.channels.retain(|channel| channel.name != name);
        self.channels.len() != before
    }

    /// Enable or disable a channel for trial decryption.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.channels.iter_mut().find(|channel| channel.name == name) {
            Some(channel) => {
                channel.enabled = enabled;
                true
            },
            None => false,
        }
    }

    /// Find a channel by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|channel| channel.name == name)
    }

    /// Iterate enabled channels, those whose hash matches first.
    ///
    /// Trial decryption order: hash matches are overwhelmingly likely to
    /// be the right channel, but a colliding or stale hash must not hide
    /// traffic, so the rest follow.
    pub fn decrypt_candidates(&self, channel_hash: u8) -> impl Iterator<Item = &Channel> {
        let matches = self
            .channels
            .iter()
            .filter(move |channel| channel.enabled && channel.hash == channel_hash);
        let rest = self
            .channels
            .iter()
            .filter(move |channel| channel.enabled && channel.hash != channel_hash);
        matches.chain(rest)
    }

    /// All joined channels.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Number of joined channels, `#Public` included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Never true: `#Public` is always joined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn upsert(&mut self, name: String, key: ChannelKey, enabled: bool) -> &Channel {
        match self.channels.iter().position(|channel| channel.name == name) {
            Some(index) => {
                self.channels[index] = Channel::new(name, key, enabled);
                &self.channels[index]
            },
            None => {
                self.channels.push(Channel::new(name, key, enabled));
                // Just pushed.
                &self.channels[self.channels.len() - 1]
            },
        }
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}
