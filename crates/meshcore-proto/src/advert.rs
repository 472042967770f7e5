//! ADVERT payload: signed self-identification.
//!
//! Wire layout (all integers little-endian):
//!
//! ```text
//! [pubkey: 32] [timestamp: 4] [signature: 64] [app_data: 0..=32]
//! ```
//!
//! The signature is Ed25519 over `pubkey || timestamp || app_data`. The
//! app-data section opens with a flag byte and then carries optional fields
//! in a fixed order: location (bit 4), feature words (bits 5 and 6), and a
//! trailing UTF-8 name (bit 7). Signature verification lives in the crypto
//! crate; this module only frames bytes.

use crate::{
    MAX_ADVERT_DATA_SIZE, PUB_KEY_SIZE, SIGNATURE_SIZE,
    errors::{ProtocolError, Result},
};

/// Fixed prefix: pubkey + timestamp + signature.
pub const ADVERT_MIN_SIZE: usize = PUB_KEY_SIZE + 4 + SIGNATURE_SIZE;

/// Largest possible ADVERT payload.
pub const ADVERT_MAX_SIZE: usize = ADVERT_MIN_SIZE + MAX_ADVERT_DATA_SIZE;

/// Maximum advertised name length in bytes.
pub const MAX_ADVERT_NAME: usize = 16;

mod flags {
    pub const ROLE_MASK: u8 = 0x03;
    pub const IS_SENSOR: u8 = 0x04;
    pub const HAS_LOCATION: u8 = 0x10;
    pub const HAS_FEATURE1: u8 = 0x20;
    pub const HAS_FEATURE2: u8 = 0x40;
    pub const HAS_NAME: u8 = 0x80;
}

/// Advertised node role (flag bits 0-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeRole {
    /// Role bits were zero.
    #[default]
    Unspecified,
    /// Interactive chat node.
    Chat,
    /// Store-and-forward repeater.
    Repeater,
    /// Room server.
    Room,
}

impl NodeRole {
    /// Decode from the low two flag bits.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & flags::ROLE_MASK {
            1 => Self::Chat,
            2 => Self::Repeater,
            3 => Self::Room,
            _ => Self::Unspecified,
        }
    }

    /// Flag bit representation.
    #[must_use]
    pub fn to_bits(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::Chat => 1,
            Self::Repeater => 2,
            Self::Room => 3,
        }
    }
}

/// Advertised position, fixed-point degrees × 1e6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatLon {
    /// Latitude in microdegrees.
    pub lat_e6: i32,
    /// Longitude in microdegrees.
    pub lon_e6: i32,
}

impl LatLon {
    /// Latitude in degrees.
    #[must_use]
    pub fn lat_degrees(self) -> f64 {
        f64::from(self.lat_e6) / 1_000_000.0
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn lon_degrees(self) -> f64 {
        f64::from(self.lon_e6) / 1_000_000.0
    }
}

/// A framed ADVERT payload.
///
/// Holds the raw app-data bytes; [`Advert::app_data_fields`] parses them on
/// demand so a relay never pays for field parsing.
#[derive(Clone, Copy)]
pub struct Advert {
    /// Originator's Ed25519 public key.
    pub pubkey: [u8; PUB_KEY_SIZE],
    /// Originator's clock at send time, unix seconds.
    pub timestamp: u32,
    /// Ed25519 signature over `pubkey || timestamp || app_data`.
    pub signature: [u8; SIGNATURE_SIZE],
    app_data: [u8; MAX_ADVERT_DATA_SIZE],
    app_data_len: u8,
}

impl Advert {
    /// Assemble an ADVERT from its parts.
    ///
    /// # Errors
    ///
    /// `ProtocolError::AdvertDataTooLarge` if `app_data` exceeds
    /// [`MAX_ADVERT_DATA_SIZE`].
    pub fn new(
        pubkey: [u8; PUB_KEY_SIZE],
        timestamp: u32,
        signature: [u8; SIGNATURE_SIZE],
        app_data: &[u8],
    ) -> Result<Self> {
        if app_data.len() > MAX_ADVERT_DATA_SIZE {
            return Err(ProtocolError::AdvertDataTooLarge(app_data.len()));
        }
        let mut buf = [0u8; MAX_ADVERT_DATA_SIZE];
        buf[..app_data.len()].copy_from_slice(app_data);
        Ok(Self { pubkey, timestamp, signature, app_data: buf, app_data_len: app_data.len() as u8 })
    }

    /// Parse an ADVERT from a packet payload.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::AdvertTooShort` below the 100-byte fixed prefix
    /// - `ProtocolError::AdvertDataTooLarge` if more than 32 app-data bytes
    ///   follow the prefix
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < ADVERT_MIN_SIZE {
            return Err(ProtocolError::AdvertTooShort(payload.len()));
        }

        let mut pubkey = [0u8; PUB_KEY_SIZE];
        pubkey.copy_from_slice(&payload[..PUB_KEY_SIZE]);

        let mut ts = [0u8; 4];
        ts.copy_from_slice(&payload[PUB_KEY_SIZE..PUB_KEY_SIZE + 4]);

        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&payload[PUB_KEY_SIZE + 4..ADVERT_MIN_SIZE]);

        Self::new(pubkey, u32::from_le_bytes(ts), signature, &payload[ADVERT_MIN_SIZE..])
    }

    /// Encode into a packet payload buffer, returning bytes written.
    ///
    /// # Errors
    ///
    /// `ProtocolError::BufferTooSmall` if `out` cannot hold the payload.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize> {
        let needed = ADVERT_MIN_SIZE + usize::from(self.app_data_len);
        if out.len() < needed {
            return Err(ProtocolError::BufferTooSmall { needed, capacity: out.len() });
        }

        out[..PUB_KEY_SIZE].copy_from_slice(&self.pubkey);
        out[PUB_KEY_SIZE..PUB_KEY_SIZE + 4].copy_from_slice(&self.timestamp.to_le_bytes());
        out[PUB_KEY_SIZE + 4..ADVERT_MIN_SIZE].copy_from_slice(&self.signature);
        out[ADVERT_MIN_SIZE..needed].copy_from_slice(self.app_data());
        Ok(needed)
    }

    /// Raw app-data bytes (flag byte plus optional fields).
    #[must_use]
    pub fn app_data(&self) -> &[u8] {
        &self.app_data[..usize::from(self.app_data_len)]
    }

    /// The message covered by the signature:
    /// `pubkey || timestamp || app_data`.
    #[must_use]
    pub fn signing_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(PUB_KEY_SIZE + 4 + usize::from(self.app_data_len));
        data.extend_from_slice(&self.pubkey);
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(self.app_data());
        data
    }

    /// Parse the optional app-data fields.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Truncated` if a flagged field extends past the end
    ///   of app-data
    /// - `ProtocolError::InvalidName` if the name bytes are not UTF-8
    pub fn app_data_fields(&self) -> Result<AdvertFields<'_>> {
        AdvertFields::parse(self.app_data())
    }
}

impl std::fmt::Debug for Advert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advert")
            .field("pubkey0", &format!("{:#04x}", self.pubkey[0]))
            .field("timestamp", &self.timestamp)
            .field("app_data_len", &self.app_data_len)
            .finish_non_exhaustive()
    }
}

/// Decoded app-data fields, borrowing the name from the advert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvertFields<'a> {
    /// Advertised role.
    pub role: NodeRole,
    /// Node carries a sensor.
    pub is_sensor: bool,
    /// Advertised position, when flag bit 4 is set.
    pub location: Option<LatLon>,
    /// First feature word, when flag bit 5 is set.
    pub feature1: Option<u16>,
    /// Second feature word, when flag bit 6 is set.
    pub feature2: Option<u16>,
    /// Advertised display name, when flag bit 7 is set.
    pub name: Option<&'a str>,
}

impl<'a> AdvertFields<'a> {
    fn parse(app_data: &'a [u8]) -> Result<Self> {
        let Some((&flag, mut rest)) = app_data.split_first() else {
            // Empty app-data advertises nothing at all.
            return Ok(Self {
                role: NodeRole::Unspecified,
                is_sensor: false,
                location: None,
                feature1: None,
                feature2: None,
                name: None,
            });
        };

        let location = if flag & flags::HAS_LOCATION != 0 {
            let (lat, after) = take_i32(rest)?;
            let (lon, after) = take_i32(after)?;
            rest = after;
            Some(LatLon { lat_e6: lat, lon_e6: lon })
        } else {
            None
        };

        let feature1 = if flag & flags::HAS_FEATURE1 != 0 {
            let (word, after) = take_u16(rest)?;
            rest = after;
            Some(word)
        } else {
            None
        };

        let feature2 = if flag & flags::HAS_FEATURE2 != 0 {
            let (word, after) = take_u16(rest)?;
            rest = after;
            Some(word)
        } else {
            None
        };

        let name = if flag & flags::HAS_NAME != 0 {
            Some(std::str::from_utf8(rest).map_err(|_| ProtocolError::InvalidName)?)
        } else {
            None
        };

        Ok(Self {
            role: NodeRole::from_bits(flag),
            is_sensor: flag & flags::IS_SENSOR != 0,
            location,
            feature1,
            feature2,
            name,
        })
    }
}

/// Builder for the app-data section.
///
/// Field order on the wire is fixed regardless of call order: flag byte,
/// location, feature words, name.
#[derive(Debug, Clone, Default)]
pub struct AppDataBuilder {
    role: NodeRole,
    is_sensor: bool,
    location: Option<LatLon>,
    feature1: Option<u16>,
    feature2: Option<u16>,
    name: Option<String>,
}

impl AppDataBuilder {
    /// Start an empty app-data section.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised role.
    #[must_use]
    pub fn role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    /// Mark the node as carrying a sensor.
    #[must_use]
    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    /// Advertise a position.
    #[must_use]
    pub fn location(mut self, location: LatLon) -> Self {
        self.location = Some(location);
        self
    }

    /// Advertise the first feature word.
    #[must_use]
    pub fn feature1(mut self, word: u16) -> Self {
        self.feature1 = Some(word);
        self
    }

    /// Advertise the second feature word.
    #[must_use]
    pub fn feature2(mut self, word: u16) -> Self {
        self.feature2 = Some(word);
        self
    }

    /// Advertise a display name.
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Serialize the app-data section.
    ///
    /// # Errors
    ///
    /// `ProtocolError::AdvertDataTooLarge` when the combination of fields
    /// (typically a long name plus a location) exceeds 32 bytes. Names
    /// longer than [`MAX_ADVERT_NAME`] bytes are rejected the same way.
    pub fn build(self) -> Result<Vec<u8>> {
        let mut flag = self.role.to_bits();
        if self.is_sensor {
            flag |= flags::IS_SENSOR;
        }

        let mut data = Vec::with_capacity(MAX_ADVERT_DATA_SIZE);
        data.push(0);

        if let Some(location) = self.location {
            flag |= flags::HAS_LOCATION;
            data.extend_from_slice(&location.lat_e6.to_le_bytes());
            data.extend_from_slice(&location.lon_e6.to_le_bytes());
        }
        if let Some(word) = self.feature1 {
            flag |= flags::HAS_FEATURE1;
            data.extend_from_slice(&word.to_le_bytes());
        }
        if let Some(word) = self.feature2 {
            flag |= flags::HAS_FEATURE2;
            data.extend_from_slice(&word.to_le_bytes());
        }
        if let Some(name) = &self.name {
            if name.len() > MAX_ADVERT_NAME {
                return Err(ProtocolError::AdvertDataTooLarge(data.len() + name.len()));
            }
            flag |= flags::HAS_NAME;
            data.extend_from_slice(name.as_bytes());
        }

        if data.len() > MAX_ADVERT_DATA_SIZE {
            return Err(ProtocolError::AdvertDataTooLarge(data.len()));
        }

        data[0] = flag;
        Ok(data)
    }
}

fn take_i32(bytes: &[u8]) -> Result<(i32, &[u8])> {
    if bytes.len() < 4 {
        return Err(ProtocolError::Truncated { expected: 4, actual: bytes.len() });
    }
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[..4]);
    Ok((i32::from_le_bytes(word), &bytes[4..]))
}

fn take_u16(bytes: &[u8]) -> Result<(u16, &[u8])> {
    if bytes.len() < 2 {
        return Err(ProtocolError::Truncated { expected: 2, actual: bytes.len() });
    }
    let mut word = [0u8; 2];
    word.copy_from_slice(&bytes[..2]);
    Ok((u16::from_le_bytes(word), &bytes[2..]))
}
