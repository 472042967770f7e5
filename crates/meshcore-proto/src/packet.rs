//! Packet envelope codec.
//!
//! A mesh packet is a single LoRa frame of at most 255 bytes:
//!
//! ```text
//! [header: 1] [transport codes: 0 or 4] [path_len: 1] [path: 0..=64] [payload: 0..=184]
//! ```
//!
//! The header byte packs three fields: bits 0-1 select the [`RouteKind`],
//! bits 2-5 the [`PayloadType`], bits 6-7 the payload version. Transport
//! codes are present exactly when the route is one of the transport
//! variants. The path is an ordered list of one-byte node hashes; the first
//! entry identifies the originator and every forwarder appends its own hash.
//!
//! The codec is allocation-free: [`Packet`] holds fixed-capacity arrays and
//! encodes into a caller-provided buffer. A decode succeeds only if the
//! input is consumed exactly, so `encode(decode(x)) == x` for every
//! well-formed frame.

use crate::{
    MAX_PACKET_PAYLOAD, MAX_PATH_SIZE, MAX_TRANS_UNIT, TRANSPORT_CODES_SIZE,
    errors::{ProtocolError, Result},
};

/// Routing discipline carried in header bits 0-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RouteKind {
    /// Flood routed, with transport codes attached.
    TransportFlood = 0,
    /// Flood routed: every receiver not yet in the path rebroadcasts.
    Flood = 1,
    /// Routed along a pre-known path; no rebroadcast.
    Direct = 2,
    /// Direct routed, with transport codes attached.
    TransportDirect = 3,
}

impl RouteKind {
    /// Decode from the low two header bits.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::TransportFlood,
            1 => Self::Flood,
            2 => Self::Direct,
            _ => Self::TransportDirect,
        }
    }

    /// Header bit representation.
    #[must_use]
    pub fn to_bits(self) -> u8 {
        self as u8
    }

    /// True for the flood variants (candidates for rebroadcast).
    #[must_use]
    pub fn is_flood(self) -> bool {
        matches!(self, Self::Flood | Self::TransportFlood)
    }

    /// True for the transport variants (frame carries transport codes).
    #[must_use]
    pub fn has_transport_codes(self) -> bool {
        matches!(self, Self::TransportFlood | Self::TransportDirect)
    }
}

impl std::fmt::Display for RouteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TransportFlood => "TRANSPORT_FLOOD",
            Self::Flood => "FLOOD",
            Self::Direct => "DIRECT",
            Self::TransportDirect => "TRANSPORT_DIRECT",
        })
    }
}

/// Payload discriminator carried in header bits 2-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    /// Request to a repeater or room server.
    Req = 0,
    /// Response to a request.
    Response = 1,
    /// Direct text message.
    TxtMsg = 2,
    /// Acknowledgement.
    Ack = 3,
    /// Self-identification broadcast.
    Advert = 4,
    /// Encrypted group text message.
    GrpTxt = 5,
    /// Encrypted group data.
    GrpData = 6,
    /// Anonymous request (no prior contact).
    AnonReq = 7,
    /// Returned path.
    Path = 8,
    /// Route trace.
    Trace = 9,
    /// Multipart fragment.
    Multipart = 10,
    /// Control frame.
    Control = 11,
    /// Reserved (12).
    Reserved12 = 12,
    /// Reserved (13).
    Reserved13 = 13,
    /// Reserved (14).
    Reserved14 = 14,
    /// Application-defined payload.
    RawCustom = 15,
}

impl PayloadType {
    /// Decode from header bits 2-5 (already shifted down).
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x0F {
            0 => Self::Req,
            1 => Self::Response,
            2 => Self::TxtMsg,
            3 => Self::Ack,
            4 => Self::Advert,
            5 => Self::GrpTxt,
            6 => Self::GrpData,
            7 => Self::AnonReq,
            8 => Self::Path,
            9 => Self::Trace,
            10 => Self::Multipart,
            11 => Self::Control,
            12 => Self::Reserved12,
            13 => Self::Reserved13,
            14 => Self::Reserved14,
            _ => Self::RawCustom,
        }
    }

    /// Header bit representation (unshifted).
    #[must_use]
    pub fn to_bits(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PayloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Req => "REQ",
            Self::Response => "RESPONSE",
            Self::TxtMsg => "TXT_MSG",
            Self::Ack => "ACK",
            Self::Advert => "ADVERT",
            Self::GrpTxt => "GRP_TXT",
            Self::GrpData => "GRP_DATA",
            Self::AnonReq => "ANON_REQ",
            Self::Path => "PATH",
            Self::Trace => "TRACE",
            Self::Multipart => "MULTIPART",
            Self::Control => "CONTROL",
            Self::Reserved12 => "RESERVED_12",
            Self::Reserved13 => "RESERVED_13",
            Self::Reserved14 => "RESERVED_14",
            Self::RawCustom => "RAW_CUSTOM",
        })
    }
}

/// A decoded mesh packet with fixed-capacity storage.
///
/// # Invariants
///
/// - `path_len <= MAX_PATH_SIZE` and `payload_len <= MAX_PACKET_PAYLOAD`;
///   both are enforced by every constructor and by [`Packet::decode`].
/// - `transport_codes` is `Some` iff the route is a transport variant.
/// - The encoded size never exceeds [`MAX_TRANS_UNIT`].
#[derive(Clone, Copy)]
pub struct Packet {
    /// Routing discipline.
    pub route: RouteKind,
    /// Payload discriminator.
    pub payload_type: PayloadType,
    /// Payload version, 0..=3 (header bits 6-7).
    pub payload_version: u8,
    /// Transport codes, present for transport routes only.
    pub transport_codes: Option<[u8; TRANSPORT_CODES_SIZE]>,
    path_len: u8,
    path: [u8; MAX_PATH_SIZE],
    payload_len: u8,
    payload: [u8; MAX_PACKET_PAYLOAD],
}

impl Packet {
    /// Worst-case encoded size: header + transport codes + path length +
    /// full path + full payload.
    pub const MAX_SIZE: usize = 1 + TRANSPORT_CODES_SIZE + 1 + MAX_PATH_SIZE + MAX_PACKET_PAYLOAD;

    /// Build a packet with an empty path.
    ///
    /// # Errors
    ///
    /// `ProtocolError::PayloadTooLarge` if `payload` exceeds
    /// [`MAX_PACKET_PAYLOAD`].
    pub fn new(route: RouteKind, payload_type: PayloadType, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_PACKET_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PACKET_PAYLOAD,
            });
        }

        let mut buf = [0u8; MAX_PACKET_PAYLOAD];
        buf[..payload.len()].copy_from_slice(payload);

        Ok(Self {
            route,
            payload_type,
            payload_version: 0,
            transport_codes: route.has_transport_codes().then_some([0u8; TRANSPORT_CODES_SIZE]),
            path_len: 0,
            path: [0u8; MAX_PATH_SIZE],
            payload_len: payload.len() as u8,
            payload: buf,
        })
    }

    /// Build a flood packet, the common construction for ADVERT and group
    /// traffic.
    ///
    /// # Errors
    ///
    /// `ProtocolError::PayloadTooLarge` if `payload` exceeds
    /// [`MAX_PACKET_PAYLOAD`].
    pub fn flood(payload_type: PayloadType, payload: &[u8]) -> Result<Self> {
        Self::new(RouteKind::Flood, payload_type, payload)
    }

    /// Decode a packet from a received frame.
    ///
    /// The input must be consumed exactly: the payload is everything after
    /// the path, so the only way a decode fails is a truncated prefix, an
    /// oversized path/payload, or an input longer than [`MAX_TRANS_UNIT`].
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Truncated` if the header, transport codes, or path
    ///   extend past the end of input
    /// - `ProtocolError::PathTooLong` if the path length field exceeds 64
    /// - `ProtocolError::PayloadTooLarge` if the remaining bytes exceed 184
    ///   or the whole frame exceeds 255 bytes
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_TRANS_UNIT {
            return Err(ProtocolError::PayloadTooLarge { size: bytes.len(), max: MAX_TRANS_UNIT });
        }

        let (&header, rest) = bytes
            .split_first()
            .ok_or(ProtocolError::Truncated { expected: 1, actual: 0 })?;

        let route = RouteKind::from_bits(header);
        let payload_type = PayloadType::from_bits(header >> 2);
        let payload_version = header >> 6;

        let (transport_codes, rest) = if route.has_transport_codes() {
            if rest.len() < TRANSPORT_CODES_SIZE {
                return Err(ProtocolError::Truncated {
                    expected: TRANSPORT_CODES_SIZE,
                    actual: rest.len(),
                });
            }
            let mut codes = [0u8; TRANSPORT_CODES_SIZE];
            codes.copy_from_slice(&rest[..TRANSPORT_CODES_SIZE]);
            (Some(codes), &rest[TRANSPORT_CODES_SIZE..])
        } else {
            (None, rest)
        };

        let (&path_len, rest) = rest
            .split_first()
            .ok_or(ProtocolError::Truncated { expected: 1, actual: 0 })?;

        if usize::from(path_len) > MAX_PATH_SIZE {
            return Err(ProtocolError::PathTooLong(path_len));
        }
        if rest.len() < usize::from(path_len) {
            return Err(ProtocolError::Truncated {
                expected: usize::from(path_len),
                actual: rest.len(),
            });
        }

        let (path_bytes, payload_bytes) = rest.split_at(usize::from(path_len));

        if payload_bytes.len() > MAX_PACKET_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_bytes.len(),
                max: MAX_PACKET_PAYLOAD,
            });
        }

        let mut path = [0u8; MAX_PATH_SIZE];
        path[..path_bytes.len()].copy_from_slice(path_bytes);
        let mut payload = [0u8; MAX_PACKET_PAYLOAD];
        payload[..payload_bytes.len()].copy_from_slice(payload_bytes);

        Ok(Self {
            route,
            payload_type,
            payload_version,
            transport_codes,
            path_len,
            path,
            payload_len: payload_bytes.len() as u8,
            payload,
        })
    }

    /// Encode into a caller-provided buffer, returning the bytes written.
    ///
    /// # Errors
    ///
    /// `ProtocolError::BufferTooSmall` if `out` cannot hold the frame. The
    /// frame is never silently truncated.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize> {
        let needed = self.encoded_len();
        if out.len() < needed {
            return Err(ProtocolError::BufferTooSmall { needed, capacity: out.len() });
        }

        let header = self.route.to_bits()
            | (self.payload_type.to_bits() << 2)
            | ((self.payload_version & 0x03) << 6);

        let mut at = 0;
        out[at] = header;
        at += 1;

        if let Some(codes) = self.transport_codes {
            out[at..at + TRANSPORT_CODES_SIZE].copy_from_slice(&codes);
            at += TRANSPORT_CODES_SIZE;
        }

        out[at] = self.path_len;
        at += 1;
        out[at..at + usize::from(self.path_len)].copy_from_slice(self.path());
        at += usize::from(self.path_len);
        out[at..at + usize::from(self.payload_len)].copy_from_slice(self.payload());
        at += usize::from(self.payload_len);

        debug_assert_eq!(at, needed);
        Ok(at)
    }

    /// Size of the encoded frame in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + if self.transport_codes.is_some() { TRANSPORT_CODES_SIZE } else { 0 }
            + 1
            + usize::from(self.path_len)
            + usize::from(self.payload_len)
    }

    /// The hop path accumulated so far. The first entry is the originator.
    #[must_use]
    pub fn path(&self) -> &[u8] {
        &self.path[..usize::from(self.path_len)]
    }

    /// The payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload[..usize::from(self.payload_len)]
    }

    /// Number of hops recorded in the path.
    #[must_use]
    pub fn path_len(&self) -> u8 {
        self.path_len
    }

    /// Append a node hash to the path without reordering.
    ///
    /// # Errors
    ///
    /// `ProtocolError::PathFull` iff the path already holds
    /// [`MAX_PATH_SIZE`] entries.
    pub fn add_to_path(&mut self, hash: u8) -> Result<()> {
        if usize::from(self.path_len) == MAX_PATH_SIZE {
            return Err(ProtocolError::PathFull);
        }
        self.path[usize::from(self.path_len)] = hash;
        self.path_len += 1;
        Ok(())
    }

    /// Whether `hash` already appears anywhere in the path.
    #[must_use]
    pub fn is_in_path(&self, hash: u8) -> bool {
        self.path().contains(&hash)
    }
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.route == other.route
            && self.payload_type == other.payload_type
            && self.payload_version == other.payload_version
            && self.transport_codes == other.transport_codes
            && self.path() == other.path()
            && self.payload() == other.payload()
    }
}

impl Eq for Packet {}

// Manual Debug keeps the fixed arrays from flooding log output.
impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("route", &self.route)
            .field("payload_type", &self.payload_type)
            .field("payload_version", &self.payload_version)
            .field("transport_codes", &self.transport_codes)
            .field("path", &self.path())
            .field("payload_len", &self.payload_len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_bits_round_trip() {
        for bits in 0..=3u8 {
            assert_eq!(RouteKind::from_bits(bits).to_bits(), bits);
        }
    }

    #[test]
    fn payload_type_bits_round_trip() {
        for bits in 0..=15u8 {
            assert_eq!(PayloadType::from_bits(bits).to_bits(), bits);
        }
    }

    #[test]
    fn display_names_match_the_wire_glossary() {
        assert_eq!(RouteKind::Flood.to_string(), "FLOOD");
        assert_eq!(RouteKind::TransportDirect.to_string(), "TRANSPORT_DIRECT");
        assert_eq!(PayloadType::GrpTxt.to_string(), "GRP_TXT");
        assert_eq!(PayloadType::RawCustom.to_string(), "RAW_CUSTOM");
    }

    #[test]
    fn encode_decode_minimal() {
        let packet = Packet::flood(PayloadType::TxtMsg, b"hi").unwrap();
        let mut wire = [0u8; Packet::MAX_SIZE];
        let n = packet.encode(&mut wire).unwrap();
        assert_eq!(n, 1 + 1 + 2);

        let parsed = Packet::decode(&wire[..n]).unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.payload(), b"hi");
    }

    #[test]
    fn transport_route_carries_codes() {
        let mut packet = Packet::new(RouteKind::TransportFlood, PayloadType::Req, &[]).unwrap();
        packet.transport_codes = Some([0xAA, 0xBB, 0xCC, 0xDD]);

        let mut wire = [0u8; Packet::MAX_SIZE];
        let n = packet.encode(&mut wire).unwrap();
        assert_eq!(n, 1 + 4 + 1);
        assert_eq!(&wire[1..5], &[0xAA, 0xBB, 0xCC, 0xDD]);

        let parsed = Packet::decode(&wire[..n]).unwrap();
        assert_eq!(parsed.transport_codes, Some([0xAA, 0xBB, 0xCC, 0xDD]));
    }

    #[test]
    fn path_append_and_lookup() {
        let mut packet = Packet::flood(PayloadType::Advert, &[]).unwrap();
        assert!(!packet.is_in_path(0x42));

        packet.add_to_path(0x42).unwrap();
        assert!(packet.is_in_path(0x42));
        assert_eq!(packet.path(), &[0x42]);
    }

    #[test]
    fn path_full_after_max_entries() {
        let mut packet = Packet::flood(PayloadType::Advert, &[]).unwrap();
        for i in 0..MAX_PATH_SIZE {
            packet.add_to_path(i as u8).unwrap();
        }
        assert_eq!(packet.add_to_path(0xFF), Err(ProtocolError::PathFull));
        assert_eq!(usize::from(packet.path_len()), MAX_PATH_SIZE);
    }

    #[test]
    fn reject_empty_input() {
        assert!(matches!(Packet::decode(&[]), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn reject_truncated_path() {
        // Header (FLOOD/TXT), path_len = 5, but only 2 path bytes present.
        let wire = [0x09, 5, 0x01, 0x02];
        assert!(matches!(Packet::decode(&wire), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn reject_truncated_transport_codes() {
        // TRANSPORT_FLOOD header then only 2 of 4 code bytes.
        let wire = [0x08, 0xAA, 0xBB];
        assert!(matches!(Packet::decode(&wire), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn reject_path_over_limit() {
        let mut wire = vec![0x09, 65];
        wire.extend(std::iter::repeat_n(0u8, 65));
        assert_eq!(Packet::decode(&wire), Err(ProtocolError::PathTooLong(65)));
    }

    #[test]
    fn reject_payload_over_limit() {
        let mut wire = vec![0x09, 0];
        wire.extend(std::iter::repeat_n(0u8, MAX_PACKET_PAYLOAD + 1));
        assert!(matches!(Packet::decode(&wire), Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn reject_oversized_payload_on_construction() {
        let too_big = vec![0u8; MAX_PACKET_PAYLOAD + 1];
        assert!(matches!(
            Packet::flood(PayloadType::GrpData, &too_big),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn encode_rejects_small_buffer() {
        let packet = Packet::flood(PayloadType::TxtMsg, b"hello").unwrap();
        let mut tiny = [0u8; 4];
        assert!(matches!(
            packet.encode(&mut tiny),
            Err(ProtocolError::BufferTooSmall { needed: 7, capacity: 4 })
        ));
    }

    #[test]
    fn version_bits_survive_round_trip() {
        let mut packet = Packet::flood(PayloadType::Advert, &[]).unwrap();
        packet.payload_version = 1;

        let mut wire = [0u8; Packet::MAX_SIZE];
        let n = packet.encode(&mut wire).unwrap();
        let parsed = Packet::decode(&wire[..n]).unwrap();
        assert_eq!(parsed.payload_version, 1);
    }
}
