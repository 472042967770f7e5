//! Host-side control framing.
//!
//! Development hosts drive the device over a byte pipe with a tiny
//! command protocol: request `cmd(1) | len(2 LE) | payload`, response
//! `status(1) | len(2 LE) | data`. This module is the transport-agnostic
//! half: a byte-at-a-time parser with the 100 ms inter-byte timeout, the
//! command dispatcher, and the screenshot RLE encoder. The USB plumbing
//! and the display/keyboard/script effects live behind
//! [`ControlBackend`].

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use meshcore_core::env::MeshInstant;

/// Success status byte.
pub const STATUS_OK: u8 = 0x00;

/// Error status byte.
pub const STATUS_ERR: u8 = 0x01;

/// A gap longer than this between bytes resets the request parser.
pub const INTER_BYTE_TIMEOUT: Duration = Duration::from_millis(100);

/// Modifier bit: shift.
pub const MOD_SHIFT: u8 = 1;
/// Modifier bit: control.
pub const MOD_CTRL: u8 = 2;
/// Modifier bit: alt.
pub const MOD_ALT: u8 = 4;
/// Modifier bit: function.
pub const MOD_FN: u8 = 8;

/// Control command bytes.
pub mod commands {
    /// Liveness check; answers `"PONG"`.
    pub const PING: u8 = 0x01;
    /// RLE-compressed RGB565 framebuffer dump.
    pub const SCREENSHOT: u8 = 0x02;
    /// Inject a printable key: `ch(1) | mods(1)`.
    pub const KEY_CHAR: u8 = 0x03;
    /// Inject a special key: `code(1) | mods(1)`.
    pub const KEY_SPECIAL: u8 = 0x04;
    /// JSON `{width,height,cols,rows}`.
    pub const SCREEN_INFO: u8 = 0x05;
    /// Block until the next rendered frame; returns its text content.
    pub const WAIT_FRAME_TEXT: u8 = 0x06;
    /// Run a string in the script VM; returns a JSON-encoded result.
    pub const LUA_EXEC: u8 = 0x07;
    /// Block until the next rendered frame; returns its draw primitives.
    pub const WAIT_FRAME_PRIMITIVES: u8 = 0x08;
}

/// Special key codes for `KEY_SPECIAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpecialKey {
    /// Arrow up.
    Up = 1,
    /// Arrow down.
    Down = 2,
    /// Arrow left.
    Left = 3,
    /// Arrow right.
    Right = 4,
    /// Enter.
    Enter = 5,
    /// Escape.
    Escape = 6,
    /// Tab.
    Tab = 7,
    /// Backspace.
    Backspace = 8,
    /// Delete.
    Delete = 9,
    /// Home.
    Home = 10,
    /// End.
    End = 11,
}

impl SpecialKey {
    /// Decode a wire code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Up,
            2 => Self::Down,
            3 => Self::Left,
            4 => Self::Right,
            5 => Self::Enter,
            6 => Self::Escape,
            7 => Self::Tab,
            8 => Self::Backspace,
            9 => Self::Delete,
            10 => Self::Home,
            11 => Self::End,
            _ => return None,
        })
    }
}

/// Errors a [`ControlBackend`] can surface; all map to status `0x01`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// Request payload malformed for the command.
    #[error("bad request: {0}")]
    BadRequest(&'static str),

    /// Unknown command byte.
    #[error("unknown command: {0:#04x}")]
    UnknownCommand(u8),

    /// Backend-side failure (display busy, VM error, ...).
    #[error("backend: {0}")]
    Backend(String),
}

/// Geometry answered by `SCREEN_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenInfo {
    /// Framebuffer width in pixels.
    pub width: u16,
    /// Framebuffer height in pixels.
    pub height: u16,
    /// Text columns.
    pub cols: u16,
    /// Text rows.
    pub rows: u16,
}

/// A raw RGB565 framebuffer handed out for screenshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// Little-endian RGB565 pixels, row-major.
    pub rgb565: Vec<u8>,
}

/// Effects the control channel can trigger on the device.
///
/// The display driver, keyboard queue, and script VM are external
/// collaborators; this trait is the narrow contract the control channel
/// needs from them.
pub trait ControlBackend {
    /// Grab the current framebuffer.
    fn screenshot(&mut self) -> Result<Framebuffer, ControlError>;

    /// Inject a printable character with modifier bits.
    fn inject_char(&mut self, ch: u8, mods: u8) -> Result<(), ControlError>;

    /// Inject a special key with modifier bits.
    fn inject_special(&mut self, key: SpecialKey, mods: u8) -> Result<(), ControlError>;

    /// Current screen geometry.
    fn screen_info(&self) -> ScreenInfo;

    /// Wait for the next rendered frame and return its text content.
    fn wait_frame_text(&mut self) -> Result<Vec<u8>, ControlError>;

    /// Wait for the next rendered frame and return its draw primitives.
    fn wait_frame_primitives(&mut self) -> Result<Vec<u8>, ControlError>;

    /// Run a source string in the script VM; the result arrives
    /// JSON-encoded.
    fn lua_exec(&mut self, source: &str) -> Result<String, ControlError>;
}

/// A complete request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Command byte.
    pub command: u8,
    /// Command payload.
    pub payload: Vec<u8>,
}

/// A complete response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// `STATUS_OK` or `STATUS_ERR`.
    pub status: u8,
    /// Response data (error text for `STATUS_ERR`).
    pub data: Vec<u8>,
}

impl ResponseFrame {
    fn ok(data: Vec<u8>) -> Self {
        Self { status: STATUS_OK, data }
    }

    fn err(error: &ControlError) -> Self {
        Self { status: STATUS_ERR, data: error.to_string().into_bytes() }
    }

    /// Serialize as `status(1) | len(2 LE) | data`. Data beyond 64 KiB
    /// is truncated; no legitimate response approaches that.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let len = self.data.len().min(usize::from(u16::MAX));
        let mut wire = Vec::with_capacity(3 + len);
        wire.push(self.status);
        wire.extend_from_slice(&(len as u16).to_le_bytes());
        wire.extend_from_slice(&self.data[..len]);
        wire
    }
}

enum ParserState {
    AwaitCommand,
    AwaitLenLow { command: u8 },
    AwaitLenHigh { command: u8, low: u8 },
    AwaitPayload { command: u8, remaining: usize, payload: Vec<u8> },
}

/// Byte-at-a-time request parser with an inter-byte timeout.
pub struct ControlParser<I> {
    state: ParserState,
    last_byte: Option<I>,
}

impl<I: MeshInstant> ControlParser<I> {
    /// Create a parser awaiting a command byte.
    #[must_use]
    pub fn new() -> Self {
        Self { state: ParserState::AwaitCommand, last_byte: None }
    }

    /// Feed one byte; returns a frame when one completes.
    ///
    /// A silence longer than [`INTER_BYTE_TIMEOUT`] before this byte
    /// abandons any half-received frame and restarts at the command
    /// byte; the host side recovers from desync by pausing.
    pub fn feed(&mut self, byte: u8, now: I) -> Option<RequestFrame> {
        if let Some(last) = self.last_byte {
            if now - last > INTER_BYTE_TIMEOUT {
                self.state = ParserState::AwaitCommand;
            }
        }
        self.last_byte = Some(now);

        match std::mem::replace(&mut self.state, ParserState::AwaitCommand) {
            ParserState::AwaitCommand => {
                self.state = ParserState::AwaitLenLow { command: byte };
                None
            },
            ParserState::AwaitLenLow { command } => {
                self.state = ParserState::AwaitLenHigh { command, low: byte };
                None
            },
            ParserState::AwaitLenHigh { command, low } => {
                let len = usize::from(u16::from_le_bytes([low, byte]));
                if len == 0 {
                    return Some(RequestFrame { command, payload: Vec::new() });
                }
                self.state = ParserState::AwaitPayload {
                    command,
                    remaining: len,
                    payload: Vec::with_capacity(len),
                };
                None
            },
            ParserState::AwaitPayload { command, remaining, mut payload } => {
                payload.push(byte);
                if remaining == 1 {
                    return Some(RequestFrame { command, payload });
                }
                self.state =
                    ParserState::AwaitPayload { command, remaining: remaining - 1, payload };
                None
            },
        }
    }
}

impl<I: MeshInstant> Default for ControlParser<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Parser and dispatcher bound together over one byte pipe.
///
/// The transport (USB CDC in production, a byte vector in tests) feeds
/// raw bytes in and writes the returned response frames back out.
pub struct ControlChannel<I, B> {
    parser: ControlParser<I>,
    backend: B,
}

impl<I: MeshInstant, B: ControlBackend> ControlChannel<I, B> {
    /// Create a channel over a backend.
    pub fn new(backend: B) -> Self {
        Self { parser: ControlParser::new(), backend }
    }

    /// Feed received bytes; returns the encoded response for every
    /// complete request they finish.
    pub fn feed(&mut self, bytes: &[u8], now: I) -> Vec<Vec<u8>> {
        let mut responses = Vec::new();
        for &byte in bytes {
            if let Some(frame) = self.parser.feed(byte, now) {
                responses.push(handle_request(&frame, &mut self.backend).encode());
            }
        }
        responses
    }

    /// The backend, for test setup and teardown.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// Execute one request against the backend.
pub fn handle_request<B: ControlBackend>(frame: &RequestFrame, backend: &mut B) -> ResponseFrame {
    match dispatch(frame, backend) {
        Ok(data) => ResponseFrame::ok(data),
        Err(error) => {
            tracing::debug!(%error, command = frame.command, "control request failed");
            ResponseFrame::err(&error)
        },
    }
}

fn dispatch<B: ControlBackend>(
    frame: &RequestFrame,
    backend: &mut B,
) -> Result<Vec<u8>, ControlError> {
    match frame.command {
        commands::PING => Ok(b"PONG".to_vec()),
        commands::SCREENSHOT => {
            let framebuffer = backend.screenshot()?;
            Ok(rle_encode(&framebuffer.rgb565))
        },
        commands::KEY_CHAR => {
            let [ch, mods] = take_two(&frame.payload)?;
            backend.inject_char(ch, mods)?;
            Ok(Vec::new())
        },
        commands::KEY_SPECIAL => {
            let [code, mods] = take_two(&frame.payload)?;
            let key = SpecialKey::from_code(code)
                .ok_or(ControlError::BadRequest("unknown special key"))?;
            backend.inject_special(key, mods)?;
            Ok(Vec::new())
        },
        commands::SCREEN_INFO => {
            serde_json::to_vec(&backend.screen_info())
                .map_err(|e| ControlError::Backend(e.to_string()))
        },
        commands::WAIT_FRAME_TEXT => backend.wait_frame_text(),
        commands::WAIT_FRAME_PRIMITIVES => backend.wait_frame_primitives(),
        commands::LUA_EXEC => {
            let source = std::str::from_utf8(&frame.payload)
                .map_err(|_| ControlError::BadRequest("script is not UTF-8"))?;
            Ok(backend.lua_exec(source)?.into_bytes())
        },
        other => Err(ControlError::UnknownCommand(other)),
    }
}

fn take_two(payload: &[u8]) -> Result<[u8; 2], ControlError> {
    payload
        .get(..2)
        .and_then(|bytes| <[u8; 2]>::try_from(bytes).ok())
        .ok_or(ControlError::BadRequest("expected two payload bytes"))
}

/// Encode bytes for the screenshot response.
///
/// Mirrors the tile decoder's grammar: `0xFF count value` runs, literals
/// otherwise. Runs shorter than three bytes stay literal (no gain), with
/// one exception: a literal `0xFF` must be escaped as a run of one.
#[must_use]
pub fn rle_encode(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() / 2);
    let mut at = 0;

    while at < data.len() {
        let value = data[at];
        let mut run = 1;
        while run < 255 && at + run < data.len() && data[at + run] == value {
            run += 1;
        }

        if run >= 3 || value == 0xFF {
            output.extend_from_slice(&[0xFF, run as u8, value]);
        } else {
            output.extend(std::iter::repeat_n(value, run));
        }
        at += run;
    }
    output
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use meshcore_core::env::TickInstant;

    use super::*;

    struct MockBackend {
        chars: Vec<(u8, u8)>,
        specials: Vec<(SpecialKey, u8)>,
    }

    impl MockBackend {
        fn new() -> Self {
            Self { chars: Vec::new(), specials: Vec::new() }
        }
    }

    impl ControlBackend for MockBackend {
        fn screenshot(&mut self) -> Result<Framebuffer, ControlError> {
            Ok(Framebuffer { width: 4, height: 1, rgb565: vec![0x1F, 0x00, 0x1F, 0x00] })
        }

        fn inject_char(&mut self, ch: u8, mods: u8) -> Result<(), ControlError> {
            self.chars.push((ch, mods));
            Ok(())
        }

        fn inject_special(&mut self, key: SpecialKey, mods: u8) -> Result<(), ControlError> {
            self.specials.push((key, mods));
            Ok(())
        }

        fn screen_info(&self) -> ScreenInfo {
            ScreenInfo { width: 320, height: 240, cols: 53, rows: 30 }
        }

        fn wait_frame_text(&mut self) -> Result<Vec<u8>, ControlError> {
            Ok(b"frame-text".to_vec())
        }

        fn wait_frame_primitives(&mut self) -> Result<Vec<u8>, ControlError> {
            Ok(b"frame-prims".to_vec())
        }

        fn lua_exec(&mut self, source: &str) -> Result<String, ControlError> {
            Ok(format!("{{\"ran\":\"{source}\"}}"))
        }
    }

    fn at(ms: u64) -> TickInstant {
        TickInstant::from_millis(ms)
    }

    fn feed_all(parser: &mut ControlParser<TickInstant>, bytes: &[u8]) -> Option<RequestFrame> {
        let mut frame = None;
        for (i, &byte) in bytes.iter().enumerate() {
            frame = parser.feed(byte, at(i as u64));
        }
        frame
    }

    #[test]
    fn parses_zero_length_request() {
        let mut parser = ControlParser::new();
        let frame = feed_all(&mut parser, &[commands::PING, 0, 0]).unwrap();
        assert_eq!(frame.command, commands::PING);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn parses_payload_request() {
        let mut parser = ControlParser::new();
        let frame = feed_all(&mut parser, &[commands::KEY_CHAR, 2, 0, b'a', MOD_SHIFT]).unwrap();
        assert_eq!(frame.command, commands::KEY_CHAR);
        assert_eq!(frame.payload, vec![b'a', MOD_SHIFT]);
    }

    #[test]
    fn silence_resets_the_parser() {
        let mut parser = ControlParser::new();
        assert!(parser.feed(commands::LUA_EXEC, at(0)).is_none());
        assert!(parser.feed(5, at(10)).is_none());

        // 150 ms of silence: the half-frame is abandoned and this byte
        // starts a fresh request.
        assert!(parser.feed(commands::PING, at(160)).is_none());
        assert!(parser.feed(0, at(161)).is_none());
        let frame = parser.feed(0, at(162)).unwrap();
        assert_eq!(frame.command, commands::PING);
    }

    #[test]
    fn exactly_100ms_gap_is_tolerated() {
        let mut parser = ControlParser::new();
        assert!(parser.feed(commands::PING, at(0)).is_none());
        assert!(parser.feed(0, at(100)).is_none());
        assert!(parser.feed(0, at(200)).unwrap().command == commands::PING);
    }

    #[test]
    fn ping_answers_pong() {
        let mut backend = MockBackend::new();
        let response = handle_request(
            &RequestFrame { command: commands::PING, payload: Vec::new() },
            &mut backend,
        );
        assert_eq!(response.status, STATUS_OK);
        assert_eq!(response.data, b"PONG");
    }

    #[test]
    fn key_injection_reaches_backend() {
        let mut backend = MockBackend::new();

        let _ = handle_request(
            &RequestFrame { command: commands::KEY_CHAR, payload: vec![b'x', MOD_CTRL] },
            &mut backend,
        );
        let _ = handle_request(
            &RequestFrame { command: commands::KEY_SPECIAL, payload: vec![5, 0] },
            &mut backend,
        );

        assert_eq!(backend.chars, vec![(b'x', MOD_CTRL)]);
        assert_eq!(backend.specials, vec![(SpecialKey::Enter, 0)]);
    }

    #[test]
    fn unknown_special_key_is_an_error() {
        let mut backend = MockBackend::new();
        let response = handle_request(
            &RequestFrame { command: commands::KEY_SPECIAL, payload: vec![200, 0] },
            &mut backend,
        );
        assert_eq!(response.status, STATUS_ERR);
    }

    #[test]
    fn screen_info_is_json() {
        let mut backend = MockBackend::new();
        let response = handle_request(
            &RequestFrame { command: commands::SCREEN_INFO, payload: Vec::new() },
            &mut backend,
        );
        assert_eq!(response.status, STATUS_OK);

        let json: serde_json::Value = serde_json::from_slice(&response.data).unwrap();
        assert_eq!(json["width"], 320);
        assert_eq!(json["rows"], 30);
    }

    #[test]
    fn unknown_command_is_an_error() {
        let mut backend = MockBackend::new();
        let response =
            handle_request(&RequestFrame { command: 0x7F, payload: Vec::new() }, &mut backend);
        assert_eq!(response.status, STATUS_ERR);
    }

    #[test]
    fn response_encoding_layout() {
        let wire = ResponseFrame::ok(b"PONG".to_vec()).encode();
        assert_eq!(wire, [0x00, 0x04, 0x00, b'P', b'O', b'N', b'G']);
    }

    #[test]
    fn rle_encode_compresses_runs_and_escapes_sentinel() {
        assert_eq!(rle_encode(&[0x41; 5]), [0xFF, 5, 0x41]);
        assert_eq!(rle_encode(&[1, 2, 3]), [1, 2, 3]);
        assert_eq!(rle_encode(&[0xFF]), [0xFF, 1, 0xFF]);
    }

    #[test]
    fn long_runs_split_at_255() {
        let encoded = rle_encode(&[0u8; 300]);
        assert_eq!(encoded, [0xFF, 255, 0, 0xFF, 45, 0]);
    }

    #[test]
    fn timeout_window_in_sync_with_duration() {
        assert_eq!(INTER_BYTE_TIMEOUT, Duration::from_millis(100));
    }

    #[test]
    fn channel_answers_back_to_back_requests() {
        let mut channel: ControlChannel<TickInstant, _> = ControlChannel::new(MockBackend::new());

        let mut wire = vec![commands::PING, 0, 0];
        wire.extend_from_slice(&[commands::KEY_CHAR, 2, 0, b'q', 0]);

        let responses = channel.feed(&wire, at(0));
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0], ResponseFrame::ok(b"PONG".to_vec()).encode());
        assert_eq!(responses[1][0], STATUS_OK);
        assert_eq!(channel.backend_mut().chars, vec![(b'q', 0)]);
    }
}
