//! Worker request and result types.
//!
//! A [`Request`] owns its input buffers outright; ownership moves into
//! the queue at submission and comes back as the single [`WorkerResult`]
//! for that request's [`Token`]. Nothing is shared between the threads
//! except the two bounded channels.

use thiserror::Error;

/// Largest file the READ operation will load whole.
pub const MAX_FILE_SIZE: u64 = 512 * 1024;

/// Longest accepted path, in bytes.
pub const MAX_PATH_LEN: usize = 128;

/// Largest JSON document moved through JSON_READ / JSON_WRITE.
pub const MAX_JSON_SIZE: usize = 16_384;

/// Largest inline MAC key.
pub const MAX_INLINE_KEY: usize = 32;

/// Opaque continuation token pairing a result to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub(crate) u64);

impl Token {
    /// Raw token value, for diagnostics.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Operations the worker performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Read a whole file (rejects files over [`MAX_FILE_SIZE`]).
    Read {
        /// Device path (`/sd/...` routes to removable storage).
        path: String,
    },
    /// Read a byte range; `len` clamps to end-of-file.
    ReadBytes {
        /// Device path.
        path: String,
        /// Start offset.
        offset: u64,
        /// Bytes to read.
        len: usize,
    },
    /// Replace a file's contents, creating it if missing.
    Write {
        /// Device path.
        path: String,
        /// New contents.
        data: Vec<u8>,
    },
    /// Positional write preserving content outside the range.
    WriteBytes {
        /// Device path.
        path: String,
        /// Start offset.
        offset: u64,
        /// Bytes to write.
        data: Vec<u8>,
    },
    /// Append to a file, creating it if missing.
    Append {
        /// Device path.
        path: String,
        /// Bytes to append.
        data: Vec<u8>,
    },
    /// Whether a path exists.
    Exists {
        /// Device path.
        path: String,
    },
    /// Read a JSON document as raw text; parsing stays on the main
    /// thread.
    JsonRead {
        /// Device path.
        path: String,
    },
    /// Write a JSON document.
    JsonWrite {
        /// Device path.
        path: String,
        /// Serialized document.
        text: String,
    },
    /// Read a byte range and RLE-decode it.
    RleRead {
        /// Device path.
        path: String,
        /// Start offset of the compressed region.
        offset: u64,
        /// Compressed length.
        len: usize,
    },
    /// Read, RLE-decode, and unpack a 3-bit indexed tile to RGB565.
    RleReadRgb565 {
        /// Device path.
        path: String,
        /// Start offset of the compressed region.
        offset: u64,
        /// Compressed length.
        len: usize,
        /// 8-entry RGB565 palette.
        palette: [u16; 8],
    },
    /// Bulk AES-128-ECB encryption (zero-pads to a block multiple).
    AesEncrypt {
        /// Cipher key.
        key: [u8; 16],
        /// Plaintext.
        data: Vec<u8>,
    },
    /// Bulk AES-128-ECB decryption (input must be block-aligned).
    AesDecrypt {
        /// Cipher key.
        key: [u8; 16],
        /// Ciphertext.
        data: Vec<u8>,
    },
    /// Full-width HMAC-SHA256.
    HmacSha256 {
        /// MAC key, at most [`MAX_INLINE_KEY`] bytes.
        key: Vec<u8>,
        /// Message.
        data: Vec<u8>,
    },
}

/// Successful operation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Raw bytes (reads, decodes, crypto).
    Bytes(Vec<u8>),
    /// Text (JSON reads).
    Text(String),
    /// Flags (writes, existence checks).
    Bool(bool),
}

/// One result per accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerResult {
    /// Token of the originating request.
    pub token: Token,
    /// Output on success, the failure otherwise. A failed operation
    /// carries no output buffer.
    pub outcome: Result<Output, WorkerError>,
}

/// Worker-side failures, surfaced inside [`WorkerResult`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Filesystem failure.
    #[error("i/o error: {0}")]
    Io(String),

    /// File exceeds a size limit.
    #[error("too large: {size} bytes (max {max})")]
    TooLarge {
        /// Observed size.
        size: u64,
        /// Limit.
        max: u64,
    },

    /// Path exceeds [`MAX_PATH_LEN`].
    #[error("path too long: {0} bytes")]
    PathTooLong(usize),

    /// Path escapes the storage roots.
    #[error("invalid path")]
    InvalidPath,

    /// MAC key exceeds [`MAX_INLINE_KEY`].
    #[error("key too long: {0} bytes")]
    KeyTooLong(usize),

    /// Ciphertext not block-aligned.
    #[error("misaligned input: {0} bytes")]
    Misaligned(usize),

    /// RLE stream ended inside a run header.
    #[error("truncated rle stream")]
    RleTruncated,

    /// RLE output exceeded its budget.
    #[error("rle output over budget of {0} bytes")]
    RleOverBudget(usize),

    /// Decoded tile is not exactly the expected indexed size.
    #[error("bad tile size: {0} bytes")]
    BadTileSize(usize),
}
