//! RLE tile codec and RGB565 unpack.
//!
//! Map tiles are stored as 3-bit palette indices (256×256 pixels, 24 576
//! bytes) behind a byte-oriented RLE: the sentinel `0xFF` introduces a
//! `count, value` run, every other byte is literal. A literal `0xFF` can
//! only be expressed as a run of one.

use crate::request::WorkerError;

/// Decoded size of one 3-bit indexed tile (256 × 256 × 3 bits).
pub const TILE_3BIT_SIZE: usize = 24_576;

/// Decode budget: one tile plus a cushion for overshooting streams.
pub const RLE_DECODE_BUDGET: usize = TILE_3BIT_SIZE + 4096;

/// Size of one unpacked RGB565 tile (256 × 256 × 2 bytes).
pub const TILE_RGB565_SIZE: usize = 131_072;

/// RLE run sentinel.
const RUN_SENTINEL: u8 = 0xFF;

/// Decode an RLE stream.
///
/// # Errors
///
/// - `WorkerError::RleTruncated` if the stream ends inside a run header
/// - `WorkerError::RleOverBudget` if the output would exceed `budget`
pub fn decode(input: &[u8], budget: usize) -> Result<Vec<u8>, WorkerError> {
    let mut output = Vec::with_capacity(budget.min(TILE_3BIT_SIZE));
    let mut at = 0;

    while at < input.len() {
        if input[at] == RUN_SENTINEL {
            let [count, value] = *input
                .get(at + 1..at + 3)
                .and_then(|header| <&[u8; 2]>::try_from(header).ok())
                .ok_or(WorkerError::RleTruncated)?;
            if output.len() + usize::from(count) > budget {
                return Err(WorkerError::RleOverBudget(budget));
            }
            output.extend(std::iter::repeat_n(value, usize::from(count)));
            at += 3;
        } else {
            if output.len() == budget {
                return Err(WorkerError::RleOverBudget(budget));
            }
            output.push(input[at]);
            at += 1;
        }
    }
    Ok(output)
}

/// Unpack a 3-bit indexed tile into RGB565 pixels (little-endian).
///
/// Eight pixels come out of every three input bytes:
///
/// ```text
/// idx0 = b0 & 7          idx4 = (b1 >> 4) & 7
/// idx1 = (b0 >> 3) & 7   idx5 = (b1 >> 7) | ((b2 & 3) << 1)
/// idx2 = (b0 >> 6) | ((b1 & 1) << 2)
/// idx3 = (b1 >> 1) & 7   idx6 = (b2 >> 2) & 7
///                        idx7 = (b2 >> 5) & 7
/// ```
///
/// # Errors
///
/// `WorkerError::BadTileSize` unless the input is exactly
/// [`TILE_3BIT_SIZE`] bytes.
pub fn unpack_rgb565(indexed: &[u8], palette: &[u16; 8]) -> Result<Vec<u8>, WorkerError> {
    if indexed.len() != TILE_3BIT_SIZE {
        return Err(WorkerError::BadTileSize(indexed.len()));
    }

    let mut pixels = Vec::with_capacity(TILE_RGB565_SIZE);
    for triplet in indexed.chunks_exact(3) {
        let [b0, b1, b2] = [triplet[0], triplet[1], triplet[2]];
        let indices = [
            b0 & 0x07,
            (b0 >> 3) & 0x07,
            ((b0 >> 6) & 0x03) | ((b1 & 0x01) << 2),
            (b1 >> 1) & 0x07,
            (b1 >> 4) & 0x07,
            ((b1 >> 7) & 0x01) | ((b2 & 0x03) << 1),
            (b2 >> 2) & 0x07,
            (b2 >> 5) & 0x07,
        ];
        for index in indices {
            pixels.extend_from_slice(&palette[usize::from(index)].to_le_bytes());
        }
    }

    debug_assert_eq!(pixels.len(), TILE_RGB565_SIZE);
    Ok(pixels)
}
