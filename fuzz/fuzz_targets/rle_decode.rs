//! Fuzz target for the tile RLE decoder: output stays within budget,
//! truncated runs error, nothing panics.

#![no_main]

use libfuzzer_sys::fuzz_target;
use meshcore_worker::rle;

fuzz_target!(|data: &[u8]| {
    if let Ok(decoded) = rle::decode(data, rle::RLE_DECODE_BUDGET) {
        assert!(decoded.len() <= rle::RLE_DECODE_BUDGET);
    }
});
