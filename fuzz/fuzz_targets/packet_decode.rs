//! Fuzz target for Packet::decode.
//!
//! Arbitrary bytes must never panic the codec, and every accepted packet
//! must re-encode to exactly the input bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use meshcore_proto::Packet;

fuzz_target!(|data: &[u8]| {
    let Ok(packet) = Packet::decode(data) else {
        return;
    };

    let mut wire = [0u8; Packet::MAX_SIZE];
    let n = packet.encode(&mut wire).expect("decoded packet must re-encode");
    assert_eq!(&wire[..n], data);
});
