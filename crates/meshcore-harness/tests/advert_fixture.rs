//! Interop fixture: the ADVERT a node with a known seed must produce.

use meshcore_crypto::{Keypair, verify};
use meshcore_proto::{Advert, AppDataBuilder, NodeRole};

#[test]
fn known_seed_advert_round_trip() {
    let keypair = Keypair::from_seed(&[0x01; 32]);
    let pubkey = keypair.public_key();
    assert_eq!(keypair.path_hash(), pubkey[0]);

    let app_data = AppDataBuilder::new().role(NodeRole::Chat).name("Alice").build().unwrap();
    assert_eq!(app_data[0], 0x81);
    assert_eq!(&app_data[1..], b"Alice");

    let timestamp = 0x0000_0001u32;
    let mut signing = Vec::new();
    signing.extend_from_slice(&pubkey);
    signing.extend_from_slice(&timestamp.to_le_bytes());
    signing.extend_from_slice(&app_data);
    let signature = keypair.sign(&signing);

    let advert = Advert::new(pubkey, timestamp, signature, &app_data).unwrap();

    // The wire payload parses back and the signature checks against the
    // reconstructed signed message.
    let mut payload = [0u8; meshcore_proto::advert::ADVERT_MAX_SIZE];
    let len = advert.encode(&mut payload).unwrap();
    assert_eq!(len, 100 + app_data.len());

    let parsed = Advert::parse(&payload[..len]).unwrap();
    assert_eq!(parsed.pubkey, pubkey);
    assert_eq!(parsed.timestamp, 1);
    assert!(verify(&parsed.signing_data(), &parsed.signature, &parsed.pubkey));

    let fields = parsed.app_data_fields().unwrap();
    assert_eq!(fields.name, Some("Alice"));
    assert_eq!(fields.role, NodeRole::Chat);
    assert!(fields.location.is_none());
}

#[test]
fn signature_does_not_survive_field_tamper() {
    let keypair = Keypair::from_seed(&[0x01; 32]);
    let app_data = AppDataBuilder::new().role(NodeRole::Chat).name("Alice").build().unwrap();

    let mut signing = Vec::new();
    signing.extend_from_slice(&keypair.public_key());
    signing.extend_from_slice(&1u32.to_le_bytes());
    signing.extend_from_slice(&app_data);
    let signature = keypair.sign(&signing);

    // Same signature, bumped timestamp: must not verify.
    let tampered = Advert::new(keypair.public_key(), 2, signature, &app_data).unwrap();
    assert!(!verify(&tampered.signing_data(), &tampered.signature, &tampered.pubkey));
}
