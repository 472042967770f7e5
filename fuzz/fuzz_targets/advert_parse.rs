//! Fuzz target for Advert::parse and app-data field parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use meshcore_proto::Advert;

fuzz_target!(|data: &[u8]| {
    let Ok(advert) = Advert::parse(data) else {
        return;
    };

    // Field parsing must not panic either way; a parsed name must sit
    // inside the app-data bytes.
    if let Ok(fields) = advert.app_data_fields() {
        if let Some(name) = fields.name {
            assert!(name.len() <= advert.app_data().len());
        }
    }
});
