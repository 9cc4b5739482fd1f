//! Fuzz target for stored payload decoding.
//!
//! Arbitrary bytes and flags fed to `Codec::decode_bytes` and `Codec::decode`
//! must never panic. Raw payloads that decode as a record must survive a
//! re-encode under every compression path.

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde::{Deserialize, Serialize};
use sqlkv_store::{Codec, EncodeOptions};
use sqlkv_types::{CompressionKind, Context, RecordFlags, config::CompressionConfig};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Record {
    name: String,
    tags: Vec<String>,
    score: Option<i64>,
    blob: Vec<u8>,
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let ctx = Context::background();
    let Ok(codec) = Codec::new(CompressionConfig::default()) else {
        return;
    };

    let flags = RecordFlags::from_bits(i64::from(i16::from_le_bytes([data[0], data[1]])));
    let payload = &data[2..];

    // Without a dictionary store, dictionary flags must fail cleanly.
    let decoded = codec.decode_bytes(&ctx, payload, flags, "fuzz");
    if let CompressionKind::Dictionary(_) = flags.compression_kind() {
        assert!(decoded.is_err(), "dictionary payload decoded without a dictionary");
    }

    if let Ok(record) = codec.decode::<Record>(&ctx, payload, RecordFlags::empty(), "fuzz") {
        for compress in [false, true] {
            let options = EncodeOptions { compress, ..EncodeOptions::default() };
            let encoded = codec.encode(&ctx, &record, &options).expect("encode decoded record");
            let again: Record = codec
                .decode(&ctx, &encoded.payload, encoded.flags, "fuzz")
                .expect("decode re-encoded record");
            assert_eq!(again, record, "roundtrip mismatch");
        }
    }
});
