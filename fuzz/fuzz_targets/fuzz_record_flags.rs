//! Fuzz target for the flags word.
//!
//! Any 64-bit value must classify without panicking, and the accessors must
//! agree with the documented bit layout.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sqlkv_types::{CompressionKind, RecordFlags};

fuzz_target!(|bits: i64| {
    let flags = RecordFlags::from_bits(bits);
    assert_eq!(flags.bits(), bits);
    assert_eq!(flags.is_soft_deleted(), bits & RecordFlags::SOFT_DELETED != 0);
    assert_eq!(i64::from(flags.dictionary_version()), (bits & RecordFlags::VERSION_MASK) >> 8);

    match flags.compression_kind() {
        CompressionKind::Dictionary(version) => {
            assert_ne!(bits & RecordFlags::DICTIONARY, 0);
            assert_eq!(version, flags.dictionary_version());
        },
        CompressionKind::Zstd => assert_ne!(bits & RecordFlags::COMPRESSED, 0),
        CompressionKind::Raw => {
            assert_eq!(bits & (RecordFlags::COMPRESSED | RecordFlags::DICTIONARY), 0);
        },
    }

    let toggled = flags.with_soft_deleted(!flags.is_soft_deleted());
    assert_eq!(toggled.compression_kind(), flags.compression_kind());
    assert_eq!(toggled.bits() ^ bits, RecordFlags::SOFT_DELETED);
    let _ = flags.to_string();
});
