//! Proptest strategies for sqlkv types.
//!
//! # Usage
//!
//! ```no_run
//! use sqlkv_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(name in strategies::arb_identifier()) {
//!         prop_assert!(!name.is_empty());
//!     }
//! }
//! ```

use proptest::prelude::*;
use sqlkv_types::{CompressionKind, RecordFlags, config::CompressionMode};

/// Generates a valid SQL identifier: `[a-z_][a-z0-9_]{0,15}`.
pub fn arb_identifier() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,15}"
}

/// Generates an arbitrary payload of 0-511 random bytes.
pub fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..512)
}

/// Generates free text including non-ASCII characters.
pub fn arb_text() -> impl Strategy<Value = String> {
    "\\PC{0,80}"
}

/// Generates an optional short phone-like string.
pub fn arb_phone() -> impl Strategy<Value = Option<String>> {
    proptest::option::of("[0-9]{3}-[0-9]{4}")
}

/// Generates every compression mode.
pub fn arb_compression_mode() -> impl Strategy<Value = CompressionMode> {
    prop_oneof![
        Just(CompressionMode::None),
        Just(CompressionMode::Zstd),
        Just(CompressionMode::Dictionary),
    ]
}

/// Generates a compression kind, with dictionary versions 1-255.
pub fn arb_compression_kind() -> impl Strategy<Value = CompressionKind> {
    prop_oneof![
        Just(CompressionKind::Raw),
        Just(CompressionKind::Zstd),
        (1u8..=255).prop_map(CompressionKind::Dictionary),
    ]
}

/// Generates well-formed flags, soft-deleted or not.
pub fn arb_flags() -> impl Strategy<Value = RecordFlags> {
    (arb_compression_kind(), any::<bool>())
        .prop_map(|(kind, deleted)| RecordFlags::for_compression(kind).with_soft_deleted(deleted))
}

/// Generates `(start, reserve)` pairs for counters.
pub fn arb_counter_params() -> impl Strategy<Value = (i64, i64)> {
    (0i64..1_000, 1i64..50)
}
