//! Record payload serialization.
//!
//! Payloads are postcard-encoded. A stored payload holds exactly one record,
//! so decoding rejects input with bytes left over after the value.

use serde::{Serialize, de::DeserializeOwned};
use snafu::{ResultExt, Snafu};

/// Error type for payload serialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CodecError {
    /// Encoding failed.
    #[snafu(display("Encoding failed: {source}"))]
    Encode {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// Decoding failed.
    #[snafu(display("Decoding failed: {source}"))]
    Decode {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// Input continued past the end of the decoded value.
    #[snafu(display("Decoding failed: {count} trailing bytes after value"))]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
}

/// Serializes a record into payload bytes.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).context(EncodeSnafu)
}

/// Deserializes payload bytes into a record.
///
/// # Errors
///
/// Returns `CodecError::Decode` if the bytes are not a valid encoding of `T`,
/// or `CodecError::TrailingBytes` if anything follows the value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    let (value, rest) = postcard::take_from_bytes(bytes).context(DecodeSnafu)?;
    if !rest.is_empty() {
        return TrailingBytesSnafu { count: rest.len() }.fail();
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use proptest::prelude::*;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Visit {
        id: i64,
        clinic: String,
        notes: Option<String>,
        vitals: Vec<u16>,
    }

    fn visit() -> Visit {
        Visit {
            id: 7,
            clinic: "north".to_string(),
            notes: Some("follow up in 2 weeks".to_string()),
            vitals: vec![120, 80, 72],
        }
    }

    #[test]
    fn test_roundtrip_record() {
        let original = visit();
        let bytes = encode(&original).expect("encode");
        let decoded: Visit = decode(&bytes).expect("decode");
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = encode(&visit()).unwrap();
        bytes.extend_from_slice(&[0, 0]);
        let err = decode::<Visit>(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::TrailingBytes { count: 2 }), "got: {err:?}");
    }

    #[test]
    fn test_decode_truncated_payload() {
        let bytes = encode(&visit()).unwrap();
        let err = decode::<Visit>(&bytes[..3]).unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
        assert!(err.to_string().starts_with("Decoding failed:"));
    }

    #[test]
    fn test_decode_empty_input() {
        let result: Result<u64, _> = decode(&[]);
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }

    #[test]
    fn test_codec_error_source_chain() {
        use std::error::Error;

        let err = decode::<String>(&[0xFF]).unwrap_err();
        assert!(err.source().is_some(), "postcard error should be preserved");
    }

    proptest! {
        #[test]
        fn prop_roundtrip_arbitrary_visit(
            id in any::<i64>(),
            clinic in "[a-z ]{0,32}",
            notes in proptest::option::of("\\PC{0,64}"),
            vitals in proptest::collection::vec(any::<u16>(), 0..16),
        ) {
            let original = Visit { id, clinic, notes, vitals };
            let decoded: Visit = decode(&encode(&original).unwrap()).unwrap();
            prop_assert_eq!(original, decoded);
        }
    }
}
