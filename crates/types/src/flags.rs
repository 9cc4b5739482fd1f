//! Per-row flags word.
//!
//! ```text
//! bit 0      soft-deleted
//! bit 1      compressed
//! bit 2      dictionary-compressed
//! bits 8-15  dictionary version (0 = none)
//! ```
//!
//! Bits not listed are reserved and preserved untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a payload was compressed, as recorded in its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionKind {
    /// Stored uncompressed.
    Raw,
    /// Generic zstd.
    Zstd,
    /// zstd against the dictionary with the given version.
    Dictionary(u8),
}

/// The flags column of a stored row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordFlags(i64);

impl RecordFlags {
    /// Row is hidden from reads but still stored.
    pub const SOFT_DELETED: i64 = 0x1;
    /// Payload is compressed.
    pub const COMPRESSED: i64 = 0x2;
    /// Payload is compressed with a trained dictionary.
    pub const DICTIONARY: i64 = 0x4;
    /// Mask for the dictionary version byte.
    pub const VERSION_MASK: i64 = 0xff00;
    const VERSION_SHIFT: u32 = 8;

    /// Empty flags: live, uncompressed.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wraps a raw flags column value.
    pub const fn from_bits(bits: i64) -> Self {
        Self(bits)
    }

    /// Returns the raw column value.
    pub const fn bits(self) -> i64 {
        self.0
    }

    /// Flags for a payload written with `kind`.
    pub const fn for_compression(kind: CompressionKind) -> Self {
        match kind {
            CompressionKind::Raw => Self(0),
            CompressionKind::Zstd => Self(Self::COMPRESSED),
            CompressionKind::Dictionary(version) => Self(
                Self::COMPRESSED
                    | Self::DICTIONARY
                    | ((version as i64) << Self::VERSION_SHIFT),
            ),
        }
    }

    /// Whether the soft-delete bit is set.
    pub const fn is_soft_deleted(self) -> bool {
        self.0 & Self::SOFT_DELETED != 0
    }

    /// Returns a copy with the soft-delete bit set or cleared.
    #[must_use]
    pub const fn with_soft_deleted(self, deleted: bool) -> Self {
        if deleted { Self(self.0 | Self::SOFT_DELETED) } else { Self(self.0 & !Self::SOFT_DELETED) }
    }

    /// The dictionary version byte, 0 when none.
    pub const fn dictionary_version(self) -> u8 {
        ((self.0 & Self::VERSION_MASK) >> Self::VERSION_SHIFT) as u8
    }

    /// Decodes the compression bits.
    ///
    /// The dictionary bit wins over the plain compressed bit.
    pub const fn compression_kind(self) -> CompressionKind {
        if self.0 & Self::DICTIONARY != 0 {
            CompressionKind::Dictionary(self.dictionary_version())
        } else if self.0 & Self::COMPRESSED != 0 {
            CompressionKind::Zstd
        } else {
            CompressionKind::Raw
        }
    }
}

impl From<i64> for RecordFlags {
    fn from(bits: i64) -> Self {
        Self(bits)
    }
}

impl From<RecordFlags> for i64 {
    fn from(flags: RecordFlags) -> Self {
        flags.0
    }
}

impl fmt::Display for RecordFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.compression_kind() {
            CompressionKind::Raw => write!(f, "raw")?,
            CompressionKind::Zstd => write!(f, "zstd")?,
            CompressionKind::Dictionary(v) => write!(f, "dict:v{v}")?,
        }
        if self.is_soft_deleted() {
            write!(f, "+deleted")?;
        }
        Ok(())
    }
}
