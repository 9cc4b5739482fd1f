//! Record encoding with optional compression.
//!
//! A record is postcard-serialized, then optionally zstd-compressed, either
//! generically or against a trained dictionary. The flags word stored next to
//! the payload records which path was taken and, for dictionary compression,
//! the dictionary version, so decoding never depends on the current mode.

use std::{fmt, io::Read, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use sqlkv_types::{
    CompressionKind, Context, RecordFlags, codec,
    config::CompressionConfig,
};

use crate::{
    db::Database,
    dictionary::DictionaryStore,
    error::{Error, Result},
};

/// How [`Codec::encode`] should store a payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions<'a> {
    /// Compress the serialized bytes.
    pub compress: bool,
    /// Compress against a dictionary instead of generically.
    pub use_dictionary: bool,
    /// Dictionary owner, usually the table name.
    pub dictionary_key: &'a str,
    /// Dictionary version to compress with; must be non-zero when
    /// `use_dictionary` is set.
    pub dictionary_version: u8,
}

/// A payload plus the flags describing how to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    /// Compression bits and dictionary version.
    pub flags: RecordFlags,
    /// Stored bytes.
    pub payload: Vec<u8>,
}

/// Serializes and compresses records.
///
/// Cheap to share; clone the `Arc` it usually lives in.
pub struct Codec {
    config: CompressionConfig,
    dictionaries: Option<Arc<DictionaryStore>>,
}

impl Codec {
    /// A codec without dictionary support.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn new(config: CompressionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, dictionaries: None })
    }

    /// A codec reading and writing dictionaries through `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn with_dictionaries(
        config: CompressionConfig,
        store: Arc<DictionaryStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, dictionaries: Some(store) })
    }

    /// Opens the dictionary table in `db` and returns a codec backed by it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid config or [`Error::Schema`] if
    /// the dictionary table cannot be created.
    pub fn open(ctx: &Context, db: Arc<Database>, config: CompressionConfig) -> Result<Self> {
        config.validate()?;
        let store = DictionaryStore::open(ctx, db, config.level)?;
        Ok(Self { config, dictionaries: Some(Arc::new(store)) })
    }

    /// The compression settings.
    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// The dictionary store, if any.
    pub fn dictionaries(&self) -> Option<&Arc<DictionaryStore>> {
        self.dictionaries.as_ref()
    }

    /// Serializes `record` and compresses it as `options` ask.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the record cannot be serialized,
    /// [`Error::MissingDictionary`] if a dictionary is requested but
    /// `dictionary_version` is 0 or not stored, and [`Error::Compression`] if
    /// zstd fails.
    pub fn encode<T: Serialize>(
        &self,
        ctx: &Context,
        record: &T,
        options: &EncodeOptions<'_>,
    ) -> Result<EncodedRecord> {
        let raw = codec::encode(record)?;
        self.encode_bytes(ctx, raw, options)
    }

    /// Compresses already-serialized bytes as `options` ask.
    ///
    /// # Errors
    ///
    /// Same as [`encode`](Self::encode), minus serialization.
    pub fn encode_bytes(
        &self,
        ctx: &Context,
        raw: Vec<u8>,
        options: &EncodeOptions<'_>,
    ) -> Result<EncodedRecord> {
        if !options.compress {
            return Ok(EncodedRecord { flags: RecordFlags::empty(), payload: raw });
        }
        if !options.use_dictionary {
            let payload = zstd::bulk::compress(&raw, self.config.level)?;
            return Ok(EncodedRecord {
                flags: RecordFlags::for_compression(CompressionKind::Zstd),
                payload,
            });
        }

        let dict = self.compiled(ctx, options.dictionary_key, options.dictionary_version)?;
        let payload =
            zstd::bulk::Compressor::with_prepared_dictionary(dict.encoder())?.compress(&raw)?;
        Ok(EncodedRecord {
            flags: RecordFlags::for_compression(CompressionKind::Dictionary(dict.version())),
            payload,
        })
    }

    /// Decompresses and deserializes a stored payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDictionary`] if `flags` name a dictionary
    /// version that is not stored, [`Error::Compression`] for corrupt
    /// compressed data, and [`Error::Serialization`] if the bytes are not a
    /// `T`.
    pub fn decode<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        payload: &[u8],
        flags: RecordFlags,
        dictionary_key: &str,
    ) -> Result<T> {
        let raw = self.decode_bytes(ctx, payload, flags, dictionary_key)?;
        Ok(codec::decode(&raw)?)
    }

    /// Decompresses a stored payload to its serialized bytes.
    ///
    /// # Errors
    ///
    /// As [`decode`](Self::decode), minus deserialization.
    pub fn decode_bytes(
        &self,
        ctx: &Context,
        payload: &[u8],
        flags: RecordFlags,
        dictionary_key: &str,
    ) -> Result<Vec<u8>> {
        match flags.compression_kind() {
            CompressionKind::Raw => Ok(payload.to_vec()),
            CompressionKind::Zstd => Ok(zstd::stream::decode_all(payload)?),
            CompressionKind::Dictionary(version) => {
                let dict = self.compiled(ctx, dictionary_key, version)?;
                let mut decoder =
                    zstd::stream::read::Decoder::with_prepared_dictionary(payload, dict.decoder())?;
                let mut raw = Vec::new();
                decoder.read_to_end(&mut raw)?;
                Ok(raw)
            },
        }
    }

    /// Trains a dictionary from `samples` and stores it as the next version
    /// of `key`. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] without a dictionary store or
    /// samples, [`Error::Compression`] if zstd cannot train on the samples,
    /// and [`Error::DictionaryExhausted`] after version 255.
    pub fn train(&self, ctx: &Context, key: &str, samples: &[Vec<u8>]) -> Result<u8> {
        let Some(store) = &self.dictionaries else {
            return Err(Error::invalid_argument("codec has no dictionary store"));
        };
        if samples.is_empty() {
            return Err(Error::invalid_argument(format!("no samples to train {key}")));
        }
        ctx.check()?;
        let dict = zstd::dict::from_samples(samples, self.config.dictionary_max_size)?;
        let version = store.append(ctx, key, &dict)?;
        tracing::info!(
            key,
            version,
            samples = samples.len(),
            size = dict.len(),
            "Trained compression dictionary"
        );
        Ok(version)
    }

    fn compiled(
        &self,
        ctx: &Context,
        key: &str,
        version: u8,
    ) -> Result<Arc<crate::dictionary::CompiledDictionary>> {
        match &self.dictionaries {
            Some(store) => store.compiled(ctx, key, version),
            None => Err(Error::MissingDictionary { key: key.to_string(), version }),
        }
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("config", &self.config)
            .field("dictionaries", &self.dictionaries.is_some())
            .finish()
    }
}
