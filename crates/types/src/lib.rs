//! Core types shared by the sqlkv crates.
//!
//! This crate provides:
//! - The per-row flags word and its bit layout
//! - Postcard payload serialization with snafu errors
//! - A hybrid logical clock for causally ordered timestamps
//! - Random key generation
//! - Per-call cancellation contexts
//! - Validated configuration structs

pub mod codec;
pub mod config;
pub mod context;
pub mod flags;
pub mod hlc;
pub mod idgen;

pub use codec::CodecError;
pub use context::{Context, ContextError};
pub use flags::{CompressionKind, RecordFlags};
pub use hlc::{ClockError, HlcTimestamp, HybridClock, SystemTimeSource, TimeSource};
pub use idgen::generate_id;
