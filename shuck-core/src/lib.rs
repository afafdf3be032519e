//! # shuck-core
//!
//! Core components for the shuck extraction framework:
//!
//! - [`error`]: the `ShuckError` type and `Result` alias
//! - [`crc`]: CRC-32 accumulator shared by transformers and codecs
//! - [`entry`]: normalized archive member metadata
//! - [`source`]: monitored byte sources with pushback and the two skip
//!   strategies (seek vs read-and-discard)
//!
//! ## Architecture
//!
//! ```text
//! raw bytes -> transformer (0..n, shuck-archive) -> header codec
//!           -> selection -> action -> link resolution
//! ```
//!
//! This crate holds the pieces every layer above shares; it knows
//! nothing about any particular container or compression format.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod crc;
pub mod entry;
pub mod error;
pub mod source;

// Re-exports for convenience
pub use crc::Crc32;
pub use entry::{EntryKind, EntryMetadata, sanitize_path};
pub use error::{Result, ShuckError};
pub use source::{ByteSource, Monitor, SeekSource, StreamSource};
