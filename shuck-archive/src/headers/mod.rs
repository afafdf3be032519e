//! Per-entry header codecs.
//!
//! One codec per container format (tar, cpio, ar). A codec consumes
//! entry headers (including any continuation entries that only carry
//! metadata, like GNU long names) and hands the driver a normalized
//! [`EntryMetadata`]; the entry's data bytes stay in the stream for
//! the driver to act on or skip.

use shuck_core::entry::EntryMetadata;
use shuck_core::error::Result;
use shuck_core::source::ByteSource;

pub mod ar;
pub mod cpio;
pub mod tar;

pub use ar::ArCodec;
pub use cpio::CpioCodec;
pub use tar::{TarCodec, TarHeader, TarWriter};

/// Parses one container format's entry headers.
pub trait HeaderCodec: Send {
    /// Parse the next entry header.
    ///
    /// Returns `Ok(None)` at end-of-archive. `offset` is the archive
    /// byte position of the header, for error reporting only.
    fn next_entry(
        &mut self,
        src: &mut dyn ByteSource,
        offset: u64,
    ) -> Result<Option<EntryMetadata>>;

    /// Padding bytes that follow an entry of `size` data bytes.
    fn data_padding(&self, size: u64) -> u64;
}

/// Parse a NUL- or space-terminated field as text.
pub(crate) fn field_str(data: &[u8]) -> String {
    let end = data
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end])
        .trim_end()
        .to_string()
}

/// Parse an octal text field; empty fields read as zero.
pub(crate) fn parse_octal(data: &[u8]) -> Option<u64> {
    let s = field_str(data);
    let s = s.trim();
    if s.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(s, 8).ok()
}
