//! Error types for shuck operations.
//!
//! One enum covers every failure the extraction stack can produce, from
//! signature mismatches during codec dispatch down to per-entry create
//! failures. Which variants abort a whole session and which are merely
//! reported per entry is decided by the session driver, not here.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for shuck operations.
#[derive(Debug, Error)]
pub enum ShuckError {
    /// I/O error from an underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// Stream signature does not match the expected codec.
    ///
    /// Recoverable by trying the next candidate codec; fatal if no
    /// candidate matches.
    #[error("format mismatch: expected {expected:02x?}, found {found:02x?}")]
    FormatMismatch {
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual bytes found at the head of the stream.
        found: Vec<u8>,
    },

    /// Checksum or structural validation of an entry header failed.
    #[error("corrupt header at offset {offset}: {message}")]
    CorruptHeader {
        /// Archive byte offset of the offending header.
        offset: u64,
        /// Description of the failure.
        message: String,
    },

    /// Fewer bytes read than the format requires.
    #[error("short read: wanted {wanted} bytes, got {got}")]
    ShortRead {
        /// Bytes the operation needed.
        wanted: u64,
        /// Bytes actually available.
        got: u64,
    },

    /// Fewer bytes written than requested.
    #[error("short write: wanted {wanted} bytes, wrote {got}")]
    ShortWrite {
        /// Bytes the operation tried to write.
        wanted: u64,
        /// Bytes actually written.
        got: u64,
    },

    /// An in-memory destination reached its size cap.
    #[error("memory output buffer full: cap is {limit} bytes")]
    BufferFull {
        /// The configured capacity.
        limit: usize,
    },

    /// A destination path could not be created or opened.
    ///
    /// Reported per entry; does not necessarily abort the archive.
    #[error("cannot create '{path}': {source}")]
    CreateError {
        /// The path that failed.
        path: PathBuf,
        /// The underlying OS error.
        source: io::Error,
    },

    /// The cancellation flag was observed; the whole operation unwinds.
    #[error("operation interrupted")]
    Interrupted,

    /// CRC of decompressed data does not match the stored value.
    #[error("CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// Expected CRC value from the stream.
        expected: u32,
        /// Computed CRC value over the data.
        computed: u32,
    },

    /// A selection pattern failed to compile.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending glob pattern.
        pattern: String,
        /// Description from the pattern parser.
        message: String,
    },

    /// A format feature this build does not handle.
    #[error("unsupported: {what}")]
    Unsupported {
        /// What was encountered.
        what: String,
    },
}

/// Result type alias for shuck operations.
pub type Result<T> = std::result::Result<T, ShuckError>;

/// Marker payload smuggled through `io::Error` by monitored sources so
/// that a cancellation observed inside a third-party codec's `Read`
/// loop survives the trip back out as [`ShuckError::Interrupted`].
#[derive(Debug)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation interrupted")
    }
}

impl std::error::Error for Cancelled {}

fn carries_cancel(err: &io::Error) -> bool {
    let mut cur: Option<&(dyn std::error::Error + 'static)> = err.get_ref().map(|e| e as _);
    while let Some(e) = cur {
        if e.is::<Cancelled>() {
            return true;
        }
        cur = e.source();
    }
    false
}

impl From<io::Error> for ShuckError {
    fn from(err: io::Error) -> Self {
        if carries_cancel(&err) {
            Self::Interrupted
        } else {
            Self::Io(err)
        }
    }
}

impl ShuckError {
    /// Create a format mismatch error.
    pub fn format_mismatch(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::FormatMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a corrupt header error.
    pub fn corrupt_header(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptHeader {
            offset,
            message: message.into(),
        }
    }

    /// Create a short read error.
    pub fn short_read(wanted: u64, got: u64) -> Self {
        Self::ShortRead { wanted, got }
    }

    /// Create a short write error.
    pub fn short_write(wanted: u64, got: u64) -> Self {
        Self::ShortWrite { wanted, got }
    }

    /// Create a buffer full error.
    pub fn buffer_full(limit: usize) -> Self {
        Self::BufferFull { limit }
    }

    /// Create a create error for `path`.
    pub fn create_error(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::CreateError {
            path: path.into(),
            source,
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(expected: u32, computed: u32) -> Self {
        Self::CrcMismatch { expected, computed }
    }

    /// Create an invalid pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported-feature error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported { what: what.into() }
    }

    /// True for failures that only affect the current entry: the session
    /// driver records these in its report and moves on to the next
    /// header instead of aborting the archive.
    pub fn is_per_entry(&self) -> bool {
        matches!(
            self,
            Self::CreateError { .. } | Self::ShortWrite { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShuckError::format_mismatch(vec![0x1F, 0x8B], vec![0x42, 0x5A]);
        assert!(err.to_string().contains("format mismatch"));

        let err = ShuckError::crc_mismatch(0x12345678, 0xDEADBEEF);
        assert!(err.to_string().contains("CRC mismatch"));

        let err = ShuckError::corrupt_header(512, "bad checksum");
        assert!(err.to_string().contains("offset 512"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: ShuckError = io_err.into();
        assert!(matches!(err, ShuckError::Io(_)));
    }

    #[test]
    fn test_cancel_marker_recovered() {
        let io_err = io::Error::other(Cancelled);
        let err: ShuckError = io_err.into();
        assert!(matches!(err, ShuckError::Interrupted));
    }

    #[test]
    fn test_per_entry_classification() {
        let create = ShuckError::create_error("x", io::Error::other("denied"));
        assert!(create.is_per_entry());
        assert!(!ShuckError::Interrupted.is_per_entry());
        assert!(!ShuckError::corrupt_header(0, "x").is_per_entry());
    }
}
