//! Streaming transformers.
//!
//! A transformer wraps one decompression codec behind a uniform
//! contract: consume compressed bytes from a [`ByteSource`], produce
//! decompressed bytes into a [`TransformState`] destination, and leave
//! the byte counters and running CRC-32 updated. The codec math itself
//! lives in the codec crates (flate2, bzip2, xz2, zstd); only the
//! legacy `compress` decoder is carried in-house.
//!
//! Destinations are a writer, a capped in-memory buffer, or a
//! directory root with per-entry output switching for streams that
//! multiplex several members.

use shuck_core::crc::Crc32;
use shuck_core::error::{Result, ShuckError};
use shuck_core::source::ByteSource;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::detect::CompressionFormat;

mod bzip2;
mod gzip;
mod lzma;
mod lzw;
pub mod pipeline;
mod xz;
mod zstd;

pub use pipeline::{PipeReader, spawn};

/// Where a transformer's output goes.
enum Destination {
    /// Stream to a writer (pipe, file, channel).
    Writer(Box<dyn Write + Send>),
    /// Append to memory, failing once `cap` is exceeded.
    Memory { buf: Vec<u8>, cap: usize },
    /// Extract under a directory root; the container layer names each
    /// member via [`TransformState::switch_file`].
    Directory { root: PathBuf, file: Option<File> },
}

/// One decompression pipeline stage: destination plus byte counters
/// and the running checksum.
pub struct TransformState {
    dest: Destination,
    /// Compressed bytes consumed so far.
    pub bytes_in: u64,
    /// Decompressed bytes produced so far.
    pub bytes_out: u64,
    crc: Crc32,
}

impl TransformState {
    /// Output to a writer.
    pub fn to_writer(writer: Box<dyn Write + Send>) -> Self {
        Self::build(Destination::Writer(writer))
    }

    /// Output to an in-memory buffer capped at `cap` bytes.
    pub fn to_memory(cap: usize) -> Self {
        Self::build(Destination::Memory {
            buf: Vec::new(),
            cap,
        })
    }

    /// Output under a directory; no file is open until the first
    /// [`switch_file`](Self::switch_file).
    pub fn to_directory(root: impl Into<PathBuf>) -> Self {
        Self::build(Destination::Directory {
            root: root.into(),
            file: None,
        })
    }

    fn build(dest: Destination) -> Self {
        Self {
            dest,
            bytes_in: 0,
            bytes_out: 0,
            crc: Crc32::new(),
        }
    }

    /// Append decompressed bytes to the destination.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.dest {
            Destination::Writer(w) => w.write_all(data)?,
            Destination::Memory { buf, cap } => {
                if buf.len() + data.len() > *cap {
                    return Err(ShuckError::buffer_full(*cap));
                }
                buf.extend_from_slice(data);
            }
            Destination::Directory { root, file } => match file {
                Some(f) => f.write_all(data)?,
                None => {
                    return Err(ShuckError::create_error(
                        root.clone(),
                        std::io::Error::other("no output member selected"),
                    ));
                }
            },
        }
        self.crc.update(data);
        self.bytes_out += data.len() as u64;
        Ok(())
    }

    /// Close the current member output and open the next one under the
    /// directory root, creating missing leading directories.
    ///
    /// Only meaningful for directory destinations; streams that
    /// multiplex several compressed members call this between them.
    pub fn switch_file(&mut self, name: &str) -> Result<()> {
        let Destination::Directory { root, file } = &mut self.dest else {
            return Err(ShuckError::unsupported(
                "switch_file on a non-directory destination",
            ));
        };
        // Close the previous member first.
        *file = None;
        let clean = shuck_core::sanitize_path(name);
        let path = root.join(&clean);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ShuckError::create_error(parent.to_path_buf(), e))?;
        }
        *file = Some(File::create(&path).map_err(|e| ShuckError::create_error(path.clone(), e))?);
        Ok(())
    }

    /// Running CRC-32 over all bytes produced so far.
    pub fn crc(&self) -> u32 {
        self.crc.finalize()
    }

    /// Consume the state and return the memory buffer, if the
    /// destination was one.
    pub fn into_memory(self) -> Option<Vec<u8>> {
        match self.dest {
            Destination::Memory { buf, .. } => Some(buf),
            _ => None,
        }
    }
}

/// Compare the stream's first two bytes against `expected`.
///
/// The bytes are pushed back either way, so the codec still parses its
/// own header; on mismatch nothing past the signature was consumed.
pub fn check_signature16(src: &mut dyn ByteSource, expected: [u8; 2]) -> Result<()> {
    let mut sig = [0u8; 2];
    let mut got = 0usize;
    while got < 2 {
        let n = src.read(&mut sig[got..])?;
        if n == 0 {
            break;
        }
        got += n;
    }
    src.unread(&sig[..got]);
    if got < 2 || sig != expected {
        return Err(ShuckError::format_mismatch(
            expected.to_vec(),
            sig[..got].to_vec(),
        ));
    }
    Ok(())
}

/// Counts compressed bytes handed to a codec crate.
struct CountingRead<'a> {
    inner: &'a mut dyn ByteSource,
    count: u64,
}

impl<'a> CountingRead<'a> {
    fn new(inner: &'a mut dyn ByteSource) -> Self {
        Self { inner, count: 0 }
    }
}

impl Read for CountingRead<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Drain a decoder into the destination. Returns bytes produced by
/// this call.
fn pump(decoder: &mut dyn Read, state: &mut TransformState) -> Result<u64> {
    let start = state.bytes_out;
    let mut buf = [0u8; 32 * 1024];
    loop {
        let n = decoder.read(&mut buf)?;
        if n == 0 {
            break;
        }
        state.write(&buf[..n])?;
    }
    Ok(state.bytes_out - start)
}

/// Run the transformer for `format`, returning total bytes produced.
///
/// `CompressionFormat::None` copies the stream through unchanged.
pub fn unpack_stream(
    format: CompressionFormat,
    src: &mut dyn ByteSource,
    state: &mut TransformState,
) -> Result<u64> {
    match format {
        CompressionFormat::Gzip => gzip::unpack(src, state),
        CompressionFormat::Bzip2 => bzip2::unpack(src, state),
        CompressionFormat::Xz => xz::unpack(src, state),
        CompressionFormat::Lzma => lzma::unpack(src, state),
        CompressionFormat::Zstd => zstd::unpack(src, state),
        CompressionFormat::Lzw => lzw::unpack(src, state),
        CompressionFormat::None => {
            let mut counted = CountingRead::new(src);
            let produced = pump(&mut counted, state)?;
            state.bytes_in += counted.count;
            Ok(produced)
        }
    }
}

/// Decompress a whole stream into memory, bounded by `cap`.
///
/// Never touches the filesystem; fails with
/// [`ShuckError::BufferFull`] if the output exceeds the cap.
pub fn unpack_to_memory(
    format: CompressionFormat,
    src: &mut dyn ByteSource,
    cap: usize,
) -> Result<Vec<u8>> {
    let mut state = TransformState::to_memory(cap);
    unpack_stream(format, src, &mut state)?;
    Ok(state.into_memory().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuck_core::source::{Monitor, StreamSource};
    use std::io::Cursor;

    fn source(data: Vec<u8>) -> StreamSource<Cursor<Vec<u8>>> {
        StreamSource::new(Cursor::new(data), Monitor::new())
    }

    #[test]
    fn test_check_signature16_match() {
        let mut src = source(vec![0x1F, 0x8B, 0x08]);
        check_signature16(&mut src, [0x1F, 0x8B]).unwrap();
        // Signature bytes were pushed back.
        let mut head = [0u8; 3];
        shuck_core::source::read_exact(&mut src, &mut head).unwrap();
        assert_eq!(head, [0x1F, 0x8B, 0x08]);
    }

    #[test]
    fn test_check_signature16_mismatch() {
        let mut src = source(vec![0x42, 0x5A, 0x68]);
        let err = check_signature16(&mut src, [0x1F, 0x8B]).unwrap_err();
        assert!(matches!(err, ShuckError::FormatMismatch { .. }));
        // Nothing was consumed.
        let mut head = [0u8; 3];
        shuck_core::source::read_exact(&mut src, &mut head).unwrap();
        assert_eq!(head, [0x42, 0x5A, 0x68]);
    }

    #[test]
    fn test_memory_cap_enforced() {
        let mut state = TransformState::to_memory(4);
        state.write(b"ab").unwrap();
        let err = state.write(b"cde").unwrap_err();
        assert!(matches!(err, ShuckError::BufferFull { limit: 4 }));
    }

    #[test]
    fn test_counters_and_crc() {
        let mut state = TransformState::to_memory(64);
        state.write(b"123456789").unwrap();
        assert_eq!(state.bytes_out, 9);
        assert_eq!(state.crc(), 0xCBF43926);
        assert_eq!(state.into_memory().unwrap(), b"123456789");
    }

    #[test]
    fn test_passthrough_copy() {
        let mut src = source(b"plain bytes".to_vec());
        let mut state = TransformState::to_memory(64);
        let produced = unpack_stream(CompressionFormat::None, &mut src, &mut state).unwrap();
        assert_eq!(produced, 11);
        assert_eq!(state.bytes_in, 11);
        assert_eq!(state.into_memory().unwrap(), b"plain bytes");
    }

    #[test]
    fn test_gzip_roundtrip_through_state() {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let payload = b"hello transformer world".repeat(40);
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&payload).unwrap();
        let packed = enc.finish().unwrap();
        let packed_len = packed.len() as u64;

        let mut src = source(packed);
        let mut state = TransformState::to_memory(1 << 20);
        let produced = unpack_stream(CompressionFormat::Gzip, &mut src, &mut state).unwrap();
        assert_eq!(produced, payload.len() as u64);
        assert_eq!(state.bytes_in, packed_len);
        assert_eq!(state.crc(), Crc32::compute(&payload));
        assert_eq!(state.into_memory().unwrap(), payload);
    }

    #[test]
    fn test_unpack_to_memory_cap() {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let payload = vec![7u8; 4096];
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&payload).unwrap();
        let packed = enc.finish().unwrap();

        let mut src = source(packed);
        let err = unpack_to_memory(CompressionFormat::Gzip, &mut src, 512).unwrap_err();
        assert!(matches!(err, ShuckError::BufferFull { limit: 512 }));
    }

    #[test]
    fn test_switch_file_writes_members() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = TransformState::to_directory(dir.path());
        state.switch_file("sub/first.bin").unwrap();
        state.write(b"one").unwrap();
        state.switch_file("second.bin").unwrap();
        state.write(b"two").unwrap();
        drop(state);

        assert_eq!(
            std::fs::read(dir.path().join("sub/first.bin")).unwrap(),
            b"one"
        );
        assert_eq!(std::fs::read(dir.path().join("second.bin")).unwrap(), b"two");
    }
}
