//! Compression format auto-detection.
//!
//! Sniffs the first bytes of a stream against the known decompressor
//! signatures and pushes them back, so the chosen transformer sees the
//! stream from byte zero.

use shuck_core::error::Result;
use shuck_core::source::ByteSource;
use std::io::Read;

/// Longest signature we need to look at (xz).
const SNIFF_LEN: usize = 6;

/// Known compression envelopes around a container stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// gzip (.gz), signature `1F 8B`.
    Gzip,
    /// bzip2 (.bz2), signature `42 5A 68` ("BZh").
    Bzip2,
    /// XZ (.xz), signature `FD 37 7A 58 5A 00`.
    Xz,
    /// Legacy LZMA (.lzma). No signature; never auto-detected.
    Lzma,
    /// Zstandard (.zst), frame magic `28 B5 2F FD`.
    Zstd,
    /// Legacy compress (.Z), signature `1F 9D`.
    Lzw,
    /// No recognized envelope; the stream is handed to the container
    /// codec as-is.
    None,
}

impl CompressionFormat {
    /// Detect a format from leading bytes.
    pub fn from_magic(magic: &[u8]) -> Self {
        if magic.len() >= 2 {
            match [magic[0], magic[1]] {
                [0x1F, 0x8B] => return Self::Gzip,
                [0x1F, 0x9D] => return Self::Lzw,
                _ => {}
            }
        }
        if magic.len() >= 3 && magic.starts_with(&[0x42, 0x5A, 0x68]) {
            return Self::Bzip2;
        }
        if magic.len() >= 6 && magic.starts_with(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00]) {
            return Self::Xz;
        }
        if magic.len() >= 4 && magic.starts_with(&[0x28, 0xB5, 0x2F, 0xFD]) {
            return Self::Zstd;
        }
        Self::None
    }

    /// Sniff the head of `src` without consuming it.
    ///
    /// Reads at most [`SNIFF_LEN`] bytes, classifies them, and pushes
    /// every byte back so the transformer (or container codec) still
    /// sees the full stream.
    pub fn sniff(src: &mut dyn ByteSource) -> Result<Self> {
        let mut head = [0u8; SNIFF_LEN];
        let mut got = 0usize;
        while got < head.len() {
            let n = src.read(&mut head[got..])?;
            if n == 0 {
                break;
            }
            got += n;
        }
        src.unread(&head[..got]);
        Ok(Self::from_magic(&head[..got]))
    }

    /// The two-byte signature, where the format has a fixed one.
    pub fn magic16(&self) -> Option<[u8; 2]> {
        match self {
            Self::Gzip => Some([0x1F, 0x8B]),
            Self::Lzw => Some([0x1F, 0x9D]),
            Self::Bzip2 => Some([0x42, 0x5A]),
            Self::Xz => Some([0xFD, 0x37]),
            Self::Zstd => Some([0x28, 0xB5]),
            Self::Lzma | Self::None => None,
        }
    }

    /// Typical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Bzip2 => "bz2",
            Self::Xz => "xz",
            Self::Lzma => "lzma",
            Self::Zstd => "zst",
            Self::Lzw => "Z",
            Self::None => "",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gzip => write!(f, "gzip"),
            Self::Bzip2 => write!(f, "bzip2"),
            Self::Xz => write!(f, "xz"),
            Self::Lzma => write!(f, "lzma"),
            Self::Zstd => write!(f, "zstd"),
            Self::Lzw => write!(f, "compress"),
            Self::None => write!(f, "none"),
        }
    }
}
