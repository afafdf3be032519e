//! TAR header codec.
//!
//! The fixed 512-byte POSIX header block, byte-for-byte compatible
//! with existing tar producers: ustar prefix concatenation, GNU
//! long-name/long-link continuation entries, and the unsigned-byte-sum
//! checksum computed with the checksum field blanked to spaces. The
//! same checksum routine serves the read-side validator and the
//! write path.

use shuck_core::entry::{EntryKind, EntryMetadata};
use shuck_core::error::{Result, ShuckError};
use shuck_core::source::{ByteSource, read_exact, read_exact_or_eof};
use std::io::Write;

use super::{HeaderCodec, field_str, parse_octal};

/// TAR block size.
pub const BLOCK_SIZE: usize = 512;

/// Upper bound for inline metadata entries (long names, pax blobs).
const META_ENTRY_MAX: u64 = 64 * 1024;

const TYPE_FILE: u8 = b'0';
const TYPE_HARDLINK: u8 = b'1';
const TYPE_SYMLINK: u8 = b'2';
const TYPE_CHAR: u8 = b'3';
const TYPE_BLOCK: u8 = b'4';
const TYPE_DIR: u8 = b'5';
const TYPE_FIFO: u8 = b'6';
const TYPE_CONTIGUOUS: u8 = b'7';
const TYPE_GNU_LONGNAME: u8 = b'L';
const TYPE_GNU_LONGLINK: u8 = b'K';
const TYPE_PAX_NEXT: u8 = b'x';
const TYPE_PAX_GLOBAL: u8 = b'g';

/// One decoded 512-byte header block.
#[derive(Debug, Clone, Default)]
pub struct TarHeader {
    /// Member name (prefix already joined).
    pub name: String,
    /// Permission bits.
    pub mode: u32,
    /// Owner uid.
    pub uid: u32,
    /// Owner gid.
    pub gid: u32,
    /// Data size.
    pub size: u64,
    /// Modification time, epoch seconds.
    pub mtime: u64,
    /// Type flag byte.
    pub typeflag: u8,
    /// Link target.
    pub linkname: String,
    /// Symbolic owner name.
    pub uname: String,
    /// Symbolic group name.
    pub gname: String,
    /// Device major, for device nodes.
    pub dev_major: u32,
    /// Device minor, for device nodes.
    pub dev_minor: u32,
}

/// Unsigned byte sum over the block with the checksum field treated as
/// spaces. Shared by the validator and the writer.
pub fn block_checksum(block: &[u8; BLOCK_SIZE]) -> u32 {
    let mut sum = 0u32;
    for (i, &b) in block.iter().enumerate() {
        sum += if (148..156).contains(&i) {
            u32::from(b' ')
        } else {
            u32::from(b)
        };
    }
    sum
}

/// Size and mtime may be GNU base-256 (top bit of the first byte set)
/// instead of octal text.
fn parse_numeric(data: &[u8], offset: u64, what: &str) -> Result<u64> {
    if data[0] & 0x80 != 0 {
        let mut value = u64::from(data[0] & 0x7F);
        for &b in &data[1..] {
            value = value
                .checked_mul(256)
                .map(|v| v | u64::from(b))
                .ok_or_else(|| {
                    ShuckError::corrupt_header(offset, format!("{what} overflows base-256"))
                })?;
        }
        return Ok(value);
    }
    parse_octal(data)
        .ok_or_else(|| ShuckError::corrupt_header(offset, format!("bad octal in {what}")))
}

impl TarHeader {
    /// Decode one block.
    ///
    /// `Ok(None)` for an all-zero end-of-archive block; checksum
    /// mismatches are [`ShuckError::CorruptHeader`].
    pub fn parse(block: &[u8; BLOCK_SIZE], offset: u64) -> Result<Option<Self>> {
        if block.iter().all(|&b| b == 0) {
            return Ok(None);
        }

        let stored = parse_octal(&block[148..156])
            .ok_or_else(|| ShuckError::corrupt_header(offset, "bad octal in checksum"))?;
        let computed = block_checksum(block);
        if stored != u64::from(computed) {
            return Err(ShuckError::corrupt_header(
                offset,
                format!("checksum mismatch: stored {stored:#o}, computed {computed:#o}"),
            ));
        }

        let bad = |what: &str| ShuckError::corrupt_header(offset, format!("bad octal in {what}"));

        let name = field_str(&block[0..100]);
        let mode = parse_octal(&block[100..108]).ok_or_else(|| bad("mode"))? as u32;
        let uid = parse_octal(&block[108..116]).ok_or_else(|| bad("uid"))? as u32;
        let gid = parse_octal(&block[116..124]).ok_or_else(|| bad("gid"))? as u32;
        let size = parse_numeric(&block[124..136], offset, "size")?;
        let mtime = parse_numeric(&block[136..148], offset, "mtime")?;
        let typeflag = block[156];
        let linkname = field_str(&block[157..257]);

        let ustar = &block[257..262] == b"ustar";
        let (uname, gname, dev_major, dev_minor, prefix) = if ustar {
            (
                field_str(&block[265..297]),
                field_str(&block[297..329]),
                parse_octal(&block[329..337]).ok_or_else(|| bad("devmajor"))? as u32,
                parse_octal(&block[337..345]).ok_or_else(|| bad("devminor"))? as u32,
                field_str(&block[345..500]),
            )
        } else {
            (String::new(), String::new(), 0, 0, String::new())
        };

        let name = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };

        Ok(Some(Self {
            name,
            mode,
            uid,
            gid,
            size,
            mtime,
            typeflag,
            linkname,
            uname,
            gname,
            dev_major,
            dev_minor,
        }))
    }

    /// Encode to a 512-byte block, computing and filling the checksum.
    ///
    /// Names longer than 100 bytes are split at a slash into the ustar
    /// prefix field; names that cannot be split are an error (the
    /// writer emits a GNU long-name entry before calling this).
    pub fn encode(&self) -> Result<[u8; BLOCK_SIZE]> {
        let mut block = [0u8; BLOCK_SIZE];

        let (prefix, name) = if self.name.len() > 100 {
            let bytes = self.name.as_bytes();
            let split = bytes[..155.min(bytes.len())]
                .iter()
                .rposition(|&b| b == b'/')
                .unwrap_or(0);
            if split > 0 && self.name.len() - split - 1 <= 100 {
                (&self.name[..split], &self.name[split + 1..])
            } else {
                return Err(ShuckError::unsupported(format!(
                    "tar name too long to split: {}",
                    self.name
                )));
            }
        } else {
            ("", self.name.as_str())
        };

        write_str(&mut block[0..100], name);
        write_octal_checked(&mut block[100..108], u64::from(self.mode), "mode")?;
        write_octal_checked(&mut block[108..116], u64::from(self.uid), "uid")?;
        write_octal_checked(&mut block[116..124], u64::from(self.gid), "gid")?;
        write_numeric(&mut block[124..136], self.size);
        write_numeric(&mut block[136..148], self.mtime);
        block[148..156].copy_from_slice(b"        ");
        block[156] = self.typeflag;
        write_str(&mut block[157..257], &self.linkname);
        block[257..263].copy_from_slice(b"ustar\0");
        block[263..265].copy_from_slice(b"00");
        write_str(&mut block[265..297], &self.uname);
        write_str(&mut block[297..329], &self.gname);
        write_octal_checked(&mut block[329..337], u64::from(self.dev_major), "devmajor")?;
        write_octal_checked(&mut block[337..345], u64::from(self.dev_minor), "devminor")?;
        write_str(&mut block[345..500], prefix);

        let checksum = block_checksum(&block);
        let text = format!("{checksum:06o}\0 ");
        block[148..156].copy_from_slice(text.as_bytes());

        Ok(block)
    }

    /// Validate a block's stored checksum without fully decoding it.
    pub fn validate(block: &[u8; BLOCK_SIZE]) -> bool {
        parse_octal(&block[148..156])
            .is_some_and(|stored| stored == u64::from(block_checksum(block)))
    }

    fn kind(&self) -> EntryKind {
        match self.typeflag {
            TYPE_FILE | 0 | TYPE_CONTIGUOUS => EntryKind::File,
            TYPE_HARDLINK => EntryKind::Hardlink,
            TYPE_SYMLINK => EntryKind::Symlink,
            TYPE_CHAR => EntryKind::CharDevice,
            TYPE_BLOCK => EntryKind::BlockDevice,
            TYPE_DIR => EntryKind::Directory,
            TYPE_FIFO => EntryKind::Fifo,
            _ => EntryKind::Unknown,
        }
    }

    fn to_metadata(&self) -> EntryMetadata {
        let mut kind = self.kind();
        // Old tars mark directories only by the trailing slash.
        if kind == EntryKind::File && self.name.ends_with('/') {
            kind = EntryKind::Directory;
        }
        EntryMetadata {
            name: self.name.clone(),
            link_target: if self.linkname.is_empty() {
                None
            } else {
                Some(self.linkname.clone())
            },
            kind,
            // Links and directories carry no data regardless of the
            // size field's claim.
            size: if kind.has_data() { self.size } else { 0 },
            mode: self.mode & 0o7777,
            uid: self.uid,
            gid: self.gid,
            uname: (!self.uname.is_empty()).then(|| self.uname.clone()),
            gname: (!self.gname.is_empty()).then(|| self.gname.clone()),
            mtime: self.mtime,
            dev_major: self.dev_major,
            dev_minor: self.dev_minor,
        }
    }

    /// Build a header from normalized metadata (write path).
    pub fn from_metadata(meta: &EntryMetadata) -> Self {
        let typeflag = match meta.kind {
            EntryKind::File | EntryKind::Unknown => TYPE_FILE,
            EntryKind::Hardlink => TYPE_HARDLINK,
            EntryKind::Symlink => TYPE_SYMLINK,
            EntryKind::CharDevice => TYPE_CHAR,
            EntryKind::BlockDevice => TYPE_BLOCK,
            EntryKind::Directory => TYPE_DIR,
            EntryKind::Fifo => TYPE_FIFO,
        };
        Self {
            name: meta.name.clone(),
            mode: meta.mode,
            uid: meta.uid,
            gid: meta.gid,
            size: meta.size,
            mtime: meta.mtime,
            typeflag,
            linkname: meta.link_target.clone().unwrap_or_default(),
            uname: meta.uname.clone().unwrap_or_default(),
            gname: meta.gname.clone().unwrap_or_default(),
            dev_major: meta.dev_major,
            dev_minor: meta.dev_minor,
        }
    }
}

fn write_str(field: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(field.len() - 1);
    field[..len].copy_from_slice(&bytes[..len]);
}

/// Octal text with a trailing NUL. False when the value needs more
/// digits than the field holds.
fn write_octal(field: &mut [u8], value: u64) -> bool {
    let digits = field.len() - 1;
    if digits < 22 && value >> (3 * digits) != 0 {
        return false;
    }
    let s = format!("{value:0digits$o}");
    field[..s.len()].copy_from_slice(s.as_bytes());
    true
}

fn write_octal_checked(field: &mut [u8], value: u64, what: &str) -> Result<()> {
    if write_octal(field, value) {
        Ok(())
    } else {
        Err(ShuckError::unsupported(format!(
            "{what} {value:#o} does not fit its tar field"
        )))
    }
}

/// Octal text when the value fits, GNU base-256 otherwise (top bit of
/// the first byte set, big-endian payload). [`parse_numeric`] reads
/// both forms back.
fn write_numeric(field: &mut [u8], value: u64) {
    if write_octal(field, value) {
        return;
    }
    let bytes = value.to_be_bytes();
    let start = field.len() - bytes.len();
    field[start..].copy_from_slice(&bytes);
    field[0] |= 0x80;
}

/// Byte-length truncation that backs up to the previous char boundary
/// so multibyte names never split mid-character.
fn truncate_to_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

/// Streaming tar header codec.
pub struct TarCodec {
    strict: bool,
    longname: Option<String>,
    longlink: Option<String>,
}

impl TarCodec {
    /// Lenient codec: a single all-zero block ends the archive.
    pub fn new() -> Self {
        Self {
            strict: false,
            longname: None,
            longlink: None,
        }
    }

    /// Strict codec: requires the two consecutive zero blocks POSIX
    /// mandates.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::new()
        }
    }

    /// Read a metadata entry's body (long name, pax blob) plus its
    /// block padding.
    fn read_meta_body(
        &self,
        src: &mut dyn ByteSource,
        size: u64,
        offset: u64,
    ) -> Result<Vec<u8>> {
        if size > META_ENTRY_MAX {
            return Err(ShuckError::corrupt_header(
                offset,
                format!("metadata entry unreasonably large ({size} bytes)"),
            ));
        }
        let mut body = vec![0u8; size as usize];
        read_exact(src, &mut body)?;
        src.skip(self.data_padding(size))?;
        Ok(body)
    }
}

impl Default for TarCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderCodec for TarCodec {
    fn next_entry(
        &mut self,
        src: &mut dyn ByteSource,
        mut offset: u64,
    ) -> Result<Option<EntryMetadata>> {
        loop {
            let mut block = [0u8; BLOCK_SIZE];
            if !read_exact_or_eof(src, &mut block)? {
                // Truncated archive without a zero block; historic tars
                // do this and every extractor accepts it.
                return Ok(None);
            }

            let Some(header) = TarHeader::parse(&block, offset)? else {
                if self.strict {
                    let mut second = [0u8; BLOCK_SIZE];
                    read_exact(src, &mut second).map_err(|_| {
                        ShuckError::corrupt_header(offset, "missing second end-of-archive block")
                    })?;
                    if !second.iter().all(|&b| b == 0) {
                        return Err(ShuckError::corrupt_header(
                            offset,
                            "garbage after end-of-archive block",
                        ));
                    }
                }
                return Ok(None);
            };
            offset += BLOCK_SIZE as u64;

            match header.typeflag {
                TYPE_GNU_LONGNAME => {
                    let body = self.read_meta_body(src, header.size, offset)?;
                    self.longname = Some(field_str(&body));
                    offset += header.size + self.data_padding(header.size);
                }
                TYPE_GNU_LONGLINK => {
                    let body = self.read_meta_body(src, header.size, offset)?;
                    self.longlink = Some(field_str(&body));
                    offset += header.size + self.data_padding(header.size);
                }
                TYPE_PAX_NEXT | TYPE_PAX_GLOBAL => {
                    // Not modeled; drop the blob and move on.
                    log::debug!("skipping pax header entry ({} bytes)", header.size);
                    self.read_meta_body(src, header.size, offset)?;
                    offset += header.size + self.data_padding(header.size);
                }
                _ => {
                    let mut meta = header.to_metadata();
                    if let Some(name) = self.longname.take() {
                        meta.name = name;
                    }
                    if let Some(link) = self.longlink.take() {
                        meta.link_target = Some(link);
                    }
                    return Ok(Some(meta));
                }
            }
        }
    }

    fn data_padding(&self, size: u64) -> u64 {
        size.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64 - size
    }
}

/// Minimal tar writer: the out-of-core creation path shares the
/// checksum routine with the validator.
pub struct TarWriter<W: Write> {
    writer: W,
    finished: bool,
}

impl<W: Write> TarWriter<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            finished: false,
        }
    }

    /// Append one entry. `data` must match `meta.size` for data-bearing
    /// kinds.
    pub fn append(&mut self, meta: &EntryMetadata, data: &[u8]) -> Result<()> {
        let mut header = TarHeader::from_metadata(meta);

        if header.name.len() > 100 && header.encode().is_err() {
            self.write_gnu_meta(TYPE_GNU_LONGNAME, header.name.as_bytes())?;
            truncate_to_char_boundary(&mut header.name, 100);
        }
        if header.linkname.len() > 100 {
            self.write_gnu_meta(TYPE_GNU_LONGLINK, header.linkname.as_bytes())?;
            truncate_to_char_boundary(&mut header.linkname, 100);
        }

        self.writer.write_all(&header.encode()?)?;
        if meta.kind.has_data() {
            if data.len() as u64 != meta.size {
                return Err(ShuckError::short_write(meta.size, data.len() as u64));
            }
            self.writer.write_all(data)?;
            let pad = data.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE - data.len();
            if pad > 0 {
                self.writer.write_all(&vec![0u8; pad])?;
            }
        }
        Ok(())
    }

    fn write_gnu_meta(&mut self, typeflag: u8, body: &[u8]) -> Result<()> {
        // GNU writes the marker name used since tar 1.13.
        let mut header = TarHeader {
            name: "././@LongLink".to_string(),
            mode: 0o644,
            size: body.len() as u64 + 1,
            typeflag,
            ..TarHeader::default()
        };
        header.mtime = 0;
        self.writer.write_all(&header.encode()?)?;
        self.writer.write_all(body)?;
        self.writer.write_all(&[0])?;
        let written = body.len() + 1;
        let pad = written.div_ceil(BLOCK_SIZE) * BLOCK_SIZE - written;
        if pad > 0 {
            self.writer.write_all(&vec![0u8; pad])?;
        }
        Ok(())
    }

    /// Write the two terminating zero blocks and flush.
    pub fn finish(&mut self) -> Result<()> {
        if !self.finished {
            self.writer.write_all(&[0u8; BLOCK_SIZE])?;
            self.writer.write_all(&[0u8; BLOCK_SIZE])?;
            self.writer.flush()?;
            self.finished = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuck_core::source::{Monitor, StreamSource};
    use std::io::Cursor;

    fn source(data: Vec<u8>) -> StreamSource<Cursor<Vec<u8>>> {
        StreamSource::new(Cursor::new(data), Monitor::new())
    }

    fn file_meta(name: &str, size: u64, mode: u32) -> EntryMetadata {
        EntryMetadata::file(name, size)
            .with_mode(mode)
            .with_owner(1000, 1000)
            .with_mtime(1_700_000_000)
    }

    #[test]
    fn test_header_roundtrip() {
        let meta = file_meta("dir/a.txt", 8, 0o644);
        let block = TarHeader::from_metadata(&meta).encode().unwrap();
        let parsed = TarHeader::parse(&block, 0).unwrap().unwrap();
        assert_eq!(parsed.name, "dir/a.txt");
        assert_eq!(parsed.mode, 0o644);
        assert_eq!(parsed.uid, 1000);
        assert_eq!(parsed.gid, 1000);
        assert_eq!(parsed.size, 8);
        assert_eq!(parsed.mtime, 1_700_000_000);
    }

    #[test]
    fn test_checksum_invariant() {
        let block = TarHeader::from_metadata(&file_meta("x", 1, 0o600))
            .encode()
            .unwrap();
        assert!(TarHeader::validate(&block));

        // Any single byte outside the checksum field breaks validation.
        for pos in [0usize, 50, 124, 156, 260, 400] {
            let mut mutated = block;
            mutated[pos] ^= 0x01;
            assert!(!TarHeader::validate(&mutated), "byte {pos} not covered");
            assert!(TarHeader::parse(&mutated, 0).is_err());
        }
    }

    #[test]
    fn test_zero_block_ends_archive() {
        let mut codec = TarCodec::new();
        let mut src = source(vec![0u8; BLOCK_SIZE * 2]);
        assert!(codec.next_entry(&mut src, 0).unwrap().is_none());
    }

    #[test]
    fn test_strict_requires_two_zero_blocks() {
        let mut data = vec![0u8; BLOCK_SIZE];
        data.extend_from_slice(&[1u8; BLOCK_SIZE]);
        let mut codec = TarCodec::strict();
        let mut src = source(data);
        let err = codec.next_entry(&mut src, 0).unwrap_err();
        assert!(matches!(err, ShuckError::CorruptHeader { .. }));
    }

    #[test]
    fn test_symlink_metadata() {
        let meta = EntryMetadata::symlink("link", "the/target");
        let mut archive = Vec::new();
        let mut writer = TarWriter::new(&mut archive);
        writer.append(&meta, b"").unwrap();
        writer.finish().unwrap();

        let mut codec = TarCodec::new();
        let mut src = source(archive);
        let parsed = codec.next_entry(&mut src, 0).unwrap().unwrap();
        assert_eq!(parsed.kind, EntryKind::Symlink);
        assert_eq!(parsed.link_target.as_deref(), Some("the/target"));
        assert_eq!(parsed.size, 0);
    }

    #[test]
    fn test_gnu_longname_roundtrip() {
        let long = format!("{}/file.txt", "d".repeat(180));
        let meta = file_meta(&long, 4, 0o644);
        let mut archive = Vec::new();
        let mut writer = TarWriter::new(&mut archive);
        writer.append(&meta, b"data").unwrap();
        writer.finish().unwrap();

        let mut codec = TarCodec::new();
        let mut src = source(archive);
        let parsed = codec.next_entry(&mut src, 0).unwrap().unwrap();
        assert_eq!(parsed.name, long);
        assert_eq!(parsed.size, 4);
    }

    #[test]
    fn test_prefix_split_roundtrip() {
        // Long but splittable at a slash: uses the ustar prefix field,
        // no GNU entry needed.
        let name = format!("{}/tail.txt", "p".repeat(120));
        let block = TarHeader::from_metadata(&file_meta(&name, 0, 0o644))
            .encode()
            .unwrap();
        let parsed = TarHeader::parse(&block, 0).unwrap().unwrap();
        assert_eq!(parsed.name, name);
    }

    #[test]
    fn test_device_node_fields() {
        let mut meta = file_meta("dev/null", 0, 0o666);
        meta.kind = EntryKind::CharDevice;
        meta.dev_major = 1;
        meta.dev_minor = 3;
        let block = TarHeader::from_metadata(&meta).encode().unwrap();
        let parsed = TarHeader::parse(&block, 0).unwrap().unwrap();
        assert_eq!(parsed.typeflag, TYPE_CHAR);
        assert_eq!(parsed.dev_major, 1);
        assert_eq!(parsed.dev_minor, 3);
    }

    #[test]
    fn test_base256_size() {
        let meta = file_meta("big", 0, 0o644);
        let mut block = TarHeader::from_metadata(&meta).encode().unwrap();
        // 8 GiB does not fit 11 octal digits; encode base-256.
        let size: u64 = 8 << 30;
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[4..12].copy_from_slice(&size.to_be_bytes());
        block[124..136].copy_from_slice(&field);
        let checksum = block_checksum(&block);
        block[148..156].copy_from_slice(format!("{checksum:06o}\0 ").as_bytes());

        let parsed = TarHeader::parse(&block, 0).unwrap().unwrap();
        assert_eq!(parsed.size, size);
    }

    #[test]
    fn test_data_padding() {
        let codec = TarCodec::new();
        assert_eq!(codec.data_padding(0), 0);
        assert_eq!(codec.data_padding(1), 511);
        assert_eq!(codec.data_padding(512), 0);
        assert_eq!(codec.data_padding(513), 511);
    }

    #[test]
    fn test_hand_built_block() {
        // Built by hand, the way external producers write it.
        let mut block = [0u8; BLOCK_SIZE];
        block[..8].copy_from_slice(b"test.txt");
        block[100..107].copy_from_slice(b"0000644");
        block[108..115].copy_from_slice(b"0001750");
        block[116..123].copy_from_slice(b"0001750");
        block[124..135].copy_from_slice(b"00000000015");
        block[136..147].copy_from_slice(b"14723456700");
        block[156] = b'0';
        let checksum = block_checksum(&block);
        block[148..156].copy_from_slice(format!("{checksum:06o}\0 ").as_bytes());

        let parsed = TarHeader::parse(&block, 0).unwrap().unwrap();
        assert_eq!(parsed.name, "test.txt");
        assert_eq!(parsed.size, 13);
        assert_eq!(parsed.uid, 0o1750);
    }

    #[test]
    fn test_gnu_longname_multibyte_roundtrip() {
        // 120 bytes, no slash to split at, and byte 100 falls inside a
        // character: the stub name must back up to a boundary instead
        // of panicking.
        let long = "\u{3042}".repeat(40);
        let meta = file_meta(&long, 1, 0o644);
        let mut archive = Vec::new();
        let mut writer = TarWriter::new(&mut archive);
        writer.append(&meta, b"x").unwrap();
        writer.finish().unwrap();

        let mut codec = TarCodec::new();
        let mut src = source(archive);
        let parsed = codec.next_entry(&mut src, 0).unwrap().unwrap();
        assert_eq!(parsed.name, long);
    }

    #[test]
    fn test_large_size_encodes_base256() {
        // 10 GiB does not fit 11 octal digits; encode must switch to
        // base-256 rather than leave the field empty.
        let meta = file_meta("big.bin", 10 << 30, 0o644);
        let block = TarHeader::from_metadata(&meta).encode().unwrap();
        assert_eq!(block[124] & 0x80, 0x80);
        assert!(TarHeader::validate(&block));
        let parsed = TarHeader::parse(&block, 0).unwrap().unwrap();
        assert_eq!(parsed.size, 10 << 30);
    }

    #[test]
    fn test_oversized_uid_is_rejected() {
        // uid has no base-256 fallback here; overflowing it must be an
        // error, not a zeroed field.
        let meta = file_meta("u", 0, 0o644).with_owner(u32::MAX, 0);
        let err = TarHeader::from_metadata(&meta).encode().unwrap_err();
        assert!(matches!(err, ShuckError::Unsupported { .. }));
    }
}
