//! CPIO header codec.
//!
//! Handles the new ASCII format (magic `070701`, plus the `070702`
//! variant with a data checksum field) and the old portable ASCII
//! format (`070707`). The two differ in field widths and radix but
//! share the entry shape: fixed header, NUL-terminated name, then
//! data.
//!
//! CPIO stores a hardlink set as several headers sharing one inode
//! number, with the data attached to only one of them. Members seen
//! before the data-bearing one cannot be emitted immediately; they are
//! parked and released once their holder (or the trailer) shows up.

use shuck_core::entry::{EntryKind, EntryMetadata};
use shuck_core::error::{Result, ShuckError};
use shuck_core::source::{ByteSource, read_exact, read_exact_or_eof};
use std::collections::{HashMap, VecDeque};

use super::{HeaderCodec, field_str};

const MAGIC_NEWC: &[u8; 6] = b"070701";
const MAGIC_CRC: &[u8; 6] = b"070702";
const MAGIC_ODC: &[u8; 6] = b"070707";

const TRAILER: &str = "TRAILER!!!";

/// Longest symlink target read inline from the data area.
const LINK_TARGET_MAX: u64 = 4096;

const S_IFMT: u32 = 0o170000;
const S_IFIFO: u32 = 0o010000;
const S_IFCHR: u32 = 0o020000;
const S_IFDIR: u32 = 0o040000;
const S_IFBLK: u32 = 0o060000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CpioFormat {
    /// `070701` / `070702`: 8-digit hex fields, 4-byte alignment.
    Newc,
    /// `070707`: octal fields, no alignment.
    Odc,
}

/// Identity of a hardlink set.
type InodeKey = (u32, u32, u64);

struct RawHeader {
    ino: u64,
    mode: u32,
    uid: u32,
    gid: u32,
    nlink: u32,
    mtime: u64,
    size: u64,
    dev_major: u32,
    dev_minor: u32,
    rdev_major: u32,
    rdev_minor: u32,
    namesize: u64,
}

fn parse_hex(data: &[u8], offset: u64, what: &str) -> Result<u64> {
    let s = std::str::from_utf8(data)
        .ok()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    s.and_then(|s| u64::from_str_radix(s, 16).ok())
        .ok_or_else(|| ShuckError::corrupt_header(offset, format!("bad hex in {what}")))
}

fn parse_oct(data: &[u8], offset: u64, what: &str) -> Result<u64> {
    super::parse_octal(data)
        .ok_or_else(|| ShuckError::corrupt_header(offset, format!("bad octal in {what}")))
}

/// Streaming cpio header codec; the variant is detected from the first
/// member's magic.
pub struct CpioCodec {
    format: Option<CpioFormat>,
    done: bool,
    holders: HashMap<InodeKey, String>,
    parked: Vec<(InodeKey, EntryMetadata)>,
    ready: VecDeque<EntryMetadata>,
}

impl CpioCodec {
    /// New codec with no parked members.
    pub fn new() -> Self {
        Self {
            format: None,
            done: false,
            holders: HashMap::new(),
            parked: Vec::new(),
            ready: VecDeque::new(),
        }
    }

    fn read_header(
        &mut self,
        src: &mut dyn ByteSource,
        offset: u64,
    ) -> Result<Option<(RawHeader, String)>> {
        let mut magic = [0u8; 6];
        if !read_exact_or_eof(src, &mut magic)? {
            return Ok(None);
        }
        let format = match &magic {
            MAGIC_NEWC | MAGIC_CRC => CpioFormat::Newc,
            MAGIC_ODC => CpioFormat::Odc,
            _ => {
                return Err(ShuckError::format_mismatch(*MAGIC_NEWC, magic));
            }
        };
        match self.format {
            None => self.format = Some(format),
            Some(f) if f != format => {
                return Err(ShuckError::corrupt_header(offset, "mixed cpio variants"));
            }
            Some(_) => {}
        }

        let raw = match format {
            CpioFormat::Newc => {
                let mut fields = [0u8; 104];
                read_exact(src, &mut fields)?;
                let f = |i: usize, what| parse_hex(&fields[i * 8..(i + 1) * 8], offset, what);
                RawHeader {
                    ino: f(0, "ino")?,
                    mode: f(1, "mode")? as u32,
                    uid: f(2, "uid")? as u32,
                    gid: f(3, "gid")? as u32,
                    nlink: f(4, "nlink")? as u32,
                    mtime: f(5, "mtime")?,
                    size: f(6, "filesize")?,
                    dev_major: f(7, "devmajor")? as u32,
                    dev_minor: f(8, "devminor")? as u32,
                    rdev_major: f(9, "rdevmajor")? as u32,
                    rdev_minor: f(10, "rdevminor")? as u32,
                    namesize: f(11, "namesize")?,
                    // field 12 is the data checksum; not verified.
                }
            }
            CpioFormat::Odc => {
                let mut fields = [0u8; 70];
                read_exact(src, &mut fields)?;
                let dev = parse_oct(&fields[0..6], offset, "dev")?;
                RawHeader {
                    ino: parse_oct(&fields[6..12], offset, "ino")?,
                    mode: parse_oct(&fields[12..18], offset, "mode")? as u32,
                    uid: parse_oct(&fields[18..24], offset, "uid")? as u32,
                    gid: parse_oct(&fields[24..30], offset, "gid")? as u32,
                    nlink: parse_oct(&fields[30..36], offset, "nlink")? as u32,
                    mtime: parse_oct(&fields[42..53], offset, "mtime")?,
                    size: parse_oct(&fields[59..70], offset, "filesize")?,
                    dev_major: (dev >> 8) as u32,
                    dev_minor: (dev & 0xFF) as u32,
                    rdev_major: 0,
                    rdev_minor: parse_oct(&fields[36..42], offset, "rdev")? as u32,
                    namesize: parse_oct(&fields[53..59], offset, "namesize")?,
                }
            }
        };

        if raw.namesize == 0 || raw.namesize > 4096 {
            return Err(ShuckError::corrupt_header(
                offset,
                format!("implausible namesize {}", raw.namesize),
            ));
        }
        let mut name_buf = vec![0u8; raw.namesize as usize];
        read_exact(src, &mut name_buf)?;
        let name = field_str(&name_buf);

        if format == CpioFormat::Newc {
            // Header plus name is padded to a 4-byte boundary.
            let consumed = 110 + raw.namesize;
            src.skip(consumed.div_ceil(4) * 4 - consumed)?;
        }

        Ok(Some((raw, name)))
    }

    fn to_metadata(&self, raw: &RawHeader, name: String) -> EntryMetadata {
        let kind = match raw.mode & S_IFMT {
            S_IFREG => EntryKind::File,
            S_IFDIR => EntryKind::Directory,
            S_IFLNK => EntryKind::Symlink,
            S_IFCHR => EntryKind::CharDevice,
            S_IFBLK => EntryKind::BlockDevice,
            S_IFIFO => EntryKind::Fifo,
            _ => EntryKind::Unknown,
        };
        EntryMetadata {
            name,
            link_target: None,
            kind,
            size: if kind.has_data() || kind == EntryKind::Symlink {
                raw.size
            } else {
                0
            },
            mode: raw.mode & 0o7777,
            uid: raw.uid,
            gid: raw.gid,
            uname: None,
            gname: None,
            mtime: raw.mtime,
            dev_major: raw.rdev_major,
            dev_minor: raw.rdev_minor,
        }
    }

    /// Release parked members whose holder never arrived: the first of
    /// each set materializes as an empty file, the rest link to it.
    fn flush_parked(&mut self) {
        let mut anchors: HashMap<InodeKey, String> = HashMap::new();
        for (key, mut meta) in self.parked.drain(..) {
            match anchors.get(&key) {
                None => {
                    log::warn!("hardlink data for {} never appeared", meta.name);
                    anchors.insert(key, meta.name.clone());
                    self.ready.push_back(meta);
                }
                Some(anchor) => {
                    meta.kind = EntryKind::Hardlink;
                    meta.link_target = Some(anchor.clone());
                    self.ready.push_back(meta);
                }
            }
        }
    }
}

impl Default for CpioCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderCodec for CpioCodec {
    fn next_entry(
        &mut self,
        src: &mut dyn ByteSource,
        offset: u64,
    ) -> Result<Option<EntryMetadata>> {
        loop {
            if let Some(meta) = self.ready.pop_front() {
                return Ok(Some(meta));
            }
            if self.done {
                return Ok(None);
            }

            let Some((raw, name)) = self.read_header(src, offset)? else {
                // Truncated archive without a trailer.
                self.done = true;
                self.flush_parked();
                continue;
            };

            if name == TRAILER {
                self.done = true;
                self.flush_parked();
                continue;
            }

            let mut meta = self.to_metadata(&raw, name);

            // Symlink targets travel in the data area.
            if meta.kind == EntryKind::Symlink {
                if meta.size > LINK_TARGET_MAX {
                    return Err(ShuckError::corrupt_header(
                        offset,
                        format!("symlink target of {} bytes", meta.size),
                    ));
                }
                let mut target = vec![0u8; meta.size as usize];
                read_exact(src, &mut target)?;
                src.skip(self.data_padding(meta.size))?;
                meta.link_target = Some(field_str(&target));
                meta.size = 0;
            }

            if meta.kind == EntryKind::File && raw.nlink > 1 {
                let key = (raw.dev_major, raw.dev_minor, raw.ino);
                if meta.size > 0 {
                    // The data-bearing member anchors the set; parked
                    // members become links to it.
                    self.holders.insert(key, meta.name.clone());
                    let (resolved, still_parked) = std::mem::take(&mut self.parked)
                        .into_iter()
                        .partition::<Vec<_>, _>(|(k, _)| *k == key);
                    self.parked = still_parked;
                    for (_, mut parked) in resolved {
                        parked.kind = EntryKind::Hardlink;
                        parked.link_target = Some(meta.name.clone());
                        self.ready.push_back(parked);
                    }
                    return Ok(Some(meta));
                }
                if let Some(holder) = self.holders.get(&key) {
                    meta.kind = EntryKind::Hardlink;
                    meta.link_target = Some(holder.clone());
                    return Ok(Some(meta));
                }
                self.parked.push((key, meta));
                continue;
            }

            return Ok(Some(meta));
        }
    }

    fn data_padding(&self, size: u64) -> u64 {
        match self.format {
            Some(CpioFormat::Newc) | None => size.div_ceil(4) * 4 - size,
            Some(CpioFormat::Odc) => 0,
        }
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

    /// Append one newc member, padding header+name and data to 4.
    fn push_newc(out: &mut Vec<u8>, name: &str, mode: u32, ino: u64, nlink: u32, data: &[u8]) {
        out.extend_from_slice(b"070701");
        for value in [
            ino,
            u64::from(mode),
            0,
            0,
            u64::from(nlink),
            1_700_000_000,
            data.len() as u64,
            0,
            1,
            0,
            0,
            name.len() as u64 + 1,
            0,
        ] {
            out.extend_from_slice(format!("{value:08X}").as_bytes());
        }
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out.extend_from_slice(data);
        while out.len() % 4 != 0 {
            out.push(0);
        }
    }

    fn push_trailer(out: &mut Vec<u8>) {
        push_newc(out, TRAILER, 0, 0, 1, b"");
    }

    fn drain(archive: Vec<u8>) -> Vec<EntryMetadata> {
        let mut codec = CpioCodec::new();
        let mut src = source(archive);
        let mut entries = Vec::new();
        while let Some(meta) = codec.next_entry(&mut src, 0).unwrap() {
            if meta.size > 0 {
                src.skip(meta.size).unwrap();
                src.skip(codec.data_padding(meta.size)).unwrap();
            }
            entries.push(meta);
        }
        entries
    }

    #[test]
    fn test_newc_file_entry() {
        let mut archive = Vec::new();
        push_newc(&mut archive, "hello.txt", 0o100644, 10, 1, b"hi there");
        push_trailer(&mut archive);

        let entries = drain(archive);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "hello.txt");
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size, 8);
        assert_eq!(entries[0].mode, 0o644);
    }

    #[test]
    fn test_symlink_target_from_data() {
        let mut archive = Vec::new();
        push_newc(&mut archive, "link", 0o120777, 11, 1, b"real/target");
        push_trailer(&mut archive);

        let entries = drain(archive);
        assert_eq!(entries[0].kind, EntryKind::Symlink);
        assert_eq!(entries[0].link_target.as_deref(), Some("real/target"));
        assert_eq!(entries[0].size, 0);
    }

    #[test]
    fn test_hardlink_zero_size_before_holder() {
        // GNU cpio writes the data with the LAST member of the set.
        let mut archive = Vec::new();
        push_newc(&mut archive, "first", 0o100644, 42, 2, b"");
        push_newc(&mut archive, "second", 0o100644, 42, 2, b"shared");
        push_trailer(&mut archive);

        let entries = drain(archive);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "second");
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size, 6);
        assert_eq!(entries[1].name, "first");
        assert_eq!(entries[1].kind, EntryKind::Hardlink);
        assert_eq!(entries[1].link_target.as_deref(), Some("second"));
    }

    #[test]
    fn test_hardlink_after_holder() {
        let mut archive = Vec::new();
        push_newc(&mut archive, "holder", 0o100644, 7, 2, b"data");
        push_newc(&mut archive, "alias", 0o100644, 7, 2, b"");
        push_trailer(&mut archive);

        let entries = drain(archive);
        assert_eq!(entries[1].kind, EntryKind::Hardlink);
        assert_eq!(entries[1].link_target.as_deref(), Some("holder"));
    }

    #[test]
    fn test_orphaned_hardlink_set() {
        // No member ever carries the data: the first becomes an empty
        // file, the rest link to it.
        let mut archive = Vec::new();
        push_newc(&mut archive, "a", 0o100644, 9, 2, b"");
        push_newc(&mut archive, "b", 0o100644, 9, 2, b"");
        push_trailer(&mut archive);

        let entries = drain(archive);
        assert_eq!(entries[0].name, "a");
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size, 0);
        assert_eq!(entries[1].kind, EntryKind::Hardlink);
        assert_eq!(entries[1].link_target.as_deref(), Some("a"));
    }

    #[test]
    fn test_odc_entry() {
        let mut archive = Vec::new();
        let name = "old.txt";
        let data = b"odc data!";
        archive.extend_from_slice(b"070707");
        archive.extend_from_slice(b"000123"); // dev
        archive.extend_from_slice(b"000042"); // ino
        archive.extend_from_slice(b"100600"); // mode
        archive.extend_from_slice(b"000000"); // uid
        archive.extend_from_slice(b"000000"); // gid
        archive.extend_from_slice(b"000001"); // nlink
        archive.extend_from_slice(b"000000"); // rdev
        archive.extend_from_slice(b"14531607400"); // mtime
        archive.extend_from_slice(b"000010"); // namesize (8, with NUL)
        archive.extend_from_slice(b"00000000011"); // filesize (9)
        archive.extend_from_slice(name.as_bytes());
        archive.push(0);
        archive.extend_from_slice(data);

        let mut codec = CpioCodec::new();
        let mut src = source(archive);
        let meta = codec.next_entry(&mut src, 0).unwrap().unwrap();
        assert_eq!(meta.name, "old.txt");
        assert_eq!(meta.size, 9);
        assert_eq!(meta.mode, 0o600);
        assert_eq!(codec.data_padding(meta.size), 0);
    }

    #[test]
    fn test_bad_magic() {
        let mut codec = CpioCodec::new();
        let mut src = source(b"junkmagic and more".to_vec());
        let err = codec.next_entry(&mut src, 0).unwrap_err();
        assert!(matches!(err, ShuckError::FormatMismatch { .. }));
    }

    #[test]
    fn test_missing_trailer_tolerated() {
        let mut archive = Vec::new();
        push_newc(&mut archive, "only", 0o100644, 3, 1, b"x");
        let entries = drain(archive);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "only");
    }
}
