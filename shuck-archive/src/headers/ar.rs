//! AR header codec.
//!
//! The Unix archive format used by `.deb` packages and static
//! libraries: an 8-byte global magic, then 60-byte member headers with
//! printable decimal and octal fields. GNU extensions are handled
//! where `.deb` files in the wild use them: the `/` symbol table is
//! skipped and `//` supplies the long-name table that `/N` member
//! names index into.

use shuck_core::entry::EntryMetadata;
use shuck_core::error::{Result, ShuckError};
use shuck_core::source::{ByteSource, read_exact, read_exact_or_eof};

use super::{HeaderCodec, field_str, parse_octal};

const GLOBAL_MAGIC: &[u8; 8] = b"!<arch>\n";
const HEADER_LEN: usize = 60;
const NAME_TABLE_MAX: u64 = 1 << 20;

fn parse_decimal(data: &[u8], offset: u64, what: &str) -> Result<u64> {
    let s = std::str::from_utf8(data).ok().map(str::trim);
    match s {
        Some("") | None => Ok(0),
        Some(s) => s
            .parse()
            .map_err(|_| ShuckError::corrupt_header(offset, format!("bad decimal in {what}"))),
    }
}

/// Streaming ar header codec.
pub struct ArCodec {
    magic_seen: bool,
    name_table: Vec<u8>,
}

impl ArCodec {
    /// New codec; the global magic is consumed on the first entry.
    pub fn new() -> Self {
        Self {
            magic_seen: false,
            name_table: Vec::new(),
        }
    }

    /// Resolve `/N` against the `//` table. Table entries are
    /// newline-terminated with a trailing slash.
    fn long_name(&self, index: u64, offset: u64) -> Result<String> {
        let start = index as usize;
        let tail = self.name_table.get(start..).ok_or_else(|| {
            ShuckError::corrupt_header(offset, format!("name table index {index} out of range"))
        })?;
        let end = tail.iter().position(|&b| b == b'\n').unwrap_or(tail.len());
        let mut name = field_str(&tail[..end]);
        if name.ends_with('/') {
            name.pop();
        }
        Ok(name)
    }
}

impl Default for ArCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderCodec for ArCodec {
    fn next_entry(
        &mut self,
        src: &mut dyn ByteSource,
        mut offset: u64,
    ) -> Result<Option<EntryMetadata>> {
        if !self.magic_seen {
            let mut magic = [0u8; 8];
            read_exact(src, &mut magic)?;
            if &magic != GLOBAL_MAGIC {
                return Err(ShuckError::format_mismatch(*GLOBAL_MAGIC, magic));
            }
            self.magic_seen = true;
            offset += 8;
        }

        loop {
            let mut header = [0u8; HEADER_LEN];
            if !read_exact_or_eof(src, &mut header)? {
                return Ok(None);
            }
            if &header[58..60] != b"`\n" {
                return Err(ShuckError::corrupt_header(offset, "bad member terminator"));
            }

            let raw_name = field_str(&header[0..16]);
            let mtime = parse_decimal(&header[16..28], offset, "mtime")?;
            let uid = parse_decimal(&header[28..34], offset, "uid")? as u32;
            let gid = parse_decimal(&header[34..40], offset, "gid")? as u32;
            let mode = parse_octal(&header[40..48]).unwrap_or(0) as u32;
            let size = parse_decimal(&header[48..58], offset, "size")?;
            offset += HEADER_LEN as u64;

            // Symbol table: no file behind it.
            if raw_name == "/" {
                src.skip(size + self.data_padding(size))?;
                offset += size + self.data_padding(size);
                continue;
            }
            // Long-name table: stash and move to the next member.
            if raw_name == "//" {
                if size > NAME_TABLE_MAX {
                    return Err(ShuckError::corrupt_header(
                        offset,
                        format!("name table of {size} bytes"),
                    ));
                }
                self.name_table = vec![0u8; size as usize];
                read_exact(src, &mut self.name_table)?;
                src.skip(self.data_padding(size))?;
                offset += size + self.data_padding(size);
                continue;
            }

            let name = if let Some(index) = raw_name.strip_prefix('/') {
                let index = index.parse().map_err(|_| {
                    ShuckError::corrupt_header(offset, format!("bad long-name ref {raw_name:?}"))
                })?;
                self.long_name(index, offset)?
            } else {
                // GNU terminates short names with a slash.
                raw_name.strip_suffix('/').unwrap_or(&raw_name).to_string()
            };

            let meta = EntryMetadata::file(name, size)
                .with_mode(mode & 0o7777)
                .with_owner(uid, gid)
                .with_mtime(mtime);
            return Ok(Some(meta));
        }
    }

    fn data_padding(&self, size: u64) -> u64 {
        size % 2
    }
}
