//! Archive entry metadata.
//!
//! [`EntryMetadata`] is the normalized descriptor every header codec
//! produces: one record per archive member, format-agnostic, replaced
//! each time the next header is parsed.

use std::fmt;

/// The kind of an archive member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryKind {
    /// Regular file.
    #[default]
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Hard link.
    Hardlink,
    /// Character device node.
    CharDevice,
    /// Block device node.
    BlockDevice,
    /// Named pipe.
    Fifo,
    /// Anything else the container can express.
    Unknown,
}

impl EntryKind {
    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File)
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory)
    }

    /// Check if this is a hard or symbolic link.
    pub fn is_link(&self) -> bool {
        matches!(self, Self::Symlink | Self::Hardlink)
    }

    /// Check if this is a device node or fifo.
    pub fn is_special(&self) -> bool {
        matches!(self, Self::CharDevice | Self::BlockDevice | Self::Fifo)
    }

    /// Entries of this kind carry a data stream in the archive.
    ///
    /// Links and special files never do; their payload is entirely in
    /// the header.
    pub fn has_data(&self) -> bool {
        matches!(self, Self::File | Self::Unknown)
    }
}

/// One archive member's descriptor.
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    /// Member path as stored in the archive.
    pub name: String,
    /// Link target; set only for link kinds.
    pub link_target: Option<String>,
    /// Kind of member.
    pub kind: EntryKind,
    /// Data size in bytes.
    pub size: u64,
    /// Permission bits.
    pub mode: u32,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Symbolic owner name, if the format carries one.
    pub uname: Option<String>,
    /// Symbolic group name, if the format carries one.
    pub gname: Option<String>,
    /// Modification time, seconds since the epoch.
    pub mtime: u64,
    /// Device major number, for device nodes.
    pub dev_major: u32,
    /// Device minor number, for device nodes.
    pub dev_minor: u32,
}

impl EntryMetadata {
    /// Create a regular-file descriptor.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            link_target: None,
            kind: EntryKind::File,
            size,
            mode: 0o644,
            uid: 0,
            gid: 0,
            uname: None,
            gname: None,
            mtime: 0,
            dev_major: 0,
            dev_minor: 0,
        }
    }

    /// Create a directory descriptor.
    pub fn directory(name: impl Into<String>) -> Self {
        let mut e = Self::file(name, 0);
        e.kind = EntryKind::Directory;
        e.mode = 0o755;
        e
    }

    /// Create a symlink descriptor.
    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut e = Self::file(name, 0);
        e.kind = EntryKind::Symlink;
        e.link_target = Some(target.into());
        e.mode = 0o777;
        e
    }

    /// Create a hardlink descriptor.
    pub fn hardlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut e = Self::file(name, 0);
        e.kind = EntryKind::Hardlink;
        e.link_target = Some(target.into());
        e
    }

    /// Builder method to set the mode bits.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Builder method to set the owner ids.
    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// Builder method to set the modification time.
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// The normalized extraction path: slash-separated, with absolute
    /// and parent components stripped. Selection and extraction both
    /// operate on this, never on the raw stored path.
    pub fn sanitized_name(&self) -> String {
        sanitize_path(&self.name)
    }

    /// `ls -l`-style mode column for the verbose listing.
    pub fn mode_string(&self) -> String {
        let kind = match self.kind {
            EntryKind::Directory => 'd',
            EntryKind::Symlink => 'l',
            EntryKind::Hardlink => 'h',
            EntryKind::CharDevice => 'c',
            EntryKind::BlockDevice => 'b',
            EntryKind::Fifo => 'p',
            _ => '-',
        };
        let mut s = String::with_capacity(10);
        s.push(kind);
        for shift in [6u32, 3, 0] {
            let bits = (self.mode >> shift) & 0o7;
            s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        s
    }
}

/// Strip absolute, parent and null components from an archive path.
pub fn sanitize_path(raw: &str) -> String {
    let mut result = String::new();
    for component in raw.split('/') {
        match component {
            "" | "." | ".." => {}
            c => {
                if !result.is_empty() {
                    result.push('/');
                }
                result.push_str(&c.replace('\0', "_"));
            }
        }
    }
    result
}

impl fmt::Display for EntryMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let owner = match (&self.uname, &self.gname) {
            (Some(u), Some(g)) => format!("{}/{}", u, g),
            _ => format!("{}/{}", self.uid, self.gid),
        };
        write!(
            f,
            "{} {:>12} {:>10} {}",
            self.mode_string(),
            owner,
            self.size,
            self.sanitized_name()
        )?;
        if let Some(target) = &self.link_target {
            let arrow = if self.kind == EntryKind::Hardlink {
                "link to"
            } else {
                "->"
            };
            write!(f, " {} {}", arrow, target)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_entry() {
        let e = EntryMetadata::file("a.txt", 8).with_mode(0o644);
        assert!(e.is_file());
        assert_eq!(e.size, 8);
        assert_eq!(e.mode_string(), "-rw-r--r--");
    }

    #[test]
    fn test_symlink_entry() {
        let e = EntryMetadata::symlink("link", "target");
        assert!(e.kind.is_link());
        assert!(!e.kind.has_data());
        assert_eq!(e.link_target.as_deref(), Some("target"));
    }

    #[test]
    fn test_sanitize_traversal() {
        assert_eq!(sanitize_path("../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_path("/abs/path"), "abs/path");
        assert_eq!(sanitize_path("./a/./b/../c"), "a/b/c");
        assert_eq!(sanitize_path("plain/file.txt"), "plain/file.txt");
    }

    #[test]
    fn test_mode_string_exec() {
        let e = EntryMetadata::file("x", 0).with_mode(0o755);
        assert_eq!(e.mode_string(), "-rwxr-xr-x");
        let d = EntryMetadata::directory("d");
        assert_eq!(d.mode_string(), "drwxr-xr-x");
    }

    #[test]
    fn test_display_owner_fallback() {
        let e = EntryMetadata::file("f", 1).with_owner(1000, 100);
        let line = e.to_string();
        assert!(line.contains("1000/100"));
        assert!(line.contains('f'));
    }
}
