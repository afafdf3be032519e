//! Per-entry actions.
//!
//! The session driver walks the archive and hands each selected entry
//! to one of these. Listing never touches the data; extraction
//! materializes the filesystem; the write and command actions stream
//! every selected entry's data to a single sink.

use crate::links::{self, PendingLink};
use crate::policy::Policy;
use shuck_core::entry::{EntryKind, EntryMetadata};
use shuck_core::error::{Result, ShuckError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// What to do with each selected entry.
///
/// `data` is `Some` exactly when the entry kind carries data; the
/// reader yields the entry's bytes and nothing else. Returning a
/// [`ShuckError::CreateError`] marks the entry failed without
/// stopping the scan.
pub trait EntryAction {
    /// Process one entry.
    fn handle(&mut self, meta: &EntryMetadata, data: Option<&mut dyn Read>) -> Result<()>;

    /// Called once after a successful scan. Returns links that could
    /// not be resolved.
    fn finish(&mut self) -> Result<Vec<PendingLink>> {
        Ok(Vec::new())
    }
}

/// Print entry names, optionally with metadata.
pub struct ListAction<W: Write> {
    out: W,
    verbose: bool,
}

impl<W: Write> ListAction<W> {
    /// List to `out`; `verbose` adds mode, owner and size columns.
    pub fn new(out: W, verbose: bool) -> Self {
        Self { out, verbose }
    }
}

impl<W: Write> EntryAction for ListAction<W> {
    fn handle(&mut self, meta: &EntryMetadata, _data: Option<&mut dyn Read>) -> Result<()> {
        if self.verbose {
            writeln!(self.out, "{meta}")?;
        } else {
            writeln!(self.out, "{}", meta.sanitized_name())?;
        }
        Ok(())
    }
}

/// Materialize entries on the filesystem under a root directory.
pub struct ExtractAction {
    root: PathBuf,
    policy: Policy,
    pending: Vec<PendingLink>,
    /// Names of entries written, in order.
    pub written: Vec<String>,
}

impl ExtractAction {
    /// Extract under `root` per `policy`.
    pub fn new(root: impl Into<PathBuf>, policy: Policy) -> Self {
        Self {
            root: root.into(),
            policy,
            pending: Vec::new(),
            written: Vec::new(),
        }
    }

    fn prepare_dest(&self, name: &str) -> Result<PathBuf> {
        let dest = self.root.join(name);
        if self.policy.make_leading_dirs {
            if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| ShuckError::create_error(parent, e))?;
            }
        }
        Ok(dest)
    }

    /// True when an existing file at `dest` is at least as new as the
    /// archived entry.
    fn existing_is_newer(&self, dest: &Path, meta: &EntryMetadata) -> bool {
        if !self.policy.only_if_newer {
            return false;
        }
        dest.metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .is_some_and(|d| d.as_secs() >= meta.mtime)
    }

    fn write_file(
        &self,
        dest: &Path,
        meta: &EntryMetadata,
        data: &mut dyn Read,
    ) -> Result<()> {
        if self.policy.unlink_old && dest.symlink_metadata().is_ok() {
            let _ = fs::remove_file(dest);
        }
        let mut file = if self.policy.truncate {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(dest)
        } else {
            File::create(dest)
        }
        .map_err(|e| ShuckError::create_error(dest, e))?;

        let copied = io::copy(data, &mut file)?;
        if copied != meta.size {
            return Err(ShuckError::short_write(meta.size, copied));
        }
        Ok(())
    }

    fn restore_attrs(&self, dest: &Path, meta: &EntryMetadata) -> Result<()> {
        #[cfg(unix)]
        if self.policy.restore_perm {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dest, fs::Permissions::from_mode(meta.mode))
                .map_err(|e| ShuckError::create_error(dest, e))?;
        }
        #[cfg(unix)]
        if self.policy.restore_owner {
            let (uid, gid) = resolve_owner(meta, self.policy.numeric_owner);
            if let Err(e) = rustix::fs::chown(
                dest,
                Some(rustix::fs::Uid::from_raw(uid)),
                Some(rustix::fs::Gid::from_raw(gid)),
            ) {
                log::warn!("cannot chown {}: {e}", dest.display());
            }
        }
        if self.policy.restore_mtime && meta.mtime > 0 {
            let mtime = filetime::FileTime::from_unix_time(meta.mtime as i64, 0);
            filetime::set_file_mtime(dest, mtime)
                .map_err(|e| ShuckError::create_error(dest, e))?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn make_special(&self, dest: &Path, meta: &EntryMetadata) -> Result<()> {
        use rustix::fs::{FileType, Mode};
        let file_type = match meta.kind {
            EntryKind::CharDevice => FileType::CharacterDevice,
            EntryKind::BlockDevice => FileType::BlockDevice,
            _ => FileType::Fifo,
        };
        let dev = rustix::fs::makedev(meta.dev_major, meta.dev_minor);
        rustix::fs::mknodat(
            rustix::fs::CWD,
            dest,
            file_type,
            Mode::from_raw_mode(meta.mode),
            dev,
        )
        .map_err(|e| ShuckError::create_error(dest, io::Error::from(e)))
    }

    #[cfg(not(unix))]
    fn make_special(&self, dest: &Path, _meta: &EntryMetadata) -> Result<()> {
        Err(ShuckError::create_error(
            dest,
            io::Error::other("special files not supported on this platform"),
        ))
    }
}

#[cfg(unix)]
fn resolve_owner(meta: &EntryMetadata, numeric: bool) -> (u32, u32) {
    // Symbolic name lookup would need the passwd database; the stored
    // numeric ids are what unprivileged extraction restores anyway.
    if !numeric {
        if let Some(uname) = &meta.uname {
            log::debug!("owner name {uname} not looked up, restoring uid {}", meta.uid);
        }
    }
    (meta.uid, meta.gid)
}

impl EntryAction for ExtractAction {
    fn handle(&mut self, meta: &EntryMetadata, data: Option<&mut dyn Read>) -> Result<()> {
        let name = meta.sanitized_name();
        if name.is_empty() {
            log::warn!("entry with empty sanitized name skipped");
            return Ok(());
        }

        match meta.kind {
            EntryKind::Directory => {
                let dest = self.root.join(&name);
                fs::create_dir_all(&dest).map_err(|e| ShuckError::create_error(&dest, e))?;
                self.restore_attrs(&dest, meta)?;
            }
            EntryKind::Symlink | EntryKind::Hardlink => {
                let Some(target) = meta.link_target.clone() else {
                    return Err(ShuckError::create_error(
                        self.root.join(&name),
                        io::Error::other("link entry without a target"),
                    ));
                };
                self.prepare_dest(&name)?;
                self.pending.push(PendingLink {
                    target,
                    link_name: PathBuf::from(&name),
                    hard: meta.kind == EntryKind::Hardlink,
                });
            }
            EntryKind::CharDevice | EntryKind::BlockDevice | EntryKind::Fifo => {
                let dest = self.prepare_dest(&name)?;
                if self.policy.unlink_old && dest.symlink_metadata().is_ok() {
                    let _ = fs::remove_file(&dest);
                }
                self.make_special(&dest, meta)?;
                self.restore_attrs(&dest, meta)?;
            }
            EntryKind::File | EntryKind::Unknown => {
                let dest = self.prepare_dest(&name)?;
                if self.existing_is_newer(&dest, meta) {
                    log::debug!("{name}: existing file is newer, keeping it");
                    return Ok(());
                }
                let mut empty: &[u8] = &[];
                let reader: &mut dyn Read = match data {
                    Some(r) => r,
                    None => &mut empty,
                };
                self.write_file(&dest, meta, reader)?;
                self.restore_attrs(&dest, meta)?;
            }
        }

        if self.policy.remember_names {
            self.written.push(name);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<PendingLink>> {
        let pending = std::mem::take(&mut self.pending);
        let report = links::resolve(&self.root, pending, self.policy.unlink_old)?;
        Ok(report.broken)
    }
}

/// Stream every selected entry's data to one writer.
pub struct WriteAction<W: Write> {
    out: W,
}

impl<W: Write> WriteAction<W> {
    /// Concatenate entry data to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> EntryAction for WriteAction<W> {
    fn handle(&mut self, meta: &EntryMetadata, data: Option<&mut dyn Read>) -> Result<()> {
        if let Some(reader) = data {
            let copied = io::copy(reader, &mut self.out)?;
            if copied != meta.size {
                return Err(ShuckError::short_write(meta.size, copied));
            }
        }
        Ok(())
    }
}

/// Pipe every selected entry's data to a spawned command's stdin.
pub struct CommandAction {
    child: Child,
}

impl CommandAction {
    /// Run `argv` with a piped stdin.
    pub fn spawn(argv: &[String]) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ShuckError::unsupported("empty command"))?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| ShuckError::create_error(program, e))?;
        Ok(Self { child })
    }

    /// Close stdin and wait for the command to exit.
    pub fn wait(mut self) -> Result<()> {
        drop(self.child.stdin.take());
        let status = self.child.wait()?;
        if !status.success() {
            return Err(ShuckError::unsupported(format!(
                "command exited with {status}"
            )));
        }
        Ok(())
    }
}

impl EntryAction for CommandAction {
    fn handle(&mut self, meta: &EntryMetadata, data: Option<&mut dyn Read>) -> Result<()> {
        if let (Some(reader), Some(stdin)) = (data, self.child.stdin.as_mut()) {
            let copied = io::copy(reader, stdin)?;
            if copied != meta.size {
                return Err(ShuckError::short_write(meta.size, copied));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_plain() {
        let mut out = Vec::new();
        let mut action = ListAction::new(&mut out, false);
        action
            .handle(&EntryMetadata::file("a/b.txt", 3), None)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a/b.txt\n");
    }

    #[test]
    fn test_list_verbose_shows_link_target() {
        let mut out = Vec::new();
        let mut action = ListAction::new(&mut out, true);
        action
            .handle(&EntryMetadata::symlink("s", "t"), None)
            .unwrap();
        let line = String::from_utf8(out).unwrap();
        assert!(line.contains("-> t"), "got: {line}");
    }

    #[test]
    fn test_extract_file_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut action = ExtractAction::new(dir.path(), Policy::default());

        action
            .handle(&EntryMetadata::directory("sub"), None)
            .unwrap();
        let meta = EntryMetadata::file("sub/f.txt", 5).with_mtime(1_600_000_000);
        let mut data: &[u8] = b"hello";
        action.handle(&meta, Some(&mut data)).unwrap();

        assert_eq!(fs::read(dir.path().join("sub/f.txt")).unwrap(), b"hello");
        assert_eq!(action.written, vec!["sub", "sub/f.txt"]);
        let broken = action.finish().unwrap();
        assert!(broken.is_empty());
    }

    #[test]
    fn test_extract_makes_leading_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut action = ExtractAction::new(dir.path(), Policy::default());
        let mut data: &[u8] = b"x";
        action
            .handle(&EntryMetadata::file("deep/ly/nested", 1), Some(&mut data))
            .unwrap();
        assert!(dir.path().join("deep/ly/nested").is_file());
    }

    #[test]
    fn test_extract_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut action = ExtractAction::new(dir.path(), Policy::default());
        let mut data: &[u8] = b"ab";
        let err = action
            .handle(&EntryMetadata::file("short", 10), Some(&mut data))
            .unwrap_err();
        assert!(matches!(err, ShuckError::ShortWrite { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_restores_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let mut action = ExtractAction::new(dir.path(), Policy::default().restore_perm(true));
        let mut data: &[u8] = b"#!/bin/sh\n";
        action
            .handle(
                &EntryMetadata::file("run.sh", 10).with_mode(0o755),
                Some(&mut data),
            )
            .unwrap();
        let mode = fs::metadata(dir.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_extract_only_if_newer_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("keep.txt");
        fs::write(&dest, b"current").unwrap();

        let mut action =
            ExtractAction::new(dir.path(), Policy::default().only_if_newer(true));
        // Archived copy predates the file on disk.
        let meta = EntryMetadata::file("keep.txt", 3).with_mtime(1);
        let mut data: &[u8] = b"old";
        action.handle(&meta, Some(&mut data)).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"current");
    }

    #[cfg(unix)]
    #[test]
    fn test_deferred_links_resolved_in_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut action = ExtractAction::new(dir.path(), Policy::default());

        // Link arrives before its target.
        action
            .handle(&EntryMetadata::hardlink("alias", "real.txt"), None)
            .unwrap();
        let mut data: &[u8] = b"body";
        action
            .handle(&EntryMetadata::file("real.txt", 4), Some(&mut data))
            .unwrap();

        let broken = action.finish().unwrap();
        assert!(broken.is_empty());
        assert_eq!(fs::read(dir.path().join("alias")).unwrap(), b"body");
    }

    #[test]
    fn test_write_action_concatenates() {
        let mut out = Vec::new();
        let mut action = WriteAction::new(&mut out);
        let mut a: &[u8] = b"one";
        let mut b: &[u8] = b"two";
        action
            .handle(&EntryMetadata::file("a", 3), Some(&mut a))
            .unwrap();
        action
            .handle(&EntryMetadata::file("b", 3), Some(&mut b))
            .unwrap();
        assert_eq!(out, b"onetwo");
    }

    #[test]
    fn test_command_action_pipes_data() {
        let mut action = CommandAction::spawn(&["cat".to_string()]).unwrap();
        let mut data: &[u8] = b"through the pipe";
        action
            .handle(&EntryMetadata::file("f", 16), Some(&mut data))
            .unwrap();
        action.wait().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_owner_uses_stored_ids() {
        // Symbolic names are never looked up; the stored ids win with
        // and without the numeric flag.
        let mut meta = EntryMetadata::file("f", 0).with_owner(1234, 5678);
        meta.uname = Some("nobody".to_string());
        assert_eq!(resolve_owner(&meta, false), (1234, 5678));
        assert_eq!(resolve_owner(&meta, true), (1234, 5678));
    }
}
