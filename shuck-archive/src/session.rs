//! Archive session driver.
//!
//! One [`Session`] owns a byte source, the detected (or forced) header
//! codec and a selector, and drives the scan loop: read a header,
//! judge the entry, stream or skip its data, repeat until the codec
//! reports end of archive. Per-entry filesystem failures are recorded
//! and the scan continues; structural failures (bad header, short
//! archive, cancellation) abort it.
//!
//! Compressed archives are wrapped transparently: the compression is
//! sniffed from the signature bytes and a transformer worker feeds the
//! codec through a pipe. A wrapped source can only skip by reading;
//! a plain seekable file skips by seeking.

use crate::action::EntryAction;
use crate::detect::CompressionFormat;
use crate::filter::{Decision, Selector};
use crate::headers::{ArCodec, CpioCodec, HeaderCodec, TarCodec};
use crate::links::PendingLink;
use crate::transform::{PipeReader, spawn};
use shuck_core::entry::EntryMetadata;
use shuck_core::error::{Result, ShuckError};
use shuck_core::source::{ByteSource, Monitor, SeekSource, StreamSource};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Compression handling for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Sniff the signature bytes.
    #[default]
    Auto,
    /// Force a format; the only way to read raw lzma, which has no
    /// signature.
    Explicit(CompressionFormat),
}

/// Container format of the archive proper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveFormat {
    /// Sniff from the first bytes.
    #[default]
    Auto,
    /// POSIX tar, lenient end-of-archive handling.
    Tar,
    /// POSIX tar requiring both terminating zero blocks.
    TarStrict,
    /// CPIO, newc or odc.
    Cpio,
    /// Unix ar.
    Ar,
}

impl ArchiveFormat {
    fn codec(self) -> Box<dyn HeaderCodec> {
        match self {
            ArchiveFormat::Tar | ArchiveFormat::Auto => Box::new(TarCodec::new()),
            ArchiveFormat::TarStrict => Box::new(TarCodec::strict()),
            ArchiveFormat::Cpio => Box::new(CpioCodec::new()),
            ArchiveFormat::Ar => Box::new(ArCodec::new()),
        }
    }
}

/// Scan outcome.
#[derive(Debug, Default)]
pub struct Report {
    /// Entries the codec produced.
    pub entries: u64,
    /// Entries handed to the action.
    pub acted: u64,
    /// Entries dropped by selection.
    pub skipped: u64,
    /// Per-entry failures that did not stop the scan.
    pub failures: Vec<(String, ShuckError)>,
    /// Links whose target never materialized.
    pub broken_links: Vec<PendingLink>,
    /// Accept patterns that never matched anything.
    pub unmatched: Vec<String>,
    /// Archive-stream bytes consumed.
    pub bytes_read: u64,
}

impl Report {
    /// True when every selected entry was processed and every accept
    /// pattern found a match.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.broken_links.is_empty() && self.unmatched.is_empty()
    }
}

/// Read side of a transformer worker, with pushback for signature
/// sniffing. Progress is counted by the worker's own source reads, so
/// this side stays silent toward the monitor.
struct PipeSource {
    pipe: PipeReader,
    pushback: Vec<u8>,
    monitor: Monitor,
}

impl Read for PipeSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.pushback.is_empty() {
            let n = self.pushback.len().min(buf.len());
            let rest = self.pushback.split_off(n);
            buf[..n].copy_from_slice(&self.pushback);
            self.pushback = rest;
            return Ok(n);
        }
        self.pipe.read(buf)
    }
}

enum Input {
    Direct(Box<dyn ByteSource>),
    Piped(PipeSource),
}

/// Session source: delegates to the input and keeps a running byte
/// offset for error messages and the report.
struct OffsetSource {
    input: Input,
    offset: u64,
}

impl Read for OffsetSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.input {
            Input::Direct(src) => src.read(buf)?,
            Input::Piped(pipe) => pipe.read(buf)?,
        };
        self.offset += n as u64;
        Ok(n)
    }
}

impl ByteSource for OffsetSource {
    fn skip(&mut self, amount: u64) -> Result<()> {
        match &mut self.input {
            Input::Direct(src) => src.skip(amount)?,
            Input::Piped(pipe) => {
                // Decompressed data only exists by being produced;
                // skipping is reading.
                let mut remaining = amount;
                let mut scratch = [0u8; 8192];
                while remaining > 0 {
                    pipe.monitor.checkpoint()?;
                    let want = scratch.len().min(remaining as usize);
                    let n = pipe.read(&mut scratch[..want])?;
                    if n == 0 {
                        return Err(ShuckError::short_read(amount, amount - remaining));
                    }
                    remaining -= n as u64;
                }
            }
        }
        self.offset += amount;
        Ok(())
    }

    fn unread(&mut self, bytes: &[u8]) {
        match &mut self.input {
            Input::Direct(src) => src.unread(bytes),
            Input::Piped(pipe) => {
                let mut combined = bytes.to_vec();
                combined.extend_from_slice(&pipe.pushback);
                pipe.pushback = combined;
            }
        }
        self.offset = self.offset.saturating_sub(bytes.len() as u64);
    }

    fn monitor(&self) -> &Monitor {
        match &self.input {
            Input::Direct(src) => src.monitor(),
            Input::Piped(pipe) => &pipe.monitor,
        }
    }
}

/// Sniff the container format from the first bytes, leaving the
/// source positioned where it was.
fn detect_container(src: &mut dyn ByteSource) -> Result<ArchiveFormat> {
    let mut head = [0u8; 8];
    let mut got = 0;
    while got < head.len() {
        let n = src.read(&mut head[got..]).map_err(ShuckError::from)?;
        if n == 0 {
            break;
        }
        got += n;
    }
    src.unread(&head[..got]);

    let format = if head[..got].starts_with(b"070701")
        || head[..got].starts_with(b"070702")
        || head[..got].starts_with(b"070707")
    {
        ArchiveFormat::Cpio
    } else if &head[..got] == b"!<arch>\n" {
        ArchiveFormat::Ar
    } else {
        // No cheap signature; tar is recognized by its checksum once
        // the codec reads the first block.
        ArchiveFormat::Tar
    };
    Ok(format)
}

fn wrap_source(
    src: impl ByteSource + 'static,
    compression: Compression,
    monitor: Monitor,
) -> Result<Input> {
    let mut src = src;
    let format = match compression {
        Compression::Explicit(f) => f,
        Compression::Auto => CompressionFormat::sniff(&mut src)?,
    };
    log::debug!("compression: {format}");
    if format == CompressionFormat::None {
        return Ok(Input::Direct(Box::new(src)));
    }
    Ok(Input::Piped(PipeSource {
        pipe: spawn(format, src),
        pushback: Vec::new(),
        monitor,
    }))
}

/// One archive scan.
pub struct Session {
    source: OffsetSource,
    codec: Box<dyn HeaderCodec>,
    selector: Selector,
    monitor: Monitor,
}

impl Session {
    fn assemble(
        src: impl ByteSource + 'static,
        compression: Compression,
        format: ArchiveFormat,
        selector: Selector,
        monitor: Monitor,
    ) -> Result<Self> {
        let input = wrap_source(src, compression, monitor.clone())?;
        let mut source = OffsetSource { input, offset: 0 };
        let format = match format {
            ArchiveFormat::Auto => detect_container(&mut source)?,
            other => other,
        };
        log::debug!("container: {format:?}");
        Ok(Self {
            source,
            codec: format.codec(),
            selector,
            monitor,
        })
    }

    /// Open an archive file. An uncompressed file skips by seeking.
    pub fn from_file(
        path: &Path,
        compression: Compression,
        format: ArchiveFormat,
        selector: Selector,
        monitor: Monitor,
    ) -> Result<Self> {
        let file = File::open(path).map_err(|e| ShuckError::create_error(path, e))?;
        let src = SeekSource::new(file, monitor.clone());
        Self::assemble(src, compression, format, selector, monitor)
    }

    /// Read an archive from a non-seekable stream.
    pub fn from_reader(
        reader: impl Read + Send + 'static,
        compression: Compression,
        format: ArchiveFormat,
        selector: Selector,
        monitor: Monitor,
    ) -> Result<Self> {
        let src = StreamSource::new(reader, monitor.clone());
        Self::assemble(src, compression, format, selector, monitor)
    }

    /// Drive the scan, handing selected entries to `action`.
    pub fn run(&mut self, action: &mut dyn EntryAction) -> Result<Report> {
        let result = self.scan(action);
        match result {
            Ok(mut report) => {
                report.broken_links = action.finish()?;
                report.unmatched = self.selector.unmatched();
                for name in &report.unmatched {
                    log::warn!("{name}: not found in archive");
                }
                report.bytes_read = self.source.offset;
                self.drain_worker(None)?;
                Ok(report)
            }
            Err(e) => Err(self.drain_worker(Some(e)).unwrap_err()),
        }
    }

    fn scan(&mut self, action: &mut dyn EntryAction) -> Result<Report> {
        let mut report = Report::default();
        loop {
            if self.selector.is_exhausted() {
                log::debug!("all requested names found, stopping early");
                break;
            }
            self.monitor.checkpoint()?;

            let offset = self.source.offset;
            let Some(meta) = self.codec.next_entry(&mut self.source, offset)? else {
                break;
            };
            report.entries += 1;

            let name = meta.sanitized_name();
            let padding = self.codec.data_padding(meta.size);
            if self.selector.decide(&name) == Decision::Drop {
                log::debug!("{name}: skipped");
                self.source.skip(meta.size + padding)?;
                report.skipped += 1;
                continue;
            }

            let outcome = self.act_on(action, &meta)?;
            self.source.skip(padding)?;

            match outcome {
                Ok(()) => report.acted += 1,
                Err(e) if e.is_per_entry() => {
                    log::warn!("{name}: {e}");
                    report.failures.push((name, e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Hand one entry to the action, then make sure its data region is
    /// fully consumed regardless of how much the action read. The
    /// inner Result is the action's verdict; the outer one is
    /// structural.
    fn act_on(
        &mut self,
        action: &mut dyn EntryAction,
        meta: &EntryMetadata,
    ) -> Result<std::result::Result<(), ShuckError>> {
        if meta.kind.has_data() && meta.size > 0 {
            let mut bounded = Read::take(&mut self.source, meta.size);
            let outcome = action.handle(meta, Some(&mut bounded));
            let leftover = bounded.limit();
            if leftover > 0 {
                self.source.skip(leftover)?;
            }
            match outcome {
                // An action that read past a truncated stream reports
                // Io/ShortRead; that is structural, not per-entry.
                Err(e) if !e.is_per_entry() => Err(e),
                other => Ok(other),
            }
        } else {
            self.source.skip(meta.size)?;
            Ok(action.handle(meta, None))
        }
    }

    /// Join the transformer worker if there is one. With `cause` set
    /// the scan already failed; the worker's typed error, when it has
    /// one, replaces a bare short-read symptom.
    fn drain_worker(&mut self, cause: Option<ShuckError>) -> Result<()> {
        let input = std::mem::replace(
            &mut self.source.input,
            Input::Direct(Box::new(ExhaustedSource(self.monitor.clone()))),
        );
        let Input::Piped(pipe) = input else {
            return match cause {
                Some(e) => Err(e),
                None => Ok(()),
            };
        };
        let worker = pipe.pipe.finish();
        match cause {
            Some(e) => match worker {
                Err(we) if !matches!(we, ShuckError::Unsupported { .. }) => {
                    log::debug!("scan error superseded by transformer error: {e}");
                    Err(we)
                }
                _ => Err(e),
            },
            None => {
                if let Err(we) = worker {
                    // The archive itself was read to its end marker;
                    // trailing stream damage is worth a warning only.
                    log::warn!("transformer reported an error after end of archive: {we}");
                }
                Ok(())
            }
        }
    }
}

/// Placeholder input installed once the worker is joined.
struct ExhaustedSource(Monitor);

impl Read for ExhaustedSource {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }
}

impl ByteSource for ExhaustedSource {
    fn skip(&mut self, amount: u64) -> Result<()> {
        if amount > 0 {
            return Err(ShuckError::short_read(amount, 0));
        }
        Ok(())
    }

    fn unread(&mut self, _bytes: &[u8]) {}

    fn monitor(&self) -> &Monitor {
        &self.0
    }
}

/// Identify a file's compression and container without scanning it.
pub fn probe_file(path: &Path) -> Result<(CompressionFormat, ArchiveFormat)> {
    let monitor = Monitor::new();
    let file = File::open(path).map_err(|e| ShuckError::create_error(path, e))?;
    let mut src = SeekSource::new(file, monitor.clone());
    let compression = CompressionFormat::sniff(&mut src)?;
    let container = if compression == CompressionFormat::None {
        detect_container(&mut src)?
    } else {
        let pipe = PipeSource {
            pipe: spawn(compression, src),
            pushback: Vec::new(),
            monitor: monitor.clone(),
        };
        let mut source = OffsetSource {
            input: Input::Piped(pipe),
            offset: 0,
        };
        let container = detect_container(&mut source)?;
        if let Input::Piped(p) = source.input {
            let _ = p.pipe.finish();
        }
        container
    };
    Ok((compression, container))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ListAction;
    use crate::headers::TarWriter;
    use shuck_core::entry::EntryMetadata;
    use std::io::Cursor;

    fn tar_fixture() -> Vec<u8> {
        let mut buf = Vec::new();
        let mut w = TarWriter::new(&mut buf);
        w.append(&EntryMetadata::directory("d"), b"").unwrap();
        w.append(&EntryMetadata::file("d/one.txt", 5), b"first").unwrap();
        w.append(&EntryMetadata::file("two.txt", 6), b"second").unwrap();
        w.finish().unwrap();
        buf
    }

    fn run_list(archive: Vec<u8>, selector: Selector) -> (String, Report) {
        let mut session = Session::from_reader(
            Cursor::new(archive),
            Compression::Auto,
            ArchiveFormat::Auto,
            selector,
            Monitor::new(),
        )
        .unwrap();
        let mut out = Vec::new();
        let mut action = ListAction::new(&mut out, false);
        let report = session.run(&mut action).unwrap();
        (String::from_utf8(out).unwrap(), report)
    }

    #[test]
    fn test_list_plain_tar() {
        let (out, report) = run_list(tar_fixture(), Selector::accept_all());
        assert_eq!(out, "d\nd/one.txt\ntwo.txt\n");
        assert_eq!(report.entries, 3);
        assert_eq!(report.acted, 3);
        assert!(report.is_clean());
    }

    #[test]
    fn test_selection_skips_data() {
        let selector = Selector::accept_list(&["two.txt".to_string()]).unwrap();
        let (out, report) = run_list(tar_fixture(), selector);
        assert_eq!(out, "two.txt\n");
        assert_eq!(report.skipped, 2);
        assert!(report.is_clean());
    }

    #[test]
    fn test_consume_stops_early() {
        let selector = Selector::consume(&["d/one.txt".to_string()]).unwrap();
        let (out, report) = run_list(tar_fixture(), selector);
        assert_eq!(out, "d/one.txt\n");
        // two.txt comes after the last wanted name and is never read.
        assert_eq!(report.entries, 2);
    }

    #[test]
    fn test_unmatched_name_reported() {
        let selector = Selector::accept_list(&["ghost.txt".to_string()]).unwrap();
        let (out, report) = run_list(tar_fixture(), selector);
        assert!(out.is_empty());
        assert_eq!(report.unmatched, vec!["ghost.txt".to_string()]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_gzip_wrapped_tar_auto() {
        use flate2::Compression as Level;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut enc = GzEncoder::new(Vec::new(), Level::default());
        enc.write_all(&tar_fixture()).unwrap();
        let gz = enc.finish().unwrap();

        let (out, report) = run_list(gz, Selector::accept_all());
        assert_eq!(out, "d\nd/one.txt\ntwo.txt\n");
        assert_eq!(report.entries, 3);
    }

    #[test]
    fn test_cancellation_aborts() {
        let monitor = Monitor::new();
        monitor.cancel();
        let mut session = Session::from_reader(
            Cursor::new(tar_fixture()),
            Compression::Explicit(CompressionFormat::None),
            ArchiveFormat::Tar,
            Selector::accept_all(),
            monitor,
        )
        .unwrap();
        let mut out = Vec::new();
        let mut action = ListAction::new(&mut out, false);
        let err = session.run(&mut action).unwrap_err();
        assert!(matches!(err, ShuckError::Interrupted));
    }

    #[test]
    fn test_corrupt_header_aborts() {
        let mut archive = tar_fixture();
        archive[130] ^= 0x55; // inside the first header's size field
        let mut session = Session::from_reader(
            Cursor::new(archive),
            Compression::Auto,
            ArchiveFormat::Tar,
            Selector::accept_all(),
            Monitor::new(),
        )
        .unwrap();
        let mut out = Vec::new();
        let mut action = ListAction::new(&mut out, false);
        assert!(session.run(&mut action).is_err());
    }

    #[test]
    fn test_container_detection() {
        let mut src = StreamSource::new(Cursor::new(b"!<arch>\nrest".to_vec()), Monitor::new());
        assert_eq!(detect_container(&mut src).unwrap(), ArchiveFormat::Ar);
        // Sniffing must not consume.
        let mut head = [0u8; 8];
        shuck_core::source::read_exact(&mut src, &mut head).unwrap();
        assert_eq!(&head, b"!<arch>\n");

        let mut src =
            StreamSource::new(Cursor::new(b"070701AABBCC".to_vec()), Monitor::new());
        assert_eq!(detect_container(&mut src).unwrap(), ArchiveFormat::Cpio);
    }
}
