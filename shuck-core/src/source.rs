//! Byte sources: monitored reads, pushback, and the two skip strategies.
//!
//! Every stream the extraction stack reads goes through a [`ByteSource`]
//! so that cancellation is checked before each read, progress is
//! reported after it, and sniffed signature bytes can be pushed back
//! without the downstream codec ever noticing.
//!
//! Skipping an entry's data is either a seek ([`SeekSource`], O(1),
//! regular files) or a bounded read-and-discard loop ([`StreamSource`],
//! the only option downstream of a decompressor pipe). Callers never
//! special-case which one is bound.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{Cancelled, Result, ShuckError};

/// Advisory progress callback: total bytes read so far.
pub type ProgressFn = dyn Fn(u64) + Send + Sync;

struct MonitorInner {
    cancel: AtomicBool,
    total: AtomicU64,
    progress: Option<Box<ProgressFn>>,
}

/// Shared cancellation flag and bytes-processed counter.
///
/// Cloned into every source (and the transformer worker thread) of one
/// session; sessions never share a monitor. The progress callback is an
/// advisory side channel invoked at most once per successful read and
/// is never used for control flow.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl Monitor {
    /// Create a monitor with no progress observer.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a monitor that reports the running byte total to `f`.
    pub fn with_progress(f: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self::build(Some(Box::new(f)))
    }

    fn build(progress: Option<Box<ProgressFn>>) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                cancel: AtomicBool::new(false),
                total: AtomicU64::new(0),
                progress,
            }),
        }
    }

    /// Request cancellation. Every subsequent read in the session fails
    /// with [`ShuckError::Interrupted`].
    pub fn cancel(&self) {
        self.inner.cancel.store(true, Ordering::Relaxed);
    }

    /// Check the flag without failing.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.load(Ordering::Relaxed)
    }

    /// Fail with [`ShuckError::Interrupted`] if cancellation was
    /// requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ShuckError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Total bytes read through monitored sources so far.
    pub fn bytes_processed(&self) -> u64 {
        self.inner.total.load(Ordering::Relaxed)
    }

    fn note_read(&self, n: u64) {
        if n == 0 {
            return;
        }
        let total = self.inner.total.fetch_add(n, Ordering::Relaxed) + n;
        if let Some(f) = &self.inner.progress {
            f(total);
        }
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("cancelled", &self.is_cancelled())
            .field("bytes_processed", &self.bytes_processed())
            .finish()
    }
}

/// A readable byte stream with pushback and a bound skip strategy.
pub trait ByteSource: Read + Send {
    /// Advance past `amount` bytes of data.
    fn skip(&mut self, amount: u64) -> Result<()>;

    /// Return `bytes` to the head of the stream; the next reads yield
    /// them again. Used so signature sniffing never consumes bytes the
    /// chosen transformer still needs to see.
    fn unread(&mut self, bytes: &[u8]);

    /// The session monitor this source reports to.
    fn monitor(&self) -> &Monitor;
}

fn cancelled_io() -> io::Error {
    io::Error::other(Cancelled)
}

/// Seekable source: skip adjusts the file position directly.
pub struct SeekSource<R: Read + Seek + Send> {
    reader: R,
    monitor: Monitor,
    pushback: Vec<u8>,
}

impl<R: Read + Seek + Send> SeekSource<R> {
    /// Wrap a seekable reader.
    pub fn new(reader: R, monitor: Monitor) -> Self {
        Self {
            reader,
            monitor,
            pushback: Vec::new(),
        }
    }
}

fn take_pushback(pushback: &mut Vec<u8>, buf: &mut [u8]) -> usize {
    let n = pushback.len().min(buf.len());
    buf[..n].copy_from_slice(&pushback[..n]);
    pushback.drain(..n);
    n
}

impl<R: Read + Seek + Send> Read for SeekSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.monitor.is_cancelled() {
            return Err(cancelled_io());
        }
        if !self.pushback.is_empty() {
            // Already counted when first read; no progress report.
            return Ok(take_pushback(&mut self.pushback, buf));
        }
        let n = self.reader.read(buf)?;
        self.monitor.note_read(n as u64);
        Ok(n)
    }
}

impl<R: Read + Seek + Send> ByteSource for SeekSource<R> {
    fn skip(&mut self, amount: u64) -> Result<()> {
        self.monitor.checkpoint()?;
        let from_pushback = (self.pushback.len() as u64).min(amount);
        self.pushback.drain(..from_pushback as usize);
        let rest = amount - from_pushback;
        if rest > 0 {
            // Seeking past EOF succeeds silently, so check against the
            // stream length; a truncated archive is a short read, the
            // same as the drain-based strategy reports.
            let pos = self.reader.stream_position()?;
            let len = self.reader.seek(SeekFrom::End(0))?;
            let available = len.saturating_sub(pos);
            if rest > available {
                return Err(ShuckError::short_read(amount, from_pushback + available));
            }
            self.reader.seek(SeekFrom::Start(pos + rest))?;
        }
        Ok(())
    }

    fn unread(&mut self, bytes: &[u8]) {
        self.pushback.splice(0..0, bytes.iter().copied());
    }

    fn monitor(&self) -> &Monitor {
        &self.monitor
    }
}

/// Non-seekable source: skip drains and discards in bounded chunks.
pub struct StreamSource<R: Read + Send> {
    reader: R,
    monitor: Monitor,
    pushback: Vec<u8>,
}

impl<R: Read + Send> StreamSource<R> {
    /// Wrap a plain reader (pipe, decompressor output, socket).
    pub fn new(reader: R, monitor: Monitor) -> Self {
        Self {
            reader,
            monitor,
            pushback: Vec::new(),
        }
    }
}

impl<R: Read + Send> Read for StreamSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.monitor.is_cancelled() {
            return Err(cancelled_io());
        }
        if !self.pushback.is_empty() {
            return Ok(take_pushback(&mut self.pushback, buf));
        }
        let n = self.reader.read(buf)?;
        self.monitor.note_read(n as u64);
        Ok(n)
    }
}

impl<R: Read + Send> ByteSource for StreamSource<R> {
    fn skip(&mut self, amount: u64) -> Result<()> {
        let mut remaining = amount;
        let mut chunk = [0u8; 8192];
        while remaining > 0 {
            self.monitor.checkpoint()?;
            let want = remaining.min(chunk.len() as u64) as usize;
            let got = self.read(&mut chunk[..want])?;
            if got == 0 {
                return Err(ShuckError::short_read(amount, amount - remaining));
            }
            remaining -= got as u64;
        }
        Ok(())
    }

    fn unread(&mut self, bytes: &[u8]) {
        self.pushback.splice(0..0, bytes.iter().copied());
    }

    fn monitor(&self) -> &Monitor {
        &self.monitor
    }
}

/// Fill `buf` completely or fail with [`ShuckError::ShortRead`].
pub fn read_exact(src: &mut dyn ByteSource, buf: &mut [u8]) -> Result<()> {
    let wanted = buf.len() as u64;
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(ShuckError::short_read(wanted, filled as u64));
        }
        filled += n;
    }
    Ok(())
}

/// Fill `buf` completely, or report a clean end-of-stream.
///
/// Returns `Ok(false)` when the stream ends exactly at the buffer
/// boundary; a partial fill is still a [`ShuckError::ShortRead`].
pub fn read_exact_or_eof(src: &mut dyn ByteSource, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(ShuckError::short_read(buf.len() as u64, filled as u64));
        }
        filled += n;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_skip_equivalence() {
        // Seek-based and read-based skip must land on the identical
        // next offset for the same amount.
        let data = sample(4096);
        let monitor = Monitor::new();

        let mut seek = SeekSource::new(Cursor::new(data.clone()), monitor.clone());
        let mut stream = StreamSource::new(Cursor::new(data.clone()), monitor.clone());

        seek.skip(1000).unwrap();
        stream.skip(1000).unwrap();

        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        read_exact(&mut seek, &mut a).unwrap();
        read_exact(&mut stream, &mut b).unwrap();
        assert_eq!(a, b);
        assert_eq!(&a[..], &data[1000..1016]);
    }

    #[test]
    fn test_unread_replays_bytes() {
        let monitor = Monitor::new();
        let mut src = StreamSource::new(Cursor::new(b"worlds".to_vec()), monitor);
        let mut sig = [0u8; 2];
        read_exact(&mut src, &mut sig).unwrap();
        assert_eq!(&sig, b"wo");
        src.unread(&sig);
        let mut all = Vec::new();
        src.read_to_end(&mut all).unwrap();
        assert_eq!(all, b"worlds");
    }

    #[test]
    fn test_skip_consumes_pushback_first() {
        let monitor = Monitor::new();
        let mut src = SeekSource::new(Cursor::new(b"abcdef".to_vec()), monitor);
        let mut two = [0u8; 2];
        read_exact(&mut src, &mut two).unwrap();
        src.unread(&two);
        src.skip(3).unwrap();
        let mut rest = Vec::new();
        src.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"def");
    }

    #[test]
    fn test_cancellation_fails_reads() {
        let monitor = Monitor::new();
        let mut src = StreamSource::new(Cursor::new(sample(64)), monitor.clone());
        monitor.cancel();
        let mut buf = [0u8; 8];
        let err = read_exact(&mut src, &mut buf).unwrap_err();
        assert!(matches!(err, ShuckError::Interrupted));
        assert!(matches!(monitor.checkpoint(), Err(ShuckError::Interrupted)));
    }

    #[test]
    fn test_short_read_on_stream_skip_past_eof() {
        let monitor = Monitor::new();
        let mut src = StreamSource::new(Cursor::new(sample(10)), monitor);
        let err = src.skip(20).unwrap_err();
        assert!(matches!(err, ShuckError::ShortRead { wanted: 20, got: 10 }));
    }

    #[test]
    fn test_short_read_on_seek_skip_past_eof() {
        // Seeking past EOF is legal at the OS level; the source must
        // still report the truncation like the drain-based skip does.
        let monitor = Monitor::new();
        let mut src = SeekSource::new(Cursor::new(sample(10)), monitor);
        src.unread(b"ab");
        let err = src.skip(20).unwrap_err();
        assert!(matches!(err, ShuckError::ShortRead { wanted: 20, got: 12 }));
    }

    #[test]
    fn test_progress_counter() {
        let monitor = Monitor::new();
        let mut src = StreamSource::new(Cursor::new(sample(100)), monitor.clone());
        let mut buf = [0u8; 40];
        read_exact(&mut src, &mut buf).unwrap();
        assert_eq!(monitor.bytes_processed(), 40);
        // Pushed-back bytes are not counted twice.
        src.unread(&buf[..10]);
        let mut again = [0u8; 10];
        read_exact(&mut src, &mut again).unwrap();
        assert_eq!(monitor.bytes_processed(), 40);
    }

    #[test]
    fn test_read_exact_or_eof() {
        let monitor = Monitor::new();
        let mut src = StreamSource::new(Cursor::new(sample(8)), monitor);
        let mut block = [0u8; 8];
        assert!(read_exact_or_eof(&mut src, &mut block).unwrap());
        assert!(!read_exact_or_eof(&mut src, &mut block).unwrap());
    }
}
