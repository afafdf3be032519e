//! Threaded transformer pipeline.
//!
//! A worker thread runs the transformer and writes decompressed chunks
//! into a bounded channel; [`PipeReader`] exposes the other end as a
//! plain `Read`, so the session driver parses container headers while
//! decompression proceeds. A worker failure shows up downstream as an
//! early end-of-stream; [`PipeReader::finish`] recovers the worker's
//! typed error.
//!
//! On a platform where spawning is undesirable the same transformer
//! runs synchronously via [`run_inline`]; functionally equivalent,
//! only losing the overlap.

use shuck_core::error::{Result, ShuckError};
use shuck_core::source::ByteSource;
use std::io::{self, Read, Write};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread::JoinHandle;

use super::{TransformState, unpack_stream};
use crate::detect::CompressionFormat;

/// Chunks in flight between the worker and the driver.
const PIPE_DEPTH: usize = 4;

struct ChannelWriter {
    tx: SyncSender<Vec<u8>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // The receiver hanging up means the driver stopped early; the
        // worker unwinds with a broken pipe like a real one would.
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The read end of a transformer pipeline.
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
    worker: Option<JoinHandle<Result<u64>>>,
}

impl PipeReader {
    /// Join the worker and return its byte count or error.
    ///
    /// Call after draining the reader; if the stream ended short, the
    /// error returned here says why.
    pub fn finish(mut self) -> Result<u64> {
        let Some(handle) = self.worker.take() else {
            return Err(ShuckError::unsupported("pipeline already finished"));
        };
        // Drain anything still buffered so the worker can exit.
        while self.rx.recv().is_ok() {}
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(ShuckError::Io(io::Error::other(
                "transformer worker panicked",
            ))),
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.current.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                // Worker done (or failed); EOF either way, finish()
                // tells them apart.
                Err(_) => return Ok(0),
            }
        }
        let n = (self.current.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Spawn the transformer for `format` over `src` on a worker thread.
pub fn spawn<S>(format: CompressionFormat, mut src: S) -> PipeReader
where
    S: ByteSource + 'static,
{
    let (tx, rx) = sync_channel::<Vec<u8>>(PIPE_DEPTH);
    let worker = std::thread::spawn(move || {
        let mut state = TransformState::to_writer(Box::new(ChannelWriter { tx }));
        unpack_stream(format, &mut src, &mut state)
    });
    PipeReader {
        rx,
        current: Vec::new(),
        pos: 0,
        worker: Some(worker),
    }
}

/// Run the transformer synchronously, buffering all output in memory.
///
/// The single-threaded collapse of the pipeline; `cap` bounds the
/// buffered output.
pub fn run_inline(
    format: CompressionFormat,
    src: &mut dyn ByteSource,
    cap: usize,
) -> Result<Vec<u8>> {
    super::unpack_to_memory(format, src, cap)
}
