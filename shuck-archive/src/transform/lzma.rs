//! Legacy LZMA (.lzma) transformer.
//!
//! The bare lzma_alone container has no magic bytes, so this format is
//! only ever selected explicitly, never by the signature dispatcher.

use shuck_core::error::{Result, ShuckError};
use shuck_core::source::ByteSource;
use xz2::read::XzDecoder;
use xz2::stream::Stream;

use super::{CountingRead, TransformState, pump};

/// Decoder memory cap; matches xz's own default for lzma_alone.
const MEMLIMIT: u64 = 128 << 20;

pub(super) fn unpack(src: &mut dyn ByteSource, state: &mut TransformState) -> Result<u64> {
    let stream = Stream::new_lzma_decoder(MEMLIMIT)
        .map_err(|e| ShuckError::unsupported(format!("lzma decoder: {e}")))?;
    let mut counted = CountingRead::new(src);
    let mut decoder = XzDecoder::new_stream(&mut counted, stream);
    let produced = pump(&mut decoder, state)?;
    state.bytes_in += counted.count;
    Ok(produced)
}
