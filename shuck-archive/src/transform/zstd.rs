//! zstd transformer.

use shuck_core::error::Result;
use shuck_core::source::ByteSource;

use super::{CountingRead, TransformState, check_signature16, pump};

const MAGIC: [u8; 2] = [0x28, 0xB5];

pub(super) fn unpack(src: &mut dyn ByteSource, state: &mut TransformState) -> Result<u64> {
    check_signature16(src, MAGIC)?;
    let mut counted = CountingRead::new(src);
    let mut decoder = zstd::stream::read::Decoder::new(&mut counted)?;
    let produced = pump(&mut decoder, state)?;
    state.bytes_in += counted.count;
    Ok(produced)
}
