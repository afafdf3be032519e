//! bzip2 transformer.

use bzip2::read::MultiBzDecoder;
use shuck_core::error::Result;
use shuck_core::source::ByteSource;

use super::{CountingRead, TransformState, check_signature16, pump};

const MAGIC: [u8; 2] = [b'B', b'Z'];

pub(super) fn unpack(src: &mut dyn ByteSource, state: &mut TransformState) -> Result<u64> {
    // The 'h' version byte and block-size digit are validated by the
    // decoder itself.
    check_signature16(src, MAGIC)?;
    let mut counted = CountingRead::new(src);
    let mut decoder = MultiBzDecoder::new(&mut counted);
    let produced = pump(&mut decoder, state)?;
    state.bytes_in += counted.count;
    Ok(produced)
}
