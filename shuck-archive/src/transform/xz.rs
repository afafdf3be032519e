//! xz transformer.
//!
//! The xz container carries its own integrity check per block; xz2
//! verifies it during decode.

use shuck_core::error::Result;
use shuck_core::source::ByteSource;
use xz2::read::XzDecoder;

use super::{CountingRead, TransformState, check_signature16, pump};

const MAGIC: [u8; 2] = [0xFD, 0x37];

pub(super) fn unpack(src: &mut dyn ByteSource, state: &mut TransformState) -> Result<u64> {
    check_signature16(src, MAGIC)?;
    let mut counted = CountingRead::new(src);
    let mut decoder = XzDecoder::new_multi_decoder(&mut counted);
    let produced = pump(&mut decoder, state)?;
    state.bytes_in += counted.count;
    Ok(produced)
}
