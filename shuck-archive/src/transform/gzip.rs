//! gzip transformer.
//!
//! Delegates to flate2's multi-member decoder, which also verifies the
//! trailing CRC-32 and size fields each member carries.

use flate2::read::MultiGzDecoder;
use shuck_core::error::Result;
use shuck_core::source::ByteSource;

use super::{CountingRead, TransformState, check_signature16, pump};

const MAGIC: [u8; 2] = [0x1F, 0x8B];

pub(super) fn unpack(src: &mut dyn ByteSource, state: &mut TransformState) -> Result<u64> {
    check_signature16(src, MAGIC)?;
    let mut counted = CountingRead::new(src);
    let mut decoder = MultiGzDecoder::new(&mut counted);
    let produced = pump(&mut decoder, state)?;
    state.bytes_in += counted.count;
    Ok(produced)
}
