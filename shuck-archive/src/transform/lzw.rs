//! Legacy `compress` (.Z) transformer.
//!
//! No maintained crate covers the old unix compress LZW variant, so
//! the decoder lives here: 9..16-bit codes packed LSB-first, optional
//! block mode with a clear code at 256, and the historical quirk that
//! the bit stream realigns to a group boundary of eight codes whenever
//! the code width changes or the dictionary is cleared.

use shuck_core::error::{Result, ShuckError};
use shuck_core::source::{ByteSource, read_exact};
use std::io::Read;

use super::{TransformState, check_signature16};

const MAGIC: [u8; 2] = [0x1F, 0x9D];

/// Clear code in block mode; the first dictionary slot follows it.
const CLEAR: u16 = 256;

const BIT_MASK: u8 = 0x1F;
const BLOCK_MODE: u8 = 0x80;

pub(super) fn unpack(src: &mut dyn ByteSource, state: &mut TransformState) -> Result<u64> {
    check_signature16(src, MAGIC)?;

    let mut head = [0u8; 3];
    read_exact(src, &mut head)?;
    let max_bits = u32::from(head[2] & BIT_MASK);
    let block_mode = head[2] & BLOCK_MODE != 0;
    if !(9..=16).contains(&max_bits) {
        return Err(ShuckError::corrupt_header(
            2,
            format!("compress: bad max code width {max_bits}"),
        ));
    }

    // The historical tool decodes from a whole buffered stream; code
    // groups make true streaming awkward for no benefit at .Z sizes.
    let mut data = Vec::new();
    src.read_to_end(&mut data)?;
    state.bytes_in += (head.len() + data.len()) as u64;

    decode(&data, max_bits, block_mode, state)
}

/// Round `posbits` up to the next group boundary of eight codes.
fn align_group(posbits: u64, n_bits: u32) -> u64 {
    let group = u64::from(n_bits) << 3;
    posbits.div_ceil(group) * group
}

fn read_code(data: &[u8], posbits: u64, n_bits: u32) -> u16 {
    let mut code = 0u32;
    for i in 0..n_bits {
        let bit = posbits + u64::from(i);
        let byte = data[(bit >> 3) as usize];
        if (byte >> (bit & 7)) & 1 != 0 {
            code |= 1 << i;
        }
    }
    code as u16
}

fn decode(data: &[u8], max_bits: u32, block_mode: bool, state: &mut TransformState) -> Result<u64> {
    let start = state.bytes_out;
    let dict_size = 1usize << max_bits;
    let first_free = if block_mode { 257 } else { 256 };

    let mut prefix = vec![0u16; dict_size];
    let mut suffix = vec![0u8; dict_size];
    let mut next_free = first_free;
    let mut n_bits = 9u32;
    let mut max_code = (1usize << n_bits) - 1;
    let mut posbits = 0u64;
    let mut prev: Option<u16> = None;
    let mut finchar = 0u8;
    let mut stack = Vec::with_capacity(dict_size);

    let total_bits = (data.len() as u64) << 3;
    loop {
        if next_free > max_code {
            // Width change: the encoder padded out the current group.
            posbits = align_group(posbits, n_bits);
            n_bits += 1;
            max_code = if n_bits == max_bits {
                1 << max_bits
            } else {
                (1 << n_bits) - 1
            };
        }
        if posbits + u64::from(n_bits) > total_bits {
            break;
        }
        let code = read_code(data, posbits, n_bits);
        posbits += u64::from(n_bits);

        if block_mode && code == CLEAR {
            posbits = align_group(posbits, n_bits);
            n_bits = 9;
            max_code = (1 << n_bits) - 1;
            next_free = first_free;
            prev = None;
            continue;
        }

        stack.clear();
        let mut cur = code as usize;
        if cur >= next_free {
            // Only the KwKwK case may reference the next unassigned
            // slot, and never as the first code.
            let Some(p) = prev else {
                return Err(ShuckError::corrupt_header(
                    posbits >> 3,
                    format!("compress: code {code} out of range"),
                ));
            };
            if cur > next_free {
                return Err(ShuckError::corrupt_header(
                    posbits >> 3,
                    format!("compress: code {code} out of range"),
                ));
            }
            stack.push(finchar);
            cur = p as usize;
        }
        while cur >= 256 {
            stack.push(suffix[cur]);
            cur = prefix[cur] as usize;
        }
        finchar = cur as u8;
        stack.push(finchar);
        stack.reverse();
        state.write(&stack)?;

        if let Some(p) = prev {
            if next_free < dict_size {
                prefix[next_free] = p;
                suffix[next_free] = finchar;
                next_free += 1;
            }
        }
        prev = Some(code);
    }

    Ok(state.bytes_out - start)
}
