//! Selective-ack extension: an extension chain of `(next_ext, len,
//! payload…)` TLV triples appended at the start of the payload area, ahead
//! of user bytes. Only extension id 1 (SACK) is recognized; any other id
//! is skipped over (its bytes are neither user data nor understood, so
//! they are consumed and ignored).

use super::{Error, Result};

pub const EXT_TERMINATOR: u8 = 0;
pub const EXT_SACK: u8 = 1;

/// `send_ack`'s length rule: the next multiple of 4 >= `count/8 + 1 + 3`.
pub fn sack_len_for_count(out_of_order_count: usize) -> usize {
    let min = out_of_order_count / 8 + 1 + 3;
    min.div_ceil(4) * 4
}

/// Walks the extension chain starting at `first_ext` over `payload`.
/// Returns the SACK bitmask bytes (if a SACK extension was present) and the
/// total number of bytes consumed by the extension chain, so the caller can
/// slice the remainder off as user data.
pub fn split_extensions(mut first_ext: u8, payload: &[u8]) -> Result<(Option<&[u8]>, usize)> {
    let mut offset = 0;
    let mut sack: Option<&[u8]> = None;

    while first_ext != EXT_TERMINATOR {
        if payload.len() < offset + 2 {
            return Err(Error);
        }
        let next_ext = payload[offset];
        let len = payload[offset + 1] as usize;
        let data_start = offset + 2;
        let data_end = data_start + len;
        if payload.len() < data_end {
            return Err(Error);
        }

        if first_ext == EXT_SACK {
            sack = Some(&payload[data_start..data_end]);
        }

        offset = data_end;
        first_ext = next_ext;
    }

    Ok((sack, offset))
}

/// Builds a SACK extension TLV (next_ext, len, bitmask…) into `out`, setting
/// bit `offset` (0-based, counted from `acknr + 2`) for each entry yielded
/// by `present`. `len` is rounded up per [`sack_len_for_count`].
pub struct SackWriter;

impl SackWriter {
    pub fn build(out_of_order_count: usize, set_bits: impl Iterator<Item = usize>, next_ext: u8) -> Vec<u8> {
        let len = sack_len_for_count(out_of_order_count);
        let mut buf = vec![0u8; 2 + len];
        buf[0] = next_ext;
        buf[1] = len as u8;
        for offset in set_bits {
            let byte = offset / 8;
            let bit = offset % 8;
            if byte < len {
                buf[2 + byte] |= 1 << bit;
            }
        }
        buf
    }
}

/// Iterates the (0-based) bit offsets set in a SACK bitmask, walking from
/// the highest bit down (the set itself is order-independent for acking).
pub fn sack_bit_offsets_set(mask: &[u8]) -> impl Iterator<Item = usize> + '_ {
    (0..mask.len() * 8).rev().filter(move |&offset| {
        let byte = offset / 8;
        let bit = offset % 8;
        mask[byte] & (1 << bit) != 0
    })
}
