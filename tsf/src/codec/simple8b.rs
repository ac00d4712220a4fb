//! Simple8b packs runs of small integers into 64-bit words: a 4-bit
//! selector picks how many values share the word and at what width.
//! Values above [`MAX_VALUE`] do not fit any selector; callers fall back
//! to an uncompressed layout for such blocks.

use crate::error::{TsfError, TsfResult};

/// Largest value simple8b can pack (60 usable bits per word).
pub const MAX_VALUE: u64 = (1 << 60) - 1;

/// (values per word, bits per value), indexed by selector. Selectors 0 and
/// 1 pack long runs of zeros in a single word.
const SELECTORS: [(usize, u32); 16] = [
    (240, 0),
    (120, 0),
    (60, 1),
    (30, 2),
    (20, 3),
    (15, 4),
    (12, 5),
    (10, 6),
    (8, 7),
    (7, 8),
    (6, 10),
    (5, 12),
    (4, 15),
    (3, 20),
    (2, 30),
    (1, 60),
];

fn fits(values: &[u64], n: usize, bits: u32) -> bool {
    if values.len() < n {
        return false;
    }
    if bits == 0 {
        return values[..n].iter().all(|v| *v == 0);
    }
    let max = if bits >= 64 { u64::MAX } else { (1 << bits) - 1 };
    values[..n].iter().all(|v| *v <= max)
}

/// Pack `src` into simple8b words. Fails if any value exceeds [`MAX_VALUE`].
pub fn encode_all(src: &[u64]) -> TsfResult<Vec<u64>> {
    let mut dst = Vec::with_capacity(src.len() / 2 + 1);
    let mut rest = src;
    while !rest.is_empty() {
        let (selector, (n, bits)) = SELECTORS
            .iter()
            .enumerate()
            .find(|(_, (n, bits))| fits(rest, *n, *bits))
            .ok_or_else(|| TsfError::Encode {
                source: format!("value exceeds simple8b range: {}", rest[0]).into(),
            })?;
        let mut word = (selector as u64) << 60;
        for (i, v) in rest[..*n].iter().enumerate() {
            word |= v << (i as u32 * bits);
        }
        dst.push(word);
        rest = &rest[*n..];
    }
    Ok(dst)
}

/// Unpack simple8b words produced by [`encode_all`].
pub fn decode_all(src: &[u64], dst: &mut Vec<u64>) -> TsfResult<()> {
    for word in src {
        let selector = (word >> 60) as usize;
        let (n, bits) = SELECTORS[selector];
        if bits == 0 {
            dst.extend(std::iter::repeat(0).take(n));
            continue;
        }
        let mask = if bits >= 64 { u64::MAX } else { (1 << bits) - 1 };
        for i in 0..n {
            dst.push(word >> (i as u32 * bits) & mask);
        }
    }
    Ok(())
}
