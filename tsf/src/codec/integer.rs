//! Integer encodings. `Ts2Diff` delta-encodes as values arrive, zigzags the
//! deltas and packs them with simple8b at flush; uniform deltas collapse to
//! a run-length form and oversized deltas fall back to a fixed-width form.

use integer_encoding::VarInt;
use models::codec::Encoding;

use super::simple8b;
use crate::error::{TsfError, TsfResult};

/// Sub-format of a Ts2Diff stream, stored in the high nibble of the byte
/// after the encoding id.
const TS2DIFF_UNCOMPRESSED: u8 = 0;
const TS2DIFF_SIMPLE8B: u8 = 1;
const TS2DIFF_RLE: u8 = 2;

pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub fn zigzag_decode(v: u64) -> i64 {
    (v >> 1) as i64 ^ -((v & 1) as i64)
}

#[derive(Default)]
pub struct PlainI64Encoder {
    buf: Vec<u8>,
}

impl super::I64Encoder for PlainI64Encoder {
    fn write(&mut self, v: i64) -> TsfResult<()> {
        if self.buf.is_empty() {
            self.buf.push(Encoding::Plain as u8);
        }
        self.buf.extend_from_slice(&v.to_be_bytes());
        Ok(())
    }

    fn tail_bytes(&self) -> usize {
        self.buf.len()
    }

    fn flush(&mut self, dst: &mut Vec<u8>) -> TsfResult<()> {
        dst.append(&mut self.buf);
        Ok(())
    }
}

#[derive(Default)]
pub struct ZigzagI64Encoder {
    buf: Vec<u8>,
}

impl super::I64Encoder for ZigzagI64Encoder {
    fn write(&mut self, v: i64) -> TsfResult<()> {
        if self.buf.is_empty() {
            self.buf.push(Encoding::Zigzag as u8);
        }
        self.buf.extend_from_slice(&zigzag_encode(v).encode_var_vec());
        Ok(())
    }

    fn tail_bytes(&self) -> usize {
        self.buf.len()
    }

    fn flush(&mut self, dst: &mut Vec<u8>) -> TsfResult<()> {
        dst.append(&mut self.buf);
        Ok(())
    }
}

#[derive(Default)]
pub struct RleI64Encoder {
    runs: Vec<(i64, u64)>,
}

impl super::I64Encoder for RleI64Encoder {
    fn write(&mut self, v: i64) -> TsfResult<()> {
        match self.runs.last_mut() {
            Some((value, count)) if *value == v => *count += 1,
            _ => self.runs.push((v, 1)),
        }
        Ok(())
    }

    fn tail_bytes(&self) -> usize {
        // id byte + run count + (varint value, varint count) per run
        6 + self.runs.len() * 15
    }

    fn flush(&mut self, dst: &mut Vec<u8>) -> TsfResult<()> {
        if self.runs.is_empty() {
            return Ok(());
        }
        dst.push(Encoding::Rle as u8);
        dst.extend_from_slice(&(self.runs.len() as u64).encode_var_vec());
        for (value, count) in self.runs.drain(..) {
            dst.extend_from_slice(&zigzag_encode(value).encode_var_vec());
            dst.extend_from_slice(&count.encode_var_vec());
        }
        Ok(())
    }
}

/// Delta encoder. The first slot holds the zigzag of the first absolute
/// value, every later slot the zigzag of the delta to its predecessor.
#[derive(Default)]
pub struct Ts2DiffI64Encoder {
    prev: i64,
    deltas: Vec<u64>,
}

impl super::I64Encoder for Ts2DiffI64Encoder {
    fn write(&mut self, v: i64) -> TsfResult<()> {
        let delta = v.wrapping_sub(self.prev);
        self.prev = v;
        self.deltas.push(zigzag_encode(delta));
        Ok(())
    }

    fn tail_bytes(&self) -> usize {
        2 + 8 + self.deltas.len() * 8
    }

    fn flush(&mut self, dst: &mut Vec<u8>) -> TsfResult<()> {
        if self.deltas.is_empty() {
            return Ok(());
        }
        dst.push(Encoding::Ts2Diff as u8);

        let uniform = self.deltas.len() > 2
            && self.deltas[2..].iter().all(|d| *d == self.deltas[1]);
        if uniform {
            dst.push(TS2DIFF_RLE << 4);
            dst.extend_from_slice(&self.deltas[0].to_le_bytes());
            dst.extend_from_slice(&self.deltas[1].encode_var_vec());
            dst.extend_from_slice(&((self.deltas.len() - 1) as u64).encode_var_vec());
        } else if self.deltas[1..].iter().any(|d| *d > simple8b::MAX_VALUE) {
            dst.push(TS2DIFF_UNCOMPRESSED << 4);
            for delta in &self.deltas {
                dst.extend_from_slice(&delta.to_le_bytes());
            }
        } else {
            dst.push(TS2DIFF_SIMPLE8B << 4);
            dst.extend_from_slice(&self.deltas[0].to_le_bytes());
            for word in simple8b::encode_all(&self.deltas[1..])? {
                dst.extend_from_slice(&word.to_le_bytes());
            }
        }

        self.prev = 0;
        self.deltas.clear();
        Ok(())
    }
}

fn decode_error(reason: &str) -> TsfError {
    TsfError::Decode {
        source: reason.to_string().into(),
    }
}

fn read_varint(src: &[u8], pos: &mut usize) -> TsfResult<u64> {
    let (v, n) =
        u64::decode_var(&src[*pos..]).ok_or_else(|| decode_error("truncated varint"))?;
    *pos += n;
    Ok(v)
}

fn read_u64_le(src: &[u8], pos: &mut usize) -> TsfResult<u64> {
    let end = *pos + 8;
    if end > src.len() {
        return Err(decode_error("truncated u64"));
    }
    let v = u64::from_le_bytes(src[*pos..end].try_into().unwrap());
    *pos = end;
    Ok(v)
}

fn ts2diff_from_deltas(deltas: impl IntoIterator<Item = u64>, dst: &mut Vec<i64>) {
    let mut prev = 0_i64;
    for delta in deltas {
        prev = prev.wrapping_add(zigzag_decode(delta));
        dst.push(prev);
    }
}

pub fn decode_i64(src: &[u8], dst: &mut Vec<i64>) -> TsfResult<()> {
    if src.is_empty() {
        return Ok(());
    }
    match Encoding::from(src[0]) {
        Encoding::Plain => {
            let body = &src[1..];
            if body.len() % 8 != 0 {
                return Err(decode_error("plain i64 stream length not a multiple of 8"));
            }
            for bytes in body.chunks_exact(8) {
                dst.push(i64::from_be_bytes(bytes.try_into().unwrap()));
            }
            Ok(())
        }
        Encoding::Zigzag => {
            let mut pos = 1;
            while pos < src.len() {
                dst.push(zigzag_decode(read_varint(src, &mut pos)?));
            }
            Ok(())
        }
        Encoding::Rle => {
            let mut pos = 1;
            let runs = read_varint(src, &mut pos)?;
            for _ in 0..runs {
                let value = zigzag_decode(read_varint(src, &mut pos)?);
                let count = read_varint(src, &mut pos)?;
                dst.extend(std::iter::repeat(value).take(count as usize));
            }
            Ok(())
        }
        Encoding::Ts2Diff => {
            if src.len() < 2 {
                return Err(decode_error("truncated ts2diff stream"));
            }
            let mut pos = 2;
            match src[1] >> 4 {
                TS2DIFF_RLE => {
                    let first = read_u64_le(src, &mut pos)?;
                    let delta = read_varint(src, &mut pos)?;
                    let count = read_varint(src, &mut pos)?;
                    ts2diff_from_deltas(
                        std::iter::once(first)
                            .chain(std::iter::repeat(delta).take(count as usize)),
                        dst,
                    );
                    Ok(())
                }
                TS2DIFF_UNCOMPRESSED => {
                    let mut deltas = Vec::new();
                    while pos < src.len() {
                        deltas.push(read_u64_le(src, &mut pos)?);
                    }
                    ts2diff_from_deltas(deltas, dst);
                    Ok(())
                }
                TS2DIFF_SIMPLE8B => {
                    let first = read_u64_le(src, &mut pos)?;
                    let body = &src[pos..];
                    if body.len() % 8 != 0 {
                        return Err(decode_error("truncated simple8b block"));
                    }
                    let words: Vec<u64> = body
                        .chunks_exact(8)
                        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
                        .collect();
                    let mut deltas = vec![first];
                    simple8b::decode_all(&words, &mut deltas)?;
                    ts2diff_from_deltas(deltas, dst);
                    Ok(())
                }
                mode => Err(decode_error(&format!("unknown ts2diff sub-format {mode}"))),
            }
        }
        other => Err(decode_error(&format!("{other:?} is not an i64 encoding"))),
    }
}

#[cfg(test)]
mod test {
    use super::super::{i64_encoder, I64Encoder};
    use super::decode_i64;
    use models::codec::Encoding;

    fn round_trip(encoding: Encoding, src: &[i64]) {
        let mut encoder = i64_encoder(encoding);
        for v in src {
            encoder.write(*v).unwrap();
        }
        let mut buf = Vec::new();
        encoder.flush(&mut buf).unwrap();
        let mut out = Vec::new();
        decode_i64(&buf, &mut out).unwrap();
        assert_eq!(out, src, "encoding {encoding:?}");
    }

    #[test]
    fn test_round_trips() {
        let inputs: Vec<Vec<i64>> = vec![
            vec![],
            vec![42],
            vec![1, 2, 3, 4, 5],
            vec![-3, -2, -1, 0, 1, 2],
            vec![i64::MIN, i64::MAX, 0, -1],
            vec![7; 100],
            (0..1000).map(|i| i * 1000).collect(),
            vec![1_600_000_000_000, 1_600_000_001_000, 1_600_000_002_000],
        ];
        for encoding in [
            Encoding::Plain,
            Encoding::Zigzag,
            Encoding::Rle,
            Encoding::Ts2Diff,
        ] {
            for input in &inputs {
                round_trip(encoding, input);
            }
        }
    }

    #[test]
    fn test_ts2diff_rle_form_is_compact() {
        let mut encoder = i64_encoder(Encoding::Ts2Diff);
        for i in 0..10_000_i64 {
            encoder.write(i * 50).unwrap();
        }
        let mut buf = Vec::new();
        encoder.flush(&mut buf).unwrap();
        // uniform deltas collapse to a few bytes regardless of point count
        assert!(buf.len() < 32, "rle form took {} bytes", buf.len());
    }

    #[test]
    fn test_flush_resets() {
        let mut encoder = i64_encoder(Encoding::Ts2Diff);
        encoder.write(10).unwrap();
        let mut buf = Vec::new();
        encoder.flush(&mut buf).unwrap();
        assert!(!buf.is_empty());

        // second stream starts fresh, from absolute value again
        encoder.write(10).unwrap();
        let mut buf2 = Vec::new();
        encoder.flush(&mut buf2).unwrap();
        assert_eq!(buf, buf2);

        let mut empty = Vec::new();
        encoder.flush(&mut empty).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_tail_bytes_upper_bound() {
        let mut encoder = i64_encoder(Encoding::Ts2Diff);
        for i in 0..100 {
            encoder.write(i).unwrap();
        }
        let tail = encoder.tail_bytes();
        let mut buf = Vec::new();
        encoder.flush(&mut buf).unwrap();
        assert!(tail >= buf.len());
    }
}
