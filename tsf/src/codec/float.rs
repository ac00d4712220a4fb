//! Float encodings. Gorilla XOR-compresses consecutive values, spending a
//! single bit on repeats and reusing the previous leading/trailing-zero
//! window when the new XOR fits inside it.

use integer_encoding::VarInt;
use models::codec::Encoding;

use super::bit::{BitReader, BitWriter};
use crate::error::{TsfError, TsfResult};

#[derive(Default)]
pub struct PlainF64Encoder {
    buf: Vec<u8>,
}

impl super::F64Encoder for PlainF64Encoder {
    fn write(&mut self, v: f64) -> TsfResult<()> {
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
pub struct GorillaF64Encoder {
    bits: BitWriter,
    count: u64,
    prev_bits: u64,
    prev_leading: u32,
    prev_trailing: u32,
    window_valid: bool,
}

impl super::F64Encoder for GorillaF64Encoder {
    fn write(&mut self, v: f64) -> TsfResult<()> {
        let value_bits = v.to_bits();
        if self.count == 0 {
            self.bits.write_bits(value_bits, 64);
        } else {
            let xor = value_bits ^ self.prev_bits;
            if xor == 0 {
                self.bits.write_bit(false);
            } else {
                self.bits.write_bit(true);
                // 5-bit field caps the stored leading-zero count
                let leading = xor.leading_zeros().min(31);
                let trailing = xor.trailing_zeros();
                if self.window_valid
                    && leading >= self.prev_leading
                    && trailing >= self.prev_trailing
                {
                    self.bits.write_bit(false);
                    let meaningful = 64 - self.prev_leading - self.prev_trailing;
                    self.bits.write_bits(xor >> self.prev_trailing, meaningful);
                } else {
                    self.bits.write_bit(true);
                    let meaningful = 64 - leading - trailing;
                    self.bits.write_bits(leading as u64, 5);
                    self.bits.write_bits((meaningful - 1) as u64, 6);
                    self.bits.write_bits(xor >> trailing, meaningful);
                    self.prev_leading = leading;
                    self.prev_trailing = trailing;
                    self.window_valid = true;
                }
            }
        }
        self.prev_bits = value_bits;
        self.count += 1;
        Ok(())
    }

    fn tail_bytes(&self) -> usize {
        if self.count == 0 {
            return 0;
        }
        11 + self.bits.byte_len() + 9
    }

    fn flush(&mut self, dst: &mut Vec<u8>) -> TsfResult<()> {
        if self.count == 0 {
            return Ok(());
        }
        dst.push(Encoding::Gorilla as u8);
        dst.extend_from_slice(&self.count.encode_var_vec());
        dst.append(&mut self.bits.finish());

        self.count = 0;
        self.prev_bits = 0;
        self.prev_leading = 0;
        self.prev_trailing = 0;
        self.window_valid = false;
        Ok(())
    }
}

fn decode_error(reason: &str) -> TsfError {
    TsfError::Decode {
        source: reason.to_string().into(),
    }
}

pub fn decode_f64(src: &[u8], dst: &mut Vec<f64>) -> TsfResult<()> {
    if src.is_empty() {
        return Ok(());
    }
    match Encoding::from(src[0]) {
        Encoding::Plain => {
            let body = &src[1..];
            if body.len() % 8 != 0 {
                return Err(decode_error("plain f64 stream length not a multiple of 8"));
            }
            for bytes in body.chunks_exact(8) {
                dst.push(f64::from_be_bytes(bytes.try_into().unwrap()));
            }
            Ok(())
        }
        Encoding::Gorilla => {
            let (count, n) = u64::decode_var(&src[1..])
                .ok_or_else(|| decode_error("truncated gorilla stream"))?;
            let mut reader = BitReader::new(&src[1 + n..]);
            let mut prev_bits = 0_u64;
            let mut leading = 0_u32;
            let mut trailing = 0_u32;
            for i in 0..count {
                let value_bits = if i == 0 {
                    reader.read_bits(64)?
                } else if !reader.read_bit()? {
                    prev_bits
                } else {
                    if reader.read_bit()? {
                        leading = reader.read_bits(5)? as u32;
                        let meaningful = reader.read_bits(6)? as u32 + 1;
                        trailing = 64 - leading - meaningful;
                    }
                    let meaningful = 64 - leading - trailing;
                    prev_bits ^ (reader.read_bits(meaningful)? << trailing)
                };
                dst.push(f64::from_bits(value_bits));
                prev_bits = value_bits;
            }
            Ok(())
        }
        other => Err(decode_error(&format!("{other:?} is not an f64 encoding"))),
    }
}
