use integer_encoding::VarInt;
use models::codec::Encoding;

use crate::error::{TsfError, TsfResult};

#[derive(Default)]
pub struct PlainBoolEncoder {
    buf: Vec<u8>,
}

impl super::BoolEncoder for PlainBoolEncoder {
    fn write(&mut self, v: bool) -> TsfResult<()> {
        if self.buf.is_empty() {
            self.buf.push(Encoding::Plain as u8);
        }
        self.buf.push(v as u8);
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

/// Eight values per byte, LSB-first.
#[derive(Default)]
pub struct BitPackBoolEncoder {
    values: Vec<bool>,
}

impl super::BoolEncoder for BitPackBoolEncoder {
    fn write(&mut self, v: bool) -> TsfResult<()> {
        self.values.push(v);
        Ok(())
    }

    fn tail_bytes(&self) -> usize {
        11 + self.values.len() / 8 + 1
    }

    fn flush(&mut self, dst: &mut Vec<u8>) -> TsfResult<()> {
        if self.values.is_empty() {
            return Ok(());
        }
        dst.push(Encoding::BitPack as u8);
        dst.extend_from_slice(&(self.values.len() as u64).encode_var_vec());
        let mut packed = vec![0_u8; (self.values.len() + 7) / 8];
        for (i, v) in self.values.iter().enumerate() {
            if *v {
                packed[i / 8] |= 1 << (i % 8);
            }
        }
        dst.append(&mut packed);
        self.values.clear();
        Ok(())
    }
}

fn decode_error(reason: &str) -> TsfError {
    TsfError::Decode {
        source: reason.to_string().into(),
    }
}

pub fn decode_bool(src: &[u8], dst: &mut Vec<bool>) -> TsfResult<()> {
    if src.is_empty() {
        return Ok(());
    }
    match Encoding::from(src[0]) {
        Encoding::Plain => {
            for byte in &src[1..] {
                dst.push(*byte != 0);
            }
            Ok(())
        }
        Encoding::BitPack => {
            let (count, n) = u64::decode_var(&src[1..])
                .ok_or_else(|| decode_error("truncated bitpack stream"))?;
            let packed = &src[1 + n..];
            if packed.len() < (count as usize + 7) / 8 {
                return Err(decode_error("bitpack stream shorter than its count"));
            }
            for i in 0..count as usize {
                dst.push(packed[i / 8] >> (i % 8) & 1 == 1);
            }
            Ok(())
        }
        other => Err(decode_error(&format!("{other:?} is not a boolean encoding"))),
    }
}

#[cfg(test)]
mod test {
    use super::super::{bool_encoder, BoolEncoder};
    use super::decode_bool;
    use models::codec::Encoding;

    fn round_trip(encoding: Encoding, src: &[bool]) {
        let mut encoder = bool_encoder(encoding);
        for v in src {
            encoder.write(*v).unwrap();
        }
        let mut buf = Vec::new();
        encoder.flush(&mut buf).unwrap();
        let mut out = Vec::new();
        decode_bool(&buf, &mut out).unwrap();
        assert_eq!(out, src, "encoding {encoding:?}");
    }

    #[test]
    fn test_round_trips() {
        let inputs: Vec<Vec<bool>> = vec![
            vec![],
            vec![true],
            vec![true, false, true, true, false, false, true, false, true],
            vec![false; 100],
            (0..257).map(|i| i % 3 == 0).collect(),
        ];
        for encoding in [Encoding::Plain, Encoding::BitPack] {
            for input in &inputs {
                round_trip(encoding, input);
            }
        }
    }

    #[test]
    fn test_bitpack_density() {
        let mut encoder = bool_encoder(Encoding::BitPack);
        for _ in 0..800 {
            encoder.write(true).unwrap();
        }
        let mut buf = Vec::new();
        encoder.flush(&mut buf).unwrap();
        assert!(buf.len() <= 103);
    }
}
