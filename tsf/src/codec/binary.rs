use std::collections::HashMap;

use integer_encoding::VarInt;
use minivec::MiniVec;
use models::codec::Encoding;

use crate::error::{TsfError, TsfResult};

/// Varint-length-prefixed values, concatenated.
#[derive(Default)]
pub struct PlainBytesEncoder {
    buf: Vec<u8>,
}

impl super::BytesEncoder for PlainBytesEncoder {
    fn write(&mut self, v: &[u8]) -> TsfResult<()> {
        if self.buf.is_empty() {
            self.buf.push(Encoding::Plain as u8);
        }
        self.buf
            .extend_from_slice(&(v.len() as u64).encode_var_vec());
        self.buf.extend_from_slice(v);
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

/// Distinct values stored once, rows stored as varint ids into the table.
#[derive(Default)]
pub struct DictionaryBytesEncoder {
    ids: HashMap<Vec<u8>, u64>,
    entries: Vec<Vec<u8>>,
    entry_bytes: usize,
    indices: Vec<u64>,
}

impl super::BytesEncoder for DictionaryBytesEncoder {
    fn write(&mut self, v: &[u8]) -> TsfResult<()> {
        let next_id = self.entries.len() as u64;
        let id = match self.ids.get(v) {
            Some(id) => *id,
            None => {
                self.ids.insert(v.to_vec(), next_id);
                self.entries.push(v.to_vec());
                self.entry_bytes += v.len();
                next_id
            }
        };
        self.indices.push(id);
        Ok(())
    }

    fn tail_bytes(&self) -> usize {
        11 + self.entry_bytes + self.entries.len() * 5 + self.indices.len() * 5
    }

    fn flush(&mut self, dst: &mut Vec<u8>) -> TsfResult<()> {
        if self.indices.is_empty() {
            return Ok(());
        }
        dst.push(Encoding::Dictionary as u8);
        dst.extend_from_slice(&(self.entries.len() as u64).encode_var_vec());
        for entry in &self.entries {
            dst.extend_from_slice(&(entry.len() as u64).encode_var_vec());
            dst.extend_from_slice(entry);
        }
        dst.extend_from_slice(&(self.indices.len() as u64).encode_var_vec());
        for id in &self.indices {
            dst.extend_from_slice(&id.encode_var_vec());
        }

        self.ids.clear();
        self.entries.clear();
        self.entry_bytes = 0;
        self.indices.clear();
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

fn read_slice<'a>(src: &'a [u8], pos: &mut usize, len: usize) -> TsfResult<&'a [u8]> {
    let end = *pos + len;
    if end > src.len() {
        return Err(decode_error("truncated byte slice"));
    }
    let slice = &src[*pos..end];
    *pos = end;
    Ok(slice)
}

pub fn decode_bytes(src: &[u8], dst: &mut Vec<MiniVec<u8>>) -> TsfResult<()> {
    if src.is_empty() {
        return Ok(());
    }
    match Encoding::from(src[0]) {
        Encoding::Plain => {
            let mut pos = 1;
            while pos < src.len() {
                let len = read_varint(src, &mut pos)? as usize;
                dst.push(MiniVec::from(read_slice(src, &mut pos, len)?));
            }
            Ok(())
        }
        Encoding::Dictionary => {
            let mut pos = 1;
            let entry_count = read_varint(src, &mut pos)? as usize;
            let mut entries = Vec::with_capacity(entry_count);
            for _ in 0..entry_count {
                let len = read_varint(src, &mut pos)? as usize;
                entries.push(MiniVec::from(read_slice(src, &mut pos, len)?));
            }
            let index_count = read_varint(src, &mut pos)?;
            for _ in 0..index_count {
                let id = read_varint(src, &mut pos)? as usize;
                let entry = entries
                    .get(id)
                    .ok_or_else(|| decode_error("dictionary id out of range"))?;
                dst.push(entry.clone());
            }
            Ok(())
        }
        other => Err(decode_error(&format!("{other:?} is not a binary encoding"))),
    }
}

#[cfg(test)]
mod test {
    use super::super::{bytes_encoder, BytesEncoder};
    use super::decode_bytes;
    use minivec::MiniVec;
    use models::codec::Encoding;

    fn round_trip(encoding: Encoding, src: &[&[u8]]) {
        let mut encoder = bytes_encoder(encoding);
        for v in src {
            encoder.write(v).unwrap();
        }
        let mut buf = Vec::new();
        encoder.flush(&mut buf).unwrap();
        let mut out: Vec<MiniVec<u8>> = Vec::new();
        decode_bytes(&buf, &mut out).unwrap();
        assert_eq!(out.len(), src.len(), "encoding {encoding:?}");
        for (a, b) in out.iter().zip(src) {
            assert_eq!(a.as_slice(), *b, "encoding {encoding:?}");
        }
    }

    #[test]
    fn test_round_trips() {
        let inputs: Vec<Vec<&[u8]>> = vec![
            vec![],
            vec![b"hello"],
            vec![b"", b"a", b""],
            vec![b"host-1", b"host-2", b"host-1", b"host-1", b"host-2"],
            vec![&[0_u8, 1, 2, 255] as &[u8]; 7],
        ];
        for encoding in [Encoding::Plain, Encoding::Dictionary] {
            for input in &inputs {
                round_trip(encoding, input);
            }
        }
    }

    #[test]
    fn test_dictionary_dedups() {
        let mut encoder = bytes_encoder(Encoding::Dictionary);
        for _ in 0..1000 {
            encoder.write(b"one-long-repeated-tag-value").unwrap();
        }
        let mut buf = Vec::new();
        encoder.flush(&mut buf).unwrap();
        // table entry once, one-byte id per row
        assert!(buf.len() < 1100, "dictionary took {} bytes", buf.len());
    }
}
