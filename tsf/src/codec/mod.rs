pub mod binary;
pub mod bit;
pub mod boolean;
pub mod float;
pub mod integer;
pub mod simple8b;

use minivec::MiniVec;
use models::codec::Encoding;
use models::field_value::FieldVal;
use models::PhysicalDType;

use crate::error::{TsfError, TsfResult};

/// Stateful value encoders. `write` accumulates one value, `tail_bytes`
/// is an upper bound on the bytes the pending state would occupy once
/// flushed, `flush` emits the encoded stream (leading with the encoding id
/// byte) and resets the encoder. Flushing an encoder that saw no values
/// emits nothing.
pub trait I64Encoder: Send {
    fn write(&mut self, v: i64) -> TsfResult<()>;
    fn tail_bytes(&self) -> usize;
    fn flush(&mut self, dst: &mut Vec<u8>) -> TsfResult<()>;
}

pub trait F64Encoder: Send {
    fn write(&mut self, v: f64) -> TsfResult<()>;
    fn tail_bytes(&self) -> usize;
    fn flush(&mut self, dst: &mut Vec<u8>) -> TsfResult<()>;
}

pub trait BoolEncoder: Send {
    fn write(&mut self, v: bool) -> TsfResult<()>;
    fn tail_bytes(&self) -> usize;
    fn flush(&mut self, dst: &mut Vec<u8>) -> TsfResult<()>;
}

pub trait BytesEncoder: Send {
    fn write(&mut self, v: &[u8]) -> TsfResult<()>;
    fn tail_bytes(&self) -> usize;
    fn flush(&mut self, dst: &mut Vec<u8>) -> TsfResult<()>;
}

pub fn i64_encoder(encoding: Encoding) -> Box<dyn I64Encoder> {
    match encoding {
        Encoding::Plain => Box::new(integer::PlainI64Encoder::default()),
        Encoding::Zigzag => Box::new(integer::ZigzagI64Encoder::default()),
        Encoding::Rle => Box::new(integer::RleI64Encoder::default()),
        Encoding::Ts2Diff => Box::new(integer::Ts2DiffI64Encoder::default()),
        _ => Box::new(integer::Ts2DiffI64Encoder::default()),
    }
}

pub fn f64_encoder(encoding: Encoding) -> Box<dyn F64Encoder> {
    match encoding {
        Encoding::Plain => Box::new(float::PlainF64Encoder::default()),
        Encoding::Gorilla => Box::new(float::GorillaF64Encoder::default()),
        _ => Box::new(float::GorillaF64Encoder::default()),
    }
}

pub fn bool_encoder(encoding: Encoding) -> Box<dyn BoolEncoder> {
    match encoding {
        Encoding::Plain => Box::new(boolean::PlainBoolEncoder::default()),
        Encoding::BitPack => Box::new(boolean::BitPackBoolEncoder::default()),
        _ => Box::new(boolean::BitPackBoolEncoder::default()),
    }
}

pub fn bytes_encoder(encoding: Encoding) -> Box<dyn BytesEncoder> {
    match encoding {
        Encoding::Plain => Box::new(binary::PlainBytesEncoder::default()),
        Encoding::Dictionary => Box::new(binary::DictionaryBytesEncoder::default()),
        _ => Box::new(binary::PlainBytesEncoder::default()),
    }
}

/// The encoding id at the head of an encoded stream. An empty stream holds
/// zero values and reports `Unknown`.
pub fn get_encoding(src: &[u8]) -> Encoding {
    if src.is_empty() {
        return Encoding::Unknown;
    }
    Encoding::from(src[0])
}

/// One encoder per physical type, selected once per page.
pub enum ColumnEncoder {
    Bool(Box<dyn BoolEncoder>),
    I64(Box<dyn I64Encoder>),
    F64(Box<dyn F64Encoder>),
    Bytes(Box<dyn BytesEncoder>),
}

impl ColumnEncoder {
    pub fn new(dtype: PhysicalDType, encoding: Encoding) -> Self {
        match dtype {
            PhysicalDType::Boolean => ColumnEncoder::Bool(bool_encoder(encoding)),
            PhysicalDType::Integer => ColumnEncoder::I64(i64_encoder(encoding)),
            PhysicalDType::Float => ColumnEncoder::F64(f64_encoder(encoding)),
            PhysicalDType::String => ColumnEncoder::Bytes(bytes_encoder(encoding)),
        }
    }

    pub fn write(&mut self, value: &FieldVal) -> TsfResult<()> {
        match (self, value) {
            (ColumnEncoder::Bool(encoder), FieldVal::Boolean(v)) => encoder.write(*v),
            (ColumnEncoder::I64(encoder), FieldVal::Integer(v)) => encoder.write(*v),
            (ColumnEncoder::F64(encoder), FieldVal::Float(v)) => encoder.write(*v),
            (ColumnEncoder::Bytes(encoder), FieldVal::Bytes(v)) => encoder.write(v),
            _ => Err(TsfError::Encode {
                source: "value type does not match the column encoder".into(),
            }),
        }
    }

    pub fn tail_bytes(&self) -> usize {
        match self {
            ColumnEncoder::Bool(encoder) => encoder.tail_bytes(),
            ColumnEncoder::I64(encoder) => encoder.tail_bytes(),
            ColumnEncoder::F64(encoder) => encoder.tail_bytes(),
            ColumnEncoder::Bytes(encoder) => encoder.tail_bytes(),
        }
    }

    pub fn flush(&mut self, dst: &mut Vec<u8>) -> TsfResult<()> {
        match self {
            ColumnEncoder::Bool(encoder) => encoder.flush(dst),
            ColumnEncoder::I64(encoder) => encoder.flush(dst),
            ColumnEncoder::F64(encoder) => encoder.flush(dst),
            ColumnEncoder::Bytes(encoder) => encoder.flush(dst),
        }
    }
}

/// Decode an encoded stream of present values, dispatching on the leading
/// encoding byte. An empty stream decodes to zero values.
pub fn decode_values(dtype: PhysicalDType, src: &[u8]) -> TsfResult<Vec<FieldVal>> {
    match dtype {
        PhysicalDType::Boolean => {
            let mut values = Vec::new();
            boolean::decode_bool(src, &mut values)?;
            Ok(values.into_iter().map(FieldVal::Boolean).collect())
        }
        PhysicalDType::Integer => {
            let mut values = Vec::new();
            integer::decode_i64(src, &mut values)?;
            Ok(values.into_iter().map(FieldVal::Integer).collect())
        }
        PhysicalDType::Float => {
            let mut values = Vec::new();
            float::decode_f64(src, &mut values)?;
            Ok(values.into_iter().map(FieldVal::Float).collect())
        }
        PhysicalDType::String => {
            let mut values: Vec<MiniVec<u8>> = Vec::new();
            binary::decode_bytes(src, &mut values)?;
            Ok(values.into_iter().map(FieldVal::Bytes).collect())
        }
    }
}
