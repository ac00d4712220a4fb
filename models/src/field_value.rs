use minivec::MiniVec;

use crate::PhysicalDType;

/// One measurement value. Null is `Option::<FieldVal>::None` at the call
/// sites; the variants here are always present values.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldVal {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Bytes(MiniVec<u8>),
}

impl FieldVal {
    pub fn physical_dtype(&self) -> PhysicalDType {
        match self {
            FieldVal::Boolean(_) => PhysicalDType::Boolean,
            FieldVal::Integer(_) => PhysicalDType::Integer,
            FieldVal::Float(_) => PhysicalDType::Float,
            FieldVal::Bytes(_) => PhysicalDType::String,
        }
    }

    /// In-memory footprint, used by the write path's memory accounting.
    pub fn heap_size(&self) -> usize {
        match self {
            FieldVal::Boolean(_) => 1,
            FieldVal::Integer(_) | FieldVal::Float(_) => 8,
            FieldVal::Bytes(v) => v.len() + 8,
        }
    }

    pub fn bytes(v: impl AsRef<[u8]>) -> Self {
        FieldVal::Bytes(MiniVec::from(v.as_ref()))
    }
}

impl From<bool> for FieldVal {
    fn from(v: bool) -> Self {
        FieldVal::Boolean(v)
    }
}

impl From<i32> for FieldVal {
    fn from(v: i32) -> Self {
        FieldVal::Integer(v as i64)
    }
}

impl From<i64> for FieldVal {
    fn from(v: i64) -> Self {
        FieldVal::Integer(v)
    }
}

impl From<f32> for FieldVal {
    fn from(v: f32) -> Self {
        FieldVal::Float(v as f64)
    }
}

impl From<f64> for FieldVal {
    fn from(v: f64) -> Self {
        FieldVal::Float(v)
    }
}

impl From<&str> for FieldVal {
    fn from(v: &str) -> Self {
        FieldVal::Bytes(MiniVec::from(v.as_bytes()))
    }
}
