use minivec::MiniVec;
use snafu::Snafu;
use utils::bitset::BitSet;

use crate::field_value::FieldVal;
use crate::PhysicalDType;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ColumnDataError {
    #[snafu(display("Column of type {} can not hold {:?}", dtype, value))]
    TypeMismatch {
        dtype: PhysicalDType,
        value: FieldVal,
    },

    #[snafu(display("Column slice {}..{} out of range (len {})", start, end, len))]
    SliceOutOfRange {
        start: usize,
        end: usize,
        len: usize,
    },
}

/// Typed value storage for one column of an in-memory batch. Null rows hold
/// a placeholder slot so that row index equals vector index.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryColumnData {
    Bool(Vec<bool>),
    I64(Vec<i64>),
    F64(Vec<f64>),
    Bytes(Vec<MiniVec<u8>>),
}

impl PrimaryColumnData {
    pub fn len(&self) -> usize {
        match self {
            PrimaryColumnData::Bool(data) => data.len(),
            PrimaryColumnData::I64(data) => data.len(),
            PrimaryColumnData::F64(data) => data.len(),
            PrimaryColumnData::Bytes(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<FieldVal> {
        match self {
            PrimaryColumnData::Bool(data) => data.get(index).map(|v| FieldVal::Boolean(*v)),
            PrimaryColumnData::I64(data) => data.get(index).map(|v| FieldVal::Integer(*v)),
            PrimaryColumnData::F64(data) => data.get(index).map(|v| FieldVal::Float(*v)),
            PrimaryColumnData::Bytes(data) => data.get(index).map(|v| FieldVal::Bytes(v.clone())),
        }
    }
}

/// One column of a batch: typed values plus a validity bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnData {
    pub valid: BitSet,
    pub primary_data: PrimaryColumnData,
}

impl ColumnData {
    pub fn new(dtype: PhysicalDType) -> Self {
        Self::with_cap(dtype, 0)
    }

    pub fn with_cap(dtype: PhysicalDType, cap: usize) -> Self {
        let primary_data = match dtype {
            PhysicalDType::Boolean => PrimaryColumnData::Bool(Vec::with_capacity(cap)),
            PhysicalDType::Integer => PrimaryColumnData::I64(Vec::with_capacity(cap)),
            PhysicalDType::Float => PrimaryColumnData::F64(Vec::with_capacity(cap)),
            PhysicalDType::String => PrimaryColumnData::Bytes(Vec::with_capacity(cap)),
        };
        Self {
            valid: BitSet::new(),
            primary_data,
        }
    }

    pub fn physical_dtype(&self) -> PhysicalDType {
        match self.primary_data {
            PrimaryColumnData::Bool(_) => PhysicalDType::Boolean,
            PrimaryColumnData::I64(_) => PhysicalDType::Integer,
            PrimaryColumnData::F64(_) => PhysicalDType::Float,
            PrimaryColumnData::Bytes(_) => PhysicalDType::String,
        }
    }

    pub fn push(&mut self, value: Option<FieldVal>) -> Result<(), ColumnDataError> {
        match (&mut self.primary_data, value) {
            (PrimaryColumnData::Bool(data), Some(FieldVal::Boolean(v))) => {
                data.push(v);
                self.valid.append_unset_and_set(data.len() - 1);
            }
            (PrimaryColumnData::Bool(data), None) => {
                data.push(false);
                self.valid.append_unset(1);
            }
            (PrimaryColumnData::I64(data), Some(FieldVal::Integer(v))) => {
                data.push(v);
                self.valid.append_unset_and_set(data.len() - 1);
            }
            (PrimaryColumnData::I64(data), None) => {
                data.push(0);
                self.valid.append_unset(1);
            }
            (PrimaryColumnData::F64(data), Some(FieldVal::Float(v))) => {
                data.push(v);
                self.valid.append_unset_and_set(data.len() - 1);
            }
            (PrimaryColumnData::F64(data), None) => {
                data.push(0.0);
                self.valid.append_unset(1);
            }
            (PrimaryColumnData::Bytes(data), Some(FieldVal::Bytes(v))) => {
                data.push(v);
                self.valid.append_unset_and_set(data.len() - 1);
            }
            (PrimaryColumnData::Bytes(data), None) => {
                data.push(MiniVec::new());
                self.valid.append_unset(1);
            }
            (_, Some(value)) => {
                return Err(ColumnDataError::TypeMismatch {
                    dtype: self.physical_dtype(),
                    value,
                });
            }
        }
        Ok(())
    }

    /// Value at `index`, or `None` when the row is null or out of range.
    pub fn get(&self, index: usize) -> Option<FieldVal> {
        if self.valid.get(index) {
            self.primary_data.get(index)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.primary_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary_data.is_empty()
    }

    /// Copy of the rows in `start..end`.
    pub fn chunk(&self, start: usize, end: usize) -> Result<ColumnData, ColumnDataError> {
        if start > end || end > self.len() {
            return Err(ColumnDataError::SliceOutOfRange {
                start,
                end,
                len: self.len(),
            });
        }
        let mut column = ColumnData::with_cap(self.physical_dtype(), end - start);
        for index in start..end {
            // push only fails on type mismatch, impossible for a self-slice
            let _ = column.push(self.get(index));
        }
        Ok(column)
    }
}

#[cfg(test)]
mod test {
    use super::ColumnData;
    use crate::field_value::FieldVal;
    use crate::PhysicalDType;

    #[test]
    fn test_push_and_get() {
        let mut column = ColumnData::new(PhysicalDType::Integer);
        column.push(Some(FieldVal::Integer(7))).unwrap();
        column.push(None).unwrap();
        column.push(Some(FieldVal::Integer(9))).unwrap();
        assert_eq!(column.len(), 3);
        assert_eq!(column.get(0), Some(FieldVal::Integer(7)));
        assert_eq!(column.get(1), None);
        assert_eq!(column.get(2), Some(FieldVal::Integer(9)));
        assert_eq!(column.get(3), None);
    }

    #[test]
    fn test_type_mismatch() {
        let mut column = ColumnData::new(PhysicalDType::Float);
        assert!(column.push(Some(FieldVal::Integer(1))).is_err());
        assert!(column.push(Some(FieldVal::Float(1.0))).is_ok());
    }

    #[test]
    fn test_chunk() {
        let mut column = ColumnData::new(PhysicalDType::Integer);
        for i in 0..10 {
            let value = (i % 3 != 0).then_some(FieldVal::Integer(i));
            column.push(value).unwrap();
        }
        let slice = column.chunk(2, 5).unwrap();
        assert_eq!(slice.len(), 3);
        assert_eq!(slice.get(0), Some(FieldVal::Integer(2)));
        assert_eq!(slice.get(1), None);
        assert_eq!(slice.get(2), Some(FieldVal::Integer(4)));
        assert!(column.chunk(8, 11).is_err());
    }
}
