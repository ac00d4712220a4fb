//! Per-page and per-chunk value summaries. Updated one present value at a
//! time while a page is open, merged page-into-chunk at seal, serialised
//! into page headers and chunk metadata for reader-side pruning.

use integer_encoding::VarInt;
use models::field_value::FieldVal;
use models::{PhysicalDType, TimeRange};
use serde::{Deserialize, Serialize};

use crate::error::{TsfError, TsfResult};

/// Numeric primitive a [`ValueStatistics`] can summarise.
pub trait StatNative: Copy + PartialOrd {
    fn zero() -> Self;
    fn accumulate(sum: Self, v: Self) -> Self;
    fn to_le_bytes8(self) -> [u8; 8];
    fn from_le_bytes8(bytes: [u8; 8]) -> Self;
}

impl StatNative for i64 {
    fn zero() -> Self {
        0
    }

    fn accumulate(sum: Self, v: Self) -> Self {
        sum.wrapping_add(v)
    }

    fn to_le_bytes8(self) -> [u8; 8] {
        self.to_le_bytes()
    }

    fn from_le_bytes8(bytes: [u8; 8]) -> Self {
        i64::from_le_bytes(bytes)
    }
}

impl StatNative for f64 {
    fn zero() -> Self {
        0.0
    }

    fn accumulate(sum: Self, v: Self) -> Self {
        sum + v
    }

    fn to_le_bytes8(self) -> [u8; 8] {
        self.to_le_bytes()
    }

    fn from_le_bytes8(bytes: [u8; 8]) -> Self {
        f64::from_le_bytes(bytes)
    }
}

/// Running min/max/first/last/sum over the present values of one series.
/// Nulls never reach these; `count` is the present-value count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueStatistics<T> {
    pub count: u64,
    pub min: Option<T>,
    pub max: Option<T>,
    pub first: Option<T>,
    pub last: Option<T>,
    pub sum: T,
}

impl<T: StatNative> Default for ValueStatistics<T> {
    fn default() -> Self {
        Self {
            count: 0,
            min: None,
            max: None,
            first: None,
            last: None,
            sum: T::zero(),
        }
    }
}

impl<T: StatNative> ValueStatistics<T> {
    pub fn update(&mut self, v: T) {
        if self.min.map_or(true, |min| v < min) {
            self.min = Some(v);
        }
        if self.max.map_or(true, |max| v > max) {
            self.max = Some(v);
        }
        if self.first.is_none() {
            self.first = Some(v);
        }
        self.last = Some(v);
        self.sum = T::accumulate(self.sum, v);
        self.count += 1;
    }

    /// Merge `other` in, treating it as the later of the two in time order.
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if let Some(v) = other.min {
            if self.min.map_or(true, |min| v < min) {
                self.min = Some(v);
            }
        }
        if let Some(v) = other.max {
            if self.max.map_or(true, |max| v > max) {
                self.max = Some(v);
            }
        }
        if self.first.is_none() {
            self.first = other.first;
        }
        if other.last.is_some() {
            self.last = other.last;
        }
        self.sum = T::accumulate(self.sum, other.sum);
        self.count += other.count;
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanStatistics {
    pub count: u64,
    pub first: Option<bool>,
    pub last: Option<bool>,
    /// Number of `true` values.
    pub sum: u64,
}

impl BooleanStatistics {
    pub fn update(&mut self, v: bool) {
        if self.first.is_none() {
            self.first = Some(v);
        }
        self.last = Some(v);
        if v {
            self.sum += 1;
        }
        self.count += 1;
    }

    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.first.is_none() {
            self.first = other.first;
        }
        if other.last.is_some() {
            self.last = other.last;
        }
        self.sum += other.sum;
        self.count += other.count;
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryStatistics {
    pub count: u64,
    pub first: Option<Vec<u8>>,
    pub last: Option<Vec<u8>>,
}

impl BinaryStatistics {
    pub fn update(&mut self, v: &[u8]) {
        if self.first.is_none() {
            self.first = Some(v.to_vec());
        }
        self.last = Some(v.to_vec());
        self.count += 1;
    }

    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.first.is_none() {
            self.first = other.first.clone();
        }
        if other.last.is_some() {
            self.last = other.last.clone();
        }
        self.count += other.count;
    }
}

/// Statistics of one series, tagged by physical type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statistics {
    Bool(BooleanStatistics),
    I64(ValueStatistics<i64>),
    F64(ValueStatistics<f64>),
    Binary(BinaryStatistics),
}

impl Statistics {
    pub fn new(dtype: PhysicalDType) -> Self {
        match dtype {
            PhysicalDType::Boolean => Statistics::Bool(BooleanStatistics::default()),
            PhysicalDType::Integer => Statistics::I64(ValueStatistics::default()),
            PhysicalDType::Float => Statistics::F64(ValueStatistics::default()),
            PhysicalDType::String => Statistics::Binary(BinaryStatistics::default()),
        }
    }

    pub fn physical_dtype(&self) -> PhysicalDType {
        match self {
            Statistics::Bool(_) => PhysicalDType::Boolean,
            Statistics::I64(_) => PhysicalDType::Integer,
            Statistics::F64(_) => PhysicalDType::Float,
            Statistics::Binary(_) => PhysicalDType::String,
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            Statistics::Bool(stats) => stats.count,
            Statistics::I64(stats) => stats.count,
            Statistics::F64(stats) => stats.count,
            Statistics::Binary(stats) => stats.count,
        }
    }

    /// Record one present value. Validates the type before mutating, so a
    /// failed update leaves the statistics untouched.
    pub fn update(&mut self, value: &FieldVal) -> TsfResult<()> {
        match (self, value) {
            (Statistics::Bool(stats), FieldVal::Boolean(v)) => stats.update(*v),
            (Statistics::I64(stats), FieldVal::Integer(v)) => stats.update(*v),
            (Statistics::F64(stats), FieldVal::Float(v)) => stats.update(*v),
            (Statistics::Binary(stats), FieldVal::Bytes(v)) => stats.update(v),
            (stats, value) => {
                return Err(TsfError::Common {
                    reason: format!(
                        "statistics of type {} can not record a {} value",
                        stats.physical_dtype(),
                        value.physical_dtype()
                    ),
                })
            }
        }
        Ok(())
    }

    pub fn merge(&mut self, other: &Statistics) -> TsfResult<()> {
        match (self, other) {
            (Statistics::Bool(stats), Statistics::Bool(other)) => stats.merge(other),
            (Statistics::I64(stats), Statistics::I64(other)) => stats.merge(other),
            (Statistics::F64(stats), Statistics::F64(other)) => stats.merge(other),
            (Statistics::Binary(stats), Statistics::Binary(other)) => stats.merge(other),
            (stats, other) => {
                return Err(TsfError::Common {
                    reason: format!(
                        "can not merge {} statistics into {}",
                        other.physical_dtype(),
                        stats.physical_dtype()
                    ),
                })
            }
        }
        Ok(())
    }

    /// On-disk form: varint count, then the type-specific block. A count of
    /// zero (an all-null page) carries nothing else.
    pub fn serialize_into(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(&self.count().encode_var_vec());
        if self.count() == 0 {
            return;
        }
        match self {
            Statistics::Bool(stats) => {
                dst.push(stats.first.unwrap_or_default() as u8);
                dst.push(stats.last.unwrap_or_default() as u8);
                dst.extend_from_slice(&stats.sum.encode_var_vec());
            }
            Statistics::I64(stats) => serialize_numeric(stats, dst),
            Statistics::F64(stats) => serialize_numeric(stats, dst),
            Statistics::Binary(stats) => {
                let first = stats.first.as_deref().unwrap_or_default();
                dst.extend_from_slice(&(first.len() as u64).encode_var_vec());
                dst.extend_from_slice(first);
                let last = stats.last.as_deref().unwrap_or_default();
                dst.extend_from_slice(&(last.len() as u64).encode_var_vec());
                dst.extend_from_slice(last);
            }
        }
    }

    pub fn serialized_size(&self) -> usize {
        let count = self.count();
        let mut size = count.required_space();
        if count == 0 {
            return size;
        }
        size += match self {
            Statistics::Bool(stats) => 2 + stats.sum.required_space(),
            Statistics::I64(_) | Statistics::F64(_) => 5 * 8,
            Statistics::Binary(stats) => {
                let first = stats.first.as_deref().unwrap_or_default();
                let last = stats.last.as_deref().unwrap_or_default();
                (first.len() as u64).required_space()
                    + first.len()
                    + (last.len() as u64).required_space()
                    + last.len()
            }
        };
        size
    }

    pub fn deserialize(
        dtype: PhysicalDType,
        src: &[u8],
        pos: &mut usize,
    ) -> TsfResult<Statistics> {
        let count = read_varint(src, pos)?;
        if count == 0 {
            return Ok(Statistics::new(dtype));
        }
        let stats = match dtype {
            PhysicalDType::Boolean => {
                if *pos + 2 > src.len() {
                    return Err(truncated());
                }
                let first = src[*pos] != 0;
                let last = src[*pos + 1] != 0;
                *pos += 2;
                let sum = read_varint(src, pos)?;
                Statistics::Bool(BooleanStatistics {
                    count,
                    first: Some(first),
                    last: Some(last),
                    sum,
                })
            }
            PhysicalDType::Integer => Statistics::I64(deserialize_numeric(count, src, pos)?),
            PhysicalDType::Float => Statistics::F64(deserialize_numeric(count, src, pos)?),
            PhysicalDType::String => {
                let first_len = read_varint(src, pos)? as usize;
                let first = read_vec(src, pos, first_len)?;
                let last_len = read_varint(src, pos)? as usize;
                let last = read_vec(src, pos, last_len)?;
                Statistics::Binary(BinaryStatistics {
                    count,
                    first: Some(first),
                    last: Some(last),
                })
            }
        };
        Ok(stats)
    }
}

fn serialize_numeric<T: StatNative>(stats: &ValueStatistics<T>, dst: &mut Vec<u8>) {
    for v in [stats.min, stats.max, stats.first, stats.last] {
        dst.extend_from_slice(&v.map(T::to_le_bytes8).unwrap_or_default());
    }
    dst.extend_from_slice(&stats.sum.to_le_bytes8());
}

fn deserialize_numeric<T: StatNative>(
    count: u64,
    src: &[u8],
    pos: &mut usize,
) -> TsfResult<ValueStatistics<T>> {
    let mut fields = [T::zero(); 5];
    for field in fields.iter_mut() {
        if *pos + 8 > src.len() {
            return Err(truncated());
        }
        *field = T::from_le_bytes8(src[*pos..*pos + 8].try_into().unwrap());
        *pos += 8;
    }
    Ok(ValueStatistics {
        count,
        min: Some(fields[0]),
        max: Some(fields[1]),
        first: Some(fields[2]),
        last: Some(fields[3]),
        sum: fields[4],
    })
}

fn truncated() -> TsfError {
    TsfError::Decode {
        source: "truncated statistics block".into(),
    }
}

fn read_varint(src: &[u8], pos: &mut usize) -> TsfResult<u64> {
    let (v, n) = u64::decode_var(&src[*pos..]).ok_or_else(truncated)?;
    *pos += n;
    Ok(v)
}

fn read_vec(src: &[u8], pos: &mut usize, len: usize) -> TsfResult<Vec<u8>> {
    if *pos + len > src.len() {
        return Err(truncated());
    }
    let v = src[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(v)
}

/// Chunk-level statistics: the merged value statistics plus the covered
/// time range, recorded in the file's metadata index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkStatistics {
    pub time_range: TimeRange,
    pub values: Statistics,
}

impl ChunkStatistics {
    pub fn new(dtype: PhysicalDType) -> Self {
        Self {
            time_range: TimeRange::none(),
            values: Statistics::new(dtype),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Statistics, ValueStatistics};
    use models::field_value::FieldVal;
    use models::PhysicalDType;

    #[test]
    fn test_i64_update() {
        let mut stats = Statistics::new(PhysicalDType::Integer);
        stats.update(&FieldVal::Integer(10)).unwrap();
        stats.update(&FieldVal::Integer(20)).unwrap();
        match &stats {
            Statistics::I64(s) => {
                assert_eq!(s.count, 2);
                assert_eq!(s.min, Some(10));
                assert_eq!(s.max, Some(20));
                assert_eq!(s.first, Some(10));
                assert_eq!(s.last, Some(20));
                assert_eq!(s.sum, 30);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_update_type_mismatch_leaves_stats_untouched() {
        let mut stats = Statistics::new(PhysicalDType::Integer);
        stats.update(&FieldVal::Integer(1)).unwrap();
        assert!(stats.update(&FieldVal::Float(2.0)).is_err());
        assert_eq!(stats.count(), 1);
    }

    #[test]
    fn test_merge_keeps_first_and_last() {
        let mut chunk = ValueStatistics::<i64>::default();
        let mut page1 = ValueStatistics::<i64>::default();
        page1.update(5);
        page1.update(1);
        let mut page2 = ValueStatistics::<i64>::default();
        page2.update(9);
        chunk.merge(&page1);
        chunk.merge(&page2);
        assert_eq!(chunk.count, 3);
        assert_eq!(chunk.min, Some(1));
        assert_eq!(chunk.max, Some(9));
        assert_eq!(chunk.first, Some(5));
        assert_eq!(chunk.last, Some(9));
        assert_eq!(chunk.sum, 15);
    }

    #[test]
    fn test_serialize_round_trip() {
        let cases = [
            {
                let mut stats = Statistics::new(PhysicalDType::Integer);
                stats.update(&FieldVal::Integer(-5)).unwrap();
                stats.update(&FieldVal::Integer(7)).unwrap();
                stats
            },
            {
                let mut stats = Statistics::new(PhysicalDType::Float);
                stats.update(&FieldVal::Float(1.25)).unwrap();
                stats
            },
            {
                let mut stats = Statistics::new(PhysicalDType::Boolean);
                stats.update(&FieldVal::Boolean(true)).unwrap();
                stats.update(&FieldVal::Boolean(false)).unwrap();
                stats
            },
            {
                let mut stats = Statistics::new(PhysicalDType::String);
                stats.update(&FieldVal::from("abc")).unwrap();
                stats.update(&FieldVal::from("xyz")).unwrap();
                stats
            },
            Statistics::new(PhysicalDType::Integer),
        ];
        for stats in cases {
            let mut buf = Vec::new();
            stats.serialize_into(&mut buf);
            assert_eq!(buf.len(), stats.serialized_size());
            let mut pos = 0;
            let out = Statistics::deserialize(stats.physical_dtype(), &buf, &mut pos).unwrap();
            assert_eq!(pos, buf.len());
            assert_eq!(out, stats);
        }
    }
}
