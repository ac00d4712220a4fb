pub mod codec;
pub mod column_data;
pub mod field_value;
pub mod schema;

use serde::{Deserialize, Serialize};

pub use crate::codec::{Compression, Encoding};
pub use crate::field_value::FieldVal;
pub use crate::schema::{DataType, MeasurementSchema};

/// The storage-level type a logical [`DataType`] collapses onto. Encoders,
/// statistics and page payloads all work at this granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalDType {
    Boolean,
    Integer,
    Float,
    String,
}

impl std::fmt::Display for PhysicalDType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
        }
    }
}

/// Closed interval of timestamps covered by a page or chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub min_ts: i64,
    pub max_ts: i64,
}

impl TimeRange {
    pub fn new(min_ts: i64, max_ts: i64) -> Self {
        Self { min_ts, max_ts }
    }

    /// An empty range that merges as the identity.
    pub fn none() -> Self {
        Self {
            min_ts: i64::MAX,
            max_ts: i64::MIN,
        }
    }

    pub fn is_none(&self) -> bool {
        self.min_ts > self.max_ts
    }

    pub fn merge(&mut self, other: &TimeRange) {
        self.min_ts = self.min_ts.min(other.min_ts);
        self.max_ts = self.max_ts.max(other.max_ts);
    }

    pub fn merge_ts(&mut self, ts: i64) {
        self.min_ts = self.min_ts.min(ts);
        self.max_ts = self.max_ts.max(ts);
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod test {
    use super::TimeRange;

    #[test]
    fn test_time_range_merge() {
        let mut range = TimeRange::none();
        assert!(range.is_none());
        range.merge_ts(7);
        range.merge_ts(3);
        assert_eq!(range, TimeRange::new(3, 7));
        range.merge(&TimeRange::new(1, 5));
        assert_eq!(range, TimeRange::new(1, 7));
    }
}
