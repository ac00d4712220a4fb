use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::codec::{Compression, Encoding};
use crate::PhysicalDType;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SchemaError {
    #[snafu(display("Measurement id can not be empty"))]
    EmptyMeasurementId,

    #[snafu(display("Unknown data type id {}", id))]
    UnknownDataType { id: u8 },
}

/// Logical data type of a series. `Timestamp` and `Date` are aliases of
/// `Int64` and `Int32` at the encoding level; `Text`, `Blob` and `String`
/// share the binary representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    Boolean = 0,
    Int32 = 1,
    Int64 = 2,
    Float = 3,
    Double = 4,
    Text = 5,
    Blob = 6,
    String = 7,
    Timestamp = 8,
    Date = 9,
}

impl DataType {
    pub fn to_physical(&self) -> PhysicalDType {
        match self {
            DataType::Boolean => PhysicalDType::Boolean,
            DataType::Int32 | DataType::Int64 | DataType::Timestamp | DataType::Date => {
                PhysicalDType::Integer
            }
            DataType::Float | DataType::Double => PhysicalDType::Float,
            DataType::Text | DataType::Blob | DataType::String => PhysicalDType::String,
        }
    }

    pub fn try_from_u8(id: u8) -> Result<Self, SchemaError> {
        let dtype = match id {
            0 => DataType::Boolean,
            1 => DataType::Int32,
            2 => DataType::Int64,
            3 => DataType::Float,
            4 => DataType::Double,
            5 => DataType::Text,
            6 => DataType::Blob,
            7 => DataType::String,
            8 => DataType::Timestamp,
            9 => DataType::Date,
            _ => return Err(SchemaError::UnknownDataType { id }),
        };
        Ok(dtype)
    }
}

/// Description of one series: how its values are typed, encoded and
/// compressed. Immutable once installed in a writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementSchema {
    pub measurement_id: String,
    pub data_type: DataType,
    pub encoding: Encoding,
    pub compression: Compression,
}

impl MeasurementSchema {
    pub fn new(
        measurement_id: impl Into<String>,
        data_type: DataType,
        encoding: Encoding,
        compression: Compression,
    ) -> Self {
        Self {
            measurement_id: measurement_id.into(),
            data_type,
            encoding,
            compression,
        }
    }

    /// Schema with the type's default encoding and the default compression.
    pub fn with_defaults(measurement_id: impl Into<String>, data_type: DataType) -> Self {
        Self::new(
            measurement_id,
            data_type,
            Encoding::default_for(data_type.to_physical()),
            Compression::default(),
        )
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.measurement_id.is_empty() {
            return Err(SchemaError::EmptyMeasurementId);
        }
        Ok(())
    }

    pub fn physical_dtype(&self) -> PhysicalDType {
        self.data_type.to_physical()
    }
}

#[cfg(test)]
mod test {
    use super::{DataType, MeasurementSchema};
    use crate::codec::{Compression, Encoding};
    use crate::PhysicalDType;

    #[test]
    fn test_physical_collapse() {
        assert_eq!(DataType::Timestamp.to_physical(), PhysicalDType::Integer);
        assert_eq!(DataType::Date.to_physical(), PhysicalDType::Integer);
        assert_eq!(DataType::Float.to_physical(), PhysicalDType::Float);
        assert_eq!(DataType::Blob.to_physical(), PhysicalDType::String);
    }

    #[test]
    fn test_defaults() {
        let schema = MeasurementSchema::with_defaults("s1", DataType::Double);
        assert_eq!(schema.encoding, Encoding::Gorilla);
        assert_eq!(schema.compression, Compression::Snappy);
        assert!(schema.validate().is_ok());
        assert!(MeasurementSchema::with_defaults("", DataType::Int32)
            .validate()
            .is_err());
    }
}
