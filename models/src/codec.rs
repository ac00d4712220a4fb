use serde::{Deserialize, Serialize};

use crate::PhysicalDType;

/// Value encoding of a series. The id byte leads every encoded stream so
/// that readers can dispatch without consulting the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Encoding {
    Plain = 0,
    Ts2Diff = 1,
    Rle = 2,
    Gorilla = 3,
    Zigzag = 4,
    Dictionary = 5,
    BitPack = 6,
    Unknown = 15,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Plain
    }
}

impl From<u8> for Encoding {
    fn from(value: u8) -> Self {
        match value {
            0 => Encoding::Plain,
            1 => Encoding::Ts2Diff,
            2 => Encoding::Rle,
            3 => Encoding::Gorilla,
            4 => Encoding::Zigzag,
            5 => Encoding::Dictionary,
            6 => Encoding::BitPack,
            _ => Encoding::Unknown,
        }
    }
}

impl Encoding {
    /// Whether this encoding has a native implementation for the given
    /// physical type. Inapplicable combinations fall back to the type's
    /// default codec at encoder construction.
    pub fn is_applicable(&self, dtype: PhysicalDType) -> bool {
        match self {
            Encoding::Plain => true,
            Encoding::Ts2Diff | Encoding::Rle | Encoding::Zigzag => {
                dtype == PhysicalDType::Integer
            }
            Encoding::Gorilla => dtype == PhysicalDType::Float,
            Encoding::Dictionary => dtype == PhysicalDType::String,
            Encoding::BitPack => dtype == PhysicalDType::Boolean,
            Encoding::Unknown => false,
        }
    }

    /// The encoding used when a schema does not name one.
    pub fn default_for(dtype: PhysicalDType) -> Self {
        match dtype {
            PhysicalDType::Boolean => Encoding::BitPack,
            PhysicalDType::Integer => Encoding::Ts2Diff,
            PhysicalDType::Float => Encoding::Gorilla,
            PhysicalDType::String => Encoding::Plain,
        }
    }
}

/// Block compression applied to a sealed page payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Compression {
    Uncompressed = 0,
    Snappy = 1,
    Gzip = 2,
    Lz4 = 3,
    Zstd = 4,
    Unknown = 15,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Snappy
    }
}

impl From<u8> for Compression {
    fn from(value: u8) -> Self {
        match value {
            0 => Compression::Uncompressed,
            1 => Compression::Snappy,
            2 => Compression::Gzip,
            3 => Compression::Lz4,
            4 => Compression::Zstd,
            _ => Compression::Unknown,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Compression, Encoding};
    use crate::PhysicalDType;

    #[test]
    fn test_round_trip_ids() {
        for enc in [
            Encoding::Plain,
            Encoding::Ts2Diff,
            Encoding::Rle,
            Encoding::Gorilla,
            Encoding::Zigzag,
            Encoding::Dictionary,
            Encoding::BitPack,
        ] {
            assert_eq!(Encoding::from(enc as u8), enc);
        }
        for cmp in [
            Compression::Uncompressed,
            Compression::Snappy,
            Compression::Gzip,
            Compression::Lz4,
            Compression::Zstd,
        ] {
            assert_eq!(Compression::from(cmp as u8), cmp);
        }
        assert_eq!(Encoding::from(9_u8), Encoding::Unknown);
    }

    #[test]
    fn test_applicability() {
        assert!(Encoding::Gorilla.is_applicable(PhysicalDType::Float));
        assert!(!Encoding::Gorilla.is_applicable(PhysicalDType::Integer));
        assert!(Encoding::Plain.is_applicable(PhysicalDType::String));
    }
}
