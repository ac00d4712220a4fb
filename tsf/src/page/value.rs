use models::codec::{Compression, Encoding};
use models::field_value::FieldVal;
use models::PhysicalDType;
use utils::bitset::BitSet;

use super::{seal_payload, SealedPage};
use crate::codec::ColumnEncoder;
use crate::error::TsfResult;
use crate::statistics::Statistics;

/// Page buffer of a value column. Every row advances the validity bitmap;
/// only present values reach the encoder and the statistics. The sealed
/// payload is `bitmap_len ∥ row_count ∥ bitmap ∥ encoded values`.
pub struct ValuePageWriter {
    dtype: PhysicalDType,
    bitmap: BitSet,
    encoder: ColumnEncoder,
    statistics: Statistics,
    point_count: u32,
}

impl ValuePageWriter {
    pub fn new(dtype: PhysicalDType, encoding: Encoding) -> Self {
        Self {
            dtype,
            bitmap: BitSet::new(),
            encoder: ColumnEncoder::new(dtype, encoding),
            statistics: Statistics::new(dtype),
            point_count: 0,
        }
    }

    pub fn write(&mut self, value: Option<&FieldVal>) -> TsfResult<()> {
        match value {
            Some(v) => {
                // the type check inside update runs before any mutation
                self.statistics.update(v)?;
                self.encoder.write(v)?;
                self.bitmap.append_unset_and_set(self.point_count as usize);
            }
            None => self.bitmap.append_unset(1),
        }
        self.point_count += 1;
        Ok(())
    }

    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    pub fn dtype(&self) -> PhysicalDType {
        self.dtype
    }

    /// Estimated uncompressed size of the open page.
    pub fn estimate_size(&self) -> u64 {
        8 + self.bitmap.byte_len() as u64 + self.encoder.tail_bytes() as u64
    }

    /// Flush the encoder and hand out the assembled payload, statistics
    /// and row count, resetting the buffer.
    pub fn take_payload(&mut self) -> TsfResult<(Vec<u8>, Statistics, u32)> {
        let mut payload =
            Vec::with_capacity(8 + self.bitmap.byte_len() + self.encoder.tail_bytes());
        payload.extend_from_slice(&(self.bitmap.byte_len() as u32).to_be_bytes());
        payload.extend_from_slice(&self.point_count.to_be_bytes());
        payload.extend_from_slice(self.bitmap.bytes());
        self.encoder.flush(&mut payload)?;

        let statistics =
            std::mem::replace(&mut self.statistics, Statistics::new(self.dtype));
        let num_rows = self.point_count;
        self.bitmap.clear();
        self.point_count = 0;
        Ok((payload, statistics, num_rows))
    }

    /// Seal the open page. `None` when the page is empty. The time range
    /// is tracked by the owning chunk writer, which alone sees timestamps.
    pub fn seal(
        &mut self,
        compression: Compression,
        time_range: models::TimeRange,
    ) -> TsfResult<Option<SealedPage>> {
        if self.is_empty() {
            return Ok(None);
        }
        let (payload, statistics, num_rows) = self.take_payload()?;
        seal_payload(payload, statistics, num_rows, time_range, compression).map(Some)
    }

    /// Drop the open page without sealing it.
    pub fn clear(&mut self) -> TsfResult<()> {
        let mut scratch = Vec::new();
        self.encoder.flush(&mut scratch)?;
        self.statistics = Statistics::new(self.dtype);
        self.bitmap.clear();
        self.point_count = 0;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::ValuePageWriter;
    use crate::codec::decode_values;
    use crate::page::parse_value_payload;
    use models::codec::{Compression, Encoding};
    use models::field_value::FieldVal;
    use models::PhysicalDType;
    use utils::bitset::ImmutBitSet;

    #[test]
    fn test_nulls_stay_in_bitmap() {
        let mut page = ValuePageWriter::new(PhysicalDType::Integer, Encoding::Plain);
        page.write(Some(&FieldVal::Integer(10))).unwrap();
        page.write(Some(&FieldVal::Integer(20))).unwrap();
        page.write(None).unwrap();
        assert_eq!(page.point_count(), 3);

        let (payload, statistics, num_rows) = page.take_payload().unwrap();
        assert_eq!(num_rows, 3);
        assert_eq!(statistics.count(), 2);

        let (rows, bitmap_bytes, data) = parse_value_payload(&payload).unwrap();
        assert_eq!(rows, 3);
        let bitmap = ImmutBitSet::new_without_check(rows as usize, bitmap_bytes);
        assert!(bitmap.get(0));
        assert!(bitmap.get(1));
        assert!(!bitmap.get(2));

        // only present values were encoded
        let values = decode_values(PhysicalDType::Integer, data).unwrap();
        assert_eq!(
            values,
            vec![FieldVal::Integer(10), FieldVal::Integer(20)]
        );
    }

    #[test]
    fn test_type_mismatch_is_rejected_before_mutation() {
        let mut page = ValuePageWriter::new(PhysicalDType::Integer, Encoding::Plain);
        assert!(page.write(Some(&FieldVal::Float(1.0))).is_err());
        assert_eq!(page.point_count(), 0);
        assert!(page.is_empty());
    }

    #[test]
    fn test_seal_resets() {
        let mut page = ValuePageWriter::new(PhysicalDType::Float, Encoding::Gorilla);
        page.write(Some(&FieldVal::Float(1.5))).unwrap();
        let range = models::TimeRange::new(1, 1);
        let sealed = page.seal(Compression::Snappy, range).unwrap().unwrap();
        assert_eq!(sealed.num_rows, 1);
        assert_eq!(sealed.time_range, range);
        assert!(page.is_empty());
        assert!(page.seal(Compression::Snappy, range).unwrap().is_none());
    }
}
