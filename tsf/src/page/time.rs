use models::codec::{Compression, Encoding};
use models::PhysicalDType;

use super::{seal_payload, SealedPage};
use crate::codec::{i64_encoder, I64Encoder};
use crate::error::TsfResult;
use crate::statistics::Statistics;

/// Page buffer of a time column: a stream of non-decreasing i64
/// timestamps, no nullability.
pub struct TimePageWriter {
    encoder: Box<dyn I64Encoder>,
    statistics: Statistics,
    time_range: models::TimeRange,
    point_count: u32,
}

impl TimePageWriter {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoder: i64_encoder(encoding),
            statistics: Statistics::new(PhysicalDType::Integer),
            time_range: models::TimeRange::none(),
            point_count: 0,
        }
    }

    pub fn write(&mut self, ts: i64) -> TsfResult<()> {
        self.encoder.write(ts)?;
        self.statistics
            .update(&models::field_value::FieldVal::Integer(ts))?;
        self.time_range.merge_ts(ts);
        self.point_count += 1;
        Ok(())
    }

    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Estimated uncompressed size of the open page.
    pub fn estimate_size(&self) -> u64 {
        self.encoder.tail_bytes() as u64
    }

    /// Flush the encoder and hand out the raw payload, statistics, row
    /// count and covered time range, resetting the buffer.
    pub fn take_payload(
        &mut self,
    ) -> TsfResult<(Vec<u8>, Statistics, u32, models::TimeRange)> {
        let mut payload = Vec::with_capacity(self.encoder.tail_bytes());
        self.encoder.flush(&mut payload)?;
        let statistics = std::mem::replace(
            &mut self.statistics,
            Statistics::new(PhysicalDType::Integer),
        );
        let time_range = std::mem::replace(&mut self.time_range, models::TimeRange::none());
        let num_rows = self.point_count;
        self.point_count = 0;
        Ok((payload, statistics, num_rows, time_range))
    }

    /// Seal the open page. `None` when the page is empty.
    pub fn seal(&mut self, compression: Compression) -> TsfResult<Option<SealedPage>> {
        if self.is_empty() {
            return Ok(None);
        }
        let (payload, statistics, num_rows, time_range) = self.take_payload()?;
        seal_payload(payload, statistics, num_rows, time_range, compression).map(Some)
    }

    /// Drop the open page without sealing it. Encoders reset on flush, so
    /// the pending stream is flushed into a discarded scratch buffer.
    pub fn clear(&mut self) -> TsfResult<()> {
        let mut scratch = Vec::new();
        self.encoder.flush(&mut scratch)?;
        self.statistics = Statistics::new(PhysicalDType::Integer);
        self.time_range = models::TimeRange::none();
        self.point_count = 0;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::TimePageWriter;
    use crate::codec::integer::decode_i64;
    use crate::statistics::Statistics;
    use models::codec::{Compression, Encoding};

    #[test]
    fn test_write_and_seal() {
        let mut page = TimePageWriter::new(Encoding::Ts2Diff);
        for ts in [10_i64, 20, 30] {
            page.write(ts).unwrap();
        }
        assert_eq!(page.point_count(), 3);
        let sealed = page
            .seal(Compression::Uncompressed)
            .unwrap()
            .expect("non-empty page seals");
        assert!(page.is_empty());
        assert_eq!(sealed.num_rows, 3);
        match &sealed.header.statistics {
            Statistics::I64(stats) => {
                assert_eq!(stats.min, Some(10));
                assert_eq!(stats.max, Some(30));
            }
            _ => unreachable!(),
        }
        let mut out = Vec::new();
        decode_i64(&sealed.data, &mut out).unwrap();
        assert_eq!(out, vec![10, 20, 30]);
    }

    #[test]
    fn test_empty_seal_is_none() {
        let mut page = TimePageWriter::new(Encoding::Ts2Diff);
        assert!(page.seal(Compression::Lz4).unwrap().is_none());
    }
}
