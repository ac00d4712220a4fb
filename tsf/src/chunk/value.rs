use bytes::Bytes;
use models::column_data::ColumnData;
use models::field_value::FieldVal;
use models::schema::MeasurementSchema;
use models::TimeRange;
use tokio::io::AsyncWrite;
use tracing::debug;

use super::{
    ChunkBuffer, ChunkHeader, ONLY_ONE_PAGE_VALUE_CHUNK_HEADER, PAGE_FIXED_OVERHEAD,
    VALUE_CHUNK_HEADER,
};
use crate::config::WriteConfig;
use crate::error::{TsfError, TsfResult};
use crate::page::{PageHeader, ValuePageWriter};
use crate::statistics::{ChunkStatistics, Statistics};
use crate::writer::TsfIoWriter;

/// Writer of one value column inside an aligned group. Rows arrive in
/// lockstep with the owning group's time column; nulls advance only the
/// page bitmap. Page seals are driven by the owner so that every
/// sub-writer seals on the same row.
pub struct ValueChunkWriter {
    schema: MeasurementSchema,
    config: WriteConfig,
    page_writer: ValuePageWriter,
    /// Timestamp span of the open page; moves onto the page at seal.
    page_time_range: TimeRange,
    chunk_buffer: ChunkBuffer,
    chunk_statistics: Statistics,
    chunk_time_range: TimeRange,
}

impl ValueChunkWriter {
    pub fn new(schema: MeasurementSchema, config: WriteConfig) -> Self {
        let dtype = schema.physical_dtype();
        let page_writer = ValuePageWriter::new(dtype, schema.encoding);
        Self {
            schema,
            config,
            page_writer,
            page_time_range: TimeRange::none(),
            chunk_buffer: ChunkBuffer::default(),
            chunk_statistics: Statistics::new(dtype),
            chunk_time_range: TimeRange::none(),
        }
    }

    pub fn schema(&self) -> &MeasurementSchema {
        &self.schema
    }

    pub fn measurement_id(&self) -> &str {
        &self.schema.measurement_id
    }

    /// Record one row. `None` marks a null at this row of the shared time
    /// axis.
    pub fn write(&mut self, time: i64, value: Option<&FieldVal>) -> TsfResult<()> {
        if let Some(v) = value {
            let actual = v.physical_dtype();
            let expected = self.schema.physical_dtype();
            if actual != expected {
                return Err(TsfError::TypeMismatch {
                    measurement_id: self.schema.measurement_id.clone(),
                    expected,
                    actual,
                });
            }
        }
        self.page_writer.write(value)?;
        self.page_time_range.merge_ts(time);
        Ok(())
    }

    /// Bulk row form: rows `offset..offset + batch_size` of `column`.
    pub fn write_batch(
        &mut self,
        times: &[i64],
        column: &ColumnData,
        batch_size: usize,
        offset: usize,
    ) -> TsfResult<()> {
        for i in offset..offset + batch_size {
            let value = column.get(i);
            self.write(times[i], value.as_ref())?;
        }
        Ok(())
    }

    /// Force-seal the open page into the chunk buffer. No-op on an empty
    /// page.
    pub fn seal_current_page(&mut self) -> TsfResult<()> {
        let time_range = std::mem::replace(&mut self.page_time_range, TimeRange::none());
        if let Some(page) = self.page_writer.seal(self.schema.compression, time_range)? {
            self.chunk_statistics.merge(&page.header.statistics)?;
            self.chunk_time_range.merge(&page.time_range);
            debug!(
                measurement_id = %self.schema.measurement_id,
                rows = page.num_rows,
                bytes = page.data.len(),
                "value page sealed"
            );
            self.chunk_buffer.push(page);
        }
        Ok(())
    }

    /// Splice a pre-encoded page: statistics and time range advance from
    /// the header, the payload is not re-encoded.
    pub fn write_page_header_and_data(
        &mut self,
        header: PageHeader,
        num_rows: u32,
        time_range: TimeRange,
        data: Bytes,
    ) -> TsfResult<()> {
        self.chunk_statistics.merge(&header.statistics)?;
        self.chunk_time_range.merge(&time_range);
        self.chunk_buffer.push_spliced(header, num_rows, time_range, data)
    }

    /// Seal the open page and emit the whole chunk. Resets the writer.
    /// Emits nothing for a series that saw no points.
    pub async fn write_to_file_writer<W: AsyncWrite + Unpin + Send>(
        &mut self,
        file_writer: &mut TsfIoWriter<W>,
    ) -> TsfResult<u64> {
        self.seal_current_page()?;
        if self.chunk_buffer.is_empty() {
            return Ok(0);
        }
        let start = file_writer.pos();
        let write_crc = file_writer.write_page_crc();
        let num_pages = self.chunk_buffer.num_pages();
        let marker = if num_pages == 1 {
            ONLY_ONE_PAGE_VALUE_CHUNK_HEADER
        } else {
            VALUE_CHUNK_HEADER
        };
        let data_size = self.chunk_buffer.page_stream_size(write_crc);
        let statistics = ChunkStatistics {
            time_range: self.chunk_time_range,
            values: self.chunk_statistics.clone(),
        };
        file_writer
            .start_flush_chunk(
                &self.schema.measurement_id,
                self.schema.compression,
                self.schema.data_type,
                self.schema.encoding,
                statistics,
                data_size,
                num_pages,
                marker,
            )
            .await?;
        let mut stream = Vec::with_capacity(data_size as usize);
        self.chunk_buffer.build_page_stream(write_crc, &mut stream);
        file_writer.write_bytes(&stream).await?;
        file_writer.end_current_chunk();

        self.reset();
        Ok(file_writer.pos() - start)
    }

    fn reset(&mut self) {
        self.chunk_buffer.clear();
        self.chunk_statistics = Statistics::new(self.schema.physical_dtype());
        self.chunk_time_range = TimeRange::none();
    }

    /// Upper bound on bytes held: encoder state and open page, sealed
    /// compressed pages, and fixed per-page bookkeeping.
    pub fn estimate_max_series_mem_size(&self) -> u64 {
        self.page_writer.estimate_size()
            + self.chunk_buffer.compressed_bytes()
            + self.chunk_buffer.num_pages() as u64 * PAGE_FIXED_OVERHEAD
    }

    /// Serialised size of the chunk as it would flush right now; excludes
    /// the open page.
    pub fn current_chunk_size(&self) -> u64 {
        if self.chunk_buffer.is_empty() {
            return 0;
        }
        let num_pages = self.chunk_buffer.num_pages();
        let marker = if num_pages == 1 {
            ONLY_ONE_PAGE_VALUE_CHUNK_HEADER
        } else {
            VALUE_CHUNK_HEADER
        };
        let data_size = self.chunk_buffer.page_stream_size(self.config.write_page_crc);
        let header = ChunkHeader {
            marker,
            measurement_id: self.schema.measurement_id.clone(),
            data_size,
            data_type: self.schema.data_type,
            compression: self.schema.compression,
            encoding: self.schema.encoding,
            num_pages,
        };
        let inline_statistics = self
            .chunk_buffer
            .single_page_statistics()
            .map_or(0, |s| s.serialized_size() as u64);
        header.serialized_size() as u64 + inline_statistics + data_size
    }

    pub fn check_is_unsealed_page_over_threshold(&self, size: u64) -> bool {
        self.page_writer.estimate_size() >= size
    }

    /// True iff the chunk is empty and the flag asks for that, or the
    /// point count or estimated size crossed its threshold.
    pub fn check_is_chunk_size_over_threshold(
        &self,
        size: u64,
        point_num: u64,
        return_true_if_chunk_empty: bool,
    ) -> bool {
        if self.is_empty() {
            return return_true_if_chunk_empty;
        }
        self.point_num() >= point_num || self.estimate_max_series_mem_size() >= size
    }

    /// Points recorded, sealed and open.
    pub fn point_num(&self) -> u64 {
        self.chunk_buffer.point_num() + self.page_writer.point_count() as u64
    }

    pub fn page_point_count(&self) -> u32 {
        self.page_writer.point_count()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_buffer.is_empty() && self.page_writer.is_empty()
    }

    pub fn clear_page_writer(&mut self) -> TsfResult<()> {
        self.page_time_range = TimeRange::none();
        self.page_writer.clear()
    }

    /// Sealed pages waiting in the chunk buffer, in insertion order.
    pub fn sealed_pages(&self) -> &[crate::page::SealedPage] {
        self.chunk_buffer.pages()
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::ValueChunkWriter;
    use crate::config::WriteConfig;
    use crate::writer::TsfIoWriter;
    use models::codec::{Compression, Encoding};
    use models::field_value::FieldVal;
    use models::schema::{DataType, MeasurementSchema};

    fn schema() -> MeasurementSchema {
        MeasurementSchema::new(
            "s1",
            DataType::Int64,
            Encoding::Plain,
            Compression::Uncompressed,
        )
    }

    #[test]
    fn test_type_mismatch() {
        let mut writer = ValueChunkWriter::new(schema(), WriteConfig::default());
        let err = writer.write(1, Some(&FieldVal::Float(1.0))).unwrap_err();
        assert!(err.to_string().contains("s1"));
        assert!(writer.is_empty());
    }

    #[tokio::test]
    async fn test_empty_series_emits_no_chunk() {
        let config = WriteConfig::default();
        let mut writer = ValueChunkWriter::new(schema(), config.clone());
        let mut file_writer = TsfIoWriter::new(Cursor::new(Vec::new()), &config);
        file_writer.start_chunk_group("d1").await.unwrap();
        let written = writer.write_to_file_writer(&mut file_writer).await.unwrap();
        assert_eq!(written, 0);
        assert!(file_writer.chunk_metadata().is_empty());
    }

    #[tokio::test]
    async fn test_flush_resets_writer() {
        let config = WriteConfig::default();
        let mut writer = ValueChunkWriter::new(schema(), config.clone());
        writer.write(1, Some(&FieldVal::Integer(10))).unwrap();
        writer.write(2, None).unwrap();
        assert_eq!(writer.point_num(), 2);

        let mut file_writer = TsfIoWriter::new(Cursor::new(Vec::new()), &config);
        file_writer.start_chunk_group("d1").await.unwrap();
        let written = writer.write_to_file_writer(&mut file_writer).await.unwrap();
        assert!(written > 0);
        assert!(writer.is_empty());
        assert_eq!(writer.current_chunk_size(), 0);
        assert_eq!(writer.point_num(), 0);
    }

    #[test]
    fn test_chunk_threshold_policy() {
        let mut writer = ValueChunkWriter::new(schema(), WriteConfig::default());
        // empty chunk: only the flag decides
        assert!(writer.check_is_chunk_size_over_threshold(1, 1, true));
        assert!(!writer.check_is_chunk_size_over_threshold(1, 1, false));

        writer.write(1, Some(&FieldVal::Integer(1))).unwrap();
        assert!(writer.check_is_chunk_size_over_threshold(u64::MAX, 1, false));
        assert!(!writer.check_is_chunk_size_over_threshold(u64::MAX, 2, false));
        assert!(writer.check_is_chunk_size_over_threshold(1, u64::MAX, false));
    }
}
