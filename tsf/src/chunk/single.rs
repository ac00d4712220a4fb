use bytes::Bytes;
use integer_encoding::VarInt;
use models::column_data::ColumnData;
use models::field_value::FieldVal;
use models::schema::MeasurementSchema;
use models::TimeRange;
use tokio::io::AsyncWrite;
use tracing::debug;

use super::{
    ChunkBuffer, ChunkHeader, CHUNK_HEADER, ONLY_ONE_PAGE_CHUNK_HEADER, PAGE_FIXED_OVERHEAD,
};
use crate::config::WriteConfig;
use crate::error::{TsfError, TsfResult};
use crate::page::{seal_payload, PageHeader, TimePageWriter, ValuePageWriter};
use crate::statistics::{ChunkStatistics, Statistics};
use crate::writer::TsfIoWriter;

/// Self-contained writer for one independently-timestamped series. Each
/// page carries the row timestamps, the validity bitmap and the encoded
/// values; the page-size policy runs after every write.
pub struct ChunkWriter {
    schema: MeasurementSchema,
    config: WriteConfig,
    time_page: TimePageWriter,
    value_page: ValuePageWriter,
    chunk_buffer: ChunkBuffer,
    chunk_statistics: Statistics,
    time_range: TimeRange,
}

impl ChunkWriter {
    pub fn new(schema: MeasurementSchema, config: WriteConfig) -> Self {
        let dtype = schema.physical_dtype();
        Self {
            time_page: TimePageWriter::new(config.time_encoding),
            value_page: ValuePageWriter::new(dtype, schema.encoding),
            chunk_buffer: ChunkBuffer::default(),
            chunk_statistics: Statistics::new(dtype),
            time_range: TimeRange::none(),
            schema,
            config,
        }
    }

    pub fn schema(&self) -> &MeasurementSchema {
        &self.schema
    }

    pub fn measurement_id(&self) -> &str {
        &self.schema.measurement_id
    }

    /// Record one point and seal the page if a threshold is crossed.
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
        self.time_page.write(time)?;
        self.value_page.write(value)?;
        self.time_range.merge_ts(time);
        self.check_page_size_and_may_seal()?;
        Ok(())
    }

    /// Bulk form over rows `offset..offset + batch_size` of `column`.
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

    fn check_page_size_and_may_seal(&mut self) -> TsfResult<bool> {
        let over_points = self.value_page.point_count() >= self.config.max_points_per_page;
        let over_size = self.unsealed_page_size() >= self.config.page_size_threshold;
        if over_points || over_size {
            self.seal_current_page()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn unsealed_page_size(&self) -> u64 {
        self.time_page.estimate_size() + self.value_page.estimate_size()
    }

    /// Seal the open page: time stream, bitmap and values become one
    /// compressed payload. No-op on an empty page.
    pub fn seal_current_page(&mut self) -> TsfResult<()> {
        if self.value_page.is_empty() {
            return Ok(());
        }
        let (time_payload, _time_statistics, time_rows, page_time_range) =
            self.time_page.take_payload()?;
        let (value_payload, statistics, num_rows) = self.value_page.take_payload()?;
        debug_assert_eq!(time_rows, num_rows);

        let mut payload =
            Vec::with_capacity(10 + time_payload.len() + value_payload.len());
        payload.extend_from_slice(&(time_payload.len() as u64).encode_var_vec());
        payload.extend_from_slice(&time_payload);
        payload.extend_from_slice(&value_payload);

        let page = seal_payload(
            payload,
            statistics,
            num_rows,
            page_time_range,
            self.schema.compression,
        )?;
        self.chunk_statistics.merge(&page.header.statistics)?;
        debug!(
            measurement_id = %self.schema.measurement_id,
            rows = page.num_rows,
            bytes = page.data.len(),
            "page sealed"
        );
        self.chunk_buffer.push(page);
        Ok(())
    }

    /// Splice a pre-encoded page without re-encoding it.
    pub fn write_page_header_and_data(
        &mut self,
        header: PageHeader,
        num_rows: u32,
        time_range: TimeRange,
        data: Bytes,
    ) -> TsfResult<()> {
        self.chunk_statistics.merge(&header.statistics)?;
        self.time_range.merge(&time_range);
        self.chunk_buffer.push_spliced(header, num_rows, time_range, data)
    }

    /// Seal the open page and emit the chunk; resets the writer. Emits
    /// nothing for a series that saw no points.
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
            ONLY_ONE_PAGE_CHUNK_HEADER
        } else {
            CHUNK_HEADER
        };
        let data_size = self.chunk_buffer.page_stream_size(write_crc);
        let statistics = ChunkStatistics {
            time_range: self.time_range,
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
        self.time_range = TimeRange::none();
    }

    pub fn estimate_max_series_mem_size(&self) -> u64 {
        self.unsealed_page_size()
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
            ONLY_ONE_PAGE_CHUNK_HEADER
        } else {
            CHUNK_HEADER
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
        self.unsealed_page_size() >= size
    }

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

    pub fn point_num(&self) -> u64 {
        self.chunk_buffer.point_num() + self.value_page.point_count() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_buffer.is_empty() && self.value_page.is_empty()
    }

    pub fn clear_page_writer(&mut self) -> TsfResult<()> {
        self.time_page.clear()?;
        self.value_page.clear()
    }

    /// Sealed pages waiting in the chunk buffer, in insertion order.
    pub fn sealed_pages(&self) -> &[crate::page::SealedPage] {
        self.chunk_buffer.pages()
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::ChunkWriter;
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
    fn test_max_points_per_page_seals_exactly() {
        let config = WriteConfig::default().with_max_points_per_page(3);
        let mut writer = ChunkWriter::new(schema(), config);
        for i in 0..3_i64 {
            writer.write(i, Some(&FieldVal::Integer(i))).unwrap();
        }
        // page sealed on the third point; the open page is empty again
        assert_eq!(writer.point_num(), 3);
        assert_eq!(writer.chunk_buffer.num_pages(), 1);
        assert!(writer.value_page.is_empty());
    }

    #[test]
    fn test_page_size_threshold_seals() {
        let config = WriteConfig::default().with_page_size_threshold(64);
        let mut writer = ChunkWriter::new(schema(), config);
        for i in 0..100_i64 {
            writer.write(i, Some(&FieldVal::Integer(i))).unwrap();
        }
        assert!(writer.chunk_buffer.num_pages() > 1);
    }

    #[tokio::test]
    async fn test_seal_then_flush_single_page_marker() {
        let config = WriteConfig::default();
        let mut writer = ChunkWriter::new(schema(), config.clone());
        writer.write(1, Some(&FieldVal::Integer(10))).unwrap();
        writer.seal_current_page().unwrap();

        let mut file_writer = TsfIoWriter::new(Cursor::new(Vec::new()), &config);
        file_writer.start_chunk_group("d1").await.unwrap();
        writer.write_to_file_writer(&mut file_writer).await.unwrap();
        file_writer.end_chunk_group().await.unwrap();

        let metadata = file_writer.chunk_metadata();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[0].marker, super::ONLY_ONE_PAGE_CHUNK_HEADER);
        assert_eq!(metadata[0].num_pages, 1);
        assert!(writer.is_empty());
    }
}
