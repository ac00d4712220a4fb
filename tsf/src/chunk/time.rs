use bytes::Bytes;
use models::schema::DataType;
use models::TimeRange;
use tokio::io::AsyncWrite;
use tracing::debug;

use super::{
    ChunkBuffer, ONLY_ONE_PAGE_TIME_CHUNK_HEADER, PAGE_FIXED_OVERHEAD, TIME_CHUNK_HEADER,
};
use crate::config::WriteConfig;
use crate::error::TsfResult;
use crate::page::{PageHeader, TimePageWriter};
use crate::statistics::{ChunkStatistics, Statistics};
use crate::writer::TsfIoWriter;

/// Writer of the time column of an aligned group. Timestamps are
/// non-decreasing i64 values with no nullability; its page boundaries
/// govern the page boundaries of every value column in the group.
pub struct TimeChunkWriter {
    config: WriteConfig,
    page_writer: TimePageWriter,
    chunk_buffer: ChunkBuffer,
    chunk_statistics: Statistics,
    time_range: TimeRange,
}

impl TimeChunkWriter {
    pub fn new(config: WriteConfig) -> Self {
        let page_writer = TimePageWriter::new(config.time_encoding);
        Self {
            config,
            page_writer,
            chunk_buffer: ChunkBuffer::default(),
            chunk_statistics: Statistics::new(models::PhysicalDType::Integer),
            time_range: TimeRange::none(),
        }
    }

    pub fn write(&mut self, time: i64) -> TsfResult<()> {
        self.page_writer.write(time)?;
        self.time_range.merge_ts(time);
        Ok(())
    }

    pub fn write_batch(&mut self, times: &[i64], batch_size: usize, offset: usize) -> TsfResult<()> {
        for time in &times[offset..offset + batch_size] {
            self.write(*time)?;
        }
        Ok(())
    }

    /// Points that still fit in the open page before the point-count
    /// policy would seal it. Lets the aligned writer split a batch exactly
    /// at the page boundary.
    pub fn remaining_point_number_for_current_page(&self) -> u64 {
        self.config
            .max_points_per_page
            .saturating_sub(self.page_writer.point_count()) as u64
    }

    /// Serialised size of the time chunk as it would flush right now;
    /// excludes the open page.
    pub fn current_chunk_size(&self) -> u64 {
        if self.chunk_buffer.is_empty() {
            return 0;
        }
        let num_pages = self.chunk_buffer.num_pages();
        let marker = if num_pages == 1 {
            ONLY_ONE_PAGE_TIME_CHUNK_HEADER
        } else {
            TIME_CHUNK_HEADER
        };
        let data_size = self.chunk_buffer.page_stream_size(self.config.write_page_crc);
        let header = super::ChunkHeader {
            marker,
            measurement_id: String::new(),
            data_size,
            data_type: DataType::Timestamp,
            compression: self.config.time_compression,
            encoding: self.config.time_encoding,
            num_pages,
        };
        let inline_statistics = self
            .chunk_buffer
            .single_page_statistics()
            .map_or(0, |s| s.serialized_size() as u64);
        header.serialized_size() as u64 + inline_statistics + data_size
    }

    pub fn seal_current_page(&mut self) -> TsfResult<()> {
        if let Some(page) = self.page_writer.seal(self.config.time_compression)? {
            self.chunk_statistics.merge(&page.header.statistics)?;
            debug!(rows = page.num_rows, bytes = page.data.len(), "time page sealed");
            self.chunk_buffer.push(page);
        }
        Ok(())
    }

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

    /// Seal the open page and emit the time chunk. The measurement id of a
    /// time chunk is empty; readers identify it by its marker.
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
            ONLY_ONE_PAGE_TIME_CHUNK_HEADER
        } else {
            TIME_CHUNK_HEADER
        };
        let data_size = self.chunk_buffer.page_stream_size(write_crc);
        let statistics = ChunkStatistics {
            time_range: self.time_range,
            values: self.chunk_statistics.clone(),
        };
        file_writer
            .start_flush_chunk(
                "",
                self.config.time_compression,
                DataType::Timestamp,
                self.config.time_encoding,
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

        self.chunk_buffer.clear();
        self.chunk_statistics = Statistics::new(models::PhysicalDType::Integer);
        self.time_range = TimeRange::none();
        Ok(file_writer.pos() - start)
    }

    pub fn estimate_max_series_mem_size(&self) -> u64 {
        self.page_writer.estimate_size()
            + self.chunk_buffer.compressed_bytes()
            + self.chunk_buffer.num_pages() as u64 * PAGE_FIXED_OVERHEAD
    }

    pub fn check_is_unsealed_page_over_threshold(&self, size: u64) -> bool {
        self.page_writer.estimate_size() >= size
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
        self.chunk_buffer.point_num() + self.page_writer.point_count() as u64
    }

    pub fn page_point_count(&self) -> u32 {
        self.page_writer.point_count()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_buffer.is_empty() && self.page_writer.is_empty()
    }

    pub fn time_range(&self) -> &TimeRange {
        &self.time_range
    }

    pub fn clear_page_writer(&mut self) -> TsfResult<()> {
        self.page_writer.clear()
    }
}

#[cfg(test)]
mod test {
    use super::TimeChunkWriter;
    use crate::config::WriteConfig;

    #[test]
    fn test_remaining_points() {
        let config = WriteConfig::default().with_max_points_per_page(4);
        let mut writer = TimeChunkWriter::new(config);
        assert_eq!(writer.remaining_point_number_for_current_page(), 4);
        writer.write(1).unwrap();
        writer.write(2).unwrap();
        assert_eq!(writer.remaining_point_number_for_current_page(), 2);
        writer.seal_current_page().unwrap();
        assert_eq!(writer.remaining_point_number_for_current_page(), 4);
        assert_eq!(writer.point_num(), 2);
    }
}
