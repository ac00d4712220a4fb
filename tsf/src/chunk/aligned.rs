use models::column_data::ColumnData;
use models::field_value::FieldVal;
use models::schema::MeasurementSchema;
use snafu::ensure;
use tokio::io::AsyncWrite;

use super::{TimeChunkWriter, ValueChunkWriter};
use crate::config::WriteConfig;
use crate::error::{CommonSnafu, TsfResult};
use crate::writer::TsfIoWriter;

/// One time column governing N value columns. Every sub-writer sees the
/// same sequence of timestamps, and a page boundary in the time chunk is
/// matched by a simultaneous seal in every value chunk.
pub struct AlignedChunkWriter {
    config: WriteConfig,
    time_chunk_writer: TimeChunkWriter,
    value_chunk_writers: Vec<ValueChunkWriter>,
    /// Cursor of the column-at-a-time row ingress.
    value_index: usize,
    /// Points the open time page still accepts; batch writes split here so
    /// that all sub-writers seal together.
    remaining_points_number: u64,
}

impl AlignedChunkWriter {
    pub fn new(schemas: Vec<MeasurementSchema>, config: WriteConfig) -> Self {
        let time_chunk_writer = TimeChunkWriter::new(config.clone());
        let value_chunk_writers = schemas
            .into_iter()
            .map(|schema| ValueChunkWriter::new(schema, config.clone()))
            .collect();
        let remaining_points_number = time_chunk_writer.remaining_point_number_for_current_page();
        Self {
            config,
            time_chunk_writer,
            value_chunk_writers,
            value_index: 0,
            remaining_points_number,
        }
    }

    /// Install another value series. Only legal before the first point;
    /// later installs would desynchronise the shared time axis.
    pub fn add_value_writer(&mut self, schema: MeasurementSchema) -> TsfResult<()> {
        ensure!(
            self.is_empty(),
            CommonSnafu {
                reason: format!(
                    "can not install series '{}' into an aligned group that already holds points",
                    schema.measurement_id
                ),
            }
        );
        self.value_chunk_writers
            .push(ValueChunkWriter::new(schema, self.config.clone()));
        Ok(())
    }

    pub fn value_writer_count(&self) -> usize {
        self.value_chunk_writers.len()
    }

    pub fn value_writer_index(&self, measurement_id: &str) -> Option<usize> {
        self.value_chunk_writers
            .iter()
            .position(|w| w.measurement_id() == measurement_id)
    }

    pub fn value_writer(&self, index: usize) -> Option<&ValueChunkWriter> {
        self.value_chunk_writers.get(index)
    }

    /// Cursor ingress: write the next column of the current row. The row
    /// commits when [`write_time`] is called.
    pub fn write_value(&mut self, time: i64, value: Option<&FieldVal>) -> TsfResult<()> {
        let index = self.value_index;
        let writer = self.value_chunk_writers.get_mut(index).ok_or_else(|| {
            CommonSnafu {
                reason: format!("row cursor past the last value column ({index})"),
            }
            .build()
        })?;
        writer.write(time, value)?;
        self.value_index += 1;
        Ok(())
    }

    /// Commit the current row: record the timestamp, reset the cursor and
    /// run the shared page-size policy.
    pub fn write_time(&mut self, time: i64) -> TsfResult<()> {
        self.value_index = 0;
        self.time_chunk_writer.write(time)?;
        if self.check_page_size_and_may_open_a_new_page() {
            self.write_page_to_page_buffer()?;
        }
        self.remaining_points_number =
            self.time_chunk_writer.remaining_point_number_for_current_page();
        Ok(())
    }

    /// Whole-row ingress: one value per declared series, in order.
    pub fn write_row(&mut self, time: i64, row: &[Option<FieldVal>]) -> TsfResult<()> {
        ensure!(
            row.len() == self.value_chunk_writers.len(),
            CommonSnafu {
                reason: format!(
                    "row holds {} values but the group declares {} series",
                    row.len(),
                    self.value_chunk_writers.len()
                ),
            }
        );
        self.value_index = 0;
        for value in row {
            self.write_value(time, value.as_ref())?;
        }
        self.write_time(time)
    }

    /// Column-batch ingress. The batch is split at the time writer's
    /// remaining-point count so a page boundary falls exactly on the seal
    /// row in every sub-writer.
    pub fn write_columns(
        &mut self,
        times: &[i64],
        columns: &[&ColumnData],
        batch_size: usize,
    ) -> TsfResult<()> {
        ensure!(
            columns.len() == self.value_chunk_writers.len(),
            CommonSnafu {
                reason: format!(
                    "batch holds {} columns but the group declares {} series",
                    columns.len(),
                    self.value_chunk_writers.len()
                ),
            }
        );
        ensure!(
            times.len() >= batch_size && columns.iter().all(|c| c.len() >= batch_size),
            CommonSnafu {
                reason: "batch size exceeds the given column length".to_string(),
            }
        );
        let mut offset = 0;
        while offset < batch_size {
            let step = (self.remaining_points_number.max(1) as usize).min(batch_size - offset);
            self.batch_write(times, columns, step, offset)?;
            offset += step;
        }
        Ok(())
    }

    fn batch_write(
        &mut self,
        times: &[i64],
        columns: &[&ColumnData],
        batch_size: usize,
        offset: usize,
    ) -> TsfResult<()> {
        self.value_index = 0;
        for (writer, column) in self.value_chunk_writers.iter_mut().zip(columns) {
            writer.write_batch(times, column, batch_size, offset)?;
        }
        self.time_chunk_writer.write_batch(times, batch_size, offset)?;
        if self.check_page_size_and_may_open_a_new_page() {
            self.write_page_to_page_buffer()?;
        }
        self.remaining_points_number =
            self.time_chunk_writer.remaining_point_number_for_current_page();
        Ok(())
    }

    /// A page must seal when the time writer or any value writer reports
    /// over-threshold.
    fn check_page_size_and_may_open_a_new_page(&self) -> bool {
        if self.time_chunk_writer.page_point_count() >= self.config.max_points_per_page
            || self
                .time_chunk_writer
                .check_is_unsealed_page_over_threshold(self.config.page_size_threshold)
        {
            return true;
        }
        self.value_chunk_writers.iter().any(|w| {
            w.check_is_unsealed_page_over_threshold(self.config.page_size_threshold)
        })
    }

    /// Seal the open page of every sub-writer, keeping boundaries in
    /// lockstep.
    fn write_page_to_page_buffer(&mut self) -> TsfResult<()> {
        self.time_chunk_writer.seal_current_page()?;
        for writer in self.value_chunk_writers.iter_mut() {
            writer.seal_current_page()?;
        }
        Ok(())
    }

    /// Force-seal the open page of every sub-writer.
    pub fn seal_current_page(&mut self) -> TsfResult<()> {
        self.write_page_to_page_buffer()?;
        self.remaining_points_number =
            self.time_chunk_writer.remaining_point_number_for_current_page();
        Ok(())
    }

    pub fn seal_current_time_page(&mut self) -> TsfResult<()> {
        self.time_chunk_writer.seal_current_page()
    }

    pub fn seal_current_value_page(&mut self, value_index: usize) -> TsfResult<()> {
        let writer = self
            .value_chunk_writers
            .get_mut(value_index)
            .ok_or_else(|| {
                CommonSnafu {
                    reason: format!("no value series at index {value_index}"),
                }
                .build()
            })?;
        writer.seal_current_page()
    }

    /// Emit the whole group: the time chunk first, then every value chunk
    /// in declared order.
    pub async fn write_to_file_writer<W: AsyncWrite + Unpin + Send>(
        &mut self,
        file_writer: &mut TsfIoWriter<W>,
    ) -> TsfResult<u64> {
        let mut written = self
            .time_chunk_writer
            .write_to_file_writer(file_writer)
            .await?;
        for writer in self.value_chunk_writers.iter_mut() {
            written += writer.write_to_file_writer(file_writer).await?;
        }
        self.remaining_points_number =
            self.time_chunk_writer.remaining_point_number_for_current_page();
        Ok(written)
    }

    pub fn estimate_max_series_mem_size(&self) -> u64 {
        self.time_chunk_writer.estimate_max_series_mem_size()
            + self
                .value_chunk_writers
                .iter()
                .map(|w| w.estimate_max_series_mem_size())
                .sum::<u64>()
    }

    pub fn current_chunk_size(&self) -> u64 {
        self.time_chunk_writer.current_chunk_size()
            + self
                .value_chunk_writers
                .iter()
                .map(|w| w.current_chunk_size())
                .sum::<u64>()
    }

    pub fn check_is_unsealed_page_over_threshold(
        &self,
        size: u64,
        point_num: u64,
        return_true_if_page_empty: bool,
    ) -> bool {
        let page_points = self.time_chunk_writer.page_point_count() as u64;
        if return_true_if_page_empty && page_points == 0 {
            return true;
        }
        if page_points >= point_num
            || self.time_chunk_writer.check_is_unsealed_page_over_threshold(size)
        {
            return true;
        }
        self.value_chunk_writers
            .iter()
            .any(|w| w.check_is_unsealed_page_over_threshold(size))
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
        if self.time_chunk_writer.point_num() >= point_num
            || self.time_chunk_writer.estimate_max_series_mem_size() >= size
        {
            return true;
        }
        self.value_chunk_writers
            .iter()
            .any(|w| w.estimate_max_series_mem_size() >= size)
    }

    pub fn is_empty(&self) -> bool {
        self.time_chunk_writer.is_empty()
    }

    pub fn point_num(&self) -> u64 {
        self.time_chunk_writer.point_num()
    }

    pub fn clear_page_writer(&mut self) -> TsfResult<()> {
        self.time_chunk_writer.clear_page_writer()?;
        for writer in self.value_chunk_writers.iter_mut() {
            writer.clear_page_writer()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::AlignedChunkWriter;
    use crate::config::WriteConfig;
    use models::codec::{Compression, Encoding};
    use models::column_data::ColumnData;
    use models::field_value::FieldVal;
    use models::schema::{DataType, MeasurementSchema};
    use models::PhysicalDType;

    fn schemas() -> Vec<MeasurementSchema> {
        vec![
            MeasurementSchema::new("v1", DataType::Int32, Encoding::Plain, Compression::Uncompressed),
            MeasurementSchema::new("v2", DataType::Double, Encoding::Plain, Compression::Uncompressed),
        ]
    }

    #[test]
    fn test_row_ingress_keeps_alignment() {
        let mut writer = AlignedChunkWriter::new(schemas(), WriteConfig::default());
        writer
            .write_row(1, &[Some(FieldVal::Integer(7)), None])
            .unwrap();
        writer
            .write_row(2, &[None, Some(FieldVal::Float(3.5))])
            .unwrap();
        assert_eq!(writer.point_num(), 2);
        for index in 0..2 {
            // every value writer recorded both rows, nulls included
            assert_eq!(writer.value_writer(index).unwrap().point_num(), 2);
        }
    }

    #[test]
    fn test_batch_split_at_page_boundary() {
        let config = WriteConfig::default().with_max_points_per_page(2);
        let mut writer = AlignedChunkWriter::new(schemas(), config);

        let times: Vec<i64> = (1..=5).collect();
        let mut v1 = ColumnData::new(PhysicalDType::Integer);
        let mut v2 = ColumnData::new(PhysicalDType::Float);
        for i in 0..5 {
            v1.push(Some(FieldVal::Integer(i))).unwrap();
            v2.push(Some(FieldVal::Float(i as f64))).unwrap();
        }
        writer.write_columns(&times, &[&v1, &v2], 5).unwrap();

        // pages of 2, 2 and an open page of 1, in lockstep everywhere
        assert_eq!(writer.time_chunk_writer.page_point_count(), 1);
        assert_eq!(writer.point_num(), 5);
        for index in 0..2 {
            assert_eq!(writer.value_writer(index).unwrap().page_point_count(), 1);
            assert_eq!(writer.value_writer(index).unwrap().point_num(), 5);
        }
    }

    #[test]
    fn test_late_install_is_rejected() {
        let mut writer = AlignedChunkWriter::new(schemas(), WriteConfig::default());
        writer.write_row(1, &[Some(FieldVal::Integer(1)), None]).unwrap();
        let schema =
            MeasurementSchema::new("v3", DataType::Boolean, Encoding::Plain, Compression::Snappy);
        assert!(writer.add_value_writer(schema).is_err());
    }

    #[test]
    fn test_row_width_is_checked() {
        let mut writer = AlignedChunkWriter::new(schemas(), WriteConfig::default());
        assert!(writer.write_row(1, &[None]).is_err());
    }
}
