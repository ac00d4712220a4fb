//! The per-device coordinator: owns the series writers of one chunk group,
//! routes row and tablet ingress to them, and flushes the group to the
//! file writer.

use std::collections::HashMap;

use integer_encoding::VarInt;
use models::field_value::FieldVal;
use models::schema::MeasurementSchema;
use tokio::io::AsyncWrite;
use tracing::info;

use crate::chunk::{AlignedChunkWriter, ChunkWriter};
use crate::config::WriteConfig;
use crate::error::{TsfError, TsfResult};
use crate::tablet::{DataPoint, Tablet};
use crate::writer::TsfIoWriter;

/// The group's series writers: independent per-series writers, or one
/// aligned writer sharing a time axis.
enum GroupWriters {
    Single {
        /// Installation order; chunks flush in this order.
        writers: Vec<ChunkWriter>,
        index: HashMap<String, usize>,
    },
    Aligned(AlignedChunkWriter),
}

pub struct ChunkGroupWriter {
    device_id: String,
    config: WriteConfig,
    writers: GroupWriters,
    max_group_mem_size: u64,
}

impl ChunkGroupWriter {
    /// Group of independently-timestamped series.
    pub fn new(device_id: impl Into<String>, config: WriteConfig) -> Self {
        Self {
            device_id: device_id.into(),
            writers: GroupWriters::Single {
                writers: Vec::new(),
                index: HashMap::new(),
            },
            config,
            max_group_mem_size: 0,
        }
    }

    /// Aligned group: one time column, value series installed on demand.
    pub fn new_aligned(device_id: impl Into<String>, config: WriteConfig) -> Self {
        Self {
            device_id: device_id.into(),
            writers: GroupWriters::Aligned(AlignedChunkWriter::new(
                Vec::new(),
                config.clone(),
            )),
            config,
            max_group_mem_size: 0,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn is_aligned(&self) -> bool {
        matches!(self.writers, GroupWriters::Aligned(_))
    }

    pub fn series_count(&self) -> usize {
        match &self.writers {
            GroupWriters::Single { writers, .. } => writers.len(),
            GroupWriters::Aligned(writer) => writer.value_writer_count(),
        }
    }

    /// Install a series writer. Installing the same schema twice is a
    /// no-op; the same id under a different schema is a conflict.
    pub fn try_to_add_series_writer(&mut self, schema: MeasurementSchema) -> TsfResult<()> {
        schema
            .validate()
            .map_err(|source| TsfError::Schema { source })?;
        match &mut self.writers {
            GroupWriters::Single { writers, index } => {
                if let Some(existing) = index.get(&schema.measurement_id) {
                    if writers[*existing].schema() == &schema {
                        return Ok(());
                    }
                    return Err(TsfError::SchemaConflict {
                        measurement_id: schema.measurement_id,
                    });
                }
                index.insert(schema.measurement_id.clone(), writers.len());
                writers.push(ChunkWriter::new(schema, self.config.clone()));
            }
            GroupWriters::Aligned(writer) => {
                if let Some(existing) = writer.value_writer_index(&schema.measurement_id) {
                    if writer.value_writer(existing).map(|w| w.schema()) == Some(&schema) {
                        return Ok(());
                    }
                    return Err(TsfError::SchemaConflict {
                        measurement_id: schema.measurement_id,
                    });
                }
                writer.add_value_writer(schema)?;
            }
        }
        Ok(())
    }

    pub fn try_to_add_series_writers(
        &mut self,
        schemas: Vec<MeasurementSchema>,
    ) -> TsfResult<()> {
        for schema in schemas {
            self.try_to_add_series_writer(schema)?;
        }
        Ok(())
    }

    /// Row ingress: route each data point to the writer its measurement id
    /// names. Returns the number of points written.
    pub fn write(&mut self, time: i64, points: &[DataPoint]) -> TsfResult<usize> {
        match &mut self.writers {
            GroupWriters::Single { writers, index } => {
                for point in points {
                    let i = index.get(&point.measurement_id).ok_or_else(|| {
                        TsfError::SeriesNotFound {
                            measurement_id: point.measurement_id.clone(),
                        }
                    })?;
                    writers[*i].write(time, point.value.as_ref())?;
                }
            }
            GroupWriters::Aligned(writer) => {
                // absent series stay null in this row to keep alignment
                let mut row: Vec<Option<FieldVal>> = vec![None; writer.value_writer_count()];
                for point in points {
                    let i = writer
                        .value_writer_index(&point.measurement_id)
                        .ok_or_else(|| TsfError::SeriesNotFound {
                            measurement_id: point.measurement_id.clone(),
                        })?;
                    row[i] = point.value.clone();
                }
                writer.write_row(time, &row)?;
            }
        }
        Ok(points.len())
    }

    /// Columnar ingress over the whole tablet. Returns rows written.
    pub fn write_tablet(&mut self, tablet: &Tablet) -> TsfResult<usize> {
        self.write_tablet_rows(tablet, 0, tablet.num_rows())
    }

    pub fn write_tablet_rows(
        &mut self,
        tablet: &Tablet,
        start_row: usize,
        end_row: usize,
    ) -> TsfResult<usize> {
        self.write_tablet_slice(tablet, start_row, end_row, 0, tablet.num_columns())
    }

    /// Columnar ingress over a row/column slice of the tablet. Series
    /// outside the column range are untouched in a non-aligned group and
    /// receive explicit nulls in an aligned one.
    pub fn write_tablet_slice(
        &mut self,
        tablet: &Tablet,
        start_row: usize,
        end_row: usize,
        start_col: usize,
        end_col: usize,
    ) -> TsfResult<usize> {
        if start_row > end_row
            || end_row > tablet.num_rows()
            || start_col > end_col
            || end_col > tablet.num_columns()
        {
            return Err(TsfError::Tablet {
                reason: format!(
                    "slice rows {start_row}..{end_row} cols {start_col}..{end_col} out of range"
                ),
            });
        }
        let batch_size = end_row - start_row;
        if batch_size == 0 {
            return Ok(0);
        }
        match &mut self.writers {
            GroupWriters::Single { writers, index } => {
                for col in start_col..end_col {
                    let schema = &tablet.schemas()[col];
                    let i = index.get(&schema.measurement_id).ok_or_else(|| {
                        TsfError::SeriesNotFound {
                            measurement_id: schema.measurement_id.clone(),
                        }
                    })?;
                    let writer = &mut writers[*i];
                    if writer.schema().data_type != schema.data_type {
                        return Err(TsfError::TypeMismatch {
                            measurement_id: schema.measurement_id.clone(),
                            expected: writer.schema().physical_dtype(),
                            actual: schema.physical_dtype(),
                        });
                    }
                    writer.write_batch(
                        tablet.timestamps(),
                        tablet.column(col),
                        batch_size,
                        start_row,
                    )?;
                }
            }
            GroupWriters::Aligned(writer) => {
                // resolve tablet columns onto declared series once
                let mut column_of_series: Vec<Option<usize>> =
                    vec![None; writer.value_writer_count()];
                for col in start_col..end_col {
                    let schema = &tablet.schemas()[col];
                    let i = writer
                        .value_writer_index(&schema.measurement_id)
                        .ok_or_else(|| TsfError::SeriesNotFound {
                            measurement_id: schema.measurement_id.clone(),
                        })?;
                    column_of_series[i] = Some(col);
                }
                for r in start_row..end_row {
                    let time = tablet.timestamps()[r];
                    for col in &column_of_series {
                        let value = col.and_then(|c| tablet.column(c).get(r));
                        writer.write_value(time, value.as_ref())?;
                    }
                    writer.write_time(time)?;
                }
            }
        }
        Ok(batch_size)
    }

    /// Flush the whole group: group header, every chunk in installation
    /// order (aligned: time chunk first), group footer. Returns the bytes
    /// emitted, series writers end up empty.
    pub async fn flush_to_file_writer<W: AsyncWrite + Unpin + Send>(
        &mut self,
        file_writer: &mut TsfIoWriter<W>,
    ) -> TsfResult<u64> {
        let start = file_writer.pos();
        file_writer.start_chunk_group(&self.device_id).await?;
        match &mut self.writers {
            GroupWriters::Single { writers, .. } => {
                for writer in writers.iter_mut() {
                    writer.write_to_file_writer(file_writer).await?;
                }
            }
            GroupWriters::Aligned(writer) => {
                writer.write_to_file_writer(file_writer).await?;
            }
        }
        file_writer.end_chunk_group().await?;
        let written = file_writer.pos() - start;
        info!(
            device_id = %self.device_id,
            bytes = written,
            "chunk group flushed"
        );
        Ok(written)
    }

    /// Bytes currently held by this group's writers (open pages, encoder
    /// state and sealed pages).
    pub fn estimate_max_group_mem_size(&self) -> u64 {
        match &self.writers {
            GroupWriters::Single { writers, .. } => writers
                .iter()
                .map(|w| w.estimate_max_series_mem_size())
                .sum(),
            GroupWriters::Aligned(writer) => writer.estimate_max_series_mem_size(),
        }
    }

    /// Observed high-water mark of the group's memory footprint.
    pub fn update_max_group_mem_size(&mut self) -> u64 {
        self.max_group_mem_size = self
            .max_group_mem_size
            .max(self.estimate_max_group_mem_size());
        self.max_group_mem_size
    }

    /// Serialised size of the group header plus all sealed chunk bytes;
    /// the open page of any series is excluded.
    pub fn get_current_chunk_group_size(&self) -> u64 {
        let header_size = 1
            + (self.device_id.len() as u64).required_space() as u64
            + self.device_id.len() as u64;
        let chunks = match &self.writers {
            GroupWriters::Single { writers, .. } => {
                writers.iter().map(|w| w.current_chunk_size()).sum()
            }
            GroupWriters::Aligned(writer) => writer.current_chunk_size(),
        };
        header_size + chunks
    }

    pub fn is_empty(&self) -> bool {
        match &self.writers {
            GroupWriters::Single { writers, .. } => writers.iter().all(|w| w.is_empty()),
            GroupWriters::Aligned(writer) => writer.is_empty(),
        }
    }

    /// Force-seal the open page of every series writer.
    pub fn seal_all_pages(&mut self) -> TsfResult<()> {
        match &mut self.writers {
            GroupWriters::Single { writers, .. } => {
                for writer in writers.iter_mut() {
                    writer.seal_current_page()?;
                }
            }
            GroupWriters::Aligned(writer) => writer.seal_current_page()?,
        }
        Ok(())
    }

    /// Whether any series writer crossed the configured chunk-size
    /// policy; used by callers driving flush decisions.
    pub fn check_is_any_chunk_over_threshold(&self, point_num: u64) -> bool {
        let size = self.config.chunk_size_threshold;
        match &self.writers {
            GroupWriters::Single { writers, .. } => writers
                .iter()
                .any(|w| w.check_is_chunk_size_over_threshold(size, point_num, false)),
            GroupWriters::Aligned(writer) => {
                writer.check_is_chunk_size_over_threshold(size, point_num, false)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::ChunkGroupWriter;
    use crate::config::WriteConfig;
    use crate::tablet::DataPoint;
    use models::codec::{Compression, Encoding};
    use models::field_value::FieldVal;
    use models::schema::{DataType, MeasurementSchema};

    fn s1() -> MeasurementSchema {
        MeasurementSchema::new("s1", DataType::Int64, Encoding::Plain, Compression::Snappy)
    }

    #[test]
    fn test_add_series_writer_is_idempotent() {
        let mut group = ChunkGroupWriter::new("d1", WriteConfig::default());
        group.try_to_add_series_writer(s1()).unwrap();
        group.try_to_add_series_writer(s1()).unwrap();
        assert_eq!(group.series_count(), 1);

        let conflicting =
            MeasurementSchema::new("s1", DataType::Int64, Encoding::Plain, Compression::Gzip);
        let err = group.try_to_add_series_writer(conflicting).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TsfError::SchemaConflict { .. }
        ));
    }

    #[test]
    fn test_write_unknown_series_fails() {
        let mut group = ChunkGroupWriter::new("d1", WriteConfig::default());
        group.try_to_add_series_writer(s1()).unwrap();
        let err = group
            .write(1, &[DataPoint::new("nope", Some(FieldVal::Integer(1)))])
            .unwrap_err();
        assert!(matches!(err, crate::error::TsfError::SeriesNotFound { .. }));
    }

    #[test]
    fn test_mem_size_high_water_mark() {
        let mut group = ChunkGroupWriter::new("d1", WriteConfig::default());
        group.try_to_add_series_writer(s1()).unwrap();
        for i in 0..100 {
            group
                .write(i, &[DataPoint::new("s1", Some(FieldVal::Integer(i)))])
                .unwrap();
        }
        let high = group.update_max_group_mem_size();
        assert!(high > 0);
        assert!(group.estimate_max_group_mem_size() <= high);
    }
}
