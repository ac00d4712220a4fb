use models::column_data::ColumnData;
use models::field_value::FieldVal;
use models::schema::MeasurementSchema;

use crate::error::{TsfError, TsfResult};

/// Column-oriented ingress batch: N rows over a fixed set of series. All
/// columns hold exactly one slot per row; absent cells are nulls in the
/// column's validity bitmap.
pub struct Tablet {
    schemas: Vec<MeasurementSchema>,
    timestamps: Vec<i64>,
    columns: Vec<ColumnData>,
}

impl Tablet {
    pub fn new(schemas: Vec<MeasurementSchema>) -> TsfResult<Self> {
        for schema in &schemas {
            schema.validate().map_err(|source| TsfError::Schema { source })?;
        }
        let columns = schemas
            .iter()
            .map(|s| ColumnData::new(s.physical_dtype()))
            .collect();
        Ok(Self {
            schemas,
            timestamps: Vec::new(),
            columns,
        })
    }

    /// Append one row; `values` are ordered as the tablet's schemas.
    pub fn add_row(&mut self, time: i64, values: Vec<Option<FieldVal>>) -> TsfResult<()> {
        if values.len() != self.columns.len() {
            return Err(TsfError::Tablet {
                reason: format!(
                    "row holds {} values but the tablet declares {} series",
                    values.len(),
                    self.columns.len()
                ),
            });
        }
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.push(value)?;
        }
        self.timestamps.push(time);
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.timestamps.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn schemas(&self) -> &[MeasurementSchema] {
        &self.schemas
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn column(&self, index: usize) -> &ColumnData {
        &self.columns[index]
    }
}

/// One (series, value) pair of a row-oriented write.
#[derive(Debug, Clone)]
pub struct DataPoint {
    pub measurement_id: String,
    pub value: Option<FieldVal>,
}

impl DataPoint {
    pub fn new(measurement_id: impl Into<String>, value: Option<FieldVal>) -> Self {
        Self {
            measurement_id: measurement_id.into(),
            value,
        }
    }
}

#[cfg(test)]
mod test {
    use super::Tablet;
    use models::codec::{Compression, Encoding};
    use models::field_value::FieldVal;
    use models::schema::{DataType, MeasurementSchema};

    fn schemas() -> Vec<MeasurementSchema> {
        vec![
            MeasurementSchema::new("a", DataType::Int64, Encoding::Plain, Compression::Snappy),
            MeasurementSchema::new("b", DataType::Double, Encoding::Plain, Compression::Snappy),
        ]
    }

    #[test]
    fn test_add_row() {
        let mut tablet = Tablet::new(schemas()).unwrap();
        tablet
            .add_row(1, vec![Some(FieldVal::Integer(1)), None])
            .unwrap();
        tablet
            .add_row(2, vec![None, Some(FieldVal::Float(0.5))])
            .unwrap();
        assert_eq!(tablet.num_rows(), 2);
        assert_eq!(tablet.column(0).get(0), Some(FieldVal::Integer(1)));
        assert_eq!(tablet.column(0).get(1), None);
        assert_eq!(tablet.column(1).get(1), Some(FieldVal::Float(0.5)));
    }

    #[test]
    fn test_row_width_and_type_are_checked() {
        let mut tablet = Tablet::new(schemas()).unwrap();
        assert!(tablet.add_row(1, vec![None]).is_err());
        assert!(tablet
            .add_row(1, vec![Some(FieldVal::Float(1.0)), None])
            .is_err());
    }
}
