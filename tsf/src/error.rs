use snafu::Snafu;

pub type TsfResult<T, E = TsfError> = std::result::Result<T, E>;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TsfError {
    #[snafu(display(
        "Series '{}' already installed with a different schema",
        measurement_id
    ))]
    SchemaConflict { measurement_id: String },

    #[snafu(display("Series '{}' is not installed in this chunk group", measurement_id))]
    SeriesNotFound { measurement_id: String },

    #[snafu(display(
        "Series '{}' of type {} can not accept a {} value",
        measurement_id,
        expected,
        actual
    ))]
    TypeMismatch {
        measurement_id: String,
        expected: models::PhysicalDType,
        actual: models::PhysicalDType,
    },

    #[snafu(display("Invalid schema: {}", source))]
    Schema {
        source: models::schema::SchemaError,
    },

    #[snafu(display("Encode error: {}", source))]
    Encode { source: BoxedError },

    #[snafu(display("Decode error: {}", source))]
    Decode { source: BoxedError },

    #[snafu(display("IO error: {}", source))]
    IO { source: std::io::Error },

    #[snafu(display("Page error: {}", reason))]
    Page { reason: String },

    #[snafu(display(
        "Page payload crc32 mismatch: header {}, calculated {}",
        crc,
        crc_calculated
    ))]
    CrcMismatch { crc: u32, crc_calculated: u32 },

    #[snafu(display("File out of spec: {}", reason))]
    OutOfSpec { reason: String },

    #[snafu(display("Tablet error: {}", reason))]
    Tablet { reason: String },

    #[snafu(display("{}", reason))]
    Common { reason: String },
}

impl From<models::column_data::ColumnDataError> for TsfError {
    fn from(source: models::column_data::ColumnDataError) -> Self {
        TsfError::Common {
            reason: source.to_string(),
        }
    }
}
