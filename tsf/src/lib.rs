//! Chunk-group write path of the TSF columnar time-series file format.
//!
//! Points for one device accumulate in per-series page buffers with
//! type-specific encoding, seal into compressed pages when thresholds are
//! crossed, and flush as chunks through the append-only
//! [`writer::TsfIoWriter`]. [`reader::TsfReader`] is the symmetric reader
//! used for bulk verification.

pub mod chunk;
pub mod chunk_group;
pub mod codec;
pub mod compress;
pub mod config;
pub mod error;
pub mod page;
pub mod reader;
pub mod statistics;
pub mod tablet;
pub mod writer;

pub use chunk::{AlignedChunkWriter, ChunkWriter, TimeChunkWriter, ValueChunkWriter};
pub use chunk_group::ChunkGroupWriter;
pub use config::WriteConfig;
pub use error::{TsfError, TsfResult};
pub use reader::TsfReader;
pub use tablet::{DataPoint, Tablet};
pub use writer::TsfIoWriter;
