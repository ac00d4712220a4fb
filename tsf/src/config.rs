use models::codec::{Compression, Encoding};
use serde::{Deserialize, Serialize};

/// Write-path thresholds and defaults. An explicit value of this struct is
/// threaded into every writer at construction; there is no process-wide
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConfig {
    /// Seal the current page when its estimated uncompressed size reaches
    /// this many bytes.
    pub page_size_threshold: u64,
    /// Seal the current page when it holds this many points.
    pub max_points_per_page: u32,
    /// Advisory chunk size consulted by callers through
    /// `check_is_chunk_size_over_threshold`; the writer never flushes on
    /// its own.
    pub chunk_size_threshold: u64,
    /// Encoding of time columns and of the time section of non-aligned
    /// chunks.
    pub time_encoding: Encoding,
    /// Compression of time chunks.
    pub time_compression: Compression,
    /// Whether multi-page chunks carry a crc32 of each compressed payload.
    pub write_page_crc: bool,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            page_size_threshold: 64 * 1024,
            max_points_per_page: 1024 * 1024,
            chunk_size_threshold: 1024 * 1024,
            time_encoding: Encoding::Ts2Diff,
            time_compression: Compression::Lz4,
            write_page_crc: true,
        }
    }
}

impl WriteConfig {
    pub fn with_page_size_threshold(mut self, bytes: u64) -> Self {
        self.page_size_threshold = bytes;
        self
    }

    pub fn with_max_points_per_page(mut self, points: u32) -> Self {
        self.max_points_per_page = points;
        self
    }

    pub fn with_chunk_size_threshold(mut self, bytes: u64) -> Self {
        self.chunk_size_threshold = bytes;
        self
    }

    pub fn with_page_crc(mut self, write_page_crc: bool) -> Self {
        self.write_page_crc = write_page_crc;
        self
    }
}
