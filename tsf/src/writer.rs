//! Low-level append-only file writer. Emits the file magic, chunk-group
//! delimiters and chunk headers, tracks the running offset, and records
//! chunk metadata for the index written at `finish`.

use integer_encoding::VarInt;
use models::codec::{Compression, Encoding};
use models::schema::DataType;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::chunk::{is_single_page_marker, ChunkHeader, CHUNK_GROUP_FOOTER, CHUNK_GROUP_HEADER};
use crate::config::WriteConfig;
use crate::error::{CommonSnafu, IOSnafu, TsfResult};
use crate::statistics::ChunkStatistics;

pub const TSF_MAGIC: [u8; 4] = *b"TSF1";
pub const TSF_VERSION: u8 = 1;
/// Header flag bit: pages of multi-page chunks carry a crc32.
pub const FLAG_PAGE_CRC: u8 = 0x01;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum State {
    Initialised,
    Started,
    Finished,
}

/// Index entry for one flushed chunk, serialised into the file footer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub device_id: String,
    pub measurement_id: String,
    pub data_type: DataType,
    pub compression: Compression,
    pub encoding: Encoding,
    pub marker: u8,
    /// File offset of the chunk header.
    pub offset: u64,
    pub data_size: u64,
    pub num_pages: u32,
    pub statistics: ChunkStatistics,
}

struct ChunkGroupContext {
    device_id: String,
    chunk_count: u32,
}

pub struct TsfIoWriter<W> {
    inner: W,
    pos: u64,
    state: State,
    write_page_crc: bool,
    current_group: Option<ChunkGroupContext>,
    pending_chunk: Option<ChunkMetadata>,
    chunk_metadata: Vec<ChunkMetadata>,
}

impl<W: AsyncWrite + Unpin + Send> TsfIoWriter<W> {
    pub fn new(inner: W, config: &WriteConfig) -> Self {
        Self {
            inner,
            pos: 0,
            state: State::Initialised,
            write_page_crc: config.write_page_crc,
            current_group: None,
            pending_chunk: None,
            chunk_metadata: Vec::new(),
        }
    }

    /// Current file offset.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn write_page_crc(&self) -> bool {
        self.write_page_crc
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    pub fn chunk_metadata(&self) -> &[ChunkMetadata] {
        &self.chunk_metadata
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    async fn write_all(&mut self, buf: &[u8]) -> TsfResult<()> {
        self.inner.write_all(buf).await.context(IOSnafu)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    /// Magic, version and flags. Written once, before the first group.
    async fn write_header(&mut self) -> TsfResult<()> {
        let flags = if self.write_page_crc { FLAG_PAGE_CRC } else { 0 };
        let header = [
            TSF_MAGIC[0],
            TSF_MAGIC[1],
            TSF_MAGIC[2],
            TSF_MAGIC[3],
            TSF_VERSION,
            flags,
        ];
        self.write_all(&header).await?;
        self.state = State::Started;
        Ok(())
    }

    /// Record the group start and emit the chunk-group header.
    pub async fn start_chunk_group(&mut self, device_id: &str) -> TsfResult<()> {
        if self.state == State::Initialised {
            self.write_header().await?;
        }
        if self.current_group.is_some() {
            return Err(CommonSnafu {
                reason: "previous chunk group is still open".to_string(),
            }
            .build());
        }
        let mut buf = Vec::with_capacity(2 + device_id.len() + 8);
        buf.push(CHUNK_GROUP_HEADER);
        buf.extend_from_slice(&(device_id.len() as u64).encode_var_vec());
        buf.extend_from_slice(device_id.as_bytes());
        self.write_all(&buf).await?;
        self.current_group = Some(ChunkGroupContext {
            device_id: device_id.to_string(),
            chunk_count: 0,
        });
        debug!(device_id, "chunk group started");
        Ok(())
    }

    /// Emit a chunk header. For single-page chunks the page's statistics
    /// follow the header inline.
    #[allow(clippy::too_many_arguments)]
    pub async fn start_flush_chunk(
        &mut self,
        measurement_id: &str,
        compression: Compression,
        data_type: DataType,
        encoding: Encoding,
        statistics: ChunkStatistics,
        data_size: u64,
        num_pages: u32,
        marker: u8,
    ) -> TsfResult<()> {
        let group = self.current_group.as_ref().ok_or_else(|| {
            CommonSnafu {
                reason: "chunk written outside a chunk group".to_string(),
            }
            .build()
        })?;
        if self.pending_chunk.is_some() {
            return Err(CommonSnafu {
                reason: "previous chunk is still open".to_string(),
            }
            .build());
        }
        let offset = self.pos;
        let header = ChunkHeader {
            marker,
            measurement_id: measurement_id.to_string(),
            data_size,
            data_type,
            compression,
            encoding,
            num_pages,
        };
        let mut buf = Vec::with_capacity(header.serialized_size() + 64);
        header.serialize_into(&mut buf);
        if is_single_page_marker(marker) {
            statistics.values.serialize_into(&mut buf);
        }
        let device_id = group.device_id.clone();
        self.write_all(&buf).await?;
        self.pending_chunk = Some(ChunkMetadata {
            device_id,
            measurement_id: measurement_id.to_string(),
            data_type,
            compression,
            encoding,
            marker,
            offset,
            data_size,
            num_pages,
            statistics,
        });
        Ok(())
    }

    /// Append raw page bytes (headers and compressed payloads).
    pub async fn write_bytes(&mut self, bytes: &[u8]) -> TsfResult<usize> {
        self.write_all(bytes).await?;
        Ok(bytes.len())
    }

    /// Record the open chunk's metadata for the file index.
    pub fn end_current_chunk(&mut self) {
        if let Some(chunk) = self.pending_chunk.take() {
            if let Some(group) = self.current_group.as_mut() {
                group.chunk_count += 1;
            }
            self.chunk_metadata.push(chunk);
        }
    }

    /// Emit the chunk-group footer: device id and chunk count.
    pub async fn end_chunk_group(&mut self) -> TsfResult<()> {
        let group = self.current_group.take().ok_or_else(|| {
            CommonSnafu {
                reason: "no chunk group is open".to_string(),
            }
            .build()
        })?;
        let mut buf = Vec::with_capacity(2 + group.device_id.len() + 8);
        buf.push(CHUNK_GROUP_FOOTER);
        buf.extend_from_slice(&(group.device_id.len() as u64).encode_var_vec());
        buf.extend_from_slice(group.device_id.as_bytes());
        buf.extend_from_slice(&group.chunk_count.encode_var_vec());
        self.write_all(&buf).await?;
        debug!(
            device_id = %group.device_id,
            chunks = group.chunk_count,
            "chunk group finished"
        );
        Ok(())
    }

    /// Write the metadata index, its offset and the closing magic. A file
    /// missing this tail is incomplete.
    pub async fn finish(&mut self) -> TsfResult<u64> {
        if self.state == State::Initialised {
            self.write_header().await?;
        }
        if self.current_group.is_some() {
            return Err(CommonSnafu {
                reason: "can not finish with an open chunk group".to_string(),
            }
            .build());
        }
        let index_offset = self.pos;
        let index = bincode::serialize(&self.chunk_metadata).map_err(|e| {
            CommonSnafu {
                reason: format!("serialize metadata index: {e}"),
            }
            .build()
        })?;
        self.write_all(&index).await?;
        self.write_all(&index_offset.to_be_bytes()).await?;
        self.write_all(&TSF_MAGIC).await?;
        self.inner.flush().await.context(IOSnafu)?;
        self.state = State::Finished;
        debug!(size = self.pos, chunks = self.chunk_metadata.len(), "file finished");
        Ok(self.pos)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::{TsfIoWriter, TSF_MAGIC};
    use crate::chunk::ONLY_ONE_PAGE_CHUNK_HEADER;
    use crate::config::WriteConfig;
    use crate::statistics::ChunkStatistics;
    use models::codec::{Compression, Encoding};
    use models::schema::DataType;
    use models::PhysicalDType;

    #[tokio::test]
    async fn test_framing() {
        let config = WriteConfig::default();
        let mut writer = TsfIoWriter::new(Cursor::new(Vec::new()), &config);
        writer.start_chunk_group("d1").await.unwrap();
        writer
            .start_flush_chunk(
                "s1",
                Compression::Uncompressed,
                DataType::Int64,
                Encoding::Plain,
                ChunkStatistics::new(PhysicalDType::Integer),
                4,
                1,
                ONLY_ONE_PAGE_CHUNK_HEADER,
            )
            .await
            .unwrap();
        writer.write_bytes(&[1, 2, 3, 4]).await.unwrap();
        writer.end_current_chunk();
        writer.end_chunk_group().await.unwrap();
        let size = writer.finish().await.unwrap();
        assert!(writer.is_finished());
        assert_eq!(writer.chunk_metadata().len(), 1);

        let data = writer.into_inner().into_inner();
        assert_eq!(data.len() as u64, size);
        assert_eq!(&data[0..4], &TSF_MAGIC);
        assert_eq!(&data[data.len() - 4..], &TSF_MAGIC);
    }

    #[tokio::test]
    async fn test_chunk_outside_group_is_rejected() {
        let config = WriteConfig::default();
        let mut writer = TsfIoWriter::new(Cursor::new(Vec::new()), &config);
        let result = writer
            .start_flush_chunk(
                "s1",
                Compression::Uncompressed,
                DataType::Int64,
                Encoding::Plain,
                ChunkStatistics::new(PhysicalDType::Integer),
                0,
                0,
                ONLY_ONE_PAGE_CHUNK_HEADER,
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unclosed_group_blocks_finish() {
        let config = WriteConfig::default();
        let mut writer = TsfIoWriter::new(Cursor::new(Vec::new()), &config);
        writer.start_chunk_group("d1").await.unwrap();
        assert!(writer.finish().await.is_err());
        writer.end_chunk_group().await.unwrap();
        assert!(writer.finish().await.is_ok());
    }
}
