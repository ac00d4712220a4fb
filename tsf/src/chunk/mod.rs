//! Chunk writers: sealed-page accumulation per series and the markers and
//! header layout chunks use on disk.

pub mod aligned;
pub mod single;
pub mod time;
pub mod value;

use integer_encoding::VarInt;
use models::codec::{Compression, Encoding};
use models::schema::DataType;

pub use aligned::AlignedChunkWriter;
pub use single::ChunkWriter;
pub use time::TimeChunkWriter;
pub use value::ValueChunkWriter;

use crate::error::{TsfError, TsfResult};
use crate::page::{PageHeader, SealedPage};

/// Chunk group delimiters.
pub const CHUNK_GROUP_HEADER: u8 = 0x00;
pub const CHUNK_GROUP_FOOTER: u8 = 0x04;

/// Chunk markers. The top bit distinguishes aligned from non-aligned, the
/// bottom bits single-page from multi-page chunks.
pub const CHUNK_HEADER: u8 = 0x05;
pub const ONLY_ONE_PAGE_CHUNK_HEADER: u8 = 0x01;
pub const TIME_CHUNK_HEADER: u8 = 0x06;
pub const VALUE_CHUNK_HEADER: u8 = 0x07;
pub const ONLY_ONE_PAGE_TIME_CHUNK_HEADER: u8 = 0x02;
pub const ONLY_ONE_PAGE_VALUE_CHUNK_HEADER: u8 = 0x03;

pub fn is_single_page_marker(marker: u8) -> bool {
    matches!(
        marker,
        ONLY_ONE_PAGE_CHUNK_HEADER
            | ONLY_ONE_PAGE_TIME_CHUNK_HEADER
            | ONLY_ONE_PAGE_VALUE_CHUNK_HEADER
    )
}

pub fn is_time_chunk_marker(marker: u8) -> bool {
    matches!(marker, TIME_CHUNK_HEADER | ONLY_ONE_PAGE_TIME_CHUNK_HEADER)
}

pub fn is_value_chunk_marker(marker: u8) -> bool {
    matches!(marker, VALUE_CHUNK_HEADER | ONLY_ONE_PAGE_VALUE_CHUNK_HEADER)
}

/// Bytes a sealed page is assumed to occupy beyond its payload while held
/// in memory, used by the memory accounting.
pub const PAGE_FIXED_OVERHEAD: u64 = 16;

/// On-disk chunk header. `data_size` is the exact byte length of the
/// serialised page stream that follows (headers plus payloads).
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkHeader {
    pub marker: u8,
    pub measurement_id: String,
    pub data_size: u64,
    pub data_type: DataType,
    pub compression: Compression,
    pub encoding: Encoding,
    pub num_pages: u32,
}

impl ChunkHeader {
    pub fn serialize_into(&self, dst: &mut Vec<u8>) {
        dst.push(self.marker);
        dst.extend_from_slice(&(self.measurement_id.len() as u64).encode_var_vec());
        dst.extend_from_slice(self.measurement_id.as_bytes());
        dst.extend_from_slice(&self.data_size.encode_var_vec());
        dst.push(self.data_type as u8);
        dst.push(self.compression as u8);
        dst.push(self.encoding as u8);
        dst.extend_from_slice(&self.num_pages.encode_var_vec());
    }

    pub fn serialized_size(&self) -> usize {
        1 + (self.measurement_id.len() as u64).required_space()
            + self.measurement_id.len()
            + self.data_size.required_space()
            + 3
            + self.num_pages.required_space()
    }

    pub fn deserialize(src: &[u8], pos: &mut usize) -> TsfResult<ChunkHeader> {
        let marker = *src.get(*pos).ok_or_else(truncated)?;
        *pos += 1;
        let id_len = read_varint(src, pos)? as usize;
        if *pos + id_len > src.len() {
            return Err(truncated());
        }
        let measurement_id = String::from_utf8(src[*pos..*pos + id_len].to_vec())
            .map_err(|e| TsfError::Decode { source: e.into() })?;
        *pos += id_len;
        let data_size = read_varint(src, pos)?;
        if *pos + 3 > src.len() {
            return Err(truncated());
        }
        let data_type =
            DataType::try_from_u8(src[*pos]).map_err(|e| TsfError::Decode { source: e.into() })?;
        let compression = Compression::from(src[*pos + 1]);
        let encoding = Encoding::from(src[*pos + 2]);
        *pos += 3;
        let num_pages = read_varint(src, pos)? as u32;
        Ok(ChunkHeader {
            marker,
            measurement_id,
            data_size,
            data_type,
            compression,
            encoding,
            num_pages,
        })
    }
}

fn truncated() -> TsfError {
    TsfError::Decode {
        source: "truncated chunk header".into(),
    }
}

fn read_varint(src: &[u8], pos: &mut usize) -> TsfResult<u64> {
    let (v, n) = u64::decode_var(&src[*pos..]).ok_or_else(truncated)?;
    *pos += n;
    Ok(v)
}

/// Sealed, compressed pages of one series chunk, waiting for flush. Page
/// headers are serialised at flush time, once the final page count (and
/// with it statistics/crc placement) is known.
#[derive(Default)]
pub struct ChunkBuffer {
    pages: Vec<SealedPage>,
    point_num: u64,
}

impl ChunkBuffer {
    pub fn push(&mut self, page: SealedPage) {
        self.point_num += page.num_rows as u64;
        self.pages.push(page);
    }

    pub fn num_pages(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn point_num(&self) -> u64 {
        self.point_num
    }

    pub fn pages(&self) -> &[SealedPage] {
        &self.pages
    }

    /// Total compressed payload bytes held.
    pub fn compressed_bytes(&self) -> u64 {
        self.pages.iter().map(|p| p.data.len() as u64).sum()
    }

    /// Exact serialised size of the page stream with the current page
    /// count.
    pub fn page_stream_size(&self, write_crc: bool) -> u64 {
        let multi = self.pages.len() > 1;
        self.pages
            .iter()
            .map(|p| {
                p.header.serialized_size(multi) as u64
                    + if multi && write_crc { 4 } else { 0 }
                    + p.data.len() as u64
            })
            .sum()
    }

    pub fn build_page_stream(&self, write_crc: bool, dst: &mut Vec<u8>) {
        let multi = self.pages.len() > 1;
        for page in &self.pages {
            page.header.serialize_into(dst, multi);
            if multi && write_crc {
                dst.extend_from_slice(&page.crc32.to_be_bytes());
            }
            dst.extend_from_slice(&page.data);
        }
    }

    /// Statistics of the only page, inlined into single-page chunk
    /// headers.
    pub fn single_page_statistics(&self) -> Option<&crate::statistics::Statistics> {
        if self.pages.len() == 1 {
            Some(&self.pages[0].header.statistics)
        } else {
            None
        }
    }

    /// Validate a spliced page against its header before accepting it.
    pub fn push_spliced(
        &mut self,
        header: PageHeader,
        num_rows: u32,
        time_range: models::TimeRange,
        data: bytes::Bytes,
    ) -> TsfResult<()> {
        if data.len() as u64 != header.compressed_size as u64 {
            return Err(TsfError::Page {
                reason: format!(
                    "spliced page payload is {} bytes, header says {}",
                    data.len(),
                    header.compressed_size
                ),
            });
        }
        let crc32 = crc32fast::hash(&data);
        self.push(SealedPage {
            header,
            num_rows,
            time_range,
            crc32,
            data,
        });
        Ok(())
    }

    pub fn clear(&mut self) {
        self.pages.clear();
        self.point_num = 0;
    }
}

#[cfg(test)]
mod test {
    use super::{ChunkBuffer, ChunkHeader, CHUNK_HEADER, ONLY_ONE_PAGE_CHUNK_HEADER};
    use crate::page::{seal_payload, PageHeader};
    use crate::statistics::Statistics;
    use models::codec::{Compression, Encoding};
    use models::schema::DataType;
    use models::PhysicalDType;

    #[test]
    fn test_chunk_header_round_trip() {
        let header = ChunkHeader {
            marker: CHUNK_HEADER,
            measurement_id: "s1".to_string(),
            data_size: 12345,
            data_type: DataType::Int64,
            compression: Compression::Lz4,
            encoding: Encoding::Ts2Diff,
            num_pages: 3,
        };
        let mut buf = Vec::new();
        header.serialize_into(&mut buf);
        assert_eq!(buf.len(), header.serialized_size());
        let mut pos = 0;
        let out = ChunkHeader::deserialize(&buf, &mut pos).unwrap();
        assert_eq!(pos, buf.len());
        assert_eq!(out, header);
    }

    #[test]
    fn test_page_stream_size_matches_built_stream() {
        let mut buffer = ChunkBuffer::default();
        for i in 0..3_u8 {
            let page = seal_payload(
                vec![i; 100],
                Statistics::new(PhysicalDType::Integer),
                10,
                models::TimeRange::new(i as i64 * 10, i as i64 * 10 + 9),
                Compression::Uncompressed,
            )
            .unwrap();
            buffer.push(page);
        }
        for write_crc in [true, false] {
            let mut stream = Vec::new();
            buffer.build_page_stream(write_crc, &mut stream);
            assert_eq!(stream.len() as u64, buffer.page_stream_size(write_crc));
        }
        assert_eq!(buffer.point_num(), 30);
        assert!(buffer.single_page_statistics().is_none());
    }

    #[test]
    fn test_splice_size_mismatch_is_rejected() {
        let mut buffer = ChunkBuffer::default();
        let header = PageHeader {
            uncompressed_size: 8,
            compressed_size: 8,
            statistics: Statistics::new(PhysicalDType::Integer),
        };
        let err = buffer
            .push_spliced(
                header,
                1,
                models::TimeRange::new(0, 0),
                bytes::Bytes::from_static(b"short"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("spliced page"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_single_page_marker_helpers() {
        assert!(super::is_single_page_marker(ONLY_ONE_PAGE_CHUNK_HEADER));
        assert!(!super::is_single_page_marker(CHUNK_HEADER));
        assert!(super::is_time_chunk_marker(super::TIME_CHUNK_HEADER));
        assert!(super::is_value_chunk_marker(
            super::ONLY_ONE_PAGE_VALUE_CHUNK_HEADER
        ));
    }
}
