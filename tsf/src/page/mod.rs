//! Page buffers and the sealed-page representation. A page is sealed by
//! flushing its encoder, compressing the payload and snapshotting its
//! statistics; the bytes then wait in the owning chunk buffer until flush.

pub mod time;
pub mod value;

use bytes::Bytes;
use integer_encoding::VarInt;
use models::codec::Compression;
use models::PhysicalDType;

pub use time::TimePageWriter;
pub use value::ValuePageWriter;

use crate::compress;
use crate::error::{TsfError, TsfResult};
use crate::statistics::Statistics;

/// Header of one sealed page. Statistics are omitted on disk when the
/// chunk ends up holding only this page (they are inlined in the chunk
/// header instead).
#[derive(Debug, Clone, PartialEq)]
pub struct PageHeader {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub statistics: Statistics,
}

impl PageHeader {
    pub fn serialize_into(&self, dst: &mut Vec<u8>, include_statistics: bool) {
        dst.extend_from_slice(&self.uncompressed_size.encode_var_vec());
        dst.extend_from_slice(&self.compressed_size.encode_var_vec());
        if include_statistics {
            self.statistics.serialize_into(dst);
        }
    }

    pub fn serialized_size(&self, include_statistics: bool) -> usize {
        let mut size =
            self.uncompressed_size.required_space() + self.compressed_size.required_space();
        if include_statistics {
            size += self.statistics.serialized_size();
        }
        size
    }

    pub fn deserialize(
        dtype: PhysicalDType,
        src: &[u8],
        pos: &mut usize,
        include_statistics: bool,
    ) -> TsfResult<PageHeader> {
        let uncompressed_size = read_varint_u32(src, pos)?;
        let compressed_size = read_varint_u32(src, pos)?;
        let statistics = if include_statistics {
            Statistics::deserialize(dtype, src, pos)?
        } else {
            Statistics::new(dtype)
        };
        Ok(PageHeader {
            uncompressed_size,
            compressed_size,
            statistics,
        })
    }
}

/// A sealed page: header, compressed payload and the payload's crc32.
/// `num_rows` counts rows including nulls; `time_range` is the span of
/// timestamps the page covers (kept in memory for chunk metadata, not
/// serialised with the page).
#[derive(Debug, Clone)]
pub struct SealedPage {
    pub header: PageHeader,
    pub num_rows: u32,
    pub time_range: models::TimeRange,
    pub crc32: u32,
    pub data: Bytes,
}

/// Compress a finished payload and wrap it as a sealed page.
/// `Uncompressed` hands the buffer through without copying.
pub fn seal_payload(
    payload: Vec<u8>,
    statistics: Statistics,
    num_rows: u32,
    time_range: models::TimeRange,
    compression: Compression,
) -> TsfResult<SealedPage> {
    let uncompressed_size = payload.len() as u32;
    let data = match compression {
        Compression::Uncompressed => Bytes::from(payload),
        other => Bytes::from(compress::compress(other, &payload)?),
    };
    let crc32 = crc32fast::hash(&data);
    Ok(SealedPage {
        header: PageHeader {
            uncompressed_size,
            compressed_size: data.len() as u32,
            statistics,
        },
        num_rows,
        time_range,
        crc32,
        data,
    })
}

/// Split a decompressed value-page payload into its row count, bitmap
/// bytes and encoded-value stream.
pub fn parse_value_payload(payload: &[u8]) -> TsfResult<(u32, &[u8], &[u8])> {
    if payload.len() < 8 {
        return Err(out_of_spec("value page payload shorter than its prefix"));
    }
    let bitmap_len = u32::from_be_bytes(payload[0..4].try_into().unwrap()) as usize;
    let num_rows = u32::from_be_bytes(payload[4..8].try_into().unwrap());
    if payload.len() < 8 + bitmap_len {
        return Err(out_of_spec("value page payload shorter than its bitmap"));
    }
    Ok((num_rows, &payload[8..8 + bitmap_len], &payload[8 + bitmap_len..]))
}

/// Split a decompressed non-aligned page payload into its time stream and
/// the embedded value-page payload.
pub fn parse_mixed_payload(payload: &[u8]) -> TsfResult<(&[u8], &[u8])> {
    let (time_len, n) = u64::decode_var(payload)
        .ok_or_else(|| out_of_spec("mixed page payload missing its time length"))?;
    let time_len = time_len as usize;
    if payload.len() < n + time_len {
        return Err(out_of_spec("mixed page payload shorter than its time section"));
    }
    Ok((&payload[n..n + time_len], &payload[n + time_len..]))
}

fn out_of_spec(reason: &str) -> TsfError {
    TsfError::OutOfSpec {
        reason: reason.to_string(),
    }
}

fn read_varint_u32(src: &[u8], pos: &mut usize) -> TsfResult<u32> {
    let (v, n) = u32::decode_var(&src[*pos..]).ok_or_else(|| TsfError::Decode {
        source: "truncated page header".into(),
    })?;
    *pos += n;
    Ok(v)
}
