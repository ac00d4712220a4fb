//! Symmetric reader over a finished file. Parses the metadata index, walks
//! chunk and page headers, validates CRCs and sizes, and decodes pages
//! back into timestamps and nullable values. Enough surface for bulk
//! verification; not a query engine.

use bytes::Bytes;
use models::field_value::FieldVal;
use models::PhysicalDType;
use utils::bitset::ImmutBitSet;

use crate::chunk::{
    is_single_page_marker, is_time_chunk_marker, is_value_chunk_marker, ChunkHeader,
};
use crate::codec::{decode_values, integer::decode_i64};
use crate::compress;
use crate::error::{TsfError, TsfResult};
use crate::page::{parse_mixed_payload, parse_value_payload, PageHeader};
use crate::statistics::Statistics;
use crate::writer::{ChunkMetadata, FLAG_PAGE_CRC, TSF_MAGIC, TSF_VERSION};

/// Decoded content of one chunk. Time chunks fill `timestamps`, aligned
/// value chunks fill `values`, non-aligned chunks fill both.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChunkData {
    pub measurement_id: String,
    pub timestamps: Vec<i64>,
    pub values: Vec<Option<FieldVal>>,
}

pub struct TsfReader {
    data: Bytes,
    write_page_crc: bool,
    chunk_metadata: Vec<ChunkMetadata>,
}

impl TsfReader {
    pub fn open(data: impl Into<Bytes>) -> TsfResult<Self> {
        let data: Bytes = data.into();
        if data.len() < 6 + 12 {
            return Err(out_of_spec("file too short"));
        }
        if data[0..4] != TSF_MAGIC || data[data.len() - 4..] != TSF_MAGIC {
            return Err(out_of_spec("magic bytes missing; file is incomplete"));
        }
        if data[4] != TSF_VERSION {
            return Err(out_of_spec(&format!("unsupported version {}", data[4])));
        }
        let write_page_crc = data[5] & FLAG_PAGE_CRC != 0;

        let index_offset =
            u64::from_be_bytes(data[data.len() - 12..data.len() - 4].try_into().unwrap())
                as usize;
        if index_offset >= data.len() - 12 {
            return Err(out_of_spec("metadata index offset out of range"));
        }
        let chunk_metadata: Vec<ChunkMetadata> =
            bincode::deserialize(&data[index_offset..data.len() - 12])
                .map_err(|e| TsfError::Decode { source: e })?;
        Ok(Self {
            data,
            write_page_crc,
            chunk_metadata,
        })
    }

    pub fn chunk_metadata(&self) -> &[ChunkMetadata] {
        &self.chunk_metadata
    }

    /// Devices in file order.
    pub fn devices(&self) -> Vec<&str> {
        let mut devices: Vec<&str> = Vec::new();
        for meta in &self.chunk_metadata {
            if devices.last() != Some(&meta.device_id.as_str()) {
                devices.push(&meta.device_id);
            }
        }
        devices
    }

    pub fn metadata_of(&self, device_id: &str, measurement_id: &str) -> Option<&ChunkMetadata> {
        self.chunk_metadata
            .iter()
            .find(|m| m.device_id == device_id && m.measurement_id == measurement_id)
    }

    /// Decode one chunk, validating markers, CRCs and the data-size
    /// accounting along the way.
    pub fn read_chunk(&self, meta: &ChunkMetadata) -> TsfResult<ChunkData> {
        let src = self.data.as_ref();
        let mut pos = meta.offset as usize;
        let header = ChunkHeader::deserialize(src, &mut pos)?;
        if header.marker != meta.marker || header.num_pages != meta.num_pages {
            return Err(out_of_spec("chunk header does not match the index entry"));
        }
        let dtype = header.data_type.to_physical();
        let single_page = is_single_page_marker(header.marker);
        let inline_statistics = if single_page {
            Some(Statistics::deserialize(dtype, src, &mut pos)?)
        } else {
            None
        };

        let page_stream_start = pos;
        let mut chunk = ChunkData {
            measurement_id: header.measurement_id.clone(),
            ..Default::default()
        };
        for _ in 0..header.num_pages {
            let page_header = PageHeader::deserialize(dtype, src, &mut pos, !single_page)?;
            let crc = if !single_page && self.write_page_crc {
                if pos + 4 > src.len() {
                    return Err(out_of_spec("page crc out of range"));
                }
                let crc = u32::from_be_bytes(src[pos..pos + 4].try_into().unwrap());
                pos += 4;
                Some(crc)
            } else {
                None
            };
            let end = pos + page_header.compressed_size as usize;
            if end > src.len() {
                return Err(out_of_spec("page payload out of range"));
            }
            let compressed = &src[pos..end];
            pos = end;
            if let Some(crc) = crc {
                let crc_calculated = crc32fast::hash(compressed);
                if crc != crc_calculated {
                    return Err(TsfError::CrcMismatch {
                        crc,
                        crc_calculated,
                    });
                }
            }
            let payload = compress::decompress(
                header.compression,
                compressed,
                page_header.uncompressed_size as usize,
            )?;

            if is_time_chunk_marker(header.marker) {
                decode_i64(&payload, &mut chunk.timestamps)?;
            } else if is_value_chunk_marker(header.marker) {
                decode_value_page(dtype, &payload, &mut chunk.values)?;
            } else {
                let (time_stream, value_payload) = parse_mixed_payload(&payload)?;
                decode_i64(time_stream, &mut chunk.timestamps)?;
                decode_value_page(dtype, value_payload, &mut chunk.values)?;
            }
        }
        if (pos - page_stream_start) as u64 != header.data_size {
            return Err(out_of_spec("chunk data size does not cover its pages"));
        }
        // single-page chunks inline the page's statistics in their header
        if let Some(statistics) = inline_statistics {
            if statistics != meta.statistics.values {
                return Err(out_of_spec(
                    "inline chunk statistics differ from the index entry",
                ));
            }
        }
        Ok(chunk)
    }

    /// Read an aligned device: the shared timestamps and every value
    /// series joined by row index.
    pub fn read_aligned_device(
        &self,
        device_id: &str,
    ) -> TsfResult<(Vec<i64>, Vec<ChunkData>)> {
        let time_meta = self
            .chunk_metadata
            .iter()
            .find(|m| m.device_id == device_id && is_time_chunk_marker(m.marker))
            .ok_or_else(|| out_of_spec("device has no time chunk"))?;
        let timestamps = self.read_chunk(time_meta)?.timestamps;
        let mut series = Vec::new();
        for meta in self
            .chunk_metadata
            .iter()
            .filter(|m| m.device_id == device_id && is_value_chunk_marker(m.marker))
        {
            series.push(self.read_chunk(meta)?);
        }
        Ok((timestamps, series))
    }
}

/// Join a value page back to one `Option` per row via its bitmap.
fn decode_value_page(
    dtype: PhysicalDType,
    payload: &[u8],
    dst: &mut Vec<Option<FieldVal>>,
) -> TsfResult<()> {
    let (num_rows, bitmap_bytes, value_stream) = parse_value_payload(payload)?;
    let bitmap = ImmutBitSet::new_without_check(num_rows as usize, bitmap_bytes);
    let values = decode_values(dtype, value_stream)?;
    let mut present = values.into_iter();
    for i in 0..num_rows as usize {
        if bitmap.get(i) {
            dst.push(Some(present.next().ok_or_else(|| {
                out_of_spec("value stream shorter than its bitmap")
            })?));
        } else {
            dst.push(None);
        }
    }
    Ok(())
}

fn out_of_spec(reason: &str) -> TsfError {
    TsfError::OutOfSpec {
        reason: reason.to_string(),
    }
}
