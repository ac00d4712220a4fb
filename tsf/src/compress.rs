//! Block compression of sealed page payloads. `Uncompressed` is handled by
//! the caller, which hands the payload through without copying.

use std::io::Write;

use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression as CompressionGzip;
use lzzzz::lz4;
use models::codec::Compression;

use crate::error::{TsfError, TsfResult};

/// zstd compress level, select from -5 ~ 17
const ZSTD_COMPRESS_LEVEL: i32 = 3;

fn encode_error(source: impl Into<crate::error::BoxedError>) -> TsfError {
    TsfError::Encode {
        source: source.into(),
    }
}

fn decode_error(source: impl Into<crate::error::BoxedError>) -> TsfError {
    TsfError::Decode {
        source: source.into(),
    }
}

pub fn compress(compression: Compression, src: &[u8]) -> TsfResult<Vec<u8>> {
    match compression {
        Compression::Uncompressed => Ok(src.to_vec()),
        Compression::Snappy => snap::raw::Encoder::new()
            .compress_vec(src)
            .map_err(encode_error),
        Compression::Lz4 => {
            let mut dst = Vec::new();
            lz4::compress_to_vec(src, &mut dst, lz4::ACC_LEVEL_DEFAULT)
                .map_err(encode_error)?;
            Ok(dst)
        }
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), CompressionGzip::default());
            encoder.write_all(src).map_err(encode_error)?;
            encoder.finish().map_err(encode_error)
        }
        Compression::Zstd => {
            zstd::bulk::compress(src, ZSTD_COMPRESS_LEVEL).map_err(encode_error)
        }
        Compression::Unknown => Err(encode_error("unknown compression")),
    }
}

pub fn decompress(
    compression: Compression,
    src: &[u8],
    uncompressed_size: usize,
) -> TsfResult<Vec<u8>> {
    match compression {
        Compression::Uncompressed => Ok(src.to_vec()),
        Compression::Snappy => snap::raw::Decoder::new()
            .decompress_vec(src)
            .map_err(decode_error),
        Compression::Lz4 => {
            let mut dst = vec![0_u8; uncompressed_size];
            let n = lz4::decompress(src, &mut dst).map_err(decode_error)?;
            dst.truncate(n);
            Ok(dst)
        }
        Compression::Gzip => {
            let mut decoder = GzDecoder::new(Vec::with_capacity(uncompressed_size));
            decoder.write_all(src).map_err(decode_error)?;
            decoder.finish().map_err(decode_error)
        }
        Compression::Zstd => {
            zstd::bulk::decompress(src, uncompressed_size).map_err(decode_error)
        }
        Compression::Unknown => Err(decode_error("unknown compression")),
    }
}

#[cfg(test)]
mod test {
    use super::{compress, decompress};
    use models::codec::Compression;

    #[test]
    fn test_round_trips() {
        let src: Vec<u8> = (0..4096_u32).map(|i| (i % 251) as u8).collect();
        for compression in [
            Compression::Uncompressed,
            Compression::Snappy,
            Compression::Lz4,
            Compression::Gzip,
            Compression::Zstd,
        ] {
            let compressed = compress(compression, &src).unwrap();
            let out = decompress(compression, &compressed, src.len()).unwrap();
            assert_eq!(out, src, "compression {compression:?}");
        }
    }

    #[test]
    fn test_empty_payload() {
        for compression in [Compression::Snappy, Compression::Lz4, Compression::Zstd] {
            let compressed = compress(compression, &[]).unwrap();
            let out = decompress(compression, &compressed, 0).unwrap();
            assert!(out.is_empty());
        }
    }

    #[test]
    fn test_repetitive_payload_shrinks() {
        let src = vec![7_u8; 64 * 1024];
        for compression in [
            Compression::Snappy,
            Compression::Lz4,
            Compression::Gzip,
            Compression::Zstd,
        ] {
            let compressed = compress(compression, &src).unwrap();
            assert!(
                compressed.len() < src.len() / 4,
                "compression {compression:?} produced {} bytes",
                compressed.len()
            );
        }
    }
}
