//! FlateDecode (zlib/deflate).
//!
//! The most common filter by far. Corrupt producers often emit streams that
//! are truncated or have a damaged zlib header, so decoding keeps whatever
//! inflated before the failure and falls back to raw deflate when the zlib
//! wrapper itself is unreadable.

use super::{DecodeOutcome, DecodeParams, StreamFilter};
use crate::error::Result;
use flate2::Compression;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

/// FlateDecode filter.
pub struct FlateFilter;

impl StreamFilter for FlateFilter {
    fn decode(&self, input: &[u8], _params: &DecodeParams) -> DecodeOutcome {
        let mut output = Vec::new();
        let zlib_err = match ZlibDecoder::new(input).read_to_end(&mut output) {
            Ok(_) => return DecodeOutcome::complete(output),
            Err(e) => e,
        };

        if !output.is_empty() {
            log::warn!(
                "FlateDecode partial recovery: {} bytes before corruption: {}",
                output.len(),
                zlib_err
            );
            return DecodeOutcome::partial(output, zlib_err.to_string());
        }

        // Damaged zlib header: try the deflate payload without it
        log::info!("Zlib decode failed ({}), trying raw deflate", zlib_err);
        for skip in [0usize, 2] {
            if input.len() <= skip {
                break;
            }
            output.clear();
            match DeflateDecoder::new(&input[skip..]).read_to_end(&mut output) {
                Ok(_) if !output.is_empty() => {
                    return DecodeOutcome::partial(output, "zlib wrapper missing or damaged");
                },
                Err(_) if !output.is_empty() => {
                    return DecodeOutcome::partial(output, zlib_err.to_string());
                },
                _ => {},
            }
        }

        DecodeOutcome::partial(Vec::new(), zlib_err.to_string())
    }

    fn encode(&self, input: &[u8], _params: &DecodeParams) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DecodeParams {
        DecodeParams::default()
    }

    #[test]
    fn test_flate_round_trip() {
        let original = b"Hello, FlateDecode! ".repeat(20);
        let compressed = FlateFilter.encode(&original, &params()).unwrap();
        assert!(compressed.len() < original.len());

        let decoded = FlateFilter.decode(&compressed, &params());
        assert!(decoded.is_complete());
        assert_eq!(decoded.data, original);
    }

    #[test]
    fn test_flate_truncated_keeps_prefix() {
        let original: Vec<u8> = (0..20_000u32).map(|i| (i % 7 + i % 13) as u8).collect();
        let compressed = FlateFilter.encode(&original, &params()).unwrap();
        let truncated = &compressed[..compressed.len() / 2];

        let decoded = FlateFilter.decode(truncated, &params());
        assert!(!decoded.is_complete());
        assert!(!decoded.data.is_empty());
        assert!(original.starts_with(&decoded.data));
    }

    #[test]
    fn test_flate_garbage_reports_error() {
        let decoded = FlateFilter.decode(b"this is not compressed", &params());
        assert!(!decoded.is_complete());
    }

    #[test]
    fn test_flate_empty_input_round_trip() {
        let compressed = FlateFilter.encode(b"", &params()).unwrap();
        let decoded = FlateFilter.decode(&compressed, &params());
        assert!(decoded.is_complete());
        assert!(decoded.data.is_empty());
    }
}
