//! LZWDecode.
//!
//! PDF's LZW is MSB-first with 9- to 12-bit codes, clear code 256 and EOD
//! code 257. With `/EarlyChange 1` (the default) the code width grows one code
//! early, which is the same convention TIFF uses, so weezl's TIFF size switch
//! matches it exactly.

use super::{DecodeOutcome, DecodeParams, StreamFilter};
use crate::error::{Error, Result};
use weezl::{BitOrder, LzwStatus, decode::Decoder, encode::Encoder};

/// LZWDecode filter.
pub struct LzwFilter;

impl StreamFilter for LzwFilter {
    fn decode(&self, input: &[u8], params: &DecodeParams) -> DecodeOutcome {
        let mut decoder = if params.early_change == 0 {
            Decoder::new(BitOrder::Msb, 8)
        } else {
            Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
        };

        let mut output = Vec::new();
        let mut buf = [0u8; 8192];
        let mut rest = input;
        loop {
            let result = decoder.decode_bytes(rest, &mut buf);
            output.extend_from_slice(&buf[..result.consumed_out]);
            rest = &rest[result.consumed_in..];
            match result.status {
                Ok(LzwStatus::Ok) => continue,
                Ok(LzwStatus::Done) | Ok(LzwStatus::NoProgress) => {
                    return DecodeOutcome::complete(output);
                },
                Err(e) => {
                    log::warn!("LZWDecode stopped after {} bytes: {:?}", output.len(), e);
                    return DecodeOutcome::partial(output, format!("{:?}", e));
                },
            }
        }
    }

    fn encode(&self, input: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
        let mut encoder = if params.early_change == 0 {
            Encoder::new(BitOrder::Msb, 8)
        } else {
            Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
        };
        encoder.encode(input).map_err(|e| Error::FilterDecode {
            filter: self.name().to_string(),
            decoded_len: 0,
            reason: format!("LZW encoder: {:?}", e),
        })
    }

    fn name(&self) -> &str {
        "LZWDecode"
    }
}
