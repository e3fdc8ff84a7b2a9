//! ASCIIHexDecode.
//!
//! Pairs of hex digits, whitespace ignored, `>` marks the end. An odd final
//! digit is completed with an implicit `0`.

use super::{DecodeOutcome, DecodeParams, StreamFilter};
use crate::error::Result;

/// ASCIIHexDecode filter.
pub struct AsciiHexFilter;

impl StreamFilter for AsciiHexFilter {
    fn decode(&self, input: &[u8], _params: &DecodeParams) -> DecodeOutcome {
        let mut output = Vec::with_capacity(input.len() / 2);
        let mut pending: Option<u8> = None;

        for &c in input {
            if c == b'>' {
                break;
            }
            if c.is_ascii_whitespace() || c == 0 {
                continue;
            }
            let nibble = match hex_value(c) {
                Some(v) => v,
                None => {
                    return DecodeOutcome::partial(
                        output,
                        format!("invalid hex digit 0x{:02x}", c),
                    );
                },
            };
            match pending.take() {
                Some(high) => output.push((high << 4) | nibble),
                None => pending = Some(nibble),
            }
        }

        if let Some(high) = pending {
            output.push(high << 4);
        }
        DecodeOutcome::complete(output)
    }

    fn encode(&self, input: &[u8], _params: &DecodeParams) -> Result<Vec<u8>> {
        const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
        let mut output = Vec::with_capacity(input.len() * 2 + 1);
        for &byte in input {
            output.push(DIGITS[(byte >> 4) as usize]);
            output.push(DIGITS[(byte & 0x0F) as usize]);
        }
        output.push(b'>');
        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &[u8]) -> DecodeOutcome {
        AsciiHexFilter.decode(input, &DecodeParams::default())
    }

    #[test]
    fn test_decode_with_whitespace_and_eod() {
        let out = decode(b"48 65 6c\n6C 6F> trailing junk");
        assert!(out.is_complete());
        assert_eq!(out.data, b"Hello");
    }

    #[test]
    fn test_odd_digit_padded() {
        assert_eq!(decode(b"414>").data, vec![0x41, 0x40]);
    }

    #[test]
    fn test_invalid_digit_returns_prefix() {
        let out = decode(b"4142ZZ43");
        assert!(!out.is_complete());
        assert_eq!(out.data, b"AB");
    }

    #[test]
    fn test_encode() {
        let encoded = AsciiHexFilter.encode(b"\x00\xffA", &DecodeParams::default()).unwrap();
        assert_eq!(encoded, b"00FF41>");
    }
}
