//! TIFF and PNG predictors for Flate and LZW streams.
//!
//! Predictors store each sample as a difference from its neighbours, which
//! compresses better. Decoding adds the neighbours back; encoding subtracts
//! them. Both directions work row by row, and a short final row is processed
//! with the bytes it has.

use super::DecodeOutcome;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};

/// Decode parameters (`/DecodeParms`) relevant to the filters in this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Samples per row
    pub columns: usize,
    /// Color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
    /// LZW code width switch (1 = one code early, the PDF default)
    pub early_change: i64,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
            early_change: 1,
        }
    }
}

impl DecodeParams {
    /// Read parameters from a `/DecodeParms` dictionary, defaulting missing keys.
    pub fn from_dict(dict: &Dictionary) -> Self {
        let int = |key: &str| dict.get(key).and_then(Object::as_integer);
        let defaults = Self::default();
        Self {
            predictor: int("Predictor").unwrap_or(defaults.predictor),
            columns: int("Columns").filter(|v| *v > 0).map_or(defaults.columns, |v| v as usize),
            colors: int("Colors").filter(|v| *v > 0).map_or(defaults.colors, |v| v as usize),
            bits_per_component: int("BitsPerComponent")
                .filter(|v| *v > 0)
                .map_or(defaults.bits_per_component, |v| v as usize),
            early_change: int("EarlyChange").unwrap_or(defaults.early_change),
        }
    }

    /// Whether a predictor is in effect.
    pub fn has_predictor(&self) -> bool {
        self.predictor > 1
    }

    /// Bytes of sample data per row, without the PNG tag byte.
    pub fn pixel_bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    /// Distance in bytes to the corresponding byte of the previous sample.
    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Undo a predictor.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> DecodeOutcome {
    match params.predictor {
        p if p <= 1 => DecodeOutcome::complete(data.to_vec()),
        2 => decode_tiff(data, params),
        10..=15 => decode_png(data, params),
        other => DecodeOutcome::partial(data.to_vec(), format!("unsupported predictor {}", other)),
    }
}

/// Apply a predictor.
///
/// Predictor 15 ("optimum") is written with the Up function on every row.
pub fn encode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        p if p <= 1 => Ok(data.to_vec()),
        2 => encode_tiff(data, params),
        10..=15 => Ok(encode_png(data, params)),
        other => Err(Error::Unsupported(format!("predictor {}", other))),
    }
}

fn decode_tiff(data: &[u8], params: &DecodeParams) -> DecodeOutcome {
    if params.bits_per_component != 8 {
        return DecodeOutcome::partial(
            data.to_vec(),
            format!("TIFF predictor with {} bits per component", params.bits_per_component),
        );
    }
    let row_len = params.pixel_bytes_per_row().max(1);
    let bpp = params.bytes_per_pixel();
    let mut output = Vec::with_capacity(data.len());

    for row in data.chunks(row_len) {
        let start = output.len();
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= bpp { output[start + i - bpp] } else { 0 };
            output.push(byte.wrapping_add(left));
        }
    }
    DecodeOutcome::complete(output)
}

fn encode_tiff(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(Error::Unsupported(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let row_len = params.pixel_bytes_per_row().max(1);
    let bpp = params.bytes_per_pixel();
    let mut output = Vec::with_capacity(data.len());

    for row in data.chunks(row_len) {
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            output.push(byte.wrapping_sub(left));
        }
    }
    Ok(output)
}

fn decode_png(data: &[u8], params: &DecodeParams) -> DecodeOutcome {
    let pixel_bytes = params.pixel_bytes_per_row().max(1);
    let bpp = params.bytes_per_pixel();
    let mut output: Vec<u8> = Vec::with_capacity(data.len());
    let mut prev: Vec<u8> = vec![0; pixel_bytes];

    for row in data.chunks(pixel_bytes + 1) {
        let tag = row[0];
        let encoded = &row[1..];
        let mut current = Vec::with_capacity(encoded.len());

        for (i, &byte) in encoded.iter().enumerate() {
            let left = if i >= bpp { current[i - bpp] } else { 0u8 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => {
                    return DecodeOutcome::partial(
                        output,
                        format!("invalid PNG predictor tag {}", other),
                    );
                },
            };
            current.push(byte.wrapping_add(predicted));
        }

        output.extend_from_slice(&current);
        prev[..current.len()].copy_from_slice(&current);
    }
    DecodeOutcome::complete(output)
}

fn encode_png(data: &[u8], params: &DecodeParams) -> Vec<u8> {
    let pixel_bytes = params.pixel_bytes_per_row().max(1);
    let bpp = params.bytes_per_pixel();
    let tag: u8 = match params.predictor {
        15 => 2,
        p => (p - 10) as u8,
    };
    let rows = data.len().div_ceil(pixel_bytes);
    let mut output = Vec::with_capacity(data.len() + rows);
    let mut prev: &[u8] = &[];

    for row in data.chunks(pixel_bytes) {
        output.push(tag);
        for (i, &byte) in row.iter().enumerate() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev.get(i).copied().unwrap_or(0);
            let up_left = if i >= bpp { prev.get(i - bpp).copied().unwrap_or(0) } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                _ => paeth(left, up, up_left),
            };
            output.push(byte.wrapping_sub(predicted));
        }
        prev = row;
    }
    output
}

/// Paeth predictor function from the PNG specification.
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (a16, b16, c16) = (a as i16, b as i16, c as i16);
    let p = a16 + b16 - c16;
    let pa = (p - a16).abs();
    let pb = (p - b16).abs();
    let pc = (p - c16).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
