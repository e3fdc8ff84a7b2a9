//! ASCII85Decode (base-85).
//!
//! Four bytes become five characters in `!`..=`u`; `z` abbreviates a group of
//! four zero bytes and `~>` ends the data. A final group of `n` characters
//! stands for `n - 1` bytes.

use super::{DecodeOutcome, DecodeParams, StreamFilter};
use crate::error::Result;

/// ASCII85Decode filter.
pub struct Ascii85Filter;

impl StreamFilter for Ascii85Filter {
    fn decode(&self, input: &[u8], _params: &DecodeParams) -> DecodeOutcome {
        let body = input.strip_prefix(b"<~").unwrap_or(input);
        let mut output = Vec::with_capacity(body.len() * 4 / 5);
        let mut group = [0u8; 5];
        let mut count = 0;

        for &c in body {
            match c {
                b'~' => break,
                b'z' if count == 0 => output.extend_from_slice(&[0, 0, 0, 0]),
                b'z' => {
                    return DecodeOutcome::partial(output, "'z' inside a group");
                },
                b'!'..=b'u' => {
                    group[count] = c - b'!';
                    count += 1;
                    if count == 5 {
                        match group_value(&group) {
                            Some(v) => output.extend_from_slice(&v.to_be_bytes()),
                            None => return DecodeOutcome::partial(output, "group overflow"),
                        }
                        count = 0;
                    }
                },
                c if c.is_ascii_whitespace() || c == 0 => {},
                other => {
                    return DecodeOutcome::partial(
                        output,
                        format!("invalid character 0x{:02x}", other),
                    );
                },
            }
        }

        match count {
            0 => DecodeOutcome::complete(output),
            1 => DecodeOutcome::partial(output, "final group has a single character"),
            n => {
                // Pad with 'u' and keep n - 1 bytes
                for slot in group.iter_mut().skip(n) {
                    *slot = 84;
                }
                match group_value(&group) {
                    Some(v) => {
                        output.extend_from_slice(&v.to_be_bytes()[..n - 1]);
                        DecodeOutcome::complete(output)
                    },
                    None => DecodeOutcome::partial(output, "final group overflow"),
                }
            },
        }
    }

    fn encode(&self, input: &[u8], _params: &DecodeParams) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() * 5 / 4 + 2);

        for chunk in input.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            let mut value = u32::from_be_bytes(word);

            if chunk.len() == 4 && value == 0 {
                output.push(b'z');
                continue;
            }

            let mut digits = [0u8; 5];
            for digit in digits.iter_mut().rev() {
                *digit = (value % 85) as u8 + b'!';
                value /= 85;
            }
            output.extend_from_slice(&digits[..chunk.len() + 1]);
        }

        output.extend_from_slice(b"~>");
        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCII85Decode"
    }
}

fn group_value(group: &[u8; 5]) -> Option<u32> {
    group
        .iter()
        .try_fold(0u32, |acc, &d| acc.checked_mul(85)?.checked_add(d as u32))
}
