//! RunLengthDecode.
//!
//! - Length byte 0-127: copy the next N+1 bytes literally
//! - Length byte 128: end of data
//! - Length byte 129-255: repeat the next byte 257-N times

use super::{DecodeOutcome, DecodeParams, StreamFilter};
use crate::error::Result;

/// RunLengthDecode filter.
pub struct RunLengthFilter;

const EOD: u8 = 128;
const MAX_RUN: usize = 128;

impl StreamFilter for RunLengthFilter {
    fn decode(&self, input: &[u8], _params: &DecodeParams) -> DecodeOutcome {
        let mut output = Vec::new();
        let mut i = 0;

        while i < input.len() {
            let length = input[i];
            i += 1;

            match length {
                0..=127 => {
                    let count = length as usize + 1;
                    let available = input.len() - i;
                    if available < count {
                        output.extend_from_slice(&input[i..]);
                        return DecodeOutcome::partial(
                            output,
                            format!("literal run needs {} bytes, {} left", count, available),
                        );
                    }
                    output.extend_from_slice(&input[i..i + count]);
                    i += count;
                },
                EOD => break,
                129..=255 => {
                    let Some(&byte) = input.get(i) else {
                        return DecodeOutcome::partial(output, "missing byte for repeat run");
                    };
                    i += 1;
                    output.resize(output.len() + (257 - length as usize), byte);
                },
            }
        }

        DecodeOutcome::complete(output)
    }

    fn encode(&self, input: &[u8], _params: &DecodeParams) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len() + input.len() / MAX_RUN + 2);
        let mut literal_start = 0;
        let mut i = 0;

        while i < input.len() {
            let byte = input[i];
            let mut run = 1;
            while i + run < input.len() && input[i + run] == byte && run < MAX_RUN {
                run += 1;
            }

            if run >= 2 {
                flush_literals(&mut output, &input[literal_start..i]);
                output.push((257 - run) as u8);
                output.push(byte);
                i += run;
                literal_start = i;
            } else {
                i += 1;
                if i - literal_start == MAX_RUN {
                    flush_literals(&mut output, &input[literal_start..i]);
                    literal_start = i;
                }
            }
        }

        flush_literals(&mut output, &input[literal_start..]);
        output.push(EOD);
        Ok(output)
    }

    fn name(&self) -> &str {
        "RunLengthDecode"
    }
}

fn flush_literals(output: &mut Vec<u8>, literals: &[u8]) {
    for chunk in literals.chunks(MAX_RUN) {
        output.push((chunk.len() - 1) as u8);
        output.extend_from_slice(chunk);
    }
}
