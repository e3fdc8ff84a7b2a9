//! Opaque image codecs.
//!
//! DCT (JPEG), JPX (JPEG 2000), CCITT fax and JBIG2 payloads are handed to
//! consumers exactly as stored: pixel decoding is not this crate's concern.
//! The identity Crypt filter uses the same pass-through behaviour; real
//! decryption happens before the chain through a
//! [`SecurityHandler`](super::SecurityHandler).

use super::{DecodeOutcome, DecodeParams, StreamFilter};
use crate::error::Result;

/// Filter whose decoded form is its raw payload.
pub struct PassthroughFilter {
    name: &'static str,
}

impl PassthroughFilter {
    /// Pass-through filter reporting `name`.
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl StreamFilter for PassthroughFilter {
    fn decode(&self, input: &[u8], _params: &DecodeParams) -> DecodeOutcome {
        DecodeOutcome::complete(input.to_vec())
    }

    fn encode(&self, input: &[u8], _params: &DecodeParams) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn name(&self) -> &str {
        self.name
    }
}
