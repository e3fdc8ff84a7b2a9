//! Stream filter codecs.
//!
//! Every filter in the closed registry ([`Filter`]) provides a pure,
//! stateless `decode` and `encode`:
//! - FlateDecode (zlib/deflate)
//! - LZWDecode
//! - ASCIIHexDecode
//! - ASCII85Decode
//! - RunLengthDecode
//! - DCTDecode, JPXDecode, CCITTFaxDecode, JBIG2Decode, Crypt (pass-through)
//!
//! A stream's content is its raw bytes run through its `/Filter` list in
//! order; encoding applies the list in reverse. Decoding never fails
//! outright on malformed input: it returns the longest prefix it could
//! decode together with an error flag, so callers can salvage partial content.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser_config::ParserOptions;

mod ascii85;
mod ascii_hex;
mod flate;
mod lzw;
mod passthrough;
mod predictor;
mod runlength;

pub use ascii_hex::AsciiHexFilter;
pub use ascii85::Ascii85Filter;
pub use flate::FlateFilter;
pub use lzw::LzwFilter;
pub use passthrough::PassthroughFilter;
pub use predictor::{DecodeParams, decode_predictor, encode_predictor};
pub use runlength::RunLengthFilter;

/// Output of a single decode: the bytes produced and, if decoding stopped
/// early, why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutcome {
    /// Decoded bytes (a prefix of the full content when `error` is set)
    pub data: Vec<u8>,
    /// Reason decoding stopped early
    pub error: Option<String>,
}

impl DecodeOutcome {
    /// Fully decoded output.
    pub fn complete(data: Vec<u8>) -> Self {
        Self { data, error: None }
    }

    /// Output cut short by malformed input.
    pub fn partial(data: Vec<u8>, reason: impl Into<String>) -> Self {
        Self {
            data,
            error: Some(reason.into()),
        }
    }

    /// True when no error was flagged.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// A stream filter codec.
pub trait StreamFilter: Send + Sync {
    /// Decode `input`. Never fails; malformed input yields a partial outcome.
    fn decode(&self, input: &[u8], params: &DecodeParams) -> DecodeOutcome;

    /// Encode `input` so that `decode` restores it.
    fn encode(&self, input: &[u8], params: &DecodeParams) -> Result<Vec<u8>>;

    /// Registry name (e.g. "FlateDecode").
    fn name(&self) -> &str;
}

/// Decrypts raw stream bytes before they enter the filter chain.
///
/// Key derivation lives outside this crate; a document only needs something
/// that maps encrypted bytes of object `id` to plaintext.
pub trait SecurityHandler: Send + Sync {
    /// Decrypt the raw bytes of stream object `id`.
    fn decrypt_stream(&self, id: ObjectRef, data: &[u8]) -> Result<Vec<u8>>;
}

/// Filters in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Filter {
    /// FlateDecode (zlib/deflate)
    FlateDecode,
    /// LZWDecode
    LZWDecode,
    /// ASCIIHexDecode
    ASCIIHexDecode,
    /// ASCII85Decode
    ASCII85Decode,
    /// RunLengthDecode
    RunLengthDecode,
    /// DCTDecode (JPEG, pass-through)
    DCTDecode,
    /// JPXDecode (JPEG 2000, pass-through)
    JPXDecode,
    /// CCITTFaxDecode (pass-through)
    CCITTFaxDecode,
    /// JBIG2Decode (pass-through)
    JBIG2Decode,
    /// Crypt (identity; decryption is done by a [`SecurityHandler`])
    Crypt,
}

static FLATE: FlateFilter = FlateFilter;
static LZW: LzwFilter = LzwFilter;
static ASCII_HEX: AsciiHexFilter = AsciiHexFilter;
static ASCII_85: Ascii85Filter = Ascii85Filter;
static RUN_LENGTH: RunLengthFilter = RunLengthFilter;
static DCT: PassthroughFilter = PassthroughFilter::new("DCTDecode");
static JPX: PassthroughFilter = PassthroughFilter::new("JPXDecode");
static CCITT: PassthroughFilter = PassthroughFilter::new("CCITTFaxDecode");
static JBIG2: PassthroughFilter = PassthroughFilter::new("JBIG2Decode");
static CRYPT: PassthroughFilter = PassthroughFilter::new("Crypt");

impl Filter {
    /// Every registered filter.
    pub const ALL: [Filter; 10] = [
        Filter::FlateDecode,
        Filter::LZWDecode,
        Filter::ASCIIHexDecode,
        Filter::ASCII85Decode,
        Filter::RunLengthDecode,
        Filter::DCTDecode,
        Filter::JPXDecode,
        Filter::CCITTFaxDecode,
        Filter::JBIG2Decode,
        Filter::Crypt,
    ];

    /// Look up a filter by its full or abbreviated name.
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "FlateDecode" | "Fl" => Filter::FlateDecode,
            "LZWDecode" | "LZW" => Filter::LZWDecode,
            "ASCIIHexDecode" | "AHx" => Filter::ASCIIHexDecode,
            "ASCII85Decode" | "A85" => Filter::ASCII85Decode,
            "RunLengthDecode" | "RL" => Filter::RunLengthDecode,
            "DCTDecode" | "DCT" => Filter::DCTDecode,
            "JPXDecode" => Filter::JPXDecode,
            "CCITTFaxDecode" | "CCF" => Filter::CCITTFaxDecode,
            "JBIG2Decode" => Filter::JBIG2Decode,
            "Crypt" => Filter::Crypt,
            other => return Err(Error::UnsupportedFilter(other.to_string())),
        })
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Filter::FlateDecode => "FlateDecode",
            Filter::LZWDecode => "LZWDecode",
            Filter::ASCIIHexDecode => "ASCIIHexDecode",
            Filter::ASCII85Decode => "ASCII85Decode",
            Filter::RunLengthDecode => "RunLengthDecode",
            Filter::DCTDecode => "DCTDecode",
            Filter::JPXDecode => "JPXDecode",
            Filter::CCITTFaxDecode => "CCITTFaxDecode",
            Filter::JBIG2Decode => "JBIG2Decode",
            Filter::Crypt => "Crypt",
        }
    }

    /// Whether decoding returns the payload unchanged.
    pub fn is_passthrough(self) -> bool {
        matches!(
            self,
            Filter::DCTDecode
                | Filter::JPXDecode
                | Filter::CCITTFaxDecode
                | Filter::JBIG2Decode
                | Filter::Crypt
        )
    }

    fn uses_predictor(self) -> bool {
        matches!(self, Filter::FlateDecode | Filter::LZWDecode)
    }

    /// The codec implementing this filter.
    pub fn codec(self) -> &'static dyn StreamFilter {
        match self {
            Filter::FlateDecode => &FLATE,
            Filter::LZWDecode => &LZW,
            Filter::ASCIIHexDecode => &ASCII_HEX,
            Filter::ASCII85Decode => &ASCII_85,
            Filter::RunLengthDecode => &RUN_LENGTH,
            Filter::DCTDecode => &DCT,
            Filter::JPXDecode => &JPX,
            Filter::CCITTFaxDecode => &CCITT,
            Filter::JBIG2Decode => &JBIG2,
            Filter::Crypt => &CRYPT,
        }
    }
}

/// One entry of a stream's filter list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterStage {
    /// The filter
    pub filter: Filter,
    /// Its `/DecodeParms`
    pub params: DecodeParams,
}

impl FilterStage {
    /// Stage with default parameters.
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            params: DecodeParams::default(),
        }
    }

    /// Stage with explicit parameters.
    pub fn with_params(filter: Filter, params: DecodeParams) -> Self {
        Self { filter, params }
    }

    /// Decode through this stage, undoing any predictor afterwards.
    pub fn decode(&self, input: &[u8]) -> DecodeOutcome {
        let outcome = self.filter.codec().decode(input, &self.params);
        if !(self.filter.uses_predictor() && self.params.has_predictor()) {
            return outcome;
        }
        let predicted = decode_predictor(&outcome.data, &self.params);
        DecodeOutcome {
            data: predicted.data,
            error: outcome.error.or(predicted.error),
        }
    }

    /// Encode through this stage, applying any predictor first.
    pub fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        if self.filter.uses_predictor() && self.params.has_predictor() {
            let predicted = encode_predictor(input, &self.params)?;
            self.filter.codec().encode(&predicted, &self.params)
        } else {
            self.filter.codec().encode(input, &self.params)
        }
    }
}

/// Decompression-bomb limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum output:input ratio (0 disables the check)
    pub max_ratio: u32,
    /// Maximum output size in bytes (0 disables the check)
    pub max_size: usize,
}

/// Outputs below this size are never treated as bombs, whatever the ratio.
const RATIO_CHECK_FLOOR: usize = 1024 * 1024;

impl Default for DecodeLimits {
    fn default() -> Self {
        Self::from(&ParserOptions::default())
    }
}

impl From<&ParserOptions> for DecodeLimits {
    fn from(options: &ParserOptions) -> Self {
        Self {
            max_ratio: options.max_decompression_ratio,
            max_size: options.max_decompressed_size,
        }
    }
}

impl DecodeLimits {
    /// No limits at all.
    pub fn unlimited() -> Self {
        Self {
            max_ratio: 0,
            max_size: 0,
        }
    }

    fn violation(&self, input_len: usize, output_len: usize) -> Option<String> {
        if self.max_size > 0 && output_len > self.max_size {
            return Some(format!(
                "decoded size {} exceeds limit {}",
                output_len, self.max_size
            ));
        }
        if self.max_ratio > 0 && output_len > RATIO_CHECK_FLOOR {
            let ratio = output_len as u64 / input_len.max(1) as u64;
            if ratio > self.max_ratio as u64 {
                return Some(format!(
                    "decompression ratio {}:1 exceeds limit {}:1",
                    ratio, self.max_ratio
                ));
            }
        }
        None
    }
}

/// Result of running a whole filter chain.
///
/// `data` is always meaningful. When `error` is set it is an
/// [`Error::FilterDecode`] whose `decoded_len` equals `data.len()`.
#[derive(Debug)]
pub struct Decoded {
    /// Decoded content, possibly a prefix
    pub data: Vec<u8>,
    /// Set when some stage stopped early
    pub error: Option<Error>,
}

impl Decoded {
    /// True when every stage decoded fully.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// The content, or the decode error for callers that cannot use a prefix.
    pub fn into_result(self) -> Result<Vec<u8>> {
        match self.error {
            None => Ok(self.data),
            Some(err) => Err(err),
        }
    }
}

/// Read the filter list and parameters from a stream dictionary.
///
/// `/Filter` may be a name or an array; `/DecodeParms` a dictionary, an array
/// aligned with the filters, or absent.
pub fn stream_stages(dict: &Dictionary) -> Result<Vec<FilterStage>> {
    let names: Vec<&str> = match dict.get("Filter") {
        None | Some(Object::Null) => return Ok(Vec::new()),
        Some(Object::Name(name)) => vec![name.as_str()],
        Some(Object::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_name().ok_or_else(|| Error::InvalidObjectType {
                    expected: "Name".to_string(),
                    found: item.type_name().to_string(),
                })
            })
            .collect::<Result<_>>()?,
        Some(other) => {
            return Err(Error::InvalidObjectType {
                expected: "Name or Array".to_string(),
                found: other.type_name().to_string(),
            });
        },
    };

    let params_at = |index: usize| -> DecodeParams {
        let entry = match dict.get("DecodeParms") {
            Some(Object::Array(items)) => items.get(index),
            Some(other) if index == 0 => Some(other),
            _ => None,
        };
        entry
            .and_then(Object::as_dict)
            .map(DecodeParams::from_dict)
            .unwrap_or_default()
    };

    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| Ok(FilterStage::with_params(Filter::from_name(name)?, params_at(i))))
        .collect()
}

/// Decode `data` through `stages` in order.
///
/// When a stage stops early its partial output still flows through the
/// remaining stages, so the result is the longest recoverable prefix of the
/// content. Exceeding `limits` truncates the output and flags an error.
pub fn decode_chain(data: &[u8], stages: &[FilterStage], limits: &DecodeLimits) -> Decoded {
    let mut current = data.to_vec();
    let mut failure: Option<(&'static str, String)> = None;

    for stage in stages {
        let outcome = stage.decode(&current);
        if let Some(reason) = outcome.error {
            log::warn!(
                "{} stopped early after {} bytes: {}",
                stage.filter.name(),
                outcome.data.len(),
                reason
            );
            failure.get_or_insert((stage.filter.name(), reason));
        }
        current = outcome.data;

        if let Some(reason) = limits.violation(data.len(), current.len()) {
            log::warn!("{}: {}", stage.filter.name(), reason);
            if limits.max_size > 0 {
                current.truncate(limits.max_size);
            }
            failure.get_or_insert((stage.filter.name(), reason));
            break;
        }
    }

    let error = failure.map(|(filter, reason)| Error::FilterDecode {
        filter: filter.to_string(),
        decoded_len: current.len(),
        reason,
    });
    Decoded {
        data: current,
        error,
    }
}

/// Encode `data` so that `decode_chain` with the same stages restores it.
pub fn encode_chain(data: &[u8], stages: &[FilterStage]) -> Result<Vec<u8>> {
    stages
        .iter()
        .rev()
        .try_fold(data.to_vec(), |current, stage| stage.encode(&current))
}
