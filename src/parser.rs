//! PDF object parser.
//!
//! Recursive descent over lexer tokens:
//! 1. Read token from lexer
//! 2. Based on token type, decide how to parse
//! 3. For composite types (arrays, dicts), recursively parse contents
//!
//! All parsing functions return `IResult` from nom; [`to_error`] turns a
//! nom error into a located [`Error`].

use crate::error::Error;
use crate::lexer::{Token, hex_value, skip_ws, token};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser_config::ParserOptions;
use nom::IResult;
use nom::error::ErrorKind;

/// Default nesting limit for arrays and dictionaries.
pub const DEFAULT_MAX_NESTING: u32 = 100;

/// Parser settings carried through a recursive parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Maximum array/dictionary nesting
    pub max_nesting: u32,
    /// Reject streams whose direct `/Length` does not end at `endstream`
    pub strict: bool,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_nesting: DEFAULT_MAX_NESTING,
            strict: false,
        }
    }
}

impl From<&ParserOptions> for ParseLimits {
    fn from(options: &ParserOptions) -> Self {
        Self {
            max_nesting: u32::try_from(options.max_nesting).unwrap_or(u32::MAX),
            strict: options.strict,
        }
    }
}

fn fail(input: &[u8], kind: ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Convert a nom error into an [`Error`] located relative to `full`.
///
/// `base` is the absolute offset of `full` within the document.
pub fn to_error(
    base: usize,
    full: &[u8],
    err: nom::Err<nom::error::Error<&[u8]>>,
    limits: &ParseLimits,
) -> Error {
    match err {
        nom::Err::Incomplete(_) => Error::UnexpectedEof,
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            if e.code == ErrorKind::TooLarge {
                return Error::RecursionLimitExceeded(limits.max_nesting);
            }
            let offset = base + full.len().saturating_sub(e.input.len());
            if e.input.is_empty() {
                Error::parse(offset, "unexpected end of data")
            } else {
                Error::parse(offset, format!("unexpected input ({:?})", e.code))
            }
        },
    }
}

/// Decode escape sequences in PDF literal strings.
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd` (1-3 digits) and line
/// continuations. Unknown escapes drop the backslash.
///
/// ```
/// # use pdf_graft::parser::decode_literal_string_escapes;
/// let decoded = decode_literal_string_escapes(b"Section \\247 71.01");
/// assert_eq!(decoded, b"Section \xa7 71.01");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' {
            // A bare EOL inside a string reads as LF
            if raw[i] == b'\r' {
                result.push(b'\n');
                i += if raw.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
            } else {
                result.push(raw[i]);
                i += 1;
            }
            continue;
        }

        let Some(&next) = raw.get(i + 1) else {
            break;
        };
        i += 2;
        match next {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(8),
            b'f' => result.push(12),
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut octal = (next - b'0') as u32;
                for _ in 0..2 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            octal = octal * 8 + (d - b'0') as u32;
                            i += 1;
                        },
                        _ => break,
                    }
                }
                result.push((octal & 0xFF) as u8);
            },
            other => result.push(other),
        }
    }

    result
}

/// Decode a hex string body to bytes.
///
/// Whitespace is ignored and an odd final digit is padded with 0. Non-hex
/// characters are skipped (the lexer never produces them).
///
/// ```
/// use pdf_graft::parser::decode_hex;
/// assert_eq!(decode_hex(b"48656C6C6F"), b"Hello");
/// assert_eq!(decode_hex(b"7"), vec![0x70]);
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = hex_bytes.iter().filter_map(|&c| hex_value(c)).collect();
    digits
        .chunks(2)
        .map(|pair| pair[0] << 4 | pair.get(1).copied().unwrap_or(0))
        .collect()
}

/// Parse a PDF object with default limits.
///
/// ```
/// use pdf_graft::parser::parse_object;
///
/// let (_, obj) = parse_object(b"[ 1 2 /Name ]").unwrap();
/// assert_eq!(obj.as_array().map(Vec::len), Some(3));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    parse_object_with(input, &ParseLimits::default())
}

/// Parse a PDF object.
pub fn parse_object_with<'a>(input: &'a [u8], limits: &ParseLimits) -> IResult<&'a [u8], Object> {
    parse_value(input, limits, 0)
}

fn parse_value<'a>(input: &'a [u8], limits: &ParseLimits, depth: u32) -> IResult<&'a [u8], Object> {
    let (rest, tok) = token(input)?;

    match tok {
        Token::Null => Ok((rest, Object::Null)),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),

        Token::Integer(i) => {
            // Either a plain integer or the start of "id gen R"
            if let Ok((after_gen, Token::Integer(gen))) = token(rest) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if let (Ok(id), Ok(gen)) = (u32::try_from(i), u16::try_from(gen)) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(id, gen))));
                    }
                }
            }
            Ok((rest, Object::Integer(i)))
        },

        Token::Real(r) => Ok((rest, Object::Real(r))),
        Token::LiteralString(raw) => Ok((rest, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(hex) => Ok((rest, Object::String(decode_hex(hex)))),
        Token::Name(name) => Ok((rest, Object::Name(name))),

        Token::ArrayStart => {
            if depth >= limits.max_nesting {
                return Err(nom::Err::Failure(nom::error::Error::new(input, ErrorKind::TooLarge)));
            }
            parse_array(rest, limits, depth + 1)
        },

        Token::DictStart => {
            if depth >= limits.max_nesting {
                return Err(nom::Err::Failure(nom::error::Error::new(input, ErrorKind::TooLarge)));
            }
            let (remaining, dict) = parse_dictionary(rest, limits, depth + 1)?;

            if let Ok((stream_input, Token::StreamStart)) = token(remaining) {
                let (final_input, data) = parse_stream_data(stream_input, &dict, limits)?;
                return Ok((
                    final_input,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::from(data),
                    },
                ));
            }

            Ok((remaining, Object::Dictionary(dict)))
        },

        _ => Err(fail(input, ErrorKind::Tag)),
    }
}

/// Parse stream data after the `stream` keyword.
///
/// A direct integer `/Length` is trusted when `endstream` follows it. Otherwise
/// (indirect or missing length, or a length that overshoots) the data runs to
/// the next `endstream`, minus the EOL before it. In strict mode a direct
/// length that does not land on `endstream` is an error.
fn parse_stream_data<'a>(
    input: &'a [u8],
    dict: &Dictionary,
    limits: &ParseLimits,
) -> IResult<&'a [u8], Vec<u8>> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        log::debug!("No EOL after stream keyword");
        input
    };

    if let Some(length) = dict.get("Length").and_then(Object::as_integer) {
        let fits = usize::try_from(length)
            .ok()
            .filter(|&len| len <= input.len())
            .filter(|&len| matches!(token(&input[len..]), Ok((_, Token::StreamEnd))));
        match fits {
            Some(len) => {
                let (remaining, _) = token(&input[len..])?;
                return Ok((remaining, input[..len].to_vec()));
            },
            None if limits.strict => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    ErrorKind::LengthValue,
                )));
            },
            None => log::warn!("Stream /Length {} does not end at endstream, scanning", length),
        }
    }

    let Some(pos) = find_endstream(input) else {
        return Err(fail(input, ErrorKind::Eof));
    };
    let mut data = &input[..pos];
    if data.ends_with(b"\r\n") {
        data = &data[..data.len() - 2];
    } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
        data = &data[..data.len() - 1];
    }
    let (remaining, _) = token(&input[pos..])?;
    Ok((remaining, data.to_vec()))
}

/// Position of the first `endstream` keyword.
pub fn find_endstream(input: &[u8]) -> Option<usize> {
    find_bytes(input, b"endstream")
}

/// Position of the first occurrence of `needle`.
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn parse_array<'a>(input: &'a [u8], limits: &ParseLimits, depth: u32) -> IResult<&'a [u8], Object> {
    let mut objects = Vec::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((rest, Token::ArrayEnd)) => return Ok((rest, Object::Array(objects))),
            Ok(_) => {
                let (rest, obj) = parse_value(remaining, limits, depth)?;
                objects.push(obj);
                remaining = rest;
            },
            // Unclosed array at end of data
            Err(nom::Err::Error(_)) if skip_ws(remaining).is_empty() => {
                return Err(fail(skip_ws(remaining), ErrorKind::Eof));
            },
            Err(e) => return Err(e),
        }
    }
}

fn parse_dictionary<'a>(
    input: &'a [u8],
    limits: &ParseLimits,
    depth: u32,
) -> IResult<&'a [u8], Dictionary> {
    let mut dict = Dictionary::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((rest, Token::DictEnd)) => return Ok((rest, dict)),
            Ok((rest, Token::Name(key))) => {
                // "/Key >>" reads as a null value
                if let Ok((after, Token::DictEnd)) = token(rest) {
                    dict.insert(key, Object::Null);
                    return Ok((after, dict));
                }
                match parse_value(rest, limits, depth) {
                    Ok((rest, value)) => {
                        dict.insert(key, value);
                        remaining = rest;
                    },
                    Err(nom::Err::Error(_)) if skip_ws(rest).is_empty() => {
                        return Err(fail(skip_ws(rest), ErrorKind::Eof));
                    },
                    Err(e) => return Err(e),
                }
            },
            Ok(_) => return Err(fail(skip_ws(remaining), ErrorKind::Tag)),
            // Unclosed dictionary at end of data
            Err(nom::Err::Error(_)) if skip_ws(remaining).is_empty() => {
                return Err(fail(skip_ws(remaining), ErrorKind::Eof));
            },
            Err(e) => return Err(e),
        }
    }
}

/// Parse an indirect object header `id gen obj`.
pub fn parse_object_header(input: &[u8]) -> IResult<&[u8], ObjectRef> {
    let (rest, id) = token(input)?;
    let (rest, gen) = token(rest)?;
    let (rest, kw) = token(rest)?;
    match (id, gen, kw) {
        (Token::Integer(id), Token::Integer(gen), Token::ObjStart) => {
            match (u32::try_from(id), u16::try_from(gen)) {
                (Ok(id), Ok(gen)) => Ok((rest, ObjectRef::new(id, gen))),
                _ => Err(fail(input, ErrorKind::Digit)),
            }
        },
        _ => Err(fail(input, ErrorKind::Tag)),
    }
}

/// Parse `id gen obj <object> endobj`.
///
/// A missing `endobj` is tolerated: the object ends where its value ends.
pub fn parse_indirect_object<'a>(
    input: &'a [u8],
    limits: &ParseLimits,
) -> IResult<&'a [u8], (ObjectRef, Object)> {
    let (rest, id) = parse_object_header(input)?;
    let (rest, object) = match token(rest) {
        // "1 0 obj endobj" holds null
        Ok((after, Token::ObjEnd)) => return Ok((after, (id, Object::Null))),
        _ => parse_value(rest, limits, 0)?,
    };
    match token(rest) {
        Ok((after, Token::ObjEnd)) => Ok((after, (id, object))),
        _ => {
            log::debug!("Object {} has no endobj", id);
            Ok((rest, (id, object)))
        },
    }
}

/// Whether `input` starts (after whitespace) with an `id gen obj` header.
pub fn looks_like_object_header(input: &[u8]) -> bool {
    parse_object_header(input).is_ok()
}
