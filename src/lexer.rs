//! PDF lexer (tokenizer).
//!
//! Low-level tokenization of PDF byte streams with nom.
//!
//! # Syntax Overview
//!
//! - Numbers: integers (42, -123) and reals (3.14, -2.5, .5)
//! - Strings: literal ((Hello)) and hexadecimal (<48656C6C6F>)
//! - Names: identifiers starting with / (/Type, /Pages)
//! - Keywords: true, false, null, obj, endobj, stream, endstream, R
//! - Delimiters: `[`, `]`, `<<`, `>>`
//!
//! Whitespace (space, \t, \r, \n, \0, \f) and comments (% to EOL) are skipped.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, value},
    multi::many0,
    sequence::{delimited, preceded},
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),

    /// Real (floating-point) number (e.g., 3.14, -2.5, .5)
    Real(f64),

    /// Literal string bytes, escapes still encoded
    LiteralString(&'a [u8]),

    /// Hexadecimal string digits, whitespace included
    HexString(&'a [u8]),

    /// Name with `#XX` escapes decoded
    Name(String),

    /// Boolean true keyword
    True,

    /// Boolean false keyword
    False,

    /// Null keyword
    Null,

    /// Array start delimiter [
    ArrayStart,

    /// Array end delimiter ]
    ArrayEnd,

    /// Dictionary start delimiter <<
    DictStart,

    /// Dictionary end delimiter >>
    DictEnd,

    /// Indirect object start keyword "obj"
    ObjStart,

    /// Indirect object end keyword "endobj"
    ObjEnd,

    /// Stream start keyword "stream"
    StreamStart,

    /// Stream end keyword "endstream"
    StreamEnd,

    /// Reference keyword "R" (used in "10 0 R")
    R,
}

/// PDF whitespace: space, tab, CR, LF, NUL, form feed.
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters.
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}')
}

fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn nom_error(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    let (remaining, ws) = take_while(is_whitespace)(input)?;
    if ws.is_empty() {
        return Err(nom_error(input, nom::error::ErrorKind::Space));
    }
    Ok((remaining, ()))
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments.
pub fn skip_ws(input: &[u8]) -> &[u8] {
    let mut remaining = input;
    loop {
        if let Ok((rest, _)) = whitespace(remaining) {
            remaining = rest;
        } else if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
        } else {
            return remaining;
        }
    }
}

fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let start = input;
    let (input, _sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    if int_part.is_none() && frac_part.is_none() {
        return Err(nom_error(input, nom::error::ErrorKind::Digit));
    }

    let text = &start[..start.len() - input.len()];
    // Digits, sign and '.' are ASCII
    let text = std::str::from_utf8(text).map_err(|_| nom_error(start, nom::error::ErrorKind::Digit))?;
    let text = text.strip_prefix('+').unwrap_or(text);

    if frac_part.is_some() {
        let mut normalized = String::with_capacity(text.len() + 2);
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        if negative {
            normalized.push('-');
        }
        if body.starts_with('.') {
            normalized.push('0');
        }
        normalized.push_str(body);
        if body.ends_with('.') {
            normalized.push('0');
        }
        let num: f64 = normalized
            .parse()
            .map_err(|_| nom_error(start, nom::error::ErrorKind::Float))?;
        Ok((input, Token::Real(num)))
    } else {
        match text.parse::<i64>() {
            Ok(num) => Ok((input, Token::Integer(num))),
            // Out-of-range integers degrade to reals
            Err(_) => text
                .parse::<f64>()
                .map(|num| (input, Token::Real(num)))
                .map_err(|_| nom_error(start, nom::error::ErrorKind::Digit)),
        }
    }
}

/// Parse a literal string enclosed in balanced parentheses.
///
/// Returns the raw bytes between the outer parentheses; escape sequences
/// are decoded by the parser.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (remaining, _) = char('(')(input)?;
    let mut depth = 1;
    let mut pos = 0;

    while depth > 0 && pos < remaining.len() {
        match remaining[pos] {
            // The escaped byte can never open or close a level
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    if depth != 0 {
        return Err(nom_error(input, nom::error::ErrorKind::Tag));
    }

    Ok((&remaining[pos..], Token::LiteralString(&remaining[..pos - 1])))
}

fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom_error(input, nom::error::ErrorKind::Tag));
    }

    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#XX` escape sequences in a raw name.
///
/// Invalid sequences are kept literally. The decoded bytes are interpreted as
/// UTF-8, lossily.
///
/// ```
/// # use pdf_graft::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes(b"Type"), "Type");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' {
            if let (Some(h), Some(l)) = (
                raw.get(i + 1).and_then(|c| hex_value(*c)),
                raw.get(i + 2).and_then(|c| hex_value(*c)),
            ) {
                bytes.push(h << 4 | l);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Value of one hex digit.
pub fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(char('/'), map(take_while(is_regular), |raw| Token::Name(decode_name_escapes(raw))))(
        input,
    )
}

/// An alphabetic keyword must not run into further regular characters.
fn keyword<'a>(
    word: &'static [u8],
    token: Token<'static>,
) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], Token<'a>> {
    move |input: &'a [u8]| {
        let (rest, _) = tag(word)(input)?;
        match rest.first() {
            Some(&c) if is_regular(c) => Err(nom_error(input, nom::error::ErrorKind::Tag)),
            _ => Ok((rest, token.clone())),
        }
    }
}

fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        keyword(b"false", Token::False),
        keyword(b"true", Token::True),
        keyword(b"null", Token::Null),
        keyword(b"obj", Token::ObjStart),
        keyword(b"endobj", Token::ObjEnd),
        keyword(b"endstream", Token::StreamEnd),
        keyword(b"stream", Token::StreamStart),
        keyword(b"R", Token::R),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
    ))(input)
}

/// Parse a single PDF token after skipping whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let input = skip_ws(input);
    alt((parse_keyword, parse_name, parse_number, parse_literal_string, parse_hex_string))(input)
}

/// Parse tokens until the input is exhausted or unrecognized.
pub fn tokens(input: &[u8]) -> IResult<&[u8], Vec<Token<'_>>> {
    many0(token)(input)
}
