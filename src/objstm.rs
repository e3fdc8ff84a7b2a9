//! Object stream parsing.
//!
//! Object streams (`/Type /ObjStm`) compress several indirect objects into a
//! single stream:
//!
//! ```text
//! 7 0 obj
//! << /Type /ObjStm /N 3 /First 14 /Filter /FlateDecode >>
//! stream
//! 10 0 11 15 12 28     % (object number, offset relative to /First)
//! << /Type /Font >>    % object 10
//! [1 2 3]              % object 11
//! ...
//! endstream
//! ```
//!
//! Objects inside a stream always have generation 0 and are never streams
//! themselves.

use crate::error::{Error, Result};
use crate::lexer::{Token, token};
use crate::object::{Dictionary, Object};
use crate::parser::{ParseLimits, parse_object_with};
use crate::parser_config::ParserOptions;

/// Objects of one stream in index order: `(object number, object)`.
pub type ObjectStreamContents = Vec<(u32, Object)>;

/// Parse the decoded content of an object stream.
///
/// An entry that does not parse becomes null so indices stay aligned; in
/// strict mode it is an error instead.
pub fn parse_object_stream(
    dict: &Dictionary,
    decoded: &[u8],
    options: &ParserOptions,
) -> Result<ObjectStreamContents> {
    if let Some(kind) = dict.get("Type").and_then(Object::as_name) {
        if kind != "ObjStm" {
            return Err(Error::InvalidPdf(format!("expected /Type /ObjStm, got /Type /{}", kind)));
        }
    }

    let n = dict
        .get("N")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidPdf("object stream missing /N entry".to_string()))?;
    let first = dict
        .get("First")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidPdf("object stream missing /First entry".to_string()))?;

    let n = usize::try_from(n)
        .ok()
        .filter(|&n| n <= options.max_object_stream_entries)
        .ok_or_else(|| Error::InvalidPdf(format!("invalid object stream /N value: {}", n)))?;
    let first = usize::try_from(first)
        .ok()
        .filter(|&f| f <= decoded.len())
        .ok_or_else(|| {
            Error::InvalidPdf(format!(
                "object stream /First {} outside {} decoded bytes",
                first,
                decoded.len()
            ))
        })?;

    let pairs = parse_pairs(&decoded[..first], n)?;
    let body = &decoded[first..];
    let limits = ParseLimits::from(options);

    // Each object ends where the next one (by offset) starts
    let mut starts: Vec<usize> = pairs.iter().map(|&(_, off)| off).collect();
    starts.sort_unstable();
    starts.dedup();
    let end_of = |start: usize| -> usize {
        let next = starts.partition_point(|&s| s <= start);
        starts.get(next).copied().unwrap_or(body.len()).min(body.len())
    };

    let mut objects = Vec::with_capacity(pairs.len());
    for (id, offset) in pairs {
        if offset >= body.len() {
            if options.strict {
                return Err(Error::InvalidPdf(format!(
                    "object {} offset {} beyond stream data",
                    id, offset
                )));
            }
            log::warn!("Object {} offset {} is beyond stream data length {}", id, offset, body.len());
            objects.push((id, Object::Null));
            continue;
        }

        let slice = &body[offset..end_of(offset)];
        match parse_object_with(slice, &limits) {
            Ok((_, Object::Stream { .. })) => {
                log::warn!("Object {} in object stream is a stream, ignoring", id);
                objects.push((id, Object::Null));
            },
            Ok((_, object)) => objects.push((id, object)),
            Err(e) if options.strict => {
                return Err(Error::InvalidPdf(format!(
                    "object {} in object stream does not parse: {:?}",
                    id, e
                )));
            },
            Err(e) => {
                log::warn!("Failed to parse object {} from object stream: {:?}", id, e);
                objects.push((id, Object::Null));
            },
        }
    }

    Ok(objects)
}

/// Read the `count` header pairs.
fn parse_pairs(mut data: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count.min(4096));
    for i in 0..count {
        let mut next = || -> Option<i64> {
            let (rest, tok) = token(data).ok()?;
            data = rest;
            match tok {
                Token::Integer(v) => Some(v),
                _ => None,
            }
        };
        let (Some(id), Some(offset)) = (next(), next()) else {
            return Err(Error::InvalidPdf(format!(
                "object stream header has {} pairs, /N is {}",
                i, count
            )));
        };
        let (Ok(id), Ok(offset)) = (u32::try_from(id), usize::try_from(offset)) else {
            return Err(Error::InvalidPdf(format!("invalid object stream pair {}", i)));
        };
        pairs.push((id, offset));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DictBuilder;

    fn header(n: i64, first: usize) -> Dictionary {
        DictBuilder::new()
            .name("Type", "ObjStm")
            .insert("N", n)
            .insert("First", first as i64)
            .build()
    }

    #[test]
    fn test_parse_object_stream() {
        let data = b"10 0 11 18 << /Type /Font >> [1 2 3]";
        let objects = parse_object_stream(&header(2, 11), data, &ParserOptions::default()).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].0, 10);
        assert!(objects[0].1.is_type("Font"));
        assert_eq!(objects[1].0, 11);
        assert_eq!(objects[1].1.as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_entries_parse_within_their_own_span() {
        let data = b"1 0 2 2 5 6 0 R";
        let objects = parse_object_stream(&header(2, 8), data, &ParserOptions::default()).unwrap();
        assert_eq!(objects[0].1, Object::Integer(5));
        assert!(objects[1].1.as_reference().is_some());
    }

    #[test]
    fn test_pairs_out_of_offset_order() {
        let data = b"7 4 8 0 (a) 42 ";
        let objects = parse_object_stream(&header(2, 8), data, &ParserOptions::strict()).unwrap();
        assert_eq!(objects[0], (7, Object::Integer(42)));
        assert_eq!(objects[1], (8, Object::String(b"a".to_vec())));
    }

    #[test]
    fn test_many_entries() {
        let n = 20_000;
        let mut pairs = String::new();
        let mut body = String::new();
        for i in 0..n {
            pairs.push_str(&format!("{} {} ", i + 1, body.len()));
            body.push_str(&format!("{} ", i));
        }
        let data = format!("{}{}", pairs, body);
        let objects =
            parse_object_stream(&header(n, pairs.len()), data.as_bytes(), &ParserOptions::strict())
                .unwrap();
        assert_eq!(objects.len(), n as usize);
        assert_eq!(objects[12_345], (12_346, Object::Integer(12_345)));
    }

    #[test]
    fn test_bad_entry_becomes_null() {
        let data = b"1 0 2 4 ]]] (ok)";
        let objects = parse_object_stream(&header(2, 8), data, &ParserOptions::default()).unwrap();
        assert!(objects[0].1.is_null());
        assert_eq!(objects[1].1, Object::String(b"ok".to_vec()));
        assert!(parse_object_stream(&header(2, 8), data, &ParserOptions::strict()).is_err());
    }

    #[test]
    fn test_missing_pairs() {
        let data = b"1 0 ";
        assert!(parse_object_stream(&header(3, 4), data, &ParserOptions::default()).is_err());
    }

    #[test]
    fn test_first_beyond_data() {
        assert!(parse_object_stream(&header(1, 100), b"1 0 null", &ParserOptions::default()).is_err());
    }

    #[test]
    fn test_wrong_type() {
        let dict = DictBuilder::new()
            .name("Type", "XRef")
            .insert("N", 0i64)
            .insert("First", 0i64)
            .build();
        assert!(parse_object_stream(&dict, b"", &ParserOptions::default()).is_err());
    }
}
