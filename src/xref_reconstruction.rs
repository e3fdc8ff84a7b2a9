//! Cross-reference reconstruction for damaged files.
//!
//! When the trailing `startxref` pointer is missing or points at garbage (or
//! when recovery is forced), the whole store is scanned for `N G obj`
//! headers and one synthetic generation is built from every match. A later
//! header for the same object number replaces an earlier one, which matches
//! how incremental writers append new versions.
//!
//! The trailer comes from the last `trailer` keyword, else from the last
//! cross-reference stream dictionary, else it is rebuilt around the last
//! object typed `/Catalog`. Reconstruction never fails on bad structure; the
//! worst case is an empty section with an empty trailer.

use crate::decoders::DecodeLimits;
use crate::error::Result;
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::{ParseLimits, parse_indirect_object, parse_object_with};
use crate::parser_config::ParserOptions;
use crate::store::BackingStore;
use crate::xref::{SectionKind, XRefEntry, XRefSection, read_tail};
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::collections::BTreeMap;

lazy_static! {
    /// "N G obj" object headers
    static ref RE_OBJ_PATTERN: Regex =
        Regex::new(r"(\d+)\s+(\d+)\s+obj").unwrap();

    /// "trailer <<"
    static ref RE_TRAILER: Regex =
        Regex::new(r"trailer\s*<<").unwrap();

    static ref RE_CATALOG: Regex =
        Regex::new(r"/Type\s*/Catalog\b").unwrap();

    static ref RE_XREF_STREAM: Regex =
        Regex::new(r"/Type\s*/XRef\b").unwrap();

    static ref RE_OBJECT_STREAM: Regex =
        Regex::new(r"/Type\s*/ObjStm\b").unwrap();
}

/// One validated object header found by the scan.
#[derive(Debug, Clone, Copy)]
struct Header {
    offset: u64,
    id: ObjectRef,
}

/// Rebuild a cross-reference section by scanning the whole store.
///
/// Only I/O failures are returned as errors.
pub fn reconstruct_xref(
    store: &mut dyn BackingStore,
    options: &ParserOptions,
) -> Result<XRefSection> {
    log::info!("Reconstructing cross-reference table by scanning {} bytes", store.len());
    let contents = read_tail(store, 0)?;
    let limits = ParseLimits::from(options);

    let headers = scan_headers(&contents);
    let mut section = XRefSection::new(SectionKind::Recovered, None);
    for header in &headers {
        section.insert(
            header.id.id,
            XRefEntry::Offset {
                offset: header.offset,
                generation: header.id.gen,
            },
        );
    }
    let current: Vec<Header> = headers
        .iter()
        .copied()
        .filter(|h| is_current(&section, h))
        .collect();

    let compressed = enumerate_object_streams(&contents, &current, &mut section, options);

    let mut trailer = find_trailer(&contents, &current, &limits).unwrap_or_default();
    if !root_resolves(&contents, &section, &trailer, &limits) {
        match find_catalog(&contents, &current, &compressed, &limits) {
            Some(root) => {
                log::info!("Using {} as document catalog", root);
                trailer.insert("Root".to_string(), Object::Reference(root));
            },
            None => {
                log::warn!("No document catalog found during reconstruction");
                trailer.shift_remove("Root");
            },
        }
    }

    let size = section.entries.keys().next_back().map_or(0, |&max| max as i64 + 1);
    trailer.insert("Size".to_string(), Object::Integer(size));
    trailer.retain(|key, _| crate::xref::TRAILER_KEYS.contains(&key.as_str()));
    section.trailer = trailer;

    log::info!(
        "Reconstructed {} objects ({} in object streams)",
        section.entries.len(),
        compressed.len()
    );
    Ok(section)
}

/// Every plausible "N G obj" header, in file order.
fn scan_headers(contents: &[u8]) -> Vec<Header> {
    let mut headers = Vec::new();
    for capture in RE_OBJ_PATTERN.captures_iter(contents) {
        let (Some(full), Some(id), Some(gen)) = (capture.get(0), capture.get(1), capture.get(2))
        else {
            continue;
        };
        // "123 0 obj" must not be the tail of a longer token
        if full.start() > 0 && contents[full.start() - 1].is_ascii_alphanumeric() {
            continue;
        }
        let number = |m: regex::bytes::Match<'_>| {
            std::str::from_utf8(m.as_bytes()).ok().and_then(|s| s.parse::<u64>().ok())
        };
        let (Some(id), Some(gen)) = (number(id), number(gen)) else {
            continue;
        };
        let (Ok(id), Ok(gen)) = (u32::try_from(id), u16::try_from(gen)) else {
            log::debug!("Skipping out-of-range header at offset {}", full.start());
            continue;
        };
        if !starts_object(&contents[full.end()..]) {
            log::debug!("Skipping false positive object header at offset {}", full.start());
            continue;
        }
        headers.push(Header {
            offset: full.start() as u64,
            id: ObjectRef::new(id, gen),
        });
    }
    headers
}

/// Whether the bytes after "obj" begin an object value.
fn starts_object(rest: &[u8]) -> bool {
    match rest.iter().find(|c| !c.is_ascii_whitespace()) {
        Some(&c) => {
            matches!(c, b'<' | b'[' | b'(' | b'/' | b't' | b'f' | b'n' | b'-' | b'+' | b'.' | b'e')
                || c.is_ascii_digit()
        },
        None => false,
    }
}

fn is_current(section: &XRefSection, header: &Header) -> bool {
    matches!(
        section.entries.get(&header.id.id),
        Some(XRefEntry::Offset { offset, .. }) if *offset == header.offset
    )
}

/// The current header whose object contains byte `pos`.
fn containing_header(current: &[Header], pos: usize) -> Option<Header> {
    let idx = current.partition_point(|h| h.offset as usize <= pos);
    idx.checked_sub(1).map(|i| current[i])
}

fn parse_at(contents: &[u8], offset: u64, limits: &ParseLimits) -> Option<Object> {
    let input = contents.get(offset as usize..)?;
    parse_indirect_object(input, limits).ok().map(|(_, (_, object))| object)
}

/// Add entries for objects inside object streams.
///
/// Objects that also have their own top-level header keep that entry.
/// Returns the compressed objects that were found.
fn enumerate_object_streams(
    contents: &[u8],
    current: &[Header],
    section: &mut XRefSection,
    options: &ParserOptions,
) -> BTreeMap<u32, Object> {
    let limits = ParseLimits::from(options);
    let mut found = BTreeMap::new();
    let mut containers: Vec<Header> = RE_OBJECT_STREAM
        .find_iter(contents)
        .filter_map(|m| containing_header(current, m.start()))
        .collect();
    containers.dedup_by_key(|h| h.offset);

    for container in containers {
        let Some(stream) = parse_at(contents, container.offset, &limits) else {
            continue;
        };
        if !stream.is_type("ObjStm") {
            continue;
        }
        let Ok(decoded) = stream.decode_stream(&DecodeLimits::from(options)) else {
            continue;
        };
        let Some(dict) = stream.as_dict() else {
            continue;
        };
        match parse_object_stream(dict, &decoded.data, options) {
            Ok(objects) => {
                for (index, (id, object)) in objects.into_iter().enumerate() {
                    if section.entries.contains_key(&id) {
                        continue;
                    }
                    section.insert(
                        id,
                        XRefEntry::InObjectStream {
                            container: container.id.id,
                            index: index as u32,
                        },
                    );
                    found.insert(id, object);
                }
            },
            Err(e) => log::debug!("Skipping unreadable object stream {}: {}", container.id, e),
        }
    }
    found
}

/// Trailer from the last "trailer" keyword, else the last cross-reference
/// stream dictionary that names a root.
fn find_trailer(contents: &[u8], current: &[Header], limits: &ParseLimits) -> Option<Dictionary> {
    let keyword_trailer = RE_TRAILER
        .find_iter(contents)
        .filter_map(|m| {
            let input = &contents[m.start() + b"trailer".len()..];
            match parse_object_with(input, limits) {
                Ok((_, Object::Dictionary(dict))) => Some(dict),
                _ => None,
            }
        })
        .last();
    if let Some(dict) = keyword_trailer {
        log::debug!("Recovered trailer from trailer keyword");
        return Some(dict);
    }

    RE_XREF_STREAM
        .find_iter(contents)
        .filter_map(|m| containing_header(current, m.start()))
        .filter_map(|h| parse_at(contents, h.offset, limits))
        .filter(|obj| obj.is_type("XRef"))
        .filter_map(|obj| obj.as_dict().cloned())
        .filter(|dict| dict.contains_key("Root"))
        .last()
}

fn root_resolves(
    contents: &[u8],
    section: &XRefSection,
    trailer: &Dictionary,
    limits: &ParseLimits,
) -> bool {
    let Some(root) = trailer.get("Root").and_then(Object::as_reference) else {
        return false;
    };
    match section.entries.get(&root.id) {
        Some(XRefEntry::Offset { offset, .. }) => {
            parse_at(contents, *offset, limits).is_some_and(|obj| obj.as_dict().is_some())
        },
        Some(XRefEntry::InObjectStream { .. }) => true,
        _ => false,
    }
}

/// The last object typed `/Catalog`, top-level objects first.
fn find_catalog(
    contents: &[u8],
    current: &[Header],
    compressed: &BTreeMap<u32, Object>,
    limits: &ParseLimits,
) -> Option<ObjectRef> {
    let top_level = RE_CATALOG
        .find_iter(contents)
        .filter_map(|m| containing_header(current, m.start()))
        .filter(|h| parse_at(contents, h.offset, limits).is_some_and(|obj| obj.is_type("Catalog")))
        .map(|h| h.id)
        .last();

    top_level.or_else(|| {
        compressed
            .iter()
            .filter(|(_, obj)| obj.is_type("Catalog"))
            .map(|(&id, _)| ObjectRef::new(id, 0))
            .last()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn reconstruct(bytes: &[u8]) -> XRefSection {
        let mut store = MemoryStore::from_bytes(bytes.to_vec());
        reconstruct_xref(&mut store, &ParserOptions::default()).unwrap()
    }

    #[test]
    fn test_reconstruct_simple_file() {
        let pdf = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\ntrailer\n<< /Size 3 /Root 1 0 R >>\n%%EOF";
        let section = reconstruct(pdf);
        assert_eq!(section.kind, SectionKind::Recovered);
        assert_eq!(section.entries.len(), 2);
        assert_eq!(
            section.entries.get(&1),
            Some(&XRefEntry::Offset { offset: 9, generation: 0 })
        );
        assert_eq!(
            section.trailer.get("Root"),
            Some(&Object::Reference(ObjectRef::new(1, 0)))
        );
        assert_eq!(section.trailer.get("Size"), Some(&Object::Integer(3)));
    }

    #[test]
    fn test_last_occurrence_wins() {
        let pdf = b"%PDF-1.4\n3 0 obj (first) endobj\n3 0 obj (second) endobj\n";
        let section = reconstruct(pdf);
        let second = pdf.windows(7).rposition(|w| w == b"3 0 obj").unwrap() as u64;
        assert_eq!(
            section.entries.get(&3),
            Some(&XRefEntry::Offset { offset: second, generation: 0 })
        );
    }

    #[test]
    fn test_catalog_scan_without_trailer() {
        let pdf = b"%PDF-1.4\n4 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n7 0 obj\n<< /Type /Catalog /Pages 4 0 R >>\nendobj\n";
        let section = reconstruct(pdf);
        assert_eq!(
            section.trailer.get("Root"),
            Some(&Object::Reference(ObjectRef::new(7, 0)))
        );
        assert_eq!(section.trailer.get("Size"), Some(&Object::Integer(8)));
    }

    #[test]
    fn test_dangling_root_replaced_by_catalog() {
        let pdf = b"%PDF-1.4\n5 0 obj << /Type /Catalog >> endobj\ntrailer << /Root 99 0 R /Info 5 0 R >>";
        let section = reconstruct(pdf);
        assert_eq!(
            section.trailer.get("Root"),
            Some(&Object::Reference(ObjectRef::new(5, 0)))
        );
        assert!(section.trailer.contains_key("Info"));
    }

    #[test]
    fn test_false_positive_headers_skipped() {
        let pdf = b"%PDF-1.4\n(12 0 obj) 1 0 obj\n<< /Type /Catalog >>\nendobj\nx12 0 obj <<>>";
        let section = reconstruct(pdf);
        assert_eq!(section.entries.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_no_objects_is_empty_not_error() {
        let section = reconstruct(b"%PDF-1.4\nnothing to see here");
        assert!(section.entries.is_empty());
        assert!(!section.trailer.contains_key("Root"));
        assert_eq!(section.trailer.get("Size"), Some(&Object::Integer(0)));
    }

    #[test]
    fn test_object_stream_contents_enumerated() {
        let body = b"10 0 11 21 << /Type /Catalog >> (inner)";
        let pdf = [
            &b"%PDF-1.5\n6 0 obj\n<< /Type /ObjStm /N 2 /First 11 /Length "[..],
            body.len().to_string().as_bytes(),
            b" >>\nstream\n",
            body,
            b"\nendstream\nendobj\n",
        ]
        .concat();
        let section = reconstruct(&pdf);
        assert_eq!(
            section.entries.get(&10),
            Some(&XRefEntry::InObjectStream { container: 6, index: 0 })
        );
        assert_eq!(
            section.entries.get(&11),
            Some(&XRefEntry::InObjectStream { container: 6, index: 1 })
        );
        assert_eq!(
            section.trailer.get("Root"),
            Some(&Object::Reference(ObjectRef::new(10, 0)))
        );
    }
}
