//! Cross-reference table parser.
//!
//! The cross-reference table maps object numbers to byte offsets or to slots
//! inside object streams. A file may carry several sections chained through
//! `/Prev` by incremental updates; they are kept as an ordered list of
//! generations (oldest first) and looked up newest first.
//!
//! Supports classic `xref` tables, cross-reference streams and hybrid files
//! whose classic trailer points at an additional stream through `/XRefStm`.

use crate::decoders::DecodeLimits;
use crate::error::{Error, Result};
use crate::lexer::skip_ws;
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser::{self, ParseLimits, parse_indirect_object, parse_object_with};
use crate::parser_config::ParserOptions;
use crate::store::BackingStore;
use byteorder::{BigEndian, ByteOrder};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

/// Trailer keys carried into the merged document trailer.
pub const TRAILER_KEYS: [&str; 5] = ["Size", "Root", "Info", "ID", "Encrypt"];

/// Keys older generations may fill in when the newest trailer lacks them.
const INHERITED_TRAILER_KEYS: [&str; 4] = ["Root", "Info", "ID", "Encrypt"];

/// Bytes searched from the end of the file for `startxref`.
const STARTXREF_WINDOW: u64 = 2048;

/// First read when parsing an object from a store without a resident slice.
const INITIAL_WINDOW: usize = 64 * 1024;

/// Upper bound on entries in one classic subsection.
const MAX_SUBSECTION_ENTRIES: u32 = 1_000_000;

/// Cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Object stored at a byte offset
    Offset {
        /// Byte offset of "id gen obj"
        offset: u64,
        /// Generation number
        generation: u16,
    },
    /// Object stored inside an object stream
    InObjectStream {
        /// Object number of the containing object stream
        container: u32,
        /// Index within the container
        index: u32,
    },
    /// Free entry
    Free {
        /// Next free object number
        next: u32,
        /// Generation to use if the number is reused
        generation: u16,
    },
}

impl XRefEntry {
    /// Whether the entry locates a live object.
    pub fn is_in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free { .. })
    }

    /// Generation of the object this entry locates.
    ///
    /// Objects in object streams always have generation 0.
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Offset { generation, .. } | XRefEntry::Free { generation, .. } => *generation,
            XRefEntry::InObjectStream { .. } => 0,
        }
    }
}

/// How a section was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Classic `xref` table (possibly hybrid)
    Table,
    /// Cross-reference stream
    Stream,
    /// Synthesized by the brute-force scan
    Recovered,
}

/// One generation of the table: a section and its trailer.
#[derive(Debug, Clone)]
pub struct XRefSection {
    /// Byte offset the section was read from
    pub offset: Option<u64>,
    /// Section encoding
    pub kind: SectionKind,
    /// Entries by object number
    pub entries: BTreeMap<u32, XRefEntry>,
    /// Trailer dictionary (the stream dictionary for cross-reference streams)
    pub trailer: Dictionary,
}

impl XRefSection {
    /// Empty section.
    pub fn new(kind: SectionKind, offset: Option<u64>) -> Self {
        Self {
            offset,
            kind,
            entries: BTreeMap::new(),
            trailer: Dictionary::new(),
        }
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, id: u32, entry: XRefEntry) {
        self.entries.insert(id, entry);
    }

    /// Offset of the previous section, from `/Prev`.
    pub fn prev(&self) -> Option<u64> {
        self.trailer
            .get("Prev")
            .and_then(Object::as_integer)
            .and_then(|p| u64::try_from(p).ok())
    }

    fn xref_stm(&self) -> Option<u64> {
        self.trailer
            .get("XRefStm")
            .and_then(Object::as_integer)
            .and_then(|p| u64::try_from(p).ok())
    }
}

/// Cross-reference table: every generation, oldest first.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    generations: Vec<XRefSection>,
}

impl CrossRefTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table from generations ordered oldest first.
    pub fn from_generations(generations: Vec<XRefSection>) -> Self {
        Self { generations }
    }

    /// Add the newest generation.
    pub fn push_generation(&mut self, section: XRefSection) {
        self.generations.push(section);
    }

    /// All generations, oldest first.
    pub fn generations(&self) -> &[XRefSection] {
        &self.generations
    }

    /// Entry for `id`, consulting the newest generation first.
    ///
    /// A free entry in a newer generation shadows older offsets.
    pub fn lookup(&self, id: u32) -> Option<&XRefEntry> {
        self.generations
            .iter()
            .rev()
            .find_map(|section| section.entries.get(&id))
    }

    /// Whether `id` has an in-use entry.
    pub fn contains(&self, id: u32) -> bool {
        self.lookup(id).is_some_and(XRefEntry::is_in_use)
    }

    /// Object numbers whose effective entry is in use, ascending.
    pub fn object_numbers(&self) -> Vec<u32> {
        let ids: std::collections::BTreeSet<u32> = self
            .generations
            .iter()
            .flat_map(|section| section.entries.keys().copied())
            .collect();
        ids.into_iter().filter(|&id| self.contains(id)).collect()
    }

    /// References for every in-use object.
    pub fn object_refs(&self) -> Vec<ObjectRef> {
        self.object_numbers()
            .into_iter()
            .filter_map(|id| self.lookup(id).map(|e| ObjectRef::new(id, e.generation())))
            .collect()
    }

    /// Highest object number with any entry, free or not.
    pub fn max_object_number(&self) -> u32 {
        self.generations
            .iter()
            .filter_map(|section| section.entries.keys().next_back().copied())
            .max()
            .unwrap_or(0)
    }

    /// Number of distinct in-use objects.
    pub fn len(&self) -> usize {
        self.object_numbers().len()
    }

    /// True when no object is in use.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Effective document trailer.
    ///
    /// The newest generation's trailer is authoritative; older generations
    /// fill in `/Root`, `/Info`, `/ID` and `/Encrypt` when it lacks them.
    /// Only document-level keys are kept (no `/Prev`, no stream keys).
    pub fn trailer(&self) -> Dictionary {
        let mut merged = Dictionary::new();
        let Some(newest) = self.generations.last() else {
            return merged;
        };
        for key in TRAILER_KEYS {
            if let Some(value) = newest.trailer.get(key) {
                merged.insert(key.to_string(), value.clone());
            }
        }
        for section in self.generations.iter().rev().skip(1) {
            for key in INHERITED_TRAILER_KEYS {
                if !merged.contains_key(key) {
                    if let Some(value) = section.trailer.get(key) {
                        merged.insert(key.to_string(), value.clone());
                    }
                }
            }
        }
        merged
    }
}

/// Bytes from `offset` to the end of the store.
pub(crate) fn read_tail(store: &mut dyn BackingStore, offset: u64) -> Result<Cow<'_, [u8]>> {
    let len = store.len();
    let start = offset.min(len);
    if store.as_slice().is_none() {
        let data = store.read_range(start, usize::try_from(len - start).unwrap_or(usize::MAX))?;
        return Ok(Cow::Owned(data));
    }
    Ok(Cow::Borrowed(
        store
            .as_slice()
            .and_then(|all| all.get(start as usize..))
            .unwrap_or(&[]),
    ))
}

/// Parse the indirect object whose header starts at `offset`.
///
/// Stores without a resident slice are read through a window that doubles
/// until the object parses or the end of the store is reached.
pub(crate) fn parse_object_at(
    store: &mut dyn BackingStore,
    offset: u64,
    limits: &ParseLimits,
) -> Result<(ObjectRef, Object)> {
    let len = store.len();
    if offset >= len {
        return Err(Error::parse(offset as usize, "object offset beyond end of data"));
    }

    if let Some(all) = store.as_slice() {
        let input = &all[offset as usize..];
        return parse_indirect_object(input, limits)
            .map(|(_, value)| value)
            .map_err(|e| parser::to_error(offset as usize, input, e, limits));
    }

    let available = usize::try_from(len - offset).unwrap_or(usize::MAX);
    let mut window = INITIAL_WINDOW;
    loop {
        let take = window.min(available);
        let at_end = take == available;
        let buf = store.read_range(offset, take)?;
        match parse_indirect_object(&buf, limits) {
            // A value touching the window edge may have been cut short
            Ok((rest, value)) if at_end || !skip_ws(rest).is_empty() => return Ok(value),
            Err(e) if at_end => return Err(parser::to_error(offset as usize, &buf, e, limits)),
            _ => window = window.saturating_mul(2),
        }
    }
}

/// Find the offset named by the last `startxref` keyword.
///
/// Returns `None` when the keyword or its number is missing.
pub fn find_xref_offset(store: &mut dyn BackingStore) -> Result<Option<u64>> {
    let len = store.len();
    let start = len.saturating_sub(STARTXREF_WINDOW);
    let tail = store.read_range(start, (len - start) as usize)?;

    let Some(pos) = tail.windows(9).rposition(|w| w == b"startxref") else {
        return Ok(None);
    };
    let after = skip_ws(&tail[pos + 9..]);
    let digits: &[u8] = &after[..after.iter().take_while(|c| c.is_ascii_digit()).count()];
    Ok(std::str::from_utf8(digits).ok().and_then(|s| s.parse().ok()))
}

/// Whether a cross-reference section plausibly starts at `offset`.
///
/// This is the structured-parse precondition: the offset is inside the store
/// and the bytes there begin with `xref` or an `id gen obj` header.
pub fn section_plausible(store: &mut dyn BackingStore, offset: u64) -> Result<bool> {
    if offset >= store.len() {
        return Ok(false);
    }
    let head = store.read_range(offset, 64)?;
    let head = skip_ws(&head);
    Ok(head.starts_with(b"xref") || parser::looks_like_object_header(head))
}

/// Parse the section at `start` and every section reachable through `/Prev`.
///
/// A failure in the first section is returned to the caller. A broken
/// `/Prev` link is an error in strict mode; in tolerant mode the chain ends
/// there with a warning.
pub fn parse_xref_chain(
    store: &mut dyn BackingStore,
    start: u64,
    options: &ParserOptions,
) -> Result<CrossRefTable> {
    let mut newest_first: Vec<XRefSection> = Vec::new();
    let mut visited = HashSet::new();
    let mut next = Some(start);

    while let Some(offset) = next {
        let problem = if !visited.insert(offset) {
            Some(Error::xref(offset, "cyclic /Prev chain"))
        } else if newest_first.len() >= options.max_xref_chain {
            Some(Error::xref(offset, "/Prev chain too long"))
        } else {
            None
        };
        if let Some(err) = problem {
            if options.strict {
                return Err(err);
            }
            log::warn!("{}; ignoring older sections", err);
            break;
        }

        match parse_section(store, offset, options) {
            Ok(section) => {
                log::debug!(
                    "Parsed {:?} section at {} with {} entries",
                    section.kind,
                    offset,
                    section.entries.len()
                );
                next = section.prev();
                newest_first.push(section);
            },
            Err(e) if newest_first.is_empty() || options.strict => return Err(e),
            Err(e) => {
                log::warn!("Ignoring broken /Prev section at {}: {}", offset, e);
                break;
            },
        }
    }

    newest_first.reverse();
    Ok(CrossRefTable::from_generations(newest_first))
}

/// Parse one section (classic table or stream) at `offset`.
pub fn parse_section(
    store: &mut dyn BackingStore,
    offset: u64,
    options: &ParserOptions,
) -> Result<XRefSection> {
    let head = store.read_range(offset, 64)?;
    let head = skip_ws(&head);
    if head.starts_with(b"xref") {
        parse_classic_section(store, offset, options)
    } else if parser::looks_like_object_header(head) {
        parse_stream_section(store, offset, options)
    } else {
        Err(Error::xref(offset, "no cross-reference section at offset"))
    }
}

/// Split into lines at CR, LF or CRLF, keeping each line's start position.
fn split_lines(data: &[u8]) -> Vec<(usize, &[u8])> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'\r' | b'\n' => {
                lines.push((start, &data[start..i]));
                i += if data[i] == b'\r' && data.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            },
            _ => i += 1,
        }
    }
    if start < data.len() {
        lines.push((start, &data[start..]));
    }
    lines
}

fn trim(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|c| !c.is_ascii_whitespace()).unwrap_or(line.len());
    let end = line.iter().rposition(|c| !c.is_ascii_whitespace()).map_or(start, |p| p + 1);
    &line[start..end]
}

fn fields(line: &[u8]) -> Vec<&str> {
    line.split(|c| c.is_ascii_whitespace())
        .filter(|f| !f.is_empty())
        .filter_map(|f| std::str::from_utf8(f).ok())
        .collect()
}

/// Parse a classic table:
///
/// ```text
/// xref
/// 0 6
/// 0000000000 65535 f
/// 0000000018 00000 n
/// ...
/// trailer
/// << /Size 6 /Root 1 0 R >>
/// ```
fn parse_classic_section(
    store: &mut dyn BackingStore,
    offset: u64,
    options: &ParserOptions,
) -> Result<XRefSection> {
    let limits = ParseLimits::from(options);
    let mut section = XRefSection::new(SectionKind::Table, Some(offset));

    let trailer = {
        let tail = read_tail(store, offset)?;
        let lines = split_lines(&tail);
        let mut idx = lines
            .iter()
            .position(|(_, line)| !trim(line).is_empty())
            .ok_or_else(|| Error::xref(offset, "empty section"))?;
        if !trim(lines[idx].1).starts_with(b"xref") {
            return Err(Error::xref(offset, "expected 'xref'"));
        }
        idx += 1;

        let mut trailer_at = None;
        while idx < lines.len() {
            let (line_start, line) = lines[idx];
            let trimmed = trim(line);
            idx += 1;

            if let Some(pos) = parser::find_bytes(line, b"trailer") {
                trailer_at = Some(line_start + pos + b"trailer".len());
                break;
            }
            if trimmed.is_empty() || trimmed.starts_with(b"%") {
                continue;
            }

            let parts = fields(trimmed);
            if parts.len() != 2 {
                log::warn!("Skipping malformed subsection header {:?}", String::from_utf8_lossy(trimmed));
                continue;
            }
            let (Ok(first), Ok(count)) = (parts[0].parse::<u32>(), parts[1].parse::<u32>()) else {
                return Err(Error::xref(offset, "invalid subsection header"));
            };
            if count > MAX_SUBSECTION_ENTRIES {
                return Err(Error::xref(offset, format!("subsection of {} entries", count)));
            }

            let mut i = 0;
            while i < count && idx < lines.len() {
                let line = trim(lines[idx].1);
                if line.is_empty() || line.starts_with(b"%") {
                    idx += 1;
                    continue;
                }
                if parser::find_bytes(line, b"trailer").is_some() {
                    log::warn!("Expected {} entries but found {} before trailer", count, i);
                    break;
                }
                idx += 1;

                let Some(id) = first.checked_add(i) else {
                    break;
                };
                section.insert(id, classic_entry(line, id));
                i += 1;
            }
        }

        let trailer_at = trailer_at.ok_or_else(|| Error::xref(offset, "missing trailer"))?;
        let input = &tail[trailer_at..];
        match parse_object_with(input, &limits) {
            Ok((_, Object::Dictionary(dict))) => dict,
            Ok((_, other)) => {
                return Err(Error::xref(offset, format!("trailer is a {}", other.type_name())));
            },
            Err(e) => {
                return Err(parser::to_error(offset as usize + trailer_at, input, e, &limits));
            },
        }
    };
    section.trailer = trailer;

    if let Some(stm_offset) = section.xref_stm() {
        merge_hybrid_stream(store, &mut section, stm_offset, options)?;
    }

    Ok(section)
}

/// One "nnnnnnnnnn ggggg n" line. Malformed lines become free placeholders.
fn classic_entry(line: &[u8], id: u32) -> XRefEntry {
    let placeholder = XRefEntry::Free {
        next: 0,
        generation: 65535,
    };
    let parts = fields(line);
    if parts.len() < 3 {
        log::warn!("Malformed entry for object {}: {:?}", id, String::from_utf8_lossy(line));
        return placeholder;
    }
    let (Ok(offset), Ok(generation)) = (parts[0].parse::<u64>(), parts[1].parse::<u16>()) else {
        log::warn!("Unparsable entry for object {}: {:?}", id, String::from_utf8_lossy(line));
        return placeholder;
    };
    match parts[2].as_bytes().first() {
        Some(b'n') | Some(b'N') => XRefEntry::Offset { offset, generation },
        Some(b'f') | Some(b'F') => XRefEntry::Free {
            next: u32::try_from(offset).unwrap_or(0),
            generation,
        },
        _ => {
            log::warn!("Invalid type flag for object {}, treating as free", id);
            XRefEntry::Free {
                next: 0,
                generation,
            }
        },
    }
}

/// Merge the `/XRefStm` stream of a hybrid file into its classic section.
///
/// When both list the same object the classic entry is kept.
fn merge_hybrid_stream(
    store: &mut dyn BackingStore,
    section: &mut XRefSection,
    stm_offset: u64,
    options: &ParserOptions,
) -> Result<()> {
    match parse_stream_section(store, stm_offset, options) {
        Ok(stream) => {
            let mut added = 0;
            for (id, entry) in stream.entries {
                if let std::collections::btree_map::Entry::Vacant(slot) = section.entries.entry(id) {
                    slot.insert(entry);
                    added += 1;
                }
            }
            log::debug!("Merged {} entries from /XRefStm at {}", added, stm_offset);
            Ok(())
        },
        Err(e) if options.strict => Err(e),
        Err(e) => {
            log::warn!("Ignoring unreadable /XRefStm at {}: {}", stm_offset, e);
            Ok(())
        },
    }
}

fn integer_array(dict: &Dictionary, key: &str, offset: u64) -> Result<Option<Vec<u64>>> {
    let Some(value) = dict.get(key) else {
        return Ok(None);
    };
    value
        .as_array()
        .ok_or_else(|| Error::xref(offset, format!("/{} is not an array", key)))?
        .iter()
        .map(|v| {
            v.as_integer()
                .and_then(|i| u64::try_from(i).ok())
                .ok_or_else(|| Error::xref(offset, format!("invalid /{} element", key)))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Parse a cross-reference stream.
///
/// - `/W [w1 w2 w3]` gives field widths in bytes (0 means the default)
/// - `/Index [start count ...]` gives subsection ranges (default `[0 Size]`)
/// - Type 0 is free, type 1 a byte offset, type 2 a slot in an object stream
fn parse_stream_section(
    store: &mut dyn BackingStore,
    offset: u64,
    options: &ParserOptions,
) -> Result<XRefSection> {
    let limits = ParseLimits::from(options);
    let (_, object) = parse_object_at(store, offset, &limits)?;
    if !matches!(object, Object::Stream { .. }) {
        return Err(Error::xref(offset, "cross-reference stream is not a stream"));
    }
    let dict = object.as_dict().cloned().unwrap_or_default();
    if let Some(kind) = dict.get("Type").and_then(Object::as_name) {
        if kind != "XRef" {
            return Err(Error::xref(offset, format!("expected /Type /XRef, found /{}", kind)));
        }
    }

    let widths = integer_array(&dict, "W", offset)?
        .ok_or_else(|| Error::xref(offset, "missing /W"))?;
    let [w1, w2, w3] = widths[..] else {
        return Err(Error::xref(offset, "/W must have three elements"));
    };
    let (w1, w2, w3) = (w1 as usize, w2 as usize, w3 as usize);
    if [w1, w2, w3].iter().any(|&w| w > 8) {
        return Err(Error::xref(offset, "/W field wider than 8 bytes"));
    }
    let entry_size = w1 + w2 + w3;
    if entry_size == 0 {
        return Err(Error::xref(offset, "/W describes empty entries"));
    }

    let size = dict
        .get("Size")
        .and_then(Object::as_integer)
        .and_then(|s| u64::try_from(s).ok())
        .ok_or_else(|| Error::xref(offset, "missing /Size"))?;
    let index = integer_array(&dict, "Index", offset)?.unwrap_or_else(|| vec![0, size]);
    if index.len() % 2 != 0 {
        return Err(Error::xref(offset, "/Index has an odd number of elements"));
    }

    let decoded = object.decode_stream(&DecodeLimits::from(options))?;
    if let Some(err) = decoded.error {
        if options.strict {
            return Err(err);
        }
        log::warn!("Cross-reference stream at {} decoded partially: {}", offset, err);
    }
    let data = decoded.data;

    let field = |record: &[u8], start: usize, width: usize, default: u64| -> u64 {
        if width == 0 {
            default
        } else {
            BigEndian::read_uint(&record[start..start + width], width)
        }
    };

    let mut section = XRefSection::new(SectionKind::Stream, Some(offset));
    let mut records = data.chunks_exact(entry_size);
    'ranges: for pair in index.chunks(2) {
        let (first, count) = (pair[0], pair[1]);
        for i in 0..count {
            let Some(record) = records.next() else {
                if options.strict {
                    return Err(Error::xref(offset, "truncated cross-reference stream"));
                }
                log::warn!("Cross-reference stream at {} is truncated", offset);
                break 'ranges;
            };
            let Ok(id) = u32::try_from(first + i) else {
                break 'ranges;
            };

            let kind = field(record, 0, w1, 1);
            let f2 = field(record, w1, w2, 0);
            let f3 = field(record, w1 + w2, w3, 0);
            let entry = match kind {
                0 => XRefEntry::Free {
                    next: u32::try_from(f2).unwrap_or(0),
                    generation: u16::try_from(f3).unwrap_or(u16::MAX),
                },
                1 => XRefEntry::Offset {
                    offset: f2,
                    generation: u16::try_from(f3).unwrap_or(0),
                },
                2 => match (u32::try_from(f2), u32::try_from(f3)) {
                    (Ok(container), Ok(index)) => XRefEntry::InObjectStream { container, index },
                    _ => continue,
                },
                // Unknown types are references to null
                _ => continue,
            };
            section.insert(id, entry);
        }
    }

    section.trailer = dict;
    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::{Filter, FilterStage, encode_chain};
    use crate::store::MemoryStore;

    /// Assembles a file while recording where each piece starts.
    struct FileBuilder {
        bytes: Vec<u8>,
    }

    impl FileBuilder {
        fn new() -> Self {
            Self {
                bytes: b"%PDF-1.7\n".to_vec(),
            }
        }

        fn push(&mut self, data: &[u8]) -> u64 {
            let at = self.bytes.len() as u64;
            self.bytes.extend_from_slice(data);
            at
        }

        fn object(&mut self, id: u32, body: &str) -> u64 {
            self.push(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes())
        }

        fn store(self) -> MemoryStore {
            MemoryStore::from_bytes(self.bytes)
        }
    }

    fn classic(entries: &[(u32, u64)], trailer: &str) -> String {
        let mut out = String::from("xref\n");
        for (id, offset) in entries {
            out.push_str(&format!("{} 1\n{:010} 00000 n \n", id, offset));
        }
        out.push_str("trailer\n");
        out.push_str(trailer);
        out.push('\n');
        out
    }

    fn xref_stream(id: u32, rows: &[[u8; 4]], extra: &str) -> Vec<u8> {
        let raw: Vec<u8> = rows.iter().flatten().copied().collect();
        let data = encode_chain(&raw, &[FilterStage::new(Filter::FlateDecode)]).unwrap();
        let mut out = format!(
            "{} 0 obj\n<< /Type /XRef /W [1 2 1] /Filter /FlateDecode /Length {} {} >>\nstream\n",
            id,
            data.len(),
            extra
        )
        .into_bytes();
        out.extend_from_slice(&data);
        out.extend_from_slice(b"\nendstream\nendobj\n");
        out
    }

    #[test]
    fn test_classic_table() {
        let mut b = FileBuilder::new();
        let o1 = b.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
        let o2 = b.object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
        let xref = b.push(
            format!(
                "xref\r\n0 3\r\n0000000000 65535 f\r\n{:010} 00000 n\r\n% comment\r\n{:010} 00000 n\r\ntrailer\r\n<< /Size 3 /Root 1 0 R >>\r\n",
                o1, o2
            )
            .as_bytes(),
        );
        b.push(format!("startxref\n{}\n%%EOF\n", xref).as_bytes());
        let mut store = b.store();

        assert_eq!(find_xref_offset(&mut store).unwrap(), Some(xref));
        assert!(section_plausible(&mut store, xref).unwrap());
        let table = parse_xref_chain(&mut store, xref, &ParserOptions::default()).unwrap();
        assert_eq!(table.generations().len(), 1);
        assert_eq!(table.lookup(1), Some(&XRefEntry::Offset { offset: o1, generation: 0 }));
        // the comment line does not take object 2's slot
        assert_eq!(table.lookup(2), Some(&XRefEntry::Offset { offset: o2, generation: 0 }));
        assert_eq!(table.object_numbers(), vec![1, 2]);
        assert_eq!(
            table.trailer().get("Root"),
            Some(&Object::Reference(ObjectRef::new(1, 0)))
        );
    }

    #[test]
    fn test_short_and_bad_entries_become_free() {
        let mut b = FileBuilder::new();
        let xref = b.push(b"xref\n0 3\n0000000000 65535 f\n0000000010\n0000000020 00000 x\ntrailer\n<< /Size 3 >>\n");
        let mut store = b.store();
        let table = parse_xref_chain(&mut store, xref, &ParserOptions::default()).unwrap();
        assert!(!table.contains(1));
        assert!(!table.contains(2));
        assert!(table.lookup(2).is_some());
    }

    #[test]
    fn test_missing_trailer_is_error() {
        let mut b = FileBuilder::new();
        let xref = b.push(b"xref\n0 1\n0000000000 65535 f\n");
        let mut store = b.store();
        assert!(parse_xref_chain(&mut store, xref, &ParserOptions::default()).is_err());
    }

    #[test]
    fn test_incremental_update_newest_wins() {
        let mut b = FileBuilder::new();
        let old1 = b.object(1, "<< /Type /Catalog >>");
        let old2 = b.object(2, "(old)");
        let first = b.push(classic(&[(1, old1), (2, old2)], "<< /Size 3 /Root 1 0 R /Info 2 0 R >>").as_bytes());
        let new2 = b.object(2, "(new)");
        let second = b.push(
            format!(
                "xref\n2 2\n{:010} 00000 n \n0000000000 00001 f \ntrailer\n<< /Size 4 /Prev {} >>\n",
                new2, first
            )
            .as_bytes(),
        );
        let mut store = b.store();

        let table = parse_xref_chain(&mut store, second, &ParserOptions::default()).unwrap();
        assert_eq!(table.generations().len(), 2);
        assert_eq!(table.generations()[0].offset, Some(first));
        assert_eq!(table.lookup(2), Some(&XRefEntry::Offset { offset: new2, generation: 0 }));
        assert_eq!(table.lookup(1), Some(&XRefEntry::Offset { offset: old1, generation: 0 }));
        assert!(!table.contains(3));

        // Root and Info come from the older trailer, Size from the newest
        let trailer = table.trailer();
        assert_eq!(trailer.get("Size"), Some(&Object::Integer(4)));
        assert!(trailer.contains_key("Root"));
        assert!(trailer.contains_key("Info"));
        assert!(!trailer.contains_key("Prev"));
    }

    #[test]
    fn test_free_entry_shadows_older_offset() {
        let mut b = FileBuilder::new();
        let o1 = b.object(1, "<< >>");
        let first = b.push(classic(&[(1, o1)], "<< /Size 2 >>").as_bytes());
        let second = b.push(
            format!("xref\n1 1\n0000000000 00001 f \ntrailer\n<< /Size 2 /Prev {} >>\n", first).as_bytes(),
        );
        let mut store = b.store();
        let table = parse_xref_chain(&mut store, second, &ParserOptions::default()).unwrap();
        assert!(!table.contains(1));
        assert!(table.object_numbers().is_empty());
    }

    #[test]
    fn test_prev_cycle() {
        let mut b = FileBuilder::new();
        let o1 = b.object(1, "<< >>");
        // The section's own offset is where it starts
        let at = b.bytes.len();
        let text = classic(&[(1, o1)], &format!("<< /Size 2 /Prev {} >>", at));
        b.push(text.as_bytes());
        let mut store = b.store();

        let table = parse_xref_chain(&mut store, at as u64, &ParserOptions::default()).unwrap();
        assert_eq!(table.generations().len(), 1);
        assert!(parse_xref_chain(&mut store, at as u64, &ParserOptions::strict()).is_err());
    }

    #[test]
    fn test_broken_prev_tolerant_vs_strict() {
        let mut b = FileBuilder::new();
        let o1 = b.object(1, "<< >>");
        let xref = b.push(classic(&[(1, o1)], "<< /Size 2 /Prev 3 >>").as_bytes());
        let mut store = b.store();
        let table = parse_xref_chain(&mut store, xref, &ParserOptions::default()).unwrap();
        assert_eq!(table.generations().len(), 1);
        assert!(parse_xref_chain(&mut store, xref, &ParserOptions::strict()).is_err());
    }

    #[test]
    fn test_xref_stream() {
        let mut b = FileBuilder::new();
        let o1 = b.object(1, "<< /Type /Catalog >>") as u16;
        let at = b.bytes.len() as u64;
        let rows = [
            [0, 0, 0, 255],
            [1, (o1 >> 8) as u8, o1 as u8, 0],
            [2, 0, 7, 3],
            [1, 0, at as u8, 0],
        ];
        b.push(&xref_stream(3, &rows, "/Size 4 /Root 1 0 R"));
        let mut store = b.store();

        let table = parse_xref_chain(&mut store, at, &ParserOptions::default()).unwrap();
        let section = &table.generations()[0];
        assert_eq!(section.kind, SectionKind::Stream);
        assert_eq!(table.lookup(1), Some(&XRefEntry::Offset { offset: o1 as u64, generation: 0 }));
        assert_eq!(table.lookup(2), Some(&XRefEntry::InObjectStream { container: 7, index: 3 }));
        assert!(!table.contains(0));
        assert_eq!(table.trailer().get("Size"), Some(&Object::Integer(4)));
    }

    #[test]
    fn test_hybrid_classic_entry_wins() {
        let mut b = FileBuilder::new();
        let o1 = b.object(1, "<< /Type /Catalog >>");
        let o2 = b.object(2, "(classic)");
        let stm_at = b.bytes.len() as u64;
        // The stream claims object 2 is compressed and adds object 4
        let rows = [[2, 0, 9, 0], [2, 0, 9, 1]];
        b.push(&xref_stream(5, &rows, "/Size 5 /Index [2 1 4 1]"));
        let xref = b.push(
            classic(
                &[(1, o1), (2, o2)],
                &format!("<< /Size 6 /Root 1 0 R /XRefStm {} >>", stm_at),
            )
            .as_bytes(),
        );
        let mut store = b.store();

        let table = parse_xref_chain(&mut store, xref, &ParserOptions::default()).unwrap();
        assert_eq!(table.generations().len(), 1);
        assert_eq!(table.lookup(2), Some(&XRefEntry::Offset { offset: o2, generation: 0 }));
        assert_eq!(table.lookup(4), Some(&XRefEntry::InObjectStream { container: 9, index: 1 }));
    }

    #[test]
    fn test_garbage_at_offset_not_plausible() {
        let mut b = FileBuilder::new();
        b.push(b"garbage here\nstartxref\n9\n%%EOF");
        let mut store = b.store();
        assert!(!section_plausible(&mut store, 9).unwrap());
        assert!(!section_plausible(&mut store, 1_000_000).unwrap());
        assert!(parse_section(&mut store, 9, &ParserOptions::default()).is_err());
    }

    #[test]
    fn test_missing_startxref() {
        let mut store = MemoryStore::from_bytes(b"%PDF-1.4\n1 0 obj 1 endobj".to_vec());
        assert_eq!(find_xref_offset(&mut store).unwrap(), None);
    }

    #[test]
    fn test_windowed_parse_matches_slice_parse() {
        use crate::store::ScratchFileStore;
        let body = format!("<< /Data ({}) >>", "x".repeat(200_000));
        let mut b = FileBuilder::new();
        let at = b.object(1, &body);
        b.push(b"trailer");
        let bytes = b.bytes.clone();

        let mut memory = MemoryStore::from_bytes(bytes.clone());
        let mut scratch = ScratchFileStore::new().unwrap();
        scratch.write_at(0, &bytes).unwrap();

        let limits = ParseLimits::default();
        let a = parse_object_at(&mut memory, at, &limits).unwrap();
        let b = parse_object_at(&mut scratch, at, &limits).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.0, ObjectRef::new(1, 0));
    }
}
