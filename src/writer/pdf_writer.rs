//! Document writer.
//!
//! Assembles a complete file from a set of indirect objects: header, body,
//! cross-reference section (classic table or compressed stream) and trailer.
//! Offsets are taken from a [`CountingWriter`] so the table always matches
//! the bytes actually written.

use super::object_serializer::ObjectSerializer;
use crate::decoders::{Filter, FilterStage};
use crate::error::Result;
use crate::object::{Dictionary, Object, ObjectRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

/// Options for saving a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Write a compressed cross-reference stream instead of a classic table
    pub xref_stream: bool,
    /// Flate-encode streams that carry no filter
    pub compress_streams: bool,
    /// Header version override (the document's own version when `None`)
    pub version: Option<(u8, u8)>,
}

impl SaveOptions {
    /// Use a cross-reference stream.
    pub fn with_xref_stream(mut self, xref_stream: bool) -> Self {
        self.xref_stream = xref_stream;
        self
    }

    /// Compress unfiltered streams.
    pub fn with_compress_streams(mut self, compress: bool) -> Self {
        self.compress_streams = compress;
        self
    }

    /// Override the header version.
    pub fn with_version(mut self, major: u8, minor: u8) -> Self {
        self.version = Some((major, minor));
        self
    }
}

/// Writer adapter that counts bytes written.
#[derive(Debug)]
pub struct CountingWriter<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    /// Wrap `inner`, starting the count at zero.
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    /// Bytes written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Unwrap the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Writes one complete file.
pub struct PdfWriter<W: Write> {
    out: CountingWriter<W>,
    options: SaveOptions,
    serializer: ObjectSerializer,
    /// Byte offset of every object written so far
    offsets: BTreeMap<u32, (u64, u16)>,
}

impl<W: Write> PdfWriter<W> {
    /// Create a writer over `out`.
    pub fn new(out: W, options: SaveOptions) -> Self {
        Self {
            out: CountingWriter::new(out),
            options,
            serializer: ObjectSerializer::compact(),
            offsets: BTreeMap::new(),
        }
    }

    /// Write a whole document: every object in `objects` and a table and
    /// trailer built from `trailer`.
    ///
    /// Only `/Root`, `/Info`, `/ID` and `/Encrypt` are taken from `trailer`;
    /// `/Size` and the section layout are computed. Returns the inner writer.
    pub fn write_document(
        mut self,
        version: (u8, u8),
        objects: &BTreeMap<ObjectRef, Object>,
        trailer: &Dictionary,
    ) -> Result<W> {
        let mut version = self.options.version.unwrap_or(version);
        if self.options.xref_stream && version < (1, 5) {
            version = (1, 5);
        }
        self.write_header(version)?;
        for (id, object) in objects {
            self.write_object(*id, object)?;
        }
        if self.options.xref_stream {
            self.write_xref_stream(trailer)?;
        } else {
            self.write_xref_table(trailer)?;
        }
        self.out.flush()?;
        log::debug!(
            "Wrote {} objects, {} bytes",
            self.offsets.len(),
            self.out.count()
        );
        Ok(self.out.into_inner())
    }

    fn write_header(&mut self, (major, minor): (u8, u8)) -> Result<()> {
        writeln!(self.out, "%PDF-{}.{}", major, minor)?;
        // Binary marker
        self.out.write_all(b"%\xE2\xE3\xCF\xD3\n")?;
        Ok(())
    }

    fn write_object(&mut self, id: ObjectRef, object: &Object) -> Result<()> {
        let compressed;
        let object = match object {
            Object::Stream { dict, data }
                if self.options.compress_streams && !dict.contains_key("Filter") =>
            {
                let encoded = FilterStage::new(Filter::FlateDecode).encode(data)?;
                let mut dict = dict.clone();
                dict.insert("Filter".to_string(), Object::name("FlateDecode"));
                dict.shift_remove("DecodeParms");
                compressed = Object::Stream {
                    dict,
                    data: bytes::Bytes::from(encoded),
                };
                &compressed
            },
            other => other,
        };
        self.offsets.insert(id.id, (self.out.count(), id.gen));
        self.serializer.write_indirect(&mut self.out, id.id, id.gen, object)?;
        Ok(())
    }

    /// Document-level keys of the trailer plus `/Size`.
    fn trailer_base(&self, trailer: &Dictionary, size: u32) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert("Size".to_string(), Object::Integer(size as i64));
        for key in ["Root", "Info", "ID", "Encrypt"] {
            if let Some(value) = trailer.get(key) {
                dict.insert(key.to_string(), value.clone());
            }
        }
        dict
    }

    fn write_xref_table(&mut self, trailer: &Dictionary) -> Result<()> {
        let xref_start = self.out.count();
        let size = self.offsets.keys().next_back().map_or(1, |&max| max + 1);
        writeln!(self.out, "xref")?;
        for (first, run) in runs(&self.offsets) {
            writeln!(self.out, "{} {}", first, run.len())?;
            for entry in run {
                match entry {
                    Some((offset, gen)) => writeln!(self.out, "{:010} {:05} n ", offset, gen)?,
                    None => writeln!(self.out, "0000000000 65535 f ")?,
                }
            }
        }

        let trailer = Object::Dictionary(self.trailer_base(trailer, size));
        writeln!(self.out, "trailer")?;
        self.serializer.write_object(&mut self.out, &trailer)?;
        write!(self.out, "\nstartxref\n{}\n%%EOF\n", xref_start)?;
        Ok(())
    }

    fn write_xref_stream(&mut self, trailer: &Dictionary) -> Result<()> {
        let xref_start = self.out.count();
        let xref_id = self.offsets.keys().next_back().map_or(1, |&max| max + 1);
        self.offsets.insert(xref_id, (xref_start, 0));
        let size = xref_id + 1;

        let offset_width = byte_width(xref_start);
        let mut rows = Vec::new();
        let mut index = Vec::new();
        for (first, run) in runs(&self.offsets) {
            index.push(Object::Integer(first as i64));
            index.push(Object::Integer(run.len() as i64));
            for entry in run {
                let (kind, field2, field3) = match entry {
                    Some((offset, gen)) => (1u8, offset, gen),
                    None => (0u8, 0, 65535),
                };
                rows.push(kind);
                rows.extend_from_slice(&field2.to_be_bytes()[8 - offset_width..]);
                rows.extend_from_slice(&field3.to_be_bytes());
            }
        }

        let mut dict = self.trailer_base(trailer, size);
        dict.insert("Type".to_string(), Object::name("XRef"));
        dict.insert(
            "W".to_string(),
            Object::Array(vec![
                Object::Integer(1),
                Object::Integer(offset_width as i64),
                Object::Integer(2),
            ]),
        );
        dict.insert("Index".to_string(), Object::Array(index));
        let data = if self.options.compress_streams {
            dict.insert("Filter".to_string(), Object::name("FlateDecode"));
            FilterStage::new(Filter::FlateDecode).encode(&rows)?
        } else {
            rows
        };
        let stream = Object::Stream {
            dict,
            data: bytes::Bytes::from(data),
        };
        self.serializer.write_indirect(&mut self.out, xref_id, 0, &stream)?;
        write!(self.out, "startxref\n{}\n%%EOF\n", xref_start)?;
        Ok(())
    }
}

/// Contiguous runs of entries, object 0 always included as the free head.
fn runs(offsets: &BTreeMap<u32, (u64, u16)>) -> Vec<(u32, Vec<Option<(u64, u16)>>)> {
    let mut runs: Vec<(u32, Vec<Option<(u64, u16)>>)> = vec![(0, vec![None])];
    for (&id, &entry) in offsets {
        if id == 0 {
            continue;
        }
        match runs.last_mut() {
            Some((first, run)) if *first + run.len() as u32 == id => run.push(Some(entry)),
            _ => runs.push((id, vec![Some(entry)])),
        }
    }
    runs
}

/// Bytes needed to store `value` big-endian.
fn byte_width(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DictBuilder;
    use crate::parser_config::ParserOptions;
    use crate::store::MemoryStore;
    use crate::xref::{XRefEntry, find_xref_offset, parse_xref_chain};

    fn sample() -> (BTreeMap<ObjectRef, Object>, Dictionary) {
        let mut objects = BTreeMap::new();
        objects.insert(
            ObjectRef::new(1, 0),
            DictBuilder::new()
                .name("Type", "Catalog")
                .insert("Pages", ObjectRef::new(2, 0))
                .into_object(),
        );
        objects.insert(
            ObjectRef::new(2, 0),
            DictBuilder::new()
                .name("Type", "Pages")
                .insert("Kids", Vec::<Object>::new())
                .insert("Count", 0i64)
                .into_object(),
        );
        objects.insert(
            ObjectRef::new(5, 1),
            Object::Stream {
                dict: Dictionary::new(),
                data: bytes::Bytes::from_static(b"BT ET"),
            },
        );
        let trailer = DictBuilder::new()
            .insert("Root", ObjectRef::new(1, 0))
            .insert("Prev", 1234i64)
            .build();
        (objects, trailer)
    }

    fn write(options: SaveOptions) -> Vec<u8> {
        let (objects, trailer) = sample();
        PdfWriter::new(Vec::new(), options)
            .write_document((1, 4), &objects, &trailer)
            .unwrap()
    }

    #[test]
    fn test_classic_table_layout() {
        let bytes = write(SaveOptions::default());
        let content = String::from_utf8_lossy(&bytes);
        assert!(content.starts_with("%PDF-1.4\n"));
        assert!(content.contains("xref\n0 3\n0000000000 65535 f \n"));
        assert!(content.contains("\n5 1\n"));
        assert!(content.contains("/Size 6"));
        assert!(!content.contains("/Prev"));
        assert!(content.ends_with("%%EOF\n"));
    }

    #[test]
    fn test_offsets_match_objects() {
        for options in [SaveOptions::default(), SaveOptions::default().with_xref_stream(true)] {
            let bytes = write(options);
            let mut store = MemoryStore::from_bytes(bytes.clone());
            let start = find_xref_offset(&mut store).unwrap().unwrap();
            let table = parse_xref_chain(&mut store, start, &ParserOptions::strict()).unwrap();
            for id in [1u32, 2, 5] {
                let Some(XRefEntry::Offset { offset, .. }) = table.lookup(id) else {
                    panic!("object {} missing", id);
                };
                let header = format!("{} ", id);
                assert!(bytes[*offset as usize..].starts_with(header.as_bytes()));
            }
            assert_eq!(table.lookup(5).map(XRefEntry::generation), Some(1));
            assert!(table.trailer().contains_key("Root"));
        }
    }

    #[test]
    fn test_xref_stream_bumps_version() {
        let bytes = write(SaveOptions::default().with_xref_stream(true).with_compress_streams(true));
        assert!(bytes.starts_with(b"%PDF-1.5\n"));
        let content = String::from_utf8_lossy(&bytes);
        assert!(content.contains("/Type /XRef"));
        assert!(!content.contains("\nxref\n"));
    }

    #[test]
    fn test_compress_streams() {
        let bytes = write(SaveOptions::default().with_compress_streams(true));
        let content = String::from_utf8_lossy(&bytes);
        assert!(content.contains("/Filter /FlateDecode"));
        assert!(!content.contains("BT ET"));
    }

    #[test]
    fn test_runs_and_widths() {
        let mut offsets = BTreeMap::new();
        offsets.insert(1, (10, 0));
        offsets.insert(2, (20, 0));
        offsets.insert(7, (30, 0));
        let runs = runs(&offsets);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].0, 0);
        assert_eq!(runs[0].1.len(), 3);
        assert_eq!(runs[1].0, 7);
        assert_eq!(byte_width(0), 1);
        assert_eq!(byte_width(255), 1);
        assert_eq!(byte_width(256), 2);
    }
}
