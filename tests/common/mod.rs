//! Shared fixtures: builds small documents byte by byte so offsets are exact.

#![allow(dead_code)]

use std::collections::BTreeMap;

/// Initialize logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Assembles a document from raw object bodies.
#[derive(Debug, Clone)]
pub struct PdfBuilder {
    version: String,
    objects: BTreeMap<u32, Vec<u8>>,
    trailer: String,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.4".to_string(),
            objects: BTreeMap::new(),
            trailer: "/Root 1 0 R".to_string(),
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Add object `id` (generation 0) with `body` between `obj` and `endobj`.
    pub fn object(self, id: u32, body: &str) -> Self {
        self.raw_object(id, body.as_bytes().to_vec())
    }

    pub fn raw_object(mut self, id: u32, body: Vec<u8>) -> Self {
        self.objects.insert(id, body);
        self
    }

    /// Stream object with a direct `/Length`.
    pub fn stream(self, id: u32, dict_entries: &str, data: &[u8]) -> Self {
        let mut body =
            format!("<< {} /Length {} >>\nstream\n", dict_entries, data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.raw_object(id, body)
    }

    /// Trailer entries other than `/Size`.
    pub fn trailer(mut self, entries: &str) -> Self {
        self.trailer = entries.to_string();
        self
    }

    /// Header and object bodies, returning each object's offset.
    pub fn body(&self) -> (Vec<u8>, BTreeMap<u32, usize>) {
        let mut out = format!("%PDF-{}\n%\u{e2}\u{e3}\n", self.version).into_bytes();
        let mut offsets = BTreeMap::new();
        for (&id, body) in &self.objects {
            offsets.insert(id, out.len());
            out.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }
        (out, offsets)
    }

    /// Complete file with a classic cross-reference table.
    pub fn build(&self) -> Vec<u8> {
        let (mut out, offsets) = self.body();
        let size = offsets.keys().next_back().map_or(1, |&max| max + 1);
        let xref_at = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
        for id in 0..size {
            match offsets.get(&id) {
                Some(offset) => {
                    out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes())
                },
                None => out.extend_from_slice(b"0000000000 65535 f \n"),
            }
        }
        let trailer = format!("trailer\n<< /Size {} {} >>\n", size, self.trailer);
        out.extend_from_slice(trailer.as_bytes());
        out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_at).as_bytes());
        out
    }

    /// File with no cross-reference data at all.
    pub fn build_without_xref(&self) -> Vec<u8> {
        let (mut out, _) = self.body();
        out.extend_from_slice(b"%%EOF\n");
        out
    }
}

/// Catalog 1, page tree 2, then `n` pages, each with its own content stream.
pub fn pages_pdf(n: u32) -> PdfBuilder {
    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 3 + 2 * i)).collect();
    let mut builder = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            &format!(
                "<< /Type /Pages /Kids [{}] /Count {} /MediaBox [0 0 612 792] >>",
                kids.join(" "),
                n
            ),
        );
    for i in 0..n {
        let page = 3 + 2 * i;
        builder = builder
            .object(page, &format!("<< /Type /Page /Parent 2 0 R /Contents {} 0 R >>", page + 1))
            .stream(page + 1, "", format!("BT (page {}) Tj ET", i + 1).as_bytes());
    }
    builder
}
