//! Document session.
//!
//! A [`PdfDocument`] owns everything for one open instance: the backing
//! store, the cross-reference table, the trailer, the lazily populated object
//! cache and any in-memory edits. Objects are parsed on first
//! [`resolve`](PdfDocument::resolve) and memoized; edits shadow the table
//! until the next [`save`](PdfDocument::save).

use crate::decoders::{DecodeLimits, Decoded, SecurityHandler, decode_chain, stream_stages};
use crate::error::{Error, Result};
use crate::object::{DictBuilder, Dictionary, Object, ObjectRef};
use crate::objstm::{ObjectStreamContents, parse_object_stream};
use crate::parser::{ParseLimits, find_bytes};
use crate::parser_config::{ParserOptions, StorageStrategy};
use crate::store::{BackingStore, MemoryStore, StoreCursor, open_store, store_from_reader};
use crate::writer::{PdfWriter, SaveOptions};
use crate::xref::{
    CrossRefTable, XRefEntry, find_xref_offset, parse_object_at, parse_xref_chain,
    section_plausible,
};
use crate::xref_reconstruction::reconstruct_xref;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// How far into the file the `%PDF-` marker may appear.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Version assumed when the header marker is present but unreadable.
const FALLBACK_VERSION: (u8, u8) = (1, 4);

/// An object added, replaced or deleted since open.
#[derive(Debug, Clone)]
enum Edit {
    Set(u16, Object),
    Deleted,
}

/// An open document.
///
/// # Example
///
/// ```no_run
/// use pdf_graft::document::PdfDocument;
///
/// let mut doc = PdfDocument::open("sample.pdf")?;
/// println!("version {}.{}", doc.version().0, doc.version().1);
/// println!("{} pages", doc.page_count()?);
/// doc.close()?;
/// # Ok::<(), pdf_graft::error::Error>(())
/// ```
pub struct PdfDocument {
    /// Document bytes
    store: Box<dyn BackingStore>,
    options: ParserOptions,
    /// Header version (major, minor)
    version: (u8, u8),
    xref: CrossRefTable,
    /// Effective trailer (document-level keys only)
    trailer: Dictionary,
    object_cache: HashMap<ObjectRef, Object>,
    /// Parsed object streams by container number
    object_streams: HashMap<u32, ObjectStreamContents>,
    edits: BTreeMap<u32, Edit>,
    /// Objects currently being loaded, to break `/Length` and container cycles
    resolving: HashSet<ObjectRef>,
    security_handler: Option<Box<dyn SecurityHandler>>,
    closed: bool,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("objects", &self.xref.len())
            .field("cached", &self.object_cache.len())
            .field("edits", &self.edits.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl PdfDocument {
    /// Open a file with default (tolerant) options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ParserOptions::default())
    }

    /// Open a file.
    ///
    /// The file is copied into a store of the configured strategy, so the
    /// path may be overwritten by a later save.
    pub fn open_with_options(path: impl AsRef<Path>, options: ParserOptions) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let hint = file.metadata().map(|m| m.len() as usize).unwrap_or(0);
        let mut reader = BufReader::new(file);
        let store = store_from_reader(&options.storage, &mut reader, hint)?;
        Self::from_store(store, options)
    }

    /// Open a document held in memory.
    pub fn from_bytes(data: impl Into<Vec<u8>>, options: ParserOptions) -> Result<Self> {
        let data = data.into();
        let store: Box<dyn BackingStore> = match &options.storage {
            StorageStrategy::Memory => Box::new(MemoryStore::from_bytes(data)),
            strategy => store_from_reader(strategy, &mut data.as_slice(), data.len())?,
        };
        Self::from_store(store, options)
    }

    /// Open a document from any reader.
    pub fn from_reader<R: Read>(mut reader: R, options: ParserOptions) -> Result<Self> {
        let store = store_from_reader(&options.storage, &mut reader, 0)?;
        Self::from_store(store, options)
    }

    /// Open a document from a filled store.
    ///
    /// The store is owned by the document from here on; it is released even
    /// when opening fails.
    pub fn from_store(mut store: Box<dyn BackingStore>, options: ParserOptions) -> Result<Self> {
        match load_table(&mut *store, &options) {
            Ok((version, xref, recovered)) => {
                let mut doc = Self::assemble(store, options, version, xref);
                if !doc.trailer.contains_key("Root") {
                    if doc.options.strict && !recovered {
                        let err = Error::InvalidPdf("trailer has no /Root".to_string());
                        doc.close()?;
                        return Err(err);
                    }
                    log::warn!("No document catalog found, creating an empty one");
                    doc.synthesize_catalog();
                }
                Ok(doc)
            },
            Err(e) => {
                if let Err(release_err) = store.release() {
                    log::warn!("Failed to release store after open error: {}", release_err);
                }
                Err(e)
            },
        }
    }

    /// Create an empty document (catalog and empty page tree).
    pub fn new() -> Result<Self> {
        Self::new_with_options(ParserOptions::default())
    }

    /// Create an empty document backed by the configured storage strategy.
    pub fn new_with_options(options: ParserOptions) -> Result<Self> {
        let store = open_store(&options.storage, 0)?;
        let mut doc = Self::assemble(store, options, (1, 7), CrossRefTable::new());
        doc.synthesize_catalog();
        Ok(doc)
    }

    fn assemble(
        store: Box<dyn BackingStore>,
        options: ParserOptions,
        version: (u8, u8),
        xref: CrossRefTable,
    ) -> Self {
        let trailer = xref.trailer();
        Self {
            store,
            options,
            version,
            xref,
            trailer,
            object_cache: HashMap::new(),
            object_streams: HashMap::new(),
            edits: BTreeMap::new(),
            resolving: HashSet::new(),
            security_handler: None,
            closed: false,
        }
    }

    fn synthesize_catalog(&mut self) {
        let pages = self.add_object(
            DictBuilder::new()
                .name("Type", "Pages")
                .insert("Kids", Vec::<Object>::new())
                .insert("Count", 0i64)
                .into_object(),
        );
        let catalog = self.add_object(
            DictBuilder::new()
                .name("Type", "Catalog")
                .insert("Pages", pages)
                .into_object(),
        );
        self.trailer.insert("Root".to_string(), Object::Reference(catalog));
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::DocumentClosed)
        } else {
            Ok(())
        }
    }

    /// Header version (major, minor).
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Options the document was opened with.
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Cross-reference table as read at open time.
    pub fn xref(&self) -> &CrossRefTable {
        &self.xref
    }

    /// Effective trailer.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Mutable trailer, for `/Info` and similar document-level keys.
    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.trailer
    }

    /// Whether the trailer names an `/Encrypt` dictionary.
    pub fn is_encrypted(&self) -> bool {
        self.trailer.contains_key("Encrypt")
    }

    /// Install the handler that decrypts stream bytes.
    pub fn set_security_handler(&mut self, handler: Box<dyn SecurityHandler>) {
        self.security_handler = Some(handler);
        self.object_streams.clear();
    }

    /// Whether a security handler is installed.
    pub fn has_security_handler(&self) -> bool {
        self.security_handler.is_some()
    }

    /// Resolve an indirect object.
    ///
    /// The first resolution parses the object and caches it. A malformed or
    /// missing object is an error in strict mode and null in tolerant mode.
    pub fn resolve(&mut self, id: ObjectRef) -> Result<Object> {
        self.ensure_open()?;
        let edited = self.edits.get(&id.id).map(|edit| match edit {
            Edit::Set(gen, obj) if *gen == id.gen => Some(obj.clone()),
            _ => None,
        });
        match edited {
            Some(Some(obj)) => return Ok(obj),
            Some(None) => return self.substitute(id, Error::ObjectNotFound(id)),
            None => {},
        }
        if let Some(cached) = self.object_cache.get(&id) {
            return Ok(cached.clone());
        }

        if !self.resolving.insert(id) {
            return self.substitute(
                id,
                Error::InvalidPdf(format!("object {} depends on itself while loading", id)),
            );
        }
        let loaded = self.load_entry(id);
        self.resolving.remove(&id);

        match loaded {
            Ok(obj) => {
                self.object_cache.insert(id, obj.clone());
                Ok(obj)
            },
            Err(e) => self.substitute(id, e),
        }
    }

    /// Null for structural errors in tolerant mode, the error otherwise.
    fn substitute(&mut self, id: ObjectRef, err: Error) -> Result<Object> {
        if self.options.strict || !err.is_structural() {
            return Err(err);
        }
        log::warn!("Substituting null for object {}: {}", id, err);
        if !self.edits.contains_key(&id.id) {
            self.object_cache.insert(id, Object::Null);
        }
        Ok(Object::Null)
    }

    /// Resolve `obj` if it is a reference, otherwise return a copy.
    pub fn resolve_object(&mut self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(id) => self.resolve(*id),
            other => Ok(other.clone()),
        }
    }

    fn load_entry(&mut self, id: ObjectRef) -> Result<Object> {
        match self.xref.lookup(id.id).copied() {
            Some(XRefEntry::Offset { offset, generation }) if generation == id.gen => {
                let limits = ParseLimits::from(&self.options);
                let (found, obj) = parse_object_at(&mut *self.store, offset, &limits)?;
                if found != id {
                    return Err(Error::parse(
                        offset as usize,
                        format!("expected object {}, found {}", id, found),
                    ));
                }
                self.apply_indirect_length(id, obj)
            },
            Some(XRefEntry::InObjectStream { container, index }) if id.gen == 0 => {
                self.load_compressed(id, container, index)
            },
            _ => Err(Error::ObjectNotFound(id)),
        }
    }

    /// Trim stream data to an indirect `/Length`.
    ///
    /// The parser cannot see indirect lengths, so it scans to `endstream`.
    fn apply_indirect_length(&mut self, id: ObjectRef, obj: Object) -> Result<Object> {
        let Object::Stream { dict, data } = obj else {
            return Ok(obj);
        };
        let Some(Object::Reference(length_ref)) = dict.get("Length") else {
            return Ok(Object::Stream { dict, data });
        };
        let length = self.resolve(*length_ref)?.as_integer();
        let data = match length.and_then(|l| usize::try_from(l).ok()) {
            Some(len) if len <= data.len() => data.slice(..len),
            Some(len) if self.options.strict => {
                return Err(Error::InvalidPdf(format!(
                    "stream {} /Length {} exceeds {} bytes before endstream",
                    id,
                    len,
                    data.len()
                )));
            },
            other => {
                log::warn!(
                    "Stream {} has unusable /Length {:?}, keeping {} scanned bytes",
                    id,
                    other,
                    data.len()
                );
                data
            },
        };
        Ok(Object::Stream { dict, data })
    }

    fn load_compressed(&mut self, id: ObjectRef, container: u32, index: u32) -> Result<Object> {
        if !self.object_streams.contains_key(&container) {
            let contents = self.load_object_stream(container)?;
            self.object_streams.insert(container, contents);
        }
        let contents = self
            .object_streams
            .get(&container)
            .ok_or(Error::ObjectNotFound(id))?;
        match contents.get(index as usize) {
            Some((number, obj)) if *number == id.id => Ok(obj.clone()),
            _ => {
                log::debug!(
                    "Object {} not at index {} of stream {}, searching",
                    id,
                    index,
                    container
                );
                contents
                    .iter()
                    .find(|(number, _)| *number == id.id)
                    .map(|(_, obj)| obj.clone())
                    .ok_or(Error::ObjectNotFound(id))
            },
        }
    }

    fn load_object_stream(&mut self, container: u32) -> Result<ObjectStreamContents> {
        let container_ref = ObjectRef::new(container, 0);
        let stream = self.resolve(container_ref)?;
        let decoded = self.decode_stream_object(container_ref, &stream)?;
        let data = match decoded.error {
            Some(e) if self.options.strict => return Err(e),
            Some(e) => {
                log::warn!("Object stream {} only partially decoded: {}", container, e);
                decoded.data
            },
            None => decoded.data,
        };
        let dict = stream.as_dict().ok_or_else(|| Error::InvalidObjectType {
            expected: "Stream".to_string(),
            found: stream.type_name().to_string(),
        })?;
        let contents = parse_object_stream(dict, &data, &self.options)?;
        log::debug!("Loaded object stream {} with {} objects", container, contents.len());
        Ok(contents)
    }

    /// Raw stream bytes with encryption removed.
    ///
    /// Cross-reference streams are never encrypted.
    pub fn decrypted_stream_bytes(
        &self,
        id: ObjectRef,
        dict: &Dictionary,
        data: &bytes::Bytes,
    ) -> Result<bytes::Bytes> {
        let xref_stream = dict.get("Type").and_then(Object::as_name) == Some("XRef");
        if !self.is_encrypted() || xref_stream {
            return Ok(data.clone());
        }
        match &self.security_handler {
            Some(handler) => Ok(bytes::Bytes::from(handler.decrypt_stream(id, data)?)),
            None => Err(Error::Unsupported(format!(
                "stream {} is encrypted and no security handler is installed",
                id
            ))),
        }
    }

    /// Decode a resolved stream object through its filter chain.
    fn decode_stream_object(&mut self, id: ObjectRef, obj: &Object) -> Result<Decoded> {
        let Object::Stream { dict, data } = obj else {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: obj.type_name().to_string(),
            });
        };
        let mut dict = dict.clone();
        for key in ["Filter", "DecodeParms"] {
            let resolved = match dict.get(key) {
                Some(Object::Reference(r)) => self.resolve(*r)?,
                Some(Object::Array(items)) if items.iter().any(|i| i.as_reference().is_some()) => {
                    let items = items.clone();
                    let mut out = Vec::with_capacity(items.len());
                    for item in &items {
                        out.push(self.resolve_object(item)?);
                    }
                    Object::Array(out)
                },
                _ => continue,
            };
            dict.insert(key.to_string(), resolved);
        }
        let raw = self.decrypted_stream_bytes(id, &dict, data)?;
        let stages = stream_stages(&dict)?;
        Ok(decode_chain(&raw, &stages, &DecodeLimits::from(&self.options)))
    }

    /// Decoded content of stream `id`; any filter error fails the call.
    pub fn stream_data(&mut self, id: ObjectRef) -> Result<Vec<u8>> {
        self.stream_data_lossy(id)?.into_result()
    }

    /// Decoded content of stream `id`, keeping a partial prefix on filter
    /// errors.
    pub fn stream_data_lossy(&mut self, id: ObjectRef) -> Result<Decoded> {
        let obj = self.resolve(id)?;
        let decoded = self.decode_stream_object(id, &obj)?;
        if let Some(e) = &decoded.error {
            log::warn!("Stream {} decoded partially: {}", id, e);
        }
        Ok(decoded)
    }

    /// Reference to the document catalog.
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("trailer /Root is not a reference".to_string()))
    }

    /// The document catalog dictionary.
    pub fn catalog(&mut self) -> Result<Dictionary> {
        let root = self.catalog_ref()?;
        match self.resolve(root)? {
            Object::Dictionary(dict) => Ok(dict),
            other => Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Root node of the page tree.
    pub fn pages_root(&mut self) -> Result<ObjectRef> {
        self.catalog()?
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("catalog /Pages is not a reference".to_string()))
    }

    /// Leaf pages in document order.
    ///
    /// Nodes already visited are skipped, so cyclic `/Kids` terminate.
    pub fn pages(&mut self) -> Result<Vec<ObjectRef>> {
        let root = self.pages_root()?;
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root];

        while let Some(node_ref) = stack.pop() {
            if !visited.insert(node_ref) {
                log::warn!("Page tree revisits {}, skipping", node_ref);
                continue;
            }
            let node = self.resolve(node_ref)?;
            let Some(dict) = node.as_dict() else {
                log::warn!("Page tree node {} is not a dictionary", node_ref);
                continue;
            };
            let kids = dict.get("Kids").and_then(Object::as_array);
            match (dict.get("Type").and_then(Object::as_name), kids) {
                (Some("Pages"), Some(kids)) | (None, Some(kids)) => {
                    stack.extend(kids.iter().rev().filter_map(Object::as_reference));
                },
                (Some("Pages"), None) => log::warn!("Pages node {} missing /Kids", node_ref),
                _ => pages.push(node_ref),
            }
        }
        Ok(pages)
    }

    /// Number of leaf pages.
    pub fn page_count(&mut self) -> Result<usize> {
        Ok(self.pages()?.len())
    }

    /// Highest object number in use or reserved.
    pub fn max_object_number(&self) -> u32 {
        let edited = self.edits.keys().next_back().copied().unwrap_or(0);
        self.xref.max_object_number().max(edited)
    }

    /// Every live object id, ascending.
    pub fn object_ids(&self) -> Vec<ObjectRef> {
        let mut ids: BTreeMap<u32, u16> = self
            .xref
            .object_refs()
            .into_iter()
            .map(|r| (r.id, r.gen))
            .collect();
        for (&number, edit) in &self.edits {
            match edit {
                Edit::Set(gen, _) => {
                    ids.insert(number, *gen);
                },
                Edit::Deleted => {
                    ids.remove(&number);
                },
            }
        }
        ids.into_iter().map(|(id, gen)| ObjectRef::new(id, gen)).collect()
    }

    /// Reserve a fresh object number beyond every existing one.
    ///
    /// The number holds null until [`set_object`](Self::set_object).
    pub fn allocate_id(&mut self) -> ObjectRef {
        let id = ObjectRef::new(self.max_object_number() + 1, 0);
        self.edits.insert(id.id, Edit::Set(0, Object::Null));
        id
    }

    /// Add an object under a fresh number.
    pub fn add_object(&mut self, obj: Object) -> ObjectRef {
        let id = self.allocate_id();
        self.edits.insert(id.id, Edit::Set(id.gen, obj));
        id
    }

    /// Replace (or create) object `id`.
    pub fn set_object(&mut self, id: ObjectRef, obj: Object) -> Result<()> {
        self.ensure_open()?;
        self.edits.insert(id.id, Edit::Set(id.gen, obj));
        Ok(())
    }

    /// Delete object `id`; later references to it resolve as missing.
    pub fn delete_object(&mut self, id: ObjectRef) -> Result<()> {
        self.ensure_open()?;
        self.edits.insert(id.id, Edit::Deleted);
        Ok(())
    }

    /// Save to `path` with default options.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.save_with_options(path, &SaveOptions::default())
    }

    /// Save to `path`.
    ///
    /// The file is staged completely before `path` is touched, so saving over
    /// the document's own source is safe.
    pub fn save_with_options(
        &mut self,
        path: impl AsRef<Path>,
        options: &SaveOptions,
    ) -> Result<()> {
        let mut staged = self.stage(options)?;
        let copied = File::create(path.as_ref())
            .map_err(Error::from)
            .and_then(|mut file| {
                copy_store(&mut *staged, &mut file)?;
                file.sync_all()?;
                Ok(())
            });
        staged.release()?;
        copied
    }

    /// Save into any writer.
    pub fn save_to_writer<W: Write>(&mut self, mut writer: W, options: &SaveOptions) -> Result<()> {
        let mut staged = self.stage(options)?;
        let copied = copy_store(&mut *staged, &mut writer).and_then(|_| Ok(writer.flush()?));
        staged.release()?;
        copied
    }

    /// Save into a byte vector.
    pub fn save_to_bytes(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.save_to_writer(&mut out, options)?;
        Ok(out)
    }

    /// Write every reachable object into a fresh store.
    fn stage(&mut self, options: &SaveOptions) -> Result<Box<dyn BackingStore>> {
        self.ensure_open()?;
        if !self.trailer.contains_key("ID") && !self.is_encrypted() {
            let id = uuid::Uuid::new_v4().as_bytes().to_vec();
            self.trailer.insert(
                "ID".to_string(),
                Object::Array(vec![Object::String(id.clone()), Object::String(id)]),
            );
        }
        let objects = self.reachable_objects()?;
        log::info!("Saving {} reachable objects", objects.len());

        let mut staged = open_store(&self.options.storage, self.store.len() as usize)?;
        let written = PdfWriter::new(StoreCursor::new(&mut *staged), options.clone())
            .write_document(self.version, &objects, &self.trailer)
            .map(drop);
        match written {
            Ok(_) => Ok(staged),
            Err(e) => {
                staged.release().ok();
                Err(e)
            },
        }
    }

    /// Whether `id` names an object that exists, edited or on file.
    fn is_live(&self, id: ObjectRef) -> bool {
        match self.edits.get(&id.id) {
            Some(Edit::Set(gen, _)) => *gen == id.gen,
            Some(Edit::Deleted) => false,
            None => self.object_ids().binary_search(&id).is_ok(),
        }
    }

    /// Objects reachable from the trailer, keyed by id.
    ///
    /// Objects that cannot be found are left out; references to them read
    /// back as null.
    fn reachable_objects(&mut self) -> Result<BTreeMap<ObjectRef, Object>> {
        let mut objects = BTreeMap::new();
        let mut queue: Vec<ObjectRef> = Vec::new();
        for key in ["Root", "Info", "Encrypt"] {
            if let Some(r) = self.trailer.get(key).and_then(Object::as_reference) {
                queue.push(r);
            }
        }

        let mut refs = Vec::new();
        while let Some(id) = queue.pop() {
            if objects.contains_key(&id) {
                continue;
            }
            let obj = match self.resolve(id) {
                Ok(Object::Null) if !self.is_live(id) => {
                    log::debug!("Dropping dangling reference {} from output", id);
                    continue;
                },
                Ok(obj) => obj,
                Err(Error::ObjectNotFound(_)) => {
                    log::debug!("Dropping dangling reference {} from output", id);
                    continue;
                },
                Err(e) => return Err(e),
            };
            refs.clear();
            match &obj {
                // The writer gives every stream a direct /Length
                Object::Stream { dict, .. } => {
                    for (key, value) in dict {
                        if key != "Length" {
                            value.collect_references(&mut refs);
                        }
                    }
                },
                other => other.collect_references(&mut refs),
            }
            queue.extend(refs.iter().filter(|r| !objects.contains_key(*r)));
            objects.insert(id, obj);
        }
        Ok(objects)
    }

    /// Release the store. Further resolution fails with `DocumentClosed`.
    ///
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.object_cache.clear();
        self.object_streams.clear();
        self.edits.clear();
        log::debug!("Closing document");
        self.store.release()
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for PdfDocument {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to release document store: {}", e);
        }
    }
}

fn copy_store<W: Write>(store: &mut dyn BackingStore, out: &mut W) -> Result<()> {
    let mut chunk = vec![0u8; 64 * 1024];
    let mut offset = 0u64;
    loop {
        let n = store.read_at(offset, &mut chunk)?;
        if n == 0 {
            return Ok(());
        }
        out.write_all(&chunk[..n])?;
        offset += n as u64;
    }
}

/// Read the header version from the first kilobyte.
///
/// Leading junk before `%PDF-` is tolerated. A missing marker is always an
/// error; an unreadable version number is an error only in strict mode.
pub fn parse_header(store: &mut dyn BackingStore, strict: bool) -> Result<(u8, u8)> {
    let head = store.read_range(0, HEADER_SEARCH_WINDOW)?;
    let Some(pos) = find_bytes(&head, b"%PDF-") else {
        return Err(Error::InvalidHeader(
            String::from_utf8_lossy(&head[..head.len().min(8)]).into_owned(),
        ));
    };
    if pos > 0 {
        log::warn!("Skipping {} bytes before header", pos);
    }

    let rest = &head[pos + 5..];
    let number = |digits: &[u8]| -> Option<(u8, usize)> {
        let len = digits.iter().take_while(|c| c.is_ascii_digit()).count();
        let value = std::str::from_utf8(&digits[..len]).ok()?.parse().ok()?;
        Some((value, len))
    };
    let version = number(rest).and_then(|(major, len)| {
        let after = rest.get(len..)?;
        if after.first() != Some(&b'.') {
            return None;
        }
        number(&after[1..]).map(|(minor, _)| (major, minor))
    });

    match version {
        Some(version) => Ok(version),
        None if strict => Err(Error::InvalidHeader(
            String::from_utf8_lossy(&head[pos..(pos + 8).min(head.len())]).into_owned(),
        )),
        None => {
            log::warn!("Unreadable header version, assuming {:?}", FALLBACK_VERSION);
            Ok(FALLBACK_VERSION)
        },
    }
}

/// Header plus cross-reference table, recovering when the structured table
/// cannot be used. The flag reports whether recovery ran.
fn load_table(
    store: &mut dyn BackingStore,
    options: &ParserOptions,
) -> Result<((u8, u8), CrossRefTable, bool)> {
    let version = parse_header(store, options.strict)?;

    if options.force_recovery {
        log::info!("Forced recovery, skipping cross-reference table");
        return Ok((version, recover(store, options)?, true));
    }

    let start = match find_xref_offset(store)? {
        Some(offset) if section_plausible(store, offset)? => offset,
        Some(offset) => {
            log::warn!("startxref {} does not point at a cross-reference section", offset);
            return Ok((version, recover(store, options)?, true));
        },
        None => {
            log::warn!("No usable startxref found");
            return Ok((version, recover(store, options)?, true));
        },
    };

    match parse_xref_chain(store, start, options) {
        Ok(table) if table.trailer().contains_key("Root") || options.strict => {
            Ok((version, table, false))
        },
        Ok(_) => {
            log::warn!("Cross-reference trailer has no /Root, recovering");
            Ok((version, recover(store, options)?, true))
        },
        Err(e) if options.strict || !e.is_structural() => Err(e),
        Err(e) => {
            log::warn!("Cross-reference table unusable ({}), recovering", e);
            Ok((version, recover(store, options)?, true))
        },
    }
}

fn recover(store: &mut dyn BackingStore, options: &ParserOptions) -> Result<CrossRefTable> {
    let section = reconstruct_xref(store, options)?;
    Ok(CrossRefTable::from_generations(vec![section]))
}
