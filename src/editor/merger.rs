//! Cross-document merging.
//!
//! [`ObjectCloner`] copies a source subgraph into a destination document.
//! Every source reference is mapped to a freshly allocated destination number
//! the first time it is seen, before its children are visited, so cycles
//! terminate and shared objects stay shared. The map lives for one cloner, so
//! each [`Merger::append`] call is an independent pass: identical objects from
//! two different sources are never merged into one.

use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser_config::ParserOptions;
use crate::writer::SaveOptions;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// Page attributes a page may inherit from its ancestors.
const INHERITABLE_PAGE_KEYS: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// Deep-copies objects from `src` into `dest`.
pub struct ObjectCloner<'a> {
    src: &'a mut PdfDocument,
    dest: &'a mut PdfDocument,
    /// Source reference to destination reference
    map: HashMap<ObjectRef, ObjectRef>,
    /// Mapped objects whose content has not been copied yet
    pending: VecDeque<(ObjectRef, ObjectRef)>,
    copied: usize,
}

impl<'a> ObjectCloner<'a> {
    /// Cloner with an empty identity map.
    pub fn new(src: &'a mut PdfDocument, dest: &'a mut PdfDocument) -> Self {
        Self {
            src,
            dest,
            map: HashMap::new(),
            pending: VecDeque::new(),
            copied: 0,
        }
    }

    /// Destination number for `src_ref` without scheduling a copy.
    ///
    /// The caller is responsible for filling the reserved object.
    pub fn reserve(&mut self, src_ref: ObjectRef) -> ObjectRef {
        if let Some(&dest_ref) = self.map.get(&src_ref) {
            return dest_ref;
        }
        let dest_ref = self.dest.allocate_id();
        self.map.insert(src_ref, dest_ref);
        dest_ref
    }

    fn map_ref(&mut self, src_ref: ObjectRef) -> ObjectRef {
        if let Some(&dest_ref) = self.map.get(&src_ref) {
            return dest_ref;
        }
        let dest_ref = self.reserve(src_ref);
        self.pending.push_back((src_ref, dest_ref));
        dest_ref
    }

    /// Copy of `value` with every reference rewritten into the destination.
    fn remap(&mut self, value: &Object) -> Object {
        match value {
            Object::Reference(r) => Object::Reference(self.map_ref(*r)),
            Object::Array(items) => Object::Array(items.iter().map(|i| self.remap(i)).collect()),
            Object::Dictionary(dict) => Object::Dictionary(self.remap_dict(dict)),
            Object::Stream { dict, data } => Object::Stream {
                dict: self.remap_dict(dict),
                data: data.clone(),
            },
            other => other.clone(),
        }
    }

    fn remap_dict(&mut self, dict: &Dictionary) -> Dictionary {
        dict.iter()
            .map(|(key, value)| (key.clone(), self.remap(value)))
            .collect()
    }

    /// Clone a direct value and everything it references.
    pub fn clone_value(&mut self, value: &Object) -> Result<Object> {
        let copy = self.remap(value);
        self.drain()?;
        Ok(copy)
    }

    /// Clone the indirect object `src_ref` and everything it references.
    pub fn clone_ref(&mut self, src_ref: ObjectRef) -> Result<ObjectRef> {
        let dest_ref = self.map_ref(src_ref);
        self.drain()?;
        Ok(dest_ref)
    }

    /// Store `value` (remapped) under a number obtained from [`reserve`](Self::reserve).
    pub fn fill(&mut self, dest_ref: ObjectRef, value: &Object) -> Result<()> {
        let copy = self.remap(value);
        self.dest.set_object(dest_ref, copy)?;
        self.copied += 1;
        Ok(())
    }

    /// Copy every pending object.
    pub fn drain(&mut self) -> Result<()> {
        while let Some((src_ref, dest_ref)) = self.pending.pop_front() {
            let obj = match self.src.resolve(src_ref)? {
                // Raw bytes are copied still encoded; only encryption is removed
                Object::Stream { mut dict, data } => {
                    let data = self.src.decrypted_stream_bytes(src_ref, &dict, &data)?;
                    if matches!(dict.get("Length"), Some(Object::Reference(_))) {
                        dict.insert("Length".to_string(), Object::Integer(data.len() as i64));
                    }
                    Object::Stream { dict, data }
                },
                other => other,
            };
            self.fill(dest_ref, &obj)?;
        }
        Ok(())
    }

    /// Number of objects written into the destination.
    pub fn copied(&self) -> usize {
        self.copied
    }

    /// The identity map built so far.
    pub fn mapping(&self) -> &HashMap<ObjectRef, ObjectRef> {
        &self.map
    }
}

/// Clone `value` from `src` into `dest` in a fresh merge pass.
pub fn clone_for_new_document(
    value: &Object,
    src: &mut PdfDocument,
    dest: &mut PdfDocument,
) -> Result<Object> {
    ObjectCloner::new(src, dest).clone_value(value)
}

/// Result of one append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Pages appended
    pub pages: usize,
    /// Objects created in the destination
    pub objects: usize,
}

/// Appends the pages of one document to another.
#[derive(Debug, Default, Clone, Copy)]
pub struct Merger;

impl Merger {
    /// Append every page of `src` to the end of `dest`'s page tree.
    ///
    /// Pages land under the destination's root page node in source order.
    /// Inherited attributes are copied onto each page, since the source
    /// ancestors are not, and attributes the source left at their defaults
    /// are written out so the destination root cannot supply them. The source
    /// `/Info` is copied when `dest` has none.
    pub fn append(dest: &mut PdfDocument, src: &mut PdfDocument) -> Result<MergeStats> {
        if src.is_encrypted() && !src.has_security_handler() {
            return Err(Error::Unsupported(
                "cannot merge an encrypted document without a security handler".to_string(),
            ));
        }

        let src_pages = src.pages()?;
        let dest_root = dest.pages_root()?;
        let src_info = src.trailer().get("Info").cloned();
        let dest_has_info = dest.trailer().contains_key("Info");

        let mut page_dicts = Vec::with_capacity(src_pages.len());
        for &page in &src_pages {
            let mut dict = match src.resolve(page)? {
                Object::Dictionary(dict) => dict,
                other => {
                    return Err(Error::InvalidObjectType {
                        expected: "Dictionary".to_string(),
                        found: other.type_name().to_string(),
                    });
                },
            };
            materialize_inherited(src, &mut dict)?;
            pin_page_defaults(&mut dict);
            dict.shift_remove("Parent");
            page_dicts.push((page, dict));
        }

        let mut cloner = ObjectCloner::new(src, dest);
        let new_pages: Vec<ObjectRef> = src_pages.iter().map(|&p| cloner.reserve(p)).collect();
        for ((src_page, dict), &dest_page) in page_dicts.iter().zip(&new_pages) {
            let mut page = Object::Dictionary(cloner.remap_dict(dict));
            if let Some(d) = page.as_dict_mut() {
                d.insert("Parent".to_string(), Object::Reference(dest_root));
            }
            cloner.dest.set_object(dest_page, page)?;
            cloner.copied += 1;
            log::debug!("Page {} copied as {}", src_page, dest_page);
        }
        cloner.drain()?;

        let info = match src_info {
            Some(info) if !dest_has_info => Some(cloner.clone_value(&info)?),
            _ => None,
        };
        let objects = cloner.copied();
        drop(cloner);

        if let Some(info) = info {
            dest.trailer_mut().insert("Info".to_string(), info);
        }
        append_kids(dest, dest_root, &new_pages)?;

        let stats = MergeStats {
            pages: new_pages.len(),
            objects,
        };
        log::info!("Appended {} pages ({} objects)", stats.pages, stats.objects);
        Ok(stats)
    }
}

/// Copy inheritable attributes from the ancestors of `page` onto it.
fn materialize_inherited(src: &mut PdfDocument, page: &mut Dictionary) -> Result<()> {
    let mut visited = HashSet::new();
    let mut parent = page.get("Parent").and_then(Object::as_reference);
    while let Some(node_ref) = parent {
        if !visited.insert(node_ref) {
            break;
        }
        let node = src.resolve(node_ref)?;
        let Some(node) = node.as_dict() else {
            break;
        };
        for key in INHERITABLE_PAGE_KEYS {
            if !page.contains_key(key) {
                if let Some(value) = node.get(key) {
                    page.insert(key.to_string(), value.clone());
                }
            }
        }
        parent = node.get("Parent").and_then(Object::as_reference);
    }
    Ok(())
}

/// Write out the implicit values of inheritable attributes the page lacks.
///
/// `/Rotate` defaults to 0, `/Resources` to an empty dictionary and
/// `/CropBox` to the media box.
fn pin_page_defaults(page: &mut Dictionary) {
    if !page.contains_key("Rotate") {
        page.insert("Rotate".to_string(), Object::Integer(0));
    }
    if !page.contains_key("Resources") {
        page.insert("Resources".to_string(), Object::Dictionary(Dictionary::new()));
    }
    if !page.contains_key("CropBox") {
        match page.get("MediaBox").cloned() {
            Some(media_box) => {
                page.insert("CropBox".to_string(), media_box);
            },
            None => log::warn!("Appended page has no /MediaBox"),
        }
    }
}

/// Add `pages` to the end of `root`'s `/Kids` and bump its `/Count`.
fn append_kids(dest: &mut PdfDocument, root: ObjectRef, pages: &[ObjectRef]) -> Result<()> {
    let mut root_obj = dest.resolve(root)?;
    let Some(root_dict) = root_obj.as_dict_mut() else {
        return Err(Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: root_obj.type_name().to_string(),
        });
    };

    let added = pages.iter().map(|&p| Object::Reference(p));
    match root_dict.get("Kids").cloned() {
        Some(Object::Reference(kids_ref)) => {
            let mut kids = dest.resolve(kids_ref)?;
            match kids.as_array_mut() {
                Some(array) => array.extend(added),
                None => kids = Object::Array(added.collect()),
            }
            dest.set_object(kids_ref, kids)?;
        },
        Some(Object::Array(mut kids)) => {
            kids.extend(added);
            root_dict.insert("Kids".to_string(), Object::Array(kids));
        },
        _ => {
            root_dict.insert("Kids".to_string(), Object::Array(added.collect()));
        },
    }

    let count = root_dict.get("Count").and_then(Object::as_integer).unwrap_or(0);
    root_dict.insert("Count".to_string(), Object::Integer(count + pages.len() as i64));
    dest.set_object(root, root_obj)
}

/// A document to merge.
#[derive(Debug, Clone)]
pub enum MergeSource {
    /// File on disk
    Path(PathBuf),
    /// In-memory bytes
    Bytes(Vec<u8>),
}

/// Merges several documents into one, in the order they were added.
///
/// # Example
///
/// ```no_run
/// use pdf_graft::editor::PdfMerger;
///
/// let mut merger = PdfMerger::new();
/// merger.add_file("a.pdf").add_file("b.pdf");
/// merger.merge_to("combined.pdf")?;
/// # Ok::<(), pdf_graft::error::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct PdfMerger {
    options: ParserOptions,
    save_options: SaveOptions,
    sources: Vec<MergeSource>,
}

impl PdfMerger {
    /// Merger with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options used to open every source and the destination.
    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    /// Options used when writing the result.
    pub fn with_save_options(mut self, save_options: SaveOptions) -> Self {
        self.save_options = save_options;
        self
    }

    /// Queue a file.
    pub fn add_file(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.sources.push(MergeSource::Path(path.as_ref().to_path_buf()));
        self
    }

    /// Queue an in-memory document.
    pub fn add_bytes(&mut self, data: impl Into<Vec<u8>>) -> &mut Self {
        self.sources.push(MergeSource::Bytes(data.into()));
        self
    }

    /// Number of queued sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Merge every source into a new document.
    pub fn merge(&self) -> Result<PdfDocument> {
        let mut dest = PdfDocument::new_with_options(self.options.clone())?;
        for source in &self.sources {
            let mut src = match source {
                MergeSource::Path(path) => {
                    PdfDocument::open_with_options(path, self.options.clone())?
                },
                MergeSource::Bytes(data) => {
                    PdfDocument::from_bytes(data.clone(), self.options.clone())?
                },
            };
            Merger::append(&mut dest, &mut src)?;
            src.close()?;
        }
        Ok(dest)
    }

    /// Merge every source and save the result to `path`.
    pub fn merge_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut dest = self.merge()?;
        dest.save_with_options(path, &self.save_options)?;
        dest.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DictBuilder;

    /// Document with `n` pages, each carrying `extra` entries.
    fn doc_with_pages(n: usize, extra: impl Fn(&mut PdfDocument) -> Dictionary) -> PdfDocument {
        let mut doc = PdfDocument::new().unwrap();
        let root = doc.pages_root().unwrap();
        let mut kids = Vec::new();
        for _ in 0..n {
            let mut page = extra(&mut doc);
            page.insert("Type".to_string(), Object::name("Page"));
            page.insert("Parent".to_string(), Object::Reference(root));
            kids.push(Object::Reference(doc.add_object(Object::Dictionary(page))));
        }
        let tree = DictBuilder::new()
            .name("Type", "Pages")
            .insert("Kids", kids)
            .insert("Count", n as i64)
            .into_object();
        doc.set_object(root, tree).unwrap();
        doc
    }

    #[test]
    fn test_cycle_clones_once() {
        let mut src = PdfDocument::new().unwrap();
        let a = src.allocate_id();
        src.set_object(a, DictBuilder::new().insert("Self", a).into_object()).unwrap();
        let mut dest = PdfDocument::new().unwrap();
        let before = dest.object_ids().len();

        let copy = clone_for_new_document(&Object::Reference(a), &mut src, &mut dest).unwrap();
        let copy_ref = copy.as_reference().unwrap();
        assert_eq!(dest.object_ids().len(), before + 1);
        assert_eq!(
            dest.resolve(copy_ref).unwrap().get("Self"),
            Some(&Object::Reference(copy_ref))
        );
    }

    #[test]
    fn test_shared_object_stays_shared() {
        let mut src = PdfDocument::new().unwrap();
        let shared = src.add_object(Object::Integer(1));
        let array = Object::Array(vec![Object::Reference(shared), Object::Reference(shared)]);
        let mut dest = PdfDocument::new().unwrap();

        let copy = clone_for_new_document(&array, &mut src, &mut dest).unwrap();
        let items = copy.as_array().unwrap();
        assert_eq!(items[0], items[1]);
        assert_eq!(dest.resolve(items[0].as_reference().unwrap()).unwrap(), Object::Integer(1));
    }

    #[test]
    fn test_ids_allocated_beyond_destination_max() {
        let mut src = PdfDocument::new().unwrap();
        let obj = src.add_object(Object::Integer(5));
        let mut dest = PdfDocument::new().unwrap();
        for _ in 0..10 {
            dest.add_object(Object::Null);
        }
        let max = dest.max_object_number();
        let mut cloner = ObjectCloner::new(&mut src, &mut dest);
        let copy = cloner.clone_ref(obj).unwrap();
        assert_eq!(copy.id, max + 1);
    }

    #[test]
    fn test_page_count_law() {
        let mut dest = doc_with_pages(1, |_| Dictionary::new());
        let mut p = doc_with_pages(2, |_| Dictionary::new());
        let mut q = doc_with_pages(3, |_| Dictionary::new());

        assert_eq!(Merger::append(&mut dest, &mut p).unwrap().pages, 2);
        assert_eq!(dest.page_count().unwrap(), 3);
        Merger::append(&mut dest, &mut q).unwrap();
        assert_eq!(dest.page_count().unwrap(), 6);
        let root = dest.catalog().unwrap();
        let tree = dest.resolve_object(root.get("Pages").unwrap()).unwrap();
        assert_eq!(tree.get("Count"), Some(&Object::Integer(6)));
    }

    #[test]
    fn test_identical_streams_from_two_sources_stay_distinct() {
        let with_stream = |doc: &mut PdfDocument| {
            let content = doc.add_object(Object::Stream {
                dict: Dictionary::new(),
                data: bytes::Bytes::from_static(b"0 0 m 1 1 l S"),
            });
            DictBuilder::new().insert("Contents", content).build()
        };
        let mut dest = PdfDocument::new().unwrap();
        let mut a = doc_with_pages(1, with_stream);
        let mut b = doc_with_pages(1, with_stream);
        Merger::append(&mut dest, &mut a).unwrap();
        Merger::append(&mut dest, &mut b).unwrap();

        let pages = dest.pages().unwrap();
        let contents: Vec<ObjectRef> = pages
            .iter()
            .map(|&p| {
                let page = dest.resolve(p).unwrap();
                page.get("Contents").unwrap().as_reference().unwrap()
            })
            .collect();
        assert_ne!(contents[0], contents[1]);
        assert_eq!(
            dest.stream_data(contents[0]).unwrap(),
            dest.stream_data(contents[1]).unwrap()
        );
    }

    #[test]
    fn test_inherited_attributes_materialized() {
        let mut src = doc_with_pages(1, |_| Dictionary::new());
        let root = src.pages_root().unwrap();
        let mut tree = src.resolve(root).unwrap();
        let media_box = Object::Array([0, 0, 612, 792].map(Object::Integer).to_vec());
        tree.as_dict_mut().unwrap().insert("MediaBox".to_string(), media_box.clone());
        src.set_object(root, tree).unwrap();

        let mut dest = PdfDocument::new().unwrap();
        Merger::append(&mut dest, &mut src).unwrap();
        let dest_root = dest.pages_root().unwrap();
        let page = dest.pages().unwrap()[0];
        let page = dest.resolve(page).unwrap();
        assert_eq!(page.get("MediaBox"), Some(&media_box));
        assert_eq!(page.get("Parent"), Some(&Object::Reference(dest_root)));
    }

    #[test]
    fn test_destination_root_attributes_do_not_leak() {
        let media_box = Object::Array([0, 0, 200, 100].map(Object::Integer).to_vec());
        let boxed = media_box.clone();
        let mut src =
            doc_with_pages(1, move |_| DictBuilder::new().insert("MediaBox", boxed.clone()).build());

        let mut dest = doc_with_pages(1, |_| Dictionary::new());
        let dest_root = dest.pages_root().unwrap();
        let mut tree = dest.resolve(dest_root).unwrap();
        let crop = Object::Array([10, 10, 50, 50].map(Object::Integer).to_vec());
        let fonts = DictBuilder::new().insert("Font", Dictionary::new()).into_object();
        let tree_dict = tree.as_dict_mut().unwrap();
        tree_dict.insert("Rotate".to_string(), Object::Integer(90));
        tree_dict.insert("CropBox".to_string(), crop);
        tree_dict.insert("Resources".to_string(), fonts);
        dest.set_object(dest_root, tree).unwrap();

        Merger::append(&mut dest, &mut src).unwrap();
        let appended = dest.pages().unwrap()[1];
        let page = dest.resolve(appended).unwrap();
        assert_eq!(page.get("Rotate"), Some(&Object::Integer(0)));
        assert_eq!(page.get("CropBox"), Some(&media_box));
        assert_eq!(page.get("Resources"), Some(&Object::Dictionary(Dictionary::new())));
    }

    #[test]
    fn test_explicit_page_attributes_kept() {
        let mut src = doc_with_pages(1, |_| DictBuilder::new().insert("Rotate", 270i64).build());
        let mut dest = PdfDocument::new().unwrap();
        Merger::append(&mut dest, &mut src).unwrap();
        let page = dest.pages().unwrap()[0];
        let page = dest.resolve(page).unwrap();
        assert_eq!(page.get("Rotate"), Some(&Object::Integer(270)));
    }

    #[test]
    fn test_info_copied_when_missing() {
        let mut src = doc_with_pages(1, |_| Dictionary::new());
        let info = DictBuilder::new().insert("Title", Object::String(b"T".to_vec()));
        let info = src.add_object(info.into_object());
        src.trailer_mut().insert("Info".to_string(), Object::Reference(info));

        let mut dest = PdfDocument::new().unwrap();
        Merger::append(&mut dest, &mut src).unwrap();
        let copied = dest.trailer().get("Info").and_then(Object::as_reference).unwrap();
        assert!(dest.resolve(copied).unwrap().get("Title").is_some());
    }

    #[test]
    fn test_encrypted_source_without_handler_refused() {
        let mut src = doc_with_pages(1, |_| Dictionary::new());
        let encrypt = src.add_object(DictBuilder::new().name("Filter", "Standard").into_object());
        src.trailer_mut().insert("Encrypt".to_string(), Object::Reference(encrypt));
        let mut dest = PdfDocument::new().unwrap();
        assert!(matches!(Merger::append(&mut dest, &mut src), Err(Error::Unsupported(_))));
    }
}
