//! Editing across documents.
//!
//! ```text
//! source PdfDocument ──[ObjectCloner]──▶ destination PdfDocument
//!         pages      ──[Merger::append]──▶ appended under the root page node
//! ```
//!
//! Single-document edits (`set_object`, `add_object`, `delete_object`) live
//! on [`PdfDocument`](crate::document::PdfDocument) itself.

mod merger;

pub use merger::{
    clone_for_new_document, MergeSource, MergeStats, Merger, ObjectCloner, PdfMerger,
};
