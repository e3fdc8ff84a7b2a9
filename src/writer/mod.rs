//! Writing documents back to bytes.
//!
//! ```text
//! reachable objects + trailer
//!     ↓
//! [PdfWriter] (header, body, cross-reference section, trailer)
//!     ↓
//! [ObjectSerializer] (object syntax)
//!     ↓
//! bytes
//! ```
//!
//! [`PdfDocument::save`](crate::document::PdfDocument::save) is the usual
//! entry point; the writer is public for callers assembling files from raw
//! objects.

mod object_serializer;
mod pdf_writer;

pub use object_serializer::ObjectSerializer;
pub use pdf_writer::{CountingWriter, PdfWriter, SaveOptions};
