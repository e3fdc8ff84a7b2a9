// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::match_like_matches_macro)]

//! # PDF Graft
//!
//! Low-level PDF object graph toolkit: lazy object loading over a pluggable
//! backing store, cross-reference parsing with recovery for damaged files,
//! the standard filter codecs, and deep-copying of pages between documents.
//!
//! ## Architecture
//!
//! ```text
//! bytes ──▶ [store] BackingStore (memory or scratch file)
//!               │
//!               ▼
//!           [xref] startxref → section chain ──(damaged)──▶ [xref_reconstruction]
//!               │
//!               ▼
//!           [document] PdfDocument: lazy resolve, object streams, edits
//!               │                         │
//!               ▼                         ▼
//!           [decoders] filter chain   [editor] ObjectCloner / Merger
//!               │
//!               ▼
//!           [writer] full rewrite on save
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_graft::{Merger, ParserOptions, PdfDocument};
//!
//! # fn main() -> pdf_graft::Result<()> {
//! let mut dest = PdfDocument::open("a.pdf")?;
//! let mut src = PdfDocument::open_with_options("b.pdf", ParserOptions::lenient())?;
//!
//! let stats = Merger::append(&mut dest, &mut src)?;
//! println!("appended {} pages", stats.pages);
//!
//! dest.save("merged.pdf")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Tolerance
//!
//! [`ParserOptions::lenient`] (the default) recovers from broken
//! cross-reference data by scanning the file, substitutes null for objects
//! that cannot be read, and keeps the partial output of failing filters.
//! [`ParserOptions::strict`] turns each of those into an error.

#![warn(missing_docs)]

// Error handling
pub mod error;

/// Parser configuration options
pub mod parser_config;

// Byte storage
pub mod store;

// Core PDF parsing
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;
pub mod xref_reconstruction;

// Stream filters
pub mod decoders;

// Documents
pub mod document;

// Writing
pub mod writer;

// Cross-document editing
pub mod editor;

pub use decoders::{Filter, SecurityHandler};
pub use document::PdfDocument;
pub use editor::{MergeStats, Merger, ObjectCloner, PdfMerger};
pub use error::{Error, Result};
pub use object::{DictBuilder, Dictionary, Object, ObjectRef};
pub use parser_config::{ParserOptions, StorageStrategy};
pub use store::{BackingStore, MemoryStore, ScratchFileStore};
pub use writer::SaveOptions;
pub use xref::{CrossRefTable, XRefEntry};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
