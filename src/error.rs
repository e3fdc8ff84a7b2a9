//! Error types for the library.
//!
//! Errors fall into three families: I/O failures from the backing store
//! (always fatal), structural errors in the document syntax (recoverable in
//! tolerant mode), and filter decode errors (which always carry the number of
//! bytes that did decode).

use crate::object::ObjectRef;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading, editing, merging or saving documents.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Missing or malformed `%PDF-` header
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at a specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where the error occurred
        offset: usize,
        /// Reason for the failure
        reason: String,
    },

    /// Cross-reference section could not be read
    #[error("Invalid cross-reference section at byte {offset}: {reason}")]
    InvalidXref {
        /// Byte offset of the section
        offset: u64,
        /// Reason for the failure
        reason: String,
    },

    /// Referenced object has no usable table entry
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectRef),

    /// Object has the wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type
        found: String,
    },

    /// Unexpected end of input
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// Backing store I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic structural problem
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// A filter stopped early; `decoded_len` bytes were recovered
    #[error("{filter} failed after {decoded_len} decoded bytes: {reason}")]
    FilterDecode {
        /// Filter name
        filter: String,
        /// Number of bytes decoded before the failure
        decoded_len: usize,
        /// Reason for the failure
        reason: String,
    },

    /// Filter name outside the registry
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Resolution attempted after the document was closed
    #[error("Document has been closed")]
    DocumentClosed,

    /// Nesting limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),
}

impl Error {
    /// True for errors that describe malformed document structure.
    ///
    /// Tolerant mode absorbs these; I/O failures and filter errors are never
    /// classified as structural.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::InvalidHeader(_)
                | Error::ParseError { .. }
                | Error::InvalidXref { .. }
                | Error::ObjectNotFound(_)
                | Error::InvalidObjectType { .. }
                | Error::UnexpectedEof
                | Error::InvalidPdf(_)
                | Error::RecursionLimitExceeded(_)
        )
    }

    pub(crate) fn parse(offset: usize, reason: impl Into<String>) -> Self {
        Error::ParseError {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn xref(offset: u64, reason: impl Into<String>) -> Self {
        Error::InvalidXref {
            offset,
            reason: reason.into(),
        }
    }
}
