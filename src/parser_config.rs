//! Options recognized when opening a document.
//!
//! # Example
//!
//! ```
//! use pdf_graft::parser_config::{ParserOptions, StorageStrategy};
//!
//! // Tolerant mode (default): malformed objects become null
//! let lenient = ParserOptions::lenient();
//!
//! // Strict mode, scratch-file storage, always brute-force scan
//! let custom = ParserOptions::strict()
//!     .with_storage(StorageStrategy::ScratchFile { dir: None })
//!     .with_force_recovery(true);
//! assert!(custom.strict && custom.force_recovery);
//! # let _ = lenient;
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where an open document keeps its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageStrategy {
    /// Buffer the whole document in memory
    #[default]
    Memory,
    /// Spool the document into an anonymous temporary file
    ScratchFile {
        /// Directory for the temporary file (system default when `None`)
        dir: Option<PathBuf>,
    },
}

/// Parser options controlling error handling, recovery and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Propagate structural errors (true) or substitute null and recover (false)
    pub strict: bool,

    /// Skip the cross-reference table entirely and brute-force scan the file
    pub force_recovery: bool,

    /// Backing store strategy
    pub storage: StorageStrategy,

    /// Maximum array/dictionary nesting depth
    ///
    /// Deeply nested containers in hostile files would otherwise exhaust the
    /// stack. ISO 32000-1 Annex C suggests 100 levels.
    pub max_nesting: usize,

    /// Maximum number of sections followed through `/Prev`
    pub max_xref_chain: usize,

    /// Maximum decompression ratio (0 disables the check)
    pub max_decompression_ratio: u32,

    /// Maximum decoded stream size in bytes (0 disables the check)
    pub max_decompressed_size: usize,

    /// Maximum `/N` accepted for an object stream
    pub max_object_stream_entries: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Strict mode: structural errors reach the caller.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::lenient()
        }
    }

    /// Tolerant mode: malformed objects resolve to null and broken tables fall
    /// back to recovery.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            force_recovery: false,
            storage: StorageStrategy::Memory,
            max_nesting: 100,
            max_xref_chain: 1000,
            max_decompression_ratio: 100,
            max_decompressed_size: 100 * 1024 * 1024, // 100 MB
            max_object_stream_entries: 1_000_000,
        }
    }

    /// Set the error mode.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Always use the brute-force scan.
    pub fn with_force_recovery(mut self, force: bool) -> Self {
        self.force_recovery = force;
        self
    }

    /// Choose the backing store strategy.
    pub fn with_storage(mut self, storage: StorageStrategy) -> Self {
        self.storage = storage;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_mode() {
        let opts = ParserOptions::strict();
        assert!(opts.strict);
        assert!(!opts.force_recovery);
        assert_eq!(opts.storage, StorageStrategy::Memory);
    }

    #[test]
    fn test_default_is_lenient() {
        let opts = ParserOptions::default();
        assert!(!opts.strict);
        assert_eq!(opts, ParserOptions::lenient());
    }

    #[test]
    fn test_builders() {
        let opts = ParserOptions::lenient()
            .with_strict(true)
            .with_force_recovery(true)
            .with_storage(StorageStrategy::ScratchFile { dir: None });
        assert!(opts.strict);
        assert!(opts.force_recovery);
        assert!(matches!(opts.storage, StorageStrategy::ScratchFile { .. }));
    }
}
