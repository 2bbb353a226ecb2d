use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for patch operations.
pub type Result<T> = std::result::Result<T, PatchError>;

/// Error type for everything that can go wrong while creating, merging or
/// chaining diff archives.
#[derive(Error, Debug)]
pub enum PatchError {
    /// The archive's central directory cannot be parsed.
    #[error("corrupt archive '{path}': {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    /// A path is both removed and replaced/added by the same diff,
    /// or a move target collides with a regular diff entry.
    #[error("conflicting instructions for '{0}' in the same diff")]
    ConflictingInstruction(String),

    /// Decompressed payload bytes do not match the entry's recorded CRC-32.
    #[error("checksum mismatch for entry '{entry}': recorded {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        entry: String,
        expected: u32,
        actual: u32,
    },

    /// An entry the merge plan expects to copy cannot be located.
    #[error("entry '{0}' not found at copy time")]
    MissingEntry(String),

    /// The diff carries a control record but it cannot be decoded.
    #[error("malformed control record: {0}")]
    MalformedControlRecord(String),

    /// Underlying read/write/delete failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A specific step of a multi-diff chain failed.
    #[error("chain step {index} ('{diff}') failed: {source}")]
    ChainStep {
        index: usize,
        diff: String,
        #[source]
        source: Box<PatchError>,
    },

    /// The caller cancelled the chain before the given step ran.
    #[error("chain application cancelled before step {0}")]
    Cancelled(usize),
}
