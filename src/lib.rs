//! Incremental JAR/ZIP patching.
//!
//! A diff archive ("jardiff") carries the entries that changed or were added
//! between two versions of an archive, plus a control record
//! (`META-INF/INDEX.JD`) listing entries to remove or rename. Merging a diff
//! onto the cached base archive reconstructs the next version's content
//! without re-downloading the full artifact; a chain of diffs bridges
//! multiple versions.

pub mod archive;
pub mod chain;
pub mod control;
pub mod create;
pub mod error;
pub mod merge;

pub use chain::{apply_chain, apply_chain_with_cancel};
pub use control::{ControlRecord, MoveInstruction, CONTROL_ENTRY};
pub use create::{create_diff, DiffStats};
pub use error::{PatchError, Result};
pub use merge::{merge, merge_files, MergeStats};
