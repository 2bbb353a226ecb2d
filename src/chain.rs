use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::error::{PatchError, Result};
use crate::merge::merge_files;

/// Apply an ordered sequence of diffs to `base`, returning the path of the
/// final merged archive.
///
/// Intermediates live in `scratch_dir` and each one is deleted as soon as it
/// is superseded, on failure paths included. The scratch directory must be
/// exclusive to this chain application; concurrent applicators need distinct
/// scratch directories. An empty diff sequence returns `base` unchanged.
pub fn apply_chain(base: &Path, diffs: &[PathBuf], scratch_dir: &Path) -> Result<PathBuf> {
    let never = AtomicBool::new(false);
    apply_chain_with_cancel(base, diffs, scratch_dir, &never)
}

/// Like [`apply_chain`], but checks `cancel` at the top of every chain step.
/// Cancellation takes effect between steps only; a step already merging runs
/// to completion.
pub fn apply_chain_with_cancel(
    base: &Path,
    diffs: &[PathBuf],
    scratch_dir: &Path,
    cancel: &AtomicBool,
) -> Result<PathBuf> {
    if diffs.is_empty() {
        return Ok(base.to_path_buf());
    }
    std::fs::create_dir_all(scratch_dir)?;

    let mut current = base.to_path_buf();
    for (index, diff) in diffs.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            delete_intermediate(base, &current);
            return Err(PatchError::Cancelled(index));
        }

        let next = scratch_dir.join(format!("chain-step-{index}.jar"));
        debug!(
            "Chain step {index}: merging '{}' onto '{}'",
            diff.display(),
            current.display()
        );

        if let Err(e) = merge_files(&current, diff, &next) {
            delete_intermediate(base, &current);
            return Err(PatchError::ChainStep {
                index,
                diff: diff.display().to_string(),
                source: Box::new(e),
            });
        }

        delete_intermediate(base, &current);
        current = next;
    }
    Ok(current)
}

/// Best-effort removal of a superseded intermediate. The original base
/// archive is never deleted.
fn delete_intermediate(base: &Path, current: &Path) {
    if current == base {
        return;
    }
    if let Err(e) = std::fs::remove_file(current) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(
                "Failed to delete intermediate archive '{}': {e}",
                current.display()
            );
        }
    }
}
