use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, Write};
use std::path::Path;

use log::debug;
use zip::read::ZipArchive;
use zip::write::ZipWriter;

use crate::archive::{
    self, list_entries, open_archive, read_entry, write_directory, write_entry, EntryInfo,
};
use crate::control::{ControlRecord, CONTROL_ENTRY};
use crate::error::{PatchError, Result};

/// Counters describing what a single merge did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    /// Unchanged entries copied verbatim from the base archive.
    pub copied_from_base: usize,
    /// Added/replaced entries copied from the diff archive.
    pub copied_from_diff: usize,
    /// Base entries carried over under a new name.
    pub moved: usize,
    /// Removal-list paths that were actually present in the base.
    pub removed: usize,
}

/// Apply one diff archive to one base archive, producing the merged archive
/// at `output`.
///
/// The merged bytes are written to a `.part` sibling of `output` and renamed
/// into place only after the central directory is finalized, so a failed
/// merge never leaves behind anything a ZIP reader would accept.
pub fn merge_files(base: &Path, diff: &Path, output: &Path) -> Result<MergeStats> {
    debug!(
        "JarDiff merge of '{}' onto '{}' starts",
        diff.display(),
        base.display()
    );

    let mut base_archive = open_archive(base)?;
    let mut diff_archive = open_archive(diff)?;

    let stats = archive::write_atomically(output, |file| {
        merge_streams(&mut base_archive, base, &mut diff_archive, diff, file)
    })?;

    debug!(
        "JarDiff merge finished: {} from diff, {} moved, {} from base, {} removed",
        stats.copied_from_diff, stats.moved, stats.copied_from_base, stats.removed
    );
    Ok(stats)
}

/// Merge two already-opened archives into `out`, leaving file handling to
/// the caller.
///
/// The sink's central directory is finalized only on success; on any error
/// the caller must discard the sink rather than treat it as a valid archive
/// ([`merge_files`] does exactly that with a `.part` file).
pub fn merge<R1, R2, W>(
    base: &mut ZipArchive<R1>,
    diff: &mut ZipArchive<R2>,
    out: W,
) -> Result<MergeStats>
where
    R1: Read + Seek,
    R2: Read + Seek,
    W: Write + Seek,
{
    merge_streams(
        base,
        Path::new("<base archive>"),
        diff,
        Path::new("<diff archive>"),
        out,
    )
}

/// Core merge over already-opened archives.
///
/// Output entry order is deterministic: diff regular entries in diff
/// encounter order, then moved entries in control-record order, then
/// unchanged base entries in base encounter order. The writer's central
/// directory is only finalized when every entry copied cleanly.
fn merge_streams<R1, R2, W>(
    base: &mut ZipArchive<R1>,
    base_path: &Path,
    diff: &mut ZipArchive<R2>,
    diff_path: &Path,
    out: W,
) -> Result<MergeStats>
where
    R1: Read + Seek,
    R2: Read + Seek,
    W: Write + Seek,
{
    let base_entries = list_entries(base, base_path)?;
    let diff_entries = list_entries(diff, diff_path)?;

    let control = match diff_entries.iter().find(|e| e.name == CONTROL_ENTRY) {
        Some(entry) => {
            let payload = read_entry(diff, entry.index, &entry.name)?;
            let text = String::from_utf8(payload.data).map_err(|_| {
                PatchError::MalformedControlRecord("control record is not valid UTF-8".to_string())
            })?;
            ControlRecord::parse(&text)?
        }
        // An absent control record is legal: nothing is explicitly removed
        // beyond what the diff replaces.
        None => ControlRecord::default(),
    };

    let regular: Vec<&EntryInfo> = diff_entries
        .iter()
        .filter(|e| e.name != CONTROL_ENTRY)
        .collect();
    let regular_names: HashSet<&str> = regular.iter().map(|e| e.name.as_str()).collect();

    // A path must not be both removed and supplied by the diff, and a move
    // target must not collide with a regular diff entry.
    for path in &control.removed {
        if regular_names.contains(path.as_str()) {
            return Err(PatchError::ConflictingInstruction(path.clone()));
        }
    }
    for mv in &control.moved {
        if regular_names.contains(mv.to.as_str()) {
            return Err(PatchError::ConflictingInstruction(mv.to.clone()));
        }
    }

    let base_index: HashMap<&str, &EntryInfo> =
        base_entries.iter().map(|e| (e.name.as_str(), e)).collect();

    // Validate every move source before the first byte is written.
    for mv in &control.moved {
        if !base_index.contains_key(mv.from.as_str()) {
            return Err(PatchError::MissingEntry(mv.from.clone()));
        }
    }

    let moved_sources: HashSet<&str> = control.moved.iter().map(|m| m.from.as_str()).collect();
    let moved_targets: HashSet<&str> = control.moved.iter().map(|m| m.to.as_str()).collect();

    let mut writer = ZipWriter::new(out);
    let mut stats = MergeStats::default();

    for entry in &regular {
        debug!("JarDiff: adding new content '{}'", entry.name);
        copy_entry(diff, entry, &entry.name, &mut writer)?;
        stats.copied_from_diff += 1;
    }

    for mv in &control.moved {
        debug!("JarDiff: adding moved content '{}' -> '{}'", mv.from, mv.to);
        let source = base_index[mv.from.as_str()];
        copy_entry(base, source, &mv.to, &mut writer)?;
        stats.moved += 1;
    }

    for entry in &base_entries {
        let name = entry.name.as_str();
        if regular_names.contains(name)
            || moved_sources.contains(name)
            || moved_targets.contains(name)
        {
            continue;
        }
        if control.removed.contains(name) {
            debug!("JarDiff: removing content '{}'", name);
            stats.removed += 1;
            continue;
        }
        debug!("JarDiff: adding unchanged content '{}'", name);
        copy_entry(base, entry, name, &mut writer)?;
        stats.copied_from_base += 1;
    }

    writer.finish().map_err(archive::writer_err)?;
    Ok(stats)
}

/// Copy one entry's payload verbatim into the output, verifying its checksum
/// on the way through.
fn copy_entry<R, W>(
    source: &mut ZipArchive<R>,
    entry: &EntryInfo,
    target_name: &str,
    writer: &mut ZipWriter<W>,
) -> Result<()>
where
    R: Read + Seek,
    W: Write + Seek,
{
    if entry.is_dir {
        return write_directory(writer, target_name);
    }
    let payload = read_entry(source, entry.index, &entry.name)?;
    write_entry(writer, target_name, &payload)
}
