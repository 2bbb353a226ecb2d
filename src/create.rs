use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Write;
use std::path::Path;

use log::{debug, warn};
use zip::write::{FileOptions, ZipWriter};

use crate::archive::{
    self, hash_bytes, list_entries, open_archive, read_entry, write_directory, write_entry,
    EntryInfo,
};
use crate::control::{ControlRecord, MoveInstruction, CONTROL_ENTRY};
use crate::error::Result;

/// Counters describing what a generated diff contains.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffStats {
    /// Entries present only in the new archive.
    pub added: usize,
    /// Entries present in both archives with different content.
    pub changed: usize,
    /// Renames detected by content digest.
    pub moved: usize,
    /// Entries present only in the old archive, emitted as remove lines.
    pub removed: usize,
}

/// Compare two archive versions and write a diff archive that
/// [`merge_files`](crate::merge::merge_files) turns back into the new version.
///
/// An entry counts as changed when its size or CRC differs; equal size and
/// CRC are confirmed by a BLAKE3 digest of the payloads before the entry is
/// skipped. An old-only entry whose digest uniquely matches a new-only entry
/// collapses into a single `move` instruction instead of remove plus add.
pub fn create_diff(old: &Path, new: &Path, output: &Path) -> Result<DiffStats> {
    debug!(
        "JarDiff create from '{}' to '{}' starts",
        old.display(),
        new.display()
    );

    let mut old_archive = open_archive(old)?;
    let mut new_archive = open_archive(new)?;
    let old_entries = list_entries(&mut old_archive, old)?;
    let new_entries = list_entries(&mut new_archive, new)?;

    let old_map: HashMap<&str, &EntryInfo> =
        old_entries.iter().map(|e| (e.name.as_str(), e)).collect();
    let new_names: HashSet<&str> = new_entries.iter().map(|e| e.name.as_str()).collect();

    // Entries the diff has to ship, in new-archive encounter order.
    let mut shipped: Vec<&EntryInfo> = Vec::new();
    // New-only files, candidates for rename detection.
    let mut added_files: Vec<&EntryInfo> = Vec::new();

    for entry in &new_entries {
        if entry.name == CONTROL_ENTRY {
            warn!("New archive carries a reserved '{CONTROL_ENTRY}' entry, skipping it");
            continue;
        }
        match old_map.get(entry.name.as_str()) {
            None => {
                shipped.push(entry);
                if !entry.is_dir && entry.size > 0 {
                    added_files.push(entry);
                }
            }
            Some(old_entry) => {
                if entry.is_dir {
                    continue;
                }
                if old_entry.size != entry.size || old_entry.crc32 != entry.crc32 {
                    shipped.push(entry);
                    continue;
                }
                // Size and CRC agree; confirm with a strong digest.
                let old_payload = read_entry(&mut old_archive, old_entry.index, &old_entry.name)?;
                let new_payload = read_entry(&mut new_archive, entry.index, &entry.name)?;
                if hash_bytes(&old_payload.data) != hash_bytes(&new_payload.data) {
                    shipped.push(entry);
                }
            }
        }
    }

    let mut removal: BTreeSet<String> = old_entries
        .iter()
        .filter(|e| !new_names.contains(e.name.as_str()))
        .map(|e| e.name.clone())
        .collect();

    // Digest old-only files so added files can be matched as renames.
    // Empty files are excluded: every empty file hashes alike.
    let mut by_digest: HashMap<[u8; 32], Vec<&EntryInfo>> = HashMap::new();
    for entry in &old_entries {
        if new_names.contains(entry.name.as_str()) || entry.is_dir || entry.size == 0 {
            continue;
        }
        let payload = read_entry(&mut old_archive, entry.index, &entry.name)?;
        by_digest
            .entry(hash_bytes(&payload.data))
            .or_default()
            .push(entry);
    }

    let mut moved: Vec<MoveInstruction> = Vec::new();
    let mut move_targets: HashSet<String> = HashSet::new();
    let mut claimed: HashSet<&str> = HashSet::new();
    for entry in &added_files {
        let payload = read_entry(&mut new_archive, entry.index, &entry.name)?;
        if let Some(candidates) = by_digest.get(&hash_bytes(&payload.data)) {
            // Only an unambiguous, unclaimed match becomes a move.
            if candidates.len() == 1 && !claimed.contains(candidates[0].name.as_str()) {
                let source = candidates[0];
                claimed.insert(source.name.as_str());
                removal.remove(&source.name);
                debug!(
                    "JarDiff create: detected rename '{}' -> '{}'",
                    source.name, entry.name
                );
                moved.push(MoveInstruction {
                    from: source.name.clone(),
                    to: entry.name.clone(),
                });
                move_targets.insert(entry.name.clone());
            }
        }
    }

    let control = ControlRecord { removed: removal, moved };

    let stats = archive::write_atomically(output, |file| {
        let mut writer = ZipWriter::new(file);

        // Control record goes first, header included, even when empty.
        writer
            .start_file(CONTROL_ENTRY, FileOptions::default())
            .map_err(archive::writer_err)?;
        writer.write_all(control.render().as_bytes())?;

        let mut added = 0;
        let mut changed = 0;
        for entry in &shipped {
            if move_targets.contains(entry.name.as_str()) {
                continue;
            }
            if entry.is_dir {
                write_directory(&mut writer, &entry.name)?;
            } else {
                let payload = read_entry(&mut new_archive, entry.index, &entry.name)?;
                write_entry(&mut writer, &entry.name, &payload)?;
            }
            if old_map.contains_key(entry.name.as_str()) {
                changed += 1;
            } else {
                added += 1;
            }
        }

        writer.finish().map_err(archive::writer_err)?;
        Ok(DiffStats {
            added,
            changed,
            moved: control.moved.len(),
            removed: control.removed.len(),
        })
    })?;

    debug!(
        "JarDiff create finished: {} added, {} changed, {} moved, {} removed",
        stats.added, stats.changed, stats.moved, stats.removed
    );
    Ok(stats)
}
