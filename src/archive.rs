use std::collections::HashSet;
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use zip::read::ZipArchive;
use zip::result::ZipError;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::error::{PatchError, Result};

/// Archive reader backed by a memory-mapped file.
pub type MappedArchive = ZipArchive<Cursor<Mmap>>;

/// Memory-map a file for read-only access.
///
/// # Safety
/// The mapping is read-only. Callers must not concurrently truncate or replace
/// the underlying file while the `Mmap` is live.
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = std::fs::File::open(path)?;
    // SAFETY: We only read from this mapping; no concurrent modification of these files.
    unsafe { Mmap::map(&file).map_err(PatchError::from) }
}

/// Open an archive's central directory from a file on disk.
/// A directory that cannot be parsed yields `CorruptArchive`.
pub fn open_archive(path: &Path) -> Result<MappedArchive> {
    let mmap = mmap_file(path)?;
    ZipArchive::new(Cursor::new(mmap)).map_err(|e| corrupt(path, e))
}

fn corrupt(path: &Path, err: ZipError) -> PatchError {
    match err {
        ZipError::Io(e) => PatchError::Io(e),
        other => PatchError::CorruptArchive {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// Normalize an entry path for lookup: forward slashes only.
pub fn normalize_path(name: &str) -> String {
    name.replace('\\', "/")
}

/// One entry of an archive's central directory, in encounter order.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    /// Normalized relative path.
    pub name: String,
    /// Position in the central directory, for payload lookup.
    pub index: usize,
    pub is_dir: bool,
    /// Uncompressed size recorded in the directory (0 for directories).
    pub size: u64,
    /// CRC-32 recorded in the directory.
    pub crc32: u32,
}

/// List an archive's entries in central-directory encounter order.
/// Duplicate paths violate the archive invariant and are reported as
/// `CorruptArchive`.
pub fn list_entries<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &Path,
) -> Result<Vec<EntryInfo>> {
    let mut entries = Vec::with_capacity(archive.len());
    let mut seen: HashSet<String> = HashSet::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).map_err(|e| corrupt(path, e))?;
        let name = normalize_path(entry.name());
        if !seen.insert(name.clone()) {
            return Err(PatchError::CorruptArchive {
                path: path.to_path_buf(),
                reason: format!("duplicate entry path '{name}'"),
            });
        }
        entries.push(EntryInfo {
            name,
            index,
            is_dir: entry.is_dir(),
            size: entry.size(),
            crc32: entry.crc32(),
        });
    }
    Ok(entries)
}

/// Decompressed payload of a single entry.
pub struct EntryPayload {
    pub data: Vec<u8>,
    /// Compression method the entry was stored with, so the writer can keep it.
    pub compression: CompressionMethod,
}

/// Read and verify one entry's payload.
///
/// The CRC-32 is recomputed over the decompressed bytes and compared against
/// the value recorded in the central directory; stored checksums are not
/// trusted blindly.
pub fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    name: &str,
) -> Result<EntryPayload> {
    let mut entry = archive.by_index(index).map_err(|e| match e {
        ZipError::FileNotFound => PatchError::MissingEntry(name.to_string()),
        ZipError::Io(e) => PatchError::Io(e),
        other => PatchError::CorruptArchive {
            path: PathBuf::from(name),
            reason: other.to_string(),
        },
    })?;

    let expected = entry.crc32();
    let compression = entry.compression();
    let mut data = Vec::with_capacity(entry.size() as usize);
    if let Err(e) = entry.read_to_end(&mut data) {
        // The zip reader verifies the CRC as a side effect of reaching EOF;
        // distinguish that from a genuine I/O failure.
        let actual = crc32fast::hash(&data);
        if actual != expected {
            return Err(PatchError::ChecksumMismatch {
                entry: name.to_string(),
                expected,
                actual,
            });
        }
        return Err(PatchError::Io(e));
    }

    let actual = crc32fast::hash(&data);
    if actual != expected {
        return Err(PatchError::ChecksumMismatch {
            entry: name.to_string(),
            expected,
            actual,
        });
    }

    Ok(EntryPayload { data, compression })
}

/// Compute the BLAKE3 hash of a byte slice.
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Append one file entry to an archive being written, keeping the source's
/// compression method where the writer supports it.
pub fn write_entry<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    name: &str,
    payload: &EntryPayload,
) -> Result<()> {
    let method = match payload.compression {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    };
    let options = FileOptions::default().compression_method(method);
    writer.start_file(name, options).map_err(writer_err)?;
    writer.write_all(&payload.data)?;
    Ok(())
}

/// Append one directory entry (no payload) to an archive being written.
pub fn write_directory<W: Write + Seek>(writer: &mut ZipWriter<W>, name: &str) -> Result<()> {
    writer
        .add_directory(name.trim_end_matches('/'), FileOptions::default())
        .map_err(writer_err)?;
    Ok(())
}

pub(crate) fn writer_err(err: ZipError) -> PatchError {
    match err {
        ZipError::Io(e) => PatchError::Io(e),
        other => PatchError::Io(io::Error::new(io::ErrorKind::Other, other.to_string())),
    }
}

/// Build an output archive through a `.part` sibling file, renaming it into
/// place only when `f` succeeds. On any error the partial file is deleted, so
/// `output` never holds an archive with a valid footer but missing entries.
pub fn write_atomically<T>(
    output: &Path,
    f: impl FnOnce(std::fs::File) -> Result<T>,
) -> Result<T> {
    let part = part_path(output);
    let file = std::fs::File::create(&part)?;
    match f(file) {
        Ok(value) => match std::fs::rename(&part, output) {
            Ok(()) => Ok(value),
            Err(e) => {
                let _ = std::fs::remove_file(&part);
                Err(e.into())
            }
        },
        Err(e) => {
            let _ = std::fs::remove_file(&part);
            Err(e)
        }
    }
}

fn part_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_backslashes() {
        assert_eq!(normalize_path("a\\b\\c.txt"), "a/b/c.txt");
        assert_eq!(normalize_path("a/b/c.txt"), "a/b/c.txt");
    }

    #[test]
    fn test_hash_bytes_deterministic() {
        assert_eq!(hash_bytes(b"payload"), hash_bytes(b"payload"));
        assert_ne!(hash_bytes(b"payload"), hash_bytes(b"payloae"));
    }
}
