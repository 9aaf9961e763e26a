//! Zip container helpers
//!
//! `.eln` exports are RO-Crate zip containers and the quality pipeline's
//! artifacts arrive as plain `.zip` files. Both are read through these
//! helpers.

use crate::error::{Result, RuqadError};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File suffixes treated as zip containers
pub const ARCHIVE_SUFFIXES: [&str; 2] = ["eln", "zip"];

/// One entry written to disk by [`extract_all`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    /// Entry name as stored in the archive (always `/`-separated)
    pub name: String,
    /// Location of the extracted entry below the destination directory
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Whether `path` carries one of the [`ARCHIVE_SUFFIXES`]
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ARCHIVE_SUFFIXES.contains(&ext))
        .unwrap_or(false)
}

fn open(path: &Path) -> Result<zip::ZipArchive<File>> {
    let file = File::open(path)?;
    Ok(zip::ZipArchive::new(file)?)
}

/// Extract every entry of the archive at `path` below `dest`
///
/// Entries whose names would escape `dest` (absolute paths, `..`) are
/// rejected with [`RuqadError::UnsafeEntryPath`].
pub fn extract_all(path: &Path, dest: &Path) -> Result<Vec<ExtractedEntry>> {
    let mut archive = open(path)?;
    let mut extracted = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_string();
        let relative = file
            .enclosed_name()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| RuqadError::UnsafeEntryPath(name.clone()))?;
        let target = dest.join(&relative);

        if file.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            std::io::copy(&mut file, &mut out)?;
        }

        debug!(entry = %name, target = %target.display(), "Extracted archive entry");
        extracted.push(ExtractedEntry {
            name,
            path: target,
            is_dir: file.is_dir(),
        });
    }

    Ok(extracted)
}

/// Buffer size used while probing an entry for content
const PROBE_CHUNK: usize = 8 * 1024;

/// An archive opened once for selective reads
///
/// Entry data is only decompressed when asked for through [`ArchiveReader::read`]
/// or [`ArchiveReader::has_content`], so large payload entries of an export
/// are never loaded.
pub struct ArchiveReader {
    archive: zip::ZipArchive<File>,
    names: Vec<String>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self> {
        let archive = open(path)?;
        let mut names: Vec<String> = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(Self { archive, names })
    }

    /// File entry names, sorted
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// First file entry whose final component is `file_name`
    pub fn find(&self, file_name: &str) -> Option<&str> {
        self.names
            .iter()
            .map(String::as_str)
            .find(|name| entry_file_name(name) == file_name)
    }

    /// Full contents of the entry `name`
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self.archive.by_name(name)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        debug!(entry = %name, bytes = contents.len(), "Read archive entry");
        Ok(contents)
    }

    /// Whether the entry `name` holds anything besides whitespace
    ///
    /// Stops at the first non-whitespace byte.
    pub fn has_content(&mut self, name: &str) -> Result<bool> {
        let mut file = self.archive.by_name(name)?;
        let mut buf = [0u8; PROBE_CHUNK];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                return Ok(false);
            }
            if buf[..n].iter().any(|b| !b.is_ascii_whitespace()) {
                return Ok(true);
            }
        }
    }
}

/// Final component of an entry name (`a/b/report.json` -> `report.json`)
pub fn entry_file_name(name: &str) -> &str {
    name.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(name)
}
