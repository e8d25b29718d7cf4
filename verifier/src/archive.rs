//! Distribution archive location and extraction.
//!
//! After packaging, the archive is located in the dist directory and
//! unpacked into the staging directory. Extraction guards against entries
//! that would escape the destination (zip-slip).

use crate::error::{Result, VerifyError};
use crate::project::ProjectMetadata;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use log::{debug, trace};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// Extension of the source distribution archives handled here.
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Find the distribution archive produced by the package stage.
///
/// When `metadata` names the archive and that file exists it is returned.
/// Otherwise the most recently modified `*.tar.gz` in `dist_dir` is used.
///
/// # Errors
///
/// Returns [`VerifyError::ArchiveNotFound`] if no candidate exists, or an
/// I/O error if the directory cannot be read.
pub fn locate_archive(dist_dir: &Utf8Path, metadata: &ProjectMetadata) -> Result<Utf8PathBuf> {
    let expected = metadata.archive_file_names();
    for name in &expected {
        let candidate = dist_dir.join(name);
        if candidate.is_file() {
            debug!("using archive {candidate} named from project metadata");
            return Ok(candidate);
        }
    }

    let not_found = || VerifyError::ArchiveNotFound {
        dist_dir: dist_dir.to_owned(),
        expected: expected.first().cloned(),
    };

    if !dist_dir.is_dir() {
        return Err(not_found());
    }

    let mut newest: Option<(SystemTime, Utf8PathBuf)> = None;
    for entry in dist_dir.read_dir_utf8()? {
        let entry = entry?;
        if !entry.file_name().ends_with(ARCHIVE_EXTENSION) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified()?;
        trace!("archive candidate {} modified at {modified:?}", entry.path());
        if newest.as_ref().is_none_or(|(seen, _)| modified > *seen) {
            newest = Some((modified, entry.path().to_owned()));
        }
    }

    newest.map(|(_, path)| path).ok_or_else(not_found)
}

/// Trait for extracting distribution archives, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Extract the archive at `archive_path` into `dest_dir`.
    ///
    /// Returns the relative paths of the extracted entries.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Extraction`] for corrupt, empty or unsafe
    /// archives and for I/O failures while unpacking.
    fn extract(&self, archive_path: &Utf8Path, dest_dir: &Utf8Path) -> Result<Vec<PathBuf>>;
}

/// Default extractor for gzip-compressed tar archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn extract(&self, archive_path: &Utf8Path, dest_dir: &Utf8Path) -> Result<Vec<PathBuf>> {
        let fail = |reason: String| VerifyError::Extraction {
            archive: archive_path.to_owned(),
            reason,
        };

        let file = std::fs::File::open(archive_path).map_err(|e| fail(e.to_string()))?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut extracted = Vec::new();

        for entry_result in archive.entries().map_err(|e| fail(e.to_string()))? {
            let mut entry = entry_result.map_err(|e| fail(e.to_string()))?;
            let entry_path = entry.path().map_err(|e| fail(e.to_string()))?.into_owned();

            validate_entry_path(&entry_path).map_err(fail)?;

            // `unpack_in` refuses entries whose canonical parent leaves
            // `dest_dir`, which covers writes through extracted symlinks, and
            // resolves hard link targets inside `dest_dir`.
            let unpacked = entry
                .unpack_in(dest_dir.as_std_path())
                .map_err(|e| fail(format!("{}: {e}", entry_path.display())))?;
            if !unpacked {
                return Err(fail(format!(
                    "entry escapes the staging directory: {}",
                    entry_path.display()
                )));
            }
            extracted.push(entry_path);
        }

        if extracted.is_empty() {
            return Err(fail("archive contains no entries".to_owned()));
        }

        debug!("extracted {} entries from {archive_path}", extracted.len());
        Ok(extracted)
    }
}

/// Reject entry paths that are absolute or contain `..` components.
fn validate_entry_path(path: &Path) -> std::result::Result<(), String> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(format!("path traversal detected: {}", path.display()));
    }
    Ok(())
}

/// Determine the root of the extracted source tree.
///
/// Source distributions conventionally wrap everything in a single
/// `<name>-<version>/` directory. When all entries share one top-level
/// directory that directory is the root; otherwise `dest_dir` is.
#[must_use]
pub fn extracted_root(dest_dir: &Utf8Path, entries: &[PathBuf]) -> Utf8PathBuf {
    let top_level: BTreeSet<&str> = entries
        .iter()
        .filter_map(|entry| {
            entry.components().find_map(|c| match c {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
        })
        .collect();

    let mut names = top_level.into_iter();
    match (names.next(), names.next()) {
        (Some(only), None) if dest_dir.join(only).is_dir() => dest_dir.join(only),
        _ => dest_dir.to_owned(),
    }
}
