//! Test support utilities for sdist-verify behavioural tests.
//!
//! These helpers create scratch directories with UTF-8 paths and inspect
//! what a run left behind in the home directory.

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

/// Creates a scratch directory and returns it with its UTF-8 path.
pub fn utf8_temp_dir() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("temp dir path not UTF-8");
    (dir, path)
}

/// Lists the entry names directly inside `dir`.
pub fn dir_entries(dir: &Utf8Path) -> Vec<String> {
    let mut names: Vec<String> = dir
        .read_dir_utf8()
        .expect("failed to read directory")
        .map(|entry| entry.expect("failed to read entry").file_name().to_owned())
        .collect();
    names.sort();
    names
}
