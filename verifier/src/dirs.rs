//! Directory resolution abstraction.
//!
//! The staging area lives under the invoking user's home directory. The
//! [`BaseDirs`] trait keeps that lookup behind a seam so tests can point it
//! elsewhere without touching the real environment.

use std::path::PathBuf;

/// Source of per-user base directories.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// The invoking user's home directory, if it can be determined.
    fn home_dir(&self) -> Option<PathBuf>;
}

/// Resolves directories from the host environment via `directories-next`.
///
/// # Examples
///
/// ```
/// use sdist_verify::dirs::{BaseDirs, SystemBaseDirs};
///
/// let dirs = SystemBaseDirs;
/// let _home = dirs.home_dir();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl BaseDirs for SystemBaseDirs {
    fn home_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn system_dirs_follow_home_variable() {
        let home = temp_env::with_var("HOME", Some("/tmp/sdist-verify-home"), || {
            SystemBaseDirs.home_dir()
        });
        assert_eq!(home, Some(PathBuf::from("/tmp/sdist-verify-home")));
    }
}
