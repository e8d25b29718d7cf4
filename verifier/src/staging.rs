//! Staging directory lifecycle.
//!
//! By default the archive is extracted into a uniquely named directory under
//! the user's home, held as a [`TempDir`] so it is removed on every exit
//! path. A fixed directory can still be requested; it is never removed and
//! must be absent or empty.

use crate::dirs::BaseDirs;
use crate::error::{Result, VerifyError};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use std::fs;
use tempfile::TempDir;

/// Default prefix of the staging directory created under the home directory.
pub const DEFAULT_STAGING_PREFIX: &str = "test_install";

/// Where the staging directory comes from and what happens to it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingPolicy {
    /// A fresh uniquely named directory under `parent`.
    Scoped {
        /// Directory the staging area is created in.
        parent: Utf8PathBuf,
        /// Prefix of the generated directory name.
        prefix: String,
        /// Persist the directory after the run instead of removing it.
        keep: bool,
    },
    /// A caller-chosen directory that is created if absent and never removed.
    Fixed(Utf8PathBuf),
}

impl StagingPolicy {
    /// Resolve the policy from CLI and configuration inputs.
    ///
    /// A fixed directory wins; otherwise a scoped directory is placed under
    /// the home directory reported by `dirs`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::HomeNotFound`] if a scoped directory is needed
    /// and no home directory is available.
    pub fn resolve(
        dirs: &dyn BaseDirs,
        fixed: Option<Utf8PathBuf>,
        prefix: &str,
        keep: bool,
    ) -> Result<Self> {
        if let Some(path) = fixed {
            return Ok(Self::Fixed(path));
        }

        let home = dirs.home_dir().ok_or(VerifyError::HomeNotFound)?;
        let parent = Utf8PathBuf::try_from(home).map_err(|e| VerifyError::NonUtf8Path {
            path: e.into_path_buf().display().to_string(),
        })?;
        Ok(Self::Scoped {
            parent,
            prefix: prefix.to_owned(),
            keep,
        })
    }

    /// Human-readable description for dry-run output.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Scoped {
                parent,
                prefix,
                keep: false,
            } => format!("{parent}/{prefix}-XXXXXX (removed after the run)"),
            Self::Scoped {
                parent,
                prefix,
                keep: true,
            } => format!("{parent}/{prefix}-XXXXXX (kept after the run)"),
            Self::Fixed(path) => format!("{path} (fixed, must be absent or empty)"),
        }
    }
}

/// An acquired staging directory.
///
/// Dropping a scoped area removes the directory and everything in it.
#[derive(Debug)]
pub struct StagingArea {
    path: Utf8PathBuf,
    guard: Option<TempDir>,
    keep: bool,
}

impl StagingArea {
    /// Acquire a staging directory according to `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::StagingDirExists`] if a fixed directory already
    /// holds files, and [`VerifyError::StagingFailed`] if the directory cannot
    /// be created or written.
    pub fn acquire(policy: &StagingPolicy) -> Result<Self> {
        match policy {
            StagingPolicy::Scoped {
                parent,
                prefix,
                keep,
            } => Self::acquire_scoped(parent, prefix, *keep),
            StagingPolicy::Fixed(path) => Self::acquire_fixed(path),
        }
    }

    fn acquire_scoped(parent: &Utf8Path, prefix: &str, keep: bool) -> Result<Self> {
        let staging_failed = |reason: String| VerifyError::StagingFailed {
            parent: parent.to_owned(),
            reason,
        };

        let guard = tempfile::Builder::new()
            .prefix(&format!("{prefix}-"))
            .tempdir_in(parent)
            .map_err(|e| staging_failed(e.to_string()))?;
        let path = Utf8PathBuf::try_from(guard.path().to_path_buf())
            .map_err(|e| staging_failed(e.to_string()))?;

        debug!("acquired scoped staging directory {path}");
        Ok(Self {
            path,
            guard: Some(guard),
            keep,
        })
    }

    fn acquire_fixed(path: &Utf8Path) -> Result<Self> {
        if path.exists() {
            if !is_empty_dir(path)? {
                return Err(VerifyError::StagingDirExists {
                    path: path.to_owned(),
                });
            }
        } else {
            fs::create_dir_all(path).map_err(|e| VerifyError::StagingFailed {
                parent: path.parent().unwrap_or(path).to_owned(),
                reason: e.to_string(),
            })?;
        }

        // Verify writability by creating and removing a marker file.
        let marker = path.join(".sdist-verify-write-check");
        fs::write(&marker, b"").map_err(|e| VerifyError::StagingFailed {
            parent: path.to_owned(),
            reason: e.to_string(),
        })?;
        fs::remove_file(&marker)?;

        debug!("using fixed staging directory {path}");
        Ok(Self {
            path: path.to_owned(),
            guard: None,
            keep: true,
        })
    }

    /// Path of the staging directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Whether the directory is removed when the area is dropped.
    #[must_use]
    pub const fn is_ephemeral(&self) -> bool {
        self.guard.is_some() && !self.keep
    }

    /// Release the area at the end of a run.
    ///
    /// Returns the path when the directory outlives the run, or `None` when it
    /// was removed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the scoped directory cannot be removed.
    pub fn finish(self) -> Result<Option<Utf8PathBuf>> {
        match self.guard {
            Some(guard) if self.keep => {
                let kept = guard.keep();
                info!("kept staging directory {}", kept.display());
                Ok(Some(self.path))
            }
            Some(guard) => {
                guard.close()?;
                debug!("removed staging directory {}", self.path);
                Ok(None)
            }
            None => Ok(Some(self.path)),
        }
    }
}

fn is_empty_dir(path: &Utf8Path) -> Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }
    Ok(path.read_dir_utf8()?.next().is_none())
}
