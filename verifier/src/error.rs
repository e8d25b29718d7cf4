//! Error types for the sdist-verify pipeline.
//!
//! This module defines semantic error variants that say which stage failed
//! and why. Each variant maps onto a process exit code through
//! [`VerifyError::exit_code`] so the CLI can propagate the failing stage's
//! status.

use crate::stage::{PipelineState, Stage};
use camino::Utf8PathBuf;
use thiserror::Error;

/// Exit code used when a stage is killed after exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code used for failures that do not originate in a child process.
pub const GENERIC_EXIT_CODE: i32 = 1;

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// An external stage command exited with an unexpected status.
    #[error("{stage} stage failed: `{command}` exited with status {exit_code}{}", format_tail(.stderr_tail.as_deref()))]
    StageFailed {
        /// The stage that failed.
        stage: Stage,
        /// The rendered command line.
        command: String,
        /// The exit code reported by the child process.
        exit_code: i32,
        /// Trailing stderr lines, when output was captured.
        stderr_tail: Option<String>,
    },

    /// An external stage command was still running at its deadline.
    #[error("{stage} stage timed out after {seconds} seconds: `{command}`")]
    StageTimedOut {
        /// The stage that timed out.
        stage: Stage,
        /// The rendered command line.
        command: String,
        /// The configured timeout.
        seconds: u64,
    },

    /// The stage command could not be started at all.
    #[error("{stage} stage could not start `{program}`: {source}")]
    Spawn {
        /// The stage whose command failed to start.
        stage: Stage,
        /// The program that could not be spawned.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No distribution archive was found after packaging.
    #[error("no distribution archive found in {dist_dir}{}", expected_suffix(.expected.as_deref()))]
    ArchiveNotFound {
        /// Directory that was searched.
        dist_dir: Utf8PathBuf,
        /// Archive file name expected from project metadata, if known.
        expected: Option<String>,
    },

    /// Extracting the archive into the staging directory failed.
    #[error("failed to extract {archive}: {reason}")]
    Extraction {
        /// The archive being extracted.
        archive: Utf8PathBuf,
        /// Description of the extraction failure.
        reason: String,
    },

    /// A fixed staging directory already exists and holds files.
    #[error("staging directory {path} already exists and is not empty; remove it or omit --staging-dir")]
    StagingDirExists {
        /// The colliding directory.
        path: Utf8PathBuf,
    },

    /// The staging directory could not be created.
    #[error("failed to create staging directory under {parent}: {reason}")]
    StagingFailed {
        /// The directory the staging area should have been created in.
        parent: Utf8PathBuf,
        /// Description of the underlying I/O error.
        reason: String,
    },

    /// The invoking user's home directory could not be resolved.
    #[error("could not determine the home directory; set HOME or pass --staging-dir")]
    HomeNotFound,

    /// A path could not be represented as UTF-8.
    #[error("path is not valid UTF-8: {path}")]
    NonUtf8Path {
        /// Lossy rendering of the offending path.
        path: String,
    },

    /// The configuration file could not be read or parsed.
    #[error("invalid configuration at {path}: {reason}")]
    InvalidConfig {
        /// Path to the configuration file.
        path: Utf8PathBuf,
        /// Description of the parse error.
        reason: String,
    },

    /// A stage was attempted out of order.
    #[error("cannot enter {stage} stage from state {from}")]
    InvalidTransition {
        /// The current pipeline state.
        from: PipelineState,
        /// The stage that was attempted.
        stage: Stage,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

impl VerifyError {
    /// Return the stage this error is attributed to, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. }
            | Self::StageTimedOut { stage, .. }
            | Self::Spawn { stage, .. }
            | Self::InvalidTransition { stage, .. } => Some(*stage),
            Self::ArchiveNotFound { .. } => Some(Stage::Package),
            Self::Extraction { .. }
            | Self::StagingDirExists { .. }
            | Self::StagingFailed { .. }
            | Self::HomeNotFound => Some(Stage::Stage),
            _ => None,
        }
    }

    /// Return the process exit code for this error.
    ///
    /// A failing child's own exit code is propagated unchanged. Timeouts use
    /// [`TIMEOUT_EXIT_CODE`]; everything else uses [`GENERIC_EXIT_CODE`].
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            // A child can exit 0 while a non-zero status was expected.
            Self::StageFailed { exit_code, .. } if *exit_code != 0 => *exit_code,
            Self::StageTimedOut { .. } => TIMEOUT_EXIT_CODE,
            _ => GENERIC_EXIT_CODE,
        }
    }
}

fn format_tail(tail: Option<&str>) -> String {
    match tail {
        Some(text) if !text.trim().is_empty() => format!("\n{}", text.trim_end()),
        _ => String::new(),
    }
}

fn expected_suffix(expected: Option<&str>) -> String {
    expected.map_or_else(String::new, |name| format!(" (expected {name})"))
}

/// Result type alias using [`VerifyError`].
pub type Result<T> = std::result::Result<T, VerifyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn stage_failed(exit_code: i32, stderr_tail: Option<&str>) -> VerifyError {
        VerifyError::StageFailed {
            stage: Stage::Validate,
            command: "python3 examples/demo.py".to_owned(),
            exit_code,
            stderr_tail: stderr_tail.map(str::to_owned),
        }
    }

    #[test]
    fn stage_failed_names_stage_and_command() {
        let msg = stage_failed(3, None).to_string();
        assert!(msg.contains("validate"));
        assert!(msg.contains("python3 examples/demo.py"));
        assert!(msg.contains("status 3"));
    }

    #[test]
    fn stage_failed_appends_stderr_tail() {
        let msg = stage_failed(1, Some("Traceback\nValueError: bad\n")).to_string();
        assert!(msg.ends_with("ValueError: bad"));
    }

    #[rstest]
    #[case::propagates_child_code(stage_failed(7, None), 7)]
    #[case::zero_status_is_generic(stage_failed(0, None), GENERIC_EXIT_CODE)]
    #[case::timeout(
        VerifyError::StageTimedOut {
            stage: Stage::Install,
            command: "pip install .".to_owned(),
            seconds: 5,
        },
        TIMEOUT_EXIT_CODE
    )]
    #[case::home_missing(VerifyError::HomeNotFound, GENERIC_EXIT_CODE)]
    fn exit_code_mapping(#[case] err: VerifyError, #[case] expected: i32) {
        assert_eq!(err.exit_code(), expected);
    }

    #[test]
    fn staging_errors_are_attributed_to_stage_step() {
        let err = VerifyError::StagingDirExists {
            path: Utf8PathBuf::from("/home/user/test_install"),
        };
        assert_eq!(err.stage(), Some(Stage::Stage));
        assert!(err.to_string().contains("/home/user/test_install"));
    }

    #[test]
    fn archive_not_found_mentions_expected_name() {
        let err = VerifyError::ArchiveNotFound {
            dist_dir: Utf8PathBuf::from("dist"),
            expected: Some("nighres-1.0.tar.gz".to_owned()),
        };
        assert!(err.to_string().contains("expected nighres-1.0.tar.gz"));
    }

    #[test]
    fn spawn_error_preserves_source() {
        let err = VerifyError::Spawn {
            stage: Stage::Package,
            program: "python3".to_owned(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.exit_code(), GENERIC_EXIT_CODE);
    }
}
