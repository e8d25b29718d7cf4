//! sdist-verify library.
//!
//! This crate provides the core functionality for checking that a Python
//! project's source distribution can be built, unpacked, prepared, installed
//! and exercised. It is used by the `sdist-verify` CLI binary and can be
//! consumed programmatically for testing or custom verification workflows.
//!
//! # Modules
//!
//! - [`archive`] - Locating and extracting the distribution archive
//! - [`cli`] - Command-line argument definitions
//! - [`command`] - Stage command model and process execution
//! - [`config`] - Configuration file parsing and layering
//! - [`dirs`] - Directory resolution abstraction for the home directory
//! - [`error`] - Semantic error types with exit code mapping
//! - [`output`] - Progress and dry-run formatting
//! - [`pipeline`] - Five-stage pipeline orchestration
//! - [`project`] - Project name and version discovery
//! - [`runner`] - Exit status checking for stage commands
//! - [`stage`] - Stage identifiers and the pipeline state machine
//! - [`staging`] - Staging directory acquisition and cleanup

pub mod archive;
pub mod cli;
pub mod command;
pub mod config;
pub mod dirs;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod project;
pub mod runner;
pub mod stage;
pub mod staging;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
