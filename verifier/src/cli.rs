//! CLI argument definitions for sdist-verify.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::config::ConfigOverrides;
use camino::Utf8PathBuf;
use clap::Parser;
use log::LevelFilter;

/// Verify that a Python project's source distribution builds, installs and runs.
#[derive(Parser, Debug, Clone)]
#[command(name = "sdist-verify")]
#[command(version, about)]
#[command(long_about = concat!(
    "Verify that a Python project's source distribution builds, installs and runs.\n\n",
    "Five stages run in a fixed order and the first failure stops the run:\n",
    "package (build the sdist archive), stage (unpack it into a fresh directory ",
    "under $HOME), prepare (run the project's build script inside the unpacked ",
    "tree), install (pip install into the user environment) and validate (run ",
    "one example script).\n\n",
    "Commands default to the classic setup.py sequence and can be replaced in ",
    "sdist-verify.toml at the project root.",
))]
#[command(after_help = concat!(
    "EXIT STATUS:\n",
    "  0     all five stages succeeded\n",
    "  N     the failing stage's command exited with status N\n",
    "  124   a stage exceeded --stage-timeout\n",
    "  1     any other failure (missing archive, staging collision, bad config)\n\n",
    "EXAMPLES:\n",
    "  Verify the project in the current directory:\n",
    "    $ sdist-verify\n\n",
    "  Run a different example and keep the unpacked tree for inspection:\n",
    "    $ sdist-verify --example examples/testing_02_cortical_depth_estimation.py --keep-staging\n\n",
    "  Reproduce the legacy fixed staging directory:\n",
    "    $ sdist-verify --staging-dir ~/test_install\n\n",
    "  Preview without running anything:\n",
    "    $ sdist-verify --dry-run",
))]
pub struct Cli {
    /// Project root containing setup.py [default: current directory].
    #[arg(short = 'C', long, value_name = "DIR")]
    pub project_dir: Option<Utf8PathBuf>,

    /// Configuration file [default: <project-dir>/sdist-verify.toml].
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Use this fixed staging directory instead of a fresh one under $HOME.
    #[arg(short, long, value_name = "DIR")]
    pub staging_dir: Option<Utf8PathBuf>,

    /// Keep the staging directory after the run.
    #[arg(short, long)]
    pub keep_staging: bool,

    /// Example script run by the validate stage, relative to the unpacked tree.
    #[arg(short, long, value_name = "PATH")]
    pub example: Option<Utf8PathBuf>,

    /// Python interpreter used by the default commands.
    #[arg(long, value_name = "PROGRAM")]
    pub python: Option<String>,

    /// Kill any stage still running after this many seconds.
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub stage_timeout: Option<u64>,

    /// Show the planned stages and exit without running them.
    #[arg(long)]
    pub dry_run: bool,

    /// Increase diagnostic logging (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output and stage command output (errors still shown).
    #[arg(short, long, conflicts_with = "verbosity")]
    pub quiet: bool,
}

impl Default for Cli {
    /// Creates a `Cli` equivalent to running `sdist-verify` with no flags.
    ///
    /// # Examples
    ///
    /// ```
    /// use sdist_verify::cli::Cli;
    ///
    /// let cli = Cli::default();
    /// assert!(!cli.dry_run);
    /// assert!(cli.staging_dir.is_none());
    /// ```
    fn default() -> Self {
        Self {
            project_dir: None,
            config: None,
            staging_dir: None,
            keep_staging: false,
            example: None,
            python: None,
            stage_timeout: None,
            dry_run: false,
            verbosity: 0,
            quiet: false,
        }
    }
}

impl Cli {
    /// Returns the configuration overrides carried by the command line.
    #[must_use]
    pub fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            project_dir: self.project_dir.clone(),
            config_path: self.config.clone(),
            staging_dir: self.staging_dir.clone(),
            keep_staging: self.keep_staging,
            example: self.example.clone(),
            python: self.python.clone(),
            stage_timeout_secs: self.stage_timeout,
        }
    }

    /// Returns the log level implied by `-v` and `-q`.
    ///
    /// ```
    /// use log::LevelFilter;
    /// use sdist_verify::cli::Cli;
    ///
    /// let cli = Cli { verbosity: 2, ..Cli::default() };
    /// assert_eq!(cli.log_level(), LevelFilter::Debug);
    /// ```
    #[must_use]
    pub const fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
