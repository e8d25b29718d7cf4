//! Pipeline configuration.
//!
//! Configuration comes from three layers, lowest precedence first: built-in
//! defaults that reproduce the classic `setup.py sdist` / `build.sh` /
//! `pip install --user` / example-script sequence, an optional
//! `sdist-verify.toml` in the project directory, and command-line overrides.

use crate::error::{Result, VerifyError};
use crate::project::ProjectMetadata;
use crate::staging::DEFAULT_STAGING_PREFIX;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Deserialize;
use std::time::Duration;

/// Name of the configuration file looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "sdist-verify.toml";

/// Interpreter used by the default package, install and validate commands.
pub const DEFAULT_PYTHON: &str = "python3";

/// Example script run by the default validate command.
pub const DEFAULT_EXAMPLE: &str = "examples/testing_01_quick_tissue_classification.py";

/// Preparation script run by the default prepare command.
pub const DEFAULT_PREPARE_SCRIPT: &str = "./build.sh";

/// Directory the package stage writes archives to.
pub const DEFAULT_DIST_DIR: &str = "dist";

/// Contents of `sdist-verify.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Project naming and output location.
    pub project: ProjectSection,
    /// Stage command lines.
    pub commands: CommandsSection,
    /// Staging directory settings.
    pub staging: StagingSection,
    /// Per-stage timeout in seconds; absent means stages may run forever.
    pub stage_timeout_secs: Option<u64>,
}

/// The `[project]` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectSection {
    /// Distribution name used to find the archive.
    pub name: Option<String>,
    /// Distribution version used to find the archive.
    pub version: Option<String>,
    /// Archive output directory, relative to the project directory.
    pub dist_dir: Option<Utf8PathBuf>,
}

/// The `[commands]` table. Each command is an argv array.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CommandsSection {
    /// Interpreter used to build the default commands.
    pub python: Option<String>,
    /// Example script for the default validate command.
    pub example: Option<Utf8PathBuf>,
    /// Package stage command, run in the project directory.
    pub package: Option<Vec<String>>,
    /// Prepare stage command, run in the extracted tree.
    pub prepare: Option<Vec<String>>,
    /// Install stage command, run in the extracted tree.
    pub install: Option<Vec<String>>,
    /// Validate stage command, run in the extracted tree.
    pub validate: Option<Vec<String>>,
}

/// The `[staging]` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StagingSection {
    /// Prefix for scoped staging directories under the home directory.
    pub prefix: Option<String>,
    /// Fixed staging directory, relative to the project directory; disables
    /// scoped staging.
    pub dir: Option<Utf8PathBuf>,
    /// Keep the scoped staging directory after the run.
    pub keep: Option<bool>,
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Project directory; defaults to the current directory.
    pub project_dir: Option<Utf8PathBuf>,
    /// Explicit configuration file path.
    pub config_path: Option<Utf8PathBuf>,
    /// Fixed staging directory.
    pub staging_dir: Option<Utf8PathBuf>,
    /// Keep the scoped staging directory.
    pub keep_staging: bool,
    /// Example script for the validate stage.
    pub example: Option<Utf8PathBuf>,
    /// Interpreter for the default commands.
    pub python: Option<String>,
    /// Per-stage timeout in seconds.
    pub stage_timeout_secs: Option<u64>,
}

/// Fully resolved configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the project being verified.
    pub project_dir: Utf8PathBuf,
    /// Directory the archive is expected in.
    pub dist_dir: Utf8PathBuf,
    /// Explicit name/version overrides.
    pub metadata: ProjectMetadata,
    /// Package stage argv.
    pub package: Vec<String>,
    /// Prepare stage argv.
    pub prepare: Vec<String>,
    /// Install stage argv.
    pub install: Vec<String>,
    /// Validate stage argv.
    pub validate: Vec<String>,
    /// Fixed staging directory, if any.
    pub staging_dir: Option<Utf8PathBuf>,
    /// Prefix for scoped staging directories.
    pub staging_prefix: String,
    /// Keep the scoped staging directory.
    pub keep_staging: bool,
    /// Per-stage timeout.
    pub stage_timeout: Option<Duration>,
}

impl Config {
    /// Load configuration for a run.
    ///
    /// The configuration file is read from `--config` when given, otherwise
    /// from [`CONFIG_FILE_NAME`] in the project directory if present.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidConfig`] if the file cannot be read or
    /// parsed or holds invalid values, and [`VerifyError::NonUtf8Path`] if the
    /// current directory is not UTF-8.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        // Stage commands run with other working directories, so every path
        // taken from the command line is anchored to the invocation directory.
        let cwd = current_dir_utf8()?;
        let project_dir = overrides
            .project_dir
            .as_ref()
            .map_or_else(|| cwd.clone(), |dir| cwd.join(dir));
        let overrides = &ConfigOverrides {
            project_dir: Some(project_dir.clone()),
            staging_dir: overrides.staging_dir.as_ref().map(|dir| cwd.join(dir)),
            ..overrides.clone()
        };

        let file = match &overrides.config_path {
            Some(path) => read_config_file(path)?,
            None => {
                let default_path = project_dir.join(CONFIG_FILE_NAME);
                if default_path.is_file() {
                    read_config_file(&default_path)?
                } else {
                    debug!("no {CONFIG_FILE_NAME} in {project_dir}; using defaults");
                    FileConfig::default()
                }
            }
        };

        let config_path = overrides
            .config_path
            .clone()
            .unwrap_or_else(|| project_dir.join(CONFIG_FILE_NAME));
        Self::merge(project_dir, file, overrides).map_err(|reason| VerifyError::InvalidConfig {
            path: config_path,
            reason,
        })
    }

    /// Combine file values and overrides on top of the defaults.
    ///
    /// Relative `dist_dir` and `staging.dir` values from the file, and a
    /// relative `staging_dir` override, are resolved against `project_dir`.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn merge(
        project_dir: Utf8PathBuf,
        file: FileConfig,
        overrides: &ConfigOverrides,
    ) -> std::result::Result<Self, String> {
        let FileConfig {
            project,
            commands,
            staging,
            stage_timeout_secs,
        } = file;

        let python = overrides
            .python
            .clone()
            .or(commands.python)
            .unwrap_or_else(|| DEFAULT_PYTHON.to_owned());
        let example = overrides
            .example
            .clone()
            .or(commands.example)
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_EXAMPLE));

        // An explicit --example replaces any configured validate command.
        let validate = match (&overrides.example, commands.validate) {
            (None, Some(argv)) => argv,
            _ => vec![python.clone(), example.into_string()],
        };
        let package = commands
            .package
            .unwrap_or_else(|| vec![python.clone(), "setup.py".to_owned(), "sdist".to_owned()]);
        let prepare = commands
            .prepare
            .unwrap_or_else(|| vec![DEFAULT_PREPARE_SCRIPT.to_owned()]);
        let install = commands.install.unwrap_or_else(|| {
            let mut argv = vec![python.clone()];
            argv.extend(["-m", "pip", "install", "--user", "."].map(str::to_owned));
            argv
        });

        for (stage, argv) in [
            ("package", &package),
            ("prepare", &prepare),
            ("install", &install),
            ("validate", &validate),
        ] {
            if argv.first().is_none_or(|program| program.trim().is_empty()) {
                return Err(format!("commands.{stage} must name a program"));
            }
        }

        let timeout_secs = overrides.stage_timeout_secs.or(stage_timeout_secs);
        if timeout_secs == Some(0) {
            return Err("stage_timeout_secs must be greater than zero".to_owned());
        }

        let staging_prefix = staging
            .prefix
            .unwrap_or_else(|| DEFAULT_STAGING_PREFIX.to_owned());
        if staging_prefix.is_empty() || staging_prefix.contains(['/', '\\']) {
            return Err(format!("staging.prefix {staging_prefix:?} must be a plain file name"));
        }

        let dist_dir = project_dir.join(
            project
                .dist_dir
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DIST_DIR)),
        );

        Ok(Self {
            dist_dir,
            metadata: ProjectMetadata {
                name: project.name,
                version: project.version,
            },
            package,
            prepare,
            install,
            validate,
            staging_dir: overrides
                .staging_dir
                .clone()
                .or(staging.dir)
                .map(|dir| project_dir.join(dir)),
            staging_prefix,
            keep_staging: overrides.keep_staging || staging.keep.unwrap_or(false),
            stage_timeout: timeout_secs.map(Duration::from_secs),
            project_dir,
        })
    }
}

/// Parse the configuration file at `path`.
///
/// # Errors
///
/// Returns [`VerifyError::InvalidConfig`] if the file cannot be read or is
/// not valid configuration TOML.
pub fn read_config_file(path: &Utf8Path) -> Result<FileConfig> {
    let invalid = |reason: String| VerifyError::InvalidConfig {
        path: path.to_owned(),
        reason,
    };
    let contents = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let file = toml::from_str::<FileConfig>(&contents).map_err(|e| invalid(e.to_string()))?;
    debug!("loaded configuration from {path}");
    Ok(file)
}

fn current_dir_utf8() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir()?;
    Utf8PathBuf::try_from(cwd).map_err(|e| VerifyError::NonUtf8Path {
        path: e.into_path_buf().display().to_string(),
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
