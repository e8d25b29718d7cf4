//! Build-Install-Verify pipeline orchestration.
//!
//! This module sequences the five stages: package, stage, prepare, install
//! and validate. Each stage runs once and the first failure aborts the run.
//! The staging directory is acquired only after packaging succeeds and is
//! released on every exit path.

use crate::archive::{ArchiveExtractor, extracted_root, locate_archive};
use crate::command::{CommandExecutor, StageCommand};
use crate::config::{CONFIG_FILE_NAME, Config};
use crate::dirs::BaseDirs;
use crate::error::{Result, VerifyError};
use crate::output::{DryRunInfo, stage_banner, success_message, write_stderr_line};
use crate::project::ProjectMetadata;
use crate::runner::StageRunner;
use crate::stage::{PipelineState, Stage};
use crate::staging::{StagingArea, StagingPolicy};
use camino::{Utf8Path, Utf8PathBuf};
use log::{error, info, warn};
use std::io::Write;

/// Collaborators and settings for a pipeline run.
pub struct PipelineContext<'a> {
    /// Resolved configuration.
    pub config: &'a Config,
    /// Runs external stage commands.
    pub executor: &'a dyn CommandExecutor,
    /// Unpacks the distribution archive.
    pub extractor: &'a dyn ArchiveExtractor,
    /// Resolves the home directory for scoped staging.
    pub dirs: &'a dyn BaseDirs,
    /// Suppress progress output.
    pub quiet: bool,
}

/// Outcome of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Final state; always [`PipelineState::Validated`].
    pub state: PipelineState,
    /// The archive built by the package stage.
    pub archive: Utf8PathBuf,
    /// Root of the extracted source tree the later stages ran in.
    pub source_tree: Utf8PathBuf,
    /// The staging directory, when it outlives the run.
    pub kept_staging: Option<Utf8PathBuf>,
}

/// A single Build-Install-Verify run.
pub struct Pipeline<'a> {
    context: PipelineContext<'a>,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline in the [`PipelineState::Pending`] state.
    #[must_use]
    pub fn new(context: PipelineContext<'a>) -> Self {
        Self {
            context,
            state: PipelineState::Pending,
        }
    }

    /// The current state of the run.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Run all five stages in order, stopping at the first failure.
    ///
    /// On failure the state becomes [`PipelineState::Failed`] naming the stage
    /// that was running.
    ///
    /// # Errors
    ///
    /// Returns the first stage error. No later stage runs after it.
    pub fn run(&mut self, stderr: &mut dyn Write) -> Result<PipelineReport> {
        let result = self.run_stages(stderr);
        if let Err(err) = &result {
            let failed = self
                .state
                .pending_stage()
                .or_else(|| err.stage())
                .unwrap_or(Stage::Package);
            if let Err(transition) = self.state.fail(failed) {
                warn!("could not record failure: {transition}");
            }
            error!("pipeline {}: {err}", self.state);
        }
        result
    }

    fn run_stages(&mut self, stderr: &mut dyn Write) -> Result<PipelineReport> {
        let config = self.context.config;

        // Stage 1: build the archive; its existence is the package postcondition.
        let package = stage_command(config, Stage::Package, &config.package, &config.project_dir)?;
        self.run_external(&package, stderr)?;
        let metadata = ProjectMetadata::resolve(&config.project_dir, &config.metadata);
        let archive = locate_archive(&config.dist_dir, &metadata)?;
        info!("package stage produced {archive}");
        self.state.advance(Stage::Package)?;

        // Stage 2: acquire a staging directory and unpack into it.
        self.progress(stderr, stage_banner(Stage::Stage, archive.as_str()));
        let policy = StagingPolicy::resolve(
            self.context.dirs,
            config.staging_dir.clone(),
            &config.staging_prefix,
            config.keep_staging,
        )?;
        let area = StagingArea::acquire(&policy)?;
        let outcome = self.run_in_staging(&archive, area.path(), stderr);
        let kept_staging = release(area);

        let source_tree = outcome?;
        self.progress(stderr, "");
        self.progress(stderr, success_message(&archive, kept_staging.as_deref()));

        Ok(PipelineReport {
            state: self.state,
            archive,
            source_tree,
            kept_staging,
        })
    }

    fn run_in_staging(
        &mut self,
        archive: &Utf8Path,
        staging_dir: &Utf8Path,
        stderr: &mut dyn Write,
    ) -> Result<Utf8PathBuf> {
        let config = self.context.config;

        let entries = self.context.extractor.extract(archive, staging_dir)?;
        let tree = extracted_root(staging_dir, &entries);
        info!("extracted {archive} into {tree}");
        self.state.advance(Stage::Stage)?;

        for (stage, argv) in [
            (Stage::Prepare, &config.prepare),
            (Stage::Install, &config.install),
            (Stage::Validate, &config.validate),
        ] {
            let command = stage_command(config, stage, argv, &tree)?;
            self.run_external(&command, stderr)?;
            self.state.advance(stage)?;
        }

        Ok(tree)
    }

    fn run_external(&self, command: &StageCommand, stderr: &mut dyn Write) -> Result<()> {
        self.progress(stderr, stage_banner(command.stage(), &command.display()));
        StageRunner::new(self.context.executor).run(command)?;
        Ok(())
    }

    fn progress(&self, stderr: &mut dyn Write, message: impl std::fmt::Display) {
        if !self.context.quiet {
            write_stderr_line(stderr, message);
        }
    }
}

/// Release the staging area, logging rather than failing if removal fails.
fn release(area: StagingArea) -> Option<Utf8PathBuf> {
    let path = area.path().to_owned();
    match area.finish() {
        Ok(kept) => kept,
        Err(err) => {
            warn!("failed to remove staging directory {path}: {err}");
            Some(path)
        }
    }
}

/// Build the command for `stage` from its configured argv.
fn stage_command(
    config: &Config,
    stage: Stage,
    argv: &[String],
    working_dir: &Utf8Path,
) -> Result<StageCommand> {
    StageCommand::from_argv(stage, argv, working_dir)
        .map(|command| command.timeout(config.stage_timeout))
        .ok_or_else(|| VerifyError::InvalidConfig {
            path: config.project_dir.join(CONFIG_FILE_NAME),
            reason: format!("commands.{stage} must name a program"),
        })
}

/// Describe what a run would do without executing anything.
///
/// # Errors
///
/// Returns an error if the staging policy cannot be resolved or a command
/// is empty.
pub fn dry_run(context: &PipelineContext<'_>, stderr: &mut dyn Write) -> Result<()> {
    let config = context.config;
    let metadata = ProjectMetadata::resolve(&config.project_dir, &config.metadata);
    let policy = StagingPolicy::resolve(
        context.dirs,
        config.staging_dir.clone(),
        &config.staging_prefix,
        config.keep_staging,
    )?;

    let tree_name = match (&metadata.name, &metadata.version) {
        (Some(name), Some(version)) => format!("{name}-{version}"),
        _ => "<extracted tree>".to_owned(),
    };
    let tree = Utf8PathBuf::from("<staging>").join(tree_name);

    let commands = vec![
        stage_command(config, Stage::Package, &config.package, &config.project_dir)?,
        stage_command(config, Stage::Prepare, &config.prepare, &tree)?,
        stage_command(config, Stage::Install, &config.install, &tree)?,
        stage_command(config, Stage::Validate, &config.validate, &tree)?,
    ];
    let archive_names = metadata.archive_file_names();
    let staging = policy.describe();

    let info = DryRunInfo {
        project_dir: &config.project_dir,
        dist_dir: &config.dist_dir,
        archive_hint: archive_names.first().map(String::as_str),
        staging: &staging,
        stage_timeout_secs: config.stage_timeout.map(|t| t.as_secs()),
        commands: &commands,
    };
    write_stderr_line(stderr, info.display_text());
    Ok(())
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
