//! Output formatting for the verifier CLI.
//!
//! Progress lines, the final summary and dry-run plans are formatted here so
//! the pipeline and the binary share one wording.

use crate::command::StageCommand;
use crate::stage::Stage;
use camino::Utf8Path;
use std::io::Write;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort progress reporting; ignore write failures.
    }
}

/// Format the progress line printed when a stage starts.
///
/// # Example
///
/// ```
/// use sdist_verify::output::stage_banner;
/// use sdist_verify::stage::Stage;
///
/// let line = stage_banner(Stage::Package, "python3 setup.py sdist");
/// assert_eq!(line, "[1/5] Building source distribution: python3 setup.py sdist");
/// ```
#[must_use]
pub fn stage_banner(stage: Stage, detail: &str) -> String {
    format!(
        "[{}/{}] {}: {detail}",
        stage.ordinal(),
        Stage::ALL.len(),
        stage.label()
    )
}

/// Format the message printed after the validation example succeeds.
#[must_use]
pub fn success_message(archive: &Utf8Path, kept_staging: Option<&Utf8Path>) -> String {
    let archive_name = archive.file_name().unwrap_or(archive.as_str());
    match kept_staging {
        Some(path) => format!("Verified {archive_name}; staging directory kept at {path}"),
        None => format!("Verified {archive_name}; staging directory removed"),
    }
}

/// Planned pipeline for dry-run output.
///
/// # Example
///
/// ```
/// use camino::Utf8PathBuf;
/// use sdist_verify::command::StageCommand;
/// use sdist_verify::output::DryRunInfo;
/// use sdist_verify::stage::Stage;
///
/// let project = Utf8PathBuf::from("/work/nighres");
/// let dist = project.join("dist");
/// let commands = vec![
///     StageCommand::new(Stage::Package, "python3", project.clone()).args(["setup.py", "sdist"]),
/// ];
///
/// let info = DryRunInfo {
///     project_dir: &project,
///     dist_dir: &dist,
///     archive_hint: Some("nighres-1.0.tar.gz"),
///     staging: "/home/user/test_install-XXXXXX (removed after the run)",
///     stage_timeout_secs: None,
///     commands: &commands,
/// };
///
/// let output = info.display_text();
/// assert!(output.contains("Dry run"));
/// assert!(output.contains("python3 setup.py sdist"));
/// ```
#[derive(Debug)]
pub struct DryRunInfo<'a> {
    /// Project root.
    pub project_dir: &'a Utf8Path,
    /// Directory the archive is expected in.
    pub dist_dir: &'a Utf8Path,
    /// Archive file name derived from project metadata, if known.
    pub archive_hint: Option<&'a str>,
    /// Description of the staging policy.
    pub staging: &'a str,
    /// Per-stage timeout, if any.
    pub stage_timeout_secs: Option<u64>,
    /// External stage commands in execution order.
    pub commands: &'a [StageCommand],
}

impl DryRunInfo<'_> {
    /// Format the dry-run information for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let mut lines = vec![
            "Dry run - no commands will be executed".to_owned(),
            String::new(),
            format!("Project directory: {}", self.project_dir),
            format!(
                "Archive: {}/{}",
                self.dist_dir,
                self.archive_hint.unwrap_or("<newest *.tar.gz>")
            ),
            format!("Staging directory: {}", self.staging),
        ];

        if let Some(secs) = self.stage_timeout_secs {
            lines.push(format!("Stage timeout: {secs}s"));
        }

        lines.push(String::new());
        lines.push("Stages:".to_owned());
        for stage in Stage::ALL {
            let detail = self
                .commands
                .iter()
                .find(|command| command.stage() == stage)
                .map_or_else(
                    || "extract archive into staging directory".to_owned(),
                    |command| format!("{} (in {})", command.display(), command.working_dir()),
                );
            lines.push(format!("  {}. {}: {detail}", stage.ordinal(), stage.name()));
        }

        lines.join("\n")
    }
}
