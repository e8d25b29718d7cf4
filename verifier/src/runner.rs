//! Attempt-once stage runner.
//!
//! The runner executes a [`StageCommand`] through a [`CommandExecutor`] and
//! turns an unexpected exit status into [`VerifyError::StageFailed`]. There
//! are no retries.

use crate::command::{CommandExecutor, StageCommand};
use crate::error::{Result, VerifyError};
use log::{debug, info};
use std::process::{ExitStatus, Output};

/// Number of trailing stderr lines kept in failure reports.
const STDERR_TAIL_LINES: usize = 20;

/// Runs stage commands through an executor.
pub struct StageRunner<'a> {
    executor: &'a dyn CommandExecutor,
}

impl<'a> StageRunner<'a> {
    /// Create a runner backed by `executor`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self { executor }
    }

    /// Run `command` once and check its exit status.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::StageFailed`] if the exit code differs from the
    /// command's expected code, or any executor error unchanged.
    pub fn run(&self, command: &StageCommand) -> Result<Output> {
        info!(
            "{} stage: running `{}` in {}",
            command.stage(),
            command.display(),
            command.working_dir()
        );

        let output = self.executor.run(command)?;
        let exit_code = exit_code(output.status);
        debug!("{} stage exited with {exit_code}", command.stage());

        if exit_code != command.expected_exit_code() {
            return Err(VerifyError::StageFailed {
                stage: command.stage(),
                command: command.display(),
                exit_code,
                stderr_tail: stderr_tail(&output.stderr),
            });
        }

        info!("{} stage succeeded", command.stage());
        Ok(output)
    }
}

/// Map an exit status to a shell-style exit code.
///
/// Processes killed by a signal report `128 + signal` on Unix.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    signal_exit_code(status)
}

#[cfg(unix)]
fn signal_exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status.signal().map_or(1, |signal| 128 + signal)
}

#[cfg(not(unix))]
fn signal_exit_code(_status: ExitStatus) -> i32 {
    1
}

fn stderr_tail(stderr: &[u8]) -> Option<String> {
    if stderr.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    Some(lines.get(start..).unwrap_or_default().join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;
    use crate::test_utils::{ExpectedCall, StubExecutor, exit_status, failure_output, success_output};

    fn validate_command() -> StageCommand {
        StageCommand::new(Stage::Validate, "python3", "/stage/nighres-1.0")
            .args(["examples/testing_01_quick_tissue_classification.py"])
    }

    #[test]
    fn successful_stage_returns_output() {
        let executor = StubExecutor::new(vec![ExpectedCall::new(
            Stage::Validate,
            "python3",
            vec!["examples/testing_01_quick_tissue_classification.py"],
            Ok(success_output()),
        )]);
        let runner = StageRunner::new(&executor);

        let output = runner.run(&validate_command()).expect("stage succeeds");
        assert!(output.status.success());
        executor.assert_finished();
    }

    #[test]
    fn non_zero_exit_becomes_stage_failure() {
        let executor = StubExecutor::new(vec![ExpectedCall::new(
            Stage::Validate,
            "python3",
            vec!["examples/testing_01_quick_tissue_classification.py"],
            Ok(failure_output("AssertionError: mismatch")),
        )]);
        let runner = StageRunner::new(&executor);

        let err = runner.run(&validate_command()).expect_err("stage fails");
        match err {
            VerifyError::StageFailed {
                stage,
                exit_code,
                stderr_tail,
                ..
            } => {
                assert_eq!(stage, Stage::Validate);
                assert_eq!(exit_code, 1);
                assert_eq!(stderr_tail.as_deref(), Some("AssertionError: mismatch"));
            }
            other => panic!("expected StageFailed, got {other:?}"),
        }
    }

    #[test]
    fn custom_expected_exit_code_is_honoured() {
        let mut output = success_output();
        output.status = exit_status(2);
        let executor = StubExecutor::new(vec![ExpectedCall::new(
            Stage::Validate,
            "python3",
            vec!["examples/testing_01_quick_tissue_classification.py"],
            Ok(output),
        )]);
        let runner = StageRunner::new(&executor);

        runner
            .run(&validate_command().expect_exit_code(2))
            .expect("exit code 2 is expected");
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let text: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(text.as_bytes()).expect("tail present");
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 29"));
    }

    #[cfg(unix)]
    #[test]
    fn signal_termination_maps_to_128_plus_signal() {
        use std::os::unix::process::ExitStatusExt;

        // Raw wait status for a child killed by SIGKILL.
        let status = ExitStatus::from_raw(9);
        assert_eq!(exit_code(status), 137);
    }
}
