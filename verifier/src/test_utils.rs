//! Shared test utilities for the verifier crate.

use crate::command::{CommandExecutor, StageCommand};
use crate::error::{Result, VerifyError};
use crate::stage::Stage;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected stage command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The stage the command should belong to.
    pub stage: Stage,
    /// The program to execute (e.g., "python3").
    pub program: &'static str,
    /// The arguments to pass to the program.
    pub args: Vec<&'static str>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

impl ExpectedCall {
    /// Creates an expected call.
    #[must_use]
    pub const fn new(
        stage: Stage,
        program: &'static str,
        args: Vec<&'static str>,
        result: Result<Output>,
    ) -> Self {
        Self {
            stage,
            program,
            args,
            result,
        }
    }
}

/// Side effect run when a stub call is consumed, e.g. writing an archive.
type CallHook = Box<dyn Fn(&StageCommand)>;

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify stage ordering without spawning processes.
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    hooks: RefCell<Vec<(Stage, CallHook)>>,
    seen: RefCell<Vec<Stage>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            hooks: RefCell::new(Vec::new()),
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Registers a side effect to run whenever a command for `stage` is invoked.
    #[must_use]
    pub fn on_stage(self, stage: Stage, hook: impl Fn(&StageCommand) + 'static) -> Self {
        self.hooks.borrow_mut().push((stage, Box::new(hook)));
        self
    }

    /// Returns the stages invoked so far, in order.
    #[must_use]
    pub fn invoked_stages(&self) -> Vec<Stage> {
        self.seen.borrow().clone()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.borrow().is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, command: &StageCommand) -> Result<Output> {
        let Some(call) = self.expected.borrow_mut().pop_front() else {
            return Err(VerifyError::StubMismatch {
                message: format!("unexpected invocation of `{}`", command.display()),
            });
        };

        let args: Vec<&str> = command.arguments().iter().map(String::as_str).collect();
        if call.stage != command.stage() || call.program != command.program() || call.args != args {
            return Err(VerifyError::StubMismatch {
                message: format!(
                    "expected {} stage `{} {}`, got {} stage `{}`",
                    call.stage,
                    call.program,
                    call.args.join(" "),
                    command.stage(),
                    command.display()
                ),
            });
        }

        self.seen.borrow_mut().push(command.stage());
        for (stage, hook) in self.hooks.borrow().iter() {
            if *stage == command.stage() {
                hook(command);
            }
        }

        call.result
    }
}

/// Runs `f` with `HOME` pointing at `home`.
#[cfg(feature = "test-support")]
pub fn with_home<R>(home: &std::path::Path, f: impl FnOnce() -> R) -> R {
    temp_env::with_var("HOME", Some(home), f)
}
