//! Stage commands and the executor that runs them.
//!
//! Every external stage is described by the same [`StageCommand`] shape:
//! program, arguments, working directory and expected exit code. A single
//! [`CommandExecutor`] seam runs them, so tests can substitute a scripted
//! executor for the real process spawner.

use crate::error::{Result, VerifyError};
use crate::stage::Stage;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// How long captured pipes may stay open after the child exits.
///
/// Background processes started by a stage inherit its stdout and stderr and
/// can hold them open indefinitely.
const PIPE_CLOSE_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8192;

/// An external command run for one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    stage: Stage,
    program: String,
    args: Vec<String>,
    working_dir: Utf8PathBuf,
    expected_exit_code: i32,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl StageCommand {
    /// Create a command for `stage` running `program` in `working_dir`.
    ///
    /// The expected exit code defaults to zero and no timeout is applied.
    #[must_use]
    pub fn new(stage: Stage, program: impl Into<String>, working_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            stage,
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            expected_exit_code: 0,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Build a command from an argv vector; the first element is the program.
    ///
    /// Returns `None` when `argv` is empty.
    #[must_use]
    pub fn from_argv(stage: Stage, argv: &[String], working_dir: &Utf8Path) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(stage, program.as_str(), working_dir).args(args.iter().cloned()))
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child process.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the exit code that counts as success.
    #[must_use]
    pub const fn expect_exit_code(mut self, code: i32) -> Self {
        self.expected_exit_code = code;
        self
    }

    /// Kill the child if it runs longer than `timeout`.
    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The stage this command belongs to.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// The program as configured.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// The directory the command runs in.
    #[must_use]
    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }

    /// The exit code that counts as success.
    #[must_use]
    pub const fn expected_exit_code(&self) -> i32 {
        self.expected_exit_code
    }

    /// The configured timeout, if any.
    #[must_use]
    pub const fn time_limit(&self) -> Option<Duration> {
        self.timeout
    }

    /// Resolve the program path.
    ///
    /// A relative path with more than one component, such as `./build.sh`,
    /// is taken relative to the working directory. Bare names are left for
    /// `PATH` lookup.
    #[must_use]
    pub fn resolved_program(&self) -> Utf8PathBuf {
        if self.program_is_dir_relative() {
            self.working_dir.join(&self.program)
        } else {
            Utf8PathBuf::from(&self.program)
        }
    }

    fn program_is_dir_relative(&self) -> bool {
        let program = Utf8Path::new(&self.program);
        program.is_relative() && program.components().count() > 1
    }

    /// Render the command line for logs and dry-run output.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote_for_display)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> std::io::Result<Command> {
        // The child resolves a relative program path against its own working
        // directory, so both are anchored to the invocation directory first.
        let working_dir = std::path::absolute(self.working_dir.as_std_path())?;
        let mut cmd = if self.program_is_dir_relative() {
            Command::new(working_dir.join(&self.program))
        } else {
            Command::new(Path::new(&self.program))
        };
        cmd.args(&self.args);
        cmd.current_dir(working_dir);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        Ok(cmd)
    }
}

fn quote_for_display(word: &str) -> String {
    if word.is_empty() || word.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", word.replace('\'', r"'\''"))
    } else {
        word.to_owned()
    }
}

/// How a child's stdout and stderr are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Stream child output straight to the terminal.
    #[default]
    Inherit,
    /// Collect child output so failures can report it.
    Capture,
}

/// Abstraction for running stage commands.
pub trait CommandExecutor {
    /// Run `command` to completion and return its output.
    ///
    /// A non-zero exit status is not an error at this level; callers compare
    /// the status against the command's expected exit code.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Spawn`] if the program cannot be started and
    /// [`VerifyError::StageTimedOut`] if it outlives its timeout.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sdist_verify::command::{CommandExecutor, StageCommand, SystemCommandExecutor};
    /// use sdist_verify::stage::Stage;
    ///
    /// let executor = SystemCommandExecutor::default();
    /// let command = StageCommand::new(Stage::Package, "python3", ".").args(["setup.py", "sdist"]);
    /// let output = executor.run(&command)?;
    /// assert!(output.status.success());
    /// # Ok::<(), sdist_verify::error::VerifyError>(())
    /// ```
    fn run(&self, command: &StageCommand) -> Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor {
    output_mode: OutputMode,
}

impl SystemCommandExecutor {
    /// Create an executor with the given output handling.
    #[must_use]
    pub const fn new(output_mode: OutputMode) -> Self {
        Self { output_mode }
    }

    /// The output handling used for spawned children.
    #[must_use]
    pub const fn output_mode(&self) -> OutputMode {
        self.output_mode
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, command: &StageCommand) -> Result<Output> {
        let mut cmd = command.to_command()?;
        if self.output_mode == OutputMode::Capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        debug!(
            "spawning {} stage command `{}` in {}",
            command.stage(),
            command.display(),
            command.working_dir()
        );
        let mut child = cmd.spawn().map_err(|source| VerifyError::Spawn {
            stage: command.stage(),
            program: command.program().to_owned(),
            source,
        })?;

        // Drain pipes concurrently so a chatty child cannot block on a full pipe.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match command.time_limit() {
            None => child.wait()?,
            Some(limit) => {
                if let Some(status) = child.wait_timeout(limit)? {
                    status
                } else {
                    if let Err(err) = child.kill() {
                        warn!("failed to kill timed out {} stage: {err}", command.stage());
                    }
                    child.wait()?;
                    return Err(VerifyError::StageTimedOut {
                        stage: command.stage(),
                        command: command.display(),
                        seconds: limit.as_secs(),
                    });
                }
            }
        };

        let deadline = Instant::now() + PIPE_CLOSE_GRACE;
        Ok(Output {
            status,
            stdout: collect(stdout, deadline, command.stage()),
            stderr: collect(stderr, deadline, command.stage()),
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (sender, receiver) = mpsc::channel();
    std::thread::spawn(move || {
        loop {
            let mut chunk = vec![0; READ_CHUNK];
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => {
                    chunk.truncate(read);
                    if sender.send(chunk).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => {
                    debug!("stopped reading child output: {err}");
                    break;
                }
            }
        }
    });
    receiver
}

/// Gather drained output until the pipe closes or `deadline` passes.
fn collect(receiver: Option<Receiver<Vec<u8>>>, deadline: Instant, stage: Stage) -> Vec<u8> {
    let mut buffer = Vec::new();
    let Some(receiver) = receiver else {
        return buffer;
    };
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining) {
            Ok(chunk) => buffer.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "{stage} stage output still open after the command exited; \
                     a background process may be holding it"
                );
                break;
            }
        }
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn from_argv_splits_program_and_args() {
        let argv = vec!["python3".to_owned(), "-m".to_owned(), "pip".to_owned()];
        let command = StageCommand::from_argv(Stage::Install, &argv, Utf8Path::new("/tmp"))
            .expect("non-empty argv");
        assert_eq!(command.program(), "python3");
        assert_eq!(command.arguments(), ["-m", "pip"]);
        assert_eq!(command.expected_exit_code(), 0);
    }

    #[test]
    fn from_argv_rejects_empty_vector() {
        assert!(StageCommand::from_argv(Stage::Install, &[], Utf8Path::new("/tmp")).is_none());
    }

    #[rstest]
    #[case::dot_slash("./build.sh", "/stage/nighres-1.0/build.sh")]
    #[case::nested("scripts/prep.sh", "/stage/nighres-1.0/scripts/prep.sh")]
    #[case::bare_name("python3", "python3")]
    #[case::absolute("/usr/bin/python3", "/usr/bin/python3")]
    fn resolved_program_joins_relative_paths(#[case] program: &str, #[case] expected: &str) {
        let command = StageCommand::new(Stage::Prepare, program, "/stage/nighres-1.0");
        assert_eq!(command.resolved_program(), Utf8PathBuf::from(expected));
    }

    #[test]
    fn display_quotes_words_with_spaces() {
        let command = StageCommand::new(Stage::Package, "sh", "/tmp").args(["-c", "exit 3"]);
        assert_eq!(command.display(), "sh -c 'exit 3'");
    }

    #[cfg(unix)]
    mod system {
        use super::*;

        fn sh(script: &str) -> StageCommand {
            StageCommand::new(Stage::Validate, "sh", "/").args(["-c", script])
        }

        #[test]
        fn captures_output_and_status() {
            let executor = SystemCommandExecutor::new(OutputMode::Capture);
            let output = executor
                .run(&sh("echo out; echo err >&2; exit 4"))
                .expect("command runs");
            assert_eq!(output.status.code(), Some(4));
            assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
            assert_eq!(String::from_utf8_lossy(&output.stderr), "err\n");
        }

        #[test]
        fn runs_in_working_directory() {
            let dir = tempfile::tempdir().expect("temp dir");
            let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf-8 temp dir");
            let command = StageCommand::new(Stage::Prepare, "sh", path.clone()).args(["-c", "pwd"]);
            let output = SystemCommandExecutor::new(OutputMode::Capture)
                .run(&command)
                .expect("command runs");
            let reported = String::from_utf8_lossy(&output.stdout).trim().to_owned();
            let canonical = std::fs::canonicalize(&path).expect("canonicalise");
            assert_eq!(std::path::PathBuf::from(reported), canonical);
        }

        #[test]
        fn missing_program_is_a_spawn_error() {
            let command = StageCommand::new(Stage::Package, "definitely-not-a-real-program-xyz", "/");
            let err = SystemCommandExecutor::default()
                .run(&command)
                .expect_err("spawn should fail");
            assert!(matches!(err, VerifyError::Spawn { stage: Stage::Package, .. }));
        }

        #[test]
        fn timeout_kills_hung_child() {
            let command = sh("sleep 5").timeout(Some(Duration::from_millis(100)));
            let err = SystemCommandExecutor::new(OutputMode::Capture)
                .run(&command)
                .expect_err("command should time out");
            assert!(matches!(err, VerifyError::StageTimedOut { stage: Stage::Validate, .. }));
        }

        #[test]
        fn background_process_holding_pipes_does_not_block() {
            let started = Instant::now();
            let output = SystemCommandExecutor::new(OutputMode::Capture)
                .run(&sh("sleep 30 & echo done; exit 0"))
                .expect("command runs");
            assert!(output.status.success());
            assert_eq!(String::from_utf8_lossy(&output.stdout), "done\n");
            assert!(started.elapsed() < Duration::from_secs(15));
        }

        #[test]
        fn relative_working_dir_runs_dot_slash_script() {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir_in(".").expect("temp dir");
            assert!(dir.path().is_relative());
            let script = dir.path().join("build.sh");
            std::fs::write(&script, "#!/bin/sh\ntouch prepared\n").expect("write script");
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
                .expect("chmod script");

            let working_dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf-8 dir");
            let command = StageCommand::new(Stage::Prepare, "./build.sh", working_dir);
            let output = SystemCommandExecutor::new(OutputMode::Capture)
                .run(&command)
                .expect("script runs");

            assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
            assert!(dir.path().join("prepared").is_file());
        }

        #[test]
        fn passes_environment_variables() {
            let command = sh("printf %s \"$SDIST_VERIFY_TEST\"").env("SDIST_VERIFY_TEST", "hello");
            let output = SystemCommandExecutor::new(OutputMode::Capture)
                .run(&command)
                .expect("command runs");
            assert_eq!(String::from_utf8_lossy(&output.stdout), "hello");
        }
    }
}
