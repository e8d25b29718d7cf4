//! sdist-verify CLI entrypoint.
//!
//! This binary builds a Python project's source distribution, unpacks it into
//! a staging directory under `$HOME`, runs the build script, installs the
//! package for the current user and runs one example script. The exit status
//! is that of the first failing stage.

use clap::Parser;
use sdist_verify::archive::TarGzExtractor;
use sdist_verify::cli::Cli;
use sdist_verify::command::{OutputMode, SystemCommandExecutor};
use sdist_verify::config::Config;
use sdist_verify::dirs::SystemBaseDirs;
use sdist_verify::error::Result;
use sdist_verify::output::write_stderr_line;
use sdist_verify::pipeline::{Pipeline, PipelineContext, dry_run};
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Installs the logger; `RUST_LOG` takes precedence over `-v`/`-q`.
fn init_logging(cli: &Cli) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(cli.log_level())
        .format_timestamp(None)
        .parse_default_env();
    if builder.try_init().is_err() {
        // A logger is already installed; keep it.
    }
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<()> {
    let config = Config::load(&cli.config_overrides())?;
    let executor = SystemCommandExecutor::new(output_mode_for(cli.quiet));
    let context = PipelineContext {
        config: &config,
        executor: &executor,
        extractor: &TarGzExtractor,
        dirs: &SystemBaseDirs,
        quiet: cli.quiet,
    };

    // Dry-run mode: show the plan without side effects
    if cli.dry_run {
        return dry_run(&context, stderr);
    }

    Pipeline::new(context).run(stderr)?;
    Ok(())
}

/// Quiet runs capture child output so failures can still report its tail.
const fn output_mode_for(quiet: bool) -> OutputMode {
    if quiet {
        OutputMode::Capture
    } else {
        OutputMode::Inherit
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            err.exit_code()
        }
    }
}
