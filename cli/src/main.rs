//! chart-mirror CLI entrypoint.
//!
//! Mirrors a Helm chart repository into a local folder, or lists the
//! container images used by mirrored charts.

use std::io::Write;

use chart_mirror::cli::{Cli, Command};
use chart_mirror::error::{CliError, Result};
use chart_mirror::inspect::run_inspect;
use chart_mirror::mirror::run_mirror;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stdout);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Installs the stderr log subscriber; `RUST_LOG` overrides the level.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli, stdout: &mut dyn Write) -> Result<()> {
    match &cli.command {
        Some(Command::InspectImages(args)) => run_inspect(args, cli.ignore_errors, stdout),
        Some(Command::Version) => write_version(stdout),
        None => run_mirror(&cli.mirror, cli.ignore_errors).map(|_| ()),
    }
}

fn write_version(stdout: &mut dyn Write) -> Result<()> {
    writeln!(stdout, "chart-mirror {}", env!("CARGO_PKG_VERSION"))
        .map_err(|source| CliError::WriteFailed { source })
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, err);
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_error_and_returns_one() {
        let err = CliError::MissingArguments { expected: 2 };
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);
        assert_eq!(
            String::from_utf8(stderr).expect("stderr is UTF-8"),
            "requires at least 2 arg(s) to execute\n"
        );
    }

    #[test]
    fn version_subcommand_prints_package_version() {
        let cli = Cli::parse_from(["chart-mirror", "version"]);
        let mut stdout = Vec::new();
        run(&cli, &mut stdout).expect("version");
        assert_eq!(
            String::from_utf8(stdout).expect("stdout is UTF-8"),
            format!("chart-mirror {}\n", env!("CARGO_PKG_VERSION"))
        );
    }
}
