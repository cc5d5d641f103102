//! End-to-end CLI behaviour tests for `chart-mirror`.
//!
//! These scenarios invoke the binary and validate its exit status and the
//! text it writes to stdout and stderr.

use std::process::{Command, Output};

use camino::Utf8PathBuf;
use chart_mirror_core::test_support::{ChartFixture, write_chart_archive};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// World types
// ---------------------------------------------------------------------------

struct CliWorld {
    // Keep the temporary folder alive for the lifetime of the scenario.
    _temp_dir: TempDir,
    folder: Utf8PathBuf,
    args: Vec<String>,
    output: Option<Output>,
}

#[fixture]
fn cli_world() -> CliWorld {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let folder = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).expect("UTF-8 path");
    CliWorld {
        _temp_dir: temp_dir,
        folder,
        args: Vec::new(),
        output: None,
    }
}

impl CliWorld {
    fn output(&self) -> &Output {
        self.output.as_ref().expect("chart-mirror has run")
    }

    fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output().stdout).into_owned()
    }

    fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output().stderr).into_owned()
    }
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a folder holding a chart archive")]
fn given_chart_folder(cli_world: &mut CliWorld) {
    let chart = ChartFixture::new("svc", "0.1.0")
        .values("image:\n  repository: busybox\n  tag: \"1.36\"\n")
        .template(
            "deployment.yaml",
            "spec:\n  containers:\n    - name: main\n      image: \"{{ .Values.image.repository }}:{{ .Values.image.tag }}\"\n",
        )
        .template("NOTES.txt", "image: not-a-manifest\n");
    write_chart_archive(&cli_world.folder, &chart);
}

#[given("the arguments \"{args}\"")]
fn given_arguments(cli_world: &mut CliWorld, args: String) {
    let folder = cli_world.folder.to_string();
    cli_world.args = args
        .split_whitespace()
        .map(|arg| arg.replace("{folder}", &folder))
        .collect();
}

#[when("chart-mirror is run")]
fn when_chart_mirror_run(cli_world: &mut CliWorld) {
    let output = Command::new(env!("CARGO_BIN_EXE_chart-mirror"))
        .args(&cli_world.args)
        .current_dir(&cli_world.folder)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn chart-mirror");
    cli_world.output = Some(output);
}

#[then("the CLI exits successfully")]
fn then_cli_exits_successfully(cli_world: &mut CliWorld) {
    assert!(
        cli_world.output().status.success(),
        "expected success, stderr: {}",
        cli_world.stderr()
    );
}

#[then("the CLI exits with status {code}")]
fn then_cli_exits_with_status(cli_world: &mut CliWorld, code: i32) {
    assert_eq!(
        cli_world.output().status.code(),
        Some(code),
        "stdout: {}, stderr: {}",
        cli_world.stdout(),
        cli_world.stderr()
    );
}

#[then("stdout names the package version")]
fn then_stdout_names_version(cli_world: &mut CliWorld) {
    assert_eq!(
        cli_world.stdout(),
        format!("chart-mirror {}\n", env!("CARGO_PKG_VERSION"))
    );
}

#[then("stdout is the single line \"{line}\"")]
fn then_stdout_single_line(cli_world: &mut CliWorld, line: String) {
    assert_eq!(cli_world.stdout(), format!("{line}\n"));
}

#[then("stderr is the single line \"{line}\"")]
fn then_stderr_single_line(cli_world: &mut CliWorld, line: String) {
    assert_eq!(cli_world.stderr(), format!("{line}\n"));
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/cli.feature",
    name = "The version subcommand prints the package version"
)]
fn scenario_version(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "A relative destination is rejected"
)]
fn scenario_relative_destination(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "A non-http repository is rejected"
)]
fn scenario_non_http_repository(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "A chart version without a chart name is rejected"
)]
fn scenario_version_without_name(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "A client certificate without its key is rejected"
)]
fn scenario_lone_client_certificate(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "An unknown output kind is rejected"
)]
fn scenario_unknown_output_kind(cli_world: CliWorld) {
    let _ = cli_world;
}

#[scenario(
    path = "tests/features/cli.feature",
    name = "Images are printed on stdout"
)]
fn scenario_images_on_stdout(cli_world: CliWorld) {
    let _ = cli_world;
}
