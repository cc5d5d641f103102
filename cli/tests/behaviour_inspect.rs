//! Behaviour-driven tests for the inspect-images command.
//!
//! Scenarios build chart archives in a temporary folder, run the command
//! handler with the production renderer and check what each output sink
//! received.

use camino::Utf8PathBuf;
use chart_mirror::cli::InspectArgs;
use chart_mirror::error::CliError;
use chart_mirror::inspect::run_inspect;
use chart_mirror_core::test_support::{ChartFixture, write_chart_archive};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// World types
// ---------------------------------------------------------------------------

struct InspectWorld {
    _temp_dir: TempDir,
    charts: Utf8PathBuf,
    out_dir: Utf8PathBuf,
    ignore_errors: bool,
    stdout: Vec<u8>,
    result: Option<Result<(), CliError>>,
}

#[fixture]
fn world() -> InspectWorld {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).expect("UTF-8 path");
    let charts = root.join("charts");
    let out_dir = root.join("out");
    std::fs::create_dir_all(&charts).expect("create charts folder");
    std::fs::create_dir_all(&out_dir).expect("create output folder");
    InspectWorld {
        _temp_dir: temp_dir,
        charts,
        out_dir,
        ignore_errors: false,
        stdout: Vec::new(),
        result: None,
    }
}

fn names_in(list: &str) -> Vec<String> {
    list.split(',').map(str::to_owned).collect()
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a chart archive \"{name}\" using images \"{images}\"")]
fn given_chart_archive(world: &mut InspectWorld, name: String, images: String) {
    let images = names_in(&images);
    let images: Vec<&str> = images.iter().map(String::as_str).collect();
    write_chart_archive(
        &world.charts,
        &ChartFixture::new(&name, "1.0.0").with_images(&images),
    );
}

#[given("a corrupt archive \"{file}\"")]
fn given_corrupt_archive(world: &mut InspectWorld, file: String) {
    std::fs::write(world.charts.join(file), b"not a gzip stream").expect("write archive");
}

#[given("errors are ignored")]
fn given_errors_ignored(world: &mut InspectWorld) {
    world.ignore_errors = true;
}

#[when("the folder is inspected with output \"{output}\"")]
fn when_inspected(world: &mut InspectWorld, output: String) {
    // Output files land in the scenario's temporary folder.
    let output = match output.split_once('=') {
        Some((kind, file)) => format!("{kind}={}", world.out_dir.join(file)),
        None => output,
    };
    let args = InspectArgs {
        target: Some(world.charts.clone()),
        output,
    };
    let result = run_inspect(&args, world.ignore_errors, &mut world.stdout);
    world.result = Some(result);
}

#[then("the inspection succeeds")]
fn then_inspection_succeeds(world: &mut InspectWorld) {
    if let Some(Err(err)) = &world.result {
        panic!("expected inspection to succeed, got: {err}");
    }
    assert!(world.result.is_some(), "inspection has not run");
}

#[then("the inspection fails mentioning \"{text}\"")]
fn then_inspection_fails(world: &mut InspectWorld, text: String) {
    match world.result.as_ref().expect("inspection has run") {
        Ok(()) => panic!("expected inspection to fail"),
        Err(err) => {
            let message = err.to_string();
            assert!(message.starts_with("cannot extract images: "));
            assert!(message.contains(&text), "unexpected error: {message}");
        }
    }
    assert!(world.stdout.is_empty());
}

#[then("the output is the lines \"{lines}\"")]
fn then_output_lines(world: &mut InspectWorld, lines: String) {
    let expected: String = names_in(&lines)
        .into_iter()
        .map(|line| format!("{line}\n"))
        .collect();
    assert_eq!(String::from_utf8_lossy(&world.stdout), expected);
}

#[then("the JSON file \"{file}\" lists names \"{names}\"")]
fn then_json_file(world: &mut InspectWorld, file: String, names: String) {
    let content = std::fs::read_to_string(world.out_dir.join(file)).expect("read output");
    let parsed: serde_json::Value = serde_json::from_str(&content).expect("valid JSON");
    assert_eq!(parsed, serde_json::json!({ "names": names_in(&names) }));
    assert!(world.stdout.is_empty());
}

#[then("the YAML file \"{file}\" lists names \"{names}\"")]
fn then_yaml_file(world: &mut InspectWorld, file: String, names: String) {
    let content = std::fs::read_to_string(world.out_dir.join(file)).expect("read output");
    let parsed: serde_yaml::Value = serde_yaml::from_str(&content).expect("valid YAML");
    let listed: Vec<String> = parsed
        .get("names")
        .and_then(serde_yaml::Value::as_sequence)
        .expect("names list")
        .iter()
        .filter_map(|name| name.as_str().map(str::to_owned))
        .collect();
    assert_eq!(listed, names_in(&names));
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/inspect_images.feature",
    name = "Images are listed from a folder of chart archives"
)]
fn scenario_archive_folder(world: InspectWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/inspect_images.feature",
    name = "Repeated images are kept"
)]
fn scenario_repeats_kept(world: InspectWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/inspect_images.feature",
    name = "An unreadable archive is skipped when ignoring errors"
)]
fn scenario_corrupt_archive_skipped(world: InspectWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/inspect_images.feature",
    name = "An unreadable archive aborts a strict inspection"
)]
fn scenario_corrupt_archive_strict(world: InspectWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/inspect_images.feature",
    name = "A folder without charts is an error"
)]
fn scenario_no_charts(world: InspectWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/inspect_images.feature",
    name = "Images are written as JSON"
)]
fn scenario_json_output(world: InspectWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/inspect_images.feature",
    name = "Images are written for skopeo"
)]
fn scenario_skopeo_output(world: InspectWorld) {
    let _ = world;
}
