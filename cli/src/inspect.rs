//! Inspect-images command implementation.

use std::io::Write;

use chart_mirror_core::render::{ChartRenderer, Renderer};
use chart_mirror_core::traversal::Inspector;
use log::info;

use crate::cli::InspectArgs;
use crate::error::Result;
use crate::output::OutputTarget;
use crate::validation::inspect_config;

/// Extracts the images used by the charts at the target and writes them to
/// the selected output.
///
/// Charts are rendered in lint mode when errors are ignored, so a missing
/// `required` value does not abort the chart.
///
/// # Errors
///
/// Returns an error if:
/// - The arguments or output option fail validation
/// - The traversal aborts
/// - The image list cannot be encoded or written
pub fn run_inspect(args: &InspectArgs, ignore_errors: bool, stdout: &mut dyn Write) -> Result<()> {
    let renderer = ChartRenderer::new(ignore_errors);
    run_inspect_with(args, ignore_errors, &renderer, stdout)
}

/// [`run_inspect`] with an injectable renderer.
///
/// # Errors
///
/// See [`run_inspect`].
pub fn run_inspect_with(
    args: &InspectArgs,
    ignore_errors: bool,
    renderer: &dyn Renderer,
    stdout: &mut dyn Write,
) -> Result<()> {
    let (target, config) = inspect_config(args, ignore_errors)?;
    let output = OutputTarget::from_option(&args.output)?;

    let report = Inspector::new(config, renderer).inspect(&target)?;
    info!(
        "extracted {} image reference(s) from {} chart(s)",
        report.images.names().len(),
        report.succeeded()
    );

    output.emit(&report.images, stdout)
}
