//! Mirror command implementation.
//!
//! Validates the default command's arguments, builds the HTTP client from
//! the repository credentials and runs the mirror engine.

use chart_mirror_core::config::MirrorConfig;
use chart_mirror_core::fetch::{Fetcher, HttpFetcher};
use chart_mirror_core::mirror::{Mirror, MirrorReport};
use log::info;

use crate::cli::MirrorArgs;
use crate::error::Result;
use crate::validation::mirror_config;

/// Mirrors the repository named by `args` into its destination folder.
///
/// # Errors
///
/// Returns an error if:
/// - The arguments fail validation
/// - The TLS material cannot be loaded
/// - The mirror engine aborts
pub fn run_mirror(args: &MirrorArgs, ignore_errors: bool) -> Result<MirrorReport> {
    let config = mirror_config(args, ignore_errors)?;
    let fetcher = HttpFetcher::new(&config.auth)?;
    run_mirror_with(config, &fetcher)
}

/// Runs the mirror engine over an already validated configuration.
///
/// # Errors
///
/// Returns the engine's error wrapped as [`crate::error::CliError::Mirror`].
pub fn run_mirror_with(config: MirrorConfig, fetcher: &dyn Fetcher) -> Result<MirrorReport> {
    let destination = config.destination.clone();
    let report = Mirror::new(config, fetcher).run()?;

    let failed = report.failures().count();
    info!(
        "mirrored {} chart archive(s) to {destination}, {failed} skipped",
        report.downloaded()
    );
    if report.index.replacements > 0 {
        info!(
            "rewrote {} repository URL occurrence(s) in {}",
            report.index.replacements, report.index.path
        );
    }
    Ok(report)
}
