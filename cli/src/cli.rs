//! CLI argument definitions for chart-mirror.
//!
//! This module defines the command-line interface using clap. Validation of
//! the parsed values lives in [`crate::validation`] so that parsing never
//! touches the filesystem or the network.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use crate::output::DEFAULT_OUTPUT;

/// Mirror Helm charts from a repository index into a local folder.
#[derive(Parser, Debug)]
#[command(name = "chart-mirror")]
#[command(version, about)]
#[command(long_about = concat!(
    "Mirror Helm charts from a repository index into a local folder.\n\n",
    "The index file of REPO_URL is downloaded together with the latest version ",
    "of every chart it lists. Use --all-versions to download every published ",
    "version, or --chart-name and --chart-version to narrow the selection.\n\n",
    "When --new-root-url is given, every occurrence of REPO_URL in the mirrored ",
    "index is replaced so the folder can be served from a new location.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Mirror the latest version of every chart:\n",
    "    $ chart-mirror https://charts.example.com/ /srv/charts\n\n",
    "  Mirror every version of one chart and serve it from a new host:\n",
    "    $ chart-mirror -a --chart-name nginx \\\n",
    "        --new-root-url https://mirror.local.lan/charts \\\n",
    "        https://charts.example.com/ /srv/charts\n\n",
    "  List the images used by the mirrored charts:\n",
    "    $ chart-mirror inspect-images /srv/charts -o json=/srv/images.json",
))]
pub struct Cli {
    /// Verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Ignore errors while downloading or processing charts.
    #[arg(short, long, global = true)]
    pub ignore_errors: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Mirror arguments (used when no subcommand is given).
    #[command(flatten)]
    pub mirror: MirrorArgs,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Extract all the container images listed in each chart.
    InspectImages(InspectArgs),

    /// Show the version of chart-mirror.
    Version,
}

/// Arguments for the mirror command.
#[derive(Parser, Debug, Clone, Default)]
pub struct MirrorArgs {
    /// URL of the chart repository holding `index.yaml`.
    #[arg(value_name = "REPO_URL")]
    pub repo_url: Option<String>,

    /// Absolute path of the destination folder.
    #[arg(value_name = "DESTINATION")]
    pub destination: Option<Utf8PathBuf>,

    /// Name of the chart that gets mirrored.
    #[arg(long, value_name = "NAME")]
    pub chart_name: Option<String>,

    /// Specific version of the chart that is going to be mirrored.
    #[arg(long, value_name = "VERSION")]
    pub chart_version: Option<String>,

    /// Get all the versions of the charts in the chart repository.
    #[arg(short, long)]
    pub all_versions: bool,

    /// New root URL of the chart repository (eg: `https://mirror.local.lan/charts`).
    #[arg(long, value_name = "URL")]
    pub new_root_url: Option<String>,

    /// Chart repository username.
    #[arg(long)]
    pub username: Option<String>,

    /// Chart repository password.
    #[arg(long)]
    pub password: Option<String>,

    /// Verify certificates of HTTPS-enabled servers using this CA bundle.
    #[arg(long, value_name = "FILE")]
    pub ca_file: Option<Utf8PathBuf>,

    /// Identify HTTPS client using this SSL certificate file.
    #[arg(long, value_name = "FILE")]
    pub cert_file: Option<Utf8PathBuf>,

    /// Identify HTTPS client using this SSL key file.
    #[arg(long, value_name = "FILE")]
    pub key_file: Option<Utf8PathBuf>,
}

/// Arguments for the inspect-images command.
#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    /// Absolute path of a chart folder, a chart archive, or a folder of
    /// chart archives.
    #[arg(value_name = "FOLDER|TGZFILE")]
    pub target: Option<Utf8PathBuf>,

    /// Output for the list of images: `stdout`, `file`, `json`, `yaml` or
    /// `skopeo`, optionally followed by `=FILENAME` (default `images.out`).
    #[arg(short, long, value_name = "KIND[=FILENAME]", default_value = DEFAULT_OUTPUT)]
    pub output: String,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
