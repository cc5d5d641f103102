//! Error types for the chart-mirror CLI.
//!
//! Every failure that reaches `main` is one of these variants and is printed
//! as a single line on stderr.

use camino::Utf8PathBuf;
use chart_mirror_core::fetch::FetchError;
use chart_mirror_core::mirror::MirrorError;
use chart_mirror_core::selection::SelectionError;
use chart_mirror_core::traversal::TraversalError;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Fewer positional arguments than the command needs.
    #[error("requires at least {expected} arg(s) to execute")]
    MissingArguments {
        /// Number of positional arguments the command takes.
        expected: usize,
    },

    /// A URL argument could not be parsed.
    #[error("{url:?} is not a valid URL for {role}: {source}")]
    InvalidUrl {
        /// What the URL is used for.
        role: &'static str,
        /// The rejected value.
        url: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },

    /// A URL argument uses a scheme other than http or https.
    #[error("not a valid URL protocol for {role}: `{scheme}`")]
    UnsupportedScheme {
        /// What the URL is used for.
        role: &'static str,
        /// The rejected scheme.
        scheme: String,
    },

    /// A path argument is relative.
    #[error("please provide a full path for {role}: `{path}`")]
    RelativePath {
        /// What the path is used for.
        role: &'static str,
        /// The rejected path.
        path: Utf8PathBuf,
    },

    /// Only one half of the client certificate and key pair was given.
    #[error("--{given} requires --{missing}")]
    IncompleteClientIdentity {
        /// The flag that was supplied.
        given: &'static str,
        /// The flag it must be paired with.
        missing: &'static str,
    },

    /// The chart selection flags are inconsistent.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// The output option names an unknown sink.
    #[error("unknown output kind `{kind}`; expected one of stdout, file, json, yaml, skopeo")]
    UnknownOutputKind {
        /// The rejected kind.
        kind: String,
    },

    /// The working directory could not be determined.
    #[error("cannot get working directory: {reason}")]
    WorkingDirectory {
        /// Description of the failure.
        reason: String,
    },

    /// The HTTP client could not be configured.
    #[error("cannot configure chart repository client: {0}")]
    Client(#[from] FetchError),

    /// Mirroring failed.
    #[error("cannot download index and charts to the specified directory: {0}")]
    Mirror(#[from] MirrorError),

    /// Image extraction failed.
    #[error("cannot extract images: {0}")]
    Inspect(#[from] TraversalError),

    /// The image list could not be serialized.
    #[error("cannot encode {format}: {reason}")]
    Encode {
        /// Target format name.
        format: &'static str,
        /// Description of the encoder error.
        reason: String,
    },

    /// The output file could not be written.
    #[error("cannot write to file {path}: {source}")]
    WriteFile {
        /// Output file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write to stdout.
    #[error("cannot write to stdout: {source}")]
    WriteFailed {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::arguments(
        CliError::MissingArguments { expected: 2 },
        "requires at least 2 arg(s) to execute"
    )]
    #[case::scheme(
        CliError::UnsupportedScheme { role: "index file", scheme: "ftp".to_owned() },
        "not a valid URL protocol for index file: `ftp`"
    )]
    #[case::relative(
        CliError::RelativePath { role: "destination folder", path: Utf8PathBuf::from("charts") },
        "please provide a full path for destination folder: `charts`"
    )]
    #[case::client_identity(
        CliError::IncompleteClientIdentity { given: "cert-file", missing: "key-file" },
        "--cert-file requires --key-file"
    )]
    #[case::output(
        CliError::UnknownOutputKind { kind: "xml".to_owned() },
        "unknown output kind `xml`; expected one of stdout, file, json, yaml, skopeo"
    )]
    fn messages_are_single_lines(#[case] err: CliError, #[case] expected: &str) {
        let message = err.to_string();
        assert_eq!(message, expected);
        assert!(!message.contains('\n'));
    }

    #[test]
    fn selection_error_is_transparent() {
        let err = CliError::from(SelectionError::VersionWithoutName {
            version: "1.0.0".to_owned(),
        });
        assert_eq!(
            err.to_string(),
            "chart version 1.0.0 depends on a chart name, please specify one"
        );
    }
}
