//! Engine configuration.
//!
//! Command-line flags are collected once into these immutable structures and
//! handed to the engine constructors. Nothing in the engines reads
//! process-wide state.

use camino::Utf8PathBuf;

use crate::fetch::RepositoryAuth;
use crate::selection::SelectionCriteria;

/// How per-item failures in bulk operations are treated.
///
/// This is the single switch consulted by the mirror downloader (fetch and
/// write stages), the index rewrite, and the batch traversal walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// The first per-item failure aborts the whole operation.
    #[default]
    Strict,
    /// Per-item failures are logged, recorded, and skipped.
    IgnoreErrors,
}

impl ErrorPolicy {
    /// Build the policy from the `--ignore-errors` flag.
    #[must_use]
    pub const fn from_ignore_errors(ignore_errors: bool) -> Self {
        if ignore_errors {
            Self::IgnoreErrors
        } else {
            Self::Strict
        }
    }

    /// Returns true when per-item failures should be skipped.
    #[must_use]
    pub const fn ignores_errors(self) -> bool {
        matches!(self, Self::IgnoreErrors)
    }
}

/// Configuration for one mirror run.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Repository root URL as given by the user.
    pub repo_url: String,
    /// Absolute destination folder for archives and the index.
    pub destination: Utf8PathBuf,
    /// Which chart versions to mirror.
    pub criteria: SelectionCriteria,
    /// Replacement for `repo_url` inside the persisted index.
    pub new_root_url: Option<String>,
    /// Credentials and TLS material for the fetcher.
    pub auth: RepositoryAuth,
    /// Per-archive failure handling.
    pub policy: ErrorPolicy,
}

/// Configuration for one image inspection run.
#[derive(Debug, Clone, Copy, Default)]
pub struct InspectConfig {
    /// Per-archive failure handling during directory walks.
    pub policy: ErrorPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(true, ErrorPolicy::IgnoreErrors)]
    #[case(false, ErrorPolicy::Strict)]
    fn policy_follows_flag(#[case] flag: bool, #[case] expected: ErrorPolicy) {
        let policy = ErrorPolicy::from_ignore_errors(flag);
        assert_eq!(policy, expected);
        assert_eq!(policy.ignores_errors(), flag);
    }
}
