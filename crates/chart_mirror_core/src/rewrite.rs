//! Index finalization.
//!
//! The mirrored index is first written under a working name. Finalization
//! optionally rewrites the repository root inside it, then moves it to the
//! canonical `index.yaml` name.

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};

use crate::config::ErrorPolicy;
use crate::mirror::write_private_file;

/// Working name of the freshly downloaded index.
pub const DOWNLOADED_INDEX_NAME: &str = "downloaded-index.yaml";

/// Canonical name of the published index.
pub const INDEX_NAME: &str = "index.yaml";

/// Sibling of the working index that receives the rewritten content.
const REWRITTEN_INDEX_NAME: &str = "downloaded-index.yaml.tmp";

/// Errors arising from index finalization.
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    /// The downloaded index could not be read back for rewriting.
    #[error("cannot read index file {path}: {source}")]
    Read {
        /// Path of the working index.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The rewritten index could not be persisted.
    #[error("cannot write index file {path}: {source}")]
    Write {
        /// Path of the working index.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The working index could not be moved to its canonical name.
    #[error("cannot rename index file {from} to {to}: {source}")]
    IndexFinalization {
        /// Working index path.
        from: Utf8PathBuf,
        /// Canonical index path.
        to: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// What [`finalize_index`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedIndex {
    /// Path of the published index.
    pub path: Utf8PathBuf,
    /// Number of root URL occurrences replaced.
    pub replacements: usize,
}

/// Replace every occurrence of `from` in `content` with `to`.
///
/// The match is a literal byte comparison; an empty `from` leaves the content
/// untouched.
///
/// # Examples
///
/// ```
/// use chart_mirror_core::rewrite::replace_all;
///
/// let (rewritten, count) = replace_all(b"a/x a/y", b"a/", b"b/");
/// assert_eq!(rewritten, b"b/x b/y");
/// assert_eq!(count, 2);
/// ```
#[must_use]
pub fn replace_all(content: &[u8], from: &[u8], to: &[u8]) -> (Vec<u8>, usize) {
    if from.is_empty() {
        return (content.to_vec(), 0);
    }
    let mut output = Vec::with_capacity(content.len());
    let mut count = 0;
    let mut rest = content;
    while let Some(position) = find(rest, from) {
        let (head, tail) = rest.split_at(position);
        output.extend_from_slice(head);
        output.extend_from_slice(to);
        rest = tail.get(from.len()..).unwrap_or_default();
        count += 1;
    }
    output.extend_from_slice(rest);
    (output, count)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Rewrite and publish the downloaded index in `folder`.
///
/// When `new_root_url` is set, every literal occurrence of `repo_url` in the
/// working index is replaced and the result written to a sibling file that
/// is then renamed over the working index. A failure to write
/// the rewritten index follows `policy`: strict mode surfaces it, ignore-errors
/// mode logs it and publishes the unrewritten index. The rename to
/// [`INDEX_NAME`] always happens and its failure is always fatal.
///
/// # Errors
///
/// Returns [`RewriteError::Read`] when the working index cannot be read,
/// [`RewriteError::Write`] under strict mode when it cannot be rewritten, and
/// [`RewriteError::IndexFinalization`] when the rename fails.
pub fn finalize_index(
    folder: &Utf8Path,
    repo_url: &str,
    new_root_url: Option<&str>,
    policy: ErrorPolicy,
) -> Result<FinalizedIndex, RewriteError> {
    let working = folder.join(DOWNLOADED_INDEX_NAME);
    let published = folder.join(INDEX_NAME);

    let mut replacements = 0;
    if let Some(new_root) = new_root_url.filter(|root| !root.is_empty()) {
        replacements = rewrite_root(&working, repo_url, new_root, policy)?;
    }

    std::fs::rename(&working, &published).map_err(|source| RewriteError::IndexFinalization {
        from: working.clone(),
        to: published.clone(),
        source,
    })?;
    debug!("published index at {published}");

    Ok(FinalizedIndex {
        path: published,
        replacements,
    })
}

fn rewrite_root(
    working: &Utf8Path,
    repo_url: &str,
    new_root: &str,
    policy: ErrorPolicy,
) -> Result<usize, RewriteError> {
    let content = std::fs::read(working).map_err(|source| RewriteError::Read {
        path: working.to_owned(),
        source,
    })?;
    let (rewritten, count) = replace_all(&content, repo_url.as_bytes(), new_root.as_bytes());
    match replace_file(working, &rewritten) {
        Ok(()) => {
            debug!("replaced {count} occurrence(s) of {repo_url} with {new_root}");
            Ok(count)
        }
        Err(source) if policy.ignores_errors() => {
            warn!("cannot write rewritten index {working}: {source}");
            Ok(0)
        }
        Err(source) => Err(RewriteError::Write {
            path: working.to_owned(),
            source,
        }),
    }
}

/// Write `content` next to `path` and rename it over `path`, so `path`
/// holds either its old bytes or all of the new ones.
fn replace_file(path: &Utf8Path, content: &[u8]) -> std::io::Result<()> {
    let staged = path.with_file_name(REWRITTEN_INDEX_NAME);
    let result = write_private_file(&staged, content).and_then(|()| std::fs::rename(&staged, path));
    if result.is_err() {
        std::fs::remove_file(&staged).unwrap_or_else(|err| debug!("cannot remove {staged}: {err}"));
    }
    result
}
