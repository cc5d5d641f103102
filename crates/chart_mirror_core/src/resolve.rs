//! Archive reference resolution.
//!
//! Repository indexes may list archive URLs relative to the repository root.
//! This module turns such references into absolute URLs before fetching.

use url::Url;

const SEPARATOR: char = '/';

/// An archive or index URL guaranteed to carry a scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference(String);

impl ResolvedReference {
    /// Returns the resolved URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResolvedReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors arising from reference resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The reference is not syntactically a URL, relative or absolute.
    #[error("invalid chart URL {reference:?}: {reason}")]
    InvalidReference {
        /// The rejected reference.
        reference: String,
        /// Parser diagnostic.
        reason: String,
    },
}

/// Resolve `reference` against the repository `base` URL.
///
/// References that already carry a scheme are returned unchanged. Anything
/// else is appended verbatim to `base` after trimming its trailing slashes
/// and adding exactly one.
///
/// # Errors
///
/// Returns [`ResolveError::InvalidReference`] when the reference cannot be
/// parsed as a URL.
///
/// # Examples
///
/// ```
/// use chart_mirror_core::resolve::resolve_reference;
///
/// let url = resolve_reference("chart-1.0.0.tgz", "https://charts.example.com/")
///     .expect("relative reference resolves");
/// assert_eq!(url.as_str(), "https://charts.example.com/chart-1.0.0.tgz");
/// ```
pub fn resolve_reference(reference: &str, base: &str) -> Result<ResolvedReference, ResolveError> {
    match Url::parse(reference) {
        Ok(_) => Ok(ResolvedReference(reference.to_owned())),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            validate_relative(reference)?;
            let mut resolved = base.trim_end_matches(SEPARATOR).to_owned();
            resolved.push(SEPARATOR);
            resolved.push_str(reference);
            Ok(ResolvedReference(resolved))
        }
        Err(err) => Err(invalid(reference, &err)),
    }
}

/// Relative references are checked against a throwaway base so malformed
/// syntax is rejected whether or not a scheme is present.
fn validate_relative(reference: &str) -> Result<(), ResolveError> {
    let placeholder = Url::parse("http://reference.invalid/").map_err(|e| invalid(reference, &e))?;
    placeholder.join(reference).map_err(|e| invalid(reference, &e))?;
    Ok(())
}

fn invalid(reference: &str, err: &url::ParseError) -> ResolveError {
    ResolveError::InvalidReference {
        reference: reference.to_owned(),
        reason: err.to_string(),
    }
}
