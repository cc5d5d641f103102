//! Repository index parsing and search.
//!
//! A chart repository publishes an `index.yaml` listing every version of
//! every chart it serves:
//!
//! ```text
//! apiVersion: v1
//! entries:
//!   nginx:
//!   - name: nginx
//!     version: 1.2.0
//!     urls:
//!     - https://charts.example.com/nginx-1.2.0.tgz
//! ```
//!
//! Only `name`, `version` and `urls` are read; every other field is ignored.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use log::trace;
use regex::Regex;
use serde::{Deserialize, Deserializer};

/// One published version of one chart.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryEntry {
    /// Chart name.
    #[serde(deserialize_with = "scalar_string")]
    pub name: String,
    /// Chart version.
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    /// Archive references, possibly relative to the repository root.
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Errors raised while loading or searching an index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The index document is not valid YAML or lacks required fields.
    #[error("cannot load index file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The chart name fragment is not a valid regular expression.
    #[error("cannot search index file with pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The rejected fragment.
        pattern: String,
        /// Regex compiler diagnostic.
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RawIndex {
    #[serde(default)]
    entries: BTreeMap<String, Vec<RepositoryEntry>>,
}

/// A parsed repository index with each chart's versions sorted newest first.
#[derive(Debug, Clone, Default)]
pub struct IndexFile {
    entries: BTreeMap<String, Vec<RepositoryEntry>>,
}

impl IndexFile {
    /// Parse an index from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Parse`] when the document cannot be decoded.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IndexError> {
        let raw: RawIndex = serde_yaml::from_slice(bytes)?;
        let entries = raw
            .entries
            .into_iter()
            .map(|(name, mut versions)| {
                versions.sort_by(|a, b| compare_versions(&b.version, &a.version));
                (name, versions)
            })
            .collect();
        Ok(Self { entries })
    }

    /// Number of distinct charts in the index.
    #[must_use]
    pub fn chart_count(&self) -> usize {
        self.entries.len()
    }

    /// Search the index for charts whose name contains `fragment`.
    ///
    /// The fragment is compiled as the regular expression
    /// `^.*<fragment>.*`, so an empty fragment matches every chart. Unless
    /// `all_versions` is set, only the newest version of each chart is
    /// returned. Results are ordered by chart name, then version descending.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidPattern`] when the fragment does not
    /// compile.
    ///
    /// # Examples
    ///
    /// ```
    /// use chart_mirror_core::index::IndexFile;
    ///
    /// let yaml = b"entries:\n  web:\n  - {name: web, version: 1.0.0}\n  - {name: web, version: 2.0.0}\n";
    /// let index = IndexFile::from_slice(yaml).expect("valid index");
    /// let latest = index.search("we", false).expect("valid pattern");
    /// assert_eq!(latest.len(), 1);
    /// assert_eq!(latest[0].version, "2.0.0");
    /// ```
    pub fn search(&self, fragment: &str, all_versions: bool) -> Result<Vec<RepositoryEntry>, IndexError> {
        let pattern = format!("^.*{fragment}.*");
        let matcher = Regex::new(&pattern).map_err(|source| IndexError::InvalidPattern {
            pattern: fragment.to_owned(),
            source,
        })?;

        let mut results = Vec::new();
        for (name, versions) in &self.entries {
            if !matcher.is_match(name) {
                trace!("index search: {name} does not match {pattern}");
                continue;
            }
            if all_versions {
                results.extend(versions.iter().cloned());
            } else if let Some(latest) = versions.first() {
                results.push(latest.clone());
            }
        }
        Ok(results)
    }
}

/// Accept any YAML scalar; unquoted versions such as `1.10` parse as
/// numbers.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(text) => Ok(text),
        serde_yaml::Value::Number(number) => Ok(number.to_string()),
        serde_yaml::Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a scalar, found {other:?}"
        ))),
    }
}

/// Order two version strings by semantic version.
///
/// Versions that do not parse sort below every valid one and compare
/// lexically among themselves.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| semver::Version::parse(v.trim_start_matches('v')).ok();
    match (parse(a), parse(b)) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}
