//! Chart version selection.
//!
//! The index search has already applied the name fragment and the
//! latest-version grouping by the time entries reach [`select`]; this module
//! only enforces exact name and version matches.

use crate::index::RepositoryEntry;

/// Which chart versions a mirror run should download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionCriteria {
    name_pattern: String,
    exact_name: Option<String>,
    exact_version: Option<String>,
    all_versions: bool,
}

/// Errors raised when building selection criteria.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// A chart version was requested without naming the chart.
    #[error("chart version {version} depends on a chart name, please specify one")]
    VersionWithoutName {
        /// The orphaned version.
        version: String,
    },
}

impl SelectionCriteria {
    /// Build criteria from the user's flags.
    ///
    /// The name doubles as the search fragment; with no name every chart in
    /// the index matches.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::VersionWithoutName`] when `exact_version` is
    /// set and `exact_name` is not.
    ///
    /// # Examples
    ///
    /// ```
    /// use chart_mirror_core::selection::SelectionCriteria;
    ///
    /// let criteria = SelectionCriteria::new(Some("nginx".to_owned()), None, false)
    ///     .expect("name without version is valid");
    /// assert_eq!(criteria.name_pattern(), "nginx");
    /// assert!(!criteria.groups_all_versions());
    ///
    /// assert!(SelectionCriteria::new(None, Some("1.0.0".to_owned()), false).is_err());
    /// ```
    pub fn new(
        exact_name: Option<String>,
        exact_version: Option<String>,
        all_versions: bool,
    ) -> Result<Self, SelectionError> {
        let exact_name = exact_name.filter(|name| !name.is_empty());
        let exact_version = exact_version.filter(|version| !version.is_empty());
        if let (None, Some(version)) = (&exact_name, &exact_version) {
            return Err(SelectionError::VersionWithoutName {
                version: version.clone(),
            });
        }
        Ok(Self {
            name_pattern: exact_name.clone().unwrap_or_default(),
            exact_name,
            exact_version,
            all_versions,
        })
    }

    /// Fragment handed to the index search.
    #[must_use]
    pub fn name_pattern(&self) -> &str {
        &self.name_pattern
    }

    /// Exact chart name, when requested.
    #[must_use]
    pub fn exact_name(&self) -> Option<&str> {
        self.exact_name.as_deref()
    }

    /// Exact chart version, when requested.
    #[must_use]
    pub fn exact_version(&self) -> Option<&str> {
        self.exact_version.as_deref()
    }

    /// Whether the index search should yield every version of each chart
    /// rather than only the newest.
    ///
    /// An exact version request implies all versions, otherwise an older
    /// pinned version would never reach the filter.
    #[must_use]
    pub const fn groups_all_versions(&self) -> bool {
        self.all_versions || self.exact_version.is_some()
    }

    /// Returns true when `entry` satisfies the exact name and version
    /// constraints.
    #[must_use]
    pub fn matches(&self, entry: &RepositoryEntry) -> bool {
        let name_ok = self.exact_name().is_none_or(|name| entry.name == name);
        let version_ok = self
            .exact_version()
            .is_none_or(|version| entry.version == version);
        name_ok && version_ok
    }
}

/// Keep the entries matching `criteria`, preserving their order.
///
/// An empty result is not an error; a run may legitimately mirror nothing.
#[must_use]
pub fn select(entries: Vec<RepositoryEntry>, criteria: &SelectionCriteria) -> Vec<RepositoryEntry> {
    entries
        .into_iter()
        .filter(|entry| criteria.matches(entry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn entry(name: &str, version: &str) -> RepositoryEntry {
        RepositoryEntry {
            name: name.to_owned(),
            version: version.to_owned(),
            urls: vec![format!("{name}-{version}.tgz")],
        }
    }

    fn catalogue(versions_per_chart: usize) -> Vec<RepositoryEntry> {
        let mut entries = Vec::new();
        for name in ["nginx", "nginx-ingress", "redis"] {
            for minor in 0..versions_per_chart {
                entries.push(entry(name, &format!("1.{minor}.0")));
            }
        }
        entries
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(7)]
    fn exact_name_only_selects_that_chart(#[case] versions: usize) {
        let criteria = SelectionCriteria::new(Some("nginx".to_owned()), None, true).expect("valid");
        let selected = select(catalogue(versions), &criteria);
        assert_eq!(selected.len(), versions);
        assert!(selected.iter().all(|e| e.name == "nginx"));
    }

    #[test]
    fn exact_version_narrows_to_one_entry() {
        let criteria =
            SelectionCriteria::new(Some("redis".to_owned()), Some("1.1.0".to_owned()), false)
                .expect("valid");
        let selected = select(catalogue(3), &criteria);
        assert_eq!(selected, vec![entry("redis", "1.1.0")]);
    }

    #[test]
    fn no_criteria_passes_everything_through_in_order() {
        let criteria = SelectionCriteria::default();
        let entries = catalogue(2);
        assert_eq!(select(entries.clone(), &criteria), entries);
    }

    #[test]
    fn unmatched_version_yields_empty_selection() {
        let criteria =
            SelectionCriteria::new(Some("redis".to_owned()), Some("9.9.9".to_owned()), false)
                .expect("valid");
        assert!(select(catalogue(3), &criteria).is_empty());
    }

    #[test]
    fn version_without_name_is_rejected() {
        let err = SelectionCriteria::new(None, Some("1.0.0".to_owned()), false)
            .expect_err("version needs a name");
        assert_eq!(
            err,
            SelectionError::VersionWithoutName {
                version: "1.0.0".to_owned()
            }
        );
    }

    #[rstest]
    #[case::neither(false, None, false)]
    #[case::all_versions_flag(true, None, true)]
    #[case::exact_version(false, Some("1.0.0"), true)]
    fn grouping_follows_flags(
        #[case] all_versions: bool,
        #[case] version: Option<&str>,
        #[case] expected: bool,
    ) {
        let criteria = SelectionCriteria::new(
            Some("nginx".to_owned()),
            version.map(str::to_owned),
            all_versions,
        )
        .expect("valid");
        assert_eq!(criteria.groups_all_versions(), expected);
    }
}
