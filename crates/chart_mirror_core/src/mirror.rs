//! Mirroring engine.
//!
//! Downloads a repository index, selects chart versions, fetches their
//! archives into the destination folder and publishes the index:
//!
//! 1. fetch `index.yaml` into `downloaded-index.yaml`;
//! 2. search the index and apply the selection criteria;
//! 3. fetch each selected archive as `<name>-<version>.tgz`;
//! 4. rewrite and rename the index (see [`crate::rewrite`]).
//!
//! Steps 1, 2 and 4 are always fatal on failure. Step 3 follows the
//! configured [`ErrorPolicy`] for both fetching and writing.

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};

use crate::ARCHIVE_SUFFIX;
use crate::config::{ErrorPolicy, MirrorConfig};
use crate::fetch::{FetchError, Fetcher};
use crate::index::{IndexError, IndexFile, RepositoryEntry};
use crate::resolve::{ResolveError, resolve_reference};
use crate::rewrite::{DOWNLOADED_INDEX_NAME, FinalizedIndex, INDEX_NAME, RewriteError, finalize_index};
use crate::selection::select;

/// Errors arising from a mirror run.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// The destination folder could not be created.
    #[error("cannot create destination folder {path}: {source}")]
    CreateDestination {
        /// Destination folder.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The repository index could not be fetched.
    #[error("cannot download index file: {0}")]
    IndexFetch(#[source] FetchError),

    /// The fetched index could not be saved.
    #[error("cannot write index file {path}: {source}")]
    IndexWrite {
        /// Working index path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The index could not be parsed or searched.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// An archive reference in the index is malformed.
    #[error(transparent)]
    InvalidReference(#[from] ResolveError),

    /// An archive could not be fetched.
    #[error("cannot download chart {name}({version}): {source}")]
    ArchiveFetch {
        /// Chart name.
        name: String,
        /// Chart version.
        version: String,
        /// Transport failure.
        #[source]
        source: FetchError,
    },

    /// An archive could not be written to the destination folder.
    #[error("cannot write chart {name}({version}) to {path}: {source}")]
    ArchiveWrite {
        /// Chart name.
        name: String,
        /// Chart version.
        version: String,
        /// Archive path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The index could not be rewritten or published.
    #[error(transparent)]
    Finalize(#[from] RewriteError),
}

/// The result of one archive download attempt.
#[derive(Debug)]
pub struct DownloadOutcome {
    /// The entry the archive belongs to.
    pub entry: RepositoryEntry,
    /// Where the archive was (or would have been) written.
    pub archive_path: Utf8PathBuf,
    /// The suppressed failure, under ignore-errors mode.
    pub error: Option<MirrorError>,
}

impl DownloadOutcome {
    /// Returns true when the archive was written.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a completed mirror run.
#[derive(Debug)]
pub struct MirrorReport {
    /// One outcome per attempted archive, in download order.
    pub outcomes: Vec<DownloadOutcome>,
    /// The published index.
    pub index: FinalizedIndex,
}

impl MirrorReport {
    /// Number of archives written.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    /// Outcomes whose failure was suppressed.
    pub fn failures(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }
}

/// File name a mirrored archive is stored under.
///
/// # Examples
///
/// ```
/// use chart_mirror_core::index::RepositoryEntry;
/// use chart_mirror_core::mirror::archive_file_name;
///
/// let entry = RepositoryEntry {
///     name: "nginx".to_owned(),
///     version: "1.2.0".to_owned(),
///     urls: Vec::new(),
/// };
/// assert_eq!(archive_file_name(&entry), "nginx-1.2.0.tgz");
/// ```
#[must_use]
pub fn archive_file_name(entry: &RepositoryEntry) -> String {
    format!("{}-{}{ARCHIVE_SUFFIX}", entry.name, entry.version)
}

/// The mirroring engine.
pub struct Mirror<'a> {
    config: MirrorConfig,
    fetcher: &'a dyn Fetcher,
}

impl<'a> Mirror<'a> {
    /// Create an engine for `config` fetching through `fetcher`.
    #[must_use]
    pub fn new(config: MirrorConfig, fetcher: &'a dyn Fetcher) -> Self {
        Self { config, fetcher }
    }

    /// Run the mirror to completion.
    ///
    /// # Errors
    ///
    /// Returns an error when the destination cannot be created, the index
    /// cannot be fetched, parsed, or published, an archive reference is
    /// malformed, or (under strict mode) any archive fails to download.
    pub fn run(&self) -> Result<MirrorReport, MirrorError> {
        let destination = &self.config.destination;
        create_destination(destination)?;

        let index = self.download_index()?;
        let criteria = &self.config.criteria;
        let entries = index.search(criteria.name_pattern(), criteria.groups_all_versions())?;
        let selected = select(entries, criteria);
        info!("{} chart version(s) selected for mirroring", selected.len());

        let mut outcomes = Vec::new();
        for entry in &selected {
            for reference in &entry.urls {
                outcomes.push(self.mirror_archive(entry, reference)?);
            }
        }

        let index = finalize_index(
            destination,
            &self.config.repo_url,
            self.config.new_root_url.as_deref(),
            self.config.policy,
        )?;
        Ok(MirrorReport { outcomes, index })
    }

    fn download_index(&self) -> Result<IndexFile, MirrorError> {
        let url = resolve_reference(INDEX_NAME, &self.config.repo_url)?;
        debug!("fetching index {url}");
        let bytes = self
            .fetcher
            .fetch(url.as_str())
            .map_err(MirrorError::IndexFetch)?;

        let path = self.config.destination.join(DOWNLOADED_INDEX_NAME);
        write_private_file(&path, &bytes)
            .map_err(|source| MirrorError::IndexWrite { path, source })?;

        Ok(IndexFile::from_slice(&bytes)?)
    }

    fn mirror_archive(
        &self,
        entry: &RepositoryEntry,
        reference: &str,
    ) -> Result<DownloadOutcome, MirrorError> {
        let url = resolve_reference(reference, &self.config.repo_url)?;
        let archive_path = self.config.destination.join(archive_file_name(entry));
        debug!("fetching chart {}({}) from {url}", entry.name, entry.version);

        let result = self
            .fetcher
            .fetch(url.as_str())
            .map_err(|source| MirrorError::ArchiveFetch {
                name: entry.name.clone(),
                version: entry.version.clone(),
                source,
            })
            .and_then(|bytes| {
                write_private_file(&archive_path, &bytes).map_err(|source| {
                    MirrorError::ArchiveWrite {
                        name: entry.name.clone(),
                        version: entry.version.clone(),
                        path: archive_path.clone(),
                        source,
                    }
                })
            });

        match result {
            Ok(()) => Ok(DownloadOutcome {
                entry: entry.clone(),
                archive_path,
                error: None,
            }),
            Err(err) if self.config.policy == ErrorPolicy::IgnoreErrors => {
                warn!("processing chart {}({}) - {err}", entry.name, entry.version);
                Ok(DownloadOutcome {
                    entry: entry.clone(),
                    archive_path,
                    error: Some(err),
                })
            }
            Err(err) => Err(err),
        }
    }
}

fn create_destination(path: &Utf8Path) -> Result<(), MirrorError> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o744);
    }
    builder
        .create(path)
        .map_err(|source| MirrorError::CreateDestination {
            path: path.to_owned(),
            source,
        })
}

/// Write `content` to `path`, readable by the owner only on Unix.
///
/// # Errors
///
/// Returns the I/O error from opening or writing the file.
pub fn write_private_file(path: &Utf8Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(content)
}
