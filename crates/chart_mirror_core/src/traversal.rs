//! Batch traversal of inspection targets.
//!
//! A target is rendered as a single chart when it is a file. A directory is
//! first rendered as a chart itself; only when that fails is it walked for
//! `.tgz` archives, each rendered independently. Images from every
//! successful render are collected into one [`ImageBuffer`] in visit order.

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};

use crate::config::InspectConfig;
use crate::extract::{ImageBuffer, extract_images};
use crate::render::{RenderError, Renderer};
use crate::walk::ArchiveWalk;

/// Errors that abort a traversal.
#[derive(Debug, thiserror::Error)]
pub enum TraversalError {
    /// The target could not be inspected.
    #[error("cannot stat target {path}: {source}")]
    Stat {
        /// The target path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A chart failed to render.
    #[error("cannot process target {path}: {source}")]
    Render {
        /// The chart that failed.
        path: Utf8PathBuf,
        /// Render failure.
        #[source]
        source: RenderError,
    },

    /// The directory is not a chart and no archive below it rendered.
    #[error("cannot process target {path}: {source}")]
    NoCharts {
        /// The directory target.
        path: Utf8PathBuf,
        /// The failure from rendering the directory itself.
        #[source]
        source: RenderError,
    },

    /// The directory tree could not be walked.
    #[error("cannot walk path {path}: {source}")]
    Walk {
        /// The directory target.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// How the target was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// The target is a chart archive or a chart directory.
    SingleChart,
    /// The target is a directory holding chart archives.
    ArchiveWalk,
}

/// The result of rendering one batch member.
#[derive(Debug)]
pub struct TraversalOutcome {
    /// The rendered chart.
    pub path: Utf8PathBuf,
    /// The suppressed failure, under ignore-errors mode.
    pub error: Option<RenderError>,
}

impl TraversalOutcome {
    /// Returns true when the chart rendered.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a successful traversal.
#[derive(Debug)]
pub struct TraversalReport {
    /// How the target was interpreted.
    pub mode: TraversalMode,
    /// One outcome per rendered chart, in visit order.
    pub outcomes: Vec<TraversalOutcome>,
    /// Every extracted image reference.
    pub images: ImageBuffer,
}

impl TraversalReport {
    fn new(mode: TraversalMode) -> Self {
        Self {
            mode,
            outcomes: Vec::new(),
            images: ImageBuffer::new(),
        }
    }

    /// Number of charts that rendered.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    /// Returns true when some failures were suppressed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| !o.succeeded())
    }
}

/// The traversal engine.
pub struct Inspector<'a> {
    config: InspectConfig,
    renderer: &'a dyn Renderer,
}

impl<'a> Inspector<'a> {
    /// Create an engine rendering through `renderer`.
    #[must_use]
    pub fn new(config: InspectConfig, renderer: &'a dyn Renderer) -> Self {
        Self { config, renderer }
    }

    /// Inspect `target`, a chart archive, a chart directory, or a directory
    /// holding chart archives.
    ///
    /// # Errors
    ///
    /// Returns an error when the target cannot be read, a single chart
    /// fails to render, an archive fails under strict mode, the tree cannot
    /// be walked, or no archive below a non-chart directory renders.
    pub fn inspect(&self, target: &Utf8Path) -> Result<TraversalReport, TraversalError> {
        let metadata = std::fs::metadata(target).map_err(|source| TraversalError::Stat {
            path: target.to_owned(),
            source,
        })?;

        let mut report = TraversalReport::new(TraversalMode::SingleChart);
        match self.render(target) {
            Ok(images) => {
                report.images = images;
                report.outcomes.push(TraversalOutcome {
                    path: target.to_owned(),
                    error: None,
                });
                Ok(report)
            }
            Err(source) if !metadata.is_dir() => Err(TraversalError::Render {
                path: target.to_owned(),
                source,
            }),
            Err(whole) => {
                debug!("{target} is not a chart ({whole}), looking for archives");
                self.walk(target, whole)
            }
        }
    }

    fn walk(&self, target: &Utf8Path, whole: RenderError) -> Result<TraversalReport, TraversalError> {
        let mut report = TraversalReport::new(TraversalMode::ArchiveWalk);
        for archive in ArchiveWalk::new(target) {
            let archive = archive.map_err(|source| TraversalError::Walk {
                path: target.to_owned(),
                source,
            })?;
            match self.render(&archive) {
                Ok(images) => {
                    report.images.extend(&images);
                    report.outcomes.push(TraversalOutcome {
                        path: archive,
                        error: None,
                    });
                }
                Err(source) if self.config.policy.ignores_errors() => {
                    warn!("skipping {archive}: {source}");
                    report.outcomes.push(TraversalOutcome {
                        path: archive,
                        error: Some(source),
                    });
                }
                Err(source) => {
                    return Err(TraversalError::Render {
                        path: archive,
                        source,
                    });
                }
            }
        }

        if report.succeeded() == 0 {
            return Err(TraversalError::NoCharts {
                path: target.to_owned(),
                source: whole,
            });
        }
        Ok(report)
    }

    fn render(&self, path: &Utf8Path) -> Result<ImageBuffer, RenderError> {
        let documents = self.renderer.render(path)?;
        let mut images = ImageBuffer::new();
        for document in &documents {
            extract_images(document, &mut images);
        }
        Ok(images)
    }
}
