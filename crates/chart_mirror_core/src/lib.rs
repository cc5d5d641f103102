//! Chart repository mirroring and container image extraction.
//!
//! This crate holds the two engines behind the `chart-mirror` CLI. The
//! mirroring engine downloads a repository index, selects chart versions,
//! fetches their archives and finalizes the index for a new serving root.
//! The inspection engine renders charts and collects the container images
//! their manifests reference.
//!
//! # Modules
//!
//! - [`chart`] - Chart loading from directories and `.tgz` archives
//! - [`config`] - Immutable engine configuration and the error policy switch
//! - [`extract`] - Image line detection, sanitization and the output buffer
//! - [`fetch`] - Fetcher trait and the `ureq` HTTP implementation
//! - [`index`] - Repository index parsing and search
//! - [`mirror`] - Mirroring engine
//! - [`render`] - Renderer trait and the chart renderer
//! - [`resolve`] - Archive reference resolution against a repository URL
//! - [`rewrite`] - Index root rewriting and finalization
//! - [`selection`] - Name and version selection criteria
//! - [`template`] - Template parsing and evaluation
//! - [`traversal`] - Batch traversal of inspection targets
//! - [`values`] - Value tree used as the rendering context
//! - [`walk`] - Lazy recursive archive discovery

pub mod chart;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod index;
pub mod mirror;
pub mod render;
pub mod resolve;
pub mod rewrite;
pub mod selection;
pub mod template;
pub mod traversal;
pub mod values;
pub mod walk;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// File suffix shared by mirrored archives and inspection candidates.
pub const ARCHIVE_SUFFIX: &str = ".tgz";
