//! Chart loading.
//!
//! A chart is either an unpacked directory or a gzip-compressed tarball whose
//! entries all live below one top-level directory. Only the pieces rendering
//! needs are loaded: `Chart.yaml`, `values.yaml` and everything below
//! `templates/`. Subcharts under `charts/` are not read.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use log::trace;
use serde::Deserialize;

use crate::values::Value;

const METADATA_FILE: &str = "Chart.yaml";
const VALUES_FILE: &str = "values.yaml";
const TEMPLATES_DIR: &str = "templates";

/// Errors raised while loading a chart.
#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    /// A file or directory could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The path being read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The archive is not a readable gzip tarball.
    #[error("cannot unpack chart archive {path}: {source}")]
    Archive {
        /// The archive.
        path: Utf8PathBuf,
        /// Underlying decoding error.
        #[source]
        source: std::io::Error,
    },

    /// An archive entry attempts to escape the chart directory.
    #[error("path traversal detected in {archive}: {entry}")]
    PathTraversal {
        /// The archive.
        archive: Utf8PathBuf,
        /// The offending entry path.
        entry: String,
    },

    /// No `Chart.yaml` was found.
    #[error("no Chart.yaml found in {path}")]
    MissingMetadata {
        /// The directory or archive that was loaded.
        path: Utf8PathBuf,
    },

    /// `Chart.yaml` or `values.yaml` is not valid YAML.
    #[error("cannot parse {file} in {path}: {source}")]
    Yaml {
        /// The chart being loaded.
        path: Utf8PathBuf,
        /// File name within the chart.
        file: String,
        /// Parser diagnostic.
        #[source]
        source: serde_yaml::Error,
    },

    /// `Chart.yaml` lacks a chart name.
    #[error("chart metadata in {path} has no name")]
    MissingName {
        /// The chart being loaded.
        path: Utf8PathBuf,
    },

    /// A template is not valid UTF-8.
    #[error("template {template} in {path} is not valid UTF-8")]
    InvalidUtf8 {
        /// The chart being loaded.
        path: Utf8PathBuf,
        /// Template name.
        template: String,
    },
}

/// The subset of `Chart.yaml` used for rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChartMetadata {
    /// Chart name.
    #[serde(default)]
    pub name: String,
    /// Chart version.
    #[serde(default, deserialize_with = "optional_scalar")]
    pub version: String,
    /// Version of the packaged application.
    #[serde(default, rename = "appVersion", deserialize_with = "optional_scalar")]
    pub app_version: String,
}

/// One template source, named by its path inside the chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    /// Path relative to the chart root, e.g. `templates/deployment.yaml`.
    pub name: String,
    /// Template text.
    pub text: String,
}

impl TemplateSource {
    /// Returns true for templates that produce a manifest.
    ///
    /// Partials (file names starting with `_`) and `NOTES.txt` do not.
    #[must_use]
    pub fn is_manifest(&self) -> bool {
        let file_name = self.name.rsplit('/').next().unwrap_or_default();
        !file_name.starts_with('_') && file_name != "NOTES.txt"
    }

    /// Returns true for partials, whose file names start with `_`. They
    /// hold named templates and render no manifest of their own.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.name
            .rsplit('/')
            .next()
            .is_some_and(|file_name| file_name.starts_with('_'))
    }
}

/// A loaded chart.
#[derive(Debug, Clone)]
pub struct Chart {
    /// Parsed `Chart.yaml`.
    pub metadata: ChartMetadata,
    /// Default values from `values.yaml`, or an empty map.
    pub values: Value,
    /// Templates sorted by name.
    pub templates: Vec<TemplateSource>,
}

impl Chart {
    /// Load a chart from a directory or a `.tgz` archive.
    ///
    /// # Errors
    ///
    /// Returns a [`ChartError`] when the path cannot be read, is not a chart,
    /// or contains malformed metadata, values, or templates.
    pub fn load(path: &Utf8Path) -> Result<Self, ChartError> {
        let metadata = std::fs::metadata(path).map_err(|source| ChartError::Io {
            path: path.to_owned(),
            source,
        })?;
        let files = if metadata.is_dir() {
            read_directory(path)?
        } else {
            read_archive(path)?
        };
        Self::from_files(path, files)
    }

    fn from_files(origin: &Utf8Path, mut files: BTreeMap<String, Vec<u8>>) -> Result<Self, ChartError> {
        let raw_metadata = files
            .remove(METADATA_FILE)
            .ok_or_else(|| ChartError::MissingMetadata {
                path: origin.to_owned(),
            })?;
        let metadata: ChartMetadata = serde_yaml::from_slice(&raw_metadata)
            .map_err(|source| yaml_error(origin, METADATA_FILE, source))?;
        if metadata.name.is_empty() {
            return Err(ChartError::MissingName {
                path: origin.to_owned(),
            });
        }

        let values = match files.remove(VALUES_FILE) {
            Some(raw) => {
                let parsed: serde_yaml::Value = serde_yaml::from_slice(&raw)
                    .map_err(|source| yaml_error(origin, VALUES_FILE, source))?;
                match Value::from(parsed) {
                    Value::Null => Value::Map(BTreeMap::new()),
                    other => other,
                }
            }
            None => Value::Map(BTreeMap::new()),
        };

        let prefix = format!("{TEMPLATES_DIR}/");
        let mut templates = Vec::new();
        for (name, bytes) in files {
            if !name.starts_with(&prefix) {
                continue;
            }
            let text = String::from_utf8(bytes).map_err(|_| ChartError::InvalidUtf8 {
                path: origin.to_owned(),
                template: name.clone(),
            })?;
            templates.push(TemplateSource { name, text });
        }
        trace!("loaded chart {} with {} template(s)", metadata.name, templates.len());

        Ok(Self {
            metadata,
            values,
            templates,
        })
    }
}

fn optional_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::Null => Ok(String::new()),
        serde_yaml::Value::String(text) => Ok(text),
        serde_yaml::Value::Number(number) => Ok(number.to_string()),
        serde_yaml::Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a scalar, found {other:?}"
        ))),
    }
}

fn yaml_error(origin: &Utf8Path, file: &str, source: serde_yaml::Error) -> ChartError {
    ChartError::Yaml {
        path: origin.to_owned(),
        file: file.to_owned(),
        source,
    }
}

fn io_error(path: &Utf8Path) -> impl FnOnce(std::io::Error) -> ChartError + '_ {
    move |source| ChartError::Io {
        path: path.to_owned(),
        source,
    }
}

fn read_directory(root: &Utf8Path) -> Result<BTreeMap<String, Vec<u8>>, ChartError> {
    let mut files = BTreeMap::new();
    for name in [METADATA_FILE, VALUES_FILE] {
        let path = root.join(name);
        if path.is_file() {
            files.insert(name.to_owned(), std::fs::read(&path).map_err(io_error(&path))?);
        }
    }
    let templates = root.join(TEMPLATES_DIR);
    if templates.is_dir() {
        collect_templates(&templates, TEMPLATES_DIR, &mut files)?;
    }
    Ok(files)
}

fn collect_templates(
    dir: &Utf8Path,
    relative: &str,
    files: &mut BTreeMap<String, Vec<u8>>,
) -> Result<(), ChartError> {
    for entry in dir.read_dir_utf8().map_err(io_error(dir))? {
        let entry = entry.map_err(io_error(dir))?;
        let path = entry.path();
        let name = format!("{relative}/{}", entry.file_name());
        let file_type = entry.file_type().map_err(io_error(path))?;
        if file_type.is_dir() {
            collect_templates(path, &name, files)?;
        } else if file_type.is_file() {
            files.insert(name, std::fs::read(path).map_err(io_error(path))?);
        }
    }
    Ok(())
}

fn read_archive(archive_path: &Utf8Path) -> Result<BTreeMap<String, Vec<u8>>, ChartError> {
    let archive_error = |source: std::io::Error| ChartError::Archive {
        path: archive_path.to_owned(),
        source,
    };
    let file = std::fs::File::open(archive_path).map_err(io_error(archive_path))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut files = BTreeMap::new();

    for entry in archive.entries().map_err(archive_error)? {
        let mut entry = entry.map_err(archive_error)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let entry_path = entry.path().map_err(archive_error)?.into_owned();
        validate_entry_path(archive_path, &entry_path)?;

        let Some(name) = chart_relative_name(&entry_path) else {
            continue;
        };
        let mut content = Vec::new();
        entry.read_to_end(&mut content).map_err(archive_error)?;
        files.insert(name, content);
    }
    Ok(files)
}

/// Reject absolute entry paths and `..` components.
fn validate_entry_path(archive: &Utf8Path, path: &Path) -> Result<(), ChartError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|component| matches!(component, Component::ParentDir));
    if escapes {
        return Err(ChartError::PathTraversal {
            archive: archive.to_owned(),
            entry: path.display().to_string(),
        });
    }
    Ok(())
}

/// Strip the top-level chart directory from an archive entry path.
fn chart_relative_name(path: &Path) -> Option<String> {
    let mut components = path
        .components()
        .filter(|component| !matches!(component, Component::CurDir));
    components.next()?;
    let rest: Vec<_> = components
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    if rest.is_empty() {
        None
    } else {
        Some(rest.join("/"))
    }
}
