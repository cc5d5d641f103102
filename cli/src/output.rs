//! Output sinks for extracted image lists.
//!
//! The `--output` option selects one of five sinks as `kind[=filename]`.
//! `stdout` and `file` emit the raw newline-delimited buffer; `json`, `yaml`
//! and `skopeo` emit `{names: [...]}` with empty entries dropped.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use chart_mirror_core::extract::ImageBuffer;
use chart_mirror_core::mirror::write_private_file;
use log::debug;
use serde::Serialize;

use crate::error::{CliError, Result};

/// Value of `--output` when none is given.
pub const DEFAULT_OUTPUT: &str = "stdout";

/// File name used when the output option names none.
pub const DEFAULT_OUTPUT_FILE: &str = "images.out";

/// The available sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Raw buffer on standard output.
    Stdout,
    /// Raw buffer in a file.
    File,
    /// JSON document in a file.
    Json,
    /// YAML document in a file.
    Yaml,
    /// YAML document in a file, for use as a `skopeo sync` source.
    Skopeo,
}

impl OutputKind {
    /// Returns the option spelling of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::File => "file",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Skopeo => "skopeo",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputKind {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stdout" => Ok(Self::Stdout),
            "file" => Ok(Self::File),
            "json" => Ok(Self::Json),
            "yaml" => Ok(Self::Yaml),
            "skopeo" => Ok(Self::Skopeo),
            other => Err(CliError::UnknownOutputKind {
                kind: other.to_owned(),
            }),
        }
    }
}

/// A parsed `--output` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    /// Selected sink.
    pub kind: OutputKind,
    /// Absolute output file; unused by [`OutputKind::Stdout`].
    pub file: Utf8PathBuf,
}

impl OutputTarget {
    /// Parse `kind[=filename]`, resolving a relative file name against `cwd`.
    ///
    /// An absent or empty file name falls back to `images.out`. The file
    /// name is everything after the first `=`, so `file=a=b` writes `a=b`.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::UnknownOutputKind`] for an unrecognized kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use chart_mirror::output::{OutputKind, OutputTarget};
    ///
    /// let target = OutputTarget::parse("json=images.json", Utf8Path::new("/work"))?;
    /// assert_eq!(target.kind, OutputKind::Json);
    /// assert_eq!(target.file, "/work/images.json");
    /// # Ok::<(), chart_mirror::error::CliError>(())
    /// ```
    pub fn parse(spec: &str, cwd: &Utf8Path) -> Result<Self> {
        let (kind, file) = spec.split_once('=').unwrap_or((spec, ""));
        let file = if file.is_empty() {
            DEFAULT_OUTPUT_FILE
        } else {
            file
        };
        Ok(Self {
            kind: kind.parse()?,
            file: cwd.join(file),
        })
    }

    /// Parse `spec` against the process working directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the working directory cannot be determined or
    /// is not UTF-8, or when the kind is unknown.
    pub fn from_option(spec: &str) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| CliError::WorkingDirectory {
            reason: e.to_string(),
        })?;
        let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| CliError::WorkingDirectory {
            reason: format!("current directory is not valid UTF-8: {e}"),
        })?;
        Self::parse(spec, &cwd)
    }

    /// Write `images` to this sink.
    ///
    /// `stdout` receives the stdout payload; every other kind writes its file
    /// with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns an error when encoding or writing fails.
    pub fn emit(&self, images: &ImageBuffer, stdout: &mut dyn Write) -> Result<()> {
        let payload = render_payload(self.kind, images)?;
        if self.kind == OutputKind::Stdout {
            return stdout
                .write_all(&payload)
                .map_err(|source| CliError::WriteFailed { source });
        }
        debug!("writing {} image list to {}", self.kind, self.file);
        write_private_file(&self.file, &payload).map_err(|source| CliError::WriteFile {
            path: self.file.clone(),
            source,
        })
    }
}

#[derive(Debug, Serialize)]
struct ImageList {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    names: Vec<String>,
}

/// Encode `images` as `kind` would write them.
///
/// # Errors
///
/// Returns [`CliError::Encode`] when serialization fails.
pub fn render_payload(kind: OutputKind, images: &ImageBuffer) -> Result<Vec<u8>> {
    let list = ImageList {
        names: images.names(),
    };
    match kind {
        OutputKind::Stdout | OutputKind::File => Ok(images.as_str().as_bytes().to_vec()),
        OutputKind::Json => serde_json::to_vec(&list).map_err(|e| CliError::Encode {
            format: "json",
            reason: e.to_string(),
        }),
        OutputKind::Yaml | OutputKind::Skopeo => serde_yaml::to_string(&list)
            .map(String::into_bytes)
            .map_err(|e| CliError::Encode {
                format: "yaml",
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn buffer(images: &[&str]) -> ImageBuffer {
        let mut buffer = ImageBuffer::new();
        for image in images {
            buffer.push(image);
        }
        buffer
    }

    #[rstest]
    #[case::default("stdout", OutputKind::Stdout, "/work/images.out")]
    #[case::file_default("file", OutputKind::File, "/work/images.out")]
    #[case::relative("json=out/images.json", OutputKind::Json, "/work/out/images.json")]
    #[case::absolute("yaml=/tmp/images.yaml", OutputKind::Yaml, "/tmp/images.yaml")]
    #[case::empty_name("skopeo=", OutputKind::Skopeo, "/work/images.out")]
    #[case::equals_in_name("file=a=b", OutputKind::File, "/work/a=b")]
    fn parses_output_option(#[case] spec: &str, #[case] kind: OutputKind, #[case] file: &str) {
        let target = OutputTarget::parse(spec, Utf8Path::new("/work")).expect("valid");
        assert_eq!(target.kind, kind);
        assert_eq!(target.file, Utf8PathBuf::from(file));
    }

    #[rstest]
    #[case("xml")]
    #[case("")]
    #[case("JSON=images.json")]
    fn rejects_unknown_kind(#[case] spec: &str) {
        let err = OutputTarget::parse(spec, Utf8Path::new("/work")).expect_err("unknown");
        assert!(matches!(err, CliError::UnknownOutputKind { .. }));
    }

    #[test]
    fn json_lists_names() {
        let payload = render_payload(OutputKind::Json, &buffer(&["a", "b"])).expect("encode");
        assert_eq!(payload, br#"{"names":["a","b"]}"#);
    }

    #[rstest]
    #[case(OutputKind::Yaml)]
    #[case(OutputKind::Skopeo)]
    fn yaml_kinds_share_structure(#[case] kind: OutputKind) {
        let payload = render_payload(kind, &buffer(&["a", "b"])).expect("encode");
        let parsed: serde_yaml::Value = serde_yaml::from_slice(&payload).expect("valid YAML");
        let names: Vec<&str> = parsed["names"]
            .as_sequence()
            .expect("names list")
            .iter()
            .filter_map(serde_yaml::Value::as_str)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[rstest]
    #[case(OutputKind::Json, "{}")]
    #[case(OutputKind::Yaml, "{}\n")]
    fn empty_result_omits_names(#[case] kind: OutputKind, #[case] expected: &str) {
        let payload = render_payload(kind, &ImageBuffer::new()).expect("encode");
        assert_eq!(String::from_utf8(payload).expect("UTF-8"), expected);
    }

    #[test]
    fn structured_payloads_drop_empty_entries_but_raw_keeps_them() {
        let images = buffer(&["", "a", "a"]);
        let raw = render_payload(OutputKind::File, &images).expect("encode");
        assert_eq!(raw, b"\na\na\n");
        let json = render_payload(OutputKind::Json, &images).expect("encode");
        assert_eq!(json, br#"{"names":["a","a"]}"#);
    }

    #[test]
    fn stdout_sink_writes_raw_buffer() {
        let target = OutputTarget::parse("stdout", Utf8Path::new("/work")).expect("valid");
        let mut stdout = Vec::new();
        target
            .emit(&buffer(&["nginx:1.19", "redis:7"]), &mut stdout)
            .expect("emit");
        assert_eq!(stdout, b"nginx:1.19\nredis:7\n");
    }

    #[test]
    fn file_sinks_write_private_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cwd = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 path");
        let target = OutputTarget::parse("json=images.json", &cwd).expect("valid");
        let mut stdout = Vec::new();

        target.emit(&buffer(&["a"]), &mut stdout).expect("emit");

        assert!(stdout.is_empty());
        let written = std::fs::read_to_string(cwd.join("images.json")).expect("read");
        assert_eq!(written, r#"{"names":["a"]}"#);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(cwd.join("images.json"))
                .expect("metadata")
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn unwritable_file_is_reported() {
        let target = OutputTarget::parse("file=/nonexistent/dir/images.out", Utf8Path::new("/"))
            .expect("valid");
        let err = target
            .emit(&buffer(&["a"]), &mut Vec::new())
            .expect_err("missing parent");
        assert!(matches!(err, CliError::WriteFile { .. }));
    }
}
