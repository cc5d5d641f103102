//! Chart rendering.
//!
//! The [`Renderer`] trait is the seam the traversal engine renders through;
//! [`ChartRenderer`] is the production implementation built on
//! [`crate::chart`] and [`crate::template`].

use camino::Utf8Path;
use log::{debug, trace};

use crate::chart::{Chart, ChartError, TemplateSource};
use crate::template::{TemplateError, TemplateSet};
use crate::values::{Value, normalize};

/// Kubernetes version advertised through `.Capabilities`.
const KUBE_MAJOR: &str = "1";
const KUBE_MINOR: &str = "9";

/// Trait for rendering one chart into its manifest documents.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use chart_mirror_core::render::{ChartRenderer, Renderer};
///
/// let renderer = ChartRenderer::new(false);
/// let documents = renderer.render(Utf8Path::new("/charts/nginx-1.2.0.tgz"));
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait Renderer {
    /// Render the chart at `path`, a directory or a `.tgz` archive.
    ///
    /// Returns one rendered document per manifest template, ordered by
    /// template path.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] when the chart cannot be loaded or any
    /// template fails to parse or execute.
    fn render(&self, path: &Utf8Path) -> Result<Vec<String>, RenderError>;
}

/// Errors arising from rendering.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The chart could not be loaded.
    #[error("cannot load chart: {0}")]
    Chart(#[from] ChartError),

    /// A manifest or partial failed to parse, or a manifest failed to
    /// execute.
    #[error("cannot render chart {chart}: template {template}: {source}")]
    Template {
        /// Chart name from `Chart.yaml`.
        chart: String,
        /// Template path within the chart.
        template: String,
        /// Template diagnostic.
        #[source]
        source: TemplateError,
    },
}

/// Renders charts with their default values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChartRenderer {
    lint_mode: bool,
}

impl ChartRenderer {
    /// Create a renderer. In `lint_mode`, `required` values that are
    /// missing render as empty strings.
    #[must_use]
    pub const fn new(lint_mode: bool) -> Self {
        Self { lint_mode }
    }
}

impl Renderer for ChartRenderer {
    fn render(&self, path: &Utf8Path) -> Result<Vec<String>, RenderError> {
        debug!("processing target: {path}");
        let chart = Chart::load(path)?;
        let context = render_context(&chart);
        let template_error = |source: &TemplateSource, err: TemplateError| RenderError::Template {
            chart: chart.metadata.name.clone(),
            template: source.name.clone(),
            source: err,
        };

        let mut templates = TemplateSet::new();
        for source in chart
            .templates
            .iter()
            .filter(|t| t.is_manifest() || t.is_partial())
        {
            templates
                .add(&source.name, &source.text)
                .map_err(|err| template_error(source, err))?;
        }

        let mut documents = Vec::new();
        for source in chart.templates.iter().filter(|t| t.is_manifest()) {
            trace!("rendering {}", source.name);
            let context = with_template(&context, &chart.metadata.name, &source.name);
            let rendered = templates
                .render(&source.name, &context, self.lint_mode)
                .map_err(|err| template_error(source, err))?;
            documents.push(rendered);
        }
        Ok(documents)
    }
}

/// Bind `.Template` for the manifest `template` of `chart`.
fn with_template(context: &Value, chart: &str, template: &str) -> Value {
    let mut context = context.clone();
    if let Value::Map(map) = &mut context {
        map.insert(
            "Template".to_owned(),
            Value::map([
                ("Name", Value::from(format!("{chart}/{template}"))),
                ("BasePath", Value::from(format!("{chart}/templates"))),
            ]),
        );
    }
    context
}

/// Build the value bound to `.` while rendering `chart`.
///
/// Nulls anywhere below the root map are replaced by empty strings.
#[must_use]
pub fn render_context(chart: &Chart) -> Value {
    let metadata = &chart.metadata;
    normalize(Value::map([
        ("Values", chart.values.clone()),
        (
            "Chart",
            Value::map([
                ("Name", Value::from(metadata.name.as_str())),
                ("Version", Value::from(metadata.version.as_str())),
                ("AppVersion", Value::from(metadata.app_version.as_str())),
            ]),
        ),
        (
            "Release",
            Value::map([
                ("Name", Value::from("")),
                ("Namespace", Value::from("")),
                ("Service", Value::from("Helm")),
                ("IsInstall", Value::Bool(false)),
                ("IsUpgrade", Value::Bool(false)),
            ]),
        ),
        (
            "Capabilities",
            Value::map([(
                "KubeVersion",
                Value::map([
                    ("Major", Value::from(KUBE_MAJOR)),
                    ("Minor", Value::from(KUBE_MINOR)),
                    ("GitVersion", Value::from(format!("v{KUBE_MAJOR}.{KUBE_MINOR}.0"))),
                ]),
            )]),
        ),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ChartFixture, write_chart_archive};
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Workspace {
        _dir: TempDir,
        path: Utf8PathBuf,
    }

    #[fixture]
    fn workspace() -> Workspace {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 path");
        Workspace { _dir: dir, path }
    }

    fn web_chart() -> ChartFixture {
        ChartFixture::new("web", "1.2.0")
            .values("image:\n  repository: nginx\n  tag: ~\nsidecar: ~\n")
            .template(
                "deployment.yaml",
                "name: {{ .Chart.Name }}-{{ .Chart.Version }}\nimage: \"{{ .Values.image.repository }}:{{ .Values.image.tag | default \"latest\" }}\"\n",
            )
            .template("_helpers.tpl", "{{ define \"web.name\" }}web{{ end }}")
            .template("NOTES.txt", "{{ range .Values.hosts }}{{ end }}")
    }

    #[rstest]
    fn renders_directory_chart(workspace: Workspace) {
        let chart_dir = web_chart().write_dir(&workspace.path);

        let documents = ChartRenderer::new(false).render(&chart_dir).expect("render");

        assert_eq!(
            documents,
            vec!["name: web-1.2.0\nimage: \"nginx:latest\"\n".to_owned()]
        );
    }

    #[rstest]
    fn renders_archive_chart(workspace: Workspace) {
        let archive = write_chart_archive(&workspace.path, &web_chart());

        let documents = ChartRenderer::new(false).render(&archive).expect("render");

        assert_eq!(documents.len(), 1);
    }

    #[rstest]
    fn null_values_render_as_empty(workspace: Workspace) {
        let chart_dir = ChartFixture::new("side", "0.1.0")
            .values("sidecar: ~\n")
            .template("pod.yaml", "sidecar: [{{ .Values.sidecar }}]\n")
            .write_dir(&workspace.path);

        let documents = ChartRenderer::new(false).render(&chart_dir).expect("render");

        assert_eq!(documents, vec!["sidecar: []\n".to_owned()]);
    }

    #[rstest]
    #[case(false, true)]
    #[case(true, false)]
    fn lint_mode_relaxes_required(workspace: Workspace, #[case] lint_mode: bool, #[case] fails: bool) {
        let chart_dir = ChartFixture::new("strict", "0.1.0")
            .template("pod.yaml", "image: {{ required \"image needed\" .Values.image }}\n")
            .write_dir(&workspace.path);

        let result = ChartRenderer::new(lint_mode).render(&chart_dir);

        assert_eq!(result.is_err(), fails);
    }

    #[rstest]
    fn renders_the_helm_create_scaffold(workspace: Workspace) {
        let chart_dir = ChartFixture::scaffold("web", "0.1.0").write_dir(&workspace.path);

        let documents = ChartRenderer::new(false).render(&chart_dir).expect("render");

        let deployment = documents.first().expect("deployment rendered");
        assert!(deployment.contains("          image: \"nginx:1.16.0\"\n"), "{deployment}");
        assert!(deployment.contains("  labels:\n    helm.sh/chart: web-0.1.0\n    app.kubernetes.io/name: web\n"), "{deployment}");
        assert!(deployment.contains("    app.kubernetes.io/version: \"1.16.0\"\n"), "{deployment}");
        assert!(deployment.contains("      serviceAccountName: -web\n"), "{deployment}");
        assert!(deployment.contains("      securityContext:\n        {}\n"), "{deployment}");
        assert!(!deployment.contains("annotations:"), "{deployment}");

        let test_pod = documents.last().expect("test pod rendered");
        assert!(test_pod.contains("      image: busybox\n"), "{test_pod}");
        assert_eq!(documents.len(), 6);
    }

    #[rstest]
    fn partial_parse_errors_name_the_partial(workspace: Workspace) {
        let chart_dir = ChartFixture::new("broken", "0.1.0")
            .template("_helpers.tpl", "{{ define \"x\" }}{{ frobnicate }}{{ end }}")
            .template("pod.yaml", "image: {{ include \"x\" . }}\n")
            .write_dir(&workspace.path);

        let err = ChartRenderer::new(false).render(&chart_dir).expect_err("unknown function");

        assert!(matches!(
            err,
            RenderError::Template { ref template, source: TemplateError::UnknownFunction { .. }, .. }
                if template == "templates/_helpers.tpl"
        ));
    }

    #[rstest]
    fn manifests_see_their_template_name(workspace: Workspace) {
        let chart_dir = ChartFixture::new("named", "0.1.0")
            .template("pod.yaml", "source: {{ .Template.Name }}\n")
            .write_dir(&workspace.path);

        let documents = ChartRenderer::new(false).render(&chart_dir).expect("render");

        assert_eq!(documents, vec!["source: named/templates/pod.yaml\n".to_owned()]);
    }

    #[rstest]
    fn template_errors_name_the_template(workspace: Workspace) {
        let chart_dir = ChartFixture::new("broken", "0.1.0")
            .template("bad.yaml", "{{ include \"x\" . }}")
            .write_dir(&workspace.path);

        let err = ChartRenderer::new(false).render(&chart_dir).expect_err("undefined template");

        assert!(matches!(
            err,
            RenderError::Template { ref chart, ref template, .. }
                if chart == "broken" && template == "templates/bad.yaml"
        ));
    }

    #[rstest]
    fn non_chart_directory_is_a_load_error(workspace: Workspace) {
        let err = ChartRenderer::new(false)
            .render(&workspace.path)
            .expect_err("not a chart");
        assert!(matches!(err, RenderError::Chart(ChartError::MissingMetadata { .. })));
    }

    #[test]
    fn context_exposes_release_and_capabilities() {
        let chart = Chart {
            metadata: crate::chart::ChartMetadata {
                name: "x".to_owned(),
                version: "1".to_owned(),
                app_version: String::new(),
            },
            values: Value::Null,
            templates: Vec::new(),
        };
        let context = render_context(&chart);
        assert_eq!(
            context.lookup(&["Capabilities", "KubeVersion", "GitVersion"]),
            Some(&Value::from("v1.9.0"))
        );
        assert_eq!(context.lookup(&["Values"]), Some(&Value::from("")));
        assert_eq!(context.lookup(&["Release", "Name"]), Some(&Value::from("")));
    }
}
