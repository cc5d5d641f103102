//! Fixtures shared by unit, integration and behaviour tests.
//!
//! Available under `cfg(test)` and the `test-support` feature. Helpers panic
//! on I/O failure so tests fail at the point of setup.

#![allow(clippy::expect_used, reason = "fixtures abort the test on setup failure")]

use std::cell::RefCell;
use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::ARCHIVE_SUFFIX;
use crate::fetch::{FetchError, Fetcher};

/// In-memory description of a chart, written out as a directory or archive.
#[derive(Debug, Clone)]
pub struct ChartFixture {
    name: String,
    version: String,
    files: BTreeMap<String, String>,
}

impl ChartFixture {
    /// A chart with only a `Chart.yaml`.
    #[must_use]
    pub fn new(name: &str, version: &str) -> Self {
        let mut files = BTreeMap::new();
        files.insert(
            "Chart.yaml".to_owned(),
            format!("apiVersion: v1\nname: {name}\nversion: {version}\n"),
        );
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            files,
        }
    }

    /// Set the contents of `values.yaml`.
    #[must_use]
    pub fn values(mut self, yaml: &str) -> Self {
        self.files.insert("values.yaml".to_owned(), yaml.to_owned());
        self
    }

    /// Add a template under `templates/`.
    #[must_use]
    pub fn template(mut self, name: &str, text: &str) -> Self {
        self.files.insert(format!("templates/{name}"), text.to_owned());
        self
    }

    /// Add a template that emits one container per image.
    #[must_use]
    pub fn with_images(self, images: &[&str]) -> Self {
        let mut manifest = String::from("apiVersion: v1\nkind: Pod\nspec:\n  containers:\n");
        for image in images {
            manifest.push_str(&format!("  - image: \"{image}\"\n"));
        }
        self.template("pod.yaml", &manifest)
    }

    /// The chart `helm create` generates, with helpers in `_helpers.tpl`
    /// and manifests built from `include`, `with`, `range` and `toYaml`.
    ///
    /// Rendered with its default values it references the images
    /// `nginx:1.16.0` and `busybox`.
    #[must_use]
    pub fn scaffold(name: &str, version: &str) -> Self {
        let mut chart = Self::new(name, version)
            .values(SCAFFOLD_VALUES)
            .template("_helpers.tpl", &SCAFFOLD_HELPERS.replace("CHART", name));
        for (file, text) in SCAFFOLD_TEMPLATES {
            chart = chart.template(file, &text.replace("CHART", name));
        }
        chart.files.insert(
            "Chart.yaml".to_owned(),
            format!(
                "apiVersion: v2\nname: {name}\ndescription: A Helm chart for Kubernetes\ntype: application\nversion: {version}\nappVersion: \"1.16.0\"\n"
            ),
        );
        chart
    }

    /// Chart name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Chart version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The file name the chart is archived under.
    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("{}-{}{ARCHIVE_SUFFIX}", self.name, self.version)
    }

    /// Write the chart as the directory `<root>/<name>`.
    ///
    /// # Panics
    ///
    /// Panics if a file cannot be written.
    #[must_use]
    pub fn write_dir(&self, root: &Utf8Path) -> Utf8PathBuf {
        let chart_dir = root.join(&self.name);
        for (relative, text) in &self.files {
            let path = chart_dir.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("create chart directory");
            }
            std::fs::write(&path, text).expect("write chart file");
        }
        chart_dir
    }

    /// Gzip-compressed tarball of the chart, rooted at `<name>/`.
    ///
    /// # Panics
    ///
    /// Panics if the archive cannot be encoded.
    #[must_use]
    pub fn archive_bytes(&self) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (relative, text) in &self.files {
            let mut header = tar::Header::new_gnu();
            header.set_size(text.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{}/{relative}", self.name), text.as_bytes())
                .expect("append archive entry");
        }
        builder
            .into_inner()
            .expect("finish tar stream")
            .finish()
            .expect("finish gzip stream")
    }
}

/// Write `chart` as `<root>/<name>-<version>.tgz` and return the path.
///
/// # Panics
///
/// Panics if the archive cannot be written.
#[must_use]
pub fn write_chart_archive(root: &Utf8Path, chart: &ChartFixture) -> Utf8PathBuf {
    let path = root.join(chart.archive_name());
    std::fs::write(&path, chart.archive_bytes()).expect("write chart archive");
    path
}

/// [`Fetcher`] serving canned bodies by URL; unknown URLs are 404s.
#[derive(Debug, Default)]
pub struct StubFetcher {
    bodies: BTreeMap<String, Vec<u8>>,
    requested: RefCell<Vec<String>>,
}

impl StubFetcher {
    /// Serve `body` at `url`.
    #[must_use]
    pub fn with(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_owned(), body.to_vec());
        self
    }

    /// URLs fetched so far, in request order.
    #[must_use]
    pub fn requested(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }
}

impl Fetcher for StubFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requested.borrow_mut().push(url.to_owned());
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                url: url.to_owned(),
            })
    }
}

const SCAFFOLD_VALUES: &str = r#"replicaCount: 1
image:
  repository: nginx
  pullPolicy: IfNotPresent
  tag: ""
imagePullSecrets: []
nameOverride: ""
fullnameOverride: ""
serviceAccount:
  create: true
  automount: true
  annotations: {}
  name: ""
podAnnotations: {}
podLabels: {}
podSecurityContext: {}
securityContext: {}
service:
  type: ClusterIP
  port: 80
ingress:
  enabled: false
  className: ""
  annotations: {}
  hosts:
    - host: chart-example.local
      paths:
        - path: /
          pathType: ImplementationSpecific
  tls: []
resources: {}
livenessProbe:
  httpGet:
    path: /
    port: http
readinessProbe:
  httpGet:
    path: /
    port: http
autoscaling:
  enabled: false
  minReplicas: 1
  maxReplicas: 100
  targetCPUUtilizationPercentage: 80
volumes: []
volumeMounts: []
nodeSelector: {}
tolerations: []
affinity: {}
"#;

const SCAFFOLD_HELPERS: &str = r#"{{/*
Expand the name of the chart.
*/}}
{{- define "CHART.name" -}}
{{- default .Chart.Name .Values.nameOverride | trunc 63 | trimSuffix "-" }}
{{- end }}

{{/*
Create a default fully qualified app name.
*/}}
{{- define "CHART.fullname" -}}
{{- if .Values.fullnameOverride }}
{{- .Values.fullnameOverride | trunc 63 | trimSuffix "-" }}
{{- else }}
{{- $name := default .Chart.Name .Values.nameOverride }}
{{- if contains $name .Release.Name }}
{{- .Release.Name | trunc 63 | trimSuffix "-" }}
{{- else }}
{{- printf "%s-%s" .Release.Name $name | trunc 63 | trimSuffix "-" }}
{{- end }}
{{- end }}
{{- end }}

{{- define "CHART.chart" -}}
{{- printf "%s-%s" .Chart.Name .Chart.Version | replace "+" "_" | trunc 63 | trimSuffix "-" }}
{{- end }}

{{- define "CHART.labels" -}}
helm.sh/chart: {{ include "CHART.chart" . }}
{{ include "CHART.selectorLabels" . }}
{{- if .Chart.AppVersion }}
app.kubernetes.io/version: {{ .Chart.AppVersion | quote }}
{{- end }}
app.kubernetes.io/managed-by: {{ .Release.Service }}
{{- end }}

{{- define "CHART.selectorLabels" -}}
app.kubernetes.io/name: {{ include "CHART.name" . }}
app.kubernetes.io/instance: {{ .Release.Name }}
{{- end }}

{{- define "CHART.serviceAccountName" -}}
{{- if .Values.serviceAccount.create }}
{{- default (include "CHART.fullname" .) .Values.serviceAccount.name }}
{{- else }}
{{- default "default" .Values.serviceAccount.name }}
{{- end }}
{{- end }}
"#;

const SCAFFOLD_TEMPLATES: [(&str, &str); 7] = [
    (
        "deployment.yaml",
        r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ include "CHART.fullname" . }}
  labels:
    {{- include "CHART.labels" . | nindent 4 }}
spec:
  {{- if not .Values.autoscaling.enabled }}
  replicas: {{ .Values.replicaCount }}
  {{- end }}
  selector:
    matchLabels:
      {{- include "CHART.selectorLabels" . | nindent 6 }}
  template:
    metadata:
      {{- with .Values.podAnnotations }}
      annotations:
        {{- toYaml . | nindent 8 }}
      {{- end }}
      labels:
        {{- include "CHART.labels" . | nindent 8 }}
        {{- with .Values.podLabels }}
        {{- toYaml . | nindent 8 }}
        {{- end }}
    spec:
      {{- with .Values.imagePullSecrets }}
      imagePullSecrets:
        {{- toYaml . | nindent 8 }}
      {{- end }}
      serviceAccountName: {{ include "CHART.serviceAccountName" . }}
      securityContext:
        {{- toYaml .Values.podSecurityContext | nindent 8 }}
      containers:
        - name: {{ .Chart.Name }}
          securityContext:
            {{- toYaml .Values.securityContext | nindent 12 }}
          image: "{{ .Values.image.repository }}:{{ .Values.image.tag | default .Chart.AppVersion }}"
          imagePullPolicy: {{ .Values.image.pullPolicy }}
          ports:
            - name: http
              containerPort: {{ .Values.service.port }}
              protocol: TCP
          livenessProbe:
            {{- toYaml .Values.livenessProbe | nindent 12 }}
          readinessProbe:
            {{- toYaml .Values.readinessProbe | nindent 12 }}
          resources:
            {{- toYaml .Values.resources | nindent 12 }}
          {{- with .Values.volumeMounts }}
          volumeMounts:
            {{- toYaml . | nindent 12 }}
          {{- end }}
      {{- with .Values.volumes }}
      volumes:
        {{- toYaml . | nindent 8 }}
      {{- end }}
      {{- with .Values.nodeSelector }}
      nodeSelector:
        {{- toYaml . | nindent 8 }}
      {{- end }}
"#,
    ),
    (
        "hpa.yaml",
        r#"{{- if .Values.autoscaling.enabled }}
apiVersion: autoscaling/v2
kind: HorizontalPodAutoscaler
metadata:
  name: {{ include "CHART.fullname" . }}
spec:
  minReplicas: {{ .Values.autoscaling.minReplicas }}
  maxReplicas: {{ .Values.autoscaling.maxReplicas }}
{{- end }}
"#,
    ),
    (
        "ingress.yaml",
        r#"{{- if .Values.ingress.enabled -}}
{{- $fullName := include "CHART.fullname" . -}}
{{- $svcPort := .Values.service.port -}}
{{- if and .Values.ingress.className (not (semverCompare ">=1.18-0" .Capabilities.KubeVersion.GitVersion)) }}
  {{- if not (hasKey .Values.ingress.annotations "kubernetes.io/ingress.class") }}
  {{- $_ := set .Values.ingress.annotations "kubernetes.io/ingress.class" .Values.ingress.className}}
  {{- end }}
{{- end }}
apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: {{ $fullName }}
spec:
  rules:
    {{- range .Values.ingress.hosts }}
    - host: {{ .host | quote }}
      http:
        paths:
          {{- range .paths }}
          - path: {{ .path }}
            backend:
              service:
                name: {{ $fullName }}
                port:
                  number: {{ $svcPort }}
          {{- end }}
    {{- end }}
{{- end }}
"#,
    ),
    (
        "service.yaml",
        r#"apiVersion: v1
kind: Service
metadata:
  name: {{ include "CHART.fullname" . }}
  labels:
    {{- include "CHART.labels" . | nindent 4 }}
spec:
  type: {{ .Values.service.type }}
  ports:
    - port: {{ .Values.service.port }}
      targetPort: http
  selector:
    {{- include "CHART.selectorLabels" . | nindent 4 }}
"#,
    ),
    (
        "serviceaccount.yaml",
        r#"{{- if .Values.serviceAccount.create -}}
apiVersion: v1
kind: ServiceAccount
metadata:
  name: {{ include "CHART.serviceAccountName" . }}
  {{- with .Values.serviceAccount.annotations }}
  annotations:
    {{- toYaml . | nindent 4 }}
  {{- end }}
automountServiceAccountToken: {{ .Values.serviceAccount.automount }}
{{- end }}
"#,
    ),
    (
        "NOTES.txt",
        r#"1. Get the application URL by running these commands:
{{- if .Values.ingress.enabled }}
{{- range $host := .Values.ingress.hosts }}
  {{- range .paths }}
  http{{ if $.Values.ingress.tls }}s{{ end }}://{{ $host.host }}{{ .path }}
  {{- end }}
{{- end }}
{{- else if contains "NodePort" .Values.service.type }}
  export NODE_PORT=$(kubectl get --namespace {{ .Release.Namespace }} -o jsonpath="{.spec.ports[0].nodePort}" services {{ include "CHART.fullname" . }})
{{- end }}
"#,
    ),
    (
        "tests/test-connection.yaml",
        r#"apiVersion: v1
kind: Pod
metadata:
  name: "{{ include "CHART.fullname" . }}-test-connection"
  annotations:
    "helm.sh/hook": test
spec:
  containers:
    - name: wget
      image: busybox
      command: ['wget']
      args: ['{{ include "CHART.fullname" . }}:{{ .Values.service.port }}']
  restartPolicy: Never
"#,
    ),
];
