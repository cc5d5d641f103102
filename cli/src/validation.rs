//! Argument validation and conversion into engine configuration.
//!
//! All checks run before any I/O so a malformed invocation never creates
//! folders or contacts a repository.

use camino::{Utf8Path, Utf8PathBuf};
use chart_mirror_core::config::{ErrorPolicy, InspectConfig, MirrorConfig};
use chart_mirror_core::fetch::RepositoryAuth;
use chart_mirror_core::selection::SelectionCriteria;
use url::Url;

use crate::cli::{InspectArgs, MirrorArgs};
use crate::error::{CliError, Result};

/// Check that `raw` parses as an http or https URL.
///
/// # Errors
///
/// Returns [`CliError::InvalidUrl`] when `raw` is not a URL and
/// [`CliError::UnsupportedScheme`] for any other scheme.
///
/// # Examples
///
/// ```
/// use chart_mirror::validation::validate_http_url;
///
/// assert!(validate_http_url("https://charts.example.com/", "index file").is_ok());
/// assert!(validate_http_url("ftp://charts.example.com/", "index file").is_err());
/// ```
pub fn validate_http_url(raw: &str, role: &'static str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|source| CliError::InvalidUrl {
        role,
        url: raw.to_owned(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(CliError::UnsupportedScheme {
            role,
            scheme: scheme.to_owned(),
        }),
    }
}

/// Check that `path` is absolute.
///
/// # Errors
///
/// Returns [`CliError::RelativePath`] otherwise.
pub fn require_absolute(path: &Utf8Path, role: &'static str) -> Result<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(CliError::RelativePath {
            role,
            path: path.to_owned(),
        })
    }
}

/// Validate mirror arguments and build the engine configuration.
///
/// The repository URL is kept exactly as typed so that root rewriting
/// matches the text found in the index.
///
/// # Errors
///
/// Returns a validation error for missing positionals, a non-http(s)
/// repository or new root URL, a relative destination, a client certificate
/// without its key (or the reverse), or a chart version given without a
/// chart name.
pub fn mirror_config(args: &MirrorArgs, ignore_errors: bool) -> Result<MirrorConfig> {
    let (Some(repo_url), Some(destination)) = (&args.repo_url, &args.destination) else {
        return Err(CliError::MissingArguments { expected: 2 });
    };
    validate_http_url(repo_url, "index file")?;
    require_absolute(destination, "destination folder")?;

    let new_root_url = args
        .new_root_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .map(|url| validate_http_url(url, "new root URL").map(|_| url.to_owned()))
        .transpose()?;
    require_client_identity(args)?;

    let criteria = SelectionCriteria::new(
        args.chart_name.clone(),
        args.chart_version.clone(),
        args.all_versions,
    )?;

    Ok(MirrorConfig {
        repo_url: repo_url.clone(),
        destination: destination.clone(),
        criteria,
        new_root_url,
        auth: RepositoryAuth {
            username: args.username.clone(),
            password: args.password.clone(),
            ca_file: args.ca_file.clone(),
            cert_file: args.cert_file.clone(),
            key_file: args.key_file.clone(),
        },
        policy: ErrorPolicy::from_ignore_errors(ignore_errors),
    })
}

/// Client TLS authentication needs both the certificate and its key.
fn require_client_identity(args: &MirrorArgs) -> Result<()> {
    match (&args.cert_file, &args.key_file) {
        (Some(_), None) => Err(CliError::IncompleteClientIdentity {
            given: "cert-file",
            missing: "key-file",
        }),
        (None, Some(_)) => Err(CliError::IncompleteClientIdentity {
            given: "key-file",
            missing: "cert-file",
        }),
        _ => Ok(()),
    }
}

/// Validate inspect arguments, returning the target and engine configuration.
///
/// # Errors
///
/// Returns a validation error when the target is missing or relative.
pub fn inspect_config(
    args: &InspectArgs,
    ignore_errors: bool,
) -> Result<(Utf8PathBuf, InspectConfig)> {
    let target = args
        .target
        .clone()
        .ok_or(CliError::MissingArguments { expected: 1 })?;
    require_absolute(&target, "[folder|tgzfile]")?;
    Ok((
        target,
        InspectConfig {
            policy: ErrorPolicy::from_ignore_errors(ignore_errors),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn mirror_args(repo_url: &str, destination: &str) -> MirrorArgs {
        MirrorArgs {
            repo_url: Some(repo_url.to_owned()),
            destination: Some(Utf8PathBuf::from(destination)),
            ..MirrorArgs::default()
        }
    }

    #[test]
    fn valid_arguments_build_config() {
        let mut args = mirror_args("https://charts.example.com/", "/srv/charts");
        args.chart_name = Some("nginx".to_owned());
        args.username = Some("admin".to_owned());
        args.new_root_url = Some("http://mirror.local/charts".to_owned());

        let config = mirror_config(&args, true).expect("valid");

        assert_eq!(config.repo_url, "https://charts.example.com/");
        assert_eq!(config.destination, Utf8PathBuf::from("/srv/charts"));
        assert_eq!(config.criteria.exact_name(), Some("nginx"));
        assert_eq!(config.new_root_url.as_deref(), Some("http://mirror.local/charts"));
        assert_eq!(config.auth.username.as_deref(), Some("admin"));
        assert_eq!(config.policy, ErrorPolicy::IgnoreErrors);
    }

    #[rstest]
    #[case::no_args(None, None)]
    #[case::one_arg(Some("https://charts.example.com/"), None)]
    fn missing_positionals_are_rejected(
        #[case] repo_url: Option<&str>,
        #[case] destination: Option<&str>,
    ) {
        let args = MirrorArgs {
            repo_url: repo_url.map(str::to_owned),
            destination: destination.map(Utf8PathBuf::from),
            ..MirrorArgs::default()
        };
        let err = mirror_config(&args, false).expect_err("missing");
        assert!(matches!(err, CliError::MissingArguments { expected: 2 }));
    }

    #[rstest]
    #[case::ftp("ftp://charts.example.com/")]
    #[case::file("file:///srv/charts")]
    fn non_http_repository_is_rejected(#[case] url: &str) {
        let err = mirror_config(&mirror_args(url, "/srv/charts"), false).expect_err("scheme");
        assert!(matches!(err, CliError::UnsupportedScheme { .. }));
    }

    #[test]
    fn unparseable_repository_is_rejected() {
        let err = mirror_config(&mirror_args("charts.example.com", "/srv/charts"), false)
            .expect_err("not a URL");
        assert!(matches!(err, CliError::InvalidUrl { .. }));
    }

    #[test]
    fn relative_destination_is_rejected() {
        let err = mirror_config(&mirror_args("https://charts.example.com/", "charts"), false)
            .expect_err("relative");
        assert!(matches!(err, CliError::RelativePath { .. }));
    }

    #[test]
    fn non_http_new_root_is_rejected() {
        let mut args = mirror_args("https://charts.example.com/", "/srv/charts");
        args.new_root_url = Some("s3://bucket/charts".to_owned());
        let err = mirror_config(&args, false).expect_err("scheme");
        assert!(matches!(err, CliError::UnsupportedScheme { role: "new root URL", .. }));
    }

    #[test]
    fn empty_new_root_means_no_rewrite() {
        let mut args = mirror_args("https://charts.example.com/", "/srv/charts");
        args.new_root_url = Some(String::new());
        let config = mirror_config(&args, false).expect("valid");
        assert!(config.new_root_url.is_none());
    }

    #[test]
    fn version_without_name_is_rejected() {
        let mut args = mirror_args("https://charts.example.com/", "/srv/charts");
        args.chart_version = Some("1.0.0".to_owned());
        let err = mirror_config(&args, false).expect_err("needs a name");
        assert!(matches!(err, CliError::Selection(_)));
    }

    #[rstest]
    #[case::cert_only(Some("/etc/tls/client.pem"), None, "cert-file", "key-file")]
    #[case::key_only(None, Some("/etc/tls/client.key"), "key-file", "cert-file")]
    fn lone_client_identity_half_is_rejected(
        #[case] cert_file: Option<&str>,
        #[case] key_file: Option<&str>,
        #[case] given: &str,
        #[case] missing: &str,
    ) {
        let mut args = mirror_args("https://charts.example.com/", "/srv/charts");
        args.cert_file = cert_file.map(Utf8PathBuf::from);
        args.key_file = key_file.map(Utf8PathBuf::from);
        let err = mirror_config(&args, false).expect_err("incomplete identity");
        assert!(matches!(
            err,
            CliError::IncompleteClientIdentity { given: g, missing: m } if g == given && m == missing
        ));
    }

    #[test]
    fn complete_client_identity_is_passed_through() {
        let mut args = mirror_args("https://charts.example.com/", "/srv/charts");
        args.cert_file = Some(Utf8PathBuf::from("/etc/tls/client.pem"));
        args.key_file = Some(Utf8PathBuf::from("/etc/tls/client.key"));
        let config = mirror_config(&args, false).expect("valid");
        assert_eq!(config.auth.cert_file, args.cert_file);
        assert_eq!(config.auth.key_file, args.key_file);
    }

    #[rstest]
    #[case::missing(None)]
    #[case::relative(Some("charts"))]
    fn inspect_target_must_be_absolute(#[case] target: Option<&str>) {
        let args = InspectArgs {
            target: target.map(Utf8PathBuf::from),
            output: "stdout".to_owned(),
        };
        assert!(inspect_config(&args, false).is_err());
    }

    #[test]
    fn inspect_config_carries_policy() {
        let args = InspectArgs {
            target: Some(Utf8PathBuf::from("/srv/charts")),
            output: "stdout".to_owned(),
        };
        let (target, config) = inspect_config(&args, true).expect("valid");
        assert_eq!(target, Utf8PathBuf::from("/srv/charts"));
        assert!(config.policy.ignores_errors());
    }
}
