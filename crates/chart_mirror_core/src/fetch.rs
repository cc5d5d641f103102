//! Remote content retrieval.
//!
//! Provides a trait-based abstraction over fetching index and archive bytes
//! so the mirroring engine can be exercised without network access, plus the
//! production implementation on top of `ureq`.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use camino::{Utf8Path, Utf8PathBuf};
use ureq::tls::{Certificate, ClientCert, PemItem, PrivateKey, RootCerts, TlsConfig};

/// Network timeout for a single request, body included.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for fetching the body at an absolute URL.
///
/// # Examples
///
/// ```no_run
/// use chart_mirror_core::fetch::{Fetcher, HttpFetcher, RepositoryAuth};
///
/// let fetcher = HttpFetcher::new(&RepositoryAuth::default()).expect("no TLS material to load");
/// let body = fetcher.fetch("https://charts.example.com/index.yaml");
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait Fetcher {
    /// Fetch the full body of `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server answers with an
    /// error status, or the body cannot be read.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Errors arising from fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The server answered 404.
    #[error("not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// TLS material named in [`RepositoryAuth`] could not be loaded.
    #[error("cannot load TLS material from {path}: {reason}")]
    Tls {
        /// The offending file.
        path: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },
}

/// Repository credentials, passed through to the HTTP layer untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryAuth {
    /// Basic auth user name.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// PEM bundle of trusted certificate authorities.
    pub ca_file: Option<Utf8PathBuf>,
    /// PEM client certificate chain.
    pub cert_file: Option<Utf8PathBuf>,
    /// PEM client private key.
    pub key_file: Option<Utf8PathBuf>,
}

impl RepositoryAuth {
    /// `Authorization` header value, when a user name is configured.
    #[must_use]
    pub fn basic_auth_header(&self) -> Option<String> {
        let username = self.username.as_deref()?;
        let password = self.password.as_deref().unwrap_or_default();
        let token = STANDARD.encode(format!("{username}:{password}"));
        Some(format!("Basic {token}"))
    }
}

/// HTTP fetcher using a single `ureq` agent.
pub struct HttpFetcher {
    agent: ureq::Agent,
    authorization: Option<String>,
}

impl HttpFetcher {
    /// Build a fetcher configured with `auth`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Tls`] when a CA bundle, certificate, or key
    /// file cannot be read or decoded, or when only one of the certificate
    /// and key files is configured.
    pub fn new(auth: &RepositoryAuth) -> Result<Self, FetchError> {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(FETCH_TIMEOUT))
            .tls_config(tls_config(auth)?)
            .build();
        Ok(Self {
            agent: ureq::Agent::new_with_config(config),
            authorization: auth.basic_auth_header(),
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut request = self.agent.get(url);
        if let Some(value) = &self.authorization {
            request = request.header("Authorization", value.as_str());
        }
        let response = request.call().map_err(|e| map_ureq_error(url, &e))?;
        let mut body = Vec::new();
        response
            .into_body()
            .as_reader()
            .read_to_end(&mut body)
            .map_err(|e| FetchError::Http {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(body)
    }
}

fn tls_config(auth: &RepositoryAuth) -> Result<TlsConfig, FetchError> {
    let mut builder = TlsConfig::builder();
    if let Some(ca_file) = &auth.ca_file {
        let roots = read_certificates(ca_file)?;
        builder = builder.root_certs(RootCerts::Specific(Arc::new(roots)));
    }
    match (&auth.cert_file, &auth.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let chain = read_certificates(cert_file)?;
            let pem = read_pem(key_file)?;
            let key = PrivateKey::from_pem(&pem).map_err(|e| tls_error(key_file, &e))?;
            builder = builder.client_cert(Some(ClientCert::new_with_certs(&chain, key)));
        }
        (Some(cert_file), None) => {
            return Err(FetchError::Tls {
                path: cert_file.clone(),
                reason: "client certificate given without a key file".to_owned(),
            });
        }
        (None, Some(key_file)) => {
            return Err(FetchError::Tls {
                path: key_file.clone(),
                reason: "client key given without a certificate file".to_owned(),
            });
        }
        (None, None) => {}
    }
    Ok(builder.build())
}

fn read_certificates(path: &Utf8Path) -> Result<Vec<Certificate<'static>>, FetchError> {
    let pem = read_pem(path)?;
    let mut certificates = Vec::new();
    for item in ureq::tls::parse_pem(&pem) {
        if let PemItem::Certificate(cert) = item.map_err(|e| tls_error(path, &e))? {
            certificates.push(cert.to_owned());
        }
    }
    if certificates.is_empty() {
        return Err(FetchError::Tls {
            path: path.to_owned(),
            reason: "no certificates found".to_owned(),
        });
    }
    Ok(certificates)
}

fn read_pem(path: &Utf8Path) -> Result<Vec<u8>, FetchError> {
    std::fs::read(path).map_err(|e| tls_error(path, &e))
}

fn tls_error(path: &Utf8Path, err: &dyn std::fmt::Display) -> FetchError {
    FetchError::Tls {
        path: path.to_owned(),
        reason: err.to_string(),
    }
}

/// Map a ureq error to a [`FetchError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(404) => FetchError::NotFound {
            url: url.to_owned(),
        },
        other => FetchError::Http {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
