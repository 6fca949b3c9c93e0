//! TLS plumbing for secure-socket connections
//!
//! One process-wide client session cache backs every LDAPS connection so a
//! cached session can be dropped before connecting, forcing a full handshake
//! and a fresh certificate path validation.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use rustls::client::{ClientSessionMemoryCache, ClientSessionStore, Resumption};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::FromDer;

use crate::error::{DirectoryError, DirectoryResult};

const SESSION_CACHE_SIZE: usize = 256;

static SESSION_CACHE: OnceLock<Arc<ClientSessionMemoryCache>> = OnceLock::new();

/// The process-wide TLS client session cache, created on first use.
pub fn session_cache() -> Arc<ClientSessionMemoryCache> {
    SESSION_CACHE
        .get_or_init(|| Arc::new(ClientSessionMemoryCache::new(SESSION_CACHE_SIZE)))
        .clone()
}

/// Drop every cached TLS 1.2 session and TLS 1.3 ticket for `host`.
///
/// Sessions are keyed by server name only; `port` is carried for diagnostics.
pub fn invalidate_session(host: &str, port: u16) {
    let Ok(name) = ServerName::try_from(host.to_string()) else {
        debug!(host, port, "Not a valid TLS server name, nothing to invalidate");
        return;
    };

    let cache = session_cache();
    cache.remove_tls12_session(&name);
    let mut tickets = 0usize;
    while cache.take_tls13_ticket(&name).is_some() {
        tickets += 1;
    }
    debug!(host, port, tickets, "Invalidated cached TLS sessions");
}

/// Install the named crypto provider as the process default, once.
///
/// Only `ring` is compiled in; other names fall back to it. Failures are
/// logged, never returned.
pub fn ensure_provider_registered(name: &str) -> Arc<CryptoProvider> {
    if !name.eq_ignore_ascii_case("ring") {
        warn!(provider = name, "Security provider not available, using ring");
    }

    if let Some(provider) = CryptoProvider::get_default() {
        return provider.clone();
    }

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A crypto provider was already installed for this process");
    }

    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()))
}

/// Read every `CERTIFICATE` block of a PEM bundle as DER.
pub fn read_certificates(path: &Path) -> DirectoryResult<Vec<Vec<u8>>> {
    let bytes = std::fs::read(path).map_err(|e| {
        DirectoryError::certificate_with_source(
            format!("cannot read certificate bundle {}", path.display()),
            e,
        )
    })?;

    let blocks = pem::parse_many(&bytes).map_err(|e| {
        DirectoryError::certificate_with_source(
            format!("invalid PEM in {}", path.display()),
            e,
        )
    })?;

    let certificates: Vec<Vec<u8>> = blocks
        .into_iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .map(pem::Pem::into_contents)
        .collect();

    if certificates.is_empty() {
        return Err(DirectoryError::certificate(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certificates)
}

/// Reject a bundle holding any certificate with a critical extension this
/// client does not understand. Returns the number of certificates checked.
pub fn validate_certificates(path: impl AsRef<Path>) -> DirectoryResult<usize> {
    let path = path.as_ref();
    let certificates = read_certificates(path)?;

    for der in &certificates {
        let (_, cert) = X509Certificate::from_der(der).map_err(|e| {
            DirectoryError::certificate(format!(
                "cannot decode certificate in {}: {e}",
                path.display()
            ))
        })?;

        let unsupported = cert.extensions().iter().find(|ext| {
            ext.critical
                && matches!(
                    ext.parsed_extension(),
                    ParsedExtension::UnsupportedExtension { .. }
                        | ParsedExtension::ParseError { .. }
                )
        });
        if let Some(ext) = unsupported {
            return Err(DirectoryError::certificate(format!(
                "certificate '{}' carries unsupported critical extension {}",
                cert.subject(),
                ext.oid
            )));
        }
    }

    debug!(
        path = %path.display(),
        count = certificates.len(),
        "Certificate bundle validated"
    );
    Ok(certificates.len())
}

/// Build the client configuration for a verifying LDAPS connection.
///
/// Trusts the bundled web PKI roots plus the optional CA bundle, and resumes
/// sessions through the process-wide cache.
pub fn client_config(
    provider: Arc<CryptoProvider>,
    ca_cert_path: Option<&Path>,
) -> DirectoryResult<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = ca_cert_path {
        for der in read_certificates(path)? {
            roots.add(CertificateDer::from(der)).map_err(|e| {
                DirectoryError::certificate_with_source(
                    format!("failed to add CA certificate from {}", path.display()),
                    e,
                )
            })?;
        }
    }

    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| DirectoryError::certificate_with_source("TLS client config error", e))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.resumption = Resumption::store(session_cache());

    Ok(Arc::new(config))
}
