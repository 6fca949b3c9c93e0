//! Directory endpoint configuration
//!
//! Host, credentials, addressing mode and TLS settings for one logical
//! directory resource.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DirectoryError, DirectoryResult};

/// URL scheme of a directory endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Ldap,
    Ldaps,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Ldap => "ldap",
            Protocol::Ldaps => "ldaps",
        }
    }

    /// Well-known port for the scheme.
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Ldap => 389,
            Protocol::Ldaps => 636,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// A directory service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    #[serde(default = "default_ldap_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

impl Endpoint {
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
        }
    }

    /// Service URL in the form `protocol://host:port/`.
    pub fn url(&self) -> String {
        format!("{}://{}:{}/", self.protocol, self.host, self.port)
    }
}

/// Ordered, non-empty list of endpoints. The first entry is the primary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailoverList {
    endpoints: Vec<Endpoint>,
}

impl FailoverList {
    /// Create a list from a primary endpoint and its alternates, keeping order.
    pub fn new(primary: Endpoint, alternates: impl IntoIterator<Item = Endpoint>) -> Self {
        let mut endpoints = vec![primary];
        endpoints.extend(alternates);
        Self { endpoints }
    }

    pub fn primary(&self) -> &Endpoint {
        &self.endpoints[0]
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always false; a failover list holds at least the primary.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Service URLs, primary first.
    pub fn urls(&self) -> Vec<String> {
        self.endpoints.iter().map(Endpoint::url).collect()
    }
}

/// TLS settings for secure-socket connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Whether to verify the server certificate.
    #[serde(default = "default_true")]
    pub verify_certificate: bool,

    /// PEM bundle of trusted CA certificates. Also the bundle checked for
    /// unsupported critical extensions before connecting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify_certificate: true,
            ca_cert_path: None,
        }
    }
}

impl TlsConfig {
    /// Log security warnings for insecure settings.
    pub fn validate_security(&self) {
        if !self.verify_certificate {
            warn!(
                target: "security",
                "SECURITY WARNING: directory TLS certificate verification is DISABLED. \
                 This should ONLY be used for local development."
            );
        }
    }
}

/// Configuration for one directory endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Directory server hostname or IP address.
    pub host: String,

    /// Directory server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Connect over SSL (LDAPS).
    #[serde(default)]
    pub secure_socket: bool,

    /// Root context all relative names are resolved against (e.g. "dc=example,dc=com").
    #[serde(default)]
    pub root_context: String,

    /// Whether callers address entries relative to `root_context`.
    #[serde(default)]
    pub relative_dn: bool,

    /// Bind principal (e.g. "cn=admin,dc=example,dc=com").
    #[serde(default)]
    pub principal: String,

    /// Bind credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,

    /// Alternate endpoints tried in order when the primary is unreachable.
    #[serde(default)]
    pub failover: Vec<Endpoint>,

    /// TLS configuration.
    #[serde(default)]
    pub tls: TlsConfig,
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure_socket", &self.secure_socket)
            .field("root_context", &self.root_context)
            .field("relative_dn", &self.relative_dn)
            .field("principal", &self.principal)
            .field(
                "credential",
                &self.credential.as_ref().map(|_| "***REDACTED***"),
            )
            .field("failover", &self.failover)
            .field("tls", &self.tls)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    Protocol::Ldap.default_port()
}

impl EndpointConfig {
    /// Create a new endpoint config with required fields.
    pub fn new(host: impl Into<String>, root_context: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            secure_socket: false,
            root_context: root_context.into(),
            relative_dn: false,
            principal: String::new(),
            credential: None,
            failover: Vec::new(),
            tls: TlsConfig::default(),
        }
    }

    /// Set bind principal and credential.
    #[must_use]
    pub fn with_credentials(
        mut self,
        principal: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        self.principal = principal.into();
        self.credential = Some(credential.into());
        self
    }

    /// Enable SSL (LDAPS).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.secure_socket = true;
        self.port = Protocol::Ldaps.default_port();
        self
    }

    /// Set the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Address entries relative to the root context.
    #[must_use]
    pub fn with_relative_dn(mut self, relative: bool) -> Self {
        self.relative_dn = relative;
        self
    }

    /// Append a failover endpoint.
    #[must_use]
    pub fn with_failover(mut self, host: impl Into<String>, port: u16) -> Self {
        let protocol = self.protocol();
        self.failover.push(Endpoint::new(protocol, host, port));
        self
    }

    /// Set the CA bundle used for trust and the critical-extension check.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<String>) -> Self {
        self.tls.ca_cert_path = Some(path.into());
        self
    }

    /// Scheme implied by the secure-socket flag.
    pub fn protocol(&self) -> Protocol {
        if self.secure_socket {
            Protocol::Ldaps
        } else {
            Protocol::Ldap
        }
    }

    /// The primary endpoint.
    pub fn primary(&self) -> Endpoint {
        Endpoint::new(self.protocol(), self.host.clone(), self.port)
    }

    /// Relative addressing only applies when a root context is configured.
    pub fn is_relative(&self) -> bool {
        self.relative_dn && !self.root_context.is_empty()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.host.trim().is_empty() {
            return Err(DirectoryError::invalid_configuration("host is required"));
        }

        if self.port == 0 {
            return Err(DirectoryError::invalid_configuration(
                "port must be greater than zero",
            ));
        }

        if self.credential.is_some() && self.principal.is_empty() {
            return Err(DirectoryError::invalid_configuration(
                "principal is required when a credential is configured",
            ));
        }

        if let Some(endpoint) = self.failover.iter().find(|e| e.host.trim().is_empty()) {
            return Err(DirectoryError::invalid_configuration(format!(
                "failover endpoint on port {} has no host",
                endpoint.port
            )));
        }

        if self.secure_socket {
            self.tls.validate_security();
        }

        Ok(())
    }
}
