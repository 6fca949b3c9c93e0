//! Transport environment
//!
//! Everything a [`TransportFactory`](crate::transport::TransportFactory) needs
//! to open one directory session.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;

use crate::config::Endpoint;

pub const LDAP_VERSION: u8 = 3;

/// Security protocol marker set on secure-socket environments.
pub const SECURITY_PROTOCOL_SSL: &str = "ssl";

const REDACTED: &str = "******";

/// Parameters for opening a session, derived from the endpoint
/// configuration and the schema map.
#[derive(Clone)]
pub struct Environment {
    /// Name of the transport implementation.
    pub context_factory: String,
    /// Space-separated service URLs, each followed by the encoded context path.
    pub provider_url: String,
    /// Endpoints in failover order, primary first.
    pub endpoints: Vec<Endpoint>,
    /// Distinguished name of the session context; empty for the root DSE.
    pub context: String,
    pub principal: String,
    pub credential: Option<String>,
    pub protocol_version: u8,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Attributes whose values are always surfaced as binary.
    pub binary_attributes: Vec<String>,
    pub pooling: bool,
    /// `Some("ssl")` for secure-socket connections.
    pub security_protocol: Option<String>,
    /// Client configuration for verifying TLS connections.
    pub tls: Option<Arc<ClientConfig>>,
    pub verify_certificate: bool,
}

impl Environment {
    /// Service URLs in failover order.
    pub fn service_urls(&self) -> Vec<String> {
        self.endpoints.iter().map(Endpoint::url).collect()
    }

    pub fn is_secure(&self) -> bool {
        self.security_protocol.is_some()
    }

    pub fn is_binary(&self, attribute: &str) -> bool {
        self.binary_attributes
            .iter()
            .any(|name| name.eq_ignore_ascii_case(attribute))
    }

    /// The environment as a flat property map with the credential masked.
    pub fn properties(&self) -> BTreeMap<&'static str, String> {
        let mut properties = BTreeMap::new();
        properties.insert("context-factory", self.context_factory.clone());
        properties.insert("provider-url", self.provider_url.clone());
        properties.insert("ldap-version", self.protocol_version.to_string());
        properties.insert(
            "connect-timeout",
            self.connect_timeout.as_millis().to_string(),
        );
        properties.insert("read-timeout", self.read_timeout.as_millis().to_string());
        properties.insert("connection-pooling", self.pooling.to_string());
        if !self.principal.is_empty() {
            properties.insert("security-principal", self.principal.clone());
        }
        if self.credential.is_some() {
            properties.insert("security-credentials", REDACTED.to_string());
        }
        if !self.binary_attributes.is_empty() {
            properties.insert("binary-attributes", self.binary_attributes.join(" "));
        }
        if let Some(protocol) = &self.security_protocol {
            properties.insert("security-protocol", protocol.clone());
        }
        properties
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("context_factory", &self.context_factory)
            .field("provider_url", &self.provider_url)
            .field("context", &self.context)
            .field("principal", &self.principal)
            .field("credential", &self.credential.as_ref().map(|_| REDACTED))
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("binary_attributes", &self.binary_attributes)
            .field("pooling", &self.pooling)
            .field("security_protocol", &self.security_protocol)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

/// Append an encoded context path to each service URL and join them with spaces.
pub fn provider_url(service_urls: &[String], encoded_path: &str) -> String {
    service_urls
        .iter()
        .map(|url| format!("{url}{encoded_path}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;

    fn environment() -> Environment {
        Environment {
            context_factory: "ldap3".to_string(),
            provider_url: "ldap://host1:389/dc%3Dexample ldap://host2:389/dc%3Dexample"
                .to_string(),
            endpoints: vec![
                Endpoint::new(Protocol::Ldap, "host1", 389),
                Endpoint::new(Protocol::Ldap, "host2", 389),
            ],
            context: "dc=example".to_string(),
            principal: "cn=admin,dc=example".to_string(),
            credential: Some("hunter2".to_string()),
            protocol_version: LDAP_VERSION,
            connect_timeout: Duration::from_millis(3000),
            read_timeout: Duration::from_millis(10000),
            binary_attributes: vec!["objectGUID".to_string(), "jpegPhoto".to_string()],
            pooling: true,
            security_protocol: None,
            tls: None,
            verify_certificate: true,
        }
    }

    #[test]
    fn test_properties_redact_credentials() {
        let properties = environment().properties();
        assert_eq!(properties["security-credentials"], "******");
        assert_eq!(properties["ldap-version"], "3");
        assert_eq!(properties["connect-timeout"], "3000");
        assert_eq!(properties["read-timeout"], "10000");
        assert_eq!(properties["binary-attributes"], "objectGUID jpegPhoto");
        assert_eq!(properties["connection-pooling"], "true");
        assert!(!properties.contains_key("security-protocol"));
        assert!(!properties.values().any(|v| v.contains("hunter2")));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let debug = format!("{:?}", environment());
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_service_urls_keep_order() {
        assert_eq!(
            environment().service_urls(),
            vec!["ldap://host1:389/", "ldap://host2:389/"]
        );
    }

    #[test]
    fn test_provider_url() {
        let urls = vec!["ldap://a:389/".to_string(), "ldap://b:389/".to_string()];
        assert_eq!(
            provider_url(&urls, "ou%3DPeople"),
            "ldap://a:389/ou%3DPeople ldap://b:389/ou%3DPeople"
        );
        assert_eq!(provider_url(&urls[..1], ""), "ldap://a:389/");
    }

    #[test]
    fn test_binary_lookup_is_case_insensitive() {
        assert!(environment().is_binary("OBJECTGUID"));
        assert!(!environment().is_binary("cn"));
    }
}
