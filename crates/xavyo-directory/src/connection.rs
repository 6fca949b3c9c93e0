//! Connection lifecycle
//!
//! [`ConnectionManager`] derives the transport [`Environment`] from the
//! endpoint configuration and the schema map, and owns at most one cached
//! [`Session`]. Short-lived work runs through [`ConnectionManager::scoped`],
//! which releases its session on every exit path.

use std::path::Path;

use ldap3::controls::RawControl;
use tracing::{debug, instrument, warn};

use crate::attribute::AttributeSet;
use crate::config::{Endpoint, EndpointConfig, FailoverList};
use crate::environment::{self, Environment, LDAP_VERSION, SECURITY_PROTOCOL_SSL};
use crate::error::{DirectoryError, DirectoryResult};
use crate::name::DistinguishedName;
use crate::schema::SchemaMap;
use crate::tls;
use crate::transport::{
    DirectoryTransport, LdapTransportFactory, Modification, SearchRequest, SearchResponse,
    TransportFactory,
};

/// An open directory session bound to a context DN.
///
/// Names passed to the session are resolved against its context unless they
/// already end with it. The session closes itself when dropped.
pub struct Session<T: DirectoryTransport> {
    transport: Option<T>,
    context: String,
}

impl<T: DirectoryTransport> Session<T> {
    pub fn new(transport: T, context: impl Into<String>) -> Self {
        Self {
            transport: Some(transport),
            context: context.into(),
        }
    }

    /// Distinguished name of the session context.
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Absolute form of `name` within this session's context.
    pub fn resolve(&self, name: &str) -> String {
        let name = name.trim();
        if self.context.is_empty() {
            return name.to_string();
        }
        if name.is_empty() {
            return self.context.clone();
        }
        if ends_with_context(name, &self.context) {
            name.to_string()
        } else {
            format!("{name},{}", self.context)
        }
    }

    fn transport(&mut self) -> DirectoryResult<&mut T> {
        self.transport
            .as_mut()
            .ok_or_else(|| DirectoryError::connection_failed("session is closed"))
    }

    pub fn search(&mut self, mut request: SearchRequest) -> DirectoryResult<SearchResponse> {
        request.base = self.resolve(&request.base);
        self.transport()?.search(&request)
    }

    pub fn add(&mut self, name: &str, attributes: &AttributeSet) -> DirectoryResult<()> {
        let dn = self.resolve(name);
        self.transport()?.add(&dn, attributes)
    }

    pub fn delete(&mut self, name: &str, controls: &[RawControl]) -> DirectoryResult<()> {
        let dn = self.resolve(name);
        self.transport()?.delete(&dn, controls)
    }

    pub fn modify(&mut self, name: &str, modifications: &[Modification]) -> DirectoryResult<()> {
        let dn = self.resolve(name);
        self.transport()?.modify(&dn, modifications)
    }

    /// Rename `old_name` to `new_name`; a different parent moves the entry.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> DirectoryResult<()> {
        let old_dn = self.resolve(old_name);
        let new_dn = self.resolve(new_name);

        let old = DistinguishedName::parse(&old_dn)?;
        let new = DistinguishedName::parse(&new_dn)?;
        let leaf = new
            .leaf()
            .ok_or_else(|| DirectoryError::malformed_name(new_name, "empty target name"))?
            .to_string();
        let new_parent = new.parent();
        let superior = (new_parent != old.parent()).then(|| new_parent.compose());

        self.transport()?
            .rename(&old_dn, &leaf, superior.as_deref())
    }

    /// Close the session. Closing twice is a no-op.
    pub fn close(&mut self) -> DirectoryResult<()> {
        match self.transport.take() {
            Some(mut transport) => transport.close(),
            None => Ok(()),
        }
    }
}

impl<T: DirectoryTransport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(context = %self.context, error = %e, "Failed to close directory session");
        }
    }
}

impl<T: DirectoryTransport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("context", &self.context)
            .field("open", &self.is_open())
            .finish()
    }
}

/// True if `name` equals `context` or ends with it at a component boundary.
fn ends_with_context(name: &str, context: &str) -> bool {
    let name = name.to_lowercase();
    let context = context.to_lowercase();
    name == context || name.ends_with(&format!(",{context}"))
}

/// The part of `name` in front of `context`, if `name` ends with `context`
/// at a component boundary. Offsets are taken on `name` itself.
fn strip_context<'n>(name: &'n str, context: &str) -> Option<&'n str> {
    let name = name.trim();
    let split = name.len().checked_sub(context.len())?;
    let suffix = name.get(split..)?;
    if suffix.to_lowercase() != context.to_lowercase() {
        return None;
    }
    let prefix = name[..split].trim_end();
    if prefix.is_empty() {
        return Some("");
    }
    prefix.strip_suffix(',').map(str::trim_end)
}

/// Builds environments and manages the session of one directory resource.
pub struct ConnectionManager<F: TransportFactory = LdapTransportFactory> {
    endpoint: EndpointConfig,
    schema: SchemaMap,
    factory: F,
    session: Option<Session<F::Transport>>,
}

impl ConnectionManager<LdapTransportFactory> {
    /// Create a manager connecting over `ldap3`.
    pub fn new(endpoint: EndpointConfig, schema: SchemaMap) -> DirectoryResult<Self> {
        Self::with_factory(endpoint, schema, LdapTransportFactory)
    }
}

impl<F: TransportFactory> ConnectionManager<F> {
    /// Create a manager over a custom transport factory.
    pub fn with_factory(
        endpoint: EndpointConfig,
        schema: SchemaMap,
        factory: F,
    ) -> DirectoryResult<Self> {
        endpoint.validate()?;
        schema.validate()?;
        Ok(Self {
            endpoint,
            schema,
            factory,
            session: None,
        })
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    pub fn schema(&self) -> &SchemaMap {
        &self.schema
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Primary endpoint, configured failover, then the schema's failover
    /// servers. Schema servers use the configured protocol.
    pub fn endpoints(&self) -> FailoverList {
        let protocol = self.endpoint.protocol();
        let alternates = self
            .schema
            .merge_failover(&self.endpoint.failover)
            .into_iter()
            .map(|endpoint| Endpoint {
                protocol,
                ..endpoint
            });
        FailoverList::new(self.endpoint.primary(), alternates)
    }

    /// Service URLs in failover order, each `protocol://host:port/`.
    pub fn service_urls(&self) -> Vec<String> {
        self.endpoints().urls()
    }

    /// Primary service URL with the encoded, denormalized context path.
    pub fn context_url(&self, path: &str) -> DirectoryResult<String> {
        let encoded = self.encode_path(&self.denormalize(path))?;
        Ok(format!("{}{encoded}", self.endpoint.primary().url()))
    }

    fn encode_path(&self, path: &str) -> DirectoryResult<String> {
        let encoding = self.schema.url_encoding();
        if !(encoding.eq_ignore_ascii_case("UTF-8") || encoding.eq_ignore_ascii_case("UTF8")) {
            return Err(DirectoryError::EncodingNotSupported {
                encoding: encoding.to_string(),
            });
        }
        Ok(urlencoding::encode(path).into_owned())
    }

    /// Derive the transport environment for a context path.
    ///
    /// For secure sockets this also checks the CA bundle for unsupported
    /// critical extensions, drops cached TLS sessions for every endpoint and
    /// makes sure the crypto provider is installed.
    pub fn build_environment(&self, path: &str, pooling: bool) -> DirectoryResult<Environment> {
        let context = self.denormalize(path);
        self.environment(context, pooling)
    }

    fn environment(&self, context: String, pooling: bool) -> DirectoryResult<Environment> {
        let endpoints = self.endpoints();
        let encoded = self.encode_path(&context)?;

        let mut environment = Environment {
            context_factory: self.schema.context_factory().to_string(),
            provider_url: environment::provider_url(&endpoints.urls(), &encoded),
            endpoints: endpoints.endpoints().to_vec(),
            context,
            principal: self.endpoint.principal.clone(),
            credential: self.endpoint.credential.clone(),
            protocol_version: LDAP_VERSION,
            connect_timeout: self.schema.connection_timeout(),
            read_timeout: self.schema.response_timeout(),
            binary_attributes: self.schema.binary_attributes().to_vec(),
            pooling,
            security_protocol: None,
            tls: None,
            verify_certificate: self.endpoint.tls.verify_certificate,
        };

        if self.endpoint.secure_socket {
            let ca_path = self.endpoint.tls.ca_cert_path.as_deref().map(Path::new);
            if let Some(path) = ca_path {
                tls::validate_certificates(path)?;
            }
            self.endpoint.tls.validate_security();
            environment.security_protocol = Some(SECURITY_PROTOCOL_SSL.to_string());
            for endpoint in endpoints.endpoints() {
                tls::invalidate_session(&endpoint.host, endpoint.port);
            }
            let provider = tls::ensure_provider_registered(self.schema.security_provider());
            if environment.verify_certificate {
                environment.tls = Some(tls::client_config(provider, ca_path)?);
            }
        }

        Ok(environment)
    }

    /// Open a session for `path`, or return the one already open.
    #[instrument(skip(self))]
    pub fn connect(&mut self, path: &str) -> DirectoryResult<&mut Session<F::Transport>> {
        if self.session.is_none() {
            let session = self.open(path, true)?;
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| DirectoryError::invalid_configuration("no directory session is open"))
    }

    /// Open an uncached session against the root DSE.
    #[instrument(skip(self))]
    pub fn connect_root_dse(&self) -> DirectoryResult<Session<F::Transport>> {
        let environment = self.environment(String::new(), false)?;
        let transport = self.factory.open(&environment)?;
        Ok(Session::new(transport, String::new()))
    }

    fn open(&self, path: &str, pooling: bool) -> DirectoryResult<Session<F::Transport>> {
        let environment = self.build_environment(path, pooling)?;
        debug!(provider_url = %environment.provider_url, "Opening directory session");
        let transport = self.factory.open(&environment)?;
        Ok(Session::new(transport, environment.context))
    }

    /// Close the cached session, if any. Failures are logged, never returned.
    pub fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                warn!(
                    context = %session.context(),
                    error = %e,
                    "Failed to close directory session"
                );
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_open)
    }

    /// The cached session.
    pub fn session(&mut self) -> DirectoryResult<&mut Session<F::Transport>> {
        self.session.as_mut().ok_or_else(|| {
            DirectoryError::invalid_configuration(
                "no directory session is open; call connect first",
            )
        })
    }

    /// Run `op` in a fresh session for `path` and close it afterwards,
    /// whatever the outcome.
    pub fn scoped<R>(
        &self,
        path: &str,
        op: impl FnOnce(&mut Session<F::Transport>) -> DirectoryResult<R>,
    ) -> DirectoryResult<R> {
        let mut session = self.open(path, true)?;
        let result = op(&mut session);
        if let Err(e) = session.close() {
            warn!(context = %session.context(), error = %e, "Failed to close directory session");
        }
        result
    }

    /// Run `op` against the root DSE and close the session afterwards.
    pub fn scoped_root_dse<R>(
        &self,
        op: impl FnOnce(&mut Session<F::Transport>) -> DirectoryResult<R>,
    ) -> DirectoryResult<R> {
        let mut session = self.connect_root_dse()?;
        let result = op(&mut session);
        if let Err(e) = session.close() {
            warn!(error = %e, "Failed to close root DSE session");
        }
        result
    }

    /// Full distinguished name of a context path.
    ///
    /// The empty path is the root context; in relative mode a path is placed
    /// below the root context unless it already ends with it.
    pub fn denormalize(&self, path: &str) -> String {
        let path = path.trim();
        let root = self.endpoint.root_context.as_str();
        if path.is_empty() {
            root.to_string()
        } else if self.endpoint.is_relative() && !ends_with_context(path, root) {
            format!("{path},{root}")
        } else {
            path.to_string()
        }
    }

    /// Strip the root context from a distinguished name in relative mode.
    ///
    /// The result is lower-cased unless names are case-sensitive.
    pub fn normalize(&self, dn: &str) -> String {
        let case_sensitive = self.schema.distinguished_name_case_sensitive();
        let fold = |s: &str| {
            if case_sensitive {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        };

        if !self.endpoint.is_relative() {
            return fold(dn);
        }

        match strip_context(dn, &self.endpoint.root_context) {
            Some(relative) => fold(relative),
            None => dn.to_string(),
        }
    }
}

impl<F: TransportFactory> Drop for ConnectionManager<F> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<F: TransportFactory> std::fmt::Debug for ConnectionManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.is_connected())
            .finish()
    }
}
