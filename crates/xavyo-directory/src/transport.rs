//! Directory transport
//!
//! [`DirectoryTransport`] is the seam between the session logic and the wire.
//! [`LdapTransportFactory`] implements it over the blocking `ldap3` client;
//! tests substitute an in-memory directory.

use std::collections::HashSet;
use std::net::ToSocketAddrs;

use ldap3::controls::{Control as LdapControl, RawControl};
use ldap3::{LdapConn, LdapConnSettings, LdapError, LdapResult, Mod, SearchEntry, SearchResult};
use tracing::{debug, info, instrument, warn};

use crate::attribute::{AttributeSet, AttributeValue, DirectoryEntry};
use crate::config::Endpoint;
use crate::environment::Environment;
use crate::error::{DirectoryError, DirectoryResult};
use crate::search::Scope;

/// One search request as sent on the wire. `base` is absolute.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base: String,
    pub scope: Scope,
    pub filter: String,
    /// Attributes to return; empty means all user attributes.
    pub attributes: Vec<String>,
    pub controls: Vec<RawControl>,
}

impl SearchRequest {
    pub fn new(base: impl Into<String>, scope: Scope, filter: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            scope,
            filter: filter.into(),
            attributes: Vec::new(),
            controls: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes = attributes.iter().map(|a| (*a).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_control(mut self, control: RawControl) -> Self {
        self.controls.push(control);
        self
    }
}

/// Materialized search results and the response controls.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub entries: Vec<DirectoryEntry>,
    pub controls: Vec<RawControl>,
}

/// A single attribute change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    Add(String, Vec<AttributeValue>),
    /// Replace all values; no values removes the attribute.
    Replace(String, Vec<AttributeValue>),
    /// Remove the listed values; no values removes the attribute.
    Delete(String, Vec<AttributeValue>),
}

impl Modification {
    pub fn attribute(&self) -> &str {
        match self {
            Modification::Add(name, _)
            | Modification::Replace(name, _)
            | Modification::Delete(name, _) => name,
        }
    }

    pub fn values(&self) -> &[AttributeValue] {
        match self {
            Modification::Add(_, values)
            | Modification::Replace(_, values)
            | Modification::Delete(_, values) => values,
        }
    }
}

/// An open directory connection. All names are absolute.
pub trait DirectoryTransport {
    fn search(&mut self, request: &SearchRequest) -> DirectoryResult<SearchResponse>;

    fn add(&mut self, dn: &str, attributes: &AttributeSet) -> DirectoryResult<()>;

    fn delete(&mut self, dn: &str, controls: &[RawControl]) -> DirectoryResult<()>;

    fn modify(&mut self, dn: &str, modifications: &[Modification]) -> DirectoryResult<()>;

    /// Rename `dn` to `new_rdn`, moving it below `new_superior` if given.
    fn rename(&mut self, dn: &str, new_rdn: &str, new_superior: Option<&str>)
        -> DirectoryResult<()>;

    /// Release the connection. Calling it twice is harmless.
    fn close(&mut self) -> DirectoryResult<()>;
}

/// Opens transports from an [`Environment`].
pub trait TransportFactory {
    type Transport: DirectoryTransport;

    fn open(&self, environment: &Environment) -> DirectoryResult<Self::Transport>;
}

/// Transport factory over the blocking `ldap3` client.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapTransportFactory;

impl TransportFactory for LdapTransportFactory {
    type Transport = LdapTransport;

    /// Try each endpoint in order and bind on the first that answers.
    #[instrument(skip(self, environment), fields(context = %environment.context))]
    fn open(&self, environment: &Environment) -> DirectoryResult<LdapTransport> {
        let mut last_error = None;

        for endpoint in &environment.endpoints {
            let url = endpoint.url();
            debug!(url = %url, "Connecting to directory server");

            match LdapConn::with_settings(settings(environment), &url) {
                Ok(mut conn) => {
                    bind(&mut conn, environment)?;
                    info!(url = %url, "Directory connection established");
                    return Ok(LdapTransport {
                        conn,
                        url,
                        environment: environment.clone(),
                        closed: false,
                    });
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Directory endpoint unreachable, trying next");
                    last_error = Some(unreachable(endpoint, e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DirectoryError::invalid_configuration("no directory endpoint configured")
        }))
    }
}

fn settings(environment: &Environment) -> LdapConnSettings {
    let settings = LdapConnSettings::new().set_conn_timeout(environment.connect_timeout);
    match &environment.tls {
        Some(config) => settings.set_config(config.clone()),
        None if environment.is_secure() && !environment.verify_certificate => {
            settings.set_no_tls_verify(true)
        }
        None => settings,
    }
}

fn unreachable(endpoint: &Endpoint, error: LdapError) -> DirectoryError {
    let resolvable = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map(|mut addrs| addrs.next().is_some())
        .unwrap_or(false);
    if resolvable {
        DirectoryError::connection_failed_with_source(
            format!("failed to connect to directory server at {}", endpoint.url()),
            error,
        )
    } else {
        DirectoryError::UnknownHost {
            host: endpoint.host.clone(),
        }
    }
}

fn bind(conn: &mut LdapConn, environment: &Environment) -> DirectoryResult<()> {
    let Some(credential) = &environment.credential else {
        debug!("No credential configured, using anonymous bind");
        return Ok(());
    };

    debug!(principal = %environment.principal, "Performing directory bind");
    let result = conn
        .with_timeout(environment.read_timeout)
        .simple_bind(&environment.principal, credential)
        .map_err(|e| {
            DirectoryError::connection_failed_with_source(
                format!("bind failed for {}", environment.principal),
                e,
            )
        })?;
    check(result, &environment.principal).map(|_| ())
}

fn check(result: LdapResult, identifier: &str) -> DirectoryResult<LdapResult> {
    if result.rc == 0 {
        Ok(result)
    } else {
        Err(DirectoryError::from_result_code(
            result.rc,
            &result.text,
            identifier,
        ))
    }
}

fn wire_error(error: LdapError, operation: &str, identifier: &str) -> DirectoryError {
    match error {
        LdapError::LdapResult { result } => {
            DirectoryError::from_result_code(result.rc, &result.text, identifier)
        }
        e @ (LdapError::Io { .. } | LdapError::Timeout { .. } | LdapError::EndOfStream) => {
            DirectoryError::connection_failed_with_source(
                format!("{operation} of {identifier} lost the directory connection"),
                e,
            )
        }
        e => DirectoryError::operation_failed_with_source(
            format!("{operation} failed for {identifier}"),
            e,
        ),
    }
}

fn value_set(values: &[AttributeValue]) -> HashSet<Vec<u8>> {
    values.iter().map(|v| v.as_bytes().to_vec()).collect()
}

/// A bound `ldap3` connection.
pub struct LdapTransport {
    conn: LdapConn,
    url: String,
    environment: Environment,
    closed: bool,
}

impl LdapTransport {
    /// URL of the endpoint this transport is connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn connection(&mut self) -> DirectoryResult<&mut LdapConn> {
        if self.closed {
            return Err(DirectoryError::connection_failed(format!(
                "connection to {} is closed",
                self.url
            )));
        }
        Ok(self.conn.with_timeout(self.environment.read_timeout))
    }

    fn to_entry(&self, entry: SearchEntry) -> DirectoryEntry {
        let mut attributes = AttributeSet::new();
        for (name, values) in entry.attrs {
            let binary = self.environment.is_binary(&name);
            let values = values
                .into_iter()
                .map(|v| {
                    if binary {
                        AttributeValue::Binary(v.into_bytes())
                    } else {
                        AttributeValue::Text(v)
                    }
                })
                .collect();
            attributes.set_values(name, values);
        }
        for (name, values) in entry.bin_attrs {
            attributes.set_values(name, values.into_iter().map(AttributeValue::Binary).collect());
        }
        DirectoryEntry::new(entry.dn, attributes)
    }
}

impl std::fmt::Debug for LdapTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapTransport")
            .field("url", &self.url)
            .field("closed", &self.closed)
            .finish()
    }
}

impl DirectoryTransport for LdapTransport {
    #[instrument(skip(self, request), fields(base = %request.base, filter = %request.filter))]
    fn search(&mut self, request: &SearchRequest) -> DirectoryResult<SearchResponse> {
        let attributes: Vec<&str> = request.attributes.iter().map(String::as_str).collect();
        let conn = self.connection()?;
        if !request.controls.is_empty() {
            conn.with_controls(request.controls.clone());
        }

        let SearchResult(entries, result) = conn
            .search(&request.base, request.scope.into(), &request.filter, attributes)
            .map_err(|e| wire_error(e, "search", &request.base))?;
        let result = check(result, &request.base)?;

        let entries: Vec<DirectoryEntry> = entries
            .into_iter()
            .map(|raw| self.to_entry(SearchEntry::construct(raw)))
            .collect();
        debug!(count = entries.len(), "Search completed");

        Ok(SearchResponse {
            entries,
            controls: result
                .ctrls
                .into_iter()
                .map(|LdapControl(_, raw)| raw)
                .collect(),
        })
    }

    #[instrument(skip(self, attributes))]
    fn add(&mut self, dn: &str, attributes: &AttributeSet) -> DirectoryResult<()> {
        let attrs: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = attributes
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name.as_bytes().to_vec(), value_set(values)))
            .collect();

        let result = self
            .connection()?
            .add(dn, attrs)
            .map_err(|e| wire_error(e, "add", dn))?;
        check(result, dn)?;
        info!(dn = %dn, "Directory entry created");
        Ok(())
    }

    #[instrument(skip(self, controls))]
    fn delete(&mut self, dn: &str, controls: &[RawControl]) -> DirectoryResult<()> {
        let conn = self.connection()?;
        if !controls.is_empty() {
            conn.with_controls(controls.to_vec());
        }
        let result = conn.delete(dn).map_err(|e| wire_error(e, "delete", dn))?;
        check(result, dn)?;
        info!(dn = %dn, "Directory entry deleted");
        Ok(())
    }

    #[instrument(skip(self, modifications))]
    fn modify(&mut self, dn: &str, modifications: &[Modification]) -> DirectoryResult<()> {
        let mods: Vec<Mod<Vec<u8>>> = modifications
            .iter()
            .map(|m| {
                let name = m.attribute().as_bytes().to_vec();
                let values = value_set(m.values());
                match m {
                    Modification::Add(..) => Mod::Add(name, values),
                    Modification::Replace(..) => Mod::Replace(name, values),
                    Modification::Delete(..) => Mod::Delete(name, values),
                }
            })
            .collect();

        let result = self
            .connection()?
            .modify(dn, mods)
            .map_err(|e| wire_error(e, "modify", dn))?;
        check(result, dn)?;
        debug!(dn = %dn, count = modifications.len(), "Directory entry modified");
        Ok(())
    }

    #[instrument(skip(self))]
    fn rename(
        &mut self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<&str>,
    ) -> DirectoryResult<()> {
        let result = self
            .connection()?
            .modifydn(dn, new_rdn, true, new_superior)
            .map_err(|e| wire_error(e, "rename", dn))?;
        check(result, dn)?;
        info!(dn = %dn, new_rdn = %new_rdn, "Directory entry renamed");
        Ok(())
    }

    fn close(&mut self) -> DirectoryResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.conn.unbind().map_err(|e| {
            DirectoryError::connection_failed_with_source(
                format!("unbind from {} failed", self.url),
                e,
            )
        })?;
        debug!(url = %self.url, "Directory connection closed");
        Ok(())
    }
}
