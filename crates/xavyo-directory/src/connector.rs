//! Directory connector facade

use std::fmt;

use crate::config::EndpointConfig;
use crate::connection::{ConnectionManager, Session};
use crate::control::ControlRegistry;
use crate::error::DirectoryResult;
use crate::mutate::EntryMutator;
use crate::schema::SchemaMap;
use crate::search::SearchEngine;
use crate::transport::{LdapTransportFactory, TransportFactory};

/// One directory resource: its connection, schema map and control table.
///
/// Searches and mutations borrow the connector mutably, so one instance
/// serves one logical user at a time.
pub struct DirectoryConnector<F: TransportFactory = LdapTransportFactory> {
    connection: ConnectionManager<F>,
    controls: ControlRegistry,
}

impl DirectoryConnector<LdapTransportFactory> {
    /// Create a connector over `ldap3`.
    pub fn new(endpoint: EndpointConfig, schema: SchemaMap) -> DirectoryResult<Self> {
        Ok(Self::from_manager(ConnectionManager::new(endpoint, schema)?))
    }
}

impl<F: TransportFactory> DirectoryConnector<F> {
    /// Create a connector over a custom transport factory.
    pub fn with_factory(
        endpoint: EndpointConfig,
        schema: SchemaMap,
        factory: F,
    ) -> DirectoryResult<Self> {
        Ok(Self::from_manager(ConnectionManager::with_factory(
            endpoint, schema, factory,
        )?))
    }

    pub fn from_manager(connection: ConnectionManager<F>) -> Self {
        Self {
            connection,
            controls: ControlRegistry::with_defaults(),
        }
    }

    pub fn connection(&self) -> &ConnectionManager<F> {
        &self.connection
    }

    pub fn schema(&self) -> &SchemaMap {
        self.connection.schema()
    }

    pub fn controls(&self) -> &ControlRegistry {
        &self.controls
    }

    /// Control table used to decode response controls.
    pub fn controls_mut(&mut self) -> &mut ControlRegistry {
        &mut self.controls
    }

    /// Open (or reuse) the session mutations run against.
    pub fn connect(&mut self, path: &str) -> DirectoryResult<&mut Session<F::Transport>> {
        self.connection.connect(path)
    }

    pub fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn search(&mut self) -> SearchEngine<'_, F> {
        SearchEngine::new(&mut self.connection, &self.controls)
    }

    pub fn mutate(&mut self) -> EntryMutator<'_, F> {
        EntryMutator::new(&mut self.connection, &self.controls)
    }

    pub fn normalize(&self, dn: &str) -> String {
        self.connection.normalize(dn)
    }

    pub fn denormalize(&self, path: &str) -> String {
        self.connection.denormalize(path)
    }

    pub fn service_urls(&self) -> Vec<String> {
        self.connection.service_urls()
    }
}

impl<F: TransportFactory> fmt::Debug for DirectoryConnector<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConnector")
            .field("connection", &self.connection)
            .field("controls", &self.controls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_credentials() {
        let endpoint = EndpointConfig::new("ldap.example.com", "dc=example,dc=com")
            .with_credentials("cn=admin,dc=example,dc=com", "hunter2");
        let connector = DirectoryConnector::new(endpoint, SchemaMap::new()).unwrap();
        let debug = format!("{connector:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***REDACTED***"));
        assert!(!connector.is_connected());
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let endpoint = EndpointConfig::new("", "dc=example,dc=com");
        assert!(DirectoryConnector::new(endpoint, SchemaMap::new()).is_err());
    }

    #[test]
    fn test_service_urls() {
        let endpoint = EndpointConfig::new("host1", "dc=example,dc=com").with_failover("host2", 389);
        let connector = DirectoryConnector::new(endpoint, SchemaMap::new()).unwrap();
        assert_eq!(
            connector.service_urls(),
            vec!["ldap://host1:389/", "ldap://host2:389/"]
        );
    }
}
