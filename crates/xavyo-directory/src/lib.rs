//! # Directory Client
//!
//! Schema-agnostic LDAP v3 directory client for xavyo connectors.
//!
//! A [`SchemaMap`] translates generic entity types (account, group, role, ...)
//! into a specific server's object classes and attribute names, so one client
//! drives any directory flavour.
//!
//! ## Features
//!
//! - Distinguished name parsing, composition and escaping
//! - Failover across an ordered endpoint list
//! - LDAPS with TLS session invalidation and CA bundle checks
//! - Relative and absolute addressing against a root context
//! - Simple paged results, server-side sort and tree delete controls
//! - Entry creation, deletion, rename/move and attribute edits
//! - XML schema-mapping documents
//!
//! ## Example
//!
//! ```ignore
//! use xavyo_directory::{DirectoryConnector, EndpointConfig, Scope, SchemaMapLoader};
//!
//! let endpoint = EndpointConfig::new("ldap.example.com", "dc=example,dc=com")
//!     .with_credentials("cn=admin,dc=example,dc=com", "secret")
//!     .with_relative_dn(true)
//!     .with_ssl();
//! let schema = SchemaMapLoader::from_path("feature.xml")?;
//!
//! let mut connector = DirectoryConnector::new(endpoint, schema)?;
//! let dn = connector.search().find_unique("ou=People", "uid", "jdoe")?;
//! ```

pub mod attribute;
pub mod config;
pub mod connection;
pub mod connector;
pub mod control;
pub mod environment;
pub mod error;
pub mod mutate;
pub mod name;
pub mod schema;
pub mod search;
pub mod timestamp;
pub mod tls;
pub mod transport;

// Re-exports
pub use attribute::{AttributeSet, AttributeValue, DirectoryEntry};
pub use config::{Endpoint, EndpointConfig, FailoverList, Protocol, TlsConfig};
pub use connection::{ConnectionManager, Session};
pub use connector::DirectoryConnector;
pub use control::{Control, ControlKind, ControlRegistry, SortKey};
pub use environment::Environment;
pub use error::{DirectoryError, DirectoryResult, ErrorKind};
pub use mutate::{EntryMutator, ModifyOperation};
pub use name::{DistinguishedName, Rdn};
pub use schema::{EntityType, PaginationControl, SchemaMap, SchemaMapLoader};
pub use search::{Scope, SearchEngine, SearchPage};
pub use transport::{
    DirectoryTransport, LdapTransport, LdapTransportFactory, Modification, SearchRequest,
    SearchResponse, TransportFactory,
};
