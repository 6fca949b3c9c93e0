//! Schema mapping
//!
//! Translates generic entity concepts (account, group, role, ...) into the
//! object classes, naming attributes and containers of a specific directory
//! server. A [`SchemaMap`] is built once, either programmatically, from JSON,
//! or by parsing an XML feature document with [`SchemaMapLoader`], and is
//! read-only afterwards.

mod loader;

pub use loader::{SchemaMapLoader, FEATURE_NAMESPACE};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Endpoint;
use crate::error::{DirectoryError, DirectoryResult};
use crate::timestamp;

/// Names of the global schema keys.
pub mod keys {
    pub const URL_ENCODING: &str = "url-encoding";
    pub const CONTEXT_FACTORY: &str = "context-factory";
    pub const SECURITY_PROVIDER: &str = "security-provider";
    pub const CONNECTION_TIMEOUT: &str = "connection-timeout";
    pub const RESPONSE_TIMEOUT: &str = "response-timeout";
    pub const REFERENTIAL_INTEGRITY: &str = "referential-integrity";
    pub const TIMESTAMP_FORMAT: &str = "timestamp-format";
    pub const OBJECT_CLASS_NAME: &str = "object-class-name";
    pub const DISTINGUISHED_NAME_ATTRIBUTE: &str = "distinguished-name-attribute";
    pub const DISTINGUISHED_NAME_CASESENSITIVE: &str = "distinguished-name-casesensitive";
    pub const ENTRY_CREATED_ATTRIBUTE: &str = "entry-created-attribute";
    pub const ENTRY_MODIFIED_ATTRIBUTE: &str = "entry-modified-attribute";
    pub const PASSWORD_OPERATION_SECURED: &str = "password-operation-secured";
    pub const ENTITLEMENT_PREFIX_REQUIRED: &str = "entitlement-prefix-required";
    pub const MULTI_VALUE_SEPARATOR: &str = "multi-value-separator";
    pub const PAGINATION_CONTROL: &str = "pagination-control";
    pub const PAGINATION_CONTROL_CRITICAL: &str = "pagination-control-critical";
    pub const SCHEMA_CONTAINER: &str = "schema-container";
    pub const CATALOG_CONTAINER: &str = "catalog-container";
    pub const CHANGELOG_CONTAINER: &str = "changelog-container";
    pub const CHANGELOG_CHANGE_TYPE: &str = "changelog-changeType";
    pub const CHANGELOG_CHANGE_NUMBER: &str = "changelog-changeNumber";
    pub const CHANGELOG_TARGET_GUID: &str = "changelog-targetGUID";
    pub const CHANGELOG_TARGET_DN: &str = "changelog-targetDN";
    pub const ACCOUNT_CONTAINER: &str = "account-container";
    pub const GROUP_CONTAINER: &str = "group-container";
    pub const ROLE_CONTAINER: &str = "role-container";
    pub const ORGANIZATION_CONTAINER: &str = "organization-container";
    pub const GENERIC_CONTAINER: &str = "generic-container";
    pub const COUNTRY_CONTAINER: &str = "country-container";
    pub const LOCALITY_CONTAINER: &str = "locality-container";
    pub const DOMAIN_CONTAINER: &str = "domain-container";
    pub const ENTERPRISE_DOMAIN_CONTAINER: &str = "enterprise-domain-container";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text,
    /// Non-empty text used to split value lists.
    Separator,
    Millis,
    Flag,
    Pagination,
    TimeFormat,
}

/// Every global key with the syntax its value must satisfy.
const GLOBAL_KEYS: &[(&str, ValueKind)] = &[
    (keys::URL_ENCODING, ValueKind::Text),
    (keys::CONTEXT_FACTORY, ValueKind::Text),
    (keys::SECURITY_PROVIDER, ValueKind::Text),
    (keys::CONNECTION_TIMEOUT, ValueKind::Millis),
    (keys::RESPONSE_TIMEOUT, ValueKind::Millis),
    (keys::REFERENTIAL_INTEGRITY, ValueKind::Flag),
    (keys::TIMESTAMP_FORMAT, ValueKind::TimeFormat),
    (keys::OBJECT_CLASS_NAME, ValueKind::Text),
    (keys::DISTINGUISHED_NAME_ATTRIBUTE, ValueKind::Text),
    (keys::DISTINGUISHED_NAME_CASESENSITIVE, ValueKind::Flag),
    (keys::ENTRY_CREATED_ATTRIBUTE, ValueKind::Text),
    (keys::ENTRY_MODIFIED_ATTRIBUTE, ValueKind::Text),
    (keys::PASSWORD_OPERATION_SECURED, ValueKind::Flag),
    (keys::ENTITLEMENT_PREFIX_REQUIRED, ValueKind::Flag),
    (keys::MULTI_VALUE_SEPARATOR, ValueKind::Separator),
    (keys::PAGINATION_CONTROL, ValueKind::Pagination),
    (keys::PAGINATION_CONTROL_CRITICAL, ValueKind::Flag),
    (keys::SCHEMA_CONTAINER, ValueKind::Text),
    (keys::CATALOG_CONTAINER, ValueKind::Text),
    (keys::CHANGELOG_CONTAINER, ValueKind::Text),
    (keys::CHANGELOG_CHANGE_TYPE, ValueKind::Text),
    (keys::CHANGELOG_CHANGE_NUMBER, ValueKind::Text),
    (keys::CHANGELOG_TARGET_GUID, ValueKind::Text),
    (keys::CHANGELOG_TARGET_DN, ValueKind::Text),
    (keys::ACCOUNT_CONTAINER, ValueKind::Text),
    (keys::GROUP_CONTAINER, ValueKind::Text),
    (keys::ROLE_CONTAINER, ValueKind::Text),
    (keys::ORGANIZATION_CONTAINER, ValueKind::Text),
    (keys::GENERIC_CONTAINER, ValueKind::Text),
    (keys::COUNTRY_CONTAINER, ValueKind::Text),
    (keys::LOCALITY_CONTAINER, ValueKind::Text),
    (keys::DOMAIN_CONTAINER, ValueKind::Text),
    (keys::ENTERPRISE_DOMAIN_CONTAINER, ValueKind::Text),
];

fn value_kind(key: &str) -> Option<ValueKind> {
    GLOBAL_KEYS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, kind)| *kind)
}

/// True if `key` is a known global schema key.
pub fn is_global_key(key: &str) -> bool {
    value_kind(key).is_some()
}

fn parse_flag(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn check_value(key: &str, value: &str) -> DirectoryResult<()> {
    let kind = value_kind(key).ok_or_else(|| {
        DirectoryError::invalid_configuration(format!("unknown schema key '{key}'"))
    })?;
    let valid = match kind {
        ValueKind::Text => true,
        ValueKind::Separator => !value.is_empty(),
        ValueKind::Millis => value.trim().parse::<u64>().is_ok(),
        ValueKind::Flag => parse_flag(value.trim()).is_some(),
        ValueKind::Pagination => value.parse::<PaginationControl>().is_ok(),
        ValueKind::TimeFormat => timestamp::is_valid_format(value),
    };
    if valid {
        Ok(())
    } else {
        Err(DirectoryError::invalid_configuration(format!(
            "invalid value '{value}' for schema key '{key}'"
        )))
    }
}

/// Logical entity types the schema map describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    Account,
    Group,
    Role,
    Organization,
    OrganizationalUnit,
    Country,
    Locality,
    Domain,
    EnterpriseDatabase,
    EnterpriseDomain,
    EnterpriseRole,
    EnterpriseSchema,
}

impl EntityType {
    pub const ALL: [EntityType; 12] = [
        EntityType::Account,
        EntityType::Group,
        EntityType::Role,
        EntityType::Organization,
        EntityType::OrganizationalUnit,
        EntityType::Country,
        EntityType::Locality,
        EntityType::Domain,
        EntityType::EnterpriseDatabase,
        EntityType::EnterpriseDomain,
        EntityType::EnterpriseRole,
        EntityType::EnterpriseSchema,
    ];

    /// Element name in the feature document.
    pub fn element_name(&self) -> &'static str {
        match self {
            EntityType::Account => "account",
            EntityType::Group => "group",
            EntityType::Role => "role",
            EntityType::Organization => "organization",
            EntityType::OrganizationalUnit => "organizationalUnit",
            EntityType::Country => "country",
            EntityType::Locality => "locality",
            EntityType::Domain => "domain",
            EntityType::EnterpriseDatabase => "enterprise-database",
            EntityType::EnterpriseDomain => "enterprise-domain",
            EntityType::EnterpriseRole => "enterprise-role",
            EntityType::EnterpriseSchema => "enterprise-schema",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.element_name() == name)
    }

    pub fn default_object_class(&self) -> Option<&'static str> {
        match self {
            EntityType::Account => Some("inetOrgPerson"),
            EntityType::Group => Some("groupOfUniqueNames"),
            EntityType::Role => None,
            EntityType::Organization => Some("organization"),
            EntityType::OrganizationalUnit => Some("organizationalUnit"),
            EntityType::Country => Some("country"),
            EntityType::Locality => Some("locality"),
            EntityType::Domain => Some("domain"),
            EntityType::EnterpriseDatabase => Some("orclDBServer"),
            EntityType::EnterpriseDomain => Some("orclDBEnterpriseDomain"),
            EntityType::EnterpriseRole => Some("orclDBEnterpriseRole"),
            EntityType::EnterpriseSchema => Some("orclDBEntryLevelMapping"),
        }
    }

    pub fn default_object_prefix(&self) -> Option<&'static str> {
        match self {
            EntityType::Role => None,
            EntityType::Organization => Some("o"),
            EntityType::OrganizationalUnit => Some("ou"),
            EntityType::Country => Some("c"),
            EntityType::Locality => Some("l"),
            EntityType::Domain => Some("dc"),
            _ => Some("cn"),
        }
    }

    pub fn default_object_member(&self) -> Option<&'static str> {
        match self {
            EntityType::Group | EntityType::EnterpriseRole => Some("uniqueMember"),
            _ => None,
        }
    }

    /// Global key holding the default container of this entity type.
    pub fn container_key(&self) -> Option<&'static str> {
        match self {
            EntityType::Account => Some(keys::ACCOUNT_CONTAINER),
            EntityType::Group => Some(keys::GROUP_CONTAINER),
            EntityType::Role => Some(keys::ROLE_CONTAINER),
            EntityType::Organization => Some(keys::ORGANIZATION_CONTAINER),
            EntityType::OrganizationalUnit => Some(keys::GENERIC_CONTAINER),
            EntityType::Country => Some(keys::COUNTRY_CONTAINER),
            EntityType::Locality => Some(keys::LOCALITY_CONTAINER),
            EntityType::Domain => Some(keys::DOMAIN_CONTAINER),
            EntityType::EnterpriseDomain => Some(keys::ENTERPRISE_DOMAIN_CONTAINER),
            EntityType::EnterpriseDatabase
            | EntityType::EnterpriseRole
            | EntityType::EnterpriseSchema => None,
        }
    }

    fn default_container(&self) -> Option<&'static str> {
        match self {
            EntityType::EnterpriseDomain => {
                Some("cn=OracleDBSecurity,cn=Products,cn=OracleContext")
            }
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_name())
    }
}

/// How membership in a group or role is recorded on a member entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipLink {
    /// Attribute on the member entry holding the link.
    pub attribute: String,
    /// Whether the attribute holds distinguished names (rather than plain names).
    #[serde(default)]
    pub dn: bool,
}

/// Per-entity-type schema record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_prefix: Option<String>,
    /// Attribute on a group or role entry listing its members.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_member: Option<String>,
    /// Password attribute (accounts only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_attribute: Option<String>,
    #[serde(default)]
    pub multi_valued: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_link: Option<MembershipLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_link: Option<MembershipLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

impl SchemaEntry {
    /// Add a multi-valued attribute name, ignoring duplicates.
    pub fn add_multi_valued(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self
            .multi_valued
            .iter()
            .any(|known| known.eq_ignore_ascii_case(&name))
        {
            self.multi_valued.push(name);
        }
    }
}

/// Server-side paging mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaginationControl {
    /// Simple paged results (RFC 2696).
    #[default]
    SimplePage,
    /// Virtual list view.
    VirtualList,
}

impl PaginationControl {
    pub const SIMPLE_PAGE_OID: &'static str = "1.2.840.113556.1.4.319";
    pub const VIRTUAL_LIST_OID: &'static str = "2.16.840.1.113730.3.4.9";

    pub fn oid(&self) -> &'static str {
        match self {
            PaginationControl::SimplePage => Self::SIMPLE_PAGE_OID,
            PaginationControl::VirtualList => Self::VIRTUAL_LIST_OID,
        }
    }
}

impl FromStr for PaginationControl {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("SimplePage") || s == Self::SIMPLE_PAGE_OID {
            Ok(PaginationControl::SimplePage)
        } else if s.eq_ignore_ascii_case("VirtualList") || s == Self::VIRTUAL_LIST_OID {
            Ok(PaginationControl::VirtualList)
        } else {
            Err(DirectoryError::invalid_configuration(format!(
                "unknown pagination control '{s}'"
            )))
        }
    }
}

/// Schema mapping table with typed accessors and documented defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMap {
    #[serde(default)]
    settings: BTreeMap<String, String>,
    #[serde(default)]
    entities: BTreeMap<EntityType, SchemaEntry>,
    #[serde(default)]
    failover: Vec<Endpoint>,
    #[serde(default)]
    distinguished_names: Vec<String>,
    #[serde(default)]
    binary_attributes: Vec<String>,
}

impl SchemaMap {
    /// Create a map where every accessor returns its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deserialize a map from JSON and validate its global keys.
    pub fn from_json(json: &str) -> DirectoryResult<Self> {
        let map: SchemaMap = serde_json::from_str(json).map_err(|e| {
            DirectoryError::invalid_configuration(format!("invalid schema map: {e}"))
        })?;
        map.validate()?;
        Ok(map)
    }

    /// Check every global key and value.
    pub fn validate(&self) -> DirectoryResult<()> {
        self.settings
            .iter()
            .try_for_each(|(key, value)| check_value(key, value))
    }

    /// Set a global key, validating the key name and the value syntax.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> DirectoryResult<()> {
        let value = value.into();
        check_value(key, &value)?;
        self.settings.insert(key.to_string(), value);
        Ok(())
    }

    /// Set a global key using builder pattern.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> DirectoryResult<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    /// Raw configured value of a global key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    fn text<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .and_then(|v| parse_flag(v.trim()))
            .unwrap_or(default)
    }

    fn millis(&self, key: &str, default: u64) -> Duration {
        Duration::from_millis(
            self.get(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default),
        )
    }

    pub fn url_encoding(&self) -> &str {
        self.text(keys::URL_ENCODING, "UTF-8")
    }

    /// Name of the transport implementation.
    pub fn context_factory(&self) -> &str {
        self.text(keys::CONTEXT_FACTORY, "ldap3")
    }

    /// Name of the TLS crypto provider to register.
    pub fn security_provider(&self) -> &str {
        self.text(keys::SECURITY_PROVIDER, "ring")
    }

    pub fn connection_timeout(&self) -> Duration {
        self.millis(keys::CONNECTION_TIMEOUT, 3_000)
    }

    pub fn response_timeout(&self) -> Duration {
        self.millis(keys::RESPONSE_TIMEOUT, 10_000)
    }

    pub fn referential_integrity(&self) -> bool {
        self.flag(keys::REFERENTIAL_INTEGRITY, false)
    }

    /// `chrono` format of directory timestamps.
    pub fn timestamp_format(&self) -> &str {
        self.text(keys::TIMESTAMP_FORMAT, timestamp::DEFAULT_FORMAT)
    }

    pub fn object_class_name(&self) -> &str {
        self.text(keys::OBJECT_CLASS_NAME, "objectClass")
    }

    pub fn distinguished_name_attribute(&self) -> &str {
        self.text(keys::DISTINGUISHED_NAME_ATTRIBUTE, "dn")
    }

    pub fn distinguished_name_case_sensitive(&self) -> bool {
        self.flag(keys::DISTINGUISHED_NAME_CASESENSITIVE, true)
    }

    pub fn entry_created_attribute(&self) -> &str {
        self.text(keys::ENTRY_CREATED_ATTRIBUTE, "createTimestamp")
    }

    pub fn entry_modified_attribute(&self) -> &str {
        self.text(keys::ENTRY_MODIFIED_ATTRIBUTE, "modifyTimestamp")
    }

    pub fn password_operation_secured(&self) -> bool {
        self.flag(keys::PASSWORD_OPERATION_SECURED, false)
    }

    pub fn entitlement_prefix_required(&self) -> bool {
        self.flag(keys::ENTITLEMENT_PREFIX_REQUIRED, false)
    }

    pub fn multi_value_separator(&self) -> &str {
        self.text(keys::MULTI_VALUE_SEPARATOR, "|")
    }

    pub fn pagination_control(&self) -> PaginationControl {
        self.get(keys::PAGINATION_CONTROL)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn pagination_critical(&self) -> bool {
        self.flag(keys::PAGINATION_CONTROL_CRITICAL, true)
    }

    pub fn schema_container(&self) -> &str {
        self.text(keys::SCHEMA_CONTAINER, "cn=schema")
    }

    pub fn catalog_container(&self) -> &str {
        self.text(keys::CATALOG_CONTAINER, "cn=catalog")
    }

    pub fn changelog_container(&self) -> &str {
        self.text(keys::CHANGELOG_CONTAINER, "cn=changelog")
    }

    pub fn changelog_change_type(&self) -> &str {
        self.text(keys::CHANGELOG_CHANGE_TYPE, "changeType")
    }

    pub fn changelog_change_number(&self) -> &str {
        self.text(keys::CHANGELOG_CHANGE_NUMBER, "changeNumber")
    }

    pub fn changelog_target_guid(&self) -> &str {
        self.text(keys::CHANGELOG_TARGET_GUID, "targetGUID")
    }

    pub fn changelog_target_dn(&self) -> &str {
        self.text(keys::CHANGELOG_TARGET_DN, "targetDN")
    }

    /// Schema record of an entity type, if one was configured.
    pub fn entry(&self, entity: EntityType) -> Option<&SchemaEntry> {
        self.entities.get(&entity)
    }

    /// Mutable schema record of an entity type, created on first use.
    pub fn entry_mut(&mut self, entity: EntityType) -> &mut SchemaEntry {
        self.entities.entry(entity).or_default()
    }

    pub fn object_class(&self, entity: EntityType) -> Option<&str> {
        self.entry(entity)
            .and_then(|e| e.object_class.as_deref())
            .or_else(|| entity.default_object_class())
    }

    pub fn object_prefix(&self, entity: EntityType) -> Option<&str> {
        self.entry(entity)
            .and_then(|e| e.object_prefix.as_deref())
            .or_else(|| entity.default_object_prefix())
    }

    pub fn object_member(&self, entity: EntityType) -> Option<&str> {
        self.entry(entity)
            .and_then(|e| e.object_member.as_deref())
            .or_else(|| entity.default_object_member())
    }

    /// Password attribute of accounts, redacted in every diagnostic.
    pub fn account_password_attribute(&self) -> &str {
        self.entry(EntityType::Account)
            .and_then(|e| e.password_attribute.as_deref())
            .unwrap_or("userPassword")
    }

    pub fn multi_valued(&self, entity: EntityType) -> &[String] {
        self.entry(entity)
            .map(|e| e.multi_valued.as_slice())
            .unwrap_or_default()
    }

    pub fn is_multi_valued(&self, entity: EntityType, attribute: &str) -> bool {
        self.multi_valued(entity)
            .iter()
            .any(|name| name.eq_ignore_ascii_case(attribute))
    }

    pub fn group_link(&self, entity: EntityType) -> Option<&MembershipLink> {
        self.entry(entity).and_then(|e| e.group_link.as_ref())
    }

    pub fn role_link(&self, entity: EntityType) -> Option<&MembershipLink> {
        self.entry(entity).and_then(|e| e.role_link.as_ref())
    }

    /// Default container of an entity type: the entity record, then the
    /// global container key, then the built-in default.
    pub fn container(&self, entity: EntityType) -> Option<&str> {
        self.entry(entity)
            .and_then(|e| e.container.as_deref())
            .or_else(|| entity.container_key().and_then(|key| self.get(key)))
            .or_else(|| entity.default_container())
    }

    /// Attributes whose values are distinguished names.
    pub fn distinguished_names(&self) -> &[String] {
        &self.distinguished_names
    }

    pub fn add_distinguished_name(&mut self, attribute: impl Into<String>) {
        self.distinguished_names.push(attribute.into());
    }

    /// Attributes the transport must treat as binary.
    pub fn binary_attributes(&self) -> &[String] {
        &self.binary_attributes
    }

    /// Binary attribute names joined with the multi-value separator.
    pub fn binary_attribute_list(&self) -> String {
        self.binary_attributes.join(self.multi_value_separator())
    }

    /// Add binary attribute names; `names` may itself be a separator-joined list.
    pub fn add_binary_attributes(&mut self, names: &str) {
        let separator = self.multi_value_separator().to_string();
        self.binary_attributes.extend(
            names
                .split(separator.as_str())
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        );
    }

    pub fn is_binary(&self, attribute: &str) -> bool {
        self.binary_attributes
            .iter()
            .any(|name| name.eq_ignore_ascii_case(attribute))
    }

    /// Failover endpoints declared by the feature document.
    pub fn failover(&self) -> &[Endpoint] {
        &self.failover
    }

    pub fn add_failover(&mut self, endpoint: Endpoint) {
        self.failover.push(endpoint);
    }

    /// Configured failover endpoints followed by the document's.
    pub fn merge_failover(&self, configured: &[Endpoint]) -> Vec<Endpoint> {
        configured
            .iter()
            .chain(self.failover.iter())
            .cloned()
            .collect()
    }

    /// Parse a directory timestamp with the configured format.
    pub fn timestamp(&self, value: Option<&str>) -> DateTime<Utc> {
        timestamp::parse_timestamp(value, self.timestamp_format())
    }
}
