//! Search execution
//!
//! Every search opens a scoped session, materializes all results and closes
//! the session before returning.

use std::fmt;
use std::str::FromStr;

use ldap3::controls::RawControl;
use tracing::{debug, info, instrument};

use crate::attribute::DirectoryEntry;
use crate::connection::ConnectionManager;
use crate::control::{
    paged_results_request, ControlRegistry, SORT_REQUEST_OID, TREE_DELETE_OID,
};
use crate::error::{DirectoryError, DirectoryResult};
use crate::schema::PaginationControl;
use crate::transport::{LdapTransportFactory, SearchRequest, TransportFactory};

/// Root DSE attribute listing the supported control OIDs.
pub const SUPPORTED_CONTROL: &str = "supportedControl";

/// `changeType` value of a delete record in the change log.
pub const CHANGE_TYPE_DELETE: &str = "delete";

/// Search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// The base entry only.
    Object,
    /// Immediate children of the base.
    OneLevel,
    /// The base and all its descendants.
    #[default]
    Subtree,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Object => "Object",
            Scope::OneLevel => "OneLevel",
            Scope::Subtree => "SubTree",
        })
    }
}

impl FromStr for Scope {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "object" | "base" => Ok(Scope::Object),
            "onelevel" | "one" => Ok(Scope::OneLevel),
            "subtree" | "sub" => Ok(Scope::Subtree),
            other => Err(DirectoryError::invalid_configuration(format!(
                "unknown search scope '{other}'"
            ))),
        }
    }
}

impl From<Scope> for ldap3::Scope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Object => ldap3::Scope::Base,
            Scope::OneLevel => ldap3::Scope::OneLevel,
            Scope::Subtree => ldap3::Scope::Subtree,
        }
    }
}

/// Escape a value for use in a search filter (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// `(prefix=value)` with the value escaped.
pub fn compose_filter(prefix: &str, value: &str) -> String {
    compose_filter_with(prefix, "=", &escape_filter_value(value))
}

/// `(prefix<predicate>value)`, taken verbatim.
pub fn compose_filter_with(prefix: &str, predicate: &str, value: &str) -> String {
    format!("({prefix}{predicate}{value})")
}

/// Filter for change log records after `last_change_number`.
///
/// `delete_only` selects delete records only; otherwise deletes are excluded.
pub fn changelog_filter(
    change_number_attribute: &str,
    change_type_attribute: &str,
    last_change_number: u64,
    delete_only: bool,
) -> String {
    let number = last_change_number.to_string();
    let delete = compose_filter(change_type_attribute, CHANGE_TYPE_DELETE);
    let change_type = if delete_only {
        delete
    } else {
        format!("(!{delete})")
    };
    // >= is inclusive; excluding the equal record makes it strictly greater.
    format!(
        "(&(!{}){}{change_type})",
        compose_filter(change_number_attribute, &number),
        compose_filter_with(change_number_attribute, ">=", &number),
    )
}

/// One page of a paged search.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub entries: Vec<DirectoryEntry>,
    /// Cookie for the next page; empty on the last page.
    pub cookie: Vec<u8>,
}

impl SearchPage {
    pub fn has_more(&self) -> bool {
        !self.cookie.is_empty()
    }
}

/// Runs searches through a [`ConnectionManager`].
pub struct SearchEngine<'a, F: TransportFactory = LdapTransportFactory> {
    connection: &'a mut ConnectionManager<F>,
    controls: &'a ControlRegistry,
}

impl<'a, F: TransportFactory> SearchEngine<'a, F> {
    pub fn new(connection: &'a mut ConnectionManager<F>, controls: &'a ControlRegistry) -> Self {
        Self {
            connection,
            controls,
        }
    }

    /// Search below `base` and return every matching entry.
    #[instrument(skip(self, attributes))]
    pub fn search(
        &self,
        base: &str,
        filter: &str,
        scope: Scope,
        attributes: &[&str],
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        let request = SearchRequest::new("", scope, filter).with_attributes(attributes);
        let response = self
            .connection
            .scoped(base, |session| session.search(request))?;

        debug!(found = response.entries.len(), "Directory search completed");
        Ok(response.entries)
    }

    /// Number of entries matching `filter`, fetching only `attribute`.
    pub fn count(
        &self,
        base: &str,
        filter: &str,
        scope: Scope,
        attribute: &str,
    ) -> DirectoryResult<usize> {
        Ok(self.search(base, filter, scope, &[attribute])?.len())
    }

    /// The normalized DN of the single entry with `prefix=value` below `base`.
    #[instrument(skip(self))]
    pub fn find_unique(&self, base: &str, prefix: &str, value: &str) -> DirectoryResult<String> {
        let filter = compose_filter(prefix, value);
        let mut entries = self.search(base, &filter, Scope::Subtree, &[prefix])?;

        match entries.len() {
            0 => Err(DirectoryError::ObjectNotFound { identifier: filter }),
            1 => {
                let entry = entries.remove(0);
                Ok(self.connection.normalize(&entry.dn))
            }
            count => Err(DirectoryError::ObjectAmbiguous {
                identifier: filter,
                count,
            }),
        }
    }

    /// Read attributes of the root DSE. No attributes means all of them.
    pub fn fetch_root_properties(
        &self,
        attributes: &[&str],
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        let filter = compose_filter_with(self.connection.schema().object_class_name(), "=", "*");
        let request = SearchRequest::new("", Scope::Object, filter).with_attributes(attributes);
        let response = self
            .connection
            .scoped_root_dse(|session| session.search(request))?;
        Ok(response.entries)
    }

    /// First paging cookie among `controls`, or an empty cookie.
    pub fn extract_paging_cookie(&self, controls: &[RawControl]) -> Vec<u8> {
        controls
            .iter()
            .map(|raw| self.controls.decode(raw))
            .find_map(|control| control.paging_cookie().map(<[u8]>::to_vec))
            .unwrap_or_default()
    }

    /// True if the root DSE lists `oid` as a supported control.
    pub fn supports_control(&self, oid: &str) -> DirectoryResult<bool> {
        let entries = self.fetch_root_properties(&[SUPPORTED_CONTROL])?;
        let supported = entries.iter().any(|entry| {
            entry
                .attributes
                .get_texts(SUPPORTED_CONTROL)
                .iter()
                .any(|value| value.trim() == oid)
        });
        debug!(oid, supported, "Checked root DSE for control support");
        Ok(supported)
    }

    pub fn supports_paging(&self) -> DirectoryResult<bool> {
        let pagination = self.connection.schema().pagination_control();
        self.supports_control(pagination.oid())
    }

    pub fn supports_sort(&self) -> DirectoryResult<bool> {
        self.supports_control(SORT_REQUEST_OID)
    }

    pub fn supports_tree_delete(&self) -> DirectoryResult<bool> {
        self.supports_control(TREE_DELETE_OID)
    }

    /// Fetch one page of results. Pass an empty cookie for the first page
    /// and the returned cookie for each following one.
    #[instrument(skip(self, attributes, cookie))]
    pub fn search_page(
        &self,
        base: &str,
        filter: &str,
        scope: Scope,
        attributes: &[&str],
        page_size: i32,
        cookie: &[u8],
    ) -> DirectoryResult<SearchPage> {
        let schema = self.connection.schema();
        if let PaginationControl::VirtualList = schema.pagination_control() {
            return Err(DirectoryError::OperationUnsupported {
                message: "virtual list view paging is not supported".to_string(),
            });
        }
        if page_size <= 0 {
            return Err(DirectoryError::invalid_configuration(format!(
                "page size must be positive, got {page_size}"
            )));
        }

        let request = SearchRequest::new("", scope, filter)
            .with_attributes(attributes)
            .with_control(paged_results_request(
                page_size,
                cookie.to_vec(),
                schema.pagination_critical(),
            ));
        let response = self
            .connection
            .scoped(base, |session| session.search(request))?;

        let page = SearchPage {
            cookie: self.extract_paging_cookie(&response.controls),
            entries: response.entries,
        };
        info!(
            returned = page.entries.len(),
            has_more = page.has_more(),
            "Directory page fetched"
        );
        Ok(page)
    }

    /// Filter for change log records after `last_change_number`, using the
    /// schema's change log attribute names.
    pub fn changelog_filter(&self, last_change_number: u64, delete_only: bool) -> String {
        let schema = self.connection.schema();
        changelog_filter(
            schema.changelog_change_number(),
            schema.changelog_change_type(),
            last_change_number,
            delete_only,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_str() {
        assert_eq!("Object".parse::<Scope>().unwrap(), Scope::Object);
        assert_eq!("base".parse::<Scope>().unwrap(), Scope::Object);
        assert_eq!("ONELEVEL".parse::<Scope>().unwrap(), Scope::OneLevel);
        assert_eq!("one".parse::<Scope>().unwrap(), Scope::OneLevel);
        assert_eq!("SubTree".parse::<Scope>().unwrap(), Scope::Subtree);
        assert_eq!("sub".parse::<Scope>().unwrap(), Scope::Subtree);
        assert!("children".parse::<Scope>().is_err());
    }

    #[test]
    fn test_scope_display_parses_back() {
        for scope in [Scope::Object, Scope::OneLevel, Scope::Subtree] {
            assert_eq!(scope.to_string().parse::<Scope>().unwrap(), scope);
        }
        assert_eq!(Scope::default(), Scope::Subtree);
    }

    #[test]
    fn test_scope_into_ldap3() {
        assert!(matches!(ldap3::Scope::from(Scope::Object), ldap3::Scope::Base));
        assert!(matches!(ldap3::Scope::from(Scope::OneLevel), ldap3::Scope::OneLevel));
        assert!(matches!(ldap3::Scope::from(Scope::Subtree), ldap3::Scope::Subtree));
    }

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("John Doe"), "John Doe");
        assert_eq!(escape_filter_value("John*"), "John\\2a");
        assert_eq!(escape_filter_value("(admin)"), "\\28admin\\29");
        assert_eq!(escape_filter_value("a\\b"), "a\\5cb");
        assert_eq!(escape_filter_value("a\0b"), "a\\00b");
    }

    #[test]
    fn test_compose_filter() {
        assert_eq!(compose_filter("cn", "Admin"), "(cn=Admin)");
        assert_eq!(compose_filter("cn", "*)(uid=*"), "(cn=\\2a\\29\\28uid=\\2a)");
        assert_eq!(compose_filter_with("objectClass", "=", "*"), "(objectClass=*)");
        assert_eq!(compose_filter_with("changeNumber", ">=", "42"), "(changeNumber>=42)");
    }

    #[test]
    fn test_changelog_filter() {
        assert_eq!(
            changelog_filter("changeNumber", "changeType", 42, false),
            "(&(!(changeNumber=42))(changeNumber>=42)(!(changeType=delete)))"
        );
        assert_eq!(
            changelog_filter("changeNumber", "changeType", 7, true),
            "(&(!(changeNumber=7))(changeNumber>=7)(changeType=delete))"
        );
    }

    #[test]
    fn test_search_page_has_more() {
        assert!(!SearchPage::default().has_more());
        let page = SearchPage {
            entries: Vec::new(),
            cookie: vec![1],
        };
        assert!(page.has_more());
    }
}
