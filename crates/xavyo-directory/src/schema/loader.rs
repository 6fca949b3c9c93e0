//! Parse an XML feature document into a [`SchemaMap`]

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::debug;

use super::{is_global_key, EntityType, MembershipLink, SchemaMap};
use crate::config::{Endpoint, Protocol};
use crate::error::{DirectoryError, DirectoryResult};

/// Namespace of feature documents. Documents without a default namespace are accepted.
pub const FEATURE_NAMESPACE: &str = "http://www.oracle.com/schema/oim/directory";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Feature,
    Failover,
    Server,
    DistinguishedNames,
    Binary,
    Entity(EntityType),
    MultiValued,
    GroupLink,
    RoleLink,
    Attribute,
}

impl Element {
    fn from_name(name: &str) -> Option<Self> {
        let element = match name {
            "feature" => Element::Feature,
            "failover" => Element::Failover,
            "server" => Element::Server,
            "distinguishedNames" => Element::DistinguishedNames,
            "binary" => Element::Binary,
            "multi-valued" => Element::MultiValued,
            "group-link" => Element::GroupLink,
            "role-link" => Element::RoleLink,
            "attribute" => Element::Attribute,
            other => Element::Entity(EntityType::from_element_name(other)?),
        };
        Some(element)
    }

    fn name(&self) -> &'static str {
        match self {
            Element::Feature => "feature",
            Element::Failover => "failover",
            Element::Server => "server",
            Element::DistinguishedNames => "distinguishedNames",
            Element::Binary => "binary",
            Element::Entity(entity) => entity.element_name(),
            Element::MultiValued => "multi-valued",
            Element::GroupLink => "group-link",
            Element::RoleLink => "role-link",
            Element::Attribute => "attribute",
        }
    }

    /// Whether this element may appear directly inside `parent` (`None` is the document root).
    fn allowed_under(&self, parent: Option<Element>) -> bool {
        use EntityType::*;

        match (self, parent) {
            (Element::Feature, None) => true,
            (
                Element::Failover
                | Element::DistinguishedNames
                | Element::Binary
                | Element::Entity(_),
                Some(Element::Feature),
            ) => true,
            (Element::Server, Some(Element::Failover)) => true,
            (Element::MultiValued, Some(Element::Entity(entity))) => matches!(
                entity,
                Domain | Country | Locality | Role | Group | Organization | OrganizationalUnit
                    | Account
            ),
            (Element::GroupLink | Element::RoleLink, Some(Element::Entity(entity))) => {
                matches!(entity, Organization | OrganizationalUnit | Account)
            }
            (
                Element::Attribute,
                Some(Element::DistinguishedNames | Element::Binary | Element::MultiValued),
            ) => true,
            _ => false,
        }
    }

    fn declares_attribute(&self, attribute: &str) -> bool {
        match self {
            Element::Feature => is_global_key(attribute),
            Element::Server => matches!(attribute, "host" | "port"),
            Element::Entity(entity) => match attribute {
                "object-class" | "object-prefix" => true,
                "object-member" => matches!(
                    entity,
                    EntityType::Role | EntityType::Group | EntityType::EnterpriseRole
                ),
                "password" => *entity == EntityType::Account,
                _ => false,
            },
            Element::GroupLink | Element::RoleLink => matches!(attribute, "attribute" | "dn"),
            _ => false,
        }
    }
}

/// Stack-based reader for feature documents.
///
/// Every element is checked against its legal parents, and every attribute
/// against the attributes its element declares.
#[derive(Debug, Default)]
pub struct SchemaMapLoader;

impl SchemaMapLoader {
    /// Parse a feature document into a fresh map.
    pub fn parse(xml: &str) -> DirectoryResult<SchemaMap> {
        let mut map = SchemaMap::new();
        Self::parse_into(xml, &mut map)?;
        Ok(map)
    }

    /// Read a feature document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> DirectoryResult<SchemaMap> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path).map_err(|e| {
            DirectoryError::invalid_configuration(format!(
                "cannot read feature document {}: {e}",
                path.display()
            ))
        })?;
        debug!(path = %path.display(), "Loading directory feature document");
        Self::parse(&xml)
    }

    /// Parse a feature document into an existing map.
    pub fn parse_into(xml: &str, map: &mut SchemaMap) -> DirectoryResult<()> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut buf = Vec::new();
        loop {
            let position = reader.buffer_position();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let element = open_element(e, &stack, map, position)?;
                    stack.push(element);
                }
                Ok(Event::Empty(ref e)) => {
                    open_element(e, &stack, map, position)?;
                }
                Ok(Event::Text(ref e)) => {
                    let text = e.unescape().map_err(|err| DirectoryError::MalformedDocument {
                        message: err.to_string(),
                        position,
                    })?;
                    apply_text(&text, &stack, map);
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                    apply_text(&text, &stack, map);
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(DirectoryError::MalformedDocument {
                        message: e.to_string(),
                        position: reader.error_position(),
                    });
                }
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(DirectoryError::MalformedDocument {
                message: format!("unclosed element '{}'", stack[stack.len() - 1].name()),
                position: reader.buffer_position(),
            });
        }

        Ok(())
    }
}

/// Validate an opening tag and apply its attributes to the map.
fn open_element(
    start: &BytesStart<'_>,
    stack: &[Element],
    map: &mut SchemaMap,
    position: u64,
) -> DirectoryResult<Element> {
    let name = String::from_utf8_lossy(start.local_name().into_inner()).to_string();
    let element = Element::from_name(&name).ok_or_else(|| DirectoryError::UnknownElement {
        element: name.clone(),
        position,
    })?;

    let parent = stack.last().copied();
    if !element.allowed_under(parent) {
        return Err(DirectoryError::InvalidTransition {
            parent: parent.map_or("(document)", |p| p.name()).to_string(),
            element: name,
            position,
        });
    }

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DirectoryError::MalformedDocument {
            message: e.to_string(),
            position,
        })?;
        let qualified = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| DirectoryError::MalformedDocument {
                message: e.to_string(),
                position,
            })?
            .to_string();

        if qualified == "xmlns" {
            if element == Element::Feature && value != FEATURE_NAMESPACE {
                return Err(DirectoryError::MalformedDocument {
                    message: format!("unexpected namespace '{value}'"),
                    position,
                });
            }
            continue;
        }
        if qualified.starts_with("xmlns:") || qualified.starts_with("xsi:") {
            continue;
        }

        let local = String::from_utf8_lossy(attr.key.local_name().into_inner()).to_string();
        if !element.declares_attribute(&local) {
            return Err(DirectoryError::UnknownAttribute {
                element: name,
                attribute: local,
                position,
            });
        }
        attributes.push((local, value));
    }

    apply_attributes(element, parent, attributes, map, position)?;
    Ok(element)
}

fn apply_attributes(
    element: Element,
    parent: Option<Element>,
    attributes: Vec<(String, String)>,
    map: &mut SchemaMap,
    position: u64,
) -> DirectoryResult<()> {
    match element {
        Element::Feature => {
            for (key, value) in attributes {
                map.set(&key, value)?;
            }
        }
        Element::Server => {
            let mut host = None;
            let mut port = Protocol::Ldap.default_port();
            for (key, value) in attributes {
                match key.as_str() {
                    "host" => host = Some(value),
                    _ => {
                        port = value.trim().parse().map_err(|_| {
                            DirectoryError::MalformedDocument {
                                message: format!("invalid server port '{value}'"),
                                position,
                            }
                        })?
                    }
                }
            }
            let host = host.ok_or_else(|| DirectoryError::MalformedDocument {
                message: "server element requires a host".to_string(),
                position,
            })?;
            map.add_failover(Endpoint::new(Protocol::Ldap, host, port));
        }
        Element::Entity(entity) => {
            let entry = map.entry_mut(entity);
            for (key, value) in attributes {
                match key.as_str() {
                    "object-class" => entry.object_class = Some(value),
                    "object-prefix" => entry.object_prefix = Some(value),
                    "object-member" => entry.object_member = Some(value),
                    _ => entry.password_attribute = Some(value),
                }
            }
        }
        Element::GroupLink | Element::RoleLink => {
            let Some(Element::Entity(entity)) = parent else {
                return Ok(());
            };
            let mut link = MembershipLink {
                attribute: String::new(),
                dn: false,
            };
            for (key, value) in attributes {
                match key.as_str() {
                    "attribute" => link.attribute = value,
                    _ => link.dn = value.trim().eq_ignore_ascii_case("true"),
                }
            }
            if link.attribute.is_empty() {
                return Err(DirectoryError::MalformedDocument {
                    message: format!("{} requires an attribute", element.name()),
                    position,
                });
            }
            let entry = map.entry_mut(entity);
            if element == Element::GroupLink {
                entry.group_link = Some(link);
            } else {
                entry.role_link = Some(link);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Route character data by the element that encloses it.
fn apply_text(text: &str, stack: &[Element], map: &mut SchemaMap) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }

    // Text inside <attribute> belongs to the attribute's parent.
    let (container, owner) = match stack {
        [.., owner, Element::Attribute] => (*owner, stack.len().checked_sub(3).map(|i| stack[i])),
        [.., owner, container] => (*container, Some(*owner)),
        [container] => (*container, None),
        [] => return,
    };

    match container {
        Element::DistinguishedNames => split_values(text, map)
            .into_iter()
            .for_each(|name| map.add_distinguished_name(name)),
        Element::Binary => map.add_binary_attributes(text),
        Element::MultiValued => {
            if let Some(Element::Entity(entity)) = owner {
                for name in split_values(text, map) {
                    map.entry_mut(entity).add_multi_valued(name);
                }
            }
        }
        other => {
            debug!(element = other.name(), "Ignoring character data in feature document");
        }
    }
}

fn split_values(text: &str, map: &SchemaMap) -> Vec<String> {
    text.split(map.multi_value_separator())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::PaginationControl;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feature xmlns="http://www.oracle.com/schema/oim/directory"
         xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         distinguished-name-attribute="entryDN"
         connection-timeout="5000"
         pagination-control="VirtualList"
         account-container="ou=People">
  <failover>
    <server host="ldap2.example.com" port="1389"/>
    <server host="ldap3.example.com"/>
  </failover>
  <distinguishedNames>
    <attribute>manager</attribute>
    <attribute>secretary</attribute>
  </distinguishedNames>
  <binary>
    <attribute>objectGUID</attribute>
    <attribute>jpegPhoto</attribute>
  </binary>
  <account object-class="user" object-prefix="uid" password="unicodePwd">
    <multi-valued>
      <attribute>mail</attribute>
      <attribute>telephoneNumber</attribute>
    </multi-valued>
    <group-link attribute="memberOf" dn="true"/>
    <role-link attribute="nsRoleDN" dn="true"/>
  </account>
  <group object-class="groupOfNames" object-member="member"/>
  <enterprise-role object-member="member"/>
</feature>"#;

    #[test]
    fn test_parse_full_document() {
        let map = SchemaMapLoader::parse(DOCUMENT).unwrap();

        assert_eq!(map.distinguished_name_attribute(), "entryDN");
        assert_eq!(map.connection_timeout().as_millis(), 5000);
        assert_eq!(map.pagination_control(), PaginationControl::VirtualList);
        assert_eq!(map.container(EntityType::Account), Some("ou=People"));

        let hosts: Vec<(&str, u16)> = map
            .failover()
            .iter()
            .map(|e| (e.host.as_str(), e.port))
            .collect();
        assert_eq!(hosts, vec![("ldap2.example.com", 1389), ("ldap3.example.com", 389)]);

        assert_eq!(map.distinguished_names(), ["manager", "secretary"]);
        assert_eq!(map.binary_attributes(), ["objectGUID", "jpegPhoto"]);
        assert_eq!(map.binary_attribute_list(), "objectGUID|jpegPhoto");

        assert_eq!(map.object_class(EntityType::Account), Some("user"));
        assert_eq!(map.object_prefix(EntityType::Account), Some("uid"));
        assert_eq!(map.account_password_attribute(), "unicodePwd");
        assert_eq!(map.multi_valued(EntityType::Account), ["mail", "telephoneNumber"]);
        assert_eq!(
            map.group_link(EntityType::Account),
            Some(&MembershipLink {
                attribute: "memberOf".to_string(),
                dn: true
            })
        );
        assert_eq!(
            map.role_link(EntityType::Account).map(|l| l.attribute.as_str()),
            Some("nsRoleDN")
        );
        assert_eq!(map.object_member(EntityType::Group), Some("member"));
        assert_eq!(map.object_prefix(EntityType::Group), Some("cn"));
        assert_eq!(map.object_member(EntityType::EnterpriseRole), Some("member"));
    }

    #[test]
    fn test_unknown_element() {
        let err = SchemaMapLoader::parse("<feature><printer/></feature>").unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::UnknownElement { ref element, .. } if element == "printer"
        ));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_server_outside_failover_is_invalid_transition() {
        let err = SchemaMapLoader::parse(r#"<feature><server host="h"/></feature>"#).unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::InvalidTransition { ref parent, ref element, .. }
                if parent == "feature" && element == "server"
        ));
    }

    #[test]
    fn test_group_link_not_allowed_under_group() {
        let err = SchemaMapLoader::parse(
            r#"<feature><group><group-link attribute="memberOf"/></group></feature>"#,
        )
        .unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidTransition { .. }));
    }

    #[test]
    fn test_root_must_be_feature() {
        let err = SchemaMapLoader::parse("<account/>").unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::InvalidTransition { ref parent, .. } if parent == "(document)"
        ));
    }

    #[test]
    fn test_unknown_attribute() {
        let err = SchemaMapLoader::parse(r#"<feature><account colour="blue"/></feature>"#)
            .unwrap_err();
        assert!(matches!(
            err,
            DirectoryError::UnknownAttribute { ref element, ref attribute, .. }
                if element == "account" && attribute == "colour"
        ));

        let err = SchemaMapLoader::parse(r#"<feature><group password="pw"/></feature>"#)
            .unwrap_err();
        assert!(matches!(err, DirectoryError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_unknown_feature_key_is_unknown_attribute() {
        let err = SchemaMapLoader::parse(r#"<feature colour="blue"/>"#).unwrap_err();
        assert!(matches!(err, DirectoryError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_invalid_feature_value_is_configuration_error() {
        let err = SchemaMapLoader::parse(r#"<feature connection-timeout="soon"/>"#).unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_malformed_document() {
        let err = SchemaMapLoader::parse("<feature><account></feature>").unwrap_err();
        assert!(matches!(err, DirectoryError::MalformedDocument { .. }));
    }

    #[test]
    fn test_foreign_namespace_rejected() {
        let err = SchemaMapLoader::parse(r#"<feature xmlns="urn:example:other"/>"#).unwrap_err();
        assert!(matches!(err, DirectoryError::MalformedDocument { .. }));
    }

    #[test]
    fn test_direct_text_and_separator_lists() {
        let map = SchemaMapLoader::parse(
            "<feature><binary>objectSid|objectGUID</binary>\
             <distinguishedNames>member</distinguishedNames></feature>",
        )
        .unwrap();
        assert_eq!(map.binary_attributes(), ["objectSid", "objectGUID"]);
        assert_eq!(map.distinguished_names(), ["member"]);
    }

    #[test]
    fn test_parse_into_extends_existing_map() {
        let mut map = SchemaMap::new();
        map.add_binary_attributes("jpegPhoto");
        SchemaMapLoader::parse_into(
            "<feature><binary><attribute>objectGUID</attribute></binary></feature>",
            &mut map,
        )
        .unwrap();
        assert_eq!(map.binary_attributes(), ["jpegPhoto", "objectGUID"]);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feature.xml");
        std::fs::write(&path, DOCUMENT).unwrap();
        let map = SchemaMapLoader::from_path(&path).unwrap();
        assert_eq!(map.failover().len(), 2);

        let err = SchemaMapLoader::from_path(dir.path().join("missing.xml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
