//! Entry mutation
//!
//! Create, delete, rename and modify run against the session opened with
//! [`ConnectionManager::connect`]. Reads and bitmask edits open their own
//! scoped session against a base context.

use ldap3::controls::RawControl;
use tracing::{debug, info, instrument, warn};

use crate::attribute::{AttributeSet, AttributeValue, DirectoryEntry};
use crate::connection::{ConnectionManager, Session};
use crate::control::{tree_delete_request, ControlRegistry};
use crate::error::{DirectoryError, DirectoryResult, ErrorKind};
use crate::search::{compose_filter_with, Scope};
use crate::transport::{
    DirectoryTransport, LdapTransportFactory, Modification, SearchRequest, TransportFactory,
};

const CREATE_ERRORS: &[ErrorKind] = &[
    ErrorKind::ObjectAlreadyExists,
    ErrorKind::AttributeSchemaViolation,
    ErrorKind::AttributeInvalidData,
    ErrorKind::AttributeInvalidType,
    ErrorKind::OperationUnsupported,
    ErrorKind::NameSyntax,
];

const DELETE_ERRORS: &[ErrorKind] = &[
    ErrorKind::ObjectNotFound,
    ErrorKind::OperationUnsupported,
    ErrorKind::NameSyntax,
];

const RENAME_ERRORS: &[ErrorKind] = &[
    ErrorKind::ObjectNotFound,
    ErrorKind::ObjectAlreadyExists,
    ErrorKind::NameSyntax,
];

const MODIFY_ERRORS: &[ErrorKind] = &[
    ErrorKind::ObjectNotFound,
    ErrorKind::AttributeInUse,
    ErrorKind::AttributeInvalidData,
    ErrorKind::AttributeInvalidType,
    ErrorKind::AttributeSchemaViolation,
    ErrorKind::OperationUnsupported,
    ErrorKind::NameSyntax,
];

/// Kind of attribute change applied by [`EntryMutator::modify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    Add,
    Replace,
    Remove,
}

impl ModifyOperation {
    fn label(self) -> &'static str {
        match self {
            ModifyOperation::Add => "modify-add",
            ModifyOperation::Replace => "modify-replace",
            ModifyOperation::Remove => "modify-remove",
        }
    }
}

/// One modification per attribute of `attributes`.
pub fn modifications(operation: ModifyOperation, attributes: &AttributeSet) -> Vec<Modification> {
    attributes
        .iter()
        .map(|(name, values)| {
            let name = name.to_string();
            let values = values.to_vec();
            match operation {
                ModifyOperation::Add => Modification::Add(name, values),
                ModifyOperation::Replace => Modification::Replace(name, values),
                ModifyOperation::Remove => Modification::Delete(name, values),
            }
        })
        .collect()
}

/// `value | mask` when setting, `value & !mask` when clearing.
pub fn apply_bitmask(value: i64, mask: i64, set: bool) -> i64 {
    if set {
        value | mask
    } else {
        value & !mask
    }
}

/// True when every bit of `mask` is set in `value`.
pub fn has_bitmask(value: i64, mask: i64) -> bool {
    value & mask == mask
}

/// Integer value of a bitmask attribute. A missing value reads as zero.
fn bitmask_value(name: &str, value: Option<&AttributeValue>) -> DirectoryResult<i64> {
    let Some(value) = value else {
        return Ok(0);
    };
    let text = value
        .as_text()
        .ok_or_else(|| DirectoryError::AttributeInvalidData {
            message: format!("{name} holds binary data, not an integer"),
        })?;
    text.trim()
        .parse::<i64>()
        .map_err(|e| DirectoryError::AttributeInvalidData {
            message: format!("{name} value '{text}' is not an integer: {e}"),
        })
}

/// `leaf,container`, or just `leaf` for an empty container.
fn join_container(leaf: &str, container: &str) -> String {
    if container.trim().is_empty() {
        leaf.to_string()
    } else {
        format!("{leaf},{container}")
    }
}

/// Creates, deletes, renames and modifies directory entries.
pub struct EntryMutator<'a, F: TransportFactory = LdapTransportFactory> {
    connection: &'a mut ConnectionManager<F>,
    controls: &'a ControlRegistry,
}

impl<'a, F: TransportFactory> EntryMutator<'a, F> {
    pub fn new(connection: &'a mut ConnectionManager<F>, controls: &'a ControlRegistry) -> Self {
        Self {
            connection,
            controls,
        }
    }

    pub fn controls(&self) -> &ControlRegistry {
        self.controls
    }

    fn password_attribute(&self) -> String {
        self.connection.schema().account_password_attribute().to_string()
    }

    /// Create the entry `rdn` within the session context.
    #[instrument(skip(self, attributes))]
    pub fn create(&mut self, rdn: &str, attributes: &AttributeSet) -> DirectoryResult<()> {
        debug!(
            attributes = %attributes.redacted(&self.password_attribute()),
            "Creating directory entry"
        );
        self.connection
            .session()?
            .add(rdn, attributes)
            .map_err(|e| e.narrow(CREATE_ERRORS, "create", rdn))?;
        info!(rdn, "Directory entry created");
        Ok(())
    }

    /// Delete the entry `rdn`, sending `controls` with the request.
    #[instrument(skip(self, controls))]
    pub fn delete(&mut self, rdn: &str, controls: &[RawControl]) -> DirectoryResult<()> {
        self.connection
            .session()?
            .delete(rdn, controls)
            .map_err(|e| e.narrow(DELETE_ERRORS, "delete", rdn))?;
        info!(rdn, "Directory entry deleted");
        Ok(())
    }

    /// Delete `rdn` with all its descendants using the tree delete control.
    pub fn delete_tree(&mut self, rdn: &str) -> DirectoryResult<()> {
        self.delete(rdn, &[tree_delete_request()])
    }

    /// Rename `old_name` to `new_name`. A different parent moves the entry.
    #[instrument(skip(self))]
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> DirectoryResult<()> {
        self.connection
            .session()?
            .rename(old_name, new_name)
            .map_err(|e| match e {
                DirectoryError::ObjectNotFound { .. } => DirectoryError::ObjectNotFound {
                    identifier: old_name.to_string(),
                },
                DirectoryError::ObjectAlreadyExists { .. } => DirectoryError::ObjectAlreadyExists {
                    identifier: new_name.to_string(),
                },
                other => other.narrow(RENAME_ERRORS, "rename", old_name),
            })?;
        info!(old_name, new_name, "Directory entry renamed");
        Ok(())
    }

    /// Move `leaf` from `source_container` to `target_container`.
    pub fn move_entry(
        &mut self,
        source_container: &str,
        target_container: &str,
        leaf: &str,
    ) -> DirectoryResult<()> {
        let old_name = join_container(leaf, source_container);
        let new_name = join_container(leaf, target_container);
        self.rename(&old_name, &new_name)
    }

    /// Apply one kind of change for every attribute in `attributes`.
    #[instrument(skip(self, attributes))]
    pub fn modify(
        &mut self,
        rdn: &str,
        operation: ModifyOperation,
        attributes: &AttributeSet,
    ) -> DirectoryResult<()> {
        if attributes.is_empty() {
            return Ok(());
        }
        debug!(
            attributes = %attributes.redacted(&self.password_attribute()),
            "Modifying directory entry"
        );
        let changes = modifications(operation, attributes);
        self.connection
            .session()?
            .modify(rdn, &changes)
            .map_err(|e| e.narrow(MODIFY_ERRORS, operation.label(), rdn))
    }

    pub fn modify_add(&mut self, rdn: &str, attributes: &AttributeSet) -> DirectoryResult<()> {
        self.modify(rdn, ModifyOperation::Add, attributes)
    }

    pub fn modify_replace(&mut self, rdn: &str, attributes: &AttributeSet) -> DirectoryResult<()> {
        self.modify(rdn, ModifyOperation::Replace, attributes)
    }

    pub fn modify_remove(&mut self, rdn: &str, attributes: &AttributeSet) -> DirectoryResult<()> {
        self.modify(rdn, ModifyOperation::Remove, attributes)
    }

    /// Leave `name` present on `rdn` with no value.
    #[instrument(skip(self))]
    pub fn clear_attribute(
        &mut self,
        base_context: &str,
        rdn: &str,
        name: &str,
    ) -> DirectoryResult<()> {
        let change = [Modification::Replace(name.to_string(), Vec::new())];
        self.connection.scoped(base_context, |session| {
            session
                .modify(rdn, &change)
                .map_err(|e| e.narrow(MODIFY_ERRORS, "clear-attribute", rdn))
        })
    }

    /// Set or clear the bits of `mask` in the integer attribute `name`.
    #[instrument(skip(self))]
    pub fn set_bitmask_attribute(
        &mut self,
        base_context: &str,
        rdn: &str,
        name: &str,
        mask: i64,
        set: bool,
    ) -> DirectoryResult<()> {
        let object_class = self.connection.schema().object_class_name().to_string();
        self.connection.scoped(base_context, |session| {
            let values = read_values(session, &object_class, rdn, name)?;
            let current = bitmask_value(name, values.first())?;
            let updated = apply_bitmask(current, mask, set);
            debug!(current, updated, "Writing bitmask attribute");
            let change = [Modification::Replace(
                name.to_string(),
                vec![AttributeValue::from(updated.to_string())],
            )];
            session
                .modify(rdn, &change)
                .map_err(|e| e.narrow(MODIFY_ERRORS, "set-bitmask", rdn))
        })
    }

    /// True when every bit of `mask` is set in the attribute `name`.
    pub fn has_bitmask_attribute(
        &self,
        base_context: &str,
        rdn: &str,
        name: &str,
        mask: i64,
    ) -> DirectoryResult<bool> {
        let values = self.read_attribute_values(base_context, rdn, name)?;
        Ok(has_bitmask(bitmask_value(name, values.first())?, mask))
    }

    /// Every value of `name` on `rdn`. An absent attribute has no values.
    pub fn read_attribute_values(
        &self,
        base_context: &str,
        rdn: &str,
        name: &str,
    ) -> DirectoryResult<Vec<AttributeValue>> {
        let object_class = self.connection.schema().object_class_name();
        self.connection
            .scoped(base_context, |session| read_values(session, object_class, rdn, name))
    }

    /// The first value of `name` on `rdn`.
    pub fn read_single_attribute(
        &self,
        base_context: &str,
        rdn: &str,
        name: &str,
    ) -> DirectoryResult<Option<AttributeValue>> {
        let values = self.read_attribute_values(base_context, rdn, name)?;
        if values.len() > 1 {
            warn!(
                rdn,
                attribute = name,
                count = values.len(),
                "Attribute has more than one value, using the first"
            );
        }
        Ok(values.into_iter().next())
    }

    /// All user attributes of `rdn`.
    pub fn read_all_attributes(
        &self,
        base_context: &str,
        rdn: &str,
    ) -> DirectoryResult<AttributeSet> {
        let object_class = self.connection.schema().object_class_name();
        self.connection.scoped(base_context, |session| {
            read_entry(session, object_class, rdn, &[]).map(|entry| entry.attributes)
        })
    }
}

fn read_entry<T: DirectoryTransport>(
    session: &mut Session<T>,
    object_class: &str,
    rdn: &str,
    attributes: &[&str],
) -> DirectoryResult<DirectoryEntry> {
    let filter = compose_filter_with(object_class, "=", "*");
    let request = SearchRequest::new(rdn, Scope::Object, filter)
        .with_attributes(attributes);
    session
        .search(request)?
        .entries
        .into_iter()
        .next()
        .ok_or_else(|| DirectoryError::ObjectNotFound {
            identifier: rdn.to_string(),
        })
}

fn read_values<T: DirectoryTransport>(
    session: &mut Session<T>,
    object_class: &str,
    rdn: &str,
    name: &str,
) -> DirectoryResult<Vec<AttributeValue>> {
    let entry = read_entry(session, object_class, rdn, &[name])?;
    Ok(entry
        .attributes
        .get(name)
        .map(<[AttributeValue]>::to_vec)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_bitmask() {
        assert_eq!(apply_bitmask(0, 0x2, true), 0x2);
        assert_eq!(apply_bitmask(0x202, 0x2, false), 0x200);
        assert_eq!(apply_bitmask(0x200, 0x2, false), 0x200);
        assert_eq!(apply_bitmask(0x2, 0x2, true), 0x2);
    }

    #[test]
    fn test_has_bitmask_requires_every_bit() {
        assert!(has_bitmask(0x202, 0x2));
        assert!(has_bitmask(0x202, 0x202));
        assert!(!has_bitmask(0x200, 0x202));
        assert!(has_bitmask(0, 0));
    }

    #[test]
    fn test_bitmask_value() {
        assert_eq!(bitmask_value("userAccountControl", None).unwrap(), 0);
        let value = AttributeValue::from(" 512 ");
        assert_eq!(bitmask_value("userAccountControl", Some(&value)).unwrap(), 512);

        let err = bitmask_value("userAccountControl", Some(&AttributeValue::from("abc"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AttributeInvalidData);

        let binary = AttributeValue::Binary(vec![0xff, 0xfe]);
        let err = bitmask_value("userAccountControl", Some(&binary)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AttributeInvalidData);
    }

    #[test]
    fn test_join_container() {
        assert_eq!(join_container("cn=a", "ou=People"), "cn=a,ou=People");
        assert_eq!(join_container("cn=a", ""), "cn=a");
        assert_eq!(join_container("cn=a", "  "), "cn=a");
    }

    #[test]
    fn test_modifications_per_attribute() {
        let attributes = AttributeSet::new()
            .with("mail", "a@example.com")
            .with("telephoneNumber", "123");
        let changes = modifications(ModifyOperation::Remove, &attributes);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| matches!(c, Modification::Delete(..))));
        assert!(changes.iter().any(|c| c.attribute() == "mail"));
    }
}
