//! Attribute values, attribute sets and directory entries

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single attribute value as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A UTF-8 string value.
    Text(String),
    /// A binary value (certificates, GUIDs, photos).
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// Get the value as a string, if it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Binary(_) => None,
        }
    }

    /// Raw bytes of the value.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeValue::Text(s) => s.as_bytes(),
            AttributeValue::Binary(b) => b,
        }
    }

    /// Consume the value into its raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            AttributeValue::Text(s) => s.into_bytes(),
            AttributeValue::Binary(b) => b,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) => f.write_str(s),
            AttributeValue::Binary(b) => f.write_str(&hex_string(b)),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(b: Vec<u8>) -> Self {
        AttributeValue::Binary(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Text(i.to_string())
    }
}

/// Render bytes as upper-case hex, e.g. for GUIDs in diagnostics.
pub fn hex_string(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02X}");
        out
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Attribute {
    name: String,
    values: Vec<AttributeValue>,
}

/// A set of attributes keyed by case-insensitive name.
///
/// An attribute may be present with no values, which is how a field is
/// nulled on the directory side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSet {
    attributes: BTreeMap<String, Attribute>,
}

impl AttributeSet {
    /// Create a new empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from a name/value mapping, skipping empty values.
    pub fn from_mapping<I, K, V>(mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (name, value) in mapping {
            let value = value.into();
            if !value.is_empty() {
                set.add_value(name, value);
            }
        }
        set
    }

    /// Build a set from a name/value mapping where empty values become
    /// attributes present without a value.
    pub fn from_mapping_present<I, K, V>(mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (name, value) in mapping {
            let value = value.into();
            if value.is_empty() {
                set.set_empty(name);
            } else {
                set.add_value(name, value);
            }
        }
        set
    }

    /// Replace an attribute with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.set_values(name, vec![value.into()]);
    }

    /// Replace an attribute with the given values.
    pub fn set_values(&mut self, name: impl Into<String>, values: Vec<AttributeValue>) {
        let name = name.into();
        self.attributes
            .insert(name.to_lowercase(), Attribute { name, values });
    }

    /// Mark an attribute present with no values.
    pub fn set_empty(&mut self, name: impl Into<String>) {
        self.set_values(name, Vec::new());
    }

    /// Set an attribute using builder pattern.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.add_value(name, value);
        self
    }

    /// Append a value to an attribute, creating it if needed.
    pub fn add_value(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        let name = name.into();
        self.attributes
            .entry(name.to_lowercase())
            .or_insert_with(|| Attribute {
                name,
                values: Vec::new(),
            })
            .values
            .push(value.into());
    }

    /// Get the values of an attribute.
    pub fn get(&self, name: &str) -> Option<&[AttributeValue]> {
        self.attributes
            .get(&name.to_lowercase())
            .map(|a| a.values.as_slice())
    }

    /// Get the first textual value of an attribute.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .and_then(AttributeValue::as_text)
    }

    /// Get all textual values of an attribute.
    pub fn get_texts(&self, name: &str) -> Vec<&str> {
        self.get(name)
            .map(|values| values.iter().filter_map(AttributeValue::as_text).collect())
            .unwrap_or_default()
    }

    /// Check if an attribute is present (possibly without values).
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(&name.to_lowercase())
    }

    /// Remove an attribute, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<AttributeValue>> {
        self.attributes
            .remove(&name.to_lowercase())
            .map(|a| a.values)
    }

    /// Get the number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over attributes with their original name spelling.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[AttributeValue])> {
        self.attributes
            .values()
            .map(|a| (a.name.as_str(), a.values.as_slice()))
    }

    /// Render the set for diagnostics with the password attribute masked.
    pub fn redacted(&self, password_attribute: &str) -> String {
        let rendered: Vec<String> = self
            .iter()
            .map(|(name, values)| {
                if name.eq_ignore_ascii_case(password_attribute) {
                    format!("{name}: ******")
                } else {
                    let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                    format!("{name}: {}", values.join(", "))
                }
            })
            .collect();
        format!("{{{}}}", rendered.join("; "))
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = (String, AttributeValue)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (name, value) in iter {
            set.add_value(name, value);
        }
        set
    }
}

/// A directory entry materialized from a search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name as returned by the server.
    pub dn: String,
    pub attributes: AttributeSet,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_names_are_case_insensitive() {
        let mut set = AttributeSet::new();
        set.set("objectClass", "person");
        assert!(set.has("OBJECTCLASS"));
        assert_eq!(set.get_text("objectclass"), Some("person"));

        let names: Vec<&str> = set.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["objectClass"]);
    }

    #[test]
    fn test_add_value_accumulates() {
        let set = AttributeSet::new()
            .with("mail", "a@example.com")
            .with("Mail", "b@example.com");
        assert_eq!(set.get_texts("mail"), vec!["a@example.com", "b@example.com"]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_from_mapping_skips_empty_values() {
        let set = AttributeSet::from_mapping([("cn", "John"), ("sn", "")]);
        assert!(set.has("cn"));
        assert!(!set.has("sn"));
    }

    #[test]
    fn test_from_mapping_present_keeps_empty_values() {
        let set = AttributeSet::from_mapping_present([("cn", "John"), ("sn", "")]);
        assert!(set.has("sn"));
        assert_eq!(set.get("sn").map(<[AttributeValue]>::len), Some(0));
    }

    #[test]
    fn test_redacted_masks_password() {
        let set = AttributeSet::new()
            .with("cn", "John")
            .with("userPassword", "s3cret");
        let rendered = set.redacted("userpassword");
        assert!(rendered.contains("cn: John"));
        assert!(rendered.contains("userPassword: ******"));
        assert!(!rendered.contains("s3cret"));
    }

    #[test]
    fn test_binary_values_render_as_hex() {
        let value = AttributeValue::Binary(vec![0xDE, 0xAD, 0x01]);
        assert_eq!(value.to_string(), "DEAD01");
        assert_eq!(value.as_text(), None);
        assert_eq!(hex_string(&[]), "");
    }

    #[test]
    fn test_remove() {
        let mut set = AttributeSet::new().with("cn", "John");
        assert_eq!(
            set.remove("CN"),
            Some(vec![AttributeValue::Text("John".to_string())])
        );
        assert!(set.is_empty());
    }
}
