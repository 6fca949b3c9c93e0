//! Test helpers for xavyo-directory integration tests.
//!
//! Provides an in-memory directory implementing the transport seam, so the
//! connection, search and mutation layers run without a live server.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use ldap3::controls::RawControl;
use xavyo_directory::control::{paged_results_request, Control, PAGED_RESULTS_OID, TREE_DELETE_OID};
use xavyo_directory::{
    AttributeSet, AttributeValue, ControlRegistry, DirectoryConnector, DirectoryEntry,
    DirectoryError, DirectoryResult, DirectoryTransport, EndpointConfig, Environment,
    Modification, SchemaMap, Scope, SearchRequest, SearchResponse, TransportFactory,
};

pub const ROOT: &str = "dc=example,dc=com";

/// Shared state of the in-memory directory.
#[derive(Default)]
pub struct DirectoryState {
    /// Entries keyed by lower-cased DN.
    pub entries: BTreeMap<String, DirectoryEntry>,
    pub supported_controls: Vec<String>,
    pub offline: bool,
    pub opened: usize,
    pub closed: usize,
    pub environments: Vec<Environment>,
    pub searches: Vec<SearchRequest>,
    /// DN and control OIDs of every delete request.
    pub deletes: Vec<(String, Vec<String>)>,
    /// DN and changes of every modify request.
    pub modifications: Vec<(String, Vec<Modification>)>,
}

/// An in-memory directory. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    state: Rc<RefCell<DirectoryState>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, dn: &str, attributes: AttributeSet) -> Self {
        self.insert(dn, attributes);
        self
    }

    pub fn with_control(self, oid: &str) -> Self {
        self.state
            .borrow_mut()
            .supported_controls
            .push(oid.to_string());
        self
    }

    pub fn insert(&self, dn: &str, attributes: AttributeSet) {
        self.state
            .borrow_mut()
            .entries
            .insert(key(dn), DirectoryEntry::new(dn, attributes));
    }

    pub fn get(&self, dn: &str) -> Option<DirectoryEntry> {
        self.state.borrow().entries.get(&key(dn)).cloned()
    }

    pub fn contains(&self, dn: &str) -> bool {
        self.state.borrow().entries.contains_key(&key(dn))
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.borrow_mut().offline = offline;
    }

    pub fn state(&self) -> std::cell::Ref<'_, DirectoryState> {
        self.state.borrow()
    }
}

impl TransportFactory for MemoryDirectory {
    type Transport = MemoryTransport;

    fn open(&self, environment: &Environment) -> DirectoryResult<MemoryTransport> {
        let mut state = self.state.borrow_mut();
        if state.offline {
            return Err(DirectoryError::connection_failed(format!(
                "no endpoint reachable: {}",
                environment.provider_url
            )));
        }
        state.opened += 1;
        state.environments.push(environment.clone());
        Ok(MemoryTransport {
            state: self.state.clone(),
            closed: false,
        })
    }
}

/// Transport over a [`MemoryDirectory`].
///
/// A replace with no values keeps the attribute present without a value, the
/// way the connector models a nulled field. An LDAP server removes the
/// attribute instead, so tests should assert on the recorded request.
pub struct MemoryTransport {
    state: Rc<RefCell<DirectoryState>>,
    closed: bool,
}

impl DirectoryTransport for MemoryTransport {
    fn search(&mut self, request: &SearchRequest) -> DirectoryResult<SearchResponse> {
        let mut state = self.state.borrow_mut();
        state.searches.push(request.clone());

        if request.base.is_empty() && request.scope == Scope::Object {
            let mut attributes = AttributeSet::new();
            attributes.set_values(
                "supportedControl",
                state
                    .supported_controls
                    .iter()
                    .map(|oid| AttributeValue::from(oid.as_str()))
                    .collect(),
            );
            return Ok(SearchResponse {
                entries: vec![project(&DirectoryEntry::new("", attributes), &request.attributes)],
                controls: Vec::new(),
            });
        }

        let base = key(&request.base);
        if !state.entries.contains_key(&base) {
            return Err(DirectoryError::from_result_code(32, "", &request.base));
        }

        let matches: Vec<DirectoryEntry> = state
            .entries
            .iter()
            .filter(|(dn, _)| in_scope(dn, &base, request.scope))
            .filter(|(_, entry)| matches_filter(&request.filter, entry))
            .map(|(_, entry)| project(entry, &request.attributes))
            .collect();

        let registry = ControlRegistry::with_defaults();
        let paging = request
            .controls
            .iter()
            .filter(|raw| raw.ctype == PAGED_RESULTS_OID)
            .find_map(|raw| match registry.decode(raw) {
                Control::PagedResults { size, cookie, .. } => Some((size, cookie)),
                _ => None,
            });

        let Some((size, cookie)) = paging else {
            return Ok(SearchResponse {
                entries: matches,
                controls: Vec::new(),
            });
        };

        let offset: usize = String::from_utf8_lossy(&cookie).parse().unwrap_or(0);
        let end = (offset + size as usize).min(matches.len());
        let next = if end < matches.len() {
            end.to_string().into_bytes()
        } else {
            Vec::new()
        };
        Ok(SearchResponse {
            entries: matches[offset.min(end)..end].to_vec(),
            controls: vec![paged_results_request(0, next, false)],
        })
    }

    fn add(&mut self, dn: &str, attributes: &AttributeSet) -> DirectoryResult<()> {
        let mut state = self.state.borrow_mut();
        if state.entries.contains_key(&key(dn)) {
            return Err(DirectoryError::from_result_code(68, "", dn));
        }
        if attributes.is_empty() {
            return Err(DirectoryError::from_result_code(65, "no object class", dn));
        }
        state
            .entries
            .insert(key(dn), DirectoryEntry::new(dn, attributes.clone()));
        Ok(())
    }

    fn delete(&mut self, dn: &str, controls: &[RawControl]) -> DirectoryResult<()> {
        let mut state = self.state.borrow_mut();
        state.deletes.push((
            dn.to_string(),
            controls.iter().map(|c| c.ctype.clone()).collect(),
        ));

        let target = key(dn);
        if !state.entries.contains_key(&target) {
            return Err(DirectoryError::from_result_code(32, "", dn));
        }
        let subtree: Vec<String> = state
            .entries
            .keys()
            .filter(|k| k.ends_with(&format!(",{target}")))
            .cloned()
            .collect();
        let tree_delete = controls.iter().any(|c| c.ctype == TREE_DELETE_OID);
        if !subtree.is_empty() && !tree_delete {
            return Err(DirectoryError::from_result_code(66, "entry has children", dn));
        }
        for child in subtree {
            state.entries.remove(&child);
        }
        state.entries.remove(&target);
        Ok(())
    }

    fn modify(&mut self, dn: &str, modifications: &[Modification]) -> DirectoryResult<()> {
        let mut state = self.state.borrow_mut();
        state
            .modifications
            .push((dn.to_string(), modifications.to_vec()));
        let entry = state
            .entries
            .get_mut(&key(dn))
            .ok_or_else(|| DirectoryError::from_result_code(32, "", dn))?;

        for modification in modifications {
            let name = modification.attribute();
            let values = modification.values();
            let attributes = &mut entry.attributes;
            match modification {
                Modification::Add(..) => {
                    for value in values {
                        if attributes.get(name).is_some_and(|v| v.contains(value)) {
                            return Err(DirectoryError::from_result_code(20, name, dn));
                        }
                        attributes.add_value(name, value.clone());
                    }
                }
                Modification::Replace(..) if values.is_empty() => attributes.set_empty(name),
                Modification::Replace(..) => attributes.set_values(name, values.to_vec()),
                Modification::Delete(..) if values.is_empty() => {
                    if attributes.remove(name).is_none() {
                        return Err(DirectoryError::from_result_code(16, name, dn));
                    }
                }
                Modification::Delete(..) => {
                    let remaining: Vec<AttributeValue> = attributes
                        .get(name)
                        .unwrap_or_default()
                        .iter()
                        .filter(|v| !values.contains(v))
                        .cloned()
                        .collect();
                    attributes.set_values(name, remaining);
                }
            }
        }
        Ok(())
    }

    fn rename(
        &mut self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<&str>,
    ) -> DirectoryResult<()> {
        let mut state = self.state.borrow_mut();
        let Some(mut entry) = state.entries.remove(&key(dn)) else {
            return Err(DirectoryError::from_result_code(32, "", dn));
        };

        let parent = match new_superior {
            Some(superior) => superior.to_string(),
            None => dn.split_once(',').map(|(_, p)| p.to_string()).unwrap_or_default(),
        };
        let new_dn = if parent.is_empty() {
            new_rdn.to_string()
        } else {
            format!("{new_rdn},{parent}")
        };

        if state.entries.contains_key(&key(&new_dn)) {
            state.entries.insert(key(dn), entry);
            return Err(DirectoryError::from_result_code(68, "", &new_dn));
        }
        entry.dn = new_dn.clone();
        state.entries.insert(key(&new_dn), entry);
        Ok(())
    }

    fn close(&mut self) -> DirectoryResult<()> {
        if !self.closed {
            self.closed = true;
            self.state.borrow_mut().closed += 1;
        }
        Ok(())
    }
}

fn key(dn: &str) -> String {
    dn.trim().to_lowercase()
}

fn in_scope<'a>(dn: &'a str, base: &str, scope: Scope) -> bool {
    let below = |dn: &'a str| -> Option<&'a str> { dn.strip_suffix(base).and_then(|rest| rest.strip_suffix(',')) };
    match scope {
        Scope::Object => dn == base,
        Scope::OneLevel => below(dn).is_some_and(|rdn| !rdn.contains(',')),
        Scope::Subtree => dn == base || below(dn).is_some(),
    }
}

fn project(entry: &DirectoryEntry, requested: &[String]) -> DirectoryEntry {
    if requested.is_empty() {
        return entry.clone();
    }
    let mut attributes = AttributeSet::new();
    for (name, values) in entry.attributes.iter() {
        if requested.iter().any(|r| r.eq_ignore_ascii_case(name)) {
            attributes.set_values(name, values.to_vec());
        }
    }
    DirectoryEntry::new(entry.dn.clone(), attributes)
}

/// Evaluate the subset of RFC 4515 the crate emits: `&`, `|`, `!`,
/// equality, presence and `>=` on integers.
fn matches_filter(filter: &str, entry: &DirectoryEntry) -> bool {
    let inner = filter
        .trim()
        .strip_prefix('(')
        .and_then(|f| f.strip_suffix(')'))
        .unwrap_or(filter);

    if let Some(rest) = inner.strip_prefix('&') {
        return split_filters(rest).iter().all(|f| matches_filter(f, entry));
    }
    if let Some(rest) = inner.strip_prefix('|') {
        return split_filters(rest).iter().any(|f| matches_filter(f, entry));
    }
    if let Some(rest) = inner.strip_prefix('!') {
        return !matches_filter(rest, entry);
    }

    if let Some((name, value)) = inner.split_once(">=") {
        let Ok(bound) = value.parse::<i64>() else {
            return false;
        };
        return entry
            .attributes
            .get_texts(name)
            .iter()
            .any(|v| v.parse::<i64>().is_ok_and(|n| n >= bound));
    }

    let Some((name, value)) = inner.split_once('=') else {
        return false;
    };
    if value == "*" {
        return name.eq_ignore_ascii_case("objectClass") || entry.attributes.has(name);
    }
    let value = unescape_filter_value(value);
    entry
        .attributes
        .get_texts(name)
        .iter()
        .any(|v| v.eq_ignore_ascii_case(&value))
}

fn split_filters(list: &str) -> Vec<&str> {
    let mut filters = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in list.char_indices() {
        match c {
            '(' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    filters.push(&list[start..=i]);
                }
            }
            _ => {}
        }
    }
    filters
}

fn unescape_filter_value(value: &str) -> String {
    let mut out = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// A person entry with the given uid.
pub fn person(uid: &str) -> AttributeSet {
    AttributeSet::new()
        .with("objectClass", "inetOrgPerson")
        .with("uid", uid)
        .with("cn", uid)
}

pub fn container(name: &str) -> AttributeSet {
    AttributeSet::new()
        .with("objectClass", "organizationalUnit")
        .with("ou", name)
}

/// A directory with the root context, `ou=People` and `ou=Groups`.
pub fn seeded_directory() -> MemoryDirectory {
    MemoryDirectory::new()
        .with_entry(ROOT, AttributeSet::new().with("objectClass", "domain"))
        .with_entry(&format!("ou=People,{ROOT}"), container("People"))
        .with_entry(&format!("ou=Groups,{ROOT}"), container("Groups"))
}

pub fn endpoint() -> EndpointConfig {
    EndpointConfig::new("ldap.example.com", ROOT)
        .with_relative_dn(true)
        .with_credentials(format!("cn=admin,{ROOT}"), "hunter2")
}

/// A relative-mode connector over `directory`.
pub fn connector(directory: &MemoryDirectory) -> DirectoryConnector<MemoryDirectory> {
    connector_with_schema(directory, SchemaMap::new())
}

pub fn connector_with_schema(
    directory: &MemoryDirectory,
    schema: SchemaMap,
) -> DirectoryConnector<MemoryDirectory> {
    DirectoryConnector::with_factory(endpoint(), schema, directory.clone())
        .expect("valid connector configuration")
}
