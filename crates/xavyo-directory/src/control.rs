//! LDAP controls
//!
//! Response controls arrive as raw `(oid, criticality, BER value)` triples.
//! The [`ControlRegistry`] maps the OIDs this crate understands onto typed
//! [`Control`] variants; everything else, including values that fail to
//! decode, is carried as [`Control::Opaque`] so a malformed control never
//! aborts the caller.

use std::collections::BTreeMap;

use ldap3::asn1::{
    parse_tag, write, ASNTag, Boolean, OctetString, Sequence, StructureTag, Tag, TagClass, Types,
    PL,
};
use ldap3::controls::{PagedResults, RawControl};
use tracing::warn;

use crate::error::{DirectoryError, DirectoryResult};

pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";
pub const SORT_REQUEST_OID: &str = "1.2.840.113556.1.4.473";
pub const SORT_RESPONSE_OID: &str = "1.2.840.113556.1.4.474";
pub const TREE_DELETE_OID: &str = "1.2.840.113556.1.4.805";
pub const VIRTUAL_LIST_OID: &str = "2.16.840.1.113730.3.4.9";

/// A response control, typed where the OID is known.
#[derive(Debug, Clone)]
pub enum Control {
    /// Simple paged results (RFC 2696). An empty cookie means no more pages.
    PagedResults {
        critical: bool,
        size: i32,
        cookie: Vec<u8>,
    },
    /// Server-side sort result (RFC 2891).
    SortResponse {
        critical: bool,
        result: i64,
        attribute: Option<String>,
    },
    /// Any control without a registered decoder.
    Opaque(RawControl),
}

impl Control {
    pub fn oid(&self) -> &str {
        match self {
            Control::PagedResults { .. } => PAGED_RESULTS_OID,
            Control::SortResponse { .. } => SORT_RESPONSE_OID,
            Control::Opaque(raw) => &raw.ctype,
        }
    }

    pub fn is_critical(&self) -> bool {
        match self {
            Control::PagedResults { critical, .. } | Control::SortResponse { critical, .. } => {
                *critical
            }
            Control::Opaque(raw) => raw.crit,
        }
    }

    /// Paging cookie, if this is a paged results control.
    pub fn paging_cookie(&self) -> Option<&[u8]> {
        match self {
            Control::PagedResults { cookie, .. } => Some(cookie),
            _ => None,
        }
    }
}

/// Decoder signature a registered OID maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    PagedResults,
    SortResponse,
}

impl ControlKind {
    fn decode(self, critical: bool, value: Option<&[u8]>) -> Option<Control> {
        let fields = parse_sequence(value?)?;
        match self {
            ControlKind::PagedResults => {
                let [size, cookie] = fields.as_slice() else {
                    return None;
                };
                let size = i32::try_from(universal_integer(size, Types::Integer)?).ok()?;
                let cookie = universal_primitive(cookie, Types::OctetString)?;
                Some(Control::PagedResults {
                    critical,
                    size,
                    cookie: cookie.to_vec(),
                })
            }
            ControlKind::SortResponse => {
                let (result, rest) = fields.split_first()?;
                let result = universal_integer(result, Types::Enumerated)?;
                let attribute = match rest {
                    [] => None,
                    [tag] if matches!(tag.class, TagClass::Context) && tag.id == 0 => {
                        match &tag.payload {
                            PL::P(bytes) => Some(String::from_utf8(bytes.clone()).ok()?),
                            PL::C(_) => return None,
                        }
                    }
                    _ => return None,
                };
                Some(Control::SortResponse {
                    critical,
                    result,
                    attribute,
                })
            }
        }
    }
}

fn parse_sequence(value: &[u8]) -> Option<Vec<StructureTag>> {
    let (_, tag) = parse_tag(value).ok()?;
    match tag {
        StructureTag {
            class: TagClass::Universal,
            id,
            payload: PL::C(inner),
        } if id == Types::Sequence as u64 => Some(inner),
        _ => None,
    }
}

fn universal_primitive(tag: &StructureTag, ty: Types) -> Option<&[u8]> {
    let id = ty as u64;
    match (&tag.class, &tag.payload) {
        (TagClass::Universal, PL::P(bytes)) if tag.id == id => Some(bytes),
        _ => None,
    }
}

fn universal_integer(tag: &StructureTag, ty: Types) -> Option<i64> {
    let bytes = universal_primitive(tag, ty)?;
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    let init: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    Some(bytes.iter().fold(init, |acc, b| (acc << 8) | i64::from(*b)))
}

/// OID to decoder table.
#[derive(Debug, Clone)]
pub struct ControlRegistry {
    decoders: BTreeMap<String, ControlKind>,
}

impl Default for ControlRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ControlRegistry {
    /// Create a registry that decodes nothing.
    pub fn new() -> Self {
        Self {
            decoders: BTreeMap::new(),
        }
    }

    /// Create a registry that knows the paged results and sort response controls.
    pub fn with_defaults() -> Self {
        let mut decoders = BTreeMap::new();
        decoders.insert(PAGED_RESULTS_OID.to_string(), ControlKind::PagedResults);
        decoders.insert(SORT_RESPONSE_OID.to_string(), ControlKind::SortResponse);
        Self { decoders }
    }

    /// Associate an OID with a decoder.
    ///
    /// Registering the same kind twice is a no-op; a different kind fails.
    pub fn register(&mut self, oid: impl Into<String>, kind: ControlKind) -> DirectoryResult<()> {
        let oid = oid.into();
        match self.decoders.get(&oid) {
            Some(existing) if *existing != kind => {
                Err(DirectoryError::invalid_configuration(format!(
                    "control {oid} is already registered as {existing:?}"
                )))
            }
            Some(_) => Ok(()),
            None => {
                self.decoders.insert(oid, kind);
                Ok(())
            }
        }
    }

    pub fn kind(&self, oid: &str) -> Option<ControlKind> {
        self.decoders.get(oid).copied()
    }

    /// Reconstruct a control from its raw parts, never failing.
    pub fn instantiate(&self, oid: &str, critical: bool, value: Option<&[u8]>) -> Control {
        let opaque = || {
            Control::Opaque(RawControl {
                ctype: oid.to_string(),
                crit: critical,
                val: value.map(<[u8]>::to_vec),
            })
        };

        let Some(kind) = self.kind(oid) else {
            return opaque();
        };

        kind.decode(critical, value).unwrap_or_else(|| {
            warn!(oid, ?kind, "Cannot decode response control, keeping it opaque");
            opaque()
        })
    }

    /// Reconstruct a control returned by the transport.
    pub fn decode(&self, raw: &RawControl) -> Control {
        self.instantiate(&raw.ctype, raw.crit, raw.val.as_deref())
    }
}

/// Request control for one page of a simple paged search.
pub fn paged_results_request(size: i32, cookie: Vec<u8>, critical: bool) -> RawControl {
    let mut control: RawControl = PagedResults { size, cookie }.into();
    control.crit = critical;
    control
}

/// One key of a server-side sort request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub attribute: String,
    pub ordering_rule: Option<String>,
    pub reverse: bool,
}

impl SortKey {
    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ordering_rule: None,
            reverse: false,
        }
    }

    pub fn descending(attribute: impl Into<String>) -> Self {
        Self {
            reverse: true,
            ..Self::ascending(attribute)
        }
    }
}

/// Server-side sort request control (RFC 2891).
pub fn sort_request(keys: &[SortKey], critical: bool) -> DirectoryResult<RawControl> {
    if keys.is_empty() {
        return Err(DirectoryError::invalid_configuration(
            "a sort request needs at least one key",
        ));
    }

    let keys = keys
        .iter()
        .map(|key| {
            let mut inner = vec![Tag::OctetString(OctetString {
                inner: key.attribute.as_bytes().to_vec(),
                ..Default::default()
            })];
            if let Some(rule) = &key.ordering_rule {
                inner.push(Tag::OctetString(OctetString {
                    class: TagClass::Context,
                    id: 0,
                    inner: rule.as_bytes().to_vec(),
                }));
            }
            if key.reverse {
                inner.push(Tag::Boolean(Boolean {
                    class: TagClass::Context,
                    id: 1,
                    inner: true,
                }));
            }
            Tag::Sequence(Sequence {
                inner,
                ..Default::default()
            })
        })
        .collect();

    let value = Tag::Sequence(Sequence {
        inner: keys,
        ..Default::default()
    })
    .into_structure();

    let mut buf = bytes::BytesMut::new();
    write::encode_into(&mut buf, value)
        .map_err(|e| {
            DirectoryError::operation_failed_with_source("cannot encode sort control", e)
        })?;

    Ok(RawControl {
        ctype: SORT_REQUEST_OID.to_string(),
        crit: critical,
        val: Some(buf.to_vec()),
    })
}

/// Tree delete request control; removes an entry together with its subtree.
pub fn tree_delete_request() -> RawControl {
    RawControl {
        ctype: TREE_DELETE_OID.to_string(),
        crit: true,
        val: None,
    }
}
