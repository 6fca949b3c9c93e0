//! Distinguished name codec
//!
//! Parsing, composition and escaping of distinguished names in the RFC 2253
//! string form. A [`DistinguishedName`] is an owned, immutable sequence of
//! [`Rdn`] components ordered innermost first, the way LDAP writes them.

use std::fmt;
use std::str::FromStr;

use crate::error::{DirectoryError, DirectoryResult};

/// One `prefix=value` component of a distinguished name.
///
/// The value is held unescaped. Equality ignores ASCII case on both the
/// attribute prefix and the value, matching directory string semantics.
#[derive(Debug, Clone)]
pub struct Rdn {
    prefix: String,
    value: String,
}

impl Rdn {
    /// Create a component from an attribute prefix and an unescaped value.
    pub fn new(prefix: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            value: value.into(),
        }
    }

    /// The attribute type, e.g. `cn`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The unescaped attribute value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.prefix.eq_ignore_ascii_case(&other.prefix)
            && self.value.to_lowercase() == other.value.to_lowercase()
    }
}

impl Eq for Rdn {}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&compose_rdn(&self.prefix, &self.value))
    }
}

/// A distinguished name: RDN components ordered leaf first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    rdns: Vec<Rdn>,
}

impl DistinguishedName {
    /// Parse a raw DN string.
    ///
    /// Components are split on top-level `,` and each is paired at its first
    /// top-level `=`. Backslash escapes and quoted spans are honoured, so
    /// `cn=Doe\, John,dc=example` yields two components. A string with exactly
    /// one top-level `=` is a single RDN even if it contains bare commas.
    pub fn parse(raw: &str) -> DirectoryResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let components: Vec<&str> = if top_level_positions(trimmed, '=').len() == 1 {
            vec![trimmed]
        } else {
            split_top_level(trimmed, ',')
        };

        let mut rdns = Vec::with_capacity(components.len());
        for component in components {
            let eq = top_level_positions(component, '=')
                .first()
                .copied()
                .ok_or_else(|| {
                    let message = format!("component '{component}' has no '='");
                    DirectoryError::malformed_name(raw, message)
                })?;
            let prefix = component[..eq].trim();
            if prefix.is_empty() {
                return Err(DirectoryError::malformed_name(
                    raw,
                    format!("component '{component}' has an empty attribute type"),
                ));
            }
            let value = unescape_named(&component[eq + 1..], raw)?;
            rdns.push(Rdn::new(prefix, value));
        }

        Ok(Self { rdns })
    }

    /// Build a name from explicit components, leaf first.
    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Self { rdns }
    }

    /// The components, leaf first.
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// The innermost component, if any.
    pub fn leaf(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// The name with its leaf component dropped. The parent of the empty
    /// name is the empty name.
    #[must_use]
    pub fn parent(&self) -> Self {
        Self {
            rdns: self.rdns.iter().skip(1).cloned().collect(),
        }
    }

    /// A name one level deeper than this one.
    #[must_use]
    pub fn child(&self, rdn: Rdn) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }

    /// True when `ancestor`'s components are a proper suffix of this name.
    pub fn is_descendant_of(&self, ancestor: &DistinguishedName) -> bool {
        self.rdns.len() > ancestor.rdns.len() && self.rdns.ends_with(&ancestor.rdns)
    }

    /// Render the name, escaping every value.
    pub fn compose(&self) -> String {
        self.rdns
            .iter()
            .map(Rdn::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compose())
    }
}

impl FromStr for DistinguishedName {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Render a single `prefix=value` component with the value escaped.
pub fn compose_rdn(prefix: &str, value: &str) -> String {
    format!("{prefix}={}", escape(value))
}

/// Prefix a bare container name with `default_prefix` unless it already
/// carries an attribute type.
pub fn ensure_container_rdn(value: &str, default_prefix: &str) -> String {
    if value.contains('=') {
        value.to_string()
    } else {
        compose_rdn(default_prefix, value)
    }
}

/// Return the leaf RDN of a raw DN without parsing it.
///
/// The result runs up to the last top-level comma preceding the second
/// top-level `=`. With fewer than two `=` the whole input is returned.
pub fn first_rdn(raw: &str) -> &str {
    let equals = top_level_positions(raw, '=');
    let Some(&second) = equals.get(1) else {
        return raw;
    };
    match top_level_positions(raw, ',')
        .into_iter()
        .rev()
        .find(|&comma| comma < second)
    {
        Some(comma) => &raw[..comma],
        None => raw,
    }
}

/// Escape an attribute value for use in a DN.
///
/// `, + " \ / < > ;` are backslash-escaped, as are a leading `#` and leading
/// or trailing spaces. NUL is rendered as `\00`.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    let last = value.chars().count().saturating_sub(1);

    for (i, ch) in value.chars().enumerate() {
        match ch {
            ',' | '+' | '"' | '\\' | '/' | '<' | '>' | ';' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '\0' => escaped.push_str("\\00"),
            '#' if i == 0 => escaped.push_str("\\#"),
            ' ' if i == 0 || i == last => escaped.push_str("\\ "),
            _ => escaped.push(ch),
        }
    }

    escaped
}

/// Reverse [`escape`], also accepting quoted values and `\XX` hex pairs.
///
/// Unescaped leading and trailing spaces are dropped. A dangling backslash,
/// an unterminated quote or escapes that do not decode to UTF-8 fail with
/// [`DirectoryError::NameSyntax`].
pub fn unescape(value: &str) -> DirectoryResult<String> {
    unescape_named(value, value)
}

fn unescape_named(value: &str, name: &str) -> DirectoryResult<String> {
    let trimmed = trim_unescaped(value);

    match trimmed.strip_prefix('"') {
        Some(rest) => {
            let inner = rest
                .strip_suffix('"')
                .filter(|inner| trailing_backslashes(inner) % 2 == 0)
                .ok_or_else(|| DirectoryError::malformed_name(name, "unterminated quoted value"))?;
            decode_escapes(inner, name)
        }
        None => decode_escapes(trimmed, name),
    }
}

fn decode_escapes(value: &str, name: &str) -> DirectoryResult<String> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            decoded.push(bytes[i]);
            i += 1;
            continue;
        }

        let Some(&next) = bytes.get(i + 1) else {
            return Err(DirectoryError::malformed_name(name, "dangling escape character"));
        };
        let hex_pair =
            next.is_ascii_hexdigit() && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
        if hex_pair {
            let pair = &value[i + 1..i + 3];
            let byte = u8::from_str_radix(pair, 16).map_err(|_| {
                DirectoryError::malformed_name(name, format!("bad hex escape '\\{pair}'"))
            })?;
            decoded.push(byte);
            i += 3;
        } else {
            // Copy the escaped character as a whole, it may be multi-byte.
            let ch = value[i + 1..]
                .chars()
                .next()
                .ok_or_else(|| DirectoryError::malformed_name(name, "dangling escape character"))?;
            let mut utf8 = [0u8; 4];
            decoded.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
            i += 1 + ch.len_utf8();
        }
    }

    String::from_utf8(decoded)
        .map_err(|_| DirectoryError::malformed_name(name, "escaped bytes are not valid UTF-8"))
}

fn trim_unescaped(value: &str) -> &str {
    let value = value.trim_start_matches(' ');
    let mut end = value.len();
    while value[..end].ends_with(' ') {
        if trailing_backslashes(&value[..end - 1]) % 2 == 1 {
            break;
        }
        end -= 1;
    }
    &value[..end]
}

fn trailing_backslashes(value: &str) -> usize {
    value.bytes().rev().take_while(|&b| b == b'\\').count()
}

/// Byte offsets of `target` outside escapes and quoted spans.
fn top_level_positions(value: &str, target: char) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut escaped = false;
    let mut quoted = false;

    for (i, ch) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => quoted = !quoted,
            c if c == target && !quoted => positions.push(i),
            _ => {}
        }
    }

    positions
}

fn split_top_level(value: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for position in top_level_positions(value, separator) {
        parts.push(&value[start..position]);
        start = position + separator.len_utf8();
    }
    parts.push(&value[start..]);
    parts
}
