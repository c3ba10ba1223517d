//! Generic hierarchical markup tree.
//!
//! Schema documents reach Kestrel as an already-parsed element tree; the
//! concrete on-disk syntax (and its parser) live outside this workspace.
//! `MarkupNode` is the neutral in-memory form the [`builder`](crate::builder)
//! consumes: named elements with ordered string attributes, optional text,
//! and child elements.
//!
//! The type is serde-derived so fixtures and tests can ship documents as
//! JSON without depending on any particular markup dialect.

use serde::{Deserialize, Serialize};

/// One element of a schema markup document.
///
/// Attributes are kept as an ordered list rather than a map: schema
/// documents are small, authoring order is meaningful for diagnostics, and
/// duplicate keys should be visible to the builder instead of silently
/// collapsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupNode {
    /// Element name, e.g. `class`, `cifMap`, `field`.
    pub name: String,

    /// Ordered `(key, value)` attribute pairs.
    #[serde(default)]
    pub attrs: Vec<(String, String)>,

    /// Optional text content.
    #[serde(default)]
    pub text: Option<String>,

    /// Child elements in document order.
    #[serde(default)]
    pub children: Vec<MarkupNode>,
}

impl MarkupNode {
    /// Create an empty element with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attrs: Vec::new(), text: None, children: Vec::new() }
    }

    /// Builder-style attribute append, used heavily by test fixtures.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    /// Builder-style child append.
    #[must_use]
    pub fn with_child(mut self, child: MarkupNode) -> Self {
        self.children.push(child);
        self
    }

    /// Builder-style text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// First value for `key`, if present.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Parse an attribute as unsigned, accepting decimal or `0x` hex.
    ///
    /// Returns `None` both when the attribute is absent and when it does not
    /// parse; the builder distinguishes the two cases itself because the
    /// recovery differs (synthesize a default vs. emit a diagnostic).
    pub fn attr_u64(&self, key: &str) -> Option<u64> {
        parse_uint(self.attr(key)?)
    }

    /// `attr_u64` narrowed to `u32`.
    pub fn attr_u32(&self, key: &str) -> Option<u32> {
        self.attr_u64(key).and_then(|v| u32::try_from(v).ok())
    }

    /// `attr_u64` narrowed to `u8`.
    pub fn attr_u8(&self, key: &str) -> Option<u8> {
        self.attr_u64(key).and_then(|v| u8::try_from(v).ok())
    }

    /// Parse a boolean attribute (`true`/`false`/`1`/`0`).
    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        match self.attr(key)? {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    /// Parse a floating-point attribute.
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attr(key)?.parse().ok()
    }

    /// Iterate children with the given element name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MarkupNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First child with the given element name.
    pub fn child_named<'a>(&'a self, name: &'a str) -> Option<&'a MarkupNode> {
        self.children_named(name).next()
    }
}

/// Parse decimal or `0x`-prefixed hex.
fn parse_uint(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
